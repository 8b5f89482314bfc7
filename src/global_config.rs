//! Optional per-user YAML configuration supplying notification defaults,
//! so `--webhook`/`--notify` don't have to be retyped on every invocation.
//! CLI flags always take precedence over these defaults.

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub webhook: Option<String>,
    #[serde(default)]
    pub notify: Option<String>,
}

impl GlobalConfig {
    fn path() -> Option<PathBuf> {
        let mut dir = dirs::config_dir()?;
        dir.push("credspray");
        dir.push("config.yaml");
        Some(dir)
    }

    /// Loads `~/.config/credspray/config.yaml` if present. A missing file is
    /// not an error — it just means no defaults. A malformed file is logged
    /// and treated the same as missing, since defaults are never load-bearing.
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            return Self::default();
        };
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml::from_str(&text) {
            Ok(cfg) => cfg,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "ignoring malformed global config");
                Self::default()
            }
        }
    }

    /// Fills in `webhook`/`notify` on a config that left them unset.
    pub fn apply_defaults(&self, webhook: &mut Option<String>, notify: &mut Option<String>) {
        if webhook.is_none() {
            *webhook = self.webhook.clone();
        }
        if notify.is_none() {
            *notify = self.notify.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_defaults_only_fills_unset_fields() {
        let global = GlobalConfig {
            webhook: Some("https://hooks.example/global".to_string()),
            notify: Some("slack".to_string()),
        };
        let mut webhook = Some("https://hooks.example/explicit".to_string());
        let mut notify = None;
        global.apply_defaults(&mut webhook, &mut notify);
        assert_eq!(webhook.as_deref(), Some("https://hooks.example/explicit"));
        assert_eq!(notify.as_deref(), Some("slack"));
    }

    #[test]
    fn empty_global_config_leaves_values_untouched() {
        let global = GlobalConfig::default();
        let mut webhook = None;
        let mut notify = None;
        global.apply_defaults(&mut webhook, &mut notify);
        assert!(webhook.is_none());
        assert!(notify.is_none());
    }
}
