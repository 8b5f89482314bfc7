use clap::Parser;
use credspray::adapter::http_form::HttpFormAdapter;
use credspray::adapter::ntlm::NtlmHttpAdapter;
use credspray::adapter::office365::Office365Adapter;
use credspray::adapter::smb::SmbAdapter;
use credspray::adapter::TargetAdapter;
use credspray::config::{Args, ConfigError, Module, SprayConfig};
use credspray::escalator::{StdinConfirm, TimeoutEscalator};
use credspray::global_config::GlobalConfig;
use credspray::notifier::{Notifier, WebhookNotifier};
use credspray::orchestrator::Orchestrator;
use eyre::{eyre, Result};
use fs2::FileExt;
use std::fs::OpenOptions;

fn build_adapter(config: &SprayConfig) -> Result<Box<dyn TargetAdapter>> {
    match config.module {
        Module::Adfs => Ok(Box::new(HttpFormAdapter::new(
            &config.host,
            config.port,
            config.no_ssl,
            config.fireprox.as_deref(),
            config.timeout,
            "/adfs/ls/",
        )?)),
        Module::Ntlm => {
            let path = config
                .ntlm_path
                .as_deref()
                .ok_or_else(|| eyre!("NTLM module requires --path"))?;
            Ok(Box::new(NtlmHttpAdapter::new(
                &config.host,
                config.port,
                config.no_ssl,
                path,
                config.domain.as_deref(),
                config.timeout,
            )?))
        }
        Module::Smb => Ok(Box::new(SmbAdapter::new(
            &config.host,
            config.domain.as_deref(),
            config.timeout,
        ))),
        Module::Office365 => Ok(Box::new(Office365Adapter::new(
            config.timeout,
            config.fireprox.as_deref(),
        )?)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(if args.debug {
            tracing_subscriber::EnvFilter::new("debug")
        } else {
            tracing_subscriber::EnvFilter::from_default_env()
        })
        .init();

    let global = GlobalConfig::load();
    global.apply_defaults(&mut args.webhook, &mut args.notify);

    let config = SprayConfig::from_args(args).map_err(|err| match &err {
        ConfigError::UsernamesUnreadable(..) | ConfigError::ResumeFileMissing(_) => {
            eyre!("{err}")
        }
        _ => eyre!("invalid configuration: {err}"),
    })?;

    let lock_path = config.output.with_extension("lock");
    if let Some(parent) = lock_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| eyre!("failed to create output directory {}: {e}", parent.display()))?;
        }
    }
    let lock_file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .map_err(|e| eyre!("failed to open lock file {}: {e}", lock_path.display()))?;
    lock_file.try_lock_exclusive().map_err(|e| {
        eyre!(
            "another spray is already writing to {} ({e})",
            config.output.display()
        )
    })?;
    let _lock_guard = lock_file;

    tracing::info!(
        host = %config.host,
        module = ?config.module,
        users = config.user_list.len(),
        passwords = config.password_list.len(),
        output = %config.output.display(),
        "spray starting"
    );

    let adapter = build_adapter(&config)?;
    let notifier: Box<dyn Notifier> = Box::new(WebhookNotifier::new(
        config
            .notify
            .unwrap_or(credspray::notifier::HookService::Slack),
    ));
    let sleep: credspray::escalator::SleepFn =
        Box::new(|d| Box::pin(async move { tokio::time::sleep(d).await }));
    let escalator = TimeoutEscalator::new(sleep);

    let orchestrator = Orchestrator::new(
        config,
        adapter,
        notifier,
        escalator,
        Box::new(StdinConfirm),
    );

    orchestrator.run().await
}
