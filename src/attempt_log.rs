//! Append-only attempt log: the durable record of every credential attempt
//! and the sole input to resumption.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// A value that is either a concrete HTTP status/length or the sentinel `"TIMEOUT"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntOrTimeout {
    Value(i64),
    Timeout(String),
}

impl IntOrTimeout {
    pub fn timeout() -> Self {
        IntOrTimeout::Timeout("TIMEOUT".to_string())
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, IntOrTimeout::Timeout(s) if s == "TIMEOUT")
    }

    pub fn as_value(&self) -> Option<i64> {
        match self {
            IntOrTimeout::Value(v) => Some(*v),
            IntOrTimeout::Timeout(_) => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpFields {
    #[serde(rename = "Response Code")]
    pub response_code: IntOrTimeout,
    #[serde(rename = "Response Length")]
    pub response_length: IntOrTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct O365Fields {
    #[serde(rename = "Result")]
    pub result: String,
    #[serde(rename = "Message")]
    pub message: String,
    #[serde(rename = "Response Code")]
    pub response_code: IntOrTimeout,
    #[serde(rename = "Response Length")]
    pub response_length: IntOrTimeout,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmbFields {
    #[serde(rename = "SMB Login")]
    pub smb_login: String,
}

/// One persisted attempt. Common fields plus a shape that depends on the module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(rename = "UTC Timestamp")]
    pub timestamp: String,
    #[serde(rename = "Module")]
    pub module: String,
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Password")]
    pub password: String,
    #[serde(flatten)]
    pub shape: RecordShape,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordShape {
    O365(O365Fields),
    Smb(SmbFields),
    Http(HttpFields),
}

impl AttemptRecord {
    pub fn now(module: &str, username: &str, password: &str, shape: RecordShape) -> Self {
        Self {
            timestamp: Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            module: module.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            shape,
        }
    }
}

/// Append-only newline-delimited JSON store of attempts; also the resume input.
pub struct AttemptLog {
    path: PathBuf,
}

impl AttemptLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one record, flushing to disk. Crash-safe to the granularity of a single record.
    pub fn append(&self, record: &AttemptRecord) -> eyre::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let line = serde_json::to_string(record)?;
        writeln!(file, "{line}")?;
        file.flush()?;
        Ok(())
    }

    /// Streaming parse of every line in the log. Malformed lines are skipped with a warning.
    pub fn scan(&self) -> eyre::Result<Vec<AttemptRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)?;
        let reader = BufReader::new(file);

        let mut records = Vec::new();
        for (lineno, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(err) => {
                    tracing::warn!(line = lineno + 1, error = %err, "failed to read log line; skipping");
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AttemptRecord>(&line) {
                Ok(record) => records.push(record),
                Err(err) => {
                    tracing::warn!(line = lineno + 1, error = %err, "malformed attempt record; skipping");
                }
            }
        }
        Ok(records)
    }

    /// The set of `(user, pw)` pairs already attempted, ignoring records with an empty username.
    pub fn derive_completed(&self) -> eyre::Result<HashSet<(String, String)>> {
        let records = self.scan()?;
        Ok(records
            .into_iter()
            .filter(|r| !r.username.is_empty())
            .map(|r| (r.username, r.password))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn append_then_scan_round_trips() {
        let dir = tempdir().unwrap();
        let log = AttemptLog::new(dir.path().join("out.jsonl"));

        let rec = AttemptRecord::now(
            "ADFS",
            "alice",
            "hunter2",
            RecordShape::Http(HttpFields {
                response_code: IntOrTimeout::Value(200),
                response_length: IntOrTimeout::Value(512),
            }),
        );
        log.append(&rec).unwrap();

        let scanned = log.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].username, "alice");
    }

    #[test]
    fn malformed_lines_are_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.jsonl");
        fs::write(&path, "not json\n{\"Username\":\"bob\",\"Password\":\"x\",\"Module\":\"ADFS\",\"UTC Timestamp\":\"t\",\"Response Code\":200,\"Response Length\":10}\n").unwrap();

        let log = AttemptLog::new(&path);
        let scanned = log.scan().unwrap();
        assert_eq!(scanned.len(), 1);
        assert_eq!(scanned[0].username, "bob");
    }

    #[test]
    fn derive_completed_skips_empty_username() {
        let dir = tempdir().unwrap();
        let log = AttemptLog::new(dir.path().join("out.jsonl"));

        let rec = AttemptRecord::now(
            "ADFS",
            "",
            "x",
            RecordShape::Http(HttpFields {
                response_code: IntOrTimeout::Value(200),
                response_length: IntOrTimeout::Value(10),
            }),
        );
        log.append(&rec).unwrap();
        let completed = log.derive_completed().unwrap();
        assert!(completed.is_empty());
    }
}
