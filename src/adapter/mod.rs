//! Target adapter interface (C1): one implementation per authentication protocol.
//!
//! Adapters are purely functional with respect to engine state — all
//! statefulness (the work queue, counters, backoff) lives in the orchestrator.

pub mod http_form;
pub mod ntlm;
pub mod office365;
pub mod smb;

use crate::attempt_log::AttemptRecord;
use async_trait::async_trait;

/// The outcome of a single login attempt: either a concrete response or a timeout.
/// Adapters must surface a timeout distinctly from a negative answer, and must
/// never retry internally.
pub enum AttemptOutcome {
    Responded(AttemptRecord),
    TimedOut(AttemptRecord),
}

impl AttemptOutcome {
    pub fn record(&self) -> &AttemptRecord {
        match self {
            AttemptOutcome::Responded(r) | AttemptOutcome::TimedOut(r) => r,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, AttemptOutcome::TimedOut(_))
    }
}

#[async_trait]
pub trait TargetAdapter: Send + Sync {
    /// Human-readable module name, used as the `Module` field and for the
    /// Analyzer's dispatch.
    fn module_name(&self) -> &'static str;

    /// Performs exactly one credential attempt against the configured target.
    async fn login(&self, username: &str, password: &str) -> eyre::Result<AttemptOutcome>;

    /// One-time column header printed above the per-attempt trace lines.
    /// Default shape matches the common HTTP fields; adapters with a
    /// different record shape (O365, SMB) override it.
    fn print_headers(&self) {
        println!(
            "{:<35} {:<25} {:>13} {:>15}",
            "Username", "Password", "Code", "Length"
        );
        println!("{}", "-".repeat(92));
    }

    /// Human-readable one-line trace for a completed attempt. The orchestrator
    /// silences this entirely under `--quiet` rather than passing a flag
    /// through; each adapter owns its own column layout.
    fn print_response(&self, outcome: &AttemptOutcome);
}
