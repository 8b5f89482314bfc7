//! Timeout escalator: a 3-stage backoff ladder driven by consecutive transport timeouts.

use crate::notifier::{NotifyEvent, Notifier};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

const THRESHOLD: u32 = 5;
const STAGE0_PAUSE: Duration = Duration::from_secs(300);
const STAGE1_PAUSE: Duration = Duration::from_secs(600);

/// Injected so tests don't have to sleep for real minutes.
pub type SleepFn = Box<dyn Fn(Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Injected confirmation prompt for the stage-2 "await human confirm-to-continue" step.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, message: &str) -> bool;
}

pub struct StdinConfirm;

impl ConfirmPrompt for StdinConfirm {
    fn confirm(&self, message: &str) -> bool {
        use std::io::Write;
        print!("{message} [Y/n] ");
        let _ = std::io::stdout().flush();
        let mut input = String::new();
        if std::io::stdin().read_line(&mut input).is_err() {
            return false;
        }
        let trimmed = input.trim().to_ascii_lowercase();
        trimmed.is_empty() || trimmed == "y" || trimmed == "yes"
    }
}

pub struct TimeoutEscalator {
    stage: u8,
    consecutive_timeouts: u32,
    sleep: SleepFn,
}

impl TimeoutEscalator {
    pub fn new(sleep: SleepFn) -> Self {
        Self {
            stage: 0,
            consecutive_timeouts: 0,
            sleep,
        }
    }

    pub fn stage(&self) -> u8 {
        self.stage
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.consecutive_timeouts
    }

    /// Resets the failure streak; call on any non-timeout response.
    pub fn observe_response(&mut self) {
        self.consecutive_timeouts = 0;
    }

    /// Call on every timed-out attempt. Escalates when the threshold is hit.
    pub async fn observe_timeout(
        &mut self,
        notifier: &dyn Notifier,
        webhook: Option<&str>,
        host: &str,
        confirm: &dyn ConfirmPrompt,
    ) {
        self.consecutive_timeouts += 1;
        if self.consecutive_timeouts != THRESHOLD {
            return;
        }

        match self.stage {
            0 => {
                if let Some(hook) = webhook {
                    if let Err(err) = notifier
                        .send(hook, NotifyEvent::TimeoutWarning, host, None)
                        .await
                    {
                        tracing::warn!(error = %err, "failed to send TIMEOUT_WARNING notification");
                    }
                }
                (self.sleep)(STAGE0_PAUSE).await;
                self.stage = 1;
            }
            1 => {
                (self.sleep)(STAGE1_PAUSE).await;
                self.stage = 2;
            }
            2 => {
                if let Some(hook) = webhook {
                    if let Err(err) = notifier
                        .send(hook, NotifyEvent::TimeoutStopped, host, None)
                        .await
                    {
                        tracing::warn!(error = %err, "failed to send TIMEOUT_STOPPED notification");
                    }
                }
                confirm.confirm("Repeated timeouts detected. Continue spraying?");
                self.stage = 0;
            }
            _ => unreachable!("stage is always 0, 1, or 2"),
        }
        self.consecutive_timeouts = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::MemoryNotifier;

    fn noop_sleep() -> SleepFn {
        Box::new(|_| Box::pin(async {}))
    }

    struct AlwaysYes;
    impl ConfirmPrompt for AlwaysYes {
        fn confirm(&self, _message: &str) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn full_escalation_cycle_follows_0_1_2_0() {
        let notifier = MemoryNotifier::default();
        let confirm = AlwaysYes;
        let mut esc = TimeoutEscalator::new(noop_sleep());

        for _ in 0..5 {
            esc.observe_timeout(&notifier, Some("hook"), "host", &confirm)
                .await;
        }
        assert_eq!(esc.stage(), 1);
        assert_eq!(esc.consecutive_timeouts(), 0);

        for _ in 0..5 {
            esc.observe_timeout(&notifier, Some("hook"), "host", &confirm)
                .await;
        }
        assert_eq!(esc.stage(), 2);
        assert_eq!(esc.consecutive_timeouts(), 0);

        for _ in 0..5 {
            esc.observe_timeout(&notifier, Some("hook"), "host", &confirm)
                .await;
        }
        assert_eq!(esc.stage(), 0);
        assert_eq!(esc.consecutive_timeouts(), 0);

        let events: Vec<_> = notifier.events().into_iter().collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], NotifyEvent::TimeoutWarning);
        assert_eq!(events[1], NotifyEvent::TimeoutStopped);
    }

    #[tokio::test]
    async fn non_timeout_response_resets_counter() {
        let notifier = MemoryNotifier::default();
        let confirm = AlwaysYes;
        let mut esc = TimeoutEscalator::new(noop_sleep());

        for _ in 0..4 {
            esc.observe_timeout(&notifier, Some("hook"), "host", &confirm)
                .await;
        }
        assert_eq!(esc.consecutive_timeouts(), 4);
        esc.observe_response();
        assert_eq!(esc.consecutive_timeouts(), 0);
        assert_eq!(esc.stage(), 0);
    }

}
