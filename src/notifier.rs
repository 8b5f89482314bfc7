//! Side-channel lifecycle notifications (Slack/Teams/Discord webhooks).

use async_trait::async_trait;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookService {
    Slack,
    Teams,
    Discord,
}

impl FromStr for HookService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "slack" => Ok(HookService::Slack),
            "teams" => Ok(HookService::Teams),
            "discord" => Ok(HookService::Discord),
            other => Err(format!("unknown notification service '{other}'")),
        }
    }
}

impl fmt::Display for HookService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HookService::Slack => "Slack",
            HookService::Teams => "Teams",
            HookService::Discord => "Discord",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotifyEvent {
    CredsFound,
    SprayWaiting,
    SprayComplete,
    TimeoutWarning,
    TimeoutStopped,
}

fn default_message(event: NotifyEvent, host: &str) -> String {
    match event {
        NotifyEvent::CredsFound => format!("Credentials guessed for host: {host}"),
        NotifyEvent::SprayWaiting => {
            format!("Spray queue empty for {host}. Waiting for new users/passwords.")
        }
        NotifyEvent::SprayComplete => format!("Spray complete for {host}. Exiting."),
        NotifyEvent::TimeoutWarning => format!("5 consecutive timeouts on {host}. Backing off."),
        NotifyEvent::TimeoutStopped => {
            format!("Repeated timeouts on {host}. Spray paused, awaiting confirmation.")
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        webhook: &str,
        event: NotifyEvent,
        host: &str,
        message: Option<&str>,
    ) -> eyre::Result<()>;
}

#[derive(Serialize)]
struct SlackPayload<'a> {
    text: &'a str,
}

#[derive(Serialize)]
struct DiscordPayload<'a> {
    content: &'a str,
}

#[derive(Serialize)]
struct TeamsPayload<'a> {
    text: &'a str,
}

/// Posts a JSON payload shaped for the configured service.
pub struct WebhookNotifier {
    client: reqwest::Client,
    service: HookService,
}

impl WebhookNotifier {
    pub fn new(service: HookService) -> Self {
        Self {
            client: reqwest::Client::new(),
            service,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(
        &self,
        webhook: &str,
        event: NotifyEvent,
        host: &str,
        message: Option<&str>,
    ) -> eyre::Result<()> {
        let text = message
            .map(str::to_string)
            .unwrap_or_else(|| default_message(event, host));

        let response = match self.service {
            HookService::Slack => {
                self.client
                    .post(webhook)
                    .json(&SlackPayload { text: &text })
                    .send()
                    .await?
            }
            HookService::Discord => {
                self.client
                    .post(webhook)
                    .json(&DiscordPayload { content: &text })
                    .send()
                    .await?
            }
            HookService::Teams => {
                self.client
                    .post(webhook)
                    .json(&TeamsPayload { text: &text })
                    .send()
                    .await?
            }
        };

        response.error_for_status()?;
        Ok(())
    }
}

/// In-memory notifier for tests: records every event instead of making network calls.
#[derive(Default)]
pub struct MemoryNotifier {
    sent: Mutex<Vec<NotifyEvent>>,
}

impl MemoryNotifier {
    pub fn events(&self) -> Vec<NotifyEvent> {
        self.sent.lock().expect("lock not poisoned").clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn send(
        &self,
        _webhook: &str,
        event: NotifyEvent,
        _host: &str,
        _message: Option<&str>,
    ) -> eyre::Result<()> {
        self.sent.lock().expect("lock not poisoned").push(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_parses_case_insensitively() {
        assert_eq!("SLACK".parse::<HookService>().unwrap(), HookService::Slack);
        assert_eq!(
            "discord".parse::<HookService>().unwrap(),
            HookService::Discord
        );
        assert!("pager".parse::<HookService>().is_err());
    }

    #[tokio::test]
    async fn memory_notifier_records_events_in_order() {
        let n = MemoryNotifier::default();
        n.send("hook", NotifyEvent::SprayWaiting, "host", None)
            .await
            .unwrap();
        n.send("hook", NotifyEvent::CredsFound, "host", None)
            .await
            .unwrap();
        assert_eq!(
            n.events(),
            vec![NotifyEvent::SprayWaiting, NotifyEvent::CredsFound]
        );
    }

    #[test]
    fn default_message_mentions_host() {
        let msg = default_message(NotifyEvent::CredsFound, "example.com");
        assert!(msg.contains("example.com"));
    }
}
