//! C8 Orchestrator: owns engine state and drives the main spray loop.
//!
//! Single task, never spawns concurrent attempts — attempts are issued one
//! at a time, in password-major order, exactly as the pacing gate release
//! them.

use crate::adapter::TargetAdapter;
use crate::analyzer::Analyzer;
use crate::attempt_log::AttemptLog;
use crate::config::{Batching, SprayConfig};
use crate::escalator::{ConfirmPrompt, TimeoutEscalator};
use crate::notifier::{NotifyEvent, Notifier};
use crate::pacing::PacingGate;
use crate::watcher::FileWatcher;
use std::collections::{HashSet, VecDeque};

/// A single (username, password) unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub username: String,
    pub password: String,
}

/// Outcome of a single attempt, as seen by the loop that drives the queue.
enum AttemptStatus {
    Completed { timed_out: bool },
    Failed,
}

/// Outcome of [`Orchestrator::run_attempt_with_cancellation`].
enum LoopSignal {
    Interrupted,
    Attempted(AttemptStatus),
}

/// Builds the password-major work queue: every user attempted with password[0]
/// before any user is attempted with password[1], skipping `completed` pairs
/// and, if `skip_guessed` is active, any username in `guessed`. `users` is
/// expected to already carry the domain prefix, since that's what the
/// Completed Set and Guessed Users are keyed on (both derived from the
/// attempt log, which records the username as attempted).
fn materialize_queue(
    users: &[String],
    passwords: &[String],
    completed: &HashSet<(String, String)>,
    guessed: &HashSet<String>,
    skip_guessed: bool,
) -> VecDeque<WorkItem> {
    let mut queue = VecDeque::with_capacity(users.len() * passwords.len());
    for password in passwords {
        for user in users {
            if skip_guessed && guessed.contains(user) {
                continue;
            }
            let key = (user.clone(), password.clone());
            if completed.contains(&key) {
                continue;
            }
            queue.push_back(WorkItem {
                username: user.clone(),
                password: password.clone(),
            });
        }
    }
    queue
}

/// Prepends `DOMAIN\` to a username when a domain is configured, applied
/// uniformly to every attempted/logged username.
fn domain_prefixed_one(domain: Option<&str>, username: &str) -> String {
    match domain {
        Some(d) if !d.is_empty() => format!("{d}\\{username}"),
        _ => username.to_string(),
    }
}

/// Maps [`domain_prefixed_one`] over a full username list.
fn with_domain_prefix(domain: Option<&str>, users: &[String]) -> Vec<String> {
    users.iter().map(|u| domain_prefixed_one(domain, u)).collect()
}

/// Strips a trailing `@domain` UPN suffix from a bare username. Used only by
/// the equal-password pre-pass to derive the guessed password from a
/// UPN-style name; unrelated to the `DOMAIN\` prefix applied above.
fn local_part(username: &str) -> &str {
    username.split('@').next().unwrap_or(username)
}

pub struct Orchestrator {
    config: SprayConfig,
    adapter: Box<dyn TargetAdapter>,
    log: AttemptLog,
    notifier: Box<dyn Notifier>,
    escalator: TimeoutEscalator,
    confirm: Box<dyn ConfirmPrompt>,
    user_watcher: FileWatcher,
    password_watcher: FileWatcher,
}

impl Orchestrator {
    pub fn new(
        config: SprayConfig,
        adapter: Box<dyn TargetAdapter>,
        notifier: Box<dyn Notifier>,
        escalator: TimeoutEscalator,
        confirm: Box<dyn ConfirmPrompt>,
    ) -> Self {
        let log = AttemptLog::new(config.output.clone());
        Self {
            config,
            adapter,
            log,
            notifier,
            escalator,
            confirm,
            user_watcher: FileWatcher::new(),
            password_watcher: FileWatcher::new(),
        }
    }

    async fn notify(&self, event: NotifyEvent) {
        let Some(webhook) = self.config.webhook.as_deref() else {
            return;
        };
        if let Err(err) = self.notifier.send(webhook, event, &self.config.host, None).await {
            tracing::warn!(error = %err, ?event, "notification failed");
        }
    }

    /// Runs one credential attempt end to end: pacing wait, login, logging,
    /// tracing, and escalator feedback. A login error is caught and logged
    /// rather than aborting the spray; the pair is left out of the completed
    /// set so it can be retried on a future run.
    async fn run_one(&mut self, pacing: &PacingGate, item: &WorkItem) -> AttemptStatus {
        pacing.wait().await;

        let outcome = match self.adapter.login(&item.username, &item.password).await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, user = %item.username, "adapter login failed; skipping pair");
                return AttemptStatus::Failed;
            }
        };

        if let Err(err) = self.log.append(outcome.record()) {
            tracing::warn!(error = %err, "failed to append attempt log entry");
        }

        if !self.config.quiet {
            self.adapter.print_response(&outcome);
        }

        if outcome.is_timeout() {
            self.escalator
                .observe_timeout(
                    self.notifier.as_ref(),
                    self.config.webhook.as_deref(),
                    &self.config.host,
                    self.confirm.as_ref(),
                )
                .await;
            AttemptStatus::Completed { timed_out: true }
        } else {
            self.escalator.observe_response();
            AttemptStatus::Completed { timed_out: false }
        }
    }

    /// Runs the analyzer over the full log so far, notifying on newly found
    /// credentials. Returns the updated set of guessed usernames.
    async fn analyze_and_notify(&self, previous_hit_count: &mut usize) -> eyre::Result<HashSet<String>> {
        let records = self.log.scan()?;
        let result = Analyzer::analyze(&records, *previous_hit_count);
        *previous_hit_count = result.hit_count;
        if result.creds_found {
            self.notify(NotifyEvent::CredsFound).await;
        }
        Ok(result.hits)
    }

    pub async fn run(mut self) -> eyre::Result<()> {
        let completed = self.log.derive_completed()?;
        let mut guessed: HashSet<String> = HashSet::new();
        let mut previous_hit_count = 0usize;

        if self.config.analyze && !completed.is_empty() {
            guessed = self.analyze_and_notify(&mut previous_hit_count).await?;
        }

        let pacing = PacingGate::new(self.config.pacing);
        self.adapter.print_headers();

        let mut users = self.config.user_list.clone();
        let mut passwords = self.config.password_list.clone();
        let mut completed = completed;
        let domain = self.config.domain.clone();

        // Equal-password pre-pass: try password == local_part(username) for
        // every user before starting the configured password list. The
        // attempted/logged username still carries the domain prefix; only the
        // guessed password is derived from the bare name.
        if self.config.equal {
            let equal_queue: Vec<WorkItem> = users
                .iter()
                .map(|u| WorkItem {
                    username: domain_prefixed_one(domain.as_deref(), u),
                    password: local_part(u).to_string(),
                })
                .filter(|item| !completed.contains(&(item.username.clone(), item.password.clone())))
                .collect();
            for item in &equal_queue {
                match self.run_attempt_with_cancellation(&pacing, item).await {
                    LoopSignal::Interrupted => return Ok(()),
                    LoopSignal::Attempted(AttemptStatus::Completed { .. }) => {
                        completed.insert((item.username.clone(), item.password.clone()));
                    }
                    LoopSignal::Attempted(AttemptStatus::Failed) => {}
                }
            }
        }

        let mut queue = materialize_queue(
            &with_domain_prefix(domain.as_deref(), &users),
            &passwords,
            &completed,
            &guessed,
            self.config.skip_guessed,
        );

        let mut batch_counter: u64 = 0;

        loop {
            while let Some(item) = next_eligible(&mut queue, &guessed, self.config.skip_guessed) {
                let attempted = match self.run_attempt_with_cancellation(&pacing, &item).await {
                    LoopSignal::Interrupted => return Ok(()),
                    LoopSignal::Attempted(AttemptStatus::Completed { .. }) => {
                        completed.insert((item.username.clone(), item.password.clone()));
                        true
                    }
                    LoopSignal::Attempted(AttemptStatus::Failed) => false,
                };

                if attempted {
                    batch_counter += 1;
                    if let Batching::Interval { attempts, period } = self.config.batching {
                        let batch_size = attempts.saturating_mul(users.len() as u64);
                        if batch_counter >= batch_size {
                            let keep_going = self
                                .pause_interval(
                                    &mut users,
                                    &mut passwords,
                                    &mut queue,
                                    &completed,
                                    &mut guessed,
                                    &mut previous_hit_count,
                                    period,
                                )
                                .await?;
                            batch_counter = 0;
                            if !keep_going {
                                return Ok(());
                            }
                        }
                    }
                }
            }

            // Work queue drained. Either exit, or wait for new users/passwords.
            if self.config.analyze {
                guessed = self.analyze_and_notify(&mut previous_hit_count).await?;
            }

            if self.config.no_wait {
                self.notify(NotifyEvent::SprayComplete).await;
                tracing::info!("spray complete");
                return Ok(());
            }

            self.notify(NotifyEvent::SprayWaiting).await;
            tracing::info!("work queue empty; waiting for new users or passwords");

            match self.wait_for_new_material(&mut users, &mut passwords).await? {
                true => {
                    queue = materialize_queue(
                        &with_domain_prefix(domain.as_deref(), &users),
                        &passwords,
                        &completed,
                        &guessed,
                        self.config.skip_guessed,
                    );
                }
                false => {
                    tracing::info!("poll timeout elapsed with no new material; exiting");
                    return Ok(());
                }
            }
        }
    }

    /// Wraps [`Self::run_one`] with a ctrl-c race so a spray in progress can
    /// be cancelled between (never during) individual attempts.
    async fn run_attempt_with_cancellation(
        &mut self,
        pacing: &PacingGate,
        item: &WorkItem,
    ) -> LoopSignal {
        tokio::select! {
            biased;
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted; attempt log is durable, safe to resume");
                LoopSignal::Interrupted
            }
            status = self.run_one(pacing, item) => {
                LoopSignal::Attempted(status)
            }
        }
    }

    /// Runs the interval-pause procedure: analyze, optionally pause for
    /// confirmation if new hits appeared, refresh watched files (rebuilding
    /// the queue if either changed), sleep, and return with state reset for
    /// the next batch. Returns `false` if the user declined to continue past
    /// a pause prompt, in which case the caller must stop spraying.
    async fn pause_interval(
        &mut self,
        users: &mut Vec<String>,
        passwords: &mut Vec<String>,
        queue: &mut VecDeque<WorkItem>,
        completed: &HashSet<(String, String)>,
        guessed: &mut HashSet<String>,
        previous_hit_count: &mut usize,
        period: std::time::Duration,
    ) -> eyre::Result<bool> {
        if self.config.analyze {
            let before = *previous_hit_count;
            *guessed = self.analyze_and_notify(previous_hit_count).await?;
            if self.config.pause && *previous_hit_count > before {
                let keep_going = self
                    .confirm
                    .confirm("New potential credentials found. Continue spraying?");
                if !keep_going {
                    self.notify(NotifyEvent::SprayComplete).await;
                    tracing::info!("spray stopped after new hits; declined to continue");
                    return Ok(false);
                }
            }
        }

        let mut lists_changed = false;
        if let Some(path) = self.config.user_file.clone() {
            if let Some(new_users) = self.user_watcher.refresh(&path) {
                self.config.user_list = new_users.clone();
                *users = new_users;
                lists_changed = true;
            }
        }
        if let Some(path) = &self.config.password_file {
            if let Some(new_passwords) = self.password_watcher.refresh(path) {
                self.config.password_list = new_passwords.clone();
                *passwords = new_passwords;
                lists_changed = true;
            }
        }

        if lists_changed {
            *queue = materialize_queue(
                &with_domain_prefix(self.config.domain.as_deref(), users),
                passwords,
                completed,
                guessed,
                self.config.skip_guessed,
            );
        }

        tracing::info!(seconds = period.as_secs(), "pausing between intervals");
        tokio::time::sleep(period).await;
        Ok(true)
    }

    /// Blocks until the watched files change or `poll_timeout` elapses.
    /// Returns `true` if new material arrived, `false` on timeout (or if no
    /// poll timeout was configured, in which case it waits forever).
    async fn wait_for_new_material(
        &mut self,
        users: &mut Vec<String>,
        passwords: &mut Vec<String>,
    ) -> eyre::Result<bool> {
        let poll_interval = std::time::Duration::from_secs(30);
        let deadline = self.config.poll_timeout.map(|d| tokio::time::Instant::now() + d);

        loop {
            if let Some(path) = &self.config.user_file {
                if let Some(new_users) = self.user_watcher.refresh(path) {
                    *users = new_users;
                    self.config.user_list = users.clone();
                    return Ok(true);
                }
            }
            if let Some(path) = &self.config.password_file {
                if let Some(new_passwords) = self.password_watcher.refresh(path) {
                    *passwords = new_passwords;
                    self.config.password_list = passwords.clone();
                    return Ok(true);
                }
            }

            if let Some(deadline) = deadline {
                if tokio::time::Instant::now() >= deadline {
                    return Ok(false);
                }
            }

            tokio::select! {
                _ = tokio::signal::ctrl_c() => return Ok(false),
                _ = tokio::time::sleep(poll_interval) => {}
            }
        }
    }
}

fn next_eligible(
    queue: &mut VecDeque<WorkItem>,
    guessed: &HashSet<String>,
    skip_guessed: bool,
) -> Option<WorkItem> {
    while let Some(item) = queue.pop_front() {
        if skip_guessed && guessed.contains(&item.username) {
            continue;
        }
        return Some(item);
    }
    None
}
