//! CLI surface and startup validation: an explicit parse-then-validate pass
//! producing an immutable [`SprayConfig`] the orchestrator consumes. No
//! global mutable configuration singleton.

use crate::notifier::HookService;
use crate::pacing::Pacing;
use crate::time::parse_time;
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "PascalCase")]
pub enum Module {
    Adfs,
    Ntlm,
    Smb,
    Office365,
}

/// Mutually exclusive batching modes: either the spray runs to completion
/// uninterrupted, or it pauses for `period` after every `attempts`-per-user batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Batching {
    Unbounded,
    Interval { attempts: u64, period: Duration },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("failed to read usernames from {0}: {1}")]
    UsernamesUnreadable(String, String),
    #[error("hostname (-H) is required for all modules except Office365")]
    MissingHost,
    #[error("--attempts (-a) and --interval (-i) must be supplied together")]
    AttemptsIntervalMismatch,
    #[error("invalid time value for --{flag}: {reason}")]
    BadTime { flag: String, reason: String },
    #[error("--delay and --jitter are mutually exclusive; use one or the other")]
    DelayJitterConflict,
    #[error("--jitter-min requires --jitter to be set")]
    JitterMinWithoutJitter,
    #[error("--jitter ({jitter}) must be greater than or equal to --jitter-min ({jitter_min})")]
    JitterMinExceedsJitter { jitter: String, jitter_min: String },
    #[error("--path must be set to use the NTLM authentication module")]
    MissingNtlmPath,
    #[error("--notify requires --webhook to be set")]
    NotifyWithoutWebhook,
    #[error("--skip-guessed requires --analyze to detect successful logins")]
    SkipGuessedWithoutAnalyze,
    #[error("resume file not found: {0}")]
    ResumeFileMissing(String),
    #[error("unknown notification service: {0}")]
    UnknownNotifyService(String),
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "credspray",
    version,
    about = "Low and slow password spraying"
)]
pub struct Args {
    /// Filepath of the usernames list
    #[arg(short = 'u', long)]
    pub usernames: PathBuf,

    /// Single password to spray, or filepath of the passwords list
    #[arg(short = 'p', long)]
    pub passwords: String,

    /// Host to password spray (ip or hostname). Ignored for Office365.
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Module corresponding to target host
    #[arg(short = 'm', long, value_enum)]
    pub module: Module,

    /// NTLM authentication endpoint (e.g. rpc or ews)
    #[arg(long)]
    pub path: Option<String>,

    /// Name and path of result output file
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Don't log each attempt to the console
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Number of login submissions per interval (for each user)
    #[arg(short = 'a', long)]
    pub attempts: Option<u64>,

    /// Time between login intervals (e.g. 30m, 1h). Default unit: minutes.
    #[arg(short = 'i', long)]
    pub interval: Option<String>,

    /// Attempt password == username for every user first
    #[arg(short = 'e', long)]
    pub equal: bool,

    /// Web request timeout (e.g. 5s, 10s). Default unit: seconds.
    #[arg(short = 't', long, default_value = "5")]
    pub timeout: String,

    /// Port to connect to on the target host
    #[arg(short = 'P', long, default_value_t = 443)]
    pub port: u16,

    /// URL of desired fireprox interface
    #[arg(short = 'f', long)]
    pub fireprox: Option<String>,

    /// Prepend DOMAIN\ to usernames (HTTP) or supply the SMB connection domain
    #[arg(short = 'd', long)]
    pub domain: Option<String>,

    /// Run the results analyzer after each interval
    #[arg(short = 'A', long)]
    pub analyze: bool,

    /// Max jitter between requests (e.g. 5s, 1m). Default unit: seconds.
    #[arg(short = 'j', long)]
    pub jitter: Option<String>,

    /// Min jitter between requests. Default unit: seconds.
    #[arg(long = "jitter-min", visible_alias = "jm")]
    pub jitter_min: Option<String>,

    /// Enable notifications for Slack, Teams or Discord
    #[arg(short = 'n', long)]
    pub notify: Option<String>,

    /// Webhook used for the specified notification service
    #[arg(short = 'w', long)]
    pub webhook: Option<String>,

    /// Pause between intervals if a new potentially successful login was found
    #[arg(long)]
    pub pause: bool,

    /// Use HTTP instead of HTTPS
    #[arg(long = "no-ssl")]
    pub no_ssl: bool,

    /// Exit when the spray completes instead of waiting for new users/passwords
    #[arg(long = "no-wait")]
    pub no_wait: bool,

    /// Max wait time for new users/passwords (e.g. 1h). Default unit: minutes.
    #[arg(long = "poll-timeout")]
    pub poll_timeout: Option<String>,

    /// Resume from a previous output file
    #[arg(short = 'r', long)]
    pub resume: Option<PathBuf>,

    /// Exclude guessed users from all subsequent attempts (requires --analyze)
    #[arg(short = 's', long = "skip-guessed")]
    pub skip_guessed: bool,

    /// Fixed delay between requests (e.g. 2s, 1m). Default unit: seconds.
    #[arg(short = 'D', long)]
    pub delay: Option<String>,

    /// Enable debug logging (overrides --quiet)
    #[arg(long)]
    pub debug: bool,
}

/// Immutable, validated engine configuration. Built once at startup.
#[derive(Debug, Clone)]
pub struct SprayConfig {
    pub user_list: Vec<String>,
    pub user_file: Option<PathBuf>,
    pub password_list: Vec<String>,
    pub password_file: Option<PathBuf>,
    pub host: String,
    pub module: Module,
    pub ntlm_path: Option<String>,
    pub output: PathBuf,
    pub batching: Batching,
    pub equal: bool,
    pub timeout: Duration,
    pub port: u16,
    pub fireprox: Option<String>,
    pub domain: Option<String>,
    pub analyze: bool,
    pub pacing: Pacing,
    pub notify: Option<HookService>,
    pub webhook: Option<String>,
    pub pause: bool,
    pub no_ssl: bool,
    pub quiet: bool,
    pub debug: bool,
    pub no_wait: bool,
    pub poll_timeout: Option<Duration>,
    pub resume: Option<PathBuf>,
    pub skip_guessed: bool,
}

impl SprayConfig {
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let user_list = read_lines(&args.usernames).map_err(|e| {
            ConfigError::UsernamesUnreadable(args.usernames.display().to_string(), e.to_string())
        })?;

        let (password_list, password_file) = if Path::new(&args.passwords).exists() {
            let list = read_lines(Path::new(&args.passwords)).map_err(|e| {
                ConfigError::UsernamesUnreadable(args.passwords.clone(), e.to_string())
            })?;
            (list, Some(PathBuf::from(&args.passwords)))
        } else {
            (vec![args.passwords.clone()], None)
        };

        let host = match (&args.module, &args.host) {
            (Module::Office365, None) => "Office365".to_string(),
            (Module::Office365, Some(h)) => h.clone(),
            (_, Some(h)) => h.clone(),
            (_, None) => return Err(ConfigError::MissingHost),
        };

        if args.attempts.is_some() != args.interval.is_some() {
            return Err(ConfigError::AttemptsIntervalMismatch);
        }

        let timeout = parse_time(&args.timeout, "s")
            .map_err(|e| bad_time("timeout", e))?;
        let interval = args
            .interval
            .as_deref()
            .map(|v| parse_time(v, "m").map_err(|e| bad_time("interval", e)))
            .transpose()?;
        let poll_timeout = args
            .poll_timeout
            .as_deref()
            .map(|v| parse_time(v, "m").map_err(|e| bad_time("poll-timeout", e)))
            .transpose()?;
        let jitter = args
            .jitter
            .as_deref()
            .map(|v| parse_time(v, "s").map_err(|e| bad_time("jitter", e)))
            .transpose()?;
        let jitter_min = match args.jitter_min.as_deref() {
            Some(v) => parse_time(v, "s").map_err(|e| bad_time("jitter-min", e))?,
            None => Duration::ZERO,
        };
        let delay = args
            .delay
            .as_deref()
            .map(|v| parse_time(v, "s").map_err(|e| bad_time("delay", e)))
            .transpose()?;

        let pacing = match (delay, jitter) {
            (Some(_), Some(_)) => return Err(ConfigError::DelayJitterConflict),
            (Some(d), None) => Pacing::Fixed(d),
            (None, Some(j)) => {
                if jitter_min > j {
                    return Err(ConfigError::JitterMinExceedsJitter {
                        jitter: args.jitter.clone().unwrap_or_default(),
                        jitter_min: args.jitter_min.clone().unwrap_or_default(),
                    });
                }
                Pacing::Jitter { min: jitter_min, max: j }
            }
            (None, None) => {
                if args.jitter_min.is_some() {
                    return Err(ConfigError::JitterMinWithoutJitter);
                }
                Pacing::None
            }
        };

        if args.module == Module::Ntlm && args.path.is_none() {
            return Err(ConfigError::MissingNtlmPath);
        }

        if args.notify.is_some() && args.webhook.is_none() {
            return Err(ConfigError::NotifyWithoutWebhook);
        }

        if args.skip_guessed && !args.analyze {
            return Err(ConfigError::SkipGuessedWithoutAnalyze);
        }

        if let Some(resume) = &args.resume {
            if !resume.exists() {
                return Err(ConfigError::ResumeFileMissing(resume.display().to_string()));
            }
        }

        if args.pause && !(args.analyze && args.interval.is_some()) {
            tracing::warn!("--pause only takes effect when --analyze and --interval are set");
        }

        if args.module == Module::Smb
            && (args.timeout != "5" || args.fireprox.is_some() || args.port != 443)
        {
            tracing::warn!(
                "fireprox (-f), port (-P) and timeout (-t) are incompatible with SMB spraying"
            );
        }

        let notify = args
            .notify
            .as_deref()
            .map(str::parse::<HookService>)
            .transpose()
            .map_err(ConfigError::UnknownNotifyService)?;

        let batching = match (args.attempts, interval) {
            (Some(attempts), Some(period)) => Batching::Interval { attempts, period },
            _ => Batching::Unbounded,
        };

        let output = args.output.unwrap_or_else(|| {
            PathBuf::from(format!("{}-{:?}.log", host.replace(':', "_"), args.module))
        });

        Ok(SprayConfig {
            user_list,
            user_file: Some(args.usernames),
            password_list,
            password_file,
            host,
            module: args.module,
            ntlm_path: args.path,
            output,
            batching,
            equal: args.equal,
            timeout,
            port: args.port,
            fireprox: args.fireprox,
            domain: args.domain,
            analyze: args.analyze,
            pacing,
            notify,
            webhook: args.webhook,
            pause: args.pause,
            no_ssl: args.no_ssl,
            quiet: args.quiet,
            debug: args.debug,
            no_wait: args.no_wait,
            poll_timeout,
            resume: args.resume,
            skip_guessed: args.skip_guessed,
        })
    }
}

fn bad_time(flag: &str, err: crate::time::TimeParseError) -> ConfigError {
    ConfigError::BadTime {
        flag: flag.to_string(),
        reason: err.to_string(),
    }
}

fn read_lines(path: &Path) -> std::io::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}
