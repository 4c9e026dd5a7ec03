//! Settings read from the environment once at startup.
//!
//! Retry knobs are layered: built-in defaults, then `RETRY_*`, then
//! `RETRY_<SERVICE>_*` for each external service.

use anyhow::{Context, Result};
use log::debug;
use std::str::FromStr;
use std::time::Duration;

use crate::retry::{Jitter, RetryConfig, seconds};
use crate::runtime::Runtime;

pub const RETRY_ENABLED_VAR: &str = "TUBULAR_RETRY_ENABLED";
const GLOBAL_PREFIX: &str = "RETRY_";

/// GitHub wrappers historically allowed seven tries with up to a second of jitter.
const GITHUB_MAX_ATTEMPTS: u32 = 7;
const GITHUB_JITTER: Duration = Duration::from_secs(1);

const DEFAULT_POLL_TRIES: u32 = 5;
const DEFAULT_POLL_INTERVAL_SECS: f64 = 10.0;
const DEFAULT_REQUESTS_TIMEOUT_SECS: f64 = 10.0;
const DEFAULT_WAIT_SLEEP_SECS: f64 = 5.0;
// Asgard gives up on ASG creation after 25 minutes.
const DEFAULT_NEW_ASG_TIMEOUT_SECS: f64 = 1560.0;

/// External services with their own retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Asgard,
    GitHub,
}

impl Service {
    pub fn env_prefix(self) -> &'static str {
        match self {
            Service::Asgard => "RETRY_ASGARD_",
            Service::GitHub => "RETRY_GITHUB_",
        }
    }

    fn builtin(self, global: &RetryConfig, overridden: &Overrides) -> RetryConfig {
        match self {
            Service::Asgard => global.clone(),
            Service::GitHub => RetryConfig {
                max_attempts: if overridden.max_attempts {
                    global.max_attempts
                } else {
                    GITHUB_MAX_ATTEMPTS
                },
                jitter: if overridden.jitter {
                    global.jitter
                } else {
                    Jitter::Additive(GITHUB_JITTER)
                },
                ..global.clone()
            },
        }
    }
}

/// Which knobs the global layer set explicitly.
#[derive(Debug, Default)]
struct Overrides {
    max_attempts: bool,
    jitter: bool,
}

/// Per-service retry configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrySettings {
    pub global: RetryConfig,
    pub asgard: RetryConfig,
    pub github: RetryConfig,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let global = RetryConfig::default();
        let overrides = Overrides::default();
        Self {
            asgard: Service::Asgard.builtin(&global, &overrides),
            github: Service::GitHub.builtin(&global, &overrides),
            global,
        }
    }
}

impl RetrySettings {
    pub fn load<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let (global, overrides) = apply_env(runtime, GLOBAL_PREFIX, RetryConfig::default())?;

        let service_config = |service: Service| -> Result<RetryConfig> {
            let base = service.builtin(&global, &overrides);
            Ok(apply_env(runtime, service.env_prefix(), base)?.0)
        };

        let mut settings = Self {
            asgard: service_config(Service::Asgard)?,
            github: service_config(Service::GitHub)?,
            global,
        };

        if !retry_enabled(runtime) {
            debug!("{} is false, every call gets a single attempt", RETRY_ENABLED_VAR);
            for config in [
                &mut settings.global,
                &mut settings.asgard,
                &mut settings.github,
            ] {
                config.max_attempts = 1;
            }
        }

        Ok(settings)
    }

    pub fn for_service(&self, service: Service) -> &RetryConfig {
        match service {
            Service::Asgard => &self.asgard,
            Service::GitHub => &self.github,
        }
    }
}

/// Status polling cadence for pull request checks.
#[derive(Debug, Clone, PartialEq)]
pub struct PollSettings {
    pub max_tries: u32,
    pub interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_POLL_TRIES,
            interval: Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_SECS),
        }
    }
}

impl PollSettings {
    pub fn load<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let mut settings = Self::default();
        if let Some(tries) = read_var::<u32, _>(runtime, "MAX_PR_TEST_POLL_TRIES")? {
            settings.max_tries = tries;
        }
        if let Some(interval) = read_seconds(runtime, "PR_TEST_POLL_INTERVAL")? {
            settings.interval = interval;
        }
        let config = settings.retry_config();
        config
            .validate()
            .context("Invalid pull request poll settings")?;
        Ok(settings)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::constant(self.max_tries, self.interval)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AsgardSettings {
    /// Base URL including the region path, e.g. `http://asgard:8091/us-east-1`.
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub request_timeout: Duration,
    pub task_poll_interval: Duration,
    pub new_asg_timeout: Duration,
    /// Settle time between enabling new ASGs and disabling the old ones.
    pub disable_old_asg_wait: Duration,
}

impl Default for AsgardSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            request_timeout: Duration::from_secs_f64(DEFAULT_REQUESTS_TIMEOUT_SECS),
            task_poll_interval: Duration::from_secs_f64(DEFAULT_WAIT_SLEEP_SECS),
            new_asg_timeout: Duration::from_secs_f64(DEFAULT_NEW_ASG_TIMEOUT_SECS),
            disable_old_asg_wait: Duration::ZERO,
        }
    }
}

impl AsgardSettings {
    pub fn load<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            endpoint: read_string(runtime, "ASGARD_API_ENDPOINTS"),
            token: read_string(runtime, "ASGARD_API_TOKEN"),
            request_timeout: read_seconds(runtime, "REQUESTS_TIMEOUT")?
                .unwrap_or(defaults.request_timeout),
            task_poll_interval: read_seconds(runtime, "WAIT_SLEEP_TIME")?
                .unwrap_or(defaults.task_poll_interval),
            new_asg_timeout: read_seconds(runtime, "ASGARD_NEW_ASG_CREATION_TIMEOUT")?
                .unwrap_or(defaults.new_asg_timeout),
            disable_old_asg_wait: read_seconds(runtime, "DISABLE_OLD_ASG_WAIT_TIME")?
                .unwrap_or(defaults.disable_old_asg_wait),
        })
    }
}

/// Everything the commands need from the environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Settings {
    pub retry: RetrySettings,
    pub poll: PollSettings,
    pub asgard: AsgardSettings,
    pub github_token: Option<String>,
}

impl Settings {
    pub fn load<R: Runtime + ?Sized>(runtime: &R) -> Result<Self> {
        Ok(Self {
            retry: RetrySettings::load(runtime)?,
            poll: PollSettings::load(runtime)?,
            asgard: AsgardSettings::load(runtime)?,
            github_token: read_string(runtime, "GITHUB_TOKEN"),
        })
    }
}

fn retry_enabled<R: Runtime + ?Sized>(runtime: &R) -> bool {
    read_string(runtime, RETRY_ENABLED_VAR)
        .map(|value| !value.eq_ignore_ascii_case("false"))
        .unwrap_or(true)
}

fn apply_env<R: Runtime + ?Sized>(
    runtime: &R,
    prefix: &str,
    mut config: RetryConfig,
) -> Result<(RetryConfig, Overrides)> {
    let mut overrides = Overrides::default();
    let key = |knob: &str| format!("{}{}", prefix, knob);

    if let Some(attempts) = read_var::<u32, _>(runtime, &key("MAX_ATTEMPTS"))? {
        config.max_attempts = attempts;
        overrides.max_attempts = true;
    }
    if let Some(delay) = read_seconds(runtime, &key("DELAY_SECONDS"))? {
        config.base_delay = delay;
    }
    if let Some(max_total) = read_seconds(runtime, &key("MAX_TIME_SECONDS"))? {
        config.max_total = Some(max_total);
    }
    if let Some(factor) = read_var::<f64, _>(runtime, &key("BACKOFF_FACTOR"))? {
        config.backoff_factor = factor;
    }
    if let Some(max_delay) = read_seconds(runtime, &key("MAX_DELAY_SECONDS"))? {
        config.max_delay = Some(max_delay);
    }
    if let Some(jitter) = read_seconds(runtime, &key("JITTER_SECONDS"))? {
        config.jitter = if jitter.is_zero() {
            Jitter::None
        } else {
            Jitter::Additive(jitter)
        };
        overrides.jitter = true;
    }

    config
        .validate()
        .with_context(|| format!("Invalid retry settings from {}* variables", prefix))?;

    Ok((config, overrides))
}

/// Unset and blank variables both count as absent.
fn read_string<R: Runtime + ?Sized>(runtime: &R, key: &str) -> Option<String> {
    runtime
        .env_var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_var<T, R>(runtime: &R, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    R: Runtime + ?Sized,
{
    read_string(runtime, key)
        .map(|value| {
            value
                .parse::<T>()
                .with_context(|| format!("Invalid value {:?} for {}", value, key))
        })
        .transpose()
}

fn read_seconds<R: Runtime + ?Sized>(runtime: &R, key: &str) -> Result<Option<Duration>> {
    read_var::<f64, _>(runtime, key)?
        .map(|value| seconds("seconds", value).with_context(|| format!("Invalid value for {}", key)))
        .transpose()
}
