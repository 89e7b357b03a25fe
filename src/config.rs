use crate::core::{ControllerError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const ENV_BASE_URL: &str = "CONTROLLER_SYNC_BASE_URL";
pub const ENV_TIMEOUT_SECS: &str = "CONTROLLER_SYNC_TIMEOUT_SECS";
pub const ENV_MAX_RETRIES: &str = "CONTROLLER_SYNC_MAX_RETRIES";
pub const ENV_POLL_INTERVAL_MS: &str = "CONTROLLER_SYNC_POLL_INTERVAL_MS";
pub const ENV_POLL_MAX_CYCLES: &str = "CONTROLLER_SYNC_POLL_MAX_CYCLES";

/// Conflict retry behaviour for updates.
///
/// Both delays grow linearly with the attempt number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts is `max_retries + 1`.
    pub max_retries: u32,
    /// Settle delay before re-reading the revision, multiplied by the attempt.
    #[serde(with = "duration_ms")]
    pub settle_step: Duration,
    /// Back-off before the next attempt, multiplied by the attempt.
    #[serde(with = "duration_ms")]
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            settle_step: Duration::from_millis(100),
            backoff_step: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn settle_delay(&self, attempt: u32) -> Duration {
        self.settle_step.saturating_mul(attempt)
    }

    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }
}

/// Polling cadence for verification jobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollPolicy {
    #[serde(with = "duration_ms")]
    pub interval: Duration,
    pub max_cycles: u32,
    /// Wait before the single re-fetch after a "not found" with no snapshot.
    #[serde(with = "duration_ms")]
    pub not_found_grace: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_cycles: 30,
            not_found_grace: Duration::from_millis(500),
        }
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// REST API root, e.g. `http://localhost:8080/nifi-api`
    pub base_url: String,

    /// Per-request timeout
    #[serde(with = "duration_ms")]
    pub request_timeout: Duration,

    /// Sent with every mutation payload
    pub disconnected_node_acknowledged: bool,

    pub retry: RetryPolicy,

    pub poll: PollPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new("http://localhost:8080/nifi-api")
    }
}

impl ClientConfig {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(30),
            disconnected_node_acknowledged: false,
            retry: RetryPolicy::default(),
            poll: PollPolicy::default(),
        }
    }

    /// Set the REST API root
    pub fn base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Set the request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the maximum number of conflict retries
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry.max_retries = max_retries;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    pub fn disconnected_node_acknowledged(mut self, acknowledged: bool) -> Self {
        self.disconnected_node_acknowledged = acknowledged;
        self
    }

    /// Build a configuration from `CONTROLLER_SYNC_*` environment variables.
    ///
    /// Unset variables keep their defaults; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match lookup(ENV_BASE_URL) {
            Some(url) if !url.trim().is_empty() => Self::new(url.trim()),
            _ => Self::default(),
        };

        if let Some(secs) = parse_var::<u64>(&lookup, ENV_TIMEOUT_SECS)? {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = parse_var::<u32>(&lookup, ENV_MAX_RETRIES)? {
            config.retry.max_retries = retries;
        }
        if let Some(ms) = parse_var::<u64>(&lookup, ENV_POLL_INTERVAL_MS)? {
            config.poll.interval = Duration::from_millis(ms);
        }
        if let Some(cycles) = parse_var::<u32>(&lookup, ENV_POLL_MAX_CYCLES)? {
            if cycles == 0 {
                return Err(ControllerError::Config(format!(
                    "{ENV_POLL_MAX_CYCLES} must be at least 1"
                )));
            }
            config.poll.max_cycles = cycles;
        }

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|err| ControllerError::Config(format!("Invalid {key} '{raw}': {err}")))
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
