//! Runtime configuration.
//!
//! Loading is the caller's job (CLI flags, env, a JSON file); this module only
//! defines the recognized options, their defaults and validation.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::{DEFAULT_RETRY_LIMIT, TasqError};
use crate::impls::RedisOpt;
use crate::queue::{DEFAULT_PREFIX, RetryPolicy};

/// Upper bound for `pool_size`; one semaphore permit per slot.
pub const MAX_POOL_SIZE: usize = 10_000;

/// Upper bound for `retry.max_delay_ms` (one year), so jittered delays stay representable.
pub const MAX_RETRY_DELAY_MS: u64 = 365 * 24 * 60 * 60 * 1000;

/// Upper bound for `dequeue_timeout_ms` (one hour).
pub const MAX_DEQUEUE_TIMEOUT_MS: u64 = 60 * 60 * 1000;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub redis: RedisOpt,

    /// Namespace for every store key.
    pub key_prefix: String,

    /// Worker pool capacity (max concurrent handlers).
    pub pool_size: usize,

    /// Sleep between poller iterations.
    pub poll_interval_ms: u64,

    /// Bounded wait of the dispatcher's blocking pop; also the worst-case
    /// latency for an idle dispatcher to notice shutdown.
    pub dequeue_timeout_ms: u64,

    /// Retry limit for tasks enqueued without an explicit one.
    pub default_retry_limit: u32,

    pub retry: RetryConfig,

    /// Dead tasks older than this are trimmed whenever a new one is added.
    pub dead_retention_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis: RedisOpt::default(),
            key_prefix: DEFAULT_PREFIX.to_string(),
            pool_size: 10,
            poll_interval_ms: 5_000,
            dequeue_timeout_ms: 5_000,
            default_retry_limit: DEFAULT_RETRY_LIMIT,
            retry: RetryConfig::default(),
            dead_retention_secs: 90 * 24 * 60 * 60,
        }
    }
}

/// Backoff parameters; see [`RetryPolicy`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            multiplier: policy.multiplier,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            jitter: policy.jitter,
        }
    }
}

impl Config {
    pub fn from_json(s: &str) -> Result<Self, TasqError> {
        let config: Config = serde_json::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TasqError> {
        let invalid = |msg: &str| Err(TasqError::InvalidConfig(msg.to_string()));
        if self.pool_size == 0 {
            return invalid("pool_size must be at least 1");
        }
        if self.pool_size > MAX_POOL_SIZE {
            return invalid("pool_size is above MAX_POOL_SIZE");
        }
        if self.poll_interval_ms == 0 {
            return invalid("poll_interval_ms must be positive");
        }
        if self.dequeue_timeout_ms == 0 {
            return invalid("dequeue_timeout_ms must be positive");
        }
        if self.dequeue_timeout_ms > MAX_DEQUEUE_TIMEOUT_MS {
            return invalid("dequeue_timeout_ms is above one hour");
        }
        if self.key_prefix.is_empty() {
            return invalid("key_prefix must not be empty");
        }
        if !(self.retry.multiplier >= 1.0 && self.retry.multiplier.is_finite()) {
            return invalid("retry.multiplier must be a finite number >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.retry.jitter) {
            return invalid("retry.jitter must be within [0, 1]");
        }
        if self.retry.max_delay_ms > MAX_RETRY_DELAY_MS {
            return invalid("retry.max_delay_ms is above one year");
        }
        if self.retry.max_delay_ms < self.retry.base_delay_ms {
            return invalid("retry.max_delay_ms must not be below retry.base_delay_ms");
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn dequeue_timeout(&self) -> Duration {
        Duration::from_millis(self.dequeue_timeout_ms)
    }

    pub fn dead_retention(&self) -> Duration {
        Duration::from_secs(self.dead_retention_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            multiplier: self.retry.multiplier,
            max_delay: Duration::from_millis(self.retry.max_delay_ms),
            jitter: self.retry.jitter,
        }
    }
}
