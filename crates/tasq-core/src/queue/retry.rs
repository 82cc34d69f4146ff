//! Retry policy: decides backoff delays and when a task is dead.

use std::time::Duration;

use rand::Rng;

use crate::domain::TaskMessage;

/// What to do with a message after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Put it back in the retry set, due after `delay`.
    Retry { delay: Duration },

    /// Retry budget exhausted.
    Dead,
}

/// Retry policy for failed tasks.
///
/// delay = min(base_delay * multiplier^(attempts - 1), max_delay), plus up to
/// `jitter * delay` of random extra time.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Base delay for the first retry.
    pub base_delay: Duration,

    /// Backoff multiplier for exponential backoff.
    pub multiplier: f64,

    /// Upper bound for a single delay (before jitter).
    pub max_delay: Duration,

    /// Random extra fraction of the delay, in `[0, 1]`. Zero keeps delays
    /// strictly increasing below `max_delay`.
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(2),
            multiplier: 2.0,
            max_delay: Duration::from_secs(24 * 60 * 60),
            jitter: 0.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate delay for the next retry.
    ///
    /// `attempts` is the number of failed attempts so far (1-indexed).
    ///
    /// Example with base_delay=2s, multiplier=2.0:
    /// - attempt 1 (first failure): 2s
    /// - attempt 2: 4s
    /// - attempt 3: 8s
    pub fn next_delay(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(i32::MAX as u32) as i32;
        let raw = self.base_delay.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = raw.min(self.max_delay.as_secs_f64());
        let delay = Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay);

        if self.jitter > 0.0 {
            let extra = rand::thread_rng().gen_range(0.0..=self.jitter);
            Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + extra))
                .unwrap_or(Duration::MAX)
        } else {
            delay
        }
    }

    /// Decide for a message whose failure was already recorded.
    pub fn decide(&self, message: &TaskMessage) -> Decision {
        if message.is_exhausted() {
            Decision::Dead
        } else {
            Decision::Retry {
                delay: self.next_delay(message.retry_count),
            }
        }
    }
}
