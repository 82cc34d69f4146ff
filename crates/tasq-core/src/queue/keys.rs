//! Store key naming.

/// Key layout under a prefix:
/// - `<prefix>:queues:<name>` ready queue (list) per queue name
/// - `<prefix>:scheduled` initial-delay promotion set
/// - `<prefix>:retry` failure-backoff promotion set
/// - `<prefix>:dead` exhausted tasks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    queue_prefix: String,
    scheduled: String,
    retry: String,
    dead: String,
}

pub const DEFAULT_PREFIX: &str = "tasq";

impl Keys {
    pub fn new(prefix: &str) -> Self {
        Self {
            queue_prefix: format!("{prefix}:queues:"),
            scheduled: format!("{prefix}:scheduled"),
            retry: format!("{prefix}:retry"),
            dead: format!("{prefix}:dead"),
        }
    }

    pub fn queue(&self, name: &str) -> String {
        format!("{}{name}", self.queue_prefix)
    }

    /// Inverse of [`Keys::queue`].
    pub fn queue_name<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.queue_prefix.as_str())
    }

    pub fn scheduled(&self) -> &str {
        &self.scheduled
    }

    pub fn retry(&self) -> &str {
        &self.retry
    }

    pub fn dead(&self) -> &str {
        &self.dead
    }

    /// Both promotion sets, in polling order.
    pub fn promotion_sets(&self) -> [&str; 2] {
        [&self.scheduled, &self.retry]
    }
}

impl Default for Keys {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}
