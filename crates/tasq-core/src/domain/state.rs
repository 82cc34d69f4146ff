//! Task state machine.

use serde::{Deserialize, Serialize};

/// Where a task message currently lives.
///
/// State transitions:
/// - Scheduled -> Ready (poller promotion)
/// - Ready -> Executing -> Succeeded
/// - Ready -> Executing -> RetryScheduled -> Ready (loop until retry_limit)
/// - Ready -> Executing -> Dead (retry budget exhausted)
///
/// `Executing` is held in a worker slot and is never visible in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the scheduled set for its initial delay.
    Scheduled,

    /// In a ready queue, eligible for dispatch.
    Ready,

    /// Popped by a dispatcher and holding a worker slot.
    Executing,

    /// Waiting in the retry set after a failure.
    RetryScheduled,

    /// Handler returned success.
    Succeeded,

    /// Retry budget exhausted; parked in the dead set.
    Dead,
}

impl TaskState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Dead)
    }
}
