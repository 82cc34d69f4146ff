//! TaskMessage - ストアを通過する永続化用の封筒
//!
//! Task に queue 名・id・リトライ管理情報を付けたもの。
//! シリアライズ形式（wire format）は他言語の producer/consumer と共有されるため、
//! フィールド名は固定です。

use serde::{Deserialize, Serialize};

use super::{Payload, Task, TaskId};

/// Retry limit assumed for messages that arrive without one.
pub const DEFAULT_RETRY_LIMIT: u32 = 25;

fn default_retry_limit() -> u32 {
    DEFAULT_RETRY_LIMIT
}

/// Durable envelope for a task.
///
/// Wire format:
/// `{ "id", "queue", "type", "payload", "retry", "retried", "error_msg" }`
///
/// - `retry_count` is the number of attempts already made and failed.
/// - `retry_limit` is the maximum number of attempts.
/// - Only the dispatcher mutates a message, and only after a failed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMessage {
    #[serde(default)]
    pub id: TaskId,

    #[serde(default)]
    pub queue: String,

    #[serde(rename = "type")]
    pub task_type: String,

    #[serde(default)]
    pub payload: Payload,

    #[serde(rename = "retry", default = "default_retry_limit")]
    pub retry_limit: u32,

    #[serde(rename = "retried", default)]
    pub retry_count: u32,

    #[serde(rename = "error_msg", default)]
    pub last_error: String,
}

impl TaskMessage {
    pub fn new(id: TaskId, queue: impl Into<String>, task: Task, retry_limit: u32) -> Self {
        Self {
            id,
            queue: queue.into(),
            task_type: task.task_type().to_string(),
            payload: task.payload().clone(),
            retry_limit,
            retry_count: 0,
            last_error: String::new(),
        }
    }

    /// Reconstruct the immutable task handed to handlers.
    pub fn task(&self) -> Task {
        Task::new(self.task_type.clone(), self.payload.clone())
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Record one failed attempt.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = error.into();
    }

    /// No attempts left?
    pub fn is_exhausted(&self) -> bool {
        self.retry_count >= self.retry_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> TaskMessage {
        let task = Task::from_value("send_email", json!({ "email": "a@b.com" })).unwrap();
        TaskMessage::new(TaskId::new("01J0"), "default", task, 3)
    }

    #[test]
    fn encodes_wire_field_names() {
        let v: serde_json::Value = serde_json::from_str(&sample().encode().unwrap()).unwrap();
        assert_eq!(v["id"], "01J0");
        assert_eq!(v["queue"], "default");
        assert_eq!(v["type"], "send_email");
        assert_eq!(v["payload"]["email"], "a@b.com");
        assert_eq!(v["retry"], 3);
        assert_eq!(v["retried"], 0);
        assert_eq!(v["error_msg"], "");
    }

    #[test]
    fn bare_task_body_decodes_with_defaults() {
        let msg = TaskMessage::decode(r#"{"type":"ping","payload":{"n":1}}"#).unwrap();
        assert!(msg.id.is_empty());
        assert!(msg.queue.is_empty());
        assert_eq!(msg.retry_limit, DEFAULT_RETRY_LIMIT);
        assert_eq!(msg.retry_count, 0);
        assert_eq!(msg.task().get("n"), Some(&json!(1)));
    }

    #[test]
    fn garbage_does_not_decode() {
        assert!(TaskMessage::decode("not json").is_err());
        assert!(TaskMessage::decode(r#"{"payload":{}}"#).is_err());
    }

    #[test]
    fn record_failure_increments_and_keeps_last_error() {
        let mut msg = sample();
        msg.record_failure("first");
        msg.record_failure("second");
        assert_eq!(msg.retry_count, 2);
        assert_eq!(msg.last_error, "second");
        assert!(!msg.is_exhausted());
        msg.record_failure("third");
        assert!(msg.is_exhausted());
    }
}
