use serde::{Deserialize, Serialize};

use super::errors::TasqError;

/// Open-ended structured payload: string keys to dynamically typed values.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A unit of work: which kind of work (`type`) plus its arguments.
///
/// Immutable once created. Handlers read the payload through `get` / `get_str`
/// instead of casting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    payload: Payload,
}

impl Task {
    pub fn new(task_type: impl Into<String>, payload: Payload) -> Self {
        Self {
            task_type: task_type.into(),
            payload,
        }
    }

    /// Build from any JSON value; only objects are valid payloads.
    ///
    /// ```ignore
    /// let task = Task::from_value("send_email", json!({ "email": "a@b.com" }))?;
    /// ```
    pub fn from_value(
        task_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Result<Self, TasqError> {
        match payload {
            serde_json::Value::Object(map) => Ok(Self::new(task_type, map)),
            other => Err(TasqError::InvalidPayload(kind_of(&other).to_string())),
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
