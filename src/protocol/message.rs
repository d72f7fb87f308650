//! # Unified update message.
//!
//! The only structure published on a task's update channel:
//! ```text
//! {task_id, message_type: heartbeat|update|result, status, data}
//! ```
//!
//! `result` with a terminal status (`completed`, `error`, `cancelled`) ends the
//! stream for that task.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Task status values carried in updates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Queued,
    Running,
    Progress,
    Completed,
    Error,
    Cancelled,
    /// Any status this crate does not know about.
    #[serde(other)]
    Unknown,
}

impl TaskStatus {
    /// `completed`, `error` and `cancelled` end a task.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Error | TaskStatus::Cancelled
        )
    }

    /// Statuses that prove a worker is executing the task.
    pub fn is_running(self) -> bool {
        matches!(self, TaskStatus::Running | TaskStatus::Progress)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Progress => "progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Error => "error",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminator of an [`UpdateMessage`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    /// Liveness only; never shown to callers.
    Heartbeat,
    /// Intermediate status.
    Update,
    /// Final outcome.
    Result,
}

/// Message published by workers (or synthesized by the watchdog).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub task_id: String,
    pub message_type: MessageType,
    pub status: TaskStatus,
    #[serde(default)]
    pub data: Value,
}

impl UpdateMessage {
    pub fn heartbeat(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            message_type: MessageType::Heartbeat,
            status,
            data: Value::Null,
        }
    }

    pub fn update(task_id: impl Into<String>, status: TaskStatus, data: Value) -> Self {
        Self {
            task_id: task_id.into(),
            message_type: MessageType::Update,
            status,
            data,
        }
    }

    pub fn result(task_id: impl Into<String>, status: TaskStatus, data: Value) -> Self {
        Self {
            task_id: task_id.into(),
            message_type: MessageType::Result,
            status,
            data,
        }
    }

    /// Terminal error synthesized by the watchdog rather than a worker.
    pub fn watchdog_failure(
        task_id: impl Into<String>,
        reason: &str,
        failure_reason: &str,
        retry_count: u32,
    ) -> Self {
        Self::result(
            task_id,
            TaskStatus::Error,
            json!({
                "error": reason,
                "failure_type": "watchdog_failure",
                "failure_reason": failure_reason,
                "retry_count": retry_count,
            }),
        )
    }

    /// Decodes a message from channel bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Encodes the message for publishing.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// True for a `result` carrying a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.message_type == MessageType::Result && self.status.is_terminal()
    }

    /// Text of `data.error`, if present.
    ///
    /// Non-string error values are rendered as JSON.
    pub fn error_text(&self) -> Option<String> {
        match self.data.get("error")? {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worker_result() {
        let raw = br#"{"task_id":"t","message_type":"result","status":"completed","data":{"x":1}}"#;
        let msg = UpdateMessage::from_slice(raw).unwrap();
        assert!(msg.is_terminal());
        assert_eq!(msg.data, json!({"x": 1}));
        assert_eq!(msg.error_text(), None);
    }

    #[test]
    fn unknown_status_is_tolerated() {
        let raw = br#"{"task_id":"t","message_type":"update","status":"paused"}"#;
        let msg = UpdateMessage::from_slice(raw).unwrap();
        assert_eq!(msg.status, TaskStatus::Unknown);
        assert_eq!(msg.data, Value::Null);
        assert!(!msg.is_terminal());
    }

    #[test]
    fn terminal_status_on_update_is_not_terminal() {
        let msg = UpdateMessage::update("t", TaskStatus::Completed, Value::Null);
        assert!(!msg.is_terminal());
    }

    #[test]
    fn error_text_renders_structured_errors() {
        let msg = UpdateMessage::result("t", TaskStatus::Error, json!({"error": {"code": 7}}));
        assert_eq!(msg.error_text().as_deref(), Some(r#"{"code":7}"#));
    }

    #[test]
    fn watchdog_failure_is_tagged() {
        let msg = UpdateMessage::watchdog_failure("t", "max retries (1) exceeded", "attempt_worker_dead", 1);
        assert!(msg.is_terminal());
        assert_eq!(msg.data["failure_type"], "watchdog_failure");
        assert_eq!(msg.error_text().as_deref(), Some("max retries (1) exceeded"));
    }
}
