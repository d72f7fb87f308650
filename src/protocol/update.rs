use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::message::{MessageType, TaskStatus, UpdateMessage};

/// Caller-visible status update delivered through a [`TaskHandle`](crate::TaskHandle).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    pub status: TaskStatus,
    /// Payload of the originating message (`null` when absent).
    pub data: Value,
    /// `data.error` of a result message.
    pub error: Option<String>,
    /// When this process observed the update.
    pub timestamp: DateTime<Utc>,
}

impl TaskUpdate {
    /// Wraps a channel message, stamping it with the current time.
    pub fn from_message(msg: &UpdateMessage) -> Self {
        let error = match msg.message_type {
            MessageType::Result => msg.error_text(),
            _ => None,
        };
        Self {
            task_id: msg.task_id.clone(),
            status: msg.status,
            data: msg.data.clone(),
            error,
            timestamp: Utc::now(),
        }
    }

    /// Synthetic initial update emitted on submission.
    pub fn queued(task_id: impl Into<String>) -> Self {
        Self::bare(task_id, TaskStatus::Queued)
    }

    /// Terminal update recorded when the caller cancels.
    pub fn cancelled(task_id: impl Into<String>) -> Self {
        Self {
            error: Some("task cancelled by caller".to_string()),
            ..Self::bare(task_id, TaskStatus::Cancelled)
        }
    }

    fn bare(task_id: impl Into<String>, status: TaskStatus) -> Self {
        Self {
            task_id: task_id.into(),
            status,
            data: Value::Null,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn error_is_mapped_only_for_results() {
        let progress = UpdateMessage::update("t", TaskStatus::Progress, json!({"error": "ignored"}));
        assert_eq!(TaskUpdate::from_message(&progress).error, None);

        let failed = UpdateMessage::result("t", TaskStatus::Error, json!({"error": "bad config"}));
        let update = TaskUpdate::from_message(&failed);
        assert_eq!(update.error.as_deref(), Some("bad config"));
        assert!(update.is_terminal());
    }
}
