//! # Task envelope: the unit pushed onto a work queue.
//!
//! ```text
//! {task_id, task_type, kwargs, created_at, priority, status_id, heartbeat_interval}
//! ```
//!
//! A requeued envelope keeps `task_id` and `status_id`, gets a fresh
//! `created_at`, and carries retry metadata according to [`RetryPayload`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::names::{PRIORITY_TASK_QUEUE, TASK_QUEUE};

/// Queue selector for a submission.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Pushed to `task_queue`.
    #[default]
    Normal,
    /// Pushed to `priority_task_queue`.
    High,
}

impl Priority {
    /// Returns the queue this priority is pushed to.
    pub fn queue_name(self) -> &'static str {
        match self {
            Priority::Normal => TASK_QUEUE,
            Priority::High => PRIORITY_TASK_QUEUE,
        }
    }
}

impl From<bool> for Priority {
    /// `true` selects [`Priority::High`].
    fn from(high: bool) -> Self {
        if high { Priority::High } else { Priority::Normal }
    }
}

/// How retry metadata travels in a requeued envelope.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RetryPayload {
    /// Keep the original `kwargs`; put `retry_count`/`retry_reason` in
    /// dedicated envelope fields (default).
    #[default]
    Preserve,
    /// Replace `kwargs` with `{retry_count, retry_reason}`.
    ///
    /// Matches workers built against the legacy envelope; the original
    /// arguments are lost on retry.
    Replace,
}

/// Serialized unit of work.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Identity of the unit of work.
    pub task_id: String,
    /// Tag selecting worker logic.
    pub task_type: String,
    /// Opaque caller payload.
    pub kwargs: Value,
    /// Time this envelope (not the task) was created.
    pub created_at: DateTime<Utc>,
    /// Queue selector.
    pub priority: Priority,
    /// Update channel id, stable across retries.
    pub status_id: String,
    /// Expected worker update cadence in seconds.
    pub heartbeat_interval: u64,
    /// Requeue count; absent on the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    /// Why the previous attempt was abandoned; absent on the first attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_reason: Option<String>,
}

impl TaskEnvelope {
    /// Builds a first-attempt envelope stamped with the current time.
    pub fn new(
        task_id: impl Into<String>,
        status_id: impl Into<String>,
        task_type: impl Into<String>,
        kwargs: Value,
        priority: Priority,
        heartbeat_interval: u64,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            task_type: task_type.into(),
            kwargs,
            created_at: Utc::now(),
            priority,
            status_id: status_id.into(),
            heartbeat_interval,
            retry_count: None,
            retry_reason: None,
        }
    }

    /// Builds the envelope for requeue number `retry_count`.
    ///
    /// Identity, task type, priority and heartbeat interval are copied.
    pub fn for_retry(&self, retry_count: u32, reason: &str, mode: RetryPayload) -> Self {
        let mut next = Self {
            created_at: Utc::now(),
            ..self.clone()
        };
        match mode {
            RetryPayload::Preserve => {
                next.retry_count = Some(retry_count);
                next.retry_reason = Some(reason.to_string());
            }
            RetryPayload::Replace => {
                next.kwargs = json!({ "retry_count": retry_count, "retry_reason": reason });
                next.retry_count = None;
                next.retry_reason = None;
            }
        }
        next
    }

    /// Queue this envelope belongs to.
    pub fn queue_name(&self) -> &'static str {
        self.priority.queue_name()
    }

    /// Serializes to the JSON bytes pushed onto the queue.
    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskEnvelope {
        TaskEnvelope::new(
            "task-1",
            "status-1",
            "backtest",
            json!({"symbol": "AAPL", "days": 30}),
            Priority::High,
            5,
        )
    }

    #[test]
    fn first_attempt_has_exact_wire_fields() {
        let value = serde_json::to_value(sample()).unwrap();
        let obj = value.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "created_at",
                "heartbeat_interval",
                "kwargs",
                "priority",
                "status_id",
                "task_id",
                "task_type"
            ]
        );
        assert_eq!(obj["priority"], "high");
        assert_eq!(obj["heartbeat_interval"], 5);
    }

    #[test]
    fn priority_selects_queue() {
        assert_eq!(Priority::from(true).queue_name(), "priority_task_queue");
        assert_eq!(Priority::from(false).queue_name(), "task_queue");
    }

    #[test]
    fn preserve_keeps_kwargs_and_identity() {
        let first = sample();
        let retry = first.for_retry(1, "worker heartbeat timeout", RetryPayload::Preserve);
        assert_eq!(retry.task_id, first.task_id);
        assert_eq!(retry.status_id, first.status_id);
        assert_eq!(retry.kwargs, first.kwargs);
        assert_eq!(retry.retry_count, Some(1));
        assert_eq!(retry.retry_reason.as_deref(), Some("worker heartbeat timeout"));
    }

    #[test]
    fn replace_matches_legacy_shape() {
        let retry = sample().for_retry(2, "no assignment", RetryPayload::Replace);
        assert_eq!(
            retry.kwargs,
            json!({"retry_count": 2, "retry_reason": "no assignment"})
        );
        let value = serde_json::to_value(&retry).unwrap();
        assert!(value.get("retry_count").is_none());
    }

    #[test]
    fn worker_written_envelope_parses_without_retry_fields() {
        let raw = r#"{"task_id":"a","task_type":"screening","kwargs":{},
            "created_at":"2024-05-01T10:00:00Z","priority":"normal",
            "status_id":"b","heartbeat_interval":5}"#;
        let env: TaskEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(env.priority, Priority::Normal);
        assert!(env.retry_count.is_none());
    }
}
