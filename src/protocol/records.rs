//! Worker-owned key/value records. Read-only from this crate, except that the
//! watchdog deletes a stale assignment before requeueing.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Claim of a task by a worker, stored at `task_assignment:{task_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskAssignment {
    pub worker_id: String,
    pub task_id: String,
    /// Start time as written by the worker (RFC 3339 or naive ISO-8601 UTC).
    pub started_at: String,
    #[serde(default)]
    pub status: String,
}

impl TaskAssignment {
    /// Parses `started_at`.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        parse_wire_time(&self.started_at)
    }
}

/// Worker liveness record, stored at `worker_heartbeat:{worker_id}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: String,
    #[serde(default)]
    pub status: String,
    /// Either an ISO-8601 string or epoch seconds.
    pub timestamp: Value,
    #[serde(default)]
    pub uptime_seconds: f64,
    #[serde(default)]
    pub active_task: Option<String>,
    #[serde(default)]
    pub queue_stats: Value,
}

impl WorkerHeartbeat {
    /// Parses `timestamp`.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match &self.timestamp {
            Value::String(s) => parse_wire_time(s),
            Value::Number(n) => {
                let secs = n.as_f64()?;
                DateTime::from_timestamp_millis((secs * 1000.0) as i64)
            }
            _ => None,
        }
    }

    /// True if this worker reported `task_id` as its active task within `window` of `now`.
    pub fn vouches_for(&self, task_id: &str, window: Duration, now: DateTime<Utc>) -> bool {
        if self.active_task.as_deref() != Some(task_id) {
            return false;
        }
        let Some(at) = self.timestamp() else {
            return false;
        };
        match (now - at).to_std() {
            Ok(age) => age <= window,
            // Timestamp slightly in the future (clock skew).
            Err(_) => true,
        }
    }
}

/// Parses a worker timestamp: RFC 3339, or naive ISO-8601 interpreted as UTC.
pub(crate) fn parse_wire_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn started_at_accepts_common_formats() {
        for raw in [
            "2024-05-01T10:00:00Z",
            "2024-05-01T12:00:00+02:00",
            "2024-05-01T10:00:00.123456",
            "2024-05-01 10:00:00",
        ] {
            let a = TaskAssignment {
                worker_id: "w".into(),
                task_id: "t".into(),
                started_at: raw.into(),
                status: "running".into(),
            };
            let at = a.started_at().unwrap_or_else(|| panic!("{raw} should parse"));
            assert_eq!(at.date_naive().to_string(), "2024-05-01");
        }
    }

    #[test]
    fn garbage_started_at_is_rejected() {
        assert!(parse_wire_time("yesterday-ish").is_none());
    }

    #[test]
    fn heartbeat_vouches_only_for_its_active_task() {
        let now = Utc::now();
        let hb: WorkerHeartbeat = serde_json::from_value(json!({
            "worker_id": "w1",
            "status": "busy",
            "timestamp": now.timestamp() as f64,
            "uptime_seconds": 12.5,
            "active_task": "t1",
            "queue_stats": {"pending": 3}
        }))
        .unwrap();

        assert!(hb.vouches_for("t1", Duration::from_secs(15), now));
        assert!(!hb.vouches_for("t2", Duration::from_secs(15), now));
        let later = now + chrono::Duration::seconds(60);
        assert!(!hb.vouches_for("t1", Duration::from_secs(15), later));
    }
}
