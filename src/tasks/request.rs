use std::time::Duration;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::core::DispatcherConfig;
use crate::error::DispatchError;
use crate::protocol::Priority;

/// Builder for a task submission.
///
/// Unset retry budget and timeout inherit the dispatcher's
/// `default_max_retries` / `default_timeout`.
///
/// ```rust
/// use std::time::Duration;
/// use taskrelay::{Priority, TaskRequest};
///
/// #[derive(serde::Serialize)]
/// struct Screen { universe: &'static str }
///
/// let req = TaskRequest::new("screening")
///     .with_payload(&Screen { universe: "sp500" })?
///     .with_priority(Priority::High)
///     .with_max_retries(1)
///     .with_timeout(Duration::from_secs(600));
///
/// assert_eq!(req.task_type(), "screening");
/// assert_eq!(req.kwargs()["universe"], "sp500");
/// # Ok::<(), serde_json::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct TaskRequest {
    task_type: String,
    kwargs: Value,
    priority: Priority,
    max_retries: Option<u32>,
    timeout: Option<Duration>,
}

impl TaskRequest {
    /// Creates a request with empty `kwargs` and normal priority.
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            kwargs: Value::Object(Map::new()),
            priority: Priority::Normal,
            max_retries: None,
            timeout: None,
        }
    }

    /// Serializes `payload` into `kwargs`.
    pub fn with_payload<T: Serialize + ?Sized>(mut self, payload: &T) -> Result<Self, serde_json::Error> {
        self.kwargs = serde_json::to_value(payload)?;
        Ok(self)
    }

    /// Uses an already-built JSON value as `kwargs`.
    pub fn with_kwargs(mut self, kwargs: Value) -> Self {
        self.kwargs = kwargs;
        self
    }

    /// Accepts a [`Priority`] or a `bool` (`true` = high).
    pub fn with_priority(mut self, priority: impl Into<Priority>) -> Self {
        self.priority = priority.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Wall-clock budget of one attempt.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn kwargs(&self) -> &Value {
        &self.kwargs
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub(crate) fn resolve(self, cfg: &DispatcherConfig) -> Result<ResolvedRequest, DispatchError> {
        if self.task_type.trim().is_empty() {
            return Err(DispatchError::InvalidRequest {
                reason: "task type must not be empty".into(),
            });
        }
        let timeout = self.timeout.unwrap_or(cfg.default_timeout);
        if timeout.is_zero() {
            return Err(DispatchError::InvalidRequest {
                reason: "timeout must be greater than zero".into(),
            });
        }
        Ok(ResolvedRequest {
            task_type: self.task_type,
            kwargs: self.kwargs,
            priority: self.priority,
            max_retries: self.max_retries.unwrap_or(cfg.default_max_retries),
            timeout,
        })
    }
}

/// A validated request with defaults applied.
pub(crate) struct ResolvedRequest {
    pub(crate) task_type: String,
    pub(crate) kwargs: Value,
    pub(crate) priority: Priority,
    pub(crate) max_retries: u32,
    pub(crate) timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_fields_inherit_config_defaults() {
        let cfg = DispatcherConfig::default();
        let r = TaskRequest::new("backtest").with_priority(true).resolve(&cfg).unwrap();
        assert_eq!(r.max_retries, cfg.default_max_retries);
        assert_eq!(r.timeout, cfg.default_timeout);
        assert_eq!(r.priority, Priority::High);
        assert_eq!(r.kwargs, serde_json::json!({}));
    }

    #[test]
    fn rejects_empty_type_and_zero_timeout() {
        let cfg = DispatcherConfig::default();
        let err = TaskRequest::new("  ").resolve(&cfg).err().unwrap();
        assert_eq!(err.as_label(), "dispatch_invalid_request");

        let err = TaskRequest::new("x")
            .with_timeout(Duration::ZERO)
            .resolve(&cfg)
            .err()
            .unwrap();
        assert!(err.to_string().contains("timeout"));
    }
}
