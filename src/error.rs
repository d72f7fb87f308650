//! Error types used by the dispatcher, the broker layer and task handles.
//!
//! - [`DispatchError`] — synchronous submission failures (no handle produced).
//! - [`AwaitError`] — outcomes of waiting on a [`TaskHandle`](crate::TaskHandle).
//! - [`BrokerError`] — transport/storage failures reported by a [`Broker`](crate::Broker).
//! - [`AttemptFailure`] — infrastructure failures detected by the watchdog for one attempt.
//! - [`RuntimeError`] — failures of the dispatcher runtime itself (shutdown).
//!
//! Every type provides `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

use crate::protocol::TaskStatus;

/// # Errors produced by the dispatcher runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Close grace period was exceeded; some monitors were still running.
    #[error("close timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Task ids whose monitors did not stop in time.
        stuck: Vec<String>,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskrelay::RuntimeError;
    /// use std::time::Duration;
    ///
    /// let err = RuntimeError::GraceExceeded { grace: Duration::from_secs(5), stuck: vec![] };
    /// assert_eq!(err.as_label(), "runtime_grace_exceeded");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
        }
    }
}

/// # Errors reported by a broker implementation.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum BrokerError {
    /// The broker could not be reached.
    #[error("broker connection failed: {message}")]
    Connection {
        /// Underlying error message.
        message: String,
    },

    /// A single broker operation failed.
    #[error("broker {op} failed on {target}: {message}")]
    Operation {
        /// Operation name (`push`, `get`, `subscribe`, ...).
        op: &'static str,
        /// Queue, key or channel the operation addressed.
        target: String,
        /// Underlying error message.
        message: String,
    },

    /// The broker was closed by its owner.
    #[error("broker closed")]
    Closed,
}

impl BrokerError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Connection { .. } => "broker_connection",
            BrokerError::Operation { .. } => "broker_operation",
            BrokerError::Closed => "broker_closed",
        }
    }

    pub(crate) fn operation(
        op: &'static str,
        target: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        BrokerError::Operation {
            op,
            target: target.into(),
            message: message.to_string(),
        }
    }
}

/// # Errors returned synchronously by task submission.
///
/// When submission fails no [`TaskHandle`](crate::TaskHandle) exists and no
/// monitoring was started.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The request itself is malformed (empty task type, zero timeout).
    #[error("invalid task request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// The payload or the envelope could not be serialized.
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// The initial subscribe or queue push failed.
    #[error(transparent)]
    Broker(#[from] BrokerError),
}

impl DispatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskrelay::DispatchError;
    ///
    /// let err = DispatchError::InvalidRequest { reason: "empty task type".into() };
    /// assert_eq!(err.as_label(), "dispatch_invalid_request");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            DispatchError::InvalidRequest { .. } => "dispatch_invalid_request",
            DispatchError::Serialize(_) => "dispatch_serialize",
            DispatchError::Broker(_) => "dispatch_broker",
        }
    }
}

/// # Errors returned while awaiting a task result.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AwaitError {
    /// The caller's context token fired before a terminal update arrived.
    #[error("context cancelled")]
    ContextCancelled,

    /// Monitoring ended and no terminal update was ever produced.
    #[error("task monitoring completed without final result")]
    NoFinalResult,

    /// The task finished with `status=error` (reported by the worker or the watchdog).
    #[error("task failed: {reason}")]
    TaskFailed {
        /// Error text carried by the terminal update.
        reason: String,
    },

    /// The task was cancelled.
    #[error("task was cancelled")]
    TaskCancelled,

    /// The terminal update carried a status typed awaits cannot interpret.
    #[error("unexpected task status: {status}")]
    UnexpectedStatus {
        /// The status observed.
        status: TaskStatus,
    },

    /// The `completed` payload did not decode into the requested type.
    #[error("failed to decode task result: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AwaitError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            AwaitError::ContextCancelled => "await_context_cancelled",
            AwaitError::NoFinalResult => "await_no_final_result",
            AwaitError::TaskFailed { .. } => "await_task_failed",
            AwaitError::TaskCancelled => "await_task_cancelled",
            AwaitError::UnexpectedStatus { .. } => "await_unexpected_status",
            AwaitError::Decode(_) => "await_decode",
        }
    }
}

/// # Infrastructure failure of a single task attempt.
///
/// Detected by the watchdog; each one counts against the retry budget.
/// Business failures reported by the worker are never represented here.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum AttemptFailure {
    /// No worker claimed the task within the assignment timeout.
    #[error("no task assignment within {waited:?}")]
    AssignmentTimeout {
        /// How long the watchdog polled.
        waited: Duration,
    },

    /// The assignment record could not be interpreted.
    #[error("invalid task assignment: {reason}")]
    InvalidAssignment {
        /// Parse failure details.
        reason: String,
    },

    /// The worker stopped sending updates after the task started running.
    #[error("worker heartbeat timeout: no update for {silence:?}")]
    WorkerDead {
        /// Time since the last update.
        silence: Duration,
    },

    /// The attempt overran its wall-clock budget.
    #[error("task execution timed out after {timeout:?}")]
    ExecutionTimeout {
        /// The per-attempt timeout.
        timeout: Duration,
    },

    /// The worker claimed the task but never reported `running`.
    #[error("task never started running within {grace:?}")]
    NeverStarted {
        /// The startup grace that elapsed.
        grace: Duration,
    },

    /// The broker failed while the attempt was being monitored.
    #[error("broker error during monitoring: {message}")]
    Broker {
        /// Broker error text.
        message: String,
    },
}

impl AttemptFailure {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskrelay::AttemptFailure;
    /// use std::time::Duration;
    ///
    /// let f = AttemptFailure::WorkerDead { silence: Duration::from_secs(16) };
    /// assert_eq!(f.as_label(), "attempt_worker_dead");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            AttemptFailure::AssignmentTimeout { .. } => "attempt_assignment_timeout",
            AttemptFailure::InvalidAssignment { .. } => "attempt_invalid_assignment",
            AttemptFailure::WorkerDead { .. } => "attempt_worker_dead",
            AttemptFailure::ExecutionTimeout { .. } => "attempt_execution_timeout",
            AttemptFailure::NeverStarted { .. } => "attempt_never_started",
            AttemptFailure::Broker { .. } => "attempt_broker",
        }
    }

    /// Returns `true` when the attempt failed before any worker claimed it.
    pub fn is_assignment_failure(&self) -> bool {
        matches!(self, AttemptFailure::AssignmentTimeout { .. })
    }
}

impl From<BrokerError> for AttemptFailure {
    fn from(err: BrokerError) -> Self {
        AttemptFailure::Broker {
            message: err.to_string(),
        }
    }
}
