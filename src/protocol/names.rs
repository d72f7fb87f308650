//! Queue, key and channel names.
//!
//! ```text
//! task_queue                    normal-priority work queue
//! priority_task_queue           high-priority work queue
//! task_assignment:{task_id}     assignment record (worker-owned)
//! worker_heartbeat:{worker_id}  worker heartbeat record (worker-owned)
//! task_status:{status_id}       per-task update channel
//! ```

/// Normal-priority work queue.
pub const TASK_QUEUE: &str = "task_queue";

/// High-priority work queue.
pub const PRIORITY_TASK_QUEUE: &str = "priority_task_queue";

/// Key of the assignment record for `task_id`.
pub fn assignment_key(task_id: &str) -> String {
    format!("task_assignment:{task_id}")
}

/// Key of the heartbeat record for `worker_id`.
pub fn heartbeat_key(worker_id: &str) -> String {
    format!("worker_heartbeat:{worker_id}")
}

/// Update channel for `status_id`.
pub fn status_channel(status_id: &str) -> String {
    format!("task_status:{status_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_worker_contract() {
        assert_eq!(assignment_key("t-1"), "task_assignment:t-1");
        assert_eq!(heartbeat_key("w-7"), "worker_heartbeat:w-7");
        assert_eq!(status_channel("s-9"), "task_status:s-9");
    }
}
