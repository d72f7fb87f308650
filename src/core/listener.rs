//! # Update listener: one per handle, owns the channel subscription.
//!
//! ```text
//! loop select (biased) {
//!   ctx.cancelled()       → exit
//!   cancel.cancelled()    → forward recorded `cancelled` terminal, exit
//!   finished.cancelled()  → exit (watchdog delivered a terminal)
//!   sub.next():
//!     None                → exit (broker closed the channel)
//!     undecodable / foreign task_id → MessageIgnored
//!     heartbeat           → touch liveness
//!     update              → touch liveness, try_send
//!     result (terminal)   → deliver_terminal, exit
//! }
//! ```
//!
//! The subscription is dropped on exit, which unsubscribes.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::broker::Subscription;
use crate::core::handle::TaskState;
use crate::events::{Event, EventKind};
use crate::protocol::{MessageType, TaskStatus, TaskUpdate, UpdateMessage};

pub(crate) async fn run(
    state: Arc<TaskState>,
    mut sub: Subscription,
    tx: mpsc::Sender<TaskUpdate>,
    ctx: CancellationToken,
) {
    loop {
        let raw = tokio::select! {
            biased;
            _ = ctx.cancelled() => break,
            _ = state.cancel.cancelled() => {
                if let Some(update) = state.terminal().filter(|u| u.status == TaskStatus::Cancelled) {
                    state.forward(&tx, update);
                }
                break;
            }
            _ = state.finished.cancelled() => break,
            next = sub.next() => match next {
                Some(raw) => raw,
                None => break,
            },
        };
        if handle_message(&state, &tx, &raw) {
            break;
        }
    }

    state.bus().publish(
        Event::new(EventKind::MonitorStopped)
            .with_task(state.task_id())
            .with_reason("listener"),
    );
}

/// Applies one channel message. Returns `true` when the listener should exit.
fn handle_message(state: &TaskState, tx: &mpsc::Sender<TaskUpdate>, raw: &[u8]) -> bool {
    let msg = match UpdateMessage::from_slice(raw) {
        Ok(msg) => msg,
        Err(err) => {
            ignored(state, format!("undecodable message: {err}"));
            return false;
        }
    };
    if msg.task_id != state.task_id() {
        ignored(state, format!("foreign task_id {}", msg.task_id));
        return false;
    }

    match msg.message_type {
        MessageType::Heartbeat => {
            state.touch(msg.status.is_running());
            false
        }
        MessageType::Update => {
            state.touch(msg.status.is_running());
            state.forward(tx, TaskUpdate::from_message(&msg));
            false
        }
        MessageType::Result if msg.is_terminal() => {
            let update = TaskUpdate::from_message(&msg);
            let mut ev = Event::new(EventKind::TerminalReceived)
                .with_task(state.task_id())
                .with_status(update.status);
            if let Some(err) = update.error.as_deref() {
                ev = ev.with_reason(err);
            }
            if state.deliver_terminal(tx, update) {
                state.bus().publish(ev);
            }
            true
        }
        MessageType::Result => {
            // Non-terminal result: treat like an update.
            state.touch(msg.status.is_running());
            state.forward(tx, TaskUpdate::from_message(&msg));
            false
        }
    }
}

fn ignored(state: &TaskState, reason: String) {
    state.bus().publish(
        Event::new(EventKind::MessageIgnored)
            .with_task(state.task_id())
            .with_reason(reason),
    );
}
