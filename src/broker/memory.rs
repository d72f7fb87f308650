//! # In-process broker.
//!
//! [`MemoryBroker`] keeps queues and keys in a mutex-guarded map and backs each
//! channel with a [`tokio::sync::broadcast`] sender.
//!
//! ## Rules
//! - Publishing to a channel with no subscribers drops the message (like Redis).
//! - A subscriber lagging more than `channel_capacity` messages skips the oldest.
//! - [`Broker::close`] ends every open subscription; later calls fail with
//!   [`BrokerError::Closed`].

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::{Broker, Subscription};
use crate::error::BrokerError;

/// Default per-channel ring buffer size.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Vec<u8>>>,
    kv: HashMap<String, Vec<u8>>,
    channels: HashMap<String, broadcast::Sender<Vec<u8>>>,
    closed: bool,
}

/// Broker living entirely inside this process.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct MemoryBroker {
    state: Mutex<State>,
    channel_capacity: usize,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates a broker whose channels buffer up to `capacity` messages per subscriber (min 1).
    pub fn with_channel_capacity(capacity: usize) -> Self {
        Self {
            state: Mutex::new(State::default()),
            channel_capacity: capacity.max(1),
        }
    }

    /// Number of envelopes waiting in `queue`.
    pub fn queue_len(&self, queue: &str) -> usize {
        self.state.lock().queues.get(queue).map_or(0, VecDeque::len)
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .channels
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }

    fn open(&self) -> Result<parking_lot::MutexGuard<'_, State>, BrokerError> {
        let state = self.state.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        Ok(state)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        self.open()?
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(payload);
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        Ok(self
            .open()?
            .queues
            .get_mut(queue)
            .and_then(VecDeque::pop_front))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        Ok(self.open()?.kv.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BrokerError> {
        self.open()?.kv.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BrokerError> {
        self.open()?.kv.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BrokerError> {
        Ok(self.open()?.kv.contains_key(key))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let state = self.open()?;
        if let Some(tx) = state.channels.get(channel) {
            let _ = tx.send(payload);
        }
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        let rx = {
            let mut state = self.open()?;
            let capacity = self.channel_capacity;
            state
                .channels
                .entry(channel.to_string())
                .or_insert_with(|| broadcast::channel(capacity).0)
                .subscribe()
        };

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(payload) => return Some((payload, rx)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "memory broker subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(Subscription::new(channel, stream.boxed()))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        let mut state = self.state.lock();
        state.closed = true;
        state.channels.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queue_is_fifo() {
        let broker = MemoryBroker::new();
        broker.push("q", b"a".to_vec()).await.unwrap();
        broker.push("q", b"b".to_vec()).await.unwrap();
        assert_eq!(broker.queue_len("q"), 2);
        assert_eq!(broker.pop("q").await.unwrap(), Some(b"a".to_vec()));
        assert_eq!(broker.pop("q").await.unwrap(), Some(b"b".to_vec()));
        assert_eq!(broker.pop("q").await.unwrap(), None);
        assert_eq!(broker.pop("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn key_value_roundtrip() {
        let broker = MemoryBroker::new();
        assert!(!broker.exists("k").await.unwrap());
        broker.set("k", b"v".to_vec()).await.unwrap();
        assert!(broker.exists("k").await.unwrap());
        assert_eq!(broker.get("k").await.unwrap(), Some(b"v".to_vec()));
        broker.delete("k").await.unwrap();
        assert_eq!(broker.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn subscription_sees_messages_in_publish_order() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("ch").await.unwrap();
        assert_eq!(sub.channel(), "ch");
        for i in 0..3u8 {
            broker.publish("ch", vec![i]).await.unwrap();
        }
        broker.publish("other", vec![9]).await.unwrap();

        for i in 0..3u8 {
            assert_eq!(sub.next().await, Some(vec![i]));
        }
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let broker = MemoryBroker::new();
        let sub = broker.subscribe("ch").await.unwrap();
        assert_eq!(broker.subscriber_count("ch"), 1);
        drop(sub);
        assert_eq!(broker.subscriber_count("ch"), 0);
    }

    #[tokio::test]
    async fn close_ends_subscriptions_and_rejects_calls() {
        let broker = MemoryBroker::new();
        let mut sub = broker.subscribe("ch").await.unwrap();
        broker.close().await.unwrap();
        assert_eq!(sub.next().await, None);
        assert!(matches!(
            broker.push("q", vec![]).await,
            Err(BrokerError::Closed)
        ));
    }
}
