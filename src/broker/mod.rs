//! Broker abstraction: work queues, a key/value store and pub/sub channels.
//!
//! The broker is the only thing shared between this process and the worker
//! pool. It is injected into the [`Dispatcher`](crate::Dispatcher) as an
//! `Arc<dyn Broker>`; its lifecycle belongs to whoever built it.
//!
//! ## Contract
//! - `push`/`pop`: FIFO per queue, each envelope delivered to one consumer.
//! - `get`/`set`/`delete`/`exists`: plain keys, no TTL.
//! - `publish`/`subscribe`: in-order per channel from a single publisher; no
//!   ordering across channels. Dropping a [`Subscription`] unsubscribes.
//!
//! ## Implementations
//! - [`MemoryBroker`]: in-process, for embedding and tests.
//! - `RedisBroker` (feature `redis`): Redis lists, strings and pub/sub.

mod memory;
#[cfg(feature = "redis")]
mod redis;

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::Stream;
use futures::stream::BoxStream;

use crate::error::BrokerError;

pub use memory::MemoryBroker;
#[cfg(feature = "redis")]
pub use redis::RedisBroker;

/// Shared queue, key/value store and pub/sub transport.
#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Appends `payload` to the tail of `queue`.
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Removes and returns the head of `queue`.
    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError>;

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BrokerError>;

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BrokerError>;

    async fn delete(&self, key: &str) -> Result<(), BrokerError>;

    async fn exists(&self, key: &str) -> Result<bool, BrokerError>;

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Subscribes to `channel`. Only messages published after this returns are observed.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError>;

    /// Releases connections and ends open subscriptions.
    async fn close(&self) -> Result<(), BrokerError> {
        Ok(())
    }
}

/// Live subscription to one channel.
///
/// A stream of raw message payloads. Ends when the broker closes the channel;
/// dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    inner: BoxStream<'static, Vec<u8>>,
}

impl Subscription {
    pub fn new(channel: impl Into<String>, inner: BoxStream<'static, Vec<u8>>) -> Self {
        Self {
            channel: channel.into(),
            inner,
        }
    }

    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = Vec<u8>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}
