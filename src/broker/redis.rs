//! Redis broker.
//!
//! | Operation   | Redis command                          |
//! |-------------|----------------------------------------|
//! | `push`      | `RPUSH queue payload`                  |
//! | `pop`       | `LPOP queue`                           |
//! | `get`/`set` | `GET key` / `SET key value`            |
//! | `delete`    | `DEL key`                              |
//! | `exists`    | `EXISTS key`                           |
//! | `publish`   | `PUBLISH channel payload`              |
//! | `subscribe` | dedicated pub/sub connection, `SUBSCRIBE channel` |
//!
//! Commands share one [`MultiplexedConnection`]; each subscription opens its own
//! pub/sub connection, closed when the [`Subscription`] is dropped.
//!
//! [`Broker::close`] ends every open subscription stream and makes later calls
//! fail with [`BrokerError::Closed`]. Clones share the closed state.

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;
use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use super::{Broker, Subscription};
use crate::error::BrokerError;

/// Broker backed by a Redis server.
#[derive(Clone)]
pub struct RedisBroker {
    client: ::redis::Client,
    conn: MultiplexedConnection,
    closed: CancellationToken,
}

impl RedisBroker {
    /// Connects to Redis at `url` (`redis://[:<password>@]<host>:<port>[/<db>]`).
    pub async fn connect(url: &str) -> Result<Self, BrokerError> {
        let client = ::redis::Client::open(url).map_err(|e| BrokerError::Connection {
            message: format!("failed to create Redis client: {e}"),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BrokerError::Connection {
                message: format!("failed to connect to Redis: {e}"),
            })?;
        Ok(Self {
            client,
            conn,
            closed: CancellationToken::new(),
        })
    }

    /// Shared command connection, unless the broker was closed.
    fn conn(&self) -> Result<MultiplexedConnection, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        Ok(self.conn.clone())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn push(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.conn()?;
        let _: () = conn
            .rpush(queue, payload)
            .await
            .map_err(|e| BrokerError::operation("push", queue, e))?;
        Ok(())
    }

    async fn pop(&self, queue: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        let mut conn = self.conn()?;
        conn.lpop(queue, None)
            .await
            .map_err(|e| BrokerError::operation("pop", queue, e))
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BrokerError> {
        let mut conn = self.conn()?;
        conn.get(key)
            .await
            .map_err(|e| BrokerError::operation("get", key, e))
    }

    async fn set(&self, key: &str, value: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.conn()?;
        let _: () = conn
            .set(key, value)
            .await
            .map_err(|e| BrokerError::operation("set", key, e))?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), BrokerError> {
        let mut conn = self.conn()?;
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| BrokerError::operation("delete", key, e))?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, BrokerError> {
        let mut conn = self.conn()?;
        conn.exists(key)
            .await
            .map_err(|e| BrokerError::operation("exists", key, e))
    }

    async fn publish(&self, channel: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        let mut conn = self.conn()?;
        let _: () = conn
            .publish(channel, payload)
            .await
            .map_err(|e| BrokerError::operation("publish", channel, e))?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BrokerError> {
        if self.closed.is_cancelled() {
            return Err(BrokerError::Closed);
        }
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BrokerError::operation("subscribe", channel, e))?;
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BrokerError::operation("subscribe", channel, e))?;

        let stream = pubsub
            .into_on_message()
            .map(|msg| msg.get_payload_bytes().to_vec())
            .take_until(self.closed.clone().cancelled_owned());
        Ok(Subscription::new(channel, stream.boxed()))
    }

    async fn close(&self) -> Result<(), BrokerError> {
        self.closed.cancel();
        Ok(())
    }
}

/// Requires a running Redis; run with:
/// `REDIS_URL=redis://127.0.0.1:6379 cargo test --features redis-tests -- redis_`
#[cfg(all(test, feature = "redis-tests"))]
mod tests {
    use super::*;

    async fn broker() -> RedisBroker {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        RedisBroker::connect(&url).await.unwrap()
    }

    #[tokio::test]
    async fn redis_queue_is_fifo() {
        let b = broker().await;
        let queue = format!("taskrelay-test:{}", uuid::Uuid::new_v4());
        b.push(&queue, b"1".to_vec()).await.unwrap();
        b.push(&queue, b"2".to_vec()).await.unwrap();
        assert_eq!(b.pop(&queue).await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.pop(&queue).await.unwrap(), Some(b"2".to_vec()));
        assert_eq!(b.pop(&queue).await.unwrap(), None);
    }

    #[tokio::test]
    async fn redis_pubsub_delivers() {
        let b = broker().await;
        let channel = format!("taskrelay-test:{}", uuid::Uuid::new_v4());
        let mut sub = b.subscribe(&channel).await.unwrap();
        b.publish(&channel, b"hello".to_vec()).await.unwrap();
        assert_eq!(sub.next().await, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn redis_close_ends_subscriptions_and_rejects_calls() {
        let b = broker().await;
        let channel = format!("taskrelay-test:{}", uuid::Uuid::new_v4());
        let mut sub = b.subscribe(&channel).await.unwrap();
        let clone = b.clone();

        b.close().await.unwrap();
        assert_eq!(sub.next().await, None);
        assert!(matches!(clone.push(&channel, vec![]).await, Err(BrokerError::Closed)));
        assert!(matches!(b.get(&channel).await, Err(BrokerError::Closed)));
        assert!(matches!(b.subscribe(&channel).await, Err(BrokerError::Closed)));
    }
}
