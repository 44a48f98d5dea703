//! Thin pub/sub traits plus a Redis-backed implementation of each.
//!
//! The hub and fetcher crates depend only on [`Publisher`]/[`Subscriber`];
//! only the `monitor`/`server` binaries know these are backed by Redis.

mod redis_publisher;
mod redis_subscriber;

pub use redis_publisher::RedisPublisher;
pub use redis_subscriber::RedisSubscriber;

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes `payload` on the configured channel, failing if the
    /// call does not complete within `timeout`.
    async fn publish(&self, payload: Vec<u8>, timeout: Duration) -> Result<(), PublishError>;
}

/// A live subscription. Construction opens the channel and starts
/// delivering messages to the processor callback; [`close`](Subscriber::close)
/// stops delivery and releases the channel.
pub trait Subscriber: Send + Sync {
    fn close(&self);
}

#[derive(Debug)]
pub enum PublishError {
    Connect(String),
    Timeout,
    Redis(String),
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Connect(s) => write!(f, "failed to connect to broker: {s}"),
            PublishError::Timeout => write!(f, "publish deadline exceeded"),
            PublishError::Redis(s) => write!(f, "broker error: {s}"),
        }
    }
}

impl std::error::Error for PublishError {}

pub(crate) fn build_client(host: &str, password: &str) -> Result<redis::Client, PublishError> {
    let url = if password.is_empty() {
        format!("redis://{host}")
    } else {
        format!("redis://:{password}@{host}")
    };
    redis::Client::open(url).map_err(|e| PublishError::Connect(e.to_string()))
}

pub(crate) const CONNECT_PING_TIMEOUT: Duration = Duration::from_secs(10);
