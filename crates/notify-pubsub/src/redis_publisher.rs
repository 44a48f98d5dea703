use crate::{build_client, PublishError, Publisher, CONNECT_PING_TIMEOUT};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::info;

/// Publishes block/event payloads on a single named Redis channel.
///
/// Matches `publisher/redis.go`: connect, ping within a 10s deadline,
/// then `PUBLISH` per call. [`ConnectionManager`] is used instead of a
/// bare connection so a dropped TCP connection is transparently
/// re-established between publishes.
pub struct RedisPublisher {
    manager: ConnectionManager,
    channel: String,
}

impl RedisPublisher {
    pub async fn connect(host: &str, password: &str, channel: &str) -> Result<Self, PublishError> {
        let client = build_client(host, password)?;
        let mut manager = tokio::time::timeout(CONNECT_PING_TIMEOUT, client.get_connection_manager())
            .await
            .map_err(|_| PublishError::Connect("timed out connecting to redis".to_owned()))?
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        let _: String = tokio::time::timeout(CONNECT_PING_TIMEOUT, redis::cmd("PING").query_async(&mut manager))
            .await
            .map_err(|_| PublishError::Connect("timed out pinging redis".to_owned()))?
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        info!("publisher: connected to Redis");

        Ok(Self {
            manager,
            channel: channel.to_owned(),
        })
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish(&self, payload: Vec<u8>, timeout: Duration) -> Result<(), PublishError> {
        let mut conn = self.manager.clone();
        tokio::time::timeout(timeout, conn.publish::<_, _, ()>(&self.channel, payload))
            .await
            .map_err(|_| PublishError::Timeout)?
            .map_err(|e| PublishError::Redis(e.to_string()))
    }
}
