use crate::{build_client, PublishError, Subscriber, CONNECT_PING_TIMEOUT};
use futures_util::StreamExt;
use redis::AsyncCommands;
use tokio::sync::watch;
use tracing::{info, warn};

/// Subscribes to a single named Redis channel and invokes `on_message`
/// once per message, in arrival order, from a single background task.
///
/// Matches `subscriber/redis.go`: connect, ping within a 10s deadline,
/// `SUBSCRIBE`, then forward every message on the channel to the
/// processor until [`close`](Subscriber::close) is called.
pub struct RedisSubscriber {
    stop_tx: watch::Sender<bool>,
    disconnected_rx: watch::Receiver<bool>,
}

impl RedisSubscriber {
    pub async fn connect<F>(
        host: &str,
        password: &str,
        channel: &str,
        on_message: F,
    ) -> Result<Self, PublishError>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        let client = build_client(host, password)?;

        let mut ping_conn = tokio::time::timeout(CONNECT_PING_TIMEOUT, client.get_multiplexed_async_connection())
            .await
            .map_err(|_| PublishError::Connect("timed out connecting to redis".to_owned()))?
            .map_err(|e| PublishError::Connect(e.to_string()))?;
        let _: String = tokio::time::timeout(CONNECT_PING_TIMEOUT, redis::cmd("PING").query_async(&mut ping_conn))
            .await
            .map_err(|_| PublishError::Connect("timed out pinging redis".to_owned()))?
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        let conn = client
            .get_async_connection()
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;
        let mut pubsub = conn.into_pubsub();
        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| PublishError::Connect(e.to_string()))?;

        info!("subscriber: connected to Redis");

        let (stop_tx, mut stop_rx) = watch::channel(false);
        let (disconnected_tx, disconnected_rx) = watch::channel(false);
        tokio::spawn(async move {
            let mut unexpected = false;
            let mut messages = pubsub.on_message();
            loop {
                tokio::select! {
                    msg = messages.next() => {
                        match msg {
                            Some(msg) => on_message(msg.get_payload_bytes().to_vec()),
                            None => {
                                unexpected = true;
                                break;
                            }
                        }
                    }
                    Ok(()) = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            if unexpected {
                warn!("subscriber: broker connection dropped unexpectedly");
                let _ = disconnected_tx.send(true);
            } else {
                warn!("subscriber: message loop exited");
            }
        });

        Ok(Self { stop_tx, disconnected_rx })
    }

    /// Resolves once the broker connection drops without [`close`](Subscriber::close)
    /// having been called first. The server process treats this as fatal
    /// (matching `subscriber/redis.go`'s runtime disconnect policy) and
    /// races this against its own shutdown signal.
    pub async fn disconnected(&self) {
        let mut rx = self.disconnected_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }
}

impl Subscriber for RedisSubscriber {
    fn close(&self) {
        let _ = self.stop_tx.send(true);
    }
}
