//! The per-connection state machine: one [`Client`] per accepted
//! websocket, running exactly two tasks (reader, writer).
//!
//! The socket is split into its [`SplitSink`]/[`SplitStream`] halves at
//! construction so the two loops can run concurrently without sharing a
//! lock on the connection itself — only the writer task ever touches the
//! sink, which is what lets it be the sole place that performs the final
//! close teardown.

use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use notify_protocol::{
    ClientRequest, ClientResponse, EventKind, ERROR_CODE_INVALID_PAYLOAD, METHOD_SUBSCRIBE,
    METHOD_UNSUBSCRIBE,
};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, timeout, Instant};
use tracing::{debug, warn};

/// A websocket connection is closed with this code whenever the source
/// would have used `websocket.CloseGoingAway`.
pub const CLOSE_CODE_GOING_AWAY: u16 = 1001;

/// Factory configuration, validated once at [`ClientFactory::new`].
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Max time allowed for a single socket write.
    pub write_wait_timeout: Duration,
    /// Max time between pong receipts before the reader times out.
    pub pong_wait_timeout: Duration,
    /// Interval between outbound ping frames.
    pub ping_interval: Duration,
    /// Per-frame read limit in bytes, applied by the upgrade handler via
    /// `WebSocketUpgrade::max_message_size` before accepting the socket.
    /// The reader loop also checks it directly, since that axum limit
    /// cannot be changed once the socket is already upgraded.
    pub max_read_message_size: usize,
    /// Capacity of each client's outbound queue.
    pub send_buffer_size: usize,
}

#[derive(Debug)]
pub enum ClientError {
    InvalidConfig(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::InvalidConfig(s) => write!(f, "invalid client factory config: {s}"),
        }
    }
}

impl std::error::Error for ClientError {}

type CloseCallback = Box<dyn Fn() + Send + Sync>;
type ParamsCallback = Box<dyn Fn(Vec<String>) + Send + Sync>;

#[derive(Default)]
struct Callbacks {
    on_close: Option<CloseCallback>,
    on_subscribe: Option<ParamsCallback>,
    on_unsubscribe: Option<ParamsCallback>,
}

/// A factory holding shared configuration and a monotonic id counter.
/// Produces [`Client`] instances, each of which owns its reader and
/// writer tasks from construction.
pub struct ClientFactory {
    config: ClientConfig,
    next_id: AtomicU64,
}

impl ClientFactory {
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        if config.pong_wait_timeout <= config.ping_interval {
            return Err(ClientError::InvalidConfig(
                "pong_wait_timeout must be greater than ping_interval".to_owned(),
            ));
        }
        Ok(Self {
            config,
            next_id: AtomicU64::new(0),
        })
    }

    /// The configured per-frame read limit, for the upgrade handler to
    /// apply to the `WebSocketUpgrade` extractor before accepting.
    #[must_use]
    pub fn max_read_message_size(&self) -> usize {
        self.config.max_read_message_size
    }

    /// Wraps an upgraded socket in a `Client`, splitting it into its two
    /// halves and spawning the reader and writer tasks.
    #[must_use]
    pub fn new_client(&self, socket: WebSocket) -> Arc<Client> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let (send_tx, send_rx) = mpsc::channel(self.config.send_buffer_size);
        let (close_tx, close_rx) = watch::channel(None::<u16>);

        let client = std::sync::Arc::new(Client {
            id,
            send_tx,
            close_tx,
            close_rx,
            already_closing: AtomicBool::new(false),
            callbacks: Mutex::new(Callbacks::default()),
        });

        let (sink, stream) = socket.split();
        let writer_close_rx = client.close_rx.clone();
        tokio::spawn(reader_loop(client.clone(), stream, self.config.clone()));
        tokio::spawn(writer_loop(
            client.clone(),
            sink,
            send_rx,
            writer_close_rx,
            self.config.clone(),
        ));

        client
    }
}

/// One accepted websocket connection.
///
/// Construct via [`ClientFactory::new_client`]; never directly.
pub struct Client {
    id: u64,
    send_tx: mpsc::Sender<Vec<u8>>,
    close_tx: watch::Sender<Option<u16>>,
    close_rx: watch::Receiver<Option<u16>>,
    already_closing: AtomicBool,
    callbacks: Mutex<Callbacks>,
}

impl Client {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Installs the close callback. Must be set before traffic begins.
    pub fn on_close(&self, f: impl Fn() + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_close = Some(Box::new(f));
    }

    /// Installs the subscribe callback. Must be set before traffic begins.
    pub fn on_subscribe(&self, f: impl Fn(Vec<String>) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_subscribe = Some(Box::new(f));
    }

    /// Installs the unsubscribe callback. Must be set before traffic begins.
    pub fn on_unsubscribe(&self, f: impl Fn(Vec<String>) + Send + Sync + 'static) {
        self.callbacks.lock().unwrap().on_unsubscribe = Some(Box::new(f));
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.close_rx.borrow().is_some()
    }

    /// Non-blocking. A full send queue drops the message silently —
    /// the client is considered slow and will eventually be reaped by
    /// a missed pong or a writer failure.
    pub fn send(&self, payload: Vec<u8>) {
        if self.is_closed() {
            return;
        }
        let _ = self.send_tx.try_send(payload);
    }

    /// Idempotent. Only the first caller trips the close latch; later
    /// calls are no-ops. The actual socket teardown happens inside the
    /// writer task, the sole owner of the sink half.
    pub fn close(&self, code: u16) {
        if self.already_closing.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.close_tx.send(Some(code));
    }

    fn invoke_on_subscribe(&self, params: Vec<String>) {
        if let Some(f) = self.callbacks.lock().unwrap().on_subscribe.as_ref() {
            f(params);
        }
    }

    fn invoke_on_unsubscribe(&self, params: Vec<String>) {
        if let Some(f) = self.callbacks.lock().unwrap().on_unsubscribe.as_ref() {
            f(params);
        }
    }

    fn invoke_on_close(&self) {
        if let Some(f) = self.callbacks.lock().unwrap().on_close.as_ref() {
            f();
        }
    }
}

async fn reader_loop(
    client: Arc<Client>,
    mut stream: SplitStream<WebSocket>,
    config: ClientConfig,
) {
    let mut deadline = Instant::now() + config.pong_wait_timeout;

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match timeout(remaining, stream.next()).await {
            Err(_elapsed) => {
                debug!(client_id = client.id(), "client: pong timeout, closing");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(err))) => {
                warn!(client_id = client.id(), error = %err, "client: connection was disconnected");
                break;
            }
            Ok(Some(Ok(Message::Pong(_)))) => {
                deadline = Instant::now() + config.pong_wait_timeout;
            }
            Ok(Some(Ok(Message::Close(_)))) => break,
            Ok(Some(Ok(Message::Text(text)))) => {
                if text.len() > config.max_read_message_size {
                    warn!(client_id = client.id(), "client: frame exceeds max read size");
                    break;
                }
                handle_request(&client, &text);
            }
            Ok(Some(Ok(_))) => {
                // Non-text application frames (binary, ping) carry no protocol meaning here.
            }
        }
    }

    client.close(CLOSE_CODE_GOING_AWAY);
}

fn handle_request(client: &Arc<Client>, text: &str) {
    let request: ClientRequest = match serde_json::from_str(text) {
        Ok(r) => r,
        Err(_) => {
            client.send(
                ClientResponse::error(0, ERROR_CODE_INVALID_PAYLOAD, "payload is invalid")
                    .to_json_bytes(),
            );
            return;
        }
    };

    match request.method.as_str() {
        METHOD_SUBSCRIBE => match validate_event_kinds(&request.params, false) {
            Ok(()) => {
                client.invoke_on_subscribe(request.params);
                client.send(ClientResponse::success(request.id).to_json_bytes());
            }
            Err(reason) => client.send(
                ClientResponse::error(request.id, ERROR_CODE_INVALID_PAYLOAD, reason)
                    .to_json_bytes(),
            ),
        },
        METHOD_UNSUBSCRIBE => match validate_event_kinds(&request.params, true) {
            Ok(()) => {
                client.invoke_on_unsubscribe(request.params);
                client.send(ClientResponse::success(request.id).to_json_bytes());
            }
            Err(reason) => client.send(
                ClientResponse::error(request.id, ERROR_CODE_INVALID_PAYLOAD, reason)
                    .to_json_bytes(),
            ),
        },
        _ => {}
    }
}

fn validate_event_kinds(params: &[String], allow_empty: bool) -> Result<(), String> {
    if params.is_empty() {
        return if allow_empty {
            Ok(())
        } else {
            Err("params must not be empty".to_owned())
        };
    }
    for param in params {
        if EventKind::from_str(param).is_err() {
            return Err(format!("unknown event kind: {param}"));
        }
    }
    Ok(())
}

async fn writer_loop(
    client: Arc<Client>,
    mut sink: SplitSink<WebSocket, Message>,
    mut send_rx: mpsc::Receiver<Vec<u8>>,
    mut close_rx: watch::Receiver<Option<u16>>,
    config: ClientConfig,
) {
    let mut ticker = interval(config.ping_interval);
    ticker.tick().await; // first tick fires immediately; skip it

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let result = timeout(config.write_wait_timeout, sink.send(Message::Ping(Vec::new()))).await;
                if !matches!(result, Ok(Ok(()))) {
                    warn!(client_id = client.id(), "client: failed to send a ping message");
                    client.close(CLOSE_CODE_GOING_AWAY);
                    break;
                }
            }
            maybe_payload = send_rx.recv() => {
                match maybe_payload {
                    Some(payload) => {
                        let text = String::from_utf8_lossy(&payload).into_owned();
                        let result = timeout(config.write_wait_timeout, sink.send(Message::Text(text))).await;
                        if !matches!(result, Ok(Ok(()))) {
                            warn!(client_id = client.id(), "client: failed to send a message");
                            client.close(CLOSE_CODE_GOING_AWAY);
                            break;
                        }
                    }
                    None => break,
                }
            }
            Ok(()) = close_rx.changed() => {
                if close_rx.borrow().is_some() {
                    break;
                }
            }
        }
    }

    let code = close_rx.borrow().unwrap_or(CLOSE_CODE_GOING_AWAY);
    let _ = timeout(
        config.write_wait_timeout,
        sink.send(Message::Close(Some(CloseFrame {
            code,
            reason: "".into(),
        }))),
    )
    .await;
    let _ = sink.close().await;

    // Idempotent: reaches here even when the loop broke because some
    // other path already called close(); this only guarantees the
    // transition happened for paths that exit without calling it
    // (e.g. the send queue being dropped).
    client.close(code);
    client.invoke_on_close();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ClientConfig {
        ClientConfig {
            write_wait_timeout: Duration::from_secs(1),
            pong_wait_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(5),
            max_read_message_size: 4096,
            send_buffer_size: 4,
        }
    }

    #[test]
    fn factory_rejects_pong_timeout_not_greater_than_ping_interval() {
        let mut cfg = config();
        cfg.pong_wait_timeout = cfg.ping_interval;
        assert!(ClientFactory::new(cfg).is_err());
    }

    #[test]
    fn factory_accepts_valid_config() {
        assert!(ClientFactory::new(config()).is_ok());
    }

    #[test]
    fn max_read_message_size_reflects_the_configured_value() {
        let factory = ClientFactory::new(config()).unwrap();
        assert_eq!(factory.max_read_message_size(), 4096);
    }

    #[test]
    fn validate_event_kinds_rejects_empty_params_unless_allowed() {
        assert!(validate_event_kinds(&[], false).is_err());
        assert!(validate_event_kinds(&[], true).is_ok());
    }

    #[test]
    fn validate_event_kinds_rejects_unknown_kind() {
        assert!(validate_event_kinds(&["NEW_BLOCK".to_owned()], false).is_ok());
        assert!(validate_event_kinds(&["NEW_FOO".to_owned()], false).is_err());
    }
}
