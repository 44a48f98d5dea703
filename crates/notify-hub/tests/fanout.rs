//! End-to-end fan-out scenarios (S1-S6 in the spec's testable-properties
//! section) driven against a real axum server bound to an ephemeral port,
//! using a real `tokio-tungstenite` client on the other end — exactly the
//! shape a live subscriber would see.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use notify_hub::{ClientConfig, ClientFactory, Hub};
use notify_protocol::{Event, EventKind};
use notify_test_support::TestWsClient;
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone)]
struct AppState {
    hub: Hub,
    factory: Arc<ClientFactory>,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let client = state.factory.new_client(socket);
        state.hub.register(client);
    })
}

fn test_client_config() -> ClientConfig {
    ClientConfig {
        write_wait_timeout: Duration::from_secs(1),
        pong_wait_timeout: Duration::from_secs(30),
        ping_interval: Duration::from_secs(10),
        max_read_message_size: 64 * 1024,
        send_buffer_size: 8,
    }
}

async fn spawn_server() -> (String, Hub) {
    let hub = Hub::new(4).unwrap();
    let factory = Arc::new(ClientFactory::new(test_client_config()).unwrap());
    let state = AppState {
        hub: hub.clone(),
        factory,
    };
    let app = Router::new().route("/ws", get(ws_handler)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/ws"), hub)
}

fn block_event(round: u64) -> Event {
    let payload = serde_json::json!({
        "eventType": "NEW_BLOCK",
        "data": { "round": round },
    });
    Event::new(EventKind::NewBlock, serde_json::to_vec(&payload).unwrap())
}

fn payment_event() -> Event {
    let payload = serde_json::json!({
        "eventType": "NEW_PAYMENT_TX",
        "data": { "amount": 5 },
    });
    Event::new(EventKind::NewPaymentTx, serde_json::to_vec(&payload).unwrap())
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

/// S1: a single subscriber to NEW_BLOCK receives one block.
#[tokio::test]
async fn single_subscriber_receives_subscribed_event() {
    let (url, hub) = spawn_server().await;
    let mut client = TestWsClient::connect(&url).await.unwrap();

    client.send_request(1, "SUBSCRIBE", &["NEW_BLOCK"]).await.unwrap();
    let ack = client.recv_json().await.unwrap();
    assert_eq!(ack, serde_json::json!({ "id": 1, "result": null }));

    settle().await;
    hub.send_event(block_event(42)).await;

    let pushed = client.recv_json().await.unwrap();
    assert_eq!(pushed["eventType"], "NEW_BLOCK");
    assert_eq!(pushed["data"]["round"], 42);
}

/// S2: two subscribers, each to one kind, only receive their own kind.
#[tokio::test]
async fn subscribers_only_receive_their_own_kind() {
    let (url, hub) = spawn_server().await;
    let mut a = TestWsClient::connect(&url).await.unwrap();
    let mut b = TestWsClient::connect(&url).await.unwrap();

    a.send_request(1, "SUBSCRIBE", &["NEW_BLOCK"]).await.unwrap();
    assert_eq!(a.recv_json().await.unwrap()["result"], serde_json::Value::Null);
    b.send_request(1, "SUBSCRIBE", &["NEW_PAYMENT_TX"]).await.unwrap();
    assert_eq!(b.recv_json().await.unwrap()["result"], serde_json::Value::Null);

    settle().await;
    hub.send_event(block_event(1)).await;
    hub.send_event(payment_event()).await;

    let a_msg = a.recv_json().await.unwrap();
    assert_eq!(a_msg["eventType"], "NEW_BLOCK");

    let b_msg = b.recv_json().await.unwrap();
    assert_eq!(b_msg["eventType"], "NEW_PAYMENT_TX");

    // Neither client has anything further queued for the other's kind.
    let a_next = tokio::time::timeout(Duration::from_millis(200), a.recv_json()).await;
    assert!(a_next.is_err(), "A should not receive the payment event");
}

/// S3: an unparseable frame gets an id:0, code:400 error; the connection
/// stays open (a follow-up request still works).
#[tokio::test]
async fn bad_frame_returns_error_and_keeps_connection_open() {
    let (url, _hub) = spawn_server().await;
    let mut client = TestWsClient::connect(&url).await.unwrap();

    client.send_text("not json").await.unwrap();
    let resp = client.recv_json().await.unwrap();
    assert_eq!(
        resp,
        serde_json::json!({ "id": 0, "error": { "code": 400, "message": "payload is invalid" } })
    );

    client.send_request(9, "SUBSCRIBE", &["NEW_BLOCK"]).await.unwrap();
    let ack = client.recv_json().await.unwrap();
    assert_eq!(ack, serde_json::json!({ "id": 9, "result": null }));
}

/// S4: an unknown subscription param is rejected with code 400 and the
/// request's id; no subscription is added.
#[tokio::test]
async fn unknown_subscription_param_is_rejected() {
    let (url, _hub) = spawn_server().await;
    let mut client = TestWsClient::connect(&url).await.unwrap();

    client.send_request(7, "SUBSCRIBE", &["NEW_FOO"]).await.unwrap();
    let resp = client.recv_json().await.unwrap();
    assert_eq!(resp["id"], 7);
    assert_eq!(resp["error"]["code"], 400);
}

/// S5: disconnecting a client removes it from the registry and prunes
/// every subscription entry for it. Observed through the hub's own
/// prometheus gauges rather than internal state, the way an operator
/// would.
#[tokio::test]
async fn disconnect_removes_client_and_prunes_subscriptions() {
    let (url, hub) = spawn_server().await;
    {
        let mut client = TestWsClient::connect(&url).await.unwrap();
        client
            .send_request(1, "SUBSCRIBE", &["NEW_BLOCK"])
            .await
            .unwrap();
        assert_eq!(client.recv_json().await.unwrap()["result"], serde_json::Value::Null);
        settle().await;

        let families = hub.metrics_registry().gather();
        let connections = families
            .iter()
            .find(|f| f.name() == "active_connections")
            .unwrap();
        assert_eq!(connections.get_metric()[0].get_gauge().value(), 1.0);

        // client dropped here; the underlying TCP connection closes.
    }

    settle().await;
    settle().await;

    let families = hub.metrics_registry().gather();
    let connections = families
        .iter()
        .find(|f| f.name() == "active_connections")
        .unwrap();
    assert_eq!(connections.get_metric()[0].get_gauge().value(), 0.0);

    let subs = families
        .iter()
        .find(|f| f.name() == "active_subscription")
        .unwrap();
    let new_block = subs
        .get_metric()
        .iter()
        .find(|m| m.get_label().iter().any(|l| l.value() == "NEW_BLOCK"))
        .unwrap();
    assert_eq!(new_block.get_gauge().value(), 0.0);
}

/// Unsubscribing from a kind the client was never subscribed to is a
/// no-op: no error response, and the client keeps working afterward.
#[tokio::test]
async fn unsubscribe_of_unsubscribed_kind_is_a_no_op() {
    let (url, _hub) = spawn_server().await;
    let mut client = TestWsClient::connect(&url).await.unwrap();

    client
        .send_request(3, "UNSUBSCRIBE", &["NEW_PAYMENT_TX"])
        .await
        .unwrap();
    let resp = client.recv_json().await.unwrap();
    assert_eq!(resp, serde_json::json!({ "id": 3, "result": null }));
}
