//! The HTTP→websocket handshake: accept the upgrade, hand the socket to
//! the client factory, and register the resulting client with the hub.
//!
//! Matches `services/server/src/ws_forwarder.rs`'s `ws_*_handler` +
//! `on_upgrade` shape. Handshake failures never reach this handler — axum
//! answers them itself before `ws_upgrade_handler` runs; this body only
//! ever runs after a successful upgrade.

use crate::AppState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::response::IntoResponse;

pub async fn ws_upgrade_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let ws = ws.max_message_size(state.client_factory.max_read_message_size());
    ws.on_upgrade(move |socket| async move {
        let client = state.client_factory.new_client(socket);
        state.hub.register(client);
    })
}
