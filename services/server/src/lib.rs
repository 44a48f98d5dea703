pub mod metrics;
pub mod upgrade;

use axum::routing::get;
use axum::Router;
use notify_hub::{ClientFactory, Hub};
use std::sync::Arc;

/// Shared state handed to every axum handler: the hub clients register
/// with, and the factory that wraps raw upgraded sockets into `Client`s.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub client_factory: Arc<ClientFactory>,
}

/// Builds the websocket-facing router (component F: the upgrade handler).
/// The `/metrics` route is served separately, on `METRICS_PORT`, by
/// [`metrics::router`].
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(upgrade::ws_upgrade_handler))
        .with_state(state)
}
