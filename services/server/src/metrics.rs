//! The `/metrics` Prometheus scrape route, served on `METRICS_PORT`
//! alongside (but separate from) the websocket route on `PORT`.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, TextEncoder};

use crate::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/metrics", get(scrape))
        .with_state(state)
}

async fn scrape(State(state): State<AppState>) -> impl IntoResponse {
    let families = state.hub.metrics_registry().gather();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    if let Err(err) = encoder.encode(&families, &mut buf) {
        tracing::warn!(error = %err, "failed to encode metrics");
    }
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_owned())], buf)
}
