//! The monitor's `/metrics` scrape route. The monitor owns no gauges of
//! its own (`active_connections`/`active_subscription` are server-side
//! concepts); it still serves the endpoint on `METRICS_PORT` so operators
//! always find a scrape target at the configured port.

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use prometheus::{Encoder, Registry, TextEncoder};

pub fn router() -> Router {
    Router::new().route("/metrics", get(scrape))
}

async fn scrape() -> impl IntoResponse {
    let registry = Registry::new();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    let _ = encoder.encode(&registry.gather(), &mut buf);
    ([(axum::http::header::CONTENT_TYPE, encoder.format_type().to_owned())], buf)
}
