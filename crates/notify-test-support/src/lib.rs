//! Shared test utilities for driving a real websocket server in
//! integration tests: a thin client over `tokio-tungstenite`.

pub mod ws_client;

pub use ws_client::TestWsClient;
