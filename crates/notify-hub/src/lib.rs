//! The server-side fan-out core: the per-connection client state machine
//! and the central hub that owns the subscription index and dispatches
//! events to it.

pub mod client;
pub mod hub;
pub mod metrics;

pub use client::{Client, ClientConfig, ClientError, ClientFactory, CLOSE_CODE_GOING_AWAY};
pub use hub::{Hub, HubError};
pub use metrics::HubMetrics;
