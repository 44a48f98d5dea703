//! Wire types shared between the event decoder, the hub, and connected
//! websocket clients.
//!
//! Nothing in this crate touches sockets, channels, or I/O — it is the
//! shared vocabulary the other crates serialize and deserialize.

use serde::{Deserialize, Serialize};
use std::fmt;
use strum_macros::{AsRefStr, EnumIter, EnumString};

/// The closed set of event kinds this service ever emits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString, EnumIter,
)]
pub enum EventKind {
    #[strum(serialize = "NEW_BLOCK")]
    #[serde(rename = "NEW_BLOCK")]
    NewBlock,
    #[strum(serialize = "NEW_PAYMENT_TX")]
    #[serde(rename = "NEW_PAYMENT_TX")]
    NewPaymentTx,
    #[strum(serialize = "NEW_KEY_REGISTRATION_TX")]
    #[serde(rename = "NEW_KEY_REGISTRATION_TX")]
    NewKeyRegistrationTx,
    #[strum(serialize = "NEW_ASSET_CONFIG_TX")]
    #[serde(rename = "NEW_ASSET_CONFIG_TX")]
    NewAssetConfigTx,
    #[strum(serialize = "NEW_ASSET_TRANSFER_TX")]
    #[serde(rename = "NEW_ASSET_TRANSFER_TX")]
    NewAssetTransferTx,
    #[strum(serialize = "NEW_ASSET_FREEZE_TX")]
    #[serde(rename = "NEW_ASSET_FREEZE_TX")]
    NewAssetFreezeTx,
    #[strum(serialize = "NEW_APPLICATION_CALL_TX")]
    #[serde(rename = "NEW_APPLICATION_CALL_TX")]
    NewApplicationCallTx,
    #[strum(serialize = "NEW_STATE_PROOF_TX")]
    #[serde(rename = "NEW_STATE_PROOF_TX")]
    NewStateProofTx,
}

impl EventKind {
    /// All event kinds, in the order they appear in the spec's table.
    pub const ALL: [EventKind; 8] = [
        EventKind::NewBlock,
        EventKind::NewPaymentTx,
        EventKind::NewKeyRegistrationTx,
        EventKind::NewAssetConfigTx,
        EventKind::NewAssetTransferTx,
        EventKind::NewAssetFreezeTx,
        EventKind::NewApplicationCallTx,
        EventKind::NewStateProofTx,
    ];

    /// Maps an indexer transaction-type tag (`pay`, `keyreg`, ...) to the
    /// event kind it produces. Returns `None` for an unrecognized tag.
    #[must_use]
    pub fn from_tx_type(tx_type: &str) -> Option<EventKind> {
        Some(match tx_type {
            "pay" => EventKind::NewPaymentTx,
            "keyreg" => EventKind::NewKeyRegistrationTx,
            "acfg" => EventKind::NewAssetConfigTx,
            "axfer" => EventKind::NewAssetTransferTx,
            "afrz" => EventKind::NewAssetFreezeTx,
            "appl" => EventKind::NewApplicationCallTx,
            "stpf" => EventKind::NewStateProofTx,
            _ => return None,
        })
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// An immutable, already-serialized event ready to forward to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    /// Lower-camel-case JSON object: `{"eventType": ..., "data": ...}`.
    pub payload: Vec<u8>,
}

impl Event {
    #[must_use]
    pub fn new(kind: EventKind, payload: Vec<u8>) -> Self {
        Self { kind, payload }
    }
}

/// A subscription request sent by a connected client.
///
/// `params` is left as raw strings so the hub/client layer can validate
/// them against [`EventKind`] and report a precise error on mismatch.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ClientRequest {
    #[serde(default)]
    pub id: i64,
    pub method: String,
    #[serde(default)]
    pub params: Vec<String>,
}

pub const METHOD_SUBSCRIBE: &str = "SUBSCRIBE";
pub const METHOD_UNSUBSCRIBE: &str = "UNSUBSCRIBE";

/// The two frames a client can receive in response to a request. Events
/// pushed by the hub use [`EventEnvelope`] instead.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum ClientResponse {
    Success { id: i64, result: Option<()> },
    Error { id: i64, error: ResponseError },
}

impl ClientResponse {
    #[must_use]
    pub fn success(id: i64) -> Self {
        ClientResponse::Success { id, result: None }
    }

    #[must_use]
    pub fn error(id: i64, code: u16, message: impl Into<String>) -> Self {
        ClientResponse::Error {
            id,
            error: ResponseError {
                code,
                message: message.into(),
            },
        }
    }

    /// Serialize to the bytes that go out on the wire as a single text frame.
    #[must_use]
    pub fn to_json_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"id":0,"error":{"code":500,"message":"failed to encode response"}}"#.to_vec()
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ResponseError {
    pub code: u16,
    pub message: String,
}

pub const ERROR_CODE_INVALID_PAYLOAD: u16 = 400;

/// The push envelope a server-pushed event is wrapped in. This is the
/// canonical shape of `Event::payload`; the decoder constructs this
/// directly and callers generally never need to build one by hand.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventEnvelope<T> {
    #[serde(rename = "eventType")]
    pub event_type: EventKind,
    pub data: T,
}
