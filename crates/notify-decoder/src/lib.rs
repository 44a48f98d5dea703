//! Decodes one confirmed block into its ordered sequence of typed events.
//!
//! The decoder never mutates its input and never emits partial output: a
//! block either decodes fully or [`decode`] returns a [`DecodeError`] and
//! the caller drops the message.

use notify_protocol::{Event, EventKind};
use serde_json::{Map, Value};
use std::fmt;

/// Kebab-case keys that select which kind-specific nested object is kept
/// on a normalized transaction record. Every key in this list except the
/// one matching the transaction's own type is stripped before the payload
/// is emitted.
const KIND_SPECIFIC_KEYS: &[&str] = &[
    "payment-transaction",
    "keyreg-transaction",
    "asset-config-transaction",
    "asset-transfer-transaction",
    "asset-freeze-transaction",
    "application-transaction",
    "state-proof-transaction",
];

fn kind_specific_key(tx_type: &str) -> Option<&'static str> {
    Some(match tx_type {
        "pay" => "payment-transaction",
        "keyreg" => "keyreg-transaction",
        "acfg" => "asset-config-transaction",
        "axfer" => "asset-transfer-transaction",
        "afrz" => "asset-freeze-transaction",
        "appl" => "application-transaction",
        "stpf" => "state-proof-transaction",
        _ => return None,
    })
}

/// Decodes a raw block payload into an ordered sequence of events: the
/// block event first, then one event per transaction in block order.
pub fn decode(block_bytes: &[u8]) -> Result<Vec<Event>, DecodeError> {
    let raw: Value = serde_json::from_slice(block_bytes).map_err(DecodeError::InvalidJson)?;
    let obj = raw.as_object().ok_or(DecodeError::NotAnObject)?;

    let mut events = Vec::with_capacity(1 + obj.get("transactions").and_then(Value::as_array).map_or(0, Vec::len));
    events.push(block_event(&raw)?);

    if let Some(transactions) = obj.get("transactions").and_then(Value::as_array) {
        for tx in transactions {
            match transaction_event(tx)? {
                Some(event) => events.push(event),
                None => {
                    tracing::warn!("decoder: skipping malformed or unrecognized transaction");
                }
            }
        }
    }

    Ok(events)
}

fn block_event(raw_block: &Value) -> Result<Event, DecodeError> {
    let envelope = envelope(EventKind::NewBlock, raw_block.clone());
    let payload = serde_json::to_vec(&convert_keys(envelope)).map_err(DecodeError::Encode)?;
    Ok(Event::new(EventKind::NewBlock, payload))
}

/// Returns `Ok(None)` for a transaction this decoder cannot turn into an
/// event — not an object, missing `tx-type`, or an unrecognized tag — so
/// a single malformed transaction never aborts the rest of the block.
fn transaction_event(tx: &Value) -> Result<Option<Event>, DecodeError> {
    let Some(tx_obj) = tx.as_object() else {
        return Ok(None);
    };
    let Some(tx_type) = tx_obj.get("tx-type").and_then(Value::as_str) else {
        return Ok(None);
    };

    let Some(kind) = EventKind::from_tx_type(tx_type) else {
        return Ok(None);
    };
    let keep = kind_specific_key(tx_type);

    let mut normalized = Map::with_capacity(tx_obj.len());
    for (key, value) in tx_obj {
        if KIND_SPECIFIC_KEYS.contains(&key.as_str()) && Some(key.as_str()) != keep {
            continue;
        }
        normalized.insert(key.clone(), value.clone());
    }

    let envelope = envelope(kind, Value::Object(normalized));
    let payload = serde_json::to_vec(&convert_keys(envelope)).map_err(DecodeError::Encode)?;
    Ok(Some(Event::new(kind, payload)))
}

fn envelope(kind: EventKind, data: Value) -> Value {
    let mut obj = Map::with_capacity(2);
    obj.insert("eventType".to_owned(), Value::String(kind.to_string()));
    obj.insert("data".to_owned(), data);
    Value::Object(obj)
}

/// Recursively rewrites every object key from kebab/snake case to
/// lower-camel-case. String *values* are left untouched — only the
/// structural position of a key is rewritten, so a hyphen inside a
/// value (e.g. a note field) never gets mangled.
///
/// This is a fixed point on already-camelCase input: rewriting twice
/// produces the same result as rewriting once.
#[must_use]
pub fn convert_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::with_capacity(map.len());
            for (key, val) in map {
                out.insert(to_lower_camel_case(&key), convert_keys(val));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(convert_keys).collect()),
        other => other,
    }
}

fn to_lower_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut capitalize_next = false;
    for ch in key.chars() {
        if ch == '-' || ch == '_' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            out.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(ch);
        }
    }
    out
}

#[derive(Debug)]
pub enum DecodeError {
    InvalidJson(serde_json::Error),
    NotAnObject,
    MissingField(&'static str),
    Encode(serde_json::Error),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::InvalidJson(e) => write!(f, "block payload is not valid JSON: {e}"),
            DecodeError::NotAnObject => write!(f, "block payload is not a JSON object"),
            DecodeError::MissingField(field) => write!(f, "missing required field: {field}"),
            DecodeError::Encode(e) => write!(f, "failed to encode event payload: {e}"),
        }
    }
}

impl std::error::Error for DecodeError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_json(round: u64, transactions: Vec<Value>) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "round": round,
            "genesis-id": "mainnet-v1.0",
            "transactions": transactions,
        }))
        .unwrap()
    }

    #[test]
    fn decode_emits_block_event_first_with_no_transactions() {
        let bytes = block_json(42, vec![]);
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::NewBlock);

        let parsed: Value = serde_json::from_slice(&events[0].payload).unwrap();
        assert_eq!(parsed["eventType"], "NEW_BLOCK");
        assert_eq!(parsed["data"]["round"], 42);
        assert_eq!(parsed["data"]["genesisId"], "mainnet-v1.0");
    }

    #[test]
    fn decode_maps_every_known_tx_type_to_its_event_kind() {
        let cases = [
            ("pay", EventKind::NewPaymentTx, "payment-transaction"),
            ("keyreg", EventKind::NewKeyRegistrationTx, "keyreg-transaction"),
            ("acfg", EventKind::NewAssetConfigTx, "asset-config-transaction"),
            (
                "axfer",
                EventKind::NewAssetTransferTx,
                "asset-transfer-transaction",
            ),
            ("afrz", EventKind::NewAssetFreezeTx, "asset-freeze-transaction"),
            (
                "appl",
                EventKind::NewApplicationCallTx,
                "application-transaction",
            ),
            ("stpf", EventKind::NewStateProofTx, "state-proof-transaction"),
        ];

        for (tag, kind, nested_key) in cases {
            let tx = json!({
                "tx-type": tag,
                "sender": "ABC",
                nested_key: { "amount": 5 },
            });
            let bytes = block_json(1, vec![tx]);
            let events = decode(&bytes).unwrap();
            assert_eq!(events.len(), 2, "tag {tag}");
            assert_eq!(events[1].kind, kind, "tag {tag}");
        }
    }

    #[test]
    fn decode_drops_other_kind_specific_fields_keeping_only_the_matching_one() {
        let tx = json!({
            "tx-type": "pay",
            "payment-transaction": { "amount": 5 },
            "asset-config-transaction": { "params": {} },
        });
        let bytes = block_json(1, vec![tx]);
        let events = decode(&bytes).unwrap();
        let parsed: Value = serde_json::from_slice(&events[1].payload).unwrap();
        assert!(parsed["data"]["paymentTransaction"].is_object());
        assert!(parsed["data"]["assetConfigTransaction"].is_null());
    }

    #[test]
    fn decode_preserves_block_then_transaction_order() {
        let tx1 = json!({ "tx-type": "pay" });
        let tx2 = json!({ "tx-type": "axfer" });
        let bytes = block_json(7, vec![tx1, tx2]);
        let events = decode(&bytes).unwrap();
        assert_eq!(
            events.iter().map(|e| e.kind).collect::<Vec<_>>(),
            vec![
                EventKind::NewBlock,
                EventKind::NewPaymentTx,
                EventKind::NewAssetTransferTx
            ]
        );
    }

    #[test]
    fn decode_skips_unrecognized_tx_type_but_keeps_the_rest() {
        let known = json!({ "tx-type": "pay" });
        let unknown = json!({ "tx-type": "zzzz" });
        let bytes = block_json(1, vec![unknown, known]);
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, EventKind::NewPaymentTx);
    }

    #[test]
    fn decode_skips_transaction_missing_tx_type_but_keeps_the_block_and_rest() {
        let missing_type = json!({ "sender": "ABC" });
        let known = json!({ "tx-type": "pay" });
        let bytes = block_json(1, vec![missing_type, known]);
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::NewBlock);
        assert_eq!(events[1].kind, EventKind::NewPaymentTx);
    }

    #[test]
    fn decode_skips_non_object_transaction_but_keeps_the_block_and_rest() {
        let non_object = json!("not-a-transaction");
        let known = json!({ "tx-type": "pay" });
        let bytes = block_json(1, vec![non_object, known]);
        let events = decode(&bytes).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::NewBlock);
        assert_eq!(events[1].kind, EventKind::NewPaymentTx);
    }

    #[test]
    fn decode_rejects_non_object_input() {
        let err = decode(b"[1,2,3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn decode_rejects_invalid_json() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, DecodeError::InvalidJson(_)));
    }

    #[test]
    fn convert_keys_rewrites_kebab_and_snake_keys_without_touching_values() {
        let input = json!({
            "tx-type": "pay",
            "note_field": "has-a-hyphen-in-the-value",
            "nested": { "first-valid": 1, "items": [{"asset-id": 9}] },
        });
        let out = convert_keys(input);
        assert_eq!(out["txType"], "pay");
        assert_eq!(out["noteField"], "has-a-hyphen-in-the-value");
        assert_eq!(out["nested"]["firstValid"], 1);
        assert_eq!(out["nested"]["items"][0]["assetId"], 9);
    }

    #[test]
    fn convert_keys_is_idempotent() {
        let input = json!({ "already-camel": 1, "alreadyCamel": 2 });
        let once = convert_keys(input.clone());
        let twice = convert_keys(once.clone());
        assert_eq!(once, twice);
    }
}
