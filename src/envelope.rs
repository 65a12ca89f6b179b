//! Wire-format definitions for guaranteed-delivery frames.
//!
//! Every guaranteed message travels inside an [`Envelope`] sent on the
//! message's **own** event name; every acknowledgment travels as an [`Ack`]
//! on the single reserved control event [`ACK_EVENT`].  This module is
//! responsible for:
//! - Defining the JSON wire shapes and the correlation-id type.
//! - Serialising frames into [`serde_json::Value`]s ready for transmission.
//! - Parsing raw incoming values back into frames, returning errors for
//!   values that are not (or not valid) frames.
//!
//! No I/O happens here — this is pure data transformation.
//!
//! # Wire format
//!
//! ```text
//! guaranteed message (on its own event name):
//!   {"correlationId": "<uuid>", "payload": <msg>}
//!
//! acknowledgment (on the reserved "gd_ack" event):
//!   {"id": "<uuid>", "data": <value>}        // "data" omitted when absent
//! ```
//!
//! Parsing is deliberately tolerant: a value is only considered an envelope
//! when it is a JSON object carrying a `correlationId` key.  Everything else
//! — including an object whose `correlationId` does not parse as a UUID — is
//! reported as [`WireError`] and handed through to the application unchanged
//! by the router.  Malformed frames never fail the protocol.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Reserved control event carrying [`Ack`] frames for **all** guaranteed
/// messages, regardless of their original event name.
pub const ACK_EVENT: &str = "gd_ack";

/// Transport-produced notification that the underlying connection came back.
/// Consumed (never produced) by the binding layer to trigger a full resend.
pub const RECONNECT_EVENT: &str = "reconnect";

/// JSON key whose presence marks an incoming object as an [`Envelope`].
const CORRELATION_KEY: &str = "correlationId";

// ---------------------------------------------------------------------------
// MessageId
// ---------------------------------------------------------------------------

/// Correlation identifier assigned to a guaranteed message.
///
/// Matches a message with its eventual acknowledgment.  Process-unique is
/// all the protocol needs; a v4 UUID gives global uniqueness for free.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh, globally unique id.
    pub fn fresh() -> Self {
        Self(Uuid::new_v4())
    }

    /// Build a deterministic id from a raw integer.  Intended for tests that
    /// need predictable ids.
    pub fn from_u128(n: u128) -> Self {
        Self(Uuid::from_u128(n))
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can arise when parsing a raw incoming value as a frame.
///
/// None of these are user-visible failures: the router treats any parse
/// error as "not a guaranteed frame" and passes the raw value through, and
/// the binding ignores unparsable acks.
#[derive(Debug, Error)]
pub enum WireError {
    /// The value is not a JSON object carrying a `correlationId` key.
    #[error("value is not a guaranteed-delivery envelope")]
    NotAnEnvelope,
    /// The value is not a JSON object carrying an `id` key.
    #[error("value is not an acknowledgment frame")]
    NotAnAck,
    /// The marker key is present but the frame does not deserialize.
    #[error("malformed frame: {0}")]
    Malformed(#[source] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Wrapper distinguishing a guaranteed message from a raw one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Correlation id the receiver echoes back in its [`Ack`].
    #[serde(rename = "correlationId")]
    pub correlation_id: MessageId,
    /// The application payload, opaque to the protocol.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    pub fn new(correlation_id: MessageId, payload: Value) -> Self {
        Self {
            correlation_id,
            payload,
        }
    }

    /// Serialise into the on-wire JSON shape.
    pub fn to_value(&self) -> Value {
        json!({
            CORRELATION_KEY: self.correlation_id,
            "payload": self.payload,
        })
    }

    /// Parse a raw incoming value as an envelope.
    ///
    /// Returns [`WireError::NotAnEnvelope`] when the value does not carry the
    /// `correlationId` marker at all, and [`WireError::Malformed`] when the
    /// marker is present but the frame does not deserialize (e.g. the id is
    /// not a UUID).  The caller still owns `value` and can pass it through.
    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let obj = value.as_object().ok_or(WireError::NotAnEnvelope)?;
        if !obj.contains_key(CORRELATION_KEY) {
            return Err(WireError::NotAnEnvelope);
        }
        serde_json::from_value(value.clone()).map_err(WireError::Malformed)
    }
}

// ---------------------------------------------------------------------------
// Ack
// ---------------------------------------------------------------------------

/// Control frame confirming receipt of one correlation id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ack {
    /// Id of the message being acknowledged.
    pub id: MessageId,
    /// Optional application data carried back to the sender's ack callback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Ack {
    pub fn new(id: MessageId, data: Option<Value>) -> Self {
        Self { id, data }
    }

    /// Serialise into the on-wire JSON shape (`data` omitted when `None`).
    pub fn to_value(&self) -> Value {
        match &self.data {
            Some(data) => json!({ "id": self.id, "data": data }),
            None => json!({ "id": self.id }),
        }
    }

    /// Parse a raw incoming value as an ack frame.
    pub fn from_value(value: &Value) -> Result<Self, WireError> {
        let obj = value.as_object().ok_or(WireError::NotAnAck)?;
        if !obj.contains_key("id") {
            return Err(WireError::NotAnAck);
        }
        serde_json::from_value(value.clone()).map_err(WireError::Malformed)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip() {
        let env = Envelope::new(MessageId::from_u128(7), json!({"hello": "world"}));
        let parsed = Envelope::from_value(&env.to_value()).unwrap();
        assert_eq!(parsed, env);
    }

    #[test]
    fn envelope_null_payload_tolerated() {
        let raw = json!({"correlationId": MessageId::from_u128(1)});
        let parsed = Envelope::from_value(&raw).unwrap();
        assert_eq!(parsed.payload, Value::Null);
    }

    #[test]
    fn plain_object_is_not_an_envelope() {
        let raw = json!({"hello": "world"});
        assert!(matches!(
            Envelope::from_value(&raw),
            Err(WireError::NotAnEnvelope)
        ));
    }

    #[test]
    fn non_object_is_not_an_envelope() {
        for raw in [json!("text"), json!(42), json!(true), json!([1, 2])] {
            assert!(matches!(
                Envelope::from_value(&raw),
                Err(WireError::NotAnEnvelope)
            ));
        }
    }

    #[test]
    fn bad_correlation_id_is_malformed() {
        // Marker present, but the id is not a UUID.
        let raw = json!({"correlationId": "not-a-uuid", "payload": 1});
        assert!(matches!(
            Envelope::from_value(&raw),
            Err(WireError::Malformed(_))
        ));
    }

    #[test]
    fn envelope_extra_keys_ignored() {
        let raw = json!({
            "correlationId": MessageId::from_u128(3),
            "payload": "p",
            "extra": "ignored",
        });
        let parsed = Envelope::from_value(&raw).unwrap();
        assert_eq!(parsed.correlation_id, MessageId::from_u128(3));
        assert_eq!(parsed.payload, json!("p"));
    }

    #[test]
    fn ack_roundtrip_with_data() {
        let ack = Ack::new(MessageId::from_u128(9), Some(json!({"ok": true})));
        let parsed = Ack::from_value(&ack.to_value()).unwrap();
        assert_eq!(parsed, ack);
    }

    #[test]
    fn ack_without_data_omits_field() {
        let ack = Ack::new(MessageId::from_u128(9), None);
        let wire = ack.to_value();
        assert!(wire.get("data").is_none());
        assert_eq!(Ack::from_value(&wire).unwrap().data, None);
    }

    #[test]
    fn ack_requires_id_key() {
        assert!(matches!(
            Ack::from_value(&json!({"data": 1})),
            Err(WireError::NotAnAck)
        ));
    }

    #[test]
    fn fresh_ids_are_unique() {
        let a = MessageId::fresh();
        let b = MessageId::fresh();
        assert_ne!(a, b);
    }
}
