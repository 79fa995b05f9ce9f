//! Message envelope and factory
//!
//! Envelopes carry their payload in the application's camelCase convention.
//! Conversion to the server's snake_case happens exactly once on the way out
//! ([`Envelope::to_wire`]) and once on the way in ([`normalize_inbound`],
//! applied by the dispatcher).

use helpdesk_shared::{keys_to_camel, keys_to_snake, EventTag, ProtocolError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

/// The `{event, payload, timestamp}` unit exchanged over the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: EventTag,
    #[serde(default)]
    pub payload: Value,
    #[serde(with = "wire_timestamp", default = "OffsetDateTime::now_utc")]
    pub timestamp: OffsetDateTime,
}

impl Envelope {
    /// Serialize for transmission, converting payload keys to wire casing
    pub fn to_wire(&self) -> Result<String, serde_json::Error> {
        let wire = Envelope {
            event: self.event.clone(),
            payload: normalize_outbound(self.payload.clone()),
            timestamp: self.timestamp,
        };
        serde_json::to_string(&wire)
    }

    /// Parse a received frame; the payload is left in wire casing
    pub fn from_wire(frame: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(frame)?)
    }

    /// String field of the payload, if present
    pub fn payload_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(Value::as_str)
    }
}

/// Build an outbound envelope stamped with the current time
pub fn build(event: EventTag, payload: Value) -> Envelope {
    Envelope {
        event,
        payload,
        timestamp: OffsetDateTime::now_utc(),
    }
}

/// Application casing -> wire casing
pub fn normalize_outbound(payload: Value) -> Value {
    keys_to_snake(payload)
}

/// Wire casing -> application casing
pub fn normalize_inbound(payload: Value) -> Value {
    keys_to_camel(payload)
}

/// Timestamps go out as RFC 3339; inbound frames may also carry epoch millis
mod wire_timestamp {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::Rfc3339;
    use time::OffsetDateTime;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawTimestamp {
        Text(String),
        Millis(i64),
    }

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        let text = value.format(&Rfc3339).map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&text)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        match RawTimestamp::deserialize(deserializer)? {
            RawTimestamp::Text(text) => OffsetDateTime::parse(&text, &Rfc3339).map_err(de::Error::custom),
            RawTimestamp::Millis(millis) => {
                OffsetDateTime::from_unix_timestamp_nanos(i128::from(millis) * 1_000_000)
                    .map_err(de::Error::custom)
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_stamps_current_time() {
        let before = OffsetDateTime::now_utc();
        let envelope = build(EventTag::SendMessage, json!({ "content": "hi" }));
        assert_eq!(envelope.event, EventTag::SendMessage);
        assert!(envelope.timestamp >= before);
    }

    #[test]
    fn test_to_wire_converts_payload_keys() {
        let envelope = build(
            EventTag::SendMessage,
            json!({ "conversationId": "42", "content": "hello" }),
        );
        let frame: Value = serde_json::from_str(&envelope.to_wire().unwrap()).unwrap();
        assert_eq!(frame["event"], "send_message");
        assert_eq!(frame["payload"], json!({ "conversation_id": "42", "content": "hello" }));
        assert!(frame["timestamp"].is_string());

        // the envelope itself keeps application casing
        assert_eq!(envelope.payload["conversationId"], "42");
    }

    #[test]
    fn test_from_wire_keeps_wire_casing() {
        let envelope = Envelope::from_wire(
            r#"{"event":"new_message","payload":{"conversation_id":"7"},"timestamp":"2024-05-01T10:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(envelope.event, EventTag::NewMessage);
        assert_eq!(envelope.payload_str("conversation_id"), Some("7"));
        assert_eq!(envelope.timestamp.year(), 2024);
    }

    #[test]
    fn test_from_wire_accepts_millis_and_missing_fields() {
        let envelope = Envelope::from_wire(r#"{"event":"pong","timestamp":1714557600000}"#).unwrap();
        assert_eq!(envelope.event, EventTag::Pong);
        assert_eq!(envelope.payload, Value::Null);
        assert_eq!(envelope.timestamp.unix_timestamp(), 1_714_557_600);

        let envelope = Envelope::from_wire(r#"{"event":"ping"}"#).unwrap();
        assert_eq!(envelope.event, EventTag::Ping);
    }

    #[test]
    fn test_from_wire_rejects_garbage() {
        assert!(matches!(
            Envelope::from_wire("{not json"),
            Err(ProtocolError::MalformedFrame(_))
        ));
        assert!(Envelope::from_wire(r#"{"payload":{}}"#).is_err());
    }
}
