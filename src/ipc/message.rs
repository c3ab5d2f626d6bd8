//! The line-delimited JSON IPC dialect (§4.6/§6): one object per line,
//! required `type`, optional `id`/`timestamp`/`payload`. `payload` may be a
//! bare string or a nested JSON object/array — modeled as a sum type so
//! both shapes round-trip.
//!
//! Inbound messages are parsed with `serde_json`, which is a conformant
//! superset of a hand-rolled permissive line parser; outbound messages use
//! `Serialize`-derived strict construction.

use base64::Engine as _;
use chrono::Utc;
use serde::{Deserialize, Serialize};

pub const IPC_MAX_MESSAGE_SIZE: usize = 4096;
pub const IPC_BUFFER_SIZE: usize = 8192;

/// `payload` can be a bare string or an arbitrary nested JSON value.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum PayloadValue {
    Str(String),
    Json(serde_json::Value),
}

impl PayloadValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PayloadValue::Str(s) => Some(s),
            PayloadValue::Json(_) => None,
        }
    }
}

/// One IPC message, either direction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct IpcMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<PayloadValue>,
}

impl IpcMessage {
    pub fn new(message_type: impl Into<String>) -> Self {
        IpcMessage { message_type: message_type.into(), id: None, timestamp: None, payload: None }
    }

    pub fn with_payload(mut self, payload: PayloadValue) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_str_payload(self, payload: impl Into<String>) -> Self {
        self.with_payload(PayloadValue::Str(payload.into()))
    }

    pub fn with_json_payload(self, payload: serde_json::Value) -> Self {
        self.with_payload(PayloadValue::Json(payload))
    }

    /// Stamp `id`/`timestamp` the way the original `send` path does:
    /// `msg_<tick>_<rand>` and an RFC 3339 / ISO-8601 UTC timestamp.
    pub fn stamped(mut self, tick: u64, rand_suffix: u32) -> Self {
        self.id = Some(format!("msg_{tick}_{rand_suffix}"));
        self.timestamp = Some(Utc::now().to_rfc3339());
        self
    }

    /// A line not parseable as JSON is delivered as a `RAW` message
    /// carrying the whole line, rather than dropped — this keeps the IPC
    /// layer fault-tolerant to ease debugging (§4.6).
    pub fn raw(line: &str) -> Self {
        IpcMessage::new("RAW").with_str_payload(line)
    }

    /// Parse one LF-stripped line. Never fails: unparseable input becomes
    /// a `RAW` message.
    pub fn parse_line(line: &str) -> Self {
        serde_json::from_str::<IpcMessage>(line).unwrap_or_else(|_| IpcMessage::raw(line))
    }

    /// Serialize to one LF-terminated line.
    pub fn to_line(&self) -> String {
        format!("{}\n", serde_json::to_string(self).expect("IpcMessage always serializes"))
    }
}

/// RFC 4648 Base64-encode payload bytes for a JSON-string field. Replaces
/// the historical `"Base64PlaceholderData"` literal placeholder (§9).
pub fn encode_base64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

pub fn decode_base64(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(encoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_string_payload() {
        let msg = IpcMessage::new("PING_TEST").with_str_payload("hello");
        let line = msg.to_line();
        let parsed = IpcMessage::parse_line(line.trim_end());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn round_trips_nested_json_payload() {
        let msg = IpcMessage::new("FORWARD_TO_DEVICE").with_json_payload(serde_json::json!({"command_id": 0x14, "data": [1, 2, 3]}));
        let line = msg.to_line();
        let parsed = IpcMessage::parse_line(line.trim_end());
        assert_eq!(parsed, msg);
    }

    #[test]
    fn unparseable_line_becomes_raw() {
        let parsed = IpcMessage::parse_line("not json at all {{{");
        assert_eq!(parsed.message_type, "RAW");
        assert_eq!(parsed.payload, Some(PayloadValue::Str("not json at all {{{".into())));
    }

    #[test]
    fn base64_round_trips() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0xFF];
        let encoded = encode_base64(&bytes);
        assert_ne!(encoded, "Base64PlaceholderData");
        assert_eq!(decode_base64(&encoded).unwrap(), bytes);
    }
}
