//! Signaling envelope codec.
//!
//! Inbound frames are JSON objects `{type, to, roomId, ...payload}`. The relay
//! forwards `{type, from, roomId, ...payload}` to the recipient and answers the
//! sender with either an error notice or a `peer_offline` notice.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::ids::UserId;

/// Room used when a frame carries no usable `roomId`.
pub const DEFAULT_ROOM_ID: &str = "default";

/// Detail sent back for an unrecognized `type`.
pub const UNKNOWN_TYPE_DETAIL: &str = "Unknown message type.";

/// Detail sent back for a missing or malformed `to`.
pub const INVALID_RECIPIENT_DETAIL: &str = "Missing/invalid 'to' user id.";

/// The four negotiation messages the relay understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Offer,
    Answer,
    Candidate,
    Hangup,
}

impl MessageType {
    pub const ALL: [MessageType; 4] = [Self::Offer, Self::Answer, Self::Candidate, Self::Hangup];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offer => "offer",
            Self::Answer => "answer",
            Self::Candidate => "candidate",
            Self::Hangup => "hangup",
        }
    }

    pub fn is_hangup(self) -> bool {
        matches!(self, Self::Hangup)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = EnvelopeError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offer" => Ok(Self::Offer),
            "answer" => Ok(Self::Answer),
            "candidate" => Ok(Self::Candidate),
            "hangup" => Ok(Self::Hangup),
            other => Err(EnvelopeError::UnknownType(other.to_owned())),
        }
    }
}

/// Why an inbound frame could not be relayed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EnvelopeError {
    /// Not a JSON object. Dropped without a reply.
    #[error("malformed frame: {0}")]
    Malformed(String),
    #[error("unknown message type: {0:?}")]
    UnknownType(String),
    #[error("missing or invalid recipient")]
    InvalidRecipient,
}

impl EnvelopeError {
    /// Detail reported back to the sender, or `None` when the frame is
    /// dropped silently.
    pub fn client_detail(&self) -> Option<&'static str> {
        match self {
            Self::Malformed(_) => None,
            Self::UnknownType(_) => Some(UNKNOWN_TYPE_DETAIL),
            Self::InvalidRecipient => Some(INVALID_RECIPIENT_DETAIL),
        }
    }

    /// Short classification for logs and metrics labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "malformed",
            Self::UnknownType(_) => "unknown_type",
            Self::InvalidRecipient => "invalid_recipient",
        }
    }
}

/// A validated inbound signaling message.
#[derive(Clone, Debug, PartialEq)]
pub struct SignalEnvelope {
    pub kind: MessageType,
    pub to: UserId,
    pub room_id: String,
    fields: Map<String, Value>,
}

impl SignalEnvelope {
    /// Parse and validate one inbound text frame.
    ///
    /// Checks run in order: JSON object, then `type`, then `to`.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let fields = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                return Err(EnvelopeError::Malformed(format!(
                    "expected object, got {}",
                    json_kind(&other)
                )))
            }
            Err(e) => return Err(EnvelopeError::Malformed(e.to_string())),
        };

        let raw_type = fields.get("type").and_then(Value::as_str).unwrap_or("").trim();
        let kind: MessageType = raw_type.parse()?;

        let to = fields
            .get("to")
            .and_then(Value::as_str)
            .and_then(UserId::parse)
            .ok_or(EnvelopeError::InvalidRecipient)?;

        let room_id = room_id_of(fields.get("roomId"));

        Ok(Self {
            kind,
            to,
            room_id,
            fields,
        })
    }

    /// All fields as received, including routing fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    /// Build the envelope delivered to the recipient: every inbound field
    /// except `to`, stamped with `from` and the normalized `roomId`.
    pub fn into_outbound(self, from: &UserId) -> Value {
        let mut fields = self.fields;
        let _ = fields.remove("to");
        let _ = fields.insert("type".into(), Value::String(self.kind.as_str().into()));
        let _ = fields.insert("from".into(), Value::String(from.to_string()));
        let _ = fields.insert("roomId".into(), Value::String(self.room_id));
        Value::Object(fields)
    }
}

/// `{type: "error", detail}` sent back to the originating client.
pub fn error_notice(detail: &str) -> Value {
    json!({ "type": "error", "detail": detail })
}

/// `{type: "peer_offline", to, roomId}` sent back when the recipient is not
/// connected.
pub fn peer_offline_notice(to: &UserId, room_id: &str) -> Value {
    json!({ "type": "peer_offline", "to": to.to_string(), "roomId": room_id })
}

fn room_id_of(value: Option<&Value>) -> String {
    let raw = match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::Bool(true)) => "True".to_owned(),
        Some(Value::String(s)) => s.trim().to_owned(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) if items.is_empty() => String::new(),
        Some(Value::Object(map)) if map.is_empty() => String::new(),
        Some(other) => other.to_string(),
    };
    if raw.is_empty() {
        DEFAULT_ROOM_ID.to_owned()
    } else {
        raw
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOB: &str = "9b2d5c3e-7a41-4d8e-a1f0-2c6b8e4d1a97";

    fn alice() -> UserId {
        UserId::parse("1c0e6f0a-3b8d-4e7c-9a55-0f4b2d6e8c13").unwrap()
    }

    #[test]
    fn parses_offer() {
        let text = format!(r#"{{"type":"offer","to":"{BOB}","roomId":"r1","sdp":"X"}}"#);
        let env = SignalEnvelope::parse(&text).unwrap();
        assert_eq!(env.kind, MessageType::Offer);
        assert_eq!(env.to.to_string(), BOB);
        assert_eq!(env.room_id, "r1");
        assert_eq!(env.fields()["sdp"], "X");
    }

    #[test]
    fn outbound_replaces_to_with_from() {
        let text = format!(r#"{{"type":"offer","to":"{BOB}","roomId":"r1","sdp":"X"}}"#);
        let out = SignalEnvelope::parse(&text).unwrap().into_outbound(&alice());
        assert_eq!(
            out,
            json!({"type": "offer", "from": alice().to_string(), "roomId": "r1", "sdp": "X"})
        );
    }

    #[test]
    fn inbound_from_is_overwritten() {
        let text = format!(
            r#"{{"type":"candidate","to":"{BOB}","from":"someone-else","candidate":{{"sdpMid":"0"}}}}"#
        );
        let out = SignalEnvelope::parse(&text).unwrap().into_outbound(&alice());
        assert_eq!(out["from"], alice().to_string());
        assert_eq!(out["candidate"]["sdpMid"], "0");
    }

    #[test]
    fn missing_room_defaults() {
        let text = format!(r#"{{"type":"hangup","to":"{BOB}"}}"#);
        let env = SignalEnvelope::parse(&text).unwrap();
        assert_eq!(env.room_id, DEFAULT_ROOM_ID);
    }

    #[test]
    fn falsy_room_defaults() {
        for room in [r#""""#, r#""   ""#, "null", "false", "[]", "{}", "0", "0.0"] {
            let text = format!(r#"{{"type":"answer","to":"{BOB}","roomId":{room}}}"#);
            let env = SignalEnvelope::parse(&text).unwrap();
            assert_eq!(env.room_id, DEFAULT_ROOM_ID, "roomId = {room}");
        }
    }

    #[test]
    fn room_is_trimmed_and_numbers_rendered() {
        let text = format!(r#"{{"type":"answer","to":"{BOB}","roomId":"  r2 "}}"#);
        assert_eq!(SignalEnvelope::parse(&text).unwrap().room_id, "r2");
        let text = format!(r#"{{"type":"answer","to":"{BOB}","roomId":42}}"#);
        assert_eq!(SignalEnvelope::parse(&text).unwrap().room_id, "42");
        let text = format!(r#"{{"type":"answer","to":"{BOB}","roomId":-1.5}}"#);
        assert_eq!(SignalEnvelope::parse(&text).unwrap().room_id, "-1.5");
    }

    #[test]
    fn truthy_scalar_room_is_stringified() {
        let text = format!(r#"{{"type":"offer","to":"{BOB}","roomId":true}}"#);
        assert_eq!(SignalEnvelope::parse(&text).unwrap().room_id, "True");
    }

    #[test]
    fn type_is_trimmed_and_canonicalized() {
        let text = format!(r#"{{"type":" offer ","to":"{BOB}"}}"#);
        let env = SignalEnvelope::parse(&text).unwrap();
        assert_eq!(env.kind, MessageType::Offer);
        assert_eq!(env.into_outbound(&alice())["type"], "offer");
    }

    #[test]
    fn unknown_type_rejected() {
        let text = format!(r#"{{"type":"bogus","to":"{BOB}","roomId":"r1"}}"#);
        let err = SignalEnvelope::parse(&text).unwrap_err();
        assert_eq!(err, EnvelopeError::UnknownType("bogus".into()));
        assert_eq!(err.client_detail(), Some("Unknown message type."));
    }

    #[test]
    fn missing_type_rejected_as_unknown() {
        let text = format!(r#"{{"to":"{BOB}"}}"#);
        assert!(matches!(
            SignalEnvelope::parse(&text),
            Err(EnvelopeError::UnknownType(_))
        ));
    }

    #[test]
    fn type_is_checked_before_recipient() {
        let err = SignalEnvelope::parse(r#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnknownType(_)));
    }

    #[test]
    fn missing_to_rejected() {
        let err = SignalEnvelope::parse(r#"{"type":"offer","roomId":"r1"}"#).unwrap_err();
        assert_eq!(err, EnvelopeError::InvalidRecipient);
        assert_eq!(err.client_detail(), Some("Missing/invalid 'to' user id."));
    }

    #[test]
    fn invalid_to_rejected() {
        for to in [r#""bob""#, "12", "null", r#"{"id":"x"}"#] {
            let text = format!(r#"{{"type":"offer","to":{to}}}"#);
            assert_eq!(
                SignalEnvelope::parse(&text).unwrap_err(),
                EnvelopeError::InvalidRecipient,
                "to = {to}"
            );
        }
    }

    #[test]
    fn non_json_is_malformed() {
        let err = SignalEnvelope::parse("not json {").unwrap_err();
        assert!(matches!(err, EnvelopeError::Malformed(_)));
        assert_eq!(err.client_detail(), None);
    }

    #[test]
    fn non_object_json_is_malformed() {
        for text in ["[1,2,3]", "\"offer\"", "42", "null"] {
            let err = SignalEnvelope::parse(text).unwrap_err();
            assert!(matches!(err, EnvelopeError::Malformed(_)), "text = {text}");
        }
    }

    #[test]
    fn peer_offline_shape() {
        let bob = UserId::parse(BOB).unwrap();
        assert_eq!(
            peer_offline_notice(&bob, "r1"),
            json!({"type": "peer_offline", "to": BOB, "roomId": "r1"})
        );
    }

    #[test]
    fn error_notice_shape() {
        assert_eq!(
            error_notice(UNKNOWN_TYPE_DETAIL),
            json!({"type": "error", "detail": "Unknown message type."})
        );
    }

    #[test]
    fn message_type_strings() {
        for kind in MessageType::ALL {
            assert_eq!(kind.as_str().parse::<MessageType>().unwrap(), kind);
        }
        assert!(MessageType::Hangup.is_hangup());
        assert!(!MessageType::Offer.is_hangup());
    }
}
