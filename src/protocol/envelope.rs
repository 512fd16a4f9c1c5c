//! Transport envelope codec.
//!
//! Every WebSocket text message is a JSON envelope. Three shapes exist
//! on the wire:
//!
//! ```json
//! {"t":"ToBackend","s":"<session>","c":"<connection>","b":"<base64 frame>"}
//! {"t":"e","l":"<leader connection id>"}
//! {"c":"<connection id>", ...}
//! ```
//!
//! The first wraps one binary frame, the second announces a leader
//! election, and the third is free-form protocol signaling (the initial
//! handshake among other things).
//!
//! [`unwrap`] classifies inbound text into [`ParsedEnvelope`] and never
//! fails: every malformed input resolves to one of the variants.

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use serde::Serialize;
use serde_json::Value;

use crate::codec::frame;
use crate::error::Result;

// ============================================================================
// Constants
// ============================================================================

/// Envelope tag for application messages bound for the backend.
pub const MESSAGE_TAG: &str = "ToBackend";

/// Envelope tag for election notifications.
pub const ELECTION_TAG: &str = "e";

// ============================================================================
// ParsedEnvelope
// ============================================================================

/// Classified inbound envelope.
///
/// Each variant carries only the fields its kind guarantees.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedEnvelope {
    /// Leader election notification.
    Election {
        /// Connection id of the newly elected leader, when present.
        leader_id: Option<String>,
    },

    /// Application message decoded from the embedded binary frame.
    Message {
        /// The decoded message string.
        data: String,
        /// Session id stated by the envelope.
        session_id: Option<String>,
        /// Connection id stated by the envelope.
        connection_id: Option<String>,
    },

    /// Free-form protocol signaling (handshake and other control data).
    Protocol {
        /// The raw parsed object.
        data: Value,
        /// Session id stated by the envelope.
        session_id: Option<String>,
        /// Connection id stated by the envelope.
        connection_id: Option<String>,
    },

    /// The envelope text was not valid JSON.
    Error {
        /// Description of the parse failure.
        error: String,
        /// The raw text as received.
        raw: String,
    },
}

impl ParsedEnvelope {
    /// Returns a short label for logging.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Election { .. } => "election",
            Self::Message { .. } => "message",
            Self::Protocol { .. } => "protocol",
            Self::Error { .. } => "error",
        }
    }
}

// ============================================================================
// Wrapping
// ============================================================================

/// Outbound message envelope.
///
/// # Format
///
/// ```json
/// {"t":"ToBackend","s":"<session>","c":"<connection>","b":"<base64>"}
/// ```
#[derive(Debug, Clone, Serialize)]
struct MessageEnvelope<'a> {
    /// Envelope tag, always [`MESSAGE_TAG`].
    t: &'static str,
    /// Session id.
    s: &'a str,
    /// Connection id.
    c: &'a str,
    /// Base64-encoded binary frame.
    b: String,
}

/// Wraps an application message into envelope text.
///
/// The connection id defaults to the session id while the server has not
/// yet assigned one. The message is framed with the given discriminant
/// and base64-encoded into the `b` field.
///
/// # Errors
///
/// Returns [`Error::Json`](crate::Error::Json) if serialization fails.
pub fn wrap(
    session_id: &str,
    connection_id: Option<&str>,
    message: &str,
    discriminant: u8,
) -> Result<String> {
    let encoded = frame::encode(message, discriminant);

    let envelope = MessageEnvelope {
        t: MESSAGE_TAG,
        s: session_id,
        c: connection_id.unwrap_or(session_id),
        b: Base64Standard.encode(encoded),
    };
    Ok(serde_json::to_string(&envelope)?)
}

// ============================================================================
// Unwrapping
// ============================================================================

/// Classifies inbound envelope text.
///
/// Classification order:
///
/// 1. a leader field (`l`) marks an election;
/// 2. a body field (`b`) that base64-decodes into a valid frame marks a
///    message;
/// 3. everything else, including a body whose frame fails to decode, is
///    protocol signaling;
/// 4. non-JSON input yields the error variant.
#[must_use]
pub fn unwrap(raw: &str, expected_discriminant: u8) -> ParsedEnvelope {
    let parsed: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            return ParsedEnvelope::Error {
                error: e.to_string(),
                raw: raw.to_string(),
            };
        }
    };

    if parsed.get("l").is_some() {
        return ParsedEnvelope::Election {
            leader_id: field_str(&parsed, "l"),
        };
    }

    if let Some(body) = parsed.get("b").and_then(Value::as_str)
        && let Ok(bytes) = Base64Standard.decode(body)
        && let Some(message) = frame::decode(&bytes, expected_discriminant)
    {
        return ParsedEnvelope::Message {
            data: message,
            session_id: field_str(&parsed, "s"),
            connection_id: field_str(&parsed, "c"),
        };
    }

    let session_id = field_str(&parsed, "s");
    let connection_id = field_str(&parsed, "c");
    ParsedEnvelope::Protocol {
        data: parsed,
        session_id,
        connection_id,
    }
}

/// Gets an optional string field from a parsed envelope.
#[inline]
fn field_str(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_shape() {
        let text = wrap("session-1", Some("conn-1"), "hello", 0).expect("wrap");
        let value: Value = serde_json::from_str(&text).expect("valid json");

        assert_eq!(value["t"], MESSAGE_TAG);
        assert_eq!(value["s"], "session-1");
        assert_eq!(value["c"], "conn-1");

        let body = value["b"].as_str().expect("body");
        let bytes = Base64Standard.decode(body).expect("base64");
        assert_eq!(frame::decode(&bytes, 0), Some("hello".to_string()));
    }

    #[test]
    fn test_wrap_defaults_connection_to_session() {
        let text = wrap("session-1", None, "hello", 0).expect("wrap");
        let value: Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["c"], "session-1");
    }

    #[test]
    fn test_unwrap_roundtrip() {
        let text = wrap("s-1", Some("c-1"), "payload", 3).expect("wrap");
        match unwrap(&text, 3) {
            ParsedEnvelope::Message {
                data,
                session_id,
                connection_id,
            } => {
                assert_eq!(data, "payload");
                assert_eq!(session_id.as_deref(), Some("s-1"));
                assert_eq!(connection_id.as_deref(), Some("c-1"));
            }
            other => panic!("expected message, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unwrap_election() {
        let parsed = unwrap(r#"{"t":"e","l":"conn-9"}"#, 0);
        assert_eq!(
            parsed,
            ParsedEnvelope::Election {
                leader_id: Some("conn-9".to_string())
            }
        );
    }

    #[test]
    fn test_unwrap_election_null_leader() {
        let parsed = unwrap(r#"{"t":"e","l":null}"#, 0);
        assert_eq!(parsed, ParsedEnvelope::Election { leader_id: None });
    }

    #[test]
    fn test_unwrap_handshake_protocol() {
        match unwrap(r#"{"t":"protocol","c":"conn-1"}"#, 0) {
            ParsedEnvelope::Protocol {
                connection_id,
                session_id,
                data,
            } => {
                assert_eq!(connection_id.as_deref(), Some("conn-1"));
                assert_eq!(session_id, None);
                assert_eq!(data["t"], "protocol");
            }
            other => panic!("expected protocol, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unwrap_body_with_wrong_discriminant_falls_through() {
        // The frame decodes against discriminant 1 only; classified as
        // protocol when unwrapped expecting 0.
        let text = wrap("s-1", None, "payload", 1).expect("wrap");
        match unwrap(&text, 0) {
            ParsedEnvelope::Protocol { session_id, .. } => {
                assert_eq!(session_id.as_deref(), Some("s-1"));
            }
            other => panic!("expected protocol, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unwrap_body_invalid_base64_falls_through() {
        let parsed = unwrap(r#"{"b":"!!not-base64!!","c":"conn-1"}"#, 0);
        assert!(matches!(parsed, ParsedEnvelope::Protocol { .. }));
    }

    #[test]
    fn test_unwrap_invalid_json() {
        match unwrap("not json at all", 0) {
            ParsedEnvelope::Error { raw, .. } => assert_eq!(raw, "not json at all"),
            other => panic!("expected error, got {}", other.kind()),
        }
    }

    #[test]
    fn test_unwrap_never_panics_on_unusual_shapes() {
        for raw in [
            "null",
            "42",
            r#""just a string""#,
            "[]",
            r#"{"b": 42}"#,
            r#"{"l": {"nested": true}}"#,
        ] {
            let _ = unwrap(raw, 0);
        }
    }
}
