//! Protocol message vocabulary and the line codec.
//!
//! One JSON object per line. Server-sent messages carry a hex-encoded
//! human-readable `message` field; structured payloads nest under `data`.
//!
//! Legacy compatibility: a record with no `type` but a top-level `id`
//! string is treated as an implicit authentication request, and
//! `challenge_response` is accepted as an alternate field name for the
//! response payload. Records with an unrecognized `type` decode to
//! [`Message::Unknown`] so the state machine can answer them instead of
//! dropping them on the floor.

use serde_json::{json, Map, Value};

use crate::error::WireError;

/// A decoded protocol message. All payload fields hold on-wire hex text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Client claims an identity. `user_id` is hex(decimal identity).
    AuthRequest { user_id: String },
    /// Server issues an encrypted challenge. `challenge` is
    /// hex(base64(IV || ciphertext)).
    Challenge { message: String, challenge: String },
    /// Client answers the challenge. `response` is
    /// hex(base64(IV || ciphertext-of-digest)).
    ChallengeResponse { response: String },
    /// Terminal success. `user_id` is hex(identity), `timestamp` is
    /// hex(decimal milliseconds since the Unix epoch).
    AuthSuccess {
        message: String,
        user_id: String,
        timestamp: String,
    },
    /// Terminal denial.
    AuthError { message: String },
    /// Terminal abandonment after the response window elapsed.
    Timeout { message: String },
    /// A record with a `type` outside the protocol vocabulary.
    Unknown { msg_type: String },
}

impl Message {
    /// Short tag for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::AuthRequest { .. } => "auth_request",
            Message::Challenge { .. } => "challenge",
            Message::ChallengeResponse { .. } => "challenge_response",
            Message::AuthSuccess { .. } => "auth_success",
            Message::AuthError { .. } => "auth_error",
            Message::Timeout { .. } => "timeout",
            Message::Unknown { .. } => "unknown",
        }
    }

    /// Encode as a single JSON line (without the trailing newline).
    pub fn encode(&self) -> String {
        let value = match self {
            Message::AuthRequest { user_id } => json!({
                "type": "auth_request",
                "user_id": user_id,
            }),
            Message::Challenge { message, challenge } => json!({
                "type": "challenge",
                "message": message,
                "data": { "challenge": challenge },
            }),
            Message::ChallengeResponse { response } => json!({
                "type": "challenge_response",
                "response": response,
            }),
            Message::AuthSuccess {
                message,
                user_id,
                timestamp,
            } => json!({
                "type": "auth_success",
                "message": message,
                "data": { "user_id": user_id, "timestamp": timestamp },
            }),
            Message::AuthError { message } => json!({
                "type": "auth_error",
                "message": message,
            }),
            Message::Timeout { message } => json!({
                "type": "timeout",
                "message": message,
            }),
            Message::Unknown { msg_type } => json!({ "type": msg_type }),
        };
        value.to_string()
    }

    /// Decode one line into a message.
    ///
    /// Total on well-formed input; anything else fails with
    /// [`WireError::MalformedMessage`].
    pub fn decode(line: &str) -> Result<Self, WireError> {
        let value: Value = serde_json::from_str(line)
            .map_err(|_| WireError::MalformedMessage("record is not valid json"))?;
        let obj = value
            .as_object()
            .ok_or(WireError::MalformedMessage("record is not a json object"))?;

        let msg_type = obj.get("type").and_then(Value::as_str);
        match msg_type {
            Some("auth_request") => Ok(Message::AuthRequest {
                user_id: required_str(obj, "user_id", "auth_request requires user_id")?,
            }),
            Some("challenge") => Ok(Message::Challenge {
                message: optional_str(obj, "message"),
                challenge: required_data_str(obj, "challenge", "challenge requires data.challenge")?,
            }),
            Some("challenge_response") => {
                let response = obj
                    .get("response")
                    .or_else(|| obj.get("challenge_response"))
                    .and_then(Value::as_str)
                    .ok_or(WireError::MalformedMessage(
                        "challenge_response requires a response field",
                    ))?;
                Ok(Message::ChallengeResponse {
                    response: response.to_string(),
                })
            }
            Some("auth_success") => Ok(Message::AuthSuccess {
                message: optional_str(obj, "message"),
                user_id: required_data_str(obj, "user_id", "auth_success requires data.user_id")?,
                timestamp: required_data_str(
                    obj,
                    "timestamp",
                    "auth_success requires data.timestamp",
                )?,
            }),
            Some("auth_error") => Ok(Message::AuthError {
                message: optional_str(obj, "message"),
            }),
            Some("timeout") => Ok(Message::Timeout {
                message: optional_str(obj, "message"),
            }),
            Some(other) => Ok(Message::Unknown {
                msg_type: other.to_string(),
            }),
            // No usable type tag. Older clients open with a bare id record.
            None => match obj.get("id").and_then(Value::as_str) {
                Some(id) => Ok(Message::AuthRequest {
                    user_id: id.to_string(),
                }),
                None => Err(WireError::MalformedMessage("missing type field")),
            },
        }
    }
}

fn required_str(
    obj: &Map<String, Value>,
    field: &str,
    missing: &'static str,
) -> Result<String, WireError> {
    obj.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(WireError::MalformedMessage(missing))
}

fn optional_str(obj: &Map<String, Value>, field: &str) -> String {
    obj.get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn required_data_str(
    obj: &Map<String, Value>,
    field: &str,
    missing: &'static str,
) -> Result<String, WireError> {
    obj.get("data")
        .and_then(Value::as_object)
        .and_then(|data| data.get(field))
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or(WireError::MalformedMessage(missing))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hex::hex_encode_str;

    #[test]
    fn round_trips_auth_request() {
        let msg = Message::AuthRequest {
            user_id: hex_encode_str("2"),
        };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn round_trips_challenge() {
        let msg = Message::Challenge {
            message: hex_encode_str("challenge issued"),
            challenge: "deadbeef".to_string(),
        };
        let line = msg.encode();
        assert!(line.contains("\"data\""));
        assert_eq!(Message::decode(&line).unwrap(), msg);
    }

    #[test]
    fn round_trips_auth_success() {
        let msg = Message::AuthSuccess {
            message: hex_encode_str("authentication successful"),
            user_id: hex_encode_str("2"),
            timestamp: hex_encode_str("1700000000000"),
        };
        assert_eq!(Message::decode(&msg.encode()).unwrap(), msg);
    }

    #[test]
    fn decodes_legacy_bare_id_record() {
        let line = format!(r#"{{"id":"{}"}}"#, hex_encode_str("2"));
        assert_eq!(
            Message::decode(&line).unwrap(),
            Message::AuthRequest {
                user_id: hex_encode_str("2"),
            }
        );
    }

    #[test]
    fn decodes_legacy_id_with_null_type() {
        let line = format!(r#"{{"type":null,"id":"{}"}}"#, hex_encode_str("7"));
        assert_eq!(
            Message::decode(&line).unwrap(),
            Message::AuthRequest {
                user_id: hex_encode_str("7"),
            }
        );
    }

    #[test]
    fn accepts_legacy_response_field_name() {
        let line = r#"{"type":"challenge_response","challenge_response":"cafe"}"#;
        assert_eq!(
            Message::decode(line).unwrap(),
            Message::ChallengeResponse {
                response: "cafe".to_string(),
            }
        );
    }

    #[test]
    fn preserves_unrecognized_type() {
        let decoded = Message::decode(r#"{"type":"renegotiate"}"#).unwrap();
        assert_eq!(
            decoded,
            Message::Unknown {
                msg_type: "renegotiate".to_string(),
            }
        );
    }

    #[test]
    fn rejects_record_without_type_or_id() {
        assert_eq!(
            Message::decode(r#"{"user_id":"32"}"#),
            Err(WireError::MalformedMessage("missing type field"))
        );
    }

    #[test]
    fn rejects_non_json_line() {
        assert!(matches!(
            Message::decode("this is not json"),
            Err(WireError::MalformedMessage(_))
        ));
    }

    #[test]
    fn rejects_non_object_record() {
        assert!(matches!(
            Message::decode(r#"["auth_request"]"#),
            Err(WireError::MalformedMessage(_))
        ));
    }

    #[test]
    fn rejects_auth_request_without_user_id() {
        assert!(matches!(
            Message::decode(r#"{"type":"auth_request"}"#),
            Err(WireError::MalformedMessage(_))
        ));
    }

    #[test]
    fn decodes_auth_error_without_message() {
        assert_eq!(
            Message::decode(r#"{"type":"auth_error"}"#).unwrap(),
            Message::AuthError {
                message: String::new(),
            }
        );
    }
}
