//! JSON hub protocol.
//!
//! Every message is a JSON object terminated by the ASCII record separator
//! (`0x1E`). A single WebSocket frame may carry several records. The message
//! kind is selected by the numeric `type` field:
//!
//! | type | message    |
//! |------|------------|
//! | 1    | Invocation |
//! | 3    | Completion |
//! | 6    | Ping       |
//! | 7    | Close      |
//!
//! Other types (stream items, cancel requests) are not used by this client
//! and are skipped when decoding.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::{HubError, Result};

/// Record separator terminating every protocol message.
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake request.
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake request.
pub const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

/// A decoded hub protocol message.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side. Without an id no completion is expected.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Result of an invocation that carried an id.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    /// Keep-alive.
    Ping,
    /// The server is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl HubMessage {
    /// Build an invocation message.
    pub fn invocation(
        invocation_id: Option<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        Self::Invocation {
            invocation_id,
            target: target.into(),
            arguments,
        }
    }

    /// Build a successful completion.
    pub fn completion(invocation_id: impl Into<String>, result: Option<Value>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result,
            error: None,
        }
    }

    /// Build a failed completion.
    pub fn completion_error(invocation_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::Completion {
            invocation_id: invocation_id.into(),
            result: None,
            error: Some(error.into()),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            Self::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                let mut value = json!({
                    "type": TYPE_INVOCATION,
                    "target": target,
                    "arguments": arguments,
                });
                if let Some(id) = invocation_id {
                    value["invocationId"] = json!(id);
                }
                value
            }
            Self::Completion {
                invocation_id,
                result,
                error,
            } => {
                let mut value = json!({
                    "type": TYPE_COMPLETION,
                    "invocationId": invocation_id,
                });
                if let Some(error) = error {
                    value["error"] = json!(error);
                } else if let Some(result) = result {
                    value["result"] = result.clone();
                }
                value
            }
            Self::Ping => json!({ "type": TYPE_PING }),
            Self::Close {
                error,
                allow_reconnect,
            } => {
                let mut value = json!({
                    "type": TYPE_CLOSE,
                    "allowReconnect": allow_reconnect,
                });
                if let Some(error) = error {
                    value["error"] = json!(error);
                }
                value
            }
        }
    }
}

/// Wire shape shared by every message type.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<Value>>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: Option<bool>,
}

impl RawMessage {
    fn into_message(self) -> Result<Option<HubMessage>> {
        let message = match self.kind {
            TYPE_INVOCATION => {
                let target = self
                    .target
                    .ok_or_else(|| HubError::protocol("invocation without target"))?;
                HubMessage::Invocation {
                    invocation_id: self.invocation_id,
                    target,
                    arguments: self.arguments.unwrap_or_default(),
                }
            }
            TYPE_COMPLETION => {
                let invocation_id = self
                    .invocation_id
                    .ok_or_else(|| HubError::protocol("completion without invocationId"))?;
                HubMessage::Completion {
                    invocation_id,
                    result: self.result,
                    error: self.error,
                }
            }
            TYPE_PING => HubMessage::Ping,
            TYPE_CLOSE => HubMessage::Close {
                error: self.error,
                allow_reconnect: self.allow_reconnect.unwrap_or(false),
            },
            other => {
                debug!(message_type = other, "Skipping unsupported hub message type");
                return Ok(None);
            }
        };
        Ok(Some(message))
    }
}

/// Encode one message, including its trailing record separator.
pub fn encode(message: &HubMessage) -> Result<String> {
    let mut text = serde_json::to_string(&message.to_json())?;
    text.push(RECORD_SEPARATOR);
    Ok(text)
}

/// Decode every record in a text frame.
pub fn decode_frame(frame: &str) -> Result<Vec<HubMessage>> {
    let mut messages = Vec::new();
    for record in frame.split(RECORD_SEPARATOR) {
        let record = record.trim();
        if record.is_empty() {
            continue;
        }
        let raw: RawMessage = serde_json::from_str(record)?;
        if let Some(message) = raw.into_message()? {
            messages.push(message);
        }
    }
    Ok(messages)
}

/// The handshake request sent right after the WebSocket upgrade.
pub fn handshake_request() -> String {
    let mut text = json!({
        "protocol": PROTOCOL_NAME,
        "version": PROTOCOL_VERSION,
    })
    .to_string();
    text.push(RECORD_SEPARATOR);
    text
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// Parse the first record of a frame as the handshake response.
///
/// Returns whatever follows the handshake record, since a server may batch
/// the first messages into the same frame.
pub fn parse_handshake_response(frame: &str) -> Result<&str> {
    let Some((head, rest)) = frame.split_once(RECORD_SEPARATOR) else {
        return Err(HubError::handshake(
            "handshake response is missing the record separator",
        ));
    };

    let response: HandshakeResponse = serde_json::from_str(head)
        .map_err(|e| HubError::handshake(format!("malformed handshake response: {e}")))?;

    match response.error {
        Some(error) => Err(HubError::handshake(error)),
        None => Ok(rest),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_batched_frame() {
        let frame = "{\"type\":6}\u{1e}{\"type\":1,\"target\":\"ReceiveNotification\",\"arguments\":[{\"title\":\"a\"}]}\u{1e}";
        let messages = decode_frame(frame).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0], HubMessage::Ping);
        match &messages[1] {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                assert!(invocation_id.is_none());
                assert_eq!(target, "ReceiveNotification");
                assert_eq!(arguments[0]["title"], "a");
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_decode_skips_unknown_types() {
        let frame = "{\"type\":2,\"invocationId\":\"1\",\"item\":5}\u{1e}{\"type\":6}\u{1e}";
        assert_eq!(decode_frame(frame).unwrap(), vec![HubMessage::Ping]);
    }

    #[test]
    fn test_completion_with_error() {
        let frame = "{\"type\":3,\"invocationId\":\"7\",\"error\":\"Unauthorized\"}\u{1e}";
        assert_eq!(
            decode_frame(frame).unwrap(),
            vec![HubMessage::completion_error("7", "Unauthorized")]
        );
    }

    #[test]
    fn test_close_defaults_to_no_reconnect() {
        let frame = "{\"type\":7,\"error\":\"shutting down\"}\u{1e}";
        assert_eq!(
            decode_frame(frame).unwrap(),
            vec![HubMessage::Close {
                error: Some("shutting down".to_string()),
                allow_reconnect: false,
            }]
        );
    }

    #[test]
    fn test_invocation_without_target_is_rejected() {
        let frame = "{\"type\":1,\"arguments\":[]}\u{1e}";
        assert!(matches!(decode_frame(frame), Err(HubError::Protocol(_))));
    }

    #[test]
    fn test_encode_invocation_terminates_record() {
        let text = encode(&HubMessage::invocation(
            Some("1".to_string()),
            "JoinUserGroup",
            vec![json!("42")],
        ))
        .unwrap();

        assert!(text.ends_with(RECORD_SEPARATOR));
        let value: Value = serde_json::from_str(text.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(value["type"], 1);
        assert_eq!(value["invocationId"], "1");
        assert_eq!(value["target"], "JoinUserGroup");
        assert_eq!(value["arguments"][0], "42");
    }

    #[test]
    fn test_fire_and_forget_invocation_has_no_id() {
        let text = encode(&HubMessage::invocation(None, "Ack", vec![])).unwrap();
        assert!(!text.contains("invocationId"));
    }

    #[test]
    fn test_handshake_response_keeps_remainder() {
        let rest = parse_handshake_response("{}\u{1e}{\"type\":6}\u{1e}").unwrap();
        assert_eq!(decode_frame(rest).unwrap(), vec![HubMessage::Ping]);
    }

    #[test]
    fn test_handshake_error() {
        let err = parse_handshake_response(
            "{\"error\":\"Requested protocol 'json' is not available.\"}\u{1e}",
        )
        .unwrap_err();
        assert!(matches!(err, HubError::Handshake(msg) if msg.contains("not available")));
    }

    #[test]
    fn test_handshake_request_shape() {
        let request = handshake_request();
        let value: Value =
            serde_json::from_str(request.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(value["protocol"], "json");
        assert_eq!(value["version"], 1);
    }
}
