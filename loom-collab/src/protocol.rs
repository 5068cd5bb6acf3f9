//! Wire protocol: JSON text frames.
//!
//! ```text
//! {"type":"patch","ops":[{"op":"replace","path":"/pages/0/title","value":"Home"}]}
//! {"type":"presence","userId":"u-1","x":120,"y":48,"username":"Ada","color":"#3f51b5"}
//! ```
//!
//! Frames are relayed verbatim by the server, so peers never see a sender
//! field beyond the `userId` carried in presence frames.

use loom_core::Operation;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cursor position of one user, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceUpdate {
    pub user_id: String,
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

impl PresenceUpdate {
    pub fn new(user_id: impl Into<String>, x: f64, y: f64) -> Self {
        Self {
            user_id: user_id.into(),
            x,
            y,
            username: None,
            color: None,
        }
    }
}

/// A frame exchanged between peers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CollabMessage {
    Patch { ops: Vec<Operation> },
    Presence(PresenceUpdate),
}

impl CollabMessage {
    pub fn patch(ops: Vec<Operation>) -> Self {
        CollabMessage::Patch { ops }
    }

    /// Encode to a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a JSON text frame.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Malformed frame: {0}")]
    Malformed(String),
    #[error("Encode error: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_frame_shape() {
        let msg = CollabMessage::patch(vec![Operation::remove("/pages/0/body/0")]);
        let value: serde_json::Value = serde_json::from_str(&msg.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "patch", "ops": [{"op": "remove", "path": "/pages/0/body/0"}]})
        );
    }

    #[test]
    fn test_presence_frame_optional_fields() {
        let text = r#"{"type":"presence","userId":"abcd1234","x":1.5,"y":2}"#;
        match CollabMessage::decode(text).unwrap() {
            CollabMessage::Presence(p) => {
                assert_eq!(p.user_id, "abcd1234");
                assert_eq!(p.y, 2.0);
                assert!(p.username.is_none());
                assert!(p.color.is_none());
            }
            other => panic!("Expected presence, got {other:?}"),
        }

        let encoded = CollabMessage::Presence(PresenceUpdate::new("u", 0.0, 0.0))
            .encode()
            .unwrap();
        assert!(!encoded.contains("username"));
    }

    #[test]
    fn test_malformed_frames() {
        assert!(matches!(
            CollabMessage::decode("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            CollabMessage::decode(r#"{"type":"chat","text":"hi"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            CollabMessage::decode(r#"{"type":"patch","ops":[{"op":"bogus","path":""}]}"#),
            Err(ProtocolError::Malformed(_))
        ));
    }
}
