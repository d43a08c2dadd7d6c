use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The only mime type carried in either direction.
pub const TEXT_PLAIN: &str = "text/plain";

/// Outbound message sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClientMessage {
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    /// Builds a `text/plain` message.
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            mime_type: TEXT_PLAIN.to_string(),
            data: data.into(),
        }
    }

    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Inbound message, classified by field presence.
///
/// The server does not tag its payloads, so classification checks
/// `turn_complete`, then `interrupted`, then `mime_type`. The first match wins
/// even when several fields are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// `{"turn_complete": true}`
    TurnComplete,
    /// `{"interrupted": true}`
    Interrupted,
    /// `{"mime_type": "text/plain", "data": "..."}`
    Text(String),
    /// Any other well-formed JSON value. Ignored by the client.
    Unsupported {
        /// `mime_type` field when present and a string.
        mime_type: Option<String>,
    },
}

impl ServerMessage {
    /// Decodes and classifies a text frame.
    ///
    /// Only invalid JSON is an error; valid JSON of an unknown shape becomes
    /// [`ServerMessage::Unsupported`].
    pub fn from_text(text: &str) -> Result<Self, serde_json::Error> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(&value))
    }

    pub fn from_value(value: &Value) -> Self {
        if is_true(value.get("turn_complete")) {
            return ServerMessage::TurnComplete;
        }
        if is_true(value.get("interrupted")) {
            return ServerMessage::Interrupted;
        }

        let mime_type = value.get("mime_type").and_then(Value::as_str);
        match (mime_type, value.get("data")) {
            (Some(TEXT_PLAIN), Some(Value::String(data))) => ServerMessage::Text(data.clone()),
            (mime_type, _) => ServerMessage::Unsupported {
                mime_type: mime_type.map(str::to_string),
            },
        }
    }

    /// Encodes the message in the shape the agent server emits.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        let mut object = Map::new();
        match self {
            ServerMessage::TurnComplete => {
                object.insert("turn_complete".to_string(), Value::Bool(true));
                object.insert("interrupted".to_string(), Value::Bool(false));
            }
            ServerMessage::Interrupted => {
                object.insert("turn_complete".to_string(), Value::Bool(false));
                object.insert("interrupted".to_string(), Value::Bool(true));
            }
            ServerMessage::Text(data) => {
                object.insert("mime_type".to_string(), Value::from(TEXT_PLAIN));
                object.insert("data".to_string(), Value::from(data.as_str()));
            }
            ServerMessage::Unsupported { mime_type } => {
                if let Some(mime_type) = mime_type {
                    object.insert("mime_type".to_string(), Value::from(mime_type.as_str()));
                }
            }
        }
        serde_json::to_string(&Value::Object(object))
    }
}

fn is_true(value: Option<&Value>) -> bool {
    matches!(value, Some(Value::Bool(true)))
}
