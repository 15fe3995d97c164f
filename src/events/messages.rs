use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::transport::ConnectionState;

/// Topics the transport bus publishes on
pub mod topics {
    /// Transcribed speech, `{ "type": "transcript", "text": ... }`
    pub const TRANSCRIPT: &str = "transcript";
    /// Status / control messages; batch replies are published here too
    pub const STATUS: &str = "status";
    /// Connection lifecycle changes
    pub const CONNECTION: &str = "connection";
    /// Frames that could not be decoded
    pub const PROTOCOL_ERROR: &str = "protocol_error";
    /// Decoded messages whose `type` is not recognized
    pub const UNRECOGNIZED: &str = "unrecognized";
}

/// Server directive carried by control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    /// Another recording is expected
    Continue,
    /// The conversation is finished
    #[serde(alias = "success")]
    Complete,
    /// The server gave up on this conversation
    Error,
}

/// A decoded message from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerMessage {
    /// Wire `type` tag, used as the bus topic
    pub kind: String,
    /// Present only on control messages
    pub status: Option<ServerStatus>,
    /// Payload, semantics defined by `kind`
    pub data: Value,
}

impl ServerMessage {
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            status: None,
            data,
        }
    }

    pub fn control(status: ServerStatus, data: Value) -> Self {
        Self {
            kind: topics::STATUS.to_string(),
            status: Some(status),
            data,
        }
    }

    /// Human-readable text, if the payload carries any
    pub fn text(&self) -> Option<&str> {
        match &self.data {
            Value::String(text) => Some(text),
            Value::Object(fields) => fields
                .get("text")
                .or_else(|| fields.get("message"))
                .and_then(Value::as_str),
            _ => None,
        }
    }
}

/// Everything the transport publishes on its bus
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Message(ServerMessage),
    Unrecognized(ServerMessage),
    ProtocolError(ProtocolError),
    Connection(ConnectionState),
}

impl ServerEvent {
    pub fn topic(&self) -> &str {
        match self {
            ServerEvent::Message(message) => &message.kind,
            ServerEvent::Unrecognized(_) => topics::UNRECOGNIZED,
            ServerEvent::ProtocolError(_) => topics::PROTOCOL_ERROR,
            ServerEvent::Connection(_) => topics::CONNECTION,
        }
    }
}

/// Batch reply body, `{ status, message?, data? }`
#[derive(Debug, Deserialize)]
pub(crate) struct ReplyBody {
    pub status: ServerStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default, alias = "response")]
    pub data: Option<Value>,
}

impl ReplyBody {
    pub fn into_message(self) -> ServerMessage {
        let data = self
            .data
            .filter(|data| !data.is_null())
            .or_else(|| self.message.map(Value::String))
            .unwrap_or(Value::Null);

        ServerMessage::control(self.status, data)
    }
}
