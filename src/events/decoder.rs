use std::collections::HashSet;

use serde_json::Value;
use tracing::{debug, warn};

use super::bus::EventBus;
use super::messages::{topics, ReplyBody, ServerEvent, ServerMessage, ServerStatus};
use crate::error::ProtocolError;

/// Decodes server payloads into `ServerMessage`s and routes them onto a bus
///
/// Frames whose `type` is not recognized are routed to the `unrecognized` topic and
/// undecodable frames to `protocol_error`; neither is ever fatal.
#[derive(Debug, Clone)]
pub struct ServerProtocolDecoder {
    recognized: HashSet<String>,
}

impl ServerProtocolDecoder {
    pub fn new() -> Self {
        Self {
            recognized: [topics::TRANSCRIPT, topics::STATUS]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    /// Route frames of `kind` to their own topic instead of `unrecognized`
    pub fn recognize(mut self, kind: impl Into<String>) -> Self {
        self.recognized.insert(kind.into());
        self
    }

    pub fn is_recognized(&self, kind: &str) -> bool {
        self.recognized.contains(kind)
    }

    /// Decode a streaming frame, `{ "type": ..., "status"?: ..., ...fields }`
    ///
    /// `data` is the frame's `data` field when present, otherwise the remaining
    /// fields as an object.
    pub fn decode_frame(&self, frame: &str) -> Result<ServerMessage, ProtocolError> {
        let value: Value = serde_json::from_str(frame).map_err(|e| ProtocolError::Malformed {
            reason: e.to_string(),
        })?;

        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::Malformed {
                reason: "frame is not a JSON object".to_string(),
            });
        };

        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ProtocolError::MissingType),
        };

        let status = fields.remove("status").map(parse_status).transpose()?;
        let data = fields.remove("data").unwrap_or(Value::Object(fields));

        Ok(ServerMessage { kind, status, data })
    }

    /// Decode a batch reply body, `{ "status": ..., "message"?: ..., "data"?: ... }`
    pub fn decode_reply(&self, body: &str) -> Result<ServerMessage, ProtocolError> {
        let reply: ReplyBody = serde_json::from_str(body).map_err(|e| ProtocolError::Malformed {
            reason: e.to_string(),
        })?;
        Ok(reply.into_message())
    }

    /// Decode a frame into the event it should be published as
    pub fn route(&self, frame: &str) -> ServerEvent {
        match self.decode_frame(frame) {
            Ok(message) if self.is_recognized(&message.kind) => ServerEvent::Message(message),
            Ok(message) => {
                debug!("Unrecognized message type: {}", message.kind);
                ServerEvent::Unrecognized(message)
            }
            Err(e) => {
                warn!("Failed to decode server frame: {}", e);
                ServerEvent::ProtocolError(e)
            }
        }
    }

    /// Decode a frame and publish it on `bus`
    ///
    /// Returns the number of handlers the event reached.
    pub fn dispatch(&self, frame: &str, bus: &EventBus<ServerEvent>) -> usize {
        let event = self.route(frame);
        let delivered = bus.publish(event.topic(), &event);
        if delivered == 0 {
            debug!("No subscribers for topic {}", event.topic());
        }
        delivered
    }
}

impl Default for ServerProtocolDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_status(value: Value) -> Result<ServerStatus, ProtocolError> {
    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
        reason: format!("invalid status: {}", e),
    })
}
