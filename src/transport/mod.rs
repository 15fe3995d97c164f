//! Transport clients
//!
//! Two strategies behind one contract:
//! - `BatchUploader` - one multipart upload per finished recording
//! - `StreamingChannel` - chunks streamed over a persistent WebSocket, with
//!   automatic reconnection driven by `ReconnectPolicy`

mod batch;
mod connector;
mod reconnect;
mod streaming;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;
use crate::events::{EventBus, ServerEvent, ServerMessage};

pub use batch::{BatchConfig, BatchUploader, AUDIO_FIELD, AUDIO_FILE_NAME, AUDIO_MIME_TYPE};
pub use connector::{Connector, Frame, FrameSink, FrameStream, WsConnector};
pub use reconnect::{ReconnectDecision, ReconnectPolicy};
pub use streaming::{StreamingChannel, StreamingConfig};

/// How recordings reach the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    /// Whole recording uploaded after review
    Batch,
    /// Chunks sent as they are captured
    Streaming,
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportMode::Batch => write!(f, "batch"),
            TransportMode::Streaming => write!(f, "streaming"),
        }
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "batch" => Ok(TransportMode::Batch),
            "streaming" | "stream" => Ok(TransportMode::Streaming),
            other => Err(format!("unknown transport mode: {}", other)),
        }
    }
}

/// Connection lifecycle, owned by the transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    /// Reconnect attempts exhausted; no further automatic attempts
    Failed,
}

/// Result of a successful `send`
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Batch: the server's reply to the upload
    Replied(ServerMessage),
    /// Streaming: the chunk was written to the connection
    Streamed,
}

/// Contract shared by both transport strategies
#[async_trait::async_trait]
pub trait TransportClient: Send + Sync {
    fn mode(&self) -> TransportMode;

    /// Deliver `payload` to the server
    async fn send(&self, payload: Vec<u8>) -> Result<SendOutcome, TransportError>;

    /// Bus carrying decoded server messages and connection changes
    fn events(&self) -> &EventBus<ServerEvent>;

    fn connection_state(&self) -> ConnectionState;

    /// Release the connection / client; later sends fail
    async fn close(&self) -> Result<(), TransportError>;
}
