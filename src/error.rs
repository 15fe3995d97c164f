//! Error types shared across the crate
//!
//! Each layer has its own error enum:
//! - `SourceError` - the audio source could not be acquired or read
//! - `ProtocolError` - an inbound frame or reply body could not be decoded
//! - `TransportError` - the transport rejected or failed a request
//! - `SessionError` - a session command was rejected or failed

use thiserror::Error;
use tokio_tungstenite::tungstenite;

use crate::session::SessionState;

/// Audio source failures
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("permission to capture audio was denied: {0}")]
    PermissionDenied(String),

    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("audio source is already capturing")]
    AlreadyCapturing,

    #[error("invalid audio input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for SourceError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(error.to_string()),
            _ => Self::DeviceUnavailable(error.to_string()),
        }
    }
}

/// Inbound payload could not be decoded
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {reason}")]
    Malformed { reason: String },

    #[error("frame has no string `type` tag")]
    MissingType,
}

/// Transport failures
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("a request is already in flight")]
    Busy,

    #[error("transport has been closed")]
    Closed,

    #[error("server responded with HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("undecodable response: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection failed: {0}")]
    Connection(String),
}

impl TransportError {
    /// The transport was not ready; the caller may try again later
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransportError::NotConnected | TransportError::Busy)
    }
}

/// Session command failures
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("audio source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error("cannot {command} while {state}")]
    InvalidTransition {
        state: SessionState,
        command: &'static str,
    },

    #[error("chunk {got} is out of order (expected at least {expected})")]
    OutOfOrderChunk { expected: u64, got: u64 },

    #[error("chunk {got} leaves no room for a following sequence number")]
    SequenceExhausted { got: u64 },

    #[error("streaming connection could not be re-established")]
    ReconnectExhausted,

    #[error(transparent)]
    Transport(#[from] TransportError),
}
