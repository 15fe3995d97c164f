use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::state::SessionState;
use crate::transport::{ConnectionState, TransportMode};

/// Condition surfaced to the caller when the session cannot carry on normally
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SessionFault {
    /// The audio source could not be acquired (permission denied, no device)
    SourceUnavailable(String),
    /// The request or connection failed after being attempted
    TransportFailure(String),
    /// The server answered with an `error` status
    ServerError(String),
    /// The streaming connection could not be re-established
    ReconnectExhausted,
}

/// Read-only view of a recording session for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Current lifecycle state
    pub state: SessionState,

    /// Transport strategy the session was built with
    pub mode: TransportMode,

    /// Seconds recorded so far in the current recording
    pub elapsed_seconds: u64,

    /// Chunks buffered for the batch upload
    pub pending_chunks: usize,

    /// Size of the assembled recording, while one exists
    pub recorded_bytes: Option<usize>,

    /// Most recent server payload shown to the user
    pub last_message: Option<Value>,

    /// Surfaced condition, if any
    pub fault: Option<SessionFault>,

    /// Transport connection state at the time of the snapshot
    pub connection: ConnectionState,

    /// When this snapshot was taken
    pub updated_at: DateTime<Utc>,
}
