//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Audio capture through an `AudioSource`
//! - Chunk sequencing and batch buffering
//! - Hand-off to a `TransportClient` (batch upload or streaming)
//! - Server directives (`continue` / `complete` / `error`)
//! - Snapshots for the presentation layer

mod config;
mod session;
mod snapshot;
mod state;
mod ticker;

pub use config::SessionConfig;
pub use session::{RecordingSession, SessionCommand};
pub use snapshot::{SessionFault, SessionSnapshot};
pub use state::SessionState;
pub use ticker::Ticker;
