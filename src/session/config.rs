use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (used in logs)
    pub session_id: String,

    /// How often `elapsed_seconds` advances while recording
    /// Default: 1 second
    pub tick_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            tick_interval: Duration::from_secs(1),
        }
    }
}
