use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::session::SessionConfig;
use crate::transport::{BatchConfig, ReconnectPolicy, StreamingConfig, TransportMode};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub server: ServerConfig,
    pub recording: RecordingConfig,
    pub streaming: StreamingSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "voice-relay".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// `http(s)://host:port`; the WebSocket URL is derived from it
    pub base_url: String,
    pub audio_path: String,
    pub ws_path: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            audio_path: "/api/audio".to_string(),
            ws_path: "/ws".to_string(),
            request_timeout_secs: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub mode: TransportMode,
    pub tick_interval_ms: u64,
    /// Size of each chunk emitted by file-backed sources
    pub chunk_duration_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            mode: TransportMode::Batch,
            tick_interval_ms: 1000,
            chunk_duration_ms: 250,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StreamingSettings {
    pub reconnect_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

impl Default for StreamingSettings {
    fn default() -> Self {
        Self {
            reconnect_interval_ms: 3000,
            max_reconnect_attempts: 5,
        }
    }
}

impl Config {
    /// Load `path` (optional, any format the `config` crate knows) with
    /// `VOICE_RELAY__SECTION__KEY` environment overrides on top
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("VOICE_RELAY")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    pub fn audio_url(&self) -> String {
        join_url(&self.server.base_url, &self.server.audio_path)
    }

    pub fn ws_url(&self) -> String {
        let base = self.server.base_url.replacen("http", "ws", 1);
        join_url(&base, &self.server.ws_path)
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(
            self.streaming.max_reconnect_attempts,
            Duration::from_millis(self.streaming.reconnect_interval_ms),
        )
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            endpoint: self.audio_url(),
            request_timeout: Duration::from_secs(self.server.request_timeout_secs),
        }
    }

    pub fn streaming_config(&self) -> StreamingConfig {
        StreamingConfig {
            url: self.ws_url(),
            reconnect: self.reconnect_policy(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            tick_interval: Duration::from_millis(self.recording.tick_interval_ms),
            ..SessionConfig::default()
        }
    }

    pub fn chunk_duration(&self) -> Duration {
        Duration::from_millis(self.recording.chunk_duration_ms)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}
