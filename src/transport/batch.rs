use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use reqwest::multipart;
use tracing::{error, info, warn};

use super::{ConnectionState, SendOutcome, TransportClient, TransportMode};
use crate::error::TransportError;
use crate::events::{topics, EventBus, ServerEvent, ServerMessage, ServerProtocolDecoder, ServerStatus};

/// Multipart field carrying the recording
pub const AUDIO_FIELD: &str = "audio";
/// File name attached to the uploaded part
pub const AUDIO_FILE_NAME: &str = "recording.wav";
/// Media type of the uploaded part
pub const AUDIO_MIME_TYPE: &str = "audio/wav";

/// Configuration for batch uploads
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Full upload URL, e.g. `http://localhost:8080/api/audio`
    pub endpoint: String,
    /// Upper bound on one request/response round trip
    pub request_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8080/api/audio".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Uploads finished recordings, one request at a time
///
/// A `send` while another is outstanding fails with `Busy`. Failed uploads are
/// not retried; the caller decides whether to resubmit.
pub struct BatchUploader {
    client: reqwest::Client,
    config: BatchConfig,
    decoder: ServerProtocolDecoder,
    bus: EventBus<ServerEvent>,
    in_flight: AtomicBool,
    closed: AtomicBool,
}

impl BatchUploader {
    pub fn new(config: BatchConfig) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        info!("Batch uploader targeting {}", config.endpoint);

        Ok(Self {
            client,
            config,
            decoder: ServerProtocolDecoder::new(),
            bus: EventBus::new(),
            in_flight: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Upload one recording and wait for the server's reply
    pub async fn upload(&self, audio: Vec<u8>) -> Result<ServerMessage, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        let _guard = InFlightGuard::acquire(&self.in_flight).ok_or(TransportError::Busy)?;

        let bytes = audio.len();
        let part = multipart::Part::bytes(audio)
            .file_name(AUDIO_FILE_NAME)
            .mime_str(AUDIO_MIME_TYPE)?;
        let form = multipart::Form::new().part(AUDIO_FIELD, part);

        info!("Uploading {} bytes to {}", bytes, self.config.endpoint);

        let response = self
            .client
            .post(&self.config.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Upload failed: {}", e);
                TransportError::from(e)
            })?;

        let status = response.status();
        let body = response.text().await?;

        let reply = match self.decoder.decode_reply(&body) {
            Ok(reply) => reply,
            Err(_) if !status.is_success() => {
                error!("Upload rejected with HTTP {}: {}", status, body);
                return Err(TransportError::Http {
                    status: status.as_u16(),
                    body,
                });
            }
            Err(e) => {
                error!("Failed to decode upload reply: {}", e);
                return Err(TransportError::Protocol(e));
            }
        };

        if !status.is_success() && reply.status != Some(ServerStatus::Error) {
            warn!("HTTP {} carried a non-error reply: {:?}", status, reply.status);
        }

        info!("Upload reply: {:?}", reply.status);
        self.bus.publish(topics::STATUS, &ServerEvent::Message(reply.clone()));

        Ok(reply)
    }
}

#[async_trait::async_trait]
impl TransportClient for BatchUploader {
    fn mode(&self) -> TransportMode {
        TransportMode::Batch
    }

    async fn send(&self, payload: Vec<u8>) -> Result<SendOutcome, TransportError> {
        self.upload(payload).await.map(SendOutcome::Replied)
    }

    fn events(&self) -> &EventBus<ServerEvent> {
        &self.bus
    }

    fn connection_state(&self) -> ConnectionState {
        if self.closed.load(Ordering::SeqCst) {
            ConnectionState::Disconnected
        } else {
            ConnectionState::Connected
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!("Batch uploader closed");
        }
        Ok(())
    }
}

/// Marks a request as outstanding until dropped, including on cancellation
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
