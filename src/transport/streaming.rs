use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::connector::{Connector, Frame, FrameSink, FrameStream, WsConnector};
use super::reconnect::{ReconnectDecision, ReconnectPolicy};
use super::{ConnectionState, SendOutcome, TransportClient, TransportMode};
use crate::error::TransportError;
use crate::events::{topics, EventBus, ServerEvent, ServerProtocolDecoder};

/// Configuration for the streaming channel
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// WebSocket URL, e.g. `ws://localhost:8080/ws`
    pub url: String,
    pub reconnect: ReconnectPolicy,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8080/ws".to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Persistent connection that streams audio chunks as they are captured
///
/// Chunks are only accepted while `Connected`; nothing is queued for later
/// delivery. Inbound text frames are decoded and published on the channel's bus.
/// A lost connection is re-established by a single supervisor task following the
/// `ReconnectPolicy`; when attempts run out the channel ends in `Failed`.
pub struct StreamingChannel {
    shared: Arc<Shared>,
}

struct Shared {
    config: StreamingConfig,
    connector: Arc<dyn Connector>,
    decoder: ServerProtocolDecoder,
    bus: EventBus<ServerEvent>,
    sink: tokio::sync::Mutex<Option<FrameSink>>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    closed: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl StreamingChannel {
    pub fn new(config: StreamingConfig, connector: Arc<dyn Connector>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                decoder: ServerProtocolDecoder::new(),
                bus: EventBus::new(),
                sink: tokio::sync::Mutex::new(None),
                state,
                attempts: AtomicU32::new(0),
                closed: AtomicBool::new(false),
                supervisor: Mutex::new(None),
            }),
        }
    }

    /// Channel over a real WebSocket connection
    pub fn websocket(config: StreamingConfig) -> Self {
        Self::new(config, Arc::new(WsConnector))
    }

    pub fn url(&self) -> &str {
        &self.shared.config.url
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver that observes every connection state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Reconnect attempts made since the last successful connection
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Run the connect handshake
    ///
    /// Already connected (or reconnecting) channels are left alone. A failed
    /// handshake returns the error and leaves the channel `Disconnected`.
    pub async fn connect(&self) -> Result<(), TransportError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        match self.state() {
            ConnectionState::Connecting
            | ConnectionState::Connected
            | ConnectionState::Reconnecting => return Ok(()),
            ConnectionState::Disconnected | ConnectionState::Failed => {}
        }

        self.shared.set_state(ConnectionState::Connecting);

        let (sink, stream) = match self.shared.connector.connect(&self.shared.config.url).await {
            Ok(halves) => halves,
            Err(e) => {
                error!("Failed to connect to {}: {}", self.shared.config.url, e);
                self.shared.set_state(ConnectionState::Disconnected);
                return Err(e);
            }
        };

        *self.shared.sink.lock().await = Some(sink);
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.set_state(ConnectionState::Connected);

        let supervisor = tokio::spawn(Arc::clone(&self.shared).supervise(stream));
        let previous = self
            .shared
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(supervisor);
        if let Some(previous) = previous {
            previous.abort();
        }

        Ok(())
    }

    /// Write one binary frame
    pub async fn send_chunk(&self, chunk: Vec<u8>) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }

        let mut sink = self.shared.sink.lock().await;
        let Some(writer) = sink.as_mut() else {
            return Err(TransportError::NotConnected);
        };

        let bytes = chunk.len();
        if let Err(e) = writer.send(Frame::Binary(chunk)).await {
            warn!("Failed to send audio chunk: {}", e);
            // The supervisor notices the broken stream and reconnects
            sink.take();
            return Err(e);
        }

        debug!("Sent audio chunk ({} bytes)", bytes);
        Ok(())
    }

    /// Stop the supervisor and close the connection; no reconnects follow
    pub async fn shutdown(&self) -> Result<(), TransportError> {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Closing streaming channel");

        let supervisor = self
            .shared
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }

        let sink = self.shared.sink.lock().await.take();
        if let Some(mut sink) = sink {
            if let Err(e) = sink.close().await {
                debug!("Error while closing connection: {}", e);
            }
        }

        self.shared.set_state(ConnectionState::Disconnected);
        Ok(())
    }
}

impl Shared {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            info!("Connection state: {:?} -> {:?}", previous, next);
            self.bus
                .publish(topics::CONNECTION, &ServerEvent::Connection(next));
        }
    }

    /// Read frames until the connection drops, then reconnect; repeat
    async fn supervise(self: Arc<Self>, mut stream: FrameStream) {
        loop {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(Frame::Text(text)) => {
                        self.decoder.dispatch(&text, &self.bus);
                    }
                    Ok(Frame::Binary(bytes)) => {
                        warn!("Ignoring unexpected binary frame ({} bytes)", bytes.len());
                    }
                    Ok(Frame::Close) => {
                        info!("Server closed the connection");
                        break;
                    }
                    Err(e) => {
                        warn!("Connection error: {}", e);
                        break;
                    }
                }
            }

            self.sink.lock().await.take();

            if self.closed.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected);
                return;
            }

            match self.reconnect().await {
                Some(next) => stream = next,
                None => return,
            }
        }
    }

    /// Serialized reconnect attempts; `None` once the policy gives up
    async fn reconnect(&self) -> Option<FrameStream> {
        self.set_state(ConnectionState::Reconnecting);

        loop {
            let made = self.attempts.load(Ordering::SeqCst);
            let (attempt, delay) = match self.config.reconnect.decide(made) {
                ReconnectDecision::Retry { attempt, delay } => (attempt, delay),
                ReconnectDecision::GiveUp => {
                    error!("Max reconnection attempts reached ({})", made);
                    self.set_state(ConnectionState::Failed);
                    return None;
                }
            };

            self.attempts.store(attempt, Ordering::SeqCst);
            info!(
                "Attempting to reconnect in {:?} ({}/{})",
                delay, attempt, self.config.reconnect.max_attempts
            );
            tokio::time::sleep(delay).await;

            if self.closed.load(Ordering::SeqCst) {
                return None;
            }

            match self.connector.connect(&self.config.url).await {
                Ok((sink, stream)) => {
                    *self.sink.lock().await = Some(sink);
                    self.attempts.store(0, Ordering::SeqCst);
                    self.set_state(ConnectionState::Connected);
                    return Some(stream);
                }
                Err(e) => {
                    warn!("Reconnect attempt {} failed: {}", attempt, e);
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl TransportClient for StreamingChannel {
    fn mode(&self) -> TransportMode {
        TransportMode::Streaming
    }

    async fn send(&self, payload: Vec<u8>) -> Result<SendOutcome, TransportError> {
        self.send_chunk(payload).await.map(|_| SendOutcome::Streamed)
    }

    fn events(&self) -> &EventBus<ServerEvent> {
        &self.shared.bus
    }

    fn connection_state(&self) -> ConnectionState {
        self.state()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shutdown().await
    }
}

impl Drop for StreamingChannel {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        let supervisor = self
            .shared
            .supervisor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(supervisor) = supervisor {
            supervisor.abort();
        }
    }
}
