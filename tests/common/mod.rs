// Shared test doubles: a scripted audio source, an in-memory transport and an
// in-memory streaming connector

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::channel::mpsc as frames;
use futures::SinkExt;
use tokio::sync::mpsc;

use voice_relay::audio::AudioSource;
use voice_relay::events::{EventBus, ServerEvent, ServerMessage};
use voice_relay::transport::{
    ConnectionState, Connector, Frame, FrameSink, FrameStream, SendOutcome, TransportClient,
    TransportMode,
};
use voice_relay::{SourceError, TransportError};

/// Poll `condition` until it holds; false after 5 seconds
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .is_ok()
}

// ---------------------------------------------------------------------------
// Audio source
// ---------------------------------------------------------------------------

/// Audio source whose chunks are pushed by the test through a `SourceHandle`
pub struct ScriptedSource {
    feed: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
    deny_permission: bool,
}

#[derive(Clone)]
pub struct SourceHandle {
    feed: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    starts: Arc<AtomicUsize>,
    stops: Arc<AtomicUsize>,
}

impl ScriptedSource {
    pub fn new() -> (Self, SourceHandle) {
        let feed = Arc::new(Mutex::new(None));
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));

        let handle = SourceHandle {
            feed: Arc::clone(&feed),
            starts: Arc::clone(&starts),
            stops: Arc::clone(&stops),
        };

        (
            Self {
                feed,
                starts,
                stops,
                deny_permission: false,
            },
            handle,
        )
    }

    /// A source whose `start` always fails with `PermissionDenied`
    pub fn denied() -> (Self, SourceHandle) {
        let (mut source, handle) = Self::new();
        source.deny_permission = true;
        (source, handle)
    }
}

#[async_trait::async_trait]
impl AudioSource for ScriptedSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError> {
        if self.deny_permission {
            return Err(SourceError::PermissionDenied("microphone access denied".to_string()));
        }
        if self.is_capturing() {
            return Err(SourceError::AlreadyCapturing);
        }

        let (tx, rx) = mpsc::channel(64);
        *self.feed.lock().unwrap() = Some(tx);
        self.starts.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        if self.feed.lock().unwrap().take().is_some() {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.feed.lock().unwrap().is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

impl SourceHandle {
    /// Emit one chunk; false if the source is not capturing
    pub async fn emit(&self, payload: &[u8]) -> bool {
        let tx = self.feed.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(payload.to_vec()).await.is_ok(),
            None => false,
        }
    }

    /// Close the chunk channel as if the source ran out of audio
    pub fn finish(&self) {
        self.feed.lock().unwrap().take();
    }

    pub fn is_capturing(&self) -> bool {
        self.feed.lock().unwrap().is_some()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Transport double; batch replies are scripted, streaming sends are recorded
pub struct MockTransport {
    mode: TransportMode,
    replies: Mutex<VecDeque<Result<ServerMessage, TransportError>>>,
    /// Batch sends are recorded but never answered
    unresponsive: bool,
    handle: TransportHandle,
}

#[derive(Clone)]
pub struct TransportHandle {
    pub bus: EventBus<ServerEvent>,
    sent: Arc<Mutex<Vec<Vec<u8>>>>,
    connection: Arc<Mutex<ConnectionState>>,
    closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn batch(
        replies: impl IntoIterator<Item = Result<ServerMessage, TransportError>>,
    ) -> (Self, TransportHandle) {
        Self::build(TransportMode::Batch, replies.into_iter().collect())
    }

    /// A batch transport whose uploads never get a reply
    pub fn unresponsive() -> (Self, TransportHandle) {
        let (mut transport, handle) = Self::build(TransportMode::Batch, VecDeque::new());
        transport.unresponsive = true;
        (transport, handle)
    }

    /// A connected streaming transport
    pub fn streaming() -> (Self, TransportHandle) {
        Self::build(TransportMode::Streaming, VecDeque::new())
    }

    fn build(
        mode: TransportMode,
        replies: VecDeque<Result<ServerMessage, TransportError>>,
    ) -> (Self, TransportHandle) {
        let handle = TransportHandle {
            bus: EventBus::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            connection: Arc::new(Mutex::new(ConnectionState::Connected)),
            closed: Arc::new(AtomicBool::new(false)),
        };

        (
            Self {
                mode,
                replies: Mutex::new(replies),
                unresponsive: false,
                handle: handle.clone(),
            },
            handle,
        )
    }
}

#[async_trait::async_trait]
impl TransportClient for MockTransport {
    fn mode(&self) -> TransportMode {
        self.mode
    }

    async fn send(&self, payload: Vec<u8>) -> Result<SendOutcome, TransportError> {
        if self.handle.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }

        match self.mode {
            TransportMode::Batch if self.unresponsive => {
                self.handle.sent.lock().unwrap().push(payload);
                std::future::pending().await
            }
            TransportMode::Batch => {
                let reply = self
                    .replies
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Err(TransportError::Connection("no scripted reply".into())));
                self.handle.sent.lock().unwrap().push(payload);
                reply.map(SendOutcome::Replied)
            }
            TransportMode::Streaming => {
                if self.connection_state() != ConnectionState::Connected {
                    return Err(TransportError::NotConnected);
                }
                self.handle.sent.lock().unwrap().push(payload);
                Ok(SendOutcome::Streamed)
            }
        }
    }

    fn events(&self) -> &EventBus<ServerEvent> {
        &self.handle.bus
    }

    fn connection_state(&self) -> ConnectionState {
        *self.handle.connection.lock().unwrap()
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.handle.closed.store(true, Ordering::SeqCst);
        self.handle.set_connection(ConnectionState::Disconnected);
        Ok(())
    }
}

impl TransportHandle {
    /// Publish `event` on its topic, as the transport would
    pub fn publish(&self, event: ServerEvent) -> usize {
        self.bus.publish(event.topic(), &event)
    }

    pub fn set_connected(&self, connected: bool) {
        self.set_connection(if connected {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        });
    }

    /// Change what the transport reports without publishing an event
    pub fn set_connection(&self, state: ConnectionState) {
        *self.connection.lock().unwrap() = state;
    }

    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ---------------------------------------------------------------------------
// Streaming connector
// ---------------------------------------------------------------------------

/// Server side of an in-memory connection; dropping it drops the connection
pub struct ServerEnd {
    pub to_client: frames::UnboundedSender<Result<Frame, TransportError>>,
    pub from_client: frames::UnboundedReceiver<Frame>,
}

impl ServerEnd {
    pub async fn send_text(&mut self, text: &str) {
        self.to_client
            .send(Ok(Frame::Text(text.to_string())))
            .await
            .unwrap();
    }
}

/// Connector whose handshakes succeed or fail according to a script
///
/// Once the script runs out every handshake succeeds.
pub struct MockConnector {
    script: Mutex<VecDeque<bool>>,
    calls: AtomicUsize,
    servers: mpsc::UnboundedSender<ServerEnd>,
}

impl MockConnector {
    pub fn new(
        script: impl IntoIterator<Item = bool>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (servers, accepted) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                script: Mutex::new(script.into_iter().collect()),
                calls: AtomicUsize::new(0),
                servers,
            }),
            accepted,
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> Result<(FrameSink, FrameStream), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let accept = self.script.lock().unwrap().pop_front().unwrap_or(true);
        if !accept {
            return Err(TransportError::Connection("connection refused".to_string()));
        }

        let (to_client, client_rx) = frames::unbounded();
        let (client_tx, from_client) = frames::unbounded();

        // Test may have stopped listening for new connections
        let _ = self.servers.send(ServerEnd {
            to_client,
            from_client,
        });

        let sink: FrameSink = Box::pin(client_tx.sink_map_err(|_| TransportError::Closed));
        let stream: FrameStream = Box::pin(client_rx);
        Ok((sink, stream))
    }
}
