use std::mem;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::snapshot::{SessionFault, SessionSnapshot};
use super::state::SessionState;
use super::ticker::Ticker;
use crate::audio::{AudioChunk, AudioSource, ChunkSequencer, RecordedAudio, Rejection};
use crate::error::{SessionError, TransportError};
use crate::events::{topics, ServerEvent, ServerMessage, ServerStatus, Subscription};
use crate::transport::{ConnectionState, SendOutcome, TransportClient, TransportMode};

/// Commands issued by the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    Start,
    Stop,
    Submit,
    Discard,
    Reset,
    /// Leave `run`, releasing any active capture
    Shutdown,
}

/// Resources held only while recording; dropping them cancels the ticker
struct Capture {
    frames: mpsc::Receiver<Vec<u8>>,
    ticker: Ticker,
}

/// Batch upload started by `run`, polled alongside the other activities
type Upload = BoxFuture<'static, Result<SendOutcome, TransportError>>;

enum Activity {
    Command(Option<SessionCommand>),
    Frame(Vec<u8>),
    SourceEnded,
    Tick,
    Event(ServerEvent),
    Uploaded(Result<SendOutcome, TransportError>),
}

/// A recording session that captures audio, hands it to its transport and follows
/// the server's directives
pub struct RecordingSession {
    /// Session configuration
    config: SessionConfig,

    /// Transport strategy, fixed by the transport at creation
    mode: TransportMode,

    /// Audio capture collaborator
    source: Box<dyn AudioSource>,

    /// Owned transport; shared only with an in-flight upload
    transport: Arc<dyn TransportClient>,

    state: SessionState,

    /// Time recorded in the current recording, one tick interval per tick
    elapsed: Duration,

    /// Chunks awaiting the batch upload (always empty in streaming mode)
    pending_chunks: Vec<AudioChunk>,

    /// Assembled recording while reviewing / sending
    recording: Option<RecordedAudio>,

    /// Most recent server payload
    last_message: Option<Value>,

    /// Condition surfaced to the caller
    fault: Option<SessionFault>,

    sequencer: ChunkSequencer,

    capture: Option<Capture>,

    /// Transport events forwarded from bus handlers; the sender keeps the inbox open
    inbox_tx: mpsc::UnboundedSender<ServerEvent>,
    inbox: mpsc::UnboundedReceiver<ServerEvent>,

    subscriptions: Vec<Subscription>,

    observer: watch::Sender<SessionSnapshot>,
}

impl RecordingSession {
    /// Create a new session owning `source` and `transport`
    ///
    /// In streaming mode the session subscribes to the transport's status,
    /// transcript, connection and error topics.
    pub fn new(
        config: SessionConfig,
        source: Box<dyn AudioSource>,
        transport: Box<dyn TransportClient>,
    ) -> Self {
        let mode = transport.mode();
        info!("Creating recording session: {} ({} mode)", config.session_id, mode);

        let (inbox_tx, inbox) = mpsc::unbounded_channel();

        let subscriptions = match mode {
            TransportMode::Streaming => [
                topics::STATUS,
                topics::TRANSCRIPT,
                topics::CONNECTION,
                topics::PROTOCOL_ERROR,
                topics::UNRECOGNIZED,
            ]
            .into_iter()
            .map(|topic| {
                let tx = inbox_tx.clone();
                transport.events().subscribe(topic, move |event: &ServerEvent| {
                    // Closed only once the session is gone
                    let _ = tx.send(event.clone());
                })
            })
            .collect(),
            TransportMode::Batch => Vec::new(),
        };

        let (observer, _) = watch::channel(SessionSnapshot {
            state: SessionState::Idle,
            mode,
            elapsed_seconds: 0,
            pending_chunks: 0,
            recorded_bytes: None,
            last_message: None,
            fault: None,
            connection: transport.connection_state(),
            updated_at: Utc::now(),
        });

        Self {
            config,
            mode,
            source,
            transport: Arc::from(transport),
            state: SessionState::Idle,
            elapsed: Duration::ZERO,
            pending_chunks: Vec::new(),
            recording: None,
            last_message: None,
            fault: None,
            sequencer: ChunkSequencer::new(),
            capture: None,
            inbox_tx,
            inbox,
            subscriptions,
            observer,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn mode(&self) -> TransportMode {
        self.mode
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whole seconds recorded so far
    pub fn elapsed_seconds(&self) -> u64 {
        self.elapsed.as_secs()
    }

    pub fn pending_chunks(&self) -> &[AudioChunk] {
        &self.pending_chunks
    }

    pub fn recording(&self) -> Option<&RecordedAudio> {
        self.recording.as_ref()
    }

    pub fn last_message(&self) -> Option<&Value> {
        self.last_message.as_ref()
    }

    pub fn fault(&self) -> Option<&SessionFault> {
        self.fault.as_ref()
    }

    pub fn transport(&self) -> &dyn TransportClient {
        self.transport.as_ref()
    }

    /// Wrap a captured payload in a chunk carrying the next sequence number
    pub fn next_chunk(&self, payload: Vec<u8>) -> AudioChunk {
        self.sequencer.stamp(payload)
    }

    /// Sender feeding the session's event inbox, for events from outside the transport bus
    pub fn event_sender(&self) -> mpsc::UnboundedSender<ServerEvent> {
        self.inbox_tx.clone()
    }

    /// Receiver for snapshots published on every change
    pub fn observe(&self) -> watch::Receiver<SessionSnapshot> {
        self.observer.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            mode: self.mode,
            elapsed_seconds: self.elapsed_seconds(),
            pending_chunks: self.pending_chunks.len(),
            recorded_bytes: self.recording.as_ref().map(RecordedAudio::len),
            last_message: self.last_message.clone(),
            fault: self.fault.clone(),
            connection: self.transport.connection_state(),
            updated_at: Utc::now(),
        }
    }

    /// Start a new recording
    ///
    /// Legal from `Idle` and `AutoPending`. If the source cannot be acquired, or a
    /// streaming connection has given up reconnecting, the state is left unchanged
    /// and the fault is surfaced.
    pub async fn start(&mut self) -> Result<(), SessionError> {
        if !self.state.can_start() {
            warn!("Cannot start recording while {}", self.state);
            return Err(self.invalid("start"));
        }

        if self.connection_lost() {
            error!("Cannot start recording: streaming connection could not be re-established");
            self.fault = Some(SessionFault::ReconnectExhausted);
            self.publish();
            return Err(SessionError::ReconnectExhausted);
        }

        info!("Starting recording from {}", self.source.name());

        let frames = match self.source.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start audio source: {}", e);
                self.fault = Some(SessionFault::SourceUnavailable(e.to_string()));
                self.publish();
                return Err(SessionError::SourceUnavailable(e));
            }
        };

        self.elapsed = Duration::ZERO;
        self.sequencer.reset();
        self.pending_chunks.clear();
        self.recording = None;
        self.fault = None;
        self.capture = Some(Capture {
            frames,
            ticker: Ticker::new(self.config.tick_interval),
        });

        self.transition(SessionState::Recording);
        Ok(())
    }

    /// Advance the elapsed time by one tick interval; ignored unless recording
    pub fn tick(&mut self) {
        if self.state != SessionState::Recording {
            debug!("Tick ignored while {}", self.state);
            return;
        }
        let step = self
            .capture
            .as_ref()
            .map_or(self.config.tick_interval, |capture| capture.ticker.period());
        self.elapsed += step;
        self.publish();
    }

    /// Accept one captured chunk
    ///
    /// Batch mode buffers it until `stop`. Streaming mode forwards it right away;
    /// if the transport is not connected the chunk is dropped and the error returned.
    pub async fn ingest(&mut self, chunk: AudioChunk) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            return Err(self.invalid("ingest"));
        }

        match self.sequencer.admit(&chunk) {
            Ok(()) => {}
            Err(Rejection::OutOfOrder { expected }) => {
                warn!(
                    "Rejecting out-of-order chunk {} (expected at least {})",
                    chunk.sequence(),
                    expected
                );
                return Err(SessionError::OutOfOrderChunk {
                    expected,
                    got: chunk.sequence(),
                });
            }
            Err(Rejection::Exhausted) => {
                warn!("Rejecting chunk {}: sequence numbers exhausted", chunk.sequence());
                return Err(SessionError::SequenceExhausted {
                    got: chunk.sequence(),
                });
            }
        }

        match self.mode {
            TransportMode::Batch => {
                debug!("Buffered chunk {} ({} bytes)", chunk.sequence(), chunk.len());
                self.pending_chunks.push(chunk);
                self.publish();
            }
            TransportMode::Streaming => {
                let sequence = chunk.sequence();
                if let Err(e) = self.transport.send(chunk.into_payload()).await {
                    warn!("Dropping chunk {}: {}", sequence, e);
                    return Err(SessionError::Transport(e));
                }
            }
        }

        Ok(())
    }

    /// Finish the current recording; a no-op unless recording
    ///
    /// Batch mode assembles the buffered chunks for review. Streaming mode waits
    /// for the server's verdict in `Sending`, unless the connection has already
    /// given up and no verdict can arrive.
    pub async fn stop(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Recording {
            debug!("Stop ignored while {}", self.state);
            return Ok(());
        }

        info!("Stopping recording after {}s", self.elapsed_seconds());
        self.halt_source();

        if let Some(mut capture) = self.capture.take() {
            // Chunks emitted before the source halted still belong to this recording
            while let Ok(payload) = capture.frames.try_recv() {
                if let Err(e) = self.capture_frame(payload).await {
                    warn!("Trailing chunk not delivered: {}", e);
                }
            }
        }

        match self.mode {
            TransportMode::Batch => {
                let chunks = mem::take(&mut self.pending_chunks);
                let recording = RecordedAudio::assemble(chunks, self.elapsed_seconds());
                info!(
                    "Recording assembled: {} chunks, {} bytes",
                    recording.chunk_count(),
                    recording.len()
                );
                self.recording = Some(recording);
                self.transition(SessionState::Reviewing);
            }
            TransportMode::Streaming if self.connection_lost() => {
                error!("Recording finished but the streaming connection could not be re-established");
                self.fault = Some(SessionFault::ReconnectExhausted);
                self.transition(SessionState::Error);
            }
            TransportMode::Streaming => {
                info!("Recording finished, awaiting server verdict");
                self.transition(SessionState::Sending);
            }
        }

        Ok(())
    }

    /// Upload the reviewed recording and apply the server's reply
    pub async fn submit(&mut self) -> Result<(), SessionError> {
        let upload = self.begin_upload()?;
        let result = upload.await;
        self.finish_upload(result)
    }

    /// Move to `Sending` and hand back the upload of the reviewed recording
    fn begin_upload(&mut self) -> Result<Upload, SessionError> {
        if self.mode != TransportMode::Batch || self.state != SessionState::Reviewing {
            return Err(self.invalid("submit"));
        }

        let payload = self
            .recording
            .as_ref()
            .map(|recording| recording.bytes().to_vec())
            .unwrap_or_default();

        self.transition(SessionState::Sending);

        let transport = Arc::clone(&self.transport);
        Ok(async move { transport.send(payload).await }.boxed())
    }

    /// Apply the outcome of an upload started by `begin_upload`
    fn finish_upload(
        &mut self,
        result: Result<SendOutcome, TransportError>,
    ) -> Result<(), SessionError> {
        if self.state != SessionState::Sending {
            warn!("Upload finished while {}, outcome ignored", self.state);
            return Ok(());
        }

        match result {
            Ok(SendOutcome::Replied(reply)) => match reply.status {
                Some(status) => {
                    self.apply_status(status, reply);
                    Ok(())
                }
                None => self.fail_transport(TransportError::Connection(
                    "reply carried no status".to_string(),
                )),
            },
            Ok(SendOutcome::Streamed) => self.fail_transport(TransportError::Connection(
                "upload produced no reply".to_string(),
            )),
            Err(e) if e.is_retryable() => {
                warn!("Upload not attempted: {}", e);
                self.transition(SessionState::Reviewing);
                Err(SessionError::Transport(e))
            }
            Err(e) => self.fail_transport(e),
        }
    }

    /// Drop the reviewed recording without sending it
    pub fn discard(&mut self) -> Result<(), SessionError> {
        if self.mode != TransportMode::Batch || self.state != SessionState::Reviewing {
            return Err(self.invalid("discard"));
        }

        info!("Discarding recording");
        self.clear_audio();
        self.elapsed = Duration::ZERO;
        self.transition(SessionState::Idle);
        Ok(())
    }

    /// Return a finished session to `Idle`, clearing all session data
    pub fn reset(&mut self) -> Result<(), SessionError> {
        if !self.state.can_reset() {
            return Err(self.invalid("reset"));
        }

        self.halt_capture();
        self.clear_audio();
        self.sequencer.reset();
        self.elapsed = Duration::ZERO;
        self.last_message = None;
        self.fault = None;
        self.transition(SessionState::Idle);
        Ok(())
    }

    /// Apply one transport event
    pub fn handle_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Message(message) => self.handle_message(message),
            ServerEvent::Unrecognized(message) => {
                debug!("Ignoring message of unrecognized type {}", message.kind);
            }
            ServerEvent::ProtocolError(e) => {
                warn!("Server sent an undecodable frame: {}", e);
            }
            ServerEvent::Connection(connection) => self.handle_connection(connection),
        }
    }

    /// Apply every transport event queued so far
    ///
    /// Returns the number of events handled.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.inbox.try_recv() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Drive the session until `Shutdown` or until the command channel closes
    ///
    /// Commands, captured chunks, ticks and transport events are handled one at a
    /// time on the calling task. A source that runs dry stops the recording.
    /// A batch upload runs alongside, so commands and events are still handled
    /// while it is in flight; leaving `run` abandons it.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<SessionCommand>) {
        info!("Session {} running", self.config.session_id);

        let mut upload: Option<Upload> = None;

        loop {
            let activity = tokio::select! {
                command = commands.recv() => Activity::Command(command),
                result = Self::upload_outcome(&mut upload) => Activity::Uploaded(result),
                activity = Self::next_activity(self.capture.as_mut(), &mut self.inbox) => activity,
            };

            match activity {
                Activity::Command(None | Some(SessionCommand::Shutdown)) => break,
                Activity::Command(Some(SessionCommand::Submit)) => match self.begin_upload() {
                    Ok(started) => upload = Some(started),
                    Err(e) => warn!("Submit rejected: {}", e),
                },
                Activity::Command(Some(command)) => {
                    if let Err(e) = self.execute(command).await {
                        warn!("{:?} rejected: {}", command, e);
                    }
                }
                Activity::Uploaded(result) => {
                    upload = None;
                    if let Err(e) = self.finish_upload(result) {
                        warn!("Submit failed: {}", e);
                    }
                }
                Activity::Frame(payload) => {
                    if let Err(e) = self.capture_frame(payload).await {
                        warn!("Chunk not delivered: {}", e);
                    }
                }
                Activity::SourceEnded => {
                    info!("Audio source finished");
                    if let Err(e) = self.stop().await {
                        warn!("Failed to stop recording: {}", e);
                    }
                }
                Activity::Tick => self.tick(),
                Activity::Event(event) => self.handle_event(event),
            }
        }

        if upload.is_some() {
            warn!("Abandoning upload in flight");
        }
        self.halt_capture();
        info!("Session {} stopped", self.config.session_id);
    }

    /// Release capture, unsubscribe and close the transport
    pub async fn close(mut self) -> Result<(), SessionError> {
        self.halt_capture();
        for subscription in self.subscriptions.drain(..) {
            subscription.unsubscribe();
        }
        self.transport.close().await?;
        info!("Session {} closed", self.config.session_id);
        Ok(())
    }

    async fn execute(&mut self, command: SessionCommand) -> Result<(), SessionError> {
        match command {
            SessionCommand::Start => self.start().await,
            SessionCommand::Stop => self.stop().await,
            SessionCommand::Submit => self.submit().await,
            SessionCommand::Discard => self.discard(),
            SessionCommand::Reset => self.reset(),
            SessionCommand::Shutdown => Ok(()),
        }
    }

    async fn upload_outcome(upload: &mut Option<Upload>) -> Result<SendOutcome, TransportError> {
        match upload {
            Some(upload) => upload.await,
            None => std::future::pending().await,
        }
    }

    async fn next_activity(
        capture: Option<&mut Capture>,
        inbox: &mut mpsc::UnboundedReceiver<ServerEvent>,
    ) -> Activity {
        match capture {
            Some(capture) => tokio::select! {
                frame = capture.frames.recv() => match frame {
                    Some(payload) => Activity::Frame(payload),
                    None => Activity::SourceEnded,
                },
                _ = capture.ticker.tick() => Activity::Tick,
                Some(event) = inbox.recv() => Activity::Event(event),
            },
            None => match inbox.recv().await {
                Some(event) => Activity::Event(event),
                None => std::future::pending().await,
            },
        }
    }

    async fn capture_frame(&mut self, payload: Vec<u8>) -> Result<(), SessionError> {
        let chunk = self.sequencer.stamp(payload);
        self.ingest(chunk).await
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match (message.status, self.state) {
            (Some(status), SessionState::Sending) => self.apply_status(status, message),
            (Some(ServerStatus::Error), SessionState::Recording)
                if self.mode == TransportMode::Streaming =>
            {
                self.halt_capture();
                self.apply_status(ServerStatus::Error, message);
            }
            (Some(status), state) => {
                debug!("Ignoring {:?} directive while {}", status, state);
                self.last_message = Some(message.data);
                self.publish();
            }
            (None, _) => {
                if let Some(text) = message.text() {
                    info!("{}: {}", message.kind, text);
                }
                self.last_message = Some(message.data);
                self.publish();
            }
        }
    }

    fn handle_connection(&mut self, connection: ConnectionState) {
        let active = matches!(self.state, SessionState::Recording | SessionState::Sending);

        if connection == ConnectionState::Failed && active && self.mode == TransportMode::Streaming {
            error!("Streaming connection could not be re-established");
            self.halt_capture();
            self.fault = Some(SessionFault::ReconnectExhausted);
            self.transition(SessionState::Error);
        } else {
            debug!("Connection state: {:?}", connection);
            self.publish();
        }
    }

    fn apply_status(&mut self, status: ServerStatus, message: ServerMessage) {
        match status {
            ServerStatus::Continue => {
                info!("Server requested another recording");
                self.clear_audio();
                self.elapsed = Duration::ZERO;
                self.last_message = Some(message.data);
                self.transition(SessionState::AutoPending);
            }
            ServerStatus::Complete => {
                info!("Server completed the conversation");
                self.clear_audio();
                self.last_message = Some(message.data);
                self.transition(SessionState::Completed);
            }
            ServerStatus::Error => {
                let detail = message
                    .text()
                    .map(str::to_string)
                    .unwrap_or_else(|| message.data.to_string());
                error!("Server reported an error: {}", detail);
                self.fault = Some(SessionFault::ServerError(detail));
                self.last_message = Some(message.data);
                self.transition(SessionState::Error);
            }
        }
    }

    /// A streaming connection that gave up reconnecting; no verdict can arrive
    fn connection_lost(&self) -> bool {
        self.mode == TransportMode::Streaming
            && self.transport.connection_state() == ConnectionState::Failed
    }

    fn fail_transport(&mut self, e: TransportError) -> Result<(), SessionError> {
        error!("Upload failed: {}", e);
        self.fault = Some(SessionFault::TransportFailure(e.to_string()));
        self.transition(SessionState::Error);
        Err(SessionError::Transport(e))
    }

    fn clear_audio(&mut self) {
        self.pending_chunks.clear();
        self.recording = None;
    }

    fn halt_source(&mut self) {
        if let Err(e) = self.source.stop() {
            warn!("Failed to stop audio source: {}", e);
        }
    }

    /// Stop the source and cancel the ticker if a capture is active
    fn halt_capture(&mut self) {
        if self.capture.take().is_some() {
            self.halt_source();
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug_assert!(
            self.state.can_transition_to(next, self.mode),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!("Session {}: {} -> {}", self.config.session_id, self.state, next);
        self.state = next;
        self.publish();
    }

    fn publish(&self) {
        self.observer.send_replace(self.snapshot());
    }

    fn invalid(&self, command: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            command,
        }
    }
}

impl Drop for RecordingSession {
    fn drop(&mut self) {
        self.halt_capture();
        for subscription in &self.subscriptions {
            subscription.unsubscribe();
        }
    }
}
