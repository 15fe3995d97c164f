pub mod audio;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod transport;

pub use audio::{AudioChunk, AudioSource, ChunkSequencer, RecordedAudio, WavFileSource, WavInfo};
pub use config::Config;
pub use error::{ProtocolError, SessionError, SourceError, TransportError};
pub use events::{EventBus, ServerEvent, ServerMessage, ServerProtocolDecoder, ServerStatus, Subscription};
pub use session::{
    RecordingSession, SessionCommand, SessionConfig, SessionFault, SessionSnapshot, SessionState,
};
pub use transport::{
    BatchConfig, BatchUploader, ConnectionState, ReconnectPolicy, SendOutcome, StreamingChannel,
    StreamingConfig, TransportClient, TransportMode,
};
