use tokio::sync::mpsc;

use crate::error::SourceError;

/// Audio capture source
///
/// The session treats the source as an opaque producer of binary chunks.
/// Implementations:
/// - `WavFileSource`: plays back a WAV file (CLI, testing)
/// - Live device capture lives outside this crate and only needs this trait
#[async_trait::async_trait]
pub trait AudioSource: Send {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that yields captured chunks in capture order.
    /// The channel closes when the source runs out of audio.
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError>;

    /// Stop capturing audio
    ///
    /// Must halt emission before returning. Stopping an idle source is a no-op.
    fn stop(&mut self) -> Result<(), SourceError>;

    /// Check if source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}
