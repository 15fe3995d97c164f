use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hound::WavReader;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::source::AudioSource;
use crate::error::SourceError;

/// Format details read from a WAV header
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavInfo {
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl WavInfo {
    fn read(bytes: &[u8]) -> Result<Self, SourceError> {
        let reader = WavReader::new(Cursor::new(bytes)).map_err(wav_error)?;
        let spec = reader.spec();

        Ok(Self {
            duration_seconds: reader.duration() as f64 / spec.sample_rate as f64,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
        })
    }

    /// Bytes per sample frame (all channels)
    pub fn block_align(&self) -> usize {
        (self.channels as usize * self.bits_per_sample as usize).div_ceil(8).max(1)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.block_align() * self.sample_rate as usize
    }
}

/// Audio source that plays back a WAV file
///
/// Emits the raw file bytes (header included) in chunks holding `chunk_duration`
/// worth of audio, so that concatenating every chunk reproduces the file.
pub struct WavFileSource {
    path: PathBuf,
    info: WavInfo,
    chunk_duration: Duration,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl WavFileSource {
    pub fn open(path: impl AsRef<Path>, chunk_duration: Duration) -> Result<Self, SourceError> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let bytes = std::fs::read(path)?;
        let info = WavInfo::read(&bytes)?;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels",
            info.duration_seconds, info.sample_rate, info.channels
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
            chunk_duration: chunk_duration.max(Duration::from_millis(1)),
            realtime: true,
            task: None,
        })
    }

    /// Emit chunks as fast as the receiver accepts them instead of at playback speed
    pub fn without_pacing(mut self) -> Self {
        self.realtime = false;
        self
    }

    pub fn info(&self) -> WavInfo {
        self.info
    }

    fn chunk_size(&self) -> usize {
        let block_align = self.info.block_align();
        let bytes = self.info.bytes_per_second() as u128 * self.chunk_duration.as_millis() / 1000;
        let aligned = (bytes as usize / block_align) * block_align;
        aligned.max(block_align)
    }
}

#[async_trait::async_trait]
impl AudioSource for WavFileSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<Vec<u8>>, SourceError> {
        if self.is_capturing() {
            return Err(SourceError::AlreadyCapturing);
        }

        // Re-read so edits between recordings are picked up
        let bytes = tokio::fs::read(&self.path).await?;
        self.info = WavInfo::read(&bytes)?;

        let chunk_size = self.chunk_size();
        let chunk_duration = self.chunk_duration;
        let realtime = self.realtime;
        let (tx, rx) = mpsc::channel(32);

        info!(
            "Starting WAV playback: {} ({} bytes per chunk)",
            self.path.display(),
            chunk_size
        );

        self.task = Some(tokio::spawn(async move {
            let mut pace = tokio::time::interval(chunk_duration);
            for chunk in bytes.chunks(chunk_size) {
                if realtime {
                    pace.tick().await;
                }
                if tx.send(chunk.to_vec()).await.is_err() {
                    debug!("Chunk receiver dropped, ending playback");
                    return;
                }
            }
            debug!("WAV playback finished");
        }));

        Ok(rx)
    }

    fn stop(&mut self) -> Result<(), SourceError> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("WAV playback stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

impl Drop for WavFileSource {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

fn wav_error(error: hound::Error) -> SourceError {
    match error {
        hound::Error::IoError(io) => SourceError::from(io),
        other => SourceError::InvalidInput(other.to_string()),
    }
}
