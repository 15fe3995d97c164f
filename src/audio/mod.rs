pub mod chunk;
pub mod file;
pub mod source;

pub use chunk::{AudioChunk, ChunkSequencer, RecordedAudio, Rejection};
pub use file::{WavFileSource, WavInfo};
pub use source::AudioSource;
