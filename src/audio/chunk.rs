use chrono::{DateTime, Utc};

/// One unit of captured audio
///
/// Immutable once created; the payload is opaque to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    sequence: u64,
    payload: Vec<u8>,
    captured_at: DateTime<Utc>,
}

impl AudioChunk {
    pub fn new(sequence: u64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            payload,
            captured_at: Utc::now(),
        }
    }

    /// Position within the current recording (0-indexed)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

/// Why a chunk was refused by [`ChunkSequencer::admit`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The chunk repeats or precedes an admitted sequence number
    OutOfOrder { expected: u64 },
    /// No sequence number can follow the chunk's
    Exhausted,
}

/// Issues and admits chunk sequence numbers for one recording
///
/// Sequence numbers are strictly increasing; `reset` starts the next recording at 0.
/// `u64::MAX` is never admitted since nothing could follow it.
#[derive(Debug, Default)]
pub struct ChunkSequencer {
    next: u64,
}

impl ChunkSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowest sequence number the next chunk may carry
    pub fn next_sequence(&self) -> u64 {
        self.next
    }

    /// Wrap a freshly captured payload in a chunk carrying the next sequence number
    ///
    /// The sequence is consumed when the chunk is admitted.
    pub fn stamp(&self, payload: Vec<u8>) -> AudioChunk {
        AudioChunk::new(self.next, payload)
    }

    /// Admit a chunk into the recording
    ///
    /// Nothing is recorded when the chunk is refused.
    pub fn admit(&mut self, chunk: &AudioChunk) -> Result<(), Rejection> {
        if chunk.sequence() < self.next {
            return Err(Rejection::OutOfOrder {
                expected: self.next,
            });
        }
        self.next = chunk.sequence().checked_add(1).ok_or(Rejection::Exhausted)?;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}

/// A finished batch recording, assembled from its chunks in capture order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAudio {
    bytes: Vec<u8>,
    chunk_count: usize,
    duration_secs: u64,
}

impl RecordedAudio {
    pub fn assemble(chunks: Vec<AudioChunk>, duration_secs: u64) -> Self {
        let chunk_count = chunks.len();
        let mut bytes = Vec::with_capacity(chunks.iter().map(AudioChunk::len).sum());
        for chunk in chunks {
            bytes.extend_from_slice(chunk.payload());
        }

        Self {
            bytes,
            chunk_count,
            duration_secs,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunk_count
    }

    pub fn duration_secs(&self) -> u64 {
        self.duration_secs
    }
}
