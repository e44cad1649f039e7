//! Splitting a [`PcmBuffer`] into fixed-size transmission units.
//!
//! Boundaries are computed in whole samples (`chunk_size_bytes / 2` samples
//! per chunk), so a chunk never splits an `i16` in half.  A stereo frame may
//! straddle two chunks when the per-chunk sample count is odd; the receiver
//! appends chunks back into one continuous stream before playback, so only
//! sample alignment matters on the wire.
//!
//! ```rust
//! use pcm_streamer::audio::{chunk, PcmBuffer};
//!
//! let pcm = PcmBuffer::from_samples(vec![0; 2_500]); // 5000 bytes
//! let sizes: Vec<usize> = chunk(pcm, 3_000).unwrap().map(|c| c.len()).collect();
//! assert_eq!(sizes, vec![3_000, 2_000]);
//! ```

use thiserror::Error;

use crate::audio::PcmBuffer;

/// Default transmission unit in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 3_000;

// ---------------------------------------------------------------------------
// ChunkError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    /// There is nothing to send.
    #[error("cannot chunk an empty PCM buffer")]
    EmptyBuffer,

    /// The chunk size cannot hold a single 16-bit sample.
    #[error("chunk size must be at least 2 bytes, got {0}")]
    InvalidChunkSize(usize),
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// One transmission unit: a contiguous run of the PCM byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    index: usize,
    bytes: Vec<u8>,
}

impl Chunk {
    /// Position of this chunk in the stream, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl AsRef<[u8]> for Chunk {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

// ---------------------------------------------------------------------------
// Chunks
// ---------------------------------------------------------------------------

/// Ordered, single-pass sequence of [`Chunk`]s produced by [`chunk`].
#[derive(Debug)]
pub struct Chunks {
    bytes: Vec<u8>,
    chunk_bytes: usize,
    offset: usize,
    index: usize,
}

impl Chunks {
    /// Total bytes covered by the whole sequence.
    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Bytes per full chunk (the last one may be shorter).
    pub fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }
}

impl Iterator for Chunks {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.offset >= self.bytes.len() {
            return None;
        }
        let end = (self.offset + self.chunk_bytes).min(self.bytes.len());
        let chunk = Chunk {
            index: self.index,
            bytes: self.bytes[self.offset..end].to_vec(),
        };
        self.offset = end;
        self.index += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.bytes.len() - self.offset).div_ceil(self.chunk_bytes);
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks {}

/// Split `buffer` into chunks of at most `chunk_size_bytes` bytes.
///
/// An odd `chunk_size_bytes` is rounded down to a whole sample.
///
/// # Errors
///
/// [`ChunkError::EmptyBuffer`] for an empty buffer and
/// [`ChunkError::InvalidChunkSize`] when `chunk_size_bytes < 2`.
pub fn chunk(buffer: PcmBuffer, chunk_size_bytes: usize) -> Result<Chunks, ChunkError> {
    let samples_per_chunk = chunk_size_bytes / 2;
    if samples_per_chunk == 0 {
        return Err(ChunkError::InvalidChunkSize(chunk_size_bytes));
    }
    if buffer.is_empty() {
        return Err(ChunkError::EmptyBuffer);
    }

    let chunks = Chunks {
        bytes: buffer.to_bytes(),
        chunk_bytes: samples_per_chunk * 2,
        offset: 0,
        index: 0,
    };
    log::debug!(
        "chunk: {} bytes -> {} chunks of {} bytes",
        chunks.total_bytes(),
        chunks.len(),
        chunks.chunk_bytes
    );
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
