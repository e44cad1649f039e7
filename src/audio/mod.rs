//! Audio stages: decode → resample → quantize → chunk, plus live capture.
//!
//! # Pipeline
//!
//! ```text
//! AudioSource (bytes + hint) → Decoder → DecodedAudio (planar f32, native rate)
//!           → resample → ResampledAudio (planar f32, 44.1 kHz)
//!           → quantize → PcmBuffer (interleaved stereo i16)
//!           → chunk → Chunks (≤ chunk_size bytes each)
//!
//! Microphone → CaptureSource → LiveCapture → CaptureBuffer (interleaved f32)
//!           → quantize_interleaved → PcmBuffer
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use pcm_streamer::audio::{chunk, quantize, resample, AudioSource, Decoder, SymphoniaDecoder};
//!
//! let source = AudioSource::from_path("song.mp3").unwrap();
//! let decoded = SymphoniaDecoder::new().decode(source).unwrap();
//! let resampled = resample(decoded, 44_100).unwrap();
//! for c in chunk(quantize(&resampled), 3_000).unwrap() {
//!     println!("chunk {} = {} bytes", c.index(), c.len());
//! }
//! ```

pub mod capture;
pub mod chunk;
pub mod decode;
pub mod pcm;
pub mod resample;
pub mod source;

pub use capture::{
    BufferCallback, CaptureBuffer, CaptureError, CaptureSource, CpalCaptureSource, LiveCapture,
};
pub use chunk::{chunk, Chunk, ChunkError, Chunks, DEFAULT_CHUNK_SIZE};
pub use decode::{DecodeError, DecodedAudio, Decoder, SymphoniaDecoder};
pub use pcm::{quantize, quantize_interleaved, quantize_sample, PcmBuffer};
pub use resample::{resample, resampled_len, InvalidRateError, ResampleError, ResampledAudio};
pub use source::AudioSource;

#[cfg(test)]
pub use capture::MockCaptureSource;
