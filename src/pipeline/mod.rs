//! Streaming pipeline: file preparation, the transmitter state machine and
//! the live path.
//!
//! # Architecture
//!
//! ```text
//! prepare_file(AudioSource)                   ← pure compute, no I/O
//!        │  decode → resample → quantize → chunk
//!        ▼
//! PreparedAudio { chunks, metadata }
//!        │
//!        ▼
//! Transmitter::stream()                       ← async, one send at a time
//!        │  start → chunk₀ … chunkₙ (paced) → end
//!        ▼
//! StreamReport / TransmitError
//!
//! LiveStreamer: LiveCapture → quantize → mpsc → Transmitter::push
//!
//! Transmitter ──events──▶ Observer (default: log_event)
//!             ──mirror──▶ SharedStatus (Arc<Mutex<StreamStatus>>) for callers that poll
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pcm_streamer::audio::{AudioSource, SymphoniaDecoder};
//! use pcm_streamer::config::AppConfig;
//! use pcm_streamer::pipeline::{stream_file, Transmitter};
//! use pcm_streamer::transport::build_transport;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::load()?;
//!     let transport = build_transport(&config.transport)?;
//!     let mut tx = Transmitter::new(transport, config.stream.clone());
//!
//!     let source = AudioSource::from_path("song.mp3")?;
//!     let decoder = Arc::new(SymphoniaDecoder::new());
//!     let report = stream_file(source, decoder, &config.audio, &mut tx).await?;
//!     println!("sent {} chunks", report.chunks_sent);
//!     Ok(())
//! }
//! ```

pub mod live;
pub mod state;
pub mod transmitter;

pub use live::{LiveError, LiveStreamer};
pub use state::{
    new_shared_status, SharedStatus, StreamEvent, StreamSession, StreamState, StreamStatus,
};
pub use transmitter::{
    log_event, CancelHandle, Observer, StreamOutcome, StreamReport, TransmitError, TransmitStage,
    Transmitter,
};

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{
    chunk, quantize, resample, AudioSource, ChunkError, Chunks, DecodeError, Decoder,
    ResampleError,
};
use crate::config::{AudioConfig, OUTPUT_CHANNELS};

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

/// Any failure of one file-streaming invocation, unchanged from its stage.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("resample failed: {0}")]
    Resample(#[from] ResampleError),

    #[error("chunking failed: {0}")]
    Chunk(#[from] ChunkError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error("preparation task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// PreparedAudio
// ---------------------------------------------------------------------------

/// A decoded, normalised and chunked file, ready to stream.
#[derive(Debug)]
pub struct PreparedAudio {
    pub chunks: Chunks,
    /// Output rate (the configured target).
    pub sample_rate: u32,
    /// Output channel count; always 2.
    pub channels: u16,
    pub source_sample_rate: u32,
    pub source_channels: usize,
    pub duration_secs: f64,
    pub total_bytes: usize,
}

/// Decode, resample, quantize and chunk `source`.
///
/// Pure compute; run it on a blocking thread for large files.
pub fn prepare_file(
    source: AudioSource,
    decoder: &dyn Decoder,
    audio: &AudioConfig,
) -> Result<PreparedAudio, PipelineError> {
    let decoded = decoder.decode(source)?;
    let source_sample_rate = decoded.sample_rate();
    let source_channels = decoded.channel_count();

    let resampled = resample(decoded, audio.target_sample_rate)?;
    let duration_secs = resampled.duration_secs();

    let pcm = quantize(&resampled);
    drop(resampled);

    let chunks = chunk(pcm, audio.chunk_size_bytes)?;
    let total_bytes = chunks.total_bytes();

    log::info!(
        "pipeline: {source_channels} ch @ {source_sample_rate} Hz -> {} ch @ {} Hz, {:.2} s, {} bytes in {} chunks",
        OUTPUT_CHANNELS,
        audio.target_sample_rate,
        duration_secs,
        total_bytes,
        chunks.len()
    );

    Ok(PreparedAudio {
        chunks,
        sample_rate: audio.target_sample_rate,
        channels: OUTPUT_CHANNELS,
        source_sample_rate,
        source_channels,
        duration_secs,
        total_bytes,
    })
}

/// [`prepare_file`] on the blocking pool, then [`Transmitter::stream`].
pub async fn stream_file(
    source: AudioSource,
    decoder: Arc<dyn Decoder>,
    audio: &AudioConfig,
    transmitter: &mut Transmitter,
) -> Result<StreamReport, PipelineError> {
    let audio = audio.clone();
    let prepared =
        tokio::task::spawn_blocking(move || prepare_file(source, decoder.as_ref(), &audio))
            .await??;
    Ok(transmitter.stream(prepared.chunks).await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    use crate::audio::DecodedAudio;
    use crate::config::StreamConfig;
    use crate::transport::{Call, MockTransport};

    /// Decoder that ignores the payload and returns fixed planar audio.
    struct FixedDecoder {
        sample_rate: u32,
        channels: Vec<Vec<f32>>,
    }

    impl Decoder for FixedDecoder {
        fn decode(&self, _source: AudioSource) -> Result<DecodedAudio, DecodeError> {
            DecodedAudio::new(self.sample_rate, self.channels.clone())
        }
    }

    struct FailingDecoder;

    /// Records the thread it decodes on.
    #[derive(Default)]
    struct ThreadSpy(Mutex<Option<ThreadId>>);

    impl Decoder for ThreadSpy {
        fn decode(&self, _source: AudioSource) -> Result<DecodedAudio, DecodeError> {
            *self.0.lock().unwrap() = Some(thread::current().id());
            DecodedAudio::new(44_100, vec![vec![0.0; 100]])
        }
    }

    impl Decoder for FailingDecoder {
        fn decode(&self, _source: AudioSource) -> Result<DecodedAudio, DecodeError> {
            Err(DecodeError::Unsupported("xyz".into()))
        }
    }

    fn source() -> AudioSource {
        AudioSource::from_bytes(vec![1, 2, 3])
    }

    #[test]
    fn prepare_reports_metadata() {
        let decoder = FixedDecoder {
            sample_rate: 22_050,
            channels: vec![vec![0.0; 22_050]],
        };
        let prepared = prepare_file(source(), &decoder, &AudioConfig::default()).unwrap();

        assert_eq!(prepared.sample_rate, 44_100);
        assert_eq!(prepared.channels, 2);
        assert_eq!(prepared.source_sample_rate, 22_050);
        assert_eq!(prepared.source_channels, 1);
        assert!((prepared.duration_secs - 1.0).abs() < 1e-9);
        assert_eq!(prepared.total_bytes, 44_100 * 4);
        assert_eq!(prepared.chunks.len(), 59);
    }

    #[test]
    fn decode_errors_propagate_unchanged() {
        let err = prepare_file(source(), &FailingDecoder, &AudioConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Decode(DecodeError::Unsupported(_))));
    }

    #[test]
    fn zero_target_rate_is_invalid() {
        let decoder = FixedDecoder {
            sample_rate: 22_050,
            channels: vec![vec![0.0; 10]],
        };
        let audio = AudioConfig {
            target_sample_rate: 0,
            ..AudioConfig::default()
        };
        assert!(matches!(
            prepare_file(source(), &decoder, &audio),
            Err(PipelineError::Resample(ResampleError::InvalidRate(_)))
        ));
    }

    #[test]
    fn silent_zero_length_source_is_empty_buffer() {
        let decoder = FixedDecoder {
            sample_rate: 44_100,
            channels: vec![Vec::new(), Vec::new()],
        };
        assert!(matches!(
            prepare_file(source(), &decoder, &AudioConfig::default()),
            Err(PipelineError::Chunk(ChunkError::EmptyBuffer))
        ));
    }

    #[tokio::test]
    async fn stream_file_sends_every_chunk() {
        let decoder = FixedDecoder {
            sample_rate: 44_100,
            channels: vec![vec![0.5; 1_000], vec![-0.5; 1_000]],
        };
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(
            mock.clone(),
            StreamConfig {
                pacing_ms: 0,
                progress_every: 10,
            },
        );

        let report = stream_file(source(), Arc::new(decoder), &AudioConfig::default(), &mut tx)
            .await
            .unwrap();

        assert_eq!(report.chunks_sent, 2); // 4000 bytes
        assert_eq!(report.bytes_sent, 4_000);
        assert_eq!(mock.calls().first(), Some(&Call::Start));
        assert_eq!(mock.calls().last(), Some(&Call::End));
    }

    #[tokio::test]
    async fn transport_failure_surfaces_as_transmit_error() {
        let decoder = FixedDecoder {
            sample_rate: 44_100,
            channels: vec![vec![0.0; 3_000]],
        };
        let mock = Arc::new(MockTransport {
            fail_chunk: Some(1),
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), StreamConfig::default());

        let err = stream_file(source(), Arc::new(decoder), &AudioConfig::default(), &mut tx)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Transmit(TransmitError::Transport {
                stage: TransmitStage::Chunk { index: 1 },
                ..
            })
        ));
    }

    #[tokio::test]
    async fn stream_file_prepares_off_the_async_thread() {
        let spy = Arc::new(ThreadSpy::default());
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), StreamConfig::default());

        stream_file(source(), spy.clone(), &AudioConfig::default(), &mut tx)
            .await
            .unwrap();

        let decoded_on = spy.0.lock().unwrap().unwrap();
        assert_ne!(decoded_on, thread::current().id());
        assert_eq!(mock.count(&Call::End), 1);
    }
}
