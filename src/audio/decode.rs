//! Container/codec decoding into planar `f32` audio.
//!
//! [`Decoder`] is the seam the pipeline depends on; it only cares that an
//! [`AudioSource`] comes out as a [`DecodedAudio`] or a [`DecodeError`].
//! [`SymphoniaDecoder`] is the production implementation and handles WAV,
//! FLAC, Ogg/Vorbis, MP3, AAC/M4A and ALAC.

use std::io::{Cursor, ErrorKind};

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use crate::audio::AudioSource;

// ---------------------------------------------------------------------------
// DecodeError
// ---------------------------------------------------------------------------

/// Reasons an encoded payload could not be turned into samples.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// No reader/codec recognised the container or codec.
    #[error("unsupported audio format: {0}")]
    Unsupported(String),

    /// The container was recognised but its contents are invalid.
    #[error("malformed audio data: {0}")]
    Malformed(String),

    /// The stream ended before the declared number of frames was decoded.
    #[error("audio stream truncated: decoded {decoded} of {expected} frames")]
    Truncated { expected: u64, decoded: u64 },

    /// The container holds no decodable audio track.
    #[error("no audio track found")]
    NoAudioTrack,

    #[error("audio declares zero channels")]
    ZeroChannels,

    /// Decoding succeeded but produced no samples.
    #[error("audio has zero duration")]
    Empty,

    /// Per-channel sample sequences have different lengths.
    #[error("channel {channel} has {len} frames, expected {expected}")]
    ChannelLengthMismatch {
        channel: usize,
        len: usize,
        expected: usize,
    },
}

impl From<SymphoniaError> for DecodeError {
    fn from(e: SymphoniaError) -> Self {
        match e {
            SymphoniaError::Unsupported(what) => DecodeError::Unsupported(what.to_string()),
            SymphoniaError::IoError(io) if io.kind() == ErrorKind::UnexpectedEof => {
                DecodeError::Malformed("unexpected end of stream".into())
            }
            other => DecodeError::Malformed(other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// DecodedAudio
// ---------------------------------------------------------------------------

/// Planar floating-point audio as produced by a [`Decoder`].
///
/// Every channel holds exactly `frame_count()` samples, nominally in
/// `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    /// Build from per-channel sample vectors.
    ///
    /// # Errors
    ///
    /// [`DecodeError::ZeroChannels`] when `channels` is empty, and
    /// [`DecodeError::ChannelLengthMismatch`] when the channels disagree on
    /// length.
    pub fn new(sample_rate: u32, channels: Vec<Vec<f32>>) -> Result<Self, DecodeError> {
        let expected = channels.first().ok_or(DecodeError::ZeroChannels)?.len();
        if let Some((channel, ch)) = channels
            .iter()
            .enumerate()
            .find(|(_, ch)| ch.len() != expected)
        {
            return Err(DecodeError::ChannelLengthMismatch {
                channel,
                len: ch.len(),
                expected,
            });
        }
        Ok(Self {
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration in seconds; `0.0` for a zero sample rate.
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    pub fn into_channels(self) -> Vec<Vec<f32>> {
        self.channels
    }
}

// ---------------------------------------------------------------------------
// Decoder trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe interface for audio decoders.
///
/// # Contract
///
/// - Fails with [`DecodeError`] when the payload is not a valid/supported
///   container, is truncated, or declares zero channels or zero duration.
/// - No side effects beyond allocating the output buffers.
pub trait Decoder: Send + Sync {
    fn decode(&self, source: AudioSource) -> Result<DecodedAudio, DecodeError>;
}

// Compile-time assertion: Box<dyn Decoder> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Decoder>) {}
};

// ---------------------------------------------------------------------------
// SymphoniaDecoder
// ---------------------------------------------------------------------------

/// [`Decoder`] backed by `symphonia`'s probe and codec registries.
///
/// The first decodable track is used; packets from other tracks are skipped.
/// Individually corrupt packets are skipped with a warning, but a stream that
/// ends short of its declared length is reported as
/// [`DecodeError::Truncated`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl SymphoniaDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for SymphoniaDecoder {
    fn decode(&self, source: AudioSource) -> Result<DecodedAudio, DecodeError> {
        if source.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mut hint = Hint::new();
        if let Some(ext) = source.hint() {
            hint.with_extension(ext);
        }

        let cursor = Cursor::new(source.into_bytes());
        let mss = MediaSourceStream::new(Box::new(cursor), Default::default());
        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let mut decoder =
            symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

        let mut sample_rate = params.sample_rate.unwrap_or(0);
        let mut channels: Vec<Vec<f32>> = match params.channels {
            Some(layout) if layout.count() == 0 => return Err(DecodeError::ZeroChannels),
            Some(layout) => vec![Vec::new(); layout.count()],
            None => Vec::new(),
        };
        let mut skipped = 0usize;

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => {
                    return Err(DecodeError::Unsupported(
                        "track layout changed mid-stream".into(),
                    ))
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let frames = decoded.frames();
                    let count = spec.channels.count();
                    if count == 0 {
                        return Err(DecodeError::ZeroChannels);
                    }
                    if frames == 0 {
                        continue;
                    }
                    if channels.is_empty() {
                        channels = vec![Vec::new(); count];
                    } else if channels.len() != count {
                        return Err(DecodeError::Malformed(format!(
                            "channel count changed from {} to {count}",
                            channels.len()
                        )));
                    }
                    sample_rate = spec.rate;

                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_planar_ref(decoded);
                    for (plane, out) in buf.samples().chunks_exact(frames).zip(channels.iter_mut()) {
                        out.extend_from_slice(plane);
                    }
                }
                Err(SymphoniaError::DecodeError(msg)) => {
                    skipped += 1;
                    log::warn!("decode: skipping corrupt packet: {msg}");
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
        }

        if channels.is_empty() {
            return Err(DecodeError::ZeroChannels);
        }
        let decoded_frames = channels[0].len() as u64;
        if decoded_frames == 0 {
            return Err(DecodeError::Empty);
        }

        // The final packet of a stream may legitimately come up short of the
        // declared length by less than one packet.
        if let Some(expected) = params.n_frames {
            let slack = params.max_frames_per_packet.unwrap_or(0);
            if decoded_frames + slack < expected {
                return Err(DecodeError::Truncated {
                    expected,
                    decoded: decoded_frames,
                });
            }
        }

        log::debug!(
            "decode: {} frames @ {} Hz, {} ch ({} corrupt packets skipped)",
            decoded_frames,
            sample_rate,
            channels.len(),
            skipped
        );

        DecodedAudio::new(sample_rate, channels)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
