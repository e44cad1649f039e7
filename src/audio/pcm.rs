//! Float → signed 16-bit PCM quantization and stereo interleaving.
//!
//! Scaling is asymmetric: negative samples are multiplied by 32768 and
//! non-negative ones by 32767, so `-1.0 → -32768` and `1.0 → 32767` both land
//! exactly on the ends of the `i16` range.  The scaled value is truncated
//! toward zero, never rounded; receivers expect this exact byte stream.
//!
//! Output is always stereo: mono input is duplicated to both positions and
//! any channels past the second are dropped.

use crate::audio::ResampledAudio;
use crate::config::OUTPUT_CHANNELS;

// ---------------------------------------------------------------------------
// PcmBuffer
// ---------------------------------------------------------------------------

/// Interleaved stereo `i16` samples (`L0 R0 L1 R1 …`).
///
/// The wire layout is little-endian, two bytes per sample, no header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PcmBuffer {
    samples: Vec<i16>,
}

impl PcmBuffer {
    /// Wrap already-interleaved stereo samples.
    pub fn from_samples(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of `i16` samples (twice the frame count).
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn frame_count(&self) -> usize {
        self.samples.len() / OUTPUT_CHANNELS as usize
    }

    pub fn byte_len(&self) -> usize {
        self.samples.len() * 2
    }

    /// Little-endian byte image of the buffer.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.byte_len());
        for s in &self.samples {
            bytes.extend_from_slice(&s.to_le_bytes());
        }
        bytes
    }
}

// ---------------------------------------------------------------------------
// Quantization
// ---------------------------------------------------------------------------

/// Quantize one float sample.
///
/// Clamps to `[-1.0, 1.0]` first, so resampler overshoot saturates instead of
/// wrapping.  `NaN` maps to `0`.
///
/// ```rust
/// use pcm_streamer::audio::quantize_sample;
///
/// assert_eq!(quantize_sample(1.0), 32_767);
/// assert_eq!(quantize_sample(-1.0), -32_768);
/// assert_eq!(quantize_sample(0.0), 0);
/// assert_eq!(quantize_sample(-0.5), -16_384);
/// assert_eq!(quantize_sample(0.5), 16_383);
/// ```
#[inline]
pub fn quantize_sample(sample: f32) -> i16 {
    let s = f64::from(sample.clamp(-1.0, 1.0));
    if s < 0.0 {
        (s * 32_768.0) as i16
    } else {
        (s * 32_767.0) as i16
    }
}

/// Quantize and interleave planar audio into a stereo [`PcmBuffer`].
///
/// The result always holds `2 × frame_count` samples.
pub fn quantize(input: &ResampledAudio) -> PcmBuffer {
    let channels = input.channels();
    let (left, right) = match channels {
        [] => return PcmBuffer::default(),
        [mono] => (mono, mono),
        [left, right, ..] => (left, right),
    };

    let mut samples = Vec::with_capacity(left.len() * OUTPUT_CHANNELS as usize);
    for (&l, &r) in left.iter().zip(right.iter()) {
        samples.push(quantize_sample(l));
        samples.push(quantize_sample(r));
    }
    PcmBuffer { samples }
}

/// Quantize an interleaved capture buffer with `channels` channels.
///
/// Same channel rules as [`quantize`]; a trailing partial frame is dropped
/// and `channels == 0` yields an empty buffer.
pub fn quantize_interleaved(interleaved: &[f32], channels: u16) -> PcmBuffer {
    let n = channels as usize;
    if n == 0 {
        return PcmBuffer::default();
    }

    let mut samples = Vec::with_capacity(interleaved.len() / n * OUTPUT_CHANNELS as usize);
    for frame in interleaved.chunks_exact(n) {
        let left = frame[0];
        let right = if n > 1 { frame[1] } else { left };
        samples.push(quantize_sample(left));
        samples.push(quantize_sample(right));
    }
    PcmBuffer { samples }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
