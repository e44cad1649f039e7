//! Band-limited sample-rate conversion to the fixed output rate.
//!
//! [`resample`] converts every channel of a [`DecodedAudio`] to the target
//! rate with `rubato`'s windowed-sinc resampler and trims the filter delay so
//! the output is time-aligned with the input.  The output always holds
//! exactly `round(frames × target / source)` frames, which keeps the total
//! duration within half a sample period of the source.
//!
//! When the rates already match, the input is passed through untouched
//! (no interpolation round-trip).

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use thiserror::Error;

use crate::audio::DecodedAudio;

/// Input frames fed to the sinc resampler per `process` call.
const BLOCK_FRAMES: usize = 1_024;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A sample rate of zero was supplied on either side of the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid sample rate conversion {source_rate} Hz -> {target_rate} Hz (rates must be positive)")]
pub struct InvalidRateError {
    pub source_rate: u32,
    pub target_rate: u32,
}

/// Everything that can go wrong in [`resample`].
#[derive(Debug, Error)]
pub enum ResampleError {
    #[error(transparent)]
    InvalidRate(#[from] InvalidRateError),

    #[error("failed to construct resampler: {0}")]
    Construction(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Process(#[from] rubato::ResampleError),
}

// ---------------------------------------------------------------------------
// ResampledAudio
// ---------------------------------------------------------------------------

/// Planar audio at the configured target rate.
///
/// Same shape as [`DecodedAudio`]; only [`resample`] produces it, so holding
/// one means the rate has been normalised.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledAudio {
    sample_rate: u32,
    channels: Vec<Vec<f32>>,
}

impl ResampledAudio {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn frame_count(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    pub fn duration_secs(&self) -> f64 {
        self.frame_count() as f64 / self.sample_rate as f64
    }

    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }
}

// ---------------------------------------------------------------------------
// resample
// ---------------------------------------------------------------------------

/// Frame count after converting `frames` from `source_rate` to `target_rate`.
pub fn resampled_len(frames: usize, source_rate: u32, target_rate: u32) -> usize {
    (frames as f64 * target_rate as f64 / source_rate as f64).round() as usize
}

/// Convert `input` to `target_rate`, preserving channel count and duration.
///
/// # Errors
///
/// [`ResampleError::InvalidRate`] if either rate is zero; the remaining
/// variants surface `rubato` failures.
///
/// # Example
///
/// ```rust
/// use pcm_streamer::audio::{resample, DecodedAudio};
///
/// let mono = DecodedAudio::new(22_050, vec![vec![0.0_f32; 22_050]]).unwrap();
/// let out = resample(mono, 44_100).unwrap();
/// assert_eq!(out.sample_rate(), 44_100);
/// assert_eq!(out.frame_count(), 44_100);
/// ```
pub fn resample(input: DecodedAudio, target_rate: u32) -> Result<ResampledAudio, ResampleError> {
    let source_rate = input.sample_rate();
    if source_rate == 0 || target_rate == 0 {
        return Err(InvalidRateError {
            source_rate,
            target_rate,
        }
        .into());
    }

    if source_rate == target_rate {
        return Ok(ResampledAudio {
            sample_rate: target_rate,
            channels: input.into_channels(),
        });
    }

    let frames = input.frame_count();
    let channel_count = input.channel_count();
    let out_frames = resampled_len(frames, source_rate, target_rate);

    if frames == 0 {
        return Ok(ResampledAudio {
            sample_rate: target_rate,
            channels: vec![Vec::new(); channel_count],
        });
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };
    let mut resampler = SincFixedIn::<f32>::new(ratio, 1.1, params, BLOCK_FRAMES, channel_count)?;
    let delay = resampler.output_delay();

    let input = input.into_channels();
    let mut output: Vec<Vec<f32>> = vec![Vec::with_capacity(out_frames + delay); channel_count];

    let mut pos = 0;
    while pos + BLOCK_FRAMES <= frames {
        let block: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..pos + BLOCK_FRAMES]).collect();
        append(&mut output, resampler.process(&block, None)?);
        pos += BLOCK_FRAMES;
    }
    if pos < frames {
        let tail: Vec<&[f32]> = input.iter().map(|ch| &ch[pos..]).collect();
        append(&mut output, resampler.process_partial(Some(tail.as_slice()), None)?);
    }
    // Flush the filter until the delayed tail has come out.
    while output[0].len() < out_frames + delay {
        append(&mut output, resampler.process_partial::<&[f32]>(None, None)?);
    }

    for ch in &mut output {
        ch.drain(..delay);
        ch.truncate(out_frames);
    }

    log::debug!(
        "resample: {frames} frames @ {source_rate} Hz -> {out_frames} frames @ {target_rate} Hz"
    );

    Ok(ResampledAudio {
        sample_rate: target_rate,
        channels: output,
    })
}

fn append(output: &mut [Vec<f32>], block: Vec<Vec<f32>>) {
    for (out, ch) in output.iter_mut().zip(block) {
        out.extend_from_slice(&ch);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 / len as f32) * 2.0 - 1.0).collect()
    }

    #[test]
    fn same_rate_is_bit_identical() {
        let channels = vec![ramp(1_234), ramp(1_234).into_iter().rev().collect()];
        let input = DecodedAudio::new(44_100, channels.clone()).unwrap();

        let out = resample(input, 44_100).unwrap();
        assert_eq!(out.sample_rate(), 44_100);
        assert_eq!(out.channels(), channels.as_slice());
    }

    #[test]
    fn zero_rates_are_rejected() {
        let input = DecodedAudio::new(0, vec![vec![0.0; 10]]).unwrap();
        assert!(matches!(
            resample(input, 44_100),
            Err(ResampleError::InvalidRate(InvalidRateError {
                source_rate: 0,
                target_rate: 44_100
            }))
        ));

        let input = DecodedAudio::new(48_000, vec![vec![0.0; 10]]).unwrap();
        assert!(matches!(
            resample(input, 0),
            Err(ResampleError::InvalidRate(_))
        ));
    }

    #[test]
    fn upsample_22050_doubles_frames() {
        let input = DecodedAudio::new(22_050, vec![vec![0.0; 22_050]]).unwrap();
        let out = resample(input, 44_100).unwrap();
        assert_eq!(out.frame_count(), 44_100);
        assert!(out.channels()[0].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn frame_count_is_rounded_ratio() {
        for &(frames, from, to) in &[
            (48_000usize, 48_000u32, 44_100u32),
            (1_000, 8_000, 44_100),
            (777, 32_000, 44_100),
            (10, 96_000, 44_100),
        ] {
            let input = DecodedAudio::new(from, vec![vec![0.1; frames], vec![-0.1; frames]]).unwrap();
            let out = resample(input, to).unwrap();
            assert_eq!(out.frame_count(), resampled_len(frames, from, to));
            assert_eq!(out.channel_count(), 2);
            assert_eq!(out.channels()[0].len(), out.channels()[1].len());
        }
    }

    #[test]
    fn duration_is_preserved_within_one_sample() {
        for &(frames, from) in &[(12_345usize, 22_050u32), (4_410, 48_000), (3, 11_025)] {
            let input = DecodedAudio::new(from, vec![vec![0.0; frames]]).unwrap();
            let before = input.duration_secs();
            let out = resample(input, 44_100).unwrap();
            assert!((out.duration_secs() - before).abs() < 1.0 / 44_100.0);
        }
    }

    #[test]
    fn dc_level_survives_away_from_edges() {
        let input = DecodedAudio::new(48_000, vec![vec![0.5; 9_600]]).unwrap();
        let out = resample(input, 44_100).unwrap();
        let body = &out.channels()[0][500..out.frame_count() - 500];
        for &s in body {
            assert!((s - 0.5).abs() < 0.02, "amplitude drift: {s}");
        }
    }

    #[test]
    fn empty_input_stays_empty() {
        let input = DecodedAudio::new(22_050, vec![Vec::new(), Vec::new()]).unwrap();
        let out = resample(input, 44_100).unwrap();
        assert_eq!(out.frame_count(), 0);
        assert_eq!(out.channel_count(), 2);
    }
}
