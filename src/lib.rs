//! PCM streaming pipeline.
//!
//! Decodes audio files (or captures the microphone), normalises them to
//! 44.1 kHz interleaved stereo `i16`, and streams the PCM in fixed-size,
//! paced chunks to an embedded audio sink using a start/data/end protocol.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod transport;
