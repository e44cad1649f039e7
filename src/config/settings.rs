//! Streamer settings structs, defaults and TOML persistence.
//!
//! All structs implement `Serialize`, `Deserialize`, `Default` and `Clone`
//! so they can be round-tripped through TOML files and shared across threads.
//! Every section is `#[serde(default)]`, so a partial `settings.toml` only
//! overrides the keys it names.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use super::AppPaths;
use crate::audio::InvalidRateError;

/// Number of interleaved channels on the wire.  Mono sources are duplicated
/// to stereo; the receiver only understands this layout.
pub const OUTPUT_CHANNELS: u16 = 2;

/// Default device TCP port used when `device_addr` has no explicit port.
pub const DEFAULT_DEVICE_PORT: u16 = 8080;

// ---------------------------------------------------------------------------
// AudioConfig
// ---------------------------------------------------------------------------

/// Output format of the normalization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate every source is resampled to, in Hz.
    pub target_sample_rate: u32,
    /// Maximum size of one transmission unit in bytes.  Must be even.
    pub chunk_size_bytes: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 44_100,
            chunk_size_bytes: 3_000,
        }
    }
}

// ---------------------------------------------------------------------------
// StreamConfig
// ---------------------------------------------------------------------------

/// Pacing and progress-reporting knobs for the transmitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Minimum delay between two consecutive chunk sends, in milliseconds.
    pub pacing_ms: u64,
    /// A progress milestone is reported every `progress_every` chunks.
    pub progress_every: usize,
}

impl StreamConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 10,
            progress_every: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportConfig
// ---------------------------------------------------------------------------

/// Which wire the transmitter talks over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// HTTP control-plane service that relays to the device.
    Http,
    /// Direct TCP connection to the device's command port.
    Tcp,
}

impl Default for TransportKind {
    fn default() -> Self {
        Self::Http
    }
}

/// Connection settings for the selected transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub kind: TransportKind,
    /// Base URL of the control-plane service (HTTP transport).
    pub base_url: String,
    /// `host[:port]` of the device (TCP transport).
    pub device_addr: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            base_url: "http://localhost:8088".into(),
            device_addr: None,
            timeout_secs: 5,
        }
    }
}

// ---------------------------------------------------------------------------
// CaptureConfig
// ---------------------------------------------------------------------------

/// Live microphone capture settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Input device name; `None` means the system default.
    pub device: Option<String>,
    /// Channels requested from the device (1 or 2).
    pub channels: u16,
    /// Length of one delivered capture buffer in milliseconds.
    pub buffer_ms: u32,
    /// Buffers allowed to wait for the transmitter before new ones are dropped.
    pub queue_depth: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: None,
            channels: 2,
            buffer_ms: 100,
            queue_depth: 32,
        }
    }
}

// ---------------------------------------------------------------------------
// AppConfig  (top-level)
// ---------------------------------------------------------------------------

/// Top-level configuration, serialised as `settings.toml`.
///
/// ```rust,no_run
/// use pcm_streamer::config::AppConfig;
///
/// // Load (returns Default when file is missing)
/// let config = AppConfig::load().unwrap();
/// config.validate().unwrap();
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub audio: AudioConfig,
    pub stream: StreamConfig,
    pub transport: TransportConfig,
    pub capture: CaptureConfig,
}

impl AppConfig {
    /// Load configuration from the platform-appropriate `settings.toml`.
    ///
    /// Returns `Ok(AppConfig::default())` when the file does not exist yet.
    pub fn load() -> Result<Self> {
        Self::load_from(&AppPaths::new().settings_file)
    }

    /// Load from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the platform-appropriate `settings.toml`,
    /// creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&AppPaths::new().settings_file)
    }

    /// Save to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.audio.target_sample_rate == 0 {
            return Err(InvalidRateError {
                source_rate: self.audio.target_sample_rate,
                target_rate: self.audio.target_sample_rate,
            }
            .into());
        }
        if self.audio.chunk_size_bytes < 2 || self.audio.chunk_size_bytes % 2 != 0 {
            bail!(
                "chunk_size_bytes must be a positive even number, got {}",
                self.audio.chunk_size_bytes
            );
        }
        if self.stream.progress_every == 0 {
            bail!("progress_every must be at least 1");
        }
        if self.capture.buffer_ms == 0 {
            bail!("capture buffer_ms must be at least 1");
        }
        if !(1..=2).contains(&self.capture.channels) {
            bail!("capture channels must be 1 or 2, got {}", self.capture.channels);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
