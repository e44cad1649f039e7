//! Live microphone capture.
//!
//! [`CaptureSource`] is the seam between the live pipeline and the audio
//! host: open a device at a given channel count and rate, deliver fixed-length
//! [`CaptureBuffer`]s to a callback, close.  [`CpalCaptureSource`] implements
//! it on top of `cpal`.
//!
//! [`LiveCapture`] wraps any source and adds the shutdown guarantee the
//! transmitter relies on: once [`LiveCapture::stop`] returns, the callback is
//! never invoked again, even if the host fires one more late buffer.

use std::sync::{Arc, Mutex, PoisonError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

// ---------------------------------------------------------------------------
// CaptureBuffer
// ---------------------------------------------------------------------------

/// One window of captured audio.
///
/// Samples are interleaved `f32` in the range `[-1.0, 1.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureBuffer {
    /// Interleaved samples, `frames × channels` long.
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl CaptureBuffer {
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }
}

/// Callback receiving each completed capture window.
pub type BufferCallback = Box<dyn FnMut(CaptureBuffer) + Send + 'static>;

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while setting up or running audio capture.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device not found: {0}")]
    DeviceNotFound(String),

    #[error("device does not support {channels} ch @ {sample_rate} Hz as f32 or i16")]
    UnsupportedConfig { channels: u16, sample_rate: u32 },

    #[error("capture source is not open")]
    NotOpen,

    #[error("capture is already running")]
    AlreadyRunning,

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query supported input configs: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),
}

// ---------------------------------------------------------------------------
// CaptureSource trait
// ---------------------------------------------------------------------------

/// A continuous capture device delivering fixed-cadence buffers.
///
/// Not required to be `Send`: `cpal::Stream` is thread-bound on some hosts.
pub trait CaptureSource {
    /// Acquire the device for `channels` × `sample_rate` capture.
    fn open(&mut self, channels: u16, sample_rate: u32) -> Result<(), CaptureError>;

    /// Start delivering buffers to `callback` on the host's audio thread.
    fn on_buffer(&mut self, callback: BufferCallback) -> Result<(), CaptureError>;

    /// Stop delivery and release the device.  Idempotent.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Windowing
// ---------------------------------------------------------------------------

/// Regroups arbitrarily sized host callbacks into fixed windows.
struct Windower {
    pending: Vec<f32>,
    window_samples: usize,
    sample_rate: u32,
    channels: u16,
}

impl Windower {
    fn new(sample_rate: u32, channels: u16, buffer_ms: u32) -> Self {
        let frames = (sample_rate as u64 * buffer_ms as u64 / 1_000).max(1) as usize;
        let window_samples = frames * channels as usize;
        Self {
            pending: Vec::with_capacity(window_samples * 2),
            window_samples,
            sample_rate,
            channels,
        }
    }

    fn push(&mut self, data: &[f32], emit: &mut dyn FnMut(CaptureBuffer)) {
        self.pending.extend_from_slice(data);
        while self.pending.len() >= self.window_samples {
            let samples: Vec<f32> = self.pending.drain(..self.window_samples).collect();
            emit(CaptureBuffer {
                samples,
                sample_rate: self.sample_rate,
                channels: self.channels,
            });
        }
    }
}

// ---------------------------------------------------------------------------
// CpalCaptureSource
// ---------------------------------------------------------------------------

/// Microphone capture built on top of `cpal`.
///
/// ```rust,no_run
/// use pcm_streamer::audio::{CaptureSource, CpalCaptureSource};
///
/// let mut source = CpalCaptureSource::new(None, 100);
/// source.open(2, 44_100).unwrap();
/// source
///     .on_buffer(Box::new(|buf| println!("{} frames", buf.frames())))
///     .unwrap();
/// // ...
/// source.close();
/// ```
pub struct CpalCaptureSource {
    device_name: Option<String>,
    buffer_ms: u32,
    opened: Option<OpenDevice>,
    stream: Option<cpal::Stream>,
}

struct OpenDevice {
    device: cpal::Device,
    config: cpal::StreamConfig,
    format: cpal::SampleFormat,
    channels: u16,
    sample_rate: u32,
}

impl CpalCaptureSource {
    /// `device_name == None` selects the system default input.
    pub fn new(device_name: Option<String>, buffer_ms: u32) -> Self {
        Self {
            device_name,
            buffer_ms,
            opened: None,
            stream: None,
        }
    }

    fn find_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.clone())),
        }
    }
}

impl CaptureSource for CpalCaptureSource {
    fn open(&mut self, channels: u16, sample_rate: u32) -> Result<(), CaptureError> {
        let device = self.find_device()?;
        let rate = cpal::SampleRate(sample_rate);

        let mut ranges: Vec<_> = device
            .supported_input_configs()?
            .filter(|r| {
                r.channels() == channels
                    && r.min_sample_rate() <= rate
                    && rate <= r.max_sample_rate()
                    && matches!(r.sample_format(), cpal::SampleFormat::F32 | cpal::SampleFormat::I16)
            })
            .collect();
        // Prefer native float input.
        ranges.sort_by_key(|r| r.sample_format() != cpal::SampleFormat::F32);

        let supported = ranges
            .into_iter()
            .next()
            .ok_or(CaptureError::UnsupportedConfig {
                channels,
                sample_rate,
            })?
            .with_sample_rate(rate);

        log::info!(
            "capture: opened {:?} ({} ch @ {} Hz, {:?})",
            device.name().unwrap_or_default(),
            channels,
            sample_rate,
            supported.sample_format()
        );

        self.opened = Some(OpenDevice {
            format: supported.sample_format(),
            config: supported.into(),
            device,
            channels,
            sample_rate,
        });
        Ok(())
    }

    fn on_buffer(&mut self, mut callback: BufferCallback) -> Result<(), CaptureError> {
        if self.stream.is_some() {
            return Err(CaptureError::AlreadyRunning);
        }
        let open = self.opened.as_ref().ok_or(CaptureError::NotOpen)?;
        let mut windower = Windower::new(open.sample_rate, open.channels, self.buffer_ms);
        let err_fn = |err: cpal::StreamError| log::error!("capture: cpal stream error: {err}");

        let stream = match open.format {
            cpal::SampleFormat::I16 => open.device.build_input_stream(
                &open.config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let floats: Vec<f32> = data.iter().map(|&s| s as f32 / 32_768.0).collect();
                    windower.push(&floats, &mut callback);
                },
                err_fn,
                None,
            )?,
            _ => open.device.build_input_stream(
                &open.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    windower.push(data, &mut callback);
                },
                err_fn,
                None,
            )?,
        };

        stream.play()?;
        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            log::info!("capture: stream closed");
        }
        self.opened = None;
    }
}

// ---------------------------------------------------------------------------
// LiveCapture
// ---------------------------------------------------------------------------

/// Start/stop wrapper around a [`CaptureSource`].
///
/// Callback invocations and [`stop`](Self::stop) are serialised through a
/// gate: `stop` waits for an in-flight callback to return, closes the gate,
/// and only then releases the device.
pub struct LiveCapture<S: CaptureSource> {
    source: S,
    channels: u16,
    sample_rate: u32,
    gate: Arc<Mutex<bool>>,
    running: bool,
}

impl<S: CaptureSource> LiveCapture<S> {
    pub fn new(source: S, channels: u16, sample_rate: u32) -> Self {
        Self {
            source,
            channels,
            sample_rate,
            gate: Arc::new(Mutex::new(false)),
            running: false,
        }
    }

    /// Open the source and start invoking `callback` for each buffer.
    ///
    /// Returns once capture has begun.
    pub fn start<F>(&mut self, mut callback: F) -> Result<(), CaptureError>
    where
        F: FnMut(CaptureBuffer) + Send + 'static,
    {
        if self.running {
            return Err(CaptureError::AlreadyRunning);
        }
        self.source.open(self.channels, self.sample_rate)?;

        let gate = Arc::new(Mutex::new(true));
        self.gate = Arc::clone(&gate);
        let gated: BufferCallback = Box::new(move |buffer| {
            let open = gate.lock().unwrap_or_else(PoisonError::into_inner);
            if *open {
                callback(buffer);
            }
        });

        if let Err(e) = self.source.on_buffer(gated) {
            *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
            self.source.close();
            return Err(e);
        }
        self.running = true;
        log::debug!("capture: started");
        Ok(())
    }

    /// Stop capture.  No callback runs after this returns.
    pub fn stop(&mut self) {
        *self.gate.lock().unwrap_or_else(PoisonError::into_inner) = false;
        if self.running {
            self.source.close();
            self.running = false;
            log::debug!("capture: stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn source(&self) -> &S {
        &self.source
    }
}

impl<S: CaptureSource> Drop for LiveCapture<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

// ---------------------------------------------------------------------------
// MockCaptureSource
// ---------------------------------------------------------------------------

/// Hand-driven capture source for tests.
///
/// `close` records the call but keeps the callback, so [`emit`](Self::emit)
/// can imitate a host that fires one more buffer after shutdown.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MockCaptureSource {
    inner: Arc<Mutex<MockState>>,
}

#[cfg(test)]
#[derive(Default)]
struct MockState {
    callback: Option<BufferCallback>,
    opened: Option<(u16, u32)>,
    closed: bool,
    fail_open: bool,
}

#[cfg(test)]
impl MockCaptureSource {
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.inner.lock().unwrap().fail_open = true;
        mock
    }

    /// Deliver a buffer to the registered callback, if any.
    pub fn emit(&self, buffer: CaptureBuffer) -> bool {
        let mut state = self.inner.lock().unwrap();
        match state.callback.as_mut() {
            Some(cb) => {
                cb(buffer);
                true
            }
            None => false,
        }
    }

    pub fn opened_with(&self) -> Option<(u16, u32)> {
        self.inner.lock().unwrap().opened
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }
}

#[cfg(test)]
impl CaptureSource for MockCaptureSource {
    fn open(&mut self, channels: u16, sample_rate: u32) -> Result<(), CaptureError> {
        let mut state = self.inner.lock().unwrap();
        if state.fail_open {
            return Err(CaptureError::NoDevice);
        }
        state.opened = Some((channels, sample_rate));
        state.closed = false;
        Ok(())
    }

    fn on_buffer(&mut self, callback: BufferCallback) -> Result<(), CaptureError> {
        self.inner.lock().unwrap().callback = Some(callback);
        Ok(())
    }

    fn close(&mut self) {
        self.inner.lock().unwrap().closed = true;
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn buffer(frames: usize) -> CaptureBuffer {
        CaptureBuffer {
            samples: vec![0.1; frames * 2],
            sample_rate: 44_100,
            channels: 2,
        }
    }

    #[test]
    fn capture_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<CaptureBuffer>();
    }

    #[test]
    fn capture_buffer_frames() {
        assert_eq!(buffer(4_410).frames(), 4_410);
        let empty = CaptureBuffer {
            samples: vec![0.0; 4],
            sample_rate: 44_100,
            channels: 0,
        };
        assert_eq!(empty.frames(), 0);
    }

    // ---- Windower ----------------------------------------------------------

    #[test]
    fn windower_emits_fixed_100ms_windows() {
        let mut windower = Windower::new(44_100, 2, 100);
        let mut out = Vec::new();

        // Host callbacks of 512 frames; 4410 frames per window.
        for _ in 0..20 {
            windower.push(&[0.0; 1_024], &mut |b| out.push(b));
        }

        // 20 * 512 = 10240 frames -> two full windows, remainder pending.
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|b| b.frames() == 4_410 && b.channels == 2));
        assert_eq!(windower.pending.len(), (10_240 - 8_820) * 2);
    }

    #[test]
    fn windower_keeps_sample_order() {
        let mut windower = Windower::new(1_000, 1, 3); // 3 frames per window
        let mut out = Vec::new();
        windower.push(&[1.0, 2.0], &mut |b| out.push(b));
        windower.push(&[3.0, 4.0, 5.0, 6.0, 7.0], &mut |b| out.push(b));

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].samples, vec![1.0, 2.0, 3.0]);
        assert_eq!(out[1].samples, vec![4.0, 5.0, 6.0]);
    }

    // ---- LiveCapture -------------------------------------------------------

    #[test]
    fn start_opens_with_requested_format() {
        let mock = MockCaptureSource::default();
        let mut capture = LiveCapture::new(mock.clone(), 2, 44_100);

        capture.start(|_| {}).unwrap();
        assert!(capture.is_running());
        assert_eq!(mock.opened_with(), Some((2, 44_100)));
    }

    #[test]
    fn callbacks_are_delivered_until_stop() {
        let mock = MockCaptureSource::default();
        let count = Arc::new(AtomicUsize::new(0));
        let mut capture = LiveCapture::new(mock.clone(), 2, 44_100);

        let c = Arc::clone(&count);
        capture
            .start(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        assert!(mock.emit(buffer(10)));
        assert!(mock.emit(buffer(10)));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        capture.stop();
        assert!(mock.is_closed());

        // A late host callback after stop() must not reach the user callback.
        mock.emit(buffer(10));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stop_waits_for_in_flight_callback() {
        let mock = MockCaptureSource::default();
        let finished = Arc::new(AtomicUsize::new(0));
        let mut capture = LiveCapture::new(mock.clone(), 2, 44_100);

        let f = Arc::clone(&finished);
        capture
            .start(move |_| {
                std::thread::sleep(std::time::Duration::from_millis(50));
                f.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let host = mock.clone();
        let audio_thread = std::thread::spawn(move || host.emit(buffer(10)));
        std::thread::sleep(std::time::Duration::from_millis(10));

        capture.stop();
        // Either the callback finished before stop() returned, or it never ran.
        let seen = finished.load(Ordering::SeqCst);
        audio_thread.join().unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), seen);
    }

    #[test]
    fn double_start_is_rejected() {
        let mut capture = LiveCapture::new(MockCaptureSource::default(), 1, 16_000);
        capture.start(|_| {}).unwrap();
        assert!(matches!(
            capture.start(|_| {}),
            Err(CaptureError::AlreadyRunning)
        ));
    }

    #[test]
    fn open_failure_propagates() {
        let mut capture = LiveCapture::new(MockCaptureSource::failing(), 2, 44_100);
        assert!(matches!(capture.start(|_| {}), Err(CaptureError::NoDevice)));
        assert!(!capture.is_running());
    }

    #[test]
    fn cpal_source_requires_open_before_on_buffer() {
        let mut source = CpalCaptureSource::new(None, 100);
        assert!(matches!(
            source.on_buffer(Box::new(|_| {})),
            Err(CaptureError::NotOpen)
        ));
    }
}
