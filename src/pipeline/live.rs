//! Live microphone streaming.
//!
//! ```text
//! audio thread                      tokio worker
//! ────────────                      ────────────
//! LiveCapture callback              loop {
//!   → quantize_interleaved            recv PcmBuffer
//!   → try_send(PcmBuffer) ──mpsc──▶   Transmitter::push
//!     (full: drop newest)           }
//!                                   Transmitter::finish
//! ```
//!
//! The audio thread never blocks: when the bounded queue is full the newest
//! buffer is dropped and counted.  [`LiveStreamer::stop`] stops capture first
//! (no callback after it returns), then tells the worker to finish: buffers
//! still queued are discarded, a send already in flight completes, and
//! end-of-stream is signalled once.
//!
//! A failed push ends the worker on its own.  [`LiveStreamer::finished`]
//! resolves at that point and stops capture; the failure is then returned by
//! the next [`LiveStreamer::stop`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Notify;
use tokio::task::{JoinError, JoinHandle};

use crate::audio::{quantize_interleaved, CaptureError, CaptureSource, LiveCapture, PcmBuffer};
use crate::pipeline::transmitter::{StreamReport, TransmitError, Transmitter};

#[derive(Debug, Error)]
pub enum LiveError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error("live stream is not running")]
    NotRunning,

    #[error("live stream is already running")]
    AlreadyRunning,

    #[error("live stream worker crashed: {0}")]
    Worker(String),
}

type WorkerResult = (Transmitter, Result<StreamReport, TransmitError>);

/// Capture → quantize → push-mode transmit.
pub struct LiveStreamer<S: CaptureSource> {
    capture: LiveCapture<S>,
    transmitter: Option<Transmitter>,
    queue_depth: usize,
    dropped: Arc<AtomicUsize>,
    stop: Arc<Notify>,
    worker: Option<JoinHandle<WorkerResult>>,
    /// Result of a worker that ended without being asked to.
    ended: Option<Result<StreamReport, LiveError>>,
}

impl<S: CaptureSource> LiveStreamer<S> {
    pub fn new(capture: LiveCapture<S>, transmitter: Transmitter, queue_depth: usize) -> Self {
        Self {
            capture,
            transmitter: Some(transmitter),
            queue_depth: queue_depth.max(1),
            dropped: Arc::new(AtomicUsize::new(0)),
            stop: Arc::new(Notify::new()),
            worker: None,
            ended: None,
        }
    }

    /// Open the stream on the transport, then start capturing.
    ///
    /// If capture fails to start, the already-opened stream is ended before
    /// the error is returned.
    pub async fn start(&mut self) -> Result<(), LiveError> {
        if self.worker.is_some() {
            return Err(LiveError::AlreadyRunning);
        }
        if let Some(Err(e)) = self.ended.take() {
            log::warn!("live: previous session failed unreported: {e}");
        }
        let mut transmitter = self.transmitter.take().ok_or(LiveError::AlreadyRunning)?;

        if let Err(e) = transmitter.begin().await {
            self.transmitter = Some(transmitter);
            return Err(e.into());
        }

        let (tx, rx) = mpsc::channel::<PcmBuffer>(self.queue_depth);
        let dropped = Arc::clone(&self.dropped);
        dropped.store(0, Ordering::SeqCst);

        let started = self.capture.start(move |buffer| {
            let pcm = quantize_interleaved(&buffer.samples, buffer.channels);
            if pcm.is_empty() {
                return;
            }
            match tx.try_send(pcm) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    let n = dropped.fetch_add(1, Ordering::SeqCst) + 1;
                    log::warn!("live: send queue full, dropped newest buffer ({n} so far)");
                }
                Err(TrySendError::Closed(_)) => {
                    log::debug!("live: worker gone, discarding buffer");
                }
            }
        });

        if let Err(e) = started {
            if let Err(end) = transmitter.finish().await {
                log::warn!("live: could not end stream after capture failure: {end}");
            }
            self.transmitter = Some(transmitter);
            return Err(e.into());
        }

        self.stop = Arc::new(Notify::new());
        let stop = Arc::clone(&self.stop);
        self.worker = Some(tokio::spawn(run_worker(transmitter, rx, stop)));
        log::info!("live: streaming started");
        Ok(())
    }

    /// Stop capture and end the stream.
    ///
    /// # Errors
    ///
    /// [`LiveError::Transmit`] if a push failed while running or the final
    /// end-of-stream failed.
    pub async fn stop(&mut self) -> Result<StreamReport, LiveError> {
        if let Some(ended) = self.ended.take() {
            return ended;
        }
        let worker = self.worker.take().ok_or(LiveError::NotRunning)?;

        self.capture.stop();
        self.stop.notify_one();

        let joined = worker.await;
        self.collect(joined)
    }

    /// Resolves when the worker ends without [`stop`](Self::stop), which
    /// happens when a push fails.  Capture is stopped before this returns.
    ///
    /// Returns immediately when not running.  Cancel safe.
    pub async fn finished(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        let joined = worker.await;
        self.worker = None;
        self.capture.stop();

        let ended = self.collect(joined);
        if let Err(e) = &ended {
            log::error!("live: session ended early: {e}");
        }
        self.ended = Some(ended);
    }

    fn collect(
        &mut self,
        joined: Result<WorkerResult, JoinError>,
    ) -> Result<StreamReport, LiveError> {
        let (transmitter, result) = joined.map_err(|e| LiveError::Worker(e.to_string()))?;
        self.transmitter = Some(transmitter);

        let dropped = self.dropped.load(Ordering::SeqCst);
        if dropped > 0 {
            log::warn!("live: {dropped} buffer(s) dropped on a full queue");
        }
        let report = result?;
        log::info!(
            "live: streaming stopped after {} buffers ({} bytes)",
            report.chunks_sent,
            report.bytes_sent
        );
        Ok(report)
    }

    /// `false` once the worker has ended, even before [`finished`](Self::finished)
    /// or [`stop`](Self::stop) has collected it.
    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    /// Buffers dropped on a full queue since the last start.
    pub fn dropped_buffers(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

async fn run_worker(
    mut transmitter: Transmitter,
    mut rx: mpsc::Receiver<PcmBuffer>,
    stop: Arc<Notify>,
) -> WorkerResult {
    loop {
        tokio::select! {
            biased;

            _ = stop.notified() => break,

            next = rx.recv() => match next {
                Some(pcm) => {
                    if let Err(e) = transmitter.push(&pcm.to_bytes()).await {
                        // push already attempted end-of-stream.
                        return (transmitter, Err(e));
                    }
                }
                None => break,
            },
        }
    }

    let discarded = {
        rx.close();
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    };
    if discarded > 0 {
        log::debug!("live: discarded {discarded} queued buffer(s) after stop");
    }

    let result = transmitter.finish().await;
    (transmitter, result)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
