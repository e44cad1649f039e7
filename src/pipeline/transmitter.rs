//! The streaming transmitter: start/data/end over a [`Transport`].
//!
//! One `Transmitter` owns one transport session at a time; exclusivity comes
//! from `&mut self` on every operation.  Chunks go out strictly in order with
//! one outstanding send, and a fixed pacing delay separates consecutive sends.
//! There is no receiver-side flow control: pacing is the only backpressure.
//!
//! Two ways to drive it:
//!
//! * [`Transmitter::stream`] sends a finite, known-length chunk sequence.
//! * [`begin`](Transmitter::begin) / [`push`](Transmitter::push) /
//!   [`finish`](Transmitter::finish) for live audio, where chunks arrive on
//!   their own cadence and the total is unknown.
//!
//! On any chunk failure the remaining chunks are abandoned and end-of-stream
//! is still attempted exactly once so the receiver does not hang.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;

use thiserror::Error;

use crate::config::StreamConfig;
use crate::pipeline::state::{
    new_shared_status, SharedStatus, StreamEvent, StreamSession, StreamState, StreamStatus,
};
use crate::transport::{Transport, TransportError};

/// Synchronous callback invoked on every [`StreamEvent`].
pub type Observer = Box<dyn Fn(&StreamEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Protocol step at which a stream failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransmitStage {
    Start,
    Chunk { index: usize },
    End,
}

impl fmt::Display for TransmitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransmitStage::Start => f.write_str("stream start"),
            TransmitStage::Chunk { index } => write!(f, "chunk {index}"),
            TransmitStage::End => f.write_str("stream end"),
        }
    }
}

/// A failed (but reportable) transmission.
#[derive(Debug, Error)]
pub enum TransmitError {
    /// The transport failed; carries how far the stream got.
    #[error("stream failed at {stage} after {chunks_sent} chunk(s): {source}")]
    Transport {
        stage: TransmitStage,
        chunks_sent: usize,
        total_chunks: Option<usize>,
        /// Whether the best-effort end-of-stream after a chunk failure was
        /// acknowledged.  Always `false` for `Start` and `End` failures.
        end_signalled: bool,
        #[source]
        source: TransportError,
    },

    /// The operation is not valid in the transmitter's current state.
    #[error("cannot {action} while the stream is {}", .state.label())]
    InvalidState {
        action: &'static str,
        state: StreamState,
    },
}

impl TransmitError {
    pub fn stage(&self) -> Option<TransmitStage> {
        match self {
            TransmitError::Transport { stage, .. } => Some(*stage),
            TransmitError::InvalidState { .. } => None,
        }
    }

    pub fn chunks_sent(&self) -> usize {
        match self {
            TransmitError::Transport { chunks_sent, .. } => *chunks_sent,
            TransmitError::InvalidState { .. } => 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Report / cancellation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// Every chunk was sent and end-of-stream acknowledged.
    Completed,
    /// Stopped early on request; end-of-stream was still acknowledged.
    Cancelled,
}

/// Summary of a stream that reached end-of-stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamReport {
    pub outcome: StreamOutcome,
    pub chunks_sent: usize,
    pub total_chunks: Option<usize>,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Cloneable flag that stops [`Transmitter::stream`] between two chunks.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Default observer: state changes at `debug`, milestones at `info`,
/// failures at `error`.
pub fn log_event(event: &StreamEvent) {
    match event {
        StreamEvent::StateChanged { from, to } => {
            log::debug!("transmit: {} -> {}", from.label(), to.label());
        }
        StreamEvent::Progress {
            chunks_sent,
            total_chunks,
            percent,
            milestone,
        } => match (milestone, total_chunks) {
            (true, Some(total)) => log::info!("progress: {percent}% ({chunks_sent}/{total})"),
            (true, None) => log::info!("progress: {chunks_sent} chunks sent"),
            (false, _) => log::trace!("transmit: chunk {chunks_sent} sent"),
        },
        StreamEvent::Cancelled { chunks_sent } => {
            log::info!("transmit: cancelled after {chunks_sent} chunks");
        }
        StreamEvent::Failed { message } => log::error!("transmit: {message}"),
    }
}

// ---------------------------------------------------------------------------
// Transmitter
// ---------------------------------------------------------------------------

/// Drives the start/data/end protocol over a shared [`Transport`].
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use pcm_streamer::audio::{chunk, PcmBuffer};
/// use pcm_streamer::config::{StreamConfig, TransportConfig};
/// use pcm_streamer::pipeline::Transmitter;
/// use pcm_streamer::transport::HttpTransport;
///
/// # async fn run() -> anyhow::Result<()> {
/// let transport = Arc::new(HttpTransport::from_config(&TransportConfig::default()));
/// let mut tx = Transmitter::new(transport, StreamConfig::default());
/// let chunks = chunk(PcmBuffer::from_samples(vec![0; 44_100 * 2]), 3_000)?;
/// let report = tx.stream(chunks).await?;
/// println!("{} chunks in {:?}", report.chunks_sent, report.elapsed);
/// # Ok(())
/// # }
/// ```
pub struct Transmitter {
    transport: Arc<dyn Transport>,
    config: StreamConfig,
    observer: Observer,
    status: SharedStatus,
    cancel: CancelHandle,
    state: StreamState,
    session: Option<StreamSession>,
}

impl Transmitter {
    pub fn new(transport: Arc<dyn Transport>, config: StreamConfig) -> Self {
        Self {
            transport,
            config,
            observer: Box::new(log_event),
            status: new_shared_status(),
            cancel: CancelHandle::default(),
            state: StreamState::Idle,
            session: None,
        }
    }

    /// Replace the default logging observer.
    pub fn with_observer<F>(mut self, observer: F) -> Self
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.observer = Box::new(observer);
        self
    }

    /// Mirror status into a caller-owned [`SharedStatus`].
    pub fn with_status(mut self, status: SharedStatus) -> Self {
        self.status = status;
        self
    }

    pub fn status(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn session(&self) -> Option<&StreamSession> {
        self.session.as_ref()
    }

    // ---- file mode ---------------------------------------------------------

    /// Send every chunk of `chunks` as one stream.
    ///
    /// # Errors
    ///
    /// [`TransmitError::Transport`] when start, any chunk, or end fails.  A
    /// refused start leaves the transmitter `Idle`; later failures leave it
    /// `Failed` until the next stream.
    pub async fn stream<I, B>(&mut self, chunks: I) -> Result<StreamReport, TransmitError>
    where
        I: IntoIterator<Item = B>,
        I::IntoIter: ExactSizeIterator,
        B: AsRef<[u8]>,
    {
        let chunks = chunks.into_iter();
        self.cancel.reset();
        self.open(Some(chunks.len())).await?;

        let pacing = self.config.pacing();
        let mut cancelled = false;
        for (index, chunk) in chunks.enumerate() {
            if index > 0 && !pacing.is_zero() {
                tokio::time::sleep(pacing).await;
            }
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.send_one(index, chunk.as_ref()).await?;
        }

        if cancelled {
            let chunks_sent = self.chunks_sent();
            (self.observer)(&StreamEvent::Cancelled { chunks_sent });
            self.close(StreamOutcome::Cancelled).await
        } else {
            self.close(StreamOutcome::Completed).await
        }
    }

    // ---- push mode ---------------------------------------------------------

    /// Open a stream of unknown length.
    pub async fn begin(&mut self) -> Result<(), TransmitError> {
        self.open(None).await
    }

    /// Send one chunk on the stream opened by [`begin`](Self::begin).
    ///
    /// No pacing is applied; the caller's cadence spaces the sends.
    pub async fn push(&mut self, bytes: &[u8]) -> Result<(), TransmitError> {
        self.expect_sending("push a chunk")?;
        let index = self.chunks_sent();
        self.send_one(index, bytes).await
    }

    /// Signal end-of-stream for a push-mode stream.
    pub async fn finish(&mut self) -> Result<StreamReport, TransmitError> {
        self.expect_sending("finish the stream")?;
        self.close(StreamOutcome::Completed).await
    }

    // ---- state machine -----------------------------------------------------

    async fn open(&mut self, total_chunks: Option<usize>) -> Result<(), TransmitError> {
        if self.state.is_busy() {
            return Err(TransmitError::InvalidState {
                action: "start a stream",
                state: self.state,
            });
        }

        self.session = Some(StreamSession::new(total_chunks));
        self.status_mut(|s| s.last_error = None);
        self.transition(StreamState::Starting);

        if let Err(source) = self.transport.signal_stream_start().await {
            // A refused start never opened a stream: back to Idle, no end.
            self.transition(StreamState::Idle);
            return Err(self.report_failure(TransmitStage::Start, false, source));
        }

        self.transition(StreamState::Sending);
        Ok(())
    }

    async fn send_one(&mut self, index: usize, bytes: &[u8]) -> Result<(), TransmitError> {
        if let Err(source) = self.transport.send_chunk(bytes).await {
            self.transition(StreamState::Failed);
            let end_signalled = match self.transport.signal_stream_end().await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("transmit: end-of-stream after failure also failed: {e}");
                    false
                }
            };
            return Err(self.report_failure(TransmitStage::Chunk { index }, end_signalled, source));
        }

        let every = self.config.progress_every.max(1);
        if let Some(session) = self.session.as_mut() {
            session.record_sent(bytes.len());
            let event = StreamEvent::Progress {
                chunks_sent: session.chunks_sent,
                total_chunks: session.total_chunks,
                percent: session.progress_percent,
                milestone: session.chunks_sent % every == 0
                    || Some(session.chunks_sent) == session.total_chunks,
            };
            (self.observer)(&event);
        }
        self.publish();
        Ok(())
    }

    async fn close(&mut self, outcome: StreamOutcome) -> Result<StreamReport, TransmitError> {
        self.transition(StreamState::Ending);

        if let Err(source) = self.transport.signal_stream_end().await {
            self.transition(StreamState::Failed);
            return Err(self.report_failure(TransmitStage::End, false, source));
        }

        let session = self
            .session
            .get_or_insert_with(|| StreamSession::new(None));
        if outcome == StreamOutcome::Completed {
            session.complete();
        }
        let report = StreamReport {
            outcome,
            chunks_sent: session.chunks_sent,
            total_chunks: session.total_chunks,
            bytes_sent: session.bytes_sent,
            elapsed: session.elapsed(),
        };

        self.transition(StreamState::Idle);
        Ok(report)
    }

    fn report_failure(
        &mut self,
        stage: TransmitStage,
        end_signalled: bool,
        source: TransportError,
    ) -> TransmitError {
        let (chunks_sent, total_chunks) = self
            .session
            .as_ref()
            .map_or((0, None), |s| (s.chunks_sent, s.total_chunks));

        let message = format!("{stage} failed after {chunks_sent} chunk(s): {source}");
        (self.observer)(&StreamEvent::Failed {
            message: message.clone(),
        });
        self.status_mut(|s| s.last_error = Some(message));

        TransmitError::Transport {
            stage,
            chunks_sent,
            total_chunks,
            end_signalled,
            source,
        }
    }

    fn expect_sending(&self, action: &'static str) -> Result<(), TransmitError> {
        if self.state == StreamState::Sending {
            Ok(())
        } else {
            Err(TransmitError::InvalidState {
                action,
                state: self.state,
            })
        }
    }

    fn chunks_sent(&self) -> usize {
        self.session.as_ref().map_or(0, |s| s.chunks_sent)
    }

    fn transition(&mut self, to: StreamState) {
        let from = std::mem::replace(&mut self.state, to);
        if from != to {
            (self.observer)(&StreamEvent::StateChanged { from, to });
        }
        self.publish();
    }

    fn publish(&self) {
        let (state, session) = (self.state, self.session);
        self.status_mut(|s| {
            s.state = state;
            s.session = session;
        });
    }

    fn status_mut(&self, f: impl FnOnce(&mut StreamStatus)) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut status);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Call, MockTransport};
    use std::sync::Mutex;
    use std::time::Instant;

    fn no_pacing() -> StreamConfig {
        StreamConfig {
            pacing_ms: 0,
            progress_every: 10,
        }
    }

    fn chunks(n: usize) -> Vec<Vec<u8>> {
        (0..n).map(|i| vec![i as u8; 4]).collect()
    }

    fn recorder() -> (Arc<Mutex<Vec<StreamEvent>>>, impl Fn(&StreamEvent) + Send + Sync) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        (events, move |e: &StreamEvent| sink.lock().unwrap().push(e.clone()))
    }

    fn percents(events: &[StreamEvent]) -> Vec<u8> {
        events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect()
    }

    // ---- successful stream ---

    #[tokio::test]
    async fn sends_start_chunks_end_in_order() {
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        let report = tx.stream(chunks(3)).await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                Call::Start,
                Call::Chunk(vec![0; 4]),
                Call::Chunk(vec![1; 4]),
                Call::Chunk(vec![2; 4]),
                Call::End,
            ]
        );
        assert_eq!(report.outcome, StreamOutcome::Completed);
        assert_eq!(report.chunks_sent, 3);
        assert_eq!(report.total_chunks, Some(3));
        assert_eq!(report.bytes_sent, 12);
        assert_eq!(tx.state(), StreamState::Idle);
        assert_eq!(tx.session().unwrap().progress_percent, 100);
    }

    #[tokio::test]
    async fn progress_is_monotonic_and_ends_at_100() {
        let mock = Arc::new(MockTransport::new());
        let (events, observer) = recorder();
        let mut tx = Transmitter::new(mock, no_pacing()).with_observer(observer);

        tx.stream(chunks(59)).await.unwrap();

        let p = percents(&events.lock().unwrap());
        assert_eq!(p.len(), 59);
        assert!(p.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(p.last(), Some(&100));
    }

    #[tokio::test]
    async fn milestones_every_tenth_chunk_and_last() {
        let mock = Arc::new(MockTransport::new());
        let (events, observer) = recorder();
        let mut tx = Transmitter::new(mock, no_pacing()).with_observer(observer);

        tx.stream(chunks(25)).await.unwrap();

        let milestones: Vec<usize> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::Progress {
                    chunks_sent,
                    milestone: true,
                    ..
                } => Some(*chunks_sent),
                _ => None,
            })
            .collect();
        assert_eq!(milestones, vec![10, 20, 25]);
    }

    #[tokio::test]
    async fn state_transitions_are_reported() {
        let mock = Arc::new(MockTransport::new());
        let (events, observer) = recorder();
        let mut tx = Transmitter::new(mock, no_pacing()).with_observer(observer);

        tx.stream(chunks(1)).await.unwrap();

        let states: Vec<StreamState> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                StreamEvent::StateChanged { to, .. } => Some(*to),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                StreamState::Starting,
                StreamState::Sending,
                StreamState::Ending,
                StreamState::Idle
            ]
        );
    }

    #[tokio::test]
    async fn pacing_separates_consecutive_sends() {
        let mock = Arc::new(MockTransport::new());
        let config = StreamConfig {
            pacing_ms: 15,
            progress_every: 10,
        };
        let mut tx = Transmitter::new(mock, config);

        let started = Instant::now();
        tx.stream(chunks(5)).await.unwrap();
        // Four gaps between five chunks; none after the last.
        assert!(started.elapsed() >= Duration::from_millis(60));
    }

    #[tokio::test]
    async fn status_is_mirrored() {
        let mock = Arc::new(MockTransport::new());
        let status = new_shared_status();
        let mut tx = Transmitter::new(mock, no_pacing()).with_status(Arc::clone(&status));

        tx.stream(chunks(4)).await.unwrap();

        let status = status.lock().unwrap();
        assert_eq!(status.state, StreamState::Idle);
        assert_eq!(status.session.unwrap().chunks_sent, 4);
        assert!(status.last_error.is_none());
    }

    // ---- failures ---

    #[tokio::test]
    async fn chunk_failure_stops_sending_and_still_ends_once() {
        let mock = Arc::new(MockTransport {
            fail_chunk: Some(2),
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        let err = tx.stream(chunks(6)).await.unwrap_err();

        // Chunks 0, 1 succeed; 2 fails; 3.. are never attempted.
        assert_eq!(mock.chunks().len(), 3);
        assert_eq!(mock.count(&Call::End), 1);
        assert_eq!(mock.calls().last(), Some(&Call::End));
        assert!(matches!(
            err,
            TransmitError::Transport {
                stage: TransmitStage::Chunk { index: 2 },
                chunks_sent: 2,
                total_chunks: Some(6),
                end_signalled: true,
                ..
            }
        ));
        assert_eq!(tx.state(), StreamState::Failed);
        assert!(tx.status().lock().unwrap().last_error.is_some());
    }

    #[tokio::test]
    async fn failed_end_after_chunk_failure_is_not_retried() {
        let mock = Arc::new(MockTransport {
            fail_chunk: Some(0),
            fail_end: true,
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        let err = tx.stream(chunks(3)).await.unwrap_err();
        assert_eq!(mock.count(&Call::End), 1);
        assert!(matches!(
            err,
            TransmitError::Transport {
                end_signalled: false,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn refused_start_returns_to_idle_without_end() {
        let mock = Arc::new(MockTransport {
            fail_start: true,
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        let err = tx.stream(chunks(3)).await.unwrap_err();

        assert_eq!(mock.calls(), vec![Call::Start]);
        assert_eq!(err.stage(), Some(TransmitStage::Start));
        assert_eq!(tx.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn end_failure_marks_stream_failed() {
        let mock = Arc::new(MockTransport {
            fail_end: true,
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        let err = tx.stream(chunks(2)).await.unwrap_err();
        assert_eq!(err.stage(), Some(TransmitStage::End));
        assert_eq!(err.chunks_sent(), 2);
        assert_eq!(mock.count(&Call::End), 1);
        assert_eq!(tx.state(), StreamState::Failed);
    }

    #[tokio::test]
    async fn failed_transmitter_accepts_a_new_stream() {
        let mock = Arc::new(MockTransport {
            fail_chunk: Some(0),
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());
        assert!(tx.stream(chunks(1)).await.is_err());

        // The mock only fails its first chunk overall.
        let report = tx.stream(chunks(2)).await.unwrap();
        assert_eq!(report.chunks_sent, 2);
        assert!(tx.status().lock().unwrap().last_error.is_none());
    }

    // ---- cancellation ---

    #[tokio::test]
    async fn cancel_between_chunks_still_signals_end() {
        let mock = Arc::new(MockTransport::new());
        let tx = Transmitter::new(mock.clone(), no_pacing());
        let cancel = tx.cancel_handle();
        let mut tx = tx.with_observer(move |e| {
            if let StreamEvent::Progress { chunks_sent: 3, .. } = e {
                cancel.cancel();
            }
        });

        let report = tx.stream(chunks(10)).await.unwrap();

        assert_eq!(report.outcome, StreamOutcome::Cancelled);
        assert_eq!(report.chunks_sent, 3);
        assert_eq!(mock.chunks().len(), 3);
        assert_eq!(mock.count(&Call::End), 1);
        assert_eq!(tx.state(), StreamState::Idle);
        assert!(tx.session().unwrap().progress_percent < 100);
    }

    #[tokio::test]
    async fn cancel_flag_is_reset_per_stream() {
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), no_pacing());
        tx.cancel_handle().cancel();

        let report = tx.stream(chunks(2)).await.unwrap();
        assert_eq!(report.outcome, StreamOutcome::Completed);
    }

    // ---- push mode ---

    #[tokio::test]
    async fn push_mode_round_trip() {
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        tx.begin().await.unwrap();
        assert_eq!(tx.state(), StreamState::Sending);
        tx.push(&[1, 2]).await.unwrap();
        tx.push(&[3, 4]).await.unwrap();
        let report = tx.finish().await.unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                Call::Start,
                Call::Chunk(vec![1, 2]),
                Call::Chunk(vec![3, 4]),
                Call::End
            ]
        );
        assert_eq!(report.total_chunks, None);
        assert_eq!(report.chunks_sent, 2);
        assert_eq!(tx.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn push_without_begin_is_invalid() {
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        assert!(matches!(
            tx.push(&[0, 0]).await,
            Err(TransmitError::InvalidState {
                state: StreamState::Idle,
                ..
            })
        ));
        assert!(tx.finish().await.is_err());
        assert!(mock.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_push_ends_stream_once() {
        let mock = Arc::new(MockTransport {
            fail_chunk: Some(1),
            ..MockTransport::default()
        });
        let mut tx = Transmitter::new(mock.clone(), no_pacing());

        tx.begin().await.unwrap();
        tx.push(&[0, 0]).await.unwrap();
        let err = tx.push(&[1, 1]).await.unwrap_err();

        assert_eq!(err.stage(), Some(TransmitStage::Chunk { index: 1 }));
        assert_eq!(mock.count(&Call::End), 1);
        assert_eq!(tx.state(), StreamState::Failed);
        assert!(tx.push(&[2, 2]).await.is_err());
        assert_eq!(mock.chunks().len(), 2);
    }

    #[tokio::test]
    async fn begin_while_sending_is_invalid() {
        let mock = Arc::new(MockTransport::new());
        let mut tx = Transmitter::new(mock.clone(), no_pacing());
        tx.begin().await.unwrap();

        assert!(matches!(
            tx.begin().await,
            Err(TransmitError::InvalidState { .. })
        ));
        assert_eq!(mock.count(&Call::Start), 1);
    }

    #[test]
    fn error_display_names_stage() {
        let err = TransmitError::Transport {
            stage: TransmitStage::Chunk { index: 7 },
            chunks_sent: 7,
            total_chunks: Some(59),
            end_signalled: true,
            source: TransportError::Timeout,
        };
        assert_eq!(
            err.to_string(),
            "stream failed at chunk 7 after 7 chunk(s): transport call timed out"
        );
    }
}
