//! Stream state machine and shared status.
//!
//! [`StreamState`] drives the transmitter.  Callers read it via
//! [`SharedStatus`] to render progress without waiting on the stream future.
//!
//! [`SharedStatus`] is a type alias for `Arc<Mutex<StreamStatus>>`, cheap to
//! clone and safe to share across threads.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

// ---------------------------------------------------------------------------
// StreamState
// ---------------------------------------------------------------------------

/// States of one transmission.
///
/// ```text
/// Idle ──start──▶ Starting ──ack──▶ Sending ──last chunk──▶ Ending ──ack──▶ Idle
///                    │                 │                       │
///                    └─refused─▶ Idle  └─chunk error─▶ Failed  └─error─▶ Failed
/// Failed ──next start──▶ Starting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamState {
    /// No stream is open.
    #[default]
    Idle,

    /// Start-of-stream has been signalled; waiting for the acknowledgement.
    Starting,

    /// Chunks are being sent one at a time.
    Sending,

    /// End-of-stream has been signalled.
    Ending,

    /// The last stream aborted.  Cleared by the next start.
    Failed,
}

impl StreamState {
    /// Returns `true` while a stream holds the transport.
    ///
    /// ```
    /// use pcm_streamer::pipeline::StreamState;
    ///
    /// assert!(!StreamState::Idle.is_busy());
    /// assert!(StreamState::Starting.is_busy());
    /// assert!(StreamState::Sending.is_busy());
    /// assert!(StreamState::Ending.is_busy());
    /// assert!(!StreamState::Failed.is_busy());
    /// ```
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            StreamState::Starting | StreamState::Sending | StreamState::Ending
        )
    }

    pub fn label(&self) -> &'static str {
        match self {
            StreamState::Idle => "Idle",
            StreamState::Starting => "Starting",
            StreamState::Sending => "Sending",
            StreamState::Ending => "Ending",
            StreamState::Failed => "Failed",
        }
    }
}

// ---------------------------------------------------------------------------
// StreamSession
// ---------------------------------------------------------------------------

/// Progress of one transmission.
///
/// `total_chunks` is `None` in push mode, where the stream length is not known
/// up front; progress then stays at 0 until the stream completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSession {
    pub total_chunks: Option<usize>,
    pub chunks_sent: usize,
    pub bytes_sent: u64,
    /// 0–100, never decreases.
    pub progress_percent: u8,
    pub started_at: Instant,
}

impl StreamSession {
    pub fn new(total_chunks: Option<usize>) -> Self {
        Self {
            total_chunks,
            chunks_sent: 0,
            bytes_sent: 0,
            progress_percent: 0,
            started_at: Instant::now(),
        }
    }

    /// Account for one successfully sent chunk of `bytes` bytes.
    pub fn record_sent(&mut self, bytes: usize) {
        self.chunks_sent += 1;
        self.bytes_sent += bytes as u64;
        if let Some(total) = self.total_chunks.filter(|&t| t > 0) {
            let percent = (self.chunks_sent as f64 / total as f64 * 100.0).round();
            let percent = percent.min(100.0) as u8;
            self.progress_percent = self.progress_percent.max(percent);
        }
    }

    /// Force progress to 100 on normal completion.
    pub fn complete(&mut self) {
        self.progress_percent = 100;
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

// ---------------------------------------------------------------------------
// StreamEvent
// ---------------------------------------------------------------------------

/// Notifications delivered synchronously to the transmitter's observer.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    StateChanged {
        from: StreamState,
        to: StreamState,
    },

    /// Emitted after every successfully sent chunk.  `milestone` marks every
    /// `progress_every`-th chunk for coarse reporting.
    Progress {
        chunks_sent: usize,
        total_chunks: Option<usize>,
        percent: u8,
        milestone: bool,
    },

    /// Cancellation was observed between chunks.
    Cancelled { chunks_sent: usize },

    Failed { message: String },
}

// ---------------------------------------------------------------------------
// StreamStatus / SharedStatus
// ---------------------------------------------------------------------------

/// Snapshot of the transmitter for pollers.
#[derive(Debug, Clone, Default)]
pub struct StreamStatus {
    pub state: StreamState,

    /// Latest session, kept after the stream ends so the final numbers can be
    /// read.  `None` before the first stream.
    pub session: Option<StreamSession>,

    /// Display text of the most recent failure.  Cleared on the next start.
    pub last_error: Option<String>,
}

/// Thread-safe handle to [`StreamStatus`].
///
/// Lock for a short critical section; do **not** hold the lock across
/// `.await` points.
pub type SharedStatus = Arc<Mutex<StreamStatus>>;

pub fn new_shared_status() -> SharedStatus {
    Arc::new(Mutex::new(StreamStatus::default()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
