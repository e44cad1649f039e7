//! Byte transports carrying the start/data/end streaming protocol.
//!
//! Two hops are supported:
//!
//! ```text
//! HttpTransport ── POST /api/audio/stream/{start,data,end} ──▶ control plane ──▶ device
//! TcpTransport  ── 0xA3 | 0xA4+payload | 0xA5 ─────────────────────────────────▶ device
//! ```
//!
//! Both implement [`Transport`]; the transmitter only sees the trait object.
//! One `send_chunk` call is one chunk on the wire: framing is delimited by the
//! call boundary, never by a header inside the payload.

pub mod http;
pub mod tcp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{TransportConfig, TransportKind};

pub use http::HttpTransport;
pub use tcp::TcpTransport;

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/// Errors raised while signalling or sending a stream.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP transport or connection error.
    #[error("request failed: {0}")]
    Request(String),

    /// The call did not complete within the configured timeout.
    #[error("transport call timed out")]
    Timeout,

    /// The receiver answered with a non-success HTTP status.
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: &'static str, status: u16 },

    /// The receiver answered but refused the command.
    #[error("receiver rejected the command: {0}")]
    Rejected(String),

    /// The receiver's reply could not be parsed.
    #[error("malformed reply: {0}")]
    Parse(#[from] serde_json::Error),

    /// Socket-level failure talking to the device.
    #[error("device I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Required connection details are missing from the configuration.
    #[error("transport not configured: {0}")]
    NotConfigured(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Transport trait
// ---------------------------------------------------------------------------

/// Sink for one streaming session at a time.
///
/// Implementors must be `Send + Sync` so they can be shared as
/// `Arc<dyn Transport>` between the CLI, the live streamer and the
/// transmitter.  Calls are made strictly in sequence by the transmitter; an
/// implementation never sees two overlapping calls from the same session.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Announce a new stream.
    async fn signal_stream_start(&self) -> Result<(), TransportError>;

    /// Deliver one chunk of little-endian stereo `i16` PCM.
    async fn send_chunk(&self, bytes: &[u8]) -> Result<(), TransportError>;

    /// Close the current stream.
    async fn signal_stream_end(&self) -> Result<(), TransportError>;

    /// Ask the receiver to stop whatever it is playing.
    async fn stop_playback(&self) -> Result<(), TransportError>;

    /// Short label for log lines.
    fn describe(&self) -> String;
}

/// Build the transport selected by `config.kind`.
///
/// # Errors
///
/// [`TransportError::NotConfigured`] when `kind = "tcp"` and no
/// `device_addr` is set.
pub fn build_transport(config: &TransportConfig) -> Result<Arc<dyn Transport>, TransportError> {
    let transport: Arc<dyn Transport> = match config.kind {
        TransportKind::Http => Arc::new(HttpTransport::from_config(config)),
        TransportKind::Tcp => Arc::new(TcpTransport::from_config(config)?),
    };
    log::info!("transport: using {}", transport.describe());
    Ok(transport)
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

/// One recorded call on a [`MockTransport`].
#[cfg(test)]
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Start,
    Chunk(Vec<u8>),
    End,
    Stop,
}

/// Recording transport for tests.
///
/// Fails on demand: the start signal, the `n`th chunk (0-based), or the end
/// signal.
#[cfg(test)]
#[derive(Default)]
pub struct MockTransport {
    pub(crate) calls: std::sync::Mutex<Vec<Call>>,
    pub fail_start: bool,
    pub fail_chunk: Option<usize>,
    pub fail_end: bool,
}

#[cfg(test)]
impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn chunks(&self) -> Vec<Vec<u8>> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Chunk(b) => Some(b),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Call) -> usize {
        self.calls().iter().filter(|c| *c == wanted).count()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for MockTransport {
    async fn signal_stream_start(&self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Start);
        if self.fail_start {
            return Err(TransportError::Rejected("device busy".into()));
        }
        Ok(())
    }

    async fn send_chunk(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.iter().filter(|c| matches!(c, Call::Chunk(_))).count();
        calls.push(Call::Chunk(bytes.to_vec()));
        if self.fail_chunk == Some(index) {
            return Err(TransportError::Status {
                endpoint: "stream/data",
                status: 500,
            });
        }
        Ok(())
    }

    async fn signal_stream_end(&self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::End);
        if self.fail_end {
            return Err(TransportError::Timeout);
        }
        Ok(())
    }

    async fn stop_playback(&self) -> Result<(), TransportError> {
        self.calls.lock().unwrap().push(Call::Stop);
        Ok(())
    }

    fn describe(&self) -> String {
        "mock".into()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_is_object_safe_and_shareable() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn Transport>();
        let _: Arc<dyn Transport> = Arc::new(MockTransport::new());
    }

    #[test]
    fn build_http_by_default() {
        let transport = build_transport(&TransportConfig::default()).unwrap();
        assert_eq!(transport.describe(), "http://localhost:8088");
    }

    #[test]
    fn build_tcp_requires_device_addr() {
        let config = TransportConfig {
            kind: TransportKind::Tcp,
            ..TransportConfig::default()
        };
        assert!(matches!(
            build_transport(&config),
            Err(TransportError::NotConfigured(_))
        ));
    }

    #[test]
    fn build_tcp_with_addr() {
        let config = TransportConfig {
            kind: TransportKind::Tcp,
            device_addr: Some("192.168.4.1".into()),
            ..TransportConfig::default()
        };
        let transport = build_transport(&config).unwrap();
        assert_eq!(transport.describe(), "tcp://192.168.4.1:8080");
    }

    #[test]
    fn error_messages() {
        let e = TransportError::Status {
            endpoint: "stream/data",
            status: 500,
        };
        assert_eq!(e.to_string(), "stream/data returned HTTP 500");
        assert_eq!(
            TransportError::Rejected("Not connected".into()).to_string(),
            "receiver rejected the command: Not connected"
        );
    }

    #[tokio::test]
    async fn mock_fails_on_requested_chunk() {
        let mock = MockTransport {
            fail_chunk: Some(1),
            ..MockTransport::default()
        };
        assert!(mock.send_chunk(&[1]).await.is_ok());
        assert!(mock.send_chunk(&[2]).await.is_err());
        assert_eq!(mock.chunks(), vec![vec![1], vec![2]]);
    }
}
