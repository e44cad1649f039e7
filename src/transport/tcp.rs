//! `TcpTransport`: talk to the device's command port directly.
//!
//! Every protocol step is one command byte, optionally followed by payload,
//! written with a single `write_all`:
//!
//! | Step         | Bytes on the wire   |
//! |--------------|---------------------|
//! | stream start | `A3`                |
//! | stream data  | `A4` + PCM payload  |
//! | stream end   | `A5`                |
//! | stop         | `A0`                |

use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::config::{TransportConfig, DEFAULT_DEVICE_PORT};
use crate::transport::{Transport, TransportError};

pub const CMD_STOP_AUDIO: u8 = 0xA0;
pub const CMD_STREAM_START: u8 = 0xA3;
pub const CMD_STREAM_DATA: u8 = 0xA4;
pub const CMD_STREAM_END: u8 = 0xA5;

/// Lazily connected command socket to the device.
pub struct TcpTransport {
    addr: String,
    timeout: Duration,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpTransport {
    /// `addr` is `host` or `host:port`; the device port defaults to 8080.
    pub fn new(addr: &str, timeout: Duration) -> Self {
        Self {
            addr: with_default_port(addr),
            timeout,
            stream: Mutex::new(None),
        }
    }

    /// # Errors
    ///
    /// [`TransportError::NotConfigured`] when `device_addr` is unset.
    pub fn from_config(config: &TransportConfig) -> Result<Self, TransportError> {
        let addr = config
            .device_addr
            .as_deref()
            .filter(|a| !a.trim().is_empty())
            .ok_or_else(|| TransportError::NotConfigured("transport.device_addr is not set".into()))?;
        Ok(Self::new(addr.trim(), config.timeout()))
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    async fn send_command(&self, command: u8, payload: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;

        if guard.is_none() {
            let stream = tokio::time::timeout(self.timeout, TcpStream::connect(&self.addr))
                .await
                .map_err(|_| TransportError::Timeout)??;
            stream.set_nodelay(true)?;
            log::info!("tcp: connected to {}", self.addr);
            *guard = Some(stream);
        }

        let mut frame = Vec::with_capacity(payload.len() + 1);
        frame.push(command);
        frame.extend_from_slice(payload);

        let result = match guard.as_mut() {
            Some(stream) => tokio::time::timeout(self.timeout, stream.write_all(&frame))
                .await
                .map_err(|_| TransportError::Timeout)
                .and_then(|r| r.map_err(TransportError::from)),
            None => Err(TransportError::NotConfigured("no device connection".into())),
        };

        if let Err(e) = &result {
            log::warn!("tcp: command {command:#04X} failed, dropping connection: {e}");
            *guard = None;
        }
        result
    }
}

fn with_default_port(addr: &str) -> String {
    match addr.rsplit_once(':') {
        Some((_, port)) if port.parse::<u16>().is_ok() => addr.to_string(),
        _ => format!("{addr}:{DEFAULT_DEVICE_PORT}"),
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn signal_stream_start(&self) -> Result<(), TransportError> {
        self.send_command(CMD_STREAM_START, &[]).await
    }

    async fn send_chunk(&self, bytes: &[u8]) -> Result<(), TransportError> {
        self.send_command(CMD_STREAM_DATA, bytes).await
    }

    async fn signal_stream_end(&self) -> Result<(), TransportError> {
        self.send_command(CMD_STREAM_END, &[]).await
    }

    async fn stop_playback(&self) -> Result<(), TransportError> {
        self.send_command(CMD_STOP_AUDIO, &[]).await
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.addr)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
