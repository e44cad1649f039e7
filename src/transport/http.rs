//! `HttpTransport`: the control-plane hop.
//!
//! The control plane exposes one endpoint per protocol step.  Start, end and
//! stop answer `200` with a JSON `{ "success": bool, "message": string }`
//! body, so a refusal arrives as `success: false` rather than as an HTTP
//! error.  The data endpoint takes the raw chunk as the request body and
//! answers with a bare status code.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::TransportConfig;
use crate::transport::{Transport, TransportError};

const START_PATH: &str = "/api/audio/stream/start";
const DATA_PATH: &str = "/api/audio/stream/data";
const END_PATH: &str = "/api/audio/stream/end";
const STOP_PATH: &str = "/api/audio/stop";

/// JSON reply of the control endpoints.
#[derive(Debug, Deserialize)]
struct ControlReply {
    success: bool,
    #[serde(default)]
    message: String,
}

/// Streams chunks to a local control-plane service over HTTP.
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Build from `config.base_url` and `config.timeout_secs`.
    pub fn from_config(config: &TransportConfig) -> Self {
        Self::new(&config.base_url, config.timeout())
    }

    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn control(&self, path: &'static str) -> Result<(), TransportError> {
        let response = self.client.post(self.url(path)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: path,
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        let reply: ControlReply = serde_json::from_slice(&body)?;

        if !reply.success {
            return Err(TransportError::Rejected(reply.message));
        }
        log::debug!("http: {path} -> {}", reply.message);
        Ok(())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn signal_stream_start(&self) -> Result<(), TransportError> {
        self.control(START_PATH).await
    }

    async fn send_chunk(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let response = self
            .client
            .post(self.url(DATA_PATH))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                endpoint: DATA_PATH,
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn signal_stream_end(&self) -> Result<(), TransportError> {
        self.control(END_PATH).await
    }

    async fn stop_playback(&self) -> Result<(), TransportError> {
        self.control(STOP_PATH).await
    }

    fn describe(&self) -> String {
        self.base_url.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
