//! Encoded audio payloads handed to the decoder.

use std::path::Path;

/// An encoded audio file held in memory, consumed once by a
/// [`Decoder`](crate::audio::Decoder).
///
/// `hint` is an optional container/codec hint (file extension such as
/// `"mp3"` or `"wav"`).  Decoders may sniff the bytes regardless.
#[derive(Debug, Clone)]
pub struct AudioSource {
    bytes: Vec<u8>,
    hint: Option<String>,
}

impl AudioSource {
    /// Wrap an in-memory payload with no container hint.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
            hint: None,
        }
    }

    /// Attach a container hint (extension without the dot, any case).
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into().to_ascii_lowercase());
        self
    }

    /// Read a file from disk, using its extension as the container hint.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let source = Self::from_bytes(bytes);
        Ok(match path.extension().and_then(|e| e.to_str()) {
            Some(ext) => source.with_hint(ext),
            None => source,
        })
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Give up ownership of the payload.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
