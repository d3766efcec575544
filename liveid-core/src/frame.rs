//! Image handles passed between the camera, the liveness gate and the embedder.
//!
//! A [`Frame`] is an opaque, cheaply clonable handle over encoded image bytes.
//! The pipeline never inspects pixels itself; only collaborators (classifier,
//! embedder) decode the payload.

use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{LiveIdError, Result};

/// MIME type assumed when nothing better is known.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

/// Encoded image captured from a frame source.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "FrameRecord", try_from = "FrameRecord")]
pub struct Frame {
    bytes: Arc<[u8]>,
    mime_type: String,
    captured_at: DateTime<Utc>,
}

impl Frame {
    /// Wrap encoded image bytes captured now.
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            captured_at: Utc::now(),
        }
    }

    /// Read an image file, deriving the MIME type from its extension.
    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            LiveIdError::ImageError(format!("Failed to read frame {}: {e}", path.display()))
        })?;
        if bytes.is_empty() {
            return Err(LiveIdError::ImageError(format!(
                "Frame file is empty: {}",
                path.display()
            )));
        }
        let mime_type = mime_type_for_path(path).unwrap_or(DEFAULT_MIME_TYPE);
        Ok(Self::new(bytes, mime_type))
    }

    /// Decode a frame from its base64 transport form.
    ///
    /// Data URL prefixes (`data:image/png;base64,`) are accepted and stripped.
    pub fn from_base64(data: &str, mime_type: impl Into<String>) -> Result<Self> {
        let mut mime_type = mime_type.into();
        let payload = match data.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    LiveIdError::ImageError("Malformed data URL: missing ','".into())
                })?;
                if let Some(declared) = header.strip_suffix(";base64") {
                    mime_type = declared.to_string();
                }
                payload
            }
            None => data,
        };

        let bytes = BASE64
            .decode(payload.trim())
            .map_err(|e| LiveIdError::ImageError(format!("Base64 decode error: {e}")))?;
        Ok(Self::new(bytes, mime_type))
    }

    /// Encoded image bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base64 payload suitable for JSON transport to an external service.
    pub fn to_base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

/// Plain-data form of a [`Frame`] used for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameRecord {
    pub mime_type: String,
    /// Base64-encoded image bytes.
    pub data: String,
    pub captured_at: DateTime<Utc>,
}

impl From<Frame> for FrameRecord {
    fn from(frame: Frame) -> Self {
        Self {
            data: frame.to_base64(),
            mime_type: frame.mime_type,
            captured_at: frame.captured_at,
        }
    }
}

impl TryFrom<FrameRecord> for Frame {
    type Error = LiveIdError;

    fn try_from(record: FrameRecord) -> Result<Self> {
        let mut frame = Frame::from_base64(&record.data, record.mime_type)?;
        frame.captured_at = record.captured_at;
        Ok(frame)
    }
}

/// Map a file extension to an image MIME type.
pub fn mime_type_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
