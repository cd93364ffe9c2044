use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Store-assigned identifier of a gallery entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageId(String);

impl ImageId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Fresh id for a text-to-image result (or an opened file).
    pub fn generated() -> Self {
        Self::with_prefix("img")
    }

    pub fn edited() -> Self {
        Self::with_prefix("img-edited")
    }

    pub fn upscaled() -> Self {
        Self::with_prefix("img-upscaled")
    }

    fn with_prefix(prefix: &str) -> Self {
        Self(format!("{prefix}-{}", uuid::Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MimeType {
    #[serde(rename = "image/jpeg")]
    Jpeg,
    #[serde(rename = "image/png")]
    Png,
    #[serde(rename = "image/webp")]
    Webp,
}

impl MimeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
        }
    }

    /// Anything unrecognised is treated as PNG.
    pub fn from_mime(raw: &str) -> Self {
        let lowered = raw.trim().to_ascii_lowercase();
        if lowered.contains("jpeg") || lowered.contains("jpg") {
            Self::Jpeg
        } else if lowered.contains("webp") {
            Self::Webp
        } else {
            Self::Png
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim().to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded image bytes together with the MIME type they were produced in.
#[derive(Clone, PartialEq, Eq)]
pub struct ImagePayload {
    pub mime_type: MimeType,
    pub bytes: Vec<u8>,
}

impl ImagePayload {
    pub fn new(mime_type: MimeType, bytes: Vec<u8>) -> Self {
        Self { mime_type, bytes }
    }

    pub fn base64(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for ImagePayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImagePayload")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageStatus {
    #[default]
    Idle,
    Editing,
    Upscaling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub id: ImageId,
    pub payload: ImagePayload,
    pub prompt: String,
    pub status: ImageStatus,
}

impl GeneratedImage {
    pub fn new(id: ImageId, payload: ImagePayload, prompt: impl Into<String>) -> Self {
        Self {
            id,
            payload,
            prompt: prompt.into(),
            status: ImageStatus::Idle,
        }
    }

    pub fn mime_type(&self) -> MimeType {
        self.payload.mime_type
    }
}

pub fn edited_prompt(prompt: &str, instruction: &str) -> String {
    format!("{prompt} (Edited: {instruction})")
}

pub fn upscaled_prompt(prompt: &str) -> String {
    format!("{prompt} (Upscaled)")
}
