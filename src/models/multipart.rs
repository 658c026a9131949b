//! Represents one decoded `multipart/related` upload body.

use bytes::Bytes;
use std::collections::HashMap;

/// A single boundary-delimited segment of a multipart body.
#[derive(Clone, Debug, Default)]
pub struct MultipartPart {
    /// Part headers keyed by lower-cased name.
    pub headers: HashMap<String, String>,

    /// Raw part body with the surrounding line terminators removed.
    pub body: Bytes,
}

impl MultipartPart {
    /// Declared `content-type` of this part, if any.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get("content-type")
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Payload and effective content type extracted from a multipart upload.
#[derive(Clone, Debug)]
pub struct DecodedUpload {
    pub media: Bytes,
    pub content_type: String,
}
