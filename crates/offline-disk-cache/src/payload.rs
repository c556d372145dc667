//! Payload encoding
//!
//! A stored entry is a single compact JSON header line followed by the raw
//! body bytes:
//!
//! ```text
//! {"url":"https://...","status":200,...,"body_len":12}\n<12 body bytes>
//! ```
//!
//! JSON escapes newlines inside strings, so the first `\n` always ends the
//! header.

use crate::error::{DiskCacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value that can be stored in the cache as an opaque byte blob.
pub trait CachePayload: Sized {
    fn encode(&self) -> Result<Vec<u8>>;
    fn decode(bytes: &[u8]) -> Result<Self>;
}

impl CachePayload for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bytes.to_vec())
    }
}

/// A cached response: its metadata, body, and caller-supplied user info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedPayload {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub mime_type: Option<String>,
    pub text_encoding: Option<String>,
    pub body: Vec<u8>,
    pub user_info: BTreeMap<String, String>,
}

impl CachedPayload {
    /// Create a 200 response for `url` with the given body
    pub fn new(url: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            headers: BTreeMap::new(),
            mime_type: None,
            text_encoding: None,
            body: body.into(),
            user_info: BTreeMap::new(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_text_encoding(mut self, encoding: impl Into<String>) -> Self {
        self.text_encoding = Some(encoding.into());
        self
    }

    pub fn with_user_info(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.user_info.insert(key.into(), value.into());
        self
    }
}

#[derive(Serialize)]
struct HeaderOut<'a> {
    url: &'a str,
    status: u16,
    headers: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_encoding: Option<&'a str>,
    user_info: &'a BTreeMap<String, String>,
    body_len: u64,
}

#[derive(Deserialize)]
struct HeaderIn {
    url: String,
    status: u16,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    text_encoding: Option<String>,
    #[serde(default)]
    user_info: BTreeMap<String, String>,
    body_len: u64,
}

impl CachePayload for CachedPayload {
    fn encode(&self) -> Result<Vec<u8>> {
        let header = HeaderOut {
            url: &self.url,
            status: self.status,
            headers: &self.headers,
            mime_type: self.mime_type.as_deref(),
            text_encoding: self.text_encoding.as_deref(),
            user_info: &self.user_info,
            body_len: self.body.len() as u64,
        };

        let mut bytes =
            serde_json::to_vec(&header).map_err(|e| DiskCacheError::Codec(e.to_string()))?;
        bytes.reserve(self.body.len() + 1);
        bytes.push(b'\n');
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let split = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| DiskCacheError::Codec("missing header terminator".to_string()))?;

        let header: HeaderIn = serde_json::from_slice(&bytes[..split])
            .map_err(|e| DiskCacheError::Codec(format!("invalid header: {}", e)))?;

        let body = &bytes[split + 1..];
        if body.len() as u64 != header.body_len {
            return Err(DiskCacheError::Codec(format!(
                "body length mismatch: header says {}, found {}",
                header.body_len,
                body.len()
            )));
        }

        Ok(Self {
            url: header.url,
            status: header.status,
            headers: header.headers,
            mime_type: header.mime_type,
            text_encoding: header.text_encoding,
            body: body.to_vec(),
            user_info: header.user_info,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CachedPayload {
        CachedPayload::new("foo://bar", "hello, world")
            .with_mime_type("text/html")
            .with_header("Cache-Control", "max-age=60")
            .with_user_info("foo", "bar")
    }

    #[test]
    fn test_encode_then_decode_preserves_everything() {
        let payload = sample().with_status(203).with_text_encoding("utf-8");
        let bytes = payload.encode().unwrap();
        assert_eq!(CachedPayload::decode(&bytes).unwrap(), payload);
    }

    #[test]
    fn test_binary_body_with_newlines() {
        let body: Vec<u8> = (0..=255u8).chain(b"\n\n\r\n".iter().copied()).collect();
        let payload = CachedPayload::new("https://example.com/blob.bin", body.clone());

        let decoded = CachedPayload::decode(&payload.encode().unwrap()).unwrap();
        assert_eq!(decoded.body, body);
    }

    #[test]
    fn test_header_is_single_json_line() {
        let payload = sample().with_user_info("note", "line one\nline two");
        let bytes = payload.encode().unwrap();
        let split = bytes.iter().position(|&b| b == b'\n').unwrap();

        let header: serde_json::Value = serde_json::from_slice(&bytes[..split]).unwrap();
        assert_eq!(header["body_len"], 12);
        assert_eq!(header["mime_type"], "text/html");
        assert_eq!(&bytes[split + 1..], b"hello, world");
    }

    #[test]
    fn test_truncated_body_is_rejected() {
        let mut bytes = sample().encode().unwrap();
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            CachedPayload::decode(&bytes),
            Err(DiskCacheError::Codec(_))
        ));
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(CachedPayload::decode(b"").is_err());
        assert!(CachedPayload::decode(b"not json\nbody").is_err());
        assert!(CachedPayload::decode(b"{\"url\":\"x\"").is_err());
    }

    #[test]
    fn test_raw_bytes_pass_through() {
        let raw = b"opaque".to_vec();
        assert_eq!(raw.encode().unwrap(), raw);
        assert_eq!(Vec::<u8>::decode(b"opaque").unwrap(), raw);
    }
}
