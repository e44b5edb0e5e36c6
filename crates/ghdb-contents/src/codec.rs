use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ContentsResult;

/// Width at which the remote wraps base64 content in `GET` responses.
pub const LINE_WIDTH: usize = 60;

/// Codec for document bodies: UTF-8 JSON text, standard base64.
pub struct Base64Json;

impl Base64Json {
    /// Serialize `value` to JSON and base64-encode it (unwrapped).
    pub fn encode<T: Serialize>(value: &T) -> ContentsResult<String> {
        let text = serde_json::to_vec(value)?;
        Ok(Self::encode_bytes(&text))
    }

    pub fn encode_bytes(bytes: &[u8]) -> String {
        STANDARD.encode(bytes)
    }

    /// Break `encoded` into lines of at most `width` characters, each ending
    /// in `\n`, the way the remote renders blob content.
    pub fn wrap(encoded: &str, width: usize) -> String {
        let width = width.max(1);
        let mut out = String::with_capacity(encoded.len() + encoded.len() / width + 1);
        for chunk in encoded.as_bytes().chunks(width) {
            // base64 output is ASCII, so byte chunks are char boundaries.
            out.push_str(std::str::from_utf8(chunk).unwrap_or_default());
            out.push('\n');
        }
        out
    }

    /// Decode base64 content, ignoring embedded whitespace.
    pub fn decode_bytes(content: &str) -> ContentsResult<Vec<u8>> {
        let compact: String = content
            .chars()
            .filter(|c| !c.is_ascii_whitespace())
            .collect();
        Ok(STANDARD.decode(compact)?)
    }

    /// Decode base64 content into UTF-8 text.
    pub fn decode_text(content: &str) -> ContentsResult<String> {
        Ok(String::from_utf8(Self::decode_bytes(content)?)?)
    }

    /// Decode base64 content into a typed JSON value.
    pub fn decode<T: DeserializeOwned>(content: &str) -> ContentsResult<T> {
        let text = Self::decode_text(content)?;
        Ok(serde_json::from_str(&text)?)
    }
}
