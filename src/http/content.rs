//! Body transfer rule.
//!
//! The wire format is text oriented: `text/*` bodies travel as they are and
//! every other content type travels as Base64, encoded by the sender before
//! the body is attached and decoded by the receiver after it is parsed.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

pub use base64::DecodeError;

/// Content type assumed when a message does not declare one.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain";

/// Whether a content type is transmitted without Base64.
pub fn is_text(content_type: &str) -> bool {
    content_type
        .trim()
        .get(..5)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("text/"))
}

/// Prepares raw bytes for the wire.
pub fn encode_body(content_type: &str, raw: &[u8]) -> Vec<u8> {
    if is_text(content_type) {
        raw.to_vec()
    } else {
        STANDARD.encode(raw).into_bytes()
    }
}

/// Recovers raw bytes from a received body.
///
/// Line breaks and other ASCII whitespace inside Base64 text are ignored, so
/// MIME-style wrapped payloads decode as well.
pub fn decode_body(content_type: &str, wire: &[u8]) -> Result<Vec<u8>, DecodeError> {
    if is_text(content_type) {
        return Ok(wire.to_vec());
    }

    let compact: Vec<u8> = wire
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    STANDARD.decode(compact)
}
