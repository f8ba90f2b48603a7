//! Payload codec shared by all processors
//!
//! Non-empty payloads are encoded as:
//! ```text
//! base64( gzip( raw bytes ) )
//! ```
//! An empty payload encodes to the empty string. Decoded payloads are
//! capped at [`MAX_MESSAGE_SIZE`] bytes.

use crate::protocol::MAX_MESSAGE_SIZE;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{Read, Write};
use thiserror::Error;

/// Errors that can occur during payload decoding
#[derive(Error, Debug)]
pub enum PayloadError {
    #[error("invalid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("gzip: {0}")]
    Gzip(#[from] std::io::Error),

    #[error("payload expands to more than {0} bytes")]
    TooLarge(usize),
}

/// Encode raw payload bytes
pub fn encode_payload(payload: &[u8]) -> String {
    if payload.is_empty() {
        return String::new();
    }

    let mut encoder = GzEncoder::new(Vec::with_capacity(payload.len() / 2 + 32), Compression::default());
    // Writing into a Vec cannot fail
    let compressed = match encoder.write_all(payload).and_then(|_| encoder.finish()) {
        Ok(compressed) => compressed,
        Err(_) => return String::new(),
    };

    STANDARD.encode(compressed)
}

/// Decode an encoded payload back into raw bytes
pub fn decode_payload(encoded: &str) -> Result<Bytes, PayloadError> {
    decode_payload_limited(encoded, MAX_MESSAGE_SIZE)
}

/// Decode an encoded payload, failing once it expands past `limit` bytes
pub fn decode_payload_limited(encoded: &str, limit: usize) -> Result<Bytes, PayloadError> {
    if encoded.is_empty() {
        return Ok(Bytes::new());
    }

    let compressed = STANDARD.decode(encoded)?;
    let mut decoder = GzDecoder::new(compressed.as_slice()).take(limit as u64 + 1);
    let mut raw = Vec::new();
    decoder.read_to_end(&mut raw)?;
    if raw.len() > limit {
        return Err(PayloadError::TooLarge(limit));
    }

    Ok(Bytes::from(raw))
}
