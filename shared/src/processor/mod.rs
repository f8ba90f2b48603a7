//! Wire processors
//!
//! A processor converts a header plus raw payload into text and back.
//! Two interchangeable formats are provided:
//! - [`PlainTextProcessor`]: `#key=value` header lines followed by the
//!   wrapped encoded payload (ASCII)
//! - [`JsonProcessor`]: `{"header": {...}, "payload": "..."}` (UTF-8)
//!
//! No processor call returns an error value; failures are appended to an
//! [`ErrorCollection`] and the call yields `None`/`false`.

mod json;
mod plain;

pub use json::JsonProcessor;
pub use plain::PlainTextProcessor;

use crate::payload::decode_payload;
use crate::protocol::{KEY_COMMAND, KEY_TYPE, TYPE_REQUEST, TYPE_RESPONSE};
use crate::{ErrorCollection, Header};
use bytes::Bytes;
use std::fmt;
use std::path::Path;

/// Character set a processor reads and writes files in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Ascii,
    Utf8,
}

/// Decoded wire message: header plus raw payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WireMessage {
    pub header: Header,
    pub payload: Bytes,
}

impl WireMessage {
    /// The command descriptor stored under the reserved key
    pub fn descriptor(&self) -> &str {
        self.header.get(KEY_COMMAND).unwrap_or_default()
    }

    /// Whether the header flags this message as a response.
    /// Returns an error message for unknown `Type` values.
    pub fn is_response(&self) -> Result<bool, String> {
        match self.header.get(KEY_TYPE) {
            None => Ok(false),
            Some(TYPE_REQUEST) => Ok(false),
            Some(TYPE_RESPONSE) => Ok(true),
            Some(other) => Err(format!("Unknown message type: {}", other)),
        }
    }
}

/// Converts messages to and from one textual wire format
pub trait Processor: Send + Sync + fmt::Debug {
    /// Short name of the format
    fn name(&self) -> &'static str;

    /// File extension used when persisting messages (without the dot)
    fn extension(&self) -> &'static str;

    /// Charset used by `read_message`/`write_text`
    fn charset(&self) -> Charset;

    /// Render header and raw payload as wire text
    fn format(&self, header: &Header, payload: &[u8]) -> String;

    /// Split wire text into the header and the still-encoded payload
    fn decode_sections(&self, text: &str, errors: &mut ErrorCollection) -> Option<(Header, String)>;

    /// Parse wire text into a message
    fn parse_message(&self, text: &str, errors: &mut ErrorCollection) -> Option<WireMessage> {
        let before = errors.len();
        let (header, encoded) = self.decode_sections(text, errors)?;

        match header.get(KEY_COMMAND) {
            Some(descriptor) if !descriptor.trim().is_empty() => {}
            _ => {
                errors.add("No command present, failed to parse");
                return None;
            }
        }

        let payload = match decode_payload(&encoded) {
            Ok(payload) => payload,
            Err(e) => {
                errors.add(format!("Failed to decompress payload: {}", e));
                Bytes::new()
            }
        };

        if errors.len() > before {
            return None;
        }
        Some(WireMessage { header, payload })
    }

    /// Read a whole file in this processor's charset and parse it
    fn read_message(&self, path: &Path, errors: &mut ErrorCollection) -> Option<WireMessage> {
        let text = read_text(path, self.charset(), errors)?;
        self.parse_message(&text, errors)
    }

    /// Persist already formatted text
    fn write_text(&self, text: &str, path: &Path, errors: &mut ErrorCollection) -> bool {
        if self.charset() == Charset::Ascii && !text.is_ascii() {
            errors.add(format!("Message is not ASCII, cannot write {}", path.display()));
            return false;
        }
        match std::fs::write(path, text.as_bytes()) {
            Ok(()) => true,
            Err(e) => {
                errors.add(format!("Failed to write {}: {}", path.display(), e));
                false
            }
        }
    }
}

fn read_text(path: &Path, charset: Charset, errors: &mut ErrorCollection) -> Option<String> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) => {
            errors.add(format!("Failed to read {}: {}", path.display(), e));
            return None;
        }
    };

    if charset == Charset::Ascii && !bytes.is_ascii() {
        errors.add(format!("File is not ASCII: {}", path.display()));
        return None;
    }

    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            errors.add(format!("File is not valid UTF-8: {}", path.display()));
            None
        }
    }
}
