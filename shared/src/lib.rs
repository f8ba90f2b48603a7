//! Remote command wire format
//!
//! This crate provides the wire-level types shared by every remote command
//! endpoint: the ordered message header, the command descriptor ("command
//! line"), the payload codec and the two interchangeable processors.

pub mod descriptor;
pub mod error;
pub mod header;
pub mod payload;
pub mod processor;
pub mod properties;

use std::time::{SystemTime, UNIX_EPOCH};

pub use descriptor::{Descriptor, DescriptorError};
pub use error::ErrorCollection;
pub use header::Header;
pub use payload::{decode_payload, decode_payload_limited, encode_payload, PayloadError};
pub use processor::{Charset, JsonProcessor, PlainTextProcessor, Processor, WireMessage};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Protocol constants
pub mod protocol {
    /// Header key holding the command descriptor
    pub const KEY_COMMAND: &str = "Command";

    /// Header key holding the message type (request or response)
    pub const KEY_TYPE: &str = "Type";

    /// Header key holding the assembly timestamp (ms since epoch)
    pub const KEY_TIMESTAMP: &str = "Timestamp";

    /// `Type` value for requests
    pub const TYPE_REQUEST: &str = "Request";

    /// `Type` value for responses
    pub const TYPE_RESPONSE: &str = "Response";

    /// Marker prefixing every header line of the plain-text format
    pub const COMMENT: char = '#';

    /// Column at which the plain-text payload is wrapped
    pub const PAYLOAD_LINE_WIDTH: usize = 72;

    /// Default TCP port of a dispatch engine
    pub const DEFAULT_PORT: u16 = 12345;

    /// Maximum message size (10 MB) to prevent memory exhaustion
    pub const MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

    /// Interval used by polling waits, in milliseconds
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_ms_is_after_2020() {
        assert!(now_ms() > 1_577_836_800_000);
    }
}
