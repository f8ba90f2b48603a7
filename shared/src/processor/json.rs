//! JSON format
//!
//! ```text
//! {"header": {"Command": "basic.Ping", "Type": "Request"}, "payload": ""}
//! ```

use super::{Charset, Processor};
use crate::{encode_payload, ErrorCollection, Header};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct JsonMessageRef<'a> {
    header: &'a Header,
    payload: String,
}

#[derive(Deserialize)]
struct JsonMessage {
    header: Header,
    #[serde(default)]
    payload: String,
}

#[derive(Debug, Clone, Default)]
pub struct JsonProcessor {
    /// Pretty-print formatted output; parsing accepts both forms
    pretty: bool,
}

impl JsonProcessor {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    pub fn is_pretty(&self) -> bool {
        self.pretty
    }
}

impl Processor for JsonProcessor {
    fn name(&self) -> &'static str {
        "json"
    }

    fn extension(&self) -> &'static str {
        "json"
    }

    fn charset(&self) -> Charset {
        Charset::Utf8
    }

    fn format(&self, header: &Header, payload: &[u8]) -> String {
        let message = JsonMessageRef {
            header,
            payload: encode_payload(payload),
        };
        let result = if self.pretty {
            serde_json::to_string_pretty(&message)
        } else {
            serde_json::to_string(&message)
        };
        // Serializing string maps cannot fail
        result.unwrap_or_default()
    }

    fn decode_sections(&self, text: &str, errors: &mut ErrorCollection) -> Option<(Header, String)> {
        match serde_json::from_str::<JsonMessage>(text) {
            Ok(message) => Some((message.header, message.payload)),
            Err(e) => {
                errors.add(format!("Failed to parse JSON message: {}", e));
                None
            }
        }
    }
}
