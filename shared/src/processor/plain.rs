//! Plain-text format
//!
//! ```text
//! #Command=basic.Ping
//! #Type=Request
//! <base64(gzip(payload)), 72 characters per line>
//! ```
//! Leading lines starting with `#` form the header. The first line without
//! the marker ends the header for good: later `#` lines belong to the payload.

use super::{Charset, Processor};
use crate::properties::{format_line, parse_line};
use crate::protocol::{COMMENT, PAYLOAD_LINE_WIDTH};
use crate::{encode_payload, ErrorCollection, Header};

#[derive(Debug, Clone, Default)]
pub struct PlainTextProcessor;

impl PlainTextProcessor {
    pub fn new() -> Self {
        Self
    }
}

/// Split text into header lines (marker stripped) and concatenated payload
pub(crate) fn split_lines(text: &str) -> (Vec<&str>, String) {
    let mut header_lines = Vec::new();
    let mut payload = String::new();
    let mut in_header = true;

    for line in text.lines() {
        if in_header {
            if let Some(rest) = line.strip_prefix(COMMENT) {
                header_lines.push(rest);
                continue;
            }
            in_header = false;
        }
        payload.push_str(line.trim());
    }

    (header_lines, payload)
}

impl Processor for PlainTextProcessor {
    fn name(&self) -> &'static str {
        "plain"
    }

    fn extension(&self) -> &'static str {
        "rcmd"
    }

    fn charset(&self) -> Charset {
        Charset::Ascii
    }

    fn format(&self, header: &Header, payload: &[u8]) -> String {
        let mut text = String::new();
        for (key, value) in header.iter() {
            text.push(COMMENT);
            text.push_str(&format_line(key, value));
            text.push('\n');
        }

        // base64 output is ASCII, so byte chunks are valid str slices
        let encoded = encode_payload(payload);
        for chunk in encoded.as_bytes().chunks(PAYLOAD_LINE_WIDTH) {
            text.push_str(&String::from_utf8_lossy(chunk));
            text.push('\n');
        }

        text
    }

    fn decode_sections(&self, text: &str, errors: &mut ErrorCollection) -> Option<(Header, String)> {
        let (lines, payload) = split_lines(text);

        let mut header = Header::new();
        let mut ok = true;
        for (i, line) in lines.iter().enumerate() {
            match parse_line(line) {
                Ok(Some((key, value))) => {
                    header.insert(key, value);
                }
                Ok(None) => {}
                Err(e) => {
                    errors.add(format!("Malformed header line {}: {}", i + 1, e));
                    ok = false;
                }
            }
        }

        ok.then_some((header, payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::KEY_COMMAND;

    #[test]
    fn test_format_layout() {
        let header = Header::from_iter([(KEY_COMMAND, "basic.Ping"), ("Type", "Request")]);
        let text = PlainTextProcessor::new().format(&header, &[]);
        assert_eq!(text, "#Command=basic.Ping\n#Type=Request\n");
    }

    #[test]
    fn test_payload_wrapped_at_line_width() {
        let header = Header::from_iter([(KEY_COMMAND, "basic.Text")]);
        // Incompressible-ish payload so the encoding spans several lines
        let payload: Vec<u8> = (0..2000u32).map(|i| (i.wrapping_mul(2654435761) >> 13) as u8).collect();
        let text = PlainTextProcessor::new().format(&header, &payload);

        let body: Vec<&str> = text.lines().skip(1).collect();
        assert!(body.len() > 1);
        for line in &body[..body.len() - 1] {
            assert_eq!(line.len(), PAYLOAD_LINE_WIDTH);
        }
        assert!(body.last().unwrap().len() <= PAYLOAD_LINE_WIDTH);
    }

    #[test]
    fn test_header_ends_at_first_body_line() {
        let text = "#Command=basic.Text\n#Type=Request\nQUJD\n#Sneaky=yes\n";
        let (lines, payload) = split_lines(text);

        assert_eq!(lines, vec!["Command=basic.Text", "Type=Request"]);
        assert_eq!(payload, "QUJD#Sneaky=yes");

        let mut errors = ErrorCollection::new();
        let (header, _) = PlainTextProcessor::new()
            .decode_sections(text, &mut errors)
            .unwrap();
        assert_eq!(header.len(), 2);
        assert!(!header.contains_key("Sneaky"));
    }

    #[test]
    fn test_crlf_lines() {
        let header = Header::from_iter([(KEY_COMMAND, "basic.Text")]);
        let text = PlainTextProcessor::new()
            .format(&header, b"windows")
            .replace('\n', "\r\n");

        let mut errors = ErrorCollection::new();
        let message = PlainTextProcessor::new().parse_message(&text, &mut errors).unwrap();
        assert_eq!(message.header.get(KEY_COMMAND), Some("basic.Text"));
        assert_eq!(&message.payload[..], b"windows");
    }

    #[test]
    fn test_corrupt_payload_reports_decompression() {
        let header = Header::from_iter([(KEY_COMMAND, "basic.Text")]);
        let text = PlainTextProcessor::new().format(&header, b"some payload to corrupt");
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        let body = lines.last_mut().unwrap();
        *body = format!("AAAA{}", &body[4..]);

        let mut errors = ErrorCollection::new();
        let result = PlainTextProcessor::new().parse_message(&lines.join("\n"), &mut errors);
        assert!(result.is_none());
        assert!(errors.contains("failed to decompress payload"));
    }

    #[test]
    fn test_malformed_header_line() {
        let text = "#Command=basic.Text\n#Bad=\\uXYZW\n";
        let mut errors = ErrorCollection::new();
        assert!(PlainTextProcessor::new().parse_message(text, &mut errors).is_none());
        assert!(errors.contains("malformed header line 2"));
    }
}
