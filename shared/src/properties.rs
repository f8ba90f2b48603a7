//! Properties grammar used for plain-text header lines
//!
//! Each header line (after the comment marker) is a single `key=value`
//! entry. Formatting always yields pure ASCII: non-ASCII characters are
//! written as `\uXXXX` escapes (UTF-16 code units).

use thiserror::Error;

/// Errors that can occur while parsing a properties line
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PropertiesError {
    #[error("invalid \\u escape")]
    BadUnicodeEscape,

    #[error("unpaired surrogate \\u{0:04X}")]
    UnpairedSurrogate(u16),

    #[error("dangling backslash at end of line")]
    DanglingEscape,
}

/// Format a single `key=value` line
pub fn format_line(key: &str, value: &str) -> String {
    let mut line = String::with_capacity(key.len() + value.len() + 1);
    escape_into(&mut line, key, true);
    line.push('=');
    escape_into(&mut line, value, false);
    line
}

fn escape_into(out: &mut String, text: &str, is_key: bool) {
    for (i, c) in text.chars().enumerate() {
        match c {
            '\\' => out.push_str("\\\\"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{0C}' => out.push_str("\\f"),
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            c => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04X}", unit));
                }
            }
        }
    }
}

fn is_blank(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\u{0C}'
}

/// Parse a single line. Blank lines yield `Ok(None)`.
pub fn parse_line(line: &str) -> Result<Option<(String, String)>, PropertiesError> {
    let line = line.trim_start_matches(is_blank);
    if line.is_empty() {
        return Ok(None);
    }

    // Locate the end of the key: first unescaped separator or blank
    let mut key_end = line.len();
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = i;
                break;
            }
            c if is_blank(c) => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = unescape(&line[..key_end])?;

    let mut rest = line[key_end..].trim_start_matches(is_blank);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches(is_blank);
    }
    let value = unescape(rest)?;

    Ok(Some((key, value)))
}

fn unescape(text: &str) -> Result<String, PropertiesError> {
    let mut out = String::with_capacity(text.len());
    let mut units: Vec<u16> = Vec::new();
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            flush_units(&mut out, &mut units)?;
            out.push(c);
            continue;
        }
        let escaped = chars.next().ok_or(PropertiesError::DanglingEscape)?;
        if escaped == 'u' {
            let hex: String = chars.by_ref().take(4).collect();
            if hex.len() != 4 {
                return Err(PropertiesError::BadUnicodeEscape);
            }
            let unit =
                u16::from_str_radix(&hex, 16).map_err(|_| PropertiesError::BadUnicodeEscape)?;
            units.push(unit);
            continue;
        }
        flush_units(&mut out, &mut units)?;
        out.push(match escaped {
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'f' => '\u{0C}',
            other => other,
        });
    }
    flush_units(&mut out, &mut units)?;

    Ok(out)
}

fn flush_units(out: &mut String, units: &mut Vec<u16>) -> Result<(), PropertiesError> {
    if units.is_empty() {
        return Ok(());
    }
    for decoded in char::decode_utf16(units.drain(..)) {
        let c = decoded.map_err(|e| PropertiesError::UnpairedSurrogate(e.unpaired_surrogate()))?;
        out.push(c);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_line() {
        assert_eq!(format_line("Command", "basic.Ping"), "Command=basic.Ping");
        assert_eq!(
            parse_line("Command=basic.Ping").unwrap(),
            Some(("Command".into(), "basic.Ping".into()))
        );
    }

    #[test]
    fn test_separator_variants() {
        assert_eq!(
            parse_line("  key : value with spaces").unwrap(),
            Some(("key".into(), "value with spaces".into()))
        );
        assert_eq!(
            parse_line("key value").unwrap(),
            Some(("key".into(), "value".into()))
        );
        assert_eq!(parse_line("key").unwrap(), Some(("key".into(), "".into())));
        assert_eq!(parse_line("   ").unwrap(), None);
    }

    #[test]
    fn test_escapes_roundtrip() {
        let cases = [
            ("Command", "flow.StopFlow -id 3"),
            ("a=b", "x:y#z!w"),
            ("key with space", " leading space"),
            ("multi", "line1\nline2\r\n\tend"),
            ("path", "C:\\tmp\\file"),
            ("unicode", "grüße 日本 🚀"),
        ];
        for (key, value) in cases {
            let line = format_line(key, value);
            assert!(line.is_ascii(), "not ascii: {}", line);
            assert!(!line.contains('\n'));
            assert_eq!(
                parse_line(&line).unwrap(),
                Some((key.to_string(), value.to_string())),
                "line: {}",
                line
            );
        }
    }

    #[test]
    fn test_surrogate_pair_escape() {
        assert_eq!(format_line("k", "🚀"), "k=\\uD83D\\uDE80");
        assert_eq!(
            parse_line("k=\\uD83D\\uDE80").unwrap(),
            Some(("k".into(), "🚀".into()))
        );
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(parse_line("k=abc\\"), Err(PropertiesError::DanglingEscape));
        assert_eq!(parse_line("k=\\u12"), Err(PropertiesError::BadUnicodeEscape));
        assert_eq!(parse_line("k=\\uZZZZ"), Err(PropertiesError::BadUnicodeEscape));
        assert_eq!(
            parse_line("k=\\uD83D"),
            Err(PropertiesError::UnpairedSurrogate(0xD83D))
        );
    }
}
