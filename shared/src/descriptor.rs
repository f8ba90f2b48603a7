//! Command descriptor ("command line")
//!
//! A descriptor names a command kind and carries its configuration:
//! ```text
//! flow.StopFlow -id 3 -timeout 2000
//! ```
//! Values containing whitespace, quotes or backslashes are double-quoted.

use std::fmt;
use thiserror::Error;

/// Errors that can occur while parsing a descriptor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("Empty command descriptor")]
    Empty,

    #[error("Unterminated quote in command descriptor")]
    UnterminatedQuote,

    #[error("Option -{0} has no value")]
    MissingValue(String),

    #[error("Expected an option name, found '{0}'")]
    ExpectedOption(String),
}

/// Parsed command descriptor
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    kind: String,
    options: Vec<(String, String)>,
}

impl Descriptor {
    /// Create a descriptor without options
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            options: Vec::new(),
        }
    }

    /// Builder-style option append
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.options.push((name.into(), value.to_string()));
        self
    }

    /// Registry key of the command kind
    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn options(&self) -> &[(String, String)] {
        &self.options
    }

    /// Value of the last occurrence of an option
    pub fn option(&self, name: &str) -> Option<&str> {
        self.options
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a descriptor string
    pub fn parse(text: &str) -> Result<Self, DescriptorError> {
        let mut tokens = tokenize(text)?.into_iter();

        let kind = match tokens.next() {
            Some(token) => token.into_value(),
            None => return Err(DescriptorError::Empty),
        };

        let mut options = Vec::new();
        while let Some(token) = tokens.next() {
            let name = match &token {
                Token::Bare(bare) => match bare.strip_prefix('-') {
                    Some(name) if !name.is_empty() => name.to_string(),
                    _ => return Err(DescriptorError::ExpectedOption(bare.clone())),
                },
                Token::Quoted(value) => return Err(DescriptorError::ExpectedOption(value.clone())),
            };
            match tokens.next() {
                Some(value) => options.push((name, value.into_value())),
                None => return Err(DescriptorError::MissingValue(name)),
            }
        }

        Ok(Self { kind, options })
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.kind)?;
        for (name, value) in &self.options {
            write!(f, " -{} {}", name, quote(value))?;
        }
        Ok(())
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty()
        || value.starts_with('-')
        || value
            .chars()
            .any(|c| c.is_whitespace() || c == '"' || c == '\\')
}

fn quote(value: &str) -> String {
    if !needs_quotes(value) {
        return value.to_string();
    }
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    quoted
}

enum Token {
    Bare(String),
    Quoted(String),
}

impl Token {
    fn into_value(self) -> String {
        match self {
            Token::Bare(value) | Token::Quoted(value) => value,
        }
    }
}

/// Split on whitespace, honouring double quotes and backslash escapes inside them
fn tokenize(text: &str) -> Result<Vec<Token>, DescriptorError> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut token = String::new();
        if first == '"' {
            chars.next();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '"' => {
                        closed = true;
                        break;
                    }
                    '\\' => match chars.next() {
                        Some(escaped) => token.push(escaped),
                        None => break,
                    },
                    _ => token.push(c),
                }
            }
            if !closed {
                return Err(DescriptorError::UnterminatedQuote);
            }
            tokens.push(Token::Quoted(token));
        } else {
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                token.push(c);
                chars.next();
            }
            tokens.push(Token::Bare(token));
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_kind_only() {
        let d = Descriptor::parse("basic.Ping").unwrap();
        assert_eq!(d.kind(), "basic.Ping");
        assert!(d.options().is_empty());
    }

    #[test]
    fn test_parse_options() {
        let d = Descriptor::parse("  flow.StopFlow -id 3   -timeout 2000 ").unwrap();
        assert_eq!(d.kind(), "flow.StopFlow");
        assert_eq!(d.option("id"), Some("3"));
        assert_eq!(d.option("timeout"), Some("2000"));
        assert_eq!(d.option("missing"), None);
    }

    #[test]
    fn test_quoted_values_roundtrip() {
        let d = Descriptor::new("basic.Text")
            .with("title", "hello \"world\"")
            .with("path", "C:\\tmp")
            .with("empty", "")
            .with("negative", "-5");

        let rendered = d.to_string();
        assert_eq!(
            rendered,
            r#"basic.Text -title "hello \"world\"" -path "C:\\tmp" -empty "" -negative "-5""#
        );
        assert_eq!(Descriptor::parse(&rendered).unwrap(), d);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Descriptor::parse("   "), Err(DescriptorError::Empty));
        assert_eq!(
            Descriptor::parse("basic.Stop -type"),
            Err(DescriptorError::MissingValue("type".into()))
        );
        assert_eq!(
            Descriptor::parse("basic.Stop exit"),
            Err(DescriptorError::ExpectedOption("exit".into()))
        );
        assert_eq!(
            Descriptor::parse("basic.Text -title \"open"),
            Err(DescriptorError::UnterminatedQuote)
        );
    }

    #[test]
    fn test_quoted_token_is_never_an_option_name() {
        assert_eq!(
            Descriptor::parse("basic.Text \"-title\" x"),
            Err(DescriptorError::ExpectedOption("-title".into()))
        );
    }
}
