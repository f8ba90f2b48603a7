//! Accumulated, human-readable failures of parse/format/read/write calls

use std::fmt;

/// Ordered, append-only list of error messages. Empty means success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorCollection {
    messages: Vec<String>,
}

impl ErrorCollection {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message
    pub fn add(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.messages.iter().map(String::as_str)
    }

    /// Check whether any message contains `needle` (case-insensitive)
    pub fn contains(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.messages
            .iter()
            .any(|m| m.to_lowercase().contains(&needle))
    }

    /// Move all messages of `other` into this collection
    pub fn extend(&mut self, other: ErrorCollection) {
        self.messages.extend(other.messages);
    }
}

impl fmt::Display for ErrorCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.messages.join("\n"))
    }
}
