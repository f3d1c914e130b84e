//! Header blocks.

use crate::charset::latin1_to_utf8;
use std::fmt;

/// An ordered collection of header fields.
///
/// Lookups are case-insensitive; insertion order is preserved so a block
/// can be written back the way it was read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    fields: Vec<(String, String)>,
}

impl Headers {
    /// Creates a new empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a header field.
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push((name.into(), value.into()));
    }

    /// Sets a header value, replacing any existing values.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.fields.push((name, value.into()));
    }

    /// Gets the first value for a header.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Gets all values for a header.
    #[must_use]
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.fields
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Removes all values for a header.
    pub fn remove(&mut self, name: &str) {
        self.fields.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
    }

    /// Returns an iterator over all fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    /// Returns the number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if there are no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parses a header block.
    ///
    /// Folded continuation lines are joined with a single space. Parsing
    /// stops at the first empty line; lines without a colon are skipped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut headers = Self::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if line.trim().is_empty() {
                break;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    if !value.is_empty() {
                        value.push(' ');
                    }
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                headers.add(name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }

        if let Some((name, value)) = current {
            headers.add(name, value);
        }
        headers
    }

    /// Parses a raw header block that may not be valid UTF-8.
    ///
    /// Raw 8-bit headers are common in the wild; when the block is not
    /// UTF-8 it is read as ISO-8859-1.
    #[must_use]
    pub fn parse_bytes(raw: &[u8]) -> Self {
        match std::str::from_utf8(raw) {
            Ok(text) => Self::parse(text),
            Err(_) => Self::parse(&latin1_to_utf8(raw)),
        }
    }
}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in &self.fields {
            write!(f, "{name}: {value}\r\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_case_insensitive() {
        let mut headers = Headers::new();
        headers.add("Content-Type", "text/plain");
        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_headers_multiple_values_in_order() {
        let mut headers = Headers::new();
        headers.add("Received", "from a");
        headers.add("Subject", "x");
        headers.add("Received", "from b");
        assert_eq!(headers.get_all("received"), vec!["from a", "from b"]);
        assert_eq!(headers.len(), 3);
    }

    #[test]
    fn test_headers_set_replaces() {
        let mut headers = Headers::new();
        headers.add("X-Test", "1");
        headers.add("x-test", "2");
        headers.set("X-Test", "3");
        assert_eq!(headers.get_all("x-test"), vec!["3"]);
    }

    #[test]
    fn test_parse_folded() {
        let text = "Subject: This is a long\r\n  subject line\r\nFrom: a@example.com\r\n\r\nbody";
        let headers = Headers::parse(text);
        assert_eq!(headers.get("subject"), Some("This is a long subject line"));
        assert_eq!(headers.get("from"), Some("a@example.com"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_parse_skips_garbage_lines() {
        let headers = Headers::parse("junk line\nTo: b@example.com\n");
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.get("to"), Some("b@example.com"));
    }

    #[test]
    fn test_parse_bytes_latin1_fallback() {
        let headers = Headers::parse_bytes(b"Subject: caf\xE9\r\n");
        assert_eq!(headers.get("subject"), Some("café"));
    }

    #[test]
    fn test_display() {
        let mut headers = Headers::new();
        headers.add("From", "sender@example.com");
        headers.add("To", "recipient@example.com");
        assert_eq!(
            headers.to_string(),
            "From: sender@example.com\r\nTo: recipient@example.com\r\n"
        );
    }
}
