//! Envelope addresses and header mailboxes.

use std::fmt;

use embermail_codec::rfc2047;

use crate::error::{Error, Result};

/// Email address for the SMTP envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidAddress`] if the address is malformed.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the part after `@`.
    #[must_use]
    pub fn domain(&self) -> &str {
        self.0.rsplit_once('@').map_or("", |(_, domain)| domain)
    }

    fn validate(addr: &str) -> Result<()> {
        let invalid = |why: &str| Err(Error::InvalidAddress(format!("{addr:?}: {why}")));
        let Some((local, domain)) = addr.split_once('@') else {
            return invalid("missing @");
        };
        if local.is_empty() || domain.is_empty() {
            return invalid("local and domain parts cannot be empty");
        }
        if domain.contains('@') {
            return invalid("more than one @");
        }
        // Would break out of `MAIL FROM:<...>` or a header line.
        if addr.bytes().any(|b| b.is_ascii_control() || b" <>".contains(&b)) {
            return invalid("contains whitespace, control characters or angle brackets");
        }
        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mailbox (optional display name + address).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mailbox {
    /// Display name (optional).
    pub name: Option<String>,
    /// Email address.
    pub address: Address,
}

impl Mailbox {
    /// Creates a new mailbox with just an address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn new(address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: None,
            address: Address::new(address)?,
        })
    }

    /// Creates a new mailbox with a display name and address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address is invalid.
    pub fn with_name(name: impl Into<String>, address: impl Into<String>) -> Result<Self> {
        Ok(Self {
            name: Some(name.into()),
            address: Address::new(address)?,
        })
    }

    /// Parses `Name <addr>`, `<addr>` or a bare address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address part is invalid.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        match text.rfind('<') {
            Some(open) if text.ends_with('>') => {
                let address = &text[open + 1..text.len() - 1];
                let name = text[..open].trim().trim_matches('"').trim();
                if name.is_empty() {
                    Self::new(address)
                } else {
                    Self::with_name(name, address)
                }
            }
            _ => Self::new(text),
        }
    }

    /// Renders the mailbox for a header field.
    ///
    /// Non-ASCII names are RFC 2047 encoded; names with specials are
    /// quoted.
    #[must_use]
    pub fn to_header(&self) -> String {
        let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) else {
            return self.address.to_string();
        };
        let encoded = rfc2047::encode(name);
        if encoded != name {
            return format!("{encoded} <{}>", self.address);
        }
        if name.bytes().any(|b| b"()<>[]:;@\\,.\"".contains(&b)) {
            let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{escaped}\" <{}>", self.address)
        } else {
            format!("{name} <{}>", self.address)
        }
    }
}

impl fmt::Display for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_header())
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
    fn test_valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.domain(), "example.com");
    }

    #[test]
    fn test_invalid_addresses() {
        for bad in ["", "userexample.com", "@example.com", "user@", "a@b@c", "a b@c", "a@b>"] {
            assert!(Address::new(bad).is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_parse_mailbox() {
        let mailbox = Mailbox::parse("\"Doe, John\" <john@example.com>").unwrap();
        assert_eq!(mailbox.name.as_deref(), Some("Doe, John"));
        assert_eq!(mailbox.address.as_str(), "john@example.com");
        assert!(Mailbox::parse("<a@b.c>").unwrap().name.is_none());
        assert!(Mailbox::parse("a@b.c").unwrap().name.is_none());
    }

    #[test]
    fn test_header_rendering() {
        let plain = Mailbox::with_name("John Doe", "john@example.com").unwrap();
        assert_eq!(plain.to_header(), "John Doe <john@example.com>");

        let special = Mailbox::with_name("Doe, John", "john@example.com").unwrap();
        assert_eq!(special.to_header(), "\"Doe, John\" <john@example.com>");

        let utf8 = Mailbox::with_name("Zoë", "zoe@example.com").unwrap();
        assert_eq!(utf8.to_header(), "=?UTF-8?B?Wm/Dqw==?= <zoe@example.com>");

        assert_eq!(Mailbox::new("a@b.c").unwrap().to_header(), "a@b.c");
    }
}
