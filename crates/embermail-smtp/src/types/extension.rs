//! ESMTP extensions announced in the EHLO reply.

/// One EHLO keyword the engine acts on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Extension {
    /// STARTTLS - TLS upgrade (RFC 3207)
    StartTls,
    /// AUTH - Authentication (RFC 4954)
    Auth(Vec<AuthMechanism>),
    /// SIZE - Maximum message size (RFC 1870); 0 means no fixed limit
    Size(Option<u64>),
    /// 8BITMIME - 8-bit MIME transport
    EightBitMime,
    /// PIPELINING - Command pipelining
    Pipelining,
    /// CHUNKING - BDAT transfer (RFC 3030)
    Chunking,
    /// SMTPUTF8 - UTF-8 email addresses
    SmtpUtf8,
    /// DSN - Delivery status notifications (RFC 3461)
    Dsn,
    /// BINARYMIME - Binary MIME
    BinaryMime,
    /// Anything else, verbatim
    Unknown(String),
}

impl Extension {
    /// Parses an extension line from the EHLO reply.
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut words = line.split_whitespace();
        let Some(keyword) = words.next() else {
            return Self::Unknown(line.to_string());
        };
        match keyword.to_ascii_uppercase().as_str() {
            "STARTTLS" => Self::StartTls,
            "AUTH" => Self::Auth(words.filter_map(AuthMechanism::parse).collect()),
            "SIZE" => Self::Size(words.next().and_then(|s| s.parse().ok())),
            "8BITMIME" => Self::EightBitMime,
            "PIPELINING" => Self::Pipelining,
            "CHUNKING" => Self::Chunking,
            "SMTPUTF8" => Self::SmtpUtf8,
            "DSN" => Self::Dsn,
            "BINARYMIME" => Self::BinaryMime,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

/// SASL authentication mechanism.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMechanism {
    /// PLAIN - plaintext authentication
    Plain,
    /// LOGIN - legacy plaintext
    Login,
    /// `XOAUTH2` - `OAuth2` (Google/Microsoft)
    XOAuth2,
    /// `OAUTHBEARER` - RFC 7628 `OAuth2`
    OAuthBearer,
}

impl AuthMechanism {
    /// Parses an authentication mechanism name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PLAIN" => Some(Self::Plain),
            "LOGIN" => Some(Self::Login),
            "XOAUTH2" => Some(Self::XOAuth2),
            "OAUTHBEARER" => Some(Self::OAuthBearer),
            _ => None,
        }
    }

    /// Returns the mechanism name as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plain => "PLAIN",
            Self::Login => "LOGIN",
            Self::XOAuth2 => "XOAUTH2",
            Self::OAuthBearer => "OAUTHBEARER",
        }
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
    fn parse_keywords() {
        assert_eq!(Extension::parse("starttls"), Extension::StartTls);
        assert_eq!(Extension::parse("CHUNKING"), Extension::Chunking);
        assert_eq!(Extension::parse("8BITMIME"), Extension::EightBitMime);
        assert_eq!(Extension::parse("DSN"), Extension::Dsn);
        assert!(matches!(Extension::parse(""), Extension::Unknown(_)));
        assert_eq!(
            Extension::parse("X-CUSTOM 1"),
            Extension::Unknown("X-CUSTOM 1".to_string())
        );
    }

    #[test]
    fn parse_auth_skips_unknown_mechanisms() {
        assert_eq!(
            Extension::parse("AUTH PLAIN CRAM-MD5 login XOAUTH2"),
            Extension::Auth(vec![
                AuthMechanism::Plain,
                AuthMechanism::Login,
                AuthMechanism::XOAuth2
            ])
        );
    }

    #[test]
    fn parse_size() {
        assert_eq!(Extension::parse("SIZE 52428800"), Extension::Size(Some(52_428_800)));
        assert_eq!(Extension::parse("SIZE"), Extension::Size(None));
    }
}
