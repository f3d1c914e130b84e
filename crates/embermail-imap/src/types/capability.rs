//! Server capabilities.

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// IDLE command support (RFC 2177)
    Idle,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// MOVE extension (RFC 6851)
    Move,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// STARTTLS support
    StartTls,
    /// LOGIN disabled
    LoginDisabled,
    /// SASL initial response (RFC 4959)
    SaslIr,
    /// QUOTA extension (RFC 2087)
    Quota,
    /// ACL extension (RFC 4314)
    Acl,
    /// AUTH mechanism
    Auth(String),
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IDLE" => Self::Idle,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "LITERAL+" => Self::LiteralPlus,
            "STARTTLS" => Self::StartTls,
            "LOGINDISABLED" => Self::LoginDisabled,
            "SASL-IR" => Self::SaslIr,
            "QUOTA" => Self::Quota,
            "ACL" => Self::Acl,
            _ if upper.starts_with("AUTH=") => Self::Auth(upper[5..].to_string()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Idle => write!(f, "IDLE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::Quota => write!(f, "QUOTA"),
            Self::Acl => write!(f, "ACL"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The capability set most recently advertised by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    caps: Vec<Capability>,
}

impl Capabilities {
    /// Parses a space-separated capability list.
    #[must_use]
    pub fn parse(list: &str) -> Self {
        Self {
            caps: list.split_whitespace().map(Capability::parse).collect(),
        }
    }

    /// Returns true if `cap` is advertised.
    #[must_use]
    pub fn has(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Returns true if `AUTH=<mechanism>` is advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: &str) -> bool {
        self.caps
            .iter()
            .any(|c| matches!(c, Capability::Auth(m) if m.eq_ignore_ascii_case(mechanism)))
    }

    /// Returns true if nothing has been learned yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.caps.is_empty()
    }

    /// Returns an iterator over the capabilities.
    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.caps.iter()
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
    fn test_parse_set() {
        let caps = Capabilities::parse("IMAP4rev1 IDLE AUTH=PLAIN auth=xoauth2 SASL-IR X-GM-EXT-1");
        assert!(caps.has(&Capability::Idle));
        assert!(caps.has(&Capability::SaslIr));
        assert!(caps.has_auth("XOAUTH2"));
        assert!(caps.has_auth("plain"));
        assert!(!caps.has_auth("LOGIN"));
        assert!(caps.has(&Capability::Unknown("X-GM-EXT-1".into())));
    }

    #[test]
    fn test_display_round_trip() {
        for s in ["IMAP4rev1", "LITERAL+", "AUTH=PLAIN", "QUOTA"] {
            assert_eq!(Capability::parse(s).to_string(), s);
        }
    }
}
