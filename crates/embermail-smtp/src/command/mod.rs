//! SMTP command builder.

use crate::types::{Address, AuthMechanism};

/// `BODY=` parameter of `MAIL FROM` (RFC 6152).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    /// 7-bit content.
    SevenBit,
    /// 8-bit MIME content.
    EightBitMime,
}

impl BodyType {
    /// Returns the parameter value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7BIT",
            Self::EightBitMime => "8BITMIME",
        }
    }
}

/// `NOTIFY=` parameter of `RCPT TO` (RFC 3461).
///
/// All flags off means `NOTIFY=NEVER`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DsnNotify {
    /// Report successful delivery.
    pub success: bool,
    /// Report failed delivery.
    pub failure: bool,
    /// Report delayed delivery.
    pub delay: bool,
}

impl DsnNotify {
    /// Failure and delay reports, the usual choice.
    pub const FAILURE_AND_DELAY: Self = Self {
        success: false,
        failure: true,
        delay: true,
    };

    /// Returns the parameter value.
    #[must_use]
    pub fn value(self) -> String {
        let flags: Vec<&str> = [
            (self.success, "SUCCESS"),
            (self.failure, "FAILURE"),
            (self.delay, "DELAY"),
        ]
        .into_iter()
        .filter_map(|(on, name)| on.then_some(name))
        .collect();
        if flags.is_empty() {
            "NEVER".to_string()
        } else {
            flags.join(",")
        }
    }
}

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address
        from: Address,
        /// BODY parameter
        body: Option<BodyType>,
        /// SIZE parameter
        size: Option<u64>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
        /// NOTIFY parameter
        notify: Option<DsnNotify>,
    },
    /// DATA - Begin message data
    Data,
    /// BDAT - Announce a chunk of `size` octets
    Bdat {
        /// Octets following the command line
        size: usize,
        /// Final chunk
        last: bool,
    },
    /// RSET - Reset transaction
    Rset,
    /// NOOP - No operation
    Noop,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response,
            } => match initial_response {
                Some(resp) => format!("AUTH {} {resp}", mechanism.as_str()),
                None => format!("AUTH {}", mechanism.as_str()),
            },
            Self::MailFrom { from, body, size } => {
                let mut line = format!("MAIL FROM:<{from}>");
                if let Some(body) = body {
                    line.push_str(" BODY=");
                    line.push_str(body.as_str());
                }
                if let Some(size) = size {
                    line.push_str(&format!(" SIZE={size}"));
                }
                line
            }
            Self::RcptTo { to, notify } => match notify {
                Some(notify) => format!("RCPT TO:<{to}> NOTIFY={}", notify.value()),
                None => format!("RCPT TO:<{to}>"),
            },
            Self::Data => "DATA".to_string(),
            Self::Bdat { size, last: true } => format!("BDAT {size} LAST"),
            Self::Bdat { size, last: false } => format!("BDAT {size}"),
            Self::Rset => "RSET".to_string(),
            Self::Noop => "NOOP".to_string(),
            Self::Quit => "QUIT".to_string(),
        };
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Returns true if the command line carries credentials.
    #[must_use]
    pub const fn is_sensitive(&self) -> bool {
        matches!(self, Self::Auth { .. })
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

    fn addr(s: &str) -> Address {
        Address::new(s).unwrap()
    }

    #[test]
    fn test_greetings() {
        let ehlo = Command::Ehlo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(ehlo.serialize(), b"EHLO client.example.com\r\n");
        let helo = Command::Helo {
            hostname: "client.example.com".to_string(),
        };
        assert_eq!(helo.serialize(), b"HELO client.example.com\r\n");
    }

    #[test]
    fn test_auth() {
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Plain,
            initial_response: Some("AHVzZXIAcGFzcw==".to_string()),
        };
        assert_eq!(cmd.serialize(), b"AUTH PLAIN AHVzZXIAcGFzcw==\r\n");
        assert!(cmd.is_sensitive());
        let cmd = Command::Auth {
            mechanism: AuthMechanism::Login,
            initial_response: None,
        };
        assert_eq!(cmd.serialize(), b"AUTH LOGIN\r\n");
    }

    #[test]
    fn test_mail_from() {
        let cmd = Command::MailFrom {
            from: addr("sender@example.com"),
            body: None,
            size: None,
        };
        assert_eq!(cmd.serialize(), b"MAIL FROM:<sender@example.com>\r\n");
        let cmd = Command::MailFrom {
            from: addr("sender@example.com"),
            body: Some(BodyType::EightBitMime),
            size: Some(12345),
        };
        assert_eq!(
            cmd.serialize(),
            b"MAIL FROM:<sender@example.com> BODY=8BITMIME SIZE=12345\r\n"
        );
    }

    #[test]
    fn test_rcpt_to_with_notify() {
        let cmd = Command::RcptTo {
            to: addr("rcpt@example.com"),
            notify: Some(DsnNotify::FAILURE_AND_DELAY),
        };
        assert_eq!(
            cmd.serialize(),
            b"RCPT TO:<rcpt@example.com> NOTIFY=FAILURE,DELAY\r\n"
        );
        assert_eq!(DsnNotify::default().value(), "NEVER");
    }

    #[test]
    fn test_bdat() {
        assert_eq!(Command::Bdat { size: 512, last: false }.serialize(), b"BDAT 512\r\n");
        assert_eq!(Command::Bdat { size: 0, last: true }.serialize(), b"BDAT 0 LAST\r\n");
    }

    #[test]
    fn test_bare_commands() {
        assert_eq!(Command::Data.serialize(), b"DATA\r\n");
        assert_eq!(Command::Rset.serialize(), b"RSET\r\n");
        assert_eq!(Command::Noop.serialize(), b"NOOP\r\n");
        assert_eq!(Command::Quit.serialize(), b"QUIT\r\n");
        assert_eq!(Command::StartTls.serialize(), b"STARTTLS\r\n");
    }
}
