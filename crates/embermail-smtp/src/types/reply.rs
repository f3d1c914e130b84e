//! Server replies: the three-digit code, its text lines and the optional
//! RFC 3463 enhanced status that leads the first line.

use std::fmt;

use crate::error::{Error, Result};

/// What the first digit of a reply code says about the command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyClass {
    /// 2xx, the command was carried out.
    Completed,
    /// 3xx, the server waits for more input.
    Intermediate,
    /// 4xx, try again later.
    Transient,
    /// 5xx, do not retry as is.
    Permanent,
    /// Anything outside 200..=599.
    Unknown,
}

/// A three-digit reply code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ReplyCode(u16);

impl ReplyCode {
    /// 220, greeting.
    pub const SERVICE_READY: Self = Self(220);
    /// 221, answer to `QUIT`.
    pub const CLOSING: Self = Self(221);
    /// 235, authenticated.
    pub const AUTH_SUCCESS: Self = Self(235);
    /// 250, done.
    pub const OK: Self = Self(250);
    /// 334, SASL challenge.
    pub const AUTH_CONTINUE: Self = Self(334);
    /// 354, go ahead with `DATA`.
    pub const START_DATA: Self = Self(354);
    /// 421, the server is closing the connection.
    pub const SERVICE_UNAVAILABLE: Self = Self(421);
    /// 502, unknown command.
    pub const NOT_IMPLEMENTED: Self = Self(502);
    /// 535, credentials refused.
    pub const AUTH_FAILED: Self = Self(535);
    /// 550, mailbox unavailable.
    pub const MAILBOX_UNAVAILABLE: Self = Self(550);

    /// Wraps a numeric code.
    #[must_use]
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    /// The numeric code.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Class from the first digit.
    #[must_use]
    pub const fn class(self) -> ReplyClass {
        match self.0 / 100 {
            2 => ReplyClass::Completed,
            3 => ReplyClass::Intermediate,
            4 => ReplyClass::Transient,
            5 => ReplyClass::Permanent,
            _ => ReplyClass::Unknown,
        }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self.class(), ReplyClass::Completed)
    }

    /// 3xx.
    #[must_use]
    pub const fn is_intermediate(self) -> bool {
        matches!(self.class(), ReplyClass::Intermediate)
    }

    /// 4xx.
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(self.class(), ReplyClass::Transient)
    }

    /// 5xx.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self.class(), ReplyClass::Permanent)
    }
}

impl fmt::Display for ReplyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

/// An enhanced status code such as `5.1.1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnhancedStatus {
    /// 2, 4 or 5.
    pub class: u8,
    /// Subject, e.g. 1 for addressing.
    pub subject: u16,
    /// Detail within the subject.
    pub detail: u16,
}

impl EnhancedStatus {
    /// Reads `class.subject.detail` from the start of `text`.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let token = text.split_whitespace().next()?;
        let mut fields = token.splitn(3, '.');
        let class: u8 = fields.next()?.parse().ok()?;
        let subject = fields.next()?.parse().ok()?;
        let detail = fields.next()?.parse().ok()?;
        matches!(class, 2 | 4 | 5).then_some(Self {
            class,
            subject,
            detail,
        })
    }
}

impl fmt::Display for EnhancedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}

/// A complete, possibly multi-line, reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Code shared by every line.
    pub code: ReplyCode,
    /// Text of each line after the code and separator.
    pub lines: Vec<String>,
}

impl Reply {
    /// Builds a reply from its parts.
    #[must_use]
    pub const fn new(code: ReplyCode, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Lines joined with `\n`.
    #[must_use]
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Enhanced status leading the first line, if the server sent one.
    #[must_use]
    pub fn enhanced(&self) -> Option<EnhancedStatus> {
        self.lines.first().and_then(|line| EnhancedStatus::parse(line))
    }

    /// Passes the reply through when it carries `code`.
    ///
    /// # Errors
    ///
    /// Any other code becomes [`Error::Smtp`].
    pub fn require(self, code: ReplyCode) -> Result<Self> {
        if self.code == code {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// Passes a 2xx reply through.
    ///
    /// # Errors
    ///
    /// Any other class becomes [`Error::Smtp`].
    pub fn success(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(self.into_error())
        }
    }

    /// [`Error::Smtp`] with this reply's code and text.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::smtp_error(self.code.as_u16(), self.text())
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

    fn reply(code: u16, lines: &[&str]) -> Reply {
        Reply::new(
            ReplyCode::new(code),
            lines.iter().map(ToString::to_string).collect(),
        )
    }

    #[test]
    fn test_code_classes() {
        assert_eq!(ReplyCode::OK.class(), ReplyClass::Completed);
        assert!(ReplyCode::START_DATA.is_intermediate());
        assert!(ReplyCode::SERVICE_UNAVAILABLE.is_transient());
        assert!(ReplyCode::AUTH_FAILED.is_permanent());
        assert_eq!(ReplyCode::new(199).class(), ReplyClass::Unknown);
        assert!(!ReplyCode::new(600).is_permanent());
        assert_eq!(ReplyCode::new(354).to_string(), "354");
    }

    #[test]
    fn test_require_and_success() {
        let go = reply(354, &["go ahead"]);
        assert!(go.clone().require(ReplyCode::START_DATA).is_ok());
        let err = go.success().unwrap_err();
        assert!(matches!(err, Error::Smtp { code: 354, .. }));

        let greeting = reply(220, &["smtp.example.com ESMTP", "Ready"]);
        assert_eq!(greeting.text(), "smtp.example.com ESMTP\nReady");
    }

    #[test]
    fn test_enhanced_status() {
        let rejected = reply(550, &["5.1.1 <nobody@example.com>: user unknown"]);
        let status = rejected.enhanced().unwrap();
        assert_eq!((status.class, status.subject, status.detail), (5, 1, 1));
        assert_eq!(status.to_string(), "5.1.1");

        assert!(reply(250, &["OK"]).enhanced().is_none());
        assert!(reply(250, &["1.2.3 odd"]).enhanced().is_none());
        assert!(reply(250, &["2.0.0"]).enhanced().is_some());
        assert!(reply(250, &[]).enhanced().is_none());
    }
}
