//! Error types for SMTP operations.

use embermail_core::StatusCode;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, Error>;

/// SMTP error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport, storage or resource failure.
    #[error(transparent)]
    Core(#[from] embermail_core::Error),

    /// Server returned an error reply.
    #[error("SMTP error {code}: {message}")]
    Smtp {
        /// Reply code (e.g., 550).
        code: u16,
        /// Error message from server.
        message: String,
    },

    /// Protocol error (unexpected or malformed reply).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid email address.
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No advertised mechanism fits the configured credentials.
    #[error("no supported authentication mechanism")]
    AuthNotSupported,

    /// The server lacks a required extension.
    #[error("server does not support {0}")]
    CapabilityMissing(&'static str),

    /// The message has no recipients.
    #[error("message has no recipients")]
    NoRecipients,

    /// A recipient was refused.
    #[error("recipient {address} rejected: {code} {message}")]
    RecipientRejected {
        /// The refused address.
        address: String,
        /// Reply code.
        code: u16,
        /// Server text.
        message: String,
    },

    /// Message exceeds the size the server advertised.
    #[error("message of {size} bytes exceeds server limit of {limit}")]
    MessageTooLarge {
        /// Composed size.
        size: u64,
        /// Advertised `SIZE`.
        limit: u64,
    },

    /// An attachment could not be read.
    #[error("attachment {0}")]
    Attachment(String),
}

impl Error {
    /// Creates an SMTP error from a reply code and message.
    #[must_use]
    pub fn smtp_error(code: u16, message: impl Into<String>) -> Self {
        Self::Smtp {
            code,
            message: message.into(),
        }
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        match self {
            Self::Smtp { code, .. } | Self::RecipientRejected { code, .. } => {
                *code >= 500 && *code < 600
            }
            _ => false,
        }
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Smtp { code, .. } | Self::RecipientRejected { code, .. } => {
                *code >= 400 && *code < 500
            }
            _ => false,
        }
    }

    /// Maps the error to its status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(e) => e.status_code(),
            Self::Smtp { code, .. } if *code >= 500 && *code < 503 => StatusCode::BadCommand,
            Self::Smtp { .. } | Self::RecipientRejected { .. } => StatusCode::CommandRejected,
            Self::Protocol(_) => StatusCode::UnexpectedResponse,
            Self::InvalidAddress(_) | Self::NoRecipients | Self::MessageTooLarge { .. } => {
                StatusCode::InvalidData
            }
            Self::AuthFailed(_) => StatusCode::AuthFailed,
            Self::AuthNotSupported => StatusCode::AuthNotSupported,
            Self::CapabilityMissing(_) => StatusCode::CapabilityMissing,
            Self::Attachment(_) => StatusCode::FileIo,
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
    fn test_reply_classes() {
        let err = Error::smtp_error(550, "mailbox unavailable");
        assert!(err.is_permanent());
        assert!(!err.is_transient());
        assert_eq!(err.status_code(), StatusCode::CommandRejected);
        assert_eq!(err.to_string(), "SMTP error 550: mailbox unavailable");

        let err = Error::smtp_error(451, "try later");
        assert!(err.is_transient());
        assert_eq!(Error::smtp_error(500, "what").status_code(), StatusCode::BadCommand);
    }

    #[test]
    fn test_core_errors_keep_their_code() {
        let err: Error = embermail_core::Error::ConnectionClosed.into();
        assert_eq!(err.status_code(), StatusCode::ConnectionClosed);
        assert!(!err.is_permanent());
    }
}
