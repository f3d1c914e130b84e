//! Error types for the IMAP engine.

use embermail_core::StatusCode;
use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Transport, storage or resource failure.
    #[error(transparent)]
    Core(#[from] embermail_core::Error),

    /// Server returned NO.
    #[error("server returned NO: {0}")]
    No(String),

    /// Server returned BAD.
    #[error("server returned BAD: {0}")]
    Bad(String),

    /// Server sent BYE (disconnecting).
    #[error("server sent BYE: {0}")]
    Bye(String),

    /// Protocol violation or unexpected data.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Credentials were rejected.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// No mechanism fits the configured credentials.
    #[error("no supported authentication mechanism")]
    AuthNotSupported,

    /// The server advertises LOGINDISABLED and no SASL mechanism fits.
    #[error("plaintext LOGIN is disabled by the server")]
    LoginDisabled,

    /// The operation needs a selected mailbox.
    #[error("no mailbox selected")]
    NoMailboxSelected,

    /// The requested message does not exist.
    #[error("message {0} not found")]
    MessageNotFound(u32),

    /// The server lacks a required capability.
    #[error("server does not advertise {0}")]
    CapabilityMissing(&'static str),

    /// IDLE was misused (not idling, or already idling).
    #[error("IDLE: {0}")]
    Idle(&'static str),
}

impl Error {
    /// Maps the error to its status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Core(e) => e.status_code(),
            Self::No(_) => StatusCode::CommandRejected,
            Self::Bad(_) => StatusCode::BadCommand,
            Self::Bye(_) => StatusCode::ConnectionClosed,
            Self::Protocol(_) | Self::Idle(_) => StatusCode::UnexpectedResponse,
            Self::AuthFailed(_) => StatusCode::AuthFailed,
            Self::AuthNotSupported | Self::LoginDisabled => StatusCode::AuthNotSupported,
            Self::NoMailboxSelected => StatusCode::NoMailboxSelected,
            Self::MessageNotFound(_) => StatusCode::MessageNotFound,
            Self::CapabilityMissing(_) => StatusCode::CapabilityMissing,
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
