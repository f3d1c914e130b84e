//! The status object every engine operation leaves behind.

use std::fmt;

/// Error family, following the engine's error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Not an error.
    None,
    /// Refused, closed, timed out, TLS failure.
    Connection,
    /// Unexpected or rejected response, unsupported mechanism, wrong state.
    Protocol,
    /// Memory, storage readiness, file I/O.
    Resource,
    /// Bad configuration or input.
    Data,
}

/// Machine-readable outcome of the last operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// The operation succeeded.
    #[default]
    Ok,
    /// Transport I/O failed.
    IoError,
    /// TCP connection refused.
    ConnectionRefused,
    /// Server closed the connection.
    ConnectionClosed,
    /// No connection and none could be made.
    NotConnected,
    /// Read deadline expired.
    Timeout,
    /// TLS handshake or upgrade failed.
    TlsFailed,
    /// DNS lookup or reachability probe failed.
    HostUnreachable,
    /// Server sent something the engine could not use.
    UnexpectedResponse,
    /// Server rejected the command (IMAP `NO`, SMTP 5xx/4xx).
    CommandRejected,
    /// Server reported a syntax error (IMAP `BAD`).
    BadCommand,
    /// Credentials were rejected.
    AuthFailed,
    /// No usable authentication mechanism.
    AuthNotSupported,
    /// A required server extension is not advertised.
    CapabilityMissing,
    /// The operation needs a selected mailbox.
    NoMailboxSelected,
    /// The requested message does not exist.
    MessageNotFound,
    /// Free memory below the configured floor.
    OutOfMemory,
    /// Storage not mounted or absent.
    StorageNotReady,
    /// Storage read/write failed.
    FileIo,
    /// Input data was unusable (bad address, empty recipient list).
    InvalidData,
    /// Configuration was unusable.
    InvalidConfig,
}

impl StatusCode {
    /// Returns the error family.
    #[must_use]
    pub const fn category(self) -> ErrorCategory {
        match self {
            Self::Ok => ErrorCategory::None,
            Self::IoError
            | Self::ConnectionRefused
            | Self::ConnectionClosed
            | Self::NotConnected
            | Self::Timeout
            | Self::TlsFailed
            | Self::HostUnreachable => ErrorCategory::Connection,
            Self::UnexpectedResponse
            | Self::CommandRejected
            | Self::BadCommand
            | Self::AuthFailed
            | Self::AuthNotSupported
            | Self::CapabilityMissing
            | Self::NoMailboxSelected
            | Self::MessageNotFound => ErrorCategory::Protocol,
            Self::OutOfMemory | Self::StorageNotReady | Self::FileIo => ErrorCategory::Resource,
            Self::InvalidData | Self::InvalidConfig => ErrorCategory::Data,
        }
    }

    /// Returns true for [`StatusCode::Ok`].
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Status code plus human-readable reason.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Status {
    /// Outcome.
    pub code: StatusCode,
    /// Reason text (server text for rejections).
    pub text: String,
}

impl Status {
    /// A success status.
    #[must_use]
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            code: StatusCode::Ok,
            text: text.into(),
        }
    }

    /// A failure status.
    #[must_use]
    pub fn error(code: StatusCode, text: impl Into<String>) -> Self {
        Self {
            code,
            text: text.into(),
        }
    }

    /// Returns true if the status reports success.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        self.code.is_ok()
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.text.is_empty() {
            write!(f, "{:?}", self.code)
        } else {
            write!(f, "{:?}: {}", self.code, self.text)
        }
    }
}
