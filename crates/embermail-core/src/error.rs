//! Error types for transport, storage and resource failures.

use std::time::Duration;

use thiserror::Error;

use crate::status::StatusCode;

/// Errors raised below the protocol layer.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error on the transport.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The server refused the TCP connection.
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The peer closed the connection.
    #[error("connection closed by server")]
    ConnectionClosed,

    /// An operation needed an open connection and there was none.
    #[error("not connected")]
    NotConnected,

    /// A read or write did not complete before its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(Duration),

    /// TLS setup failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// The host could not be resolved or reached.
    #[error("host unreachable: {0}")]
    Unreachable(String),

    /// A protocol line exceeded the configured maximum.
    #[error("line exceeds {0} bytes")]
    LineTooLong(usize),

    /// Storage is not mounted or not configured.
    #[error("storage not ready")]
    StorageNotReady,

    /// A storage read or write failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Free heap fell under the configured floor.
    #[error("low memory: {available} bytes free, {required} required")]
    OutOfMemory {
        /// Bytes reported free.
        available: usize,
        /// Configured minimum.
        required: usize,
    },

    /// A reconnect was attempted too soon after the previous one.
    #[error("reconnect suppressed for another {0:?}")]
    ReconnectCooldown(Duration),

    /// Session configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl Error {
    /// Maps the error to its status code.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Io(_) => StatusCode::IoError,
            Self::ConnectionRefused(_) => StatusCode::ConnectionRefused,
            Self::ConnectionClosed => StatusCode::ConnectionClosed,
            Self::NotConnected | Self::ReconnectCooldown(_) => StatusCode::NotConnected,
            Self::Timeout(_) => StatusCode::Timeout,
            Self::Tls(_) => StatusCode::TlsFailed,
            Self::Unreachable(_) => StatusCode::HostUnreachable,
            Self::LineTooLong(_) => StatusCode::UnexpectedResponse,
            Self::StorageNotReady => StatusCode::StorageNotReady,
            Self::Storage(_) => StatusCode::FileIo,
            Self::OutOfMemory { .. } => StatusCode::OutOfMemory,
            Self::Config(_) => StatusCode::InvalidConfig,
        }
    }

    /// Returns true if the connection is gone after this error.
    #[must_use]
    pub const fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::ConnectionClosed
                | Self::NotConnected
                | Self::Timeout(_)
                | Self::Tls(_)
                | Self::LineTooLong(_)
        )
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

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
    use crate::status::ErrorCategory;

    #[test]
    fn test_timeout_is_connection_error() {
        let err = Error::Timeout(Duration::from_secs(5));
        assert_eq!(err.status_code(), StatusCode::Timeout);
        assert_eq!(err.status_code().category(), ErrorCategory::Connection);
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_storage_is_resource_error() {
        let err = Error::Storage("disk full".to_string());
        assert_eq!(err.status_code().category(), ErrorCategory::Resource);
        assert!(!err.is_disconnect());
        assert_eq!(err.to_string(), "storage error: disk full");
    }
}
