//! Per-session send options.

use serde::{Deserialize, Serialize};

/// Default `BDAT` chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// How message bodies are transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SendOptions {
    /// Use `BDAT` when the server advertises `CHUNKING`.
    pub chunking: bool,
    /// Octets per `BDAT` frame.
    pub chunk_size: usize,
    /// Declare `BODY=8BITMIME` for 8-bit content when advertised.
    pub use_8bitmime: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            chunking: true,
            chunk_size: DEFAULT_CHUNK_SIZE,
            use_8bitmime: true,
        }
    }
}

impl SendOptions {
    /// Always uses `DATA`.
    #[must_use]
    pub const fn without_chunking(mut self) -> Self {
        self.chunking = false;
        self
    }

    /// Sets the `BDAT` frame size.
    #[must_use]
    pub const fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size;
        self
    }
}

/// Outcome of a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReport {
    /// Message bytes transferred, before dot-stuffing.
    pub bytes: u64,
    /// Recipients the server accepted.
    pub recipients: usize,
    /// `BDAT` frames sent, including `BDAT 0 LAST`; 0 for `DATA`.
    pub chunks: usize,
    /// Text of the server's final reply.
    pub response: String,
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
    fn test_partial_json_uses_defaults() {
        let options: SendOptions = serde_json::from_str(r#"{"chunk_size": 512}"#).unwrap();
        assert_eq!(options.chunk_size, 512);
        assert!(options.chunking);
        assert!(options.use_8bitmime);
    }
}
