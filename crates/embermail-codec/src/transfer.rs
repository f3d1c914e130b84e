//! Content-Transfer-Encoding and the streaming decoder that dispatches on it.

use crate::base64::Base64Decoder;
use crate::quoted_printable::QuotedPrintableDecoder;
use crate::sanitize::{Mode, Sanitizer};
use std::fmt;

/// Transfer encoding types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TransferEncoding {
    /// 7-bit ASCII.
    #[default]
    SevenBit,
    /// 8-bit text.
    EightBit,
    /// Base64 encoding.
    Base64,
    /// Quoted-Printable encoding.
    QuotedPrintable,
    /// Binary (no encoding).
    Binary,
}

impl TransferEncoding {
    /// Parses transfer encoding from a header value.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "8bit" => Self::EightBit,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            "binary" => Self::Binary,
            _ => Self::SevenBit,
        }
    }

    /// Returns the header token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Binary => "binary",
        }
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Streaming decoder for a part body.
///
/// Feed the body in whatever chunks the transport delivers; state that
/// straddles a chunk boundary (a partial base64 group, a cut escape, the
/// current line length) is carried internally.
#[derive(Debug)]
pub struct ContentDecoder {
    inner: Inner,
}

#[derive(Debug)]
enum Inner {
    Base64(Base64Decoder),
    QuotedPrintable(QuotedPrintableDecoder),
    Sanitize(Sanitizer),
    Binary,
}

impl ContentDecoder {
    /// Creates a decoder for the given encoding.
    #[must_use]
    pub fn new(encoding: TransferEncoding) -> Self {
        let inner = match encoding {
            TransferEncoding::Base64 => Inner::Base64(Base64Decoder::new()),
            TransferEncoding::QuotedPrintable => {
                Inner::QuotedPrintable(QuotedPrintableDecoder::new())
            }
            TransferEncoding::SevenBit => Inner::Sanitize(Sanitizer::new(Mode::SevenBit)),
            TransferEncoding::EightBit => Inner::Sanitize(Sanitizer::new(Mode::EightBit)),
            TransferEncoding::Binary => Inner::Binary,
        };
        Self { inner }
    }

    /// Decodes one chunk.
    pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        match &mut self.inner {
            Inner::Base64(d) => d.update(chunk),
            Inner::QuotedPrintable(d) => d.update(chunk),
            Inner::Sanitize(d) => d.update(chunk),
            Inner::Binary => chunk.to_vec(),
        }
    }

    /// Flushes carried state at the end of the body.
    pub fn finish(&mut self) -> Vec<u8> {
        match &mut self.inner {
            Inner::Base64(d) => d.finish(),
            Inner::QuotedPrintable(d) => d.finish(),
            Inner::Sanitize(d) => d.finish(),
            Inner::Binary => Vec::new(),
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

    fn run(encoding: TransferEncoding, chunks: &[&[u8]]) -> Vec<u8> {
        let mut decoder = ContentDecoder::new(encoding);
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(decoder.update(chunk));
        }
        out.extend(decoder.finish());
        out
    }

    #[test]
    fn test_parse() {
        assert_eq!(TransferEncoding::parse("BASE64"), TransferEncoding::Base64);
        assert_eq!(
            TransferEncoding::parse(" Quoted-Printable "),
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(TransferEncoding::parse("x-uuencode"), TransferEncoding::SevenBit);
        assert_eq!(TransferEncoding::Binary.to_string(), "binary");
    }

    #[test]
    fn test_base64_lines_not_group_aligned() {
        let out = run(
            TransferEncoding::Base64,
            &[b"SGVsbG8s", b"IFd", b"vcmxkIQ", b"==\r\n"],
        );
        assert_eq!(out, b"Hello, World!");
    }

    #[test]
    fn test_quoted_printable() {
        assert_eq!(
            run(TransferEncoding::QuotedPrintable, &[b"caf=", b"C3=A9=\r\n!"]),
            "café!".as_bytes()
        );
    }

    #[test]
    fn test_seven_bit_sanitized() {
        assert_eq!(run(TransferEncoding::SevenBit, &[b"a\0b\xFFc"]), b"abc");
    }

    #[test]
    fn test_binary_passthrough() {
        assert_eq!(run(TransferEncoding::Binary, &[b"\0\xFF=41"]), b"\0\xFF=41");
    }
}
