//! Streaming part encoders.

use embermail_codec::base64::Base64Encoder;
use embermail_codec::quoted_printable::QuotedPrintableEncoder;
use embermail_codec::TransferEncoding;

/// Turns part content into wire bytes chunk by chunk.
#[derive(Debug)]
pub(crate) struct PartEncoder {
    kind: Kind,
    lines: Option<LineNormalizer>,
}

#[derive(Debug)]
enum Kind {
    Base64(Base64Encoder),
    QuotedPrintable(QuotedPrintableEncoder),
    Raw,
}

impl PartEncoder {
    pub fn new(encoding: TransferEncoding) -> Self {
        let kind = match encoding {
            TransferEncoding::Base64 => Kind::Base64(Base64Encoder::new()),
            TransferEncoding::QuotedPrintable => Kind::QuotedPrintable(QuotedPrintableEncoder::new()),
            TransferEncoding::SevenBit | TransferEncoding::EightBit | TransferEncoding::Binary => {
                Kind::Raw
            }
        };
        Self { kind, lines: None }
    }

    /// Encoder for content that is already in its wire form.
    pub const fn passthrough() -> Self {
        Self {
            kind: Kind::Raw,
            lines: None,
        }
    }

    /// Rewrites line endings to CRLF before encoding.
    #[must_use]
    pub const fn text(mut self) -> Self {
        self.lines = Some(LineNormalizer::new());
        self
    }

    pub fn update(&mut self, data: &[u8]) -> Vec<u8> {
        match &mut self.lines {
            Some(lines) => {
                let normalized = lines.update(data);
                self.kind.update(&normalized)
            }
            None => self.kind.update(data),
        }
    }

    pub fn finish(&mut self) -> Vec<u8> {
        let mut out = match &mut self.lines {
            Some(lines) => {
                let rest = lines.finish();
                self.kind.update(&rest)
            }
            None => Vec::new(),
        };
        out.extend(self.kind.finish());
        out
    }
}

impl Kind {
    fn update(&mut self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Base64(encoder) => encoder.update(data).into_bytes(),
            Self::QuotedPrintable(encoder) => encoder.update(data).into_bytes(),
            Self::Raw => data.to_vec(),
        }
    }

    fn finish(&mut self) -> Vec<u8> {
        match self {
            Self::Base64(encoder) => encoder.finish().into_bytes(),
            Self::QuotedPrintable(encoder) => encoder.finish().into_bytes(),
            Self::Raw => Vec::new(),
        }
    }
}

/// Rewrites lone CR and lone LF as CRLF across chunk boundaries.
///
/// A CR at the end of a chunk is held back until the next byte shows
/// whether it starts a CRLF pair.
#[derive(Debug, Default)]
pub(crate) struct LineNormalizer {
    pending_cr: bool,
}

impl LineNormalizer {
    pub const fn new() -> Self {
        Self { pending_cr: false }
    }

    pub fn update(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(data.len() + data.len() / 32 + 2);
        for &byte in data {
            match byte {
                b'\n' => {
                    self.pending_cr = false;
                    out.extend_from_slice(b"\r\n");
                }
                b'\r' => {
                    if self.pending_cr {
                        out.extend_from_slice(b"\r\n");
                    }
                    self.pending_cr = true;
                }
                byte => {
                    if self.pending_cr {
                        self.pending_cr = false;
                        out.extend_from_slice(b"\r\n");
                    }
                    out.push(byte);
                }
            }
        }
        out
    }

    pub fn finish(&mut self) -> Vec<u8> {
        if std::mem::take(&mut self.pending_cr) {
            b"\r\n".to_vec()
        } else {
            Vec::new()
        }
    }
}

/// Quotes a header parameter value, RFC 2047 encoding non-ASCII text.
pub(crate) fn quoted_param(value: &str) -> String {
    let encoded = embermail_codec::rfc2047::encode(value);
    format!("\"{}\"", encoded.replace('\\', "\\\\").replace('"', "\\\""))
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

    fn normalize(chunks: &[&[u8]]) -> Vec<u8> {
        let mut lines = LineNormalizer::new();
        let mut out: Vec<u8> = chunks.iter().flat_map(|c| lines.update(c)).collect();
        out.extend(lines.finish());
        out
    }

    #[test]
    fn test_normalize_line_endings() {
        assert_eq!(normalize(&[b"a\nb\r\nc\rd"]), b"a\r\nb\r\nc\r\nd");
        assert_eq!(normalize(&[b"\n\n"]), b"\r\n\r\n");
        assert_eq!(normalize(&[b"\r\n\r"]), b"\r\n\r\n");
        assert_eq!(normalize(&[b"\r\r"]), b"\r\n\r\n");
        assert_eq!(normalize(&[b""]), b"");
    }

    #[test]
    fn test_crlf_split_across_chunks() {
        assert_eq!(normalize(&[b"one\r", b"\ntwo\r", b"three"]), b"one\r\ntwo\r\nthree");
        assert_eq!(normalize(&[b"end\r"]), b"end\r\n");
    }

    #[test]
    fn test_text_encoder_normalizes_before_encoding() {
        let mut encoder = PartEncoder::new(TransferEncoding::QuotedPrintable).text();
        let mut out = encoder.update(b"caf\xc3\xa9\r");
        out.extend(encoder.update(b"\nnext"));
        out.extend(encoder.finish());
        assert_eq!(String::from_utf8(out).unwrap(), "caf=C3=A9\r\nnext");
    }

    #[test]
    fn test_base64_part_encoder_wraps() {
        let mut encoder = PartEncoder::new(TransferEncoding::Base64);
        let mut out = encoder.update(&[0u8; 60]);
        out.extend(encoder.update(&[0u8; 60]));
        out.extend(encoder.finish());
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.split_terminator("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0].len(), 76);
        assert!(text.ends_with("\r\n"));
    }

    #[test]
    fn test_raw_passthrough() {
        let mut encoder = PartEncoder::new(TransferEncoding::EightBit);
        assert_eq!(encoder.update("ü".as_bytes()), "ü".as_bytes());
        assert!(encoder.finish().is_empty());
    }

    #[test]
    fn test_quoted_param() {
        assert_eq!(quoted_param("report.pdf"), "\"report.pdf\"");
        assert_eq!(quoted_param("a\"b"), "\"a\\\"b\"");
        assert!(quoted_param("résumé.pdf").starts_with("\"=?UTF-8?B?"));
    }
}
