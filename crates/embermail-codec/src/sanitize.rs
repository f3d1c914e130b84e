//! 7bit and 8bit "encodings" (RFC 2045 §2.7, §2.8).
//!
//! Neither is a transformation on the wire, but mail in the wild violates
//! both. The sanitizer drops NUL bytes, drops high-bit bytes for 7bit
//! content, truncates lines longer than [`MAX_LINE_OCTETS`], and then runs
//! a Quoted-Printable pass over the result to resolve stray `=XX` escapes.

use crate::quoted_printable::QuotedPrintableDecoder;

/// Maximum octets per line, excluding CRLF.
pub const MAX_LINE_OCTETS: usize = 998;

/// Which of the two identity encodings is being cleaned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 7bit: US-ASCII only.
    SevenBit,
    /// 8bit: octets above 127 allowed.
    EightBit,
}

/// Streaming sanitizer.
#[derive(Debug)]
pub struct Sanitizer {
    mode: Mode,
    column: usize,
    qp: QuotedPrintableDecoder,
}

impl Sanitizer {
    /// Creates a sanitizer for the given mode.
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            column: 0,
            qp: QuotedPrintableDecoder::new(),
        }
    }

    /// Cleans one chunk. Line length is tracked across chunks.
    pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut clean = Vec::with_capacity(chunk.len());
        for &byte in chunk {
            match byte {
                0 => {}
                b'\n' => {
                    self.column = 0;
                    clean.push(byte);
                }
                b'\r' => clean.push(byte),
                0x80.. if self.mode == Mode::SevenBit => {}
                _ => {
                    if self.column < MAX_LINE_OCTETS {
                        clean.push(byte);
                    }
                    self.column += 1;
                }
            }
        }
        self.qp.update(&clean)
    }

    /// Flushes any escape held back at the end of the input.
    pub fn finish(&mut self) -> Vec<u8> {
        self.qp.finish()
    }
}

/// Sanitizes 7bit content in one call.
#[must_use]
pub fn seven_bit(data: &[u8]) -> Vec<u8> {
    let mut sanitizer = Sanitizer::new(Mode::SevenBit);
    let mut out = sanitizer.update(data);
    out.extend(sanitizer.finish());
    out
}

/// Sanitizes 8bit content in one call.
#[must_use]
pub fn eight_bit(data: &[u8]) -> Vec<u8> {
    let mut sanitizer = Sanitizer::new(Mode::EightBit);
    let mut out = sanitizer.update(data);
    out.extend(sanitizer.finish());
    out
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
    fn test_seven_bit_strips_nul_and_high_bit() {
        assert_eq!(seven_bit(b"a\0b\xE9c"), b"abc");
    }

    #[test]
    fn test_eight_bit_keeps_high_bit() {
        assert_eq!(eight_bit(b"a\0b\xE9c"), b"ab\xE9c");
    }

    #[test]
    fn test_residual_escapes_are_decoded() {
        assert_eq!(seven_bit(b"caf=C3=A9"), "café".as_bytes());
        assert_eq!(seven_bit(b"50=50 odds =ZZ"), b"50P odds =ZZ");
    }

    #[test]
    fn test_overlong_line_truncated() {
        let mut data = vec![b'a'; MAX_LINE_OCTETS + 10];
        data.extend_from_slice(b"\r\nok");
        let out = seven_bit(&data);
        let mut expected = vec![b'a'; MAX_LINE_OCTETS];
        expected.extend_from_slice(b"\r\nok");
        assert_eq!(out, expected);
    }

    #[test]
    fn test_column_tracked_across_chunks() {
        let mut sanitizer = Sanitizer::new(Mode::EightBit);
        let mut out = Vec::new();
        for _ in 0..10 {
            out.extend(sanitizer.update(&[b'x'; 100]));
        }
        out.extend(sanitizer.finish());
        assert_eq!(out.len(), MAX_LINE_OCTETS);
    }
}
