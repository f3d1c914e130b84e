//! Base64 content transfer encoding (RFC 2045 §6.8).
//!
//! Encoding emits CRLF-terminated lines of [`LINE_LENGTH`] characters.
//! Decoding skips anything outside the alphabet and carries an incomplete
//! 4-character group over to the next chunk, so the input may be split at
//! any byte position.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::STANDARD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};

/// Encoded characters per line.
pub const LINE_LENGTH: usize = 76;

/// Raw bytes that encode to exactly one full line.
pub const LINE_INPUT: usize = LINE_LENGTH / 4 * 3;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Encodes data as a single unwrapped Base64 string.
#[must_use]
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Encodes data as CRLF-terminated 76-column lines.
#[must_use]
pub fn encode_wrapped(data: &[u8]) -> String {
    let mut encoder = Base64Encoder::new();
    let mut out = encoder.update(data);
    out.push_str(&encoder.finish());
    out
}

/// Decodes Base64 data, ignoring whitespace and stray characters.
#[must_use]
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = Base64Decoder::new();
    let mut out = decoder.update(data);
    out.extend(decoder.finish());
    out
}

/// Incremental line-wrapping Base64 encoder.
///
/// Input is buffered until a full line's worth ([`LINE_INPUT`] bytes) is
/// available, so at most 56 bytes are held between calls.
#[derive(Debug, Default)]
pub struct Base64Encoder {
    pending: Vec<u8>,
}

impl Base64Encoder {
    /// Creates an encoder with no buffered input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds input and returns every complete line it produced.
    pub fn update(&mut self, data: &[u8]) -> String {
        self.pending.extend_from_slice(data);
        let whole = self.pending.len() / LINE_INPUT * LINE_INPUT;
        let mut out = String::with_capacity(whole / LINE_INPUT * (LINE_LENGTH + 2));
        for line in self.pending[..whole].chunks(LINE_INPUT) {
            STANDARD.encode_string(line, &mut out);
            out.push_str("\r\n");
        }
        self.pending.drain(..whole);
        out
    }

    /// Flushes the final (possibly short, padded) line.
    pub fn finish(&mut self) -> String {
        if self.pending.is_empty() {
            return String::new();
        }
        let mut out = STANDARD.encode(&self.pending);
        out.push_str("\r\n");
        self.pending.clear();
        out
    }

    /// Returns the number of buffered input bytes.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Incremental Base64 decoder with fragment carry.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    carry: Vec<u8>,
}

impl Base64Decoder {
    /// Creates a decoder with no carried characters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes every complete group in `carry + chunk`.
    ///
    /// Trailing characters that do not complete a 4-character group are kept
    /// and prepended to the next chunk.
    pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        let mut quads = std::mem::take(&mut self.carry);
        quads.extend(chunk.iter().copied().filter(|b| is_alphabet(*b)));
        let whole = quads.len() / 4 * 4;
        let out = decode_groups(&quads[..whole]);
        quads.drain(..whole);
        self.carry = quads;
        out
    }

    /// Decodes whatever is left once the input has ended.
    ///
    /// An unpadded 2 or 3 character tail still yields its bytes; a single
    /// dangling character cannot encode a byte and is dropped.
    pub fn finish(&mut self) -> Vec<u8> {
        let mut rest = std::mem::take(&mut self.carry);
        if rest.len() < 2 {
            return Vec::new();
        }
        while rest.len() % 4 != 0 {
            rest.push(b'=');
        }
        decode_groups(&rest)
    }

    /// Returns the number of carried characters.
    #[must_use]
    pub fn carried(&self) -> usize {
        self.carry.len()
    }
}

const fn is_alphabet(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'=')
}

fn decode_groups(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 4 * 3);
    if data.is_empty() || LENIENT.decode_vec(data, &mut out).is_ok() {
        return out;
    }

    // Padding in the middle of the run (concatenated encodings) or a bad
    // group: decode group by group and drop the groups that fail.
    out.clear();
    for group in data.chunks_exact(4) {
        let mut buf = [0u8; 3];
        if let Ok(n) = LENIENT.decode_slice(group, &mut buf) {
            out.extend_from_slice(&buf[..n]);
        }
    }
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
    use proptest::prelude::*;

    #[test]
    fn test_encode_decode() {
        let encoded = encode(b"Hello, World!");
        assert_eq!(encoded, "SGVsbG8sIFdvcmxkIQ==");
        assert_eq!(decode(encoded.as_bytes()), b"Hello, World!");
    }

    #[test]
    fn test_wrapped_line_length() {
        let data = vec![0xA5u8; 200];
        let encoded = encode_wrapped(&data);
        let lines: Vec<&str> = encoded.split("\r\n").collect();
        // 200 bytes = 3 full lines of 57 + 29 bytes, then the trailing empty split
        assert_eq!(lines.len(), 5);
        assert!(lines[..3].iter().all(|l| l.len() == LINE_LENGTH));
        assert_eq!(lines[3].len(), 40);
        assert_eq!(lines[4], "");
    }

    #[test]
    fn test_encoder_streaming_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let mut encoder = Base64Encoder::new();
        let mut streamed = String::new();
        for chunk in data.chunks(13) {
            streamed.push_str(&encoder.update(chunk));
            assert!(encoder.pending() < LINE_INPUT);
        }
        streamed.push_str(&encoder.finish());
        assert_eq!(streamed, encode_wrapped(&data));
    }

    #[test]
    fn test_decoder_carries_partial_group() {
        let mut decoder = Base64Decoder::new();
        let first = decoder.update(b"SGVsb");
        assert_eq!(first, b"Hel");
        assert_eq!(decoder.carried(), 1);
        let second = decoder.update(b"G8=");
        assert_eq!(second, b"lo");
        assert_eq!(decoder.carried(), 0);
    }

    #[test]
    fn test_decoder_ignores_line_breaks_and_junk() {
        assert_eq!(decode(b"SGVs\r\nbG8s\r\n IFdv cmxk\tIQ=="), b"Hello, World!");
        assert_eq!(decode(b"SGVs*bG8="), b"Hello");
    }

    #[test]
    fn test_decoder_unpadded_tail() {
        assert_eq!(decode(b"SGk"), b"Hi");
        assert_eq!(decode(b"S"), b"");
    }

    #[test]
    fn test_decoder_concatenated_segments() {
        // "A" and "BCD" encoded separately and glued together
        assert_eq!(decode(b"QQ==QkNE"), b"ABCD");
    }

    proptest! {
        #[test]
        fn prop_round_trip_any_split(data in proptest::collection::vec(any::<u8>(), 0..600), split in 1usize..97) {
            let encoded = encode_wrapped(&data);
            let mut decoder = Base64Decoder::new();
            let mut out = Vec::new();
            for chunk in encoded.as_bytes().chunks(split) {
                out.extend(decoder.update(chunk));
            }
            out.extend(decoder.finish());
            prop_assert_eq!(out, data);
        }
    }
}
