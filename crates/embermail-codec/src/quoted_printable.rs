//! Quoted-Printable content transfer encoding (RFC 2045 §6.7).

/// Visible columns per encoded line, excluding the soft-break `=`.
pub const MAX_COLUMNS: usize = 73;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Encodes bytes as Quoted-Printable.
///
/// CRLF pairs in the input are kept as hard line breaks. Every other byte
/// outside printable ASCII, the `=` sign, and whitespace that would end a
/// line are written as `=XX`. Lines longer than [`MAX_COLUMNS`] are split
/// with a soft break (`=\r\n`).
#[must_use]
pub fn encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() + data.len() / 8);
    let mut column = 0;
    let mut i = 0;

    while i < data.len() {
        let byte = data[i];
        if byte == b'\r' && data.get(i + 1) == Some(&b'\n') {
            out.push_str("\r\n");
            column = 0;
            i += 2;
            continue;
        }

        let line_ends = i + 1 == data.len() || data[i + 1..].starts_with(b"\r\n");
        let literal = match byte {
            b' ' | b'\t' => !line_ends,
            b'=' => false,
            b'!'..=b'~' => true,
            _ => false,
        };
        let width = if literal { 1 } else { 3 };

        if column + width > MAX_COLUMNS {
            out.push_str("=\r\n");
            column = 0;
        }
        if literal {
            out.push(char::from(byte));
        } else {
            out.push('=');
            out.push(char::from(HEX[usize::from(byte >> 4)]));
            out.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
        column += width;
        i += 1;
    }

    out
}

/// Longest line held back by [`QuotedPrintableEncoder`] before it is
/// flushed with a soft break.
const HELD_LINE: usize = 4096;

/// Streaming Quoted-Printable encoder.
///
/// Input is held until a CRLF completes the line, so the output matches
/// [`encode`] over the whole input as long as no line exceeds 4 KiB.
#[derive(Debug, Default)]
pub struct QuotedPrintableEncoder {
    line: Vec<u8>,
}

impl QuotedPrintableEncoder {
    /// Creates an encoder with no held input.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds input and returns the encoding of every line it completed.
    pub fn update(&mut self, data: &[u8]) -> String {
        let mut out = String::new();
        for &byte in data {
            self.line.push(byte);
            if self.line.ends_with(b"\r\n") {
                out.push_str(&encode(&self.line));
                self.line.clear();
            } else if self.line.len() >= HELD_LINE && byte != b'\r' {
                out.push_str(&encode(&self.line));
                out.push_str("=\r\n");
                self.line.clear();
            }
        }
        out
    }

    /// Encodes whatever is left of the last line.
    pub fn finish(&mut self) -> String {
        let out = encode(&self.line);
        self.line.clear();
        out
    }
}

/// Decodes Quoted-Printable data in one call.
#[must_use]
pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut decoder = QuotedPrintableDecoder::new();
    let mut out = decoder.update(data);
    out.extend(decoder.finish());
    out
}

/// Streaming Quoted-Printable decoder.
///
/// An escape cut by a chunk boundary (`=`, `=X`, or `=\r`) is held back
/// until the next chunk arrives.
#[derive(Debug, Default)]
pub struct QuotedPrintableDecoder {
    pending: Vec<u8>,
}

impl QuotedPrintableDecoder {
    /// Creates a decoder with no held-back bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a chunk.
    pub fn update(&mut self, chunk: &[u8]) -> Vec<u8> {
        let joined;
        let input: &[u8] = if self.pending.is_empty() {
            chunk
        } else {
            let mut buf = std::mem::take(&mut self.pending);
            buf.extend_from_slice(chunk);
            joined = buf;
            &joined
        };

        let mut out = Vec::with_capacity(input.len());
        let mut i = 0;
        while i < input.len() {
            if input[i] != b'=' {
                out.push(input[i]);
                i += 1;
                continue;
            }
            match &input[i + 1..] {
                [] | [b'\r'] => {
                    self.pending = input[i..].to_vec();
                    break;
                }
                [h] if h.is_ascii_hexdigit() => {
                    self.pending = input[i..].to_vec();
                    break;
                }
                [b'\r', b'\n', ..] => i += 3,
                [b'\n', ..] => i += 2,
                [h, l, ..] if h.is_ascii_hexdigit() && l.is_ascii_hexdigit() => {
                    out.push((hex_value(*h) << 4) | hex_value(*l));
                    i += 3;
                }
                _ => {
                    out.push(b'=');
                    i += 1;
                }
            }
        }
        out
    }

    /// Returns any held-back bytes literally.
    pub fn finish(&mut self) -> Vec<u8> {
        let rest = std::mem::take(&mut self.pending);
        if rest == b"=\r" {
            return Vec::new();
        }
        rest
    }
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
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
    use proptest::prelude::*;

    #[test]
    fn test_encode_plain_ascii_untouched() {
        assert_eq!(encode(b"Hello, World!"), "Hello, World!");
    }

    #[test]
    fn test_encode_utf8() {
        assert_eq!(encode("Héllo".as_bytes()), "H=C3=A9llo");
    }

    #[test]
    fn test_encode_escapes_equals_and_trailing_space() {
        assert_eq!(encode(b"a=b \r\nc\t"), "a=3Db=20\r\nc=09");
    }

    #[test]
    fn test_encode_soft_breaks() {
        let data = vec![b'x'; 200];
        let encoded = encode(&data);
        for line in encoded.split("\r\n") {
            assert!(line.len() <= MAX_COLUMNS + 1);
        }
        assert!(encoded.contains("=\r\n"));
    }

    #[test]
    fn test_decode_escapes_and_soft_breaks() {
        assert_eq!(decode(b"H=C3=A9llo"), "Héllo".as_bytes());
        assert_eq!(decode(b"Hello=\r\nWorld"), b"HelloWorld");
        assert_eq!(decode(b"Hello=\nWorld"), b"HelloWorld");
        assert_eq!(decode(b"line one\r\nline two"), b"line one\r\nline two");
    }

    #[test]
    fn test_encoder_matches_one_shot() {
        let text = "Grüße aus Köln =\r\n\r\nline with trailing space \r\n".repeat(20);
        let mut encoder = QuotedPrintableEncoder::new();
        let mut out = String::new();
        for chunk in text.as_bytes().chunks(7) {
            out.push_str(&encoder.update(chunk));
        }
        out.push_str(&encoder.finish());
        assert_eq!(out, encode(text.as_bytes()));
    }

    #[test]
    fn test_encoder_flushes_endless_line() {
        let mut encoder = QuotedPrintableEncoder::new();
        let mut out = encoder.update(&vec![b'a'; 10_000]);
        out.push_str(&encoder.finish());
        assert_eq!(decode(out.as_bytes()), vec![b'a'; 10_000]);
    }

    #[test]
    fn test_decode_lowercase_hex() {
        assert_eq!(decode(b"a=3db"), b"a=b");
    }

    #[test]
    fn test_decode_invalid_escape_passes_through() {
        assert_eq!(decode(b"100=% sure =ZZ"), b"100=% sure =ZZ");
        assert_eq!(decode(b"trailing ="), b"trailing =");
    }

    #[test]
    fn test_decoder_escape_split_across_chunks() {
        let mut decoder = QuotedPrintableDecoder::new();
        let mut out = decoder.update(b"caf=");
        out.extend(decoder.update(b"C"));
        out.extend(decoder.update(b"3=A9 ok=\r"));
        out.extend(decoder.update(b"\nnext"));
        out.extend(decoder.finish());
        assert_eq!(out, "café oknext".as_bytes());
    }

    proptest! {
        #[test]
        fn prop_round_trip(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            prop_assert_eq!(decode(encode(&data).as_bytes()), data);
        }

        #[test]
        fn prop_round_trip_text_with_breaks(lines in proptest::collection::vec("[ -~]{0,150}", 1..6)) {
            let text = lines.join("\r\n");
            let encoded = encode(text.as_bytes());
            for line in encoded.split("\r\n") {
                prop_assert!(line.len() <= MAX_COLUMNS + 1);
            }
            prop_assert_eq!(decode(encoded.as_bytes()), text.into_bytes());
        }
    }
}
