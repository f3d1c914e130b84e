//! Charset identification and transcoding to UTF-8.

use std::fmt;

/// Character sets the engine transcodes natively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Charset {
    /// UTF-8.
    Utf8,
    /// US-ASCII.
    UsAscii,
    /// ISO-8859-1 and its common aliases.
    Latin1,
    /// windows-1252, Latin-1 with printable characters in 0x80..=0x9F.
    Windows1252,
    /// TIS-620 (Thai), including ISO-8859-11 and windows-874.
    Tis620,
    /// Any other declared charset, kept by name.
    Other(String),
}

impl Charset {
    /// Identifies a charset label, ignoring case and surrounding quotes.
    #[must_use]
    pub fn parse(label: &str) -> Self {
        let name = label.trim().trim_matches('"').to_ascii_lowercase();
        match name.as_str() {
            "" | "utf-8" | "utf8" => Self::Utf8,
            "us-ascii" | "ascii" => Self::UsAscii,
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "latin-1" | "l1" => {
                Self::Latin1
            }
            "windows-1252" | "cp1252" | "x-cp1252" => Self::Windows1252,
            "tis-620" | "tis620" | "iso-8859-11" | "iso8859-11" | "windows-874" | "cp874" => {
                Self::Tis620
            }
            _ => Self::Other(name),
        }
    }

    /// Returns the canonical label.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Utf8 => "utf-8",
            Self::UsAscii => "us-ascii",
            Self::Latin1 => "iso-8859-1",
            Self::Windows1252 => "windows-1252",
            Self::Tis620 => "tis-620",
            Self::Other(name) => name,
        }
    }

    /// Returns true when bytes in this charset can be passed through as UTF-8.
    #[must_use]
    pub fn is_utf8_compatible(&self) -> bool {
        matches!(self, Self::Utf8 | Self::UsAscii)
    }

    /// Transcodes bytes to UTF-8.
    ///
    /// Unknown charsets are decoded as UTF-8 with replacement characters.
    #[must_use]
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Latin1 => latin1_to_utf8(bytes),
            Self::Windows1252 => cp1252_to_utf8(bytes),
            Self::Tis620 => tis620_to_utf8(bytes),
            Self::Utf8 | Self::UsAscii | Self::Other(_) => {
                String::from_utf8_lossy(bytes).into_owned()
            }
        }
    }
}

impl fmt::Display for Charset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Caller-supplied charset decoding.
///
/// Consulted before the built-in transcoders; returning `None` falls back
/// to them.
pub trait CharsetDecoder {
    /// Decodes `bytes` declared as `charset`.
    fn decode(&self, charset: &str, bytes: &[u8]) -> Option<String>;
}

impl<F> CharsetDecoder for F
where
    F: Fn(&str, &[u8]) -> Option<String>,
{
    fn decode(&self, charset: &str, bytes: &[u8]) -> Option<String> {
        self(charset, bytes)
    }
}

/// Decodes bytes declared as `charset`, trying `custom` first.
#[must_use]
pub fn decode_with(charset: &str, bytes: &[u8], custom: Option<&dyn CharsetDecoder>) -> String {
    if let Some(text) = custom.and_then(|d| d.decode(charset, bytes)) {
        return text;
    }
    Charset::parse(charset).decode(bytes)
}

/// ISO-8859-1 to UTF-8. Every byte is its own code point.
#[must_use]
pub fn latin1_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().copied().map(char::from).collect()
}

/// windows-1252 to UTF-8.
///
/// Same as ISO-8859-1 outside 0x80..=0x9F; the five unassigned bytes in
/// that range become U+FFFD.
#[must_use]
pub fn cp1252_to_utf8(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&byte| match byte {
            0x80..=0x9F => CP1252_EXTRAS[usize::from(byte - 0x80)],
            _ => char::from(byte),
        })
        .collect()
}

const CP1252_EXTRAS: [char; 32] = [
    '\u{20AC}', '\u{FFFD}', '\u{201A}', '\u{0192}', '\u{201E}', '\u{2026}', '\u{2020}', '\u{2021}',
    '\u{02C6}', '\u{2030}', '\u{0160}', '\u{2039}', '\u{0152}', '\u{FFFD}', '\u{017D}', '\u{FFFD}',
    '\u{FFFD}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{2022}', '\u{2013}', '\u{2014}',
    '\u{02DC}', '\u{2122}', '\u{0161}', '\u{203A}', '\u{0153}', '\u{FFFD}', '\u{017E}', '\u{0178}',
];

/// TIS-620 to UTF-8.
///
/// 0xA1..=0xFB map onto the Thai block (U+0E01..U+0E5B) at a fixed
/// offset; the windows-874 punctuation in 0x80..=0x9F is honored; holes in
/// the code page become U+FFFD.
#[must_use]
pub fn tis620_to_utf8(bytes: &[u8]) -> String {
    bytes.iter().copied().map(tis620_char).collect()
}

fn tis620_char(byte: u8) -> char {
    match byte {
        0x00..=0x7F => char::from(byte),
        0x80 => '\u{20AC}',
        0x85 => '\u{2026}',
        0x91 => '\u{2018}',
        0x92 => '\u{2019}',
        0x93 => '\u{201C}',
        0x94 => '\u{201D}',
        0x95 => '\u{2022}',
        0x96 => '\u{2013}',
        0x97 => '\u{2014}',
        0xA0 => '\u{00A0}',
        0xA1..=0xDA | 0xDF..=0xFB => {
            char::from_u32(0x0E00 + u32::from(byte - 0xA0)).unwrap_or(char::REPLACEMENT_CHARACTER)
        }
        _ => char::REPLACEMENT_CHARACTER,
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
    fn test_parse_aliases() {
        assert_eq!(Charset::parse("\"ISO-8859-1\""), Charset::Latin1);
        assert_eq!(Charset::parse("UTF8"), Charset::Utf8);
        assert_eq!(Charset::parse("windows-874"), Charset::Tis620);
        assert_eq!(Charset::parse("CP1252"), Charset::Windows1252);
        assert_eq!(
            Charset::parse("KOI8-R"),
            Charset::Other("koi8-r".to_string())
        );
    }

    #[test]
    fn test_latin1_e_acute() {
        let text = latin1_to_utf8(&[0xE9]);
        assert_eq!(text, "é");
        assert_eq!(text.as_bytes(), &[0xC3, 0xA9]);
    }

    #[test]
    fn test_cp1252_extras() {
        let text = Charset::parse("windows-1252").decode(b"\x80 5 \x93quoted\x94 \x85 caf\xe9");
        assert_eq!(text, "\u{20AC} 5 \u{201C}quoted\u{201D} \u{2026} caf\u{e9}");
        assert_eq!(cp1252_to_utf8(&[0x81, 0x9F]), "\u{FFFD}\u{178}");
        assert_eq!(latin1_to_utf8(&[0x80]), "\u{80}");
    }

    #[test]
    fn test_tis620_thai() {
        // "สวัสดี"
        let bytes = [0xCA, 0xC7, 0xD1, 0xCA, 0xB4, 0xD5];
        assert_eq!(tis620_to_utf8(&bytes), "สวัสดี");
        assert_eq!(tis620_to_utf8(&[0xDF]), "฿");
        assert_eq!(tis620_to_utf8(&[0xDB]), "\u{FFFD}");
    }

    #[test]
    fn test_unknown_charset_lossy() {
        assert_eq!(Charset::parse("x-unknown").decode(b"ok\xFF"), "ok\u{FFFD}");
    }

    #[test]
    fn test_custom_decoder_takes_precedence() {
        let upper = |charset: &str, bytes: &[u8]| {
            (charset == "x-upper").then(|| String::from_utf8_lossy(bytes).to_uppercase())
        };
        assert_eq!(decode_with("x-upper", b"abc", Some(&upper)), "ABC");
        assert_eq!(decode_with("iso-8859-1", &[0xE9], Some(&upper)), "é");
    }
}
