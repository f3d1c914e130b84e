//! RFC 2047 encoded words in header values.
//!
//! Format: `=?charset?encoding?encoded-text?=`, where encoding is `B`
//! (Base64) or `Q` (a Quoted-Printable variant with `_` for space).

use crate::base64;
use crate::charset::{CharsetDecoder, decode_with as decode_charset};

/// Longest UTF-8 run packed into one encoded word.
const WORD_BYTES: usize = 45;

/// Encodes a header value if it contains anything beyond printable ASCII.
///
/// Long values are split into several `B` words separated by a space,
/// each starting on a UTF-8 character boundary.
#[must_use]
pub fn encode(text: &str) -> String {
    if text.bytes().all(|b| (b' '..=b'~').contains(&b)) && !text.contains("=?") {
        return text.to_string();
    }

    let mut words = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = (start + WORD_BYTES).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        words.push(format!(
            "=?UTF-8?B?{}?=",
            base64::encode(&text.as_bytes()[start..end])
        ));
        start = end;
    }
    words.join(" ")
}

/// Decodes every encoded word in a header value.
#[must_use]
pub fn decode(text: &str) -> String {
    decode_with(text, None)
}

/// Decodes encoded words, consulting `custom` for charsets first.
///
/// Whitespace between two adjacent encoded words is dropped, and adjacent
/// words in the same charset are joined before transcoding so a multi-byte
/// character split across words survives. Anything that does not parse as
/// an encoded word is copied through.
#[must_use]
pub fn decode_with(text: &str, custom: Option<&dyn CharsetDecoder>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut run: Option<(String, Vec<u8>)> = None;
    let mut gap = String::new();
    let mut rest = text;

    while !rest.is_empty() {
        if let Some((charset, bytes, consumed)) = parse_word(rest) {
            let same_charset = run
                .as_ref()
                .is_some_and(|(current, _)| current.eq_ignore_ascii_case(&charset));
            if same_charset {
                if let Some((_, buf)) = run.as_mut() {
                    buf.extend(bytes);
                }
            } else {
                flush(&mut out, run.take(), custom);
                run = Some((charset, bytes));
            }
            gap.clear();
            rest = &rest[consumed..];
            continue;
        }

        let Some(ch) = rest.chars().next() else {
            break;
        };
        if run.is_some() && ch.is_whitespace() {
            gap.push(ch);
        } else {
            flush(&mut out, run.take(), custom);
            out.push_str(&gap);
            gap.clear();
            out.push(ch);
        }
        rest = &rest[ch.len_utf8()..];
    }

    flush(&mut out, run, custom);
    out.push_str(&gap);
    out
}

fn flush(out: &mut String, run: Option<(String, Vec<u8>)>, custom: Option<&dyn CharsetDecoder>) {
    if let Some((charset, bytes)) = run {
        out.push_str(&decode_charset(&charset, &bytes, custom));
    }
}

/// Parses one encoded word at the start of `text`.
///
/// Returns the charset (RFC 2231 language suffix removed), the decoded
/// bytes, and the number of input bytes consumed.
fn parse_word(text: &str) -> Option<(String, Vec<u8>, usize)> {
    let body = text.strip_prefix("=?")?;
    let (charset, body) = body.split_once('?')?;
    let (encoding, body) = body.split_once('?')?;
    let end = body.find("?=")?;
    let payload = &body[..end];
    if charset.is_empty() || payload.contains(char::is_whitespace) {
        return None;
    }

    let bytes = match encoding {
        "B" | "b" => base64::decode(payload.as_bytes()),
        "Q" | "q" => decode_q(payload.as_bytes()),
        _ => return None,
    };
    let consumed = 2 + charset.len() + 1 + encoding.len() + 1 + end + 2;
    let charset = charset.split('*').next().unwrap_or(charset).to_string();
    Some((charset, bytes, consumed))
}

fn decode_q(payload: &[u8]) -> Vec<u8> {
    let underscored: Vec<u8> = payload
        .iter()
        .map(|&b| if b == b'_' { b' ' } else { b })
        .collect();
    crate::quoted_printable::decode(&underscored)
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
    fn test_encode_ascii_untouched() {
        assert_eq!(encode("Hello"), "Hello");
    }

    #[test]
    fn test_encode_round_trip() {
        let subject = "Température élevée au capteur numéro sept, vérifier immédiatement";
        let encoded = encode(subject);
        assert!(encoded.starts_with("=?UTF-8?B?"));
        assert!(encoded.contains("?= =?UTF-8?B?"));
        assert_eq!(decode(&encoded), subject);
    }

    #[test]
    fn test_decode_plain_passthrough() {
        assert_eq!(decode("Hello World"), "Hello World");
        assert_eq!(decode("price =? unknown"), "price =? unknown");
    }

    #[test]
    fn test_decode_base64_word() {
        assert_eq!(decode("=?utf-8?B?SMOpbGxv?="), "Héllo");
    }

    #[test]
    fn test_decode_q_word() {
        assert_eq!(decode("=?utf-8?Q?H=C3=A9llo_there?="), "Héllo there");
    }

    #[test]
    fn test_decode_latin1_word() {
        assert_eq!(decode("=?ISO-8859-1?Q?caf=E9?="), "café");
    }

    #[test]
    fn test_decode_mixed_text_and_words() {
        assert_eq!(
            decode("Re: =?utf-8?Q?caf=C3=A9?= and =?utf-8?B?dGg=?= more"),
            "Re: café and th more"
        );
    }

    #[test]
    fn test_adjacent_words_drop_whitespace() {
        assert_eq!(decode("=?utf-8?Q?a?= =?utf-8?Q?b?=\r\n =?utf-8?Q?c?="), "abc");
    }

    #[test]
    fn test_multibyte_split_across_words() {
        // "é" is C3 A9; each word carries one byte
        assert_eq!(decode("=?utf-8?Q?=C3?= =?utf-8?Q?=A9?="), "é");
    }

    #[test]
    fn test_language_suffix_ignored() {
        assert_eq!(decode("=?iso-8859-1*fr?Q?=E9t=E9?="), "été");
    }

    #[test]
    fn test_unknown_encoding_passthrough() {
        assert_eq!(decode("=?utf-8?X?abc?="), "=?utf-8?X?abc?=");
    }
}
