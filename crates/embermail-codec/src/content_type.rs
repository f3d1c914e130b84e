//! `Content-Type` and `Content-Disposition` values and their parameters.

use crate::charset::Charset;
use crate::rfc2047;
use std::collections::HashMap;
use std::fmt;

/// MIME content type with parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentType {
    /// Main type (e.g., "text", "image", "multipart").
    pub main_type: String,
    /// Subtype (e.g., "plain", "html", "jpeg").
    pub sub_type: String,
    /// Parameters keyed by lowercase name, values fully decoded.
    pub parameters: HashMap<String, String>,
}

impl Default for ContentType {
    fn default() -> Self {
        Self::new("text", "plain")
    }
}

impl ContentType {
    /// Creates a new content type.
    #[must_use]
    pub fn new(main_type: impl Into<String>, sub_type: impl Into<String>) -> Self {
        Self {
            main_type: main_type.into(),
            sub_type: sub_type.into(),
            parameters: HashMap::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns a parameter by (case-insensitive) name.
    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Returns the charset parameter if present.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns the boundary parameter if present.
    #[must_use]
    pub fn boundary(&self) -> Option<&str> {
        self.parameter("boundary")
    }

    /// Returns the `name` parameter if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.parameter("name")
    }

    /// Returns `main/sub`.
    #[must_use]
    pub fn mime_type(&self) -> String {
        format!("{}/{}", self.main_type, self.sub_type)
    }

    /// Checks the type and subtype, ignoring case.
    #[must_use]
    pub fn is(&self, main_type: &str, sub_type: &str) -> bool {
        self.main_type.eq_ignore_ascii_case(main_type)
            && self.sub_type.eq_ignore_ascii_case(sub_type)
    }

    /// Checks if this is a multipart content type.
    #[must_use]
    pub fn is_multipart(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("multipart")
    }

    /// Checks if this is a text content type.
    #[must_use]
    pub fn is_text(&self) -> bool {
        self.main_type.eq_ignore_ascii_case("text")
    }

    /// Checks for `message/rfc822`.
    #[must_use]
    pub fn is_rfc822(&self) -> bool {
        self.is("message", "rfc822")
    }

    /// Parses a content type value.
    ///
    /// A missing or malformed `type/subtype` falls back to `text/plain`
    /// while still keeping any parameters that parsed.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let (head, params) = value.split_once(';').unwrap_or((value, ""));
        let mut content_type = match head.trim().split_once('/') {
            Some((main, sub)) if !main.trim().is_empty() && !sub.trim().is_empty() => Self::new(
                main.trim().to_ascii_lowercase(),
                sub.trim().to_ascii_lowercase(),
            ),
            _ => Self::default(),
        };
        content_type.parameters = parse_parameters(params);
        content_type
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.main_type, self.sub_type)?;
        let mut keys: Vec<_> = self.parameters.keys().collect();
        keys.sort();
        for key in keys {
            write!(f, "; {key}=\"{}\"", self.parameters[key])?;
        }
        Ok(())
    }
}

/// Disposition type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispositionKind {
    /// No `Content-Disposition` header.
    #[default]
    None,
    /// `inline`.
    Inline,
    /// `attachment`.
    Attachment,
}

impl DispositionKind {
    /// Returns the header token.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "",
            Self::Inline => "inline",
            Self::Attachment => "attachment",
        }
    }
}

/// Parsed `Content-Disposition` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentDisposition {
    /// Disposition type.
    pub kind: DispositionKind,
    /// Parameters keyed by lowercase name.
    pub parameters: HashMap<String, String>,
}

impl ContentDisposition {
    /// Parses a disposition value. Unknown types are treated as attachments.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let (head, params) = value.split_once(';').unwrap_or((value, ""));
        let kind = match head.trim().to_ascii_lowercase().as_str() {
            "" => DispositionKind::None,
            "inline" => DispositionKind::Inline,
            _ => DispositionKind::Attachment,
        };
        Self {
            kind,
            parameters: parse_parameters(params),
        }
    }

    /// Returns the `filename` parameter.
    #[must_use]
    pub fn filename(&self) -> Option<&str> {
        self.parameters.get("filename").map(String::as_str)
    }

    /// Returns the `size` parameter (RFC 2183) in octets.
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        self.parameters.get("size")?.trim().parse().ok()
    }
}

/// Parses a `; key=value; key="quoted"` parameter list.
///
/// RFC 2231 extended parameters (`name*=utf-8''a%20b`) and continuations
/// (`name*0=...; name*1*=...`) are reassembled and decoded; plain values
/// carrying RFC 2047 encoded words are decoded too. Keys are lowercased.
#[must_use]
pub fn parse_parameters(list: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    // (name) -> [(index, extended, raw value)]
    let mut sections: HashMap<String, Vec<(usize, bool, String)>> = HashMap::new();

    for (key, value) in split_parameters(list) {
        let key = key.to_ascii_lowercase();
        let (name, extended) = match key.strip_suffix('*') {
            Some(stripped) => (stripped.to_string(), true),
            None => (key.clone(), false),
        };
        if let Some((base, index)) = name.rsplit_once('*')
            && let Ok(index) = index.parse::<usize>()
        {
            sections
                .entry(base.to_string())
                .or_default()
                .push((index, extended, value));
            continue;
        }
        if extended {
            params.insert(name, decode_extended_value(&value));
        } else {
            params.entry(name).or_insert_with(|| decode_plain(&value));
        }
    }

    for (name, mut parts) in sections {
        parts.sort_by_key(|(index, _, _)| *index);
        let charset = parts
            .first()
            .filter(|(_, extended, _)| *extended)
            .and_then(|(_, _, v)| v.split_once('\'').map(|(c, _)| c.to_string()))
            .unwrap_or_default();
        let mut bytes = Vec::new();
        for (index, extended, value) in &parts {
            if *extended {
                let encoded = if *index == 0 {
                    value.splitn(3, '\'').nth(2).unwrap_or(value)
                } else {
                    value
                };
                bytes.extend(percent_decode(encoded));
            } else {
                bytes.extend_from_slice(value.as_bytes());
            }
        }
        let decoded = if charset.is_empty() {
            String::from_utf8_lossy(&bytes).into_owned()
        } else {
            Charset::parse(&charset).decode(&bytes)
        };
        params.insert(name, decoded);
    }

    params
}

fn decode_plain(value: &str) -> String {
    if value.contains("=?") {
        rfc2047::decode(value)
    } else {
        value.to_string()
    }
}

/// Splits a parameter list into raw `(key, value)` pairs.
///
/// Quoted values may contain `;` and backslash escapes.
fn split_parameters(list: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut chars = list.chars().peekable();

    loop {
        while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ';') {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c == ';' {
                break;
            }
            key.push(c);
            chars.next();
        }
        if key.trim().is_empty() && chars.peek().is_none() {
            break;
        }
        if chars.next_if_eq(&'=').is_none() {
            continue;
        }
        while chars.next_if(|c| *c == ' ' || *c == '\t').is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '"' => break,
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    _ => value.push(c),
                }
            }
            while chars.next_if(|c| *c != ';').is_some() {}
        } else {
            while let Some(c) = chars.next_if(|c| *c != ';') {
                value.push(c);
            }
            value = value.trim().to_string();
        }

        let key = key.trim();
        if !key.is_empty() {
            pairs.push((key.to_string(), value));
        }
    }

    pairs
}

/// Decodes `%XX` escapes. Malformed escapes are kept literally.
#[must_use]
pub fn percent_decode(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
        {
            out.push((hex_value(bytes[i + 1]) << 4) | hex_value(bytes[i + 2]));
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    out
}

const fn hex_value(b: u8) -> u8 {
    match b {
        b'0'..=b'9' => b - b'0',
        b'a'..=b'f' => b - b'a' + 10,
        b'A'..=b'F' => b - b'A' + 10,
        _ => 0,
    }
}

/// Decodes an RFC 5987 `charset'language'percent-encoded` value.
///
/// A value without the two quote delimiters is percent-decoded as UTF-8.
#[must_use]
pub fn decode_extended_value(value: &str) -> String {
    let mut pieces = value.splitn(3, '\'');
    match (pieces.next(), pieces.next(), pieces.next()) {
        (Some(charset), Some(_language), Some(encoded)) => {
            Charset::parse(charset).decode(&percent_decode(encoded))
        }
        _ => String::from_utf8_lossy(&percent_decode(value)).into_owned(),
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
    fn test_parse_simple() {
        let ct = ContentType::parse("text/plain");
        assert_eq!(ct.main_type, "text");
        assert_eq!(ct.sub_type, "plain");
        assert!(ct.parameters.is_empty());
    }

    #[test]
    fn test_parse_with_params() {
        let ct = ContentType::parse("Text/HTML; Charset=\"ISO-8859-1\"; format=flowed");
        assert!(ct.is("text", "html"));
        assert_eq!(ct.charset(), Some("ISO-8859-1"));
        assert_eq!(ct.parameter("FORMAT"), Some("flowed"));
    }

    #[test]
    fn test_parse_multipart_boundary_with_semicolon() {
        let ct = ContentType::parse("multipart/mixed; boundary=\"a;b=c\"");
        assert!(ct.is_multipart());
        assert_eq!(ct.boundary(), Some("a;b=c"));
    }

    #[test]
    fn test_parse_malformed_falls_back() {
        let ct = ContentType::parse("garbage; name=x.bin");
        assert!(ct.is("text", "plain"));
        assert_eq!(ct.name(), Some("x.bin"));
    }

    #[test]
    fn test_disposition_filename_and_size() {
        let cd = ContentDisposition::parse("attachment; filename=\"report 1.pdf\"; size=2048");
        assert_eq!(cd.kind, DispositionKind::Attachment);
        assert_eq!(cd.filename(), Some("report 1.pdf"));
        assert_eq!(cd.size(), Some(2048));
    }

    #[test]
    fn test_disposition_inline() {
        let cd = ContentDisposition::parse("INLINE");
        assert_eq!(cd.kind, DispositionKind::Inline);
        assert_eq!(cd.filename(), None);
    }

    #[test]
    fn test_rfc5987_extended_parameter() {
        let cd = ContentDisposition::parse("attachment; filename*=UTF-8''na%C3%AFve%20file.txt");
        assert_eq!(cd.filename(), Some("naïve file.txt"));
    }

    #[test]
    fn test_rfc2231_continuations() {
        let cd = ContentDisposition::parse(
            "attachment; filename*0*=iso-8859-1'fr'r%E9sum; filename*1=\"e final\"; filename*2*=%2Epdf",
        );
        assert_eq!(cd.filename(), Some("résume final.pdf"));
    }

    #[test]
    fn test_rfc2047_in_plain_parameter() {
        let ct = ContentType::parse("image/png; name=\"=?utf-8?B?w6lsw6k=?=.png\"");
        assert_eq!(ct.name(), Some("élé.png"));
    }

    #[test]
    fn test_percent_decode_malformed() {
        assert_eq!(percent_decode("100%"), b"100%");
        assert_eq!(percent_decode("%zz%41"), b"%zzA");
    }

    #[test]
    fn test_decode_extended_value() {
        assert_eq!(decode_extended_value("iso-8859-1'en'%A3%20rates"), "£ rates");
        assert_eq!(decode_extended_value("plain%20text"), "plain text");
    }

    #[test]
    fn test_display() {
        let ct = ContentType::new("text", "plain").with_parameter("charset", "utf-8");
        assert_eq!(ct.to_string(), "text/plain; charset=\"utf-8\"");
    }
}
