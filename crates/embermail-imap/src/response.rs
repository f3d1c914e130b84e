//! Response line classification and token scanning.
//!
//! The engine keeps exactly one command outstanding, so parsing is
//! line-oriented: each line is classified as tagged, untagged or
//! continuation, and untagged data is tokenized only as far as the handler
//! for the current command needs.

/// Fixed tag prefixed to every command.
pub const TAG: &str = "EM";

/// Tagged completion status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
}

/// One classified response line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    /// `EM OK|NO|BAD [code] text`
    Tagged {
        /// Completion status.
        completion: Completion,
        /// Response code without brackets.
        code: Option<String>,
        /// Human-readable text.
        text: String,
    },
    /// `* ...` (the text after `* `).
    Untagged(String),
    /// `+ ...` (the text after `+`).
    Continuation(String),
    /// Anything else, including completions carrying another tag.
    Other(String),
}

impl Line {
    /// Classifies a raw line (CRLF already stripped).
    #[must_use]
    pub fn classify(raw: &[u8]) -> Self {
        let line = String::from_utf8_lossy(raw);
        if let Some(rest) = line.strip_prefix("* ") {
            return Self::Untagged(rest.to_string());
        }
        if let Some(rest) = line.strip_prefix('+') {
            return Self::Continuation(rest.trim_start().to_string());
        }
        if let Some(rest) = line.strip_prefix(TAG).and_then(|r| r.strip_prefix(' ')) {
            let (status, text) = rest.split_once(' ').unwrap_or((rest, ""));
            let completion = match status.to_ascii_uppercase().as_str() {
                "OK" => Completion::Ok,
                "NO" => Completion::No,
                "BAD" => Completion::Bad,
                _ => return Self::Other(line.into_owned()),
            };
            let (code, text) = split_code(text);
            return Self::Tagged {
                completion,
                code: code.map(str::to_string),
                text: text.to_string(),
            };
        }
        Self::Other(line.into_owned())
    }
}

/// Splits a leading `[CODE args]` off response text.
#[must_use]
pub fn split_code(text: &str) -> (Option<&str>, &str) {
    let text = text.trim_start();
    if let Some(rest) = text.strip_prefix('[')
        && let Some(end) = rest.find(']')
    {
        return (Some(&rest[..end]), rest[end + 1..].trim_start());
    }
    (None, text)
}

/// A generic token in untagged data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// Bare atom or number.
    Atom(String),
    /// Quoted string, unescaped.
    Quoted(String),
    /// Parenthesized list, inner text verbatim.
    List(String),
    /// `NIL`
    Nil,
}

impl Token {
    /// Returns the string content of atoms and quoted strings.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Atom(s) | Self::Quoted(s) => Some(s),
            Self::List(_) | Self::Nil => None,
        }
    }

    /// Returns the content as a string, NIL as empty.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Self::Atom(s) | Self::Quoted(s) | Self::List(s) => s.clone(),
            Self::Nil => String::new(),
        }
    }
}

/// Tokenizes untagged data into atoms, quoted strings, lists and NIL.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b' ' => i += 1,
            b'"' => {
                let (value, next) = read_quoted(input, i);
                tokens.push(Token::Quoted(value));
                i = next;
            }
            b'(' => {
                let end = matching_paren(bytes, i);
                tokens.push(Token::List(input[i + 1..end].to_string()));
                i = end + 1;
            }
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b' ')
                    .map_or(bytes.len(), |p| i + p);
                let atom = &input[i..end];
                tokens.push(if atom.eq_ignore_ascii_case("NIL") {
                    Token::Nil
                } else {
                    Token::Atom(atom.to_string())
                });
                i = end;
            }
        }
    }
    tokens
}

/// Reads a quoted string starting at `start` (the opening quote).
/// Returns the unescaped value and the index after the closing quote.
fn read_quoted(input: &str, start: usize) -> (String, usize) {
    let mut value = String::new();
    let mut chars = input[start + 1..].char_indices();
    while let Some((offset, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, escaped)) = chars.next() {
                    value.push(escaped);
                }
            }
            '"' => return (value, start + 1 + offset + 1),
            _ => value.push(c),
        }
    }
    (value, input.len())
}

/// Index of the parenthesis closing the one at `open`, or the input length
/// if it is never closed.
fn matching_paren(bytes: &[u8], open: usize) -> usize {
    let mut depth = 0usize;
    let mut in_quote = false;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' if in_quote => i += 1,
            b'"' => in_quote = !in_quote,
            b'(' if !in_quote => depth += 1,
            b')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

/// Value of one FETCH data item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemValue {
    /// Atom or number.
    Atom(String),
    /// Quoted string.
    Quoted(String),
    /// Parenthesized list, inner text verbatim.
    List(String),
    /// `NIL`
    Nil,
    /// `{n}`: the value is the next `n` octets on the wire.
    Literal(usize),
}

/// One `NAME value` pair from a FETCH response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchItem {
    /// Item name as sent, e.g. `UID` or `BODY[1.2.MIME]`.
    pub name: String,
    /// Item value.
    pub value: ItemValue,
}

impl FetchItem {
    /// Returns true if the name matches `name` ignoring case.
    #[must_use]
    pub fn is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// The section inside `BODY[...]`, if this is a body item.
    #[must_use]
    pub fn section(&self) -> Option<&str> {
        let upper = self.name.get(..5)?;
        if !upper.eq_ignore_ascii_case("BODY[") {
            return None;
        }
        let end = self.name.find(']')?;
        Some(&self.name[5..end])
    }

    /// Numeric value of an atom item.
    #[must_use]
    pub fn number(&self) -> Option<u32> {
        match &self.value {
            ItemValue::Atom(a) => a.parse().ok(),
            _ => None,
        }
    }
}

/// Splits `N FETCH (rest` into the message number and the item text.
#[must_use]
pub fn fetch_start(untagged: &str) -> Option<(u32, &str)> {
    let (number, rest) = untagged.split_once(' ')?;
    let number = number.parse().ok()?;
    let rest = rest.strip_prefix("FETCH").or_else(|| rest.strip_prefix("fetch"))?;
    let rest = rest.trim_start();
    Some((number, rest.strip_prefix('(').unwrap_or(rest)))
}

/// Scans FETCH items from `input`.
///
/// Scanning stops at the closing parenthesis or after an item whose value
/// is a literal; the literal's octets are not part of `input` and the
/// caller continues with the line that follows them.
#[must_use]
pub fn scan_fetch_items(input: &str) -> Vec<FetchItem> {
    let bytes = input.as_bytes();
    let mut items = Vec::new();
    let mut i = 0;
    loop {
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b')' {
            return items;
        }

        let name_start = i;
        while i < bytes.len() && bytes[i] != b' ' && bytes[i] != b'[' && bytes[i] != b')' {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'[' {
            let close = bytes[i..].iter().position(|&b| b == b']').map_or(bytes.len(), |p| i + p);
            i = (close + 1).min(bytes.len());
            if i < bytes.len() && bytes[i] == b'<' {
                i = bytes[i..].iter().position(|&b| b == b'>').map_or(bytes.len(), |p| i + p + 1);
            }
        }
        let name = input[name_start..i].to_string();
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() {
            return items;
        }

        let value = match bytes[i] {
            b'"' => {
                let (value, next) = read_quoted(input, i);
                i = next;
                ItemValue::Quoted(value)
            }
            b'(' => {
                let end = matching_paren(bytes, i);
                let value = ItemValue::List(input[i + 1..end].to_string());
                i = end + 1;
                value
            }
            b'{' => {
                let digits: String = input[i + 1..]
                    .chars()
                    .take_while(char::is_ascii_digit)
                    .collect();
                items.push(FetchItem {
                    name,
                    value: ItemValue::Literal(digits.parse().unwrap_or(0)),
                });
                return items;
            }
            _ => {
                let end = bytes[i..]
                    .iter()
                    .position(|&b| b == b' ' || b == b')')
                    .map_or(bytes.len(), |p| i + p);
                let atom = &input[i..end];
                i = end;
                if atom.eq_ignore_ascii_case("NIL") {
                    ItemValue::Nil
                } else {
                    ItemValue::Atom(atom.to_string())
                }
            }
        };
        items.push(FetchItem { name, value });
    }
}

/// Parses the leading number of `N EXISTS`-style data.
#[must_use]
pub fn numbered(untagged: &str) -> Option<(u32, String)> {
    let (number, rest) = untagged.split_once(' ')?;
    let number = number.parse().ok()?;
    let keyword = rest.split_whitespace().next()?.to_ascii_uppercase();
    Some((number, keyword))
}

/// Quotes a string for use as an IMAP astring.
#[must_use]
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
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
    fn test_classify_tagged() {
        let line = Line::classify(b"EM OK [READ-WRITE] SELECT completed");
        assert_eq!(
            line,
            Line::Tagged {
                completion: Completion::Ok,
                code: Some("READ-WRITE".into()),
                text: "SELECT completed".into(),
            }
        );
        assert!(matches!(
            Line::classify(b"EM no [NONEXISTENT] no such part"),
            Line::Tagged { completion: Completion::No, .. }
        ));
        assert!(matches!(Line::classify(b"A1 OK done"), Line::Other(_)));
        assert!(matches!(Line::classify(b"EMX OK done"), Line::Other(_)));
    }

    #[test]
    fn test_classify_untagged_and_continuation() {
        assert_eq!(Line::classify(b"* 3 EXISTS"), Line::Untagged("3 EXISTS".into()));
        assert_eq!(Line::classify(b"+ idling"), Line::Continuation("idling".into()));
        assert_eq!(Line::classify(b"+"), Line::Continuation(String::new()));
    }

    #[test]
    fn test_tokenize_list_line() {
        let tokens = tokenize("(\\HasNoChildren \\Sent) \"/\" \"Sent Items\"");
        assert_eq!(
            tokens,
            vec![
                Token::List("\\HasNoChildren \\Sent".into()),
                Token::Quoted("/".into()),
                Token::Quoted("Sent Items".into()),
            ]
        );
        assert_eq!(tokenize("() NIL INBOX")[1], Token::Nil);
    }

    #[test]
    fn test_tokenize_escaped_quote() {
        assert_eq!(tokenize(r#""a \"b\" c""#), vec![Token::Quoted("a \"b\" c".into())]);
    }

    #[test]
    fn test_scan_header_fetch() {
        let (n, rest) = fetch_start("12 FETCH (UID 55 FLAGS (\\Seen) RFC822.SIZE 3011 BODY[HEADER.FIELDS (FROM SUBJECT)] {88}").unwrap();
        assert_eq!(n, 12);
        let items = scan_fetch_items(rest);
        assert_eq!(items.len(), 4);
        assert!(items[0].is("UID"));
        assert_eq!(items[0].number(), Some(55));
        assert_eq!(items[1].value, ItemValue::List("\\Seen".into()));
        assert_eq!(items[2].number(), Some(3011));
        assert_eq!(items[3].name, "BODY[HEADER.FIELDS (FROM SUBJECT)]");
        assert_eq!(items[3].value, ItemValue::Literal(88));
        assert_eq!(items[3].section(), Some("HEADER.FIELDS (FROM SUBJECT)"));
    }

    #[test]
    fn test_scan_nil_and_quoted_sections() {
        let items = scan_fetch_items("UID 9 BODY[1.3.MIME] NIL)");
        assert_eq!(items[1].value, ItemValue::Nil);
        assert_eq!(items[1].section(), Some("1.3.MIME"));

        let items = scan_fetch_items("BODY[2]<0> \"\")");
        assert_eq!(items[0].name, "BODY[2]<0>");
        assert_eq!(items[0].section(), Some("2"));
        assert_eq!(items[0].value, ItemValue::Quoted(String::new()));
    }

    #[test]
    fn test_scan_continuation_after_literal() {
        let items = scan_fetch_items(" UID 4)");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].number(), Some(4));
        assert!(scan_fetch_items(")").is_empty());
    }

    #[test]
    fn test_split_code() {
        assert_eq!(split_code("[UIDNEXT 4392] Predicted"), (Some("UIDNEXT 4392"), "Predicted"));
        assert_eq!(split_code("plain"), (None, "plain"));
    }

    #[test]
    fn test_quote() {
        assert_eq!(quote("Sent Items"), "\"Sent Items\"");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
    }
}
