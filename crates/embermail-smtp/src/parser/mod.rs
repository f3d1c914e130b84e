//! SMTP reply parser.

use crate::error::{Error, Result};
use crate::types::{Reply, ReplyCode};

/// Parses an SMTP reply from its lines.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the reply is malformed or the lines
/// disagree on the code.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let Some(first) = lines.first() else {
        return Err(Error::Protocol("empty reply".into()));
    };
    let code = reply_code(first)?;

    let mut message = Vec::with_capacity(lines.len());
    for line in lines {
        if reply_code(line)? != code {
            return Err(Error::Protocol(format!("reply code changed mid-reply: {line}")));
        }
        match line.len() {
            3 => message.push(String::new()),
            4 => return Err(Error::Protocol(format!("malformed reply line: {line}"))),
            _ => message.push(line.get(4..).unwrap_or_default().to_string()),
        }
    }

    Ok(Reply::new(code, message))
}

fn reply_code(line: &str) -> Result<ReplyCode> {
    line.get(..3)
        .filter(|digits| digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<u16>().ok())
        .map(ReplyCode::new)
        .ok_or_else(|| Error::Protocol(format!("invalid reply line: {line}")))
}

/// Checks if a line is the last line of a reply.
///
/// Multi-line replies use `-` after the code for continuation and ` `
/// (or nothing) on the last line.
#[must_use]
pub fn is_last_reply_line(line: &str) -> bool {
    match line.as_bytes().get(3) {
        None => line.len() == 3,
        Some(&sep) => sep != b'-',
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

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_parse_single_line_reply() {
        let reply = parse_reply(&lines(&["250 OK"])).unwrap();
        assert_eq!(reply.code.as_u16(), 250);
        assert_eq!(reply.lines, vec!["OK"]);
    }

    #[test]
    fn test_parse_ehlo_reply() {
        let reply = parse_reply(&lines(&[
            "250-mail.example.com greets you",
            "250-PIPELINING",
            "250-CHUNKING",
            "250 SIZE 1000000",
        ]))
        .unwrap();
        assert_eq!(
            reply.lines,
            vec!["mail.example.com greets you", "PIPELINING", "CHUNKING", "SIZE 1000000"]
        );
    }

    #[test]
    fn test_bare_code() {
        let reply = parse_reply(&lines(&["354"])).unwrap();
        assert_eq!(reply.code, ReplyCode::START_DATA);
        assert_eq!(reply.lines, vec![""]);
    }

    #[test]
    fn test_is_last_reply_line() {
        assert!(is_last_reply_line("250 OK"));
        assert!(is_last_reply_line("250"));
        assert!(!is_last_reply_line("250-Continuing"));
        assert!(!is_last_reply_line("25"));
    }

    #[test]
    fn test_malformed() {
        assert!(parse_reply(&[]).is_err());
        assert!(parse_reply(&lines(&["25"])).is_err());
        assert!(parse_reply(&lines(&["ABC OK"])).is_err());
        assert!(parse_reply(&lines(&["250-a", "251 b"])).is_err());
    }
}
