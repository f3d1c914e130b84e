//! Command kinds and command text.
//!
//! Commands are rendered without the tag; the session prefixes the fixed
//! tag and appends CRLF.

use std::fmt;

use crate::types::{Flags, MessageId};

/// The kind of the last command issued; selects how untagged data is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// `CAPABILITY`
    Capability,
    /// `STARTTLS`
    StartTls,
    /// `LOGIN` or `AUTHENTICATE`
    Authenticate,
    /// `LIST`, `LSUB`
    List,
    /// `SELECT`, `EXAMINE`
    Select,
    /// `SEARCH`
    Search,
    /// Header and envelope fetch.
    FetchHeader,
    /// `BODY[<path>.MIME]` and `BODY[<path>.HEADER]` probes.
    FetchMime,
    /// Text body content.
    FetchText,
    /// Attachment or inline media content.
    FetchAttachment,
    /// `IDLE`
    Idle,
    /// `STORE`
    Store,
    /// `COPY`, `MOVE`
    Copy,
    /// `EXPUNGE`
    Expunge,
    /// `APPEND`
    Append,
    /// Mailbox management: create, delete, rename, (un)subscribe.
    Mailbox,
    /// `GETQUOTA`, `GETQUOTAROOT`
    Quota,
    /// `GETACL`, `MYRIGHTS`
    Acl,
    /// `NOOP`, `CLOSE`
    Noop,
    /// `LOGOUT`
    Logout,
    /// Caller-supplied command.
    Custom,
}

impl CommandKind {
    /// Returns true for the fetch kinds.
    #[must_use]
    pub const fn is_fetch(self) -> bool {
        matches!(
            self,
            Self::FetchHeader | Self::FetchMime | Self::FetchText | Self::FetchAttachment
        )
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How STORE changes flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreAction {
    /// `+FLAGS`
    Add,
    /// `-FLAGS`
    Remove,
    /// `FLAGS`
    Replace,
}

impl StoreAction {
    const fn item(self) -> &'static str {
        match self {
            Self::Add => "+FLAGS.SILENT",
            Self::Remove => "-FLAGS.SILENT",
            Self::Replace => "FLAGS.SILENT",
        }
    }
}

/// Header fields requested with every header fetch.
pub const HEADER_FIELDS: &str = "FROM SENDER TO CC REPLY-TO SUBJECT DATE MESSAGE-ID IN-REPLY-TO REFERENCES CONTENT-TYPE CONTENT-TRANSFER-ENCODING CONTENT-DISPOSITION";

/// Writes an astring: bare when safe, quoted otherwise.
#[must_use]
pub fn astring(s: &str) -> String {
    if !s.is_empty() && !s.bytes().any(needs_quoting) {
        return s.to_string();
    }
    crate::response::quote(s)
}

const fn needs_quoting(b: u8) -> bool {
    matches!(b, b' ' | b'"' | b'\\' | b'(' | b')' | b'{' | b'%' | b'*') || b < 0x20 || b == 0x7F
}

/// Renders a set of ids as a comma-separated sequence set.
///
/// All ids must be of the same kind; the kind of the first one decides
/// the `UID ` prefix.
#[must_use]
pub fn sequence_set(ids: &[MessageId]) -> String {
    let values: Vec<String> = ids.iter().map(|id| id.value().to_string()).collect();
    values.join(",")
}

fn prefix(ids: &[MessageId]) -> &'static str {
    ids.first().map_or("", |id| id.prefix())
}

/// `SELECT` or `EXAMINE`.
#[must_use]
pub fn select(mailbox: &str, read_only: bool) -> String {
    let verb = if read_only { "EXAMINE" } else { "SELECT" };
    format!("{verb} {}", astring(mailbox))
}

/// `LIST reference pattern`.
#[must_use]
pub fn list(reference: &str, pattern: &str) -> String {
    let wildcard = |b: u8| b == b'*' || b == b'%';
    let pattern = if !pattern.is_empty() && pattern.bytes().all(|b| wildcard(b) || !needs_quoting(b)) {
        pattern.to_string()
    } else {
        crate::response::quote(pattern)
    };
    format!("LIST {} {pattern}", crate::response::quote(reference))
}

/// `[UID ]SEARCH criteria`; criteria pass through verbatim.
#[must_use]
pub fn search(criteria: &str, uid: bool) -> String {
    let criteria = if criteria.trim().is_empty() { "ALL" } else { criteria.trim() };
    if uid {
        format!("UID SEARCH {criteria}")
    } else {
        format!("SEARCH {criteria}")
    }
}

/// Header, flags and size fetch for one message.
#[must_use]
pub fn fetch_header(id: MessageId, body_item: &str) -> String {
    format!(
        "{}FETCH {} (UID FLAGS RFC822.SIZE {body_item}[HEADER.FIELDS ({HEADER_FIELDS})])",
        id.prefix(),
        id.value()
    )
}

/// Fetch of one body section, e.g. `1.2.MIME` or `2`.
#[must_use]
pub fn fetch_section(id: MessageId, body_item: &str, section: &str) -> String {
    format!("{}FETCH {} {body_item}[{section}]", id.prefix(), id.value())
}

/// `STORE` with silent flag update.
#[must_use]
pub fn store(ids: &[MessageId], action: StoreAction, flags: &Flags) -> String {
    format!(
        "{}STORE {} {} {}",
        prefix(ids),
        sequence_set(ids),
        action.item(),
        flags.to_list()
    )
}

/// `COPY` or `MOVE`.
#[must_use]
pub fn copy(ids: &[MessageId], mailbox: &str, move_messages: bool) -> String {
    let verb = if move_messages { "MOVE" } else { "COPY" };
    format!("{}{verb} {} {}", prefix(ids), sequence_set(ids), astring(mailbox))
}

/// `APPEND mailbox (flags) {n}` with a synchronizing or non-synchronizing
/// literal.
#[must_use]
pub fn append(mailbox: &str, flags: &Flags, len: usize, literal_plus: bool) -> String {
    let plus = if literal_plus { "+" } else { "" };
    if flags.is_empty() {
        format!("APPEND {} {{{len}{plus}}}", astring(mailbox))
    } else {
        format!("APPEND {} {} {{{len}{plus}}}", astring(mailbox), flags.to_list())
    }
}

/// One mailbox-name command such as `CREATE` or `SUBSCRIBE`.
#[must_use]
pub fn mailbox(verb: &str, name: &str) -> String {
    format!("{verb} {}", astring(name))
}

/// `RENAME from to`.
#[must_use]
pub fn rename(from: &str, to: &str) -> String {
    format!("RENAME {} {}", astring(from), astring(to))
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
    use crate::types::Flag;

    #[test]
    fn test_astring() {
        assert_eq!(astring("INBOX"), "INBOX");
        assert_eq!(astring("Sent Items"), "\"Sent Items\"");
        assert_eq!(astring(""), "\"\"");
        assert_eq!(astring("a\"b"), "\"a\\\"b\"");
    }

    #[test]
    fn test_select_and_examine() {
        assert_eq!(select("INBOX", false), "SELECT INBOX");
        assert_eq!(select("Archive/2024", true), "EXAMINE Archive/2024");
    }

    #[test]
    fn test_list_keeps_wildcards_bare() {
        assert_eq!(list("", "*"), "LIST \"\" *");
        assert_eq!(list("", "Work/%"), "LIST \"\" Work/%");
        assert_eq!(list("", "My Folder"), "LIST \"\" \"My Folder\"");
    }

    #[test]
    fn test_search_defaults_to_all() {
        assert_eq!(search("", true), "UID SEARCH ALL");
        assert_eq!(search("UNSEEN SINCE 1-Jan-2024", false), "SEARCH UNSEEN SINCE 1-Jan-2024");
    }

    #[test]
    fn test_fetch_commands() {
        let cmd = fetch_header(MessageId::Uid(42), "BODY.PEEK");
        assert!(cmd.starts_with("UID FETCH 42 (UID FLAGS RFC822.SIZE BODY.PEEK[HEADER.FIELDS (FROM "));
        assert!(cmd.ends_with("CONTENT-DISPOSITION)])"));
        assert_eq!(
            fetch_section(MessageId::Number(3), "BODY.PEEK", "1.2.MIME"),
            "FETCH 3 BODY.PEEK[1.2.MIME]"
        );
    }

    #[test]
    fn test_store_and_copy() {
        let mut flags = Flags::new();
        flags.insert(Flag::Seen);
        let ids = [MessageId::Uid(1), MessageId::Uid(5)];
        assert_eq!(store(&ids, StoreAction::Add, &flags), "UID STORE 1,5 +FLAGS.SILENT (\\Seen)");
        assert_eq!(copy(&ids, "Trash", true), "UID MOVE 1,5 Trash");
        assert_eq!(copy(&[MessageId::Number(2)], "Old Mail", false), "COPY 2 \"Old Mail\"");
    }

    #[test]
    fn test_append_literal_forms() {
        let flags = Flags::new();
        assert_eq!(append("Drafts", &flags, 120, false), "APPEND Drafts {120}");
        let mut seen = Flags::new();
        seen.insert(Flag::Seen);
        assert_eq!(append("Sent", &seen, 9, true), "APPEND Sent (\\Seen) {9+}");
    }
}
