//! Mailbox types.

use super::Flags;

/// Mailbox status from SELECT/EXAMINE.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxInfo {
    /// Mailbox name as selected.
    pub name: String,
    /// Number of messages in the mailbox.
    pub exists: u32,
    /// Number of recent messages.
    pub recent: u32,
    /// First unseen message sequence number.
    pub unseen: Option<u32>,
    /// Next UID to be assigned.
    pub uid_next: Option<u32>,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u32>,
    /// Flags defined for this mailbox.
    pub flags: Flags,
    /// Flags that can be permanently stored.
    pub permanent_flags: Flags,
    /// Whether the mailbox is read-only.
    pub read_only: bool,
}

/// Mailbox attributes from a LIST response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MailboxAttribute {
    /// Mailbox cannot be selected.
    NoSelect,
    /// Mailbox has no children.
    HasNoChildren,
    /// Mailbox has children.
    HasChildren,
    /// Mailbox is marked for attention.
    Marked,
    /// Mailbox is not marked.
    Unmarked,
    /// Drafts folder (RFC 6154).
    Drafts,
    /// Sent folder (RFC 6154).
    Sent,
    /// Trash folder (RFC 6154).
    Trash,
    /// Junk folder (RFC 6154).
    Junk,
    /// Unknown attribute.
    Unknown(String),
}

impl MailboxAttribute {
    /// Parses a mailbox attribute string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "\\NOSELECT" => Self::NoSelect,
            "\\HASNOCHILDREN" => Self::HasNoChildren,
            "\\HASCHILDREN" => Self::HasChildren,
            "\\MARKED" => Self::Marked,
            "\\UNMARKED" => Self::Unmarked,
            "\\DRAFTS" => Self::Drafts,
            "\\SENT" => Self::Sent,
            "\\TRASH" => Self::Trash,
            "\\JUNK" => Self::Junk,
            _ => Self::Unknown(s.to_string()),
        }
    }
}

/// One LIST result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// Mailbox attributes.
    pub attributes: Vec<MailboxAttribute>,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
    /// Mailbox name.
    pub name: String,
}

impl ListEntry {
    /// Returns true if the mailbox can be selected.
    #[must_use]
    pub fn is_selectable(&self) -> bool {
        !self.attributes.contains(&MailboxAttribute::NoSelect)
    }
}

/// One resource line of a QUOTA response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name, e.g. `STORAGE` (KiB) or `MESSAGE`.
    pub name: String,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// A quota root and its resources.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Quota {
    /// Quota root name.
    pub root: String,
    /// Resource usage.
    pub resources: Vec<QuotaResource>,
}

/// GETQUOTAROOT result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuotaRoot {
    /// Mailbox asked about.
    pub mailbox: String,
    /// Roots that apply to it.
    pub roots: Vec<String>,
    /// Quotas returned alongside.
    pub quotas: Vec<Quota>,
}

/// One identifier/rights pair from an ACL response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclEntry {
    /// User or group identifier.
    pub identifier: String,
    /// Rights string (RFC 4314 letters).
    pub rights: String,
}
