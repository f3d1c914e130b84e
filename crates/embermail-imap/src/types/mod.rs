//! Core IMAP types.

mod capability;
mod flags;
mod mailbox;
mod message;

pub use capability::{Capabilities, Capability};
pub use flags::{Flag, Flags};
pub use mailbox::{AclEntry, ListEntry, MailboxAttribute, MailboxInfo, Quota, QuotaResource, QuotaRoot};
pub use message::{Envelope, FetchStats, MessageHeader, MessageId, PartInfo, PartKind};
