//! # embermail-imap
//!
//! An IMAP4rev1 client engine for small devices.
//!
//! The engine keeps one command in flight under a fixed tag, reads replies
//! line by line with `{n}` literal support, and never asks the server for
//! `BODYSTRUCTURE`. Message structure is discovered by probing
//! `BODY[<path>.MIME]` depth first, and part content is streamed through
//! the transfer decoder into storage in small chunks, so the largest
//! buffer held is bounded by the text size cap rather than the message.
//!
//! ## Example
//!
//! ```ignore
//! use embermail_core::{Credentials, SessionConfig};
//! use embermail_imap::{FetchOptions, ImapSession, SearchOptions};
//!
//! let config = SessionConfig::imap("imap.example.com")
//!     .credentials(Credentials::password("user", "secret"))
//!     .build();
//! let mut session = ImapSession::new(transport, config);
//! session.open_session().await?;
//! session.select_mailbox("INBOX").await?;
//! for id in session.search("UNSEEN", SearchOptions::recent(5)).await? {
//!     let message = session.fetch(id, &FetchOptions::default()).await?;
//!     println!("{}: {:?}", message.envelope.subject, message.text());
//! }
//! session.logout().await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
mod error;
pub mod mime;
mod options;
mod part_sink;
pub mod response;
mod search;
mod session;
pub mod store;
pub mod types;

pub use command::{CommandKind, StoreAction};
pub use error::{Error, Result};
pub use options::{
    DownloadSelection, FetchLimits, FetchOptions, HeaderFormat, PartSelection, SearchOptions,
    SearchPolicy, StorageOptions,
};
pub use part_sink::{PartChunk, PartSink};
pub use response::Completion;
pub use search::SearchCollector;
pub use session::{
    CustomResponse, DEFAULT_IDLE_TIMEOUT, DEFAULT_PROBE_INTERVAL, IdleEvent, ImapSession,
    MAX_IDLE_TIMEOUT, MIN_IDLE_TIMEOUT, SessionState, clamp_idle_timeout,
};
pub use types::{
    AclEntry, Capabilities, Capability, Envelope, FetchStats, Flag, Flags, ListEntry,
    MailboxAttribute, MailboxInfo, MessageHeader, MessageId, PartInfo, PartKind, Quota,
    QuotaResource, QuotaRoot,
};
