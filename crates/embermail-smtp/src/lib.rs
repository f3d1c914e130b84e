//! # embermail-smtp
//!
//! An SMTP client engine for small devices, with a streaming MIME composer.
//!
//! ## Features
//!
//! - **Protocol**: EHLO with HELO fallback, STARTTLS (RFC 3207) and
//!   implicit TLS, AUTH PLAIN/LOGIN/XOAUTH2/OAUTHBEARER (RFC 4954)
//! - **Transfer**: `DATA` with dot-stuffing, or `BDAT` chunking (RFC 3030)
//!   with pipelined replies when the server offers `PIPELINING`
//! - **Extensions**: SIZE, 8BITMIME, DSN, CHUNKING, PIPELINING
//! - **MIME**: plain/HTML alternatives, inline parts in
//!   `multipart/related`, `multipart/parallel` groups, attachments from
//!   memory or storage, nested `message/rfc822` parts
//!
//! The message is composed while it is written to the socket. Attachment
//! content is read and encoded a few hundred bytes at a time, so sending a
//! large file from storage needs no more memory than sending a small one.
//!
//! ## Quick Start
//!
//! ```ignore
//! use embermail_core::{Credentials, SessionConfig};
//! use embermail_smtp::{Attachment, Mailbox, Message, SmtpSession};
//!
//! let config = SessionConfig::smtp("smtp.example.com")
//!     .credentials(Credentials::password("device@example.com", "secret"))
//!     .build();
//! let mut session = SmtpSession::new(transport, config).with_storage(storage);
//!
//! let message = Message::new(Mailbox::parse("Sensor <device@example.com>")?)
//!     .to(Mailbox::parse("ops@example.com")?)
//!     .subject("Daily report")
//!     .text("Readings attached.")
//!     .attach(Attachment::file("log.csv", "text/csv", "/logs/today.csv"));
//! let report = session.send(&message, false).await?;
//! println!("sent {} bytes", report.bytes);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod compose;
mod error;
pub mod message;
mod options;
pub mod parser;
mod session;
pub mod types;

pub use command::{BodyType, Command, DsnNotify};
pub use compose::{BOUNDARY_LENGTH, BodyWriter, Composer, CountingWriter, compose_to_vec};
pub use error::{Error, Result};
pub use message::{Attachment, ContentSource, Disposition, Message, Priority, TextBody};
pub use options::{DEFAULT_CHUNK_SIZE, SendOptions, SendReport};
pub use session::{ServerInfo, SessionState, SmtpSession};
pub use types::{
    Address, AuthMechanism, EnhancedStatus, Extension, Mailbox, Reply, ReplyClass, ReplyCode,
};
