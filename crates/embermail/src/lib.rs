//! # embermail
//!
//! Host-side pieces for the embermail engines: a tokio/rustls
//! [`TcpTransport`], a [`FsStorage`] rooted at a directory, the
//! [`init_logging`] bootstrap and the [`AppConfig`] file format.
//!
//! The engines themselves are re-exported as [`imap`] and [`smtp`].
//!
//! ## Example
//!
//! ```ignore
//! use embermail::{AppConfig, TcpTransport, init_logging};
//! use embermail::smtp::{Mailbox, Message, SmtpSession};
//!
//! init_logging();
//! let config = AppConfig::load("embermail.json").await?;
//! let mut session = SmtpSession::new(TcpTransport::new(), config.smtp()?.clone());
//! let message = Message::new(Mailbox::parse("device@example.com")?)
//!     .to(Mailbox::parse("ops@example.com")?)
//!     .subject("Boot")
//!     .text("Device started.");
//! session.send(&message, false).await?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod logging;
mod storage;
mod transport;

pub use config::AppConfig;
pub use embermail_imap as imap;
pub use embermail_smtp as smtp;
pub use logging::{DEFAULT_FILTER, LOG_ENV, init_logging};
pub use storage::FsStorage;
pub use transport::TcpTransport;
