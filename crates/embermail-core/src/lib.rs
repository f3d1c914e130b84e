//! # embermail-core
//!
//! Shared plumbing for the embermail IMAP and SMTP engines.
//!
//! The engines never open sockets or files themselves. They drive three
//! narrow collaborator interfaces supplied by the host:
//!
//! - [`Transport`]: connect, TLS upgrade, read and write bytes
//! - [`Storage`]: open/write/read/close files on flash, SD, or nothing
//! - [`Clock`]: the current time, for `Date` headers and reconnect cooldowns
//!
//! On top of those this crate provides the [`FramedStream`] line reader with
//! per-read deadlines, the [`SessionConfig`] model, the [`Status`] object
//! every operation updates, status/progress sinks, the reconnect gate, the
//! low-memory guard, and SASL response builders.
//!
//! With the `test-util` feature, `mock::MockTransport` provides a scripted
//! in-memory transport for engine tests.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod clock;
mod config;
mod error;
mod framed;
mod memory;
mod reconnect;
mod sink;
mod status;
mod storage;
mod transport;

pub mod sasl;

#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigError, Credentials, ReconnectPolicy, Secret, Security, ServerConfig, SessionConfig,
    SessionConfigBuilder, TimeConfig, Timeouts,
};
pub use error::{Error, Result};
pub use framed::{FramedStream, literal_length};
pub use memory::{MemoryGuard, MemoryProbe};
pub use reconnect::{DefaultNetwork, NetworkHandler, ReconnectGate};
pub use sink::{EventKind, NoopSink, ProgressTracker, StatusEvent, StatusSink, TracingSink};
pub use status::{ErrorCategory, Status, StatusCode};
pub use storage::{MemoryStorage, OpenMode, Storage, StorageKind, read_file, write_file};
pub use transport::Transport;
