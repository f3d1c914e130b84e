//! The byte-stream collaborator both engines drive.

use std::io;
use std::time::Duration;

/// A TCP (and optionally TLS) connection supplied by the host.
///
/// The engines own one transport per session and never share it. All
/// methods are called from a single task, one at a time.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Opens a plain connection to `host:port`.
    async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> io::Result<()>;

    /// Runs a TLS handshake over the open connection.
    ///
    /// Used right after [`Transport::connect`] for implicit TLS and after a
    /// successful `STARTTLS` exchange otherwise.
    async fn connect_secure(&mut self, host: &str, verify: bool) -> io::Result<()>;

    /// Writes and flushes all of `data`.
    async fn write(&mut self, data: &[u8]) -> io::Result<()>;

    /// Reads whatever is available into `buf`, waiting for at least one
    /// byte. Returns 0 once the peer has closed the connection.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Returns true while the connection is open.
    fn is_connected(&self) -> bool;

    /// Returns true once TLS is active.
    fn is_secure(&self) -> bool;

    /// Closes the connection. Closing twice is a no-op.
    async fn close(&mut self);

    /// Checks that `host` still resolves, to spot a silently dead link.
    async fn probe_host(&mut self, host: &str) -> bool {
        let _ = host;
        true
    }
}
