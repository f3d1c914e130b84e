//! Line framing over a [`Transport`].
//!
//! Both protocols are CRLF-terminated line streams; IMAP additionally
//! embeds `{n}` literals whose octets follow the line. This module buffers
//! transport reads and hands out whole lines or bounded octet runs, with a
//! deadline on every read that has to wait for the server.

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Size of a single transport read.
const READ_CHUNK: usize = 2048;

/// Default maximum line length.
const DEFAULT_MAX_LINE: usize = 64 * 1024;

/// Buffered, deadline-aware reader/writer over a transport.
///
/// When a deadline expires the transport is closed and
/// [`Error::Timeout`] is returned; the caller decides whether to reconnect.
pub struct FramedStream<T> {
    transport: T,
    buffer: BytesMut,
    read_timeout: Duration,
    max_line: usize,
}

impl<T: Transport> FramedStream<T> {
    /// Wraps a transport.
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            read_timeout: Duration::from_secs(30),
            max_line: DEFAULT_MAX_LINE,
        }
    }

    /// Sets the per-read deadline.
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }

    /// Returns the per-read deadline.
    #[must_use]
    pub const fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    /// Sets the longest accepted line.
    pub fn set_max_line_length(&mut self, max: usize) {
        self.max_line = max;
    }

    /// Opens the connection, dropping anything left from a previous one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionRefused`], [`Error::Timeout`], or
    /// [`Error::Io`].
    pub async fn connect(&mut self, host: &str, port: u16, timeout: Duration) -> Result<()> {
        self.buffer.clear();
        if self.transport.is_connected() {
            self.transport.close().await;
        }
        debug!(host, port, "connecting");
        match tokio::time::timeout(timeout, self.transport.connect(host, port, timeout)).await {
            Err(_) => Err(Error::Timeout(timeout)),
            Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                Err(Error::ConnectionRefused(format!("{host}:{port}")))
            }
            Ok(Err(e)) => Err(Error::Io(e)),
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Upgrades the connection to TLS.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Tls`] if the handshake fails; the connection is
    /// closed in that case.
    pub async fn start_tls(&mut self, host: &str, verify: bool) -> Result<()> {
        self.buffer.clear();
        if let Err(e) = self.transport.connect_secure(host, verify).await {
            self.transport.close().await;
            return Err(Error::Tls(e.to_string()));
        }
        debug!(host, verify, "TLS established");
        Ok(())
    }

    /// Reads one line and returns it without its CRLF (or bare LF).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], [`Error::ConnectionClosed`],
    /// [`Error::LineTooLong`], or [`Error::Io`].
    pub async fn read_line(&mut self) -> Result<Vec<u8>> {
        self.next_line(true).await
    }

    /// Waits up to `wait` for a line without treating silence as an error.
    ///
    /// Returns `Ok(None)` if nothing complete arrived in time; the
    /// connection stays open and any partial line stays buffered. Used
    /// while idling, where minutes of silence are normal.
    ///
    /// # Errors
    ///
    /// Same as [`FramedStream::read_line`], minus the timeout.
    pub async fn poll_line(&mut self, wait: Duration) -> Result<Option<Vec<u8>>> {
        match tokio::time::timeout(wait, self.next_line(false)).await {
            Err(_) => Ok(None),
            Ok(line) => line.map(Some),
        }
    }

    async fn next_line(&mut self, deadline: bool) -> Result<Vec<u8>> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let mut line = self.buffer.split_to(scanned + pos + 1);
                line.truncate(line.len() - 1);
                if line.last() == Some(&b'\r') {
                    line.truncate(line.len() - 1);
                }
                return Ok(line.to_vec());
            }
            scanned = self.buffer.len();
            if scanned > self.max_line {
                warn!(len = scanned, max = self.max_line, "line too long, closing");
                self.close().await;
                return Err(Error::LineTooLong(self.max_line));
            }
            self.fill(deadline).await?;
        }
    }

    /// Reads between 1 and `max` bytes, serving buffered bytes first.
    ///
    /// # Errors
    ///
    /// Same as [`FramedStream::read_line`].
    pub async fn read_chunk(&mut self, max: usize) -> Result<Bytes> {
        if self.buffer.is_empty() {
            self.fill(true).await?;
        }
        let n = max.min(self.buffer.len());
        Ok(self.buffer.split_to(n).freeze())
    }

    /// Reads exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`FramedStream::read_line`].
    pub async fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let chunk = self.read_chunk(n - out.len()).await?;
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }

    /// Reads and discards exactly `n` bytes.
    ///
    /// # Errors
    ///
    /// Same as [`FramedStream::read_line`].
    pub async fn discard(&mut self, n: usize) -> Result<()> {
        let mut left = n;
        while left > 0 {
            left -= self.read_chunk(left).await?.len();
        }
        Ok(())
    }

    /// Writes all of `data`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotConnected`] if the transport is closed, or the
    /// write failure (after closing the transport).
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        if !self.transport.is_connected() {
            return Err(Error::NotConnected);
        }
        match tokio::time::timeout(self.read_timeout, self.transport.write(data)).await {
            Err(_) => {
                self.close().await;
                Err(Error::Timeout(self.read_timeout))
            }
            Ok(Err(e)) => {
                self.close().await;
                Err(Error::Io(e))
            }
            Ok(Ok(())) => Ok(()),
        }
    }

    /// Returns the number of bytes already buffered.
    #[must_use]
    pub fn available(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true while the transport reports an open connection.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Closes the transport and drops buffered input.
    pub async fn close(&mut self) {
        self.buffer.clear();
        self.transport.close().await;
    }

    /// Gets a reference to the transport.
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Gets a mutable reference to the transport.
    pub const fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Consumes the stream and returns the transport.
    ///
    /// Any buffered data is lost.
    pub fn into_inner(self) -> T {
        self.transport
    }

    async fn fill(&mut self, deadline: bool) -> Result<usize> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = if deadline {
            tokio::time::timeout(self.read_timeout, self.transport.read(&mut chunk)).await
        } else {
            Ok(self.transport.read(&mut chunk).await)
        };
        match read {
            Err(_) => {
                warn!(timeout = ?self.read_timeout, "read timed out, closing connection");
                self.close().await;
                Err(Error::Timeout(self.read_timeout))
            }
            Ok(Err(e)) => {
                self.close().await;
                Err(Error::Io(e))
            }
            Ok(Ok(0)) => {
                self.close().await;
                Err(Error::ConnectionClosed)
            }
            Ok(Ok(n)) => {
                self.buffer.extend_from_slice(&chunk[..n]);
                Ok(n)
            }
        }
    }
}

/// Parses an IMAP literal announcement at the end of a line.
///
/// Matches `{123}` and the non-synchronizing `{123+}`. The line is
/// expected without its CRLF.
#[must_use]
pub fn literal_length(line: &[u8]) -> Option<usize> {
    let body = line.strip_suffix(b"}")?;
    let body = body.strip_suffix(b"+").unwrap_or(body);
    let open = body.iter().rposition(|&b| b == b'{')?;
    let digits = &body[open + 1..];
    if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse().ok()
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
    use crate::mock::MockTransport;

    async fn connected(transport: MockTransport) -> FramedStream<MockTransport> {
        let mut stream = FramedStream::new(transport);
        stream
            .connect("mail.example.com", 143, Duration::from_secs(1))
            .await
            .unwrap();
        stream
    }

    #[test]
    fn test_literal_length() {
        assert_eq!(literal_length(b"* 1 FETCH (BODY[1] {42}"), Some(42));
        assert_eq!(literal_length(b"A1 APPEND INBOX {310+}"), Some(310));
        assert_eq!(literal_length(b"* 1 FETCH (BODY[1] {0}"), Some(0));
        assert_eq!(literal_length(b"* OK done"), None);
        assert_eq!(literal_length(b"* OK {abc}"), None);
        assert_eq!(literal_length(b"{}"), None);
    }

    #[tokio::test]
    async fn test_read_lines_across_fragments() {
        let transport = MockTransport::new()
            .with_greeting(b"* OK ready\r\n* 3 EXISTS\nA1 OK done\r\n")
            .with_read_limit(3);
        let mut stream = connected(transport).await;
        assert_eq!(stream.read_line().await.unwrap(), b"* OK ready");
        assert_eq!(stream.read_line().await.unwrap(), b"* 3 EXISTS");
        assert_eq!(stream.read_line().await.unwrap(), b"A1 OK done");
    }

    #[tokio::test]
    async fn test_literal_octets_then_line() {
        let transport = MockTransport::new()
            .with_greeting(b"* 1 FETCH (BODY[1] {5}\r\nhello)\r\n");
        let mut stream = connected(transport).await;
        let line = stream.read_line().await.unwrap();
        let n = literal_length(&line).unwrap();
        assert_eq!(stream.read_exact(n).await.unwrap(), b"hello");
        assert_eq!(stream.read_line().await.unwrap(), b")");
    }

    #[tokio::test]
    async fn test_read_chunk_bounded() {
        let transport = MockTransport::new().with_greeting(b"abcdefgh");
        let mut stream = connected(transport).await;
        assert_eq!(&stream.read_chunk(3).await.unwrap()[..], b"abc");
        assert_eq!(stream.available(), 5);
        stream.discard(4).await.unwrap();
        assert_eq!(&stream.read_chunk(10).await.unwrap()[..], b"h");
    }

    #[tokio::test]
    async fn test_eof_is_connection_closed() {
        let transport = MockTransport::new().with_greeting(b"partial");
        let mut stream = connected(transport).await;
        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(!stream.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_closes_transport() {
        let transport = MockTransport::new().stall_when_empty();
        let mut stream = connected(transport).await;
        stream.set_read_timeout(Duration::from_secs(5));
        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::Timeout(d) if d == Duration::from_secs(5)));
        assert!(!stream.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_line_keeps_connection() {
        let transport = MockTransport::new().stall_when_empty();
        let mut stream = connected(transport).await;
        let line = stream.poll_line(Duration::from_secs(600)).await.unwrap();
        assert!(line.is_none());
        assert!(stream.is_connected());

        stream.transport_mut().push_inbound(b"* 4 EXISTS\r\n");
        let line = stream.poll_line(Duration::from_secs(1)).await.unwrap();
        assert_eq!(line.as_deref(), Some(&b"* 4 EXISTS"[..]));
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let transport = MockTransport::new().with_greeting(&[b'x'; 300]);
        let mut stream = connected(transport).await;
        stream.set_max_line_length(100);
        let err = stream.read_line().await.unwrap_err();
        assert!(matches!(err, Error::LineTooLong(100)));
    }

    #[tokio::test]
    async fn test_write_requires_connection() {
        let mut stream = FramedStream::new(MockTransport::new());
        let err = stream.write_all(b"NOOP\r\n").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_refused() {
        let mut stream = FramedStream::new(MockTransport::new().refuse_connections());
        let err = stream
            .connect("mail.example.com", 25, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ConnectionRefused(_)));
    }

    #[test]
    fn test_write_records_bytes() {
        tokio_test::block_on(async {
            let mut stream = connected(MockTransport::new()).await;
            tokio_test::assert_ok!(stream.write_all(b"EHLO host\r\n").await);
            assert_eq!(stream.transport().sent_str(), "EHLO host\r\n");
        });
    }
}
