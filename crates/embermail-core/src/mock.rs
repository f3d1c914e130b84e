//! In-memory transport for tests.
//!
//! [`MockTransport`] plays a server: a greeting is queued on every connect
//! and an optional responder turns each write into reply bytes.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use crate::transport::Transport;

type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

/// Scriptable [`Transport`] backed by byte queues.
pub struct MockTransport {
    greeting: Vec<u8>,
    inbound: VecDeque<u8>,
    sent: Vec<u8>,
    responder: Option<Responder>,
    read_limit: usize,
    stall: bool,
    refuse: bool,
    fail_tls: bool,
    reachable: bool,
    connected: bool,
    secure: bool,
    connects: usize,
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MockTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockTransport")
            .field("connected", &self.connected)
            .field("secure", &self.secure)
            .field("connects", &self.connects)
            .field("pending", &self.inbound.len())
            .finish_non_exhaustive()
    }
}

impl MockTransport {
    /// Creates a transport with no greeting and no responder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            greeting: Vec::new(),
            inbound: VecDeque::new(),
            sent: Vec::new(),
            responder: None,
            read_limit: usize::MAX,
            stall: false,
            refuse: false,
            fail_tls: false,
            reachable: true,
            connected: false,
            secure: false,
            connects: 0,
        }
    }

    /// Bytes queued on every successful connect.
    #[must_use]
    pub fn with_greeting(mut self, greeting: &[u8]) -> Self {
        self.greeting = greeting.to_vec();
        self
    }

    /// Installs a responder fed with every written buffer.
    #[must_use]
    pub fn with_responder(mut self, f: impl FnMut(&[u8]) -> Vec<u8> + Send + 'static) -> Self {
        self.responder = Some(Box::new(f));
        self
    }

    /// Installs a responder called once per complete written line.
    ///
    /// Lines are passed without their CRLF.
    #[must_use]
    pub fn with_line_responder(self, mut f: impl FnMut(&str) -> Vec<u8> + Send + 'static) -> Self {
        let mut pending = Vec::new();
        self.with_responder(move |data| {
            pending.extend_from_slice(data);
            let mut out = Vec::new();
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                let text = String::from_utf8_lossy(&line);
                out.extend(f(text.trim_end_matches(['\r', '\n'])));
            }
            out
        })
    }

    /// Caps the number of bytes returned by a single read.
    #[must_use]
    pub const fn with_read_limit(mut self, limit: usize) -> Self {
        self.read_limit = limit;
        self
    }

    /// Makes reads wait forever when nothing is queued instead of
    /// reporting end of stream.
    #[must_use]
    pub const fn stall_when_empty(mut self) -> Self {
        self.stall = true;
        self
    }

    /// Makes every connect fail with `ConnectionRefused`.
    #[must_use]
    pub const fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Makes the TLS handshake fail.
    #[must_use]
    pub const fn fail_tls(mut self) -> Self {
        self.fail_tls = true;
        self
    }

    /// Sets the host probe result.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Queues bytes as if the server had sent them.
    pub fn push_inbound(&mut self, data: &[u8]) {
        self.inbound.extend(data);
    }

    /// Drops the connection as a network failure would.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.secure = false;
        self.inbound.clear();
    }

    /// Everything written so far.
    #[must_use]
    pub fn sent(&self) -> &[u8] {
        &self.sent
    }

    /// Everything written so far, lossily decoded.
    #[must_use]
    pub fn sent_str(&self) -> String {
        String::from_utf8_lossy(&self.sent).into_owned()
    }

    /// Forgets recorded writes.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }

    /// Number of successful connects.
    #[must_use]
    pub const fn connect_count(&self) -> usize {
        self.connects
    }
}

impl Transport for MockTransport {
    async fn connect(&mut self, _host: &str, _port: u16, _timeout: Duration) -> io::Result<()> {
        if self.refuse {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        self.connected = true;
        self.secure = false;
        self.connects += 1;
        self.inbound.clear();
        self.inbound.extend(&self.greeting);
        Ok(())
    }

    async fn connect_secure(&mut self, _host: &str, _verify: bool) -> io::Result<()> {
        if self.fail_tls {
            return Err(io::Error::other("handshake failure"));
        }
        self.secure = true;
        Ok(())
    }

    async fn write(&mut self, data: &[u8]) -> io::Result<()> {
        if !self.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        self.sent.extend_from_slice(data);
        if let Some(responder) = self.responder.as_mut() {
            let reply = responder(data);
            self.inbound.extend(reply);
        }
        Ok(())
    }

    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.connected {
            return Ok(0);
        }
        if self.inbound.is_empty() {
            if self.stall {
                std::future::pending::<()>().await;
            }
            return Ok(0);
        }
        let n = buf.len().min(self.read_limit).min(self.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(self.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn is_secure(&self) -> bool {
        self.secure
    }

    async fn close(&mut self) {
        self.connected = false;
        self.secure = false;
    }

    async fn probe_host(&mut self, _host: &str) -> bool {
        self.reachable
    }
}
