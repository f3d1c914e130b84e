//! The SMTP session.
//!
//! One [`SmtpSession`] owns one connection. [`SmtpSession::send`] runs the
//! whole exchange: greeting, `EHLO` (or `HELO`), optional `STARTTLS`,
//! authentication, envelope, then the body over `BDAT` when the server
//! offers `CHUNKING` and `DATA` otherwise. The body is composed while it
//! is written, so a message is never held in memory whole.
//!
//! Like the IMAP engine, every public operation updates
//! [`SmtpSession::status`] and emits a terminal error event before it
//! returns an error. A dropped connection is reopened by the next call,
//! subject to the reconnect cooldown.

mod transfer;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use embermail_core::{
    Clock, DefaultNetwork, FramedStream, NetworkHandler, NoopSink, ReconnectGate, Secret,
    Security, SessionConfig, Status, StatusEvent, StatusSink, Storage, SystemClock, Transport,
    sasl,
};
use tracing::{debug, info, trace, warn};

use crate::command::{BodyType, Command};
use crate::compose::Composer;
use crate::error::{Error, Result};
use crate::message::{ContentSource, Message};
use crate::options::{SendOptions, SendReport};
use crate::parser::{is_last_reply_line, parse_reply};
use crate::types::{AuthMechanism, Extension, Reply, ReplyCode};

use self::transfer::{BdatWriter, DataWriter, Progress};

/// Longest multi-line reply accepted.
const MAX_REPLY_LINES: usize = 128;

/// Where the session is in the SMTP exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Greeted and introduced with `EHLO`/`HELO`.
    Connected,
    /// Logged in, or no login needed.
    Authenticated,
}

/// Server capabilities from the EHLO response.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Server hostname from the EHLO reply.
    pub hostname: String,
    /// Greeting text.
    pub greeting: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
    /// False when the server only accepted `HELO`.
    pub esmtp: bool,
}

impl ServerInfo {
    fn from_ehlo(reply: &Reply, greeting: String) -> Self {
        let mut lines = reply.lines.iter();
        let hostname = lines
            .next()
            .and_then(|l| l.split_whitespace().next())
            .unwrap_or_default()
            .to_string();
        Self {
            hostname,
            greeting,
            extensions: lines.map(|l| Extension::parse(l)).collect(),
            esmtp: true,
        }
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Returns the maximum message size, if advertised.
    ///
    /// `SIZE 0` means no fixed limit.
    #[must_use]
    pub fn max_message_size(&self) -> Option<u64> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(Some(size)) if *size > 0 => Some(*size),
            _ => None,
        })
    }

    /// Returns true if any `SIZE` keyword was advertised.
    #[must_use]
    pub fn announces_size(&self) -> bool {
        self.extensions
            .iter()
            .any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        let mut all = Vec::new();
        for ext in &self.extensions {
            if let Extension::Auth(mechanisms) = ext {
                for mechanism in mechanisms {
                    if !all.contains(mechanism) {
                        all.push(*mechanism);
                    }
                }
            }
        }
        all
    }

    /// Returns true if `mechanism` was advertised.
    #[must_use]
    pub fn has_auth(&self, mechanism: AuthMechanism) -> bool {
        self.auth_mechanisms().contains(&mechanism)
    }
}

/// An SMTP client session over a [`Transport`].
pub struct SmtpSession<T> {
    stream: FramedStream<T>,
    config: SessionConfig,
    options: SendOptions,
    state: SessionState,
    server: ServerInfo,
    status: Status,
    last_text: String,
    needs_reset: bool,
    sink: Box<dyn StatusSink>,
    network: Box<dyn NetworkHandler>,
    clock: Arc<dyn Clock>,
    gate: ReconnectGate,
    storage: Option<Box<dyn Storage>>,
}

impl<T> std::fmt::Debug for SmtpSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSession")
            .field("host", &self.config.server.host)
            .field("state", &self.state)
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> SmtpSession<T> {
    /// Creates a disconnected session.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let mut stream = FramedStream::new(transport);
        stream.set_read_timeout(config.timeouts.read);
        Self {
            stream,
            gate: ReconnectGate::new(config.reconnect),
            config,
            options: SendOptions::default(),
            state: SessionState::Disconnected,
            server: ServerInfo::default(),
            status: Status::default(),
            last_text: String::new(),
            needs_reset: false,
            sink: Box::new(NoopSink),
            network: Box::new(DefaultNetwork),
            clock: Arc::new(SystemClock),
            storage: None,
        }
    }

    /// Sets the status/progress sink.
    #[must_use]
    pub fn with_status_sink(mut self, sink: impl StatusSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    /// Sets the network handler consulted before commands.
    #[must_use]
    pub fn with_network_handler(mut self, network: impl NetworkHandler + 'static) -> Self {
        self.network = Box::new(network);
        self
    }

    /// Sets the clock used for `Date` headers and reconnect cooldowns.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the storage file attachments are read from.
    #[must_use]
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Sets the transfer options.
    #[must_use]
    pub const fn with_options(mut self, options: SendOptions) -> Self {
        self.options = options;
        self
    }

    /// Outcome of the last operation.
    #[must_use]
    pub const fn status(&self) -> &Status {
        &self.status
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        self.state
    }

    /// What the server advertised.
    #[must_use]
    pub const fn server_info(&self) -> &ServerInfo {
        &self.server
    }

    /// The session configuration.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Returns true while connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.stream.is_connected() && self.state != SessionState::Disconnected
    }

    /// The underlying transport.
    pub const fn transport(&self) -> &T {
        self.stream.transport()
    }

    /// The underlying transport, mutably.
    pub const fn transport_mut(&mut self) -> &mut T {
        self.stream.transport_mut()
    }

    /// The attached storage.
    pub fn storage_mut(&mut self) -> Option<&mut (dyn Storage + 'static)> {
        self.storage.as_deref_mut()
    }

    /// Records the outcome of a public operation.
    fn finish<R>(&mut self, op: &str, result: Result<R>) -> Result<R> {
        match &result {
            Ok(_) => {
                let text = std::mem::take(&mut self.last_text);
                self.status = Status::ok(text);
            }
            Err(e) => {
                let code = e.status_code();
                warn!(op, code = ?code, error = %e, "operation failed");
                self.status = Status::error(code, e.to_string());
                self.sink.on_status(&StatusEvent::error(code, format!("{op}: {e}")));
            }
        }
        result
    }

    /// Connects, reads the greeting and introduces the client, upgrading
    /// with STARTTLS when configured.
    ///
    /// # Errors
    ///
    /// Returns connection errors, [`Error::Smtp`] for a refusing greeting,
    /// or [`Error::CapabilityMissing`] when STARTTLS is required but not
    /// offered.
    pub async fn connect(&mut self) -> Result<()> {
        let result = self.open().await;
        self.finish("connect", result)
    }

    /// Logs in with the configured credentials.
    ///
    /// An access token uses `XOAUTH2` (or `OAUTHBEARER`); a password uses
    /// `PLAIN` when advertised and `LOGIN` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`] or [`Error::AuthNotSupported`].
    pub async fn authenticate(&mut self) -> Result<()> {
        let result = self.login().await;
        self.finish("authenticate", result)
    }

    /// Connects and, when credentials are configured, authenticates.
    ///
    /// # Errors
    ///
    /// See [`SmtpSession::connect`] and [`SmtpSession::authenticate`].
    pub async fn open_session(&mut self) -> Result<()> {
        let result = self.open_and_login().await;
        self.finish("open", result)
    }

    /// Sends `message`.
    ///
    /// Opens the session first if needed. With `keep_open` the connection
    /// stays up for another message; otherwise `QUIT` follows a success
    /// and the connection is dropped after a failure.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRecipients`], [`Error::MessageTooLarge`],
    /// [`Error::RecipientRejected`], [`Error::Attachment`], server
    /// replies as [`Error::Smtp`], or connection errors.
    pub async fn send(&mut self, message: &Message, keep_open: bool) -> Result<SendReport> {
        let result = self.transaction(message).await;
        match &result {
            Ok(report) => {
                info!(
                    bytes = report.bytes,
                    recipients = report.recipients,
                    chunks = report.chunks,
                    "message sent"
                );
                self.sink.on_status(&StatusEvent::success("message sent"));
                if !keep_open && let Err(e) = self.close_politely().await {
                    debug!(error = %e, "QUIT failed after send");
                }
            }
            Err(_) if !keep_open => self.drop_connection().await,
            Err(_) => {}
        }
        self.finish("send", result)
    }

    /// Sends `NOOP`.
    ///
    /// # Errors
    ///
    /// Returns connection errors or the server's refusal.
    pub async fn noop(&mut self) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.command(&Command::Noop).await?.success().map(drop)
        }
        .await;
        self.finish("noop", result)
    }

    /// Aborts any mail transaction with `RSET`.
    ///
    /// # Errors
    ///
    /// Returns connection errors or the server's refusal.
    pub async fn reset(&mut self) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.command(&Command::Rset).await?.success()?;
            self.needs_reset = false;
            Ok(())
        }
        .await;
        self.finish("reset", result)
    }

    /// Sends `QUIT` and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns connection errors; the connection is closed either way.
    pub async fn quit(&mut self) -> Result<()> {
        let result = self.close_politely().await;
        self.finish("quit", result)
    }

    /// Closes the connection without `QUIT`.
    pub async fn close(&mut self) {
        self.drop_connection().await;
    }

    async fn close_politely(&mut self) -> Result<()> {
        let result = if self.is_connected() {
            self.command(&Command::Quit).await.map(drop)
        } else {
            Ok(())
        };
        self.drop_connection().await;
        result
    }

    async fn drop_connection(&mut self) {
        self.stream.close().await;
        self.state = SessionState::Disconnected;
        self.needs_reset = false;
    }

    async fn open_and_login(&mut self) -> Result<()> {
        self.open().await?;
        if self.config.credentials.is_present() {
            self.login().await?;
        } else {
            self.state = SessionState::Authenticated;
        }
        Ok(())
    }

    async fn open(&mut self) -> Result<()> {
        self.config.ensure_valid()?;
        let server = self.config.server.clone();
        self.state = SessionState::Disconnected;
        self.server = ServerInfo::default();
        self.needs_reset = false;

        self.stream
            .connect(&server.host, server.port, self.config.timeouts.connect)
            .await?;
        if server.security == Security::Implicit {
            self.stream
                .start_tls(&server.host, server.verify_certificate)
                .await?;
        }

        let greeting = read_reply(&mut self.stream).await?;
        if greeting.code != ReplyCode::SERVICE_READY {
            self.stream.close().await;
            return Err(greeting.into_error());
        }
        let greeting = greeting.text();
        self.state = SessionState::Connected;
        self.hello(greeting.clone()).await?;
        info!(host = %server.host, port = server.port, esmtp = self.server.esmtp, "connected");

        if server.security == Security::StartTls {
            if !self.server.supports_starttls() {
                self.drop_connection().await;
                return Err(Error::CapabilityMissing("STARTTLS"));
            }
            self.command(&Command::StartTls)
                .await?
                .require(ReplyCode::SERVICE_READY)?;
            self.stream
                .start_tls(&server.host, server.verify_certificate)
                .await?;
            // Extensions must be learned again over TLS.
            self.hello(greeting).await?;
            debug!("STARTTLS complete");
        }
        Ok(())
    }

    /// `EHLO`, falling back to `HELO` when the server rejects it.
    async fn hello(&mut self, greeting: String) -> Result<()> {
        let hostname = self.config.client_domain.clone();
        let reply = self
            .command(&Command::Ehlo {
                hostname: hostname.clone(),
            })
            .await?;
        if reply.is_success() {
            self.server = ServerInfo::from_ehlo(&reply, greeting);
            return Ok(());
        }
        if !reply.code.is_permanent() {
            return Err(reply.into_error());
        }
        debug!(code = %reply.code, "EHLO rejected, trying HELO");
        let reply = self.command(&Command::Helo { hostname }).await?.success()?;
        self.server = ServerInfo {
            hostname: reply.text(),
            greeting,
            extensions: HashSet::new(),
            esmtp: false,
        };
        Ok(())
    }

    async fn login(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Err(embermail_core::Error::NotConnected.into()),
            SessionState::Authenticated => return Ok(()),
            SessionState::Connected => {}
        }
        let credentials = self.config.credentials.clone();
        if self.server.auth_mechanisms().is_empty() && credentials.is_present() {
            warn!("server offers no AUTH, continuing without login");
            self.state = SessionState::Authenticated;
            return Ok(());
        }
        match &credentials.secret {
            Secret::None => return Err(Error::AuthNotSupported),
            Secret::AccessToken(token) => {
                if self.server.has_auth(AuthMechanism::XOAuth2) {
                    let response = sasl::xoauth2_response(&credentials.user, token);
                    self.sasl(AuthMechanism::XOAuth2, response).await?;
                } else if self.server.has_auth(AuthMechanism::OAuthBearer) {
                    let response = sasl::oauthbearer_response(&credentials.user, token);
                    self.sasl(AuthMechanism::OAuthBearer, response).await?;
                } else {
                    return Err(Error::AuthNotSupported);
                }
            }
            Secret::Password(password) => {
                if self.server.has_auth(AuthMechanism::Plain) {
                    let response = sasl::plain_response(&credentials.user, password);
                    self.sasl(AuthMechanism::Plain, response).await?;
                } else if self.server.has_auth(AuthMechanism::Login) {
                    self.auth_login(&credentials.user, password).await?;
                } else {
                    return Err(Error::AuthNotSupported);
                }
            }
        }
        self.state = SessionState::Authenticated;
        info!(user = %credentials.user, "authenticated");
        Ok(())
    }

    async fn sasl(&mut self, mechanism: AuthMechanism, response: String) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism,
                initial_response: Some(response),
            })
            .await?;
        let reply = if reply.code == ReplyCode::AUTH_CONTINUE {
            // Error details arrive as a challenge; an empty answer ends
            // the exchange.
            let challenge = reply.text();
            debug!(?mechanism, detail = ?sasl::decode_challenge(&challenge), "authentication challenge");
            self.write_line("").await?;
            read_reply(&mut self.stream).await?
        } else {
            reply
        };
        if reply.code == ReplyCode::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(auth_error(reply))
        }
    }

    async fn auth_login(&mut self, user: &str, password: &str) -> Result<()> {
        let reply = self
            .command(&Command::Auth {
                mechanism: AuthMechanism::Login,
                initial_response: None,
            })
            .await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(auth_error(reply));
        }
        self.write_line(&sasl::login_encode(user)).await?;
        let reply = read_reply(&mut self.stream).await?;
        if reply.code != ReplyCode::AUTH_CONTINUE {
            return Err(auth_error(reply));
        }
        self.write_line(&sasl::login_encode(password)).await?;
        let reply = read_reply(&mut self.stream).await?;
        if reply.code == ReplyCode::AUTH_SUCCESS {
            Ok(())
        } else {
            Err(auth_error(reply))
        }
    }

    /// Makes sure a usable, authenticated connection exists.
    async fn ensure_ready(&mut self) -> Result<()> {
        if self.stream.is_connected() && self.state == SessionState::Authenticated {
            if self.network.is_network_up() {
                return Ok(());
            }
            warn!("network down, dropping connection");
            self.drop_connection().await;
        }
        if self.stream.is_connected() && self.state == SessionState::Connected {
            if self.config.credentials.is_present() {
                return self.login().await;
            }
            self.state = SessionState::Authenticated;
            return Ok(());
        }
        self.reconnect().await
    }

    async fn reconnect(&mut self) -> Result<()> {
        // Only a failed previous operation starts the cooldown; a session
        // closed after a successful send reopens right away.
        if !self.status.is_ok() {
            self.gate.try_acquire(self.clock.now())?;
        }
        if !self.network.is_network_up() && !self.network.resume() {
            return Err(embermail_core::Error::Unreachable(self.config.server.host.clone()).into());
        }
        info!(host = %self.config.server.host, "connecting");
        self.sink.on_status(&StatusEvent::info("connecting"));
        self.open_and_login().await
    }

    /// Current time in the configured zone.
    fn now(&self) -> DateTime<FixedOffset> {
        let offset = FixedOffset::east_opt(self.config.time.utc_offset_minutes * 60)
            .unwrap_or_else(|| Utc.fix());
        self.clock.now().with_timezone(&offset)
    }

    async fn transaction(&mut self, message: &Message) -> Result<SendReport> {
        if message.recipients().next().is_none() {
            return Err(Error::NoRecipients);
        }
        self.ensure_ready().await?;
        if self.needs_reset {
            debug!("resetting previous transaction");
            self.command(&Command::Rset).await?.success()?;
            self.needs_reset = false;
        }
        self.check_sources(message).await?;
        self.sink.on_status(&StatusEvent::info("sending message"));

        let date = message.date.unwrap_or_else(|| self.now());
        let seed: u64 = rand::random();
        let size = if message.has_file_sources() {
            None
        } else {
            Some(Composer::with_seed(date, seed).measure(message).await?)
        };
        if let (Some(size), Some(limit)) = (size, self.server.max_message_size())
            && size > limit
        {
            return Err(Error::MessageTooLarge { size, limit });
        }

        let eight_bit = message.needs_8bit();
        let body = if eight_bit
            && self.options.use_8bitmime
            && self.server.supports(&Extension::EightBitMime)
        {
            Some(BodyType::EightBitMime)
        } else {
            if eight_bit {
                warn!("8bit content but 8BITMIME not in use");
            }
            None
        };

        let declared = size.filter(|_| self.server.announces_size());
        self.needs_reset = true;
        self.command(&Command::MailFrom {
            from: message.from.address.clone(),
            body,
            size: declared,
        })
        .await?
        .success()?;

        let notify = message
            .notify
            .filter(|_| self.server.supports(&Extension::Dsn));
        let mut recipients = 0;
        for rcpt in message.recipients() {
            let reply = self
                .command(&Command::RcptTo {
                    to: rcpt.address.clone(),
                    notify,
                })
                .await?;
            if !reply.is_success() {
                warn!(
                    address = %rcpt.address,
                    code = %reply.code,
                    status = ?reply.enhanced().map(|s| s.to_string()),
                    "recipient rejected"
                );
                return Err(Error::RecipientRejected {
                    address: rcpt.address.to_string(),
                    code: reply.code.as_u16(),
                    message: reply.text(),
                });
            }
            recipients += 1;
        }

        let chunking = self.options.chunking && self.server.supports(&Extension::Chunking);
        let result = if chunking {
            self.transfer_bdat(message, date, seed, size).await
        } else {
            self.transfer_data(message, date, seed, size).await
        };
        let (bytes, chunks) = match result {
            Ok(done) => done,
            Err(e) => {
                // Mid-body the server cannot be resynchronized.
                warn!(error = %e, "body transfer failed, closing");
                self.drop_connection().await;
                return Err(e);
            }
        };
        self.needs_reset = false;
        Ok(SendReport {
            bytes,
            recipients,
            chunks,
            response: self.last_text.clone(),
        })
    }

    async fn transfer_data(
        &mut self,
        message: &Message,
        date: DateTime<FixedOffset>,
        seed: u64,
        total: Option<u64>,
    ) -> Result<(u64, usize)> {
        self.command(&Command::Data)
            .await?
            .require(ReplyCode::START_DATA)?;
        let mut composer = Composer::with_seed(date, seed);
        composer.set_storage(self.storage.as_deref_mut());
        let mut writer = DataWriter::new(&mut self.stream, Progress::new(&mut *self.sink, total));
        composer.write_message(message, &mut writer).await?;
        let (bytes, reply) = writer.finish().await?;
        self.last_text = reply.text();
        Ok((bytes, 0))
    }

    async fn transfer_bdat(
        &mut self,
        message: &Message,
        date: DateTime<FixedOffset>,
        seed: u64,
        total: Option<u64>,
    ) -> Result<(u64, usize)> {
        let pipelining = self.server.supports(&Extension::Pipelining);
        let mut composer = Composer::with_seed(date, seed);
        composer.set_storage(self.storage.as_deref_mut());
        let mut writer = BdatWriter::new(
            &mut self.stream,
            self.options.chunk_size,
            pipelining,
            Progress::new(&mut *self.sink, total),
        );
        composer.write_message(message, &mut writer).await?;
        let (bytes, chunks, reply) = writer.finish().await?;
        self.last_text = reply.text();
        Ok((bytes, chunks))
    }

    /// Fails early when a file attachment cannot be read.
    async fn check_sources(&mut self, message: &Message) -> Result<()> {
        let mut pending = vec![message];
        while let Some(message) = pending.pop() {
            for source in message.sources() {
                let ContentSource::File(path) = source else {
                    continue;
                };
                let storage = match self.storage.as_deref_mut() {
                    Some(storage) if storage.is_ready() => storage,
                    _ => return Err(embermail_core::Error::StorageNotReady.into()),
                };
                if !storage.exists(path).await {
                    return Err(Error::Attachment(format!("{path} not found")));
                }
            }
            pending.extend(&message.rfc822);
        }
        Ok(())
    }

    /// Sends a command and reads its reply without judging the code.
    ///
    /// A 421 reply drops the connection and becomes an error.
    async fn command(&mut self, command: &Command) -> Result<Reply> {
        let line = command.serialize();
        if command.is_sensitive() {
            debug!("> AUTH <credentials>");
        } else {
            debug!("> {}", String::from_utf8_lossy(&line).trim_end());
        }
        self.stream.write_all(&line).await?;
        let reply = read_reply(&mut self.stream).await?;
        self.last_text = reply.text();
        if reply.code == ReplyCode::SERVICE_UNAVAILABLE {
            warn!(text = %self.last_text, "server closing connection");
            self.drop_connection().await;
            return Err(reply.into_error());
        }
        Ok(reply)
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        let line = format!("{line}\r\n");
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

/// Reads one complete, possibly multi-line, reply.
pub(crate) async fn read_reply<T: Transport>(stream: &mut FramedStream<T>) -> Result<Reply> {
    let mut lines = Vec::new();
    loop {
        let raw = stream.read_line().await?;
        let line = String::from_utf8_lossy(&raw).into_owned();
        trace!("< {line}");
        let last = is_last_reply_line(&line);
        lines.push(line);
        if last {
            return parse_reply(&lines);
        }
        if lines.len() >= MAX_REPLY_LINES {
            return Err(Error::Protocol("reply has too many lines".into()));
        }
    }
}

fn auth_error(reply: Reply) -> Error {
    Error::AuthFailed(format!("{} {}", reply.code, reply.text()))
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

    fn reply(lines: &[&str]) -> Reply {
        let lines: Vec<String> = lines.iter().map(ToString::to_string).collect();
        parse_reply(&lines).unwrap()
    }

    #[test]
    fn test_server_info_from_ehlo() {
        let info = ServerInfo::from_ehlo(
            &reply(&[
                "250-mx.example.com Hello",
                "250-SIZE 35882577",
                "250-8BITMIME",
                "250-AUTH LOGIN PLAIN",
                "250-AUTH=LOGIN",
                "250-CHUNKING",
                "250 PIPELINING",
            ]),
            "ready".to_string(),
        );
        assert_eq!(info.hostname, "mx.example.com");
        assert!(info.esmtp);
        assert_eq!(info.max_message_size(), Some(35_882_577));
        assert!(info.supports(&Extension::Chunking));
        assert!(info.supports(&Extension::Pipelining));
        assert!(!info.supports_starttls());
        assert_eq!(
            info.auth_mechanisms(),
            vec![AuthMechanism::Login, AuthMechanism::Plain]
        );
        assert!(!info.has_auth(AuthMechanism::XOAuth2));
    }

    #[test]
    fn test_size_zero_means_unlimited() {
        let info = ServerInfo::from_ehlo(&reply(&["250-mx", "250 SIZE 0"]), String::new());
        assert!(info.announces_size());
        assert_eq!(info.max_message_size(), None);
    }
}
