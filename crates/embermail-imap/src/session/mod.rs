//! The IMAP session.
//!
//! One [`ImapSession`] owns one connection and keeps exactly one command
//! in flight. Every command carries the fixed tag [`TAG`]; the reply is
//! complete at the first line starting with `EM OK|NO|BAD`. Untagged data
//! read on the way is interpreted according to the kind of the command
//! that was issued.
//!
//! Every public operation updates [`ImapSession::status`] and, before it
//! returns an error, pushes a terminal error event into the status sink.
//! When the connection has dropped, the next operation reconnects,
//! authenticates and reselects the mailbox, subject to the reconnect
//! cooldown.

mod fetch;
mod idle;
mod mailbox;

pub use idle::{
    DEFAULT_IDLE_TIMEOUT, DEFAULT_PROBE_INTERVAL, IdleEvent, MAX_IDLE_TIMEOUT, MIN_IDLE_TIMEOUT,
    clamp_idle_timeout,
};
pub use mailbox::CustomResponse;

use std::sync::Arc;

use embermail_codec::CharsetDecoder;
use embermail_core::{
    Clock, DefaultNetwork, FramedStream, MemoryGuard, NetworkHandler,
    NoopSink, ReconnectGate, Secret, Security, SessionConfig, Status, StatusEvent, StatusSink,
    Storage, SystemClock, Transport, literal_length, sasl,
};
use tracing::{debug, info, trace, warn};

use crate::command::{self, CommandKind};
use crate::error::{Error, Result};
use crate::part_sink::PartSink;
use crate::response::{
    Completion, FetchItem, ItemValue, Line, TAG, fetch_start, quote, scan_fetch_items, split_code,
};
use crate::types::{Capabilities, Capability, FetchStats, Flags, MailboxInfo};

use self::fetch::BodyStream;
use self::idle::IdleState;

/// Longest literal kept in memory outside of streamed part content.
const MAX_LITERAL: usize = 64 * 1024;

/// Where the session is in the IMAP state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection.
    Disconnected,
    /// Greeting received, not logged in.
    NotAuthenticated,
    /// Logged in.
    Authenticated,
    /// A mailbox is selected.
    Selected,
}

/// Tagged completion of a command.
#[derive(Debug, Clone)]
pub(crate) struct Tagged {
    pub completion: Completion,
    pub code: Option<String>,
    pub text: String,
}

/// One `NAME value` item of a FETCH response, with its literal if any.
#[derive(Debug, Clone)]
pub(crate) struct FetchValue {
    pub item: FetchItem,
    /// Literal octets; `None` when the value was inline or was streamed.
    pub literal: Option<Vec<u8>>,
}

/// A complete `* n FETCH (...)` response.
#[derive(Debug, Clone, Default)]
pub(crate) struct FetchResponse {
    pub number: u32,
    pub items: Vec<FetchValue>,
}

impl FetchResponse {
    fn item(&self, name: &str) -> Option<&FetchValue> {
        self.items.iter().find(|v| v.item.is(name))
    }

    pub fn uid(&self) -> Option<u32> {
        self.item("UID").and_then(|v| v.item.number())
    }

    pub fn size(&self) -> Option<u32> {
        self.item("RFC822.SIZE").and_then(|v| v.item.number())
    }

    pub fn flags(&self) -> Option<Flags> {
        match &self.item("FLAGS")?.item.value {
            ItemValue::List(list) => Some(Flags::parse_list(list)),
            _ => None,
        }
    }

    /// Content of the first body item whose section satisfies `matches`.
    ///
    /// `Some(None)` is an explicit `NIL`.
    pub fn body(&self, matches: impl Fn(&str) -> bool) -> Option<Option<&[u8]>> {
        let value = self
            .items
            .iter()
            .find(|v| v.item.section().is_some_and(&matches))?;
        Some(match (&value.item.value, &value.literal) {
            (_, Some(bytes)) => Some(bytes.as_slice()),
            (ItemValue::Quoted(s) | ItemValue::Atom(s), None) => Some(s.as_bytes()),
            (ItemValue::Literal(_), None) => Some(&[][..]),
            _ => None,
        })
    }

    /// Returns true if the response is about `id`.
    pub fn is_for(&self, id: crate::types::MessageId) -> bool {
        match id {
            crate::types::MessageId::Number(n) => self.number == n,
            crate::types::MessageId::Uid(uid) => self.uid() == Some(uid),
        }
    }
}

/// Untagged data read while a command was in flight.
#[derive(Debug, Clone)]
pub(crate) enum Untagged {
    /// Any non-FETCH data, with small literals spliced in as quoted
    /// strings.
    Data(String),
    /// A FETCH response.
    Fetch(FetchResponse),
}

/// Everything read for one command.
#[derive(Debug, Default)]
pub(crate) struct Reply {
    pub untagged: Vec<Untagged>,
    pub tagged: Option<Tagged>,
    pub continuation: Option<String>,
}

impl Reply {
    /// Turns `NO`/`BAD` and stray continuations into errors.
    pub fn check(self) -> Result<Self> {
        if let Some(text) = &self.continuation {
            return Err(Error::Protocol(format!("unexpected continuation: {text}")));
        }
        match &self.tagged {
            Some(t) if t.completion == Completion::Ok => Ok(self),
            Some(t) if t.completion == Completion::No => Err(Error::No(t.text.clone())),
            Some(t) => Err(Error::Bad(t.text.clone())),
            None => Err(Error::Protocol("missing tagged completion".into())),
        }
    }

    /// Untagged non-FETCH data whose first word is `keyword`, with the
    /// keyword removed.
    pub fn data<'a>(&'a self, keyword: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.untagged.iter().filter_map(move |u| match u {
            Untagged::Data(text) => strip_keyword(text, keyword),
            Untagged::Fetch(_) => None,
        })
    }

    /// FETCH responses.
    pub fn fetches(&self) -> impl Iterator<Item = &FetchResponse> {
        self.untagged.iter().filter_map(|u| match u {
            Untagged::Fetch(f) => Some(f),
            Untagged::Data(_) => None,
        })
    }

    /// Response code of the tagged completion.
    pub fn code(&self) -> Option<&str> {
        self.tagged.as_ref().and_then(|t| t.code.as_deref())
    }
}

/// Strips a leading keyword (case-insensitive) and the space after it.
pub(crate) fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    let (word, rest) = text.split_once(' ').unwrap_or((text, ""));
    word.eq_ignore_ascii_case(keyword).then_some(rest)
}

fn capability_code(code: &str) -> Option<&str> {
    strip_keyword(code, "CAPABILITY")
}

/// An IMAP client session over a [`Transport`].
pub struct ImapSession<T> {
    stream: FramedStream<T>,
    config: SessionConfig,
    state: SessionState,
    capabilities: Capabilities,
    caps_fresh: bool,
    selected: Option<MailboxInfo>,
    last_kind: Option<CommandKind>,
    status: Status,
    last_text: String,
    greeting: String,
    stats: FetchStats,
    sink: Box<dyn StatusSink>,
    network: Box<dyn NetworkHandler>,
    clock: Arc<dyn Clock>,
    gate: ReconnectGate,
    storage: Option<Box<dyn Storage>>,
    charset: Option<Box<dyn CharsetDecoder + Send + Sync>>,
    part_sink: Option<Box<dyn PartSink>>,
    memory: MemoryGuard,
    idle: Option<IdleState>,
    probe_interval: std::time::Duration,
}

impl<T> std::fmt::Debug for ImapSession<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImapSession")
            .field("host", &self.config.server.host)
            .field("state", &self.state)
            .field("selected", &self.selected.as_ref().map(|m| &m.name))
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

impl<T: Transport> ImapSession<T> {
    /// Creates a disconnected session.
    pub fn new(transport: T, config: SessionConfig) -> Self {
        let mut stream = FramedStream::new(transport);
        stream.set_read_timeout(config.timeouts.read);
        Self {
            stream,
            gate: ReconnectGate::new(config.reconnect),
            config,
            state: SessionState::Disconnected,
            capabilities: Capabilities::default(),
            caps_fresh: false,
            selected: None,
            last_kind: None,
            status: Status::default(),
            last_text: String::new(),
            greeting: String::new(),
            stats: FetchStats::default(),
            sink: Box::new(NoopSink),
            network: Box::new(DefaultNetwork),
            clock: Arc::new(SystemClock),
            storage: None,
            charset: None,
            part_sink: None,
            memory: MemoryGuard::disabled(),
            idle: None,
            probe_interval: DEFAULT_PROBE_INTERVAL,
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

    /// Sets the clock used for reconnect cooldowns.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the storage downloads are written to.
    #[must_use]
    pub fn with_storage(mut self, storage: impl Storage + 'static) -> Self {
        self.storage = Some(Box::new(storage));
        self
    }

    /// Installs a charset decoder tried before the built-in ones.
    #[must_use]
    pub fn with_charset_decoder(
        mut self,
        decoder: impl CharsetDecoder + Send + Sync + 'static,
    ) -> Self {
        self.charset = Some(Box::new(decoder));
        self
    }

    /// Installs a callback receiving decoded part content.
    #[must_use]
    pub fn with_part_sink(mut self, sink: impl PartSink + 'static) -> Self {
        self.part_sink = Some(Box::new(sink));
        self
    }

    /// Installs the low-memory guard used between messages.
    #[must_use]
    pub fn with_memory_guard(mut self, guard: MemoryGuard) -> Self {
        self.memory = guard;
        self
    }

    /// Sets how often the host is probed while idling.
    #[must_use]
    pub const fn with_probe_interval(mut self, interval: std::time::Duration) -> Self {
        self.probe_interval = interval;
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

    /// Capabilities last advertised by the server.
    #[must_use]
    pub const fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    /// The selected mailbox.
    #[must_use]
    pub const fn selected(&self) -> Option<&MailboxInfo> {
        self.selected.as_ref()
    }

    /// Kind of the last command issued.
    #[must_use]
    pub const fn last_command(&self) -> Option<CommandKind> {
        self.last_kind
    }

    /// Greeting text from the server.
    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// Counters of the last fetch operation.
    #[must_use]
    pub const fn fetch_stats(&self) -> FetchStats {
        self.stats
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

    fn decoder(&self) -> Option<&dyn CharsetDecoder> {
        self.charset.as_deref().map(|d| d as &dyn CharsetDecoder)
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

    /// Connects and reads the greeting, upgrading with STARTTLS when
    /// configured.
    ///
    /// # Errors
    ///
    /// Returns connection errors, [`Error::Bye`] for a refusing greeting,
    /// or [`Error::CapabilityMissing`] when STARTTLS is required but not
    /// offered.
    pub async fn connect(&mut self) -> Result<()> {
        let result = self.open().await;
        self.finish("connect", result)
    }

    /// Logs in with the configured credentials.
    ///
    /// An access token uses `AUTHENTICATE XOAUTH2` (or `OAUTHBEARER`); a
    /// password uses `AUTHENTICATE PLAIN` when advertised and `LOGIN`
    /// otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AuthFailed`], [`Error::AuthNotSupported`] or
    /// [`Error::LoginDisabled`].
    pub async fn authenticate(&mut self) -> Result<()> {
        let result = self.login().await;
        self.finish("authenticate", result)
    }

    /// Connects and, when credentials are configured, authenticates.
    ///
    /// # Errors
    ///
    /// See [`ImapSession::connect`] and [`ImapSession::authenticate`].
    pub async fn open_session(&mut self) -> Result<()> {
        let result: Result<_> = async {
            self.open().await?;
            if self.config.credentials.is_present() {
                self.login().await?;
            }
            Ok(())
        }
        .await;
        self.finish("open", result)
    }

    /// Refreshes the capability list.
    ///
    /// # Errors
    ///
    /// Returns connection or protocol errors.
    pub async fn capability(&mut self) -> Result<Capabilities> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.refresh_capabilities().await?;
            Ok(self.capabilities.clone())
        }
        .await;
        self.finish("capability", result)
    }

    /// Sends `NOOP`, which also picks up mailbox updates.
    ///
    /// # Errors
    ///
    /// Returns connection or protocol errors.
    pub async fn noop(&mut self) -> Result<()> {
        let result = self.simple(CommandKind::Noop, "NOOP").await;
        self.finish("noop", result)
    }

    /// Sends `LOGOUT` and closes the connection.
    ///
    /// # Errors
    ///
    /// Returns connection or protocol errors; the connection is closed
    /// either way.
    pub async fn logout(&mut self) -> Result<()> {
        let result = if self.is_connected() {
            self.idle = None;
            self.run(CommandKind::Logout, "LOGOUT").await.map(drop)
        } else {
            Ok(())
        };
        self.drop_connection().await;
        self.selected = None;
        self.finish("logout", result)
    }

    /// Closes the connection without `LOGOUT`.
    pub async fn close(&mut self) {
        self.drop_connection().await;
    }

    async fn drop_connection(&mut self) {
        self.stream.close().await;
        self.state = SessionState::Disconnected;
        self.idle = None;
    }

    /// Runs a command that only needs a successful completion.
    async fn simple(&mut self, kind: CommandKind, command: &str) -> Result<()> {
        self.ensure_ready().await?;
        self.run(kind, command).await.map(drop)
    }

    async fn open(&mut self) -> Result<()> {
        self.config.ensure_valid()?;
        let server = self.config.server.clone();
        self.state = SessionState::Disconnected;
        self.capabilities = Capabilities::default();
        self.idle = None;

        self.stream
            .connect(&server.host, server.port, self.config.timeouts.connect)
            .await?;
        if server.security == Security::Implicit {
            self.stream
                .start_tls(&server.host, server.verify_certificate)
                .await?;
        }

        let raw = self.stream.read_line().await?;
        let Line::Untagged(text) = Line::classify(&raw) else {
            self.stream.close().await;
            return Err(Error::Protocol(format!(
                "unexpected greeting: {}",
                String::from_utf8_lossy(&raw)
            )));
        };
        let (status, rest) = text.split_once(' ').unwrap_or((&text, ""));
        let (code, rest) = split_code(rest);
        match status.to_ascii_uppercase().as_str() {
            "OK" => self.state = SessionState::NotAuthenticated,
            "PREAUTH" => self.state = SessionState::Authenticated,
            "BYE" => {
                self.stream.close().await;
                return Err(Error::Bye(rest.to_string()));
            }
            _ => {
                self.stream.close().await;
                return Err(Error::Protocol(format!("unexpected greeting: {text}")));
            }
        }
        if let Some(list) = code.and_then(capability_code) {
            self.capabilities = Capabilities::parse(list);
        }
        self.greeting = rest.to_string();
        info!(host = %server.host, port = server.port, state = ?self.state, "connected");

        if server.security == Security::StartTls {
            if self.capabilities.is_empty() {
                self.refresh_capabilities().await?;
            }
            if !self.capabilities.has(&Capability::StartTls) {
                self.drop_connection().await;
                return Err(Error::CapabilityMissing("STARTTLS"));
            }
            self.run(CommandKind::StartTls, "STARTTLS").await?;
            self.stream
                .start_tls(&server.host, server.verify_certificate)
                .await?;
            self.capabilities = Capabilities::default();
            self.refresh_capabilities().await?;
        }
        Ok(())
    }

    async fn refresh_capabilities(&mut self) -> Result<()> {
        self.run(CommandKind::Capability, "CAPABILITY").await.map(drop)
    }

    async fn login(&mut self) -> Result<()> {
        match self.state {
            SessionState::Disconnected => return Err(embermail_core::Error::NotConnected.into()),
            SessionState::Authenticated | SessionState::Selected => return Ok(()),
            SessionState::NotAuthenticated => {}
        }
        if self.capabilities.is_empty() {
            self.refresh_capabilities().await?;
        }
        let credentials = self.config.credentials.clone();
        match &credentials.secret {
            Secret::None => return Err(Error::AuthNotSupported),
            Secret::AccessToken(token) => {
                if self.capabilities.has_auth("XOAUTH2") {
                    let response = sasl::xoauth2_response(&credentials.user, token);
                    self.sasl("XOAUTH2", &response).await?;
                } else if self.capabilities.has_auth("OAUTHBEARER") {
                    let response = sasl::oauthbearer_response(&credentials.user, token);
                    self.sasl("OAUTHBEARER", &response).await?;
                } else {
                    return Err(Error::AuthNotSupported);
                }
            }
            Secret::Password(password) => {
                if self.capabilities.has_auth("PLAIN") {
                    let response = sasl::plain_response(&credentials.user, password);
                    self.sasl("PLAIN", &response).await?;
                } else if self.capabilities.has(&Capability::LoginDisabled) {
                    return Err(Error::LoginDisabled);
                } else {
                    let login = format!(
                        "LOGIN {} {}",
                        command::astring(&credentials.user),
                        command::astring(password)
                    );
                    self.run(CommandKind::Authenticate, &login)
                        .await
                        .map_err(auth_error)?;
                }
            }
        }
        self.state = SessionState::Authenticated;
        info!(user = %credentials.user, "authenticated");

        // Capabilities change after login unless the tagged OK carried them.
        if !self.caps_fresh {
            self.refresh_capabilities().await?;
        }
        Ok(())
    }

    async fn sasl(&mut self, mechanism: &str, response: &str) -> Result<()> {
        let reply = if self.capabilities.has(&Capability::SaslIr) {
            self.send(
                CommandKind::Authenticate,
                &format!("AUTHENTICATE {mechanism} {response}"),
            )
            .await?
        } else {
            let reply = self
                .send(CommandKind::Authenticate, &format!("AUTHENTICATE {mechanism}"))
                .await?;
            if reply.continuation.is_some() {
                self.write_line(response).await?;
                self.read_reply(CommandKind::Authenticate, None).await?
            } else {
                reply
            }
        };
        let reply = if let Some(challenge) = &reply.continuation {
            // Error details arrive as a challenge; an empty answer ends
            // the exchange.
            debug!(mechanism, detail = ?sasl::decode_challenge(challenge), "authentication challenge");
            self.write_line("").await?;
            self.read_reply(CommandKind::Authenticate, None).await?
        } else {
            reply
        };
        reply.check().map(drop).map_err(auth_error)
    }

    /// Makes sure a usable, authenticated connection exists.
    async fn ensure_ready(&mut self) -> Result<()> {
        if self.idle.is_some() {
            return Err(Error::Idle("stop IDLE before issuing commands"));
        }
        if self.stream.is_connected() && self.state != SessionState::Disconnected {
            if self.network.is_network_up() {
                return Ok(());
            }
            warn!("network down, dropping connection");
            self.drop_connection().await;
        }
        self.reconnect().await
    }

    async fn reconnect(&mut self) -> Result<()> {
        self.gate.try_acquire(self.clock.now())?;
        if !self.network.is_network_up() && !self.network.resume() {
            return Err(embermail_core::Error::Unreachable(self.config.server.host.clone()).into());
        }
        let mailbox = self.selected.take().map(|m| (m.name, m.read_only));
        info!(host = %self.config.server.host, "reconnecting");
        self.sink.on_status(&StatusEvent::info("reconnecting"));
        self.open().await?;
        if self.config.credentials.is_present() {
            self.login().await?;
        }
        if let Some((name, read_only)) = mailbox {
            self.select_inner(&name, read_only).await?;
        }
        Ok(())
    }

    /// Sends a command and reads its reply without judging the completion.
    pub(crate) async fn send(&mut self, kind: CommandKind, command: &str) -> Result<Reply> {
        self.write_command(kind, command).await?;
        self.read_reply(kind, None).await
    }

    /// Sends a command and requires `OK`.
    pub(crate) async fn run(&mut self, kind: CommandKind, command: &str) -> Result<Reply> {
        self.send(kind, command).await?.check()
    }

    pub(crate) async fn write_command(&mut self, kind: CommandKind, command: &str) -> Result<()> {
        if kind == CommandKind::Authenticate {
            debug!(tag = TAG, %kind, "> <credentials>");
        } else {
            debug!(tag = TAG, %kind, "> {command}");
        }
        self.last_kind = Some(kind);
        self.caps_fresh = false;
        let line = format!("{TAG} {command}\r\n");
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }

    pub(crate) async fn write_line(&mut self, line: &str) -> Result<()> {
        let line = format!("{line}\r\n");
        self.stream.write_all(line.as_bytes()).await?;
        Ok(())
    }

    /// Reads until the tagged completion or a continuation request.
    ///
    /// A FETCH literal for the section `body` is waiting for is streamed
    /// into it; every other literal is read into memory up to
    /// [`MAX_LITERAL`] octets.
    pub(crate) async fn read_reply(
        &mut self,
        kind: CommandKind,
        mut body: Option<&mut BodyStream<'_>>,
    ) -> Result<Reply> {
        let mut reply = Reply::default();
        loop {
            let raw = self.stream.read_line().await?;
            match Line::classify(&raw) {
                Line::Tagged {
                    completion,
                    code,
                    text,
                } => {
                    trace!(%kind, ?completion, "< {text}");
                    if let Some(list) = code.as_deref().and_then(capability_code) {
                        self.capabilities = Capabilities::parse(list);
                        self.caps_fresh = true;
                    }
                    self.last_text.clone_from(&text);
                    reply.tagged = Some(Tagged {
                        completion,
                        code,
                        text,
                    });
                    return Ok(reply);
                }
                Line::Continuation(text) => {
                    trace!(%kind, "< + {text}");
                    reply.continuation = Some(text);
                    return Ok(reply);
                }
                Line::Untagged(text) => {
                    if let Some((number, items)) = fetch_start(&text) {
                        let items = items.to_string();
                        let fetch = self.read_fetch(number, items, body.as_deref_mut()).await?;
                        reply.untagged.push(Untagged::Fetch(fetch));
                        continue;
                    }
                    let text = self.splice_literals(text).await?;
                    trace!(%kind, "< * {text}");
                    if let Some(rest) = strip_keyword(&text, "BYE")
                        && kind != CommandKind::Logout
                    {
                        warn!(reason = rest, "server closed the session");
                        let reason = rest.to_string();
                        self.drop_connection().await;
                        return Err(Error::Bye(reason));
                    }
                    self.on_data(&text);
                    reply.untagged.push(Untagged::Data(text));
                }
                Line::Other(text) => debug!(%kind, "ignoring line: {text}"),
            }
        }
    }

    /// Untagged data every command kind cares about.
    fn on_data(&mut self, text: &str) {
        if let Some(list) = strip_keyword(text, "CAPABILITY") {
            self.capabilities = Capabilities::parse(list);
            self.caps_fresh = true;
        } else if let Some(rest) = strip_keyword(text, "OK")
            && let (Some(code), _) = split_code(rest)
            && let Some(list) = capability_code(code)
        {
            self.capabilities = Capabilities::parse(list);
            self.caps_fresh = true;
        } else if let Some((n, keyword)) = crate::response::numbered(text)
            && let Some(mailbox) = self.selected.as_mut()
        {
            match keyword.as_str() {
                "EXISTS" => mailbox.exists = n,
                "RECENT" => mailbox.recent = n,
                "EXPUNGE" => mailbox.exists = mailbox.exists.saturating_sub(1),
                _ => {}
            }
        }
    }

    /// Replaces trailing `{n}` literals with their content as quoted
    /// strings, joining the continuation lines.
    async fn splice_literals(&mut self, mut text: String) -> Result<String> {
        while let Some(n) = literal_length(text.as_bytes()) {
            let Some(open) = text.rfind('{') else {
                break;
            };
            let data = self.read_literal(n).await?;
            text.truncate(open);
            text.push_str(&quote(&String::from_utf8_lossy(&data)));
            let next = self.stream.read_line().await?;
            text.push_str(&String::from_utf8_lossy(&next));
        }
        Ok(text)
    }

    async fn read_literal(&mut self, n: usize) -> Result<Vec<u8>> {
        let keep = n.min(MAX_LITERAL);
        let data = self.stream.read_exact(keep).await?;
        if n > keep {
            warn!(len = n, kept = keep, "literal too large, truncating");
            self.stream.discard(n - keep).await?;
        }
        Ok(data)
    }

    async fn read_fetch(
        &mut self,
        number: u32,
        mut rest: String,
        mut body: Option<&mut BodyStream<'_>>,
    ) -> Result<FetchResponse> {
        let mut fetch = FetchResponse {
            number,
            items: Vec::new(),
        };
        loop {
            let mut more = false;
            for item in scan_fetch_items(&rest) {
                let mut literal = None;
                if let ItemValue::Literal(n) = item.value {
                    more = true;
                    match body.as_deref_mut() {
                        Some(target)
                            if item
                                .section()
                                .is_some_and(|s| s.eq_ignore_ascii_case(target.section())) =>
                        {
                            self.stream_body(target, n).await?;
                        }
                        _ => literal = Some(self.read_literal(n).await?),
                    }
                }
                fetch.items.push(FetchValue { item, literal });
            }
            if !more {
                trace!(number, items = fetch.items.len(), "< * FETCH");
                return Ok(fetch);
            }
            rest = String::from_utf8_lossy(&self.stream.read_line().await?).into_owned();
        }
    }
}

/// Credentials rejected by `NO`/`BAD` become [`Error::AuthFailed`].
fn auth_error(e: Error) -> Error {
    match e {
        Error::No(text) | Error::Bad(text) => Error::AuthFailed(text),
        other => other,
    }
}
