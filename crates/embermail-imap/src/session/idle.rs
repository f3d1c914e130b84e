//! IMAP IDLE (RFC 2177).
//!
//! While idling the session only listens. The server is expected to drop
//! idle connections after 30 minutes, so IDLE is renewed before the
//! configured timeout runs out; the host is probed periodically to spot a
//! link that died without a FIN.

use std::time::Duration;

use embermail_core::Transport;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{ImapSession, Reply, strip_keyword};
use crate::command::CommandKind;
use crate::error::{Error, Result};
use crate::response::{ItemValue, Line, fetch_start, numbered, scan_fetch_items};
use crate::types::{Capability, Flags};

/// Shortest accepted IDLE renewal interval.
pub const MIN_IDLE_TIMEOUT: Duration = Duration::from_secs(60);
/// Longest accepted IDLE renewal interval.
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(29 * 60);
/// IDLE renewal interval used by [`ImapSession::idle`].
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
/// How often the host is probed while idling.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Clamps an IDLE timeout into `[MIN_IDLE_TIMEOUT, MAX_IDLE_TIMEOUT]`.
#[must_use]
pub fn clamp_idle_timeout(timeout: Duration) -> Duration {
    timeout.clamp(MIN_IDLE_TIMEOUT, MAX_IDLE_TIMEOUT)
}

/// A mailbox change reported while idling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdleEvent {
    /// The mailbox now holds this many messages.
    Exists(u32),
    /// Number of recent messages.
    Recent(u32),
    /// The message with this sequence number was expunged.
    Expunge(u32),
    /// `EXISTS` grew by this many messages.
    NewMessage(u32),
    /// Flags of a message changed.
    Fetch {
        /// Sequence number.
        number: u32,
        /// New flags, if the server sent them.
        flags: Option<Flags>,
    },
}

impl IdleEvent {
    /// Parses untagged data into an event.
    #[must_use]
    pub fn parse(data: &str) -> Option<Self> {
        if let Some((number, items)) = fetch_start(data) {
            let flags = scan_fetch_items(items)
                .into_iter()
                .find(|item| item.is("FLAGS"))
                .and_then(|item| match item.value {
                    ItemValue::List(list) => Some(Flags::parse_list(&list)),
                    _ => None,
                });
            return Some(Self::Fetch { number, flags });
        }
        let (n, keyword) = numbered(data)?;
        match keyword.as_str() {
            "EXISTS" => Some(Self::Exists(n)),
            "RECENT" => Some(Self::Recent(n)),
            "EXPUNGE" => Some(Self::Expunge(n)),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) struct IdleState {
    timeout: Duration,
    started: Instant,
    last_probe: Instant,
    pending: Vec<IdleEvent>,
}

impl<T: Transport> ImapSession<T> {
    /// Enters IDLE with [`DEFAULT_IDLE_TIMEOUT`].
    ///
    /// # Errors
    ///
    /// See [`ImapSession::idle_with`].
    pub async fn idle(&mut self) -> Result<()> {
        self.idle_with(DEFAULT_IDLE_TIMEOUT).await
    }

    /// Enters IDLE, renewing it every `timeout` (clamped to 1–29 minutes).
    ///
    /// No other command can be issued until [`ImapSession::stop_idle`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`],
    /// [`Error::CapabilityMissing`] without `IDLE`, or [`Error::Idle`] if
    /// the server refuses.
    pub async fn idle_with(&mut self, timeout: Duration) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            if self.selected.is_none() {
                return Err(Error::NoMailboxSelected);
            }
            if !self.capabilities.has(&Capability::Idle) {
                return Err(Error::CapabilityMissing("IDLE"));
            }
            let timeout = clamp_idle_timeout(timeout);
            let pending = self.start_idle().await?;
            let now = Instant::now();
            self.idle = Some(IdleState {
                timeout,
                started: now,
                last_probe: now,
                pending,
            });
            info!(timeout_secs = timeout.as_secs(), "idling");
            Ok(())
        }
        .await;
        self.finish("idle", result)
    }

    /// Returns true while in IDLE.
    #[must_use]
    pub const fn is_idling(&self) -> bool {
        self.idle.is_some()
    }

    /// Waits up to `wait` for mailbox changes.
    ///
    /// Returns as soon as at least one event arrived, with every event
    /// already buffered; an empty list means nothing happened. IDLE is
    /// renewed and the host probed as needed while waiting. If the server
    /// ends IDLE on its own the session leaves IDLE and the events read so
    /// far are returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Idle`] when not idling, an unreachable error when
    /// the host probe fails, or connection errors; the connection is
    /// closed in the last two cases.
    pub async fn listen(&mut self, wait: Duration) -> Result<Vec<IdleEvent>> {
        let result = self.listen_inner(wait).await;
        self.finish("idle", result)
    }

    async fn listen_inner(&mut self, wait: Duration) -> Result<Vec<IdleEvent>> {
        let deadline = Instant::now() + wait;
        let mut events = match self.idle.as_mut() {
            Some(state) => std::mem::take(&mut state.pending),
            None => return Err(Error::Idle("not idling")),
        };
        let host = self.config.server.host.clone();

        loop {
            if !events.is_empty() {
                self.drain_buffered(&mut events).await?;
                return Ok(events);
            }
            let Some(state) = self.idle.as_ref() else {
                return Ok(events);
            };
            let (renew_at, probe_at) = (
                state.started + state.timeout,
                state.last_probe + self.probe_interval,
            );
            let now = Instant::now();
            if now >= deadline {
                return Ok(events);
            }
            if now >= renew_at {
                self.renew_idle(&mut events).await?;
                continue;
            }
            if now >= probe_at {
                if let Some(state) = self.idle.as_mut() {
                    state.last_probe = now;
                }
                if !self.stream.transport_mut().probe_host(&host).await {
                    warn!(host, "host probe failed while idling, closing");
                    self.drop_connection().await;
                    return Err(embermail_core::Error::Unreachable(host).into());
                }
                debug!(host, "host probe ok");
                continue;
            }

            let slice = deadline.min(renew_at).min(probe_at) - now;
            match self.stream.poll_line(slice).await {
                Ok(None) => {}
                Ok(Some(raw)) => self.on_idle_line(&raw, &mut events).await?,
                Err(e) => {
                    self.drop_connection().await;
                    return Err(e.into());
                }
            }
        }
    }

    /// Picks up lines that are already buffered without waiting.
    async fn drain_buffered(&mut self, events: &mut Vec<IdleEvent>) -> Result<()> {
        while self.idle.is_some() && self.stream.available() > 0 {
            match self.stream.poll_line(Duration::ZERO).await? {
                Some(raw) => self.on_idle_line(&raw, events).await?,
                None => break,
            }
        }
        Ok(())
    }

    async fn on_idle_line(&mut self, raw: &[u8], events: &mut Vec<IdleEvent>) -> Result<()> {
        match Line::classify(raw) {
            Line::Untagged(text) => {
                if let Some(reason) = strip_keyword(&text, "BYE") {
                    warn!(reason, "server closed the session while idling");
                    let reason = reason.to_string();
                    self.drop_connection().await;
                    return Err(Error::Bye(reason));
                }
                let before = self.selected.as_ref().map_or(0, |m| m.exists);
                self.on_data(&text);
                if let Some(event) = IdleEvent::parse(&text) {
                    debug!(?event, "idle event");
                    let grew = match event {
                        IdleEvent::Exists(n) if n > before => Some(n - before),
                        _ => None,
                    };
                    events.push(event);
                    if let Some(count) = grew {
                        info!(count, "new mail");
                        events.push(IdleEvent::NewMessage(count));
                    }
                }
            }
            Line::Tagged { text, .. } => {
                info!(text, "server ended IDLE");
                self.idle = None;
            }
            Line::Continuation(_) | Line::Other(_) => {}
        }
        Ok(())
    }

    /// Ends IDLE and returns any events that arrived meanwhile.
    ///
    /// # Errors
    ///
    /// Returns connection errors or the server's `NO`/`BAD`.
    pub async fn stop_idle(&mut self) -> Result<Vec<IdleEvent>> {
        let result: Result<_> = async {
            let Some(state) = self.idle.take() else {
                return Ok(Vec::new());
            };
            let mut events = state.pending;
            let reply = self.done().await?;
            events.extend(reply_events(&reply));
            reply.check()?;
            info!("left IDLE");
            Ok(events)
        }
        .await;
        self.finish("idle", result)
    }

    async fn renew_idle(&mut self, events: &mut Vec<IdleEvent>) -> Result<()> {
        debug!("renewing IDLE");
        let reply = self.done().await?;
        events.extend(reply_events(&reply));
        if let Err(e) = reply.check() {
            self.idle = None;
            return Err(e);
        }
        let pending = match self.start_idle().await {
            Ok(pending) => pending,
            Err(e) => {
                self.idle = None;
                return Err(e);
            }
        };
        events.extend(pending);
        if let Some(state) = self.idle.as_mut() {
            state.started = Instant::now();
        }
        Ok(())
    }

    /// Sends `IDLE` and waits for the continuation.
    async fn start_idle(&mut self) -> Result<Vec<IdleEvent>> {
        self.write_command(CommandKind::Idle, "IDLE").await?;
        let reply = self.read_reply(CommandKind::Idle, None).await?;
        if reply.continuation.is_none() {
            reply.check()?;
            return Err(Error::Idle("server completed IDLE without continuation"));
        }
        Ok(reply_events(&reply))
    }

    async fn done(&mut self) -> Result<Reply> {
        self.write_line("DONE").await?;
        self.read_reply(CommandKind::Idle, None).await
    }
}

fn reply_events(reply: &Reply) -> Vec<IdleEvent> {
    reply
        .untagged
        .iter()
        .filter_map(|u| match u {
            super::Untagged::Data(text) => IdleEvent::parse(text),
            super::Untagged::Fetch(fetch) => Some(IdleEvent::Fetch {
                number: fetch.number,
                flags: fetch.flags(),
            }),
        })
        .collect()
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
    use crate::types::Flag;

    #[test]
    fn test_clamp_idle_timeout() {
        assert_eq!(clamp_idle_timeout(Duration::from_secs(5)), MIN_IDLE_TIMEOUT);
        assert_eq!(clamp_idle_timeout(Duration::from_secs(3600)), MAX_IDLE_TIMEOUT);
        assert_eq!(clamp_idle_timeout(DEFAULT_IDLE_TIMEOUT), DEFAULT_IDLE_TIMEOUT);
    }

    #[test]
    fn test_parse_events() {
        assert_eq!(IdleEvent::parse("23 EXISTS"), Some(IdleEvent::Exists(23)));
        assert_eq!(IdleEvent::parse("3 RECENT"), Some(IdleEvent::Recent(3)));
        assert_eq!(IdleEvent::parse("7 EXPUNGE"), Some(IdleEvent::Expunge(7)));
        assert_eq!(IdleEvent::parse("OK still here"), None);

        let Some(IdleEvent::Fetch { number, flags }) = IdleEvent::parse(r"4 FETCH (FLAGS (\Seen))")
        else {
            panic!("expected a fetch event");
        };
        assert_eq!(number, 4);
        assert!(flags.unwrap().contains(&Flag::Seen));
    }
}
