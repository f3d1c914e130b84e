//! Mailbox and message management commands.

use embermail_core::Transport;
use tracing::{debug, info, warn};

use super::{ImapSession, Reply, SessionState, strip_keyword};
use crate::command::{self, CommandKind, StoreAction};
use crate::error::{Error, Result};
use crate::options::SearchOptions;
use crate::response::{Completion, Token, numbered, split_code, tokenize};
use crate::search::SearchCollector;
use crate::types::{
    AclEntry, Capability, Flag, Flags, ListEntry, MailboxAttribute, MailboxInfo, MessageId, Quota,
    QuotaResource, QuotaRoot,
};

/// Raw result of a caller-supplied command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomResponse {
    /// Untagged lines, without the leading `* `.
    pub lines: Vec<String>,
    /// Tagged completion.
    pub completion: Completion,
    /// Text of the tagged completion.
    pub text: String,
}

impl<T: Transport> ImapSession<T> {
    /// Lists mailboxes matching `pattern` under `reference`.
    ///
    /// # Errors
    ///
    /// Returns connection or protocol errors.
    pub async fn list_mailboxes(&mut self, reference: &str, pattern: &str) -> Result<Vec<ListEntry>> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            let reply = self
                .run(CommandKind::List, &command::list(reference, pattern))
                .await?;
            Ok(reply.data("LIST").filter_map(parse_list_entry).collect())
        }
        .await;
        self.finish("list", result)
    }

    /// Selects a mailbox read-write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox does not exist.
    pub async fn select_mailbox(&mut self, name: &str) -> Result<MailboxInfo> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.select_inner(name, false).await
        }
        .await;
        self.finish("select", result)
    }

    /// Selects a mailbox read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the mailbox does not exist.
    pub async fn examine_mailbox(&mut self, name: &str) -> Result<MailboxInfo> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.select_inner(name, true).await
        }
        .await;
        self.finish("examine", result)
    }

    pub(super) async fn select_inner(&mut self, name: &str, read_only: bool) -> Result<MailboxInfo> {
        self.selected = None;
        if self.state == SessionState::Selected {
            self.state = SessionState::Authenticated;
        }
        let reply = self
            .run(CommandKind::Select, &command::select(name, read_only))
            .await?;
        let mut info = parse_select(&reply);
        info.name = name.to_string();
        info.read_only = read_only || reply.code().is_some_and(|c| c.eq_ignore_ascii_case("READ-ONLY"));
        info!(mailbox = name, exists = info.exists, read_only = info.read_only, "mailbox selected");
        self.selected = Some(info.clone());
        self.state = SessionState::Selected;
        Ok(info)
    }

    /// Closes the selected mailbox, expunging deleted messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn close_mailbox(&mut self) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require_selected()?;
            self.run(CommandKind::Noop, "CLOSE").await?;
            self.selected = None;
            self.state = SessionState::Authenticated;
            Ok(())
        }
        .await;
        self.finish("close", result)
    }

    /// Creates a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn create_mailbox(&mut self, name: &str) -> Result<()> {
        let result = self.mailbox_command("CREATE", name).await;
        self.finish("create", result)
    }

    /// Deletes a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn delete_mailbox(&mut self, name: &str) -> Result<()> {
        let result = self.mailbox_command("DELETE", name).await;
        self.finish("delete", result)
    }

    /// Renames a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn rename_mailbox(&mut self, from: &str, to: &str) -> Result<()> {
        let result = self
            .simple(CommandKind::Mailbox, &command::rename(from, to))
            .await;
        self.finish("rename", result)
    }

    /// Subscribes to a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn subscribe(&mut self, name: &str) -> Result<()> {
        let result = self.mailbox_command("SUBSCRIBE", name).await;
        self.finish("subscribe", result)
    }

    /// Unsubscribes from a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses.
    pub async fn unsubscribe(&mut self, name: &str) -> Result<()> {
        let result = self.mailbox_command("UNSUBSCRIBE", name).await;
        self.finish("unsubscribe", result)
    }

    async fn mailbox_command(&mut self, verb: &str, name: &str) -> Result<()> {
        self.simple(CommandKind::Mailbox, &command::mailbox(verb, name))
            .await
    }

    /// Searches the selected mailbox.
    ///
    /// `criteria` is passed through verbatim (`ALL` when empty). The
    /// result is capped by `options`: either the first `limit` values the
    /// server returned, or the `limit` largest values sorted descending,
    /// which for UIDs are the most recent messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`], [`Error::Bad`] for invalid
    /// criteria, or connection errors.
    pub async fn search(&mut self, criteria: &str, options: SearchOptions) -> Result<Vec<MessageId>> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require_selected()?;
            let reply = self
                .run(CommandKind::Search, &command::search(criteria, options.uid))
                .await?;
            let mut collector = SearchCollector::new(options);
            for data in reply.data("SEARCH") {
                collector.extend_from_data(data);
            }
            let total = collector.seen();
            let ids = collector.finish();
            debug!(total, kept = ids.len(), "search done");
            Ok(ids)
        }
        .await;
        self.finish("search", result)
    }

    /// Adds flags to messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn add_flags(&mut self, ids: &[MessageId], flags: &Flags) -> Result<()> {
        let result = self.store(ids, StoreAction::Add, flags).await;
        self.finish("store", result)
    }

    /// Removes flags from messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn remove_flags(&mut self, ids: &[MessageId], flags: &Flags) -> Result<()> {
        let result = self.store(ids, StoreAction::Remove, flags).await;
        self.finish("store", result)
    }

    /// Replaces the flags of messages.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn set_flags(&mut self, ids: &[MessageId], flags: &Flags) -> Result<()> {
        let result = self.store(ids, StoreAction::Replace, flags).await;
        self.finish("store", result)
    }

    async fn store(&mut self, ids: &[MessageId], action: StoreAction, flags: &Flags) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.ensure_ready().await?;
        self.require_selected()?;
        self.run(CommandKind::Store, &command::store(ids, action, flags))
            .await
            .map(drop)
    }

    /// Copies messages to another mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or [`Error::No`] if the target
    /// does not exist.
    pub async fn copy_messages(&mut self, ids: &[MessageId], mailbox: &str) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require_selected()?;
            self.run(CommandKind::Copy, &command::copy(ids, mailbox, false))
                .await
                .map(drop)
        }
        .await;
        self.finish("copy", result)
    }

    /// Moves messages to another mailbox.
    ///
    /// Uses `MOVE` when advertised, otherwise `COPY`, `\Deleted` and
    /// `EXPUNGE`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or [`Error::No`] if the target
    /// does not exist.
    pub async fn move_messages(&mut self, ids: &[MessageId], mailbox: &str) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require_selected()?;
            if self.capabilities.has(&Capability::Move) {
                self.run(CommandKind::Copy, &command::copy(ids, mailbox, true))
                    .await?;
            } else {
                debug!("MOVE not advertised, falling back to COPY");
                self.run(CommandKind::Copy, &command::copy(ids, mailbox, false))
                    .await?;
                self.run(CommandKind::Store, &command::store(ids, StoreAction::Add, &deleted()))
                    .await?;
                self.run(CommandKind::Expunge, "EXPUNGE").await?;
            }
            Ok(())
        }
        .await;
        self.finish("move", result)
    }

    /// Marks messages `\Deleted`, expunging right away if asked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn delete_messages(&mut self, ids: &[MessageId], expunge: bool) -> Result<()> {
        let result: Result<_> = async {
            self.store(ids, StoreAction::Add, &deleted()).await?;
            if expunge {
                self.run(CommandKind::Expunge, "EXPUNGE").await?;
            }
            Ok(())
        }
        .await;
        self.finish("delete", result)
    }

    /// Expunges `\Deleted` messages; returns the expunged sequence
    /// numbers in server order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`] or connection errors.
    pub async fn expunge(&mut self) -> Result<Vec<u32>> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require_selected()?;
            let reply = self.run(CommandKind::Expunge, "EXPUNGE").await?;
            Ok(reply
                .data_lines()
                .filter_map(numbered)
                .filter(|(_, keyword)| keyword == "EXPUNGE")
                .map(|(n, _)| n)
                .collect())
        }
        .await;
        self.finish("expunge", result)
    }

    /// Appends a message to a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::No`] if the server refuses the message.
    pub async fn append(&mut self, mailbox: &str, flags: &Flags, message: &[u8]) -> Result<()> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            let literal_plus = self.capabilities.has(&Capability::LiteralPlus);
            let cmd = command::append(mailbox, flags, message.len(), literal_plus);
            self.write_command(CommandKind::Append, &cmd).await?;
            if !literal_plus {
                let reply = self.read_reply(CommandKind::Append, None).await?;
                if reply.continuation.is_none() {
                    reply.check()?;
                    return Err(Error::Protocol("APPEND finished without continuation".into()));
                }
            }
            self.stream.write_all(message).await?;
            self.stream.write_all(b"\r\n").await?;
            self.read_reply(CommandKind::Append, None)
                .await?
                .check()
                .map(drop)
        }
        .await;
        self.finish("append", result)
    }

    /// Quota of a quota root.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] without `QUOTA`.
    pub async fn get_quota(&mut self, root: &str) -> Result<Vec<Quota>> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require(Capability::Quota, "QUOTA")?;
            let cmd = format!("GETQUOTA {}", command::astring(root));
            let reply = self.run(CommandKind::Quota, &cmd).await?;
            Ok(reply.data("QUOTA").map(parse_quota).collect())
        }
        .await;
        self.finish("quota", result)
    }

    /// Quota roots of a mailbox, with their quotas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] without `QUOTA`.
    pub async fn get_quota_root(&mut self, mailbox: &str) -> Result<QuotaRoot> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require(Capability::Quota, "QUOTA")?;
            let cmd = format!("GETQUOTAROOT {}", command::astring(mailbox));
            let reply = self.run(CommandKind::Quota, &cmd).await?;
            let mut root = QuotaRoot {
                mailbox: mailbox.to_string(),
                ..QuotaRoot::default()
            };
            if let Some(data) = reply.data("QUOTAROOT").next() {
                root.roots = tokenize(data).iter().skip(1).map(Token::to_text).collect();
            }
            root.quotas = reply.data("QUOTA").map(parse_quota).collect();
            Ok(root)
        }
        .await;
        self.finish("quota", result)
    }

    /// Access control list of a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] without `ACL`.
    pub async fn get_acl(&mut self, mailbox: &str) -> Result<Vec<AclEntry>> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require(Capability::Acl, "ACL")?;
            let cmd = format!("GETACL {}", command::astring(mailbox));
            let reply = self.run(CommandKind::Acl, &cmd).await?;
            let mut entries = Vec::new();
            for data in reply.data("ACL") {
                let tokens = tokenize(data);
                for pair in tokens.get(1..).unwrap_or_default().chunks_exact(2) {
                    entries.push(AclEntry {
                        identifier: pair[0].to_text(),
                        rights: pair[1].to_text(),
                    });
                }
            }
            Ok(entries)
        }
        .await;
        self.finish("acl", result)
    }

    /// Rights of the logged-in user on a mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CapabilityMissing`] without `ACL`.
    pub async fn my_rights(&mut self, mailbox: &str) -> Result<String> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            self.require(Capability::Acl, "ACL")?;
            let cmd = format!("MYRIGHTS {}", command::astring(mailbox));
            let reply = self.run(CommandKind::Acl, &cmd).await?;
            Ok(reply
                .data("MYRIGHTS")
                .find_map(|data| tokenize(data).get(1).map(Token::to_text))
                .unwrap_or_default())
        }
        .await;
        self.finish("acl", result)
    }

    /// Sends a command verbatim and returns whatever came back.
    ///
    /// A `NO` or `BAD` completion is returned, not raised.
    ///
    /// # Errors
    ///
    /// Returns connection errors, or [`Error::Protocol`] if the server
    /// asks for a continuation.
    pub async fn send_custom(&mut self, command: &str) -> Result<CustomResponse> {
        let result: Result<_> = async {
            self.ensure_ready().await?;
            let reply = self.send(CommandKind::Custom, command.trim_end()).await?;
            if let Some(text) = &reply.continuation {
                warn!(text, "custom command asked for a continuation, cancelling");
                self.write_line("*").await?;
                self.read_reply(CommandKind::Custom, None).await?;
                return Err(Error::Protocol("continuation not supported".into()));
            }
            let lines = reply.data_lines().map(str::to_string).collect();
            let Some(tagged) = reply.tagged else {
                return Err(Error::Protocol("missing tagged completion".into()));
            };
            Ok(CustomResponse {
                lines,
                completion: tagged.completion,
                text: tagged.text,
            })
        }
        .await;
        self.finish("custom", result)
    }

    fn require_selected(&self) -> Result<()> {
        if self.selected.is_some() {
            Ok(())
        } else {
            Err(Error::NoMailboxSelected)
        }
    }

    fn require(&self, capability: Capability, name: &'static str) -> Result<()> {
        if self.capabilities.has(&capability) {
            Ok(())
        } else {
            Err(Error::CapabilityMissing(name))
        }
    }
}

impl Reply {
    /// Every untagged non-FETCH line.
    pub(crate) fn data_lines(&self) -> impl Iterator<Item = &str> {
        self.untagged.iter().filter_map(|u| match u {
            super::Untagged::Data(text) => Some(text.as_str()),
            super::Untagged::Fetch(_) => None,
        })
    }
}

fn deleted() -> Flags {
    std::iter::once(Flag::Deleted).collect()
}

/// Parses the data of a `LIST` response:
/// `(\HasNoChildren) "/" "INBOX/Sent"`.
fn parse_list_entry(data: &str) -> Option<ListEntry> {
    let mut tokens = tokenize(data).into_iter();
    let Some(Token::List(attributes)) = tokens.next() else {
        return None;
    };
    let delimiter = match tokens.next()? {
        Token::Nil => None,
        token => token.to_text().chars().next(),
    };
    let name = tokens.next()?.to_text();
    Some(ListEntry {
        attributes: attributes
            .split_ascii_whitespace()
            .map(MailboxAttribute::parse)
            .collect(),
        delimiter,
        name,
    })
}

/// Parses the data of a `QUOTA` response: `"" (STORAGE 10 512)`.
fn parse_quota(data: &str) -> Quota {
    let tokens = tokenize(data);
    let root = tokens.first().map(Token::to_text).unwrap_or_default();
    let resources = match tokens.get(1) {
        Some(Token::List(list)) => list
            .split_ascii_whitespace()
            .collect::<Vec<_>>()
            .chunks_exact(3)
            .map(|triple| QuotaResource {
                name: triple[0].to_ascii_uppercase(),
                usage: triple[1].parse().unwrap_or(0),
                limit: triple[2].parse().unwrap_or(0),
            })
            .collect(),
        _ => Vec::new(),
    };
    Quota { root, resources }
}

/// Collects SELECT/EXAMINE data into a [`MailboxInfo`].
fn parse_select(reply: &Reply) -> MailboxInfo {
    let mut info = MailboxInfo::default();
    for line in reply.data_lines() {
        if let Some((n, keyword)) = numbered(line) {
            match keyword.as_str() {
                "EXISTS" => info.exists = n,
                "RECENT" => info.recent = n,
                _ => {}
            }
        } else if let Some(list) = strip_keyword(line, "FLAGS") {
            info.flags = Flags::parse_list(list);
        } else if let Some(rest) = strip_keyword(line, "OK")
            && let (Some(code), _) = split_code(rest)
        {
            let (name, value) = code.split_once(' ').unwrap_or((code, ""));
            match name.to_ascii_uppercase().as_str() {
                "UNSEEN" => info.unseen = value.trim().parse().ok(),
                "UIDNEXT" => info.uid_next = value.trim().parse().ok(),
                "UIDVALIDITY" => info.uid_validity = value.trim().parse().ok(),
                "PERMANENTFLAGS" => info.permanent_flags = Flags::parse_list(value),
                _ => {}
            }
        }
    }
    info
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
    use crate::session::{Tagged, Untagged};

    #[test]
    fn test_parse_list_entry() {
        let entry = parse_list_entry(r#"(\HasNoChildren \Sent) "/" "Sent Items""#).unwrap();
        assert_eq!(entry.name, "Sent Items");
        assert_eq!(entry.delimiter, Some('/'));
        assert!(entry.attributes.contains(&MailboxAttribute::Sent));

        let flat = parse_list_entry(r"(\Noselect) NIL Archive").unwrap();
        assert_eq!(flat.delimiter, None);
        assert!(!flat.is_selectable());
    }

    #[test]
    fn test_parse_quota() {
        let quota = parse_quota(r#""" (STORAGE 10 512 MESSAGE 3 100)"#);
        assert_eq!(quota.root, "");
        assert_eq!(quota.resources.len(), 2);
        assert_eq!(quota.resources[0].name, "STORAGE");
        assert_eq!(quota.resources[0].usage, 10);
        assert_eq!(quota.resources[1].limit, 100);
    }

    #[test]
    fn test_parse_select() {
        let reply = Reply {
            untagged: vec![
                Untagged::Data("172 EXISTS".into()),
                Untagged::Data("1 RECENT".into()),
                Untagged::Data(r"FLAGS (\Answered \Seen \Deleted)".into()),
                Untagged::Data("OK [UNSEEN 12] first unseen".into()),
                Untagged::Data("OK [UIDVALIDITY 3857529045] UIDs valid".into()),
                Untagged::Data("OK [UIDNEXT 4392] next".into()),
            ],
            tagged: Some(Tagged {
                completion: Completion::Ok,
                code: Some("READ-WRITE".into()),
                text: "SELECT completed".into(),
            }),
            continuation: None,
        };
        let info = parse_select(&reply);
        assert_eq!(info.exists, 172);
        assert_eq!(info.recent, 1);
        assert_eq!(info.unseen, Some(12));
        assert_eq!(info.uid_validity, Some(3857529045));
        assert_eq!(info.uid_next, Some(4392));
        assert!(info.flags.is_seen());
    }
}
