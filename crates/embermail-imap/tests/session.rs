//! End-to-end IMAP session behavior against a scripted server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use embermail_core::mock::MockTransport;
use embermail_core::{
    Credentials, EventKind, ManualClock, MemoryStorage, SessionConfig, StatusCode, StatusEvent,
    read_file,
};
use embermail_imap::{
    Capability, Completion, DownloadSelection, Error, FetchOptions, Flag, Flags, IdleEvent,
    ImapSession, MessageId, PartChunk, PartKind, SearchOptions, SessionState,
};

const GREETING: &[u8] =
    b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR IDLE MOVE QUOTA ACL] server ready\r\n";
const CAPS: &str = "IMAP4rev1 AUTH=PLAIN SASL-IR IDLE MOVE QUOTA ACL";

type Handler = Box<dyn Fn(&str) -> Option<Vec<u8>> + Send>;

fn config() -> SessionConfig {
    SessionConfig::imap("imap.example.com")
        .credentials(Credentials::password("alice", "secret"))
        .read_timeout(Duration::from_secs(5))
        .build()
}

/// Answers commands; `handler` gets the command text without the tag, or
/// an untagged line (literal data, `DONE`) as is.
fn server(greeting: &[u8], handler: Handler) -> MockTransport {
    MockTransport::new()
        .with_greeting(greeting)
        .stall_when_empty()
        .with_line_responder(move |line| {
            let Some(cmd) = line.strip_prefix("EM ") else {
                return handler(line).unwrap_or_else(|| untagged(line));
            };
            handler(cmd).unwrap_or_else(|| common(cmd))
        })
}

fn untagged(line: &str) -> Vec<u8> {
    if line == "AGFsaWNlAHNlY3JldA==" {
        b"EM OK logged in\r\n".to_vec()
    } else {
        Vec::new()
    }
}

fn common(cmd: &str) -> Vec<u8> {
    let reply = if cmd == "AUTHENTICATE PLAIN" {
        "+ \r\n".to_string()
    } else if cmd.starts_with("AUTHENTICATE PLAIN ") {
        format!("EM OK [CAPABILITY {CAPS}] logged in\r\n")
    } else if cmd.starts_with("LOGIN ") {
        "EM OK logged in\r\n".to_string()
    } else if cmd == "CAPABILITY" {
        format!("* CAPABILITY {CAPS}\r\nEM OK done\r\n")
    } else if cmd.starts_with("SELECT ") || cmd.starts_with("EXAMINE ") {
        "* 12 EXISTS\r\n* 0 RECENT\r\n* FLAGS (\\Seen \\Deleted)\r\n* OK [UIDVALIDITY 42] ok\r\n* OK [UIDNEXT 13] ok\r\nEM OK [READ-WRITE] SELECT completed\r\n".to_string()
    } else if cmd == "NOOP" {
        "EM OK NOOP completed\r\n".to_string()
    } else if cmd == "LOGOUT" {
        "* BYE logging out\r\nEM OK LOGOUT completed\r\n".to_string()
    } else {
        "EM BAD unknown command\r\n".to_string()
    };
    reply.into_bytes()
}

fn fetch_literal(section: &str, data: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "* 1 FETCH (UID 7 FLAGS (\\Seen) RFC822.SIZE 2048 BODY[{section}] {{{}}}\r\n",
        data.len()
    )
    .into_bytes();
    out.extend_from_slice(data);
    out.extend_from_slice(b")\r\nEM OK FETCH completed\r\n");
    out
}

/// Serves message UID 7 from a header and a section table. Missing
/// sections answer `NO`.
fn message(header: &'static str, sections: Vec<(&'static str, Vec<u8>)>) -> Handler {
    Box::new(move |cmd| {
        if cmd.starts_with("UID FETCH 7 (UID FLAGS RFC822.SIZE BODY.PEEK[HEADER.FIELDS") {
            return Some(fetch_literal("HEADER.FIELDS (FROM TO SUBJECT)", header.as_bytes()));
        }
        let section = cmd.strip_prefix("UID FETCH 7 BODY.PEEK[")?.strip_suffix(']')?;
        Some(match sections.iter().find(|(s, _)| *s == section) {
            Some((_, data)) => fetch_literal(section, data),
            None => b"EM NO [NONEXISTENT] no such section\r\n".to_vec(),
        })
    })
}

const MIXED_HEADER: &str = "From: Alice <alice@example.com>\r\nTo: bob@example.com\r\nSubject: =?UTF-8?Q?Caf=C3=A9?= report\r\nContent-Type: multipart/mixed; boundary=\"b1\"\r\n\r\n";

fn mixed_sections(attachment_mime: &str, attachment: &[u8]) -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("1.MIME", b"Content-Type: multipart/alternative; boundary=\"b2\"\r\n\r\n".to_vec()),
        (
            "1.1.MIME",
            b"Content-Type: text/plain; charset=utf-8\r\nContent-Transfer-Encoding: quoted-printable\r\n\r\n".to_vec(),
        ),
        ("1.2.MIME", b"Content-Type: text/html; charset=utf-8\r\n\r\n".to_vec()),
        ("2.MIME", attachment_mime.as_bytes().to_vec()),
        ("1.1", b"Caf=C3=A9 numbers are in.\r\n".to_vec()),
        ("1.2", b"<p>Caf&eacute;</p>\r\n".to_vec()),
        ("2", attachment.to_vec()),
    ]
}

const PNG_MIME: &str = "Content-Type: image/png; name=\"chart.png\"\r\nContent-Disposition: attachment; filename=\"chart.png\"\r\nContent-Transfer-Encoding: base64\r\n\r\n";
const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nDATA";

async fn selected(transport: MockTransport) -> ImapSession<MockTransport> {
    let mut session = ImapSession::new(transport, config());
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();
    session
}

fn download_all() -> DownloadSelection {
    DownloadSelection {
        header: true,
        text: true,
        html: true,
        attachment: true,
        ..DownloadSelection::default()
    }
}

#[tokio::test]
async fn test_open_select_and_logout() {
    let mut session = selected(server(GREETING, Box::new(|_| None))).await;
    assert_eq!(session.state(), SessionState::Selected);
    assert!(session.capabilities().has(&Capability::Idle));
    let mailbox = session.selected().unwrap();
    assert_eq!(mailbox.exists, 12);
    assert_eq!(mailbox.uid_validity, Some(42));
    assert!(!mailbox.read_only);

    let sent = session.transport().sent_str();
    assert!(sent.contains("EM AUTHENTICATE PLAIN AGFsaWNlAHNlY3JldA==\r\n"));
    // The tagged OK carried capabilities; no extra CAPABILITY round trip.
    assert!(!sent.contains("EM CAPABILITY"));

    tokio_test::assert_ok!(session.logout().await);
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(session.status().is_ok());
}

#[tokio::test]
async fn test_fetch_mixed_message_saves_parts() {
    let transport = server(
        GREETING,
        message(MIXED_HEADER, mixed_sections(PNG_MIME, b"iVBORw0KGgpEQVRB")),
    );
    let chunks: Arc<Mutex<Vec<(String, Vec<u8>, bool, bool)>>> = Arc::default();
    let seen = Arc::clone(&chunks);
    let mut session = ImapSession::new(transport, config())
        .with_storage(MemoryStorage::new())
        .with_part_sink(move |chunk: &PartChunk<'_>| {
            seen.lock().unwrap().push((
                chunk.path.to_string(),
                chunk.data.to_vec(),
                chunk.first,
                chunk.last,
            ));
        });
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default()
        .download(download_all())
        .storage_dir("/mail");
    let message = session.fetch(MessageId::Uid(7), &options).await.unwrap();

    assert_eq!(message.uid, 7);
    assert!(message.flags.contains(&Flag::Seen));
    assert_eq!(message.envelope.subject, "Café report");
    assert!(message.multipart);
    let paths: Vec<&str> = message.parts.iter().map(|p| p.path.as_str()).collect();
    assert_eq!(paths, ["1.1", "1.2", "2"]);
    assert!(message.text().unwrap().starts_with("Café numbers are in."));
    assert!(message.html().unwrap().contains("<p>"));

    let attachment = message.attachments().next().unwrap();
    assert_eq!(attachment.kind, PartKind::Attachment);
    assert_eq!(attachment.saved_path.as_deref(), Some("/mail/7/chart.png"));
    assert_eq!(message.saved_dir.as_deref(), Some("/mail/7"));

    // Discovery never asks for BODYSTRUCTURE and stops at the missing 3.MIME.
    let sent = session.transport().sent_str();
    assert!(!sent.contains("BODYSTRUCTURE"));
    assert!(sent.contains("UID FETCH 7 BODY.PEEK[1.3.MIME]"));
    assert!(sent.contains("UID FETCH 7 BODY.PEEK[3.MIME]"));

    let stats = session.fetch_stats();
    assert_eq!(stats.saved_files, 4);
    assert!(stats.downloaded_bytes > 16);

    let storage = session.storage_mut().unwrap();
    assert_eq!(read_file(storage, "/mail/7/chart.png").await.unwrap(), PNG_BYTES);
    let text = read_file(storage, "/mail/7/msg.txt").await.unwrap();
    assert!(String::from_utf8(text).unwrap().starts_with("Café numbers"));
    let header = read_file(storage, "/mail/7/header.txt").await.unwrap();
    assert!(String::from_utf8(header).unwrap().contains("Subject: Café report"));

    let chunks = chunks.lock().unwrap();
    let png: Vec<u8> = chunks
        .iter()
        .filter(|(path, ..)| path == "2")
        .flat_map(|(_, data, ..)| data.clone())
        .collect();
    assert_eq!(png, PNG_BYTES);
    let png_chunks: Vec<_> = chunks.iter().filter(|(path, ..)| path == "2").collect();
    assert!(png_chunks.first().unwrap().2);
    assert!(png_chunks.last().unwrap().3);
}

#[tokio::test]
async fn test_declared_oversize_attachment_is_not_fetched() {
    let mime = "Content-Type: application/octet-stream\r\nContent-Disposition: attachment; filename=\"big.bin\"; size=5000000\r\nContent-Transfer-Encoding: base64\r\n\r\n";
    let transport = server(GREETING, message(MIXED_HEADER, mixed_sections(mime, b"QUJD")));
    let mut session = ImapSession::new(transport, config()).with_storage(MemoryStorage::new());
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default()
        .download(download_all())
        .attachment_size(1000)
        .storage_dir("/mail");
    let message = session.fetch(MessageId::Uid(7), &options).await.unwrap();

    let big = message.parts.iter().find(|p| p.path == "2").unwrap();
    assert!(big.skipped);
    assert!(big.saved_path.is_none());
    assert!(!session.transport().sent_str().contains("BODY.PEEK[2]"));

    let stats = session.fetch_stats();
    assert_eq!(stats.skipped_parts, 1);
    assert!(stats.downloaded_bytes >= 5_000_000);
    let storage = session.storage_mut().unwrap();
    assert!(!storage.exists("/mail/7/big.bin").await);
}

#[tokio::test]
async fn test_undeclared_oversize_attachment_is_drained() {
    let mime = "Content-Type: application/octet-stream\r\nContent-Disposition: attachment; filename=\"big.bin\"\r\nContent-Transfer-Encoding: base64\r\n\r\n";
    let body = "QUFB".repeat(1000);
    let transport = server(
        GREETING,
        message(MIXED_HEADER, mixed_sections(mime, body.as_bytes())),
    );
    let mut session = ImapSession::new(transport, config()).with_storage(MemoryStorage::new());
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default()
        .download(download_all())
        .attachment_size(1000)
        .storage_dir("/mail");
    let message = session.fetch(MessageId::Uid(7), &options).await.unwrap();

    let big = message.parts.iter().find(|p| p.path == "2").unwrap();
    assert!(big.skipped);
    assert_eq!(big.octet_len, 4000);
    assert_eq!(session.fetch_stats().skipped_parts, 1);

    // The literal was consumed; the connection is still in step.
    session.noop().await.unwrap();
    let storage = session.storage_mut().unwrap();
    assert!(!storage.exists("/mail/7/big.bin").await);
}

#[tokio::test]
async fn test_empty_literal_part_is_saved() {
    let transport = server(GREETING, message(MIXED_HEADER, mixed_sections(PNG_MIME, b"")));
    let mut session = ImapSession::new(transport, config()).with_storage(MemoryStorage::new());
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default()
        .download(download_all())
        .storage_dir("/mail");
    let message = session.fetch(MessageId::Uid(7), &options).await.unwrap();

    // `{0}` is an empty part, not a missing one.
    let empty = message.parts.iter().find(|p| p.path == "2").unwrap();
    assert_eq!(empty.octet_len, 0);
    assert!(!empty.skipped);
    assert_eq!(empty.saved_path.as_deref(), Some("/mail/7/chart.png"));
    assert!(session.transport().sent_str().contains("UID FETCH 7 BODY.PEEK[2]"));

    tokio_test::assert_ok!(session.noop().await);
    let storage = session.storage_mut().unwrap();
    assert!(storage.exists("/mail/7/chart.png").await);
    assert!(read_file(storage, "/mail/7/chart.png").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_full_storage_fails_fetch_but_keeps_connection() {
    let header = "From: a@example.com\r\nSubject: log\r\nContent-Type: text/plain\r\n\r\n";
    let body = "line of log output\r\n".repeat(20);
    let transport = server(GREETING, message(header, vec![("TEXT", body.into_bytes())]));
    let storage = MemoryStorage::new().with_capacity(16);
    let mut session = ImapSession::new(transport, config()).with_storage(storage);
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default()
        .download(download_all())
        .storage_dir("/mail");
    let err = session.fetch(MessageId::Uid(7), &options).await.unwrap_err();
    assert!(matches!(err, Error::Core(embermail_core::Error::Storage(_))));

    // The rest of the literal was drained after the failed write.
    tokio_test::assert_ok!(session.noop().await);
    let storage = session.storage_mut().unwrap();
    assert!(!storage.exists("/mail/7/header.txt").await);
}

#[tokio::test]
async fn test_latin1_body_and_charset_override() {
    let header = "From: a@example.com\r\nSubject: hello\r\nContent-Type: text/plain; charset=iso-8859-1\r\nContent-Transfer-Encoding: 8bit\r\n\r\n";
    let transport = server(
        GREETING,
        message(header, vec![("TEXT", b"caf\xe9\r\n".to_vec())]),
    );
    let mut session = selected(transport).await;
    let message = session
        .fetch(MessageId::Uid(7), &FetchOptions::default())
        .await
        .unwrap();
    assert!(!message.multipart);
    assert_eq!(message.parts.len(), 1);
    assert_eq!(message.parts[0].fetch_section, "TEXT");
    assert_eq!(message.text(), Some("café\r\n"));

    let custom_header = "Subject: x\r\nContent-Type: text/plain; charset=x-shouty\r\n\r\n";
    let transport = server(
        GREETING,
        message_for(custom_header, b"quiet\r\n"),
    );
    let mut session = ImapSession::new(transport, config()).with_charset_decoder(
        |charset: &str, bytes: &[u8]| {
            (charset == "x-shouty").then(|| String::from_utf8_lossy(bytes).to_uppercase())
        },
    );
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();
    let message = session
        .fetch(MessageId::Uid(7), &FetchOptions::default())
        .await
        .unwrap();
    assert_eq!(message.text(), Some("QUIET\r\n"));
}

fn message_for(header: &'static str, body: &'static [u8]) -> Handler {
    message(header, vec![("TEXT", body.to_vec())])
}

#[tokio::test]
async fn test_header_only_fetch_skips_discovery() {
    let transport = server(
        GREETING,
        message(MIXED_HEADER, mixed_sections(PNG_MIME, b"iVBORw0KGgpEQVRB")),
    );
    let mut session = selected(transport).await;
    let message = session
        .fetch(MessageId::Uid(7), &FetchOptions::header_only())
        .await
        .unwrap();
    assert_eq!(message.envelope.from, "Alice <alice@example.com>");
    assert!(message.parts.is_empty());
    assert!(!session.transport().sent_str().contains(".MIME]"));
}

#[tokio::test]
async fn test_download_without_storage_fails() {
    let transport = server(
        GREETING,
        message(MIXED_HEADER, mixed_sections(PNG_MIME, b"iVBORw0KGgpEQVRB")),
    );
    let mut storage = MemoryStorage::new();
    storage.set_ready(false);
    let mut session = ImapSession::new(transport, config()).with_storage(storage);
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    let options = FetchOptions::default().download(download_all());
    let err = session.fetch(MessageId::Uid(7), &options).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(embermail_core::Error::StorageNotReady)
    ));
    assert_eq!(session.status().code, StatusCode::StorageNotReady);
}

#[tokio::test]
async fn test_fetch_missing_message() {
    let transport = server(
        GREETING,
        Box::new(|cmd| {
            cmd.starts_with("UID FETCH 99 ")
                .then(|| b"EM OK FETCH completed\r\n".to_vec())
        }),
    );
    let mut session = selected(transport).await;
    let err = session
        .fetch(MessageId::Uid(99), &FetchOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageNotFound(99)));
}

#[tokio::test]
async fn test_search_keeps_most_recent() {
    let transport = server(
        GREETING,
        Box::new(|cmd| {
            (cmd == "UID SEARCH ALL").then(|| b"* SEARCH 3 12 5 9 1\r\nEM OK SEARCH completed\r\n".to_vec())
        }),
    );
    let mut session = selected(transport).await;
    let ids = session.search("", SearchOptions::recent(2)).await.unwrap();
    assert_eq!(ids, vec![MessageId::Uid(12), MessageId::Uid(9)]);

    let ids = session.search("ALL", SearchOptions::first(2)).await.unwrap();
    assert_eq!(ids, vec![MessageId::Uid(3), MessageId::Uid(12)]);
}

#[tokio::test]
async fn test_login_disabled_reports_status() {
    let events: Arc<Mutex<Vec<StatusEvent>>> = Arc::default();
    let sink = Arc::clone(&events);
    let transport = server(
        b"* OK [CAPABILITY IMAP4rev1 STARTTLS LOGINDISABLED] ready\r\n",
        Box::new(|_| None),
    );
    let mut session = ImapSession::new(transport, config())
        .with_status_sink(move |event: &StatusEvent| sink.lock().unwrap().push(event.clone()));

    let err = session.open_session().await.unwrap_err();
    assert!(matches!(err, Error::LoginDisabled));
    assert_eq!(session.status().code, StatusCode::AuthNotSupported);
    assert!(!session.transport().sent_str().contains("LOGIN"));

    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Error);
    assert_eq!(last.code, StatusCode::AuthNotSupported);
}

#[tokio::test]
async fn test_login_fallback_and_rejection() {
    let transport = server(
        b"* OK [CAPABILITY IMAP4rev1] ready\r\n",
        Box::new(|cmd| {
            cmd.starts_with("LOGIN ")
                .then(|| b"EM NO [AUTHENTICATIONFAILED] invalid credentials\r\n".to_vec())
        }),
    );
    let mut session = ImapSession::new(transport, config());
    let err = session.open_session().await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed(_)));
    assert!(session.transport().sent_str().contains("EM LOGIN alice secret\r\n"));
    assert_eq!(session.state(), SessionState::NotAuthenticated);
}

#[tokio::test]
async fn test_plain_without_initial_response() {
    let mut session = ImapSession::new(
        server(b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN] ready\r\n", Box::new(|_| None)),
        config(),
    );
    session.open_session().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    let sent = session.transport().sent_str();
    assert!(sent.contains("EM AUTHENTICATE PLAIN\r\nAGFsaWNlAHNlY3JldA==\r\n"));
    // No capabilities in the tagged OK: refreshed explicitly.
    assert!(sent.contains("EM CAPABILITY\r\n"));
    assert!(session.capabilities().has(&Capability::Move));
}

#[tokio::test]
async fn test_reconnects_and_reselects() {
    let clock = Arc::new(ManualClock::new(chrono::Utc::now()));
    let mut session = ImapSession::new(server(GREETING, Box::new(|_| None)), config())
        .with_clock(clock.clone());
    session.open_session().await.unwrap();
    session.select_mailbox("INBOX").await.unwrap();

    session.transport_mut().disconnect();
    session.noop().await.unwrap();
    assert_eq!(session.transport().connect_count(), 2);
    assert_eq!(session.state(), SessionState::Selected);
    assert_eq!(session.transport().sent_str().matches("EM SELECT INBOX").count(), 2);

    // A second drop inside the cooldown is refused.
    session.transport_mut().disconnect();
    let err = session.noop().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(embermail_core::Error::ReconnectCooldown(_))
    ));

    clock.advance(Duration::from_secs(11));
    session.noop().await.unwrap();
    assert_eq!(session.transport().connect_count(), 3);
}

#[tokio::test]
async fn test_mailbox_management() {
    let transport = server(
        b"* OK [CAPABILITY IMAP4rev1 AUTH=PLAIN SASL-IR QUOTA ACL] ready\r\n",
        Box::new(|cmd| {
            let reply: &[u8] = match cmd {
                c if c.starts_with("AUTHENTICATE PLAIN ") => b"EM OK logged in\r\n",
                "CAPABILITY" => b"* CAPABILITY IMAP4rev1 QUOTA ACL\r\nEM OK done\r\n",
                "LIST \"\" *" => b"* LIST (\\HasNoChildren) \"/\" INBOX\r\n* LIST (\\Noselect \\HasChildren) \"/\" {7}\r\nArchive\r\nEM OK LIST completed\r\n",
                "GETQUOTAROOT INBOX" => b"* QUOTAROOT INBOX \"\"\r\n* QUOTA \"\" (STORAGE 10 512)\r\nEM OK done\r\n",
                "GETACL INBOX" => b"* ACL INBOX alice lrswipkxtea bob lr\r\nEM OK done\r\n",
                "MYRIGHTS INBOX" => b"* MYRIGHTS INBOX lrswi\r\nEM OK done\r\n",
                "ID NIL" => b"* ID (\"name\" \"Dovecot\")\r\nEM OK ID completed\r\n",
                "XFROB" => b"EM BAD unknown command\r\n",
                "UID COPY 3 Archive" | "UID STORE 3 +FLAGS.SILENT (\\Deleted)" => {
                    b"EM OK done\r\n"
                }
                "EXPUNGE" => b"* 3 EXPUNGE\r\nEM OK EXPUNGE completed\r\n",
                "CREATE Projects" => b"EM OK CREATE completed\r\n",
                "APPEND Drafts (\\Seen) {20}" => b"+ Ready for literal\r\n",
                "hello" => b"EM OK [APPENDUID 1 9] APPEND completed\r\n",
                _ => return None,
            };
            Some(reply.to_vec())
        }),
    );
    let mut session = selected(transport).await;

    let list = session.list_mailboxes("", "*").await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[1].name, "Archive");
    assert!(!list[1].is_selectable());

    let root = session.get_quota_root("INBOX").await.unwrap();
    assert_eq!(root.roots, vec![String::new()]);
    assert_eq!(root.quotas[0].resources[0].limit, 512);

    let acl = session.get_acl("INBOX").await.unwrap();
    assert_eq!(acl.len(), 2);
    assert_eq!(acl[1].identifier, "bob");
    assert_eq!(session.my_rights("INBOX").await.unwrap(), "lrswi");

    let custom = session.send_custom("ID NIL").await.unwrap();
    assert_eq!(custom.completion, Completion::Ok);
    assert_eq!(custom.lines, vec!["ID (\"name\" \"Dovecot\")".to_string()]);
    let rejected = session.send_custom("XFROB").await.unwrap();
    assert_eq!(rejected.completion, Completion::Bad);

    // No MOVE capability: COPY, flag, EXPUNGE.
    session
        .move_messages(&[MessageId::Uid(3)], "Archive")
        .await
        .unwrap();
    let sent = session.transport().sent_str();
    assert!(sent.contains("EM UID COPY 3 Archive\r\n"));
    assert!(sent.contains("EM UID STORE 3 +FLAGS.SILENT (\\Deleted)\r\n"));
    assert!(sent.contains("EM EXPUNGE\r\n"));
    assert_eq!(session.selected().unwrap().exists, 11);

    session.create_mailbox("Projects").await.unwrap();
    let seen: Flags = std::iter::once(Flag::Seen).collect();
    session
        .append("Drafts", &seen, b"Subject: hi\r\n\r\nhello")
        .await
        .unwrap();
    assert!(session.transport().sent_str().ends_with("Subject: hi\r\n\r\nhello\r\n"));

    let err = session.get_quota("").await;
    assert!(err.is_err());
}

#[tokio::test]
async fn test_commands_need_a_selection() {
    let mut session = ImapSession::new(server(GREETING, Box::new(|_| None)), config());
    session.open_session().await.unwrap();
    let err = session.search("ALL", SearchOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::NoMailboxSelected));
    assert_eq!(session.status().code, StatusCode::NoMailboxSelected);
    let err = session.idle().await.unwrap_err();
    assert!(matches!(err, Error::NoMailboxSelected));
}

fn idle_handler() -> Handler {
    Box::new(|cmd| match cmd {
        "IDLE" => Some(b"+ idling\r\n".to_vec()),
        "DONE" => Some(b"EM OK IDLE terminated\r\n".to_vec()),
        _ => None,
    })
}

#[tokio::test(start_paused = true)]
async fn test_idle_reports_events() {
    let mut session = selected(server(GREETING, idle_handler())).await;
    session.idle().await.unwrap();
    assert!(session.is_idling());
    assert!(matches!(session.noop().await, Err(Error::Idle(_))));

    session
        .transport_mut()
        .push_inbound(b"* 13 EXISTS\r\n* 1 RECENT\r\n* 4 FETCH (FLAGS (\\Seen))\r\n");
    let events = session.listen(Duration::from_secs(30)).await.unwrap();
    assert_eq!(events[0], IdleEvent::Exists(13));
    assert_eq!(events[1], IdleEvent::NewMessage(1));
    assert_eq!(events[2], IdleEvent::Recent(1));
    assert!(matches!(events[3], IdleEvent::Fetch { number: 4, .. }));
    assert_eq!(session.selected().unwrap().exists, 13);

    let quiet = session.listen(Duration::from_secs(30)).await.unwrap();
    assert!(quiet.is_empty());

    session.stop_idle().await.unwrap();
    assert!(!session.is_idling());
    session.noop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_idle_renews_before_timeout() {
    let mut session = selected(server(GREETING, idle_handler())).await;
    // Below the minimum; clamped to one minute.
    session.idle_with(Duration::from_secs(5)).await.unwrap();
    let events = session.listen(Duration::from_secs(150)).await.unwrap();
    assert!(events.is_empty());

    let sent = session.transport().sent_str();
    assert_eq!(sent.matches("EM IDLE\r\n").count(), 3);
    assert_eq!(sent.matches("DONE\r\n").count(), 2);
    assert!(session.is_idling());
}

#[tokio::test(start_paused = true)]
async fn test_idle_probe_failure_closes() {
    let mut session = selected(server(GREETING, idle_handler())).await;
    session.idle().await.unwrap();
    session.transport_mut().set_reachable(false);

    let err = session.listen(Duration::from_secs(300)).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(embermail_core::Error::Unreachable(_))
    ));
    assert!(!session.is_connected());
    assert!(!session.is_idling());
    assert_eq!(session.status().code, StatusCode::HostUnreachable);
}

#[tokio::test(start_paused = true)]
async fn test_read_timeout() {
    let transport = server(
        GREETING,
        Box::new(|cmd| (cmd == "NOOP").then(Vec::new)),
    );
    let mut session = selected(transport).await;
    let err = session.noop().await.unwrap_err();
    assert!(matches!(
        err,
        Error::Core(embermail_core::Error::Timeout(_))
    ));
    assert_eq!(session.status().code, StatusCode::Timeout);
}
