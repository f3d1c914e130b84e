//! End-to-end SMTP session behavior against a scripted server.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, TimeZone};
use embermail_codec::TransferEncoding;
use embermail_core::mock::MockTransport;
use embermail_core::{
    Credentials, EventKind, MemoryStorage, Security, SessionConfig, StatusCode, StatusEvent,
    Transport,
};
use embermail_smtp::{
    Attachment, Composer, DsnNotify, Error, Mailbox, Message, SendOptions, SessionState,
    SmtpSession, TextBody,
};
use proptest::prelude::*;

/// What the fake server saw.
#[derive(Debug, Default)]
struct Recorded {
    commands: Vec<String>,
    bdat: Vec<usize>,
    body: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Command,
    Bdat { remaining: usize, last: bool },
    Data,
    Login(u8),
}

/// A byte-level SMTP server good enough for the engine.
struct FakeServer {
    extensions: Vec<&'static str>,
    reject_ehlo: bool,
    reject_rcpt: Vec<&'static str>,
    reject_bdat: Option<usize>,
    mail_reply: &'static str,
    auth_reply: &'static str,
    mode: Mode,
    buf: Vec<u8>,
    seen: Arc<Mutex<Recorded>>,
}

impl FakeServer {
    fn new(extensions: &[&'static str]) -> Self {
        Self {
            extensions: extensions.to_vec(),
            reject_ehlo: false,
            reject_rcpt: Vec::new(),
            reject_bdat: None,
            mail_reply: "250 2.1.0 sender ok",
            auth_reply: "235 2.7.0 accepted",
            mode: Mode::Command,
            buf: Vec::new(),
            seen: Arc::new(Mutex::new(Recorded::default())),
        }
    }

    fn feed(&mut self, data: &[u8]) -> Vec<u8> {
        self.buf.extend_from_slice(data);
        let mut out = Vec::new();
        loop {
            match self.mode {
                Mode::Command | Mode::Login(_) => {
                    let Some(pos) = self.buf.iter().position(|&b| b == b'\n') else {
                        break;
                    };
                    let raw: Vec<u8> = self.buf.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim_end().to_string();
                    out.extend(self.on_line(&line));
                }
                Mode::Bdat { remaining, last } => {
                    if self.buf.is_empty() {
                        break;
                    }
                    let take = remaining.min(self.buf.len());
                    let chunk: Vec<u8> = self.buf.drain(..take).collect();
                    self.seen.lock().unwrap().body.extend(chunk);
                    if take < remaining {
                        self.mode = Mode::Bdat {
                            remaining: remaining - take,
                            last,
                        };
                        break;
                    }
                    self.mode = Mode::Command;
                    out.extend(self.chunk_reply(last));
                }
                Mode::Data => {
                    let mut seen = self.seen.lock().unwrap();
                    seen.body.append(&mut self.buf);
                    if seen.body.ends_with(b"\r\n.\r\n") {
                        drop(seen);
                        self.mode = Mode::Command;
                        out.extend(b"250 2.0.0 queued as 42\r\n");
                    }
                    break;
                }
            }
        }
        out
    }

    fn chunk_reply(&self, last: bool) -> Vec<u8> {
        let count = self.seen.lock().unwrap().bdat.len();
        if self.reject_bdat == Some(count) {
            b"554 5.6.0 chunk refused\r\n".to_vec()
        } else if last {
            b"250 2.0.0 message accepted\r\n".to_vec()
        } else {
            b"250 2.0.0 chunk ok\r\n".to_vec()
        }
    }

    fn on_line(&mut self, line: &str) -> Vec<u8> {
        self.seen.lock().unwrap().commands.push(line.to_string());
        if let Mode::Login(step) = self.mode {
            return if step == 0 {
                self.mode = Mode::Login(1);
                b"334 UGFzc3dvcmQ6\r\n".to_vec()
            } else {
                self.mode = Mode::Command;
                b"235 2.7.0 accepted\r\n".to_vec()
            };
        }
        let upper = line.to_ascii_uppercase();
        let reply = if upper.starts_with("EHLO ") {
            if self.reject_ehlo {
                "502 5.5.1 command not recognized".to_string()
            } else {
                let mut lines = vec!["mx.example.com greets you".to_string()];
                lines.extend(self.extensions.iter().map(ToString::to_string));
                let last = lines.len() - 1;
                return lines
                    .iter()
                    .enumerate()
                    .map(|(i, l)| format!("250{}{l}\r\n", if i == last { ' ' } else { '-' }))
                    .collect::<String>()
                    .into_bytes();
            }
        } else if upper.starts_with("HELO ") {
            "250 mx.example.com".to_string()
        } else if upper == "STARTTLS" {
            "220 2.0.0 ready to start TLS".to_string()
        } else if upper == "AUTH LOGIN" {
            self.mode = Mode::Login(0);
            "334 VXNlcm5hbWU6".to_string()
        } else if upper.starts_with("AUTH ") {
            self.auth_reply.to_string()
        } else if upper.starts_with("MAIL FROM:") {
            self.mail_reply.to_string()
        } else if let Some(rest) = upper.strip_prefix("RCPT TO:<") {
            if self
                .reject_rcpt
                .iter()
                .any(|r| rest.starts_with(&r.to_ascii_uppercase()))
            {
                "550 5.1.1 no such user".to_string()
            } else {
                "250 2.1.5 ok".to_string()
            }
        } else if upper == "DATA" {
            self.mode = Mode::Data;
            "354 end data with <CR><LF>.<CR><LF>".to_string()
        } else if let Some(args) = upper.strip_prefix("BDAT ") {
            let mut words = args.split_whitespace();
            let size: usize = words.next().and_then(|w| w.parse().ok()).unwrap_or(0);
            let last = words.next() == Some("LAST");
            self.seen.lock().unwrap().bdat.push(size);
            if size == 0 {
                return self.chunk_reply(last);
            }
            self.mode = Mode::Bdat {
                remaining: size,
                last,
            };
            return Vec::new();
        } else if upper == "RSET" || upper == "NOOP" {
            "250 2.0.0 ok".to_string()
        } else if upper == "QUIT" {
            "221 2.0.0 bye".to_string()
        } else {
            "500 5.5.2 unknown command".to_string()
        };
        format!("{reply}\r\n").into_bytes()
    }

    /// Turns the server into a transport; returns what it records.
    fn into_transport(self) -> (MockTransport, Arc<Mutex<Recorded>>) {
        let seen = Arc::clone(&self.seen);
        let mut server = self;
        let transport = MockTransport::new()
            .with_greeting(b"220 mx.example.com ESMTP ready\r\n")
            .stall_when_empty()
            .with_responder(move |data| server.feed(data));
        (transport, seen)
    }
}

fn config() -> SessionConfig {
    SessionConfig::smtp("smtp.example.com")
        .credentials(Credentials::password("device@example.com", "secret"))
        .client_domain("sensor.example.com")
        .read_timeout(Duration::from_secs(5))
        .build()
}

fn date() -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .unwrap()
        .with_ymd_and_hms(2026, 5, 20, 12, 0, 0)
        .unwrap()
}

fn mailbox(s: &str) -> Mailbox {
    Mailbox::parse(s).unwrap()
}

fn message() -> Message {
    Message::new(mailbox("Sensor <device@example.com>"))
        .to(mailbox("alice@example.com"))
        .subject("Readings")
        .date(date())
        .text("All values nominal.")
}

fn storage() -> MemoryStorage {
    let mut storage = MemoryStorage::new();
    let csv: String = (0..120).map(|i| format!("{i},{}\n", i * 7)).collect();
    storage.insert("/data/report.csv", csv.into_bytes());
    storage
}

fn events() -> (Arc<Mutex<Vec<StatusEvent>>>, impl FnMut(&StatusEvent) + Send + 'static) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = {
        let events = Arc::clone(&events);
        move |e: &StatusEvent| events.lock().unwrap().push(e.clone())
    };
    (events, sink)
}

/// Undoes DATA dot-stuffing and strips the terminator.
fn unstuff(raw: &[u8]) -> Vec<u8> {
    let body = raw.strip_suffix(b".\r\n").unwrap_or(raw);
    let mut out = Vec::with_capacity(body.len());
    for line in body.split_inclusive(|&b| b == b'\n') {
        out.extend_from_slice(line.strip_prefix(b".").unwrap_or(line));
    }
    out
}

#[tokio::test]
async fn test_chunking_send_with_attachments() {
    let server = FakeServer::new(&["SIZE 10000000", "8BITMIME", "AUTH PLAIN LOGIN", "CHUNKING"]);
    let (transport, seen) = server.into_transport();
    let mut session = SmtpSession::new(transport, config())
        .with_storage(storage())
        .with_options(SendOptions::default().with_chunk_size(1024));

    let msg = message()
        .cc(mailbox("bob@example.com"))
        .bcc(mailbox("carol@example.com"))
        .html("<p>All values <b>nominal</b>.</p>")
        .attach(Attachment::blob(
            "snapshot.bin",
            "application/octet-stream",
            vec![0xA5u8; 2000],
        ))
        .attach(Attachment::file("report.csv", "text/csv", "/data/report.csv"));

    let report = session.send(&msg, false).await.unwrap();

    let seen = seen.lock().unwrap();
    let commands: Vec<&str> = seen
        .commands
        .iter()
        .filter(|c| !c.starts_with("BDAT"))
        .map(|c| c.split(" SIZE=").next().unwrap_or_default())
        .collect();
    assert_eq!(
        commands,
        vec![
            "EHLO sensor.example.com",
            "AUTH PLAIN AGRldmljZUBleGFtcGxlLmNvbQBzZWNyZXQ=",
            "MAIL FROM:<device@example.com>",
            "RCPT TO:<alice@example.com>",
            "RCPT TO:<bob@example.com>",
            "RCPT TO:<carol@example.com>",
            "QUIT",
        ]
    );
    let last_bdat = seen.commands.iter().rfind(|c| c.starts_with("BDAT")).unwrap();
    assert_eq!(last_bdat, "BDAT 0 LAST");
    assert_eq!(seen.bdat.last(), Some(&0));
    assert!(seen.bdat[..seen.bdat.len() - 1].iter().all(|&n| n > 0 && n <= 1024));
    // Frames are cut at chunk_size, not at composer write boundaries.
    let data_frames = &seen.bdat[..seen.bdat.len() - 1];
    assert!(data_frames.len() > 2);
    assert!(data_frames[..data_frames.len() - 1].iter().all(|&n| n == 1024));

    let mut expected_storage = storage();
    let expected = Composer::with_seed(date(), 3)
        .with_storage(&mut expected_storage)
        .compose_to_vec(&msg)
        .await
        .unwrap();
    let framed: usize = seen.bdat.iter().sum();
    assert_eq!(framed, seen.body.len());
    assert_eq!(framed, expected.len());

    let body = String::from_utf8_lossy(&seen.body);
    assert!(body.contains("multipart/mixed"));
    assert!(body.contains("multipart/alternative"));
    assert!(body.contains("filename=\"report.csv\""));
    assert!(!body.contains("carol@example.com"));

    assert_eq!(report.recipients, 3);
    assert_eq!(report.chunks, seen.bdat.len());
    assert_eq!(report.bytes, framed as u64);
    assert_eq!(report.response, "2.0.0 message accepted");
    assert!(!session.is_connected());
    assert!(session.status().is_ok());
}

#[tokio::test]
async fn test_data_transfer_dot_stuffs() {
    let (transport, seen) = FakeServer::new(&["SIZE 1000000", "AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    let msg = message().text(".hidden\n..two\nend");
    let report = session.send(&msg, true).await.unwrap();

    let seen = seen.lock().unwrap();
    let body = String::from_utf8_lossy(&seen.body);
    assert!(body.contains("\r\n\r\n..hidden\r\n...two\r\nend\r\n.\r\n"));
    assert!(seen.bdat.is_empty());
    assert_eq!(report.chunks, 0);
    assert_eq!(report.bytes, unstuff(&seen.body).len() as u64);

    let mail = seen
        .commands
        .iter()
        .find(|c| c.starts_with("MAIL FROM"))
        .unwrap();
    assert_eq!(mail, &format!("MAIL FROM:<device@example.com> SIZE={}", report.bytes));
    assert!(session.is_connected());
    assert_eq!(session.state(), SessionState::Authenticated);
}

#[tokio::test]
async fn test_message_too_large() {
    let (transport, seen) = FakeServer::new(&["SIZE 100", "AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    let err = session
        .send(&message().text("x".repeat(500)), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::MessageTooLarge { limit: 100, .. }));
    assert_eq!(session.status().code, StatusCode::InvalidData);
    assert!(
        !seen
            .lock()
            .unwrap()
            .commands
            .iter()
            .any(|c| c.starts_with("MAIL"))
    );
}

#[tokio::test]
async fn test_no_recipients() {
    let (transport, _) = FakeServer::new(&[]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    let msg = Message::new(mailbox("device@example.com")).text("lonely");
    let err = session.send(&msg, false).await.unwrap_err();
    assert!(matches!(err, Error::NoRecipients));
    assert_eq!(session.transport().connect_count(), 0);
}

#[tokio::test]
async fn test_recipient_rejected_then_reset() {
    let mut server = FakeServer::new(&["AUTH PLAIN"]);
    server.reject_rcpt = vec!["nobody@"];
    let (transport, seen) = server.into_transport();
    let mut session = SmtpSession::new(transport, config());

    let bad = message().to(mailbox("nobody@example.com"));
    let err = session.send(&bad, true).await.unwrap_err();
    match err {
        Error::RecipientRejected { address, code, .. } => {
            assert_eq!(address, "nobody@example.com");
            assert_eq!(code, 550);
        }
        other => panic!("expected a rejected recipient, got {other:?}"),
    }
    assert_eq!(session.status().code, StatusCode::CommandRejected);
    assert!(session.is_connected());

    session.send(&message(), true).await.unwrap();
    let seen = seen.lock().unwrap();
    let rset = seen.commands.iter().position(|c| c == "RSET").unwrap();
    let second_mail = seen
        .commands
        .iter()
        .rposition(|c| c.starts_with("MAIL FROM"))
        .unwrap();
    assert!(rset < second_mail);
    assert_eq!(session.transport().connect_count(), 1);
}

#[tokio::test]
async fn test_helo_fallback_without_auth() {
    let mut server = FakeServer::new(&[]);
    server.reject_ehlo = true;
    let (transport, seen) = server.into_transport();
    let mut session = SmtpSession::new(transport, config());

    session.send(&message(), false).await.unwrap();
    assert!(!session.server_info().esmtp);
    let seen = seen.lock().unwrap();
    assert_eq!(seen.commands[0], "EHLO sensor.example.com");
    assert_eq!(seen.commands[1], "HELO sensor.example.com");
    assert!(!seen.commands.iter().any(|c| c.starts_with("AUTH")));
    assert!(seen.commands.iter().any(|c| c == "DATA"));
}

#[tokio::test]
async fn test_starttls_upgrade() {
    let (transport, seen) = FakeServer::new(&["STARTTLS", "AUTH PLAIN"]).into_transport();
    let config = SessionConfig::smtp("smtp.example.com")
        .security(Security::StartTls)
        .credentials(Credentials::password("device@example.com", "secret"))
        .build();
    let mut session = SmtpSession::new(transport, config);

    session.open_session().await.unwrap();
    assert!(session.transport().is_secure());
    assert_eq!(session.config().server.port, 587);
    let seen = seen.lock().unwrap();
    let ehlo = seen.commands.iter().filter(|c| c.starts_with("EHLO")).count();
    assert_eq!(ehlo, 2);
    assert_eq!(seen.commands[1], "STARTTLS");
    assert!(seen.commands[3].starts_with("AUTH PLAIN "));
}

#[tokio::test]
async fn test_starttls_required_but_missing() {
    let (transport, _) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let config = SessionConfig::smtp("smtp.example.com")
        .security(Security::StartTls)
        .build();
    let mut session = SmtpSession::new(transport, config);

    let err = session.connect().await.unwrap_err();
    assert!(matches!(err, Error::CapabilityMissing("STARTTLS")));
    assert_eq!(session.status().code, StatusCode::CapabilityMissing);
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_auth_login_exchange() {
    let (transport, seen) = FakeServer::new(&["AUTH LOGIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    session.open_session().await.unwrap();
    assert_eq!(session.state(), SessionState::Authenticated);
    let seen = seen.lock().unwrap();
    assert_eq!(
        &seen.commands[1..4],
        &["AUTH LOGIN", "ZGV2aWNlQGV4YW1wbGUuY29t", "c2VjcmV0"]
    );
}

#[tokio::test]
async fn test_xoauth2() {
    let (transport, seen) = FakeServer::new(&["AUTH PLAIN XOAUTH2"]).into_transport();
    let config = SessionConfig::smtp("smtp.example.com")
        .credentials(Credentials::token("device@example.com", "ya29.token"))
        .build();
    let mut session = SmtpSession::new(transport, config);

    session.open_session().await.unwrap();
    let auth = seen.lock().unwrap().commands[1].clone();
    assert!(auth.starts_with("AUTH XOAUTH2 "));
}

#[tokio::test]
async fn test_auth_failure_reports_error_event() {
    let mut server = FakeServer::new(&["AUTH PLAIN"]);
    server.auth_reply = "535 5.7.8 credentials invalid";
    let (transport, _) = server.into_transport();
    let (events, sink) = events();
    let mut session = SmtpSession::new(transport, config()).with_status_sink(sink);

    let err = session.send(&message(), false).await.unwrap_err();
    assert!(matches!(err, Error::AuthFailed(_)));
    assert_eq!(session.status().code, StatusCode::AuthFailed);
    let events = events.lock().unwrap();
    let last = events.last().unwrap();
    assert_eq!(last.kind, EventKind::Error);
    assert_eq!(last.code, StatusCode::AuthFailed);
    assert!(!events.iter().any(|e| e.kind == EventKind::Success));
}

#[tokio::test]
async fn test_auth_not_supported_for_token() {
    let (transport, _) = FakeServer::new(&["AUTH LOGIN"]).into_transport();
    let config = SessionConfig::smtp("smtp.example.com")
        .credentials(Credentials::token("device@example.com", "tok"))
        .build();
    let mut session = SmtpSession::new(transport, config);

    let err = session.open_session().await.unwrap_err();
    assert!(matches!(err, Error::AuthNotSupported));
}

#[tokio::test]
async fn test_pipelined_chunks() {
    let (transport, seen) =
        FakeServer::new(&["AUTH PLAIN", "CHUNKING", "PIPELINING"]).into_transport();
    let mut session = SmtpSession::new(transport, config())
        .with_options(SendOptions::default().with_chunk_size(256));

    let msg = message().attach(Attachment::blob(
        "blob.bin",
        "application/octet-stream",
        vec![7u8; 4000],
    ));
    let report = session.send(&msg, true).await.unwrap();
    let seen = seen.lock().unwrap();
    assert!(seen.bdat.len() > 20);
    assert_eq!(report.chunks, seen.bdat.len());
    assert_eq!(seen.bdat.iter().sum::<usize>(), seen.body.len());
    assert_eq!(report.bytes, seen.body.len() as u64);
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_pipelined_chunk_failure_drops_connection() {
    let mut server = FakeServer::new(&["AUTH PLAIN", "CHUNKING", "PIPELINING"]);
    server.reject_bdat = Some(2);
    let (transport, _) = server.into_transport();
    let mut session = SmtpSession::new(transport, config())
        .with_options(SendOptions::default().with_chunk_size(256));

    let msg = message().attach(Attachment::blob(
        "blob.bin",
        "application/octet-stream",
        vec![7u8; 2000],
    ));
    let err = session.send(&msg, true).await.unwrap_err();
    assert!(matches!(err, Error::Smtp { code: 554, .. }));
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_chunking_disabled_uses_data() {
    let (transport, seen) = FakeServer::new(&["AUTH PLAIN", "CHUNKING"]).into_transport();
    let mut session = SmtpSession::new(transport, config())
        .with_options(SendOptions::default().without_chunking());

    session.send(&message(), false).await.unwrap();
    let seen = seen.lock().unwrap();
    assert!(seen.bdat.is_empty());
    assert!(seen.commands.iter().any(|c| c == "DATA"));
}

#[tokio::test]
async fn test_8bitmime_and_dsn_parameters() {
    let (transport, seen) =
        FakeServer::new(&["AUTH PLAIN", "8BITMIME", "DSN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    let msg = message()
        .text_body(TextBody::new("Grüße").with_encoding(TransferEncoding::EightBit))
        .notify(DsnNotify::FAILURE_AND_DELAY);
    session.send(&msg, false).await.unwrap();

    let seen = seen.lock().unwrap();
    let mail = seen.commands.iter().find(|c| c.starts_with("MAIL")).unwrap();
    assert!(mail.contains(" BODY=8BITMIME"));
    let rcpt = seen.commands.iter().find(|c| c.starts_with("RCPT")).unwrap();
    assert_eq!(rcpt, "RCPT TO:<alice@example.com> NOTIFY=FAILURE,DELAY");
    assert!(seen.body.windows("Grüße".len()).any(|w| w == "Grüße".as_bytes()));
}

#[tokio::test]
async fn test_progress_events() {
    let (transport, _) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let (events, sink) = events();
    let mut session = SmtpSession::new(transport, config()).with_status_sink(sink);

    let msg = message().attach(Attachment::blob(
        "blob.bin",
        "application/octet-stream",
        vec![1u8; 30_000],
    ));
    session.send(&msg, false).await.unwrap();

    let events = events.lock().unwrap();
    let progress: Vec<u8> = events.iter().filter_map(|e| e.progress).collect();
    assert!(progress.len() > 10);
    assert!(progress.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(progress.last(), Some(&100));
    assert_eq!(events.last().unwrap().kind, EventKind::Success);
}

#[tokio::test]
async fn test_missing_file_fails_before_transaction() {
    let (transport, seen) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config()).with_storage(MemoryStorage::new());

    let msg = message().attach(Attachment::file("gone.csv", "text/csv", "/data/gone.csv"));
    let err = session.send(&msg, true).await.unwrap_err();
    assert!(matches!(err, Error::Attachment(_)));
    assert_eq!(session.status().code, StatusCode::FileIo);
    assert!(
        !seen
            .lock()
            .unwrap()
            .commands
            .iter()
            .any(|c| c.starts_with("MAIL"))
    );
    assert!(session.is_connected());
}

#[tokio::test]
async fn test_missing_text_body_file_fails_before_transaction() {
    let (transport, seen) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config()).with_storage(MemoryStorage::new());

    let msg = message().text_body(TextBody::file("/outbox/gone.txt"));
    let err = session.send(&msg, true).await.unwrap_err();
    assert!(matches!(err, Error::Attachment(_)));
    assert!(
        !seen
            .lock()
            .unwrap()
            .commands
            .iter()
            .any(|c| c.starts_with("MAIL"))
    );
}

#[tokio::test]
async fn test_service_unavailable_drops_connection() {
    let mut server = FakeServer::new(&["AUTH PLAIN"]);
    server.mail_reply = "421 4.3.2 shutting down";
    let (transport, _) = server.into_transport();
    let mut session = SmtpSession::new(transport, config());

    let err = session.send(&message(), true).await.unwrap_err();
    assert!(err.is_transient());
    assert!(!session.is_connected());
}

#[tokio::test]
async fn test_reconnects_after_drop() {
    let (transport, _) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    tokio_test::assert_ok!(session.send(&message(), true).await);
    session.transport_mut().disconnect();
    tokio_test::assert_ok!(session.send(&message(), true).await);
    assert_eq!(session.transport().connect_count(), 2);
}

#[tokio::test]
async fn test_quit_and_noop() {
    let (transport, seen) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
    let mut session = SmtpSession::new(transport, config());

    session.noop().await.unwrap();
    session.reset().await.unwrap();
    session.quit().await.unwrap();
    assert!(!session.is_connected());
    let seen = seen.lock().unwrap();
    let tail: Vec<&str> = seen.commands.iter().rev().take(3).map(String::as_str).collect();
    assert_eq!(tail, vec!["QUIT", "RSET", "NOOP"]);
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_data_round_trips_dotted_lines(text in "[a-z. ]{0,20}(\n[a-z. ]{0,20}){0,6}") {
        let msg = message().message_id("fixed@example.com").text(text);
        let expected = runtime()
            .block_on(Composer::new(date()).compose_to_vec(&msg))
            .unwrap();

        let (transport, seen) = FakeServer::new(&["AUTH PLAIN"]).into_transport();
        let mut session = SmtpSession::new(transport, config());
        runtime().block_on(session.send(&msg, false)).unwrap();

        let seen = seen.lock().unwrap();
        prop_assert!(seen.body.ends_with(b"\r\n.\r\n"));
        prop_assert_eq!(unstuff(&seen.body), expected);
    }
}
