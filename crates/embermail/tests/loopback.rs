//! The SMTP engine over a real socket, with attachments read from disk.

use std::time::Duration;

use embermail::smtp::{Attachment, Mailbox, Message, SmtpSession};
use embermail::{FsStorage, TcpTransport};
use embermail_core::{Credentials, Security, SessionConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

/// Accepts one client and returns the commands and the message body.
async fn serve_once(listener: TcpListener) -> (Vec<String>, Vec<u8>) {
    let (socket, _) = listener.accept().await.unwrap();
    let (read, mut write) = socket.into_split();
    let mut reader = BufReader::new(read);
    write.write_all(b"220 loopback ESMTP\r\n").await.unwrap();

    let mut commands = Vec::new();
    let mut body = Vec::new();
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await.unwrap() == 0 {
            break;
        }
        let command = line.trim_end().to_string();
        let verb = command.split(' ').next().unwrap_or_default().to_string();
        let reply: &[u8] = match verb.as_str() {
            "EHLO" => b"250-loopback\r\n250-SIZE 1000000\r\n250 AUTH PLAIN\r\n",
            "AUTH" => b"235 2.7.0 ok\r\n",
            "MAIL" | "RCPT" => b"250 ok\r\n",
            "DATA" => {
                write.write_all(b"354 go ahead\r\n").await.unwrap();
                let mut byte = [0u8; 1];
                while !body.ends_with(b"\r\n.\r\n") {
                    reader.read_exact(&mut byte).await.unwrap();
                    body.push(byte[0]);
                }
                b"250 2.0.0 queued\r\n"
            }
            "QUIT" => {
                commands.push(command);
                write.write_all(b"221 bye\r\n").await.unwrap();
                break;
            }
            _ => b"500 what\r\n",
        };
        commands.push(command);
        write.write_all(reply).await.unwrap();
    }
    (commands, body)
}

#[tokio::test]
async fn test_send_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = tokio::spawn(serve_once(listener));

    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::create_dir_all(dir.path().join("logs")).await.unwrap();
    tokio::fs::write(dir.path().join("logs/boot.log"), b"boot ok\n")
        .await
        .unwrap();

    let config = SessionConfig::smtp("127.0.0.1")
        .port(port)
        .security(Security::None)
        .credentials(Credentials::password("device@example.com", "secret"))
        .read_timeout(Duration::from_secs(5))
        .build();
    let mut session =
        SmtpSession::new(TcpTransport::new(), config).with_storage(FsStorage::new(dir.path()));

    let message = Message::new(Mailbox::parse("device@example.com").unwrap())
        .to(Mailbox::parse("ops@example.com").unwrap())
        .subject("Boot report")
        .text("Attached.")
        .attach(Attachment::file("boot.log", "text/plain", "/logs/boot.log"));
    let report = session.send(&message, false).await.unwrap();
    assert_eq!(report.response, "2.0.0 queued");
    assert!(!session.is_connected());

    let (commands, body) = server.await.unwrap();
    assert_eq!(commands.first().map(String::as_str), Some("EHLO localhost"));
    assert!(commands.iter().any(|c| c.starts_with("AUTH PLAIN ")));
    assert_eq!(commands.last().map(String::as_str), Some("QUIT"));

    let body = String::from_utf8_lossy(&body);
    assert!(body.contains("filename=\"boot.log\""));
    // base64 of "boot ok\n"
    assert!(body.contains("Ym9vdCBvawo="));
}
