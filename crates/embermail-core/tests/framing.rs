//! Line reader behavior against a fragmenting, scripted server.

use std::time::Duration;

use embermail_core::mock::MockTransport;
use embermail_core::{Error, FramedStream, literal_length};

#[tokio::test]
async fn test_fetch_response_with_literal_split_everywhere() {
    let script = b"* OK ready\r\n* 1 FETCH (UID 7 BODY[1.MIME] {43}\r\nContent-Type: text/plain; charset=utf-8\r\n\r\n)\r\nEM OK done\r\n";
    for limit in [1, 2, 5, 13, 64] {
        let transport = MockTransport::new()
            .with_greeting(script)
            .with_read_limit(limit);
        let mut stream = FramedStream::new(transport);
        stream
            .connect("imap.example.com", 143, Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(stream.read_line().await.unwrap(), b"* OK ready");
        let line = stream.read_line().await.unwrap();
        let n = literal_length(&line).unwrap();
        assert_eq!(n, 43);
        let body = stream.read_exact(n).await.unwrap();
        assert!(body.starts_with(b"Content-Type: text/plain"));
        assert_eq!(stream.read_line().await.unwrap(), b")");
        assert_eq!(stream.read_line().await.unwrap(), b"EM OK done");
    }
}

#[tokio::test]
async fn test_responder_round_trip() {
    let transport = MockTransport::new()
        .with_greeting(b"220 smtp.example.com ESMTP\r\n")
        .with_line_responder(|line| {
            if line.starts_with("EHLO") {
                b"250-smtp.example.com\r\n250 CHUNKING\r\n".to_vec()
            } else {
                b"500 what\r\n".to_vec()
            }
        });
    let mut stream = FramedStream::new(transport);
    stream
        .connect("smtp.example.com", 25, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(stream.read_line().await.unwrap(), b"220 smtp.example.com ESMTP");
    stream.write_all(b"EHLO dev").await.unwrap();
    stream.write_all(b"ice\r\n").await.unwrap();
    assert_eq!(stream.read_line().await.unwrap(), b"250-smtp.example.com");
    assert_eq!(stream.read_line().await.unwrap(), b"250 CHUNKING");
}

#[tokio::test]
async fn test_reconnect_replays_greeting() {
    let transport = MockTransport::new().with_greeting(b"* OK hi\r\n");
    let mut stream = FramedStream::new(transport);
    stream
        .connect("imap.example.com", 143, Duration::from_secs(1))
        .await
        .unwrap();
    stream.transport_mut().disconnect();
    assert!(matches!(stream.read_line().await, Err(Error::ConnectionClosed)));

    stream
        .connect("imap.example.com", 143, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(stream.read_line().await.unwrap(), b"* OK hi");
    assert_eq!(stream.transport().connect_count(), 2);
}
