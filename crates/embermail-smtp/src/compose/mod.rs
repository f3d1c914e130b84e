//! MIME composition.
//!
//! The [`Composer`] renders a [`Message`] straight into a [`BodyWriter`]:
//! headers first, then the body tree, with part content pulled from its
//! source and encoded in small chunks. Nothing larger than one chunk of
//! attachment content is held at a time.
//!
//! Tree layout, outermost first:
//!
//! ```text
//! multipart/mixed            attachments, parallel group or rfc822 parts
//!   multipart/related        inline parts
//!     multipart/alternative  both text and HTML
//!       text/plain
//!       text/html
//!     image/png              inline, Content-ID
//!   multipart/parallel       parallel parts
//!   application/pdf          attachment
//!   message/rfc822           nested message
//! ```

mod encode;

use chrono::{DateTime, FixedOffset, Utc};
use embermail_core::{OpenMode, Storage};
use rand::distributions::Alphanumeric;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::message::{Attachment, ContentSource, Disposition, Message, Priority, TextBody};
use crate::types::Mailbox;

use self::encode::{PartEncoder, quoted_param};

/// Length of generated boundary strings.
pub const BOUNDARY_LENGTH: usize = 15;

/// Bytes read from a source per encode step.
const CHUNK: usize = 512;

/// Header lines are folded before this column.
const FOLD_COLUMN: usize = 78;

/// Destination of composed bytes.
#[allow(async_fn_in_trait)]
pub trait BodyWriter {
    /// Accepts the next piece of the message.
    async fn write(&mut self, data: &[u8]) -> Result<()>;
}

impl BodyWriter for Vec<u8> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.extend_from_slice(data);
        Ok(())
    }
}

/// Writer that only counts.
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingWriter {
    /// Bytes seen so far.
    pub count: u64,
}

impl BodyWriter for CountingWriter {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.count += data.len() as u64;
        Ok(())
    }
}

/// Renders messages as MIME.
///
/// Two composers built with the same seed and date produce identical
/// output for the same message.
pub struct Composer<'a> {
    rng: StdRng,
    date: DateTime<FixedOffset>,
    storage: Option<&'a mut (dyn Storage + 'static)>,
}

impl std::fmt::Debug for Composer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composer")
            .field("date", &self.date)
            .field("storage", &self.storage.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a> Composer<'a> {
    /// Creates a composer with a randomly seeded generator.
    ///
    /// `date` stamps messages that carry no date of their own.
    #[must_use]
    pub fn new(date: DateTime<FixedOffset>) -> Self {
        Self {
            rng: StdRng::from_entropy(),
            date,
            storage: None,
        }
    }

    /// Creates a composer whose boundaries and message IDs derive from
    /// `seed`.
    #[must_use]
    pub fn with_seed(date: DateTime<FixedOffset>, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            date,
            storage: None,
        }
    }

    /// Lets file attachments be read from `storage`.
    #[must_use]
    pub fn with_storage(mut self, storage: &'a mut (dyn Storage + 'static)) -> Self {
        self.storage = Some(storage);
        self
    }

    pub(crate) fn set_storage(&mut self, storage: Option<&'a mut (dyn Storage + 'static)>) {
        self.storage = storage;
    }

    /// Returns a fresh boundary string.
    pub fn boundary(&mut self) -> String {
        self.random_string(BOUNDARY_LENGTH)
    }

    fn random_string(&mut self, len: usize) -> String {
        (&mut self.rng)
            .sample_iter(&Alphanumeric)
            .take(len)
            .map(char::from)
            .collect()
    }

    /// Renders `message` into a byte vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] for a missing file, or a storage
    /// error.
    pub async fn compose_to_vec(&mut self, message: &Message) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_message(message, &mut out).await?;
        Ok(out)
    }

    /// Composed size of `message` in bytes.
    ///
    /// # Errors
    ///
    /// See [`Composer::compose_to_vec`].
    pub async fn measure(&mut self, message: &Message) -> Result<u64> {
        let mut counter = CountingWriter::default();
        self.write_message(message, &mut counter).await?;
        Ok(counter.count)
    }

    /// Writes headers and body of `message`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Attachment`] for a missing file, storage errors,
    /// or whatever `out` fails with.
    pub async fn write_message<W: BodyWriter>(
        &mut self,
        message: &Message,
        out: &mut W,
    ) -> Result<()> {
        let headers = self.headers(message);
        out.write(headers.as_bytes()).await?;
        self.write_body(message, out).await
    }

    fn headers(&mut self, message: &Message) -> String {
        let mut h = String::with_capacity(512);
        let date = message.date.unwrap_or(self.date);
        h.push_str(&format!("Date: {}\r\n", date.to_rfc2822()));
        h.push_str(&address_header("From", std::slice::from_ref(&message.from)));
        if let Some(sender) = &message.sender {
            h.push_str(&address_header("Sender", std::slice::from_ref(sender)));
        }
        if !message.to.is_empty() {
            h.push_str(&address_header("To", &message.to));
        }
        if !message.cc.is_empty() {
            h.push_str(&address_header("Cc", &message.cc));
        }
        if let Some(reply_to) = &message.reply_to {
            h.push_str(&address_header("Reply-To", std::slice::from_ref(reply_to)));
        }
        h.push_str(&format!(
            "Subject: {}\r\n",
            embermail_codec::rfc2047::encode(&message.subject)
        ));
        let id = match &message.message_id {
            Some(id) => bracketed(id),
            None => format!(
                "<{}@{}>",
                self.random_string(20),
                message.from.address.domain()
            ),
        };
        h.push_str(&format!("Message-ID: {id}\r\n"));
        if let Some(id) = &message.in_reply_to {
            h.push_str(&format!("In-Reply-To: {}\r\n", bracketed(id)));
        }
        if let Some(ids) = &message.references {
            h.push_str(&format!("References: {ids}\r\n"));
        }
        match message.priority {
            Priority::High => h.push_str("X-Priority: 1\r\nImportance: high\r\n"),
            Priority::Low => h.push_str("X-Priority: 5\r\nImportance: low\r\n"),
            Priority::Normal => {}
        }
        for (name, value) in &message.headers {
            h.push_str(&format!("{name}: {value}\r\n"));
        }
        h.push_str("MIME-Version: 1.0\r\n");
        h
    }

    async fn write_body<W: BodyWriter>(&mut self, message: &Message, out: &mut W) -> Result<()> {
        let parts: Vec<&Attachment> = message
            .attachments
            .iter()
            .filter(|a| {
                let empty = a.source == ContentSource::None;
                if empty {
                    warn!(filename = %a.filename, "attachment has no content, skipping");
                }
                !empty
            })
            .collect();
        let of = |kind: Disposition| -> Vec<&Attachment> {
            parts
                .iter()
                .copied()
                .filter(|a| a.disposition == kind)
                .collect()
        };
        let (inline, parallel, regular) = (
            of(Disposition::Inline),
            of(Disposition::Parallel),
            of(Disposition::Attachment),
        );

        if regular.is_empty() && parallel.is_empty() && message.rfc822.is_empty() {
            return self.write_related(message, &inline, out).await;
        }

        let boundary = self.boundary();
        out.write(multipart_header("mixed", &boundary).as_bytes())
            .await?;
        let delimiter = format!("--{boundary}\r\n");
        if message.text.is_some() || message.html.is_some() || !inline.is_empty() {
            out.write(delimiter.as_bytes()).await?;
            self.write_related(message, &inline, out).await?;
        }
        if !parallel.is_empty() {
            out.write(delimiter.as_bytes()).await?;
            let inner = self.boundary();
            out.write(multipart_header("parallel", &inner).as_bytes())
                .await?;
            for part in &parallel {
                out.write(format!("--{inner}\r\n").as_bytes()).await?;
                self.write_attachment(part, out).await?;
            }
            out.write(format!("--{inner}--\r\n").as_bytes()).await?;
        }
        for part in &regular {
            out.write(delimiter.as_bytes()).await?;
            self.write_attachment(part, out).await?;
        }
        for nested in &message.rfc822 {
            out.write(delimiter.as_bytes()).await?;
            out.write(b"Content-Type: message/rfc822\r\nContent-Disposition: attachment\r\n\r\n")
                .await?;
            Box::pin(self.write_message(nested, out)).await?;
        }
        out.write(format!("--{boundary}--\r\n").as_bytes()).await
    }

    async fn write_related<W: BodyWriter>(
        &mut self,
        message: &Message,
        inline: &[&Attachment],
        out: &mut W,
    ) -> Result<()> {
        if inline.is_empty() {
            return self.write_alternative(message, out).await;
        }
        let boundary = self.boundary();
        out.write(multipart_header("related", &boundary).as_bytes())
            .await?;
        out.write(format!("--{boundary}\r\n").as_bytes()).await?;
        self.write_alternative(message, out).await?;
        for part in inline {
            out.write(format!("--{boundary}\r\n").as_bytes()).await?;
            self.write_attachment(part, out).await?;
        }
        out.write(format!("--{boundary}--\r\n").as_bytes()).await
    }

    async fn write_alternative<W: BodyWriter>(
        &mut self,
        message: &Message,
        out: &mut W,
    ) -> Result<()> {
        match (&message.text, &message.html) {
            (Some(text), Some(html)) => {
                let boundary = self.boundary();
                out.write(multipart_header("alternative", &boundary).as_bytes())
                    .await?;
                out.write(format!("--{boundary}\r\n").as_bytes()).await?;
                self.write_text(text, "plain", out).await?;
                out.write(format!("--{boundary}\r\n").as_bytes()).await?;
                self.write_text(html, "html", out).await?;
                out.write(format!("--{boundary}--\r\n").as_bytes()).await
            }
            (Some(text), None) => self.write_text(text, "plain", out).await,
            (None, Some(html)) => self.write_text(html, "html", out).await,
            (None, None) => self.write_text(&TextBody::new(""), "plain", out).await,
        }
    }

    async fn write_attachment<W: BodyWriter>(
        &mut self,
        part: &Attachment,
        out: &mut W,
    ) -> Result<()> {
        let name = quoted_param(&part.filename);
        let mut h = format!(
            "Content-Type: {}; name={name}\r\nContent-Transfer-Encoding: {}\r\n",
            part.mime_type,
            part.wire_encoding()
        );
        let disposition = match part.disposition {
            Disposition::Inline => "inline",
            Disposition::Attachment | Disposition::Parallel => "attachment",
        };
        h.push_str(&format!("Content-Disposition: {disposition}; filename={name}\r\n"));
        if let Some(id) = &part.content_id {
            h.push_str(&format!("Content-ID: {}\r\n", bracketed(id)));
        }
        if let Some(description) = &part.description {
            h.push_str(&format!(
                "Content-Description: {}\r\n",
                embermail_codec::rfc2047::encode(description)
            ));
        }
        h.push_str("\r\n");
        out.write(h.as_bytes()).await?;

        let encoder = match part.content_encoding {
            Some(_) => PartEncoder::passthrough(),
            None => PartEncoder::new(part.transfer_encoding),
        };
        self.write_content(&part.source, encoder, out).await
    }

    async fn write_text<W: BodyWriter>(
        &mut self,
        body: &TextBody,
        subtype: &str,
        out: &mut W,
    ) -> Result<()> {
        let flowed = if body.flowed { "; format=flowed" } else { "" };
        let header = format!(
            "Content-Type: text/{subtype}; charset=\"{}\"{flowed}\r\nContent-Transfer-Encoding: {}\r\n\r\n",
            body.charset, body.transfer_encoding
        );
        out.write(header.as_bytes()).await?;
        let encoder = PartEncoder::new(body.transfer_encoding).text();
        self.write_content(&body.source, encoder, out).await
    }

    /// Streams a part body from its source through `encoder`, ending it
    /// with CRLF.
    async fn write_content<W: BodyWriter>(
        &mut self,
        source: &ContentSource,
        mut encoder: PartEncoder,
        out: &mut W,
    ) -> Result<()> {
        let mut tail = TailWriter::new(out);
        match source {
            ContentSource::None => {}
            ContentSource::Blob(data) => {
                for chunk in data.chunks(CHUNK) {
                    tail.write(&encoder.update(chunk)).await?;
                }
            }
            ContentSource::File(path) => {
                self.stream_file(path, &mut encoder, &mut tail).await?;
            }
        }
        tail.write(&encoder.finish()).await?;
        tail.end_line().await
    }

    async fn stream_file<W: BodyWriter>(
        &mut self,
        path: &str,
        encoder: &mut PartEncoder,
        out: &mut TailWriter<'_, W>,
    ) -> Result<()> {
        let storage = match self.storage.as_deref_mut() {
            Some(storage) if storage.is_ready() => storage,
            _ => return Err(embermail_core::Error::StorageNotReady.into()),
        };
        if !storage.exists(path).await {
            return Err(Error::Attachment(format!("{path} not found")));
        }
        storage.open(path, OpenMode::Read).await?;
        debug!(path, "streaming file content");
        let mut buf = vec![0u8; CHUNK];
        let result: Result<_> = async {
            loop {
                let n = storage.read(&mut buf).await?;
                if n == 0 {
                    return Ok(());
                }
                out.write(&encoder.update(&buf[..n])).await?;
                tokio::task::yield_now().await;
            }
        }
        .await;
        let closed = storage.close().await;
        result?;
        closed.map_err(Error::from)
    }
}

/// Renders a memory-only message with the current time and random
/// boundaries.
///
/// # Errors
///
/// Returns a storage-not-ready error if the message has file sources.
pub async fn compose_to_vec(message: &Message) -> Result<Vec<u8>> {
    Composer::new(Utc::now().fixed_offset())
        .compose_to_vec(message)
        .await
}

/// Remembers whether the output ends with CRLF.
struct TailWriter<'w, W> {
    inner: &'w mut W,
    last: [u8; 2],
}

impl<'w, W: BodyWriter> TailWriter<'w, W> {
    const fn new(inner: &'w mut W) -> Self {
        Self {
            inner,
            last: *b"\r\n",
        }
    }

    async fn write(&mut self, data: &[u8]) -> Result<()> {
        match data {
            [] => return Ok(()),
            [byte] => self.last = [self.last[1], *byte],
            [.., a, b] => self.last = [*a, *b],
        }
        self.inner.write(data).await
    }

    /// Terminates the part body with CRLF unless it already ends in one.
    async fn end_line(&mut self) -> Result<()> {
        if &self.last == b"\r\n" {
            Ok(())
        } else {
            self.write(b"\r\n").await
        }
    }
}

fn multipart_header(subtype: &str, boundary: &str) -> String {
    format!("Content-Type: multipart/{subtype}; boundary=\"{boundary}\"\r\n\r\n")
}

fn bracketed(id: &str) -> String {
    let id = id.trim();
    if id.starts_with('<') && id.ends_with('>') {
        id.to_string()
    } else {
        format!("<{id}>")
    }
}

/// Renders an address list, folding between entries.
fn address_header(name: &str, list: &[Mailbox]) -> String {
    let mut out = format!("{name}: ");
    let mut column = out.len();
    for (i, mailbox) in list.iter().enumerate() {
        let item = mailbox.to_header();
        if i > 0 {
            out.push(',');
            if column + item.len() + 2 > FOLD_COLUMN {
                out.push_str("\r\n ");
                column = 1;
            } else {
                out.push(' ');
                column += 2;
            }
        }
        out.push_str(&item);
        column += item.len();
    }
    out.push_str("\r\n");
    out
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
    use chrono::TimeZone;
    use embermail_codec::TransferEncoding;
    use embermail_core::MemoryStorage;

    fn date() -> DateTime<FixedOffset> {
        FixedOffset::east_opt(7 * 3600)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 14, 9, 30, 0)
            .unwrap()
    }

    fn mailbox(s: &str) -> Mailbox {
        Mailbox::parse(s).unwrap()
    }

    fn base() -> Message {
        Message::new(mailbox("Device <device@example.com>"))
            .to(mailbox("alice@example.com"))
            .subject("Status")
    }

    async fn render(message: &Message) -> String {
        let bytes = Composer::with_seed(date(), 1)
            .compose_to_vec(message)
            .await
            .unwrap();
        String::from_utf8(bytes).unwrap()
    }

    /// Boundaries declared in the output, in order.
    fn boundaries(text: &str) -> Vec<String> {
        text.split("boundary=\"")
            .skip(1)
            .map(|rest| rest[..BOUNDARY_LENGTH].to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_plain_message() {
        let text = render(&base().text("line one\nline two")).await;
        assert!(text.starts_with("Date: Sat, 14 Mar 2026 09:30:00 +0700\r\n"));
        assert!(text.contains("From: Device <device@example.com>\r\n"));
        assert!(text.contains("To: alice@example.com\r\n"));
        assert!(text.contains("Subject: Status\r\n"));
        assert!(text.contains("@example.com>\r\nMIME-Version: 1.0\r\n"));
        assert!(text.contains("Content-Type: text/plain; charset=\"utf-8\"\r\n"));
        assert!(text.contains("Content-Transfer-Encoding: 7bit\r\n"));
        assert!(text.ends_with("\r\n\r\nline one\r\nline two\r\n"));
        assert!(!text.contains("multipart"));
    }

    #[tokio::test]
    async fn test_bcc_never_in_headers() {
        let msg = base()
            .bcc(mailbox("hidden@example.com"))
            .cc(mailbox("Carol <carol@example.com>"))
            .text("x");
        let text = render(&msg).await;
        assert!(!text.contains("hidden@example.com"));
        assert!(!text.contains("Bcc"));
        assert!(text.contains("Cc: Carol <carol@example.com>\r\n"));
    }

    #[tokio::test]
    async fn test_alternative_inside_mixed() {
        let msg = base()
            .text("plain")
            .html("<p>html</p>")
            .attach(Attachment::blob("a.bin", "application/octet-stream", &b"\x00\x01\x02"[..]));
        let text = render(&msg).await;
        let b = boundaries(&text);
        assert_eq!(b.len(), 2);
        assert!(b.iter().all(|b| b.len() == BOUNDARY_LENGTH
            && b.bytes().all(|c| c.is_ascii_alphanumeric())));

        let mixed = text.find("multipart/mixed").unwrap();
        let alternative = text.find("multipart/alternative").unwrap();
        let plain = text.find("text/plain").unwrap();
        let html = text.find("text/html").unwrap();
        let attachment = text.find("name=\"a.bin\"").unwrap();
        assert!(mixed < alternative && alternative < plain && plain < html && html < attachment);
        assert!(text.contains("AAEC\r\n"));
        assert!(text.ends_with(&format!("--{}--\r\n", b[0])));
        assert!(text.contains(&format!("--{}--\r\n--{}\r\n", b[1], b[0])));
    }

    #[tokio::test]
    async fn test_inline_parts_in_related() {
        let msg = base()
            .html("<img src=\"cid:logo\">")
            .attach(Attachment::blob("logo.png", "image/png", &b"PNG"[..]).inline("logo"));
        let text = render(&msg).await;
        assert!(text.contains("multipart/related"));
        assert!(!text.contains("multipart/mixed"));
        assert!(text.contains("Content-Disposition: inline; filename=\"logo.png\"\r\n"));
        assert!(text.contains("Content-ID: <logo>\r\n"));
    }

    #[tokio::test]
    async fn test_parallel_group() {
        let msg = base()
            .text("see both")
            .attach(Attachment::blob("a.jpg", "image/jpeg", &b"A"[..]).parallel())
            .attach(Attachment::blob("b.jpg", "image/jpeg", &b"B"[..]).parallel());
        let text = render(&msg).await;
        assert!(text.contains("multipart/mixed"));
        assert!(text.contains("multipart/parallel"));
        assert_eq!(text.matches("Content-Type: image/jpeg").count(), 2);
    }

    #[tokio::test]
    async fn test_rfc822_nested() {
        let inner = Message::new(mailbox("bob@example.com"))
            .to(mailbox("device@example.com"))
            .subject("Original")
            .text("forwarded body");
        let msg = base().text("see attached").attach_message(inner);
        let text = render(&msg).await;
        assert!(text.contains("Content-Type: message/rfc822\r\nContent-Disposition: attachment\r\n\r\nDate: "));
        assert!(text.contains("Subject: Original\r\n"));
        assert!(text.contains("forwarded body\r\n"));
        assert_eq!(text.matches("MIME-Version").count(), 2);
    }

    #[tokio::test]
    async fn test_empty_source_skipped() {
        let mut attachment = Attachment::blob("x", "text/plain", &b""[..]);
        attachment.source = ContentSource::None;
        let text = render(&base().text("only text").attach(attachment)).await;
        assert!(!text.contains("multipart"));
    }

    #[tokio::test]
    async fn test_quoted_printable_text() {
        let msg = base().text_body(TextBody::new("Grüße=1\n"));
        let text = render(&msg).await;
        assert!(text.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(text.ends_with("Gr=C3=BC=C3=9Fe=3D1\r\n"));
    }

    #[tokio::test]
    async fn test_pre_encoded_attachment() {
        let msg = base().text("x").attach(
            Attachment::blob("data.bin", "application/octet-stream", &b"AAEC"[..])
                .encoded(TransferEncoding::Base64),
        );
        let text = render(&msg).await;
        assert!(text.contains("Content-Transfer-Encoding: base64\r\n"));
        assert!(text.contains("\r\n\r\nAAEC\r\n"));
        assert!(!text.contains("QUFFQw"));
    }

    #[tokio::test]
    async fn test_file_attachment() {
        let mut storage = MemoryStorage::new();
        storage.insert("/logs/today.txt", b"log line\n".to_vec());
        let msg = base()
            .text("log attached")
            .attach(Attachment::file("today.txt", "text/plain", "/logs/today.txt"));
        let bytes = Composer::with_seed(date(), 1)
            .with_storage(&mut storage)
            .compose_to_vec(&msg)
            .await
            .unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("bG9nIGxpbmUK\r\n"));
    }

    #[tokio::test]
    async fn test_file_text_body() {
        let mut storage = MemoryStorage::new();
        let mut content = "a".repeat(CHUNK - 1).into_bytes();
        content.extend_from_slice(b"\r\nsecond\nthird");
        storage.insert("/outbox/body.txt", content);
        let msg = base().text_body(
            TextBody::file("/outbox/body.txt").with_encoding(TransferEncoding::SevenBit),
        );

        let size = Composer::with_seed(date(), 1)
            .with_storage(&mut storage)
            .measure(&msg)
            .await
            .unwrap();
        let bytes = Composer::with_seed(date(), 1)
            .with_storage(&mut storage)
            .compose_to_vec(&msg)
            .await
            .unwrap();
        assert_eq!(size, bytes.len() as u64);

        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Type: text/plain; charset=\"utf-8\"\r\n"));
        let expected = format!("\r\n\r\n{}\r\nsecond\r\nthird\r\n", "a".repeat(CHUNK - 1));
        assert!(text.ends_with(&expected));
        assert!(!text.contains("\r\r\n"));
    }

    #[tokio::test]
    async fn test_file_text_body_needs_storage() {
        let msg = base().text_body(TextBody::file("/outbox/body.txt"));
        let err = Composer::with_seed(date(), 1)
            .compose_to_vec(&msg)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(embermail_core::Error::StorageNotReady)));
    }

    #[tokio::test]
    async fn test_blob_html_body() {
        let html = bytes::Bytes::from_static("<p>Grüße</p>\n".as_bytes());
        let msg = base().text("plain").html_body(TextBody::blob(html));
        let mut composer = Composer::with_seed(date(), 1);
        let size = composer.measure(&msg).await.unwrap();
        let bytes = Composer::with_seed(date(), 1)
            .compose_to_vec(&msg)
            .await
            .unwrap();
        assert_eq!(size, bytes.len() as u64);

        let text = String::from_utf8(bytes).unwrap();
        let html_at = text.find("Content-Type: text/html; charset=\"utf-8\"\r\n").unwrap();
        let part = &text[html_at..];
        assert!(part.contains("Content-Transfer-Encoding: quoted-printable\r\n"));
        assert!(part.contains("\r\n\r\n<p>Gr=C3=BC=C3=9Fe</p>\r\n--"));
    }

    #[tokio::test]
    async fn test_file_attachment_errors() {
        let msg = base().attach(Attachment::file("a.txt", "text/plain", "/missing.txt"));
        let err = Composer::with_seed(date(), 1)
            .compose_to_vec(&msg)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Core(embermail_core::Error::StorageNotReady)));

        let mut storage = MemoryStorage::new();
        let err = Composer::with_seed(date(), 1)
            .with_storage(&mut storage)
            .compose_to_vec(&msg)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Attachment(_)));
    }

    #[tokio::test]
    async fn test_same_seed_same_output() {
        let msg = base().text("a").html("b");
        assert_eq!(render(&msg).await, render(&msg).await);
        let measured = Composer::with_seed(date(), 9).measure(&msg).await.unwrap();
        let other_seed = Composer::with_seed(date(), 10)
            .compose_to_vec(&msg)
            .await
            .unwrap();
        assert_eq!(measured, other_seed.len() as u64);
    }

    #[tokio::test]
    async fn test_priority_and_threading_headers() {
        let msg = base()
            .priority(Priority::High)
            .message_id("abc@example.com")
            .in_reply_to("<prev@example.com>")
            .references("<root@example.com> <prev@example.com>")
            .header("X-Device", "sensor-7")
            .text("x");
        let text = render(&msg).await;
        assert!(text.contains("Message-ID: <abc@example.com>\r\n"));
        assert!(text.contains("In-Reply-To: <prev@example.com>\r\n"));
        assert!(text.contains("References: <root@example.com> <prev@example.com>\r\n"));
        assert!(text.contains("X-Priority: 1\r\nImportance: high\r\n"));
        assert!(text.contains("X-Device: sensor-7\r\n"));
    }

    #[test]
    fn test_address_header_folds() {
        let list: Vec<Mailbox> = (0..6)
            .map(|i| mailbox(&format!("recipient{i}@example.com")))
            .collect();
        let header = address_header("To", &list);
        assert!(header.contains(",\r\n "));
        assert!(header.split("\r\n").all(|line| line.len() <= FOLD_COLUMN));
    }

    #[test]
    fn test_boundary_shape() {
        let mut composer = Composer::new(date());
        let a = composer.boundary();
        let b = composer.boundary();
        assert_eq!(a.len(), BOUNDARY_LENGTH);
        assert!(a.bytes().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
