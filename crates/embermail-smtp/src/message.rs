//! Outgoing message model.
//!
//! A [`Message`] only describes what to send. Attachment content stays in
//! its source (a shared memory blob or a file on [`Storage`]) until the
//! composer streams it onto the wire.
//!
//! [`Storage`]: embermail_core::Storage

use bytes::Bytes;
use chrono::{DateTime, FixedOffset};
use embermail_codec::TransferEncoding;

use crate::command::DsnNotify;
use crate::types::Mailbox;

/// Where part content comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContentSource {
    /// Nothing; the part is skipped with a warning.
    #[default]
    None,
    /// Bytes held in memory.
    Blob(Bytes),
    /// A file path on the session's storage.
    File(String),
}

impl ContentSource {
    /// Size known without touching storage.
    #[must_use]
    pub fn memory_len(&self) -> Option<usize> {
        match self {
            Self::None => Some(0),
            Self::Blob(data) => Some(data.len()),
            Self::File(_) => None,
        }
    }
}

/// A `text/plain` or `text/html` body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextBody {
    /// The text; line endings are normalized to CRLF when sent.
    pub source: ContentSource,
    /// `charset` parameter.
    pub charset: String,
    /// How the text is encoded on the wire.
    pub transfer_encoding: TransferEncoding,
    /// Adds `format=flowed` to the content type.
    pub flowed: bool,
}

impl TextBody {
    /// Creates a UTF-8 body; pure ASCII with short lines goes out as
    /// `7bit`, anything else as quoted-printable.
    pub fn new(content: impl Into<String>) -> Self {
        Self::blob(content.into().into_bytes())
    }

    /// Body held in memory as bytes, with the same encoding choice as
    /// [`TextBody::new`].
    pub fn blob(data: impl Into<Bytes>) -> Self {
        let data: Bytes = data.into();
        let plain = data.is_ascii() && data.split(|&b| b == b'\n').all(|l| l.len() <= 998);
        Self::with_source(
            ContentSource::Blob(data),
            if plain {
                TransferEncoding::SevenBit
            } else {
                TransferEncoding::QuotedPrintable
            },
        )
    }

    /// Body read from storage when the message is sent. The content is not
    /// inspected up front, so it goes out quoted-printable unless
    /// [`TextBody::with_encoding`] says otherwise.
    pub fn file(path: impl Into<String>) -> Self {
        Self::with_source(ContentSource::File(path.into()), TransferEncoding::QuotedPrintable)
    }

    fn with_source(source: ContentSource, transfer_encoding: TransferEncoding) -> Self {
        Self {
            source,
            charset: "utf-8".to_string(),
            transfer_encoding,
            flowed: false,
        }
    }

    /// Sets the transfer encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.transfer_encoding = encoding;
        self
    }

    /// Sets the charset parameter.
    #[must_use]
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    /// Marks the body `format=flowed`.
    #[must_use]
    pub const fn flowed(mut self) -> Self {
        self.flowed = true;
        self
    }
}

/// How an attachment is presented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Disposition {
    /// A regular attachment in `multipart/mixed`.
    #[default]
    Attachment,
    /// Referenced from the HTML body by `Content-ID`, in
    /// `multipart/related`.
    Inline,
    /// Meant to be shown side by side, in `multipart/parallel`.
    Parallel,
}

/// A file attached to a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type, e.g. `image/png`.
    pub mime_type: String,
    /// Placement in the MIME tree.
    pub disposition: Disposition,
    /// Encoding applied on the wire.
    pub transfer_encoding: TransferEncoding,
    /// Set when the source is already encoded this way; it is then sent
    /// untouched.
    pub content_encoding: Option<TransferEncoding>,
    /// `Content-ID` without angle brackets.
    pub content_id: Option<String>,
    /// `Content-Description`.
    pub description: Option<String>,
    /// The content.
    pub source: ContentSource,
}

impl Attachment {
    fn with_source(filename: String, mime_type: String, source: ContentSource) -> Self {
        Self {
            filename,
            mime_type,
            disposition: Disposition::Attachment,
            transfer_encoding: TransferEncoding::Base64,
            content_encoding: None,
            content_id: None,
            description: None,
            source,
        }
    }

    /// Attachment held in memory.
    pub fn blob(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self::with_source(
            filename.into(),
            mime_type.into(),
            ContentSource::Blob(data.into()),
        )
    }

    /// Attachment read from storage when the message is sent.
    pub fn file(
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self::with_source(
            filename.into(),
            mime_type.into(),
            ContentSource::File(path.into()),
        )
    }

    /// Makes this an inline part referenced as `cid:<content_id>`.
    #[must_use]
    pub fn inline(mut self, content_id: impl Into<String>) -> Self {
        self.disposition = Disposition::Inline;
        self.content_id = Some(content_id.into());
        self
    }

    /// Moves this part into the `multipart/parallel` group.
    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.disposition = Disposition::Parallel;
        self
    }

    /// Declares the source as already encoded with `encoding`.
    #[must_use]
    pub const fn encoded(mut self, encoding: TransferEncoding) -> Self {
        self.content_encoding = Some(encoding);
        self
    }

    /// Sets the wire encoding.
    #[must_use]
    pub const fn with_encoding(mut self, encoding: TransferEncoding) -> Self {
        self.transfer_encoding = encoding;
        self
    }

    /// Sets `Content-Description`.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Encoding named in the part's `Content-Transfer-Encoding`.
    #[must_use]
    pub fn wire_encoding(&self) -> TransferEncoding {
        self.content_encoding.unwrap_or(self.transfer_encoding)
    }
}

/// `X-Priority` / `Importance`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Priority {
    /// `X-Priority: 1`, `Importance: high`.
    High,
    /// No priority headers.
    #[default]
    Normal,
    /// `X-Priority: 5`, `Importance: low`.
    Low,
}

/// An outgoing message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Author.
    pub from: Mailbox,
    /// Actual sender when different from the author.
    pub sender: Option<Mailbox>,
    /// Primary recipients.
    pub to: Vec<Mailbox>,
    /// Carbon-copy recipients.
    pub cc: Vec<Mailbox>,
    /// Blind recipients; only ever used in the envelope.
    pub bcc: Vec<Mailbox>,
    /// `Reply-To`.
    pub reply_to: Option<Mailbox>,
    /// Subject, RFC 2047 encoded when needed.
    pub subject: String,
    /// `Message-ID` without angle brackets; generated when unset.
    pub message_id: Option<String>,
    /// `In-Reply-To`.
    pub in_reply_to: Option<String>,
    /// `References`.
    pub references: Option<String>,
    /// Priority headers.
    pub priority: Priority,
    /// Extra header fields, written as given.
    pub headers: Vec<(String, String)>,
    /// `Date`; the session clock is used when unset.
    pub date: Option<DateTime<FixedOffset>>,
    /// Plain-text body.
    pub text: Option<TextBody>,
    /// HTML body.
    pub html: Option<TextBody>,
    /// Attachments, inline and parallel parts.
    pub attachments: Vec<Attachment>,
    /// Messages attached as `message/rfc822`.
    pub rfc822: Vec<Self>,
    /// Delivery status notifications requested for every recipient.
    pub notify: Option<DsnNotify>,
}

impl Message {
    /// Creates an empty message from `from`.
    #[must_use]
    pub const fn new(from: Mailbox) -> Self {
        Self {
            from,
            sender: None,
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            reply_to: None,
            subject: String::new(),
            message_id: None,
            in_reply_to: None,
            references: None,
            priority: Priority::Normal,
            headers: Vec::new(),
            date: None,
            text: None,
            html: None,
            attachments: Vec::new(),
            rfc822: Vec::new(),
            notify: None,
        }
    }

    /// Adds a `To` recipient.
    #[must_use]
    pub fn to(mut self, mailbox: Mailbox) -> Self {
        self.to.push(mailbox);
        self
    }

    /// Adds a `Cc` recipient.
    #[must_use]
    pub fn cc(mut self, mailbox: Mailbox) -> Self {
        self.cc.push(mailbox);
        self
    }

    /// Adds a blind recipient.
    #[must_use]
    pub fn bcc(mut self, mailbox: Mailbox) -> Self {
        self.bcc.push(mailbox);
        self
    }

    /// Sets `Sender`.
    #[must_use]
    pub fn sender(mut self, mailbox: Mailbox) -> Self {
        self.sender = Some(mailbox);
        self
    }

    /// Sets `Reply-To`.
    #[must_use]
    pub fn reply_to(mut self, mailbox: Mailbox) -> Self {
        self.reply_to = Some(mailbox);
        self
    }

    /// Sets the subject.
    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    /// Sets the plain-text body.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(TextBody::new(text));
        self
    }

    /// Sets the HTML body.
    #[must_use]
    pub fn html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(TextBody::new(html));
        self
    }

    /// Sets the plain-text body with explicit options.
    #[must_use]
    pub fn text_body(mut self, body: TextBody) -> Self {
        self.text = Some(body);
        self
    }

    /// Sets the HTML body with explicit options.
    #[must_use]
    pub fn html_body(mut self, body: TextBody) -> Self {
        self.html = Some(body);
        self
    }

    /// Adds an attachment.
    #[must_use]
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Attaches another message as `message/rfc822`.
    #[must_use]
    pub fn attach_message(mut self, message: Self) -> Self {
        self.rfc822.push(message);
        self
    }

    /// Adds a header field.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets the priority.
    #[must_use]
    pub const fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Sets `Message-ID`.
    #[must_use]
    pub fn message_id(mut self, id: impl Into<String>) -> Self {
        self.message_id = Some(id.into());
        self
    }

    /// Sets `In-Reply-To`.
    #[must_use]
    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.in_reply_to = Some(id.into());
        self
    }

    /// Sets `References`.
    #[must_use]
    pub fn references(mut self, ids: impl Into<String>) -> Self {
        self.references = Some(ids.into());
        self
    }

    /// Sets `Date`.
    #[must_use]
    pub const fn date(mut self, date: DateTime<FixedOffset>) -> Self {
        self.date = Some(date);
        self
    }

    /// Requests delivery status notifications.
    #[must_use]
    pub const fn notify(mut self, notify: DsnNotify) -> Self {
        self.notify = Some(notify);
        self
    }

    /// Every envelope recipient: `To`, then `Cc`, then `Bcc`.
    pub fn recipients(&self) -> impl Iterator<Item = &Mailbox> {
        self.to.iter().chain(&self.cc).chain(&self.bcc)
    }

    /// Returns true if any part goes out as raw 8-bit data.
    #[must_use]
    pub fn needs_8bit(&self) -> bool {
        let text = [&self.text, &self.html]
            .into_iter()
            .flatten()
            .any(|body| body.transfer_encoding == TransferEncoding::EightBit);
        text || self
            .attachments
            .iter()
            .any(|a| a.wire_encoding() == TransferEncoding::EightBit)
            || self.rfc822.iter().any(Self::needs_8bit)
    }

    /// Returns true if any content is read from storage.
    #[must_use]
    pub fn has_file_sources(&self) -> bool {
        self.sources()
            .any(|source| matches!(source, ContentSource::File(_)))
            || self.rfc822.iter().any(Self::has_file_sources)
    }

    /// Content sources of the bodies and attachments, not descending into
    /// attached messages.
    pub fn sources(&self) -> impl Iterator<Item = &ContentSource> {
        [&self.text, &self.html]
            .into_iter()
            .flatten()
            .map(|body| &body.source)
            .chain(self.attachments.iter().map(|a| &a.source))
    }
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

    fn mailbox(s: &str) -> Mailbox {
        Mailbox::parse(s).unwrap()
    }

    #[test]
    fn test_text_body_encoding_choice() {
        assert_eq!(
            TextBody::new("hello\nworld").transfer_encoding,
            TransferEncoding::SevenBit
        );
        assert_eq!(
            TextBody::new("grüße").transfer_encoding,
            TransferEncoding::QuotedPrintable
        );
        assert_eq!(
            TextBody::new("x".repeat(1200)).transfer_encoding,
            TransferEncoding::QuotedPrintable
        );
    }

    #[test]
    fn test_recipients_order() {
        let msg = Message::new(mailbox("a@example.com"))
            .bcc(mailbox("d@example.com"))
            .to(mailbox("b@example.com"))
            .cc(mailbox("c@example.com"));
        let all: Vec<_> = msg.recipients().map(|m| m.address.as_str()).collect();
        assert_eq!(all, vec!["b@example.com", "c@example.com", "d@example.com"]);
    }

    #[test]
    fn test_needs_8bit() {
        let msg = Message::new(mailbox("a@example.com")).text("plain");
        assert!(!msg.needs_8bit());
        let msg = msg.text_body(TextBody::new("ü").with_encoding(TransferEncoding::EightBit));
        assert!(msg.needs_8bit());

        let nested = Message::new(mailbox("a@example.com"))
            .attach(Attachment::blob("a.txt", "text/plain", "x").encoded(TransferEncoding::EightBit));
        let outer = Message::new(mailbox("a@example.com")).attach_message(nested);
        assert!(outer.needs_8bit());
    }

    #[test]
    fn test_attachment_builders() {
        let a = Attachment::file("logo.png", "image/png", "/img/logo.png").inline("logo");
        assert_eq!(a.disposition, Disposition::Inline);
        assert_eq!(a.content_id.as_deref(), Some("logo"));
        assert_eq!(a.wire_encoding(), TransferEncoding::Base64);
        assert_eq!(a.source.memory_len(), None);

        let a = Attachment::blob("a.b64", "application/octet-stream", "AAAA")
            .encoded(TransferEncoding::Base64)
            .parallel();
        assert_eq!(a.disposition, Disposition::Parallel);
        assert_eq!(a.source.memory_len(), Some(4));
        assert!(!Message::new(mailbox("a@example.com")).attach(a).has_file_sources());
    }

    #[test]
    fn test_text_body_sources() {
        let body = TextBody::new("hi");
        assert_eq!(body.source, ContentSource::Blob(Bytes::from_static(b"hi")));

        let body = TextBody::blob(&b"<p>caf\xc3\xa9</p>"[..]);
        assert_eq!(body.transfer_encoding, TransferEncoding::QuotedPrintable);

        let body = TextBody::file("/outbox/report.txt");
        assert_eq!(body.source.memory_len(), None);
        assert_eq!(body.transfer_encoding, TransferEncoding::QuotedPrintable);

        let msg = Message::new(mailbox("a@example.com")).html("<p>x</p>");
        assert!(!msg.has_file_sources());
        assert!(msg.text_body(body).has_file_sources());
    }
}
