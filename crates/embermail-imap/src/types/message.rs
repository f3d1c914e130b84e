//! Fetched message and MIME part records.

use embermail_codec::{CharsetDecoder, ContentType, DispositionKind, Headers, TransferEncoding, rfc2047};
use serde::{Deserialize, Serialize};

use super::Flags;

/// A message selector: sequence number or UID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageId {
    /// Message sequence number.
    Number(u32),
    /// Unique identifier.
    Uid(u32),
}

impl MessageId {
    /// The numeric value, whichever kind it is.
    #[must_use]
    pub const fn value(self) -> u32 {
        match self {
            Self::Number(n) | Self::Uid(n) => n,
        }
    }

    /// Returns true for [`MessageId::Uid`].
    #[must_use]
    pub const fn is_uid(self) -> bool {
        matches!(self, Self::Uid(_))
    }

    /// Command prefix for FETCH/STORE/COPY: `"UID "` or `""`.
    pub(crate) const fn prefix(self) -> &'static str {
        if self.is_uid() { "UID " } else { "" }
    }
}

/// Envelope fields decoded from the message header.
///
/// RFC 2047 encoded words are already decoded; absent fields are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// `From`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    /// `Sender`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sender: String,
    /// `To`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    /// `Cc`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cc: String,
    /// `Reply-To`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reply_to: String,
    /// `Subject`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject: String,
    /// `Date`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub date: String,
    /// `Message-ID`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    /// `In-Reply-To`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub in_reply_to: String,
    /// `References`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub references: String,
}

impl Envelope {
    /// Header names making up an envelope, in save order.
    pub const FIELD_NAMES: [&'static str; 10] = [
        "From",
        "Sender",
        "To",
        "Cc",
        "Reply-To",
        "Subject",
        "Date",
        "Message-ID",
        "In-Reply-To",
        "References",
    ];

    /// Builds an envelope from a header block, decoding encoded words.
    #[must_use]
    pub fn from_headers(headers: &Headers, decoder: Option<&dyn CharsetDecoder>) -> Self {
        let mut envelope = Self::default();
        for name in Self::FIELD_NAMES {
            if let Some(value) = headers.get(name) {
                envelope.set(name, rfc2047::decode_with(value, decoder));
            }
        }
        envelope
    }

    /// Sets a field by header name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: String) {
        let field = match name.to_ascii_lowercase().as_str() {
            "from" => &mut self.from,
            "sender" => &mut self.sender,
            "to" => &mut self.to,
            "cc" => &mut self.cc,
            "reply-to" => &mut self.reply_to,
            "subject" => &mut self.subject,
            "date" => &mut self.date,
            "message-id" => &mut self.message_id,
            "in-reply-to" => &mut self.in_reply_to,
            "references" => &mut self.references,
            _ => return,
        };
        *field = value;
    }

    /// Field values paired with their header names, skipping empty ones.
    #[must_use]
    pub fn fields(&self) -> Vec<(&'static str, &str)> {
        let values = [
            &self.from,
            &self.sender,
            &self.to,
            &self.cc,
            &self.reply_to,
            &self.subject,
            &self.date,
            &self.message_id,
            &self.in_reply_to,
            &self.references,
        ];
        Self::FIELD_NAMES
            .into_iter()
            .zip(values)
            .filter(|(_, v)| !v.is_empty())
            .map(|(name, v)| (name, v.as_str()))
            .collect()
    }
}

/// What a part is, decided after discovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// Body text (`text/plain`).
    PlainText,
    /// Body text (`text/html`).
    Html,
    /// Media referenced from the HTML body or shown inline.
    InlineMedia,
    /// File attachment.
    Attachment,
    /// Header of an encapsulated `message/rfc822`.
    Rfc822,
    /// Anything else.
    #[default]
    Other,
}

/// One discovered MIME body part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartInfo {
    /// Part path, e.g. `1.2`.
    pub path: String,
    /// Section used to fetch the content; differs from `path` for the body
    /// of a single-part encapsulated message (`2.TEXT`).
    pub fetch_section: String,
    /// Parsed `Content-Type`.
    pub content_type: ContentType,
    /// Declared charset, lowercased; empty if none.
    pub charset: String,
    /// `name` parameter of the content type.
    pub name: Option<String>,
    /// `filename` parameter of the disposition.
    pub filename: Option<String>,
    /// Disposition type.
    pub disposition: DispositionKind,
    /// Transfer encoding.
    pub encoding: TransferEncoding,
    /// `Content-ID` without angle brackets.
    pub content_id: Option<String>,
    /// `Content-Description`.
    pub description: Option<String>,
    /// Size announced by the disposition `size` parameter.
    pub declared_size: Option<usize>,
    /// Octets the server announced for the content.
    pub octet_len: usize,
    /// Octets consumed so far; never exceeds `octet_len`.
    pub octet_count: usize,
    /// Classification.
    pub kind: PartKind,
    /// Subtype of the enclosing multipart (`mixed`, `related`, ...).
    pub parent_multipart: Option<String>,
    /// True when this record describes an encapsulated message.
    pub rfc822_part: bool,
    /// Path of the encapsulated message this part belongs to.
    pub rfc822_parent: Option<String>,
    /// Envelope of the encapsulated message, on `rfc822_part` records.
    pub rfc822_envelope: Option<Envelope>,
    /// Decoded text (bounded), for text parts that were fetched.
    pub text: String,
    /// True if `text` hit the size limit.
    pub truncated: bool,
    /// True if the part was not fetched because of the size limit.
    pub skipped: bool,
    /// Storage path the content was written to.
    pub saved_path: Option<String>,
}

impl PartInfo {
    /// Builds a part from its MIME header block.
    #[must_use]
    pub fn from_headers(path: &str, headers: &Headers, decoder: Option<&dyn CharsetDecoder>) -> Self {
        let content_type = headers
            .get("Content-Type")
            .map(ContentType::parse)
            .unwrap_or_default();
        let disposition = headers
            .get("Content-Disposition")
            .map(embermail_codec::ContentDisposition::parse)
            .unwrap_or_default();
        let decode = |s: &str| rfc2047::decode_with(s, decoder);
        Self {
            path: path.to_string(),
            fetch_section: path.to_string(),
            charset: content_type
                .charset()
                .map(str::to_ascii_lowercase)
                .unwrap_or_default(),
            name: content_type.name().map(decode),
            filename: disposition.filename().map(decode),
            disposition: disposition.kind,
            encoding: headers
                .get("Content-Transfer-Encoding")
                .map(TransferEncoding::parse)
                .unwrap_or_default(),
            content_id: headers
                .get("Content-ID")
                .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>').to_string()),
            description: headers.get("Content-Description").map(decode),
            declared_size: disposition.size(),
            content_type,
            ..Self::default()
        }
    }

    /// Records consumed octets, clamped to the announced length.
    pub fn record_octets(&mut self, n: usize) {
        self.octet_count = (self.octet_count + n).min(self.octet_len);
    }

    /// Returns true once every announced octet has been consumed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.octet_count == self.octet_len
    }

    /// The best file name: disposition `filename`, then content-type `name`.
    #[must_use]
    pub fn file_name(&self) -> Option<&str> {
        self.filename.as_deref().or(self.name.as_deref())
    }

    /// Returns true for body text parts.
    #[must_use]
    pub const fn is_body_text(&self) -> bool {
        matches!(self.kind, PartKind::PlainText | PartKind::Html)
    }
}

/// One fetched message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// Message sequence number.
    pub number: u32,
    /// UID.
    pub uid: u32,
    /// Flags at fetch time.
    pub flags: Flags,
    /// `RFC822.SIZE`.
    pub size: u32,
    /// Decoded envelope.
    pub envelope: Envelope,
    /// Top-level `Content-Type`.
    pub content_type: ContentType,
    /// True if the top level is `multipart/*`.
    pub multipart: bool,
    /// Top-level multipart subtype.
    pub multipart_subtype: Option<String>,
    /// Top-level boundary.
    pub boundary: Option<String>,
    /// Parts in discovery order.
    pub parts: Vec<PartInfo>,
    /// Directory the message was saved under, if any.
    pub saved_dir: Option<String>,
}

impl MessageHeader {
    /// Decoded plain-text body, if fetched.
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.body_of(PartKind::PlainText)
    }

    /// Decoded HTML body, if fetched.
    #[must_use]
    pub fn html(&self) -> Option<&str> {
        self.body_of(PartKind::Html)
    }

    /// Attachment parts, skipped or not.
    pub fn attachments(&self) -> impl Iterator<Item = &PartInfo> {
        self.parts.iter().filter(|p| p.kind == PartKind::Attachment)
    }

    fn body_of(&self, kind: PartKind) -> Option<&str> {
        self.parts
            .iter()
            .find(|p| p.kind == kind && p.rfc822_parent.is_none() && p.octet_len > 0)
            .map(|p| p.text.as_str())
    }
}

/// Counters for one fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchStats {
    /// Octets downloaded, plus the declared size of attachments skipped for
    /// exceeding the size limit.
    pub downloaded_bytes: u64,
    /// Parts skipped for exceeding the size limit.
    pub skipped_parts: usize,
    /// Files written to storage.
    pub saved_files: usize,
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

    #[test]
    fn test_envelope_decodes_latin1_word() {
        let headers = Headers::parse(
            "From: =?iso-8859-1?Q?Ren=E9?= <rene@example.com>\r\nSubject: caf=?ISO-8859-1?B?6Q==?=\r\n",
        );
        let envelope = Envelope::from_headers(&headers, None);
        assert_eq!(envelope.from, "Ren\u{e9} <rene@example.com>");
        assert_eq!(envelope.subject, "caf\u{e9}");
        assert_eq!(envelope.fields().len(), 2);
    }

    #[test]
    fn test_part_from_headers() {
        let headers = Headers::parse(
            "Content-Type: image/png; name=\"logo.png\"\r\n\
             Content-Transfer-Encoding: BASE64\r\n\
             Content-Disposition: inline; filename=\"logo.png\"; size=2048\r\n\
             Content-ID: <logo@x>\r\n",
        );
        let part = PartInfo::from_headers("1.2", &headers, None);
        assert_eq!(part.content_type.mime_type(), "image/png");
        assert_eq!(part.encoding, TransferEncoding::Base64);
        assert_eq!(part.disposition, DispositionKind::Inline);
        assert_eq!(part.content_id.as_deref(), Some("logo@x"));
        assert_eq!(part.declared_size, Some(2048));
        assert_eq!(part.file_name(), Some("logo.png"));
    }

    #[test]
    fn test_octet_count_clamped() {
        let mut part = PartInfo {
            octet_len: 10,
            ..PartInfo::default()
        };
        part.record_octets(6);
        assert!(!part.is_complete());
        part.record_octets(6);
        assert_eq!(part.octet_count, 10);
        assert!(part.is_complete());
    }

    #[test]
    fn test_message_id() {
        assert_eq!(MessageId::Uid(9).prefix(), "UID ");
        assert_eq!(MessageId::Number(9).prefix(), "");
        assert_eq!(MessageId::Number(9).value(), 9);
    }
}
