//! Persisted message layout.
//!
//! Each message gets a directory `<root>/<uid>/` holding the header record
//! (`header.txt` or `header.json`), the text bodies (`msg.txt`,
//! `msg.html`) and attachment files. On storage without long filename
//! support attachments are stored as `<uid>_<n>` and `manifest.txt` maps
//! the short names back to the originals.

use std::collections::HashSet;

use embermail_codec::ContentType;
use embermail_core::{Storage, read_file, write_file};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::options::HeaderFormat;
use crate::types::{Envelope, Flag, Flags, MessageHeader};

/// File name of the text header record.
pub const HEADER_TEXT: &str = "header.txt";
/// File name of the JSON header record.
pub const HEADER_JSON: &str = "header.json";
/// File name of the decoded plain-text body.
pub const TEXT_FILE: &str = "msg.txt";
/// File name of the decoded HTML body.
pub const HTML_FILE: &str = "msg.html";
/// File name of the short-name manifest.
pub const MANIFEST: &str = "manifest.txt";

/// The saved form of a message header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderRecord {
    /// UID.
    pub uid: u32,
    /// Sequence number at fetch time.
    pub number: u32,
    /// Flags at fetch time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
    /// `RFC822.SIZE`.
    #[serde(default)]
    pub size: u32,
    /// Top-level content type, without parameters.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    /// Envelope fields.
    #[serde(flatten)]
    pub envelope: Envelope,
}

impl HeaderRecord {
    /// Captures the persistent fields of a fetched message.
    #[must_use]
    pub fn from_message(message: &MessageHeader) -> Self {
        Self {
            uid: message.uid,
            number: message.number,
            flags: message.flags.iter().map(|f| f.as_str().to_string()).collect(),
            size: message.size,
            content_type: message.content_type.mime_type(),
            envelope: message.envelope.clone(),
        }
    }

    /// Rebuilds the header-level fields of a message.
    #[must_use]
    pub fn to_message(&self) -> MessageHeader {
        let content_type = if self.content_type.is_empty() {
            ContentType::default()
        } else {
            ContentType::parse(&self.content_type)
        };
        MessageHeader {
            number: self.number,
            uid: self.uid,
            flags: self.flags.iter().map(|f| Flag::parse(f)).collect::<Flags>(),
            size: self.size,
            envelope: self.envelope.clone(),
            multipart: content_type.is_multipart(),
            multipart_subtype: content_type
                .is_multipart()
                .then(|| content_type.sub_type.clone()),
            content_type,
            ..MessageHeader::default()
        }
    }

    /// Renders `Name: value` lines.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = format!("UID: {}\r\nNumber: {}\r\n", self.uid, self.number);
        if !self.flags.is_empty() {
            out.push_str(&format!("Flags: {}\r\n", self.flags.join(" ")));
        }
        out.push_str(&format!("Size: {}\r\n", self.size));
        if !self.content_type.is_empty() {
            out.push_str(&format!("Content-Type: {}\r\n", self.content_type));
        }
        for (name, value) in self.envelope.fields() {
            out.push_str(&format!("{name}: {}\r\n", single_line(value)));
        }
        out
    }

    /// Parses [`HeaderRecord::to_text`] output. Unknown lines are ignored.
    #[must_use]
    pub fn parse_text(text: &str) -> Self {
        let mut record = Self::default();
        for line in text.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.strip_prefix(' ').unwrap_or(value).trim_end_matches('\r');
            match name.to_ascii_lowercase().as_str() {
                "uid" => record.uid = value.trim().parse().unwrap_or_default(),
                "number" => record.number = value.trim().parse().unwrap_or_default(),
                "size" => record.size = value.trim().parse().unwrap_or_default(),
                "flags" => record.flags = value.split_whitespace().map(str::to_string).collect(),
                "content-type" => record.content_type = value.to_string(),
                other => record.envelope.set(other, value.to_string()),
            }
        }
        record
    }

    /// Renders the JSON document.
    ///
    /// # Errors
    ///
    /// Returns a storage error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| embermail_core::Error::Storage(e.to_string()).into())
    }

    /// Parses the JSON document.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the document is malformed.
    pub fn parse_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| embermail_core::Error::Storage(e.to_string()).into())
    }
}

fn single_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}

/// Replaces characters that are unsafe in file names.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let clean: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let clean = clean.trim_start_matches('.');
    if clean.is_empty() {
        "part".to_string()
    } else {
        clean.to_string()
    }
}

/// Paths for one message directory.
#[derive(Debug, Clone)]
pub struct MessageDir {
    dir: String,
    uid: u32,
    long_names: bool,
    manifest: Vec<(String, String)>,
    taken: HashSet<String>,
}

impl MessageDir {
    /// Directory `<root>/<uid>`.
    #[must_use]
    pub fn new(root: &str, uid: u32, long_names: bool) -> Self {
        Self {
            dir: format!("{}/{uid}", root.trim_end_matches('/')),
            uid,
            long_names,
            manifest: Vec::new(),
            taken: [HEADER_TEXT, HEADER_JSON, TEXT_FILE, HTML_FILE, MANIFEST]
                .into_iter()
                .map(str::to_ascii_lowercase)
                .collect(),
        }
    }

    /// The directory path.
    #[must_use]
    pub fn dir(&self) -> &str {
        &self.dir
    }

    /// Path of a fixed file such as [`TEXT_FILE`].
    #[must_use]
    pub fn path(&self, name: &str) -> String {
        format!("{}/{name}", self.dir)
    }

    /// Path of the header record for `format`.
    #[must_use]
    pub fn header_path(&self, format: HeaderFormat) -> String {
        self.path(match format {
            HeaderFormat::Text => HEADER_TEXT,
            HeaderFormat::Json => HEADER_JSON,
        })
    }

    /// Allocates a path for an attachment.
    ///
    /// Without long filename support the file becomes `<uid>_<n>` plus the
    /// original extension when it is at most three characters. With long
    /// names a name already handed out, or one of the engine's own files,
    /// gets `_<n>` inserted before its extension.
    pub fn attachment_path(&mut self, original: &str) -> String {
        let clean = sanitize_file_name(original);
        if self.long_names {
            let name = self.unique_name(&clean);
            return self.path(&name);
        }
        let n = self.manifest.len() + 1;
        let ext = clean
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| !ext.is_empty() && ext.len() <= 3 && ext.chars().all(|c| c.is_ascii_alphanumeric()));
        let short = match ext {
            Some(ext) => format!("{}_{n}.{ext}", self.uid),
            None => format!("{}_{n}", self.uid),
        };
        self.manifest.push((short.clone(), clean));
        self.path(&short)
    }

    fn unique_name(&mut self, clean: &str) -> String {
        let (stem, ext) = match clean.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
            _ => (clean, None),
        };
        let mut name = clean.to_string();
        let mut n = 1;
        // Case-insensitive so FAT-style storage cannot collide either.
        while !self.taken.insert(name.to_ascii_lowercase()) {
            name = match ext {
                Some(ext) => format!("{stem}_{n}.{ext}"),
                None => format!("{stem}_{n}"),
            };
            n += 1;
        }
        name
    }

    /// Manifest text, if any short names were allocated.
    #[must_use]
    pub fn manifest(&self) -> Option<String> {
        if self.manifest.is_empty() {
            return None;
        }
        Some(
            self.manifest
                .iter()
                .map(|(short, original)| format!("{short}\t{original}\r\n"))
                .collect(),
        )
    }
}

/// Parses manifest text into `(short, original)` pairs.
#[must_use]
pub fn parse_manifest(text: &str) -> Vec<(String, String)> {
    text.lines()
        .filter_map(|line| line.trim_end_matches('\r').split_once('\t'))
        .map(|(short, original)| (short.to_string(), original.to_string()))
        .collect()
}

/// Writes the header record.
///
/// # Errors
///
/// Returns the storage error.
pub async fn save_header(
    storage: &mut dyn Storage,
    dir: &MessageDir,
    record: &HeaderRecord,
    format: HeaderFormat,
) -> Result<String> {
    let body = match format {
        HeaderFormat::Text => record.to_text(),
        HeaderFormat::Json => record.to_json()?,
    };
    let path = dir.header_path(format);
    write_file(storage, &path, body.as_bytes()).await?;
    Ok(path)
}

/// Reads a header record back.
///
/// # Errors
///
/// Returns the storage error, or a storage error for malformed JSON.
pub async fn load_header(
    storage: &mut dyn Storage,
    path: &str,
    format: HeaderFormat,
) -> Result<HeaderRecord> {
    let raw = read_file(storage, path).await?;
    let text = String::from_utf8_lossy(&raw);
    match format {
        HeaderFormat::Text => Ok(HeaderRecord::parse_text(&text)),
        HeaderFormat::Json => HeaderRecord::parse_json(&text),
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
    use embermail_core::MemoryStorage;

    fn record() -> HeaderRecord {
        HeaderRecord {
            uid: 42,
            number: 7,
            flags: vec!["\\Seen".into(), "$Label1".into()],
            size: 12345,
            content_type: "multipart/mixed".into(),
            envelope: Envelope {
                from: "Ren\u{e9} <rene@example.com>".into(),
                to: "a@example.com, b@example.com".into(),
                subject: "Quarterly: numbers".into(),
                date: "Mon, 1 Jan 2024 10:00:00 +0000".into(),
                message_id: "<abc@example.com>".into(),
                ..Envelope::default()
            },
        }
    }

    #[test]
    fn test_text_reparse_is_idempotent() {
        let text = record().to_text();
        let parsed = HeaderRecord::parse_text(&text);
        assert_eq!(parsed, record());
        assert_eq!(parsed.to_text(), text);
    }

    #[test]
    fn test_json_reparse_is_idempotent() {
        let json = record().to_json().unwrap();
        assert!(json.contains("\"subject\": \"Quarterly: numbers\""));
        let parsed = HeaderRecord::parse_json(&json).unwrap();
        assert_eq!(parsed, record());
        assert_eq!(parsed.to_json().unwrap(), json);
    }

    #[test]
    fn test_record_to_message() {
        let message = record().to_message();
        assert!(message.multipart);
        assert_eq!(message.multipart_subtype.as_deref(), Some("mixed"));
        assert!(message.flags.is_seen());
        assert_eq!(HeaderRecord::from_message(&message), record());
    }

    #[test]
    fn test_folded_value_kept_on_one_line() {
        let mut rec = record();
        rec.envelope.references = "<a@x>\r\n <b@x>".into();
        let parsed = HeaderRecord::parse_text(&rec.to_text());
        assert_eq!(parsed.envelope.references, "<a@x>   <b@x>");
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.pdf"), "report.pdf");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("a:b?.txt"), "a_b_.txt");
        assert_eq!(sanitize_file_name("  "), "part");
    }

    #[test]
    fn test_short_names_and_manifest() {
        let mut dir = MessageDir::new("/email_data/", 42, false);
        assert_eq!(dir.dir(), "/email_data/42");
        assert_eq!(dir.attachment_path("Quarterly Report.xlsx"), "/email_data/42/42_1");
        assert_eq!(dir.attachment_path("photo.jpg"), "/email_data/42/42_2.jpg");
        let manifest = dir.manifest().unwrap();
        assert_eq!(
            parse_manifest(&manifest),
            vec![
                ("42_1".to_string(), "Quarterly Report.xlsx".to_string()),
                ("42_2.jpg".to_string(), "photo.jpg".to_string()),
            ]
        );

        let mut long = MessageDir::new("/email_data", 42, true);
        assert_eq!(long.attachment_path("photo.jpg"), "/email_data/42/photo.jpg");
        assert!(long.manifest().is_none());
    }

    #[test]
    fn test_long_names_do_not_collide() {
        let mut dir = MessageDir::new("/mail", 7, true);
        assert_eq!(dir.attachment_path("image.png"), "/mail/7/image.png");
        assert_eq!(dir.attachment_path("image.png"), "/mail/7/image_1.png");
        assert_eq!(dir.attachment_path("IMAGE.png"), "/mail/7/IMAGE_2.png");
        assert_eq!(dir.attachment_path("README"), "/mail/7/README");
        assert_eq!(dir.attachment_path("README"), "/mail/7/README_1");
    }

    #[test]
    fn test_long_names_avoid_reserved_files() {
        let mut dir = MessageDir::new("/mail", 7, true);
        let text = dir.path(TEXT_FILE);
        let saved = dir.attachment_path("msg.txt");
        assert_ne!(saved, text);
        assert_eq!(saved, "/mail/7/msg_1.txt");
        assert_eq!(dir.attachment_path("header.txt"), "/mail/7/header_1.txt");
        assert_eq!(dir.attachment_path("Msg.HTML"), "/mail/7/Msg_1.HTML");
        assert_eq!(dir.attachment_path("manifest.txt"), "/mail/7/manifest_1.txt");
    }

    #[tokio::test]
    async fn test_save_and_load_header() {
        let mut storage = MemoryStorage::new();
        let dir = MessageDir::new("/email_data", 42, true);
        for format in [HeaderFormat::Text, HeaderFormat::Json] {
            let path = save_header(&mut storage, &dir, &record(), format).await.unwrap();
            let back = load_header(&mut storage, &path, format).await.unwrap();
            assert_eq!(back, record());
        }
        assert_eq!(
            storage.paths(),
            vec!["/email_data/42/header.json", "/email_data/42/header.txt"]
        );
    }
}
