//! Per-operation options for search and fetch.

use serde::{Deserialize, Serialize};

use crate::mime::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_PARTS};

/// Which end of an oversized search result to keep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchPolicy {
    /// Keep the first `limit` values in server order.
    #[default]
    KeepFirst,
    /// Keep the `limit` largest (most recent) values.
    KeepRecent,
}

/// Options for [`ImapSession::search`](crate::ImapSession::search).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchOptions {
    /// Maximum number of results kept; 0 keeps everything.
    pub limit: usize,
    /// Eviction policy once `limit` is exceeded.
    pub policy: SearchPolicy,
    /// Sort the kept values in descending order.
    pub sort_descending: bool,
    /// Search with `UID SEARCH` and return UIDs.
    pub uid: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            policy: SearchPolicy::KeepFirst,
            sort_descending: false,
            uid: true,
        }
    }
}

impl SearchOptions {
    /// The `n` most recent matches, newest first.
    #[must_use]
    pub fn recent(n: usize) -> Self {
        Self {
            limit: n,
            policy: SearchPolicy::KeepRecent,
            sort_descending: true,
            ..Self::default()
        }
    }

    /// The first `n` matches in server order.
    #[must_use]
    pub fn first(n: usize) -> Self {
        Self {
            limit: n,
            ..Self::default()
        }
    }

    /// Returns sequence numbers instead of UIDs.
    #[must_use]
    pub const fn sequence_numbers(mut self) -> Self {
        self.uid = false;
        self
    }
}

/// Part kinds to discover and keep in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartSelection {
    /// `text/plain` bodies.
    pub text: bool,
    /// `text/html` bodies.
    pub html: bool,
    /// Attachments.
    pub attachment: bool,
    /// Inline media.
    pub inline: bool,
    /// Encapsulated messages.
    pub rfc822: bool,
}

impl PartSelection {
    /// Everything selected.
    #[must_use]
    pub const fn all() -> Self {
        Self {
            text: true,
            html: true,
            attachment: true,
            inline: true,
            rfc822: true,
        }
    }

    /// Nothing selected.
    #[must_use]
    pub const fn none() -> Self {
        Self {
            text: false,
            html: false,
            attachment: false,
            inline: false,
            rfc822: false,
        }
    }
}

impl Default for PartSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// What to write to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadSelection {
    /// The header record.
    pub header: bool,
    /// `msg.txt`.
    pub text: bool,
    /// `msg.html`.
    pub html: bool,
    /// Attachment files.
    pub attachment: bool,
    /// Inline media files.
    pub inline: bool,
    /// Encapsulated messages' bodies and attachments.
    pub rfc822: bool,
}

impl DownloadSelection {
    /// Returns true if anything goes to storage.
    #[must_use]
    pub const fn any(&self) -> bool {
        self.header || self.text || self.html || self.attachment || self.inline || self.rfc822
    }
}

/// Size and structure ceilings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchLimits {
    /// Cap on decoded text kept in memory per part.
    pub msg_size: usize,
    /// Attachments larger than this are not fetched.
    pub attachment_size: usize,
    /// Cap on discovered parts.
    pub max_parts: usize,
    /// Cap on multipart nesting.
    pub max_depth: usize,
}

impl Default for FetchLimits {
    fn default() -> Self {
        Self {
            msg_size: 16 * 1024,
            attachment_size: 1024 * 1024,
            max_parts: DEFAULT_MAX_PARTS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Header record format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderFormat {
    /// `Name: value` lines in `header.txt`.
    #[default]
    Text,
    /// A JSON document in `header.json`.
    Json,
}

/// Where downloads go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    /// Root directory; messages land in `<dir>/<uid>/`.
    pub dir: String,
    /// Header record format.
    pub header_format: HeaderFormat,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            dir: "/email_data".to_string(),
            header_format: HeaderFormat::Text,
        }
    }
}

/// Options for [`ImapSession::fetch`](crate::ImapSession::fetch).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchOptions {
    /// Only fetch the header; skip MIME discovery.
    pub header_only: bool,
    /// Part kinds whose content is fetched.
    pub enable: PartSelection,
    /// What is written to storage.
    pub download: DownloadSelection,
    /// Ceilings.
    pub limits: FetchLimits,
    /// Storage layout.
    pub storage: StorageOptions,
    /// Fetch with `BODY[...]` instead of `BODY.PEEK[...]`, which sets
    /// `\Seen`.
    pub mark_seen: bool,
}

impl FetchOptions {
    /// Header and envelope only.
    #[must_use]
    pub fn header_only() -> Self {
        Self {
            header_only: true,
            ..Self::default()
        }
    }

    /// Sets the download selection.
    #[must_use]
    pub const fn download(mut self, download: DownloadSelection) -> Self {
        self.download = download;
        self
    }

    /// Sets the attachment size ceiling.
    #[must_use]
    pub const fn attachment_size(mut self, limit: usize) -> Self {
        self.limits.attachment_size = limit;
        self
    }

    /// Sets the storage root.
    #[must_use]
    pub fn storage_dir(mut self, dir: impl Into<String>) -> Self {
        self.storage.dir = dir.into();
        self
    }

    /// Sets the header record format.
    #[must_use]
    pub const fn header_format(mut self, format: HeaderFormat) -> Self {
        self.storage.header_format = format;
        self
    }

    /// Returns `BODY` or `BODY.PEEK`.
    #[must_use]
    pub const fn body_item(&self) -> &'static str {
        if self.mark_seen { "BODY" } else { "BODY.PEEK" }
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

    #[test]
    fn test_search_presets() {
        let recent = SearchOptions::recent(5);
        assert_eq!(recent.limit, 5);
        assert_eq!(recent.policy, SearchPolicy::KeepRecent);
        assert!(recent.sort_descending);
        assert!(recent.uid);
        assert!(!SearchOptions::first(3).sequence_numbers().uid);
    }

    #[test]
    fn test_fetch_defaults() {
        let options = FetchOptions::default();
        assert_eq!(options.body_item(), "BODY.PEEK");
        assert_eq!(options.storage.dir, "/email_data");
        assert!(!options.download.any());
        assert!(options.enable.attachment);
    }

    #[test]
    fn test_fetch_options_from_partial_json() {
        let json = r#"{"download":{"attachment":true},"limits":{"attachment_size":10}}"#;
        let options: FetchOptions = serde_json::from_str(json).unwrap();
        assert!(options.download.attachment);
        assert!(!options.download.header);
        assert_eq!(options.limits.attachment_size, 10);
        assert_eq!(options.limits.msg_size, 16 * 1024);
        assert_eq!(options.storage.header_format, HeaderFormat::Text);
    }
}
