//! MIME structure discovery without BODYSTRUCTURE.
//!
//! The walker probes one part at a time with `BODY[<path>.MIME]`, depth
//! first, and keeps the current position as an explicit stack of frames.
//! It performs no I/O: the session asks for [`MimeWalker::next_probe`],
//! runs the fetch, and feeds the header block (or `None` for a part that
//! does not exist) back through [`MimeWalker::on_response`].
//!
//! ```
//! use embermail_imap::mime::{MimeWalker, Probe};
//!
//! let mut walker = MimeWalker::new("mixed");
//! assert_eq!(walker.next_probe(), Some(Probe::Mime("1".into())));
//! walker.on_response(Some(b"Content-Type: text/plain\r\n"), None);
//! assert_eq!(walker.next_probe(), Some(Probe::Mime("2".into())));
//! walker.on_response(None, None);
//! assert_eq!(walker.next_probe(), None);
//! assert_eq!(walker.parts()[0].path, "1");
//! ```

use std::collections::HashMap;

use embermail_codec::{CharsetDecoder, ContentType, DispositionKind, Headers};
use tracing::{debug, warn};

use crate::types::{Envelope, PartInfo, PartKind};

/// Default cap on discovered parts per message.
pub const DEFAULT_MAX_PARTS: usize = 64;

/// Default cap on multipart nesting.
pub const DEFAULT_MAX_DEPTH: usize = 8;

/// One level of the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 1-based position of the child being probed at this level.
    pub index: u32,
    /// Subtype of the multipart whose children this level enumerates.
    pub subtype: String,
    /// The part at `index` is an encapsulated message whose own header
    /// must be fetched next.
    pub rfc822_header_pending: bool,
}

impl Frame {
    fn new(subtype: &str) -> Self {
        Self {
            index: 1,
            subtype: subtype.to_ascii_lowercase(),
            rfc822_header_pending: false,
        }
    }
}

/// The fetch the walker needs next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    /// Fetch `BODY[<path>.MIME]`.
    Mime(String),
    /// Fetch `BODY[<path>.HEADER]` of an encapsulated message.
    Rfc822Header(String),
}

impl Probe {
    /// Part path being probed.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Mime(p) | Self::Rfc822Header(p) => p,
        }
    }

    /// Section to put inside `BODY.PEEK[...]`.
    #[must_use]
    pub fn section(&self) -> String {
        match self {
            Self::Mime(p) => format!("{p}.MIME"),
            Self::Rfc822Header(p) => format!("{p}.HEADER"),
        }
    }
}

/// Depth-first MIME discovery state.
#[derive(Debug, Clone)]
pub struct MimeWalker {
    stack: Vec<Frame>,
    parts: Vec<PartInfo>,
    max_parts: usize,
    max_depth: usize,
    probes: usize,
    truncated: bool,
}

impl MimeWalker {
    /// Starts a walk over the children of a top-level multipart.
    #[must_use]
    pub fn new(root_subtype: &str) -> Self {
        Self {
            stack: vec![Frame::new(root_subtype)],
            parts: Vec::new(),
            max_parts: DEFAULT_MAX_PARTS,
            max_depth: DEFAULT_MAX_DEPTH,
            probes: 0,
            truncated: false,
        }
    }

    /// Overrides the part and depth caps.
    #[must_use]
    pub const fn with_limits(mut self, max_parts: usize, max_depth: usize) -> Self {
        self.max_parts = max_parts;
        self.max_depth = max_depth;
        self
    }

    /// The current stack, root first.
    #[must_use]
    pub fn stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Parts discovered so far.
    #[must_use]
    pub fn parts(&self) -> &[PartInfo] {
        &self.parts
    }

    /// Number of probes answered.
    #[must_use]
    pub const fn probes(&self) -> usize {
        self.probes
    }

    /// Returns true if the walk stopped early at the part cap.
    #[must_use]
    pub const fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Path of the part the top frame points at.
    #[must_use]
    pub fn current_path(&self) -> String {
        let indices: Vec<String> = self.stack.iter().map(|f| f.index.to_string()).collect();
        indices.join(".")
    }

    /// The next fetch to run, or `None` once the walk is complete.
    #[must_use]
    pub fn next_probe(&self) -> Option<Probe> {
        if self.truncated {
            return None;
        }
        let top = self.stack.last()?;
        let path = self.current_path();
        Some(if top.rfc822_header_pending {
            Probe::Rfc822Header(path)
        } else {
            Probe::Mime(path)
        })
    }

    /// Feeds the answer to the last probe.
    ///
    /// `None` means the server reported the part as nonexistent (`NO`,
    /// `BAD` or `NIL`); `Some(b"")` is a present but empty part.
    pub fn on_response(&mut self, header: Option<&[u8]>, decoder: Option<&dyn CharsetDecoder>) {
        let Some(top) = self.stack.last() else {
            return;
        };
        self.probes += 1;
        let path = self.current_path();

        if top.rfc822_header_pending {
            self.on_rfc822_header(&path, header, decoder);
            return;
        }

        let Some(raw) = header else {
            debug!(path, "no such part, closing level");
            self.pop();
            return;
        };
        if self.parts.len() >= self.max_parts {
            warn!(max = self.max_parts, "part limit reached, stopping discovery");
            self.truncated = true;
            return;
        }

        let headers = Headers::parse_bytes(raw);
        let mut part = PartInfo::from_headers(&path, &headers, decoder);
        part.parent_multipart = Some(top.subtype.clone());

        if part.content_type.is_multipart() {
            if self.stack.len() >= self.max_depth {
                warn!(path, "multipart nested too deep, skipping");
                self.advance();
            } else {
                let subtype = part.content_type.sub_type.clone();
                self.stack.push(Frame::new(&subtype));
            }
        } else if part.content_type.is_rfc822() && part.disposition != DispositionKind::Attachment {
            part.rfc822_part = true;
            self.parts.push(part);
            if let Some(top) = self.stack.last_mut() {
                top.rfc822_header_pending = true;
            }
        } else {
            self.parts.push(part);
            self.advance();
        }
    }

    fn on_rfc822_header(&mut self, path: &str, header: Option<&[u8]>, decoder: Option<&dyn CharsetDecoder>) {
        if let Some(top) = self.stack.last_mut() {
            top.rfc822_header_pending = false;
        }
        let Some(raw) = header else {
            // No reachable inner header: keep it as an opaque message part.
            if let Some(part) = self.parts.iter_mut().rev().find(|p| p.path == path) {
                part.rfc822_part = false;
            }
            self.advance();
            return;
        };

        let headers = Headers::parse_bytes(raw);
        let inner = headers
            .get("Content-Type")
            .map(ContentType::parse)
            .unwrap_or_default();
        if let Some(part) = self.parts.iter_mut().rev().find(|p| p.path == path) {
            part.rfc822_envelope = Some(Envelope::from_headers(&headers, decoder));
        }

        if inner.is_multipart() && self.stack.len() < self.max_depth {
            self.stack.push(Frame::new(&inner.sub_type));
        } else {
            let mut body = PartInfo::from_headers(path, &headers, decoder);
            body.fetch_section = format!("{path}.TEXT");
            body.rfc822_parent = Some(path.to_string());
            self.parts.push(body);
            self.advance();
        }
    }

    /// Moves to the next sibling at the current level.
    fn advance(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.index += 1;
            top.rfc822_header_pending = false;
        }
    }

    /// Closes the current level and moves its parent to the next sibling.
    fn pop(&mut self) {
        self.stack.pop();
        self.advance();
    }

    /// Finishes the walk and returns the classified parts.
    #[must_use]
    pub fn into_parts(mut self) -> Vec<PartInfo> {
        classify_parts(&mut self.parts);
        self.parts
    }
}

/// Returns true if `child` lies strictly inside `parent` (`1.2` is inside
/// `1`; `10` is not).
#[must_use]
pub fn multipart_member(parent: &str, child: &str) -> bool {
    child.len() > parent.len()
        && child.starts_with(parent)
        && child.as_bytes()[parent.len()] == b'.'
}

fn parent_path(path: &str) -> &str {
    path.rsplit_once('.').map_or("", |(parent, _)| parent)
}

/// Assigns a [`PartKind`] to every part and links parts to the
/// encapsulated message they belong to.
pub fn classify_parts(parts: &mut [PartInfo]) {
    let messages: Vec<String> = parts
        .iter()
        .filter(|p| p.rfc822_part)
        .map(|p| p.path.clone())
        .collect();
    let mut siblings: HashMap<String, usize> = HashMap::new();
    for part in parts.iter() {
        *siblings.entry(parent_path(&part.path).to_string()).or_default() += 1;
    }

    for part in parts.iter_mut() {
        if let Some(owner) = messages
            .iter()
            .filter(|m| multipart_member(m, &part.path))
            .max_by_key(|m| m.len())
        {
            part.rfc822_parent = Some(owner.clone());
        }
        let has_sibling = siblings
            .get(parent_path(&part.path))
            .is_some_and(|&n| n > 1);
        part.kind = classify(part, has_sibling);
    }
}

fn classify(part: &PartInfo, has_sibling: bool) -> PartKind {
    let ct = &part.content_type;
    let named = part.file_name().is_some();
    if part.rfc822_part {
        return PartKind::Rfc822;
    }
    if part.disposition == DispositionKind::Attachment {
        return PartKind::Attachment;
    }
    if ct.is("text", "plain") && !named {
        return PartKind::PlainText;
    }
    if ct.is("text", "html") && !named {
        return PartKind::Html;
    }
    let grouped = matches!(
        part.parent_multipart.as_deref(),
        Some("related" | "parallel")
    );
    let inline = part.disposition == DispositionKind::Inline || part.content_id.is_some();
    if grouped && has_sibling {
        return if inline {
            PartKind::InlineMedia
        } else {
            PartKind::Attachment
        };
    }
    if inline && !ct.is_text() {
        return PartKind::InlineMedia;
    }
    if named || ct.is_rfc822() || !(ct.is_text() || ct.is_multipart()) {
        return PartKind::Attachment;
    }
    PartKind::Other
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
    use proptest::prelude::*;

    /// Answers probes from a path -> header table, `None` when absent.
    fn walk(root: &str, table: &[(&str, &str)]) -> (Vec<PartInfo>, Vec<String>) {
        let table: HashMap<String, String> = table
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        let mut walker = MimeWalker::new(root);
        let mut probes = Vec::new();
        while let Some(probe) = walker.next_probe() {
            let section = probe.section();
            probes.push(section.clone());
            let answer = table.get(&section).map(String::as_bytes);
            walker.on_response(answer, None);
        }
        (walker.into_parts(), probes)
    }

    #[test]
    fn test_mixed_alternative_with_attachment() {
        let (parts, probes) = walk(
            "mixed",
            &[
                ("1.MIME", "Content-Type: multipart/alternative; boundary=\"b2\"\r\n"),
                ("1.1.MIME", "Content-Type: text/plain; charset=utf-8\r\n"),
                ("1.2.MIME", "Content-Type: text/html; charset=utf-8\r\n"),
                (
                    "2.MIME",
                    "Content-Type: image/png; name=\"a.png\"\r\nContent-Disposition: attachment; filename=\"a.png\"\r\nContent-Transfer-Encoding: base64\r\n",
                ),
            ],
        );
        let paths: Vec<&str> = parts.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["1.1", "1.2", "2"]);
        let kinds: Vec<PartKind> = parts.iter().map(|p| p.kind).collect();
        assert_eq!(kinds, vec![PartKind::PlainText, PartKind::Html, PartKind::Attachment]);
        assert_eq!(parts[0].parent_multipart.as_deref(), Some("alternative"));
        assert_eq!(
            probes,
            vec!["1.MIME", "1.1.MIME", "1.2.MIME", "1.3.MIME", "2.MIME", "3.MIME"]
        );
    }

    #[test]
    fn test_related_group_inline_and_attachment() {
        let (parts, _) = walk(
            "related",
            &[
                ("1.MIME", "Content-Type: text/html\r\n"),
                ("2.MIME", "Content-Type: image/jpeg\r\nContent-ID: <img1>\r\n"),
                ("3.MIME", "Content-Type: application/pdf; name=doc.pdf\r\n"),
            ],
        );
        let kinds: Vec<PartKind> = parts.iter().map(|p| p.kind).collect();
        assert_eq!(
            kinds,
            vec![PartKind::Html, PartKind::InlineMedia, PartKind::Attachment]
        );
    }

    #[test]
    fn test_encapsulated_multipart_message() {
        let (parts, probes) = walk(
            "mixed",
            &[
                ("1.MIME", "Content-Type: text/plain\r\n"),
                ("2.MIME", "Content-Type: message/rfc822\r\n"),
                (
                    "2.HEADER",
                    "Subject: inner\r\nFrom: a@b.c\r\nContent-Type: multipart/alternative; boundary=x\r\n",
                ),
                ("2.1.MIME", "Content-Type: text/plain\r\n"),
                ("2.2.MIME", "Content-Type: text/html\r\n"),
            ],
        );
        assert_eq!(
            probes,
            vec!["1.MIME", "2.MIME", "2.HEADER", "2.1.MIME", "2.2.MIME", "2.3.MIME", "3.MIME"]
        );
        let paths: Vec<&str> = parts.iter().map(|p| p.path.as_str()).collect();
        assert_eq!(paths, vec!["1", "2", "2.1", "2.2"]);
        assert_eq!(parts[1].kind, PartKind::Rfc822);
        assert_eq!(parts[1].rfc822_envelope.as_ref().unwrap().subject, "inner");
        assert_eq!(parts[2].rfc822_parent.as_deref(), Some("2"));
        assert_eq!(parts[3].rfc822_parent.as_deref(), Some("2"));
        assert_eq!(parts[0].rfc822_parent, None);
    }

    #[test]
    fn test_encapsulated_single_part_uses_text_section() {
        let (parts, _) = walk(
            "mixed",
            &[
                ("1.MIME", "Content-Type: message/rfc822\r\n"),
                ("1.HEADER", "Subject: fwd\r\nContent-Type: text/plain; charset=iso-8859-1\r\n"),
            ],
        );
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1].path, "1");
        assert_eq!(parts[1].fetch_section, "1.TEXT");
        assert_eq!(parts[1].charset, "iso-8859-1");
        assert_eq!(parts[1].kind, PartKind::PlainText);
        assert_eq!(parts[1].rfc822_parent.as_deref(), Some("1"));
    }

    #[test]
    fn test_attached_rfc822_is_not_descended() {
        let (parts, probes) = walk(
            "mixed",
            &[(
                "1.MIME",
                "Content-Type: message/rfc822\r\nContent-Disposition: attachment; filename=fwd.eml\r\n",
            )],
        );
        assert_eq!(probes, vec!["1.MIME", "2.MIME"]);
        assert_eq!(parts[0].kind, PartKind::Attachment);
    }

    #[test]
    fn test_empty_part_is_present() {
        let (parts, probes) = walk("mixed", &[("1.MIME", ""), ("2.MIME", "Content-Type: text/html\r\n")]);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].path, "1");
        assert_eq!(probes.len(), 3);
    }

    #[test]
    fn test_part_cap_stops_walk() {
        let mut walker = MimeWalker::new("mixed").with_limits(2, 8);
        for _ in 0..5 {
            if walker.next_probe().is_none() {
                break;
            }
            walker.on_response(Some(b"Content-Type: text/plain\r\n"), None);
        }
        assert!(walker.is_truncated());
        assert_eq!(walker.parts().len(), 2);
        assert_eq!(walker.next_probe(), None);
    }

    #[test]
    fn test_stack_tracks_depth() {
        let mut walker = MimeWalker::new("mixed");
        walker.on_response(Some(b"Content-Type: multipart/related; boundary=r\r\n"), None);
        assert_eq!(walker.stack().len(), 2);
        assert_eq!(walker.current_path(), "1.1");
        assert_eq!(walker.stack()[1].subtype, "related");
        walker.on_response(None, None);
        assert_eq!(walker.stack().len(), 1);
        assert_eq!(walker.current_path(), "2");
    }

    #[test]
    fn test_multipart_member() {
        assert!(multipart_member("1", "1.2"));
        assert!(multipart_member("1.2", "1.2.1"));
        assert!(!multipart_member("1", "10"));
        assert!(!multipart_member("1", "1"));
        assert!(!multipart_member("1.2", "1"));
    }

    #[derive(Debug, Clone)]
    enum Tree {
        Leaf,
        Multi(Vec<Tree>),
    }

    fn tree() -> impl Strategy<Value = Tree> {
        Just(Tree::Leaf).prop_recursive(3, 24, 4, |inner| {
            prop::collection::vec(inner, 1..4).prop_map(Tree::Multi)
        })
    }

    fn layout(children: &[Tree], prefix: &str, table: &mut HashMap<String, String>, leaves: &mut Vec<String>) {
        for (i, child) in children.iter().enumerate() {
            let path = if prefix.is_empty() {
                (i + 1).to_string()
            } else {
                format!("{prefix}.{}", i + 1)
            };
            match child {
                Tree::Leaf => {
                    table.insert(format!("{path}.MIME"), "Content-Type: text/plain\r\n".into());
                    leaves.push(path);
                }
                Tree::Multi(inner) => {
                    table.insert(
                        format!("{path}.MIME"),
                        "Content-Type: multipart/mixed; boundary=z\r\n".into(),
                    );
                    layout(inner, &path, table, leaves);
                }
            }
        }
    }

    proptest! {
        #[test]
        fn prop_discovers_every_leaf_in_order(root in prop::collection::vec(tree(), 1..4)) {
            let mut table = HashMap::new();
            let mut leaves = Vec::new();
            layout(&root, "", &mut table, &mut leaves);

            let mut walker = MimeWalker::new("mixed").with_limits(10_000, 64);
            while let Some(probe) = walker.next_probe() {
                let answer = table.get(&probe.section()).map(String::as_bytes);
                walker.on_response(answer, None);
            }
            let found: Vec<String> = walker.parts().iter().map(|p| p.path.clone()).collect();
            prop_assert_eq!(found, leaves);
            prop_assert!(walker.stack().is_empty());
        }
    }
}
