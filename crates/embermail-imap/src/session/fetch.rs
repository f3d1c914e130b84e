//! Message fetch: header, MIME discovery, part content.

use embermail_codec::{ContentDecoder, ContentType, Headers, charset};
use embermail_core::{OpenMode, ProgressTracker, StatusEvent, Storage, Transport};
use tracing::{debug, info, warn};

use super::{ImapSession, Reply};
use crate::command::{self, CommandKind};
use crate::error::{Error, Result};
use crate::mime::{MimeWalker, classify_parts};
use crate::options::FetchOptions;
use crate::part_sink::PartChunk;
use crate::response::Completion;
use crate::store::{self, HTML_FILE, HeaderRecord, MessageDir, TEXT_FILE};
use crate::types::{Envelope, MessageHeader, MessageId, PartInfo, PartKind};

/// Bytes requested from the transport per read while streaming a part.
const CHUNK: usize = 1024;

/// State of one part whose literal is being streamed.
pub(crate) struct BodyStream<'a> {
    section: String,
    uid: u32,
    part: &'a mut PartInfo,
    decoder: ContentDecoder,
    /// Literals longer than this are drained without decoding.
    max_size: usize,
    keep_text: bool,
    text_cap: usize,
    text: Vec<u8>,
    truncated: bool,
    save_path: Option<String>,
    opened: bool,
    saved: bool,
    storage_error: Option<String>,
    offset: usize,
    started: bool,
    done: bool,
    progress: ProgressTracker,
}

impl<'a> BodyStream<'a> {
    fn new(section: String, uid: u32, part: &'a mut PartInfo) -> Self {
        let decoder = ContentDecoder::new(part.encoding);
        Self {
            section,
            uid,
            part,
            decoder,
            max_size: usize::MAX,
            keep_text: false,
            text_cap: 0,
            text: Vec::new(),
            truncated: false,
            save_path: None,
            opened: false,
            saved: false,
            storage_error: None,
            offset: 0,
            started: false,
            done: false,
            progress: ProgressTracker::new(),
        }
    }

    pub(crate) fn section(&self) -> &str {
        &self.section
    }
}

/// Where a part's content goes, decided before it is fetched.
struct PartPlan {
    max_size: usize,
    keep_text: bool,
    save_path: Option<String>,
}

impl<T: Transport> ImapSession<T> {
    /// Fetches one message: header, structure and selected part content.
    ///
    /// Multipart structure is discovered by probing `BODY[<path>.MIME]`
    /// depth first. Text parts are decoded into the result; parts selected
    /// for download are written under `<dir>/<uid>/`. Attachments larger
    /// than the attachment limit are skipped, and their declared size is
    /// still counted in [`FetchStats::downloaded_bytes`](crate::FetchStats).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMailboxSelected`], [`Error::MessageNotFound`],
    /// a storage error when downloads are requested but storage is not
    /// ready, or connection errors.
    pub async fn fetch(&mut self, id: MessageId, options: &FetchOptions) -> Result<MessageHeader> {
        self.stats = crate::types::FetchStats::default();
        let result = self.fetch_inner(id, options).await;
        self.finish("fetch", result)
    }

    /// Fetches several messages in order.
    ///
    /// Stops early, keeping what was fetched, when the memory guard
    /// reports low memory.
    ///
    /// # Errors
    ///
    /// Same as [`ImapSession::fetch`]; a failure aborts the batch.
    pub async fn fetch_messages(
        &mut self,
        ids: &[MessageId],
        options: &FetchOptions,
    ) -> Result<Vec<MessageHeader>> {
        self.stats = crate::types::FetchStats::default();
        let result: Result<_> = async {
            let mut messages = Vec::with_capacity(ids.len());
            let mut progress = ProgressTracker::new();
            for (done, &id) in ids.iter().enumerate() {
                if let Err(e) = self.memory.check() {
                    warn!(fetched = messages.len(), error = %e, "low memory, stopping batch");
                    break;
                }
                messages.push(self.fetch_inner(id, options).await?);
                if let Some(percent) = progress.update(done as u64 + 1, ids.len() as u64) {
                    self.sink
                        .on_status(&StatusEvent::progress("fetching messages", percent));
                }
            }
            Ok(messages)
        }
        .await;
        self.finish("fetch", result)
    }

    async fn fetch_inner(&mut self, id: MessageId, options: &FetchOptions) -> Result<MessageHeader> {
        self.ensure_ready().await?;
        if self.selected.is_none() {
            return Err(Error::NoMailboxSelected);
        }
        let download = options.download.any();
        if download && !self.storage.as_deref().is_some_and(|s| s.is_ready()) {
            return Err(embermail_core::Error::StorageNotReady.into());
        }

        let mut message = self.fetch_envelope(id, options).await?;
        let long_names = self
            .storage
            .as_deref()
            .is_none_or(|s| s.supports_long_filenames());
        let mut dir = MessageDir::new(&options.storage.dir, message.uid, long_names);
        if download && let Some(storage) = self.storage.as_deref_mut() {
            storage.create_dir_all(dir.dir()).await?;
        }

        if !options.header_only {
            if message.multipart {
                self.discover(id, &mut message, options).await?;
            }
            self.fetch_contents(id, &mut message, options, &mut dir).await?;
        }

        if download {
            self.persist(&mut message, options, &dir).await?;
        }
        info!(
            uid = message.uid,
            parts = message.parts.len(),
            bytes = self.stats.downloaded_bytes,
            "fetched message"
        );
        Ok(message)
    }

    /// Fetches flags, size, UID and the header fields.
    async fn fetch_envelope(&mut self, id: MessageId, options: &FetchOptions) -> Result<MessageHeader> {
        let cmd = command::fetch_header(id, options.body_item());
        let reply = self.run(CommandKind::FetchHeader, &cmd).await?;
        let fetch = reply
            .fetches()
            .find(|f| f.is_for(id))
            .ok_or(Error::MessageNotFound(id.value()))?;
        let raw = fetch
            .body(|s| s.to_ascii_uppercase().starts_with("HEADER"))
            .flatten()
            .unwrap_or_default();
        self.stats.downloaded_bytes += raw.len() as u64;

        let headers = Headers::parse_bytes(raw);
        let content_type = headers
            .get("Content-Type")
            .map(ContentType::parse)
            .unwrap_or_default();
        let uid = fetch
            .uid()
            .unwrap_or(if id.is_uid() { id.value() } else { 0 });
        let mut message = MessageHeader {
            number: fetch.number,
            uid,
            flags: fetch.flags().unwrap_or_default(),
            size: fetch.size().unwrap_or(0),
            envelope: Envelope::from_headers(&headers, self.decoder()),
            multipart: content_type.is_multipart(),
            multipart_subtype: content_type
                .is_multipart()
                .then(|| content_type.sub_type.clone()),
            boundary: content_type.boundary().map(str::to_string),
            content_type,
            ..MessageHeader::default()
        };
        if !message.multipart {
            let mut body = PartInfo::from_headers("1", &headers, self.decoder());
            body.fetch_section = "TEXT".to_string();
            message.parts.push(body);
            classify_parts(&mut message.parts);
        }
        debug!(uid, subject = %message.envelope.subject, multipart = message.multipart, "header fetched");
        Ok(message)
    }

    /// Walks the multipart tree with `.MIME` and `.HEADER` probes.
    async fn discover(
        &mut self,
        id: MessageId,
        message: &mut MessageHeader,
        options: &FetchOptions,
    ) -> Result<()> {
        let subtype = message.multipart_subtype.as_deref().unwrap_or("mixed");
        let mut walker = MimeWalker::new(subtype)
            .with_limits(options.limits.max_parts, options.limits.max_depth);

        while let Some(probe) = walker.next_probe() {
            let section = probe.section();
            let cmd = command::fetch_section(id, options.body_item(), &section);
            let reply = self.send(CommandKind::FetchMime, &cmd).await?;
            let header = probe_result(&reply, id, &section)?;
            if let Some(bytes) = &header {
                self.stats.downloaded_bytes += bytes.len() as u64;
            }
            walker.on_response(header.as_deref(), self.decoder());
            tokio::task::yield_now().await;
        }
        if walker.is_truncated() {
            warn!(uid = message.uid, "MIME discovery truncated");
        }
        debug!(uid = message.uid, probes = walker.probes(), "MIME discovery done");
        message.parts = walker.into_parts();
        Ok(())
    }

    async fn fetch_contents(
        &mut self,
        id: MessageId,
        message: &mut MessageHeader,
        options: &FetchOptions,
        dir: &mut MessageDir,
    ) -> Result<()> {
        let mut parts = std::mem::take(&mut message.parts);
        let mut text_claimed = false;
        let mut html_claimed = false;
        let mut outcome = Ok(());

        for part in &mut parts {
            if !wanted(part, options) {
                continue;
            }
            let limit = options.limits.attachment_size;
            if !part.is_body_text()
                && let Some(declared) = part.declared_size
                && declared > limit
            {
                info!(path = %part.path, declared, limit, "attachment over size limit, skipping");
                part.skipped = true;
                self.stats.downloaded_bytes += declared as u64;
                self.stats.skipped_parts += 1;
                continue;
            }
            let plan = plan(part, options, dir, &mut text_claimed, &mut html_claimed);
            outcome = self.fetch_part(id, message.uid, part, options, plan).await;
            if outcome.is_err() {
                break;
            }
        }
        message.parts = parts;
        outcome
    }

    async fn fetch_part(
        &mut self,
        id: MessageId,
        uid: u32,
        part: &mut PartInfo,
        options: &FetchOptions,
        plan: PartPlan,
    ) -> Result<()> {
        let kind = if part.is_body_text() {
            CommandKind::FetchText
        } else {
            CommandKind::FetchAttachment
        };
        let section = part.fetch_section.clone();
        let cmd = command::fetch_section(id, options.body_item(), &section);

        let mut body = BodyStream::new(section.clone(), uid, part);
        body.max_size = plan.max_size;
        body.keep_text = plan.keep_text;
        body.text_cap = options.limits.msg_size;
        body.save_path = plan.save_path;

        self.write_command(kind, &cmd).await?;
        let reply = self.read_reply(kind, Some(&mut body)).await?;
        if !body.done {
            let inline = reply
                .fetches()
                .find_map(|f| f.body(|s| s.eq_ignore_ascii_case(&section)).flatten())
                .map(<[u8]>::to_vec)
                .unwrap_or_default();
            self.consume_inline(&mut body, &inline).await;
        }

        let BodyStream {
            text,
            truncated,
            saved,
            save_path,
            storage_error,
            ..
        } = body;
        if plan.keep_text {
            part.text = charset::decode_with(&part.charset, &text, self.decoder());
            part.truncated = truncated;
        }
        if saved {
            part.saved_path = save_path;
            self.stats.saved_files += 1;
        }
        reply.check()?;
        if let Some(e) = storage_error {
            return Err(embermail_core::Error::Storage(e).into());
        }
        Ok(())
    }

    /// Streams a part literal of `n` octets into `body`.
    pub(super) async fn stream_body(&mut self, body: &mut BodyStream<'_>, n: usize) -> Result<()> {
        body.part.octet_len = n;
        body.part.octet_count = 0;
        body.done = true;
        if n > body.max_size {
            info!(path = %body.part.path, len = n, limit = body.max_size, "part over size limit, draining");
            self.stream.discard(n).await?;
            body.part.record_octets(n);
            body.part.skipped = true;
            self.stats.downloaded_bytes += n as u64;
            self.stats.skipped_parts += 1;
            return Ok(());
        }

        let mut left = n;
        while left > 0 {
            let chunk = self.stream.read_chunk(left.min(CHUNK)).await?;
            left -= chunk.len();
            body.part.record_octets(chunk.len());
            self.stats.downloaded_bytes += chunk.len() as u64;
            let decoded = body.decoder.update(&chunk);
            self.deliver(body, &decoded, false).await;
            if n > CHUNK
                && let Some(percent) = body.progress.update((n - left) as u64, n as u64)
            {
                self.sink.on_status(&StatusEvent::progress(
                    format!("part {}", body.part.path),
                    percent,
                ));
            }
            tokio::task::yield_now().await;
        }
        let tail = body.decoder.finish();
        self.deliver(body, &tail, true).await;
        Ok(())
    }

    /// Handles content the server sent as a quoted string or `NIL`.
    async fn consume_inline(&mut self, body: &mut BodyStream<'_>, raw: &[u8]) {
        body.part.octet_len = raw.len();
        body.part.record_octets(raw.len());
        self.stats.downloaded_bytes += raw.len() as u64;
        let decoded = body.decoder.update(raw);
        self.deliver(body, &decoded, false).await;
        let tail = body.decoder.finish();
        self.deliver(body, &tail, true).await;
        body.done = true;
    }

    /// Hands decoded bytes to the text buffer, the part sink and storage.
    async fn deliver(&mut self, body: &mut BodyStream<'_>, data: &[u8], last: bool) {
        if body.keep_text {
            let room = body.text_cap.saturating_sub(body.text.len());
            if data.len() > room {
                body.truncated = true;
            }
            body.text.extend_from_slice(&data[..data.len().min(room)]);
        }

        if data.is_empty() && !last {
            return;
        }
        if let Some(sink) = self.part_sink.as_deref_mut() {
            sink.on_chunk(&PartChunk {
                uid: body.uid,
                path: &body.part.path,
                kind: body.part.kind,
                file_name: body.part.file_name(),
                data,
                offset: body.offset,
                encoded_len: body.part.octet_len,
                first: !body.started,
                last,
            });
        }
        body.started = true;
        body.offset += data.len();

        if body.storage_error.is_some() {
            return;
        }
        let (Some(path), Some(storage)) = (body.save_path.as_deref(), self.storage.as_deref_mut())
        else {
            return;
        };
        if let Err(e) = write_part(storage, path, &mut body.opened, data, last).await {
            warn!(path, error = %e, "saving part failed, draining the rest");
            body.storage_error = Some(e.to_string());
            if let Err(close) = storage.close().await {
                debug!(path, error = %close, "closing the partial file failed");
            }
            return;
        }
        body.saved = last;
    }

    /// Writes the header record and the short-name manifest.
    async fn persist(
        &mut self,
        message: &mut MessageHeader,
        options: &FetchOptions,
        dir: &MessageDir,
    ) -> Result<()> {
        let Some(storage) = self.storage.as_deref_mut() else {
            return Err(embermail_core::Error::StorageNotReady.into());
        };
        if options.download.header {
            let record = HeaderRecord::from_message(message);
            let path =
                store::save_header(&mut *storage, dir, &record, options.storage.header_format).await?;
            debug!(path, "header saved");
            self.stats.saved_files += 1;
        }
        if let Some(manifest) = dir.manifest() {
            embermail_core::write_file(storage, &dir.path(store::MANIFEST), manifest.as_bytes())
                .await?;
        }
        message.saved_dir = Some(dir.dir().to_string());
        Ok(())
    }
}

/// Content of a `.MIME`/`.HEADER` probe; `None` when the part does not
/// exist.
fn probe_result(reply: &Reply, id: MessageId, section: &str) -> Result<Option<Vec<u8>>> {
    if reply.continuation.is_some() {
        return Err(Error::Protocol("unexpected continuation during probe".into()));
    }
    let Some(tagged) = &reply.tagged else {
        return Err(Error::Protocol("missing tagged completion".into()));
    };
    match tagged.completion {
        Completion::Ok => Ok(reply
            .fetches()
            .filter(|f| f.is_for(id))
            .chain(reply.fetches())
            .find_map(|f| f.body(|s| s.eq_ignore_ascii_case(section)))
            .flatten()
            .map(<[u8]>::to_vec)),
        Completion::No => Ok(None),
        Completion::Bad => {
            // Some servers answer BAD for a section past the last part.
            warn!(section, text = %tagged.text, "probe rejected, treating part as absent");
            Ok(None)
        }
    }
}

/// Returns true if the part's content should be fetched at all.
fn wanted(part: &PartInfo, options: &FetchOptions) -> bool {
    if part.content_type.is_multipart() {
        return false;
    }
    if part.rfc822_parent.is_some() && !options.enable.rfc822 {
        return false;
    }
    let enable = &options.enable;
    match part.kind {
        PartKind::PlainText => enable.text,
        PartKind::Html => enable.html,
        PartKind::Attachment => enable.attachment,
        PartKind::InlineMedia => enable.inline,
        PartKind::Rfc822 | PartKind::Other => false,
    }
}

fn plan(
    part: &PartInfo,
    options: &FetchOptions,
    dir: &mut MessageDir,
    text_claimed: &mut bool,
    html_claimed: &mut bool,
) -> PartPlan {
    let download = &options.download;
    let nested = part.rfc822_parent.is_some();
    let default_name = |ext: &str| format!("part{}.{ext}", part.path.replace('.', "_"));
    match part.kind {
        PartKind::PlainText | PartKind::Html => {
            let html = part.kind == PartKind::Html;
            let save_path = if nested {
                download
                    .rfc822
                    .then(|| dir.attachment_path(&default_name(if html { "html" } else { "txt" })))
            } else if html && download.html && !*html_claimed {
                *html_claimed = true;
                Some(dir.path(HTML_FILE))
            } else if !html && download.text && !*text_claimed {
                *text_claimed = true;
                Some(dir.path(TEXT_FILE))
            } else {
                None
            };
            PartPlan {
                max_size: usize::MAX,
                keep_text: true,
                save_path,
            }
        }
        _ => {
            let selected = if nested {
                download.rfc822
            } else if part.kind == PartKind::InlineMedia {
                download.inline
            } else {
                download.attachment
            };
            let save_path = selected.then(|| {
                let name = part
                    .file_name()
                    .map_or_else(|| default_name("bin"), str::to_string);
                dir.attachment_path(&name)
            });
            PartPlan {
                max_size: options.limits.attachment_size,
                keep_text: false,
                save_path,
            }
        }
    }
}

async fn write_part(
    storage: &mut dyn Storage,
    path: &str,
    opened: &mut bool,
    data: &[u8],
    last: bool,
) -> embermail_core::Result<()> {
    if !*opened {
        storage.open(path, OpenMode::Write).await?;
        *opened = true;
    }
    if !data.is_empty() {
        storage.write(data).await?;
    }
    if last {
        storage.close().await?;
    }
    Ok(())
}
