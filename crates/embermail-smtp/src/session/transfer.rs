//! Body transfer: `DATA` with dot-stuffing, or `BDAT` chunks (RFC 3030).

use embermail_core::{FramedStream, ProgressTracker, StatusEvent, StatusSink, Transport};
use tracing::{debug, trace, warn};

use super::read_reply;
use crate::command::Command;
use crate::compose::BodyWriter;
use crate::error::Result;
use crate::types::Reply;

/// `DATA` output is flushed once this much is buffered.
const DATA_FLUSH: usize = 1024;

/// Pipelined `BDAT` replies read back once this many are outstanding.
const MAX_PENDING: usize = 16;

/// Upload progress reported through the status sink.
pub(crate) struct Progress<'s> {
    sink: &'s mut (dyn StatusSink + 'static),
    tracker: ProgressTracker,
    total: Option<u64>,
    done: u64,
}

impl<'s> Progress<'s> {
    pub fn new(sink: &'s mut (dyn StatusSink + 'static), total: Option<u64>) -> Self {
        Self {
            sink,
            tracker: ProgressTracker::new(),
            total,
            done: 0,
        }
    }

    fn advance(&mut self, n: usize) {
        self.done += n as u64;
        if let Some(total) = self.total
            && let Some(percent) = self.tracker.update(self.done, total)
        {
            self.sink
                .on_status(&StatusEvent::progress("uploading", percent));
        }
    }

    pub const fn done(&self) -> u64 {
        self.done
    }
}

/// Writes the body after `DATA`/354, escaping lines that start with a dot.
pub(crate) struct DataWriter<'s, T> {
    stream: &'s mut FramedStream<T>,
    buf: Vec<u8>,
    line_start: bool,
    last: [u8; 2],
    progress: Progress<'s>,
}

impl<'s, T: Transport> DataWriter<'s, T> {
    pub fn new(stream: &'s mut FramedStream<T>, progress: Progress<'s>) -> Self {
        Self {
            stream,
            buf: Vec::with_capacity(DATA_FLUSH + 64),
            line_start: true,
            last: *b"\r\n",
            progress,
        }
    }

    async fn flush(&mut self) -> Result<()> {
        if !self.buf.is_empty() {
            self.stream.write_all(&self.buf).await?;
            self.buf.clear();
        }
        Ok(())
    }

    /// Sends the terminating `.` line and reads the final reply.
    ///
    /// Returns the message bytes written, before dot-stuffing.
    pub async fn finish(mut self) -> Result<(u64, Reply)> {
        if &self.last != b"\r\n" {
            self.buf.extend_from_slice(b"\r\n");
        }
        self.buf.extend_from_slice(b".\r\n");
        self.flush().await?;
        let reply = read_reply(&mut *self.stream).await?.success()?;
        Ok((self.progress.done(), reply))
    }
}

impl<T: Transport> BodyWriter for DataWriter<'_, T> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        for &byte in data {
            if self.line_start && byte == b'.' {
                self.buf.push(b'.');
            }
            self.buf.push(byte);
            self.line_start = byte == b'\n';
            self.last = [self.last[1], byte];
            if self.buf.len() >= DATA_FLUSH {
                self.flush().await?;
            }
        }
        self.progress.advance(data.len());
        Ok(())
    }
}

/// Frames the body as `BDAT <n>` chunks of at most `chunk_size` octets.
///
/// Frame size does not follow write boundaries: small writes are gathered
/// until `chunk_size` octets are buffered, and a large write is split across
/// several frames.
///
/// Without pipelining every chunk waits for its reply. With pipelining
/// the replies are counted and read back in order later; the first
/// failure among them is returned.
pub(crate) struct BdatWriter<'s, T> {
    stream: &'s mut FramedStream<T>,
    buf: Vec<u8>,
    chunk_size: usize,
    pipelining: bool,
    pending: usize,
    chunks: usize,
    progress: Progress<'s>,
}

impl<'s, T: Transport> BdatWriter<'s, T> {
    pub fn new(
        stream: &'s mut FramedStream<T>,
        chunk_size: usize,
        pipelining: bool,
        progress: Progress<'s>,
    ) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            stream,
            buf: Vec::with_capacity(chunk_size),
            chunk_size,
            pipelining,
            pending: 0,
            chunks: 0,
            progress,
        }
    }

    async fn send_chunk(&mut self, len: usize, last: bool) -> Result<()> {
        let header = Command::Bdat { size: len, last }.serialize();
        trace!(len, last, "> BDAT");
        self.stream.write_all(&header).await?;
        if len > 0 {
            self.stream.write_all(&self.buf[..len]).await?;
            self.buf.drain(..len);
        }
        self.chunks += 1;
        if self.pipelining && !last {
            self.pending += 1;
            if self.pending >= MAX_PENDING {
                self.drain().await?;
            }
            Ok(())
        } else {
            read_reply(&mut *self.stream).await?.success().map(drop)
        }
    }

    /// Reads every outstanding pipelined reply.
    async fn drain(&mut self) -> Result<()> {
        let mut first_error = None;
        while self.pending > 0 {
            self.pending -= 1;
            match read_reply(&mut *self.stream).await {
                Ok(reply) if reply.is_success() => {}
                Ok(reply) => {
                    warn!(code = %reply.code, "BDAT chunk rejected");
                    first_error.get_or_insert(reply.into_error());
                }
                Err(e) => {
                    self.pending = 0;
                    return Err(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Sends what is left, then `BDAT 0 LAST`, and collects the replies.
    ///
    /// Returns the message bytes written, the number of frames and the
    /// final reply.
    pub async fn finish(mut self) -> Result<(u64, usize, Reply)> {
        if !self.buf.is_empty() {
            self.send_chunk(self.buf.len(), false).await?;
        }
        let header = Command::Bdat { size: 0, last: true }.serialize();
        self.stream.write_all(&header).await?;
        self.chunks += 1;
        let pending = self.drain().await;
        let last = read_reply(&mut *self.stream).await?.success();
        pending?;
        let reply = last?;
        debug!(chunks = self.chunks, "BDAT transfer complete");
        Ok((self.progress.done(), self.chunks, reply))
    }
}

impl<T: Transport> BodyWriter for BdatWriter<'_, T> {
    async fn write(&mut self, mut data: &[u8]) -> Result<()> {
        self.progress.advance(data.len());
        while !data.is_empty() {
            let room = self.chunk_size - self.buf.len();
            let take = room.min(data.len());
            self.buf.extend_from_slice(&data[..take]);
            data = &data[take..];
            if self.buf.len() == self.chunk_size {
                self.send_chunk(self.chunk_size, false).await?;
            }
        }
        Ok(())
    }
}
