//! Incremental delivery of decoded part content.

use crate::types::PartKind;

/// One decoded slice of a part body.
#[derive(Debug, Clone, Copy)]
pub struct PartChunk<'a> {
    /// UID of the message.
    pub uid: u32,
    /// Part path.
    pub path: &'a str,
    /// Part classification.
    pub kind: PartKind,
    /// File name, if the part has one.
    pub file_name: Option<&'a str>,
    /// Decoded bytes.
    pub data: &'a [u8],
    /// Offset of `data` in the decoded stream.
    pub offset: usize,
    /// Encoded size announced by the server.
    pub encoded_len: usize,
    /// First chunk of the part.
    pub first: bool,
    /// Last chunk of the part; `data` may be empty.
    pub last: bool,
}

/// Receives part content as it is decoded.
///
/// Any `FnMut(&PartChunk)` closure is a sink.
pub trait PartSink: Send {
    /// Called once per decoded chunk, in order.
    fn on_chunk(&mut self, chunk: &PartChunk<'_>);
}

impl<F> PartSink for F
where
    F: FnMut(&PartChunk<'_>) + Send,
{
    fn on_chunk(&mut self, chunk: &PartChunk<'_>) {
        self(chunk);
    }
}
