//! # embermail-codec
//!
//! Content codecs shared by the IMAP and SMTP engines.
//!
//! ## Features
//!
//! - **Base64**: 76-column line-wrapped encoding and a decoder that accepts
//!   input split at arbitrary byte positions
//! - **Quoted-Printable**: soft-break aware encoding and streaming decoding
//! - **7bit/8bit**: sanitizing passes per RFC 2045 §2.7/2.8
//! - **Charsets**: ISO-8859-1 and TIS-620 to UTF-8, RFC 5987 percent-decoding
//! - **Headers**: RFC 2047 encoded words, folded header blocks, `Content-Type`
//!   and `Content-Disposition` parameters (including RFC 2231 continuations)
//!
//! Every decoder is best-effort: malformed input produces output rather than
//! an error, and unrecognized escapes pass through literally.
//!
//! ## Quick Start
//!
//! ```
//! use embermail_codec::{ContentDecoder, TransferEncoding};
//!
//! let mut decoder = ContentDecoder::new(TransferEncoding::Base64);
//! let mut out = decoder.update(b"SGVsbG8s");
//! out.extend(decoder.update(b"IFdvcmxk\r\nIQ=="));
//! out.extend(decoder.finish());
//! assert_eq!(out, b"Hello, World!");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod content_type;
mod header;
mod transfer;

pub mod base64;
pub mod charset;
pub mod quoted_printable;
pub mod rfc2047;
pub mod sanitize;

pub use charset::{Charset, CharsetDecoder};
pub use content_type::{
    ContentDisposition, ContentType, DispositionKind, decode_extended_value, parse_parameters,
    percent_decode,
};
pub use header::Headers;
pub use transfer::{ContentDecoder, TransferEncoding};
