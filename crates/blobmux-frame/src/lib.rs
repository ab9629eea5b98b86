//! Marker-delimited blob framing inside text streams.
//!
//! A text stream may carry binary blobs. Every blob is framed with:
//! - An 8-byte marker (`"TA5BLOB1"` by default) that is unlikely in text
//! - A 4-byte little-endian blob id
//! - A 4-byte little-endian blob size, followed by `size` body bytes
//!
//! [`BlobReader`] strips blobs out of a stream and hands each one to a
//! handler; [`BlobWriter`] splits a stream into a text sink and a binary
//! sink. Both accept input in arbitrary chunks.

pub mod body;
pub mod codec;
pub mod error;
pub mod marker;
pub mod reader;
pub mod segment;
pub mod writer;

pub use body::{deliver, BlobBody, HandlerError};
pub use codec::{
    decode_header, encode_header, read_header, read_header_after_marker, write_header, BlobHeader,
};
pub use error::{FrameError, Result};
pub use marker::{
    find_marker, BlobConfig, Marker, MarkerScan, DEFAULT_MAX_BLOB_SIZE, HEADER_SIZE, MARKER_LEN,
};
pub use reader::BlobReader;
#[cfg(feature = "async")]
pub use segment::BlobCodec;
pub use segment::{decode_segment, encode_segment, Segment};
pub use writer::BlobWriter;
