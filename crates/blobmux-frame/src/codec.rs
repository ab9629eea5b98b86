use std::io::{ErrorKind, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

use crate::error::{FrameError, Result};
use crate::marker::{Marker, HEADER_SIZE, MARKER_LEN};

/// Identity and length of one blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobHeader {
    /// Caller-chosen blob id.
    pub id: u32,
    /// Number of body bytes following the header.
    pub size: u32,
}

impl BlobHeader {
    /// Create a header.
    pub fn new(id: u32, size: u32) -> Self {
        Self { id, size }
    }

    /// The total wire size of the blob (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.size as usize
    }
}

/// Encode a blob header into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬───────────┬───────────┬──────────────────┐
/// │ Marker (8B)  │ Id        │ Size      │ Body             │
/// │ "TA5BLOB1"   │ (4B LE)   │ (4B LE)   │ (Size bytes)     │
/// └──────────────┴───────────┴───────────┴──────────────────┘
/// ```
/// Only the header is written; the body bytes follow it verbatim.
pub fn encode_header(marker: &Marker, header: BlobHeader, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_slice(marker.as_bytes());
    dst.put_u32_le(header.id);
    dst.put_u32_le(header.size);
}

/// Decode a complete header.
///
/// Fails with [`FrameError::MalformedHeader`] if the first eight bytes are
/// not `marker`.
pub fn decode_header(marker: &Marker, src: &[u8; HEADER_SIZE]) -> Result<BlobHeader> {
    if !marker.matches(&src[..MARKER_LEN]) {
        return Err(FrameError::MalformedHeader);
    }
    Ok(decode_id_and_size(&src[MARKER_LEN..]))
}

fn decode_id_and_size(mut src: &[u8]) -> BlobHeader {
    let id = src.get_u32_le();
    let size = src.get_u32_le();
    BlobHeader { id, size }
}

/// Write marker, id and size to `sink`.
///
/// The header goes out in one `write_all`; short writes are handled by the
/// sink, and any failure is returned as is.
pub fn write_header<W: Write + ?Sized>(
    sink: &mut W,
    marker: &Marker,
    header: BlobHeader,
) -> Result<()> {
    let mut buf = [0u8; HEADER_SIZE];
    buf[..MARKER_LEN].copy_from_slice(marker.as_bytes());
    buf[MARKER_LEN..MARKER_LEN + 4].copy_from_slice(&header.id.to_le_bytes());
    buf[MARKER_LEN + 4..].copy_from_slice(&header.size.to_le_bytes());
    sink.write_all(&buf).map_err(FrameError::from_sink)
}

/// Read a full header (marker, id, size) from `source`.
///
/// Consumes exactly [`HEADER_SIZE`] bytes on success. A source that is
/// already at end of stream yields [`FrameError::EndOfStream`]; one that
/// ends part way through the header yields [`FrameError::UnexpectedEof`].
pub fn read_header<R: Read + ?Sized>(source: &mut R, marker: &Marker) -> Result<BlobHeader> {
    let mut buf = [0u8; HEADER_SIZE];
    let filled = read_full(source, &mut buf).map_err(FrameError::from_source)?;

    if filled == 0 {
        return Err(FrameError::EndOfStream);
    }
    if filled >= MARKER_LEN && !marker.matches(&buf[..MARKER_LEN]) {
        return Err(FrameError::MalformedHeader);
    }
    if filled < HEADER_SIZE {
        return Err(FrameError::UnexpectedEof { section: "header" });
    }
    decode_header(marker, &buf)
}

/// Read id and size for a marker the caller has already consumed.
pub fn read_header_after_marker<R: Read + ?Sized>(source: &mut R) -> Result<BlobHeader> {
    let mut buf = [0u8; HEADER_SIZE - MARKER_LEN];
    let filled = read_full(source, &mut buf).map_err(FrameError::from_source)?;
    if filled < buf.len() {
        return Err(FrameError::UnexpectedEof { section: "header" });
    }
    Ok(decode_id_and_size(&buf))
}

/// Read until `buf` is full or the source reports end of stream.
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
