//! Blob marker, marker search, and framing configuration.
//!
//! The marker is part of the wire protocol: producers and consumers must
//! agree on it, and changing it breaks compatibility with existing streams.
//! It is always passed in through [`BlobConfig`], so streams speaking
//! different protocol versions can coexist in one process.

use std::fmt;

/// Length of a blob marker in bytes.
pub const MARKER_LEN: usize = 8;

/// Wire size of a blob header: marker (8) + id (4) + size (4) = 16 bytes.
pub const HEADER_SIZE: usize = MARKER_LEN + 4 + 4;

/// Default limit for blobs held in memory by the segment decoder: 16 MiB.
pub const DEFAULT_MAX_BLOB_SIZE: usize = 16 * 1024 * 1024;

/// Default size of a single read from the underlying source.
pub const DEFAULT_READ_CHUNK_SIZE: usize = 8 * 1024;

/// An 8-byte sequence announcing a blob header.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker([u8; MARKER_LEN]);

impl Marker {
    /// Marker of protocol version 1: ASCII `TA5BLOB1`.
    pub const DEFAULT: Marker = Marker(*b"TA5BLOB1");

    /// Create a marker from raw bytes.
    pub const fn new(bytes: [u8; MARKER_LEN]) -> Self {
        Self(bytes)
    }

    /// The marker bytes.
    pub const fn as_bytes(&self) -> &[u8; MARKER_LEN] {
        &self.0
    }

    /// Whether `window` is exactly this marker.
    pub fn matches(&self, window: &[u8]) -> bool {
        window == self.0.as_slice()
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Marker(\"{}\")", self.0.escape_ascii())
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.escape_ascii())
    }
}

/// Result of searching a byte range for a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerScan {
    /// A complete marker starts at this offset.
    Found(usize),
    /// No complete marker, but the bytes from this offset to the end are a
    /// strict prefix of the marker and may become one with more input.
    Partial(usize),
    /// Every byte of the range is text.
    Absent,
}

/// Search `haystack` for the first complete `marker`, falling back to the
/// earliest marker prefix that runs into the end of the range.
pub fn find_marker(haystack: &[u8], marker: &Marker) -> MarkerScan {
    let needle = marker.as_bytes();
    if let Some(pos) = haystack
        .windows(MARKER_LEN)
        .position(|window| window == needle)
    {
        return MarkerScan::Found(pos);
    }

    let tail_start = haystack.len().saturating_sub(MARKER_LEN - 1);
    (tail_start..haystack.len())
        .find(|&k| needle.starts_with(&haystack[k..]))
        .map_or(MarkerScan::Absent, MarkerScan::Partial)
}

/// Configuration shared by readers, writers and decoders.
#[derive(Debug, Clone)]
pub struct BlobConfig {
    /// Marker announcing each blob header.
    pub marker: Marker,
    /// Largest blob the buffered segment decoder will hold. Default: 16 MiB.
    ///
    /// Streaming readers and writers never buffer a blob and ignore this.
    pub max_blob_size: usize,
    /// Size of each read from the underlying source. Default: 8 KiB.
    pub read_chunk_size: usize,
}

impl BlobConfig {
    /// Default configuration with a different marker.
    pub fn with_marker(marker: Marker) -> Self {
        Self {
            marker,
            ..Self::default()
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            marker: Marker::DEFAULT,
            max_blob_size: DEFAULT_MAX_BLOB_SIZE,
            read_chunk_size: DEFAULT_READ_CHUNK_SIZE,
        }
    }
}
