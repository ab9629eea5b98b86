//! Buffered decoding of a combined stream into whole segments.
//!
//! Unlike [`BlobReader`](crate::BlobReader), which streams blob bodies
//! through a handler, this decoder accumulates input and yields complete
//! text runs and complete blobs. Blobs are held in memory, so their size is
//! capped by [`BlobConfig::max_blob_size`].

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_header, encode_header, BlobHeader};
use crate::error::{FrameError, Result};
use crate::marker::{find_marker, BlobConfig, Marker, MarkerScan, HEADER_SIZE};

/// One decoded piece of a combined stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// A run of text. Consecutive runs may be split arbitrarily.
    Text(Bytes),
    /// A complete blob.
    Blob { id: u32, body: Bytes },
}

/// Decode the next segment from `src`.
///
/// Returns `Ok(None)` if more data is needed. When `eof` is set the input
/// is final: a trailing marker prefix is returned as text and a truncated
/// blob is an error. On success, the segment's bytes are consumed from
/// `src`.
pub fn decode_segment(src: &mut BytesMut, config: &BlobConfig, eof: bool) -> Result<Option<Segment>> {
    if src.is_empty() {
        return Ok(None);
    }

    match find_marker(src, &config.marker) {
        MarkerScan::Found(0) => decode_blob(src, config, eof),
        MarkerScan::Found(start) => Ok(Some(Segment::Text(src.split_to(start).freeze()))),
        MarkerScan::Partial(0) if !eof => Ok(None),
        MarkerScan::Partial(start) if !eof => {
            Ok(Some(Segment::Text(src.split_to(start).freeze())))
        }
        _ => Ok(Some(Segment::Text(src.split().freeze()))),
    }
}

fn decode_blob(src: &mut BytesMut, config: &BlobConfig, eof: bool) -> Result<Option<Segment>> {
    if src.len() < HEADER_SIZE {
        return incomplete(eof, "header");
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let header = decode_header(&config.marker, &raw)?;

    let size = header.size as usize;
    if size > config.max_blob_size {
        return Err(FrameError::BlobTooLarge {
            size,
            max: config.max_blob_size,
        });
    }

    let total = header.wire_size();
    if src.len() < total {
        src.reserve(total - src.len());
        return incomplete(eof, "body");
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(size).freeze();
    Ok(Some(Segment::Blob {
        id: header.id,
        body,
    }))
}

fn incomplete(eof: bool, section: &'static str) -> Result<Option<Segment>> {
    if eof {
        Err(FrameError::UnexpectedEof { section })
    } else {
        Ok(None)
    }
}

/// Encode a segment into the wire format.
///
/// Text is copied verbatim; it is not checked for marker bytes.
pub fn encode_segment(segment: &Segment, marker: &Marker, dst: &mut BytesMut) -> Result<()> {
    match segment {
        Segment::Text(text) => dst.put_slice(text),
        Segment::Blob { id, body } => {
            let size = u32::try_from(body.len()).map_err(|_| FrameError::BlobTooLarge {
                size: body.len(),
                max: u32::MAX as usize,
            })?;
            encode_header(marker, BlobHeader::new(*id, size), dst);
            dst.put_slice(body);
        }
    }
    Ok(())
}

#[cfg(feature = "async")]
pub use self::codec_impl::BlobCodec;

#[cfg(feature = "async")]
mod codec_impl {
    use bytes::BytesMut;
    use tokio_util::codec::{Decoder, Encoder};

    use super::{decode_segment, encode_segment, Segment};
    use crate::error::FrameError;
    use crate::marker::BlobConfig;

    /// `tokio_util` codec over [`Segment`]s.
    #[derive(Debug, Clone, Default)]
    pub struct BlobCodec {
        config: BlobConfig,
    }

    impl BlobCodec {
        /// Create a codec with default configuration.
        pub fn new() -> Self {
            Self::default()
        }

        /// Create a codec with explicit configuration.
        pub fn with_config(config: BlobConfig) -> Self {
            Self { config }
        }

        /// Current codec configuration.
        pub fn config(&self) -> &BlobConfig {
            &self.config
        }
    }

    impl Decoder for BlobCodec {
        type Item = Segment;
        type Error = FrameError;

        fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            decode_segment(src, &self.config, false)
        }

        fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
            decode_segment(src, &self.config, true)
        }
    }

    impl Encoder<Segment> for BlobCodec {
        type Error = FrameError;

        fn encode(&mut self, item: Segment, dst: &mut BytesMut) -> Result<(), Self::Error> {
            encode_segment(&item, &self.config.marker, dst)
        }
    }
}
