use std::io::{self, ErrorKind, Read};

use bytes::{Buf, BytesMut};

use crate::body::{deliver, BlobBody, HandlerError};
use crate::codec::read_header_after_marker;
use crate::marker::{BlobConfig, MARKER_LEN};

/// Reads the text of a stream, handing every embedded blob to a handler.
///
/// Blobs never appear in the bytes returned by [`Read::read`]. Each one is
/// passed, in stream order, to the handler as a [`BlobBody`] limited to the
/// blob size; whatever the handler does not read is discarded.
///
/// Once the handler fails, the read that invoked it returns the failure as
/// an `io::Error` carrying [`FrameError::Handler`](crate::FrameError::Handler),
/// and every later read returns `Ok(0)`. Any other failure that interrupts a
/// blob is terminal in the same way. Errors from the source while scanning
/// text are returned untouched and the read may be retried.
pub struct BlobReader<R, H> {
    source: Lookahead<R>,
    handler: H,
    config: BlobConfig,
    pending: Option<io::Error>,
    failed: bool,
    blobs_seen: u64,
}

enum Step {
    Text(usize),
    Blob,
    End,
}

impl<R, H> BlobReader<R, H>
where
    R: Read,
    H: FnMut(u32, &mut BlobBody<'_>) -> Result<(), HandlerError>,
{
    /// Create a blob reader with default configuration.
    pub fn new(inner: R, handler: H) -> Self {
        Self::with_config(inner, handler, BlobConfig::default())
    }

    /// Create a blob reader with explicit configuration.
    pub fn with_config(inner: R, handler: H, config: BlobConfig) -> Self {
        Self {
            source: Lookahead {
                inner,
                buf: BytesMut::with_capacity(config.read_chunk_size.max(MARKER_LEN)),
            },
            handler,
            config,
            pending: None,
            failed: false,
            blobs_seen: 0,
        }
    }

    /// Borrow the underlying source.
    pub fn get_ref(&self) -> &R {
        &self.source.inner
    }

    /// Mutably borrow the underlying source.
    ///
    /// Reading from it directly skips past bytes this reader may already
    /// have buffered.
    pub fn get_mut(&mut self) -> &mut R {
        &mut self.source.inner
    }

    /// Consume the reader and return the underlying source.
    ///
    /// Bytes read ahead but not yet returned are lost.
    pub fn into_inner(self) -> R {
        self.source.inner
    }

    /// Current blob reader configuration.
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Number of blobs handed to the handler so far.
    pub fn blobs_seen(&self) -> u64 {
        self.blobs_seen
    }

    fn step(&mut self, out: &mut [u8]) -> io::Result<Step> {
        let chunk = self.config.read_chunk_size;
        let window = self.source.fill(MARKER_LEN, chunk)?;
        if window.is_empty() {
            return Ok(Step::End);
        }

        if window.len() >= MARKER_LEN && self.config.marker.matches(&window[..MARKER_LEN]) {
            self.source.consume(MARKER_LEN);
            return match self.deliver_blob() {
                Ok(()) => Ok(Step::Blob),
                Err(err) => {
                    self.failed = true;
                    Err(err.into())
                }
            };
        }

        // Fewer than MARKER_LEN bytes only happens at end of stream: all
        // text. Otherwise the first byte is text, and so is every following
        // byte that cannot start a marker.
        let text = if window.len() < MARKER_LEN {
            window.len()
        } else {
            let first = self.config.marker.as_bytes()[0];
            1 + window[1..]
                .iter()
                .position(|&b| b == first)
                .unwrap_or(window.len() - 1)
        };
        let n = text.min(out.len());
        out[..n].copy_from_slice(&window[..n]);
        self.source.consume(n);
        Ok(Step::Text(n))
    }

    fn deliver_blob(&mut self) -> crate::Result<()> {
        let header = read_header_after_marker(&mut self.source)?;
        deliver(&mut self.source, header, &mut self.handler)?;
        self.blobs_seen += 1;
        Ok(())
    }
}

impl<R, H> Read for BlobReader<R, H>
where
    R: Read,
    H: FnMut(u32, &mut BlobBody<'_>) -> Result<(), HandlerError>,
{
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }
        if self.failed || out.is_empty() {
            return Ok(0);
        }

        let mut n = 0;
        while n < out.len() {
            // Text already produced is returned rather than blocking on the
            // source for the look-ahead window.
            if n > 0 && self.source.buf.len() < MARKER_LEN {
                break;
            }
            match self.step(&mut out[n..]) {
                Ok(Step::Text(k)) => n += k,
                Ok(Step::Blob) => {}
                Ok(Step::End) => break,
                Err(err) if n == 0 => return Err(err),
                Err(err) => {
                    // Hand out the text first; the error follows on the next call.
                    self.pending = Some(err);
                    break;
                }
            }
        }
        Ok(n)
    }
}

/// Source wrapper that can look ahead a few bytes without consuming them.
struct Lookahead<R> {
    inner: R,
    buf: BytesMut,
}

impl<R: Read> Lookahead<R> {
    /// Buffer at least `want` bytes unless the source ends first, and
    /// return everything buffered.
    fn fill(&mut self, want: usize, chunk: usize) -> io::Result<&[u8]> {
        while self.buf.len() < want {
            let start = self.buf.len();
            self.buf.resize(start + chunk.max(want), 0);
            match self.inner.read(&mut self.buf[start..]) {
                Ok(0) => {
                    self.buf.truncate(start);
                    break;
                }
                Ok(n) => self.buf.truncate(start + n),
                Err(err) => {
                    self.buf.truncate(start);
                    if err.kind() == ErrorKind::Interrupted {
                        continue;
                    }
                    return Err(err);
                }
            }
        }
        Ok(&self.buf)
    }

    fn consume(&mut self, n: usize) {
        self.buf.advance(n);
    }
}

impl<R: Read> Read for Lookahead<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.buf.is_empty() {
            return self.inner.read(out);
        }
        let n = out.len().min(self.buf.len());
        out[..n].copy_from_slice(&self.buf[..n]);
        self.buf.advance(n);
        Ok(n)
    }
}
