//! Bounded view over a blob body.

use std::io::{self, ErrorKind, Read};

use tracing::debug;

use crate::codec::BlobHeader;
use crate::error::{FrameError, Result};

/// Error type returned by blob handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

const DRAIN_CHUNK_SIZE: usize = 8 * 1024;

/// The body of one blob, as seen by a handler.
///
/// Reads stop at the declared blob size no matter how much data the
/// underlying source still holds. A body only exists for the duration of a
/// handler call; whatever the handler leaves unread is discarded before the
/// stream moves on.
pub struct BlobBody<'a> {
    header: BlobHeader,
    remaining: u64,
    source: &'a mut dyn Read,
}

impl<'a> BlobBody<'a> {
    fn new(header: BlobHeader, source: &'a mut dyn Read) -> Self {
        Self {
            header,
            remaining: u64::from(header.size),
            source,
        }
    }

    /// The blob id.
    pub fn id(&self) -> u32 {
        self.header.id
    }

    /// The declared blob size.
    pub fn size(&self) -> u32 {
        self.header.size
    }

    /// Bytes of the body not read yet.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    fn drain(&mut self) -> io::Result<u64> {
        let mut scratch = [0u8; DRAIN_CHUNK_SIZE];
        let mut discarded = 0u64;
        while self.remaining > 0 {
            match self.read(&mut scratch) {
                Ok(n) => discarded += n as u64,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(discarded)
    }
}

impl Read for BlobBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }

        let max = buf.len().min(usize::try_from(self.remaining).unwrap_or(usize::MAX));
        let n = self.source.read(&mut buf[..max]).map_err(|err| {
            // Tagged so `deliver` can tell a failing body from a failing handler.
            let err = FrameError::from_source(err);
            io::Error::new(err.kind(), err)
        })?;
        if n == 0 {
            return Err(FrameError::UnexpectedEof { section: "body" }.into());
        }
        self.remaining -= n as u64;
        Ok(n)
    }
}

/// Run `handler` on the blob whose body starts at the current position of
/// `source`, then discard whatever the handler left unread.
///
/// A handler failure is returned immediately without draining. If the
/// handler failed by passing on an error from the body itself, that error
/// is returned instead of [`FrameError::Handler`]. On success `source` is
/// positioned right after the blob.
pub fn deliver<H>(source: &mut dyn Read, header: BlobHeader, handler: &mut H) -> Result<()>
where
    H: FnMut(u32, &mut BlobBody<'_>) -> std::result::Result<(), HandlerError>,
{
    let mut body = BlobBody::new(header, source);
    handler(header.id, &mut body).map_err(classify_handler_error)?;

    let skipped = body.drain().map_err(FrameError::from_source)?;
    debug!(
        id = header.id,
        size = header.size,
        skipped,
        "blob delivered"
    );
    Ok(())
}

fn classify_handler_error(err: HandlerError) -> FrameError {
    let carries_frame_error = err
        .downcast_ref::<io::Error>()
        .is_some_and(|io| FrameError::from_io_ref(io).is_some());
    if !carries_frame_error {
        return FrameError::Handler(err);
    }
    match err.downcast::<io::Error>() {
        Ok(io) => FrameError::from_source(*io),
        Err(err) => FrameError::Handler(err),
    }
}
