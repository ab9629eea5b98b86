//! Bodies of the two worker threads behind a [`SplitReader`](crate::SplitReader).

use std::io::{self, ErrorKind, Read, Write};

use blobmux_frame::{deliver, read_header, BlobBody, BlobWriter, FrameError, HandlerError, Marker};
use blobmux_pipe::{PipeReader, PipeWriter};
use tracing::{debug, trace};

pub(crate) const FEEDER: &str = "blobmux-feeder";
pub(crate) const BLOBS: &str = "blobmux-blobs";

/// Result of one worker thread, sent back to the reader.
pub(crate) struct Outcome {
    pub(crate) task: &'static str,
    pub(crate) result: Result<(), FrameError>,
}

/// Copy `source` through the mux until it ends, then close both pipes.
///
/// If the copy fails, the pipes are closed so that whoever reads them stops
/// too: a closed-pipe failure closes text cleanly and makes the binary side
/// fail with `BrokenPipe`; any other failure is passed on to both readers.
/// A source that ends inside a blob header fails the text side with
/// [`FrameError::UnexpectedEof`]; the partial header never reaches the
/// binary side, which ends cleanly.
pub(crate) fn feed<R: Read>(
    mut source: R,
    mut mux: BlobWriter<PipeWriter, PipeWriter>,
    chunk_size: usize,
) -> Result<(), FrameError> {
    match copy(&mut source, &mut mux, chunk_size) {
        Ok(copied) => {
            debug!(copied, blobs = mux.blobs_routed(), "source exhausted");
            if mux.unfinished() == Some("header") {
                let err = FrameError::UnexpectedEof { section: "header" };
                let (text, binary) = mux.get_mut();
                text.close_with_error(&io::Error::new(err.kind(), err.to_string()));
                binary.close();
                return Err(err);
            }
            mux.close().map_err(FrameError::from_sink)
        }
        Err(err) => {
            let (text, binary) = mux.get_mut();
            if err.is_benign() {
                text.close();
                binary.close_with_error(&io::Error::from(ErrorKind::BrokenPipe));
            } else {
                let copy = io::Error::new(err.kind(), err.to_string());
                text.close_with_error(&copy);
                binary.close_with_error(&copy);
            }
            Err(err)
        }
    }
}

fn copy<R: Read>(
    source: &mut R,
    mux: &mut BlobWriter<PipeWriter, PipeWriter>,
    chunk_size: usize,
) -> Result<u64, FrameError> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut copied = 0u64;
    loop {
        let n = match source.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::from_source(err)),
        };
        mux.write_all(&buf[..n]).map_err(FrameError::from_sink)?;
        copied += n as u64;
    }
}

/// Read blobs off the binary pipe and hand each one to `handler`, in order,
/// until the pipe ends.
pub(crate) fn consume<H>(mut binary: PipeReader, mut handler: H, marker: Marker) -> Result<(), FrameError>
where
    H: FnMut(u32, &mut BlobBody<'_>) -> Result<(), HandlerError>,
{
    let mut delivered = 0u64;
    loop {
        let header = match read_header(&mut binary, &marker) {
            Ok(header) => header,
            Err(FrameError::EndOfStream) => {
                debug!(delivered, "binary pipe ended");
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        trace!(id = header.id, size = header.size, "blob header");

        if let Err(err) = deliver(&mut binary, header, &mut handler) {
            // Unblock the feeder if it is waiting on a full binary pipe.
            binary.close();
            return Err(err);
        }
        delivered += 1;
    }
}
