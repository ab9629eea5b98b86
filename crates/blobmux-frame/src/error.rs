use std::io::{self, ErrorKind};

use crate::body::HandlerError;

/// Errors that can occur while framing or unframing blobs.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Reading from the underlying source failed.
    #[error("source I/O error: {0}")]
    Source(#[source] io::Error),

    /// Writing to a text or binary sink failed.
    #[error("sink I/O error: {0}")]
    Sink(#[source] io::Error),

    /// A header was expected but the bytes at its start are not the marker.
    #[error("malformed blob header (marker mismatch)")]
    MalformedHeader,

    /// The blob handler returned an error.
    #[error("blob handler failed: {0}")]
    Handler(#[source] HandlerError),

    /// The stream ended part way through a marker, header or blob body.
    #[error("stream ended inside a blob {section}")]
    UnexpectedEof { section: &'static str },

    /// The stream ended cleanly where a header could have started.
    #[error("end of stream")]
    EndOfStream,

    /// A buffered decoder met a blob larger than it is allowed to hold.
    #[error("blob too large ({size} bytes, max {max})")]
    BlobTooLarge { size: usize, max: usize },
}

impl FrameError {
    /// Classify an error returned by a source read.
    ///
    /// A `FrameError` carried inside the `io::Error` (as produced by
    /// [`BlobReader`](crate::BlobReader)) is recovered as is.
    pub fn from_source(err: io::Error) -> Self {
        unwrap_io(err).unwrap_or_else(FrameError::Source)
    }

    /// Classify an error returned by a sink write.
    ///
    /// A `FrameError` carried inside the `io::Error` (as produced by
    /// [`BlobWriter`](crate::BlobWriter)) is recovered as is.
    pub fn from_sink(err: io::Error) -> Self {
        unwrap_io(err).unwrap_or_else(FrameError::Sink)
    }

    /// Borrow the `FrameError` carried by an `io::Error`, if any.
    pub fn from_io_ref(err: &io::Error) -> Option<&FrameError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<FrameError>())
    }

    /// Whether this error is an expected consequence of a pipe or stream
    /// being closed rather than a real failure.
    ///
    /// Closing one end of a pipe surfaces as end of stream or
    /// [`ErrorKind::BrokenPipe`] on the other end. A handler's own error is
    /// never benign, whatever its kind; a handler that only passed on a
    /// broken body is reported as [`FrameError::Source`] by
    /// [`deliver`](crate::deliver).
    pub fn is_benign(&self) -> bool {
        match self {
            FrameError::EndOfStream => true,
            FrameError::Source(err) | FrameError::Sink(err) => err.kind() == ErrorKind::BrokenPipe,
            _ => false,
        }
    }

    /// The `io::ErrorKind` this error maps to when converted to `io::Error`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            FrameError::Source(err) | FrameError::Sink(err) => err.kind(),
            FrameError::MalformedHeader | FrameError::BlobTooLarge { .. } => ErrorKind::InvalidData,
            FrameError::UnexpectedEof { .. } | FrameError::EndOfStream => ErrorKind::UnexpectedEof,
            FrameError::Handler(_) => ErrorKind::Other,
        }
    }
}

impl From<FrameError> for io::Error {
    fn from(err: FrameError) -> Self {
        match err {
            FrameError::Source(io) | FrameError::Sink(io) => io,
            other => io::Error::new(other.kind(), other),
        }
    }
}

/// Plain I/O errors are attributed to the source. Codecs driven by
/// `tokio_util` only see errors from the stream they decode.
impl From<io::Error> for FrameError {
    fn from(err: io::Error) -> Self {
        FrameError::from_source(err)
    }
}

fn unwrap_io(err: io::Error) -> std::result::Result<FrameError, io::Error> {
    if FrameError::from_io_ref(&err).is_none() {
        return Err(err);
    }
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => inner
            .downcast::<FrameError>()
            .map(|frame| *frame)
            .map_err(|inner| io::Error::new(kind, inner)),
        None => Err(io::Error::from(kind)),
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
