use std::io;

/// Errors reported by pipe ends.
///
/// Pipe ends implement `Read`/`Write`, so these always reach callers wrapped
/// in an [`io::Error`] of kind [`io::ErrorKind::BrokenPipe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipeError {
    /// The reading half was used after it was closed.
    #[error("read on closed pipe")]
    ReadOnClosed,

    /// The writing half was used after it or its peer was closed.
    #[error("write on closed pipe")]
    WriteOnClosed,
}

impl From<PipeError> for io::Error {
    fn from(err: PipeError) -> Self {
        io::Error::new(io::ErrorKind::BrokenPipe, err)
    }
}
