/// Errors reported by a [`SplitReader`](crate::SplitReader).
#[derive(Debug, thiserror::Error)]
pub enum SplitError {
    /// A task failed while framing or handling blobs.
    #[error("frame error: {0}")]
    Frame(#[from] blobmux_frame::FrameError),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// A worker thread panicked.
    #[error("{0} thread panicked")]
    TaskPanicked(&'static str),
}

pub type Result<T> = std::result::Result<T, SplitError>;
