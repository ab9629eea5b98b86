//! In-process pipes and the closable sink abstraction.
//!
//! This is the lowest layer of blobmux. The concurrent adapter connects its
//! tasks with the [`pipe`] pairs provided here, and the mux closes its sinks
//! through the [`Close`] trait.

pub mod error;
pub mod pipe;
pub mod traits;

pub use error::PipeError;
pub use pipe::{pipe, pipe_with_capacity, PipeReader, PipeWriter, DEFAULT_PIPE_CAPACITY};
pub use traits::Close;
