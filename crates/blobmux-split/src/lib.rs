//! Concurrent demultiplexing of a combined stream.
//!
//! This is the "just works" layer. Hand it a source and a blob handler, read
//! plain text back, and let worker threads take care of the blobs.

pub mod error;
pub mod split;
mod task;

pub use error::{Result, SplitError};
pub use split::{SplitConfig, SplitReader};
