//! Carry length-prefixed binary blobs inside a text stream.
//!
//! A blob is announced by an 8-byte marker followed by a little-endian id
//! and size; everything else in the stream is text. blobmux takes such a
//! combined stream apart and puts it back together.
//!
//! # Crate Structure
//!
//! - [`pipe`]: Blocking in-process pipes and the [`Close`](pipe::Close) sink trait
//! - [`frame`]: Header codec, streaming demux reader, mux writer, buffered segment decoder
//! - [`split`]: Threaded adapter that handles blobs off the caller's thread (behind `split` feature)

/// Re-export pipe types.
pub mod pipe {
    pub use blobmux_pipe::*;
}

/// Re-export frame types.
pub mod frame {
    pub use blobmux_frame::*;
}

/// Re-export split types (requires `split` feature).
#[cfg(feature = "split")]
pub mod split {
    pub use blobmux_split::*;
}
