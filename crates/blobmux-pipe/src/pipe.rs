use std::io::{self, ErrorKind, Read, Write};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use bytes::{Buf, BytesMut};
use tracing::trace;

use crate::error::PipeError;
use crate::traits::Close;

/// Default number of bytes a pipe buffers before writes block: 64 KiB.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Create a connected pipe with the default capacity.
///
/// Bytes written to the [`PipeWriter`] are read, in order, from the
/// [`PipeReader`]. Writes block while the buffer is full and reads block
/// while it is empty, so the two ends are meant to live on different
/// threads.
pub fn pipe() -> (PipeReader, PipeWriter) {
    pipe_with_capacity(DEFAULT_PIPE_CAPACITY)
}

/// Create a connected pipe that buffers at most `capacity` bytes.
///
/// A capacity of zero is treated as one.
pub fn pipe_with_capacity(capacity: usize) -> (PipeReader, PipeWriter) {
    let capacity = capacity.max(1);
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            buf: BytesMut::with_capacity(capacity),
            capacity,
            reader_closed: false,
            writer_closed: false,
            writer_error: None,
        }),
        readable: Condvar::new(),
        writable: Condvar::new(),
    });
    (
        PipeReader {
            shared: Arc::clone(&shared),
        },
        PipeWriter { shared },
    )
}

struct Shared {
    state: Mutex<State>,
    readable: Condvar,
    writable: Condvar,
}

struct State {
    buf: BytesMut,
    capacity: usize,
    reader_closed: bool,
    writer_closed: bool,
    /// Error handed to the reader once the buffer is drained.
    writer_error: Option<(ErrorKind, String)>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves `State` consistent, so a panic on
        // the other end does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The reading half of a [`pipe`].
pub struct PipeReader {
    shared: Arc<Shared>,
}

impl PipeReader {
    /// Close the reading half.
    ///
    /// Buffered bytes are discarded, a writer blocked on a full buffer wakes
    /// up, and every later write fails with [`ErrorKind::BrokenPipe`].
    pub fn close(&mut self) {
        let mut state = self.shared.lock();
        if state.reader_closed {
            return;
        }
        state.reader_closed = true;
        state.buf.clear();
        drop(state);
        trace!("pipe reader closed");
        self.shared.writable.notify_all();
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        loop {
            if state.reader_closed {
                return Err(PipeError::ReadOnClosed.into());
            }
            if out.is_empty() {
                return Ok(0);
            }
            if !state.buf.is_empty() {
                let n = out.len().min(state.buf.len());
                out[..n].copy_from_slice(&state.buf[..n]);
                state.buf.advance(n);
                drop(state);
                self.shared.writable.notify_all();
                return Ok(n);
            }
            if state.writer_closed {
                return match &state.writer_error {
                    Some((kind, message)) => Err(io::Error::new(*kind, message.clone())),
                    None => Ok(0),
                };
            }
            state = self
                .shared
                .readable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Close for PipeReader {
    fn close(&mut self) -> io::Result<()> {
        PipeReader::close(self);
        Ok(())
    }
}

impl Drop for PipeReader {
    fn drop(&mut self) {
        PipeReader::close(self);
    }
}

/// The writing half of a [`pipe`].
pub struct PipeWriter {
    shared: Arc<Shared>,
}

impl PipeWriter {
    /// Close the writing half.
    ///
    /// The reader drains what is buffered and then sees end of stream.
    pub fn close(&mut self) {
        self.shutdown(None);
    }

    /// Close the writing half so that the reader, after draining what is
    /// buffered, receives an error with this kind and message instead of end
    /// of stream.
    ///
    /// Has no effect if the writer is already closed.
    pub fn close_with_error(&mut self, err: &io::Error) {
        self.shutdown(Some((err.kind(), err.to_string())));
    }

    fn shutdown(&mut self, error: Option<(ErrorKind, String)>) {
        let mut state = self.shared.lock();
        if state.writer_closed {
            return;
        }
        state.writer_closed = true;
        state.writer_error = error;
        drop(state);
        trace!("pipe writer closed");
        self.shared.readable.notify_all();
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut state = self.shared.lock();
        loop {
            if state.writer_closed || state.reader_closed {
                return Err(PipeError::WriteOnClosed.into());
            }
            if data.is_empty() {
                return Ok(0);
            }
            let room = state.capacity.saturating_sub(state.buf.len());
            if room > 0 {
                let n = room.min(data.len());
                state.buf.extend_from_slice(&data[..n]);
                drop(state);
                self.shared.readable.notify_all();
                return Ok(n);
            }
            state = self
                .shared
                .writable
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Close for PipeWriter {
    fn close(&mut self) -> io::Result<()> {
        PipeWriter::close(self);
        Ok(())
    }
}

impl Drop for PipeWriter {
    fn drop(&mut self) {
        PipeWriter::close(self);
    }
}
