use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use blobmux_frame::{BlobBody, BlobConfig, BlobWriter, FrameError, HandlerError};
use blobmux_pipe::{pipe_with_capacity, PipeReader, DEFAULT_PIPE_CAPACITY};
use tracing::{debug, warn};

use crate::error::{Result, SplitError};
use crate::task::{consume, feed, Outcome, BLOBS, FEEDER};

/// Configuration for a [`SplitReader`].
#[derive(Debug, Clone)]
pub struct SplitConfig {
    /// Marker and chunk size used by the feeder.
    pub blob: BlobConfig,
    /// Bytes each internal pipe buffers before its writer blocks.
    pub pipe_capacity: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            blob: BlobConfig::default(),
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}

/// Reads the text of a combined stream while its blobs are handled on a
/// separate thread.
///
/// Two worker threads run behind the reader. The feeder copies the source
/// through a [`BlobWriter`], which routes text into one pipe and blobs into
/// another. The blob thread reads blobs off the second pipe and calls the
/// handler for each, one at a time and in stream order. Reading from the
/// `SplitReader` reads the first pipe.
///
/// Call [`close`](Self::close) to stop early or to collect the outcome once
/// the text has been read. Dropping the reader does the same, but can only
/// log the outcome.
pub struct SplitReader {
    text: PipeReader,
    outcomes: Receiver<Outcome>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl SplitReader {
    /// Start splitting `source` with default configuration.
    pub fn spawn<R, H>(source: R, handler: H) -> Result<Self>
    where
        R: Read + Send + 'static,
        H: FnMut(u32, &mut BlobBody<'_>) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        Self::spawn_with_config(source, handler, SplitConfig::default())
    }

    /// Start splitting `source` with explicit configuration.
    pub fn spawn_with_config<R, H>(source: R, handler: H, config: SplitConfig) -> Result<Self>
    where
        R: Read + Send + 'static,
        H: FnMut(u32, &mut BlobBody<'_>) -> std::result::Result<(), HandlerError> + Send + 'static,
    {
        let (text_reader, text_writer) = pipe_with_capacity(config.pipe_capacity);
        let (binary_reader, binary_writer) = pipe_with_capacity(config.pipe_capacity);
        let (tx, outcomes) = mpsc::channel();

        let marker = config.blob.marker;
        let chunk_size = config.blob.read_chunk_size;

        // The blob thread goes first: if the feeder then fails to start, its
        // pipe writers are dropped and the blob thread sees end of stream.
        let blobs = start(BLOBS, tx.clone(), move || consume(binary_reader, handler, marker))?;

        let mux = BlobWriter::with_config(text_writer, binary_writer, config.blob);
        let feeder = match start(FEEDER, tx, move || feed(source, mux, chunk_size)) {
            Ok(handle) => handle,
            Err(err) => {
                if blobs.join().is_err() {
                    warn!(task = BLOBS, "blob thread panicked");
                }
                return Err(err);
            }
        };

        debug!(pipe_capacity = config.pipe_capacity, "split reader started");
        Ok(Self {
            text: text_reader,
            outcomes,
            tasks: vec![(BLOBS, blobs), (FEEDER, feeder)],
        })
    }

    /// Stop reading and wait for both worker threads.
    ///
    /// Closing the text pipe makes the feeder fail on its next text write,
    /// which in turn ends the blob thread. Errors caused only by that
    /// shutdown are ignored. Returns the first other error, in the order the
    /// threads finished.
    pub fn close(mut self) -> Result<()> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<()> {
        self.text.close();

        let mut first: Option<FrameError> = None;
        for _ in 0..self.tasks.len() {
            // Fails early only if a thread panicked before reporting.
            let Ok(outcome) = self.outcomes.recv() else {
                break;
            };
            match outcome.result {
                Ok(()) => debug!(task = outcome.task, "task finished"),
                Err(err) if err.is_benign() => {
                    debug!(task = outcome.task, error = %err, "task stopped by closed pipe");
                }
                Err(err) => {
                    debug!(task = outcome.task, error = %err, "task failed");
                    first.get_or_insert(err);
                }
            }
        }

        let mut panicked = None;
        for (task, handle) in self.tasks.drain(..) {
            if handle.join().is_err() {
                panicked.get_or_insert(task);
            }
        }

        match (first, panicked) {
            (Some(err), _) => Err(err.into()),
            (None, Some(task)) => Err(SplitError::TaskPanicked(task)),
            (None, None) => Ok(()),
        }
    }
}

fn start<F>(name: &'static str, tx: Sender<Outcome>, task: F) -> Result<JoinHandle<()>>
where
    F: FnOnce() -> std::result::Result<(), FrameError> + Send + 'static,
{
    thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = task();
            let _ = tx.send(Outcome { task: name, result });
        })
        .map_err(SplitError::Spawn)
}

impl Read for SplitReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.text.read(buf)
    }
}

impl Drop for SplitReader {
    fn drop(&mut self) {
        if self.tasks.is_empty() {
            return;
        }
        if let Err(err) = self.shutdown() {
            warn!(error = %err, "split reader dropped with error");
        }
    }
}

impl std::fmt::Debug for SplitReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SplitReader")
            .field("running", &self.tasks.len())
            .finish_non_exhaustive()
    }
}
