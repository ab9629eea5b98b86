use std::io::{self, Write};

use blobmux_pipe::Close;
use tracing::{debug, trace, warn};

use crate::codec::decode_header;
use crate::marker::{find_marker, BlobConfig, MarkerScan, HEADER_SIZE, MARKER_LEN};

/// Splits a combined stream into a text sink and a binary sink.
///
/// Bytes written are scanned for blob headers. Text goes to the text sink;
/// each header (verbatim, 16 bytes) and the blob body that follows it go to
/// the binary sink. Markers, headers and bodies may be split across any
/// number of `write` calls.
///
/// `write` always reports the number of input bytes consumed, which is not
/// related to how many bytes reached either sink. Bytes that may be the
/// start of a marker are held back until the next write settles them, or
/// until [`close`](Self::close) / [`finish`](Self::finish) releases them as
/// text.
///
/// A sink error after part of the input was consumed is reported as a short
/// write; the error is returned by the next call. Retrying the unconsumed
/// remainder never routes a byte twice.
pub struct BlobWriter<T, B> {
    text: T,
    binary: B,
    config: BlobConfig,
    state: State,
    blobs_routed: u64,
    pending: Option<io::Error>,
}

#[derive(Debug, Clone, Copy)]
enum State {
    /// The last `held` input bytes are a strict prefix of the marker and
    /// have not been written anywhere yet.
    Text { held: usize },
    /// Collecting a header; the first `MARKER_LEN` bytes are the marker.
    Header {
        buf: [u8; HEADER_SIZE],
        filled: usize,
    },
    /// Forwarding blob body bytes.
    Binary { remaining: u64 },
}

impl<T: Write, B: Write> BlobWriter<T, B> {
    /// Create a blob writer with default configuration.
    pub fn new(text: T, binary: B) -> Self {
        Self::with_config(text, binary, BlobConfig::default())
    }

    /// Create a blob writer with explicit configuration.
    pub fn with_config(text: T, binary: B, config: BlobConfig) -> Self {
        Self {
            text,
            binary,
            config,
            state: State::Text { held: 0 },
            blobs_routed: 0,
            pending: None,
        }
    }

    /// Borrow the text and binary sinks.
    pub fn get_ref(&self) -> (&T, &B) {
        (&self.text, &self.binary)
    }

    /// Mutably borrow the text and binary sinks.
    pub fn get_mut(&mut self) -> (&mut T, &mut B) {
        (&mut self.text, &mut self.binary)
    }

    /// Consume the writer and return the text and binary sinks.
    ///
    /// Held marker-prefix bytes are dropped; use [`finish`](Self::finish)
    /// to release them first.
    pub fn into_parts(self) -> (T, B) {
        (self.text, self.binary)
    }

    /// Current blob writer configuration.
    pub fn config(&self) -> &BlobConfig {
        &self.config
    }

    /// Number of blob headers routed to the binary sink so far.
    pub fn blobs_routed(&self) -> u64 {
        self.blobs_routed
    }

    /// The frame section the writer stopped inside, if any.
    ///
    /// Returns `"header"` while a header is being collected and `"body"`
    /// while a blob body is being forwarded.
    pub fn unfinished(&self) -> Option<&'static str> {
        match self.state {
            State::Text { .. } => None,
            State::Header { .. } => Some("header"),
            State::Binary { .. } => Some("body"),
        }
    }

    /// Release held text, flush both sinks and return them.
    ///
    /// An unfinished header or blob body is not completed.
    pub fn finish(mut self) -> io::Result<(T, B)> {
        self.release_held()?;
        self.flush()?;
        Ok(self.into_parts())
    }

    fn release_held(&mut self) -> io::Result<()> {
        match self.state {
            State::Text { held } if held > 0 => {
                self.state = State::Text { held: 0 };
                self.text
                    .write_all(&self.config.marker.as_bytes()[..held])
            }
            State::Text { .. } => Ok(()),
            State::Header { filled, .. } => {
                warn!(filled, "blob writer ended inside a blob header");
                Ok(())
            }
            State::Binary { remaining } => {
                warn!(remaining, "blob writer ended inside a blob body");
                Ok(())
            }
        }
    }

    /// Settle `held` marker-prefix bytes against the start of `input`.
    fn resume_held(&mut self, held: usize, input: &[u8]) -> io::Result<usize> {
        let marker = self.config.marker;
        let prefix = &marker.as_bytes()[..held];
        let peek = input.len().min(MARKER_LEN - 1);

        let mut scratch = [0u8; 2 * MARKER_LEN];
        scratch[..held].copy_from_slice(prefix);
        scratch[held..held + peek].copy_from_slice(&input[..peek]);

        match find_marker(&scratch[..held + peek], &marker) {
            MarkerScan::Found(start) => {
                self.text.write_all(&prefix[..start])?;
                self.enter_header();
                Ok(MARKER_LEN - (held - start))
            }
            MarkerScan::Partial(start) if start < held => {
                self.text.write_all(&prefix[..start])?;
                self.state = State::Text {
                    held: held - start + input.len(),
                };
                Ok(input.len())
            }
            _ => {
                self.text.write_all(prefix)?;
                self.state = State::Text { held: 0 };
                Ok(0)
            }
        }
    }

    fn scan_text(&mut self, input: &[u8]) -> io::Result<usize> {
        match find_marker(input, &self.config.marker) {
            MarkerScan::Found(start) => {
                self.text.write_all(&input[..start])?;
                self.enter_header();
                Ok(start + MARKER_LEN)
            }
            MarkerScan::Partial(start) => {
                self.text.write_all(&input[..start])?;
                self.state = State::Text {
                    held: input.len() - start,
                };
                Ok(input.len())
            }
            MarkerScan::Absent => {
                self.text.write_all(input)?;
                Ok(input.len())
            }
        }
    }

    fn enter_header(&mut self) {
        let mut buf = [0u8; HEADER_SIZE];
        buf[..MARKER_LEN].copy_from_slice(self.config.marker.as_bytes());
        trace!("marker found, collecting blob header");
        self.state = State::Header {
            buf,
            filled: MARKER_LEN,
        };
    }

    fn fill_header(
        &mut self,
        mut buf: [u8; HEADER_SIZE],
        filled: usize,
        input: &[u8],
    ) -> io::Result<usize> {
        let take = (HEADER_SIZE - filled).min(input.len());
        buf[filled..filled + take].copy_from_slice(&input[..take]);
        let filled = filled + take;
        if filled < HEADER_SIZE {
            self.state = State::Header { buf, filled };
            return Ok(take);
        }

        let Ok(header) = decode_header(&self.config.marker, &buf) else {
            // Not a header after all: the bytes were text.
            self.text.write_all(&buf)?;
            self.state = State::Text { held: 0 };
            return Ok(take);
        };

        self.binary.write_all(&buf)?;
        self.blobs_routed += 1;
        debug!(id = header.id, size = header.size, "routing blob");
        self.state = if header.size == 0 {
            State::Text { held: 0 }
        } else {
            State::Binary {
                remaining: u64::from(header.size),
            }
        };
        Ok(take)
    }

    fn forward_binary(&mut self, remaining: u64, input: &[u8]) -> io::Result<usize> {
        let n = input
            .len()
            .min(usize::try_from(remaining).unwrap_or(usize::MAX));
        self.binary.write_all(&input[..n])?;

        let remaining = remaining - n as u64;
        self.state = if remaining == 0 {
            trace!("blob body complete");
            State::Text { held: 0 }
        } else {
            State::Binary { remaining }
        };
        Ok(n)
    }
}

impl<T: Close + Write, B: Close + Write> BlobWriter<T, B> {
    /// Release held text, then close the text sink and the binary sink, in
    /// that order.
    ///
    /// An unfinished header or blob body is not completed. The first close
    /// error is returned.
    pub fn close(&mut self) -> io::Result<()> {
        self.release_held()?;
        self.text.close()?;
        self.binary.close()
    }
}

impl<T: Write, B: Write> Write for BlobWriter<T, B> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if let Some(err) = self.pending.take() {
            return Err(err);
        }

        let mut consumed = 0;
        while consumed < data.len() {
            let input = &data[consumed..];
            let step = match self.state {
                State::Text { held } if held > 0 => self.resume_held(held, input),
                State::Text { .. } => self.scan_text(input),
                State::Header { buf, filled } => self.fill_header(buf, filled, input),
                State::Binary { remaining } => self.forward_binary(remaining, input),
            };
            match step {
                Ok(used) => consumed += used,
                Err(err) if consumed == 0 => return Err(err),
                Err(err) => {
                    self.pending = Some(err);
                    return Ok(consumed);
                }
            }
        }
        Ok(consumed)
    }

    /// Flush both sinks. Held marker-prefix bytes stay held.
    fn flush(&mut self) -> io::Result<()> {
        self.text.flush()?;
        self.binary.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::io::ErrorKind;
    use std::rc::Rc;

    use super::*;
    use crate::codec::{write_header, BlobHeader};
    use crate::marker::Marker;

    fn expected_binary(id: u32, data: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_header(
            &mut buf,
            &Marker::DEFAULT,
            BlobHeader::new(id, data.len() as u32),
        )
        .unwrap();
        buf.extend_from_slice(data);
        buf
    }

    fn split(writes: &[&[u8]]) -> (Vec<u8>, Vec<u8>) {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        for chunk in writes {
            assert_eq!(w.write(chunk).unwrap(), chunk.len());
        }
        w.finish().unwrap()
    }

    fn split_in_chunks(stream: &[u8], size: usize) -> (Vec<u8>, Vec<u8>) {
        let chunks: Vec<&[u8]> = stream.chunks(size).collect();
        split(&chunks)
    }

    #[test]
    fn text_only() {
        let (text, binary) = split(&[b"Hello, World!"]);
        assert_eq!(text, b"Hello, World!");
        assert!(binary.is_empty());
    }

    #[test]
    fn blob_only() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        write_header(&mut w, &Marker::DEFAULT, BlobHeader::new(1, 4)).unwrap();
        w.write_all(&[1, 2, 3, 4]).unwrap();
        assert_eq!(w.blobs_routed(), 1);

        let (text, binary) = w.finish().unwrap();
        assert!(text.is_empty());
        assert_eq!(binary, expected_binary(1, &[1, 2, 3, 4]));
    }

    #[test]
    fn text_blob_text() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        w.write_all(b"one").unwrap();
        write_header(&mut w, &Marker::DEFAULT, BlobHeader::new(2, 4)).unwrap();
        w.write_all(&[5, 6, 7, 8]).unwrap();
        w.write_all(b"two").unwrap();

        let (text, binary) = w.finish().unwrap();
        assert_eq!(text, b"onetwo");
        assert_eq!(binary, expected_binary(2, &[5, 6, 7, 8]));
    }

    #[test]
    fn split_data_write() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        write_header(&mut w, &Marker::DEFAULT, BlobHeader::new(4, 4)).unwrap();
        w.write_all(&[1, 2]).unwrap();
        w.write_all(&[3, 4]).unwrap();

        let (_, binary) = w.finish().unwrap();
        assert_eq!(binary, expected_binary(4, &[1, 2, 3, 4]));
    }

    #[test]
    fn multiple_blobs_and_zero_length_blob() {
        let (text, binary) = split(&[
            b"a",
            &expected_binary(5, &[1, 2]),
            b"b",
            &expected_binary(6, &[]),
            b"c",
            &expected_binary(7, &[3, 4]),
        ]);

        assert_eq!(text, b"abc");
        assert_eq!(
            binary,
            [
                expected_binary(5, &[1, 2]),
                expected_binary(6, &[]),
                expected_binary(7, &[3, 4]),
            ]
            .concat()
        );
    }

    #[test]
    fn text_with_partial_marker() {
        let (text, binary) = split(&[b"Hello TAK35EM World"]);
        assert_eq!(text, b"Hello TAK35EM World");
        assert!(binary.is_empty());
    }

    #[test]
    fn every_chunk_size_routes_identically() {
        let stream: Vec<u8> = [
            b"lead TA5B TA5BLOB".to_vec(),
            expected_binary(1, b"payload"),
            b"mid".to_vec(),
            expected_binary(2, &[]),
            expected_binary(3, &[0xFF; 40]),
            b"end TA5BLO".to_vec(),
        ]
        .concat();

        let want_text = b"lead TA5B TA5BLOBmidend TA5BLO".to_vec();
        let want_binary = [
            expected_binary(1, b"payload"),
            expected_binary(2, &[]),
            expected_binary(3, &[0xFF; 40]),
        ]
        .concat();

        for size in 1..=stream.len() {
            let (text, binary) = split_in_chunks(&stream, size);
            assert_eq!(text, want_text, "chunk size {size}");
            assert_eq!(binary, want_binary, "chunk size {size}");
        }
    }

    #[test]
    fn marker_split_at_every_position() {
        let stream: Vec<u8> = [b"xy".to_vec(), expected_binary(9, b"body"), b"z".to_vec()].concat();
        for cut in 1..stream.len() {
            let (text, binary) = split(&[&stream[..cut], &stream[cut..]]);
            assert_eq!(text, b"xyz", "cut at {cut}");
            assert_eq!(binary, expected_binary(9, b"body"), "cut at {cut}");
        }
    }

    #[test]
    fn diverging_prefix_across_writes_is_text() {
        let (text, binary) = split(&[b"abc TA5", b"BL", b"OX rest"]);
        assert_eq!(text, b"abc TA5BLOX rest");
        assert!(binary.is_empty());
    }

    #[test]
    fn marker_restarting_inside_held_prefix() {
        let (text, binary) = split(&[b"T", &expected_binary(3, b"ab")]);
        assert_eq!(text, b"T");
        assert_eq!(binary, expected_binary(3, b"ab"));
    }

    #[test]
    fn self_overlapping_marker_across_writes() {
        let marker = Marker::new(*b"aaaaaaab");
        let mut frame = Vec::new();
        write_header(&mut frame, &marker, BlobHeader::new(1, 1)).unwrap();
        frame.push(b'!');

        let mut w = BlobWriter::with_config(Vec::new(), Vec::new(), BlobConfig::with_marker(marker));
        w.write_all(b"aa").unwrap();
        w.write_all(&frame[..5]).unwrap();
        w.write_all(&frame[5..]).unwrap();
        w.write_all(b"aa").unwrap();

        let (text, binary) = w.finish().unwrap();
        assert_eq!(text, b"aaaa");
        assert_eq!(binary, frame);
    }

    #[test]
    fn flush_keeps_held_prefix() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        w.write_all(b"abcTA5").unwrap();
        w.flush().unwrap();
        assert_eq!(w.get_ref().0, b"abc");

        w.write_all(b"BLOB1").unwrap();
        w.write_all(&[1, 0, 0, 0, 0, 0, 0, 0]).unwrap();
        let (text, binary) = w.finish().unwrap();
        assert_eq!(text, b"abc");
        assert_eq!(binary, expected_binary(1, &[]));
    }

    #[test]
    fn write_reports_input_consumed() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        let frame = expected_binary(1, b"12345");
        assert_eq!(w.write(&frame[..10]).unwrap(), 10);
        assert_eq!(w.write(&frame[10..]).unwrap(), frame.len() - 10);
        assert_eq!(w.write(b"").unwrap(), 0);
    }

    #[test]
    fn text_sink_error_propagates() {
        let mut w = BlobWriter::new(FailingSink, Vec::new());
        let err = w.write(b"text").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn binary_sink_error_propagates() {
        let mut w = BlobWriter::new(Vec::new(), FailingSink);
        w.write_all(b"ok ").unwrap();
        let err = write_header(&mut w, &Marker::DEFAULT, BlobHeader::new(1, 1)).unwrap_err();
        assert!(matches!(err, crate::FrameError::Sink(ref io) if io.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn sink_error_mid_write_reports_progress() {
        let input = [b"abc".to_vec(), expected_binary(1, b"!")].concat();
        let mut w = BlobWriter::new(Vec::new(), FlakySink::default());

        let mut pos = 0;
        let mut errors = 0;
        while pos < input.len() {
            match w.write(&input[pos..]) {
                Ok(n) => pos += n,
                Err(err) if err.kind() == ErrorKind::WouldBlock => errors += 1,
                Err(err) => panic!("unexpected error: {err}"),
            }
        }

        assert_eq!(errors, 1);
        let (text, binary) = w.finish().unwrap();
        assert_eq!(text, b"abc");
        assert_eq!(binary.data, expected_binary(1, b"!"));
    }

    #[test]
    fn unfinished_tracks_frame_section() {
        let frame = expected_binary(1, b"xy");
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        assert_eq!(w.unfinished(), None);
        w.write_all(&frame[..10]).unwrap();
        assert_eq!(w.unfinished(), Some("header"));
        w.write_all(&frame[10..HEADER_SIZE + 1]).unwrap();
        assert_eq!(w.unfinished(), Some("body"));
        w.write_all(&frame[HEADER_SIZE + 1..]).unwrap();
        assert_eq!(w.unfinished(), None);
    }

    #[test]
    fn close_releases_held_text_then_closes_text_before_binary() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let text = Recording::new("text", &log);
        let binary = Recording::new("binary", &log);

        let mut w = BlobWriter::new(text, binary);
        w.write_all(b"tail TA5BL").unwrap();
        w.close().unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                "text write tail ".to_string(),
                "text write TA5BL".to_string(),
                "text close".to_string(),
                "binary close".to_string(),
            ]
        );
    }

    #[test]
    fn close_mid_blob_does_not_complete_it() {
        let mut w = BlobWriter::new(Vec::new(), Vec::new());
        write_header(&mut w, &Marker::DEFAULT, BlobHeader::new(1, 100)).unwrap();
        w.write_all(b"partial").unwrap();
        w.close().unwrap();

        let (text, binary) = w.into_parts();
        assert!(text.is_empty());
        assert_eq!(binary.len(), HEADER_SIZE + 7);
    }

    #[test]
    fn close_error_propagates() {
        let mut w = BlobWriter::new(FailingClose, Vec::new());
        let err = w.close().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Other);
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// Fails its first write with `WouldBlock`, then accepts everything.
    #[derive(Default)]
    struct FlakySink {
        failed: bool,
        data: Vec<u8>,
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(io::Error::from(ErrorKind::WouldBlock));
            }
            self.data.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FailingClose;

    impl Write for FailingClose {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Close for FailingClose {
        fn close(&mut self) -> io::Result<()> {
            Err(io::Error::other("close failed"))
        }
    }

    struct Recording {
        name: &'static str,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl Recording {
        fn new(name: &'static str, log: &Rc<RefCell<Vec<String>>>) -> Self {
            Self {
                name,
                log: Rc::clone(log),
            }
        }
    }

    impl Write for Recording {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if !buf.is_empty() {
                self.log.borrow_mut().push(format!(
                    "{} write {}",
                    self.name,
                    String::from_utf8_lossy(buf)
                ));
            }
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Close for Recording {
        fn close(&mut self) -> io::Result<()> {
            self.log.borrow_mut().push(format!("{} close", self.name));
            Ok(())
        }
    }
}
