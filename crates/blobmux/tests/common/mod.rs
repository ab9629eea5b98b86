#![allow(dead_code)]

use std::io::{self, Read};

use blobmux::frame::{write_header, BlobHeader, Marker};

/// Install a test-writer subscriber so `tracing` output shows up for
/// failing tests. Safe to call from every test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::level_filters::LevelFilter::DEBUG)
        .with_ansi(false)
        .with_target(false)
        .try_init();
}

#[derive(Debug, Clone)]
pub enum Piece {
    Text(Vec<u8>),
    Blob(u32, Vec<u8>),
}

/// Text and blobs covering the awkward cases: near-miss marker prefixes,
/// back-to-back blobs, an empty blob and a blob larger than any read chunk.
pub fn corpus() -> Vec<Piece> {
    vec![
        Piece::Blob(1, b"leading blob".to_vec()),
        Piece::Text(b"plain text, then a near miss: TA5BLOB".to_vec()),
        Piece::Text(b"2 and TA5 and TTA5BLO".to_vec()),
        Piece::Blob(2, (0..=255).collect()),
        Piece::Blob(3, Vec::new()),
        Piece::Text(b"T".to_vec()),
        Piece::Blob(4, vec![0x54; 20_000]),
        Piece::Blob(5, b"TA5BLOB1 inside a body".to_vec()),
        Piece::Text(b"trailing text ending in TA5BL".to_vec()),
    ]
}

pub fn encode(pieces: &[Piece]) -> Vec<u8> {
    let mut out = Vec::new();
    for piece in pieces {
        match piece {
            Piece::Text(text) => out.extend_from_slice(text),
            Piece::Blob(id, body) => {
                write_header(
                    &mut out,
                    &Marker::DEFAULT,
                    BlobHeader::new(*id, body.len() as u32),
                )
                .expect("vec sink should not fail");
                out.extend_from_slice(body);
            }
        }
    }
    out
}

pub fn text_of(pieces: &[Piece]) -> Vec<u8> {
    pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Text(text) => Some(text.as_slice()),
            Piece::Blob(..) => None,
        })
        .flatten()
        .copied()
        .collect()
}

pub fn blobs_of(pieces: &[Piece]) -> Vec<(u32, Vec<u8>)> {
    pieces
        .iter()
        .filter_map(|piece| match piece {
            Piece::Blob(id, body) => Some((*id, body.clone())),
            Piece::Text(_) => None,
        })
        .collect()
}

/// Reader that hands out at most `size` bytes per call.
pub struct Chunked<'a> {
    data: &'a [u8],
    size: usize,
}

impl<'a> Chunked<'a> {
    pub fn new(data: &'a [u8], size: usize) -> Self {
        Self { data, size }
    }
}

impl Read for Chunked<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.size.min(buf.len()).min(self.data.len());
        buf[..n].copy_from_slice(&self.data[..n]);
        self.data = &self.data[n..];
        Ok(n)
    }
}
