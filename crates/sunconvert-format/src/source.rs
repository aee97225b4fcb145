//! Reopenable read sessions.
//!
//! Decompression streams only move forward, so every pass over a file opens
//! its own reader from the path. A [`ReadSession`] remembers how to do that.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use byteorder::ByteOrder;
use flate2::read::MultiGzDecoder;
use sunconvert_nbt::NbtReader;

use crate::error::{ReadContext, StructureError};

/// Compression layer between the file and the decoder.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Gzip,
    Brotli,
}

/// Path plus transport; opens a fresh forward-only reader per pass.
#[derive(Clone, Debug)]
pub struct ReadSession {
    path: PathBuf,
    transport: Transport,
    format: &'static str,
    magic: &'static [u8],
}

impl ReadSession {
    pub fn new(path: impl Into<PathBuf>, transport: Transport, format: &'static str) -> Self {
        Self {
            path: path.into(),
            transport,
            format,
            magic: &[],
        }
    }

    /// Requires the raw file to start with `magic`, which is consumed before
    /// the transport is applied.
    pub fn with_magic(mut self, magic: &'static [u8]) -> Self {
        self.magic = magic;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Opens a new reader positioned at the start of the decoded stream.
    pub fn open(&self) -> Result<Box<dyn Read>, StructureError> {
        let file = File::open(&self.path).map_err(StructureError::io("open"))?;
        let mut reader = BufReader::new(file);
        if !self.magic.is_empty() {
            let mut header = vec![0u8; self.magic.len()];
            reader.read_exact(&mut header).context("file header")?;
            if header != self.magic {
                return Err(StructureError::format(self.format, "bad file header"));
            }
        }
        Ok(match self.transport {
            Transport::Plain => Box::new(reader),
            Transport::Gzip => Box::new(BufReader::new(MultiGzDecoder::new(reader))),
            Transport::Brotli => Box::new(brotli::Decompressor::new(reader, 4096)),
        })
    }

    /// Opens a new tag reader with byte order `B`.
    pub fn open_nbt<B: ByteOrder>(&self) -> Result<NbtReader<Box<dyn Read>, B>, StructureError> {
        Ok(NbtReader::new(self.open()?))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
