//! Random access to the input file.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{Error, Result};

/// Trait for reading byte ranges from the input.
///
/// The parser, the data provider and the raw block copy all go through this
/// trait, so files and in-memory buffers are handled alike.
pub trait ByteRangeReader {
    /// Read exactly `length` bytes starting at `offset`.
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>>;

    /// Total size of the input in bytes.
    fn size(&self) -> u64;
}

/// Local file reader implementation
pub struct FileRangeReader {
    file: File,
    size: u64,
}

impl FileRangeReader {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path).map_err(Error::IOError)?;
        let size = file.metadata().map_err(Error::IOError)?.len();
        Ok(Self { file, size })
    }
}

impl ByteRangeReader for FileRangeReader {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        check_range(offset, length, self.size)?;
        self.file
            .seek(SeekFrom::Start(offset))
            .map_err(Error::IOError)?;

        let mut buffer = vec![0u8; length as usize];
        self.file.read_exact(&mut buffer).map_err(Error::IOError)?;
        Ok(buffer)
    }

    fn size(&self) -> u64 {
        self.size
    }
}

/// Reader over an input already held in memory.
pub struct SliceReader {
    data: Vec<u8>,
}

impl SliceReader {
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl ByteRangeReader for SliceReader {
    fn read_range(&mut self, offset: u64, length: u64) -> Result<Vec<u8>> {
        check_range(offset, length, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data[start..start + length as usize].to_vec())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn check_range(offset: u64, length: u64, size: u64) -> Result<()> {
    match offset.checked_add(length) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::TooShortBuffer {
            actual: size.saturating_sub(offset) as usize,
            expected: length as usize,
            file: file!(),
            line: line!(),
        }),
    }
}
