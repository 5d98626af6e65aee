//! Output sinks.
//!
//! The sorter streams blocks front to back from a background thread and
//! afterwards seeks back to patch link fields, so a sink needs sequential
//! writes, absolute seeks and a flush. Files and in-memory buffers are
//! provided.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use crate::Result;

/// Write and seek operations used by the output pipeline and the link
/// patcher.
pub trait MdfWrite {
    /// Write all bytes at the current position.
    fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Seek to an absolute position.
    fn seek(&mut self, pos: u64) -> Result<u64>;

    /// Get the current position.
    fn position(&self) -> u64;

    /// Flush any buffered data.
    fn flush(&mut self) -> Result<()>;
}

/// Output held in memory. Mostly useful for tests and for callers that
/// post-process the sorted file themselves.
#[derive(Debug, Default)]
pub struct VecWriter {
    buffer: Vec<u8>,
    position: u64,
}

impl VecWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            position: 0,
        }
    }

    /// Consume the writer and return the underlying buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl MdfWrite for VecWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let pos = self.position as usize;
        let end = pos + bytes.len();
        if end > self.buffer.len() {
            self.buffer.resize(end, 0);
        }
        self.buffer[pos..end].copy_from_slice(bytes);
        self.position = end as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.position = pos;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Buffered file output.
pub struct FileWriter {
    inner: BufWriter<File>,
    position: u64,
}

impl FileWriter {
    /// Create (or truncate) the file at `path` with a 1 MB buffer.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_capacity(path, 1_048_576)
    }

    pub fn with_capacity(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: BufWriter::with_capacity(capacity, file),
            position: 0,
        })
    }
}

impl MdfWrite for FileWriter {
    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn seek(&mut self, pos: u64) -> Result<u64> {
        self.inner.seek(SeekFrom::Start(pos))?;
        self.position = pos;
        Ok(self.position)
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_writer_overwrites_after_seek() -> Result<()> {
        let mut writer = VecWriter::new();
        writer.write_all(&[1, 2, 3, 4])?;
        writer.seek(1)?;
        writer.write_all(&[9])?;
        assert_eq!(writer.position(), 2);
        assert_eq!(writer.into_inner(), vec![1, 9, 3, 4]);
        Ok(())
    }

    #[test]
    fn file_writer_patches_in_place() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        let mut writer = FileWriter::new(file.path())?;
        writer.write_all(b"abcdef")?;
        writer.seek(2)?;
        writer.write_all(b"XY")?;
        writer.flush()?;
        assert_eq!(std::fs::read(file.path())?, b"abXYef".to_vec());
        Ok(())
    }
}
