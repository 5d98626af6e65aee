//! Background writer thread fed through a bounded channel.

use std::sync::mpsc::{self, SyncSender};
use std::thread::{self, JoinHandle};

use tracing::Span;

use super::{MdfWrite, cache::WriteDataCache};
use crate::{Error, Result};

/// Largest chunk read or written in one piece.
pub const MAX_OUTPUT_BLOCK_SIZE: usize = 256 * 1024;

/// Size of the coalescing buffer in front of the channel.
pub const WRITE_CACHE_SIZE: usize = MAX_OUTPUT_BLOCK_SIZE / 2;

/// Buffers in flight before the producer blocks.
pub const QUEUE_DEPTH: usize = 10;

/// Streams bytes to a sink owned by a dedicated thread.
///
/// `None` on the channel tells the thread to flush and hand the sink back.
pub struct WritePipeline<W> {
    sender: Option<SyncSender<Option<Vec<u8>>>>,
    handle: Option<JoinHandle<Result<W>>>,
    cache: WriteDataCache,
    span: Span,
}

impl<W: MdfWrite + Send + 'static> WritePipeline<W> {
    pub fn spawn(writer: W, span: &Span) -> Result<Self> {
        Self::with_cache_size(writer, WRITE_CACHE_SIZE, span)
    }

    pub fn with_cache_size(mut writer: W, cache_size: usize, span: &Span) -> Result<Self> {
        let (sender, receiver) = mpsc::sync_channel::<Option<Vec<u8>>>(QUEUE_DEPTH);
        let thread_span = span.clone();
        let handle = thread::Builder::new()
            .name("mdf-writer".to_string())
            .spawn(move || -> Result<W> {
                let mut buffers = 0usize;
                while let Ok(Some(buffer)) = receiver.recv() {
                    writer.write_all(&buffer)?;
                    buffers += 1;
                }
                writer.flush()?;
                tracing::debug!(parent: &thread_span, buffers, "Writer thread finished");
                Ok(writer)
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
            cache: WriteDataCache::new(cache_size),
            span: span.clone(),
        })
    }

    /// Queue `bytes` behind everything written so far.
    pub fn put(&mut self, bytes: &[u8]) -> Result<()> {
        for buffer in self.cache.append(bytes) {
            self.send(Some(buffer))?;
        }
        Ok(())
    }

    /// Flush pending bytes, stop the thread and return the sink.
    pub fn finish(mut self) -> Result<W> {
        if let Some(buffer) = self.cache.flush() {
            self.send(Some(buffer))?;
        }
        self.send(None)?;
        self.sender = None;
        self.join()
    }

    fn send(&mut self, message: Option<Vec<u8>>) -> Result<()> {
        let sent = match &self.sender {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        };
        if sent {
            return Ok(());
        }
        // The thread hung up; its own error is the interesting one.
        self.sender = None;
        match self.join() {
            Err(e) => Err(e),
            Ok(_) => Err(Error::WriterThread(
                "writer thread stopped before all data was written".to_string(),
            )),
        }
    }

    fn join(&mut self) -> Result<W> {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| Error::WriterThread("writer thread already joined".to_string()))?;
        match handle.join() {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(parent: &self.span, "Writer thread panicked");
                Err(Error::WriterThread("writer thread panicked".to_string()))
            }
        }
    }
}
