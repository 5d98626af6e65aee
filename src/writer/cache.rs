/// Coalesces small writes into buffers of a fixed size.
///
/// A buffer is handed out as soon as it is exactly full. A write larger
/// than the buffer first hands out whatever is pending and then passes the
/// write through as its own buffer.
#[derive(Debug)]
pub struct WriteDataCache {
    buffer: Vec<u8>,
    capacity: usize,
}

impl WriteDataCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Add `bytes`, returning the buffers that are ready to be written.
    pub fn append(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut ready = Vec::new();
        if bytes.len() > self.capacity {
            if let Some(pending) = self.flush() {
                ready.push(pending);
            }
            ready.push(bytes.to_vec());
            return ready;
        }

        let mut rest = bytes;
        while !rest.is_empty() {
            let n = (self.capacity - self.buffer.len()).min(rest.len());
            self.buffer.extend_from_slice(&rest[..n]);
            rest = &rest[n..];
            if self.buffer.len() == self.capacity {
                ready.push(self.take());
            }
        }
        ready
    }

    /// Hand out the partially filled buffer, if any.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::replace(&mut self.buffer, Vec::with_capacity(self.capacity))
    }
}
