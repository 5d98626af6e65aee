/// Size of the read-ahead window used for record scans.
pub const READ_CACHE_SIZE: u64 = 64 * 1024;

/// One window of section bytes starting at `start`.
#[derive(Debug, Default)]
pub struct ReadDataCache {
    start: u64,
    data: Vec<u8>,
}

impl ReadDataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bytes `[offset, offset + length)` if the window holds all of them.
    pub fn get(&self, offset: u64, length: u64) -> Option<&[u8]> {
        let end = offset.checked_add(length)?;
        if offset < self.start || end > self.start + self.data.len() as u64 {
            return None;
        }
        let from = (offset - self.start) as usize;
        Some(&self.data[from..from + length as usize])
    }

    pub fn fill(&mut self, start: u64, data: Vec<u8>) {
        self.start = start;
        self.data = data;
    }
}
