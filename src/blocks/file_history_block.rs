//! File History Block (##FH) - tracks file modification history.
//!
//! Each FH block represents a single entry in the file's modification history,
//! recording when and by what tool the file was created or modified.

use super::FH_BLOCK_SIZE;
use crate::blocks::common::{BlockHeader, debug_assert_aligned};

/// File History Block (##FH) - records file modification history.
///
/// File history blocks form a linked list starting from the header block's
/// second link. Links: next FH block, comment MD block. Both are written as
/// zero here and filled in when the output links are patched.
#[derive(Debug, Clone)]
pub struct FileHistoryBlock {
    pub header: BlockHeader,
    /// Absolute time of modification in nanoseconds since Jan 1, 1970 (UTC).
    pub time_ns: u64,
    /// Timezone offset from UTC in minutes.
    pub tz_offset_min: i16,
    /// Daylight saving time offset in minutes.
    pub dst_offset_min: i16,
    /// Time flags:
    /// - Bit 0: Local time (vs UTC)
    /// - Bit 1: Time offsets are valid
    pub time_flags: u8,
}

impl FileHistoryBlock {
    pub const LINK_NEXT: usize = 0;
    pub const LINK_COMMENT: usize = 1;

    /// Creates a new FileHistoryBlock with the given timestamp.
    pub fn new(time_ns: u64) -> Self {
        Self {
            header: BlockHeader::new("##FH", FH_BLOCK_SIZE as u64, 2),
            time_ns,
            tz_offset_min: 0,
            dst_offset_min: 0,
            time_flags: 0,
        }
    }

    /// Creates a new FileHistoryBlock with the current system time.
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let time_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        Self::new(time_ns)
    }

    /// Serializes the FileHistoryBlock with null links.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(FH_BLOCK_SIZE);

        buffer.extend_from_slice(&self.header.to_bytes());
        buffer.extend_from_slice(&[0u8; 16]);

        buffer.extend_from_slice(&self.time_ns.to_le_bytes());
        buffer.extend_from_slice(&self.tz_offset_min.to_le_bytes());
        buffer.extend_from_slice(&self.dst_offset_min.to_le_bytes());
        buffer.push(self.time_flags);
        buffer.extend_from_slice(&[0u8; 3]); // reserved

        debug_assert_aligned(buffer.len());
        buffer
    }
}

impl Default for FileHistoryBlock {
    fn default() -> Self {
        Self::new(0)
    }
}
