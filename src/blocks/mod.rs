// src/blocks/mod.rs

// ============================================================================
// Block Size Constants (internal use only)
// ============================================================================
// Fixed sizes of the MDF 4.x blocks the sorter creates. Variable-length blocks
// (MD, DT, SD, DL, DZ) take their size from header.length.

/// Identification block size (64 bytes) - file format identifier at offset 0.
pub(crate) const ID_BLOCK_SIZE: usize = 64;

/// Data group block size (64 bytes) - groups channel groups sharing data.
pub(crate) const DG_BLOCK_SIZE: usize = 64;

/// Header list block size (40 bytes) - entry point of a compressed DL chain.
pub(crate) const HL_BLOCK_SIZE: usize = 40;

/// File history block size (56 bytes) - one modification record.
pub(crate) const FH_BLOCK_SIZE: usize = 56;

// ============================================================================
// Submodules
// ============================================================================

mod channel_block;
mod channel_group_block;
pub(crate) mod common;
mod data_group_block;
mod data_list_block;
mod dz_block;
mod file_history_block;
mod header_list_block;
mod identification_block;
mod metadata_block;
pub mod v3;

pub use common::{BlockHeader, BlockParse, ByteOrder};

pub use channel_block::{CN_TYPE_VLSD, ChannelBlock};
pub use channel_group_block::{CG_FLAG_VLSD, ChannelGroupBlock};
pub use data_group_block::DataGroupBlock;
pub use data_list_block::{DL_FLAG_EQUAL_LENGTH, DataListBlock};
pub use dz_block::{DZ_HEADER_SIZE, DzBlock, DzCompressionType, compress, transpose_array};
pub use file_history_block::FileHistoryBlock;
pub use header_list_block::HeaderListBlock;
pub use identification_block::{
    IdentificationBlock, MAX_SUPPORTED_VERSION, MIN_SUPPORTED_VERSION, ZIP_VERSION,
};
pub use metadata_block::MetadataBlock;
