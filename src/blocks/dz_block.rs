//! DZ Block - Compressed Data Block
//!
//! The DZ block contains zlib-compressed data that represents another block type
//! (DT, SD or RD). The graph keeps only the 48 byte header; the compressed
//! payload is read on demand from the input.

use crate::{
    Error, Result,
    blocks::common::{BlockHeader, BlockParse, read_u8, read_u32, read_u64, validate_buffer_size},
};
use miniz_oxide::deflate::compress_to_vec_zlib;
use miniz_oxide::inflate::decompress_to_vec_zlib;

/// Compression algorithm used in DZ block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DzCompressionType {
    /// Deflate only (zlib).
    Deflate = 0,
    /// Transposition followed by deflate.
    TranspositionDeflate = 1,
}

impl DzCompressionType {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Deflate),
            1 => Some(Self::TranspositionDeflate),
            _ => None,
        }
    }
}

/// DZ block header size (standard 24 + DZ-specific 24 = 48 bytes).
pub const DZ_HEADER_SIZE: usize = 48;

/// zlib level used for blocks written by the sorter.
const COMPRESSION_LEVEL: u8 = 6;

/// DZ Block header.
///
/// # MDF4 Specification
///
/// The DZ block header (after the standard 24-byte block header):
/// - Offset 24-25: Original block type (2 bytes, e.g., "DT")
/// - Offset 26: Compression type (1 byte)
/// - Offset 27: Reserved (1 byte)
/// - Offset 28-31: Zip parameter (4 bytes, column count for transposition)
/// - Offset 32-39: Original data length (8 bytes)
/// - Offset 40-47: Compressed data length (8 bytes)
/// - Offset 48+: Compressed data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DzBlock {
    pub header: BlockHeader,
    /// Original block type identifier (e.g., "DT", "SD").
    pub original_block_type: [u8; 2],
    pub zip_type: DzCompressionType,
    /// For transposition: number of columns.
    pub zip_parameter: u32,
    pub original_data_length: u64,
    pub compressed_data_length: u64,
}

impl BlockParse for DzBlock {
    const ID: &'static str = "##DZ";

    fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let header = Self::parse_header(bytes)?;
        validate_buffer_size(bytes, DZ_HEADER_SIZE)?;

        let zip_type_raw = read_u8(bytes, 26);
        let zip_type = DzCompressionType::from_u8(zip_type_raw).ok_or_else(|| {
            Error::CompressionError(format!("Unknown DZ compression type: {}", zip_type_raw))
        })?;

        Ok(Self {
            header,
            original_block_type: [bytes[24], bytes[25]],
            zip_type,
            zip_parameter: read_u32(bytes, 28),
            original_data_length: read_u64(bytes, 32),
            compressed_data_length: read_u64(bytes, 40),
        })
    }
}

impl DzBlock {
    /// Build the header for a freshly compressed block of type `original`
    /// (for example `"DT"`).
    pub fn new(original: &str, original_data_length: u64, compressed_data_length: u64) -> Self {
        let mut original_block_type = [0u8; 2];
        let tag = original.as_bytes();
        let n = tag.len().min(2);
        original_block_type[..n].copy_from_slice(&tag[..n]);
        Self {
            header: BlockHeader::new(
                "##DZ",
                DZ_HEADER_SIZE as u64 + compressed_data_length,
                0,
            ),
            original_block_type,
            zip_type: DzCompressionType::Deflate,
            zip_parameter: 0,
            original_data_length,
            compressed_data_length,
        }
    }

    /// Block tag of the uncompressed equivalent, e.g. `"##DT"`.
    pub fn original_tag(&self) -> String {
        format!("##{}", String::from_utf8_lossy(&self.original_block_type))
    }

    /// Serialize the 48 byte header. The compressed payload follows it.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buffer = self.header.to_bytes();
        buffer.extend_from_slice(&self.original_block_type);
        buffer.push(self.zip_type as u8);
        buffer.push(0);
        buffer.extend_from_slice(&self.zip_parameter.to_le_bytes());
        buffer.extend_from_slice(&self.original_data_length.to_le_bytes());
        buffer.extend_from_slice(&self.compressed_data_length.to_le_bytes());
        debug_assert_eq!(buffer.len(), DZ_HEADER_SIZE);
        buffer
    }

    /// Inflate `compressed` and undo the transposition if one was applied.
    ///
    /// # Errors
    ///
    /// [`Error::CompressionError`] if inflation fails or the transposition
    /// parameter is zero, [`Error::DataLengthMismatch`] if the result does
    /// not have the declared original length.
    pub fn decompress(&self, compressed: &[u8]) -> Result<Vec<u8>> {
        let decompressed = decompress_to_vec_zlib(compressed)
            .map_err(|e| Error::CompressionError(format!("DZ decompression failed: {:?}", e)))?;

        if decompressed.len() as u64 != self.original_data_length {
            return Err(Error::DataLengthMismatch {
                expected: self.original_data_length,
                actual: decompressed.len() as u64,
            });
        }

        match self.zip_type {
            DzCompressionType::Deflate => Ok(decompressed),
            DzCompressionType::TranspositionDeflate => {
                if self.zip_parameter == 0 {
                    return Err(Error::CompressionError(
                        "DZ transposition: zip_parameter (columns) cannot be 0".to_string(),
                    ));
                }
                Ok(transpose_array(&decompressed, self.zip_parameter as usize, false))
            }
        }
    }
}

/// Compress a payload with plain deflate.
pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_to_vec_zlib(data, COMPRESSION_LEVEL)
}

/// Byte transposition used by DZ blocks with zip type 1.
///
/// `data` is viewed as `len / columns` rows of `columns` bytes. The forward
/// direction emits it column by column; the backward direction restores
/// the row order. Trailing bytes that do not fill a row are copied as-is.
pub fn transpose_array(data: &[u8], columns: usize, forward: bool) -> Vec<u8> {
    if columns == 0 {
        return data.to_vec();
    }
    let (outer, inner) = if forward {
        (columns, data.len() / columns)
    } else {
        (data.len() / columns, columns)
    };

    let mut out = Vec::with_capacity(data.len());
    for i in 0..outer {
        for j in 0..inner {
            out.push(data[i + j * outer]);
        }
    }
    out.extend_from_slice(&data[outer * inner..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn dz_bytes(zip_type: u8, zip_param: u32, original: &[u8], payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"##DZ");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&(48 + payload.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&0u64.to_le_bytes());
        bytes.extend_from_slice(b"DT");
        bytes.push(zip_type);
        bytes.push(0);
        bytes.extend_from_slice(&zip_param.to_le_bytes());
        bytes.extend_from_slice(&(original.len() as u64).to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        bytes
    }

    #[test]
    fn transpose_forward() {
        let data = [1u8, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(transpose_array(&data, 3, true), vec![1, 4, 2, 5, 3, 6, 7, 8]);
    }

    #[test]
    fn transpose_backward_restores_rows() {
        let data = [1u8, 4, 2, 5, 3, 6, 7, 8];
        assert_eq!(transpose_array(&data, 3, false), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn parse_header_fields() {
        let bytes = dz_bytes(1, 8, &[0u8; 16], &[0u8; 5]);
        let dz = DzBlock::from_bytes(&bytes).unwrap();
        assert_eq!(dz.original_tag(), "##DT");
        assert_eq!(dz.zip_type, DzCompressionType::TranspositionDeflate);
        assert_eq!(dz.zip_parameter, 8);
        assert_eq!(dz.original_data_length, 16);
        assert_eq!(dz.compressed_data_length, 5);
    }

    #[test]
    fn invalid_compression_type() {
        let bytes = dz_bytes(99, 0, &[], &[]);
        assert!(DzBlock::from_bytes(&bytes).is_err());
    }

    #[test]
    fn decompress_deflate() {
        let original = b"Hello, MDF world! This is test data for compression.";
        let compressed = compress(original);
        let dz = DzBlock::new("DT", original.len() as u64, compressed.len() as u64);
        assert_eq!(dz.decompress(&compressed).unwrap(), original.to_vec());

        let parsed = DzBlock::from_bytes(&dz.to_bytes()).unwrap();
        assert_eq!(parsed, dz);
    }

    #[test]
    fn decompress_transposed() {
        let original: Vec<u8> = (1..=12).collect();
        let compressed = compress(&transpose_array(&original, 4, true));
        let bytes = dz_bytes(1, 4, &original, &compressed);
        let dz = DzBlock::from_bytes(&bytes).unwrap();
        assert_eq!(dz.decompress(&compressed).unwrap(), original);
    }

    #[test]
    fn decompress_size_mismatch() {
        let compressed = compress(b"test");
        let dz = DzBlock::new("DT", 100, compressed.len() as u64);
        assert!(matches!(
            dz.decompress(&compressed),
            Err(Error::DataLengthMismatch { expected: 100, actual: 4 })
        ));
    }

    proptest! {
        #[test]
        fn transpose_round_trip(
            data in proptest::collection::vec(any::<u8>(), 0..300),
            columns in 0usize..17,
        ) {
            let forward = transpose_array(&data, columns, true);
            prop_assert_eq!(forward.len(), data.len());
            prop_assert_eq!(transpose_array(&forward, columns, false), data);
        }
    }
}
