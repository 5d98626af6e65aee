//! Error types for sorter operations.
//!
//! This module defines the [`Error`] enum which represents all possible failures
//! that can occur while parsing, classifying, rewriting or writing an MDF file.
//! Every failure is fatal for the current run: the sorter never retries and a
//! partially written output file must be treated as unusable.
//!
//! # Example
//!
//! ```no_run
//! use mdf_sorter::{Error, Result, SortConfig, process_file};
//!
//! fn sort(input: &str, output: &str) -> Result<()> {
//!     match process_file(input, output, &SortConfig::default()) {
//!         Ok(summary) => {
//!             println!("Wrote {} bytes", summary.bytes_written);
//!             Ok(())
//!         }
//!         Err(Error::FileIdentifierError(id)) => {
//!             eprintln!("Not a valid MDF file: {}", id);
//!             Err(Error::FileIdentifierError(id))
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```

use core::fmt;

/// Errors that can occur during sorter operations.
#[derive(Debug)]
pub enum Error {
    /// Buffer provided for parsing was too small.
    ///
    /// This typically indicates file corruption or an incomplete read.
    TooShortBuffer {
        /// Actual number of bytes available
        actual: usize,
        /// Minimum number of bytes required
        expected: usize,
        /// Source file where the error was detected
        file: &'static str,
        /// Line number where the error was detected
        line: u32,
    },

    /// The file identifier is not "MDF     ".
    FileIdentifierError(String),

    /// The MDF version is outside the supported range (3.00 to 4.11).
    FileVersioningError(String),

    /// A block identifier did not match the expected value.
    ///
    /// Usually means a link points into the middle of a block.
    BlockIDError {
        /// The identifier that was found
        actual: String,
        /// The identifier that was expected
        expected: String,
    },

    /// An I/O error occurred while reading or writing a file.
    IOError(std::io::Error),

    /// A link could not be resolved or rewritten.
    BlockLinkError(String),

    /// Failed to serialize or interpret a block.
    BlockSerializationError(String),

    /// Command line or configuration values are invalid.
    InvalidArgument(String),

    /// The same block address was parsed twice.
    DuplicateAddress(u64),

    /// A node carries more than one structural problem at once.
    MultipleProblems {
        /// Input address of the node
        address: u64,
        /// Number of problems attached to it
        count: usize,
    },

    /// A data section hangs below a block type that cannot be relinked.
    UnsupportedParent(String),

    /// Copied, inflated or declared byte counts disagree.
    DataLengthMismatch {
        /// Number of bytes expected
        expected: u64,
        /// Number of bytes actually produced
        actual: u64,
    },

    /// A read outside the bounds of a data section.
    InvalidReadAccess {
        /// Section relative offset of the read
        offset: u64,
        /// Requested number of bytes
        length: u64,
        /// Total length of the data section
        section_length: u64,
    },

    /// Inflating or deflating a DZ payload failed.
    CompressionError(String),

    /// A record id found in an unsorted data section is unknown.
    InvalidRecordId {
        /// The record id that was read
        record_id: u64,
        /// Section relative offset of the record
        offset: u64,
    },

    /// The background writer thread failed or disappeared.
    WriterThread(String),

    /// MDF 3.x files cannot carry compressed data.
    ZipNotSupported,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::TooShortBuffer {
                actual,
                expected,
                file,
                line,
            } => write!(
                f,
                "Buffer too small at {file}:{line}: need at least {expected} bytes, got {actual}"
            ),
            Error::FileIdentifierError(id) => {
                write!(
                    f,
                    r#"Invalid file identifier: Expected "MDF     ", found {id}"#
                )
            }
            Error::FileVersioningError(ver) => {
                write!(
                    f,
                    "Unsupported file version: Expected 300 to 411, found {ver}"
                )
            }
            Error::BlockIDError { actual, expected } => {
                write!(
                    f,
                    "Invalid block identifier: Expected {expected:?}, got {actual:?}"
                )
            }
            Error::IOError(e) => write!(f, "I/O error: {e}"),
            Error::BlockLinkError(s) => write!(f, "Block linking error: {s}"),
            Error::BlockSerializationError(s) => write!(f, "Block serialization error: {s}"),
            Error::InvalidArgument(s) => write!(f, "Invalid argument: {s}"),
            Error::DuplicateAddress(address) => {
                write!(f, "Duplicate block at address {address:#x}")
            }
            Error::MultipleProblems { address, count } => write!(
                f,
                "Block at {address:#x} has {count} problems, only one can be solved"
            ),
            Error::UnsupportedParent(tag) => {
                write!(f, "Cannot relink data section below a {tag:?} block")
            }
            Error::DataLengthMismatch { expected, actual } => write!(
                f,
                "Data length mismatch: expected {expected} bytes, got {actual}"
            ),
            Error::InvalidReadAccess {
                offset,
                length,
                section_length,
            } => write!(
                f,
                "Invalid read of {length} bytes at {offset}: section is only {section_length} bytes long"
            ),
            Error::CompressionError(s) => write!(f, "Compression error: {s}"),
            Error::InvalidRecordId { record_id, offset } => {
                write!(f, "Unknown record id {record_id} at section offset {offset}")
            }
            Error::WriterThread(s) => write!(f, "Writer thread failed: {s}"),
            Error::ZipNotSupported => write!(f, "MDF 3.x files cannot be zipped"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IOError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IOError(err)
    }
}

/// A specialized Result type for sorter operations.
pub type Result<T> = core::result::Result<T, Error>;
