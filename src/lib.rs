#![forbid(unsafe_code)]

//! # mdf-sorter
//!
//! Rewrites ASAM MDF 3.x and 4.x files into the restricted subset expected by
//! ODS importers: every data group holds exactly one channel group, data
//! sections are either all plain or all compressed, and no data block grows
//! past a configured size.
//!
//! A run has three phases:
//!
//! 1. The [`parser`] walks the block graph from the header at offset 64 and
//!    builds an arena of nodes keyed by file address ([`graph`]).
//! 2. The [`classify`] pass marks every node that violates the subset:
//!    unsorted data groups, compressed or plain data in the wrong direction,
//!    and data lists that are too long or too fragmented.
//! 3. The [`sorter`] copies all untouched blocks, rewrites the marked data
//!    sections through the [`splitmerge`] engine and patches every link once
//!    the output positions are known ([`writer`]).
//!
//! Version specific block layouts live behind the
//! [`FormatSchema`](format::FormatSchema) trait, so the pipeline is shared
//! by both format families.
//!
//! ## Quick Start
//!
//! ```no_run
//! use mdf_sorter::{Result, SortConfig, ZipDirection, check_file, process_file};
//!
//! fn main() -> Result<()> {
//!     let config = SortConfig::default().with_zip(ZipDirection::Unzip);
//!
//!     if check_file("recording.mf4", &config)?.needs_processing {
//!         let summary = process_file("recording.mf4", "sorted.mf4", &config)?;
//!         println!("Wrote {} bytes", summary.bytes_written);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`blocks`] | Byte level block structures of both format families |
//! | [`format`] | Per version schema: link layout, data tags, record ids |
//! | [`parser`] | Block graph discovery |
//! | [`classify`] | Problem detection |
//! | [`provider`] | Logical byte view over chained or compressed data |
//! | [`splitmerge`] | Re-chunking of data sections |
//! | [`writer`] | Background write pipeline and link patching |
//! | [`sorter`] | One complete run |
//! | [`cli`] | Argument handling of the `mdfsorter` binary |
//! | [`error`] | Error types and [`Result`] alias |

pub mod blocks;
pub mod classify;
pub mod cli;
pub mod config;
pub mod error;
pub mod format;
pub mod graph;
pub mod parser;
pub mod provider;
pub mod reader;
pub mod sorter;
pub mod splitmerge;
pub mod writer;

pub use classify::ProblemCounts;
pub use config::{SortConfig, ZipDirection, parse_size};
pub use error::{Error, Result};
pub use reader::{ByteRangeReader, FileRangeReader, SliceReader};
pub use sorter::{CheckReport, ProcessSummary, Sorter, check_file, process_file};
pub use writer::{FileWriter, MdfWrite, VecWriter};
