//! Command line surface of the `mdfsorter` binary.
//!
//! Both the historical single-dash spelling (`-zip`, `-maxblocksize=4M`) and
//! regular long options (`--zip`, `--maxblocksize 4M`) are accepted. The
//! legacy forms are rewritten by [`normalize_legacy_args`] before clap sees
//! them, so every argument error is reported before any file is opened.

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};

use crate::{
    Result,
    config::{SortConfig, ZipDirection, parse_size},
    sorter::{check_file, process_file},
};

/// Flags that were historically written with a single dash.
const LEGACY_FLAGS: &[&str] = &["zip", "unzip", "maxblocksize", "overridesize", "verbose", "json"];

#[derive(Debug, Parser)]
#[command(
    name = "mdfsorter",
    version,
    about = "Rewrite MDF 3.x/4.x files into the sorted, uniformly chunked subset"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Rewrite <INPUT> into <OUTPUT>
    Process(ProcessArgs),
    /// Report whether <INPUT> needs processing (exit code 1 if it does)
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct ZipFlags {
    /// Compress all data blocks (MDF 4.x only, blocks are limited to 4M)
    #[arg(long, conflicts_with = "unzip")]
    pub zip: bool,
    /// Decompress all data blocks (default)
    #[arg(long)]
    pub unzip: bool,
}

impl ZipFlags {
    pub fn direction(&self) -> ZipDirection {
        if self.zip {
            ZipDirection::Zip
        } else {
            ZipDirection::Unzip
        }
    }
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    pub input: PathBuf,
    pub output: PathBuf,
    #[command(flatten)]
    pub zip: ZipFlags,
    /// Largest data block to write, with an optional K, M or G suffix
    #[arg(long = "maxblocksize", value_name = "SIZE", value_parser = size_arg)]
    pub max_block_size: Option<u64>,
    /// Re-chunk data lists even when their blocks are already small enough
    #[arg(long = "overridesize")]
    pub override_size: bool,
    /// Log every solved problem
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    pub input: PathBuf,
    /// Largest acceptable data block, with an optional K, M or G suffix
    #[arg(value_name = "MAXSIZE", value_parser = size_arg)]
    pub max_block_size: Option<u64>,
    #[command(flatten)]
    pub zip: ZipFlags,
    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
    #[arg(long)]
    pub verbose: bool,
}

impl ProcessArgs {
    pub fn config(&self) -> SortConfig {
        let mut config = SortConfig::default()
            .with_zip(self.zip.direction())
            .with_override_size(self.override_size)
            .with_verbose(self.verbose);
        if let Some(size) = self.max_block_size {
            config = config.with_max_block_size(size);
        }
        config
    }
}

impl CheckArgs {
    pub fn config(&self) -> SortConfig {
        let mut config = SortConfig::default()
            .with_zip(self.zip.direction())
            .with_verbose(self.verbose);
        if let Some(size) = self.max_block_size {
            config = config.with_max_block_size(size);
        }
        config
    }
}

impl Cli {
    /// Parse arguments in either spelling.
    pub fn try_parse_legacy<I, T>(args: I) -> std::result::Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        Self::try_parse_from(normalize_legacy_args(args))
    }

    pub fn verbose(&self) -> bool {
        match &self.command {
            Command::Process(args) => args.verbose,
            Command::Check(args) => args.verbose,
        }
    }
}

fn size_arg(value: &str) -> std::result::Result<u64, String> {
    parse_size(value).map_err(|e| e.to_string())
}

/// Turn `-flag` and `-flag=value` into their `--flag` forms.
///
/// Only the known legacy flags are rewritten; anything else is passed
/// through untouched and left for clap to reject.
pub fn normalize_legacy_args<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(Into::into)
        .map(|arg| {
            let rewritten = arg.to_str().and_then(|text| {
                let flag = text.strip_prefix('-')?;
                if flag.starts_with('-') {
                    return None;
                }
                let name = flag.split('=').next().unwrap_or(flag);
                LEGACY_FLAGS
                    .contains(&name)
                    .then(|| OsString::from(format!("-{text}")))
            });
            rewritten.unwrap_or(arg)
        })
        .collect()
}

/// Execute a parsed command line.
///
/// `check` exits with 1 when the file needs processing.
pub fn run(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Command::Process(args) => {
            let summary = process_file(&args.input, &args.output, &args.config())?;
            tracing::info!(
                input = %args.input.display(),
                output = %args.output.display(),
                bytes = summary.bytes_written,
                problems = summary.problems.total(),
                "Processing finished"
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Check(args) => {
            let report = check_file(&args.input, &args.config())?;
            if args.json {
                let json = serde_json::to_string_pretty(&report)
                    .map_err(|e| crate::Error::BlockSerializationError(e.to_string()))?;
                println!("{json}");
            } else if report.needs_processing {
                println!("{} needs processing", args.input.display());
            } else {
                println!("{} is already compliant", args.input.display());
            }
            Ok(if report.needs_processing {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_BLOCK_SIZE, ZIP_MAX_BLOCK_SIZE};

    fn process(args: &[&str]) -> std::result::Result<ProcessArgs, clap::Error> {
        let argv = std::iter::once("mdfsorter").chain(args.iter().copied());
        match Cli::try_parse_legacy(argv)?.command {
            Command::Process(args) => Ok(args),
            other => panic!("expected process, got {:?}", other),
        }
    }

    #[test]
    fn too_few_arguments() {
        assert!(process(&["process", "file1"]).is_err());
    }

    #[test]
    fn unknown_flag() {
        assert!(process(&["process", "file1", "file2", "-somerandomflag=0", "-unzip"]).is_err());
    }

    #[test]
    fn conflicting_zip_flags() {
        assert!(process(&["process", "file1", "file2", "-zip", "-maxblocksize=4g", "-unzip"]).is_err());
    }

    #[test]
    fn block_size_without_value() {
        assert!(process(&["process", "file1", "file2", "-zip", "-maxblocksize="]).is_err());
    }

    #[test]
    fn legacy_values() {
        let args = process(&["process", "file1", "file2", "-zip", "-maxblocksize=300"]).unwrap();
        assert_eq!(args.input, PathBuf::from("file1"));
        assert_eq!(args.output, PathBuf::from("file2"));
        assert!(args.zip.zip);
        assert_eq!(args.max_block_size, Some(300));
        assert!(args.config().is_zip());
    }

    #[test]
    fn size_suffixes() {
        for (flag, expected) in [
            ("-maxblocksize=3M", 3u64 << 20),
            ("-maxblocksize=34k", 34 << 10),
            ("-maxblocksize=3000m", 3000 << 20),
            ("-maxblocksize=3G", 3 << 30),
        ] {
            let args = process(&["process", "file1", "file2", flag]).unwrap();
            assert_eq!(args.max_block_size, Some(expected), "{flag}");
        }
    }

    #[test]
    fn modern_spelling_and_defaults() {
        let args = process(&["process", "in.mf4", "out.mf4", "--overridesize", "--verbose"]).unwrap();
        let config = args.config();
        assert!(config.is_unzip());
        assert!(config.override_size);
        assert!(config.verbose);
        assert_eq!(config.max_block_size, DEFAULT_MAX_BLOCK_SIZE);
    }

    #[test]
    fn zip_block_size_is_clamped() {
        let args = process(&["process", "a", "b", "-zip", "-maxblocksize=1g"]).unwrap();
        assert_eq!(args.config().normalized().max_block_size, ZIP_MAX_BLOCK_SIZE);
    }

    #[test]
    fn check_arguments() {
        let cli = Cli::try_parse_legacy(["mdfsorter", "check", "infile.mf4", "4M", "-zip", "-json"]).unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert_eq!(args.max_block_size, Some(4 << 20));
        assert!(args.json);
        assert!(args.config().is_zip());

        assert!(Cli::try_parse_legacy(["mdfsorter", "check", "in", "4M", "-zip", "extra"]).is_err());
        assert!(Cli::try_parse_legacy(["mdfsorter", "check", "in", "lots"]).is_err());
    }

    #[test]
    fn only_known_flags_are_rewritten() {
        let args = normalize_legacy_args(["mdfsorter", "-zip", "--unzip", "-x", "-maxblocksize=2M", "file"]);
        assert_eq!(
            args,
            vec![
                OsString::from("mdfsorter"),
                OsString::from("--zip"),
                OsString::from("--unzip"),
                OsString::from("-x"),
                OsString::from("--maxblocksize=2M"),
                OsString::from("file"),
            ]
        );
    }
}
