//! Configuration types for iso-commander
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - Default locations of the index and history files

use crate::error::ConfigError;
use crate::index::{DEFAULT_MAX_ENTRIES, FILTER_HISTORY_CAPACITY, FOLDER_HISTORY_CAPACITY};
use crate::ops::ImageFormat;
use crate::walker::{TraverseOptions, DEFAULT_MIN_SIZE};
use clap::Parser;
use regex::Regex;
use std::env;
use std::path::{Path, PathBuf};

/// Maximum reasonable worker count
const MAX_WORKERS: usize = 512;

/// Index capacity limits
const MIN_MAX_ENTRIES: usize = 1;
const MAX_MAX_ENTRIES: usize = 10_000_000;

/// File names inside the cache directory
const INDEX_FILE_NAME: &str = "iso_cache.txt";
const FOLDER_HISTORY_FILE_NAME: &str = "folder_history.txt";
const FILTER_HISTORY_FILE_NAME: &str = "filter_history.txt";

/// Discover, index and manage optical disc images
#[derive(Parser, Debug, Clone)]
#[command(
    name = "iso-commander",
    version,
    about = "Discover, index and manage optical disc images",
    long_about = "Finds ISO images (and BIN/IMG/MDF/NRG images to convert) on local disks, \
                  keeps a persistent index of them and runs copy, move, delete and convert \
                  operations on selections of the index.",
    after_help = "EXAMPLES:\n    \
        iso-commander import /mnt/games ~/Downloads\n    \
        iso-commander list --filter 'fantasy;turismo'\n    \
        iso-commander copy '1-3 7' --dest '/mnt/usb;/mnt/backup' --filter ps2\n    \
        iso-commander delete 4 --filter 'Demo'\n    \
        iso-commander convert bin ~/Downloads\n    \
        iso-commander prune"
)]
pub struct CliArgs {
    /// Subcommand
    #[command(subcommand)]
    pub command: Command,

    /// Index file (default: $XDG_CACHE_HOME/iso-commander/iso_cache.txt)
    #[arg(long, global = true, env = "ISO_COMMANDER_INDEX", value_name = "FILE")]
    pub index: Option<PathBuf>,

    /// Number of worker threads
    #[arg(
        short = 'w',
        long,
        global = true,
        env = "ISO_COMMANDER_WORKERS",
        default_value_t = default_workers(),
        value_name = "NUM"
    )]
    pub workers: usize,

    /// Maximum number of paths kept in the index (oldest evicted first)
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_ENTRIES, value_name = "NUM")]
    pub max_entries: usize,

    /// Ignore image files smaller than this many MiB
    #[arg(long, global = true, default_value_t = DEFAULT_MIN_SIZE / (1024 * 1024), value_name = "MIB")]
    pub min_size_mb: u64,

    /// Maximum directory depth (unlimited if not set)
    #[arg(short = 'd', long, global = true, value_name = "NUM")]
    pub max_depth: Option<usize>,

    /// Exclude paths matching pattern (can be repeated)
    #[arg(long = "exclude", global = true, value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long, global = true)]
    pub quiet: bool,

    /// Verbose output (list every message, debug logging)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Scan directories for ISO images and add them to the index
    Import {
        /// Directories to scan
        #[arg(value_name = "DIR", required = true)]
        roots: Vec<PathBuf>,
    },

    /// Re-scan every directory imported before
    AutoImport,

    /// Show the index, optionally filtered
    List {
        /// Filter query, `;`-separated terms (can be repeated to stack)
        #[arg(short = 'f', long = "filter", value_name = "QUERY", action = clap::ArgAction::Append)]
        filters: Vec<String>,
    },

    /// Drop index entries whose files no longer exist
    Prune,

    /// Copy selected images into one or more directories
    Copy(TransferArgs),

    /// Move selected images into one or more directories
    Move(TransferArgs),

    /// Delete selected images
    Delete {
        /// Positions in the (filtered) list, e.g. '1 3-5'
        #[arg(value_name = "SELECTION")]
        selection: String,

        /// Filter query applied before selecting (can be repeated)
        #[arg(short = 'f', long = "filter", value_name = "QUERY", action = clap::ArgAction::Append)]
        filters: Vec<String>,
    },

    /// Convert BIN/IMG, MDF or NRG images to ISO
    Convert {
        /// Source format
        #[arg(value_enum, value_name = "FORMAT")]
        format: ImageFormat,

        /// Directories to scan for images of that format
        #[arg(value_name = "DIR", required = true)]
        roots: Vec<PathBuf>,

        /// Positions among the images found (default: all)
        #[arg(short = 's', long, value_name = "SELECTION")]
        select: Option<String>,

        /// Replace existing .iso outputs
        #[arg(long)]
        overwrite: bool,
    },

    /// Empty the index
    Clear,
}

/// Arguments shared by copy and move
#[derive(clap::Args, Debug, Clone)]
pub struct TransferArgs {
    /// Positions in the (filtered) list, e.g. '1 3-5'
    #[arg(value_name = "SELECTION")]
    pub selection: String,

    /// Destination directories, `;`-separated
    #[arg(short = 'o', long = "dest", value_name = "DIRS")]
    pub destinations: String,

    /// Filter query applied before selecting (can be repeated)
    #[arg(short = 'f', long = "filter", value_name = "QUERY", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,

    /// Replace files that already exist at the destination
    #[arg(long)]
    pub overwrite: bool,
}

fn default_workers() -> usize {
    num_cpus::get().max(1)
}

/// Cache directory: `$XDG_CACHE_HOME/iso-commander` or `~/.cache/iso-commander`
pub fn default_cache_dir() -> Option<PathBuf> {
    let base = env::var_os("XDG_CACHE_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache")))?;
    Some(base.join("iso-commander"))
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Index file path
    pub index_path: PathBuf,

    /// Number of worker threads
    pub worker_count: usize,

    /// Maximum index entries
    pub max_entries: usize,

    /// Minimum image size in bytes
    pub min_size: u64,

    /// Maximum traversal depth
    pub max_depth: Option<usize>,

    /// Compiled exclude patterns
    pub exclude_patterns: Vec<Regex>,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose output
    pub verbose: bool,
}

impl EngineConfig {
    /// Defaults around an explicit index path
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            worker_count: default_workers(),
            max_entries: DEFAULT_MAX_ENTRIES,
            min_size: DEFAULT_MIN_SIZE,
            max_depth: None,
            exclude_patterns: Vec::new(),
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: &CliArgs) -> Result<Self, ConfigError> {
        // Validate worker count
        if args.workers == 0 || args.workers > MAX_WORKERS {
            return Err(ConfigError::InvalidWorkerCount {
                count: args.workers,
                max: MAX_WORKERS,
            });
        }

        // Validate index capacity
        if args.max_entries < MIN_MAX_ENTRIES || args.max_entries > MAX_MAX_ENTRIES {
            return Err(ConfigError::InvalidMaxEntries {
                count: args.max_entries,
                min: MIN_MAX_ENTRIES,
                max: MAX_MAX_ENTRIES,
            });
        }

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // Resolve and validate the index path
        let index_path = match &args.index {
            Some(path) => path.clone(),
            None => default_cache_dir()
                .map(|dir| dir.join(INDEX_FILE_NAME))
                .ok_or_else(|| ConfigError::InvalidIndexPath {
                    path: PathBuf::from(INDEX_FILE_NAME),
                    reason: "neither XDG_CACHE_HOME nor HOME is set; pass --index".to_string(),
                })?,
        };
        if index_path.is_dir() {
            return Err(ConfigError::InvalidIndexPath {
                path: index_path,
                reason: "is a directory".to_string(),
            });
        }

        Ok(Self {
            index_path,
            worker_count: args.workers,
            max_entries: args.max_entries,
            min_size: args.min_size_mb.saturating_mul(1024 * 1024),
            max_depth: args.max_depth,
            exclude_patterns,
            show_progress: !args.quiet,
            verbose: args.verbose,
        })
    }

    /// Traversal options for images of `format`
    pub fn traverse_options(&self, format: ImageFormat) -> TraverseOptions {
        TraverseOptions::convertible(format)
            .with_min_size(self.min_size)
            .with_max_depth(self.max_depth)
            .with_exclude(self.exclude_patterns.clone())
    }

    fn sibling(&self, name: &str) -> PathBuf {
        self.index_path
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(name)
    }

    /// Folder history file, next to the index
    pub fn folder_history_path(&self) -> PathBuf {
        self.sibling(FOLDER_HISTORY_FILE_NAME)
    }

    /// Filter history file, next to the index
    pub fn filter_history_path(&self) -> PathBuf {
        self.sibling(FILTER_HISTORY_FILE_NAME)
    }

    pub fn folder_history_capacity(&self) -> usize {
        FOLDER_HISTORY_CAPACITY
    }

    pub fn filter_history_capacity(&self) -> usize {
        FILTER_HISTORY_CAPACITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("iso-commander").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_parse_import() {
        let args = parse(&["--index", "/tmp/idx.txt", "import", "/a", "/b"]);
        match args.command {
            Command::Import { roots } => assert_eq!(roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]),
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(args.index, Some(PathBuf::from("/tmp/idx.txt")));
    }

    #[test]
    fn test_parse_copy_with_filters() {
        let args = parse(&["copy", "1-3", "--dest", "/x;/y", "-f", "ps2", "-f", "Gran", "--overwrite", "-w", "3"]);
        match args.command {
            Command::Copy(transfer) => {
                assert_eq!(transfer.selection, "1-3");
                assert_eq!(transfer.destinations, "/x;/y");
                assert_eq!(transfer.filters, vec!["ps2", "Gran"]);
                assert!(transfer.overwrite);
            }
            other => panic!("unexpected command: {:?}", other),
        }
        assert_eq!(args.workers, 3);
    }

    #[test]
    fn test_parse_convert_format() {
        let args = parse(&["convert", "mdf", "/isos"]);
        assert!(matches!(args.command, Command::Convert { format: ImageFormat::Mdf, .. }));
    }

    #[test]
    fn test_from_args_validation() {
        let mut args = parse(&["--index", "/tmp/x/idx.txt", "prune"]);
        args.workers = 0;
        assert!(matches!(
            EngineConfig::from_args(&args),
            Err(ConfigError::InvalidWorkerCount { .. })
        ));

        args.workers = 4;
        args.max_entries = 0;
        assert!(matches!(
            EngineConfig::from_args(&args),
            Err(ConfigError::InvalidMaxEntries { .. })
        ));

        args.max_entries = 10;
        args.exclude_patterns = vec!["(".to_string()];
        assert!(matches!(
            EngineConfig::from_args(&args),
            Err(ConfigError::InvalidExcludePattern { .. })
        ));

        args.exclude_patterns = vec![r"\.snapshot".to_string()];
        args.min_size_mb = 2;
        let config = EngineConfig::from_args(&args).unwrap();
        assert_eq!(config.min_size, 2 * 1024 * 1024);
        assert_eq!(config.folder_history_path(), PathBuf::from("/tmp/x/folder_history.txt"));
        assert_eq!(config.filter_history_path(), PathBuf::from("/tmp/x/filter_history.txt"));
    }

    #[test]
    fn test_traverse_options_follow_config() {
        let mut config = EngineConfig::new("/tmp/idx.txt");
        config.min_size = 1;
        config.max_depth = Some(2);
        let options = config.traverse_options(ImageFormat::Bin);
        assert_eq!(options.extensions, vec!["bin", "img"]);
        assert_eq!(options.min_size, 1);
        assert_eq!(options.max_depth, Some(2));
    }
}
