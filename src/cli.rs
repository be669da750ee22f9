//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Each subcommand maps to one queued operation, except the local helpers
//!   (free-space, show-listing, print-config, init-config).
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::PathBuf;

use fm_offload::config::{Config, LogLevel};
use fm_offload::engine::Request;

/// Queue file operations to a low-priority worker and report the outcome.
/// CLI flags override config values (which are loaded from XML if present).
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Onboard file manager: offload file and directory operations to a background worker"
)]
pub struct Args {
    /// Config file to use instead of FM_OFFLOAD_CONFIG / the default location.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true, help = "Enable debug logging (shorthand for --log-level debug)")]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Also write logs to this file.
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub log_file: Option<PathBuf>,

    /// Emit logs, events and telemetry as JSON.
    #[arg(long, global = true, help = "Emit logs, events and telemetry as JSON")]
    pub json: bool,

    /// Seconds to wait for the worker to finish the queued operation.
    #[arg(long, global = true, default_value_t = 60)]
    pub timeout: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy a closed file.
    Copy {
        source: PathBuf,
        target: PathBuf,
        /// Replace an existing closed target file.
        #[arg(long)]
        overwrite: bool,
    },
    /// Move a closed file, across filesystems if needed.
    Move {
        source: PathBuf,
        target: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Rename a closed file within its filesystem.
    Rename { source: PathBuf, target: PathBuf },
    /// Delete a closed file.
    Delete { path: PathBuf },
    /// Delete every closed file directly inside a directory.
    DeleteAll { directory: PathBuf },
    /// Decompress a gzip file.
    Decompress { source: PathBuf, target: PathBuf },
    /// Write SOURCE1 followed by SOURCE2 into a new TARGET.
    Concat {
        source1: PathBuf,
        source2: PathBuf,
        target: PathBuf,
    },
    /// Create a directory.
    Mkdir { path: PathBuf },
    /// Remove an empty directory.
    Rmdir { path: PathBuf },
    /// Set permission bits (octal).
    Chmod {
        path: PathBuf,
        #[arg(value_parser = parse_octal)]
        mode: u32,
    },
    /// Report state, size, time, mode and optionally a CRC.
    Info {
        path: PathBuf,
        /// 0 = none, 1 = CRC-8, 2 = CRC-16, 3 = CRC-32
        #[arg(long, default_value_t = 0)]
        crc: u8,
    },
    /// List one page of a directory.
    List {
        directory: PathBuf,
        /// Entries to skip before the page starts.
        #[arg(long, default_value_t = 0)]
        offset: u32,
        /// Include size, time and mode.
        #[arg(long)]
        stats: bool,
    },
    /// Write a directory listing file.
    ListToFile {
        directory: PathBuf,
        output: PathBuf,
        #[arg(long)]
        stats: bool,
    },
    /// Submit a numeric command code with positional arguments.
    Raw {
        code: u16,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Report free space for the monitor table.
    FreeSpace,
    /// Decode and print a listing file.
    ShowListing { file: PathBuf },
    /// Print the config file location, then exit.
    PrintConfig,
    /// Write a template config file, then exit.
    InitConfig,
}

fn parse_octal(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0o");
    u32::from_str_radix(digits, 8).map_err(|_| format!("'{s}' is not an octal mode"))
}

impl Command {
    /// The engine request this subcommand submits, if it submits one.
    pub fn to_request(&self) -> Option<Request> {
        let req = match self.clone() {
            Command::Copy {
                source,
                target,
                overwrite,
            } => Request::Copy {
                source,
                target,
                overwrite,
            },
            Command::Move {
                source,
                target,
                overwrite,
            } => Request::Move {
                source,
                target,
                overwrite,
            },
            Command::Rename { source, target } => Request::Rename { source, target },
            Command::Delete { path } => Request::Delete { path },
            Command::DeleteAll { directory } => Request::DeleteAll { directory },
            Command::Decompress { source, target } => Request::Decompress { source, target },
            Command::Concat {
                source1,
                source2,
                target,
            } => Request::Concatenate {
                source1,
                source2,
                target,
            },
            Command::Mkdir { path } => Request::CreateDirectory { path },
            Command::Rmdir { path } => Request::DeleteDirectory { path },
            Command::Chmod { path, mode } => Request::SetPermissions { path, mode },
            Command::Info { path, crc } => Request::GetFileInfo { path, crc },
            Command::List {
                directory,
                offset,
                stats,
            } => Request::DirListToPacket {
                directory,
                offset,
                query_stats: stats,
            },
            Command::ListToFile {
                directory,
                output,
                stats,
            } => Request::DirListToFile {
                directory,
                output,
                query_stats: stats,
            },
            Command::Raw { .. }
            | Command::FreeSpace
            | Command::ShowListing { .. }
            | Command::PrintConfig
            | Command::InitConfig => return None,
        };
        Some(req)
    }
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        if let Some(lf) = &self.log_file {
            cfg.log_file = Some(lf.clone());
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
