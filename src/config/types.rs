//! Core configuration types.
//! - Config holds engine and logging settings with flight-like defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::monitor::MonitorEntry;

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Warnings and completion events (default)
    #[default]
    Normal,
    /// Everything the engine reports
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" | "warn" => Some(LogLevel::Normal),
            "info" | "verbose" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Handshake queue slots
    pub queue_depth: usize,
    /// Bytes per read in copy/concat/CRC loops
    pub chunk_size: usize,
    /// Chunks or directory entries between cooperative yields
    pub yield_every: u32,
    pub yield_sleep: Duration,
    /// Path length limit in bytes (exclusive); also the listing name field width
    pub max_path_len: usize,
    /// Nice value applied to the worker thread
    pub worker_nice: i32,
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// Free-space monitor table
    pub monitor: Vec<MonitorEntry>,
}

impl Default for Config {
    fn default() -> Self {
        let engine = EngineSettings::default();
        Self {
            queue_depth: engine.queue_depth,
            chunk_size: engine.chunk_size,
            yield_every: engine.yield_every,
            yield_sleep: engine.yield_sleep,
            max_path_len: engine.max_path_len,
            worker_nice: engine.worker_nice,
            log_level: LogLevel::Normal,
            log_file: None,
            monitor: Vec::new(),
        }
    }
}

impl Config {
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            queue_depth: self.queue_depth,
            chunk_size: self.chunk_size,
            yield_every: self.yield_every,
            yield_sleep: self.yield_sleep,
            max_path_len: self.max_path_len,
            worker_nice: self.worker_nice,
        }
    }
}
