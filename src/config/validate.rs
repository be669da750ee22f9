//! Config validation logic.
//! Range-checks engine knobs and canonicalizes monitor table paths.

use anyhow::{Result, bail};
use tracing::{debug, info, warn};

use super::types::Config;

pub const MAX_QUEUE_DEPTH: usize = 64;
pub const MIN_CHUNK_SIZE: usize = 64;
pub const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;
pub const MIN_PATH_LEN: usize = 16;
pub const MAX_PATH_LEN: usize = 4096;

impl Config {
    /// Check ranges, then resolve monitor entry paths that exist.
    pub fn validate(&mut self) -> Result<()> {
        if self.queue_depth == 0 || self.queue_depth > MAX_QUEUE_DEPTH {
            bail!(
                "queue_depth must be between 1 and {MAX_QUEUE_DEPTH}, got {}",
                self.queue_depth
            );
        }
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            bail!(
                "chunk_size must be between {MIN_CHUNK_SIZE} and {MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            );
        }
        if !(MIN_PATH_LEN..=MAX_PATH_LEN).contains(&self.max_path_len) {
            bail!(
                "max_path_len must be between {MIN_PATH_LEN} and {MAX_PATH_LEN}, got {}",
                self.max_path_len
            );
        }
        if !(-20..=19).contains(&self.worker_nice) {
            bail!("worker_nice must be between -20 and 19, got {}", self.worker_nice);
        }

        for entry in &mut self.monitor {
            if entry.name.as_os_str().is_empty() {
                bail!("monitor entry with an empty name");
            }
            match dunce::canonicalize(&entry.name) {
                Ok(real) => entry.name = real,
                Err(e) => warn!(path = %entry.name.display(), error = %e, "monitor entry does not resolve yet"),
            }
        }

        debug!(config = ?self, "config validated");
        info!(
            "Config validated: queue_depth={} chunk_size={} yield_every={} max_path_len={} monitor_entries={} log_file='{}'",
            self.queue_depth,
            self.chunk_size,
            self.yield_every,
            self.max_path_len,
            self.monitor.len(),
            self.log_file
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<none>".into())
        );
        Ok(())
    }
}
