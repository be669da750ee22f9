//! Config module.
//! Provides configuration types, default paths, XML loading, and validation.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

use anyhow::Result;
use tracing::debug;

pub use paths::{default_config_path, default_log_path, path_has_symlink_ancestor};
pub use types::{Config, LogLevel};
pub use validate::{MAX_PATH_LEN, MAX_QUEUE_DEPTH};
pub use xml::{create_template_config, load_config_from_xml_path, parse_config_xml};

/// Environment variable naming the config file (or a directory holding `config.xml`).
pub const CONFIG_ENV: &str = "FM_OFFLOAD_CONFIG";

/// Load the config from the resolved default path. A missing file means defaults.
pub fn load_config() -> Result<Config> {
    let path = default_config_path()?;
    if !path.exists() {
        debug!(path = %path.display(), "no config file; using defaults");
        return Ok(Config::default());
    }
    load_config_from_xml_path(&path)
}
