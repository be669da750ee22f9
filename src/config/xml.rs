//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Writes a commented template on request (`init-config`).
//!
//! Unknown XML fields are a hard error so misconfigurations surface early.

use anyhow::{Context, Result, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::paths::{default_log_path, path_has_symlink_ancestor};
use crate::config::types::{Config, LogLevel};
use crate::fs_ops::helpers::io_error_with_help;
use crate::monitor::{MonitorEntry, MonitorKind};

/// Struct mirroring the XML config for deserialization.
#[derive(Debug, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    queue_depth: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    chunk_size: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    yield_every: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    yield_sleep_ms: Option<u64>,
    #[serde(default, deserialize_with = "de_u64_trimmed_opt")]
    max_path_len: Option<u64>,
    #[serde(default, deserialize_with = "de_i64_trimmed_opt")]
    worker_nice: Option<i64>,
    log_level: Option<String>,
    log_file: Option<String>,
    monitor: Option<XmlMonitor>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlMonitor {
    #[serde(rename = "entry", default)]
    entries: Vec<XmlMonitorEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlMonitorEntry {
    name: String,
    kind: String,
    enabled: Option<bool>,
}

// Custom deserializers that trim surrounding whitespace; unparsable values fall back to defaults.
fn de_u64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<u64>().ok()))
}

fn de_i64_trimmed_opt<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let opt: Option<String> = Option::deserialize(deserializer)?;
    Ok(opt.and_then(|s| s.trim().parse::<i64>().ok()))
}

fn parse_kind(raw: &str) -> Result<MonitorKind> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "volume" => Ok(MonitorKind::Volume),
        "directory" | "dir" => Ok(MonitorKind::Directory),
        other => bail!("unknown monitor kind '{other}' (expected volume or directory)"),
    }
}

// Map XmlConfig -> Config; absent or unparsable fields keep their defaults.
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();

    if let Some(v) = parsed.queue_depth {
        cfg.queue_depth = v as usize;
    }
    if let Some(v) = parsed.chunk_size {
        cfg.chunk_size = v as usize;
    }
    if let Some(v) = parsed.yield_every {
        cfg.yield_every = v.min(u32::MAX as u64) as u32;
    }
    if let Some(v) = parsed.yield_sleep_ms {
        cfg.yield_sleep = Duration::from_millis(v);
    }
    if let Some(v) = parsed.max_path_len {
        cfg.max_path_len = v as usize;
    }
    if let Some(v) = parsed.worker_nice {
        cfg.worker_nice = v.clamp(i32::MIN as i64, i32::MAX as i64) as i32;
    }
    if let Some(s) = parsed.log_level.as_deref() {
        if let Ok(level) = s.trim().parse::<LogLevel>() {
            cfg.log_level = level;
        }
    }
    if let Some(s) = parsed.log_file.as_deref() {
        let trimmed = s.trim();
        if !trimmed.is_empty() {
            cfg.log_file = Some(PathBuf::from(trimmed));
        }
    }
    if let Some(m) = parsed.monitor {
        for e in m.entries {
            cfg.monitor.push(MonitorEntry {
                name: PathBuf::from(e.name.trim()),
                kind: parse_kind(&e.kind)?,
                enabled: e.enabled.unwrap_or(true),
            });
        }
    }

    Ok(cfg)
}

/// Parse config XML text.
pub fn parse_config_xml(contents: &str) -> Result<Config> {
    let parsed: XmlConfig = from_xml_str(contents).context("parse config xml")?;
    xml_to_config(parsed)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    debug!(path = %path.display(), "loading config");
    parse_config_xml(&contents).with_context(|| format!("config file '{}'", path.display()))
}

/// Write the commented default template to `path`. Refuses to follow a symlinked
/// ancestor and never overwrites an existing file.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error_with_help("create config dir", parent))?;
        set_dir_mode_0700(parent);
    }

    let d = Config::default();
    let suggested_log = default_log_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "/path/to/fm_offload.log".into());

    let content = format!(
        "<!--\n  fm_offload configuration (XML)\n\n    queue_depth     -> handshake queue slots (1..=64)\n    chunk_size      -> bytes per read in copy/concat/CRC loops\n    yield_every     -> chunks or entries between cooperative yields (0 = never)\n    yield_sleep_ms  -> how long each yield sleeps (0 = plain thread yield)\n    max_path_len    -> path limit in bytes, exclusive\n    worker_nice     -> nice value for the worker thread (Linux)\n    log_level       -> quiet | normal | info | debug\n    log_file        -> path to log file (optional; stdout/stderr still used)\n    monitor/entry   -> free-space table: name, kind (volume|directory), enabled\n\n  CLI flags override XML values.\n-->\n<config>\n  <queue_depth>{}</queue_depth>\n  <chunk_size>{}</chunk_size>\n  <yield_every>{}</yield_every>\n  <yield_sleep_ms>{}</yield_sleep_ms>\n  <max_path_len>{}</max_path_len>\n  <worker_nice>{}</worker_nice>\n  <log_level>normal</log_level>\n  <log_file>{}</log_file>\n  <monitor>\n    <entry>\n      <name>/</name>\n      <kind>volume</kind>\n      <enabled>true</enabled>\n    </entry>\n  </monitor>\n</config>\n",
        d.queue_depth,
        d.chunk_size,
        d.yield_every,
        d.yield_sleep.as_millis(),
        d.max_path_len,
        d.worker_nice,
        suggested_log,
    );

    write_new_0600(path, content.as_bytes())
        .map_err(io_error_with_help("write config template", path))?;

    info!("Created template config at {}", path.display());
    Ok(())
}

#[cfg(unix)]
fn write_new_0600(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut f = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .custom_flags(libc::O_NOFOLLOW)
        .open(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

#[cfg(not(unix))]
fn write_new_0600(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    let mut f = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    f.write_all(bytes)?;
    f.sync_all()
}

#[cfg(unix)]
fn set_dir_mode_0700(dir: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let _ = fs::set_permissions(dir, fs::Permissions::from_mode(0o700));
}

#[cfg(not(unix))]
fn set_dir_mode_0700(_dir: &Path) {}
