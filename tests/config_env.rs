use assert_fs::TempDir;
use assert_fs::prelude::*;
use serial_test::serial;
use std::fs;
use tempfile::tempdir;

use fm_offload::config::{
    CONFIG_ENV, Config, create_template_config, default_config_path, load_config,
    parse_config_xml,
};
use fm_offload::monitor::MonitorKind;

fn set_env(value: &std::path::Path) {
    unsafe {
        std::env::set_var(CONFIG_ENV, value);
    }
}

fn clear_env() {
    unsafe {
        std::env::remove_var(CONFIG_ENV);
    }
}

#[test]
#[serial]
fn env_file_is_loaded() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("custom.xml");
    fs::write(
        &cfg_path,
        "<config>\n  <queue_depth>5</queue_depth>\n  <log_level>debug</log_level>\n</config>\n",
    )
    .unwrap();
    set_env(&cfg_path);

    assert_eq!(default_config_path().unwrap(), cfg_path);
    let cfg = load_config().unwrap();
    assert_eq!(cfg.queue_depth, 5);
    assert_eq!(cfg.log_level, fm_offload::LogLevel::Debug);
    assert_eq!(cfg.chunk_size, Config::default().chunk_size);

    clear_env();
}

#[test]
#[serial]
fn env_directory_gets_config_xml() {
    let td = tempdir().unwrap();
    set_env(td.path());
    assert_eq!(default_config_path().unwrap(), td.path().join("config.xml"));
    // Nothing written there yet: defaults.
    assert_eq!(load_config().unwrap(), Config::default());
    clear_env();
}

#[test]
#[serial]
fn malformed_env_file_is_an_error() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("bad.xml");
    fs::write(&cfg_path, "<config><queue_depth>3</config>").unwrap();
    set_env(&cfg_path);
    assert!(load_config().is_err());
    clear_env();
}

#[test]
fn template_round_trips_and_validates() {
    let td = TempDir::new().unwrap();
    let path = td.path().join("nested").join("config.xml");
    create_template_config(&path).unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let mut cfg = parse_config_xml(&text).unwrap();
    let d = Config::default();
    assert_eq!(cfg.queue_depth, d.queue_depth);
    assert_eq!(cfg.max_path_len, d.max_path_len);
    assert_eq!(cfg.yield_sleep, d.yield_sleep);
    assert_eq!(cfg.monitor.len(), 1);
    assert_eq!(cfg.monitor[0].kind, MonitorKind::Volume);
    cfg.validate().unwrap();

    // Never overwrites.
    assert!(create_template_config(&path).is_err());
}

#[cfg(unix)]
#[test]
fn template_is_private() {
    use std::os::unix::fs::PermissionsExt;
    let td = TempDir::new().unwrap();
    let path = td.path().join("cfg").join("config.xml");
    create_template_config(&path).unwrap();
    let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);
}

#[test]
fn out_of_range_values_fail_validation() {
    let mut cfg = parse_config_xml("<config><max_path_len>8</max_path_len></config>").unwrap();
    let err = cfg.validate().unwrap_err();
    assert!(err.to_string().contains("max_path_len"));

    let mut cfg = parse_config_xml("<config><queue_depth>65</queue_depth></config>").unwrap();
    assert!(cfg.validate().is_err());
}

#[test]
fn monitor_entries_resolve_to_canonical_paths() {
    let td = TempDir::new().unwrap();
    let root = dunce::canonicalize(td.path()).unwrap();
    let logs = td.child("logs");
    logs.create_dir_all().unwrap();
    let cfg_file = td.child("config.xml");
    cfg_file
        .write_str(&format!(
            "<config><monitor>\
               <entry><name>{}/./logs</name><kind>directory</kind></entry>\
               <entry><name>{}/not_yet</name><kind>volume</kind></entry>\
             </monitor></config>",
            root.display(),
            root.display()
        ))
        .unwrap();

    let mut cfg = parse_config_xml(&fs::read_to_string(cfg_file.path()).unwrap()).unwrap();
    cfg.validate().unwrap();
    assert_eq!(cfg.monitor[0].name, root.join("logs"));
    assert_eq!(cfg.monitor[0].kind, MonitorKind::Directory);
    // Missing entries are kept as written.
    assert_eq!(cfg.monitor[1].name, root.join("not_yet"));
}
