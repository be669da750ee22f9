use owo_colors::OwoColorize;
use serde::Serialize;

use crate::engine::events::{Event, Severity, Telemetry};
use crate::listing::ListingFile;

/// Small wrapper around stdout/stderr printing to provide consistent, colored
/// user-facing messages. Colors are enabled only when output is a TTY.
fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {}", msg);
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {}", msg);
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {}", msg);
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {}", msg);
    }
}

/// Print a plain user-facing line (no prefix). Use this for primary outputs
/// such as listing rows which users may script against.
pub fn print_user(msg: &str) {
    println!("{}", msg);
}

/// One JSON document per line on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => print_error(&format!("could not encode output as JSON: {e}")),
    }
}

/// Print an engine event, prefixed by severity.
pub fn print_event(event: &Event, json: bool) {
    if json {
        return print_json(event);
    }
    let text = event.to_string();
    match event.severity {
        Severity::Info => print_success(&text),
        Severity::Warning => print_warn(&text),
        Severity::Error | Severity::Critical => print_error(&text),
    }
}

/// Print a telemetry record as JSON or as tab-separated rows.
pub fn print_telemetry(record: &Telemetry, json: bool) {
    if json {
        return print_json(record);
    }
    match record {
        Telemetry::DirListing(pkt) => {
            print_info(&format!(
                "{}: {} entries, showing {} from offset {}",
                pkt.directory.display(),
                pkt.total_entries,
                pkt.entries.len(),
                pkt.first_offset
            ));
            for e in &pkt.entries {
                print_user(&format!("{}\t{}\t{}\t{:o}", e.name, e.size, e.mtime, e.mode));
            }
        }
        Telemetry::FileInfo(info) => {
            let crc = match (info.crc_algorithm, info.crc_computed) {
                (Some(alg), true) => format!(" {:?}=0x{:08x}", alg, info.crc),
                _ => String::new(),
            };
            print_user(&format!(
                "{}\t{}\tsize={}\tmtime={}\tmode={:o}{}",
                info.path.display(),
                info.state,
                info.size,
                info.mtime,
                info.mode,
                crc
            ));
        }
        Telemetry::FreeSpace { entries } => {
            for e in entries {
                let bytes = e.bytes.map(|b| b.to_string()).unwrap_or_else(|| "?".into());
                let files = e.files.map(|f| f.to_string()).unwrap_or_else(|| "-".into());
                print_user(&format!("{}\t{:?}\t{}\t{}", e.name.display(), e.kind, bytes, files));
            }
        }
    }
}

/// Print a decoded listing file.
pub fn print_listing(listing: &ListingFile, json: bool) {
    if json {
        return print_json(listing);
    }
    print_info(&format!(
        "{} ({}): {} entries, {} rows",
        listing.stats.directory,
        listing.header.description,
        listing.stats.dir_entries,
        listing.stats.file_entries
    ));
    for e in &listing.rows {
        print_user(&format!("{}\t{}\t{}\t{:o}", e.name, e.size, e.mtime, e.mode));
    }
}
