//! Application orchestrator.
//! Loads/merges config, initializes logging, installs signal handlers, starts the
//! offload engine, submits the requested operation, and reports what came back.

use anyhow::{Context, Result, anyhow, bail};
use crossbeam_channel::Receiver;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use fm_offload::config::{
    CONFIG_ENV, Config, create_template_config, default_config_path, load_config,
    load_config_from_xml_path,
};
use fm_offload::engine::events::{ChannelSink, Notice};
use fm_offload::engine::{FileManager, Severity, Telemetry};
use fm_offload::errors::SubmitError;
use fm_offload::listing::ListingFile;
use fm_offload::monitor::MonitorTable;
use fm_offload::output as out;
use fm_offload::shutdown;

use crate::cli::{Args, Command};
use crate::logging::init_tracing;

/// How often the CLI wakes while waiting on the worker, to notice Ctrl-C.
const POLL_SLICE: Duration = Duration::from_millis(100);

fn config_path(args: &Args) -> Result<PathBuf> {
    match &args.config {
        Some(p) => Ok(p.clone()),
        None => default_config_path(),
    }
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<()> {
    // Config file helpers run before logging init
    match &args.command {
        Command::PrintConfig => {
            if args.config.is_none() && let Ok(cfg_env) = std::env::var(CONFIG_ENV) {
                out::print_info(&format!("Using {CONFIG_ENV} (explicit):\n  {cfg_env}\n"));
            }
            match config_path(&args) {
                Ok(p) => {
                    out::print_info(&format!("fm_offload config path:\n  {}\n", p.display()));
                    if p.exists() {
                        out::print_info("A config file already exists at that location.");
                    } else {
                        out::print_info(
                            "No config file exists there yet. Run `init-config` to create a template.",
                        );
                    }
                }
                Err(e) => {
                    out::print_error(&format!("Could not determine a config path: {e}"));
                }
            }
            return Ok(());
        }
        Command::InitConfig => {
            let path = config_path(&args)?;
            create_template_config(&path)?;
            out::print_success(&format!(
                "A template fm_offload config was written to: {}",
                path.display()
            ));
            return Ok(());
        }
        _ => {}
    }

    let mut cfg = match &args.config {
        Some(p) => load_config_from_xml_path(p)?,
        None => load_config()?,
    };

    // Apply CLI overrides (CLI wins)
    args.apply_overrides(&mut cfg);

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt = init_tracing(&cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {}", e));
        e
    })?;

    // Guard needs to be dropped on SIGINT to flush logs
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; letting the worker finish its current operation...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("install signal handler")?;
    }

    debug!("Starting fm_offload: {:?}", args);

    // Main run (so we can drop guard after)
    let result = (|| -> Result<()> {
        cfg.validate()?;
        match &args.command {
            Command::ShowListing { file } => {
                let listing = ListingFile::read(file)
                    .with_context(|| format!("read listing '{}'", file.display()))?;
                out::print_listing(&listing, args.json);
                Ok(())
            }
            Command::FreeSpace => {
                let table = MonitorTable::new(cfg.monitor.clone());
                let entries = table.report();
                info!(entries = entries.len(), "free space reported");
                out::print_telemetry(&Telemetry::FreeSpace { entries }, args.json);
                Ok(())
            }
            cmd => run_offload(&cfg, cmd, &args),
        }
    })();

    if let Err(e) = &result {
        error!(error = %format!("{e:#}"), "fm_offload failed");
    }

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}

/// Start the engine, queue one operation and print everything it reports.
fn run_offload(cfg: &Config, cmd: &Command, args: &Args) -> Result<()> {
    let (sink, rx) = ChannelSink::new();
    let fm = FileManager::start(cfg.engine_settings(), Arc::new(sink));
    if !fm.is_available() {
        bail!("offload worker could not be started");
    }

    let submitted: Result<u64, SubmitError> = match cmd {
        Command::Raw { code, args: raw } => {
            let refs: Vec<&str> = raw.iter().map(String::as_str).collect();
            fm.submit_raw(*code, &refs)
        }
        other => {
            let request = other
                .to_request()
                .ok_or_else(|| anyhow!("{other:?} does not queue an operation"))?;
            fm.submit(request)
        }
    };

    let mut failed = false;
    let finished = match &submitted {
        Ok(seq) => {
            debug!(seq, "waiting for worker");
            wait_for_worker(&fm, &rx, Duration::from_secs(args.timeout), args.json, &mut failed)
        }
        Err(e) => {
            warn!(code = e.code(), error = %e, "request rejected");
            true
        }
    };

    fm.shutdown();
    failed |= print_notices(&rx, args.json);

    let hk = fm.housekeeping();
    info!(
        commands = hk.command_count,
        rejected = hk.command_error_count,
        succeeded = hk.worker.success_count,
        failed = hk.worker.error_count,
        warnings = hk.worker.warning_count,
        "housekeeping"
    );

    if let Err(e) = submitted {
        return Err(anyhow::Error::new(e).context("request rejected"));
    }
    if hk.worker.terminated {
        bail!("offload worker terminated");
    }
    if !finished {
        bail!("worker did not finish within {}s", args.timeout);
    }
    if failed {
        bail!("operation failed");
    }
    Ok(())
}

/// Wait for the worker to drain, printing notices as they arrive. Returns
/// false if the deadline passed or an interrupt arrived first.
fn wait_for_worker(
    fm: &FileManager,
    rx: &Receiver<Notice>,
    timeout: Duration,
    json: bool,
    failed: &mut bool,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        let done = fm.drain(POLL_SLICE);
        *failed |= print_notices(rx, json);
        if done {
            return true;
        }
        if fm.worker_state().terminated {
            return false;
        }
        if shutdown::is_requested() || Instant::now() >= deadline {
            return false;
        }
    }
}

/// Print whatever is waiting on the channel. Returns true if any of it was an
/// error or critical event.
fn print_notices(rx: &Receiver<Notice>, json: bool) -> bool {
    let mut failed = false;
    for notice in rx.try_iter() {
        match notice {
            Notice::Event(ev) => {
                failed |= matches!(ev.severity, Severity::Error | Severity::Critical);
                out::print_event(&ev, json);
            }
            Notice::Telemetry(record) => out::print_telemetry(&record, json),
        }
    }
    failed
}
