//! The offload worker.
//!
//! Runs at reduced priority, blocks on the handshake signal, executes one record
//! at a time and keeps the shared counters. Any inconsistency in the handshake
//! itself stops the worker for good and marks the queue unavailable.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info};

use crate::classify::Classifier;
use crate::engine::EngineSettings;
use crate::engine::events::{Event, EventId, Reporter, Severity};
use crate::engine::handlers::{self, HandlerContext};
use crate::engine::queue::{HandshakeQueue, Wake};
use crate::engine::record::{OperationKind, QueueRecord};
use crate::engine::yield_point::CooperativeYield;
use crate::errors::FatalError;
use crate::fs_ops::Decompressor;

/// Counters and progress owned by the worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerState {
    pub success_count: u64,
    pub error_count: u64,
    pub warning_count: u64,
    pub current: Option<OperationKind>,
    pub previous: Option<OperationKind>,
    /// Records taken off the queue and finished.
    pub processed: u64,
    pub terminated: bool,
}

/// Worker state behind a lock, with a condvar for anyone waiting on progress.
#[derive(Debug, Default)]
pub(crate) struct StatusBoard {
    state: Mutex<WorkerState>,
    changed: Condvar,
}

impl StatusBoard {
    pub(crate) fn update(&self, f: impl FnOnce(&mut WorkerState)) {
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut st);
        self.changed.notify_all();
    }

    pub(crate) fn snapshot(&self) -> WorkerState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block until `done` holds or `timeout` passes. Returns whether `done` held.
    pub(crate) fn wait_until(&self, timeout: Duration, done: impl Fn(&WorkerState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        while !done(&st) {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            st = match self.changed.wait_timeout(st, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }
}

pub(crate) struct Worker {
    pub(crate) queue: Arc<HandshakeQueue>,
    pub(crate) status: Arc<StatusBoard>,
    pub(crate) settings: EngineSettings,
    pub(crate) classifier: Arc<dyn Classifier>,
    pub(crate) codec: Arc<dyn Decompressor>,
    pub(crate) yielder: Arc<dyn CooperativeYield>,
    pub(crate) reporter: Reporter,
}

impl Worker {
    pub(crate) fn run(self) {
        lower_priority(self.settings.worker_nice);
        info!(depth = self.queue.depth(), "offload worker started");

        loop {
            match self.queue.wait_for_work() {
                Ok(Wake::Work) => {}
                Ok(Wake::Closed) => break,
                Err(fatal) => return self.terminate(fatal),
            }
            let record = match self.queue.take_next() {
                Ok(r) => r,
                Err(fatal) => return self.terminate(fatal),
            };
            let kind = record.operation.kind();
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| self.execute(record))) {
                return self.terminate(FatalError::HandlerPanicked {
                    op: kind.to_string(),
                    message: panic_message(payload.as_ref()),
                });
            }
        }

        self.queue.set_available(false);
        info!("offload worker stopped");
    }

    fn execute(&self, record: QueueRecord) {
        let kind = record.operation.kind();
        debug!(seq = record.sequence, op = %kind, path = %record.operation.primary_path().display(), "executing");
        self.status.update(|s| s.current = Some(kind));

        let mut ctx = HandlerContext::new(
            &self.settings,
            self.classifier.as_ref(),
            self.codec.as_ref(),
            self.yielder.as_ref(),
            &self.reporter,
            kind,
        );
        let result = handlers::dispatch(&mut ctx, record.operation);
        let warnings = ctx.warnings();

        let ok = match result {
            Ok(message) => {
                self.reporter
                    .emit(Event::new(EventId::Completed, Severity::Info, Some(kind), message));
                true
            }
            Err(e) => {
                self.reporter.emit(Event::new(
                    EventId::Failed,
                    Severity::Error,
                    Some(kind),
                    format!("{kind} command failed: {e}"),
                ));
                false
            }
        };

        self.status.update(|s| {
            if ok {
                s.success_count += 1;
            } else {
                s.error_count += 1;
            }
            s.warning_count += warnings;
            s.previous = Some(kind);
            s.current = None;
            s.processed += 1;
        });
    }

    fn terminate(&self, fatal: FatalError) {
        self.queue.close();
        error!(error = %fatal, "offload worker exiting; offload disabled");
        let notice = Event::new(
            EventId::WorkerTerminated,
            Severity::Critical,
            None,
            format!("offload worker terminated: {fatal}"),
        );
        // The sink may be what panicked.
        let _ = catch_unwind(AssertUnwindSafe(|| self.reporter.emit(notice)));
        self.status.update(|s| {
            s.current = None;
            s.terminated = true;
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(target_os = "linux")]
fn lower_priority(nice: i32) {
    if nice <= 0 {
        return;
    }
    // With PRIO_PROCESS and who = 0, Linux applies the nice value to the calling thread.
    let rc = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, nice) };
    if rc != 0 {
        debug!(nice, error = %std::io::Error::last_os_error(), "could not lower worker priority");
    }
}

#[cfg(not(target_os = "linux"))]
fn lower_priority(nice: i32) {
    debug!(nice, "worker priority left unchanged on this platform");
}
