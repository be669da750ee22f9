//! Operation handlers, run on the worker thread.
//!
//! Each handler returns the completion message on success or the first failing
//! primitive as an [`OpError`]. Warnings go through [`HandlerContext::warn`] and
//! are counted separately from the success/failure outcome.

pub mod dir;
pub mod file;
pub mod info;
pub mod listing;

use crate::classify::Classifier;
use crate::engine::EngineSettings;
use crate::engine::events::{Event, EventId, Reporter, Severity, Telemetry};
use crate::engine::record::{Operation, OperationKind};
use crate::engine::yield_point::CooperativeYield;
use crate::errors::OpError;
use crate::fs_ops::{Decompressor, LoopTuning};

pub(crate) type HandlerResult = Result<String, OpError>;

/// Everything a handler may touch while it runs.
pub(crate) struct HandlerContext<'a> {
    pub settings: &'a EngineSettings,
    pub classifier: &'a dyn Classifier,
    pub codec: &'a dyn Decompressor,
    pub yielder: &'a dyn CooperativeYield,
    pub reporter: &'a Reporter,
    pub kind: OperationKind,
    warnings: u64,
}

impl<'a> HandlerContext<'a> {
    pub(crate) fn new(
        settings: &'a EngineSettings,
        classifier: &'a dyn Classifier,
        codec: &'a dyn Decompressor,
        yielder: &'a dyn CooperativeYield,
        reporter: &'a Reporter,
        kind: OperationKind,
    ) -> Self {
        Self {
            settings,
            classifier,
            codec,
            yielder,
            reporter,
            kind,
            warnings: 0,
        }
    }

    pub(crate) fn warn(&mut self, id: EventId, message: String) {
        self.warnings += 1;
        self.reporter
            .emit(Event::new(id, Severity::Warning, Some(self.kind), message));
    }

    /// Error event that does not change any counter.
    pub(crate) fn report_error(&self, id: EventId, message: String) {
        self.reporter
            .emit(Event::new(id, Severity::Error, Some(self.kind), message));
    }

    pub(crate) fn telemetry(&self, record: Telemetry) {
        self.reporter.telemetry(record);
    }

    pub(crate) fn tuning(&self) -> LoopTuning {
        self.settings.tuning()
    }

    pub(crate) fn warnings(&self) -> u64 {
        self.warnings
    }
}

/// Route an operation to its handler.
pub(crate) fn dispatch(ctx: &mut HandlerContext<'_>, op: Operation) -> HandlerResult {
    match op {
        Operation::Copy {
            source,
            target,
            overwrite,
        } => file::copy(ctx, &source, &target, overwrite),
        Operation::Move {
            source,
            target,
            overwrite,
        } => file::move_file(ctx, &source, &target, overwrite),
        Operation::Rename { source, target } => file::rename(ctx, &source, &target),
        Operation::Delete { path } => file::delete(ctx, &path),
        Operation::DeleteAll { directory } => dir::delete_all(ctx, &directory),
        Operation::Decompress { source, target } => file::decompress(ctx, &source, &target),
        Operation::Concatenate {
            source1,
            source2,
            target,
        } => file::concatenate(ctx, &source1, &source2, &target),
        Operation::CreateDirectory { path } => dir::create_directory(ctx, &path),
        Operation::DeleteDirectory { path } => dir::delete_directory(ctx, &path),
        Operation::SetPermissions { path, mode } => file::set_permissions(ctx, &path, mode),
        Operation::GetFileInfo {
            path,
            crc,
            snapshot,
        } => info::get_file_info(ctx, &path, crc, snapshot),
        Operation::DirListToPacket {
            directory,
            offset,
            query_stats,
        } => listing::list_to_packet(ctx, &directory, offset, query_stats),
        Operation::DirListToFile {
            directory,
            output,
            query_stats,
        } => listing::list_to_file(ctx, &directory, &output, query_stats),
    }
}
