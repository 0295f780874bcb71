//! Stage interface.
//!
//! A stage is a long-lived processing context: it is built once per build,
//! receives one unit at a time in sequencer order, and reports findings only
//! through the monitor. Stages must not assume a unit has a parsed tree or a
//! spec document.

use designbuild_core::{
    BuildConfig, BuildMonitor, BuildUnit, Nonconformity, RepositoryContext, Result, StepKind,
};

use crate::trace::TraceIndex;

/// Everything a stage may touch while accepting a unit.
pub struct StageContext<'a> {
    pub config: &'a BuildConfig,
    pub monitor: &'a BuildMonitor,
    pub repo: &'a RepositoryContext,
    pub index: &'a mut TraceIndex,
}

impl StageContext<'_> {
    /// Report through the monitor; in fail-fast mode the error aborts the
    /// build.
    pub fn report(&self, nc: Nonconformity) -> Result<()> {
        self.monitor.report_nonconformity(nc)
    }
}

/// A per-unit processing stage.
pub trait Stage {
    fn kind(&self) -> StepKind;

    /// Tool name used in nonconformities.
    fn name(&self) -> &str {
        self.kind().name()
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()>;
}
