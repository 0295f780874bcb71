//! Structured observability hooks for build and metabuild lifecycle events.
//!
//! - `BuildSpan` RAII guard tagging every event with the build id
//! - `emit_*` functions for lifecycle events
//!
//! Events are emitted at `info!` level unless noted.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::nonconformity::Nonconformity;

/// RAII guard that enters a build-scoped tracing span.
///
/// ```ignore
/// let _span = BuildSpan::enter("20260101T120000-1a2b3c4d");
/// ```
pub struct BuildSpan {
    _span: tracing::span::EnteredSpan,
}

impl BuildSpan {
    pub fn enter(build_id: &str) -> Self {
        let span = tracing::info_span!("designbuild.build", build_id = %build_id);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: build started, with the config digest for reproducibility.
pub fn emit_build_started(build_id: &str, workspace: &Path, digest: &str, fail_fast: bool) {
    info!(
        event = "build.started",
        build_id = %build_id,
        workspace = %workspace.display(),
        config_digest = %digest,
        fail_fast = fail_fast,
    );
}

/// Emit event: build finished.
pub fn emit_build_finished(build_id: &str, duration_ms: u64, units: usize, nonconformities: usize) {
    info!(
        event = "build.finished",
        build_id = %build_id,
        duration_ms = duration_ms,
        units = units,
        nonconformities = nonconformities,
    );
}

/// Emit event: a unit entered the pipeline.
pub fn emit_unit_processed(path: &Path, seq: usize) {
    info!(event = "unit.processed", path = %path.display(), seq = seq);
}

/// Emit event: nonconformity reported (warning level).
pub fn emit_nonconformity(nc: &Nonconformity) {
    warn!(
        event = "nonconformity.reported",
        tool = %nc.tool,
        msg_id = %nc.msg_id,
        location = %nc.location(),
        msg = %nc.msg,
    );
}

/// Emit event: metabuild state transition.
pub fn emit_phase(phase: &str, target: Option<&str>) {
    info!(event = "metabuild.phase", phase = %phase, target = target.unwrap_or("-"));
}

/// Emit event: repository rolled back after a failure (warning level).
pub fn emit_rollback(baseline: &str, error: &dyn std::fmt::Display) {
    warn!(event = "metabuild.rollback", baseline = %baseline, error = %error);
}

/// Emit event: subsidiary build process launched.
pub fn emit_subsidiary_launched(build_id: &str, workspace: &Path) {
    info!(
        event = "subsidiary.launched",
        build_id = %build_id,
        workspace = %workspace.display(),
    );
}

/// Emit event: subsidiary build result collected.
pub fn emit_subsidiary_collected(build_id: &str, completed: bool) {
    info!(event = "subsidiary.collected", build_id = %build_id, completed = completed);
}
