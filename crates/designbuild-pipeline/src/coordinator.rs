//! Build Coordinator: drives one build from sequencing to report.

use std::fs;

use designbuild_core::obs::{self, BuildSpan};
use designbuild_core::{
    BuildConfig, BuildError, BuildMonitor, BuildReport, BuildSummary, BuildUnitSequencer,
    RepositoryContext, ResponseStrategy, Result,
};
use tracing::info;

use crate::design_steps::{design_steps, DesignContext};
use crate::pipeline::UnitPipeline;
use crate::trace::TraceIndex;

/// Everything a completed build produced.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub summary: BuildSummary,
    pub report: BuildReport,
    pub index: TraceIndex,
}

pub struct BuildCoordinator<'a> {
    config: &'a BuildConfig,
}

impl<'a> BuildCoordinator<'a> {
    pub fn new(config: &'a BuildConfig) -> Self {
        Self { config }
    }

    /// Sequence units, feed each through the pipeline, then run the
    /// whole-design steps.
    ///
    /// Fatal errors and the fail-fast abort escape as `Err`; everything else
    /// is in the returned report.
    pub fn run(&self) -> Result<BuildOutcome> {
        let config = self.config;
        let build_id = &config.identity.build_id;
        let _span = BuildSpan::enter(build_id);
        let digest = config.digest()?;
        obs::emit_build_started(build_id, &config.paths.workspace_root, &digest, config.fail_fast);

        let log_root = &config.paths.log_root;
        fs::create_dir_all(log_root).map_err(|e| BuildError::io(log_root, e))?;

        let monitor = BuildMonitor::new(ResponseStrategy::from_fail_fast(config.fail_fast));
        let repo = RepositoryContext::new(config.paths.workspace_root.clone(), config.layout.clone());
        let mut pipeline = UnitPipeline::from_config(config)?;

        for unit in BuildUnitSequencer::new(config, &monitor)? {
            let unit = unit?;
            monitor.report_progress(&unit);
            pipeline.process(&unit, config, &monitor, &repo)?;
        }

        let index = pipeline.into_index();
        let mut ctx = DesignContext {
            config,
            monitor: &monitor,
            index: &index,
            artifacts: Vec::new(),
        };
        for mut step in design_steps(config) {
            info!(step = %step.kind(), "running design step");
            step.run(&mut ctx)?;
        }

        let report = monitor.notify_build_end();
        let summary = BuildSummary {
            build_id: build_id.clone(),
            units_processed: report.units_processed,
            nonconformities: report.nonconformities.len(),
            duration_ms: report.duration_ms,
        };
        obs::emit_build_finished(
            build_id,
            summary.duration_ms,
            summary.units_processed,
            summary.nonconformities,
        );
        Ok(BuildOutcome {
            summary,
            report,
            index,
        })
    }
}
