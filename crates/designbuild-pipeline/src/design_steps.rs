//! Whole-design steps, run once after every unit has been processed.

use std::fs;
use std::path::PathBuf;

use chrono::{Duration, Utc};
use designbuild_core::{cms, BuildConfig, BuildError, BuildMonitor, Nonconformity, Result, StepKind};
use serde_json::json;
use tracing::{debug, info};

use crate::trace::TraceIndex;

pub const TRACEABILITY_FILE: &str = "traceability.json";
pub const UNTESTED_REQUIREMENT: &str = "untested-requirement";

pub struct DesignContext<'a> {
    pub config: &'a BuildConfig,
    pub monitor: &'a BuildMonitor,
    pub index: &'a TraceIndex,
    /// Files produced by earlier steps, registered by the CMS step.
    pub artifacts: Vec<PathBuf>,
}

pub trait DesignStep {
    fn kind(&self) -> StepKind;

    fn run(&mut self, ctx: &mut DesignContext<'_>) -> Result<()>;
}

/// Enabled whole-design steps, in policy order.
pub fn design_steps(config: &BuildConfig) -> Vec<Box<dyn DesignStep>> {
    StepKind::DESIGN_STEPS
        .into_iter()
        .filter(|kind| config.is_enabled(*kind))
        .map(|kind| match kind {
            StepKind::CmsRegistration => Box::new(CmsRegistrationStep) as Box<dyn DesignStep>,
            _ => Box::new(TraceReportStep),
        })
        .collect()
}

/// Writes the traceability index and reports requirement ids that no spec
/// document mentions.
#[derive(Debug, Default)]
pub struct TraceReportStep;

impl DesignStep for TraceReportStep {
    fn kind(&self) -> StepKind {
        StepKind::TraceReport
    }

    fn run(&mut self, ctx: &mut DesignContext<'_>) -> Result<()> {
        let untested = ctx.index.untested();
        for id in &untested {
            let Some(site) = ctx.index.sites(id).first() else {
                continue;
            };
            ctx.monitor.report_nonconformity(
                Nonconformity::new(
                    self.kind().name(),
                    UNTESTED_REQUIREMENT,
                    format!("requirement {id} is not referenced by any spec document"),
                    &site.path,
                )
                .at_line(site.line),
            )?;
        }

        let log_root = &ctx.config.paths.log_root;
        fs::create_dir_all(log_root).map_err(|e| BuildError::io(log_root, e))?;
        let path = log_root.join(TRACEABILITY_FILE);
        let report = json!({
            "build_id": ctx.config.identity.build_id,
            "requirements": ctx.index,
            "untested": untested,
        });
        let bytes = serde_json::to_vec_pretty(&report)?;
        fs::write(&path, bytes).map_err(|e| BuildError::io(&path, e))?;
        info!(path = %path.display(), requirements = ctx.index.len(), "wrote traceability report");
        ctx.artifacts.push(path);
        Ok(())
    }
}

/// Registers the build's artifacts for retention.
#[derive(Debug, Default)]
pub struct CmsRegistrationStep;

impl DesignStep for CmsRegistrationStep {
    fn kind(&self) -> StepKind {
        StepKind::CmsRegistration
    }

    fn run(&mut self, ctx: &mut DesignContext<'_>) -> Result<()> {
        let config = ctx.config;
        let Some(cms_root) = config.paths.cms_root.as_ref() else {
            debug!("no cms root configured; registration skipped");
            return Ok(());
        };
        if ctx.artifacts.is_empty() {
            debug!("no artifacts to register");
            return Ok(());
        }
        let expires_at = Utc::now() + Duration::days(i64::from(config.checks.retention_days));
        cms::register(
            cms_root,
            &ctx.artifacts,
            &config.identity.codename,
            &config.identity.build_id,
            &config.identity.owner,
            expires_at,
        )?;
        Ok(())
    }
}
