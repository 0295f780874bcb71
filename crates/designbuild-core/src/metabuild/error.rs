//! Error types for metabuild orchestration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::domain::baseline::Baseline;
use crate::domain::envelope::FailureReport;
use crate::domain::error::BuildError;
use crate::vcs::VcsError;

/// Errors produced by the metabuild layer. Every variant is fatal to the
/// metabuild and triggers rollback.
#[derive(Debug, Error)]
pub enum MetabuildError {
    /// A repository operation failed.
    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    /// The isolated workspace for a baseline could not be prepared.
    #[error("failed to isolate baseline {baseline} into {}: {source}", workspace.display())]
    Isolate {
        baseline: String,
        workspace: PathBuf,
        #[source]
        source: VcsError,
    },

    /// The subsidiary build process could not be started.
    #[error("failed to launch subsidiary build {build_id}: {source}")]
    Launch {
        build_id: String,
        #[source]
        source: std::io::Error,
    },

    /// The subsidiary exited cleanly without writing its result envelope.
    #[error("subsidiary build {build_id} produced no result file at {}", path.display())]
    MissingResultFile { build_id: String, path: PathBuf },

    /// The subsidiary died without writing its result envelope.
    #[error("subsidiary build {build_id} crashed (exit status: {status})")]
    SubprocessCrashed { build_id: String, status: String },

    /// The subsidiary exceeded the configured timeout and was killed.
    #[error("subsidiary build {build_id} timed out after {timeout:?}")]
    Timeout { build_id: String, timeout: Duration },

    /// The subsidiary ran and reported a fatal error.
    #[error("build {build_id} on baseline {} failed: {report}", baseline.label())]
    BuildFailed {
        build_id: String,
        baseline: Box<Baseline>,
        report: FailureReport,
    },

    /// The operator interrupted the metabuild.
    #[error("metabuild cancelled")]
    Cancelled,

    /// The optimization adapter failed.
    #[error("design optimization failed: {0}")]
    Optimization(String),

    /// Configuration or IO failure in the orchestrating process.
    #[error(transparent)]
    Build(#[from] BuildError),
}

impl MetabuildError {
    /// Failure report of a subsidiary build, if that is what failed.
    pub fn failure_report(&self) -> Option<&FailureReport> {
        match self {
            MetabuildError::BuildFailed { report, .. } => Some(report),
            _ => None,
        }
    }
}

/// Convenience result alias.
pub type MetabuildResult<T> = std::result::Result<T, MetabuildError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failed_displays_baseline_and_location() {
        let mut report = FailureReport::new("io", "disk full");
        report.origin_path = Some(PathBuf::from("/repo/src/a.rs"));
        let err = MetabuildError::BuildFailed {
            build_id: "b.2".to_string(),
            baseline: Box::new(Baseline {
                branch: Some("feature".to_string()),
                ..Baseline::default()
            }),
            report,
        };
        let msg = err.to_string();
        assert!(msg.contains("b.2"));
        assert!(msg.contains("feature"));
        assert!(msg.contains("/repo/src/a.rs"));
        assert!(err.failure_report().is_some());
    }

    #[test]
    fn test_timeout_displays_duration() {
        let err = MetabuildError::Timeout {
            build_id: "b.1".to_string(),
            timeout: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("5s"));
    }
}
