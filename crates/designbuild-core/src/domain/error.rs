//! Error taxonomy for single builds.
//!
//! Document-level problems never appear here: they are reported as
//! nonconformities. A [`BuildError`] is either fatal infrastructure failure
//! or the fail-fast abort carrying the first nonconformity.

use std::error::Error as _;
use std::path::PathBuf;

use crate::domain::envelope::FailureReport;
use crate::domain::nonconformity::Nonconformity;
use crate::vcs::VcsError;

/// Build errors.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("build aborted on nonconformity: {0}")]
    Aborted(Nonconformity),

    #[error("io error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unknown repository layout key: {0}")]
    UnknownLayoutKey(String),

    #[error("no git repository found at or above {}", .0.display())]
    RepositoryNotFound(PathBuf),

    #[error("invalid build config: {0}")]
    InvalidConfig(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("stage {stage} failed: {message}")]
    Stage { stage: String, message: String },

    #[error("version control error: {0}")]
    Vcs(#[from] VcsError),

    #[error("build panicked: {0}")]
    Panic(String),
}

/// Result type for build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }

    /// Short machine-readable kind, used in failure reports.
    pub fn kind(&self) -> &'static str {
        match self {
            BuildError::Aborted(_) => "nonconformity",
            BuildError::Io { .. } => "io",
            BuildError::UnknownLayoutKey(_) => "layout",
            BuildError::RepositoryNotFound(_) => "repository_not_found",
            BuildError::InvalidConfig(_) => "config",
            BuildError::Serialization(_) => "serialization",
            BuildError::Stage { .. } => "stage",
            BuildError::Vcs(_) => "vcs",
            BuildError::Panic(_) => "panic",
        }
    }

    /// Path (and line) the error originates from, if any.
    pub fn origin(&self) -> Option<(PathBuf, Option<u32>)> {
        match self {
            BuildError::Aborted(nc) => Some((nc.path.clone(), nc.line)),
            BuildError::Io { path, .. } => Some((path.clone(), None)),
            BuildError::RepositoryNotFound(path) => Some((path.clone(), None)),
            _ => None,
        }
    }

    /// Marshal into a [`FailureReport`].
    ///
    /// Relative origins (nonconformity paths) are anchored at `workspace_root`
    /// so the orchestrator can rewrite them to the outer repository.
    pub fn to_failure_report(&self, workspace_root: &std::path::Path) -> FailureReport {
        let mut report = FailureReport::new(self.kind(), self.to_string());
        if let Some((path, line)) = self.origin() {
            let path = if path.is_relative() {
                workspace_root.join(path)
            } else {
                path
            };
            report.origin_path = Some(path);
            report.origin_line = line;
        }
        let mut source = self.source();
        while let Some(cause) = source {
            report.cause_chain.push(cause.to_string());
            source = cause.source();
        }
        report
    }
}
