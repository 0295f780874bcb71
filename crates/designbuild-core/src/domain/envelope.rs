//! Result envelope crossing the subsidiary-build process boundary.
//!
//! Exactly one [`BuildResult`] is written per subsidiary build, to the
//! result file named in its configuration.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::domain::error::{BuildError, Result};

/// File name of the result envelope inside a build's log root.
pub const RESULT_FILE_NAME: &str = "build_result.json";

/// Exit code of a build or metabuild that completed.
pub const COMPLETION_CODE: i32 = 0;

/// Summary of a completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSummary {
    pub build_id: String,
    pub units_processed: usize,
    pub nonconformities: usize,
    pub duration_ms: u64,
}

/// A fatal error marshalled across the process boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    /// Error kind, e.g. `nonconformity`, `io`, `panic`.
    pub kind: String,
    pub message: String,
    pub origin_path: Option<PathBuf>,
    pub origin_line: Option<u32>,
    /// Messages of the underlying causes, outermost first.
    pub cause_chain: Vec<String>,
}

impl FailureReport {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            origin_path: None,
            origin_line: None,
            cause_chain: Vec::new(),
        }
    }

    /// Map every path under `from` to the same relative path under `to`.
    ///
    /// Used to point reports from a disposable isolated workspace back at
    /// the developer's repository.
    pub fn rewrite_paths(mut self, from: &Path, to: &Path) -> Self {
        if let Some(origin) = self.origin_path.take() {
            self.origin_path = Some(match origin.strip_prefix(from) {
                Ok(rel) => to.join(rel),
                Err(_) => origin,
            });
        }
        let from_text = from.display().to_string();
        let to_text = to.display().to_string();
        if !from_text.is_empty() {
            self.message = self.message.replace(&from_text, &to_text);
            for cause in &mut self.cause_chain {
                *cause = cause.replace(&from_text, &to_text);
            }
        }
        self
    }

    /// `path:line` of the origin, if known.
    pub fn location(&self) -> Option<String> {
        self.origin_path.as_ref().map(|p| match self.origin_line {
            Some(line) => format!("{}:{}", p.display(), line),
            None => p.display().to_string(),
        })
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(location) = self.location() {
            write!(f, " (at {location})")?;
        }
        for cause in &self.cause_chain {
            write!(f, "\n  caused by: {cause}")?;
        }
        Ok(())
    }
}

/// Tagged outcome of a subsidiary build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BuildResult {
    Completed(BuildSummary),
    Failed(FailureReport),
}

impl BuildResult {
    pub fn is_completed(&self) -> bool {
        matches!(self, BuildResult::Completed(_))
    }

    /// Write atomically: temp file in the target directory, then rename.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| BuildError::io(dir, e))?;
        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| BuildError::io(dir, e))?;
        tmp.write_all(&json).map_err(|e| BuildError::io(path, e))?;
        tmp.persist(path).map_err(|e| BuildError::io(path, e.error))?;
        Ok(())
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}
