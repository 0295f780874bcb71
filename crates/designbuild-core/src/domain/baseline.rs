//! Captured repository identity.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// Author or committer metadata of the baseline commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    pub name: String,
    pub email: String,
    pub time: DateTime<FixedOffset>,
}

/// A read-only snapshot of repository identity.
///
/// A baseline captured in a repository without commits has no commit
/// identifiers; rolling back to such a baseline is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baseline {
    /// Full commit id.
    pub commit: Option<String>,

    /// Abbreviated commit id.
    pub short_commit: Option<String>,

    /// Branch the baseline is reported under.
    pub branch: Option<String>,

    /// Whether HEAD was attached to `branch` when captured.
    pub attached: bool,

    /// Tracked files differ from the commit.
    pub dirty: bool,

    /// Untracked, non-ignored files were present.
    pub untracked: bool,

    pub author: Option<Signature>,
    pub committer: Option<Signature>,

    /// Commit subject line.
    pub summary: Option<String>,
}

impl Baseline {
    /// Baseline with null identifiers.
    pub fn null() -> Self {
        Self::default()
    }

    /// True when no commit exists behind this baseline.
    pub fn is_null(&self) -> bool {
        self.commit.is_none()
    }

    /// Short label for logs: branch, else short commit, else `unborn`.
    pub fn label(&self) -> String {
        match (&self.branch, &self.short_commit) {
            (Some(branch), Some(short)) => format!("{branch}@{short}"),
            (Some(branch), None) => branch.clone(),
            (None, Some(short)) => short.clone(),
            (None, None) => "unborn".to_string(),
        }
    }
}
