//! Version-Control Transaction Manager.
//!
//! The only component that mutates the developer's repository: snapshots,
//! auto-commits, rollbacks and isolated clones.

mod error;
mod git;

pub use error::{Result, VcsError};
pub use git::{CommitIdentity, GitTransactionManager, RESCUE_REF_PREFIX};

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use crate::domain::baseline::Baseline;

/// Result of an auto-commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// Working tree was clean; `head` is the current commit, if any.
    Clean { head: Option<String> },
    Created(String),
    Amended(String),
}

impl CommitOutcome {
    /// Commit holding the developer's work, if one exists.
    pub fn commit_id(&self) -> Option<&str> {
        match self {
            CommitOutcome::Clean { head } => head.as_deref(),
            CommitOutcome::Created(id) | CommitOutcome::Amended(id) => Some(id),
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, CommitOutcome::Clean { .. })
    }
}

/// Transactional operations over a repository.
///
/// Implementations are synchronous; the orchestrator runs one mutation at a
/// time.
pub trait TransactionManager: Send + Sync {
    /// Capture the current baseline. A repository without commits yields a
    /// null baseline.
    fn snapshot(&self, root: &Path) -> Result<Baseline>;

    /// Restore files, index and branch pointer to `baseline`. No-op for a
    /// null baseline.
    fn rollback(&self, root: &Path, baseline: &Baseline) -> Result<()>;

    /// Commit pending work, amending the previous commit when it carries the
    /// same description and has at most one parent.
    fn auto_commit(&self, root: &Path, description: &str) -> Result<CommitOutcome>;

    /// Clone or refresh `destination` from `source` and check out `revision`.
    fn clone_at_revision(&self, destination: &Path, source: &Path, revision: &str) -> Result<()>;

    /// Workspace-relative paths differing from `baseline`, tracked and
    /// untracked.
    fn changed_files(&self, root: &Path, baseline: &Baseline) -> Result<BTreeSet<PathBuf>>;

    /// Resolve a branch or revision name into a baseline without touching
    /// the working tree.
    fn resolve_baseline(&self, root: &Path, revision: &str) -> Result<Baseline>;

    /// Keep `commit` reachable under `name`.
    fn pin(&self, root: &Path, name: &str, commit: &str) -> Result<()>;

    /// Read the tree of `commit` into the working tree, leaving index and
    /// HEAD untouched.
    fn restore_worktree(&self, root: &Path, commit: &str) -> Result<()>;

    /// Ensure `pattern` is listed in the repository's local exclude file.
    fn ensure_excluded(&self, root: &Path, pattern: &str) -> Result<()>;
}
