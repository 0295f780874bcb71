//! Git-backed transaction manager.
//!
//! Every operation shells out to `git` in the target directory.

use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::error::{Result, VcsError};
use super::{CommitOutcome, TransactionManager};
use crate::domain::baseline::{Baseline, Signature};

/// Namespace for refs pinning auto-committed developer work.
pub const RESCUE_REF_PREFIX: &str = "refs/designbuild/rescue/";

/// Ref under which the source repository's HEAD is mirrored into clones.
const SOURCE_HEAD_REF: &str = "refs/designbuild/source-head";

/// Committer identity used for auto-commits when the repository has none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitIdentity {
    pub name: String,
    pub email: String,
}

/// [`TransactionManager`] over the `git` command line.
#[derive(Debug, Clone, Default)]
pub struct GitTransactionManager {
    identity: Option<CommitIdentity>,
}

impl GitTransactionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, identity: CommitIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    fn command(&self, dir: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.current_dir(dir);
        if let Some(identity) = &self.identity {
            cmd.arg("-c")
                .arg(format!("user.name={}", identity.name))
                .arg("-c")
                .arg(format!("user.email={}", identity.email));
        }
        cmd.args(args);
        cmd
    }

    /// Run git; non-zero exit is an error. Returns stdout.
    fn git(&self, dir: &Path, args: &[&str]) -> Result<String> {
        let output = self
            .command(dir, args)
            .output()
            .map_err(VcsError::Spawn)?;
        if !output.status.success() {
            return Err(VcsError::CommandFailed {
                command: args.join(" "),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Run a git query; non-zero exit yields `None`.
    fn query(&self, dir: &Path, args: &[&str]) -> Result<Option<String>> {
        let output = self
            .command(dir, args)
            .output()
            .map_err(VcsError::Spawn)?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn ensure_repository(&self, root: &Path) -> Result<()> {
        match self.query(root, &["rev-parse", "--git-dir"])? {
            Some(_) => Ok(()),
            None => Err(VcsError::NotARepository(root.to_path_buf())),
        }
    }

    fn resolve_commit(&self, dir: &Path, revision: &str) -> Result<Option<String>> {
        let spec = format!("{revision}^{{commit}}");
        self.query(dir, &["rev-parse", "--verify", "-q", &spec])
    }

    /// Branch to report for a detached commit: `master` when it contains the
    /// commit, else the lexicographically smallest containing branch.
    fn containing_branch(&self, root: &Path, commit: &str) -> Result<Option<String>> {
        let listing = self.git(
            root,
            &["branch", "--contains", commit, "--format=%(refname:short)"],
        )?;
        let branches: BTreeSet<&str> = listing
            .lines()
            .map(str::trim)
            .filter(|b| !b.is_empty() && *b != "HEAD" && !b.starts_with('('))
            .collect();
        if branches.contains("master") {
            return Ok(Some("master".to_string()));
        }
        Ok(branches.first().map(|b| b.to_string()))
    }

    fn fill_metadata(&self, root: &Path, commit: &str, baseline: &mut Baseline) -> Result<()> {
        let raw = self.git(
            root,
            &[
                "log",
                "-1",
                "--format=%an%x00%ae%x00%aI%x00%cn%x00%ce%x00%cI%x00%s",
                commit,
            ],
        )?;
        let fields: Vec<&str> = raw.trim_end_matches('\n').split('\0').collect();
        if let [an, ae, at, cn, ce, ct, subject] = fields.as_slice() {
            baseline.author = signature(an, ae, at);
            baseline.committer = signature(cn, ce, ct);
            baseline.summary = Some(subject.to_string());
        }
        Ok(())
    }

    fn status_flags(&self, root: &Path) -> Result<(bool, bool)> {
        let tracked = self.git(root, &["status", "--porcelain", "--untracked-files=no"])?;
        let untracked = self.git(root, &["ls-files", "--others", "--exclude-standard"])?;
        Ok((!tracked.trim().is_empty(), !untracked.trim().is_empty()))
    }

    fn head(&self, root: &Path) -> Result<Option<String>> {
        self.query(root, &["rev-parse", "--verify", "-q", "HEAD"])
    }

    /// HEAD is `commit` and attached to the same branch (or detached) as in
    /// `baseline`.
    fn at_baseline(&self, root: &Path, commit: &str, baseline: &Baseline) -> Result<bool> {
        if self.head(root)?.as_deref() != Some(commit) {
            return Ok(false);
        }
        let current = self
            .query(root, &["symbolic-ref", "--short", "-q", "HEAD"])?
            .filter(|b| !b.is_empty());
        Ok(match (&baseline.branch, baseline.attached) {
            (Some(branch), true) => current.as_deref() == Some(branch.as_str()),
            _ => current.is_none(),
        })
    }

    /// Pin tracked uncommitted changes under a rescue ref before a forced
    /// checkout discards them.
    fn rescue_uncommitted(&self, root: &Path) -> Result<()> {
        let Some(stash) = self.query(root, &["stash", "create", "designbuild: rollback rescue"])?
        else {
            warn!(root = %root.display(), "could not record uncommitted changes before rollback");
            return Ok(());
        };
        if stash.is_empty() {
            return Ok(());
        }
        let short = stash.get(..12).unwrap_or(stash.as_str());
        let name = format!("{RESCUE_REF_PREFIX}rollback-{short}");
        self.pin(root, &name, &stash)?;
        info!(reference = %name, "uncommitted changes pinned before rollback");
        Ok(())
    }
}

fn signature(name: &str, email: &str, time: &str) -> Option<Signature> {
    let time = DateTime::parse_from_rfc3339(time).ok()?;
    Some(Signature {
        name: name.to_string(),
        email: email.to_string(),
        time,
    })
}

fn split_nul(raw: &str) -> impl Iterator<Item = PathBuf> + '_ {
    raw.split('\0').filter(|p| !p.is_empty()).map(PathBuf::from)
}

impl TransactionManager for GitTransactionManager {
    fn snapshot(&self, root: &Path) -> Result<Baseline> {
        self.ensure_repository(root)?;
        let (dirty, untracked) = self.status_flags(root)?;
        let symbolic = self.query(root, &["symbolic-ref", "--short", "-q", "HEAD"])?;

        let Some(commit) = self.head(root)? else {
            debug!(root = %root.display(), "repository has no commits; null baseline");
            return Ok(Baseline {
                dirty,
                untracked,
                ..Baseline::null()
            });
        };

        let short = self.git(root, &["rev-parse", "--short", &commit])?;
        let (branch, attached) = match symbolic {
            Some(branch) if !branch.is_empty() => (Some(branch), true),
            _ => (self.containing_branch(root, &commit)?, false),
        };

        let mut baseline = Baseline {
            short_commit: Some(short.trim().to_string()),
            commit: Some(commit.clone()),
            branch,
            attached,
            dirty,
            untracked,
            ..Baseline::default()
        };
        self.fill_metadata(root, &commit, &mut baseline)?;
        Ok(baseline)
    }

    fn rollback(&self, root: &Path, baseline: &Baseline) -> Result<()> {
        let Some(commit) = baseline.commit.as_deref() else {
            debug!("null baseline; rollback is a no-op");
            return Ok(());
        };
        // Uncommitted edits recorded by the snapshot belong to the baseline
        // and cannot be recreated from its commit.
        if baseline.dirty && self.at_baseline(root, commit, baseline)? {
            debug!(baseline = %baseline.label(), "HEAD already at dirty baseline; working tree kept");
            return Ok(());
        }
        self.rescue_uncommitted(root)?;
        match (&baseline.branch, baseline.attached) {
            (Some(branch), true) => {
                self.git(root, &["checkout", "-q", "-f", "-B", branch.as_str(), commit])?;
            }
            _ => {
                self.git(root, &["checkout", "-q", "-f", "--detach", commit])?;
            }
        }
        info!(baseline = %baseline.label(), "repository rolled back");
        Ok(())
    }

    fn auto_commit(&self, root: &Path, description: &str) -> Result<CommitOutcome> {
        let status = self.git(root, &["status", "--porcelain"])?;
        if status.trim().is_empty() {
            return Ok(CommitOutcome::Clean {
                head: self.head(root)?,
            });
        }

        self.git(root, &["add", "-A"])?;

        let amend = match self.query(root, &["log", "-1", "--format=%P%x00%B"])? {
            Some(previous) => {
                let (parents, body) = previous.split_once('\0').unwrap_or((previous.as_str(), ""));
                parents.split_whitespace().count() <= 1 && body.trim() == description.trim()
            }
            None => false,
        };

        if amend {
            self.git(root, &["commit", "--amend", "--no-verify", "-q", "-m", description])?;
        } else {
            self.git(root, &["commit", "--no-verify", "-q", "-m", description])?;
        }

        let head = self
            .head(root)?
            .ok_or_else(|| VcsError::UnknownRevision("HEAD".to_string()))?;
        info!(commit = %head, amended = amend, "auto-committed pending work");
        Ok(if amend {
            CommitOutcome::Amended(head)
        } else {
            CommitOutcome::Created(head)
        })
    }

    fn clone_at_revision(&self, destination: &Path, source: &Path, revision: &str) -> Result<()> {
        let commit = self
            .resolve_commit(source, revision)?
            .ok_or_else(|| VcsError::UnknownRevision(revision.to_string()))?;

        if !destination.join(".git").exists() {
            fs::create_dir_all(destination).map_err(|e| VcsError::Io {
                path: destination.to_path_buf(),
                source: e,
            })?;
            self.git(destination, &["init", "-q"])?;
            debug!(destination = %destination.display(), "initialised isolated workspace");
        }

        let source_url = source.display().to_string();
        let head_refspec = format!("+HEAD:{SOURCE_HEAD_REF}");
        self.git(
            destination,
            &[
                "fetch",
                "-q",
                "--force",
                &source_url,
                "+refs/heads/*:refs/remotes/source/*",
                "+refs/designbuild/rescue/*:refs/designbuild/rescue/*",
                &head_refspec,
            ],
        )?;
        self.git(destination, &["checkout", "-q", "-f", "--detach", &commit])?;
        self.git(destination, &["clean", "-fdq"])?;
        info!(
            destination = %destination.display(),
            revision = %revision,
            commit = %commit,
            "isolated workspace at revision"
        );
        Ok(())
    }

    fn changed_files(&self, root: &Path, baseline: &Baseline) -> Result<BTreeSet<PathBuf>> {
        let mut changed = BTreeSet::new();
        match baseline.commit.as_deref() {
            Some(commit) => {
                let tracked = self.git(root, &["diff", "--name-only", "-z", commit])?;
                changed.extend(split_nul(&tracked));
            }
            None => {
                let tracked = self.git(root, &["ls-files", "-z", "--cached"])?;
                changed.extend(split_nul(&tracked));
            }
        }
        let untracked = self.git(root, &["ls-files", "-z", "--others", "--exclude-standard"])?;
        changed.extend(split_nul(&untracked));
        Ok(changed)
    }

    fn resolve_baseline(&self, root: &Path, revision: &str) -> Result<Baseline> {
        let commit = self
            .resolve_commit(root, revision)?
            .ok_or_else(|| VcsError::UnknownRevision(revision.to_string()))?;
        let short = self.git(root, &["rev-parse", "--short", &commit])?;
        let local_branch = format!("refs/heads/{revision}");
        let branch = if self
            .query(root, &["rev-parse", "--verify", "-q", &local_branch])?
            .is_some()
        {
            Some(revision.to_string())
        } else {
            self.containing_branch(root, &commit)?
        };
        let mut baseline = Baseline {
            short_commit: Some(short.trim().to_string()),
            commit: Some(commit.clone()),
            branch,
            ..Baseline::default()
        };
        self.fill_metadata(root, &commit, &mut baseline)?;
        Ok(baseline)
    }

    fn pin(&self, root: &Path, name: &str, commit: &str) -> Result<()> {
        self.git(root, &["update-ref", name, commit])?;
        debug!(reference = %name, commit = %commit, "pinned commit");
        Ok(())
    }

    fn restore_worktree(&self, root: &Path, commit: &str) -> Result<()> {
        self.git(root, &["read-tree", "-u", "--reset", commit])?;
        self.git(root, &["reset", "-q"])?;
        info!(commit = %commit, "restored pending work into working tree");
        Ok(())
    }

    fn ensure_excluded(&self, root: &Path, pattern: &str) -> Result<()> {
        let rel = self.git(root, &["rev-parse", "--git-path", "info/exclude"])?;
        let path = root.join(rel.trim());
        let io_err = |source| VcsError::Io {
            path: path.clone(),
            source,
        };
        let existing = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(io_err(e)),
        };
        if existing.lines().any(|line| line.trim() == pattern) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        let separator = if existing.is_empty() || existing.ends_with('\n') {
            ""
        } else {
            "\n"
        };
        writeln!(file, "{separator}{pattern}").map_err(io_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command as StdCommand;

    fn run_git(repo_dir: &Path, args: &[&str]) -> String {
        let output = StdCommand::new("git")
            .args(args)
            .current_dir(repo_dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    fn make_git_repo() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q", "-b", "main"]);
        run_git(dir.path(), &["config", "user.name", "test-user"]);
        run_git(dir.path(), &["config", "user.email", "test@example.com"]);
        run_git(dir.path(), &["commit", "-q", "--allow-empty", "-m", "initial"]);
        dir
    }

    #[test]
    fn snapshot_of_unborn_repository_is_null() {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        let baseline = GitTransactionManager::new().snapshot(dir.path()).unwrap();
        assert!(baseline.is_null());
        GitTransactionManager::new()
            .rollback(dir.path(), &baseline)
            .unwrap();
    }

    #[test]
    fn snapshot_outside_repository_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = GitTransactionManager::new().snapshot(dir.path()).unwrap_err();
        assert!(matches!(err, VcsError::NotARepository(_)));
    }

    #[test]
    fn snapshot_captures_branch_and_metadata() {
        let repo = make_git_repo();
        fs::write(repo.path().join("new.rs"), "fn a() {}\n").unwrap();
        let baseline = GitTransactionManager::new().snapshot(repo.path()).unwrap();
        assert_eq!(baseline.branch.as_deref(), Some("main"));
        assert!(baseline.attached);
        assert!(!baseline.dirty);
        assert!(baseline.untracked);
        assert_eq!(baseline.commit.as_ref().unwrap().len(), 40);
        assert_eq!(baseline.summary.as_deref(), Some("initial"));
        assert_eq!(baseline.author.as_ref().unwrap().name, "test-user");
    }

    #[test]
    fn detached_head_reports_master_else_smallest_branch() {
        let repo = make_git_repo();
        run_git(repo.path(), &["branch", "zeta"]);
        run_git(repo.path(), &["checkout", "-q", "--detach"]);
        let vcs = GitTransactionManager::new();

        let baseline = vcs.snapshot(repo.path()).unwrap();
        assert!(!baseline.attached);
        assert_eq!(baseline.branch.as_deref(), Some("main"));

        run_git(repo.path(), &["branch", "master"]);
        let baseline = vcs.snapshot(repo.path()).unwrap();
        assert_eq!(baseline.branch.as_deref(), Some("master"));
    }

    #[test]
    fn auto_commit_clean_tree_is_noop() {
        let repo = make_git_repo();
        let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
        let outcome = GitTransactionManager::new()
            .auto_commit(repo.path(), "wip")
            .unwrap();
        assert_eq!(outcome, CommitOutcome::Clean { head: Some(head) });
    }

    #[test]
    fn auto_commit_with_identity_needs_no_repo_config() {
        let dir = tempfile::tempdir().unwrap();
        run_git(dir.path(), &["init", "-q"]);
        fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        let vcs = GitTransactionManager::new().with_identity(CommitIdentity {
            name: "designbuild".to_string(),
            email: "designbuild@localhost".to_string(),
        });
        let outcome = vcs.auto_commit(dir.path(), "wip").unwrap();
        assert!(matches!(outcome, CommitOutcome::Created(_)));
    }

    #[test]
    fn changed_files_lists_modified_and_untracked() {
        let repo = make_git_repo();
        fs::write(repo.path().join("tracked.rs"), "fn a() {}\n").unwrap();
        run_git(repo.path(), &["add", "tracked.rs"]);
        run_git(repo.path(), &["commit", "-q", "-m", "add tracked"]);
        let vcs = GitTransactionManager::new();
        let baseline = vcs.snapshot(repo.path()).unwrap();

        fs::write(repo.path().join("tracked.rs"), "fn b() {}\n").unwrap();
        fs::write(repo.path().join("fresh.rs"), "fn c() {}\n").unwrap();
        let changed = vcs.changed_files(repo.path(), &baseline).unwrap();
        let expected: BTreeSet<PathBuf> =
            [PathBuf::from("fresh.rs"), PathBuf::from("tracked.rs")].into();
        assert_eq!(changed, expected);
    }

    #[test]
    fn ensure_excluded_is_idempotent() {
        let repo = make_git_repo();
        let vcs = GitTransactionManager::new();
        vcs.ensure_excluded(repo.path(), "/tmp/").unwrap();
        vcs.ensure_excluded(repo.path(), "/tmp/").unwrap();
        let exclude = fs::read_to_string(repo.path().join(".git/info/exclude")).unwrap();
        assert_eq!(exclude.lines().filter(|l| *l == "/tmp/").count(), 1);

        fs::create_dir_all(repo.path().join("tmp")).unwrap();
        fs::write(repo.path().join("tmp/log.txt"), "x").unwrap();
        let outcome = vcs.auto_commit(repo.path(), "wip").unwrap();
        assert!(outcome.is_clean());
    }

    #[test]
    fn resolve_unknown_revision_fails() {
        let repo = make_git_repo();
        let err = GitTransactionManager::new()
            .resolve_baseline(repo.path(), "no-such-branch")
            .unwrap_err();
        assert!(matches!(err, VcsError::UnknownRevision(_)));
    }
}
