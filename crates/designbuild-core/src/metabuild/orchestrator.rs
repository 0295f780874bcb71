//! Metabuild Orchestrator.
//!
//! ```text
//! INIT -> SNAPSHOT -> { per baseline: ISOLATE -> [OPTIMIZE <-> ] BUILD -> COLLECT }
//!      -> REPORT -> DONE
//! ```
//!
//! Any failure after SNAPSHOT, including cancellation, takes the ROLLBACK
//! transition: the repository is restored to the snapshot and the original
//! error is returned. Rollback happens once for the whole metabuild;
//! artifacts of baselines that already completed stay on disk.

use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{error, info, Instrument};

use crate::context::keys;
use crate::domain::baseline::Baseline;
use crate::domain::config::BuildConfig;
use crate::domain::envelope::{BuildResult, BuildSummary};
use crate::metabuild::error::{MetabuildError, MetabuildResult};
use crate::metabuild::launcher::BuildLauncher;
use crate::metabuild::optimizer::{DesignEvaluator, DesignOptimizer, OptimizationOutcome};
use crate::obs;
use crate::vcs::{CommitOutcome, TransactionManager, VcsError, RESCUE_REF_PREFIX};

/// States of a metabuild invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetabuildPhase {
    Init,
    Snapshot,
    Isolate,
    Optimize,
    Build,
    Collect,
    Report,
    Done,
    Rollback,
}

impl MetabuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetabuildPhase::Init => "INIT",
            MetabuildPhase::Snapshot => "SNAPSHOT",
            MetabuildPhase::Isolate => "ISOLATE",
            MetabuildPhase::Optimize => "OPTIMIZE",
            MetabuildPhase::Build => "BUILD",
            MetabuildPhase::Collect => "COLLECT",
            MetabuildPhase::Report => "REPORT",
            MetabuildPhase::Done => "DONE",
            MetabuildPhase::Rollback => "ROLLBACK",
        }
    }
}

impl fmt::Display for MetabuildPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one targeted baseline.
#[derive(Debug, Clone)]
pub struct BaselineBuild {
    pub baseline: Baseline,
    pub build_id: String,
    pub workspace: PathBuf,
    pub summary: BuildSummary,
    pub optimization: Option<OptimizationOutcome>,
}

/// Report of a metabuild whose every baseline completed.
#[derive(Debug, Clone)]
pub struct MetabuildReport {
    /// Repository state before the metabuild.
    pub snapshot: Baseline,
    /// Repository state after pending work was committed.
    pub fresh: Baseline,
    pub pending_work: CommitOutcome,
    pub builds: Vec<BaselineBuild>,
}

impl MetabuildReport {
    pub fn total_nonconformities(&self) -> usize {
        self.builds.iter().map(|b| b.summary.nonconformities).sum()
    }
}

/// Drives subsidiary builds across baselines with transactional rollback.
pub struct MetabuildOrchestrator {
    vcs: Arc<dyn TransactionManager>,
    launcher: Arc<dyn BuildLauncher>,
    optimizer: Option<Arc<dyn DesignOptimizer>>,
    transitions: Mutex<Vec<MetabuildPhase>>,
}

impl MetabuildOrchestrator {
    pub fn new(vcs: Arc<dyn TransactionManager>, launcher: Arc<dyn BuildLauncher>) -> Self {
        Self {
            vcs,
            launcher,
            optimizer: None,
            transitions: Mutex::new(Vec::new()),
        }
    }

    pub fn with_optimizer(mut self, optimizer: Arc<dyn DesignOptimizer>) -> Self {
        self.optimizer = Some(optimizer);
        self
    }

    /// Phases entered so far, in order.
    pub fn transitions(&self) -> Vec<MetabuildPhase> {
        self.transitions
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }

    fn enter(&self, phase: MetabuildPhase, target: Option<&str>) {
        if let Ok(mut transitions) = self.transitions.lock() {
            transitions.push(phase);
        }
        obs::emit_phase(phase.as_str(), target);
    }

    /// Run a metabuild to completion.
    pub async fn run(&self, base: &BuildConfig, description: &str) -> MetabuildResult<MetabuildReport> {
        self.run_until(base, description, std::future::pending::<()>())
            .await
    }

    /// Run a metabuild, treating completion of `cancel` as a fatal
    /// interruption.
    pub async fn run_until<C>(
        &self,
        base: &BuildConfig,
        description: &str,
        cancel: C,
    ) -> MetabuildResult<MetabuildReport>
    where
        C: Future<Output = ()>,
    {
        let span = tracing::info_span!("designbuild.metabuild", build_id = %base.identity.build_id);
        self.run_inner(base, description, cancel).instrument(span).await
    }

    async fn run_inner<C>(
        &self,
        base: &BuildConfig,
        description: &str,
        cancel: C,
    ) -> MetabuildResult<MetabuildReport>
    where
        C: Future<Output = ()>,
    {
        let root = base.paths.repo_root.clone();
        self.enter(MetabuildPhase::Init, None);
        self.enter(MetabuildPhase::Snapshot, None);
        let snapshot = self.vcs.snapshot(&root)?;
        info!(baseline = %snapshot.label(), dirty = snapshot.dirty, "captured snapshot");

        let mut pending: Option<String> = None;
        let outcome = {
            let work = self.execute(base, description, &snapshot, &mut pending);
            tokio::select! {
                outcome = work => outcome,
                _ = cancel => Err(MetabuildError::Cancelled),
            }
        };

        match outcome {
            Ok(report) => {
                self.enter(MetabuildPhase::Done, None);
                Ok(report)
            }
            Err(e) => {
                self.enter(MetabuildPhase::Rollback, None);
                self.roll_back(&root, &snapshot, pending.as_deref(), &e);
                Err(e)
            }
        }
    }

    /// Restore the snapshot, then bring the developer's pending work back
    /// into the working tree. Failures here are logged; the original error
    /// is what the caller sees.
    fn roll_back(&self, root: &Path, snapshot: &Baseline, pending: Option<&str>, cause: &MetabuildError) {
        obs::emit_rollback(&snapshot.label(), cause);
        if let Err(e) = self.vcs.rollback(root, snapshot) {
            error!(error = %e, "rollback failed; repository left as is");
            return;
        }
        if let (Some(commit), false) = (pending, snapshot.is_null()) {
            if let Err(e) = self.vcs.restore_worktree(root, commit) {
                error!(
                    error = %e,
                    commit = %commit,
                    "could not restore pending work; it remains reachable from its rescue ref"
                );
            }
        }
    }

    async fn execute(
        &self,
        base: &BuildConfig,
        description: &str,
        snapshot: &Baseline,
        pending: &mut Option<String>,
    ) -> MetabuildResult<MetabuildReport> {
        let root = &base.paths.repo_root;

        if let Some(pattern) = scratch_exclude_pattern(base)? {
            self.vcs.ensure_excluded(root, &pattern)?;
        }
        let changed = self.vcs.changed_files(root, snapshot)?;
        info!(changed = changed.len(), "computed changed files");

        let pending_work = self.vcs.auto_commit(root, description)?;
        if let CommitOutcome::Created(commit) | CommitOutcome::Amended(commit) = &pending_work {
            let rescue = format!("{RESCUE_REF_PREFIX}{}", base.identity.build_id);
            self.vcs.pin(root, &rescue, commit)?;
            *pending = Some(commit.clone());
        }
        let fresh = self.vcs.snapshot(root)?;

        let targets = self.targets(base, &fresh)?;
        let isolated_root = base.layout.resolve(root, keys::ISOLATED)?;

        let mut builds = Vec::with_capacity(targets.len());
        for (index, (label, baseline)) in targets.into_iter().enumerate() {
            let commit = baseline
                .commit
                .clone()
                .ok_or_else(|| VcsError::UnknownRevision(label.clone()))?;
            let workspace = isolated_root.join(workspace_name(&label));

            self.enter(MetabuildPhase::Isolate, Some(&label));
            self.vcs
                .clone_at_revision(&workspace, root, &commit)
                .map_err(|source| MetabuildError::Isolate {
                    baseline: label.clone(),
                    workspace: workspace.clone(),
                    source,
                })?;

            let build_id = format!("{}.{}", base.identity.build_id, index + 1);
            let mut config = base.derive_subsidiary(&build_id, &workspace, None);
            config.scope.baselines.clear();
            config.scope.changed_files = changed.iter().cloned().collect();

            let (summary, optimization) = match &self.optimizer {
                Some(optimizer) => {
                    self.enter(MetabuildPhase::Optimize, Some(&label));
                    let evaluator = SubsidiaryEvaluator {
                        orchestrator: self,
                        config: &config,
                        baseline: &baseline,
                        variants: AtomicUsize::new(0),
                    };
                    let outcome = optimizer.optimize(&evaluator).await?;
                    (outcome.summary.clone(), Some(outcome))
                }
                None => (self.build_once(&config, &baseline).await?, None),
            };

            info!(
                baseline = %label,
                build_id = %summary.build_id,
                nonconformities = summary.nonconformities,
                "baseline build completed"
            );
            builds.push(BaselineBuild {
                baseline,
                build_id,
                workspace,
                summary,
                optimization,
            });
        }

        self.enter(MetabuildPhase::Report, None);
        Ok(MetabuildReport {
            snapshot: snapshot.clone(),
            fresh,
            pending_work,
            builds,
        })
    }

    /// Baselines to build, labelled by branch (or requested revision).
    fn targets(&self, base: &BuildConfig, fresh: &Baseline) -> MetabuildResult<Vec<(String, Baseline)>> {
        if base.scope.baselines.is_empty() {
            let label = fresh
                .branch
                .clone()
                .or_else(|| fresh.short_commit.clone())
                .ok_or_else(|| VcsError::UnknownRevision("HEAD".to_string()))?;
            return Ok(vec![(label, fresh.clone())]);
        }
        base.scope
            .baselines
            .iter()
            .map(|revision| {
                let baseline = self.vcs.resolve_baseline(&base.paths.repo_root, revision)?;
                Ok((revision.clone(), baseline))
            })
            .collect()
    }

    /// BUILD then COLLECT for one configuration. A failure report is
    /// re-pointed from the isolated workspace to the developer's repository.
    async fn build_once(&self, config: &BuildConfig, baseline: &Baseline) -> MetabuildResult<BuildSummary> {
        let build_id = config.identity.build_id.clone();
        self.enter(MetabuildPhase::Build, Some(&build_id));
        let result = self.launcher.launch(config).await?;
        self.enter(MetabuildPhase::Collect, Some(&build_id));
        match result {
            BuildResult::Completed(summary) => Ok(summary),
            BuildResult::Failed(report) => Err(MetabuildError::BuildFailed {
                build_id,
                baseline: Box::new(baseline.clone()),
                report: report.rewrite_paths(&config.paths.workspace_root, &config.paths.repo_root),
            }),
        }
    }
}

/// Evaluation callback handed to an optimizer: one subsidiary build per
/// design variant.
struct SubsidiaryEvaluator<'a> {
    orchestrator: &'a MetabuildOrchestrator,
    config: &'a BuildConfig,
    baseline: &'a Baseline,
    variants: AtomicUsize,
}

#[async_trait]
impl DesignEvaluator for SubsidiaryEvaluator<'_> {
    async fn evaluate(&self, params: serde_json::Value) -> MetabuildResult<BuildSummary> {
        let variant = self.variants.fetch_add(1, Ordering::SeqCst) + 1;
        let build_id = format!("{}.{variant}", self.config.identity.build_id);
        let config = self.config.derive_subsidiary(
            build_id,
            self.config.paths.workspace_root.clone(),
            Some(params),
        );
        self.orchestrator.build_once(&config, self.baseline).await
    }
}

/// `.git/info/exclude` pattern covering the scratch directory, when it lies
/// inside the repository.
fn scratch_exclude_pattern(base: &BuildConfig) -> MetabuildResult<Option<String>> {
    let root = &base.paths.repo_root;
    let scratch = base.layout.resolve(root, keys::TMP)?;
    Ok(scratch
        .strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(|rel| format!("/{}/", rel.to_string_lossy().replace('\\', "/"))))
}

/// Directory name of a baseline's isolated workspace: a readable prefix plus
/// a hash of the full label so distinct branches never collide.
pub fn workspace_name(label: &str) -> String {
    let readable: String = label
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = hex::encode(Sha256::digest(label.as_bytes()));
    format!("{readable}-{}", &digest[..8])
}
