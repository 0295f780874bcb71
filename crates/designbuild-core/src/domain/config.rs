//! Build configuration.
//!
//! A [`BuildConfig`] is constructed once per build and never mutated while a
//! build runs. Subsidiary builds receive a derived copy with build-specific
//! paths substituted, serialised as base64-encoded JSON.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::context::{keys, RepositoryLayout};
use crate::domain::envelope::RESULT_FILE_NAME;
use crate::domain::error::{BuildError, Result};

/// Processing steps a build may enable.
///
/// Unit stages are declared in policy order: fast checks before slow ones,
/// and indexing after data validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    SpecPresence,
    UnitTest,
    Complexity,
    Style,
    DocStyle,
    Lint,
    TypeCheck,
    NativeCompile,
    DocGen,
    DataValidation,
    Traceability,
    DependencyRegister,
    TraceReport,
    CmsRegistration,
}

impl StepKind {
    /// Per-unit stages in policy order.
    pub const UNIT_STAGES: [StepKind; 12] = [
        StepKind::SpecPresence,
        StepKind::UnitTest,
        StepKind::Complexity,
        StepKind::Style,
        StepKind::DocStyle,
        StepKind::Lint,
        StepKind::TypeCheck,
        StepKind::NativeCompile,
        StepKind::DocGen,
        StepKind::DataValidation,
        StepKind::Traceability,
        StepKind::DependencyRegister,
    ];

    /// Whole-design steps, run once after every unit has been processed.
    pub const DESIGN_STEPS: [StepKind; 2] = [StepKind::TraceReport, StepKind::CmsRegistration];

    /// Stable name used in configuration files and nonconformity tool fields.
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::SpecPresence => "spec_presence",
            StepKind::UnitTest => "unit_test",
            StepKind::Complexity => "complexity",
            StepKind::Style => "style",
            StepKind::DocStyle => "doc_style",
            StepKind::Lint => "lint",
            StepKind::TypeCheck => "type_check",
            StepKind::NativeCompile => "native_compile",
            StepKind::DocGen => "doc_gen",
            StepKind::DataValidation => "data_validation",
            StepKind::Traceability => "traceability",
            StepKind::DependencyRegister => "dependency_register",
            StepKind::TraceReport => "trace_report",
            StepKind::CmsRegistration => "cms_registration",
        }
    }

    /// Position in the fixed stage order.
    pub fn policy_rank(&self) -> usize {
        *self as usize
    }

    pub fn is_unit_stage(&self) -> bool {
        Self::UNIT_STAGES.contains(self)
    }

    fn all() -> impl Iterator<Item = StepKind> {
        Self::UNIT_STAGES.into_iter().chain(Self::DESIGN_STEPS)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for StepKind {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().replace('-', "_");
        StepKind::all()
            .find(|k| k.name() == wanted)
            .ok_or_else(|| BuildError::InvalidConfig(format!("unknown step: {s}")))
    }
}

/// Identity block of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    pub build_id: String,
    pub codename: String,
    pub started_at: DateTime<Utc>,
    pub owner: String,
}

impl BuildIdentity {
    /// Generate a fresh identity stamped with the current time.
    pub fn generate(codename: impl Into<String>, owner: impl Into<String>) -> Self {
        let started_at = Utc::now();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            build_id: format!("{}-{}", started_at.format("%Y%m%dT%H%M%S"), &suffix[..8]),
            codename: codename.into(),
            started_at,
            owner: owner.into(),
        }
    }
}

/// What the build covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildScope {
    /// Design-element or subsystem names; empty admits everything.
    pub restriction: Vec<String>,

    /// Baselines (branches or revisions) a metabuild targets; empty means
    /// the current working state.
    pub baselines: Vec<String>,

    /// Workspace-relative paths changed since the last known-good state.
    pub changed_files: Vec<PathBuf>,

    /// Only process changed files.
    pub changed_only: bool,
}

/// Filesystem locations of a build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPaths {
    /// The developer's repository.
    pub repo_root: PathBuf,

    /// Root the build reads from: the repository itself, or an isolated clone.
    pub workspace_root: PathBuf,

    /// Where logs and build artifacts are written.
    pub log_root: PathBuf,

    /// Content-management root for artifact retention.
    pub cms_root: Option<PathBuf>,

    /// Where a subsidiary build writes its result envelope.
    pub result_file: Option<PathBuf>,
}

impl BuildPaths {
    /// Paths for an in-place build of `repo_root` using `layout`.
    pub fn in_place(repo_root: &Path, layout: &RepositoryLayout) -> Result<Self> {
        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            workspace_root: repo_root.to_path_buf(),
            log_root: layout.resolve(repo_root, keys::LOG)?,
            cms_root: Some(layout.resolve(repo_root, keys::CMS)?),
            result_file: None,
        })
    }
}

/// External command templates for stages that delegate to other tools.
///
/// `{path}` and `{spec}` are substituted with the unit's absolute path and its
/// spec document's absolute path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExternalCommands {
    pub unit_test: Option<Vec<String>>,
    pub lint: Option<Vec<String>>,
    pub type_check: Option<Vec<String>>,
    /// One stage instance per compiler.
    pub native_compile: Vec<Vec<String>>,
    pub doc_gen: Option<Vec<String>>,
}

/// Thresholds and inputs for the built-in checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckSettings {
    pub max_line_length: usize,
    pub max_function_lines: usize,
    pub commands: ExternalCommands,
    /// Data document file name to required top-level keys.
    pub data_schemas: BTreeMap<String, Vec<String>>,
    /// Days a CMS registration is retained.
    pub retention_days: u32,
}

impl Default for CheckSettings {
    fn default() -> Self {
        Self {
            max_line_length: 100,
            max_function_lines: 80,
            commands: ExternalCommands::default(),
            data_schemas: BTreeMap::new(),
            retention_days: 30,
        }
    }
}

/// Immutable configuration of one build or subsidiary build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    pub identity: BuildIdentity,
    pub scope: BuildScope,
    pub steps: BTreeSet<StepKind>,
    pub paths: BuildPaths,
    pub layout: RepositoryLayout,
    pub checks: CheckSettings,
    /// Abort on the first nonconformity instead of collecting them all.
    pub fail_fast: bool,
    /// Design-variant parameters supplied by an optimization adapter.
    pub design_params: Option<serde_json::Value>,
}

impl BuildConfig {
    /// Create a configuration with the default step set.
    pub fn new(identity: BuildIdentity, paths: BuildPaths, layout: RepositoryLayout) -> Self {
        let steps = StepKind::UNIT_STAGES
            .into_iter()
            .chain([StepKind::TraceReport])
            .collect();
        Self {
            identity,
            scope: BuildScope::default(),
            steps,
            paths,
            layout,
            checks: CheckSettings::default(),
            fail_fast: false,
            design_params: None,
        }
    }

    /// Replace the enabled step set.
    pub fn with_steps(mut self, steps: impl IntoIterator<Item = StepKind>) -> Self {
        self.steps = steps.into_iter().collect();
        self
    }

    pub fn with_scope(mut self, scope: BuildScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn with_checks(mut self, checks: CheckSettings) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    pub fn is_enabled(&self, step: StepKind) -> bool {
        self.steps.contains(&step)
    }

    /// Root of the design documents inside the workspace.
    pub fn source_root(&self) -> Result<PathBuf> {
        self.layout.resolve(&self.paths.workspace_root, keys::SRC)
    }

    /// Derive the configuration of a subsidiary build running in
    /// `workspace_root`.
    pub fn derive_subsidiary(
        &self,
        build_id: impl Into<String>,
        workspace_root: impl Into<PathBuf>,
        design_params: Option<serde_json::Value>,
    ) -> Self {
        let build_id = build_id.into();
        let log_root = self.paths.log_root.join(&build_id);
        let mut derived = self.clone();
        derived.identity.build_id = build_id;
        derived.paths.workspace_root = workspace_root.into();
        derived.paths.result_file = Some(log_root.join(RESULT_FILE_NAME));
        derived.paths.log_root = log_root;
        derived.design_params = design_params.or_else(|| self.design_params.clone());
        derived
    }

    /// Encode for the subprocess argument: base64 over JSON.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Inverse of [`BuildConfig::encode`].
    pub fn decode(encoded: &str) -> Result<Self> {
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| BuildError::InvalidConfig(format!("config is not base64: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// SHA-256 over the canonical JSON form.
    pub fn digest(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&json);
        Ok(hex::encode(hasher.finalize()))
    }
}
