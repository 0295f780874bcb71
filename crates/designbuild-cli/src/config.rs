//! Configuration file loading for designbuild.
//!
//! Discovers and loads `designbuild.toml` from the repository root.
//! Command-line flags take precedence over the file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use designbuild_core::{
    BuildConfig, BuildIdentity, BuildPaths, BuildScope, CheckSettings, CommitIdentity,
    RepositoryLayout, StepKind,
};
use serde::Deserialize;
use tracing::debug;

/// The config file name to search for.
pub const CONFIG_FILE_NAME: &str = "designbuild.toml";

/// Top-level configuration from designbuild.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DesignbuildConfig {
    /// Settings shared by every build.
    pub build: BuildSection,

    /// Thresholds, external commands and data schemas for the stages.
    pub checks: CheckSettings,

    /// Layout key overrides, relative to the repository root.
    pub layout: BTreeMap<String, PathBuf>,

    /// Metabuild settings.
    pub metabuild: MetabuildSection,

    /// Identity used for auto-commits.
    pub committer: Option<CommitterSection>,
}

/// `[build]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub codename: Option<String>,
    pub owner: Option<String>,

    /// Enabled steps; the default step set when absent.
    pub steps: Option<Vec<StepKind>>,

    /// Design-element or subsystem names the build is restricted to.
    pub restriction: Vec<String>,

    pub fail_fast: bool,

    /// Only process files changed since the snapshot.
    pub changed_only: bool,
}

/// `[metabuild]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetabuildSection {
    /// Branches or revisions to build; the current branch when empty.
    pub baselines: Vec<String>,

    /// Kill a subsidiary build after this many seconds.
    pub timeout_secs: Option<u64>,

    /// Description used for the auto-commit of pending work.
    pub description: String,

    /// Design-parameter candidates swept per baseline.
    pub variants: Vec<toml::Value>,
}

impl Default for MetabuildSection {
    fn default() -> Self {
        Self {
            baselines: Vec::new(),
            timeout_secs: None,
            description: "designbuild: pending work".to_string(),
            variants: Vec::new(),
        }
    }
}

/// `[committer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct CommitterSection {
    pub name: String,
    pub email: String,
}

/// Discover the designbuild.toml config file.
///
/// Returns `None` if the repository root has no config file.
pub fn discover_config(repo_root: &Path) -> Option<PathBuf> {
    let config_path = repo_root.join(CONFIG_FILE_NAME);
    if config_path.exists() {
        debug!("found config file at {}", config_path.display());
        Some(config_path)
    } else {
        debug!("no config file found at {}", config_path.display());
        None
    }
}

/// Load and parse a designbuild.toml config file.
pub fn load_config(path: &Path) -> anyhow::Result<DesignbuildConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config file {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("parse config file {}", path.display()))
}

/// Parse a config file from a string.
pub fn parse_config(contents: &str) -> anyhow::Result<DesignbuildConfig> {
    let config: DesignbuildConfig = toml::from_str(contents).context("invalid TOML")?;
    Ok(config)
}

/// Load config from repo root, or return default if not found.
pub fn load_or_default(repo_root: &Path) -> anyhow::Result<DesignbuildConfig> {
    match discover_config(repo_root) {
        Some(path) => load_config(&path),
        None => Ok(DesignbuildConfig::default()),
    }
}

/// Values given on the command line.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// Replaces the file's step set when non-empty.
    pub steps: Vec<String>,
    /// Extends the file's restriction.
    pub restriction: Vec<String>,
    /// Replaces the file's baselines when non-empty.
    pub baselines: Vec<String>,
    pub fail_fast: bool,
    pub changed_only: bool,
    pub codename: Option<String>,
    pub owner: Option<String>,
}

impl DesignbuildConfig {
    /// Layout with the file's overrides applied.
    pub fn layout(&self) -> RepositoryLayout {
        RepositoryLayout::default().merged(&self.layout)
    }

    /// Build configuration for `repo_root`, file values overridden by `cli`.
    pub fn to_build_config(
        &self,
        repo_root: &Path,
        cli: &CliOverrides,
    ) -> anyhow::Result<BuildConfig> {
        let layout = self.layout();
        let paths = BuildPaths::in_place(repo_root, &layout)?;

        let codename = cli
            .codename
            .clone()
            .or_else(|| self.build.codename.clone())
            .unwrap_or_else(|| default_codename(repo_root));
        let owner = cli
            .owner
            .clone()
            .or_else(|| self.build.owner.clone())
            .unwrap_or_else(|| "designbuild".to_string());
        let identity = BuildIdentity::generate(codename, owner);

        let mut restriction = self.build.restriction.clone();
        for name in &cli.restriction {
            if !restriction.contains(name) {
                restriction.push(name.clone());
            }
        }
        let baselines = if cli.baselines.is_empty() {
            self.metabuild.baselines.clone()
        } else {
            cli.baselines.clone()
        };
        let scope = BuildScope {
            restriction,
            baselines,
            changed_files: Vec::new(),
            changed_only: cli.changed_only || self.build.changed_only,
        };

        let mut config = BuildConfig::new(identity, paths, layout)
            .with_scope(scope)
            .with_checks(self.checks.clone())
            .with_fail_fast(cli.fail_fast || self.build.fail_fast);

        if !cli.steps.is_empty() {
            let steps = cli
                .steps
                .iter()
                .map(|s| s.parse::<StepKind>())
                .collect::<Result<Vec<_>, _>>()
                .context("invalid --steps")?;
            config = config.with_steps(steps);
        } else if let Some(steps) = &self.build.steps {
            config = config.with_steps(steps.iter().copied());
        }
        Ok(config)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.metabuild.timeout_secs.map(Duration::from_secs)
    }

    pub fn commit_identity(&self) -> Option<CommitIdentity> {
        self.committer.as_ref().map(|c| CommitIdentity {
            name: c.name.clone(),
            email: c.email.clone(),
        })
    }

    /// Variant candidates as JSON parameter sets.
    pub fn variants(&self) -> anyhow::Result<Vec<serde_json::Value>> {
        self.metabuild
            .variants
            .iter()
            .map(|v| serde_json::to_value(v).context("convert design variant"))
            .collect()
    }
}

fn default_codename(repo_root: &Path) -> String {
    repo_root
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "design".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use designbuild_core::keys;
    use tempfile::TempDir;

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert!(config.build.steps.is_none());
        assert!(!config.build.fail_fast);
        assert_eq!(config.checks.max_line_length, 100);
        assert_eq!(config.metabuild.description, "designbuild: pending work");
        assert!(config.committer.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[build]
codename = "gearbox"
owner = "alice"
steps = ["spec_presence", "style", "trace_report"]
restriction = ["drivetrain"]
fail_fast = true

[checks]
max_line_length = 80
retention_days = 7

[checks.commands]
lint = ["mylint", "{path}"]
native_compile = [["cc", "{path}"], ["clang", "{path}"]]

[checks.data_schemas]
"params.json" = ["width", "height"]

[layout]
log = "out/log"

[metabuild]
baselines = ["main", "feature"]
timeout_secs = 600
variants = [{ width = 4 }, { width = 8 }]

[committer]
name = "Build Bot"
email = "bot@example.com"
"#;
        let config = parse_config(toml).unwrap();
        assert_eq!(config.build.codename.as_deref(), Some("gearbox"));
        assert_eq!(
            config.build.steps,
            Some(vec![StepKind::SpecPresence, StepKind::Style, StepKind::TraceReport])
        );
        assert_eq!(config.checks.max_line_length, 80);
        assert_eq!(config.checks.max_function_lines, 80);
        assert_eq!(config.checks.retention_days, 7);
        assert_eq!(config.checks.commands.native_compile.len(), 2);
        assert_eq!(config.checks.data_schemas["params.json"], vec!["width", "height"]);
        assert_eq!(config.timeout(), Some(Duration::from_secs(600)));
        assert_eq!(config.commit_identity().unwrap().name, "Build Bot");

        let variants = config.variants().unwrap();
        assert_eq!(variants[1], serde_json::json!({ "width": 8 }));

        let root = Path::new("/repo");
        let log = config.layout().resolve(root, keys::LOG).unwrap();
        assert_eq!(log, PathBuf::from("/repo/out/log"));
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(parse_config("[build\nfail_fast = ").is_err());
        assert!(parse_config("[build]\nsteps = [\"frobnicate\"]").is_err());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = TempDir::new().unwrap();
        assert!(discover_config(dir.path()).is_none());
        let config = load_or_default(dir.path()).unwrap();
        assert!(config.metabuild.baselines.is_empty());
    }

    #[test]
    fn test_load_from_repo_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "[build]\nowner = \"bob\"\n").unwrap();
        let config = load_or_default(dir.path()).unwrap();
        assert_eq!(config.build.owner.as_deref(), Some("bob"));
    }

    #[test]
    fn test_cli_overrides_file() {
        let config = parse_config(
            r#"
[build]
owner = "alice"
steps = ["style"]
restriction = ["drivetrain"]

[metabuild]
baselines = ["main"]
"#,
        )
        .unwrap();
        let cli = CliOverrides {
            steps: vec!["spec-presence".to_string(), "complexity".to_string()],
            restriction: vec!["drivetrain".to_string(), "chassis".to_string()],
            baselines: vec!["feature".to_string()],
            fail_fast: true,
            owner: Some("carol".to_string()),
            ..CliOverrides::default()
        };

        let build = config.to_build_config(Path::new("/repo/gearbox"), &cli).unwrap();

        assert_eq!(build.identity.owner, "carol");
        assert_eq!(build.identity.codename, "gearbox");
        assert!(build.fail_fast);
        assert_eq!(build.scope.restriction, vec!["drivetrain", "chassis"]);
        assert_eq!(build.scope.baselines, vec!["feature"]);
        assert!(build.is_enabled(StepKind::SpecPresence));
        assert!(build.is_enabled(StepKind::Complexity));
        assert!(!build.is_enabled(StepKind::Style));
        assert_eq!(build.paths.workspace_root, PathBuf::from("/repo/gearbox"));
    }

    #[test]
    fn test_file_steps_apply_without_cli_steps() {
        let config = parse_config("[build]\nsteps = [\"style\"]\n").unwrap();
        let build = config
            .to_build_config(Path::new("/repo"), &CliOverrides::default())
            .unwrap();
        assert_eq!(build.steps.len(), 1);
        assert!(build.is_enabled(StepKind::Style));
        assert_eq!(build.identity.owner, "designbuild");
    }

    #[test]
    fn test_unknown_cli_step_is_an_error() {
        let cli = CliOverrides {
            steps: vec!["frobnicate".to_string()],
            ..CliOverrides::default()
        };
        let result = DesignbuildConfig::default().to_build_config(Path::new("/repo"), &cli);
        assert!(result.is_err());
    }
}
