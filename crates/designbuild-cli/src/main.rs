//! designbuild - build engine for design-document repositories
//!
//! ## Commands
//!
//! - `build`: run a single build in place
//! - `metabuild`: build one or more baselines in isolated workspaces, rolling
//!   the repository back on any fatal error
//! - `snapshot` / `rollback` / `auto-commit`: the transaction primitives
//! - `cms purge`: delete expired artifact registrations

mod config;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use designbuild_core::telemetry::init_tracing;
use designbuild_core::{
    cms, keys, Baseline, BuildError, BuildLauncher, BuildResult, GitTransactionManager,
    MetabuildOrchestrator, MetabuildReport, ParameterSweep, RepositoryContext, RepositoryLayout,
    SubprocessLauncher, TransactionManager, COMPLETION_CODE,
};
use designbuild_pipeline::{run_worker, BuildCoordinator};
use tracing::{info, Level};

use crate::config::{CliOverrides, DesignbuildConfig};

/// Exit code for a completed build that found nonconformities under `--strict`.
const NONCONFORMING_CODE: u8 = 2;

#[derive(Parser)]
#[command(name = "designbuild")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Build engine and metabuild orchestrator for design repositories", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by `build` and `metabuild`.
#[derive(clap::Args)]
struct BuildArgs {
    /// Path inside the repository (default: current directory)
    #[arg(short = 'C', long, default_value = ".")]
    path: PathBuf,

    /// Comma-separated steps to enable, replacing the configured set
    #[arg(long, value_delimiter = ',')]
    steps: Vec<String>,

    /// Restrict the build to these design elements
    #[arg(short, long)]
    restrict: Vec<String>,

    /// Abort on the first nonconformity
    #[arg(long)]
    fail_fast: bool,

    /// Only process files changed since the last commit
    #[arg(long)]
    changed_only: bool,

    /// Configuration name used for artifact registration
    #[arg(long)]
    codename: Option<String>,

    /// Owner recorded in the build identity
    #[arg(long, env = "DESIGNBUILD_OWNER")]
    owner: Option<String>,

    /// Exit with a distinct code when nonconformities were found
    #[arg(long)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the repository in place
    Build {
        #[command(flatten)]
        args: BuildArgs,
    },

    /// Build baselines in isolated workspaces with transactional rollback
    Metabuild {
        #[command(flatten)]
        args: BuildArgs,

        /// Branch or revision to build (repeatable; default: current branch)
        #[arg(short, long = "baseline")]
        baselines: Vec<String>,

        /// Auto-commit description for pending work
        #[arg(short = 'm', long)]
        description: Option<String>,

        /// Kill a subsidiary build after this many seconds
        #[arg(long, env = "DESIGNBUILD_TIMEOUT_SECS")]
        timeout_secs: Option<u64>,
    },

    /// Run one subsidiary build from an encoded configuration
    #[command(hide = true)]
    Worker {
        /// Base64-encoded build configuration
        config: String,
    },

    /// Capture the repository baseline as JSON
    Snapshot {
        /// Path inside the repository
        #[arg(short = 'C', long, default_value = ".")]
        path: PathBuf,

        /// Write the snapshot here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Restore the repository to a captured snapshot
    Rollback {
        /// Snapshot file written by `designbuild snapshot`
        snapshot: PathBuf,

        /// Path inside the repository
        #[arg(short = 'C', long, default_value = ".")]
        path: PathBuf,
    },

    /// Commit pending work, amending a previous commit with the same message
    AutoCommit {
        /// Commit description
        #[arg(short, long)]
        message: String,

        /// Path inside the repository
        #[arg(short = 'C', long, default_value = ".")]
        path: PathBuf,
    },

    /// Content-management retention
    Cms {
        #[command(subcommand)]
        action: CmsAction,
    },
}

#[derive(Subcommand)]
enum CmsAction {
    /// Delete registrations whose expiration markers have all passed
    Purge {
        /// CMS root (default: the repository's `cms` layout entry)
        #[arg(long)]
        root: Option<PathBuf>,

        /// Path inside the repository
        #[arg(short = 'C', long, default_value = ".")]
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    match cli.command {
        Commands::Build { args } => cmd_build(args).await,
        Commands::Metabuild {
            args,
            baselines,
            description,
            timeout_secs,
        } => cmd_metabuild(args, baselines, description, timeout_secs).await,
        Commands::Worker { config } => cmd_worker(config).await,
        Commands::Snapshot { path, output } => cmd_snapshot(&path, output.as_deref()),
        Commands::Rollback { snapshot, path } => cmd_rollback(&snapshot, &path),
        Commands::AutoCommit { message, path } => cmd_auto_commit(&message, &path),
        Commands::Cms { action } => match action {
            CmsAction::Purge { root, path } => cmd_cms_purge(root, &path),
        },
    }
}

/// Repository root containing `start` plus its configuration file.
fn open_repository(start: &Path) -> Result<(PathBuf, DesignbuildConfig)> {
    let repo = RepositoryContext::discover(start, RepositoryLayout::default())
        .with_context(|| format!("Failed to locate repository from {:?}", start))?;
    let root = repo.root().to_path_buf();
    let file = config::load_or_default(&root)?;
    Ok((root, file))
}

fn overrides(args: &BuildArgs, baselines: Vec<String>) -> CliOverrides {
    CliOverrides {
        steps: args.steps.clone(),
        restriction: args.restrict.clone(),
        baselines,
        fail_fast: args.fail_fast,
        changed_only: args.changed_only,
        codename: args.codename.clone(),
        owner: args.owner.clone(),
    }
}

fn completion(nonconformities: usize, strict: bool) -> ExitCode {
    if strict && nonconformities > 0 {
        ExitCode::from(NONCONFORMING_CODE)
    } else {
        ExitCode::from(u8::try_from(COMPLETION_CODE).unwrap_or(0))
    }
}

fn git_manager(file: &DesignbuildConfig) -> GitTransactionManager {
    match file.commit_identity() {
        Some(identity) => GitTransactionManager::new().with_identity(identity),
        None => GitTransactionManager::new(),
    }
}

async fn cmd_build(args: BuildArgs) -> Result<ExitCode> {
    let (root, file) = open_repository(&args.path)?;
    let mut config = file.to_build_config(&root, &overrides(&args, Vec::new()))?;

    if config.scope.changed_only {
        let vcs = git_manager(&file);
        let head = vcs.snapshot(&root).context("Failed to snapshot repository")?;
        config.scope.changed_files = vcs
            .changed_files(&root, &head)
            .context("Failed to compute changed files")?
            .into_iter()
            .collect();
    }

    println!("Building {:?} ({})", root, config.identity.build_id);

    let outcome = tokio::task::spawn_blocking(move || BuildCoordinator::new(&config).run())
        .await
        .context("Build task failed")?;

    match outcome {
        Ok(outcome) => {
            println!("{}", outcome.report.render());
            println!(
                "Build {} completed in {}ms",
                outcome.summary.build_id, outcome.summary.duration_ms
            );
            Ok(completion(outcome.summary.nonconformities, args.strict))
        }
        Err(BuildError::Aborted(nc)) => {
            println!("Build aborted (fail-fast):");
            println!("  {}", nc);
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e).context("Build failed"),
    }
}

async fn cmd_metabuild(
    args: BuildArgs,
    baselines: Vec<String>,
    description: Option<String>,
    timeout_secs: Option<u64>,
) -> Result<ExitCode> {
    let (root, file) = open_repository(&args.path)?;
    let base = file.to_build_config(&root, &overrides(&args, baselines))?;
    let description = description.unwrap_or_else(|| file.metabuild.description.clone());
    let timeout = timeout_secs
        .map(std::time::Duration::from_secs)
        .or_else(|| file.timeout());

    let launcher: Arc<dyn BuildLauncher> =
        Arc::new(SubprocessLauncher::current_exe()?.with_timeout(timeout));
    let mut orchestrator = MetabuildOrchestrator::new(Arc::new(git_manager(&file)), launcher);
    let variants = file.variants()?;
    if !variants.is_empty() {
        info!(variants = variants.len(), "sweeping design variants");
        orchestrator = orchestrator.with_optimizer(Arc::new(ParameterSweep::new(variants)));
    }

    println!("Metabuild {} in {:?}", base.identity.build_id, root);

    let cancel = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    match orchestrator.run_until(&base, &description, cancel).await {
        Ok(report) => {
            print_metabuild_report(&report);
            Ok(completion(report.total_nonconformities(), args.strict))
        }
        Err(e) => {
            if let Some(location) = e.failure_report().and_then(|r| r.location()) {
                eprintln!("Origin: {}", location);
            }
            eprintln!("Metabuild {} failed; repository rolled back", base.identity.build_id);
            Err(e).context("Metabuild failed")
        }
    }
}

fn print_metabuild_report(report: &MetabuildReport) {
    println!("Snapshot: {}", report.snapshot.label());
    if let Some(commit) = report.pending_work.commit_id() {
        if !report.pending_work.is_clean() {
            println!("Pending work committed as {}", commit);
        }
    }
    for build in &report.builds {
        println!(
            "  {} {} ({} units, {} nonconformities, {}ms)",
            build.baseline.label(),
            build.build_id,
            build.summary.units_processed,
            build.summary.nonconformities,
            build.summary.duration_ms
        );
        if let Some(optimization) = &build.optimization {
            println!("    best variant: {}", optimization.best);
        }
    }
    println!("Total nonconformities: {}", report.total_nonconformities());
}

async fn cmd_worker(encoded: String) -> Result<ExitCode> {
    let result = tokio::task::spawn_blocking(move || run_worker(&encoded))
        .await
        .context("Worker task failed")?
        .context("Failed to write build result")?;
    Ok(match result {
        BuildResult::Completed(_) => ExitCode::from(u8::try_from(COMPLETION_CODE).unwrap_or(0)),
        BuildResult::Failed(_) => ExitCode::FAILURE,
    })
}

fn cmd_snapshot(path: &Path, output: Option<&Path>) -> Result<ExitCode> {
    let (root, file) = open_repository(path)?;
    let baseline = git_manager(&file)
        .snapshot(&root)
        .context("Failed to snapshot repository")?;
    let json = serde_json::to_string_pretty(&baseline)?;
    match output {
        Some(out) => {
            fs::write(out, json).with_context(|| format!("Failed to write {:?}", out))?;
            println!("Snapshot {} written to {:?}", baseline.label(), out);
        }
        None => println!("{}", json),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_rollback(snapshot: &Path, path: &Path) -> Result<ExitCode> {
    let (root, file) = open_repository(path)?;
    let text = fs::read_to_string(snapshot)
        .with_context(|| format!("Failed to read snapshot {:?}", snapshot))?;
    let baseline: Baseline = serde_json::from_str(&text).context("Invalid snapshot file")?;
    git_manager(&file)
        .rollback(&root, &baseline)
        .context("Rollback failed")?;
    println!("Rolled back to {}", baseline.label());
    Ok(ExitCode::SUCCESS)
}

fn cmd_auto_commit(message: &str, path: &Path) -> Result<ExitCode> {
    let (root, file) = open_repository(path)?;
    let outcome = git_manager(&file)
        .auto_commit(&root, message)
        .context("Auto-commit failed")?;
    match (outcome.is_clean(), outcome.commit_id()) {
        (true, _) => println!("Nothing to commit"),
        (false, Some(commit)) => println!("[{}] {}", commit, message),
        (false, None) => {}
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_cms_purge(root: Option<PathBuf>, path: &Path) -> Result<ExitCode> {
    let cms_root = match root {
        Some(root) => root,
        None => {
            let (repo_root, file) = open_repository(path)?;
            file.layout().resolve(&repo_root, keys::CMS)?
        }
    };
    let removed = cms::purge_expired(&cms_root, chrono::Utc::now())
        .with_context(|| format!("Failed to purge {:?}", cms_root))?;
    for registration in &removed {
        println!("Removed {:?}", registration);
    }
    println!("Purged {} expired registrations", removed.len());
    Ok(ExitCode::SUCCESS)
}
