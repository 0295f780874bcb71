//! Launching subsidiary builds in isolated processes.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::warn;

use crate::domain::config::BuildConfig;
use crate::domain::envelope::BuildResult;
use crate::domain::error::BuildError;
use crate::metabuild::error::{MetabuildError, MetabuildResult};
use crate::obs;

/// Runs one subsidiary build and returns its decoded result envelope.
///
/// Inject [`SubprocessLauncher`] in production, or a stub for tests.
#[async_trait]
pub trait BuildLauncher: Send + Sync {
    async fn launch(&self, config: &BuildConfig) -> MetabuildResult<BuildResult>;
}

/// Launches `<program> <args..> <base64 config>` in the build's workspace.
///
/// The encoded configuration is the child's only input; the result file
/// named in it is the only output.
#[derive(Debug, Clone)]
pub struct SubprocessLauncher {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl SubprocessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            timeout: None,
        }
    }

    /// Re-invoke the running executable's hidden `worker` subcommand.
    pub fn current_exe() -> MetabuildResult<Self> {
        let exe = std::env::current_exe().map_err(|e| BuildError::io("current executable", e))?;
        Ok(Self::new(exe, vec!["worker".to_string()]))
    }

    /// Kill the child and fail after `timeout`. `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl BuildLauncher for SubprocessLauncher {
    async fn launch(&self, config: &BuildConfig) -> MetabuildResult<BuildResult> {
        let build_id = config.identity.build_id.clone();
        let result_file = config.paths.result_file.clone().ok_or_else(|| {
            BuildError::InvalidConfig(format!("subsidiary build {build_id} has no result file"))
        })?;

        match fs::remove_file(&result_file) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(&result_file, e).into()),
        }

        let encoded = config.encode()?;
        let workspace = &config.paths.workspace_root;
        obs::emit_subsidiary_launched(&build_id, workspace);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(encoded)
            .current_dir(workspace)
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| MetabuildError::Launch {
                build_id: build_id.clone(),
                source,
            })?;

        let waited = match self.timeout {
            Some(timeout) => {
                let bounded = tokio::time::timeout(timeout, child.wait()).await;
                match bounded {
                    Ok(waited) => waited,
                    Err(_) => {
                        if let Err(e) = child.kill().await {
                            warn!(build_id = %build_id, error = %e, "failed to kill timed-out build");
                        }
                        return Err(MetabuildError::Timeout { build_id, timeout });
                    }
                }
            }
            None => child.wait().await,
        };
        let status = waited.map_err(|source| MetabuildError::Launch {
            build_id: build_id.clone(),
            source,
        })?;

        if !result_file.is_file() {
            return Err(if status.success() {
                MetabuildError::MissingResultFile {
                    build_id,
                    path: result_file,
                }
            } else {
                MetabuildError::SubprocessCrashed {
                    build_id,
                    status: status.to_string(),
                }
            });
        }

        let result = BuildResult::read_from(&result_file)?;
        obs::emit_subsidiary_collected(&build_id, result.is_completed());
        Ok(result)
    }
}
