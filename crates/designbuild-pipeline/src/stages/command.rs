//! Stages delegating to an external tool.
//!
//! The argument template may use `{path}` and `{spec}`, substituted with the
//! absolute paths of the design document and its spec document. A non-zero
//! exit is one nonconformity; the tool's combined output is kept in the
//! unit's log directory.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use designbuild_core::{BuildError, BuildUnit, Nonconformity, Result, StepKind};
use regex::Regex;
use tracing::debug;

use crate::stage::{Stage, StageContext};

pub const COMMAND_FAILED: &str = "command-failed";

/// `file:line[:col]: message` lines in tool output.
const DIAGNOSTIC_PATTERN: &str = r"(?m)^(?P<file>[^:\n]+):(?P<line>\d+)(?::(?P<col>\d+))?:\s*(?P<msg>.*)$";

#[derive(Debug)]
pub struct ExternalCommandStage {
    kind: StepKind,
    label: String,
    template: Vec<String>,
    diagnostic: Regex,
}

impl ExternalCommandStage {
    pub fn new(kind: StepKind, template: Vec<String>) -> Result<Self> {
        let stage_error = |message: String| BuildError::Stage {
            stage: kind.name().to_string(),
            message,
        };
        if template.is_empty() {
            return Err(stage_error("command template is empty".to_string()));
        }
        let diagnostic = Regex::new(DIAGNOSTIC_PATTERN).map_err(|e| stage_error(e.to_string()))?;
        Ok(Self {
            kind,
            label: kind.name().to_string(),
            template,
            diagnostic,
        })
    }

    /// Distinguish several instances of one stage kind, e.g. one per compiler.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Substituted argv, or `None` when the template needs a spec document
    /// the unit does not have.
    fn argv(&self, unit: &BuildUnit) -> Option<Vec<String>> {
        let path = unit.abs_path.display().to_string();
        let spec = unit.spec.as_ref().map(|s| s.abs_path.display().to_string());
        self.template
            .iter()
            .map(|arg| {
                let arg = arg.replace("{path}", &path);
                if arg.contains("{spec}") {
                    spec.as_deref().map(|s| arg.replace("{spec}", s))
                } else {
                    Some(arg)
                }
            })
            .collect()
    }

    fn run(&self, argv: &[String], cwd: &Path) -> Result<Output> {
        let (program, args) = argv.split_first().ok_or_else(|| BuildError::Stage {
            stage: self.label.clone(),
            message: "command template is empty".to_string(),
        })?;
        Command::new(program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|e| BuildError::Stage {
                stage: self.label.clone(),
                message: format!("failed to run `{program}`: {e}"),
            })
    }

    fn keep_log(&self, unit: &BuildUnit, output: &Output) -> Result<()> {
        fs::create_dir_all(&unit.log_dir).map_err(|e| BuildError::io(&unit.log_dir, e))?;
        let path = unit.log_dir.join(format!("{}.log", self.label));
        let mut log = output.stdout.clone();
        log.extend_from_slice(&output.stderr);
        fs::write(&path, log).map_err(|e| BuildError::io(&path, e))
    }

    /// Nonconformity for a failed run, positioned at the first diagnostic
    /// that names the unit's file.
    fn finding(&self, unit: &BuildUnit, program: &str, output: &Output) -> Nonconformity {
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        let file_name = unit.file_name().unwrap_or_default();
        let located = self.diagnostic.captures_iter(&text).find(|caps| {
            !file_name.is_empty() && caps["file"].trim().ends_with(file_name)
        });
        match located {
            Some(caps) => {
                let line = caps["line"].parse().unwrap_or(1);
                let nc = Nonconformity::new(&self.label, COMMAND_FAILED, caps["msg"].trim(), &unit.rel_path);
                match caps.name("col").and_then(|c| c.as_str().parse().ok()) {
                    Some(col) => nc.at(line, col),
                    None => nc.at_line(line),
                }
            }
            None => Nonconformity::new(
                &self.label,
                COMMAND_FAILED,
                format!("`{program}` exited with {}", output.status),
                &unit.rel_path,
            ),
        }
    }
}

impl Stage for ExternalCommandStage {
    fn kind(&self) -> StepKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.label
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        let Some(argv) = self.argv(unit) else {
            debug!(stage = %self.label, path = %unit.rel_path.display(), "no spec document; skipped");
            return Ok(());
        };
        let output = self.run(&argv, &ctx.config.paths.workspace_root)?;
        if output.status.success() {
            return Ok(());
        }
        self.keep_log(unit, &output)?;
        ctx.report(self.finding(unit, &argv[0], &output))
    }
}
