use designbuild_core::{BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};

pub const UNREGISTERED: &str = "unregistered-dependency";

/// Top-level imports must name crates listed in the dependency register.
/// Repositories without a register are not checked.
#[derive(Debug, Default)]
pub struct DependencyRegisterStage;

impl Stage for DependencyRegisterStage {
    fn kind(&self) -> StepKind {
        StepKind::DependencyRegister
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        let Some(outline) = unit.outline() else {
            return Ok(());
        };
        let Some(register) = ctx.repo.dependency_register()? else {
            return Ok(());
        };
        for import in outline.imports.iter().filter(|i| !register.allows(&i.root)) {
            ctx.report(
                Nonconformity::new(
                    self.name(),
                    UNREGISTERED,
                    format!("`{}` is not in the dependency register", import.root),
                    &unit.rel_path,
                )
                .at_line(import.line),
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{unit, Harness};
    use std::fs;

    #[test]
    fn test_unregistered_imports() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("registry")).unwrap();
        fs::write(
            dir.path().join("registry/dependencies.toml"),
            "allowed = [\"serde\"]\n",
        )
        .unwrap();
        let mut harness = Harness::new(dir.path());
        let content = "use std::fmt;\nuse serde::Serialize;\nuse regex::Regex;\n";
        harness
            .accept(&mut DependencyRegisterStage, &unit(dir.path(), "src/a.rs", content))
            .unwrap();

        let findings = harness.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
        assert!(findings[0].msg.contains("`regex`"));
    }

    #[test]
    fn test_no_register_no_findings() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        harness
            .accept(
                &mut DependencyRegisterStage,
                &unit(dir.path(), "src/a.rs", "use regex::Regex;\n"),
            )
            .unwrap();
        assert!(harness.findings().is_empty());
    }
}
