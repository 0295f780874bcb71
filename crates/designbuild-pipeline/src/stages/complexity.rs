use designbuild_core::{BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};

pub const FUNCTION_TOO_LONG: &str = "function-too-long";

/// Flags top-level functions longer than the configured limit.
#[derive(Debug)]
pub struct ComplexityStage {
    max_function_lines: usize,
}

impl ComplexityStage {
    pub fn new(max_function_lines: usize) -> Self {
        Self { max_function_lines }
    }
}

impl Stage for ComplexityStage {
    fn kind(&self) -> StepKind {
        StepKind::Complexity
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        let Some(outline) = unit.outline() else {
            return Ok(());
        };
        for function in outline.functions() {
            let lines = function.line_count() as usize;
            if lines > self.max_function_lines {
                ctx.report(
                    Nonconformity::new(
                        self.name(),
                        FUNCTION_TOO_LONG,
                        format!(
                            "function `{}` spans {lines} lines, limit {}",
                            function.name, self.max_function_lines
                        ),
                        &unit.rel_path,
                    )
                    .at_line(function.start_line),
                )?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{unit, Harness};

    #[test]
    fn test_long_function_reported_at_start() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        let content = "fn short() {}\n\nfn long() {\n    let a = 1;\n    let b = 2;\n}\n";
        harness
            .accept(&mut ComplexityStage::new(3), &unit(dir.path(), "src/a.rs", content))
            .unwrap();

        let findings = harness.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].line, Some(3));
        assert!(findings[0].msg.contains("`long` spans 4 lines"));
    }
}
