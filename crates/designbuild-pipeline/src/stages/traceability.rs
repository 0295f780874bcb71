use designbuild_core::{BuildError, BuildUnit, Result, StepKind};
use regex::Regex;

use crate::stage::{Stage, StageContext};
use crate::stages::documents;

/// Annotation linking a document line to a requirement id.
pub const TRACE_PATTERN: &str = r"trace:\s*([A-Za-z0-9_.-]+)";

/// Indexes `trace: <ID>` annotations in design and spec documents.
#[derive(Debug)]
pub struct TraceabilityStage {
    pattern: Regex,
}

impl TraceabilityStage {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(TRACE_PATTERN).map_err(|e| BuildError::Stage {
            stage: StepKind::Traceability.name().to_string(),
            message: e.to_string(),
        })?;
        Ok(Self { pattern })
    }
}

impl Stage for TraceabilityStage {
    fn kind(&self) -> StepKind {
        StepKind::Traceability
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        for (i, doc) in documents(unit).enumerate() {
            for (n, line) in doc.numbered_lines() {
                for caps in self.pattern.captures_iter(line) {
                    ctx.index.record(&caps[1], &doc.rel_path, n, i > 0);
                }
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
    fn test_indexes_design_and_spec_mentions() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        let mut design = unit(
            dir.path(),
            "src/a.rs",
            "// trace: REQ-1\npub fn a() {}\n// trace: REQ-2 and trace:REQ-3\n",
        );
        design.spec = Some(Box::new(unit(
            dir.path(),
            "src/spec/spec_a.rs",
            "// trace: REQ-1\nfn t() {}\n",
        )));

        harness.accept(&mut TraceabilityStage::new().unwrap(), &design).unwrap();

        let index = &harness.index;
        assert_eq!(index.ids().collect::<Vec<_>>(), vec!["REQ-1", "REQ-2", "REQ-3"]);
        assert_eq!(index.sites("REQ-3")[0].line, 3);
        assert_eq!(index.untested(), vec!["REQ-2", "REQ-3"]);
        assert!(harness.findings().is_empty());
    }
}
