use designbuild_core::{ids, BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};

/// Flags design documents that declare public functions but have no spec
/// document.
#[derive(Debug, Default)]
pub struct SpecPresenceStage;

impl Stage for SpecPresenceStage {
    fn kind(&self) -> StepKind {
        StepKind::SpecPresence
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        if unit.has_spec() {
            return Ok(());
        }
        let Some(outline) = unit.outline() else {
            return Ok(());
        };
        if outline.public_functions().next().is_none() {
            return Ok(());
        }
        ctx.report(Nonconformity::new(
            self.name(),
            ids::NO_SPEC,
            format!("no spec found for module: {}", unit.rel_path.display()),
            &unit.rel_path,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::testing::{unit, Harness};

    #[test]
    fn test_public_function_without_spec() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        let design = unit(dir.path(), "src/a.rs", "pub fn a() {}\n");
        harness.accept(&mut SpecPresenceStage, &design).unwrap();

        let findings = harness.findings();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].msg, "no spec found for module: src/a.rs");
    }

    #[test]
    fn test_private_items_and_unparsed_units_pass() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        let private = unit(dir.path(), "src/a.rs", "fn helper() {}\npub struct S;\n");
        let broken = unit(dir.path(), "src/b.rs", "pub fn b() {\n");
        assert!(broken.tree.is_none());

        harness.accept(&mut SpecPresenceStage, &private).unwrap();
        harness.accept(&mut SpecPresenceStage, &broken).unwrap();
        assert!(harness.findings().is_empty());
    }

    #[test]
    fn test_spec_satisfies() {
        let dir = tempfile::tempdir().unwrap();
        let mut harness = Harness::new(dir.path());
        let mut design = unit(dir.path(), "src/a.rs", "pub fn a() {}\n");
        design.spec = Some(Box::new(unit(dir.path(), "src/spec/spec_a.rs", "fn t() {}\n")));
        harness.accept(&mut SpecPresenceStage, &design).unwrap();
        assert!(harness.findings().is_empty());
    }
}
