//! Data-document validation against per-document required keys.

use std::collections::{BTreeMap, BTreeSet};

use designbuild_core::{BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};

pub const MISSING_KEY: &str = "missing-key";
pub const NOT_A_TABLE: &str = "not-a-table";

/// Schemas are compiled once, when the stage is built, and reused for every
/// unit.
#[derive(Debug, Default)]
pub struct DataValidationStage {
    schemas: BTreeMap<String, BTreeSet<String>>,
}

impl DataValidationStage {
    pub fn new(schemas: &BTreeMap<String, Vec<String>>) -> Self {
        let schemas = schemas
            .iter()
            .map(|(file, keys)| (file.clone(), keys.iter().cloned().collect()))
            .collect();
        Self { schemas }
    }
}

impl Stage for DataValidationStage {
    fn kind(&self) -> StepKind {
        StepKind::DataValidation
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        if !unit.format().is_some_and(|f| f.is_data()) {
            return Ok(());
        }
        let Some(required) = unit.file_name().and_then(|name| self.schemas.get(name)) else {
            return Ok(());
        };
        // unparsable documents were already reported by the sequencer
        let Some(tree) = unit.tree.as_ref() else {
            return Ok(());
        };
        let Some(present) = tree.top_level_keys() else {
            return ctx.report(Nonconformity::new(
                self.name(),
                NOT_A_TABLE,
                "data document is not a table of keys",
                &unit.rel_path,
            ));
        };
        let present: BTreeSet<&str> = present.into_iter().collect();
        for key in required.iter().filter(|k| !present.contains(k.as_str())) {
            ctx.report(Nonconformity::new(
                self.name(),
                MISSING_KEY,
                format!("required key `{key}` is missing"),
                &unit.rel_path,
            ))?;
        }
        Ok(())
    }
}
