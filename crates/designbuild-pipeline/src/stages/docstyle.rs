use designbuild_core::outline::ItemKind;
use designbuild_core::{BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};

pub const MISSING_DOC: &str = "missing-doc";

/// Public items must carry an outer doc comment.
#[derive(Debug, Default)]
pub struct DocStyleStage;

fn describe(kind: ItemKind) -> &'static str {
    match kind {
        ItemKind::Function => "function",
        ItemKind::Struct => "struct",
        ItemKind::Enum => "enum",
        ItemKind::Union => "union",
        ItemKind::Trait => "trait",
        ItemKind::Module => "module",
        ItemKind::Const => "constant",
        ItemKind::Static => "static",
        ItemKind::TypeAlias => "type alias",
    }
}

impl Stage for DocStyleStage {
    fn kind(&self) -> StepKind {
        StepKind::DocStyle
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        let Some(outline) = unit.outline() else {
            return Ok(());
        };
        for item in outline.items.iter().filter(|i| i.public && !i.documented) {
            ctx.report(
                Nonconformity::new(
                    self.name(),
                    MISSING_DOC,
                    format!("public {} `{}` is undocumented", describe(item.kind), item.name),
                    &unit.rel_path,
                )
                .at_line(item.start_line),
            )?;
        }
        Ok(())
    }
}
