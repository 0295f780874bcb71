//! Line-level style checks on Rust design and spec documents.

use designbuild_core::syntax::DocumentFormat;
use designbuild_core::{BuildUnit, Nonconformity, Result, StepKind};

use crate::stage::{Stage, StageContext};
use crate::stages::documents;

pub mod msg {
    pub const LINE_TOO_LONG: &str = "line-too-long";
    pub const TRAILING_WHITESPACE: &str = "trailing-whitespace";
    pub const TAB_INDENT: &str = "tab-indent";
}

#[derive(Debug)]
pub struct StyleStage {
    max_line_length: usize,
}

impl StyleStage {
    pub fn new(max_line_length: usize) -> Self {
        Self { max_line_length }
    }

    fn check(&self, doc: &BuildUnit) -> Vec<Nonconformity> {
        let tool = StepKind::Style.name();
        let mut found = Vec::new();
        for (n, line) in doc.numbered_lines() {
            let width = line.chars().count();
            if width > self.max_line_length {
                found.push(
                    Nonconformity::new(
                        tool,
                        msg::LINE_TOO_LONG,
                        format!("line is {width} characters, limit {}", self.max_line_length),
                        &doc.rel_path,
                    )
                    .at(n, self.max_line_length as u32 + 1),
                );
            }
            let trimmed = line.trim_end();
            if trimmed.len() != line.len() {
                found.push(
                    Nonconformity::new(tool, msg::TRAILING_WHITESPACE, "trailing whitespace", &doc.rel_path)
                        .at(n, trimmed.chars().count() as u32 + 1),
                );
            }
            let indent = &line[..line.len() - line.trim_start().len()];
            if indent.contains('\t') {
                found.push(
                    Nonconformity::new(tool, msg::TAB_INDENT, "indented with a tab", &doc.rel_path)
                        .at_line(n),
                );
            }
        }
        found
    }
}

impl Stage for StyleStage {
    fn kind(&self) -> StepKind {
        StepKind::Style
    }

    fn accept(&mut self, unit: &BuildUnit, ctx: &mut StageContext<'_>) -> Result<()> {
        for doc in documents(unit) {
            if doc.format() != Some(DocumentFormat::RustSource) {
                continue;
            }
            for nc in self.check(doc) {
                ctx.report(nc)?;
            }
        }
        Ok(())
    }
}
