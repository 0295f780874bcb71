//! The unit of work flowing through the pipeline.

use std::path::{Path, PathBuf};

use crate::outline::SourceOutline;
use crate::syntax::{DocumentFormat, SyntaxTree};

/// A design document plus its optional spec document.
///
/// The spec sub-record has the same shape as its parent. A unit is built by
/// the sequencer, read by every stage, and dropped once the pipeline has
/// processed it.
#[derive(Debug, Clone)]
pub struct BuildUnit {
    pub abs_path: PathBuf,

    /// Path relative to the workspace root; used in every report.
    pub rel_path: PathBuf,

    pub content: String,

    /// Parsed tree; `None` when the format is unrecognized or parsing failed.
    pub tree: Option<SyntaxTree>,

    pub spec: Option<Box<BuildUnit>>,

    pub log_dir: PathBuf,
}

impl BuildUnit {
    pub fn format(&self) -> Option<DocumentFormat> {
        DocumentFormat::detect(&self.abs_path)
    }

    pub fn outline(&self) -> Option<&SourceOutline> {
        self.tree.as_ref().and_then(SyntaxTree::outline)
    }

    pub fn has_spec(&self) -> bool {
        self.spec.is_some()
    }

    /// File name, used to look up per-document settings.
    pub fn file_name(&self) -> Option<&str> {
        self.rel_path.file_name().and_then(|n| n.to_str())
    }

    pub fn path(&self) -> &Path {
        &self.rel_path
    }

    /// Content split into lines, numbered from 1.
    pub fn numbered_lines(&self) -> impl Iterator<Item = (u32, &str)> {
        self.content.lines().zip(1u32..).map(|(l, n)| (n, l))
    }
}
