//! Recognized document formats and their parsed trees.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::outline::{parse_outline, SourceOutline};

pub use crate::outline::SyntaxError;

/// Formats the sequencer knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentFormat {
    RustSource,
    Json,
    Toml,
}

impl DocumentFormat {
    /// Format for `path`, by extension.
    pub fn detect(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rs" => Some(DocumentFormat::RustSource),
            "json" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            _ => None,
        }
    }

    pub fn is_data(&self) -> bool {
        !matches!(self, DocumentFormat::RustSource)
    }
}

/// A parsed design or spec document.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntaxTree {
    Outline(SourceOutline),
    Json(serde_json::Value),
    Toml(toml::Value),
}

impl SyntaxTree {
    pub fn outline(&self) -> Option<&SourceOutline> {
        match self {
            SyntaxTree::Outline(outline) => Some(outline),
            _ => None,
        }
    }

    /// Top-level keys of a data document, in document order where the
    /// format preserves it.
    pub fn top_level_keys(&self) -> Option<Vec<&str>> {
        match self {
            SyntaxTree::Json(serde_json::Value::Object(map)) => {
                Some(map.keys().map(String::as_str).collect())
            }
            SyntaxTree::Toml(toml::Value::Table(table)) => {
                Some(table.keys().map(String::as_str).collect())
            }
            _ => None,
        }
    }
}

/// Parse `content` as `format`.
pub fn parse_document(format: DocumentFormat, content: &str) -> Result<SyntaxTree, SyntaxError> {
    match format {
        DocumentFormat::RustSource => parse_outline(content).map(SyntaxTree::Outline),
        DocumentFormat::Json => serde_json::from_str(content)
            .map(SyntaxTree::Json)
            .map_err(|e| SyntaxError {
                message: e.to_string(),
                line: e.line() as u32,
                col: e.column() as u32,
            }),
        DocumentFormat::Toml => toml::from_str::<toml::Table>(content)
            .map(|table| SyntaxTree::Toml(toml::Value::Table(table)))
            .map_err(|e| {
                let (line, col) = e
                    .span()
                    .map(|span| line_col(content, span.start))
                    .unwrap_or((1, 1));
                SyntaxError {
                    message: e.message().to_string(),
                    line,
                    col,
                }
            }),
    }
}

/// 1-based line and column of a byte offset.
fn line_col(content: &str, offset: usize) -> (u32, u32) {
    let prefix = &content[..offset.min(content.len())];
    let line = prefix.matches('\n').count() + 1;
    let col = prefix.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;
    (line as u32, col as u32)
}
