//! Nonconformity records reported by stages, steps and the sequencer.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Well-known message identifiers produced by the core itself.
pub mod ids {
    /// A design or spec document failed to parse.
    pub const SYNTAX_ERROR: &str = "syntax-error";

    /// A spec document exists but the design document it supports does not.
    pub const MISSING_DESIGN_FILE: &str = "missing-design-file";

    /// A design document declares public functions but has no spec document.
    pub const NO_SPEC: &str = "no-spec";

    /// A design document is not valid UTF-8.
    pub const UNREADABLE: &str = "unreadable-document";
}

/// A reported design defect.
///
/// Immutable once constructed; owned by the monitor after it is reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Nonconformity {
    /// Tool (stage or component) that found the defect.
    pub tool: String,

    /// Stable message identifier.
    pub msg_id: String,

    /// Human-readable message.
    pub msg: String,

    /// Repository-relative path of the offending document.
    pub path: PathBuf,

    /// 1-based line, if known.
    pub line: Option<u32>,

    /// 1-based column, if known.
    pub col: Option<u32>,
}

impl Nonconformity {
    /// Create a nonconformity without a source position.
    pub fn new(
        tool: impl Into<String>,
        msg_id: impl Into<String>,
        msg: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Self {
        Self {
            tool: tool.into(),
            msg_id: msg_id.into(),
            msg: msg.into(),
            path: path.as_ref().to_path_buf(),
            line: None,
            col: None,
        }
    }

    /// Attach a source position.
    pub fn at(mut self, line: u32, col: u32) -> Self {
        self.line = Some(line);
        self.col = Some(col);
        self
    }

    /// Attach a line without a column.
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// `path:line:col` with missing parts omitted.
    pub fn location(&self) -> String {
        match (self.line, self.col) {
            (Some(line), Some(col)) => format!("{}:{}:{}", self.path.display(), line, col),
            (Some(line), None) => format!("{}:{}", self.path.display(), line),
            _ => self.path.display().to_string(),
        }
    }
}

impl fmt::Display for Nonconformity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}/{}] {}",
            self.location(),
            self.tool,
            self.msg_id,
            self.msg
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_formats() {
        let nc = Nonconformity::new("style", "line-too-long", "too long", "src/a.rs");
        assert_eq!(nc.location(), "src/a.rs");
        assert_eq!(nc.clone().at_line(3).location(), "src/a.rs:3");
        assert_eq!(nc.at(3, 7).location(), "src/a.rs:3:7");
    }

    #[test]
    fn test_display_includes_tool_and_id() {
        let nc = Nonconformity::new("parser", ids::SYNTAX_ERROR, "unclosed `{`", "src/b.rs").at(1, 1);
        let text = nc.to_string();
        assert!(text.contains("parser/syntax-error"));
        assert!(text.contains("unclosed"));
    }
}
