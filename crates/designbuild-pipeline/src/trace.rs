//! Traceability index: requirement ids to the documents that mention them.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Where a requirement id was mentioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSite {
    pub path: PathBuf,
    pub line: u32,
    /// Mentioned from a spec document rather than a design document.
    pub from_spec: bool,
}

/// Aggregate threaded through the pipeline, one unit at a time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceIndex {
    entries: BTreeMap<String, Vec<TraceSite>>,
}

impl TraceIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, id: impl Into<String>, path: &Path, line: u32, from_spec: bool) {
        self.entries.entry(id.into()).or_default().push(TraceSite {
            path: path.to_path_buf(),
            line,
            from_spec,
        });
    }

    pub fn sites(&self, id: &str) -> &[TraceSite] {
        self.entries.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Ids mentioned in design documents but never in a spec document.
    pub fn untested(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(_, sites)| !sites.iter().any(|s| s.from_spec))
            .map(|(id, _)| id.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_untested_ids() {
        let mut index = TraceIndex::new();
        index.record("REQ-1", Path::new("src/a.rs"), 3, false);
        index.record("REQ-1", Path::new("src/spec/spec_a.rs"), 1, true);
        index.record("REQ-2", Path::new("src/a.rs"), 9, false);

        assert_eq!(index.len(), 2);
        assert_eq!(index.untested(), vec!["REQ-2"]);
        assert_eq!(index.sites("REQ-1").len(), 2);
        assert!(index.sites("REQ-3").is_empty());
    }
}
