//! Build Unit Sequencer.
//!
//! Three composed stages turn the workspace into an ordered stream of
//! [`BuildUnit`]s:
//!
//! 1. candidate generation: changed files first, then (unless the build is
//!    restricted to changed files) every other recognized document under the
//!    source root in sorted walk order;
//! 2. normalization: spec documents map to the design document they support,
//!    other files under a `spec/` directory are dropped, duplicates are
//!    removed;
//! 3. restriction filtering.
//!
//! The stream is lazy: a unit is loaded only when the consumer asks for the
//! next one, and a document's file handle is closed before it is yielded.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::context::keys;
use crate::domain::config::BuildConfig;
use crate::domain::error::{BuildError, Result};
use crate::domain::nonconformity::{ids, Nonconformity};
use crate::domain::unit::BuildUnit;
use crate::monitor::BuildMonitor;
use crate::syntax::{parse_document, DocumentFormat};

/// Directory holding spec documents and their test data.
pub const SPEC_DIR: &str = "spec";

/// Prefix of a spec document's file name.
pub const SPEC_PREFIX: &str = "spec_";

const TOOL: &str = "sequencer";
const PARSER_TOOL: &str = "parser";

/// What a workspace path is, for normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathRole {
    Design,
    /// Spec document supporting `design`.
    Spec { design: PathBuf },
    /// Test data or test configuration.
    TestSupport,
}

/// Classify a workspace-relative path.
pub fn classify(rel: &Path) -> PathRole {
    let parent = rel.parent().unwrap_or_else(|| Path::new(""));
    let in_spec_dir = parent.file_name().is_some_and(|n| n == SPEC_DIR);
    let file_name = rel.file_name().and_then(|n| n.to_str()).unwrap_or_default();

    if in_spec_dir {
        if let Some(design_name) = file_name.strip_prefix(SPEC_PREFIX) {
            if !design_name.is_empty() {
                let design_dir = parent.parent().unwrap_or_else(|| Path::new(""));
                return PathRole::Spec {
                    design: design_dir.join(design_name),
                };
            }
        }
    }
    let under_spec = parent
        .components()
        .any(|c| matches!(c, Component::Normal(n) if n == SPEC_DIR));
    if under_spec {
        PathRole::TestSupport
    } else {
        PathRole::Design
    }
}

/// Spec document path for a design document.
pub fn spec_path_for(design: &Path) -> PathBuf {
    let parent = design.parent().unwrap_or_else(|| Path::new(""));
    let file_name = design
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent.join(SPEC_DIR).join(format!("{SPEC_PREFIX}{file_name}"))
}

/// Design-element or subsystem names a build is limited to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Restriction {
    names: BTreeSet<String>,
}

impl Restriction {
    pub fn new(names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Whether any path segment (or the file stem) is a restricted name.
    /// An empty restriction admits everything.
    pub fn admits(&self, path: &Path) -> bool {
        if self.names.is_empty() {
            return true;
        }
        let segment_hit = path
            .components()
            .filter_map(|c| match c {
                Component::Normal(n) => n.to_str(),
                _ => None,
            })
            .any(|segment| self.names.contains(segment));
        segment_hit
            || path
                .file_stem()
                .and_then(|s| s.to_str())
                .is_some_and(|stem| self.names.contains(stem))
    }

    pub fn filter(&self, paths: impl IntoIterator<Item = PathBuf>) -> Vec<PathBuf> {
        paths.into_iter().filter(|p| self.admits(p)).collect()
    }
}

type Walker = walkdir::FilterEntry<walkdir::IntoIter, Box<dyn FnMut(&DirEntry) -> bool>>;

/// Lazy, finite, non-restartable sequence of build units.
pub struct BuildUnitSequencer<'a> {
    config: &'a BuildConfig,
    monitor: &'a BuildMonitor,
    workspace: PathBuf,
    restriction: Restriction,
    changed: std::vec::IntoIter<PathBuf>,
    walker: Option<Walker>,
    seen_raw: HashSet<PathBuf>,
    seen_design: HashSet<PathBuf>,
    finished: bool,
}

impl<'a> BuildUnitSequencer<'a> {
    pub fn new(config: &'a BuildConfig, monitor: &'a BuildMonitor) -> Result<Self> {
        let workspace = config.paths.workspace_root.clone();
        let source_root = config.source_root()?;
        let source_rel = source_root
            .strip_prefix(&workspace)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let changed: Vec<PathBuf> = config
            .scope
            .changed_files
            .iter()
            .filter(|rel| rel.starts_with(&source_rel))
            .filter(|rel| DocumentFormat::detect(rel).is_some())
            .filter(|rel| workspace.join(rel).is_file())
            .cloned()
            .collect();

        let walker = if config.scope.changed_only || !source_root.is_dir() {
            None
        } else {
            let scratch = config.layout.resolve(&workspace, keys::TMP)?;
            let visible: Box<dyn FnMut(&DirEntry) -> bool> = Box::new(move |entry| {
                let hidden = entry.depth() > 0
                    && entry.file_name().to_str().is_some_and(|n| n.starts_with('.'));
                !hidden && !entry.path().starts_with(&scratch)
            });
            Some(
                WalkDir::new(&source_root)
                    .sort_by_file_name()
                    .into_iter()
                    .filter_entry(visible),
            )
        };

        debug!(
            changed = changed.len(),
            source_root = %source_root.display(),
            changed_only = config.scope.changed_only,
            "sequencer initialised"
        );

        Ok(Self {
            config,
            monitor,
            workspace,
            restriction: Restriction::new(config.scope.restriction.iter().cloned()),
            changed: changed.into_iter(),
            walker,
            seen_raw: HashSet::new(),
            seen_design: HashSet::new(),
            finished: false,
        })
    }

    /// Next raw candidate, workspace-relative.
    fn next_candidate(&mut self) -> Result<Option<PathBuf>> {
        if let Some(rel) = self.changed.next() {
            return Ok(Some(rel));
        }
        let Some(walker) = self.walker.as_mut() else {
            return Ok(None);
        };
        for entry in walker.by_ref() {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                BuildError::io(path, std::io::Error::new(ErrorKind::Other, e.to_string()))
            })?;
            if !entry.file_type().is_file() || DocumentFormat::detect(entry.path()).is_none() {
                continue;
            }
            if let Ok(rel) = entry.path().strip_prefix(&self.workspace) {
                return Ok(Some(rel.to_path_buf()));
            }
        }
        self.walker = None;
        Ok(None)
    }

    /// Normalize a raw candidate into a design path, if it yields one.
    fn normalize(&mut self, rel: PathBuf) -> Result<Option<PathBuf>> {
        let design = match classify(&rel) {
            PathRole::Design => rel,
            PathRole::TestSupport => return Ok(None),
            PathRole::Spec { design } => {
                if !self.workspace.join(&design).is_file() {
                    let msg = format!(
                        "design document {} not found for spec document",
                        design.display()
                    );
                    self.monitor.report_nonconformity(Nonconformity::new(
                        TOOL,
                        ids::MISSING_DESIGN_FILE,
                        msg,
                        &rel,
                    ))?;
                    return Ok(None);
                }
                design
            }
        };
        if !self.seen_design.insert(design.clone()) {
            return Ok(None);
        }
        Ok(Some(design))
    }

    fn next_unit(&mut self) -> Result<Option<BuildUnit>> {
        while let Some(rel) = self.next_candidate()? {
            if !self.seen_raw.insert(rel.clone()) {
                continue;
            }
            let Some(design) = self.normalize(rel)? else {
                continue;
            };
            if !self.restriction.admits(&design) {
                debug!(path = %design.display(), "outside restriction");
                continue;
            }
            return self.load(design).map(Some);
        }
        Ok(None)
    }

    fn load(&self, rel: PathBuf) -> Result<BuildUnit> {
        let spec_rel = spec_path_for(&rel);
        let mut unit = self.load_document(rel)?;
        if self.workspace.join(&spec_rel).is_file() {
            unit.spec = Some(Box::new(self.load_document(spec_rel)?));
        }
        Ok(unit)
    }

    /// Read and parse one document. Document-level problems become
    /// nonconformities; the unit is still produced.
    fn load_document(&self, rel: PathBuf) -> Result<BuildUnit> {
        let abs_path = self.workspace.join(&rel);
        let (content, readable) = match fs::read_to_string(&abs_path) {
            Ok(content) => (content, true),
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                self.monitor.report_nonconformity(Nonconformity::new(
                    TOOL,
                    ids::UNREADABLE,
                    "document is not valid UTF-8",
                    &rel,
                ))?;
                (String::new(), false)
            }
            Err(e) => return Err(BuildError::io(abs_path, e)),
        };

        let tree = match DocumentFormat::detect(&rel).filter(|_| readable) {
            Some(format) => match parse_document(format, &content) {
                Ok(tree) => Some(tree),
                Err(e) => {
                    self.monitor.report_nonconformity(
                        Nonconformity::new(PARSER_TOOL, ids::SYNTAX_ERROR, e.message, &rel)
                            .at(e.line, e.col),
                    )?;
                    None
                }
            },
            None => None,
        };

        Ok(BuildUnit {
            log_dir: self.config.paths.log_root.join("units").join(&rel),
            abs_path,
            rel_path: rel,
            content,
            tree,
            spec: None,
        })
    }
}

impl Iterator for BuildUnitSequencer<'_> {
    type Item = Result<BuildUnit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_unit() {
            Ok(Some(unit)) => Some(Ok(unit)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

impl std::iter::FusedIterator for BuildUnitSequencer<'_> {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_spec_document() {
        assert_eq!(
            classify(Path::new("src/geo/spec/spec_area.rs")),
            PathRole::Spec {
                design: PathBuf::from("src/geo/area.rs")
            }
        );
        assert_eq!(classify(Path::new("src/geo/area.rs")), PathRole::Design);
        assert_eq!(
            classify(Path::new("src/geo/spec/data/fixture.json")),
            PathRole::TestSupport
        );
        assert_eq!(classify(Path::new("src/geo/spec/conftest.toml")), PathRole::TestSupport);
    }

    #[test]
    fn test_spec_path_for_design() {
        assert_eq!(
            spec_path_for(Path::new("src/geo/area.rs")),
            PathBuf::from("src/geo/spec/spec_area.rs")
        );
    }

    #[test]
    fn test_restriction_matches_segments_and_stem() {
        let restriction = Restriction::new(["geo"]);
        assert!(restriction.admits(Path::new("src/geo/area.rs")));
        assert!(restriction.admits(Path::new("src/geo.rs")));
        assert!(!restriction.admits(Path::new("src/geometry/area.rs")));
        assert!(Restriction::default().admits(Path::new("anything.rs")));
    }
}
