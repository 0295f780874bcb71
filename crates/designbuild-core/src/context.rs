//! Repository context: discovered root, symbolic layout table and
//! lazily-loaded registers.
//!
//! Paths are never hard-coded: every location the core reads or writes is a
//! layout key resolved against the discovered repository root.

use std::cell::OnceCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::error::{BuildError, Result};

/// Well-known layout keys.
pub mod keys {
    pub const ENV: &str = "env";
    pub const SRC: &str = "src";
    pub const TMP: &str = "tmp";
    pub const LOG: &str = "log";
    pub const ISOLATED: &str = "isolated";
    pub const CMS: &str = "cms";
    pub const REGISTRY: &str = "registry";
}

/// File name of the dependency register inside the `registry` directory.
pub const DEPENDENCY_REGISTER_FILE: &str = "dependencies.toml";

/// Symbolic path key table, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryLayout(BTreeMap<String, PathBuf>);

impl Default for RepositoryLayout {
    fn default() -> Self {
        let entries = [
            (keys::ENV, "env"),
            (keys::SRC, "src"),
            (keys::TMP, "tmp"),
            (keys::LOG, "tmp/log"),
            (keys::ISOLATED, "tmp/isolated"),
            (keys::CMS, "tmp/cms"),
            (keys::REGISTRY, "registry"),
        ];
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), PathBuf::from(v)))
                .collect(),
        )
    }
}

impl RepositoryLayout {
    /// Resolve `key` against `root`.
    pub fn resolve(&self, root: &Path, key: &str) -> Result<PathBuf> {
        self.0
            .get(key)
            .map(|rel| root.join(rel))
            .ok_or_else(|| BuildError::UnknownLayoutKey(key.to_string()))
    }

    /// Override or add an entry.
    pub fn with_entry(mut self, key: impl Into<String>, rel: impl Into<PathBuf>) -> Self {
        self.0.insert(key.into(), rel.into());
        self
    }

    /// Apply overrides from a configuration file.
    pub fn merged(mut self, overrides: &BTreeMap<String, PathBuf>) -> Self {
        for (key, rel) in overrides {
            self.0.insert(key.clone(), rel.clone());
        }
        self
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Crates a design document may import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DependencyRegister {
    #[serde(default)]
    allowed: BTreeSet<String>,
}

impl DependencyRegister {
    const BUILTIN: [&'static str; 7] = ["std", "core", "alloc", "crate", "self", "super", "proc_macro"];

    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        toml::from_str(&text)
            .map_err(|e| BuildError::InvalidConfig(format!("{}: {e}", path.display())))
    }

    /// Whether `root` may be imported.
    pub fn allows(&self, root: &str) -> bool {
        Self::BUILTIN.contains(&root) || self.allowed.contains(root)
    }
}

/// Explicit per-repository context passed to the sequencer, pipeline and
/// orchestrator.
#[derive(Debug)]
pub struct RepositoryContext {
    root: PathBuf,
    layout: RepositoryLayout,
    register: OnceCell<Option<DependencyRegister>>,
}

impl RepositoryContext {
    pub fn new(root: impl Into<PathBuf>, layout: RepositoryLayout) -> Self {
        Self {
            root: root.into(),
            layout,
            register: OnceCell::new(),
        }
    }

    /// Walk up from `start` to the directory containing `.git`.
    pub fn discover(start: &Path, layout: RepositoryLayout) -> Result<Self> {
        let start = fs::canonicalize(start).map_err(|e| BuildError::io(start, e))?;
        let root = start
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .ok_or_else(|| BuildError::RepositoryNotFound(start.clone()))?;
        debug!(root = %root.display(), "discovered repository root");
        Ok(Self::new(root, layout))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn layout(&self) -> &RepositoryLayout {
        &self.layout
    }

    pub fn path(&self, key: &str) -> Result<PathBuf> {
        self.layout.resolve(&self.root, key)
    }

    /// Dependency register, loaded on first use; `None` when the repository
    /// has no register file.
    pub fn dependency_register(&self) -> Result<Option<&DependencyRegister>> {
        if let Some(cached) = self.register.get() {
            return Ok(cached.as_ref());
        }
        let path = self.path(keys::REGISTRY)?.join(DEPENDENCY_REGISTER_FILE);
        let loaded = if path.is_file() {
            Some(DependencyRegister::load(&path)?)
        } else {
            None
        };
        let _ = self.register.set(loaded);
        Ok(self.register.get().and_then(Option::as_ref))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_resolves() {
        let layout = RepositoryLayout::default();
        assert_eq!(
            layout.resolve(Path::new("/r"), keys::LOG).unwrap(),
            PathBuf::from("/r/tmp/log")
        );
        assert!(matches!(
            layout.resolve(Path::new("/r"), "nope"),
            Err(BuildError::UnknownLayoutKey(_))
        ));
    }

    #[test]
    fn test_layout_override() {
        let layout = RepositoryLayout::default().with_entry(keys::SRC, "design");
        assert_eq!(
            layout.resolve(Path::new("/r"), keys::SRC).unwrap(),
            PathBuf::from("/r/design")
        );
    }

    #[test]
    fn test_discover_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join(".git")).unwrap();
        fs::create_dir_all(dir.path().join("src/deep")).unwrap();
        let ctx = RepositoryContext::discover(&dir.path().join("src/deep"), RepositoryLayout::default())
            .unwrap();
        assert_eq!(ctx.root(), fs::canonicalize(dir.path()).unwrap());
    }

    #[test]
    fn test_register_is_cached_and_optional() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = RepositoryContext::new(dir.path(), RepositoryLayout::default());
        assert!(ctx.dependency_register().unwrap().is_none());

        fs::create_dir_all(dir.path().join("registry")).unwrap();
        fs::write(
            dir.path().join("registry").join(DEPENDENCY_REGISTER_FILE),
            "allowed = [\"serde\"]\n",
        )
        .unwrap();
        // first answer is memoized for the lifetime of the context
        assert!(ctx.dependency_register().unwrap().is_none());

        let fresh = RepositoryContext::new(dir.path(), RepositoryLayout::default());
        let register = fresh.dependency_register().unwrap().unwrap();
        assert!(register.allows("serde"));
        assert!(register.allows("std"));
        assert!(!register.allows("reqwest"));
    }
}
