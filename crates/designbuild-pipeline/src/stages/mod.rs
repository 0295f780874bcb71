//! Built-in stages, in policy order.

pub mod command;
pub mod complexity;
pub mod data;
pub mod dependency;
pub mod docstyle;
pub mod spec_presence;
pub mod style;
pub mod traceability;

pub use command::ExternalCommandStage;
pub use complexity::ComplexityStage;
pub use data::DataValidationStage;
pub use dependency::DependencyRegisterStage;
pub use docstyle::DocStyleStage;
pub use spec_presence::SpecPresenceStage;
pub use style::StyleStage;
pub use traceability::TraceabilityStage;

use designbuild_core::BuildUnit;

/// The design document followed by its spec document, if any.
pub(crate) fn documents(unit: &BuildUnit) -> impl Iterator<Item = &BuildUnit> {
    std::iter::once(unit).chain(unit.spec.as_deref())
}

#[cfg(test)]
pub(crate) mod testing {
    use std::path::Path;

    use designbuild_core::syntax::{parse_document, DocumentFormat};
    use designbuild_core::{
        BuildConfig, BuildIdentity, BuildMonitor, BuildPaths, BuildUnit, Nonconformity,
        RepositoryContext, RepositoryLayout, ResponseStrategy, Result,
    };

    use crate::stage::{Stage, StageContext};
    use crate::trace::TraceIndex;

    /// An in-memory unit rooted at `root`.
    pub fn unit(root: &Path, rel: &str, content: &str) -> BuildUnit {
        let tree = DocumentFormat::detect(Path::new(rel))
            .and_then(|format| parse_document(format, content).ok());
        BuildUnit {
            abs_path: root.join(rel),
            rel_path: rel.into(),
            content: content.to_string(),
            tree,
            spec: None,
            log_dir: root.join("tmp/log/units").join(rel),
        }
    }

    pub struct Harness {
        pub config: BuildConfig,
        pub monitor: BuildMonitor,
        pub repo: RepositoryContext,
        pub index: TraceIndex,
    }

    impl Harness {
        pub fn new(root: &Path) -> Self {
            let layout = RepositoryLayout::default();
            let paths = BuildPaths::in_place(root, &layout).unwrap();
            Self {
                config: BuildConfig::new(BuildIdentity::generate("stage", "tester"), paths, layout.clone()),
                monitor: BuildMonitor::new(ResponseStrategy::Comprehensive),
                repo: RepositoryContext::new(root, layout),
                index: TraceIndex::new(),
            }
        }

        pub fn accept(&mut self, stage: &mut dyn Stage, unit: &BuildUnit) -> Result<()> {
            let mut ctx = StageContext {
                config: &self.config,
                monitor: &self.monitor,
                repo: &self.repo,
                index: &mut self.index,
            };
            stage.accept(unit, &mut ctx)
        }

        pub fn findings(&self) -> Vec<Nonconformity> {
            self.monitor.notify_build_end().nonconformities
        }
    }
}
