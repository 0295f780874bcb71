//! designbuild core library
//!
//! Build units and their sequencing, the build monitor, the version-control
//! transaction manager and metabuild orchestration.

pub mod cms;
pub mod context;
pub mod domain;
pub mod metabuild;
pub mod monitor;
pub mod obs;
pub mod outline;
pub mod sequencer;
pub mod syntax;
pub mod telemetry;
pub mod vcs;

pub use context::{keys, DependencyRegister, RepositoryContext, RepositoryLayout};

pub use domain::{
    ids, Baseline, BuildConfig, BuildError, BuildIdentity, BuildPaths, BuildResult, BuildScope,
    BuildSummary, BuildUnit, CheckSettings, ExternalCommands, FailureReport, Nonconformity,
    Result, Signature, StepKind, COMPLETION_CODE, RESULT_FILE_NAME,
};

pub use metabuild::{
    BuildLauncher, DesignEvaluator, DesignOptimizer, MetabuildError, MetabuildOrchestrator,
    MetabuildPhase, MetabuildReport, MetabuildResult, OptimizationOutcome, ParameterSweep,
    SubprocessLauncher,
};

pub use monitor::{BuildMonitor, BuildReport, ResponseStrategy};
pub use outline::{ItemKind, OutlineItem, SourceOutline};
pub use sequencer::{BuildUnitSequencer, Restriction};
pub use syntax::{DocumentFormat, SyntaxError, SyntaxTree};
pub use vcs::{CommitIdentity, CommitOutcome, GitTransactionManager, TransactionManager, VcsError};

/// designbuild version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
