//! Metabuild layer: orchestrates complete builds across baselines and
//! design variants, each in its own process.

pub mod error;
pub mod launcher;
pub mod optimizer;
pub mod orchestrator;

pub use error::{MetabuildError, MetabuildResult};
pub use launcher::{BuildLauncher, SubprocessLauncher};
pub use optimizer::{DesignEvaluator, DesignOptimizer, Evaluation, OptimizationOutcome, ParameterSweep};
pub use orchestrator::{
    workspace_name, BaselineBuild, MetabuildOrchestrator, MetabuildPhase, MetabuildReport,
};
