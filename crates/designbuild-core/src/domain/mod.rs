//! Build data model: configuration, units, nonconformities, baselines and
//! the result envelope.

pub mod baseline;
pub mod config;
pub mod envelope;
pub mod error;
pub mod nonconformity;
pub mod unit;

pub use baseline::{Baseline, Signature};
pub use config::{
    BuildConfig, BuildIdentity, BuildPaths, BuildScope, CheckSettings, ExternalCommands, StepKind,
};
pub use envelope::{BuildResult, BuildSummary, FailureReport, COMPLETION_CODE, RESULT_FILE_NAME};
pub use error::{BuildError, Result};
pub use nonconformity::{ids, Nonconformity};
pub use unit::BuildUnit;
