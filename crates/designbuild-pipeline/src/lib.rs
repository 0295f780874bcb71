//! designbuild pipeline
//!
//! Drives a single build:
//! - routes each build unit through the enabled stages in policy order
//! - runs whole-design steps once the unit loop is done
//! - marshals the outcome across the subprocess boundary (`worker`)

pub mod coordinator;
pub mod design_steps;
pub mod pipeline;
pub mod stage;
pub mod stages;
pub mod trace;
pub mod worker;

pub use coordinator::{BuildCoordinator, BuildOutcome};
pub use design_steps::{
    design_steps, CmsRegistrationStep, DesignContext, DesignStep, TraceReportStep,
};
pub use pipeline::UnitPipeline;
pub use stage::{Stage, StageContext};
pub use trace::{TraceIndex, TraceSite};
pub use worker::run_worker;
