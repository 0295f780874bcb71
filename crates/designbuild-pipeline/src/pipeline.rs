//! Unit Processing Pipeline.
//!
//! A fixed, configuration-gated list of stages. Order is policy, not user
//! choice: it follows [`StepKind::policy_rank`]. Each unit visits every stage
//! before the next unit is admitted.

use designbuild_core::{BuildConfig, BuildMonitor, BuildUnit, RepositoryContext, Result, StepKind};
use tracing::debug;

use crate::stage::{Stage, StageContext};
use crate::stages::{
    ComplexityStage, DataValidationStage, DependencyRegisterStage, DocStyleStage,
    ExternalCommandStage, SpecPresenceStage, StyleStage, TraceabilityStage,
};
use crate::trace::TraceIndex;

#[derive(Default)]
pub struct UnitPipeline {
    stages: Vec<Box<dyn Stage>>,
    index: TraceIndex,
}

impl UnitPipeline {
    /// An empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in stages for every step enabled in `config`.
    ///
    /// Command-backed stages without a configured command are skipped, as
    /// are disabled stages; neither is an error.
    pub fn from_config(config: &BuildConfig) -> Result<Self> {
        let checks = &config.checks;
        let commands = &checks.commands;
        let mut pipeline = Self::new();

        for kind in StepKind::UNIT_STAGES {
            if !config.is_enabled(kind) {
                continue;
            }
            let command = |template: &Option<Vec<String>>| -> Result<Vec<Box<dyn Stage>>> {
                match template {
                    Some(template) => {
                        let stage = ExternalCommandStage::new(kind, template.clone())?;
                        Ok(vec![Box::new(stage) as Box<dyn Stage>])
                    }
                    None => {
                        debug!(stage = %kind, "no command configured; skipped");
                        Ok(Vec::new())
                    }
                }
            };
            let stages: Vec<Box<dyn Stage>> = match kind {
                StepKind::SpecPresence => vec![Box::new(SpecPresenceStage)],
                StepKind::UnitTest => command(&commands.unit_test)?,
                StepKind::Complexity => vec![Box::new(ComplexityStage::new(checks.max_function_lines))],
                StepKind::Style => vec![Box::new(StyleStage::new(checks.max_line_length))],
                StepKind::DocStyle => vec![Box::new(DocStyleStage)],
                StepKind::Lint => command(&commands.lint)?,
                StepKind::TypeCheck => command(&commands.type_check)?,
                StepKind::NativeCompile => commands
                    .native_compile
                    .iter()
                    .enumerate()
                    .map(|(i, template)| -> Result<Box<dyn Stage>> {
                        let stage = ExternalCommandStage::new(kind, template.clone())?
                            .with_label(format!("{}[{}]", kind.name(), i + 1));
                        Ok(Box::new(stage))
                    })
                    .collect::<Result<_>>()?,
                StepKind::DocGen => command(&commands.doc_gen)?,
                StepKind::DataValidation => vec![Box::new(DataValidationStage::new(&checks.data_schemas))],
                StepKind::Traceability => vec![Box::new(TraceabilityStage::new()?)],
                StepKind::DependencyRegister => vec![Box::new(DependencyRegisterStage)],
                StepKind::TraceReport | StepKind::CmsRegistration => Vec::new(),
            };
            pipeline.stages.extend(stages);
        }

        debug!(stages = ?pipeline.stage_names(), "pipeline assembled");
        Ok(pipeline)
    }

    /// Add a stage at its policy position, after existing stages of the same
    /// kind.
    pub fn with_stage(mut self, stage: Box<dyn Stage>) -> Self {
        let rank = stage.kind().policy_rank();
        let at = self
            .stages
            .iter()
            .position(|s| s.kind().policy_rank() > rank)
            .unwrap_or(self.stages.len());
        self.stages.insert(at, stage);
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Route one unit through every stage, returning the aggregate so far.
    pub fn process(
        &mut self,
        unit: &BuildUnit,
        config: &BuildConfig,
        monitor: &BuildMonitor,
        repo: &RepositoryContext,
    ) -> Result<&TraceIndex> {
        for stage in self.stages.iter_mut() {
            let mut ctx = StageContext {
                config,
                monitor,
                repo,
                index: &mut self.index,
            };
            stage.accept(unit, &mut ctx)?;
        }
        Ok(&self.index)
    }

    pub fn into_index(self) -> TraceIndex {
        self.index
    }
}
