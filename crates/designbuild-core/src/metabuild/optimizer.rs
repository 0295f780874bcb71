//! Design-space optimization adapters.
//!
//! An optimizer is handed the build-and-evaluate callback for one baseline
//! and may invoke it any number of times with different design parameters.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::envelope::BuildSummary;
use crate::metabuild::error::{MetabuildError, MetabuildResult};

/// Builds one design variant and reports how it fared.
#[async_trait]
pub trait DesignEvaluator: Send + Sync {
    async fn evaluate(&self, params: serde_json::Value) -> MetabuildResult<BuildSummary>;
}

/// Searches a design-parameter space through a [`DesignEvaluator`].
#[async_trait]
pub trait DesignOptimizer: Send + Sync {
    async fn optimize(&self, evaluator: &dyn DesignEvaluator) -> MetabuildResult<OptimizationOutcome>;
}

/// One evaluated design variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub params: serde_json::Value,
    pub summary: BuildSummary,
}

/// Result of an optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationOutcome {
    pub best: serde_json::Value,
    pub summary: BuildSummary,
    pub evaluations: Vec<Evaluation>,
}

/// Exhaustive sweep over a fixed candidate list; the candidate with the
/// fewest nonconformities wins, earlier candidates winning ties.
#[derive(Debug, Clone, Default)]
pub struct ParameterSweep {
    candidates: Vec<serde_json::Value>,
}

impl ParameterSweep {
    pub fn new(candidates: Vec<serde_json::Value>) -> Self {
        Self { candidates }
    }
}

#[async_trait]
impl DesignOptimizer for ParameterSweep {
    async fn optimize(&self, evaluator: &dyn DesignEvaluator) -> MetabuildResult<OptimizationOutcome> {
        let mut evaluations: Vec<Evaluation> = Vec::with_capacity(self.candidates.len());
        for params in &self.candidates {
            let summary = evaluator.evaluate(params.clone()).await?;
            info!(
                build_id = %summary.build_id,
                nonconformities = summary.nonconformities,
                "evaluated design variant"
            );
            evaluations.push(Evaluation {
                params: params.clone(),
                summary,
            });
        }
        let best = evaluations
            .iter()
            .enumerate()
            .min_by_key(|(i, e)| (e.summary.nonconformities, *i))
            .map(|(_, e)| e.clone())
            .ok_or_else(|| MetabuildError::Optimization("parameter sweep has no candidates".into()))?;
        Ok(OptimizationOutcome {
            best: best.params,
            summary: best.summary,
            evaluations,
        })
    }
}
