//! Runs the offline steps in order: features, training, evaluation.

use tracing::info;

use crate::config::{PipelinePaths, TrainOptions};
use crate::error::Result;
use crate::evaluate::{run_evaluation, EvaluationReport};
use crate::features::{run_build, BuildSummary};
use crate::training::{run_training, TrainingReport};

/// Combined outcome of a full offline run.
#[derive(Debug, Clone)]
pub struct PipelineReport {
    /// Feature build.
    pub build: BuildSummary,
    /// Training.
    pub training: TrainingReport,
    /// Batch evaluation.
    pub evaluation: EvaluationReport,
}

/// Runs every offline step; the first failure aborts the run.
pub fn run_pipeline(paths: &PipelinePaths, options: &TrainOptions) -> Result<PipelineReport> {
    let build = run_build(paths)?;
    let training = run_training(paths, options)?;
    let evaluation = run_evaluation(paths)?;
    info!(
        rows = build.rows,
        r2 = training.metrics.r2,
        predictions = evaluation.stats.count,
        "pipeline finished"
    );
    Ok(PipelineReport {
        build,
        training,
        evaluation,
    })
}
