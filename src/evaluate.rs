//! Batch evaluation of the persisted model over a feature table.

use std::path::Path;

use ndarray::Array1;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::PipelinePaths;
use crate::error::{DataError, PersistenceError, Result};
use crate::features::io::ensure_parent_dir;
use crate::features::{read_feature_table, FeatureRecord};
use crate::model::{feature_matrix, LinearModel};
use crate::store::ModelStore;
use crate::training::artifacts::write_metrics;
use crate::training::RegressionMetrics;
use crate::types::FeatureVector;

#[derive(Debug, Serialize)]
struct PredictionRecord<'a> {
    user_id: &'a str,
    event_id: &'a str,
    region_match: u8,
    user_likes_for_category: u64,
    event_popularity: u64,
    score: Option<f64>,
    predicted_score: f64,
}

/// Distribution of predicted scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionStats {
    /// Rows scored.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation; zero for fewer than two rows.
    pub std: f64,
    /// Smallest prediction.
    pub min: f64,
    /// Largest prediction.
    pub max: f64,
}

impl PredictionStats {
    /// Summarizes `values`; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let ss: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        } else {
            0.0
        };
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        Some(Self {
            count,
            mean,
            std,
            min,
            max,
        })
    }
}

/// Outcome of an evaluation run.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// Prediction distribution.
    pub stats: PredictionStats,
    /// Metrics against the label, when every row has one.
    pub metrics: Option<RegressionMetrics>,
    /// Rows without a label.
    pub unlabeled_rows: usize,
}

/// Scores every record with `model`, in table order.
pub fn score_records(
    model: &LinearModel,
    records: &[FeatureRecord],
) -> std::result::Result<Array1<f64>, DataError> {
    let vectors: Vec<FeatureVector> = records
        .iter()
        .map(|r| {
            FeatureVector([
                f64::from(r.region_match),
                r.user_likes_for_category as f64,
                r.event_popularity as f64,
            ])
        })
        .collect();
    model
        .predict(feature_matrix(&vectors).view())
        .map_err(|err| DataError::Fit(err.to_string()))
}

fn write_predictions(
    path: &Path,
    records: &[FeatureRecord],
    predictions: &Array1<f64>,
) -> std::result::Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    for (record, &predicted_score) in records.iter().zip(predictions.iter()) {
        writer
            .serialize(PredictionRecord {
                user_id: &record.user_id,
                event_id: &record.event_id,
                region_match: record.region_match,
                user_likes_for_category: record.user_likes_for_category,
                event_popularity: record.event_popularity,
                score: record.score,
                predicted_score,
            })
            .map_err(|err| PersistenceError::csv(path, err))?;
    }
    writer.flush().map_err(|err| PersistenceError::io(path, err))
}

/// Evaluation step: feature table and model in, predictions and metrics out.
pub fn run_evaluation(paths: &PipelinePaths) -> Result<EvaluationReport> {
    let table = read_feature_table(&paths.features_csv)?;
    if table.records.is_empty() {
        return Err(DataError::EmptyDataset.into());
    }
    let store = ModelStore::new(&paths.model_bin);
    let model = store.get()?;

    let predictions = score_records(&model, &table.records)?;
    write_predictions(&paths.predictions_csv, &table.records, &predictions)?;

    let unlabeled_rows = table.records.iter().filter(|r| r.score.is_none()).count();
    let metrics = if !table.labeled {
        None
    } else if unlabeled_rows > 0 {
        warn!(
            unlabeled_rows,
            path = %paths.features_csv.display(),
            "score column has blank cells; skipping evaluation metrics"
        );
        None
    } else {
        let labels: Array1<f64> = table.records.iter().filter_map(|r| r.score).collect();
        let metrics = RegressionMetrics::compute(labels.view(), predictions.view());
        write_metrics(&paths.evaluation_metrics_csv, &metrics)?;
        Some(metrics)
    };

    let values = predictions.to_vec();
    let stats = PredictionStats::from_values(&values).ok_or(DataError::EmptyDataset)?;
    info!(
        count = stats.count,
        mean = stats.mean,
        std = stats.std,
        min = stats.min,
        max = stats.max,
        output = %paths.predictions_csv.display(),
        "predictions written"
    );
    if let Some(metrics) = &metrics {
        info!(mse = metrics.mse, r2 = metrics.r2, "evaluation metrics");
    }
    Ok(EvaluationReport {
        stats,
        metrics,
        unlabeled_rows,
    })
}
