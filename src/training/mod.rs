//! Offline training: reproducible split, OLS fit, held-out evaluation.

pub mod artifacts;

use linfa::traits::Fit;
use linfa::Dataset;
use linfa_linear::LinearRegression;
use ndarray::{Array1, ArrayView1, Axis};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{PipelinePaths, TrainOptions};
use crate::error::{DataError, Result};
use crate::features::read_feature_table;
use crate::model::{feature_matrix, LinearModel};
use crate::types::{FeatureRow, FEATURE_COLUMNS, FEATURE_COUNT};

pub use artifacts::{persist, read_metadata, ModelMetadata};

/// Regression quality on a set of labeled rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Mean squared error.
    pub mse: f64,
    /// Coefficient of determination.
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compares predictions against targets of the same length.
    ///
    /// When the targets are constant, R² is 1 for a perfect fit and 0
    /// otherwise.
    pub fn compute(y_true: ArrayView1<'_, f64>, y_pred: ArrayView1<'_, f64>) -> Self {
        let n = y_true.len().max(1) as f64;
        let ss_res: f64 = y_true
            .iter()
            .zip(y_pred.iter())
            .map(|(t, p)| (t - p).powi(2))
            .sum();
        let mean = y_true.mean().unwrap_or(0.0);
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        Self {
            mse: ss_res / n,
            r2,
        }
    }
}

/// Shuffles `0..n` with a seeded ChaCha8 generator and splits off the test
/// partition, whose size is `ceil(n * test_ratio)`.
///
/// Returns `(train, test)` index lists.
pub fn split_indices(n: usize, test_ratio: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let n_test = ((n as f64) * test_ratio).ceil() as usize;
    let n_test = n_test.min(n);
    let mut indices: Vec<usize> = (0..n).collect();
    indices.shuffle(&mut ChaCha8Rng::seed_from_u64(seed));
    let train = indices.split_off(n_test);
    (train, indices)
}

/// Fits ordinary least squares with an intercept.
///
/// Columns that are constant over `rows` carry no signal and would make the
/// normal equations singular. They are left out of the solve and get a zero
/// coefficient; their value is absorbed by the intercept. The model always
/// carries one coefficient per canonical feature.
pub fn fit(rows: &[&FeatureRow]) -> std::result::Result<LinearModel, DataError> {
    let vectors: Vec<_> = rows.iter().map(|row| row.features()).collect();
    let x = feature_matrix(&vectors);
    let y: Array1<f64> = rows.iter().map(|row| row.score).collect();

    let active: Vec<usize> = (0..FEATURE_COUNT)
        .filter(|&j| {
            let column = x.column(j);
            let first = column.first().copied();
            column.iter().any(|&v| Some(v) != first)
        })
        .collect();
    if active.len() < FEATURE_COUNT {
        let constant: Vec<&str> = (0..FEATURE_COUNT)
            .filter(|j| !active.contains(j))
            .map(|j| FEATURE_COLUMNS[j])
            .collect();
        debug!(?constant, "constant feature columns fitted with a zero coefficient");
    }

    let mut coefficients = Array1::zeros(FEATURE_COUNT);
    let intercept = if active.is_empty() {
        y.mean().ok_or(DataError::EmptyDataset)?
    } else {
        let fitted = LinearRegression::new()
            .fit(&Dataset::new(x.select(Axis(1), &active), y))
            .map_err(|err| DataError::Fit(err.to_string()))?;
        for (&j, &c) in active.iter().zip(fitted.params().iter()) {
            coefficients[j] = c;
        }
        fitted.intercept()
    };

    if !intercept.is_finite() || coefficients.iter().any(|c: &f64| !c.is_finite()) {
        return Err(DataError::Fit("solution has non-finite parameters".into()));
    }
    Ok(LinearModel::new(coefficients, intercept))
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingReport {
    /// Fitted model.
    pub model: LinearModel,
    /// Metrics on the held-out partition.
    pub metrics: RegressionMetrics,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows held out.
    pub test_rows: usize,
    /// Options the run used.
    pub options: TrainOptions,
}

/// Splits `rows`, fits on the train partition and scores the test partition.
pub fn train(
    rows: &[FeatureRow],
    options: &TrainOptions,
) -> std::result::Result<TrainingReport, DataError> {
    if rows.is_empty() {
        return Err(DataError::EmptyDataset);
    }
    let (train_idx, test_idx) = split_indices(rows.len(), options.test_ratio, options.seed);
    if train_idx.is_empty() || test_idx.is_empty() {
        return Err(DataError::TooFewRows { rows: rows.len() });
    }

    let train_rows: Vec<&FeatureRow> = train_idx.iter().map(|&i| &rows[i]).collect();
    let model = fit(&train_rows)?;

    let test_vectors: Vec<_> = test_idx.iter().map(|&i| rows[i].features()).collect();
    let y_test: Array1<f64> = test_idx.iter().map(|&i| rows[i].score).collect();
    let y_pred = model
        .predict(feature_matrix(&test_vectors).view())
        .map_err(|err| DataError::Fit(err.to_string()))?;
    let metrics = RegressionMetrics::compute(y_test.view(), y_pred.view());

    Ok(TrainingReport {
        model,
        metrics,
        train_rows: train_idx.len(),
        test_rows: test_idx.len(),
        options: *options,
    })
}

/// Training step: feature table in, model, metrics and metadata out.
pub fn run_training(paths: &PipelinePaths, options: &TrainOptions) -> Result<TrainingReport> {
    let table = read_feature_table(&paths.features_csv)?;
    let rows = table.into_labeled(&paths.features_csv)?;
    let report = train(&rows, options)?;
    persist(&report, paths)?;
    info!(
        mse = report.metrics.mse,
        r2 = report.metrics.r2,
        train_rows = report.train_rows,
        test_rows = report.test_rows,
        model = %paths.model_bin.display(),
        "model trained"
    );
    Ok(report)
}
