use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::PipelinePaths;
use crate::error::PersistenceError;
use crate::features::io::ensure_parent_dir;
use crate::model::{decode_binary, decode_json, encode_binary, encode_json, MODEL_TYPE};
use crate::training::{RegressionMetrics, TrainingReport};
use crate::types::FEATURE_COLUMNS;

/// Sidecar describing how the persisted model must be fed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Estimator name.
    pub model_type: String,
    /// Feature columns in the exact order the model expects.
    pub features: Vec<String>,
    /// Held-out metrics.
    pub metrics: RegressionMetrics,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows held out.
    pub test_rows: usize,
    /// Held-out share.
    pub test_ratio: f64,
    /// Split seed.
    pub seed: u64,
}

impl ModelMetadata {
    fn from_report(report: &TrainingReport) -> Self {
        Self {
            model_type: MODEL_TYPE.to_string(),
            features: FEATURE_COLUMNS.iter().map(|name| name.to_string()).collect(),
            metrics: report.metrics,
            train_rows: report.train_rows,
            test_rows: report.test_rows,
            test_ratio: report.options.test_ratio,
            seed: report.options.seed,
        }
    }
}

fn write_bytes(path: &Path, bytes: impl AsRef<[u8]>) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    fs::write(path, bytes).map_err(|err| PersistenceError::io(path, err))
}

/// Writes a single-row metrics CSV (`mse,r2`).
pub fn write_metrics(path: &Path, metrics: &RegressionMetrics) -> Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    writer
        .serialize(metrics)
        .map_err(|err| PersistenceError::csv(path, err))?;
    writer.flush().map_err(|err| PersistenceError::io(path, err))
}

/// Persists the model in both encodings, the training metrics and the
/// metadata sidecar.
///
/// Both encodings are decoded and compared before anything is written; the
/// JSON backup must reproduce the binary artifact's parameters exactly. The
/// backup is written before the binary.
pub fn persist(report: &TrainingReport, paths: &PipelinePaths) -> Result<(), PersistenceError> {
    let binary = encode_binary(&report.model);
    let json = encode_json(&report.model).map_err(|source| PersistenceError::Json {
        path: paths.model_json.clone(),
        source,
    })?;

    let primary = decode_binary(&binary).ok();
    let backup = decode_json(&json).ok();
    if primary.is_none() || primary != backup {
        return Err(PersistenceError::BackupMismatch {
            path: paths.model_json.clone(),
        });
    }

    write_bytes(&paths.model_json, json.as_bytes())?;
    write_bytes(&paths.model_bin, &binary)?;

    write_metrics(&paths.training_metrics_csv, &report.metrics)?;

    let metadata = ModelMetadata::from_report(report);
    let text = serde_json::to_string_pretty(&metadata).map_err(|source| PersistenceError::Json {
        path: paths.metadata_json.clone(),
        source,
    })?;
    write_bytes(&paths.metadata_json, text.as_bytes())
}

/// Reads the metadata sidecar written by [`persist`].
pub fn read_metadata(path: &Path) -> Result<ModelMetadata, PersistenceError> {
    let text = fs::read_to_string(path).map_err(|err| PersistenceError::io(path, err))?;
    serde_json::from_str(&text).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })
}
