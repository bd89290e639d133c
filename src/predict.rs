//! Request validation and scoring over the cached model.
//!
//! A request is validated completely before the model is touched. Batches are
//! all-or-nothing: one bad element rejects the whole batch and nothing is
//! scored.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::DEFAULT_MAX_BATCH;
use crate::model::feature_matrix;
use crate::store::{ModelLoadError, ModelProvider};
use crate::types::{FeatureVector, FEATURE_COLUMNS, FEATURE_COUNT};

/// The request does not satisfy the input contract.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// One or more required features are absent, listed in canonical order.
    #[error("required features missing: {missing:?}")]
    MissingFeatures {
        /// Absent keys.
        missing: Vec<&'static str>,
    },
    /// A feature is present but not a JSON number.
    #[error("feature `{feature}` must be a number, got {value}")]
    NotANumber {
        /// Offending key.
        feature: &'static str,
        /// Value supplied.
        value: Value,
    },
    /// A single prediction body is not a JSON object.
    #[error("request body must be a JSON object of numeric features")]
    NotAnObject,
    /// A batch body is not a JSON array.
    #[error("request body must be a list of objects")]
    NotAList,
    /// A batch element failed validation.
    #[error("batch element {index} {element} is invalid: {reason}")]
    InvalidElement {
        /// Position in the batch.
        index: usize,
        /// The element as received.
        element: Value,
        /// Why it was rejected.
        reason: Box<ValidationError>,
    },
    /// The batch exceeds the configured cap.
    #[error("batch has {len} elements; at most {max} are accepted")]
    BatchTooLarge {
        /// Elements received.
        len: usize,
        /// Configured cap.
        max: usize,
    },
    /// The body is not valid JSON.
    #[error("malformed JSON body: {0}")]
    MalformedBody(String),
}

/// Why a prediction request did not produce a result.
#[derive(Debug, Error)]
pub enum PredictionError {
    /// Rejected before scoring; the caller must fix the request.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No model could be loaded; a later request may succeed.
    #[error("model unavailable: {0}")]
    ModelUnavailable(#[from] ModelLoadError),
    /// Unexpected failure while scoring.
    #[error("prediction failed: {0}")]
    Internal(String),
}

/// A score paired with the request it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionResult {
    /// Model output.
    pub prediction: f64,
    /// The request object, unmodified.
    pub input_data: Value,
}

/// Extracts the model inputs from a request object in canonical order.
///
/// Key order in the object is irrelevant; extra keys are ignored.
pub fn extract_features(value: &Value) -> Result<FeatureVector, ValidationError> {
    let object = value.as_object().ok_or(ValidationError::NotAnObject)?;
    extract_from_object(object)
}

fn extract_from_object(object: &Map<String, Value>) -> Result<FeatureVector, ValidationError> {
    let missing: Vec<&'static str> = FEATURE_COLUMNS
        .iter()
        .copied()
        .filter(|key| !object.contains_key(*key))
        .collect();
    if !missing.is_empty() {
        return Err(ValidationError::MissingFeatures { missing });
    }

    let mut values = [0.0; FEATURE_COUNT];
    for (slot, feature) in values.iter_mut().zip(FEATURE_COLUMNS) {
        let value = &object[feature];
        *slot = value.as_f64().ok_or_else(|| ValidationError::NotANumber {
            feature,
            value: value.clone(),
        })?;
    }
    Ok(FeatureVector(values))
}

/// Scores validated feature payloads with the provider's model.
#[derive(Clone)]
pub struct PredictionService {
    provider: Arc<dyn ModelProvider>,
    max_batch: usize,
}

impl PredictionService {
    /// Creates a service reading models from `provider`.
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            max_batch: DEFAULT_MAX_BATCH,
        }
    }

    /// Overrides the batch cap.
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch;
        self
    }

    /// The injected model source.
    pub fn provider(&self) -> &Arc<dyn ModelProvider> {
        &self.provider
    }

    /// Validates and scores one request object.
    pub fn predict_one(&self, input: Value) -> Result<PredictionResult, PredictionError> {
        let vector = extract_features(&input)?;
        let mut predictions = self.score(&[vector])?;
        let prediction = predictions
            .pop()
            .ok_or_else(|| PredictionError::Internal("model returned no prediction".into()))?;
        Ok(PredictionResult {
            prediction,
            input_data: input,
        })
    }

    /// Validates every element, then scores the batch in one call.
    ///
    /// Results line up with the input elements one to one.
    pub fn predict_batch(&self, input: Value) -> Result<Vec<PredictionResult>, PredictionError> {
        let Value::Array(items) = input else {
            return Err(ValidationError::NotAList.into());
        };
        if items.len() > self.max_batch {
            return Err(ValidationError::BatchTooLarge {
                len: items.len(),
                max: self.max_batch,
            }
            .into());
        }

        let mut vectors = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let vector = extract_features(item).map_err(|reason| ValidationError::InvalidElement {
                index,
                element: item.clone(),
                reason: Box::new(reason),
            })?;
            vectors.push(vector);
        }

        let predictions = self.score(&vectors)?;
        Ok(predictions
            .into_iter()
            .zip(items)
            .map(|(prediction, input_data)| PredictionResult {
                prediction,
                input_data,
            })
            .collect())
    }

    fn score(&self, vectors: &[FeatureVector]) -> Result<Vec<f64>, PredictionError> {
        let model = self.provider.model()?;
        let x = feature_matrix(vectors);
        let y = model
            .predict(x.view())
            .map_err(|err| PredictionError::Internal(err.to_string()))?;
        if y.len() != vectors.len() {
            return Err(PredictionError::Internal(format!(
                "model returned {} predictions for {} rows",
                y.len(),
                vectors.len()
            )));
        }
        debug!(rows = vectors.len(), "scored feature matrix");
        Ok(y.to_vec())
    }
}
