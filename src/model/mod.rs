//! Fitted linear model and its persisted encodings.

pub mod codec;

use ndarray::{Array1, Array2, ArrayView2};
use thiserror::Error;

use crate::types::{FeatureVector, FEATURE_COUNT};

pub use codec::{
    decode_binary, decode_json, encode_binary, encode_json, CodecError, ModelDocument, MODEL_TYPE,
};

/// The matrix handed to the model does not have one column per coefficient.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("feature matrix has {got} columns, model expects {expected}")]
pub struct ShapeMismatch {
    /// Columns supplied.
    pub got: usize,
    /// Coefficients held by the model.
    pub expected: usize,
}

/// Ordinary least squares fit: `y = x · coefficients + intercept`.
///
/// Immutable once built; a new fit produces a new value.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    coefficients: Array1<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Wraps fitted parameters.
    pub fn new(coefficients: Array1<f64>, intercept: f64) -> Self {
        Self {
            coefficients,
            intercept,
        }
    }

    /// Per-feature weights in canonical column order.
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Constant term.
    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Number of input features.
    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }

    /// Scores every row of `x` in one call.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, ShapeMismatch> {
        if x.ncols() != self.n_features() {
            return Err(ShapeMismatch {
                got: x.ncols(),
                expected: self.n_features(),
            });
        }
        Ok(x.dot(&self.coefficients) + self.intercept)
    }
}

/// Stacks feature vectors into a `rows × FEATURE_COUNT` matrix.
pub fn feature_matrix<'a, I>(vectors: I) -> Array2<f64>
where
    I: IntoIterator<Item = &'a FeatureVector>,
{
    let flat: Vec<f64> = vectors
        .into_iter()
        .flat_map(|vector| vector.as_slice().iter().copied())
        .collect();
    let rows = flat.len() / FEATURE_COUNT;
    Array2::from_shape_vec((rows, FEATURE_COUNT), flat)
        .unwrap_or_else(|_| Array2::zeros((0, FEATURE_COUNT)))
}
