//! Model artifact encodings.
//!
//! The binary form is authoritative. Layout, little endian:
//!
//! ```text
//! magic "EVLM" | version u16 | n_features u16 | n_features × f64 | intercept f64 | crc32 u32
//! ```
//!
//! The checksum covers every byte before it. The JSON document is a human
//! readable backup carrying the same parameters plus the feature names.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::LinearModel;
use crate::types::{FEATURE_COLUMNS, FEATURE_COUNT};

const MAGIC: &[u8; 4] = b"EVLM";
const VERSION: u16 = 1;
const HEADER_LEN: usize = 8;
const TRAILER_LEN: usize = 4;

/// Model type recorded in the JSON document.
pub const MODEL_TYPE: &str = "LinearRegression";

/// Failures while decoding a model artifact.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Not enough bytes for the declared layout.
    #[error("artifact is truncated ({len} bytes)")]
    Truncated {
        /// Bytes available.
        len: usize,
    },
    /// The file does not start with the model magic.
    #[error("artifact is not a model file (bad magic)")]
    BadMagic,
    /// Stored and computed checksums differ.
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum {
        /// Checksum in the trailer.
        stored: u32,
        /// Checksum of the payload.
        computed: u32,
    },
    /// Written by an unknown format revision.
    #[error("unsupported model format version {0}")]
    UnsupportedVersion(u16),
    /// The model was fitted on a different number of features.
    #[error("model has {got} coefficients, expected {expected}")]
    FeatureCount {
        /// Coefficients stored.
        got: usize,
        /// Coefficients required.
        expected: usize,
    },
    /// The JSON backup lists features in a different order.
    #[error("model features {got:?} do not match the expected order {expected:?}")]
    FeatureOrder {
        /// Feature names stored.
        got: Vec<String>,
        /// Canonical names.
        expected: Vec<String>,
    },
    /// The JSON backup could not be parsed.
    #[error("invalid model document: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Whether the artifact is well formed but fitted on a different schema.
    pub fn is_schema_mismatch(&self) -> bool {
        matches!(
            self,
            CodecError::FeatureCount { .. } | CodecError::FeatureOrder { .. }
        )
    }
}

/// JSON representation of a fitted model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDocument {
    /// Always [`MODEL_TYPE`].
    pub model_type: String,
    /// Feature names in column order.
    pub features: Vec<String>,
    /// One weight per feature.
    pub coefficients: Vec<f64>,
    /// Constant term.
    pub intercept: f64,
}

/// Encodes `model` in the authoritative binary format.
pub fn encode_binary(model: &LinearModel) -> Bytes {
    let n = model.n_features();
    let mut buf = BytesMut::with_capacity(HEADER_LEN + 8 * (n + 1) + TRAILER_LEN);
    buf.put_slice(MAGIC);
    buf.put_u16_le(VERSION);
    buf.put_u16_le(n as u16);
    for coefficient in model.coefficients() {
        buf.put_f64_le(*coefficient);
    }
    buf.put_f64_le(model.intercept());
    let crc = crc32fast::hash(&buf);
    buf.put_u32_le(crc);
    buf.freeze()
}

/// Decodes the binary format, verifying magic, checksum and feature count.
pub fn decode_binary(data: &[u8]) -> Result<LinearModel, CodecError> {
    if data.len() < HEADER_LEN + TRAILER_LEN {
        return Err(CodecError::Truncated { len: data.len() });
    }
    if &data[..MAGIC.len()] != MAGIC {
        return Err(CodecError::BadMagic);
    }
    let (body, mut trailer) = data.split_at(data.len() - TRAILER_LEN);
    let stored = trailer.get_u32_le();
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(CodecError::Checksum { stored, computed });
    }

    let mut cursor = &body[MAGIC.len()..];
    let version = cursor.get_u16_le();
    if version != VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    let n = usize::from(cursor.get_u16_le());
    if n != FEATURE_COUNT {
        return Err(CodecError::FeatureCount {
            got: n,
            expected: FEATURE_COUNT,
        });
    }
    if cursor.remaining() != 8 * (n + 1) {
        return Err(CodecError::Truncated { len: data.len() });
    }
    let coefficients: Array1<f64> = (0..n).map(|_| cursor.get_f64_le()).collect();
    let intercept = cursor.get_f64_le();
    Ok(LinearModel::new(coefficients, intercept))
}

/// Encodes `model` as a pretty-printed JSON document.
pub fn encode_json(model: &LinearModel) -> Result<String, serde_json::Error> {
    let doc = ModelDocument {
        model_type: MODEL_TYPE.to_string(),
        features: FEATURE_COLUMNS.iter().map(|name| name.to_string()).collect(),
        coefficients: model.coefficients().to_vec(),
        intercept: model.intercept(),
    };
    serde_json::to_string_pretty(&doc)
}

/// Decodes the JSON backup, verifying the feature order.
pub fn decode_json(text: &str) -> Result<LinearModel, CodecError> {
    let doc: ModelDocument = serde_json::from_str(text)?;
    if doc.features.iter().map(String::as_str).ne(FEATURE_COLUMNS) {
        return Err(CodecError::FeatureOrder {
            got: doc.features,
            expected: FEATURE_COLUMNS.iter().map(|name| name.to_string()).collect(),
        });
    }
    if doc.coefficients.len() != FEATURE_COUNT {
        return Err(CodecError::FeatureCount {
            got: doc.coefficients.len(),
            expected: FEATURE_COUNT,
        });
    }
    Ok(LinearModel::new(Array1::from(doc.coefficients), doc.intercept))
}
