//! Lazily loaded, process-wide model cache.
//!
//! The cache slot holds either nothing or one fully decoded model behind an
//! `Arc`; readers never see a half-built value. Loads are serialized through
//! a gate so a burst of first requests performs a single read of the
//! artifact. A failed load leaves the slot empty and the next caller tries
//! again.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tracing::{error, info};

use crate::model::{decode_binary, CodecError, LinearModel};

/// Reasons a persisted model could not be loaded.
#[derive(Debug, Error)]
pub enum ModelLoadError {
    /// No artifact at the configured location.
    #[error("model artifact {0} does not exist")]
    Missing(PathBuf),
    /// The artifact exists but could not be read.
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// The artifact is damaged or not a model file.
    #[error("model artifact {path} is corrupt: {source}")]
    Corrupt {
        /// Artifact path.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: CodecError,
    },
    /// The artifact was fitted on a different feature layout.
    #[error("model artifact {path} does not match the serving schema: {source}")]
    SchemaMismatch {
        /// Artifact path.
        path: PathBuf,
        /// Decoding failure.
        #[source]
        source: CodecError,
    },
}

/// Reads and decodes the authoritative model artifact at `path`.
pub fn load_model(path: &Path) -> Result<LinearModel, ModelLoadError> {
    let bytes = fs::read(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            ModelLoadError::Missing(path.to_path_buf())
        } else {
            ModelLoadError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    decode_binary(&bytes).map_err(|source| {
        let path = path.to_path_buf();
        if source.is_schema_mismatch() {
            ModelLoadError::SchemaMismatch { path, source }
        } else {
            ModelLoadError::Corrupt { path, source }
        }
    })
}

/// Source of the model used for scoring.
///
/// The prediction service only depends on this trait, so tests can swap in a
/// fixed model or a provider that always fails.
pub trait ModelProvider: Send + Sync {
    /// Returns the current model, loading it if necessary.
    fn model(&self) -> Result<Arc<LinearModel>, ModelLoadError>;

    /// Whether a model is cached right now, without attempting a load.
    fn is_loaded(&self) -> bool;
}

/// Caches the model read from a fixed artifact path.
#[derive(Debug)]
pub struct ModelStore {
    path: PathBuf,
    slot: RwLock<Option<Arc<LinearModel>>>,
    load_gate: Mutex<()>,
    loads: AtomicU64,
}

impl ModelStore {
    /// Creates an empty store; nothing is read until first use.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            slot: RwLock::new(None),
            load_gate: Mutex::new(()),
            loads: AtomicU64::new(0),
        }
    }

    /// Artifact location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the artifact without touching the cache.
    pub fn load(&self) -> Result<LinearModel, ModelLoadError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        load_model(&self.path)
    }

    /// Returns the cached model, loading it when the slot is empty.
    pub fn get(&self) -> Result<Arc<LinearModel>, ModelLoadError> {
        if let Some(model) = self.cached() {
            return Ok(model);
        }
        let _gate = self.load_gate.lock();
        if let Some(model) = self.cached() {
            return Ok(model);
        }
        self.load_into_slot()
    }

    /// Loads the artifact again and replaces the cached model wholesale.
    ///
    /// On failure the previously cached model stays in place.
    pub fn reload(&self) -> Result<Arc<LinearModel>, ModelLoadError> {
        let _gate = self.load_gate.lock();
        self.load_into_slot()
    }

    /// Number of artifact reads performed so far.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn cached(&self) -> Option<Arc<LinearModel>> {
        self.slot.read().as_ref().map(Arc::clone)
    }

    fn load_into_slot(&self) -> Result<Arc<LinearModel>, ModelLoadError> {
        match self.load() {
            Ok(model) => {
                let model = Arc::new(model);
                *self.slot.write() = Some(Arc::clone(&model));
                info!(path = %self.path.display(), "model loaded");
                Ok(model)
            }
            Err(err) => {
                error!(path = %self.path.display(), %err, "model load failed");
                Err(err)
            }
        }
    }
}

impl ModelProvider for ModelStore {
    fn model(&self) -> Result<Arc<LinearModel>, ModelLoadError> {
        self.get()
    }

    fn is_loaded(&self) -> bool {
        self.slot.read().is_some()
    }
}

/// Provider serving a model that is already in memory.
#[derive(Debug, Clone)]
pub struct StaticModel(Arc<LinearModel>);

impl StaticModel {
    /// Wraps `model`.
    pub fn new(model: LinearModel) -> Self {
        Self(Arc::new(model))
    }
}

impl ModelProvider for StaticModel {
    fn model(&self) -> Result<Arc<LinearModel>, ModelLoadError> {
        Ok(Arc::clone(&self.0))
    }

    fn is_loaded(&self) -> bool {
        true
    }
}
