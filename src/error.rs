use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::features::ParseError;
use crate::store::ModelLoadError;

/// Result type alias for offline pipeline steps.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Problems with the data an offline step was asked to process.
#[derive(Debug, Error)]
pub enum DataError {
    /// A source table could not be read or a row could not be decoded.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Table being read.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },
    /// A required column is absent from a table header.
    #[error("{path}: missing required column `{column}`")]
    MissingColumn {
        /// Table being read.
        path: PathBuf,
        /// Name of the absent column.
        column: &'static str,
    },
    /// A user's favorites field is not a list of identifiers.
    #[error(transparent)]
    Parse(#[from] ParseError),
    /// Two events share the same identifier.
    #[error("duplicate event id `{0}`")]
    DuplicateEvent(String),
    /// There are no rows to train or evaluate on.
    #[error("dataset is empty")]
    EmptyDataset,
    /// The dataset cannot be split into non-empty train and test partitions.
    #[error("dataset has {rows} rows; at least 2 are needed for a train/test split")]
    TooFewRows {
        /// Number of rows available.
        rows: usize,
    },
    /// Least squares could not be solved for the training partition.
    #[error("linear regression fit failed: {0}")]
    Fit(String),
}

/// Failures while writing artifacts to their output paths.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// File system error.
    #[error("failed to write {path}: {source}")]
    Io {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// CSV serialization error.
    #[error("failed to write {path}: {source}")]
    Csv {
        /// Destination path.
        path: PathBuf,
        /// Underlying CSV error.
        #[source]
        source: csv::Error,
    },
    /// JSON serialization error.
    #[error("failed to write {path}: {source}")]
    Json {
        /// Destination path.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// The backup model encoding does not reproduce the authoritative one.
    #[error("model backup {path} does not match the primary artifact")]
    BackupMismatch {
        /// Backup artifact path.
        path: PathBuf,
    },
}

impl PersistenceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        PersistenceError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        PersistenceError::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Error type for the offline steps (feature build, train, evaluate).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Input data problem.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Output write problem.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    /// The persisted model could not be loaded.
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
}

impl From<ParseError> for PipelineError {
    fn from(value: ParseError) -> Self {
        PipelineError::Data(DataError::Parse(value))
    }
}
