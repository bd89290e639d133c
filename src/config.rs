use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};

/// Seed used for the train/test shuffle.
pub const DEFAULT_SPLIT_SEED: u64 = 42;
/// Share of rows held out for evaluation.
pub const DEFAULT_TEST_RATIO: f64 = 0.2;
/// Largest batch accepted by `/batch-predict`.
pub const DEFAULT_MAX_BATCH: usize = 10_000;
/// Origins of the web frontends allowed to call the API.
pub const DEFAULT_ALLOWED_ORIGINS: [&str; 2] =
    ["https://evently-se-4-ai.vercel.app", "http://localhost:3000"];

/// Fixed artifact layout of the offline pipeline, rooted at a base directory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelinePaths {
    /// Raw users table.
    pub users_csv: PathBuf,
    /// Raw events table.
    pub events_csv: PathBuf,
    /// Engineered feature table with labels.
    pub features_csv: PathBuf,
    /// Authoritative binary model artifact.
    pub model_bin: PathBuf,
    /// JSON backup of the model parameters.
    pub model_json: PathBuf,
    /// Feature order and training summary.
    pub metadata_json: PathBuf,
    /// Held-out metrics written by the trainer.
    pub training_metrics_csv: PathBuf,
    /// Feature table plus model predictions.
    pub predictions_csv: PathBuf,
    /// Metrics computed by the batch evaluator.
    pub evaluation_metrics_csv: PathBuf,
}

impl PipelinePaths {
    /// Resolves the standard layout under `root`.
    pub fn under(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        let model_dir = root.join("model-linear-regression");
        Self {
            users_csv: root.join("data/raw/final_synthetic_users_with_region.csv"),
            events_csv: root.join("data/raw/final_synthetic_events.csv"),
            features_csv: root.join("data/processed/user_event_similarity.csv"),
            model_bin: model_dir.join("linear_regression_model.bin"),
            model_json: model_dir.join("linear_regression_model.json"),
            metadata_json: model_dir.join("model_metadata.json"),
            training_metrics_csv: root.join("reports/training_metrics.csv"),
            predictions_csv: root.join("data/processed/predictions.csv"),
            evaluation_metrics_csv: root.join("reports/metrics.csv"),
        }
    }
}

impl Default for PipelinePaths {
    fn default() -> Self {
        Self::under(".")
    }
}

/// Knobs of the training step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TrainOptions {
    /// Fraction of rows held out for evaluation.
    pub test_ratio: f64,
    /// Shuffle seed; a fixed value keeps the split reproducible.
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            test_ratio: DEFAULT_TEST_RATIO,
            seed: DEFAULT_SPLIT_SEED,
        }
    }
}

/// Runtime options used to boot the prediction server.
#[derive(Clone, Debug)]
pub struct ServeOptions {
    /// Network interface to bind to.
    pub host: IpAddr,
    /// Listening port.
    pub port: u16,
    /// Path of the authoritative model artifact.
    pub model_path: PathBuf,
    /// Allowed CORS origins.
    pub allow_origins: Vec<String>,
    /// Largest accepted batch.
    pub max_batch: usize,
}

impl ServeOptions {
    /// Convenience accessor for `(host, port)` tuples.
    pub fn socket_parts(&self) -> (IpAddr, u16) {
        (self.host, self.port)
    }
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 5000,
            model_path: PipelinePaths::default().model_bin,
            allow_origins: DEFAULT_ALLOWED_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            max_batch: DEFAULT_MAX_BATCH,
        }
    }
}
