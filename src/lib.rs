//! Relevance scoring for (user, event) pairs.
//!
//! The crate covers the whole offline/online loop: raw user and event tables
//! are joined into engineered feature rows with a heuristic label, a linear
//! model is fitted and persisted, and the persisted model is served behind a
//! small JSON API.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod evaluate;
pub mod features;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod server;
pub mod store;
pub mod synth;
pub mod training;
pub mod types;

pub use error::{DataError, PersistenceError, PipelineError, Result};
pub use types::{Event, FeatureRow, FeatureVector, User, FEATURE_COLUMNS};
