use serde::{Deserialize, Serialize};

/// Canonical feature column order expected by the model.
///
/// The fitted model is positional, so every matrix handed to it must follow
/// this order regardless of how the caller supplied the values.
pub const FEATURE_COLUMNS: [&str; 3] = [
    "region_match",
    "user_likes_for_category",
    "event_popularity",
];

/// Number of model input features.
pub const FEATURE_COUNT: usize = FEATURE_COLUMNS.len();

/// Name of the training label column.
pub const LABEL_COLUMN: &str = "score";

/// A user with a home region and an ordered list of favorited event ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    /// User identifier.
    pub id: String,
    /// Region code.
    pub region: String,
    /// Favorited event ids; may reference events that no longer exist.
    pub favorites: Vec<String>,
}

/// A catalog event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    /// Event identifier, unique within the catalog.
    pub id: String,
    /// Region code.
    pub region: String,
    /// Category label.
    pub category: String,
    /// Number of users who favorited the event.
    pub popularity: u64,
}

/// Engineered features and heuristic label for one (user, event) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    /// User side of the pair.
    pub user_id: String,
    /// Event side of the pair.
    pub event_id: String,
    /// 1 when user and event share a region, else 0.
    pub region_match: u8,
    /// How many of the user's favorites share the event's category.
    pub user_likes_for_category: u64,
    /// The event's popularity count.
    pub event_popularity: u64,
    /// Heuristic relevance label in `[0, 1]`.
    pub score: f64,
}

impl FeatureRow {
    /// Model inputs of this row in canonical order.
    pub fn features(&self) -> FeatureVector {
        FeatureVector([
            f64::from(self.region_match),
            self.user_likes_for_category as f64,
            self.event_popularity as f64,
        ])
    }
}

/// Model inputs laid out in [`FEATURE_COLUMNS`] order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    /// Values as a slice in canonical order.
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }
}
