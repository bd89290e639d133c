use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::PipelinePaths;
use crate::error::{DataError, PersistenceError, Result};
use crate::features::{build_feature_rows, parse_favorites};
use crate::types::{Event, FeatureRow, User, FEATURE_COLUMNS, LABEL_COLUMN};

#[derive(Debug, Deserialize)]
struct UserRecord {
    id: String,
    #[serde(rename = "regione", alias = "region")]
    region: String,
    #[serde(rename = "favoriteIds")]
    favorite_ids: String,
}

#[derive(Debug, Deserialize)]
struct EventRecord {
    id: String,
    #[serde(rename = "regione", alias = "region")]
    region: String,
    category: String,
    #[serde(rename = "favoriteCount")]
    favorite_count: u64,
}

/// One row of a persisted feature table; the label may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    /// User side of the pair.
    pub user_id: String,
    /// Event side of the pair.
    pub event_id: String,
    /// Region match flag.
    pub region_match: u8,
    /// Favorites in the event's category.
    pub user_likes_for_category: u64,
    /// Event popularity.
    pub event_popularity: u64,
    /// Heuristic label, when the table carries one.
    #[serde(default)]
    pub score: Option<f64>,
}

impl FeatureRecord {
    fn labeled(self) -> Option<FeatureRow> {
        Some(FeatureRow {
            score: self.score?,
            user_id: self.user_id,
            event_id: self.event_id,
            region_match: self.region_match,
            user_likes_for_category: self.user_likes_for_category,
            event_popularity: self.event_popularity,
        })
    }
}

/// A feature table read back from disk.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Rows in file order.
    pub records: Vec<FeatureRecord>,
    /// Whether the header carried the label column.
    pub labeled: bool,
}

impl FeatureTable {
    /// Converts to labeled rows, failing when the label column is absent.
    pub fn into_labeled(self, path: &Path) -> std::result::Result<Vec<FeatureRow>, DataError> {
        let missing_label = || DataError::MissingColumn {
            path: path.to_path_buf(),
            column: LABEL_COLUMN,
        };
        if !self.labeled {
            return Err(missing_label());
        }
        self.records
            .into_iter()
            .map(|record| record.labeled().ok_or_else(missing_label))
            .collect()
    }
}

/// Summary statistics from a feature build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildSummary {
    /// Users read from the raw table.
    pub users: usize,
    /// Events read from the raw table.
    pub events: usize,
    /// Feature rows written.
    pub rows: usize,
    /// Where the table was written.
    pub output: PathBuf,
}

fn read_error(path: &Path) -> impl Fn(csv::Error) -> DataError + '_ {
    move |source| DataError::Read {
        path: path.to_path_buf(),
        source,
    }
}

fn require_columns(
    path: &Path,
    headers: &StringRecord,
    columns: &[&'static str],
) -> std::result::Result<(), DataError> {
    for &column in columns {
        if !headers.iter().any(|h| h == column) {
            return Err(DataError::MissingColumn {
                path: path.to_path_buf(),
                column,
            });
        }
    }
    Ok(())
}

/// Reads the raw users table, parsing each favorites list.
pub fn read_users(path: &Path) -> Result<Vec<User>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(read_error(path))?;
    let mut users = Vec::new();
    for record in reader.deserialize::<UserRecord>() {
        let record = record.map_err(read_error(path))?;
        let favorites =
            parse_favorites(&record.favorite_ids).map_err(|err| err.for_user(&record.id))?;
        users.push(User {
            id: record.id,
            region: record.region,
            favorites,
        });
    }
    Ok(users)
}

/// Reads the raw events table; event ids must be unique.
pub fn read_events(path: &Path) -> Result<Vec<Event>> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(read_error(path))?;
    let mut seen = HashSet::new();
    let mut events = Vec::new();
    for record in reader.deserialize::<EventRecord>() {
        let record = record.map_err(read_error(path))?;
        if !seen.insert(record.id.clone()) {
            return Err(DataError::DuplicateEvent(record.id).into());
        }
        events.push(Event {
            id: record.id,
            region: record.region,
            category: record.category,
            popularity: record.favorite_count,
        });
    }
    Ok(events)
}

pub(crate) fn ensure_parent_dir(path: &Path) -> std::result::Result<(), PersistenceError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|err| PersistenceError::io(parent, err))
        }
        _ => Ok(()),
    }
}

const FEATURE_TABLE_HEADER: [&str; 6] = [
    "user_id",
    "event_id",
    FEATURE_COLUMNS[0],
    FEATURE_COLUMNS[1],
    FEATURE_COLUMNS[2],
    LABEL_COLUMN,
];

/// Writes feature rows as CSV with a header, in the order given.
///
/// An empty table still gets its header.
pub fn write_feature_table(path: &Path, rows: &[FeatureRow]) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    if rows.is_empty() {
        writer
            .write_record(FEATURE_TABLE_HEADER)
            .map_err(|err| PersistenceError::csv(path, err))?;
    }
    for row in rows {
        writer
            .serialize(row)
            .map_err(|err| PersistenceError::csv(path, err))?;
    }
    writer
        .flush()
        .map_err(|err| PersistenceError::io(path, err))?;
    Ok(())
}

/// Reads a feature table; the label column is optional.
pub fn read_feature_table(path: &Path) -> Result<FeatureTable> {
    let mut reader = ReaderBuilder::new()
        .trim(csv::Trim::Headers)
        .from_path(path)
        .map_err(read_error(path))?;
    let headers = reader.headers().map_err(read_error(path))?.clone();
    require_columns(path, &headers, &FEATURE_COLUMNS)?;
    let labeled = headers.iter().any(|h| h == LABEL_COLUMN);

    let records = reader
        .deserialize::<FeatureRecord>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(read_error(path))?;
    Ok(FeatureTable { records, labeled })
}

/// Feature build step: raw users/events in, labeled feature table out.
pub fn run_build(paths: &PipelinePaths) -> Result<BuildSummary> {
    let users = read_users(&paths.users_csv)?;
    let events = read_events(&paths.events_csv)?;
    let rows = build_feature_rows(&users, &events);
    write_feature_table(&paths.features_csv, &rows)?;

    let summary = BuildSummary {
        users: users.len(),
        events: events.len(),
        rows: rows.len(),
        output: paths.features_csv.clone(),
    };
    info!(
        users = summary.users,
        events = summary.events,
        rows = summary.rows,
        output = %summary.output.display(),
        "feature table written"
    );
    Ok(summary)
}
