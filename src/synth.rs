//! Seeded synthetic users and events in the raw table layout.

use std::collections::HashMap;
use std::path::Path;

use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::info;

use crate::config::PipelinePaths;
use crate::error::{PersistenceError, Result};
use crate::features::io::ensure_parent_dir;
use crate::types::{Event, User};

const REGIONS: [&str; 6] = ["Lombardia", "Lazio", "Campania", "Sicilia", "Veneto", "Toscana"];
const CATEGORIES: [&str; 5] = ["music", "sport", "theatre", "food", "tech"];

/// Size and shape of a generated dataset.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SynthOptions {
    /// Number of users.
    pub users: usize,
    /// Number of events.
    pub events: usize,
    /// Upper bound on favorites per user.
    pub max_favorites: usize,
    /// Chance that a favorite points at an event that does not exist.
    pub dangling_ratio: f64,
    /// Generator seed.
    pub seed: u64,
}

impl Default for SynthOptions {
    fn default() -> Self {
        Self {
            users: 200,
            events: 50,
            max_favorites: 6,
            dangling_ratio: 0.05,
            seed: 42,
        }
    }
}

/// Users and events produced by [`generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticData {
    /// Generated users.
    pub users: Vec<User>,
    /// Generated events; `popularity` counts the users who favorited each.
    pub events: Vec<Event>,
}

/// Generates a dataset; identical options give identical output.
pub fn generate(options: &SynthOptions) -> SyntheticData {
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);

    let mut events: Vec<Event> = (0..options.events)
        .map(|i| Event {
            id: format!("e{i}"),
            region: REGIONS[rng.gen_range(0..REGIONS.len())].to_string(),
            category: CATEGORIES[rng.gen_range(0..CATEGORIES.len())].to_string(),
            popularity: 0,
        })
        .collect();

    let mut dangling = 0usize;
    let mut tally: HashMap<usize, u64> = HashMap::new();
    let users = (0..options.users)
        .map(|i| {
            let region = REGIONS[rng.gen_range(0..REGIONS.len())].to_string();
            let wanted = rng.gen_range(0..=options.max_favorites).min(events.len());
            let mut favorites = Vec::with_capacity(wanted);
            for index in sample(&mut rng, events.len(), wanted).into_iter() {
                if rng.gen_bool(options.dangling_ratio.clamp(0.0, 1.0)) {
                    favorites.push(format!("x{dangling}"));
                    dangling += 1;
                } else {
                    favorites.push(events[index].id.clone());
                    *tally.entry(index).or_default() += 1;
                }
            }
            User {
                id: format!("u{i}"),
                region,
                favorites,
            }
        })
        .collect();

    for (index, count) in tally {
        events[index].popularity = count;
    }
    SyntheticData { users, events }
}

fn favorites_literal(favorites: &[String]) -> String {
    let quoted: Vec<String> = favorites.iter().map(|id| format!("'{id}'")).collect();
    format!("[{}]", quoted.join(", "))
}

/// Writes users as `id,regione,favoriteIds`.
pub fn write_users(path: &Path, users: &[User]) -> std::result::Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    writer
        .write_record(["id", "regione", "favoriteIds"])
        .map_err(|err| PersistenceError::csv(path, err))?;
    for user in users {
        writer
            .write_record([
                user.id.as_str(),
                user.region.as_str(),
                favorites_literal(&user.favorites).as_str(),
            ])
            .map_err(|err| PersistenceError::csv(path, err))?;
    }
    writer.flush().map_err(|err| PersistenceError::io(path, err))
}

/// Writes events as `id,regione,category,favoriteCount`.
pub fn write_events(path: &Path, events: &[Event]) -> std::result::Result<(), PersistenceError> {
    ensure_parent_dir(path)?;
    let mut writer = csv::Writer::from_path(path).map_err(|err| PersistenceError::csv(path, err))?;
    writer
        .write_record(["id", "regione", "category", "favoriteCount"])
        .map_err(|err| PersistenceError::csv(path, err))?;
    for event in events {
        writer
            .write_record([
                event.id.clone(),
                event.region.clone(),
                event.category.clone(),
                event.popularity.to_string(),
            ])
            .map_err(|err| PersistenceError::csv(path, err))?;
    }
    writer.flush().map_err(|err| PersistenceError::io(path, err))
}

/// Generates a dataset and writes it to the raw table paths.
pub fn run_generate(paths: &PipelinePaths, options: &SynthOptions) -> Result<SyntheticData> {
    let data = generate(options);
    write_users(&paths.users_csv, &data.users)?;
    write_events(&paths.events_csv, &data.events)?;
    info!(
        users = data.users.len(),
        events = data.events.len(),
        seed = options.seed,
        "synthetic raw tables written"
    );
    Ok(data)
}
