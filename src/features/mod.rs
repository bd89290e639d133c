//! Feature engineering: joins users and events into labeled feature rows.
//!
//! Every user is paired with every event. Rows come out grouped by user in
//! input order, then by event in input order, so the same snapshot always
//! produces the same table.

pub mod io;

use std::collections::HashMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::types::{Event, FeatureRow, User};

pub use io::{read_events, read_feature_table, read_users, run_build, write_feature_table};
pub use io::{BuildSummary, FeatureRecord, FeatureTable};

/// A user's favorites field could not be read as a list of identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error(
    "cannot interpret favorites {raw:?}{} as a list of identifiers: {reason}",
    .user_id.as_deref().map(|id| format!(" of user `{id}`")).unwrap_or_default()
)]
pub struct ParseError {
    /// Owner of the field, when known.
    pub user_id: Option<String>,
    /// The raw field contents.
    pub raw: String,
    /// What went wrong.
    pub reason: String,
}

impl ParseError {
    fn new(raw: &str, reason: impl Into<String>) -> Self {
        Self {
            user_id: None,
            raw: raw.to_string(),
            reason: reason.into(),
        }
    }

    /// Attaches the owning user id.
    pub fn for_user(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }
}

/// Parses a bracketed list literal such as `['e1', "e2", 3]` into ids.
///
/// Elements may be single quoted, double quoted or bare tokens made of
/// alphanumerics, `-`, `_` and `.`. A trailing comma is accepted.
pub fn parse_favorites(raw: &str) -> Result<Vec<String>, ParseError> {
    let inner = raw
        .trim()
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .ok_or_else(|| ParseError::new(raw, "expected a bracketed list"))?;

    let mut ids = Vec::new();
    let mut chars = inner.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let id = match chars.peek().copied() {
            None => break,
            Some(quote @ ('\'' | '"')) => {
                chars.next();
                let mut id = String::new();
                loop {
                    match chars.next() {
                        Some(c) if c == quote => break,
                        Some(c) => id.push(c),
                        None => return Err(ParseError::new(raw, "unterminated quoted element")),
                    }
                }
                id
            }
            Some(_) => {
                let mut id = String::new();
                while let Some(c) = chars.next_if(|c| *c != ',' && !c.is_whitespace()) {
                    if !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.')) {
                        return Err(ParseError::new(
                            raw,
                            format!("unexpected character {c:?} in element"),
                        ));
                    }
                    id.push(c);
                }
                if id.is_empty() {
                    return Err(ParseError::new(raw, "empty list element"));
                }
                id
            }
        };
        ids.push(id);

        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        match chars.next() {
            None => break,
            Some(',') => continue,
            Some(c) => {
                return Err(ParseError::new(
                    raw,
                    format!("expected `,` between elements, found {c:?}"),
                ))
            }
        }
    }
    Ok(ids)
}

/// Heuristic relevance label.
///
/// Weighted sum of region match, "has liked this category before" and a
/// saturating popularity term. Downstream models are trained to reproduce it,
/// so the weights must stay exactly as they are.
pub fn heuristic_score(region_match: u8, user_likes_for_category: u64, popularity: u64) -> f64 {
    let liked = if user_likes_for_category > 0 { 1.0 } else { 0.0 };
    let popularity = popularity as f64;
    0.5 * f64::from(region_match) + 0.3 * liked + 0.2 * (popularity / (1.0 + popularity))
}

/// Event id → category lookup built once per catalog.
#[derive(Debug)]
pub struct CategoryIndex<'a> {
    by_event: HashMap<&'a str, &'a str>,
}

impl<'a> CategoryIndex<'a> {
    /// Indexes every event in `events`.
    pub fn new(events: &'a [Event]) -> Self {
        let by_event = events
            .iter()
            .map(|event| (event.id.as_str(), event.category.as_str()))
            .collect();
        Self { by_event }
    }

    /// Category of `event_id`, if the event exists.
    pub fn category(&self, event_id: &str) -> Option<&'a str> {
        self.by_event.get(event_id).copied()
    }

    /// Counts `user`'s favorites per category.
    ///
    /// Favorites that reference unknown events are skipped; the number skipped
    /// is returned alongside the tally.
    pub fn tally(&self, user: &User) -> (HashMap<&'a str, u64>, usize) {
        let mut counts = HashMap::new();
        let mut missing = 0;
        for fav in &user.favorites {
            match self.category(fav) {
                Some(category) => *counts.entry(category).or_insert(0) += 1,
                None => {
                    debug!(user = %user.id, event = %fav, "favorite references unknown event");
                    missing += 1;
                }
            }
        }
        (counts, missing)
    }
}

/// Builds one labeled row per (user, event) pair.
pub fn build_feature_rows(users: &[User], events: &[Event]) -> Vec<FeatureRow> {
    let index = CategoryIndex::new(events);
    let mut rows = Vec::with_capacity(users.len() * events.len());
    let mut missing_total = 0;

    for user in users {
        let (liked, missing) = index.tally(user);
        missing_total += missing;
        for event in events {
            let region_match = u8::from(user.region == event.region);
            let user_likes_for_category = liked.get(event.category.as_str()).copied().unwrap_or(0);
            rows.push(FeatureRow {
                user_id: user.id.clone(),
                event_id: event.id.clone(),
                region_match,
                user_likes_for_category,
                event_popularity: event.popularity,
                score: heuristic_score(region_match, user_likes_for_category, event.popularity),
            });
        }
    }

    if missing_total > 0 {
        warn!(
            missing = missing_total,
            "skipped favorites that reference events absent from the catalog"
        );
    }
    rows
}
