use chrono::{DateTime, Utc};
use serde::Serialize;

/// One game row extracted from an owned-games response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameEntry {
    /// Steam application id, the natural key of a game
    pub appid: u64,
    /// Display name as reported upstream (falls back to the appid)
    pub name: String,
}

impl GameEntry {
    pub fn new(appid: u64, name: impl Into<String>) -> Self {
        GameEntry {
            appid,
            name: name.into(),
        }
    }
}

/// Everything one fetch task learned about one account.
///
/// Task-local until it is handed to the aggregate.
#[derive(Debug, Clone, Serialize)]
pub struct OwnedSet {
    pub steam_id: String,
    pub games: Vec<GameEntry>,
    pub fetched_at: DateTime<Utc>,
}

impl OwnedSet {
    pub fn new(steam_id: impl Into<String>, games: Vec<GameEntry>) -> Self {
        OwnedSet {
            steam_id: steam_id.into(),
            games,
            fetched_at: Utc::now(),
        }
    }

    /// The contribution of an account whose fetch produced nothing usable.
    pub fn empty(steam_id: impl Into<String>) -> Self {
        Self::new(steam_id, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.games.is_empty()
    }

    pub fn len(&self) -> usize {
        self.games.len()
    }
}
