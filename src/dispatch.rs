//! Fans a request out into one fetch task per account and joins them.
//!
//! Every task owns its identifier and its fetched [`OwnedSet`]; the only
//! shared state is the request's [`CommonGames`]. Tasks live in a
//! [`JoinSet`], which hands back exactly one result per spawned task
//! (including panics) and aborts whatever is still running when it is
//! dropped, e.g. when the client goes away mid-request.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::error::{DispatchError, FetchError};
use crate::intersect::{CommonGames, Membership, MergeOutcome};
use crate::library::{GameEntry, OwnedGamesProvider, OwnedSet};

pub const PLAYER_DELIMITER: char = '|';

/// What to do with the result when some accounts could not be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// A failed account places no constraint on the result.
    #[default]
    Lenient,
    /// Any failed account fails the whole request.
    Strict,
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub fetch_timeout: Duration,
    /// Upper bound on upstream requests in flight for one request.
    pub max_concurrent_fetches: Option<usize>,
    pub failure_policy: FailurePolicy,
    pub membership: Membership,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        DispatchSettings {
            fetch_timeout: Duration::from_secs(10),
            max_concurrent_fetches: None,
            failure_policy: FailurePolicy::Lenient,
            membership: Membership::default(),
        }
    }
}

/// An account that contributed nothing, and why.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedPlayer {
    pub steam_id: String,
    pub reason: String,
}

/// Final answer for one request.
#[derive(Debug, Clone, Serialize)]
pub struct CommonGamesReport {
    /// app id → game name, present in every contributing account
    pub games: BTreeMap<u64, String>,
    /// Accounts whose games constrained the result
    pub contributors: Vec<String>,
    /// Accounts that yielded nothing usable
    pub skipped: Vec<SkippedPlayer>,
}

impl CommonGamesReport {
    pub fn entries(&self) -> impl Iterator<Item = GameEntry> + '_ {
        self.games
            .iter()
            .map(|(appid, name)| GameEntry::new(*appid, name.clone()))
    }
}

/// Result a fetch task hands back to the join.
struct TaskReport {
    steam_id: String,
    outcome: Result<MergeOutcome, FetchError>,
}

pub struct Dispatcher {
    provider: Arc<dyn OwnedGamesProvider>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(provider: Arc<dyn OwnedGamesProvider>, settings: DispatchSettings) -> Self {
        Dispatcher { provider, settings }
    }

    /// Split the raw `players` query value into account identifiers.
    ///
    /// Segments are trimmed, blanks dropped and duplicates collapsed in
    /// first-seen order. Identifier syntax is not checked here; a malformed
    /// id simply fetches nothing.
    pub fn parse_players(raw: Option<&str>) -> Result<Vec<String>, DispatchError> {
        let raw = raw.map(str::trim).unwrap_or_default();
        if raw.is_empty() {
            return Err(DispatchError::InvalidInput);
        }

        let mut seen = HashSet::new();
        let players: Vec<String> = raw
            .split(PLAYER_DELIMITER)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .filter(|id| seen.insert(*id))
            .map(str::to_string)
            .collect();

        if players.is_empty() {
            return Err(DispatchError::InvalidInput);
        }
        Ok(players)
    }

    /// Fetch every account concurrently and return the games all of them own.
    pub async fn handle(&self, players: Vec<String>) -> Result<CommonGamesReport, DispatchError> {
        if players.is_empty() {
            return Err(DispatchError::InvalidInput);
        }

        let common = Arc::new(CommonGames::new(self.settings.membership));
        let permits = self
            .settings
            .max_concurrent_fetches
            .map(|n| Arc::new(Semaphore::new(n)));

        info!(
            "Fetching owned games for {} player(s) via {}",
            players.len(),
            self.provider.name()
        );

        let mut tasks = JoinSet::new();
        let mut task_players = HashMap::new();
        for steam_id in players {
            let handle = tasks.spawn(fetch_task(
                Arc::clone(&self.provider),
                steam_id.clone(),
                Arc::clone(&common),
                self.settings.fetch_timeout,
                permits.clone(),
            ));
            task_players.insert(handle.id(), steam_id);
        }

        let mut contributors = Vec::new();
        let mut skipped = Vec::new();

        while let Some(joined) = tasks.join_next_with_id().await {
            let report = match joined {
                Ok((_, report)) => report,
                Err(join_err) => {
                    let steam_id = task_players
                        .remove(&join_err.id())
                        .unwrap_or_else(|| "<unknown>".to_string());
                    error!("Fetch task for {} did not finish: {}", steam_id, join_err);
                    TaskReport {
                        steam_id,
                        outcome: Err(FetchError::InternalTaskFailure(join_err.to_string())),
                    }
                }
            };

            match report.outcome {
                Ok(_) => contributors.push(report.steam_id),
                Err(e) if self.settings.failure_policy == FailurePolicy::Strict => {
                    warn!(
                        "Aborting request for {}, strict policy and fetch failed: {}",
                        report.steam_id, e
                    );
                    tasks.abort_all();
                    return Err(DispatchError::IncompleteFetch {
                        failed: vec![report.steam_id],
                    });
                }
                Err(e) => skipped.push(SkippedPlayer {
                    steam_id: report.steam_id,
                    reason: e.to_string(),
                }),
            }
        }

        let games = common.snapshot().await;
        info!(
            "{} game(s) in common across {} player(s), {} skipped",
            games.len(),
            contributors.len(),
            skipped.len()
        );

        Ok(CommonGamesReport {
            games,
            contributors,
            skipped,
        })
    }
}

/// Fetch one account, fold it into the aggregate, report back.
///
/// Never fails outward: every error becomes an empty contribution plus a
/// log line. The aggregate is touched exactly once per task.
async fn fetch_task(
    provider: Arc<dyn OwnedGamesProvider>,
    steam_id: String,
    common: Arc<CommonGames>,
    fetch_timeout: Duration,
    permits: Option<Arc<Semaphore>>,
) -> TaskReport {
    let _permit = match permits {
        Some(sem) => match sem.acquire_owned().await {
            Ok(p) => Some(p),
            Err(e) => {
                return TaskReport {
                    steam_id,
                    outcome: Err(FetchError::InternalTaskFailure(e.to_string())),
                }
            }
        },
        None => None,
    };

    let fetched =
        match tokio::time::timeout(fetch_timeout, provider.fetch_owned_games(&steam_id)).await {
            Err(_) => Err(FetchError::Timeout(fetch_timeout)),
            Ok(Err(e)) => Err(FetchError::Upstream(e)),
            Ok(Ok(games)) if games.is_empty() => Err(FetchError::NoExtractableData),
            Ok(Ok(games)) => Ok(games),
        };

    let (owned, status) = match fetched {
        Ok(games) => (OwnedSet::new(steam_id.clone(), games), Ok(())),
        Err(e) => {
            warn!("Couldn't extract app ids for {}: {}", steam_id, e);
            (OwnedSet::empty(steam_id.clone()), Err(e))
        }
    };

    let merged = common.seed_or_narrow(&owned).await;
    debug!(
        "Merged {} ({} games, fetched {}): {:?}",
        steam_id,
        owned.len(),
        owned.fetched_at.to_rfc3339(),
        merged
    );

    TaskReport {
        steam_id,
        outcome: status.map(|()| merged),
    }
}
