//! Running intersection of owned-game lists.
//!
//! One [`CommonGames`] exists per request. Fetch tasks hand it their
//! [`OwnedSet`] through [`CommonGames::seed_or_narrow`], the only way to
//! mutate it. The first non-empty set seeds the aggregate; every later one
//! narrows it. After the seed the aggregate never grows, and a removed entry
//! is never restored, so any arrival order converges on the same result.

pub mod bloom;

pub use bloom::BloomFilter;

use std::collections::{BTreeMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::library::OwnedSet;

pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

/// How a narrowing merge tests whether an app id is in the incoming set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Membership {
    /// Bloom filter: no false removals, rare false retentions.
    Bloom { false_positive_rate: f64 },
    /// Hash set: exact.
    Exact,
}

impl Default for Membership {
    fn default() -> Self {
        Membership::Bloom {
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
        }
    }
}

enum MembershipIndex {
    Bloom(BloomFilter),
    Exact(HashSet<u64>),
}

impl MembershipIndex {
    fn build(membership: Membership, incoming: &OwnedSet) -> Self {
        match membership {
            Membership::Bloom {
                false_positive_rate,
            } => {
                let mut filter = BloomFilter::with_rate(incoming.len(), false_positive_rate);
                for game in &incoming.games {
                    filter.insert(game.appid);
                }
                debug!(
                    "Bloom filter for {}: {} bits, {} hashes, expected false positives {:.5}",
                    incoming.steam_id,
                    filter.num_bits(),
                    filter.num_hashes(),
                    filter.expected_false_positive_rate(incoming.len())
                );
                MembershipIndex::Bloom(filter)
            }
            Membership::Exact => {
                MembershipIndex::Exact(incoming.games.iter().map(|g| g.appid).collect())
            }
        }
    }

    fn contains(&self, appid: u64) -> bool {
        match self {
            MembershipIndex::Bloom(filter) => filter.contains(appid),
            MembershipIndex::Exact(set) => set.contains(&appid),
        }
    }
}

/// What a single merge did to the aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Incoming set was empty; it places no constraint on the result.
    Skipped,
    /// First non-empty set: the aggregate now holds exactly its entries.
    Seeded { kept: usize },
    /// Entries missing from the incoming set were dropped.
    Narrowed { removed: usize, kept: usize },
}

#[derive(Default)]
struct Intersection {
    games: BTreeMap<u64, String>,
    seeded: bool,
}

/// Thread-safe running intersection: app id → game name.
pub struct CommonGames {
    membership: Membership,
    state: Mutex<Intersection>,
    #[cfg(test)]
    indexes_built: std::sync::atomic::AtomicUsize,
}

impl CommonGames {
    pub fn new(membership: Membership) -> Self {
        CommonGames {
            membership,
            state: Mutex::new(Intersection::default()),
            #[cfg(test)]
            indexes_built: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Fold one account's games into the aggregate.
    ///
    /// Callers are serialised on the internal lock. Once seeded the aggregate
    /// stays seeded, so a narrowing caller builds its membership index
    /// outside the lock and the critical section is a single pass over the
    /// aggregate. The seeding caller never builds one.
    pub async fn seed_or_narrow(&self, incoming: &OwnedSet) -> MergeOutcome {
        if incoming.is_empty() {
            return MergeOutcome::Skipped;
        }

        {
            let mut state = self.state.lock().await;
            if !state.seeded {
                for game in &incoming.games {
                    state
                        .games
                        .entry(game.appid)
                        .or_insert_with(|| game.name.clone());
                }
                state.seeded = true;
                debug!(
                    "Seeded common games from {} ({} entries)",
                    incoming.steam_id,
                    state.games.len()
                );
                return MergeOutcome::Seeded {
                    kept: state.games.len(),
                };
            }
        }

        #[cfg(test)]
        self.indexes_built
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let index = MembershipIndex::build(self.membership, incoming);
        let mut state = self.state.lock().await;
        let before = state.games.len();
        state.games.retain(|appid, _| index.contains(*appid));
        let kept = state.games.len();
        debug!(
            "Narrowed common games with {}: {} -> {}",
            incoming.steam_id, before, kept
        );
        MergeOutcome::Narrowed {
            removed: before - kept,
            kept,
        }
    }

    /// Copy of the current aggregate, ordered by app id.
    pub async fn snapshot(&self) -> BTreeMap<u64, String> {
        self.state.lock().await.games.clone()
    }

    #[cfg(test)]
    pub async fn is_seeded(&self) -> bool {
        self.state.lock().await.seeded
    }

    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.state.lock().await.games.len()
    }
}

#[cfg(test)]
impl Default for CommonGames {
    fn default() -> Self {
        Self::new(Membership::default())
    }
}
