use anyhow::Result;
use async_trait::async_trait;

use super::models::GameEntry;

/// Trait that every owned-games source must implement.
#[async_trait]
pub trait OwnedGamesProvider: Send + Sync {
    /// Return every game the given account owns.
    ///
    /// An empty vector means the source answered but listed nothing
    /// (private profile, unknown id).
    async fn fetch_owned_games(&self, steam_id: &str) -> Result<Vec<GameEntry>>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}
