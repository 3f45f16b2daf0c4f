pub mod models;
pub mod provider;
pub mod steam;

pub use models::{GameEntry, OwnedSet};
pub use provider::OwnedGamesProvider;
pub use steam::SteamWebApi;
