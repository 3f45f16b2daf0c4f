use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::models::GameEntry;
use super::provider::OwnedGamesProvider;

const DEFAULT_API_URL: &str = "https://api.steampowered.com";
const OWNED_GAMES_PATH: &str = "IPlayerService/GetOwnedGames/v0001/";

/// Owned-games provider backed by the Steam Web API.
/// Docs: <https://developer.valvesoftware.com/wiki/Steam_Web_API#GetOwnedGames_.28v0001.29>
pub struct SteamWebApi {
    http: Client,
    api_key: String,
    /// Base URL for overriding in tests
    base_url: Url,
}

impl SteamWebApi {
    pub fn new(api_key: &str, base_url: Option<&str>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!(
                "steamownedbot/",
                env!("CARGO_PKG_VERSION"),
                " (+https://github.com/pietroglyph/steamowned)"
            ))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.unwrap_or(DEFAULT_API_URL);
        let base_url = Url::parse(&format!("{}/", base_url.trim_end_matches('/')))
            .with_context(|| format!("Invalid Steam API URL: {}", base_url))?;

        Ok(SteamWebApi {
            http,
            api_key: api_key.to_string(),
            base_url,
        })
    }

    fn owned_games_url(&self, steam_id: &str) -> Result<Url> {
        let mut url = self
            .base_url
            .join(OWNED_GAMES_PATH)
            .context("Failed to build GetOwnedGames URL")?;
        url.query_pairs_mut()
            .append_pair("key", &self.api_key)
            .append_pair("steamid", steam_id)
            .append_pair("format", "json")
            .append_pair("include_appinfo", "1")
            .append_pair("include_played_free_games", "1");
        Ok(url)
    }
}

#[async_trait]
impl OwnedGamesProvider for SteamWebApi {
    fn name(&self) -> &str {
        "SteamWebApi"
    }

    async fn fetch_owned_games(&self, steam_id: &str) -> Result<Vec<GameEntry>> {
        let url = self.owned_games_url(steam_id)?;
        // the key is part of the query string, keep it out of the logs
        debug!("Fetching owned games for {} from {}", steam_id, url.path());

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .context("Steam API request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("Steam API error: {}", resp.status());
        }

        let raw: serde_json::Value = resp
            .json()
            .await
            .context("Failed to parse Steam API response")?;

        Ok(parse_owned_games(&raw))
    }
}

/// Extract `(appid, name)` rows from a GetOwnedGames JSON body.
///
/// Private profiles and unknown ids come back as `{"response": {}}`, which
/// yields an empty list. Rows without an appid are skipped.
fn parse_owned_games(raw: &serde_json::Value) -> Vec<GameEntry> {
    let games = match raw["response"]["games"].as_array() {
        Some(a) => a,
        None => return vec![],
    };

    games
        .iter()
        .filter_map(|game| {
            let appid = game["appid"]
                .as_u64()
                .or_else(|| game["appid"].as_str().and_then(|s| s.trim().parse().ok()))?;
            let name = game["name"]
                .as_str()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| appid.to_string());
            Some(GameEntry { appid, name })
        })
        .collect()
}
