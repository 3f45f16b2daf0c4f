use axum::{
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use tracing::debug;

use crate::dispatch::{CommonGamesReport, Dispatcher};
use crate::error::DispatchError;

/// Header image for a Steam app, keyed by app id.
const CDN_HEADER_URL: &str = "https://cdn.akamai.steamstatic.com/steam/apps";

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Debug, Deserialize)]
pub struct PlayersQuery {
    /// `|`-separated SteamID64 list
    pub players: Option<String>,
}

/// Build the Axum router for the gallery.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(gallery_handler))
        .route("/api/common", get(common_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(Arc::new(state))
}

type PlayersParam = Result<Query<PlayersQuery>, QueryRejection>;

async fn common_games(
    state: &AppState,
    query: PlayersParam,
) -> Result<CommonGamesReport, (StatusCode, String)> {
    let to_response = |e: DispatchError| (e.status_code(), e.to_string());
    // a malformed query string (e.g. `players` given twice) is just bad input
    let Query(query) = query.map_err(|rejection| {
        debug!("Rejected query string: {}", rejection);
        to_response(DispatchError::InvalidInput)
    })?;
    let players = Dispatcher::parse_players(query.players.as_deref()).map_err(to_response)?;
    state.dispatcher.handle(players).await.map_err(to_response)
}

/// GET /?players=a|b|c
async fn gallery_handler(
    State(state): State<Arc<AppState>>,
    query: PlayersParam,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    common_games(&state, query)
        .await
        .map(|report| Html(render_gallery(&report)))
}

/// GET /api/common?players=a|b|c
async fn common_handler(
    State(state): State<Arc<AppState>>,
    query: PlayersParam,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    common_games(&state, query).await.map(Json)
}

/// Render the common games as one header image per game.
pub fn render_gallery(report: &CommonGamesReport) -> String {
    let mut html = String::from(PAGE_HEAD);

    let _ = write!(
        html,
        "<p class='text-muted'>{} game(s) owned by all of {} player(s)",
        report.games.len(),
        report.contributors.len()
    );
    if !report.skipped.is_empty() {
        let skipped: Vec<String> = report
            .skipped
            .iter()
            .map(|s| escape_html(&s.steam_id))
            .collect();
        let _ = write!(html, "; skipped {}", skipped.join(", "));
    }
    html.push_str("</p>\n");

    for game in report.entries() {
        let name = escape_html(&game.name);
        let _ = writeln!(
            html,
            "<img src='{}/{}/header.jpg' alt='{}' title='{}'><br>",
            CDN_HEADER_URL, game.appid, name, name
        );
    }

    html.push_str(PAGE_TAIL);
    html
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>steamowned</title>
<link rel="stylesheet" href="https://maxcdn.bootstrapcdn.com/bootstrap/3.3.7/css/bootstrap.min.css" integrity="sha384-BVYiiSIFeK1dGmJRAkycuHAHRg32OmUcww7on3RYdg4Va+PmSTsz/K68vbdEjh4u" crossorigin="anonymous">
</head>
<body>
<h1>steamowned</h1>
<br>
"#;

const PAGE_TAIL: &str = "</body>\n</html>\n";
