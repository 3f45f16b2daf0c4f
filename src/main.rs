use anyhow::{Context, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::{error, info};

mod config;
mod dispatch;
mod error;
mod gallery;
mod intersect;
mod library;

use config::Config;
use dispatch::Dispatcher;
use gallery::AppState;
use library::SteamWebApi;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    let api_key = config.api_key.as_deref().unwrap_or_default();
    let steam = SteamWebApi::new(api_key, Some(&config.api_url), config.fetch_timeout())?;

    let settings = config.dispatch_settings();
    info!(
        "Dispatch settings: timeout={:?}, max_concurrent={:?}, policy={:?}, membership={:?}",
        settings.fetch_timeout,
        settings.max_concurrent_fetches,
        settings.failure_policy,
        settings.membership
    );
    let dispatcher = Dispatcher::new(Arc::new(steam), settings);

    let app = gallery::router(AppState {
        dispatcher: Arc::new(dispatcher),
    });

    let bind = config.bind_addr();
    let addr = lookup_host(&bind)
        .await
        .with_context(|| format!("Failed to resolve {}", bind))?
        .next()
        .with_context(|| format!("No address found for {}", bind))?;

    tokio::select! {
        r = serve(&config, addr, app) => {
            if let Err(e) = r {
                error!("HTTP server error: {:#}", e);
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }

    Ok(())
}

async fn serve(config: &Config, addr: SocketAddr, app: Router) -> Result<()> {
    if config.tls {
        // same provider reqwest's rustls build uses
        let _ = rustls::crypto::ring::default_provider().install_default();
        let tls = RustlsConfig::from_pem_file(&config.tls_cert, &config.tls_key)
            .await
            .context("Failed to load TLS certificate/key")?;
        info!("Serving with TLS on https://{}", addr);
        axum_server::bind_rustls(addr, tls)
            .serve(app.into_make_service())
            .await
            .context("HTTPS server error")?;
    } else {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        info!("Listening on http://{}", addr);
        axum::serve(listener, app).await.context("HTTP server error")?;
    }
    Ok(())
}
