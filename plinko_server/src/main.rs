use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use plinko_core::{os_seed_source, select_digester, EngineParams, GameState, Paytable, SavedGame};
use plinko_shared::SqliteStore;

mod config;
mod routes;

use config::ServerConfig;
use routes::{router, AppState};

async fn load_paytable(config: &ServerConfig) -> anyhow::Result<Paytable> {
    match &config.payout_tables {
        Some(path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading payout tables from {}", path.display()))?;
            let paytable = Paytable::from_json(&json)?;
            info!(path = %path.display(), "loaded custom payout tables");
            Ok(paytable)
        }
        None => Ok(Paytable::standard()?),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    let config = ServerConfig::parse();

    let params = EngineParams::new(load_paytable(&config).await?, select_digester(config.digest_backend));

    // storage is optional: play continues in memory if the database is unusable
    let store = match SqliteStore::connect(&config.database_url).await {
        Ok(store) => Some(store),
        Err(err) => {
            warn!(error = %err, url = %config.database_url, "storage unavailable, session will not persist");
            None
        }
    };
    let saved = match &store {
        Some(store) => SavedGame::load_or_default(store.load().await),
        None => SavedGame::default(),
    };
    if !params.paytable.has_table(saved.settings.risk, saved.settings.rows) {
        warn!(
            risk = %saved.settings.risk,
            rows = saved.settings.rows,
            "saved settings have no payout table, drops will need explicit overrides"
        );
    }
    let session = GameState::from_saved(saved, os_seed_source());
    info!(
        server_seed_hash = %session.seeds.server_seed_hash(),
        nonce = session.seeds.nonce(),
        drop_index = session.seeds.drop_index(),
        "session ready"
    );

    let state = Arc::new(AppState::new(
        session,
        params,
        store,
        config.api_key.clone(),
        config.autoplay_delay(),
    ));
    // publish the commitment before the first drop
    state.save_now().await;

    let app = router(state).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("listening on {}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
