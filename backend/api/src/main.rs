//! Questboard API — entry point.
//!
//! Wires the lifecycle engine to a SQLite-backed store and the hosted
//! payment processor, exposes the transition API over Axum REST, and
//! runs a background sweeper that expires overdue open quests.

mod api;
mod config;
mod db;
mod errors;
mod notify;
mod processor;
mod sweeper;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use reqwest::Client;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use questboard_engine::{default_catalog, QuestEngine};

use config::Config;
use db::SqliteStore;
use notify::LogNotifier;
use processor::HttpProcessor;
use sweeper::SweeperState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // HTTP client for outbound processor calls.
    let client = Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?;

    // ─── Engine ───────────────────────────────────────────
    let store = Arc::new(SqliteStore::new(pool.clone(), default_catalog()));
    let payment_processor = Arc::new(HttpProcessor::new(client, config.processor_url.clone()));
    let engine = Arc::new(QuestEngine::new(
        store,
        payment_processor,
        Arc::new(LogNotifier),
        config.engine_config(),
    ));

    // ─── Background expiry sweeper ────────────────────────
    let sweeper_state = Arc::new(SweeperState {
        pool,
        engine: engine.clone(),
        interval_secs: config.sweep_interval_secs,
    });
    tokio::spawn(sweeper::run(sweeper_state));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState { engine });

    let app = Router::new()
        .route("/health", get(api::health))
        .route("/users", post(api::register_user))
        .route("/profiles/:id", get(api::get_profile))
        .route("/quests", post(api::create_quest))
        .route("/quests/:id", get(api::get_quest))
        .route("/quests/:id/intents", get(api::get_quest_intents))
        .route("/quests/:id/claim", post(api::claim_quest))
        .route("/quests/:id/submit", post(api::submit_quest))
        .route("/quests/:id/approve", post(api::approve_quest))
        .route("/quests/:id/reject", post(api::reject_quest))
        .route("/quests/:id/cancel", post(api::cancel_quest))
        .route("/quests/:id/reviews", post(api::submit_review))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(api_state);

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
