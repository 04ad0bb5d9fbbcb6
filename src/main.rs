use crate::booter::Booter;
use crate::config::Config;
use crate::core::landmarks::MeshServiceDetector;
use crate::core::recommender::{ClaudeRecommender, Recommender};
use crate::orchestrator::cron::spawn_sweeper;
use crate::server::error::hide_internal_details;
use crate::server::router::build_router;
use crate::server::types::AppState;
use std::sync::Arc;

pub mod booter;
pub mod config;
pub mod core;
pub mod governor_conf;
pub mod orchestrator;
pub mod server;
pub mod utils;

// Initialize app state from environment variables
async fn init_app_state() -> Result<AppState, anyhow::Error> {
    let config = Config::from_env()?;
    hide_internal_details(config.is_production());
    tokio::fs::create_dir_all(&config.upload_dir).await?;

    let detector = MeshServiceDetector::new(config.landmark.clone())?;
    let recommender = ClaudeRecommender::new(config.claude.clone())?;
    if !recommender.is_configured() {
        tracing::warn!("ANTHROPIC_API_KEY is not set; recommendation endpoints will return 503");
    }

    tracing::info!(
        "landmark service at {}, model {}, uploads in {}",
        config.landmark.base_url,
        config.claude.model,
        config.upload_dir.display()
    );

    Ok(AppState {
        config,
        detector: Arc::new(detector),
        recommender: Arc::new(recommender),
    })
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt::init();

    let app_state = init_app_state().await?;

    // fallback for files a crashed request never removed
    let _sweeper = spawn_sweeper(
        app_state.config.upload_dir.clone(),
        app_state.config.cleanup_interval,
        app_state.config.max_file_age,
    );

    let port = app_state.config.port;
    let state = Arc::new(app_state);
    let router = build_router(state)?;

    Booter::new(port).await?.start(router).await
}
