pub mod config;
pub mod db;
pub mod logging;
pub mod mastery;
pub mod response;
pub mod routes;
pub mod services;
pub mod state;

use std::sync::Arc;

use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::db::config::DbConfig;
use crate::db::{StoreBackend, StoreError};
use crate::mastery::{MasteryConfig, MasteryEngine};
use crate::state::{AppState, Engine};

/// Builds the application from environment configuration.
pub async fn create_app() -> Result<axum::Router, StoreError> {
    let store = StoreBackend::open(&DbConfig::from_env()).await?;
    let engine = MasteryEngine::new(Arc::new(store), MasteryConfig::from_env());
    Ok(create_app_with(Arc::new(engine)))
}

pub fn create_app_with(engine: Arc<Engine>) -> axum::Router {
    routes::router(AppState::new(engine))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
