//! Application setup and initialization

pub mod database;
pub mod routes;
pub mod server;
pub mod services;

use crate::state::AppState;
use anyhow::{Context, Result};
use rma_attach_core::Config;
use std::sync::Arc;

/// Initialize the entire application
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config.validate().context("Configuration validation failed")?;

    crate::telemetry::init_telemetry(&config).context("Failed to initialize telemetry")?;

    tracing::info!("Configuration loaded and validated successfully");

    let pool = database::setup_database(&config).await?;

    let state = services::initialize_services(&config, pool).await?;

    let router = routes::setup_routes(state.clone());

    Ok((state, router))
}
