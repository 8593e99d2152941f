// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! benchwatch results API server.

use anyhow::Context;
use benchwatch_adapters::RepoCommitLog;
use benchwatch_core::{telemetry, Settings};
use benchwatch_engine::Engine;
use benchwatch_storage::Database;
use metrics_exporter_prometheus::PrometheusBuilder;
use results_api::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var_os("BENCHWATCH_CONFIG").map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref()).context("Failed to load settings")?;
    telemetry::init_tracing(&settings.logging)?;

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let db = Database::connect(&settings.database)
        .await
        .context("Failed to open database")?;
    db.migrate().await.context("Failed to migrate database")?;

    let commits = RepoCommitLog::new(&settings.commits)?;
    let bind_address = settings.server.bind_address();
    let engine = Engine::new(db, Arc::new(commits), settings);
    let app = build_router(AppState::new(engine, Some(metrics)));

    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {}", bind_address))?;
    info!(address = %bind_address, "Results API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Results API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
