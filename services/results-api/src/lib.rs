// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP surface of benchwatch.
//!
//! Result submission (form-encoded, single or batched), changes tables,
//! report listings and refreshes, streamed timelines, comparison data and
//! commit logs. Errors are returned as JSON through [`error::ApiError`].

#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod error;
pub mod routes;

use axum::Router;
use benchwatch_engine::Engine;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// State shared by all handlers.
pub struct AppState {
    pub engine: Engine,
    /// Renders `/metrics`; the route answers 404 without one.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(engine: Engine, metrics: Option<PrometheusHandle>) -> Self {
        Self { engine, metrics }
    }
}

/// Build the application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(routes::results::routes())
        .merge(routes::changes::routes())
        .merge(routes::reports::routes())
        .merge(routes::timeline::routes())
        .merge(routes::comparison::routes())
        .merge(routes::logs::routes())
        .merge(routes::health::routes())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
