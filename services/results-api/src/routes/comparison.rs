// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, routing::get, Json, Router};
use benchwatch_engine::ComparisonData;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/comparison/", get(comparison))
}

async fn comparison(State(state): State<Arc<AppState>>) -> ApiResult<Json<ComparisonData>> {
    Ok(Json(state.engine.comparison().await?))
}
