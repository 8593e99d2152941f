// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use benchwatch_core::RowId;
use benchwatch_engine::ChangesTable;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChangesParams {
    pub exe: RowId,
    pub env: RowId,
    pub rev: String,
    /// Trend window; the configured default when absent.
    pub tre: Option<usize>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/changes/table/", get(changes_table))
}

async fn changes_table(
    State(state): State<Arc<AppState>>,
    params: Result<Query<ChangesParams>, QueryRejection>,
) -> ApiResult<Json<ChangesTable>> {
    let Query(params) = params?;
    let table = state
        .engine
        .changes_table(params.exe, params.env, &params.rev, params.tre)
        .await?;
    Ok(Json(table))
}
