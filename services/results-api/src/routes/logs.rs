// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::{rejection::QueryRejection, Query, State},
    routing::get,
    Json, Router,
};
use benchwatch_core::RowId;
use benchwatch_engine::CommitLogView;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogsParams {
    pub revisionid: RowId,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/logs/", get(commit_logs))
}

/// Lookup failures of the commit log land in the view's `error` field.
async fn commit_logs(
    State(state): State<Arc<AppState>>,
    params: Result<Query<LogsParams>, QueryRejection>,
) -> ApiResult<Json<CommitLogView>> {
    let Query(params) = params?;
    Ok(Json(state.engine.commit_logs(params.revisionid).await?))
}
