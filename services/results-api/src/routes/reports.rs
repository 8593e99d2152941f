// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report listings and explicit refreshes.

use axum::{
    extract::{rejection::FormRejection, State},
    routing::{get, post},
    Form, Json, Router,
};
use benchwatch_core::RowId;
use benchwatch_engine::ReportListings;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Either one report by executable, environment and commit, or all of them.
#[derive(Debug, Deserialize)]
pub struct RefreshForm {
    pub exe: Option<RowId>,
    pub env: Option<RowId>,
    pub rev: Option<String>,
    #[serde(default)]
    pub all: bool,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub refreshed: usize,
    pub colorcode: Option<&'static str>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/reports/", get(list_reports))
        .route("/api/reports/refresh/", post(refresh_reports))
}

async fn list_reports(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReportListings>> {
    Ok(Json(state.engine.report_listings().await?))
}

async fn refresh_reports(
    State(state): State<Arc<AppState>>,
    form: Result<Form<RefreshForm>, FormRejection>,
) -> ApiResult<Json<RefreshResponse>> {
    let Form(form) = form?;
    if form.all {
        let refreshed = state.engine.refresh_all_reports().await?;
        return Ok(Json(RefreshResponse {
            refreshed,
            colorcode: None,
        }));
    }

    let (Some(exe), Some(env), Some(rev)) = (form.exe, form.env, form.rev) else {
        return Err(ApiError::bad_request(
            "Keys 'exe', 'env' and 'rev' are required unless 'all' is set",
        ));
    };
    let report = state.engine.refresh_report_for_commit(exe, env, &rev).await?;
    Ok(Json(RefreshResponse {
        refreshed: 1,
        colorcode: Some(report.colorcode.as_str()),
    }))
}
