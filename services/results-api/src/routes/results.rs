// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Result submission.

use axum::{
    extract::{rejection::FormRejection, State},
    http::StatusCode,
    routing::post,
    Form, Json, Router,
};
use benchwatch_core::ResultPayload;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct BatchForm {
    pub json: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmissionResponse {
    pub status: &'static str,
    pub saved: usize,
    pub reports: usize,
    pub warnings: Vec<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/result/add/", post(add_result))
        .route("/result/add/json/", post(add_results))
}

async fn add_result(
    State(state): State<Arc<AppState>>,
    form: Result<Form<ResultPayload>, FormRejection>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    let Form(payload) = form?;
    let outcome = state.engine.save_result(&payload, true).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionResponse {
            status: "accepted",
            saved: 1,
            reports: usize::from(outcome.report.is_some()),
            warnings: outcome.warnings,
        }),
    ))
}

async fn add_results(
    State(state): State<Arc<AppState>>,
    form: Result<Form<BatchForm>, FormRejection>,
) -> ApiResult<(StatusCode, Json<SubmissionResponse>)> {
    let Form(form) = form?;
    let json = form
        .json
        .ok_or_else(|| ApiError::bad_request("No key 'json' in request"))?;
    let payloads: Vec<ResultPayload> = serde_json::from_str(&json)
        .map_err(|e| ApiError::bad_request(format!("Invalid JSON: {}", e)))?;

    let outcome = state.engine.ingest_batch(&payloads).await?;
    info!(saved = outcome.saved, reports = outcome.reports.len(), "Batch accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmissionResponse {
            status: "accepted",
            saved: outcome.saved,
            reports: outcome.reports.len(),
            warnings: outcome.warnings,
        }),
    ))
}
