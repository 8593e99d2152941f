// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Streamed timeline pages.
//!
//! The body is `{"timelines": [...], "first", "nextBenchmarks", "error"}`,
//! written one benchmark at a time as the pager produces them. A failure
//! after the first byte went out ends the array and lands in `error`.

use axum::{
    body::Body,
    extract::{rejection::QueryRejection, Query, State},
    http::header,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use benchwatch_core::RowId;
use benchwatch_engine::{BenchmarkSelection, TimelinePager, TimelineQuery, TimelineTrailer};
use futures::stream;
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TimelineParams {
    /// Comma-separated executable ids.
    pub exe: String,
    pub env: RowId,
    #[serde(default = "default_benchmarks")]
    pub ben: String,
    pub revs: Option<usize>,
    /// `"{executable id}+{revision id}"`, or `none`.
    pub base: Option<String>,
    #[serde(rename = "nextBenchmarks")]
    pub next_benchmarks: Option<usize>,
}

fn default_benchmarks() -> String {
    "grid".to_string()
}

impl TimelineParams {
    fn into_query(self) -> ApiResult<TimelineQuery> {
        let executables = self
            .exe
            .split(',')
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(|id| {
                id.parse::<RowId>()
                    .map_err(|_| ApiError::bad_request(format!("Invalid executable id '{}'", id)))
            })
            .collect::<ApiResult<Vec<_>>>()?;

        let baseline = match self.base.as_deref().map(str::trim) {
            None | Some("") | Some("none") => None,
            Some(base) => Some(parse_baseline(base)?),
        };

        Ok(TimelineQuery {
            executables,
            environment: self.env,
            benchmarks: self.ben.parse::<BenchmarkSelection>()?,
            revisions: self.revs,
            baseline,
            next_benchmarks: self.next_benchmarks,
        })
    }
}

fn parse_baseline(base: &str) -> ApiResult<(RowId, RowId)> {
    let invalid = || ApiError::bad_request(format!("Invalid baseline '{}'", base));
    let (exe, rev) = base.split_once('+').ok_or_else(invalid)?;
    let exe = exe.parse().map_err(|_| invalid())?;
    let rev = rev.parse().map_err(|_| invalid())?;
    Ok((exe, rev))
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/timeline/", get(timeline))
}

async fn timeline(
    State(state): State<Arc<AppState>>,
    params: Result<Query<TimelineParams>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let pager = state.engine.timeline(&query).await?;

    let body = Body::from_stream(page_stream(pager));
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

struct PageState {
    pager: TimelinePager,
    sent: usize,
    done: bool,
}

fn page_stream(
    pager: TimelinePager,
) -> impl futures::Stream<Item = Result<String, serde_json::Error>> + Send {
    let state = PageState {
        pager,
        sent: 0,
        done: false,
    };
    stream::unfold(state, |mut state| async move {
        if state.done {
            return None;
        }
        let mut chunk = String::new();
        if state.sent == 0 {
            chunk.push_str("{\"timelines\":[");
        }

        let next = state.pager.next_timeline().await;
        let chunk = match next {
            Ok(Some(timeline)) => serde_json::to_string(&timeline).map(|json| {
                if state.sent > 0 {
                    chunk.push(',');
                }
                chunk.push_str(&json);
                chunk
            }),
            Ok(None) => {
                state.done = true;
                close_page(chunk, state.pager.trailer())
            }
            Err(err) => {
                error!(error = %err, "Timeline page aborted");
                state.done = true;
                let mut trailer = state.pager.trailer();
                trailer.next_benchmarks = None;
                trailer.error = Some(err.to_string());
                close_page(chunk, trailer)
            }
        };
        state.sent += 1;
        Some((chunk, state))
    })
}

fn close_page(mut chunk: String, trailer: TimelineTrailer) -> Result<String, serde_json::Error> {
    chunk.push_str("],");
    chunk.push_str("\"first\":");
    chunk.push_str(&serde_json::to_string(&trailer.first)?);
    chunk.push_str(",\"nextBenchmarks\":");
    chunk.push_str(&serde_json::to_string(&trailer.next_benchmarks)?);
    chunk.push_str(",\"error\":");
    chunk.push_str(&serde_json::to_string(&trailer.error)?);
    chunk.push('}');
    Ok(chunk)
}
