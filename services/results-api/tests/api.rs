// Copyright 2025 Benchwatch Contributors
// SPDX-License-Identifier: Apache-2.0

//! Route tests against an in-memory database.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use benchwatch_adapters::NoCommitLog;
use benchwatch_core::Settings;
use benchwatch_engine::Engine;
use benchwatch_storage::dimensions::{self, NewEnvironment};
use benchwatch_storage::Database;
use results_api::{build_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn app() -> Router {
    let db = Database::in_memory().await.unwrap();
    {
        let mut conn = db.acquire().await.unwrap();
        dimensions::upsert_environment(&mut conn, &NewEnvironment::named("bench-box"))
            .await
            .unwrap();
        let (project, _) = dimensions::get_or_create_project(&mut conn, "MyProject")
            .await
            .unwrap();
        dimensions::get_or_create_executable(&mut conn, project.id, "exe")
            .await
            .unwrap();
    }
    let engine = Engine::new(db, Arc::new(NoCommitLog), Settings::default());
    build_router(AppState::new(engine, None))
}

fn result_form(commit: &str, day: u32, value: f64) -> Vec<(&'static str, String)> {
    vec![
        ("commitid", commit.to_string()),
        ("project", "MyProject".to_string()),
        ("branch", "master".to_string()),
        ("executable", "exe".to_string()),
        ("benchmark", "float".to_string()),
        ("environment", "bench-box".to_string()),
        ("result_value", value.to_string()),
        ("revision_date", format!("2024-01-{:02} 12:00:00", day)),
    ]
}

fn post_form(uri: &str, form: &[(&str, String)]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(serde_urlencoded::to_string(form).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_submit_and_read_changes() {
    let app = app().await;

    let (status, body) = send(&app, post_form("/result/add/", &result_form("c1", 1, 100.0))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "accepted");

    let (status, body) = send(&app, post_form("/result/add/", &result_form("c2", 2, 104.0))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["reports"], 1);

    let (status, body) = send(&app, get("/api/changes/table/?exe=1&env=1&rev=c2")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["colorcode"], "red");
    assert_eq!(body["groups"][0]["rows"][0]["benchmark"], "float");
    assert_eq!(body["previous"]["commitid"], "c1");

    let (status, body) = send(&app, get("/api/reports/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["significant"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_missing_field_is_rejected() {
    let app = app().await;
    let mut form = result_form("c1", 1, 1.0);
    form.retain(|(key, _)| *key != "benchmark");

    let (status, body) = send(&app, post_form("/result/add/", &form)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert!(body["meta"]["timestamp"].is_string());
}

#[tokio::test]
async fn test_batch_reports_offending_index() {
    let app = app().await;
    let item = |exe: &str, commit: &str| {
        json!({
            "commitid": commit, "project": "MyProject", "branch": "master",
            "executable": exe, "benchmark": "float", "environment": "bench-box",
            "result_value": 1.0
        })
    };
    let batch = json!([item("exe", "c1"), item("missing", "c2"), item("exe", "c3")]);

    let (status, body) = send(
        &app,
        post_form("/result/add/json/", &[("json", batch.to_string())]),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["index"], 1);
    assert_eq!(body["error"]["code"], "REFERENCE_ERROR");

    let (status, body) = send(&app, post_form("/result/add/json/", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].get("index").is_none());

    let batch = json!([item("exe", "c1"), item("exe", "c2")]);
    let (status, body) = send(
        &app,
        post_form("/result/add/json/", &[("json", batch.to_string())]),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["saved"], 2);
}

#[tokio::test]
async fn test_streamed_timeline() {
    let app = app().await;
    send(&app, post_form("/result/add/", &result_form("c1", 1, 1.0))).await;
    send(&app, post_form("/result/add/", &result_form("c2", 2, 2.0))).await;

    let (status, body) = send(&app, get("/api/timeline/?exe=1&env=1&ben=grid")).await;
    assert_eq!(status, StatusCode::OK);
    let timelines = body["timelines"].as_array().unwrap();
    assert_eq!(timelines.len(), 1);
    assert_eq!(timelines[0]["benchmark"], "float");
    assert_eq!(body["first"], true);
    assert!(body["nextBenchmarks"].is_null());
    assert!(body["error"].is_null());

    let (status, body) = send(&app, get("/api/timeline/?exe=1&env=1&ben=grid&revs=0")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_empty_timeline_reports_no_data() {
    let app = app().await;
    let (status, body) = send(&app, get("/api/timeline/?exe=1&env=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["timelines"], json!([]));
    assert_eq!(body["error"], "No data found for the selected options");
}

#[tokio::test]
async fn test_lookups_and_health() {
    let app = app().await;

    let (status, body) = send(&app, get("/api/logs/?revisionid=999")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (status, _) = send(&app, get("/api/changes/table/?exe=1")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/api/comparison/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["executables"], json!([]));

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, _) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_refresh_requires_target() {
    let app = app().await;
    let (status, _) = send(&app, post_form("/api/reports/refresh/", &[])).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        post_form("/api/reports/refresh/", &[("all", "true".to_string())]),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["refreshed"], 0);
}
