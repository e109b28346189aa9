//! HTTP surface tests: routes exercised in-process via `tower::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use bucketcrew::adapters::retrieval::StaticRetriever;
use bucketcrew::adapters::{InvocationMode, ModelCallResult, ModelInvoker};
use bucketcrew::config::Config;
use bucketcrew::models::RunStatus;
use bucketcrew::server;
use bucketcrew::store::{MemoryDeliverableStore, MemoryRunStore, RunStore};
use bucketcrew::templates::TemplateCatalog;

/// Returns a minimal editor-shaped document for every call.
struct CannedInvoker;

#[async_trait]
impl ModelInvoker for CannedInvoker {
    async fn invoke(
        &self,
        _mode: InvocationMode,
        _system: &str,
        _message: &str,
    ) -> Result<ModelCallResult> {
        Ok(ModelCallResult {
            content: json!({
                "title": "Canned Deliverable",
                "executive_summary": "Done.",
                "findings": [],
                "recommendations": []
            })
            .to_string(),
            input_tokens: 5,
            output_tokens: 5,
            model: "canned".to_string(),
        })
    }
}

struct TestApp {
    router: Router,
    runs: Arc<MemoryRunStore>,
}

fn app() -> TestApp {
    let mut config = Config::default();
    config.server.stream_poll_interval = Duration::from_millis(10);
    config.server.stream_max_lifetime = Duration::from_secs(5);

    let runs = MemoryRunStore::shared();
    let router = server::build(
        &config,
        Arc::new(TemplateCatalog::builtin()),
        runs.clone(),
        MemoryDeliverableStore::shared(),
        Arc::new(CannedInvoker),
        Arc::new(StaticRetriever::new()),
    );
    TestApp { router, runs }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn wait_until_terminal(runs: &MemoryRunStore, run_id: &str) -> RunStatus {
    for _ in 0..200 {
        let record = runs.get(run_id).await.unwrap().unwrap();
        if record.status.is_terminal() {
            return record.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run {run_id} never reached a terminal status");
}

#[tokio::test]
async fn health_reports_ok() {
    let response = app().router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn templates_list_and_lookup() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(get("/api/templates"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["templates"].as_array().unwrap().len(), 3);

    let response = app
        .router
        .clone()
        .oneshot(get("/api/templates/research-sprint"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["config"]["steps"].as_array().unwrap().len(), 5);

    let response = app
        .router
        .oneshot(get("/api/templates/nope"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn start_run_returns_accepted_and_completes_in_background() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/workspaces/ws-1/runs",
            json!({
                "template_id": "research-sprint",
                "input": { "business_description": "Plumbing company" }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending");
    assert_eq!(body["workspace_id"], "ws-1");
    let run_id = body["id"].as_str().unwrap().to_string();

    assert_eq!(
        wait_until_terminal(&app.runs, &run_id).await,
        RunStatus::Completed
    );

    let response = app
        .router
        .oneshot(get(&format!("/api/runs/{run_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["title"], "Canned Deliverable");
}

#[tokio::test]
async fn status_reads_are_idempotent() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/workspaces/ws-1/runs",
            json!({ "template_id": "research-sprint", "input": {} }),
        ))
        .await
        .unwrap();
    let run_id = body_json(response).await["id"].as_str().unwrap().to_string();
    wait_until_terminal(&app.runs, &run_id).await;

    let first = body_json(
        app.router
            .clone()
            .oneshot(get(&format!("/api/runs/{run_id}")))
            .await
            .unwrap(),
    )
    .await;
    let second = body_json(
        app.router
            .oneshot(get(&format!("/api/runs/{run_id}")))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(first, second);
}

#[tokio::test]
async fn start_run_with_unknown_template_is_not_found() {
    let response = app()
        .router
        .oneshot(post_json(
            "/api/workspaces/ws-1/runs",
            json!({ "template_id": "nope" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(
        body_json(response).await["error"]
            .as_str()
            .unwrap()
            .contains("nope")
    );
}

#[tokio::test]
async fn missing_run_and_deliverable_are_not_found() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(get("/api/runs/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .router
        .oneshot(get("/api/deliverables/ghost"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deliverable_is_readable_after_run_completes() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/workspaces/ws-1/runs",
            json!({ "template_id": "growth-plan", "input": {} }),
        ))
        .await
        .unwrap();
    let run_id = body_json(response).await["id"].as_str().unwrap().to_string();
    wait_until_terminal(&app.runs, &run_id).await;

    let record = app.runs.get(&run_id).await.unwrap().unwrap();
    let deliverable_id = record.result.unwrap().id;
    let response = app
        .router
        .oneshot(get(&format!("/api/deliverables/{deliverable_id}")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["title"], "Canned Deliverable");
}

#[tokio::test]
async fn stream_replays_progress_and_closes_on_terminal_status() {
    let app = app();
    let response = app
        .router
        .clone()
        .oneshot(post_json(
            "/api/workspaces/ws-1/runs",
            json!({ "template_id": "research-sprint", "input": {} }),
        ))
        .await
        .unwrap();
    let run_id = body_json(response).await["id"].as_str().unwrap().to_string();
    wait_until_terminal(&app.runs, &run_id).await;

    // The run is terminal, so the stream replays all entries, emits the
    // final status event, and ends; collecting the body terminates.
    let response = app
        .router
        .oneshot(get(&format!("/api/runs/{run_id}/stream")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();

    assert_eq!(text.matches("event: progress").count(), 10);
    assert!(text.contains("event: status"));
    assert!(text.contains("completed"));
    // The terminal event carries the deliverable so a client that only
    // watched the stream never has to re-fetch the run.
    assert!(text.contains("Canned Deliverable"));
}

#[tokio::test]
async fn stream_for_missing_run_emits_error_event() {
    let response = app()
        .router
        .oneshot(get("/api/runs/ghost/stream"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event: error"));
    assert!(text.contains("run not found"));
}
