//! Local HTTP surface tests

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use openapi_client::models::ResourceId;
use satellite_agent::models::deployment::LocalDeployment;
use satellite_agent::server::serve::router;
use satellite_agent::server::state::ServerState;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceExt;

use crate::common::Harness;

const KEY: &str = "sk-live";

fn app(h: &Harness) -> Router {
    h.control_plane
        .with(|s| s.authorized_keys.insert(KEY.to_string()));
    let state = ServerState::new(
        h.control_plane.clone(),
        h.store.clone(),
        Duration::from_secs(5),
    )
    .unwrap();
    router(Arc::new(state))
}

fn get_request(uri: &str, key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::empty()).unwrap()
}

fn post_request(uri: &str, key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", key));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

/// Model server on a loopback port echoing what it received
async fn spawn_model_server() -> String {
    async fn compute(headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        let auth = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        Json(json!({"received": body, "authorization": auth}))
    }

    let app = Router::new()
        .route("/compute", post(compute))
        .route("/manifest", get(|| async { Json(json!({"name": "tiny-model"})) }))
        .route(
            "/broken/compute",
            post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "model loading") }),
        );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn record(h: &Harness, id: &str, url: &str) {
    h.store
        .add(LocalDeployment::new(ResourceId::from(id), None, url))
        .await
        .unwrap();
}

#[tokio::test]
async fn healthz_is_open() {
    let h = Harness::new();
    let (status, body) = send(app(&h), get_request("/healthz", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn version_reports_crate_version() {
    let h = Harness::new();
    let (status, body) = send(app(&h), get_request("/version", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["git_hash"].is_string());
}

#[tokio::test]
async fn gate_rejects_missing_and_unknown_keys() {
    let h = Harness::new();

    let (status, body) = send(app(&h), get_request("/deployments", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({"detail": "Missing API key"}));

    let (status, body) = send(app(&h), get_request("/deployments", Some("sk-other"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"detail": "Invalid API key"}));
}

#[tokio::test]
async fn gate_fails_closed_when_control_plane_is_down() {
    let h = Harness::new();
    let app = app(&h);
    h.control_plane.with(|s| s.fail_authorize = true);

    let (status, body) = send(app, get_request("/deployments", Some(KEY))).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body, json!({"detail": "Authorization check failed"}));
}

#[tokio::test]
async fn inference_access_endpoint_reports_decision() {
    let h = Harness::new();

    let (status, body) = send(
        app(&h),
        post_request(
            "/satellites/deployments/inference-access",
            None,
            json!({"api_key": KEY}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"authorized": true}));

    let (_, body) = send(
        app(&h),
        post_request(
            "/satellites/deployments/inference-access",
            None,
            json!({"api_key": "nope"}),
        ),
    )
    .await;
    assert_eq!(body, json!({"authorized": false}));

    h.control_plane.with(|s| s.fail_authorize = true);
    let (status, _) = send(
        app(&h),
        post_request(
            "/satellites/deployments/inference-access",
            None,
            json!({"api_key": KEY}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn lists_recorded_deployments() {
    let h = Harness::new();
    record(&h, "3", "http://h:3").await;
    record(&h, "1", "http://h:1").await;

    let (status, body) = send(app(&h), get_request("/deployments", Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!([{"deployment_id": "1"}, {"deployment_id": "3"}])
    );
}

#[tokio::test]
async fn compute_is_forwarded_with_the_callers_key() {
    let h = Harness::new();
    let model = spawn_model_server().await;
    record(&h, "7", &format!("{}/", model)).await;

    let (status, body) = send(
        app(&h),
        post_request(
            "/deployments/7/compute",
            Some(KEY),
            json!({"inputs": [1, 2, 3]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "received": {"inputs": [1, 2, 3]},
            "authorization": format!("Bearer {}", KEY),
        })
    );
}

#[tokio::test]
async fn manifest_is_forwarded() {
    let h = Harness::new();
    let model = spawn_model_server().await;
    record(&h, "7", &model).await;

    let (status, body) = send(app(&h), get_request("/deployments/7/manifest", Some(KEY))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"name": "tiny-model"}));
}

#[tokio::test]
async fn unknown_deployment_is_not_found() {
    let h = Harness::new();

    let (status, body) = send(
        app(&h),
        post_request("/deployments/42/compute", Some(KEY), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"detail": "Deployment 42 not found"}));
}

#[tokio::test]
async fn unknown_deployment_still_requires_a_key() {
    let h = Harness::new();

    let (status, _) = send(
        app(&h),
        post_request("/deployments/42/compute", None, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn upstream_errors_surface_as_500() {
    let h = Harness::new();
    let model = spawn_model_server().await;
    record(&h, "7", &format!("{}/broken", model)).await;

    let (status, body) = send(
        app(&h),
        post_request("/deployments/7/compute", Some(KEY), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        body,
        json!({"detail": "Model server error: 503 - model loading"})
    );
}

#[tokio::test]
async fn unreachable_model_server_is_a_connection_error() {
    let h = Harness::new();
    // Bind then drop to get a port with nothing listening.
    let addr = TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap()
        .local_addr()
        .unwrap();
    record(&h, "7", &format!("http://{}", addr)).await;

    let (status, body) = send(
        app(&h),
        post_request("/deployments/7/compute", Some(KEY), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(
        detail.starts_with("Connection error to model server: "),
        "{}",
        detail
    );
}
