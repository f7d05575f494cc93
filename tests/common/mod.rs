#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::SqlitePool;
use tower::ServiceExt;
use tracing_subscriber::EnvFilter;

use vpn_account_api::ip_pool::AddressPool;
use vpn_account_api::sqlite_repo::SqliteRepository;
use vpn_account_api::{build_app, db, AppState};

pub const DEFAULT_SUBNET: &str = "10.64.0.0/10";
pub const DEFAULT_START: &str = "10.64.3.1";
pub const DEFAULT_V6_PREFIX: &str = "fc00:bbbb:bbbb:bb01::/64";

pub fn address_pool(subnet: &str, start: &str) -> AddressPool {
    AddressPool::new(
        subnet.parse().unwrap(),
        start.parse().unwrap(),
        DEFAULT_V6_PREFIX.parse().unwrap(),
    )
    .unwrap()
}

pub fn resource_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("json")
}

/// Installs an `info` subscriber once, so log field expressions run in
/// tests exactly as they do in the server.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("info"))
        .with_test_writer()
        .try_init();
}

pub async fn setup_pool() -> SqlitePool {
    init_tracing();
    db::init_pool("sqlite::memory:").await.unwrap()
}

pub async fn setup_repo() -> Arc<SqliteRepository> {
    Arc::new(SqliteRepository::new(setup_pool().await))
}

pub async fn setup_state(max_devices: i64, subnet: &str, start: &str) -> AppState {
    let repo = setup_repo().await;
    AppState::new(
        repo,
        address_pool(subnet, start),
        max_devices,
        resource_dir(),
        "devices",
    )
}

pub async fn setup_app() -> (axum::Router, AppState) {
    setup_app_with(5, DEFAULT_SUBNET, DEFAULT_START).await
}

pub async fn setup_app_with(
    max_devices: i64,
    subnet: &str,
    start: &str,
) -> (axum::Router, AppState) {
    let state = setup_state(max_devices, subnet, start).await;
    (build_app(state.clone()), state)
}

pub async fn json_request(
    app: &axum::Router,
    method: &str,
    uri: &str,
    access_token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let has_body = body.is_some();
    let body_str = body.map(|b| b.to_string()).unwrap_or_default();
    let mut builder = Request::builder().method(method).uri(uri);

    if let Some(token) = access_token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    if has_body {
        builder = builder.header("content-type", "application/json");
    }

    let req = builder.body(Body::from(body_str)).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}
