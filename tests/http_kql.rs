// HTTP integration tests for the canonical-only `/kql` endpoint.

use kip_gateway::config::GatewayConfig;
use kip_gateway::executor::Executor;
use kip_gateway::http_server::{build_router, AppState};
use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::GraphStore;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

async fn start_test_server() -> (u16, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(GatewayConfig {
        port: 0,
        bearer_token: None,
        store_uri: None,
        store_user: None,
        store_password: None,
        cursor_key: *kip_gateway::config::DEFAULT_CURSOR_KEY,
        cursor_key_is_default: true,
        slow_query_ms: 1000,
        request_timeout: Duration::from_secs(5),
    });

    let graph_store: Arc<dyn GraphStore> = store.clone();
    let executor = Arc::new(Executor::new(graph_store.clone(), config.clone()));
    let app = build_router(AppState { executor, store: graph_store, config });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server crashed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, store)
}

#[tokio::test]
async fn executes_canonical_query() {
    let (port, store) = start_test_server().await;
    let mut attrs = Map::new();
    attrs.insert("status".into(), Value::String("active".into()));
    store.seed_concept("Task", attrs).await;

    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/kql"))
        .json(&json!({ "query": "FIND Task WHERE status = 'active' LIMIT 10" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rejects_legacy_dialect_shape() {
    let (port, _store) = start_test_server().await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/kql"))
        .json(&json!({ "query": "FIND Task WHERE status = 'active'" }))
        .send()
        .await
        .unwrap();

    // A single WHERE clause with no other clauses is indistinguishable from
    // the legacy shape, so /kql rejects it even though the query is valid
    // canonical KQL too — clients using /kql must add at least one more
    // canonical-only clause to disambiguate.
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "KIP004");
}

#[tokio::test]
async fn rejects_unsupported_optional_clause() {
    let (port, _store) = start_test_server().await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/kql"))
        .json(&json!({ "query": "FIND Task OPTIONAL MATCH foo WHERE bar = 1 LIMIT 10" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn rejects_upsert_on_canonical_endpoint() {
    let (port, _store) = start_test_server().await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/kql"))
        .json(&json!({ "query": "UPSERT Task { name: 'write report' }" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
