// HTTP integration tests for the legacy-tolerant `/execute_kip` endpoint:
// a real server bound to a random port, real HTTP calls via reqwest, an
// in-memory graph store standing in for Apache AGE.

use kip_gateway::config::GatewayConfig;
use kip_gateway::executor::Executor;
use kip_gateway::http_server::{build_router, AppState};
use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::GraphStore;
use reqwest::{Client, StatusCode};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

async fn start_test_server(token: Option<&str>) -> (u16, Arc<MemoryStore>, tokio::task::JoinHandle<()>) {
    let store = Arc::new(MemoryStore::new());
    let config = Arc::new(GatewayConfig {
        port: 0,
        bearer_token: token.map(String::from),
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
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.expect("server crashed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (port, store, handle)
}

#[tokio::test]
async fn executes_canonical_query_end_to_end() {
    let (port, store, _handle) = start_test_server(None).await;
    let mut attrs = Map::new();
    attrs.insert("name".into(), Value::String("write report".into()));
    attrs.insert("status".into(), Value::String("active".into()));
    store.seed_concept("Task", attrs).await;

    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/execute_kip"))
        .json(&json!({ "query": "FIND Task WHERE status = 'active'" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn rewrites_and_executes_legacy_dialect() {
    let (port, store, _handle) = start_test_server(None).await;
    let mut attrs = Map::new();
    attrs.insert("type".into(), Value::String("Task".into()));
    let concept_id = store.seed_concept("Concept", attrs).await;
    store.seed_proposition(concept_id, "status", Value::String("active".into())).await;

    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/execute_kip"))
        .json(&json!({ "query": "FIND Task WHERE status = 'active'" }))
        .send()
        .await
        .unwrap();

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["metadata"]["query_type"], "legacy_find");
}

#[tokio::test]
async fn rejects_missing_bearer_token_when_configured() {
    let (port, _store, _handle) = start_test_server(Some("secret-token")).await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/execute_kip"))
        .json(&json!({ "query": "FIND Task" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn accepts_valid_bearer_token() {
    let (port, _store, _handle) = start_test_server(Some("secret-token")).await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/execute_kip"))
        .bearer_auth("secret-token")
        .json(&json!({ "query": "FIND Task" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn syntax_error_returns_kip001_with_position() {
    let (port, _store, _handle) = start_test_server(None).await;
    let client = Client::new();
    let response = client
        .post(format!("http://127.0.0.1:{port}/execute_kip"))
        .json(&json!({ "query": "FIND Task WHERE status ~ 'x'" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], "KIP001");
    assert!(body["error"]["position"].is_u64());
}

#[tokio::test]
async fn discovery_document_is_unauthenticated() {
    let (port, _store, _handle) = start_test_server(Some("secret-token")).await;
    let client = Client::new();
    let response = client
        .get(format!("http://127.0.0.1:{port}/.well-known/ai-plugin.json"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
