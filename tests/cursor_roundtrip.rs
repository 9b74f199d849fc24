// Cursor token behavior as observed through the executor: a tampered or
// garbage token is treated as a fresh first page rather than an error, and a
// genuine cursor correctly resumes a paged query.

use kip_gateway::config::GatewayConfig;
use kip_gateway::executor::Executor;
use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::GraphStore;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

fn test_config() -> Arc<GatewayConfig> {
    Arc::new(GatewayConfig {
        port: 0,
        bearer_token: None,
        store_uri: None,
        store_user: None,
        store_password: None,
        cursor_key: *kip_gateway::config::DEFAULT_CURSOR_KEY,
        cursor_key_is_default: true,
        slow_query_ms: 1000,
        request_timeout: Duration::from_secs(5),
    })
}

async fn seeded_executor(count: usize) -> Executor {
    let store = MemoryStore::new();
    for i in 0..count {
        let mut attrs = Map::new();
        attrs.insert("status".into(), Value::String("active".into()));
        attrs.insert("name".into(), Value::String(format!("task-{i}")));
        store.seed_concept("Task", attrs).await;
    }
    let graph_store: Arc<dyn GraphStore> = Arc::new(store);
    Executor::new(graph_store, test_config())
}

#[tokio::test]
async fn genuine_cursor_resumes_at_the_correct_offset() {
    let executor = seeded_executor(6).await;
    let first = executor
        .execute_canonical("FIND Task WHERE status = 'active' LIMIT 3")
        .await
        .unwrap();
    let pagination = first.pagination.unwrap();
    assert!(pagination.has_more);
    let cursor = pagination.cursor.unwrap();

    let second = executor
        .execute_canonical(&format!("FIND Task WHERE status = 'active' LIMIT 3 CURSOR '{cursor}'"))
        .await
        .unwrap();
    assert_eq!(second.data.len(), 3);

    let first_ids: Vec<i64> = first.data.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    let second_ids: Vec<i64> = second.data.iter().map(|r| r["id"].as_i64().unwrap()).collect();
    assert!(first_ids.iter().all(|id| !second_ids.contains(id)));
}

#[tokio::test]
async fn garbage_token_is_treated_as_a_fresh_first_page() {
    let executor = seeded_executor(3).await;
    let result = executor
        .execute_canonical("FIND Task WHERE status = 'active' LIMIT 3 CURSOR 'not-a-real-cursor-token'")
        .await
        .unwrap();
    assert_eq!(result.data.len(), 3);
}

#[tokio::test]
async fn tampered_token_is_rejected_and_falls_back_to_a_fresh_page() {
    let executor = seeded_executor(3).await;
    let first = executor
        .execute_canonical("FIND Task WHERE status = 'active' LIMIT 1")
        .await
        .unwrap();
    let mut cursor = first.pagination.unwrap().cursor.unwrap();
    // Flip a character in the middle of the base64 token to corrupt the
    // ciphertext without changing its length.
    let mid = cursor.len() / 2;
    let flipped = if cursor.as_bytes()[mid] == b'A' { b'B' } else { b'A' };
    unsafe {
        cursor.as_bytes_mut()[mid] = flipped;
    }

    let result = executor
        .execute_canonical(&format!("FIND Task WHERE status = 'active' LIMIT 1 CURSOR '{cursor}'"))
        .await
        .unwrap();
    assert_eq!(result.data.len(), 1);
}

#[tokio::test]
async fn cursor_minted_under_one_key_does_not_decode_under_another() {
    let executor = seeded_executor(3).await;
    let first = executor
        .execute_canonical("FIND Task WHERE status = 'active' LIMIT 1")
        .await
        .unwrap();
    let cursor = first.pagination.unwrap().cursor.unwrap();

    let other_key = [7u8; 32];
    let other_config = Arc::new(GatewayConfig {
        port: 0,
        bearer_token: None,
        store_uri: None,
        store_user: None,
        store_password: None,
        cursor_key: other_key,
        cursor_key_is_default: false,
        slow_query_ms: 1000,
        request_timeout: Duration::from_secs(5),
    });
    let store = MemoryStore::new();
    let mut attrs = Map::new();
    attrs.insert("status".into(), Value::String("active".into()));
    store.seed_concept("Task", attrs).await;
    let other_graph_store: Arc<dyn GraphStore> = Arc::new(store);
    let other_executor = Executor::new(other_graph_store, other_config);

    // Decoded under a different key, the cursor is indistinguishable from
    // garbage, so this must still succeed as a fresh first page.
    let result = other_executor
        .execute_canonical(&format!("FIND Task WHERE status = 'active' LIMIT 1 CURSOR '{cursor}'"))
        .await
        .unwrap();
    assert_eq!(result.data.len(), 1);
}
