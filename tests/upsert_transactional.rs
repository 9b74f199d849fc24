// UPSERT transactionality: a Concept merge plus its Proposition writes
// commit together, and a missing identity field fails before anything is
// written.

use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::GraphStore;
use kip_gateway::types::LiteralValue;
use kip_gateway::upsert::{self, UpsertStatement};
use std::sync::Arc;

#[tokio::test]
async fn commits_concept_and_all_propositions_together() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let statement = UpsertStatement {
        type_name: "Task".into(),
        fields: vec![
            ("name".into(), LiteralValue::String("ship release".into())),
            ("priority".into(), LiteralValue::Integer(2)),
            ("status".into(), LiteralValue::String("pending".into())),
        ],
    };

    let result = upsert::apply(&store, &statement).await.unwrap();
    assert_eq!(result.propositions_written, 2);

    let query = kip_gateway::parser::parse("FIND Task WHERE name = 'ship release'").unwrap();
    let plan = kip_gateway::plan::build(&query, None);
    let mut session = store.session().await.unwrap();
    let rows = kip_gateway::store::Session::query(&mut *session, &plan).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn rejects_statement_without_name_field_before_writing_anything() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let statement = UpsertStatement { type_name: "Task".into(), fields: vec![("priority".into(), LiteralValue::Integer(1))] };

    let err = upsert::apply(&store, &statement).await.unwrap_err();
    assert!(matches!(err, kip_gateway::error::GatewayError::Validation { .. }));
    assert!(store.is_empty().await.unwrap());
}

#[tokio::test]
async fn repeated_upsert_merges_rather_than_duplicates() {
    let store: Arc<dyn GraphStore> = Arc::new(MemoryStore::new());
    let statement = UpsertStatement {
        type_name: "Task".into(),
        fields: vec![
            ("name".into(), LiteralValue::String("ship release".into())),
            ("priority".into(), LiteralValue::Integer(1)),
        ],
    };
    let first = upsert::apply(&store, &statement).await.unwrap();

    let statement2 = UpsertStatement {
        type_name: "Task".into(),
        fields: vec![
            ("name".into(), LiteralValue::String("ship release".into())),
            ("priority".into(), LiteralValue::Integer(5)),
        ],
    };
    let second = upsert::apply(&store, &statement2).await.unwrap();

    assert_eq!(first.concept_id, second.concept_id);
}

#[tokio::test]
async fn parses_upsert_statement_from_raw_text() {
    let statement = upsert::parse_upsert("UPSERT Task { name: 'ship release', priority: 1 }").unwrap();
    assert_eq!(statement.type_name, "Task");
    assert_eq!(statement.fields.len(), 2);
}
