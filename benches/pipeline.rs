// Stage-by-stage and end-to-end timings for the lex -> parse -> validate ->
// plan -> execute pipeline. Runs entirely against the in-memory store so no
// live Apache AGE instance is required to reproduce these numbers.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use kip_gateway::config::GatewayConfig;
use kip_gateway::executor::Executor;
use kip_gateway::store::memory::MemoryStore;
use kip_gateway::store::GraphStore;
use kip_gateway::{lexer, parser, plan, validator};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

const SIMPLE_QUERY: &str = "FIND Task WHERE status = 'active' LIMIT 20";
const AGGREGATE_QUERY: &str = "FIND Task WHERE status = 'active' GROUP BY priority AGGREGATE COUNT(*), AVG(task.effort)";

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lex simple query", |b| {
        b.iter(|| lexer::lex(black_box(SIMPLE_QUERY)).unwrap())
    });
}

fn bench_parser(c: &mut Criterion) {
    c.bench_function("parse simple query", |b| {
        b.iter(|| parser::parse(black_box(SIMPLE_QUERY)).unwrap())
    });
    c.bench_function("parse aggregate query", |b| {
        b.iter(|| parser::parse(black_box(AGGREGATE_QUERY)).unwrap())
    });
}

fn bench_validator(c: &mut Criterion) {
    let query = parser::parse(SIMPLE_QUERY).unwrap();
    c.bench_function("validate simple query", |b| {
        b.iter(|| validator::validate(black_box(&query)))
    });
}

fn bench_plan(c: &mut Criterion) {
    let query = parser::parse(AGGREGATE_QUERY).unwrap();
    c.bench_function("build plan for aggregate query", |b| {
        b.iter(|| plan::build(black_box(&query), None))
    });
}

fn bench_end_to_end(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let executor = runtime.block_on(async {
        let store = MemoryStore::new();
        for i in 0..200 {
            let mut attrs = Map::new();
            attrs.insert("status".into(), Value::String("active".into()));
            attrs.insert("name".into(), Value::String(format!("task-{i}")));
            attrs.insert("priority".into(), Value::from(i % 5));
            store.seed_concept("Task", attrs).await;
        }
        let graph_store: Arc<dyn GraphStore> = Arc::new(store);
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
        Executor::new(graph_store, config)
    });

    c.bench_function("end-to-end canonical query over 200 concepts", |b| {
        b.to_async(&runtime).iter(|| async {
            executor.execute_canonical(black_box(SIMPLE_QUERY)).await.unwrap()
        })
    });
}

criterion_group!(benches, bench_lexer, bench_parser, bench_validator, bench_plan, bench_end_to_end);
criterion_main!(benches);
