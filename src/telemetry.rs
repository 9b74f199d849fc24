// Telemetry. A bounded in-memory ring buffer of recent query executions,
// rotated once full; never blocks the request path. A single global ring
// rather than per-operation buckets, since this gateway has one operation
// shape (query execution).

use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::RwLock;
use std::time::Duration;

const RING_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize)]
pub struct TelemetryRecord {
    #[serde(rename = "queryHash")]
    pub query_hash: String,
    #[serde(rename = "executionTimeMs")]
    pub execution_time_ms: u64,
    #[serde(rename = "recordsReturned")]
    pub records_returned: usize,
    pub timestamp: i64,
}

struct TelemetryRing {
    records: Vec<TelemetryRecord>,
    rotations: u64,
}

static RING: Lazy<RwLock<TelemetryRing>> =
    Lazy::new(|| RwLock::new(TelemetryRing { records: Vec::with_capacity(RING_CAPACITY), rotations: 0 }));

/// Record one query execution. Called from the executor's hot path — must
/// never panic and never block on anything slower than an uncontended
/// `RwLock`.
pub fn record(query_hash: &str, execution_time: Duration, records_returned: usize) {
    let record = TelemetryRecord {
        query_hash: query_hash.to_string(),
        execution_time_ms: execution_time.as_millis() as u64,
        records_returned,
        timestamp: chrono::Utc::now().timestamp_millis(),
    };

    let mut ring = match RING.write() {
        Ok(g) => g,
        Err(poisoned) => poisoned.into_inner(),
    };

    if ring.records.len() >= RING_CAPACITY {
        rotate(&mut ring);
    }
    ring.records.push(record);
}

/// Flush the buffer once it's full. A durable telemetry sink would persist
/// this batch; this gateway logs a structured summary and discards it.
fn rotate(ring: &mut TelemetryRing) {
    ring.rotations += 1;
    let batch_size = ring.records.len();
    let avg_ms: f64 = if batch_size == 0 {
        0.0
    } else {
        ring.records.iter().map(|r| r.execution_time_ms as f64).sum::<f64>() / batch_size as f64
    };
    tracing::info!(
        rotation = ring.rotations,
        batch_size,
        avg_execution_ms = avg_ms,
        "telemetry ring rotated"
    );
    ring.records.clear();
}

/// Snapshot of the current buffer, for the `/metrics` advisory surface.
pub fn snapshot() -> Vec<TelemetryRecord> {
    match RING.read() {
        Ok(g) => g.records.clone(),
        Err(poisoned) => poisoned.into_inner().records.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_and_snapshot_roundtrip() {
        record("abc123", Duration::from_millis(12), 3);
        let snapshot = snapshot();
        assert!(snapshot.iter().any(|r| r.query_hash == "abc123"));
    }

    #[test]
    fn ring_rotates_without_panicking_past_capacity() {
        for i in 0..(RING_CAPACITY + 10) {
            record(&format!("hash-{i}"), Duration::from_millis(1), 1);
        }
    }
}
