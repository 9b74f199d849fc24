// Structured logging and lightweight tracing infrastructure: a layered
// tracing subscriber plus an OperationContext used to thread a
// trace/span id through the query pipeline for log correlation.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNTER: AtomicU64 = AtomicU64::new(0);
static SLOW_QUERY_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Initialize the logging/tracing infrastructure. Safe to call more than
/// once (e.g. from multiple test binaries) — a second call is a no-op.
pub fn init_logging() -> anyhow::Result<()> {
    init_logging_with_level(false, false)
}

pub fn init_logging_with_level(verbose: bool, quiet: bool) -> anyhow::Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("kip_gateway=debug,info")
    } else {
        EnvFilter::new("kip_gateway=info,warn")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => Ok(()),
        // Already initialized — fine in tests that share a process.
        Err(_) => Ok(()),
    }
}

/// Correlates log lines for a single request across the pipeline stages.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub trace_id: Uuid,
    pub operation: String,
    start: Instant,
    attributes: Vec<(String, String)>,
}

impl OperationContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            operation: operation.into(),
            start: Instant::now(),
            attributes: Vec::new(),
        }
    }

    pub fn add_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.push((key.into(), value.into()));
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn finish_ok(&self, records_returned: usize) {
        REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        info!(
            trace_id = %self.trace_id,
            operation = %self.operation,
            elapsed_ms = self.elapsed().as_millis(),
            records_returned,
            "request completed"
        );
    }

    pub fn finish_err(&self, err: &dyn std::fmt::Display) {
        REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
        ERROR_COUNTER.fetch_add(1, Ordering::Relaxed);
        error!(
            trace_id = %self.trace_id,
            operation = %self.operation,
            elapsed_ms = self.elapsed().as_millis(),
            error = %err,
            "request failed"
        );
    }
}

pub fn record_slow_query(query_hash: &str, elapsed_ms: u64, threshold_ms: u64) {
    SLOW_QUERY_COUNTER.fetch_add(1, Ordering::Relaxed);
    debug!(
        query_hash,
        elapsed_ms, threshold_ms, "slow query threshold exceeded"
    );
}

pub fn counters_snapshot() -> serde_json::Value {
    serde_json::json!({
        "requests_total": REQUEST_COUNTER.load(Ordering::Relaxed),
        "errors_total": ERROR_COUNTER.load(Ordering::Relaxed),
        "slow_queries_total": SLOW_QUERY_COUNTER.load(Ordering::Relaxed),
    })
}
