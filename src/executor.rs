// Executor. Owns the full request lifecycle for a read query: parse,
// validate, decode cursor, build plan, acquire a session, run it, mint
// the next cursor, and assemble the response envelope. Session
// acquisition/release happens on every exit path, including error paths.

use crate::config::GatewayConfig;
use crate::cursor::{self, CursorPayload};
use crate::error::GatewayError;
use crate::legacy;
use crate::observability::OperationContext;
use crate::plan::{self, AggregationMode};
use crate::store::GraphStore;
use crate::validator;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

/// How a query's shape is reported in the response envelope's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    Standard,
    Aggregation,
    LegacyFind,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationInfo {
    #[serde(rename = "hasMore")]
    pub has_more: bool,
    pub cursor: Option<String>,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub compliance_score: f64,
    pub execution_time_ms: u64,
    pub records_returned: usize,
    pub query_type: QueryType,
    pub has_aggregation: bool,
    pub cursor_ignored: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryEnvelope {
    pub ok: bool,
    pub data: Vec<serde_json::Map<String, JsonValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    pub metadata: ResponseMetadata,
}

pub struct Executor {
    store: Arc<dyn GraphStore>,
    config: Arc<GatewayConfig>,
}

impl Executor {
    pub fn new(store: Arc<dyn GraphStore>, config: Arc<GatewayConfig>) -> Self {
        Self { store, config }
    }

    /// Execute a query arriving through the legacy-tolerant surface
    /// (`/execute_kip`): a restricted legacy form is rewritten before
    /// parsing, canonical KQL passes through unchanged.
    pub async fn execute_tolerant(&self, source: &str) -> Result<QueryEnvelope, GatewayError> {
        let (text, from_legacy) = match legacy::rewrite(source) {
            Some(rewritten) => (rewritten, true),
            None => (source.to_string(), false),
        };
        self.execute(&text, from_legacy).await
    }

    /// Execute a query arriving through the canonical-only surface (`/kql`):
    /// the legacy dialect is rejected outright.
    pub async fn execute_canonical(&self, source: &str) -> Result<QueryEnvelope, GatewayError> {
        if legacy::is_legacy_dialect(source) {
            return Err(GatewayError::Validation {
                code: crate::error::ValidationCode::IncompatibleClauses,
                message: "legacy dialect is not accepted on this endpoint".into(),
                suggestion: Some("use /execute_kip, or rewrite as canonical KQL".into()),
            });
        }
        self.execute(source, false).await
    }

    async fn execute(&self, source: &str, from_legacy: bool) -> Result<QueryEnvelope, GatewayError> {
        let ctx = OperationContext::new("execute_query");
        let result = self.execute_inner(source, from_legacy, &ctx).await;
        match &result {
            Ok(envelope) => ctx.finish_ok(envelope.data.len()),
            Err(err) => ctx.finish_err(err),
        }
        result
    }

    async fn execute_inner(
        &self,
        source: &str,
        from_legacy: bool,
        ctx: &OperationContext,
    ) -> Result<QueryEnvelope, GatewayError> {
        let mut query = crate::parser::parse(source).map_err(|e| GatewayError::Syntax {
            position: e.position,
            message: e.message,
        })?;
        query.from_legacy_rewrite = from_legacy;

        let report = validator::validate(&query);
        if let Some(err) = report.clone().into_error() {
            return Err(err);
        }

        let (decoded_cursor, cursor_ignored) = self.decode_cursor_for(&query);
        let plan = plan::build(&query, decoded_cursor);

        let store = self.store.clone();
        let mut session = acquire_session(store.as_ref()).await?;
        let outcome = tokio::time::timeout(self.config.request_timeout, session.query(&plan)).await;
        // The session is dropped here regardless of `outcome`, releasing any
        // pooled connection it holds — there is no explicit `close()` step
        // because `Session` borrows the pool rather than owning a checkout.
        drop(session);

        let mut rows = match outcome {
            Ok(Ok(rows)) => rows,
            Ok(Err(store_err)) => return Err(GatewayError::from_store_error(store_err.to_string())),
            Err(_elapsed) => return Err(GatewayError::Timeout),
        };

        crate::telemetry::record(&plan.query_hash, ctx.elapsed(), rows.len());
        if ctx.elapsed() > Duration::from_millis(self.config.slow_query_ms) {
            crate::observability::record_slow_query(&plan.query_hash, ctx.elapsed().as_millis() as u64, self.config.slow_query_ms);
        }

        let pagination = if plan.aggregation_mode == AggregationMode::None {
            let has_more = rows.len() as u32 > query.limit.get();
            if has_more {
                rows.truncate(query.limit.get() as usize);
            }
            let cursor = has_more.then(|| self.mint_next_cursor(&plan, &rows));
            Some(PaginationInfo { has_more, cursor, limit: query.limit.get() })
        } else {
            None
        };

        let query_type = if from_legacy {
            QueryType::LegacyFind
        } else if query.has_aggregation() {
            QueryType::Aggregation
        } else {
            QueryType::Standard
        };

        Ok(QueryEnvelope {
            ok: true,
            metadata: ResponseMetadata {
                compliance_score: report.compliance_score,
                execution_time_ms: ctx.elapsed().as_millis() as u64,
                records_returned: rows.len(),
                query_type,
                has_aggregation: query.has_aggregation(),
                cursor_ignored,
            },
            data: rows,
            pagination,
        })
    }

    /// Decode the request's cursor against this query's hash. Returns the
    /// decoded payload (if any) alongside whether a cursor token was
    /// supplied but dropped because it didn't decode or didn't match this
    /// query's hash — that case is reported to the caller rather than
    /// silently treated the same as "no cursor at all".
    fn decode_cursor_for(&self, query: &crate::ast::Query) -> (Option<CursorPayload>, bool) {
        let Some(token) = query.cursor.as_ref() else {
            return (None, false);
        };
        let expected_hash = plan::build(query, None).query_hash;
        match cursor::decode_for_query(token, &self.config.cursor_key, &expected_hash) {
            Some(payload) => (Some(payload), false),
            None => (None, true),
        }
    }

    fn mint_next_cursor(&self, plan: &plan::Plan, rows: &[serde_json::Map<String, JsonValue>]) -> String {
        let last_id = rows
            .last()
            .and_then(|r| r.get("id"))
            .and_then(|v| v.as_i64())
            .unwrap_or(plan.cursor.as_ref().map(|c| c.last_id).unwrap_or(0));
        let payload = CursorPayload {
            last_id,
            offset: plan.cursor.as_ref().map(|c| c.offset).unwrap_or(0) + rows.len() as i64,
            query_hash: plan.query_hash.clone(),
            issued_at: chrono::Utc::now().timestamp_millis(),
        };
        cursor::encode(&payload, &self.config.cursor_key)
    }
}

async fn acquire_session(store: &dyn GraphStore) -> Result<Box<dyn crate::store::Session>, GatewayError> {
    store.session().await.map_err(|e| GatewayError::from_store_error(e.to_string()))
}
