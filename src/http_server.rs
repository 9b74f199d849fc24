// HTTP surface. Routes for the discovery document, the two query
// dialects, and the Proposition CRUD/graph surface: a `Clone`-able state
// struct carrying `Arc`s, one `Router` built from `.route(...)` calls
// plus a shared `TraceLayer`/`CorsLayer`/auth stack.

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::executor::{Executor, QueryEnvelope};
use crate::store::GraphStore;
use crate::upsert::{self, UpsertResult};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

#[derive(Clone)]
pub struct AppState {
    pub executor: Arc<Executor>,
    pub store: Arc<dyn GraphStore>,
    pub config: Arc<GatewayConfig>,
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/execute_kip", post(execute_kip))
        .route("/kql", post(execute_kql))
        .route("/propositions", post(propositions))
        .route("/metrics", get(metrics))
        .route_layer(middleware::from_fn_with_state(state.config.clone(), crate::auth_middleware::require_bearer_token));

    Router::new()
        .route("/.well-known/ai-plugin.json", get(ai_plugin_manifest))
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    ok: bool,
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<String>,
}

fn error_response(err: GatewayError) -> (StatusCode, Json<ErrorEnvelope>) {
    let status = err.status();
    let body = ErrorEnvelope {
        ok: false,
        error: ErrorBody {
            code: err.kip_code().as_str(),
            message: err.to_string(),
            position: err.position(),
            suggestion: err.suggestion(),
        },
    };
    (status, Json(body))
}

#[derive(Debug, Deserialize)]
pub struct KqlRequest {
    pub query: String,
}

async fn healthz() -> impl IntoResponse {
    Json(json!({ "ok": true, "status": "serving" }))
}

/// Static discovery document for LLM-plugin-style clients. Deliberately
/// unauthenticated — it carries no data, only the API shape.
async fn ai_plugin_manifest() -> impl IntoResponse {
    Json(json!({
        "schema_version": "v1",
        "name_for_human": "Knowledge Query Gateway",
        "name_for_model": "kip_gateway",
        "description_for_human": "Query a knowledge graph using the Knowledge Query Language (KQL).",
        "description_for_model": "Execute KQL queries against a Concept/Proposition knowledge graph. Use POST /kql for canonical KQL, POST /execute_kip for legacy-dialect-tolerant execution, and POST /propositions for direct Proposition access.",
        "auth": { "type": "bearer" },
        "api": {
            "type": "openapi",
            "endpoints": ["/execute_kip", "/kql", "/propositions"]
        }
    }))
}

async fn execute_kip(State(state): State<AppState>, Json(req): Json<KqlRequest>) -> Response {
    if upsert::is_upsert(&req.query) {
        return match run_upsert(&state, &req.query).await {
            Ok(body) => body.into_response(),
            Err(err) => err.into_response(),
        };
    }
    match state.executor.execute_tolerant(&req.query).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

async fn execute_kql(State(state): State<AppState>, Json(req): Json<KqlRequest>) -> Response {
    if upsert::is_upsert(&req.query) {
        return error_response(GatewayError::Validation {
            code: crate::error::ValidationCode::InvalidUpsert,
            message: "UPSERT statements are only accepted on /execute_kip or /propositions".into(),
            suggestion: None,
        })
        .into_response();
    }
    match state.executor.execute_canonical(&req.query).await {
        Ok(envelope) => Json(envelope).into_response(),
        Err(err) => error_response(err).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct UpsertEnvelope {
    ok: bool,
    data: UpsertResult,
}

async fn run_upsert(state: &AppState, query: &str) -> Result<Json<UpsertEnvelope>, (StatusCode, Json<ErrorEnvelope>)> {
    let statement = upsert::parse_upsert(query).map_err(|e| {
        error_response(GatewayError::Syntax { position: e.position, message: e.message })
    })?;
    let result = upsert::apply(&state.store, &statement).await.map_err(error_response)?;
    Ok(Json(UpsertEnvelope { ok: true, data: result }))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum PropositionsRequest {
    Create { query: String },
    Query { query: String },
    Find { query: String },
    Graph { query: String },
}

/// `/propositions`: create/query/find/graph actions all funnel through the
/// same executor/upsert dispatch — the action tag only distinguishes the
/// request shape clients use, not a different execution path.
async fn propositions(
    State(state): State<AppState>,
    Json(req): Json<PropositionsRequest>,
) -> Result<Json<QueryEnvelope>, (StatusCode, Json<ErrorEnvelope>)> {
    let query = match &req {
        PropositionsRequest::Create { query }
        | PropositionsRequest::Query { query }
        | PropositionsRequest::Find { query }
        | PropositionsRequest::Graph { query } => query,
    };

    if upsert::is_upsert(query) {
        let statement = upsert::parse_upsert(query).map_err(|e| {
            error_response(GatewayError::Syntax { position: e.position, message: e.message })
        })?;
        let _ = upsert::apply(&state.store, &statement).await.map_err(error_response)?;
        return Ok(Json(QueryEnvelope {
            ok: true,
            data: vec![],
            pagination: None,
            metadata: crate::executor::ResponseMetadata {
                compliance_score: 1.0,
                execution_time_ms: 0,
                records_returned: 0,
                query_type: crate::executor::QueryType::Standard,
                has_aggregation: false,
                cursor_ignored: false,
            },
        }));
    }

    state.executor.execute_tolerant(query).await.map(Json).map_err(error_response)
}

async fn metrics() -> impl IntoResponse {
    let records = crate::telemetry::snapshot();
    Json(json!({
        "ok": true,
        "counters": crate::observability::counters_snapshot(),
        "recentQueries": records,
    }))
}
