//! Bearer-token authentication middleware: a literal, constant-time
//! token compare against the gateway's single configured `KIP_TOKEN`.
//! This gateway has one caller identity, not a multi-tenant key
//! registry, so there is no rate limiting or per-key quota tracking
//! here — just presence and equality.

use crate::config::GatewayConfig;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use std::sync::Arc;

const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

#[derive(Debug, Serialize)]
pub struct AuthErrorBody {
    pub ok: bool,
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for AuthErrorBody {
    fn into_response(self) -> Response {
        (StatusCode::UNAUTHORIZED, Json(self)).into_response()
    }
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION_HEADER)?.to_str().ok()?;
    value.strip_prefix(BEARER_PREFIX).map(|s| s.to_string())
}

/// Reject any request whose `Authorization: Bearer <token>` header does not
/// exactly match `GatewayConfig.bearer_token`. When no token is configured,
/// auth is disabled entirely — used for local development only, logged once
/// at startup in `config.rs`.
pub async fn require_bearer_token(
    State(config): State<Arc<GatewayConfig>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = &config.bearer_token else {
        return next.run(request).await;
    };

    match extract_bearer_token(&headers) {
        Some(token) if constant_time_eq(token.as_bytes(), expected.as_bytes()) => next.run(request).await,
        _ => {
            tracing::warn!("rejected request with missing or invalid bearer token");
            AuthErrorBody { ok: false, error: "missing or invalid bearer token".into(), code: "KIP002" }
                .into_response()
        }
    }
}

/// Constant-time comparison so token matching never leaks timing
/// information about how many leading bytes matched.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
