// The graph store boundary. Everything above this trait (executor, upsert
// writer) is store-agnostic; everything below it knows how to turn a
// `Plan` into whatever wire protocol actually reaches the backend.

pub mod memory;
pub mod postgres;

use crate::plan::Plan;
use crate::types::LiteralValue;
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// A single row returned by a plan execution: a JSON object whose keys are
/// either a Concept's identity fields or the caller's requested aliases.
pub type Row = serde_json::Map<String, JsonValue>;

/// One connection-scoped unit of work, used only by the upsert writer so
/// a Concept merge and its Proposition writes commit or roll back
/// together.
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Merge-insert a Concept by `(type_name, identity_field, identity_value)`
    /// and return its store-assigned id, creating it if absent.
    async fn merge_concept(
        &mut self,
        type_name: &str,
        identity_field: &str,
        identity_value: &LiteralValue,
    ) -> anyhow::Result<i64>;

    /// Upsert a single EXPRESSES edge from `concept_id` carrying `field`/`value`.
    async fn upsert_proposition(
        &mut self,
        concept_id: i64,
        field: &str,
        value: &LiteralValue,
    ) -> anyhow::Result<()>;

    async fn commit(self: Box<Self>) -> anyhow::Result<()>;
    async fn rollback(self: Box<Self>) -> anyhow::Result<()>;
}

/// A checked-out store connection. Reads run a `Plan` directly; writes go
/// through a `Transaction`.
#[async_trait]
pub trait Session: Send + Sync {
    async fn query(&mut self, plan: &Plan) -> anyhow::Result<Vec<Row>>;
    async fn begin_transaction(&mut self) -> anyhow::Result<Box<dyn Transaction>>;
}

/// The top-level store handle. One per process; sessions are acquired per
/// request and must be released on every exit path, including error paths.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn session(&self) -> anyhow::Result<Box<dyn Session>>;

    /// Whether the store currently contains zero Concepts — used to resolve
    /// the empty-store aggregation edge case.
    async fn is_empty(&self) -> anyhow::Result<bool>;
}
