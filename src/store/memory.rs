// An in-memory `GraphStore` used by the integration test suite and the
// Criterion benchmark — no network, no real AGE cluster required. Wraps
// a plain in-process map behind the same trait the production store uses.

use super::{GraphStore, Row, Session, Transaction};
use crate::ast::{AggregateArg, FieldPath};
use crate::lexer::{AggregateFn, Operator};
use crate::plan::{AggregationMode, Plan, ProjectionSpec};
use crate::types::LiteralValue;
use async_trait::async_trait;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct StoredConcept {
    id: i64,
    type_name: String,
    attributes: Map<String, JsonValue>,
    propositions: BTreeMap<String, JsonValue>,
}

#[derive(Default)]
struct MemoryState {
    concepts: BTreeMap<i64, StoredConcept>,
}

pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self { state: Arc::new(RwLock::new(MemoryState::default())), next_id: Arc::new(AtomicI64::new(1)) }
    }

    /// Test/bench convenience seeding, bypassing the upsert writer.
    pub async fn seed_concept(&self, type_name: &str, attributes: Map<String, JsonValue>) -> i64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.concepts.insert(
            id,
            StoredConcept { id, type_name: type_name.to_string(), attributes, propositions: BTreeMap::new() },
        );
        id
    }

    pub async fn seed_proposition(&self, concept_id: i64, field: &str, value: JsonValue) {
        let mut state = self.state.write().await;
        if let Some(c) = state.concepts.get_mut(&concept_id) {
            c.propositions.insert(field.to_string(), value);
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphStore for MemoryStore {
    async fn session(&self) -> anyhow::Result<Box<dyn Session>> {
        Ok(Box::new(MemorySession { state: self.state.clone(), next_id: self.next_id.clone() }))
    }

    async fn is_empty(&self) -> anyhow::Result<bool> {
        Ok(self.state.read().await.concepts.is_empty())
    }
}

struct MemorySession {
    state: Arc<RwLock<MemoryState>>,
    next_id: Arc<AtomicI64>,
}

fn lookup_value<'a>(concept: &'a StoredConcept, field: &FieldPath) -> Option<&'a JsonValue> {
    if field.is_dotted() {
        concept.propositions.get(&field.as_dotted_string())
    } else {
        concept.attributes.get(field.head())
    }
}

fn literal_as_json(value: &LiteralValue) -> JsonValue {
    match value {
        LiteralValue::String(s) => JsonValue::String(s.clone()),
        LiteralValue::Integer(i) => JsonValue::Number((*i).into()),
        LiteralValue::Float(f) => serde_json::Number::from_f64(*f).map(JsonValue::Number).unwrap_or(JsonValue::Null),
        LiteralValue::Boolean(b) => JsonValue::Bool(*b),
        LiteralValue::Uuid(u) => JsonValue::String(u.clone()),
    }
}

fn compare(actual: &JsonValue, op: Operator, expected: &LiteralValue) -> bool {
    let expected_json = literal_as_json(expected);
    match op {
        Operator::Eq => actual == &expected_json,
        Operator::Ne => actual != &expected_json,
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => compare_ordered(actual, op, expected),
        Operator::Contains => actual
            .as_str()
            .zip(expected_json.as_str())
            .is_some_and(|(a, e)| a.contains(e)),
        Operator::Matches => actual
            .as_str()
            .zip(expected_json.as_str())
            .is_some_and(|(a, e)| regex::Regex::new(e).is_ok_and(|re| re.is_match(a))),
        Operator::In | Operator::NotIn => {
            let contains = actual == &expected_json;
            if op == Operator::In {
                contains
            } else {
                !contains
            }
        }
    }
}

fn compare_ordered(actual: &JsonValue, op: Operator, expected: &LiteralValue) -> bool {
    let ordering = match (actual, expected) {
        (JsonValue::Number(a), LiteralValue::Integer(b)) => a.as_f64().map(|a| a.partial_cmp(&(*b as f64))),
        (JsonValue::Number(a), LiteralValue::Float(b)) => a.as_f64().map(|a| a.partial_cmp(b)),
        (JsonValue::String(a), LiteralValue::String(b)) => Some(a.as_str().partial_cmp(b.as_str())),
        _ => None,
    };
    match ordering.flatten() {
        Some(std::cmp::Ordering::Less) => matches!(op, Operator::Lt | Operator::Le),
        Some(std::cmp::Ordering::Equal) => matches!(op, Operator::Le | Operator::Ge),
        Some(std::cmp::Ordering::Greater) => matches!(op, Operator::Gt | Operator::Ge),
        None => false,
    }
}

fn matches_predicates(concept: &StoredConcept, plan: &Plan) -> bool {
    if let Some(type_name) = &plan.type_name {
        if &concept.type_name != type_name {
            return false;
        }
    }
    plan.where_predicates
        .iter()
        .chain(plan.filter_predicates.iter())
        .all(|p| lookup_value(concept, &p.field).is_some_and(|v| compare(v, p.op, &p.value)))
}

fn project_row(concept: &StoredConcept, projection: &ProjectionSpec) -> Row {
    match projection {
        ProjectionSpec::All => {
            let mut row = concept.attributes.clone();
            row.insert("id".to_string(), JsonValue::Number(concept.id.into()));
            row.insert("type".to_string(), JsonValue::String(concept.type_name.clone()));
            row
        }
        ProjectionSpec::Fields(fields) => {
            let mut row = Map::new();
            for field in fields {
                let value = lookup_value(concept, field).cloned().unwrap_or(JsonValue::Null);
                row.insert(field.as_alias(), value);
            }
            row
        }
    }
}

fn aggregate_value(func: AggregateFn, arg: &AggregateArg, rows: &[&StoredConcept]) -> JsonValue {
    match func {
        AggregateFn::Count => match arg {
            AggregateArg::All => JsonValue::Number((rows.len() as i64).into()),
            AggregateArg::Field(f) => {
                JsonValue::Number((rows.iter().filter(|c| lookup_value(c, f).is_some()).count() as i64).into())
            }
        },
        AggregateFn::Distinct => {
            let AggregateArg::Field(f) = arg else { return JsonValue::Number(0.into()) };
            let mut seen = std::collections::HashSet::new();
            for c in rows {
                if let Some(v) = lookup_value(c, f) {
                    seen.insert(v.to_string());
                }
            }
            JsonValue::Number((seen.len() as i64).into())
        }
        AggregateFn::Sum | AggregateFn::Avg | AggregateFn::Min | AggregateFn::Max => {
            let AggregateArg::Field(f) = arg else { return JsonValue::Null };
            let values: Vec<f64> = rows
                .iter()
                .filter_map(|c| lookup_value(c, f))
                .filter_map(|v| v.as_f64())
                .collect();
            if values.is_empty() {
                return JsonValue::Null;
            }
            let result = match func {
                AggregateFn::Sum => values.iter().sum(),
                AggregateFn::Avg => values.iter().sum::<f64>() / values.len() as f64,
                AggregateFn::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
                AggregateFn::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                _ => unreachable!(),
            };
            serde_json::Number::from_f64(result).map(JsonValue::Number).unwrap_or(JsonValue::Null)
        }
    }
}

#[async_trait]
impl Session for MemorySession {
    async fn query(&mut self, plan: &Plan) -> anyhow::Result<Vec<Row>> {
        let state = self.state.read().await;
        let mut matched: Vec<&StoredConcept> = state.concepts.values().filter(|c| matches_predicates(c, plan)).collect();
        matched.sort_by_key(|c| c.id);

        if let Some(cursor) = &plan.cursor {
            matched.retain(|c| c.id > cursor.last_id);
        }

        match plan.aggregation_mode {
            AggregationMode::None => {
                let rows = matched
                    .into_iter()
                    .take(plan.fetch_limit as usize)
                    .map(|c| project_row(c, &plan.projection))
                    .collect();
                Ok(rows)
            }
            AggregationMode::Global => {
                // An empty match set still returns a single summary row
                // rather than an empty array.
                let mut row = Row::new();
                for agg in &plan.aggregates {
                    row.insert(agg.alias.clone(), aggregate_value(agg.func, &agg.arg, &matched));
                }
                Ok(vec![row])
            }
            AggregationMode::Grouped => {
                let mut groups: BTreeMap<Vec<String>, Vec<&StoredConcept>> = BTreeMap::new();
                for c in &matched {
                    let key: Vec<String> = plan
                        .group_by
                        .iter()
                        .map(|f| lookup_value(c, f).map(|v| v.to_string()).unwrap_or_default())
                        .collect();
                    groups.entry(key).or_default().push(c);
                }
                let mut rows = Vec::new();
                for (key, members) in groups {
                    let mut row = Row::new();
                    for (field, value) in plan.group_by.iter().zip(key.iter()) {
                        row.insert(field.as_alias(), JsonValue::String(value.trim_matches('"').to_string()));
                    }
                    for agg in &plan.aggregates {
                        row.insert(agg.alias.clone(), aggregate_value(agg.func, &agg.arg, &members));
                    }
                    rows.push(row);
                }
                Ok(rows)
            }
        }
    }

    async fn begin_transaction(&mut self) -> anyhow::Result<Box<dyn Transaction>> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            next_id: self.next_id.clone(),
            staged: Vec::new(),
        }))
    }
}

enum StagedWrite {
    MergeConcept { type_name: String, identity_field: String, identity_value: JsonValue, result_id: Arc<AtomicI64> },
    UpsertProposition { concept_id: i64, field: String, value: JsonValue },
}

struct MemoryTransaction {
    state: Arc<RwLock<MemoryState>>,
    next_id: Arc<AtomicI64>,
    staged: Vec<StagedWrite>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn merge_concept(
        &mut self,
        type_name: &str,
        identity_field: &str,
        identity_value: &LiteralValue,
    ) -> anyhow::Result<i64> {
        let state = self.state.read().await;
        let identity_json = literal_as_json(identity_value);
        let existing = state
            .concepts
            .values()
            .find(|c| c.type_name == type_name && c.attributes.get(identity_field) == Some(&identity_json))
            .map(|c| c.id);
        drop(state);

        let id = existing.unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst));
        let result_id = Arc::new(AtomicI64::new(id));
        self.staged.push(StagedWrite::MergeConcept {
            type_name: type_name.to_string(),
            identity_field: identity_field.to_string(),
            identity_value: identity_json,
            result_id: result_id.clone(),
        });
        Ok(result_id.load(Ordering::SeqCst))
    }

    async fn upsert_proposition(&mut self, concept_id: i64, field: &str, value: &LiteralValue) -> anyhow::Result<()> {
        self.staged.push(StagedWrite::UpsertProposition {
            concept_id,
            field: field.to_string(),
            value: literal_as_json(value),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> anyhow::Result<()> {
        let mut state = self.state.write().await;
        for write in self.staged {
            match write {
                StagedWrite::MergeConcept { type_name, identity_field, identity_value, result_id } => {
                    let id = result_id.load(Ordering::SeqCst);
                    let entry = state.concepts.entry(id).or_insert_with(|| StoredConcept {
                        id,
                        type_name: type_name.clone(),
                        attributes: Map::new(),
                        propositions: BTreeMap::new(),
                    });
                    entry.attributes.insert(identity_field, identity_value);
                }
                StagedWrite::UpsertProposition { concept_id, field, value } => {
                    if let Some(c) = state.concepts.get_mut(&concept_id) {
                        c.propositions.insert(field, value);
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[tokio::test]
    async fn queries_seeded_concept_by_attribute() {
        let store = MemoryStore::new();
        let mut attrs = Map::new();
        attrs.insert("name".into(), JsonValue::String("write report".into()));
        attrs.insert("status".into(), JsonValue::String("active".into()));
        store.seed_concept("Task", attrs).await;

        let query = parse("FIND Task WHERE status = 'active'").unwrap();
        let plan = crate::plan::build(&query, None);
        let mut session = store.session().await.unwrap();
        let rows = session.query(&plan).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn global_aggregate_over_empty_store_returns_single_zero_row() {
        let store = MemoryStore::new();
        let query = parse("FIND Task AGGREGATE COUNT(*)").unwrap();
        let plan = crate::plan::build(&query, None);
        let mut session = store.session().await.unwrap();
        let rows = session.query(&plan).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("count_all"), Some(&JsonValue::Number(0.into())));
    }

    #[tokio::test]
    async fn upsert_via_transaction_merges_by_identity() {
        let store = MemoryStore::new();
        let mut session = store.session().await.unwrap();
        let mut tx = session.begin_transaction().await.unwrap();
        let id = tx.merge_concept("Task", "name", &LiteralValue::String("write report".into())).await.unwrap();
        tx.upsert_proposition(id, "priority", &LiteralValue::Integer(1)).await.unwrap();
        tx.commit().await.unwrap();

        let query = parse("FIND Task WHERE name = 'write report'").unwrap();
        let plan = crate::plan::build(&query, None);
        let rows = store.session().await.unwrap().query(&plan).await.unwrap();
        assert_eq!(rows.len(), 1);
    }
}
