// The production `GraphStore`: Apache AGE over a `sqlx::PgPool`, chosen
// since Concept/Proposition/EXPRESSES maps directly onto AGE's native
// property-graph model. A single shared `PgPool` wrapped in `Arc` so
// every `Session` borrows the same connection pool.

use super::{GraphStore, Row, Session, Transaction};
use crate::ast::AggregateArg;
use crate::lexer::{AggregateFn, Operator};
use crate::plan::{AggregationMode, Plan, ProjectionSpec};
use crate::types::LiteralValue;
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row as SqlxRow};

/// The AGE graph this gateway reads and writes. Created out-of-band by a
/// migration; this module assumes it already exists.
const GRAPH_NAME: &str = "knowledge_graph";

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(uri: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(uri).await?;
        sqlx::query("LOAD 'age'").execute(&pool).await?;
        sqlx::query("SET search_path = ag_catalog, \"$user\", public").execute(&pool).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl GraphStore for PostgresStore {
    async fn session(&self) -> anyhow::Result<Box<dyn Session>> {
        Ok(Box::new(PostgresSession { pool: self.pool.clone() }))
    }

    async fn is_empty(&self) -> anyhow::Result<bool> {
        let cypher = format!(
            "SELECT * FROM cypher('{GRAPH_NAME}', $$ MATCH (c:Concept) RETURN count(c) $$) AS (count agtype)"
        );
        let row = sqlx::query(&cypher).fetch_one(&self.pool).await?;
        let count: String = row.try_get(0)?;
        Ok(count.trim() == "0")
    }
}

struct PostgresSession {
    pool: PgPool,
}

fn operator_to_cypher(op: Operator) -> &'static str {
    match op {
        Operator::Eq => "=",
        Operator::Ne => "<>",
        Operator::Lt => "<",
        Operator::Le => "<=",
        Operator::Gt => ">",
        Operator::Ge => ">=",
        Operator::Contains => "CONTAINS",
        Operator::Matches => "=~",
        Operator::In => "IN",
        Operator::NotIn => "NOT IN",
    }
}

fn literal_to_cypher(value: &LiteralValue) -> String {
    match value {
        LiteralValue::String(s) => format!("'{}'", s.replace('\'', "\\'")),
        LiteralValue::Integer(i) => i.to_string(),
        LiteralValue::Float(f) => f.to_string(),
        LiteralValue::Boolean(b) => b.to_string(),
        LiteralValue::Uuid(u) => format!("'{u}'"),
    }
}

fn aggregate_to_cypher(func: AggregateFn, arg: &AggregateArg) -> String {
    let arg_expr = match arg {
        AggregateArg::All => "c".to_string(),
        AggregateArg::Field(f) if f.is_dotted() => format!("p_{}.value", f.as_alias()),
        AggregateArg::Field(f) => format!("c.{}", f.head()),
    };
    match func {
        AggregateFn::Count => format!("count({arg_expr})"),
        AggregateFn::Sum => format!("sum({arg_expr})"),
        AggregateFn::Avg => format!("avg({arg_expr})"),
        AggregateFn::Min => format!("min({arg_expr})"),
        AggregateFn::Max => format!("max({arg_expr})"),
        AggregateFn::Distinct => format!("count(DISTINCT {arg_expr})"),
    }
}

/// Translate a `Plan` into a parameterless Cypher query body. AGE's
/// `cypher()` pseudo-function accepts only a literal string, not bind
/// parameters, so every value is inlined as an escaped Cypher literal —
/// the validator has already confirmed every literal's kind, and this
/// function is the sole place literals are rendered into query text.
fn render_cypher(plan: &Plan) -> String {
    let mut clauses = Vec::new();
    let label_filter = plan.type_name.as_deref().map(|t| format!(":{t}")).unwrap_or_default();
    clauses.push(format!("MATCH (c{label_filter})"));

    let dotted_fields: Vec<_> = plan
        .where_predicates
        .iter()
        .chain(plan.filter_predicates.iter())
        .filter(|p| p.via_proposition)
        .map(|p| p.field.as_alias())
        .collect();
    for alias in &dotted_fields {
        clauses.push(format!("MATCH (c)-[:EXPRESSES]->(p_{alias}:Proposition {{field: '{alias}'}})"));
    }

    let mut wheres = Vec::new();
    for p in plan.where_predicates.iter().chain(plan.filter_predicates.iter()) {
        let lhs = if p.via_proposition {
            format!("p_{}.value", p.field.as_alias())
        } else {
            format!("c.{}", p.field.head())
        };
        wheres.push(format!("{} {} {}", lhs, operator_to_cypher(p.op), literal_to_cypher(&p.value)));
    }
    if !wheres.is_empty() {
        clauses.push(format!("WHERE {}", wheres.join(" AND ")));
    }

    if let Some(cursor) = &plan.cursor {
        let cursor_clause = format!("id(c) > {}", cursor.last_id);
        if wheres.is_empty() {
            clauses.push(format!("WHERE {cursor_clause}"));
        } else {
            let last = clauses.len() - 1;
            clauses[last] = format!("{} AND {}", clauses[last], cursor_clause);
        }
    }

    match plan.aggregation_mode {
        AggregationMode::None => {
            let projection = match &plan.projection {
                ProjectionSpec::All => "c".to_string(),
                ProjectionSpec::Fields(fields) => fields
                    .iter()
                    .map(|f| {
                        if f.is_dotted() {
                            format!("p_{0}.value AS {0}", f.as_alias())
                        } else {
                            format!("c.{0} AS {0}", f.head())
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            clauses.push(format!("RETURN {projection}"));
            clauses.push("ORDER BY id(c)".to_string());
            clauses.push(format!("LIMIT {}", plan.fetch_limit));
        }
        AggregationMode::Global => {
            let aggs = plan
                .aggregates
                .iter()
                .map(|a| format!("{} AS {}", aggregate_to_cypher(a.func, &a.arg), a.alias))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("RETURN {aggs}"));
        }
        AggregationMode::Grouped => {
            let group_aliases: Vec<String> = plan.group_by.iter().map(|f| f.as_alias()).collect();
            let group_exprs: Vec<String> = plan
                .group_by
                .iter()
                .map(|f| {
                    if f.is_dotted() {
                        format!("p_{0}.value AS {0}", f.as_alias())
                    } else {
                        format!("c.{0} AS {0}", f.head())
                    }
                })
                .collect();
            let aggs = plan
                .aggregates
                .iter()
                .map(|a| format!("{} AS {}", aggregate_to_cypher(a.func, &a.arg), a.alias))
                .collect::<Vec<_>>()
                .join(", ");
            clauses.push(format!("RETURN {}, {}", group_exprs.join(", "), aggs));
            clauses.push(format!("ORDER BY {}", group_aliases.join(", ")));
        }
    }

    clauses.join(" ")
}

fn row_columns(plan: &Plan) -> Vec<String> {
    match plan.aggregation_mode {
        AggregationMode::None => match &plan.projection {
            ProjectionSpec::All => vec!["c".to_string()],
            ProjectionSpec::Fields(fields) => fields.iter().map(|f| f.as_alias()).collect(),
        },
        AggregationMode::Global => plan.aggregates.iter().map(|a| a.alias.clone()).collect(),
        AggregationMode::Grouped => {
            let mut cols: Vec<String> = plan.group_by.iter().map(|f| f.as_alias()).collect();
            cols.extend(plan.aggregates.iter().map(|a| a.alias.clone()));
            cols
        }
    }
}

async fn run_plan(pool: &PgPool, plan: &Plan) -> anyhow::Result<Vec<Row>> {
    let body = render_cypher(plan);
    let columns = row_columns(plan);
    let column_defs = columns.iter().map(|c| format!("{c} agtype")).collect::<Vec<_>>().join(", ");
    let sql = format!("SELECT * FROM cypher('{GRAPH_NAME}', $$ {body} $$) AS ({column_defs})");

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let mut map = Row::new();
        for (idx, col) in columns.iter().enumerate() {
            let raw: String = row.try_get(idx)?;
            let value: JsonValue = serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw));
            map.insert(col.clone(), value);
        }
        out.push(map);
    }
    Ok(out)
}

#[async_trait]
impl Session for PostgresSession {
    async fn query(&mut self, plan: &Plan) -> anyhow::Result<Vec<Row>> {
        let rows = run_plan(&self.pool, plan).await?;
        if plan.aggregation_mode == AggregationMode::Global && rows.is_empty() {
            // AGE's `cypher()` never emits a summary row over an empty match
            // set — synthesize one here rather than in the plan.
            let mut row = Row::new();
            for agg in &plan.aggregates {
                let zero = match agg.func {
                    AggregateFn::Count | AggregateFn::Distinct => JsonValue::Number(0.into()),
                    _ => JsonValue::Null,
                };
                row.insert(agg.alias.clone(), zero);
            }
            return Ok(vec![row]);
        }
        Ok(rows)
    }

    async fn begin_transaction(&mut self) -> anyhow::Result<Box<dyn Transaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx: Some(tx) }))
    }
}

struct PostgresTransaction {
    tx: Option<sqlx::Transaction<'static, sqlx::Postgres>>,
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn merge_concept(
        &mut self,
        type_name: &str,
        identity_field: &str,
        identity_value: &LiteralValue,
    ) -> anyhow::Result<i64> {
        let tx = self.tx.as_mut().ok_or_else(|| anyhow::anyhow!("transaction already finished"))?;
        let cypher = format!(
            "SELECT * FROM cypher('{GRAPH_NAME}', $$ MERGE (c:{type_name} {{{identity_field}: {}}}) RETURN id(c) $$) AS (id agtype)",
            literal_to_cypher(identity_value)
        );
        let row = sqlx::query(&cypher).fetch_one(&mut **tx).await?;
        let raw: String = row.try_get(0)?;
        raw.trim().parse::<i64>().map_err(|e| anyhow::anyhow!("unexpected concept id shape: {e}"))
    }

    async fn upsert_proposition(&mut self, concept_id: i64, field: &str, value: &LiteralValue) -> anyhow::Result<()> {
        let tx = self.tx.as_mut().ok_or_else(|| anyhow::anyhow!("transaction already finished"))?;
        let cypher = format!(
            "SELECT * FROM cypher('{GRAPH_NAME}', $$ MATCH (c) WHERE id(c) = {concept_id} MERGE (c)-[:EXPRESSES]->(p:Proposition {{field: '{field}'}}) SET p.value = {} $$) AS (result agtype)",
            literal_to_cypher(value)
        );
        sqlx::query(&cypher).execute(&mut **tx).await?;
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> anyhow::Result<()> {
        let tx = self.tx.take().ok_or_else(|| anyhow::anyhow!("transaction already finished"))?;
        tx.commit().await?;
        Ok(())
    }

    async fn rollback(mut self: Box<Self>) -> anyhow::Result<()> {
        let tx = self.tx.take().ok_or_else(|| anyhow::anyhow!("transaction already finished"))?;
        tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::FieldPath;
    use crate::lexer::Operator;
    use crate::plan::FieldPredicate;

    #[test]
    fn renders_simple_match_with_limit() {
        let plan = Plan {
            type_name: Some("Task".into()),
            where_predicates: vec![FieldPredicate {
                field: FieldPath::bare("status"),
                op: Operator::Eq,
                value: LiteralValue::String("active".into()),
                via_proposition: false,
            }],
            filter_predicates: vec![],
            group_by: vec![],
            aggregates: vec![],
            projection: ProjectionSpec::All,
            aggregation_mode: AggregationMode::None,
            fetch_limit: 6,
            cursor: None,
            query_hash: "x".into(),
        };
        let cypher = render_cypher(&plan);
        assert!(cypher.contains("MATCH (c:Task)"));
        assert!(cypher.contains("c.status = 'active'"));
        assert!(cypher.contains("LIMIT 6"));
    }

    #[test]
    fn renders_cursor_predicate() {
        let mut plan = Plan {
            type_name: Some("Task".into()),
            where_predicates: vec![],
            filter_predicates: vec![],
            group_by: vec![],
            aggregates: vec![],
            projection: ProjectionSpec::All,
            aggregation_mode: AggregationMode::None,
            fetch_limit: 6,
            cursor: None,
            query_hash: "x".into(),
        };
        plan.cursor = Some(crate::plan::CursorRef { last_id: 42, offset: 0 });
        let cypher = render_cypher(&plan);
        assert!(cypher.contains("id(c) > 42"));
    }
}
