// Plan generator. Lowers a validated AST (plus an optionally decoded
// cursor) into a backend-neutral `Plan`: the Concept type to select, its
// attribute/Proposition predicates, and the aggregation shape. Each store
// backend (store::postgres, store::memory) is responsible for turning a
// `Plan` into its own native query — this module never emits backend text.

use crate::ast::{AggregateArg, FieldPath, Pattern, Projection, Query};
use crate::cursor::CursorPayload;
use crate::lexer::{AggregateFn, Operator};
use crate::types::LiteralValue;

/// A single predicate against either a Concept's own attribute (bare field)
/// or a Proposition value (dotted field).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldPredicate {
    pub field: FieldPath,
    pub op: Operator,
    pub value: LiteralValue,
    /// True when this predicate must be satisfied via a Proposition-edge
    /// traversal rather than a direct attribute comparison.
    pub via_proposition: bool,
}

impl From<&Pattern> for FieldPredicate {
    fn from(p: &Pattern) -> Self {
        FieldPredicate {
            field: p.field.clone(),
            op: p.op,
            value: p.value.clone(),
            via_proposition: p.field.is_dotted(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub func: AggregateFn,
    pub arg: AggregateArg,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionSpec {
    /// Every attribute of the matched Concept.
    All,
    /// A named set of (possibly dotted) fields, each reported under its alias.
    Fields(Vec<FieldPath>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    None,
    /// AGGREGATE with no GROUP BY: a single summary row over all matches.
    Global,
    /// AGGREGATE with GROUP BY: one row per distinct group key.
    Grouped,
}

/// A cursor that was successfully decoded and bound to this exact query —
/// the plan generator never sees a cursor that failed the hash check; by
/// the time it gets here, the executor has already fallen back to `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct CursorRef {
    pub last_id: i64,
    pub offset: i64,
}

impl From<CursorPayload> for CursorRef {
    fn from(p: CursorPayload) -> Self {
        CursorRef { last_id: p.last_id, offset: p.offset }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    /// Concept type name this query selects, e.g. `Task`. `None` only when
    /// the projection was `FIND *` with no further type constraint.
    pub type_name: Option<String>,
    pub where_predicates: Vec<FieldPredicate>,
    pub filter_predicates: Vec<FieldPredicate>,
    pub group_by: Vec<FieldPath>,
    pub aggregates: Vec<AggregateSpec>,
    pub projection: ProjectionSpec,
    pub aggregation_mode: AggregationMode,
    /// `requested limit + 1`: the executor reads one extra row as the
    /// has-next-page sentinel. Aggregation queries never apply this.
    pub fetch_limit: u32,
    pub cursor: Option<CursorRef>,
    pub query_hash: String,
}

/// Build a `Plan` from a validated query. `decoded_cursor` is `Some` only
/// when the executor already confirmed the cursor's query hash matches.
pub fn build(query: &Query, decoded_cursor: Option<CursorPayload>) -> Plan {
    let type_name = match &query.find {
        Some(Projection::Single(f)) if f.looks_like_type_name() => Some(f.as_dotted_string()),
        _ => None,
    };

    let projection = match &query.find {
        Some(Projection::All) | Some(Projection::Single(_)) => ProjectionSpec::All,
        Some(Projection::Fields(fields)) => ProjectionSpec::Fields(fields.clone()),
        None => ProjectionSpec::All,
    };

    let aggregation_mode = if !query.aggregates.is_empty() {
        if query.group_by.is_empty() {
            AggregationMode::Global
        } else {
            AggregationMode::Grouped
        }
    } else {
        AggregationMode::None
    };

    let aggregates = query
        .aggregates
        .iter()
        .map(|call| AggregateSpec { func: call.func, arg: call.arg.clone(), alias: call.alias() })
        .collect();

    let where_predicates = query.where_clauses.iter().map(FieldPredicate::from).collect();
    let filter_predicates = query.filter_clauses.iter().map(FieldPredicate::from).collect();

    let find_text = type_name.clone().unwrap_or_default();
    let where_text = render_patterns(&query.where_clauses);
    let filter_text = render_patterns(&query.filter_clauses);
    let query_hash = crate::cursor::query_hash(&find_text, &where_text, &filter_text);

    // Aggregation queries read every matching row exactly once; pagination
    // only applies to row-level reads.
    let fetch_limit = if aggregation_mode == AggregationMode::None {
        query.limit.get() + 1
    } else {
        query.limit.get()
    };

    Plan {
        type_name,
        where_predicates,
        filter_predicates,
        group_by: query.group_by.clone(),
        aggregates,
        projection,
        aggregation_mode,
        fetch_limit,
        cursor: decoded_cursor.map(CursorRef::from),
        query_hash,
    }
}

fn render_patterns(patterns: &[Pattern]) -> String {
    patterns
        .iter()
        .map(|p| format!("{} {:?} {}", p.field.as_dotted_string(), p.op, p.value.stringify()))
        .collect::<Vec<_>>()
        .join(" AND ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn builds_plan_with_type_name_and_fetch_limit_sentinel() {
        let q = parse("FIND Task WHERE status = 'active' LIMIT 5").unwrap();
        let plan = build(&q, None);
        assert_eq!(plan.type_name.as_deref(), Some("Task"));
        assert_eq!(plan.fetch_limit, 6);
        assert_eq!(plan.aggregation_mode, AggregationMode::None);
    }

    #[test]
    fn builds_dotted_predicate_as_via_proposition() {
        let q = parse("FIND Task WHERE metadata.priority = 1").unwrap();
        let plan = build(&q, None);
        assert!(plan.where_predicates[0].via_proposition);
    }

    #[test]
    fn global_aggregation_has_no_pagination_sentinel() {
        let q = parse("FIND Task AGGREGATE COUNT(*)").unwrap();
        let plan = build(&q, None);
        assert_eq!(plan.aggregation_mode, AggregationMode::Global);
        assert_eq!(plan.fetch_limit, crate::types::ValidatedLimit::default_limit().get());
    }

    #[test]
    fn grouped_aggregation_mode_detected() {
        let q = parse("FIND Task GROUP BY status AGGREGATE COUNT(*)").unwrap();
        let plan = build(&q, None);
        assert_eq!(plan.aggregation_mode, AggregationMode::Grouped);
    }

    #[test]
    fn query_hash_is_stable_for_equivalent_queries() {
        let a = parse("FIND Task WHERE status = 'active'").unwrap();
        let b = parse("FIND Task WHERE status = 'active' LIMIT 50").unwrap();
        assert_eq!(build(&a, None).query_hash, build(&b, None).query_hash);
    }
}
