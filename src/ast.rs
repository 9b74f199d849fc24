// AST node types. A validated AST is enriched in place by the validator
// and then discarded once the plan generator has consumed it — each
// request gets its own Token/AST/Plan chain, none of it held past the
// response.

use crate::lexer::{AggregateFn, Operator};
use crate::types::{LiteralValue, ValidatedLimit};

/// A dotted field path, e.g. `metadata.priority` or a bare `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath(pub Vec<String>);

impl FieldPath {
    pub fn bare(name: impl Into<String>) -> Self {
        Self(vec![name.into()])
    }

    pub fn is_dotted(&self) -> bool {
        self.0.len() > 1
    }

    pub fn as_dotted_string(&self) -> String {
        self.0.join(".")
    }

    /// Deterministic alias for response columns: dots replaced with underscores.
    pub fn as_alias(&self) -> String {
        self.0.join("_")
    }

    pub fn head(&self) -> &str {
        &self.0[0]
    }

    /// True when this bare identifier looks like a Concept type name — it
    /// begins with an uppercase letter and carries no dots.
    pub fn looks_like_type_name(&self) -> bool {
        !self.is_dotted() && self.head().chars().next().is_some_and(|c| c.is_uppercase())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// `*`
    All,
    /// A single bare identifier naming a Concept type, or the degenerate
    /// one-field case — disambiguated by the validator via `looks_like_type_name`.
    Single(FieldPath),
    /// A comma-separated list of dotted field paths.
    Fields(Vec<FieldPath>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub field: FieldPath,
    pub op: Operator,
    pub value: LiteralValue,
    pub position: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AggregateArg {
    All,
    Field(FieldPath),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateCall {
    pub func: AggregateFn,
    pub arg: AggregateArg,
    pub position: usize,
}

impl AggregateCall {
    /// `<fnLower>_<argOrAll>`.
    pub fn alias(&self) -> String {
        let arg_part = match &self.arg {
            AggregateArg::All => "all".to_string(),
            AggregateArg::Field(f) => f.as_alias(),
        };
        format!("{}_{}", self.func.as_lower_str(), arg_part)
    }
}

/// `OPTIONAL`/`UNION`/`NOT` clauses parse cleanly into the AST (so the
/// grammar stays total) but are rejected by the validator — their
/// translation into a plan isn't defined yet.
#[derive(Debug, Clone, PartialEq)]
pub enum UnsupportedClause {
    Optional,
    Union,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub find: Option<Projection>,
    pub where_clauses: Vec<Pattern>,
    pub filter_clauses: Vec<Pattern>,
    pub group_by: Vec<FieldPath>,
    pub aggregates: Vec<AggregateCall>,
    pub limit: ValidatedLimit,
    pub raw_limit: Option<i64>,
    pub cursor: Option<String>,
    pub unsupported: Vec<UnsupportedClause>,
    /// Set by the legacy compatibility layer when this AST was produced
    /// by rewriting a restricted-dialect query.
    pub from_legacy_rewrite: bool,
}

impl Query {
    pub fn has_aggregation(&self) -> bool {
        !self.aggregates.is_empty() || !self.group_by.is_empty()
    }

    /// A "non-trivial" field projection: anything other than `*` or a bare
    /// Concept-type identifier.
    pub fn has_nontrivial_projection(&self) -> bool {
        match &self.find {
            Some(Projection::Fields(fields)) => !fields.is_empty(),
            Some(Projection::Single(f)) => !f.looks_like_type_name(),
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatement {
    pub type_name: String,
    pub fields: Vec<(String, LiteralValue)>,
}
