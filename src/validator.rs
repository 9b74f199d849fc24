// Validator. Infers a kind for every field/literal pair, checks operator
// compatibility, enforces the aggregate/projection composition rule, and
// computes an advisory compliance score. Diagnostics are collected
// rather than returned on the first failure; the first collected
// diagnostic is what's ultimately surfaced as the `GatewayError`.

use crate::ast::{AggregateArg, FieldPath, Pattern, Projection, Query};
use crate::error::{GatewayError, ValidationCode};
use crate::lexer::{AggregateFn, Operator};
use crate::types::{FieldKind, LiteralKind};

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationDiagnostic {
    pub code: ValidationCode,
    pub message: String,
    pub suggestion: Option<String>,
}

impl ValidationDiagnostic {
    fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), suggestion: None }
    }

    fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// The outcome of validating a query: either it's rejected outright (first
/// diagnostic becomes the `GatewayError`), or it's accepted along with an
/// advisory compliance score that never gates execution.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationReport {
    pub diagnostics: Vec<ValidationDiagnostic>,
    pub compliance_score: f64,
}

impl ValidationReport {
    pub fn is_accepted(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn into_error(self) -> Option<GatewayError> {
        self.diagnostics.into_iter().next().map(|d| GatewayError::Validation {
            code: d.code,
            message: d.message,
            suggestion: d.suggestion,
        })
    }
}

/// Validate a parsed query. Never panics, never early-returns on the first
/// problem found — every clause is checked so the first-reported diagnostic
/// is the most structurally fundamental one (missing FIND before anything
/// clause-level).
pub fn validate(query: &Query) -> ValidationReport {
    let mut diagnostics = Vec::new();

    if query.find.is_none() {
        diagnostics.push(ValidationDiagnostic::new(
            ValidationCode::MissingFindClause,
            "query must begin with a FIND clause",
        ));
    }

    if !query.unsupported.is_empty() {
        let names: Vec<&str> = query
            .unsupported
            .iter()
            .map(|u| match u {
                crate::ast::UnsupportedClause::Optional => "OPTIONAL",
                crate::ast::UnsupportedClause::Union => "UNION",
                crate::ast::UnsupportedClause::Not => "NOT",
            })
            .collect();
        diagnostics.push(
            ValidationDiagnostic::new(
                ValidationCode::IncompatibleClauses,
                format!("unsupported clause(s) present: {}", names.join(", ")),
            )
            .with_suggestion("remove OPTIONAL/UNION/NOT clauses; they are not yet translated to a query plan"),
        );
    }

    for pattern in query.where_clauses.iter().chain(query.filter_clauses.iter()) {
        if let Some(diag) = check_pattern_compatibility(pattern) {
            diagnostics.push(diag);
        }
    }

    for call in &query.aggregates {
        if let Some(diag) = check_aggregate_compatibility(call) {
            diagnostics.push(diag);
        }
    }

    // A query cannot combine a non-trivial field projection with
    // AGGREGATE/GROUP BY — aggregation always determines the shape of
    // the returned rows.
    if query.has_aggregation() && query.has_nontrivial_projection() {
        diagnostics.push(
            ValidationDiagnostic::new(
                ValidationCode::IncompatibleClauses,
                "FIND field projection cannot be combined with GROUP BY/AGGREGATE",
            )
            .with_suggestion("use FIND * or a bare Concept type name alongside AGGREGATE"),
        );
    }

    if query.aggregates.is_empty() && !query.group_by.is_empty() {
        diagnostics.push(ValidationDiagnostic::new(
            ValidationCode::IncompatibleClauses,
            "GROUP BY requires at least one AGGREGATE function",
        ));
    }

    if let Some(Projection::Fields(fields)) = &query.find {
        if fields.is_empty() {
            diagnostics.push(ValidationDiagnostic::new(
                ValidationCode::TypeMismatch,
                "FIND field projection must name at least one field",
            ));
        }
    }

    let compliance_score = compute_compliance_score(query, &diagnostics);

    ValidationReport { diagnostics, compliance_score }
}

/// Infer the kind of a field path: `name`/`type` are string, `id` is uuid,
/// `created`/`updated` are integer, any dotted path is a proposition value
/// (always stringified in storage). Any other bare attribute defaults to
/// string, since nothing short of a store schema lookup could say otherwise.
fn infer_field_kind(field: &FieldPath) -> FieldKind {
    if field.is_dotted() {
        return FieldKind::PropositionValue;
    }
    match field.head() {
        "id" => FieldKind::Uuid,
        "created" | "updated" => FieldKind::Integer,
        _ => FieldKind::String,
    }
}

/// Operator/field-kind/literal-kind compatibility table:
///
/// | field kind         | `=`,`!=`           | ordering | CONTAINS | MATCHES |
/// |---------------------|--------------------|----------|----------|---------|
/// | string               | string             | —        | string   | string  |
/// | integer              | number or string   | number   | —        | —       |
/// | boolean              | boolean or string  | —        | —        | —       |
/// | uuid                  | uuid or string     | —        | —        | —       |
/// | proposition_value    | string             | —        | string   | —       |
///
/// `IN`/`NOT_IN` aren't part of the table; only a boolean literal is
/// rejected outright, the rest is checked downstream against the decoded
/// list at the store boundary.
fn check_pattern_compatibility(pattern: &Pattern) -> Option<ValidationDiagnostic> {
    let kind = pattern.value.kind();
    let field_kind = infer_field_kind(&pattern.field);
    let field = pattern.field.as_dotted_string();

    let ok = match pattern.op {
        Operator::Eq | Operator::Ne => match field_kind {
            FieldKind::String => kind == LiteralKind::String,
            FieldKind::Integer => kind.is_numeric() || kind == LiteralKind::String,
            FieldKind::Boolean => kind == LiteralKind::Boolean || kind == LiteralKind::String,
            FieldKind::Uuid => kind == LiteralKind::Uuid || kind == LiteralKind::String,
            FieldKind::PropositionValue => kind == LiteralKind::String,
        },
        Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
            field_kind == FieldKind::Integer && kind.is_numeric()
        }
        Operator::Contains => {
            matches!(field_kind, FieldKind::String | FieldKind::PropositionValue) && kind == LiteralKind::String
        }
        Operator::Matches => field_kind == FieldKind::String && kind == LiteralKind::String,
        Operator::In | Operator::NotIn => kind != LiteralKind::Boolean,
    };

    if ok {
        return None;
    }

    Some(
        ValidationDiagnostic::new(
            ValidationCode::TypeMismatch,
            format!(
                "operator {:?} is not compatible with a {:?} literal on {:?} field '{}'",
                pattern.op, kind, field_kind, field
            ),
        )
        .with_suggestion(match pattern.op {
            Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge => {
                "ordering operators only apply to integer fields with a numeric literal".to_string()
            }
            Operator::Contains => "CONTAINS requires a string literal on a string or proposition field".to_string(),
            Operator::Matches => "MATCHES requires a string literal on a string field".to_string(),
            Operator::Eq | Operator::Ne => {
                "this field kind does not accept a literal of this kind for equality".to_string()
            }
            _ => "boolean literals cannot be used with IN/NOT_IN".to_string(),
        }),
    )
}

/// Aggregate/argument compatibility: `COUNT` accepts `*` or any field;
/// `SUM`/`AVG`/`MIN`/`MAX` require a field (never `*`); `DISTINCT`
/// requires a field.
fn check_aggregate_compatibility(call: &crate::ast::AggregateCall) -> Option<ValidationDiagnostic> {
    match (call.func, &call.arg) {
        (AggregateFn::Count, _) => None,
        (_, AggregateArg::All) => Some(
            ValidationDiagnostic::new(
                ValidationCode::InvalidAggregate,
                format!("{}(*) is only valid for COUNT", call.func.as_lower_str().to_uppercase()),
            )
            .with_suggestion("name a field, e.g. SUM(metadata.amount)"),
        ),
        (_, AggregateArg::Field(_)) => None,
    }
}

/// Advisory score in `[0.0, 1.0]` reflecting how well-formed the query is,
/// independent of whether it's ultimately rejected. Never gates execution.
fn compute_compliance_score(query: &Query, diagnostics: &[ValidationDiagnostic]) -> f64 {
    let mut score: f64 = 1.0;
    score -= 0.25 * diagnostics.len() as f64;
    if query.from_legacy_rewrite {
        score -= 0.1;
    }
    if query.raw_limit.is_some_and(|l| l < 1 || l > 1000) {
        score -= 0.05;
    }
    score.clamp(0.0, 1.0)
}
