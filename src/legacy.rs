// Legacy dialect compatibility. A single regex-based rewrite pass that
// runs before parsing: no parallel execution path, no second parser.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches the restricted legacy form: `FIND <Type> WHERE <field> = '<value>'`
/// with no other clauses. The legacy dialect never supports
/// FILTER/GROUP BY/AGGREGATE/LIMIT/CURSOR — those are canonical-only additions.
static LEGACY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*FIND\s+(\w+)\s+WHERE\s+(\w+)\s*=\s*'([^']*)'\s*$")
        .expect("legacy dialect pattern is a fixed, valid regex")
});

/// Rewrites a legacy-dialect query into its canonical equivalent:
/// `FIND Concept WHERE type = '<Label>' FILTER <field> = '<value>'`.
///
/// Returns `None` when the input does not match the restricted legacy
/// shape, in which case the caller should parse it as canonical KQL.
pub fn rewrite(source: &str) -> Option<String> {
    let caps = LEGACY_PATTERN.captures(source)?;
    let type_name = &caps[1];
    let field = &caps[2];
    let value = &caps[3];
    Some(format!(
        "FIND Concept WHERE type = '{type_name}' FILTER {field} = '{value}'"
    ))
}

/// True when `source` looks like the legacy dialect — used by the HTTP
/// surface to decide whether a request arriving at `/execute_kip` should
/// go through the rewrite before parsing, versus `/kql` which rejects it
/// outright.
pub fn is_legacy_dialect(source: &str) -> bool {
    LEGACY_PATTERN.is_match(source)
}
