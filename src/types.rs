// Validated value types shared across the pipeline: a private inner
// value plus a constructor that enforces the invariant, so a
// constructed value can be trusted by every downstream stage.

use serde::{Deserialize, Serialize};

/// A LIMIT value, always in `[1, 1000]` — out-of-range inputs are
/// clamped here rather than rejected, never constructed invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedLimit(u32);

impl ValidatedLimit {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 1000;
    pub const DEFAULT: u32 = 100;

    /// Clamp an arbitrary integer into the valid LIMIT range.
    pub fn clamp(raw: i64) -> Self {
        let clamped = raw.clamp(Self::MIN as i64, Self::MAX as i64) as u32;
        Self(clamped)
    }

    pub fn default_limit() -> Self {
        Self(Self::DEFAULT)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl Default for ValidatedLimit {
    fn default() -> Self {
        Self::default_limit()
    }
}

/// The kind inferred for a field path by the validator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldKind {
    String,
    Integer,
    Boolean,
    Uuid,
    /// Any dotted field path — always backed by a stringified Proposition object.
    PropositionValue,
}

/// The kind inferred for a literal token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiteralKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
}

impl LiteralKind {
    /// Whether this literal kind is accepted as "numeric" for compatibility checks.
    pub fn is_numeric(self) -> bool {
        matches!(self, LiteralKind::Integer | LiteralKind::Float)
    }

    /// Whether this literal kind participates in ordering comparisons.
    pub fn is_ordered(self) -> bool {
        matches!(self, LiteralKind::Integer | LiteralKind::Float | LiteralKind::String)
    }
}

/// A literal value carried by a token, tagged with its inferred kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum LiteralValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(String),
}

impl LiteralValue {
    pub fn kind(&self) -> LiteralKind {
        match self {
            LiteralValue::String(_) => LiteralKind::String,
            LiteralValue::Integer(_) => LiteralKind::Integer,
            LiteralValue::Float(_) => LiteralKind::Float,
            LiteralValue::Boolean(_) => LiteralKind::Boolean,
            LiteralValue::Uuid(_) => LiteralKind::Uuid,
        }
    }

    /// Render as the stringified form the store uses for Proposition objects
    /// and as an inlined Cypher literal.
    pub fn stringify(&self) -> String {
        match self {
            LiteralValue::String(s) => s.clone(),
            LiteralValue::Integer(i) => i.to_string(),
            LiteralValue::Float(f) => f.to_string(),
            LiteralValue::Boolean(b) => b.to_string(),
            LiteralValue::Uuid(u) => u.clone(),
        }
    }
}

/// A non-empty, length-bounded query source string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedQueryText(String);

impl ValidatedQueryText {
    const MAX_LENGTH: usize = 16 * 1024;

    pub fn new(text: impl Into<String>) -> Result<Self, String> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err("query text cannot be empty".to_string());
        }
        if text.len() > Self::MAX_LENGTH {
            return Err(format!(
                "query exceeds maximum length of {} bytes",
                Self::MAX_LENGTH
            ));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_clamps_out_of_range() {
        assert_eq!(ValidatedLimit::clamp(0).get(), 1);
        assert_eq!(ValidatedLimit::clamp(-1).get(), 1);
        assert_eq!(ValidatedLimit::clamp(99_999).get(), 1000);
        assert_eq!(ValidatedLimit::clamp(5).get(), 5);
    }

    #[test]
    fn query_text_rejects_empty() {
        assert!(ValidatedQueryText::new("   ").is_err());
        assert!(ValidatedQueryText::new("FIND Task").is_ok());
    }

    #[test]
    fn literal_stringify_roundtrip() {
        assert_eq!(LiteralValue::Integer(5).stringify(), "5");
        assert_eq!(LiteralValue::Boolean(true).stringify(), "true");
    }
}
