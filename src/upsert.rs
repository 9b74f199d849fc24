// Upsert writer. `UPSERT <Type> { field: literal, ... }` merges a
// Concept by its `name` field and writes one Proposition per remaining
// property, all inside a single transaction: any failure rolls back the
// whole statement, and `_legacy` is never written by this path.

use crate::error::GatewayError;
use crate::lexer::{lex, TokenKind};
use crate::store::GraphStore;
use crate::types::LiteralValue;
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertStatement {
    pub type_name: String,
    pub fields: Vec<(String, LiteralValue)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

/// `UPSERT` is dispatched before the canonical parser ever sees the query —
/// it has its own grammar (`UPSERT Type { a: 1, b: 'x' }`) distinct from
/// `FIND`-rooted queries, so it gets its own small hand-rolled parser over
/// the same token stream the lexer already produces.
pub fn parse_upsert(source: &str) -> Result<UpsertStatement, ParseError> {
    let tokens = lex(source).map_err(|e| ParseError { position: e.position, message: e.message })?;
    let mut pos = 0;

    expect_word(&tokens, &mut pos, "UPSERT")?;

    let type_name = match tokens.get(pos) {
        Some(tok) => match &tok.kind {
            TokenKind::Identifier(s) => s.clone(),
            TokenKind::Keyword(_) => tok.text.clone(),
            _ => return Err(ParseError { position: tok.position, message: format!("expected type name, found '{}'", tok.text) }),
        },
        None => return Err(ParseError { position: end_position(&tokens), message: "expected type name after UPSERT".into() }),
    };
    pos += 1;

    expect_brace(&tokens, &mut pos, TokenKind::LBrace)?;

    let mut fields = Vec::new();
    loop {
        if matches!(tokens.get(pos).map(|t| &t.kind), Some(TokenKind::RBrace)) {
            pos += 1;
            break;
        }
        let field_name = match tokens.get(pos) {
            Some(tok) => match &tok.kind {
                TokenKind::Identifier(s) => s.clone(),
                _ => return Err(ParseError { position: tok.position, message: format!("expected field name, found '{}'", tok.text) }),
            },
            None => return Err(ParseError { position: end_position(&tokens), message: "unexpected end of upsert body".into() }),
        };
        pos += 1;

        match tokens.get(pos).map(|t| &t.kind) {
            Some(TokenKind::Colon) => pos += 1,
            Some(other) => {
                return Err(ParseError {
                    position: tokens[pos].position,
                    message: format!("expected ':', found {other:?}"),
                })
            }
            None => return Err(ParseError { position: end_position(&tokens), message: "expected ':' after field name".into() }),
        }

        let value = match tokens.get(pos) {
            Some(tok) => match &tok.kind {
                TokenKind::Literal(v) => v.clone(),
                _ => return Err(ParseError { position: tok.position, message: format!("expected literal value, found '{}'", tok.text) }),
            },
            None => return Err(ParseError { position: end_position(&tokens), message: "expected field value".into() }),
        };
        pos += 1;
        fields.push((field_name, value));

        match tokens.get(pos).map(|t| &t.kind) {
            Some(TokenKind::Comma) => {
                pos += 1;
            }
            Some(TokenKind::RBrace) => {
                pos += 1;
                break;
            }
            Some(other) => {
                return Err(ParseError {
                    position: tokens[pos].position,
                    message: format!("expected ',' or '}}', found {other:?}"),
                })
            }
            None => return Err(ParseError { position: end_position(&tokens), message: "unterminated upsert body".into() }),
        }
    }

    if pos != tokens.len() {
        return Err(ParseError { position: tokens[pos].position, message: format!("unexpected trailing token '{}'", tokens[pos].text) });
    }

    Ok(UpsertStatement { type_name, fields })
}

fn expect_word<'a>(tokens: &'a [crate::lexer::Token], pos: &mut usize, word: &str) -> Result<&'a str, ParseError> {
    match tokens.get(*pos) {
        Some(tok) if tok.text.eq_ignore_ascii_case(word) => {
            *pos += 1;
            Ok(&tok.text)
        }
        Some(tok) => Err(ParseError { position: tok.position, message: format!("expected '{word}', found '{}'", tok.text) }),
        None => Err(ParseError { position: end_position(tokens), message: format!("expected '{word}'") }),
    }
}

fn expect_brace(tokens: &[crate::lexer::Token], pos: &mut usize, expected: TokenKind) -> Result<(), ParseError> {
    match tokens.get(*pos) {
        Some(tok) if tok.kind == expected => {
            *pos += 1;
            Ok(())
        }
        Some(tok) => Err(ParseError { position: tok.position, message: format!("expected '{{', found '{}'", tok.text) }),
        None => Err(ParseError { position: end_position(tokens), message: "expected '{'".into() }),
    }
}

fn end_position(tokens: &[crate::lexer::Token]) -> usize {
    tokens.last().map(|t| t.position + t.text.len()).unwrap_or(0)
}

/// True when `source` is an `UPSERT` statement — used by the HTTP surface
/// to dispatch before the canonical/legacy query parser ever runs.
pub fn is_upsert(source: &str) -> bool {
    source.trim_start().get(..6).is_some_and(|w| w.eq_ignore_ascii_case("UPSERT"))
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertResult {
    #[serde(rename = "conceptId")]
    pub concept_id: i64,
    #[serde(rename = "propositionsWritten")]
    pub propositions_written: usize,
}

/// Apply a parsed `UpsertStatement` against the store. The `name` field is
/// mandatory and serves as the merge identity; every other field becomes
/// one Proposition write. Rolls back on any failure.
pub async fn apply(store: &Arc<dyn GraphStore>, statement: &UpsertStatement) -> Result<UpsertResult, GatewayError> {
    let (identity_field, identity_value) = statement
        .fields
        .iter()
        .find(|(name, _)| name == "name")
        .ok_or_else(|| GatewayError::Validation {
            code: crate::error::ValidationCode::InvalidUpsert,
            message: "UPSERT requires a 'name' field to serve as the Concept identity".into(),
            suggestion: Some("add a name: '<value>' field".into()),
        })?;

    let mut session = store.session().await.map_err(|e| GatewayError::from_store_error(e.to_string()))?;
    let mut tx = session.begin_transaction().await.map_err(|e| GatewayError::from_store_error(e.to_string()))?;

    let concept_id = match tx.merge_concept(&statement.type_name, identity_field, identity_value).await {
        Ok(id) => id,
        Err(e) => {
            let _ = tx.rollback().await;
            return Err(GatewayError::from_store_error(e.to_string()));
        }
    };

    let mut written = 0usize;
    for (field, value) in &statement.fields {
        if field == "name" {
            continue;
        }
        if let Err(e) = tx.upsert_proposition(concept_id, field, value).await {
            let _ = tx.rollback().await;
            return Err(GatewayError::from_store_error(e.to_string()));
        }
        written += 1;
    }

    tx.commit().await.map_err(|e| GatewayError::from_store_error(e.to_string()))?;
    Ok(UpsertResult { concept_id, propositions_written: written })
}
