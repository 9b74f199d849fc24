// Parser. Recursive descent over the lexed token stream, building the
// `Query` AST: a cursor over a token slice, one `parse_*` method per
// grammar production, errors carrying the offending token's byte offset.

use crate::ast::{AggregateArg, AggregateCall, FieldPath, Pattern, Projection, Query, UnsupportedClause};
use crate::lexer::{lex, Keyword, Token, TokenKind};
use crate::types::{LiteralValue, ValidatedLimit};

#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub position: usize,
    pub message: String,
}

struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(tokens: &'a [Token]) -> Self {
        Self { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_keyword(&self, kw: Keyword) -> bool {
        matches!(self.peek().map(|t| &t.kind), Some(TokenKind::Keyword(k)) if *k == kw)
    }

    fn advance(&mut self) -> Option<&Token> {
        let tok = self.tokens.get(self.pos);
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map(|t| t.position + t.text.len()).unwrap_or(0)
    }

    fn expect_keyword(&mut self, kw: Keyword) -> Result<(), ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Keyword(k), .. }) if *k == kw => Ok(()),
            Some(tok) => Err(ParseError {
                position: tok.position,
                message: format!("expected keyword, found '{}'", tok.text),
            }),
            None => Err(ParseError {
                position: self.end_position(),
                message: "unexpected end of query".into(),
            }),
        }
    }

    fn expect_identifier(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Some(Token { kind: TokenKind::Identifier(s), .. }) => Ok(s.clone()),
            Some(tok) => Err(ParseError {
                position: tok.position,
                message: format!("expected identifier, found '{}'", tok.text),
            }),
            None => Err(ParseError {
                position: self.end_position(),
                message: "unexpected end of query, expected identifier".into(),
            }),
        }
    }
}

pub fn parse(source: &str) -> Result<Query, ParseError> {
    let tokens = lex(source).map_err(|e| ParseError { position: e.position, message: e.message })?;
    let mut cursor = Cursor::new(&tokens);
    parse_query(&mut cursor)
}

fn parse_query(cursor: &mut Cursor) -> Result<Query, ParseError> {
    let mut query = Query {
        find: None,
        where_clauses: Vec::new(),
        filter_clauses: Vec::new(),
        group_by: Vec::new(),
        aggregates: Vec::new(),
        limit: ValidatedLimit::default_limit(),
        raw_limit: None,
        cursor: None,
        unsupported: Vec::new(),
        from_legacy_rewrite: false,
    };

    if cursor.peek_keyword(Keyword::Find) {
        cursor.advance();
        query.find = Some(parse_projection(cursor)?);
    }

    loop {
        if cursor.peek_keyword(Keyword::Where) {
            cursor.advance();
            query.where_clauses = parse_pattern_list(cursor)?;
        } else if cursor.peek_keyword(Keyword::Filter) {
            cursor.advance();
            query.filter_clauses = parse_pattern_list(cursor)?;
        } else if cursor.peek_keyword(Keyword::Group) {
            cursor.advance();
            cursor.expect_keyword(Keyword::By)?;
            query.group_by = parse_field_path_list(cursor)?;
        } else if cursor.peek_keyword(Keyword::Aggregate) {
            cursor.advance();
            query.aggregates = parse_aggregate_list(cursor)?;
        } else if cursor.peek_keyword(Keyword::Limit) {
            cursor.advance();
            query.raw_limit = Some(parse_integer_literal(cursor)?);
            query.limit = ValidatedLimit::clamp(query.raw_limit.unwrap());
        } else if cursor.peek_keyword(Keyword::Cursor) {
            cursor.advance();
            query.cursor = Some(parse_string_literal(cursor)?);
        } else if cursor.peek_keyword(Keyword::Optional) {
            cursor.advance();
            skip_clause_body(cursor);
            query.unsupported.push(UnsupportedClause::Optional);
        } else if cursor.peek_keyword(Keyword::Union) {
            cursor.advance();
            skip_clause_body(cursor);
            query.unsupported.push(UnsupportedClause::Union);
        } else if cursor.peek_keyword(Keyword::Not) {
            cursor.advance();
            skip_clause_body(cursor);
            query.unsupported.push(UnsupportedClause::Not);
        } else {
            break;
        }
    }

    if let Some(extra) = cursor.peek() {
        return Err(ParseError {
            position: extra.position,
            message: format!("unexpected trailing token '{}'", extra.text),
        });
    }

    Ok(query)
}

/// Consume tokens belonging to an unsupported clause body until the next
/// recognized top-level clause keyword, so the overall grammar stays total.
fn skip_clause_body(cursor: &mut Cursor) {
    while let Some(tok) = cursor.peek() {
        if let TokenKind::Keyword(k) = tok.kind {
            if matches!(
                k,
                Keyword::Where
                    | Keyword::Filter
                    | Keyword::Group
                    | Keyword::Aggregate
                    | Keyword::Limit
                    | Keyword::Cursor
                    | Keyword::Optional
                    | Keyword::Union
                    | Keyword::Not
            ) {
                break;
            }
        }
        cursor.advance();
    }
}

fn parse_projection(cursor: &mut Cursor) -> Result<Projection, ParseError> {
    if matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Asterisk)) {
        cursor.advance();
        return Ok(Projection::All);
    }

    let first = parse_field_path(cursor)?;
    if matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
        let mut fields = vec![first];
        while matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
            cursor.advance();
            fields.push(parse_field_path(cursor)?);
        }
        return Ok(Projection::Fields(fields));
    }

    if first.is_dotted() {
        Ok(Projection::Fields(vec![first]))
    } else {
        Ok(Projection::Single(first))
    }
}

fn parse_field_path(cursor: &mut Cursor) -> Result<FieldPath, ParseError> {
    let mut parts = vec![cursor.expect_identifier()?];
    while matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Dot)) {
        cursor.advance();
        parts.push(cursor.expect_identifier()?);
    }
    Ok(FieldPath(parts))
}

fn parse_field_path_list(cursor: &mut Cursor) -> Result<Vec<FieldPath>, ParseError> {
    let mut fields = vec![parse_field_path(cursor)?];
    while matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
        cursor.advance();
        fields.push(parse_field_path(cursor)?);
    }
    Ok(fields)
}

fn parse_pattern_list(cursor: &mut Cursor) -> Result<Vec<Pattern>, ParseError> {
    let mut patterns = vec![parse_pattern(cursor)?];
    while cursor.peek_keyword(Keyword::And) {
        cursor.advance();
        patterns.push(parse_pattern(cursor)?);
    }
    Ok(patterns)
}

fn parse_pattern(cursor: &mut Cursor) -> Result<Pattern, ParseError> {
    let position = cursor.peek().map(|t| t.position).unwrap_or_else(|| cursor.end_position());
    let field = parse_field_path(cursor)?;
    let op = match cursor.advance() {
        Some(Token { kind: TokenKind::Operator(op), .. }) => *op,
        Some(tok) => {
            return Err(ParseError {
                position: tok.position,
                message: format!("expected comparison operator, found '{}'", tok.text),
            })
        }
        None => {
            return Err(ParseError {
                position: cursor.end_position(),
                message: "unexpected end of query, expected operator".into(),
            })
        }
    };
    let value = parse_literal(cursor)?;
    Ok(Pattern { field, op, value, position })
}

fn parse_literal(cursor: &mut Cursor) -> Result<LiteralValue, ParseError> {
    match cursor.advance() {
        Some(Token { kind: TokenKind::Literal(v), .. }) => Ok(v.clone()),
        Some(tok) => Err(ParseError {
            position: tok.position,
            message: format!("expected literal value, found '{}'", tok.text),
        }),
        None => Err(ParseError {
            position: cursor.end_position(),
            message: "unexpected end of query, expected literal".into(),
        }),
    }
}

fn parse_string_literal(cursor: &mut Cursor) -> Result<String, ParseError> {
    match parse_literal(cursor)? {
        LiteralValue::String(s) => Ok(s),
        other => Err(ParseError {
            position: cursor.pos.saturating_sub(1),
            message: format!("expected string literal, found {other:?}"),
        }),
    }
}

fn parse_integer_literal(cursor: &mut Cursor) -> Result<i64, ParseError> {
    let position = cursor.peek().map(|t| t.position).unwrap_or_else(|| cursor.end_position());
    match parse_literal(cursor)? {
        LiteralValue::Integer(i) => Ok(i),
        other => Err(ParseError {
            position,
            message: format!("expected integer literal, found {other:?}"),
        }),
    }
}

fn parse_aggregate_list(cursor: &mut Cursor) -> Result<Vec<AggregateCall>, ParseError> {
    let mut calls = vec![parse_aggregate_call(cursor)?];
    while matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Comma)) {
        cursor.advance();
        calls.push(parse_aggregate_call(cursor)?);
    }
    Ok(calls)
}

fn parse_aggregate_call(cursor: &mut Cursor) -> Result<AggregateCall, ParseError> {
    let position = cursor.peek().map(|t| t.position).unwrap_or_else(|| cursor.end_position());
    let func = match cursor.advance() {
        Some(Token { kind: TokenKind::Function(f), .. }) => *f,
        Some(tok) => {
            return Err(ParseError {
                position: tok.position,
                message: format!("expected aggregate function, found '{}'", tok.text),
            })
        }
        None => {
            return Err(ParseError {
                position: cursor.end_position(),
                message: "unexpected end of query, expected aggregate function".into(),
            })
        }
    };

    match cursor.advance() {
        Some(Token { kind: TokenKind::LParen, .. }) => {}
        Some(tok) => {
            return Err(ParseError {
                position: tok.position,
                message: format!("expected '(', found '{}'", tok.text),
            })
        }
        None => {
            return Err(ParseError {
                position: cursor.end_position(),
                message: "unexpected end of query, expected '('".into(),
            })
        }
    }

    let arg = if matches!(cursor.peek().map(|t| &t.kind), Some(TokenKind::Asterisk)) {
        cursor.advance();
        AggregateArg::All
    } else {
        AggregateArg::Field(parse_field_path(cursor)?)
    };

    match cursor.advance() {
        Some(Token { kind: TokenKind::RParen, .. }) => {}
        Some(tok) => {
            return Err(ParseError {
                position: tok.position,
                message: format!("expected ')', found '{}'", tok.text),
            })
        }
        None => {
            return Err(ParseError {
                position: cursor.end_position(),
                message: "unexpected end of query, expected ')'".into(),
            })
        }
    }

    Ok(AggregateCall { func, arg, position })
}
