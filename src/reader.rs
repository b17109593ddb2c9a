//! Token stream to expression tree.
//!
//! The reader consumes classified [`Token`]s and produces one top-level
//! [`Expression`] per call, handing back the unconsumed remainder so the caller can
//! loop over several forms in one stream. Producing tokens from characters is the
//! job of [`crate::lexer`] or any other collaborator honoring the token contract.

use crate::ast::{Atom, Expression, IntegerType};
use crate::{Error, MAX_PARSE_DEPTH, SyntaxError, SyntaxErrorKind};

/// Token kinds of the reader's input contract
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LeftParen,
    RightParen,
    Integer,
    Float,
    Boolean,
    /// String literal; the token text is the decoded contents without quotes
    Str,
    Identifier,
}

/// A classified token and its raw text
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn new(kind: TokenKind, text: impl Into<String>) -> Self {
        Token {
            kind,
            text: text.into(),
        }
    }
}

/// Read one form from `tokens`, returning it with the remaining tokens.
pub fn read(tokens: &[Token]) -> Result<(Expression, &[Token]), Error> {
    read_with_depth(tokens, 0)
}

/// Read every form in `tokens`.
pub fn read_all(tokens: &[Token]) -> Result<Vec<Expression>, Error> {
    let mut forms = Vec::new();
    let mut remaining = tokens;
    while !remaining.is_empty() {
        let (form, rest) = read(remaining)?;
        forms.push(form);
        remaining = rest;
    }
    Ok(forms)
}

fn read_with_depth(tokens: &[Token], depth: usize) -> Result<(Expression, &[Token]), Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(SyntaxError::from_message(
            SyntaxErrorKind::TooDeeplyNested,
            format!("Expression too deeply nested (max depth: {MAX_PARSE_DEPTH})"),
        )
        .into());
    }

    let Some((token, mut remaining)) = tokens.split_first() else {
        return Err(
            SyntaxError::from_message(SyntaxErrorKind::Incomplete, "Unexpected end of input")
                .into(),
        );
    };

    match token.kind {
        TokenKind::LeftParen => {
            let mut children = Vec::new();
            loop {
                match remaining.first() {
                    None => {
                        return Err(SyntaxError::from_message(
                            SyntaxErrorKind::Incomplete,
                            "Unexpected end of input: unclosed '('",
                        )
                        .into());
                    }
                    Some(Token {
                        kind: TokenKind::RightParen,
                        ..
                    }) => {
                        return Ok((Expression::Compound(children), &remaining[1..]));
                    }
                    Some(_) => {
                        let (child, rest) = read_with_depth(remaining, depth + 1)?;
                        children.push(child);
                        remaining = rest;
                    }
                }
            }
        }
        TokenKind::RightParen => Err(SyntaxError::new(
            SyntaxErrorKind::UnmatchedDelimiter,
            "Unexpected ')'",
            None,
            Some(token.text.clone()),
        )
        .into()),
        _ => Ok((Expression::Atomic(classify(token)?), remaining)),
    }
}

/// Turn a non-delimiter token into an atom
pub fn classify(token: &Token) -> Result<Atom, Error> {
    match token.kind {
        TokenKind::Boolean => match token.text.as_str() {
            "true" => Ok(Atom::Boolean(true)),
            "false" => Ok(Atom::Boolean(false)),
            other => Err(invalid_literal("boolean", other)),
        },
        TokenKind::Integer => token.text.parse::<IntegerType>().map(Atom::Integer).map_err(|_| {
            SyntaxError::new(
                SyntaxErrorKind::ImplementationLimit,
                "Integer literal out of range",
                None,
                Some(token.text.clone()),
            )
            .into()
        }),
        TokenKind::Float => token
            .text
            .parse::<f64>()
            .map(Atom::Float)
            .map_err(|_| invalid_literal("float", &token.text)),
        TokenKind::Str => Ok(Atom::Str(token.text.clone())),
        TokenKind::Identifier => Ok(Atom::Symbol(token.text.clone())),
        TokenKind::LeftParen | TokenKind::RightParen => Err(invalid_literal("atom", &token.text)),
    }
}

fn invalid_literal(what: &str, text: &str) -> Error {
    SyntaxError::new(
        SyntaxErrorKind::InvalidSyntax,
        format!("Invalid {what} literal"),
        None,
        Some(text.to_owned()),
    )
    .into()
}
