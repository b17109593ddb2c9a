use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{take_while, take_while1},
    character::complete::{char, multispace1},
    combinator::{recognize, value, verify},
    error::ErrorKind,
    multi::many0,
    sequence::pair,
};

use crate::ast::IntegerType;
use crate::reader::{Token, TokenKind};
use crate::{Error, SyntaxError, SyntaxErrorKind};

/// Tokenizer settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenizeConfig {
    /// Treat `;` as the start of a comment running to end of line
    pub handle_comments: bool,
}

impl Default for TokenizeConfig {
    fn default() -> Self {
        TokenizeConfig {
            handle_comments: true,
        }
    }
}

/// Split raw text into classified tokens using the default configuration.
pub fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    tokenize_with_config(input, TokenizeConfig::default())
}

/// Split raw text into classified tokens.
pub fn tokenize_with_config(input: &str, config: TokenizeConfig) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut remaining = input;

    loop {
        let (rest, ()) = skip_trivia(remaining, config).map_err(|e| lex_error(input, e))?;
        if rest.is_empty() {
            return Ok(tokens);
        }
        let (rest, token) = parse_token(rest, config).map_err(|e| lex_error(input, e))?;
        tokens.push(token);
        remaining = rest;
    }
}

/// Classify a bare (unquoted, non-delimiter) word
pub fn classify_word(word: &str) -> TokenKind {
    match word {
        "true" | "false" => TokenKind::Boolean,
        _ if word.parse::<IntegerType>().is_ok() => TokenKind::Integer,
        _ if is_float_literal(word) => TokenKind::Float,
        _ => TokenKind::Identifier,
    }
}

// Rejects "inf", "NaN" and friends, which f64 parsing would accept
fn is_float_literal(word: &str) -> bool {
    word.parse::<f64>().is_ok()
        && !word
            .chars()
            .any(|c| c.is_alphabetic() && c != 'e' && c != 'E')
}

fn is_word_char(c: char, config: TokenizeConfig) -> bool {
    !(c.is_whitespace()
        || c == '('
        || c == ')'
        || c == '"'
        || (config.handle_comments && c == ';'))
}

/// Convert nom errors to syntax errors carrying the input position
fn lex_error(input: &str, error: nom::Err<nom::error::Error<&str>>) -> Error {
    match error {
        nom::Err::Error(e) | nom::Err::Failure(e) => {
            let position = input.len().saturating_sub(e.input.len());
            let found = e.input.chars().next().map(String::from);
            let (kind, message) = match e.code {
                ErrorKind::Eof => (
                    SyntaxErrorKind::Incomplete,
                    "Unterminated string literal".to_owned(),
                ),
                ErrorKind::Escaped => (
                    SyntaxErrorKind::InvalidSyntax,
                    format!("Invalid escape sequence at position {position}"),
                ),
                ErrorKind::Verify => (
                    SyntaxErrorKind::InvalidSyntax,
                    format!("Unreadable object notation at position {position}"),
                ),
                _ => (
                    SyntaxErrorKind::InvalidSyntax,
                    format!("Unexpected character at position {position}"),
                ),
            };
            SyntaxError::with_context_and_found(kind, message, input, position, found).into()
        }
        nom::Err::Incomplete(_) => {
            SyntaxError::from_message(SyntaxErrorKind::Incomplete, "Incomplete input").into()
        }
    }
}

/// Skip whitespace and, when enabled, comments
fn skip_trivia(input: &str, config: TokenizeConfig) -> IResult<&str, ()> {
    if config.handle_comments {
        let comment = recognize(pair(char(';'), take_while(|c: char| c != '\n')));
        value((), many0(alt((multispace1, comment)))).parse(input)
    } else {
        value((), many0(multispace1)).parse(input)
    }
}

fn parse_token(input: &str, config: TokenizeConfig) -> IResult<&str, Token> {
    // `#<...>` is the printed form of values with no literal syntax
    let word = verify(take_while1(move |c: char| is_word_char(c, config)), |word: &str| {
        !word.starts_with("#<")
    })
    .map(|word| Token::new(classify_word(word), word));
    alt((parse_delimiter, parse_string, word)).parse(input)
}

fn parse_delimiter(input: &str) -> IResult<&str, Token> {
    alt((
        value(Token::new(TokenKind::LeftParen, "("), char('(')),
        value(Token::new(TokenKind::RightParen, ")"), char(')')),
    ))
    .parse(input)
}

/// Parse a string literal. Once the opening quote is seen, failures are final.
fn parse_string(input: &str) -> IResult<&str, Token> {
    let (mut remaining, _) = char('"').parse(input)?;
    let mut chars = String::new();

    loop {
        let mut char_iter = remaining.chars();
        match char_iter.next() {
            Some('"') => {
                return Ok((char_iter.as_str(), Token::new(TokenKind::Str, chars)));
            }
            Some('\\') => {
                match char_iter.next() {
                    Some('n') => chars.push('\n'),
                    Some('t') => chars.push('\t'),
                    Some('r') => chars.push('\r'),
                    Some('\\') => chars.push('\\'),
                    Some('"') => chars.push('"'),
                    Some(_) => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Escaped,
                        )));
                    }
                    None => {
                        return Err(nom::Err::Failure(nom::error::Error::new(
                            remaining,
                            ErrorKind::Eof,
                        )));
                    }
                }
                remaining = char_iter.as_str();
            }
            Some(ch) => {
                chars.push(ch);
                remaining = char_iter.as_str();
            }
            None => {
                return Err(nom::Err::Failure(nom::error::Error::new(
                    remaining,
                    ErrorKind::Eof,
                )));
            }
        }
    }
}
