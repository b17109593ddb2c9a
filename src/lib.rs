//! minilisp - a minimal Lisp interpreter
//!
//! This crate reads parenthesized text into an expression tree, rewrites that tree
//! through a macro-expansion pass and evaluates the result against a chain of
//! lexical environments.
//!
//! ```text
//! (def square (func (x) (* x x)))
//! (square 7)                                   ; => 49
//! (def-macro twice
//!   (func (e) (cons (quote do) (cons e (cons e (quote ()))))))
//! (twice (+ 1 1))                              ; => (do (+ 1 1) (+ 1 1)) => 2
//! (math.sqrt 2.0)                              ; resolved through the foreign bridge
//! ```
//!
//! ## Pipeline
//!
//! raw text → [`lexer`] → tokens → [`reader`] → [`ast::Expression`] →
//! [`expander::Expander`] → [`evaluator::eval`] against an [`environment::Environment`].
//! [`interpreter::Interpreter`] strings these together one top-level form at a time.
//!
//! ## Values
//!
//! Every value and every piece of code is an [`ast::Expression`]: an atom (integer,
//! float, boolean, string or symbol), a compound (ordered list), or a callable
//! (native primitive or user closure). Some forms, such as `def`, produce no value;
//! the evaluator reports those as `None`.
//!
//! ## Modules
//!
//! - `ast`: expression representation and construction helpers
//! - `lexer`: text tokenizer (feature `lexer`)
//! - `reader`: token stream to expression tree
//! - `environment`: chained symbol tables with foreign bridge fallback
//! - `foreign`: the foreign function bridge
//! - `builtinops`: primitives and special forms
//! - `evaluator`: the recursive evaluator
//! - `expander`: the macro-expansion pass
//! - `interpreter`: per-form read, expand, evaluate loop

use std::fmt;

/// Maximum reader nesting depth.
/// Deeper input is rejected with a syntax error instead of risking stack exhaustion.
pub const MAX_PARSE_DEPTH: usize = 64;

/// Maximum evaluation depth, shared by the evaluator and the macro expander.
/// Every nested form and every closure invocation counts one level, so this also
/// bounds how deeply user closures may recurse.
pub const MAX_EVAL_DEPTH: usize = 512;

/// Categorizes the different kinds of syntax errors.
#[derive(Debug, PartialEq, Clone)]
pub enum SyntaxErrorKind {
    /// Invalid or unexpected syntax (bad escape sequences, malformed tokens)
    InvalidSyntax,
    /// Input ended before the expression was complete (EOF, unterminated string, unclosed parens)
    Incomplete,
    /// A closing delimiter with no matching opening delimiter
    UnmatchedDelimiter,
    /// Expression nesting exceeded the maximum parse depth
    TooDeeplyNested,
    /// Implementation-imposed limit exceeded (integer literal overflow)
    ImplementationLimit,
}

/// A structured error describing a malformed token stream or source text.
#[derive(Debug, PartialEq, Clone)]
pub struct SyntaxError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 100 chars)
    pub context: Option<String>,
    /// The problematic token or character encountered, if identifiable
    pub found: Option<String>,
}

impl SyntaxError {
    pub fn new(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        SyntaxError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a SyntaxError with a kind and message but no context
    pub fn from_message(kind: SyntaxErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a SyntaxError with context extracted from input at a given offset
    pub fn with_context(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
    ) -> Self {
        Self::with_context_and_found(kind, message, input, error_offset, None)
    }

    /// Create a SyntaxError with context and the offending token
    pub fn with_context_and_found(
        kind: SyntaxErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 100;

        // Offsets are byte offsets; snap to a char boundary before slicing
        let mut context_start = error_offset.saturating_sub(20).min(input.len());
        while !input.is_char_boundary(context_start) {
            context_start -= 1;
        }

        let context_str: String = input[context_start..].chars().take(MAX_CONTEXT).collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.len() < input.len() {
            display_context.push_str("[...]");
        }

        let display_context = display_context.replace('\n', "\\n").replace('\r', "");

        Self::new(kind, message, Some(display_context), found)
    }
}

impl From<SyntaxError> for Error {
    fn from(e: SyntaxError) -> Self {
        Error::SyntaxError(e)
    }
}

/// Error types for the interpreter
///
/// Every variant is recoverable: a driver reports it and resumes at the next
/// top-level form. The one fatal condition, a foreign value kind with no atom
/// counterpart, panics inside [`foreign`] instead of producing an `Error`.
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    SyntaxError(SyntaxError),
    EvalError(String),
    TypeError(String),
    UnboundSymbol(String),
    ArityError {
        expected: usize,
        got: usize,
        expression: Option<String>,
    },
}

impl Error {
    /// Create an ArityError without expression context
    pub fn arity_error(expected: usize, got: usize) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: None,
        }
    }

    /// Create an ArityError with expression context
    pub fn arity_error_with_expr(expected: usize, got: usize, expression: String) -> Self {
        Error::ArityError {
            expected,
            got,
            expression: Some(expression),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::SyntaxError(e) => {
                write!(f, "SyntaxError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::EvalError(msg) => write!(f, "EvaluationError: {msg}"),
            Error::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Error::UnboundSymbol(name) => write!(f, "UnboundSymbolError: {name}"),
            Error::ArityError {
                expected,
                got,
                expression,
            } => match expression {
                Some(expr) => write!(
                    f,
                    "ArityError: expression {expr}: expected {expected} arguments, got {got}"
                ),
                None => write!(
                    f,
                    "ArityError: function expected {expected} arguments but got {got}"
                ),
            },
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod environment;
pub mod evaluator;
pub mod expander;
pub mod foreign;
pub mod interpreter;
pub mod reader;

#[cfg(feature = "lexer")]
pub mod lexer;
