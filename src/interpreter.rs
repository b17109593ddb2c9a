//! Per-form driver: read one form, expand it, evaluate it, repeat.

use std::rc::Rc;

use tracing::debug;

use crate::Error;
use crate::ast::Expression;
use crate::environment::Environment;
use crate::evaluator::{create_global_env, eval, populate_builtins};
use crate::expander::Expander;
use crate::foreign::ForeignRegistry;
use crate::reader::{Token, read};

/// Outcome of one top-level form: its value, no value, or the error it raised
pub type FormResult = Result<Option<Expression>, Error>;

/// A root environment plus the macro table that goes with it.
///
/// ```
/// use minilisp::interpreter::Interpreter;
///
/// let mut interp = Interpreter::new();
/// let results = interp.eval_str("(def square (func (x) (* x x))) (square 7)");
/// assert_eq!(results[0], Ok(None));
/// assert_eq!(results[1].as_ref().unwrap().as_ref().unwrap().to_string(), "49");
/// ```
#[derive(Debug)]
pub struct Interpreter {
    env: Environment,
    expander: Expander,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    /// Interpreter with the builtin primitives and no foreign bridge
    pub fn new() -> Self {
        Interpreter {
            env: create_global_env(),
            expander: Expander::new(),
        }
    }

    /// Interpreter whose unresolved `namespace.name` symbols are looked up in `registry`
    pub fn with_bridge(registry: impl ForeignRegistry + 'static) -> Self {
        let env = Environment::with_bridge(Rc::new(registry));
        populate_builtins(&env);
        Interpreter {
            env,
            expander: Expander::new(),
        }
    }

    pub fn environment(&self) -> &Environment {
        &self.env
    }

    pub fn expander(&self) -> &Expander {
        &self.expander
    }

    /// Expand and evaluate a single form that has already been read
    pub fn eval_form(&mut self, form: &Expression) -> Result<Option<Expression>, Error> {
        match self.expander.expand(&self.env, form)? {
            Some(expanded) => eval(&self.env, &expanded),
            None => Ok(None),
        }
    }

    /// Read, expand and evaluate every form in `tokens`, in order, one result per form.
    ///
    /// Each form is fully expanded and evaluated before the next one is read, so a
    /// macro or binding defined by one form is available to the following ones.
    /// Expansion and evaluation errors are recorded for their form and processing
    /// resumes at the next one. A reader error ends the stream: it becomes the last
    /// entry, since there is no form boundary left to resume at.
    pub fn eval_tokens(&mut self, tokens: &[Token]) -> Vec<FormResult> {
        let mut results = Vec::new();
        let mut remaining = tokens;

        while !remaining.is_empty() {
            match read(remaining) {
                Ok((form, rest)) => {
                    debug!(form = %form, "evaluating top-level form");
                    let result = self.eval_form(&form);
                    if let Err(e) = &result {
                        debug!(error = %e, "top-level form failed");
                    }
                    results.push(result);
                    remaining = rest;
                }
                Err(e) => {
                    results.push(Err(e));
                    break;
                }
            }
        }

        results
    }

    /// Tokenize `input` and evaluate every form in it.
    ///
    /// Input that fails to tokenize yields a single error entry.
    #[cfg(feature = "lexer")]
    pub fn eval_str(&mut self, input: &str) -> Vec<FormResult> {
        match crate::lexer::tokenize(input) {
            Ok(tokens) => self.eval_tokens(&tokens),
            Err(e) => vec![Err(e)],
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{sym, val};
    use crate::foreign::{ForeignValue, PackageRegistry};
    use crate::reader::TokenKind;

    fn tok(kind: TokenKind, text: &str) -> Token {
        Token::new(kind, text)
    }

    #[test]
    fn test_eval_tokens() {
        use TokenKind::*;
        // (def x 5) (+ x 1)
        let tokens = vec![
            tok(LeftParen, "("),
            tok(Identifier, "def"),
            tok(Identifier, "x"),
            tok(Integer, "5"),
            tok(RightParen, ")"),
            tok(LeftParen, "("),
            tok(Identifier, "+"),
            tok(Identifier, "x"),
            tok(Integer, "1"),
            tok(RightParen, ")"),
        ];

        let mut interp = Interpreter::new();
        assert_eq!(interp.eval_tokens(&tokens), vec![Ok(None), Ok(Some(val(6)))]);
        assert_eq!(interp.environment().get("x"), Some(val(5)));
        assert!(interp.eval_tokens(&[]).is_empty());
    }

    #[test]
    fn test_evaluation_errors_are_per_form() {
        use TokenKind::*;
        // (def a 1) undefined (def b 2)
        let tokens = vec![
            tok(LeftParen, "("),
            tok(Identifier, "def"),
            tok(Identifier, "a"),
            tok(Integer, "1"),
            tok(RightParen, ")"),
            tok(Identifier, "undefined"),
            tok(LeftParen, "("),
            tok(Identifier, "def"),
            tok(Identifier, "b"),
            tok(Integer, "2"),
            tok(RightParen, ")"),
        ];

        let mut interp = Interpreter::new();
        assert_eq!(
            interp.eval_tokens(&tokens),
            vec![
                Ok(None),
                Err(Error::UnboundSymbol("undefined".into())),
                Ok(None),
            ]
        );
        assert_eq!(interp.environment().get("a"), Some(val(1)));
        assert_eq!(interp.environment().get("b"), Some(val(2)));
    }

    #[test]
    fn test_reader_error_ends_stream() {
        use TokenKind::*;
        // (def a 1) ) (def b 2)
        let tokens = vec![
            tok(LeftParen, "("),
            tok(Identifier, "def"),
            tok(Identifier, "a"),
            tok(Integer, "1"),
            tok(RightParen, ")"),
            tok(RightParen, ")"),
            tok(LeftParen, "("),
            tok(Identifier, "def"),
            tok(Identifier, "b"),
            tok(Integer, "2"),
            tok(RightParen, ")"),
        ];

        let mut interp = Interpreter::new();
        let results = interp.eval_tokens(&tokens);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(None));
        assert!(matches!(results[1], Err(Error::SyntaxError(_))));
        assert_eq!(interp.environment().get("a"), Some(val(1)));
        assert_eq!(interp.environment().get("b"), None);
    }

    #[test]
    fn test_eval_form_with_macros() {
        let mut interp = Interpreter::new();
        let def_macro = val([
            sym("def-macro"),
            sym("id"),
            val([sym("func"), val([sym("e")]), sym("e")]),
        ]);
        assert_eq!(interp.eval_form(&def_macro).unwrap(), None);
        assert!(interp.expander().is_macro("id"));
        assert_eq!(
            interp
                .eval_form(&val([sym("id"), val([sym("+"), val(1), val(2)])]))
                .unwrap(),
            Some(val(3))
        );
    }

    #[test]
    fn test_bridge_keeps_builtins() {
        let mut registry = PackageRegistry::new();
        registry.register("math", "neg", |args| match args.as_slice() {
            [ForeignValue::Int(n)] => vec![ForeignValue::Int(-n)],
            _ => vec![],
        });

        let mut interp = Interpreter::with_bridge(registry);
        let form = val([sym("+"), val(10), val([sym("math.neg"), val(3)])]);
        assert_eq!(interp.eval_form(&form).unwrap(), Some(val(7)));
    }

    #[cfg(feature = "lexer")]
    #[test]
    fn test_eval_str() {
        let mut interp = Interpreter::new();
        let results = interp.eval_str("; comment\n(def s \"hi\") s (list 1 2.5 true)");
        let shown: Vec<String> = results
            .into_iter()
            .map(|r| r.unwrap().map_or("nil".to_owned(), |v| v.to_string()))
            .collect();
        assert_eq!(shown, vec!["nil", "\"hi\"", "(1 2.5 true)"]);

        // Incomplete form after a complete one
        let results = interp.eval_str("(def t 1) (+ 1");
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Ok(None));
        assert!(matches!(results[1], Err(Error::SyntaxError(_))));

        // Tokenizer failure
        let results = interp.eval_str("\"open");
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::SyntaxError(_))));
    }
}
