//! Macro expansion.
//!
//! Expansion is a tree rewrite that runs over each top-level form before the
//! evaluator sees it. The head symbol of every compound picks the rule:
//!
//! - `quote`: left alone, quoted data is never expanded
//! - `def` and `func`: only the value/body (third child) is expanded
//! - `def-macro`: the transformer is expanded, evaluated and registered; the form
//!   itself disappears from the tree
//! - a registered macro: its transformer is applied to the unevaluated call-site
//!   arguments and the result is expanded again, until no macro call remains
//! - anything else: every child is expanded
//!
//! The macro table belongs to the [`Expander`], not to any [`Environment`], so
//! macros are invisible to evaluated code and independent expanders never see each
//! other's definitions.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::ast::{Callable, Expression, sym};
use crate::environment::Environment;
use crate::evaluator::{apply_with_depth, eval_with_depth_tracking};
use crate::{Error, MAX_EVAL_DEPTH};

/// Macro-expansion pass with its own macro table
#[derive(Default)]
pub struct Expander {
    macros: HashMap<String, Callable>,
}

impl Expander {
    /// Expander with an empty macro table
    pub fn new() -> Self {
        Self::default()
    }

    /// Fully expand `expr`. Transformers are evaluated and applied in `env`.
    ///
    /// Returns `Ok(None)` when the form was a `def-macro`, which leaves nothing to evaluate.
    pub fn expand(
        &mut self,
        env: &Environment,
        expr: &Expression,
    ) -> Result<Option<Expression>, Error> {
        self.expand_with_depth(env, expr, 0)
    }

    pub fn is_macro(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Names of all registered macros, sorted
    pub fn macro_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.macros.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn expand_with_depth(
        &mut self,
        env: &Environment,
        expr: &Expression,
        depth: usize,
    ) -> Result<Option<Expression>, Error> {
        if depth >= MAX_EVAL_DEPTH {
            return Err(Error::EvalError(format!(
                "Macro expansion depth limit exceeded (max: {MAX_EVAL_DEPTH})"
            )));
        }

        let Expression::Compound(children) = expr else {
            return Ok(Some(expr.clone()));
        };

        match children.as_slice() {
            [head, args @ ..] => match head.as_symbol() {
                Some("quote") => Ok(Some(expr.clone())),
                Some("def" | "func") => self.expand_body(env, children, depth),
                Some("def-macro") => {
                    self.define_macro(env, args, depth)?;
                    Ok(None)
                }
                Some(name) if self.macros.contains_key(name) => {
                    self.expand_macro_call(env, name, args, depth)
                }
                _ => self.expand_children(env, children, depth),
            },
            [] => Ok(Some(expr.clone())),
        }
    }

    /// `def` and `func`: keep the head and the first operand, expand the rest
    fn expand_body(
        &mut self,
        env: &Environment,
        children: &[Expression],
        depth: usize,
    ) -> Result<Option<Expression>, Error> {
        let split = children.len().min(2);
        let (fixed, body) = children.split_at(split);

        let mut expanded = fixed.to_vec();
        for child in body {
            if let Some(child) = self.expand_with_depth(env, child, depth + 1)? {
                expanded.push(child);
            }
        }
        Ok(Some(Expression::Compound(expanded)))
    }

    fn expand_children(
        &mut self,
        env: &Environment,
        children: &[Expression],
        depth: usize,
    ) -> Result<Option<Expression>, Error> {
        let mut expanded = Vec::with_capacity(children.len());
        for child in children {
            // Nested def-macro forms leave no trace
            if let Some(child) = self.expand_with_depth(env, child, depth + 1)? {
                expanded.push(child);
            }
        }
        Ok(Some(Expression::Compound(expanded)))
    }

    fn define_macro(
        &mut self,
        env: &Environment,
        args: &[Expression],
        depth: usize,
    ) -> Result<(), Error> {
        let [name, transformer] = args else {
            let form: Vec<Expression> = std::iter::once(sym("def-macro"))
                .chain(args.iter().cloned())
                .collect();
            return Err(Error::arity_error_with_expr(
                2,
                args.len(),
                Expression::Compound(form).to_string(),
            ));
        };

        let Some(name) = name.as_symbol() else {
            return Err(Error::TypeError(format!(
                "def-macro requires a symbol name, got {}: {name}",
                name.kind()
            )));
        };

        let transformer = match self.expand_with_depth(env, transformer, depth + 1)? {
            Some(expanded) => eval_with_depth_tracking(env, &expanded, depth + 1)?,
            None => None,
        };

        match transformer {
            Some(Expression::Callable(callable)) => {
                debug!(name, "registered macro");
                self.macros.insert(name.to_owned(), callable);
                Ok(())
            }
            Some(other) => Err(Error::TypeError(format!(
                "def-macro {name}: transformer must evaluate to a callable, got {}: {other}",
                other.kind()
            ))),
            None => Err(Error::TypeError(format!(
                "def-macro {name}: transformer produced no value"
            ))),
        }
    }

    fn expand_macro_call(
        &mut self,
        env: &Environment,
        name: &str,
        args: &[Expression],
        depth: usize,
    ) -> Result<Option<Expression>, Error> {
        let Some(transformer) = self.macros.get(name).cloned() else {
            return Err(Error::UnboundSymbol(name.to_owned()));
        };
        trace!(name, args = args.len(), "expanding macro call");

        match apply_with_depth(&transformer, env, args.to_vec(), depth + 1)? {
            // Re-expand until no macro call remains
            Some(expansion) => self.expand_with_depth(env, &expansion, depth + 1),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for Expander {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Expander")
            .field("macros", &self.macro_names())
            .finish()
    }
}

#[cfg(all(test, feature = "lexer"))]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::val;
    use crate::evaluator::{create_global_env, eval};
    use crate::lexer::tokenize;
    use crate::reader::read;

    const TWICE: &str = "(def-macro twice (func (e) (cons (quote do) (cons e (cons e (quote ()))))))";

    fn parse(input: &str) -> Expression {
        let tokens = tokenize(input).unwrap();
        let (expr, rest) = read(&tokens).unwrap();
        assert!(rest.is_empty(), "trailing tokens in {input:?}");
        expr
    }

    fn expand_str(
        expander: &mut Expander,
        env: &Environment,
        input: &str,
    ) -> Result<Option<Expression>, Error> {
        expander.expand(env, &parse(input))
    }

    fn session(definitions: &[&str]) -> (Expander, Environment) {
        let mut expander = Expander::new();
        let env = create_global_env();
        for definition in definitions {
            assert_eq!(
                expand_str(&mut expander, &env, definition).unwrap(),
                None,
                "definition {definition:?} should vanish"
            );
        }
        (expander, env)
    }

    #[test]
    fn test_expansion_rules() {
        let (mut expander, env) = session(&[
            TWICE,
            "(def-macro twice-again (func (e) (cons (quote twice) (cons e (quote ())))))",
        ]);

        let test_cases = vec![
            // Atoms and plain calls are structurally unchanged
            ("42", "42"),
            ("x", "x"),
            ("(+ 1 (* 2 3))", "(+ 1 (* 2 3))"),
            ("()", "()"),
            // Macro call
            ("(twice (+ 1 1))", "(do (+ 1 1) (+ 1 1))"),
            // Macro calls inside ordinary forms
            ("(list (twice 1) 2)", "(list (do 1 1) 2)"),
            // Results are expanded again
            ("(twice-again 5)", "(do 5 5)"),
            // Quoted data is left alone
            ("(quote (twice 1))", "(quote (twice 1))"),
            // def and func: only the body is expanded
            ("(def y (twice 3))", "(def y (do 3 3))"),
            ("(func (twice) (twice 1))", "(func (twice) (do 1 1))"),
            ("(def twice 1)", "(def twice 1)"),
        ];

        for (i, (input, expected)) in test_cases.into_iter().enumerate() {
            let expanded = expand_str(&mut expander, &env, input).unwrap();
            assert_eq!(
                expanded,
                Some(parse(expected)),
                "#{}: expanding {input}",
                i + 1
            );
        }
    }

    #[test]
    fn test_expanded_macro_evaluates() {
        let (mut expander, env) = session(&[TWICE]);
        let expanded = expand_str(&mut expander, &env, "(twice (+ 1 1))")
            .unwrap()
            .unwrap();
        assert_eq!(eval(&env, &expanded).unwrap(), Some(val(2)));
    }

    #[test]
    fn test_expansion_is_idempotent() {
        let (mut expander, env) = session(&[TWICE]);
        for input in [
            "(twice (twice (+ 1 1)))",
            "(def f (func (x) (twice x)))",
            "(quote (twice 1))",
        ] {
            let once = expand_str(&mut expander, &env, input).unwrap().unwrap();
            let again = expander.expand(&env, &once).unwrap().unwrap();
            assert_eq!(once, again, "expanding {input} twice");
        }
    }

    #[test]
    fn test_nested_def_macro_is_dropped() {
        let (mut expander, env) = session(&[]);
        let expanded = expand_str(&mut expander, &env, "(do (def-macro one (func () 1)) (one))")
            .unwrap();
        assert_eq!(expanded, Some(parse("(do 1)")));
        assert!(expander.is_macro("one"));
    }

    #[test]
    fn test_macro_table_is_per_expander() {
        let (first, env) = session(&[TWICE]);
        let mut second = Expander::new();

        assert!(first.is_macro("twice"));
        assert_eq!(first.macro_names(), vec!["twice"]);
        assert!(!second.is_macro("twice"));
        assert!(second.macro_names().is_empty());

        // Unknown to the second session: an ordinary call
        assert_eq!(
            expand_str(&mut second, &env, "(twice 1)").unwrap(),
            Some(parse("(twice 1)"))
        );

        // Macros never leak into the environment
        assert_eq!(env.get("twice"), None);
    }

    #[test]
    fn test_transformer_uses_environment() {
        let (mut expander, env) = session(&[]);
        expand_str(
            &mut expander,
            &env,
            "(def-macro swap (func (a b) (list b a)))",
        )
        .unwrap();
        assert_eq!(
            expand_str(&mut expander, &env, "(swap 1 -)").unwrap(),
            Some(parse("(- 1)"))
        );
    }

    #[test]
    fn test_def_macro_errors() {
        let (mut expander, env) = session(&[]);

        let cases: Vec<(&str, fn(&Error) -> bool)> = vec![
            ("(def-macro)", |e| matches!(e, Error::ArityError { expected: 2, got: 0, .. })),
            ("(def-macro m)", |e| matches!(e, Error::ArityError { expected: 2, got: 1, .. })),
            ("(def-macro 1 (func (e) e))", |e| matches!(e, Error::TypeError(_))),
            ("(def-macro m 5)", |e| matches!(e, Error::TypeError(_))),
            ("(def-macro m undefined)", |e| matches!(e, Error::UnboundSymbol(_))),
        ];

        for (i, (input, check)) in cases.into_iter().enumerate() {
            let err = expand_str(&mut expander, &env, input).unwrap_err();
            assert!(check(&err), "#{}: {input} gave {err:?}", i + 1);
        }
        assert!(expander.macro_names().is_empty());
    }

    #[test]
    fn test_macro_call_arity() {
        let (mut expander, env) = session(&[TWICE]);
        assert!(matches!(
            expand_str(&mut expander, &env, "(twice 1 2)"),
            Err(Error::ArityError {
                expected: 1,
                got: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_runaway_expansion_is_bounded() {
        let (mut expander, env) = session(&[
            "(def-macro forever (func (e) (cons (quote forever) (cons e (quote ())))))",
        ]);
        let Err(Error::EvalError(msg)) = expand_str(&mut expander, &env, "(forever 1)") else {
            panic!("expected depth limit error");
        };
        assert!(msg.contains("depth limit"), "{msg}");
    }
}
