#![cfg(feature = "lexer")]
#![expect(clippy::unwrap_used)] // test code OK

use minilisp::Error;
use minilisp::ast::{Expression, nil, sym, val};
use minilisp::expander::Expander;
use minilisp::foreign::{ForeignValue, PackageRegistry};
use minilisp::interpreter::Interpreter;
use minilisp::lexer::tokenize;
use minilisp::reader::read;

/// Evaluate a program and return the result of its last form
fn run(interp: &mut Interpreter, program: &str) -> Result<Option<Expression>, Error> {
    interp.eval_str(program).pop().unwrap_or(Ok(None))
}

fn run_fresh(program: &str) -> Result<Option<Expression>, Error> {
    run(&mut Interpreter::new(), program)
}

fn parse(input: &str) -> Expression {
    let tokens = tokenize(input).unwrap();
    read(&tokens).unwrap().0
}

#[derive(Debug)]
enum Expected {
    Value(Expression),
    NoValue,
    Type,
    Arity,
    Unbound,
    Syntax,
}
use Expected::*;

fn check(program: &str, expected: Expected, case: usize) {
    let result = run_fresh(program);
    let ok = match (&result, &expected) {
        (Ok(Some(got)), Value(want)) => got == want,
        (Ok(None), NoValue) => true,
        (Err(Error::TypeError(_)), Type) => true,
        (Err(Error::ArityError { .. }), Arity) => true,
        (Err(Error::UnboundSymbol(_)), Unbound) => true,
        (Err(Error::SyntaxError(_)), Syntax) => true,
        _ => false,
    };
    assert!(
        ok,
        "#{case}: {program}\n  expected {expected:?}\n  got {result:?}"
    );
}

#[test]
fn test_observable_behavior() {
    let cases = vec![
        // Literals evaluate to themselves
        ("0", Value(val(0))),
        ("42", Value(val(42))),
        ("-9223372036854775808", Value(val(i64::MIN))),
        ("9223372036854775807", Value(val(i64::MAX))),
        ("2.5", Value(val(2.5))),
        ("true", Value(val(true))),
        ("\"text\"", Value(val("text"))),
        // quote leaves its argument unevaluated, bound or not
        ("(quote (a b c))", Value(val([sym("a"), sym("b"), sym("c")]))),
        ("(def a 1) (quote (a b c))", Value(val([sym("a"), sym("b"), sym("c")]))),
        // if requires a boolean test
        ("(if true 1 2)", Value(val(1))),
        ("(if false 1 2)", Value(val(2))),
        ("(if 1 1 2)", Type),
        // def then lookup
        ("(def x 5)", NoValue),
        ("(def x 5) x", Value(val(5))),
        // list primitives
        ("(cons 1 (quote (2 3)))", Value(val([1, 2, 3]))),
        ("(first (quote (1 2 3)))", Value(val(1))),
        ("(rest (quote (1 2 3)))", Value(val([2, 3]))),
        ("(rest (quote ()))", Value(nil())),
        ("(cons 1 2)", Type),
        ("(first 1)", Type),
        // closures
        ("((func (x y) (+ x y)) 3 4)", Value(val(7))),
        ("((func (x y) (+ x y)) 3)", Arity),
        // unbound symbols, with and without a namespace separator
        ("undefined", Unbound),
        ("pkg.missing", Unbound),
        // malformed input
        ("(+ 1 2", Syntax),
        (")", Syntax),
        // printed forms of values without literal syntax do not read back
        ("#<closure>", Syntax),
        ("#<float:+inf>", Syntax),
    ];

    for (i, (program, expected)) in cases.into_iter().enumerate() {
        check(program, expected, i + 1);
    }
}

const TWICE: &str = "(def-macro twice (func (e) (cons (quote do) (cons e (cons e (quote ()))))))";

#[test]
fn test_twice_macro() {
    let mut interp = Interpreter::new();
    assert_eq!(interp.eval_str(TWICE), vec![Ok(None)]);
    assert!(interp.expander().is_macro("twice"));
    assert_eq!(run(&mut interp, "(twice (+ 1 1))").unwrap(), Some(val(2)));

    // Expansion itself, in a separate session over the same environment
    let mut expander = Expander::new();
    let env = interp.environment();
    assert_eq!(expander.expand(env, &parse(TWICE)).unwrap(), None);

    let once = expander
        .expand(env, &parse("(twice (+ 1 1))"))
        .unwrap()
        .unwrap();
    assert_eq!(once, parse("(do (+ 1 1) (+ 1 1))"));

    let again = expander.expand(env, &once).unwrap().unwrap();
    assert_eq!(again, once);
}

#[test]
fn test_definitions_persist_across_forms() {
    let mut interp = Interpreter::new();
    let program = r#"
        ; closures and recursion
        (def make-adder (func (n) (func (x) (+ x n))))
        (def add5 (make-adder 5))
        (def fact (func (n) (if (< n 2) 1 (* n (fact (- n 1))))))
    "#;
    assert_eq!(interp.eval_str(program), vec![Ok(None), Ok(None), Ok(None)]);

    assert_eq!(run(&mut interp, "(add5 10)").unwrap(), Some(val(15)));
    assert_eq!(run(&mut interp, "(fact 10)").unwrap(), Some(val(3628800)));
    assert_eq!(
        run(&mut interp, "((func args args) 1 (add5 1) \"s\")").unwrap(),
        Some(val([val(1), val(6), val("s")]))
    );
}

#[test]
fn test_errors_are_recoverable() {
    let mut interp = Interpreter::new();
    assert!(matches!(
        run(&mut interp, "(def y 1) (missing 1)"),
        Err(Error::UnboundSymbol(name)) if name == "missing"
    ));
    // Forms before the failing one took effect; the session goes on
    assert_eq!(run(&mut interp, "(+ y 1)").unwrap(), Some(val(2)));

    let err = run(&mut interp, "(if 1 2 3)").unwrap_err();
    assert!(err.to_string().starts_with("TypeError: "), "{err}");
    assert_eq!(run(&mut interp, "y").unwrap(), Some(val(1)));
}

#[test]
fn test_later_forms_run_after_a_failing_form() {
    let mut interp = Interpreter::new();
    let results = interp.eval_str("(def x 1) x (missing) (+ x 2)");
    assert_eq!(
        results,
        vec![
            Ok(None),
            Ok(Some(val(1))),
            Err(Error::UnboundSymbol("missing".into())),
            Ok(Some(val(3))),
        ]
    );

    // Expansion errors are per form too
    let results = interp.eval_str("(def-macro 1 2) (+ x 1)");
    assert!(matches!(results[0], Err(Error::TypeError(_))));
    assert_eq!(results[1], Ok(Some(val(2))));
}

#[test]
fn test_display_of_results() {
    let mut interp = Interpreter::new();
    let cases = vec![
        ("42", "42"),
        ("-3", "-3"),
        ("2.0", "2.0"),
        ("(+ 1 0.5)", "1.5"),
        ("true", "true"),
        ("\"a\\\"b\"", "\"a\\\"b\""),
        ("(quote sym)", "sym"),
        ("(list 1 (list 2 3) (quote ()))", "(1 (2 3) ())"),
        ("+", "#<primitive:+>"),
        ("(func (x) x)", "#<closure>"),
        ("(* 1e308 10.0)", "#<float:+inf>"),
        ("(- 0 (* 1e308 10.0))", "#<float:-inf>"),
    ];

    for (i, (program, expected)) in cases.into_iter().enumerate() {
        let shown = run(&mut interp, program).unwrap().unwrap().to_string();
        assert_eq!(shown, expected, "#{}: {program}", i + 1);
    }
}

fn bridged() -> Interpreter {
    let mut registry = PackageRegistry::new();
    registry.register("math", "sqrt", |args| match args.as_slice() {
        [ForeignValue::Float(x)] => vec![ForeignValue::Float(x.sqrt())],
        _ => vec![],
    });
    registry.register("math", "divmod", |args| match args.as_slice() {
        [ForeignValue::Int(a), ForeignValue::Int(b)] => {
            vec![ForeignValue::Int(a / b), ForeignValue::Int(a % b)]
        }
        _ => vec![],
    });
    registry.register("strings", "concat", |args| {
        let joined = args
            .into_iter()
            .map(|arg| match arg {
                ForeignValue::Str(s) => s,
                other => format!("{other:?}"),
            })
            .collect::<String>();
        vec![ForeignValue::Str(joined)]
    });
    registry.register("strings", "handle", |_| {
        vec![ForeignValue::Unsupported("file".into())]
    });
    assert!(registry.alias("str", "strings"));
    Interpreter::with_bridge(registry)
}

#[test]
fn test_foreign_bridge() {
    let mut interp = bridged();

    assert_eq!(run(&mut interp, "(math.sqrt 16.0)").unwrap(), Some(val(4.0)));
    assert_eq!(run(&mut interp, "(math.divmod 17 5)").unwrap(), Some(val([3, 2])));
    assert_eq!(run(&mut interp, "(math.sqrt 1)").unwrap(), None);
    assert_eq!(
        run(&mut interp, "(str.concat \"a\" \"b\")").unwrap(),
        Some(val("ab"))
    );

    // Foreign callables are ordinary values
    assert_eq!(
        run(&mut interp, "(def root math.sqrt) (root 9.0)").unwrap(),
        Some(val(3.0))
    );

    // User bindings win over the bridge
    assert_eq!(
        run(&mut interp, "(def math.sqrt (func (x) x)) (math.sqrt 2.0)").unwrap(),
        Some(val(2.0))
    );

    assert!(matches!(
        run(&mut interp, "(math.cbrt 8.0)"),
        Err(Error::UnboundSymbol(_))
    ));
}

#[test]
#[should_panic(expected = "unsupported type")]
fn test_foreign_compound_argument_is_fatal() {
    let mut interp = bridged();
    let _ = run(&mut interp, "(strings.concat (list 1 2))");
}

#[test]
#[should_panic(expected = "strings.handle returned a value with an unsupported type: file")]
fn test_foreign_unsupported_result_is_fatal() {
    let mut interp = bridged();
    let _ = run(&mut interp, "(strings.handle)");
}
