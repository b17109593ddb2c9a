use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::MAX_EVAL_DEPTH;
use crate::ast::{Atom, Callable, Closure, Expression, Params, nil};
use crate::builtinops::{OpKind, find_special_form, get_builtin_ops};
use crate::environment::Environment;

/// Evaluate an expression under the bindings visible from `env` (public API)
///
/// Returns `Ok(None)` for forms that produce no value, such as `def`.
pub fn eval(env: &Environment, expr: &Expression) -> Result<Option<Expression>, Error> {
    eval_with_depth_tracking(env, expr, 0)
}

/// Invoke a callable with already-evaluated arguments (public API)
///
/// Primitives see `env` as their call-site environment; closures ignore it and
/// run in a fresh child of the environment they captured.
pub fn apply(
    callable: &Callable,
    env: &Environment,
    args: Vec<Expression>,
) -> Result<Option<Expression>, Error> {
    apply_with_depth(callable, env, args, 0)
}

/// Evaluate an expression with depth tracking to prevent stack overflow
pub(crate) fn eval_with_depth_tracking(
    env: &Environment,
    expr: &Expression,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    if depth >= MAX_EVAL_DEPTH {
        return Err(Error::EvalError(format!(
            "Evaluation depth limit exceeded (max: {MAX_EVAL_DEPTH})"
        )));
    }
    match expr {
        Expression::Atomic(Atom::Symbol(name)) => env.lookup(name).map(Some),

        // Self-evaluating forms
        Expression::Atomic(_) | Expression::Callable(_) => Ok(Some(expr.clone())),

        Expression::Compound(children) => {
            eval_compound(children, env, depth).map_err(|err| add_context(err, expr))
        }
    }
}

/// Add the failing form to type and evaluation errors, innermost form only
fn add_context(error: Error, expr: &Expression) -> Error {
    const MARKER: &str = "\n  Context: ";
    match error {
        Error::EvalError(msg) if !msg.contains(MARKER) => {
            Error::EvalError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        Error::TypeError(msg) if !msg.contains(MARKER) => {
            Error::TypeError(format!("{msg}{MARKER}while evaluating: {expr}"))
        }
        // Syntax, unbound symbol and arity errors carry their own context
        other => other,
    }
}

/// Evaluate an operand whose value is required.
///
/// Forms that produce no value (a `def` in argument position) count as the empty compound.
fn eval_operand(env: &Environment, expr: &Expression, depth: usize) -> Result<Expression, Error> {
    Ok(eval_with_depth_tracking(env, expr, depth + 1)?.unwrap_or_else(nil))
}

/// Evaluate argument expressions left to right
fn eval_args(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Vec<Expression>, Error> {
    args.iter()
        .map(|arg| eval_operand(env, arg, depth))
        .collect()
}

/// Evaluate a compound: special form dispatch first, procedure application otherwise
fn eval_compound(
    children: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match children {
        [] => Err(Error::EvalError("Cannot evaluate empty compound".to_owned())),

        [head, args @ ..] => {
            if let Some(name) = head.as_symbol()
                && let Some(op) = find_special_form(name)
                && let OpKind::SpecialForm(special_form) = op.op_kind
            {
                if let Err(Error::ArityError { expected, got, .. }) = op.arity.validate(args.len())
                {
                    return Err(Error::arity_error_with_expr(
                        expected,
                        got,
                        format!("{}", Expression::Compound(children.to_vec())),
                    ));
                }
                return special_form(args, env, depth);
            }

            let func = eval_operand(env, head, depth)?;
            let args = eval_args(args, env, depth)?;

            match &func {
                Expression::Callable(callable) => apply_with_depth(callable, env, args, depth + 1),
                other => Err(Error::TypeError(format!(
                    "Cannot apply non-callable {}: {other}",
                    other.kind()
                ))),
            }
        }
    }
}

pub(crate) fn apply_with_depth(
    callable: &Callable,
    env: &Environment,
    args: Vec<Expression>,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match callable {
        Callable::Primitive { func, .. } => func(env, args),
        Callable::Closure(closure) => {
            // Lexical scoping: the call frame hangs off the defining environment
            let call_env = Environment::with_parent(&closure.env);

            match &closure.params {
                Params::Variadic(name) => {
                    trace!(param = %name, args = args.len(), "invoking variadic closure");
                    call_env.define(name.clone(), Expression::Compound(args));
                }
                Params::Fixed(params) => {
                    trace!(params = params.len(), args = args.len(), "invoking closure");
                    if params.len() != args.len() {
                        return Err(Error::arity_error(params.len(), args.len()));
                    }
                    for (param, arg) in params.iter().zip(args) {
                        call_env.define(param.clone(), arg);
                    }
                }
            }

            // Note only the innermost closure body
            const MARKER: &str = "\n  In closure: ";
            let body = &closure.body;
            eval_with_depth_tracking(&call_env, body, depth + 1).map_err(|err| match err {
                Error::EvalError(msg) if !msg.contains(MARKER) => {
                    Error::EvalError(format!("{msg}{MARKER}{body}"))
                }
                Error::TypeError(msg) if !msg.contains(MARKER) => {
                    Error::TypeError(format!("{msg}{MARKER}{body}"))
                }
                other => other,
            })
        }
    }
}

/// Evaluate quote special form
pub(crate) fn eval_quote(
    args: &[Expression],
    _env: &Environment,
    _depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [expr] => Ok(Some(expr.clone())),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate def special form
///
/// The binding always lands in the environment this evaluation received, which is
/// not necessarily the innermost lexical scope of the surrounding code.
pub(crate) fn eval_def(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [Expression::Atomic(Atom::Symbol(name)), expr] => {
            let value = eval_operand(env, expr, depth)?;
            env.define(name.clone(), value);
            Ok(None)
        }
        [other, _] => Err(Error::TypeError(format!(
            "def requires a symbol, got {}",
            other.kind()
        ))),
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate if special form
pub(crate) fn eval_if(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [test_expr, then_expr, else_expr] => {
            let test = eval_operand(env, test_expr, depth)?;
            let branch = if bool::try_from(&test)? {
                then_expr
            } else {
                else_expr
            };
            eval_with_depth_tracking(env, branch, depth + 1)
        }
        _ => Err(Error::arity_error(3, args.len())),
    }
}

/// Evaluate first special form
pub(crate) fn eval_first(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [list_expr] => match eval_operand(env, list_expr, depth)? {
            Expression::Compound(mut children) if !children.is_empty() => {
                Ok(Some(children.swap_remove(0)))
            }
            Expression::Compound(_) => {
                Err(Error::TypeError("first of empty compound".to_owned()))
            }
            other => Err(Error::TypeError(format!(
                "first requires a compound, got {}",
                other.kind()
            ))),
        },
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate rest special form
pub(crate) fn eval_rest(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [list_expr] => match eval_operand(env, list_expr, depth)? {
            Expression::Compound(children) => Ok(Some(Expression::Compound(
                children.into_iter().skip(1).collect(),
            ))),
            other => Err(Error::TypeError(format!(
                "rest requires a compound, got {}",
                other.kind()
            ))),
        },
        _ => Err(Error::arity_error(1, args.len())),
    }
}

/// Evaluate cons special form
pub(crate) fn eval_cons(
    args: &[Expression],
    env: &Environment,
    depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [head_expr, tail_expr] => {
            let head = eval_operand(env, head_expr, depth)?;
            match eval_operand(env, tail_expr, depth)? {
                Expression::Compound(tail) => {
                    let mut children = Vec::with_capacity(tail.len() + 1);
                    children.push(head);
                    children.extend(tail);
                    Ok(Some(Expression::Compound(children)))
                }
                other => Err(Error::TypeError(format!(
                    "cons requires a compound as second argument, got {}",
                    other.kind()
                ))),
            }
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Evaluate func special form
pub(crate) fn eval_func(
    args: &[Expression],
    env: &Environment,
    _depth: usize,
) -> Result<Option<Expression>, Error> {
    match args {
        [params_expr, body] => {
            let params = match params_expr {
                Expression::Atomic(Atom::Symbol(name)) => Params::Variadic(name.clone()),
                Expression::Compound(param_list) => {
                    let mut params: Vec<String> = Vec::with_capacity(param_list.len());
                    for param in param_list {
                        match param.as_symbol() {
                            Some(name) if params.iter().any(|p| p == name) => {
                                return Err(Error::EvalError(format!(
                                    "Duplicate parameter name: {name}"
                                )));
                            }
                            Some(name) => params.push(name.to_owned()),
                            None => {
                                return Err(Error::TypeError(format!(
                                    "func parameters must be symbols, got {}",
                                    param.kind()
                                )));
                            }
                        }
                    }
                    Params::Fixed(params)
                }
                other => {
                    return Err(Error::TypeError(format!(
                        "func parameters must be a symbol or a compound of symbols, got {}",
                        other.kind()
                    )));
                }
            };

            Ok(Some(Expression::Callable(Callable::Closure(Rc::new(
                Closure {
                    params,
                    body: body.clone(),
                    env: env.clone(),
                },
            )))))
        }
        _ => Err(Error::arity_error(2, args.len())),
    }
}

/// Create a root environment holding every builtin function
pub fn create_global_env() -> Environment {
    let env = Environment::new();
    populate_builtins(&env);
    env
}

/// Bind every builtin function into `env`
pub(crate) fn populate_builtins(env: &Environment) {
    for builtin_op in get_builtin_ops() {
        if let OpKind::Function(func) = builtin_op.op_kind {
            let arity = builtin_op.arity;
            env.register_primitive(builtin_op.id, move |_env, args| {
                arity.validate(args.len())?;
                func(&args)
            });
        }
    }
}
