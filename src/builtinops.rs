//! Built-in operations registry.
//!
//! One table lists everything the interpreter provides natively, together with its
//! arity:
//!
//! - **Functions** receive evaluated arguments and are bound in the root
//!   environment by [`crate::evaluator::create_global_env`], so they can be passed
//!   around, shadowed and called dynamically like any other callable.
//! - **Special forms** (`if`, `first`, `rest`, `cons`, `def`, `quote`, `func`)
//!   receive their arguments unevaluated. They are never bound in an environment;
//!   the evaluator recognizes them by the head symbol of a compound before it
//!   considers procedure application.
//!
//! ```text
//! (+ 1 2 3)          ; 6
//! (+ 1 2.5)          ; 3.5, floats are contagious
//! (= 2 2 2)          ; true
//! (do 1 2 3)         ; 3
//! ```
//!
//! Integer arithmetic detects overflow; any non-numeric argument is a type error.
//!
//! ## Adding New Operations
//!
//! 1. Implement `fn(args: &[Expression]) -> Result<Option<Expression>, Error>`
//! 2. Add it to `BUILTIN_OPS` with its identifier and arity
//! 3. Add tests covering edge cases and error conditions

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::Error;
use crate::ast::{Atom, Expression, IntegerType};
use crate::environment::Environment;
use crate::evaluator::{
    eval_cons, eval_def, eval_first, eval_func, eval_if, eval_quote, eval_rest,
};

/// Canonical signature of builtin functions
pub type BuiltinFn = fn(&[Expression]) -> Result<Option<Expression>, Error>;

/// Signature of special forms: unevaluated arguments, the environment of the
/// evaluation and the current evaluation depth
pub type SpecialFormFn = fn(&[Expression], &Environment, usize) -> Result<Option<Expression>, Error>;

/// Accepted argument counts
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Any,
}

impl Arity {
    /// Check an argument count, producing an ArityError naming the nearest valid count
    pub fn validate(&self, arg_count: usize) -> Result<(), Error> {
        match *self {
            Arity::Exact(n) if arg_count != n => Err(Error::arity_error(n, arg_count)),
            Arity::AtLeast(n) if arg_count < n => Err(Error::arity_error(n, arg_count)),
            _ => Ok(()),
        }
    }
}

/// Represents the implementation of a built-in operation
#[derive(Clone, Copy)]
pub enum OpKind {
    Function(BuiltinFn),
    SpecialForm(SpecialFormFn),
}

impl std::fmt::Debug for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OpKind::Function(_) => write!(f, "Function(<fn>)"),
            OpKind::SpecialForm(_) => write!(f, "SpecialForm(<fn>)"),
        }
    }
}

/// Definition of a built-in operation
#[derive(Debug, Clone)]
pub struct BuiltinOp {
    pub id: &'static str,
    pub op_kind: OpKind,
    pub arity: Arity,
}

impl PartialEq for BuiltinOp {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl BuiltinOp {
    pub(crate) fn is_special_form(&self) -> bool {
        matches!(self.op_kind, OpKind::SpecialForm(_))
    }
}

//
// Builtin Function Implementations
//

#[derive(Debug, Clone, Copy)]
enum Number {
    Int(IntegerType),
    Float(f64),
}

impl Number {
    fn from_arg(op: &str, arg: &Expression) -> Result<Number, Error> {
        match arg {
            Expression::Atomic(Atom::Integer(n)) => Ok(Number::Int(*n)),
            Expression::Atomic(Atom::Float(x)) => Ok(Number::Float(*x)),
            other => Err(Error::TypeError(format!(
                "'{op}' requires numeric arguments, got {}: {other}",
                other.kind()
            ))),
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(x) => x,
        }
    }

    fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    fn into_expression(self) -> Expression {
        match self {
            Number::Int(n) => Expression::Atomic(Atom::Integer(n)),
            Number::Float(x) => Expression::Atomic(Atom::Float(x)),
        }
    }
}

/// Left fold over numeric arguments; integers stay integers until a float shows up
fn fold_numbers(
    op: &str,
    start: Number,
    args: &[Expression],
    int_op: fn(IntegerType, IntegerType) -> Option<IntegerType>,
    float_op: fn(f64, f64) -> f64,
) -> Result<Option<Expression>, Error> {
    let mut acc = start;
    for arg in args {
        acc = match (acc, Number::from_arg(op, arg)?) {
            (Number::Int(a), Number::Int(b)) => Number::Int(int_op(a, b).ok_or_else(|| {
                Error::EvalError(format!("Integer overflow in '{op}'"))
            })?),
            (a, b) => Number::Float(float_op(a.as_f64(), b.as_f64())),
        };
    }
    Ok(Some(acc.into_expression()))
}

fn builtin_add(args: &[Expression]) -> Result<Option<Expression>, Error> {
    fold_numbers("+", Number::Int(0), args, IntegerType::checked_add, |a, b| a + b)
}

fn builtin_mul(args: &[Expression]) -> Result<Option<Expression>, Error> {
    fold_numbers("*", Number::Int(1), args, IntegerType::checked_mul, |a, b| a * b)
}

fn builtin_sub(args: &[Expression]) -> Result<Option<Expression>, Error> {
    match args {
        // Unary minus negates
        [only] => fold_numbers(
            "-",
            Number::Int(0),
            std::slice::from_ref(only),
            IntegerType::checked_sub,
            |a, b| a - b,
        ),
        [first, rest @ ..] => fold_numbers(
            "-",
            Number::from_arg("-", first)?,
            rest,
            IntegerType::checked_sub,
            |a, b| a - b,
        ),
        [] => Err(Error::arity_error(1, 0)),
    }
}

// Macro to generate numeric comparison functions
macro_rules! numeric_comparison {
    ($name:ident, $op_str:expr, $accepted:expr) => {
        fn $name(args: &[Expression]) -> Result<Option<Expression>, Error> {
            let numbers = args
                .iter()
                .map(|arg| Number::from_arg($op_str, arg))
                .collect::<Result<Vec<_>, Error>>()?;

            let holds = numbers
                .windows(2)
                .all(|pair| pair[0].compare(pair[1]) == Some($accepted));
            Ok(Some(Expression::Atomic(Atom::Boolean(holds))))
        }
    };
}

numeric_comparison!(builtin_eq, "=", Ordering::Equal);
numeric_comparison!(builtin_lt, "<", Ordering::Less);
numeric_comparison!(builtin_gt, ">", Ordering::Greater);

fn builtin_not(args: &[Expression]) -> Result<Option<Expression>, Error> {
    match args {
        [arg] => Ok(Some(Expression::Atomic(Atom::Boolean(!bool::try_from(arg)?)))),
        _ => Err(Error::arity_error(1, args.len())),
    }
}

fn builtin_list(args: &[Expression]) -> Result<Option<Expression>, Error> {
    Ok(Some(Expression::Compound(args.to_vec())))
}

// Arguments are already evaluated in order, so sequencing only has to pick the last one
fn builtin_do(args: &[Expression]) -> Result<Option<Expression>, Error> {
    Ok(args.last().cloned())
}

/// Global registry of all built-in operations.
static BUILTIN_OPS: LazyLock<Vec<BuiltinOp>> = LazyLock::new(|| {
    vec![
        // Arithmetic operations
        BuiltinOp {
            id: "+",
            op_kind: OpKind::Function(builtin_add),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "-",
            op_kind: OpKind::Function(builtin_sub),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "*",
            op_kind: OpKind::Function(builtin_mul),
            arity: Arity::Any,
        },
        // Comparison operations
        BuiltinOp {
            id: "=",
            op_kind: OpKind::Function(builtin_eq),
            arity: Arity::AtLeast(1),
        },
        BuiltinOp {
            id: "<",
            op_kind: OpKind::Function(builtin_lt),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: ">",
            op_kind: OpKind::Function(builtin_gt),
            arity: Arity::Exact(2),
        },
        // Logical operations
        BuiltinOp {
            id: "not",
            op_kind: OpKind::Function(builtin_not),
            arity: Arity::Exact(1),
        },
        // Sequencing and list construction
        BuiltinOp {
            id: "do",
            op_kind: OpKind::Function(builtin_do),
            arity: Arity::Any,
        },
        BuiltinOp {
            id: "list",
            op_kind: OpKind::Function(builtin_list),
            arity: Arity::Any,
        },
        // Special forms
        BuiltinOp {
            id: "if",
            op_kind: OpKind::SpecialForm(eval_if),
            arity: Arity::Exact(3),
        },
        BuiltinOp {
            id: "first",
            op_kind: OpKind::SpecialForm(eval_first),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "rest",
            op_kind: OpKind::SpecialForm(eval_rest),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "cons",
            op_kind: OpKind::SpecialForm(eval_cons),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "def",
            op_kind: OpKind::SpecialForm(eval_def),
            arity: Arity::Exact(2),
        },
        BuiltinOp {
            id: "quote",
            op_kind: OpKind::SpecialForm(eval_quote),
            arity: Arity::Exact(1),
        },
        BuiltinOp {
            id: "func",
            op_kind: OpKind::SpecialForm(eval_func),
            arity: Arity::Exact(2),
        },
    ]
});

static BUILTIN_BY_ID: LazyLock<HashMap<&'static str, &'static BuiltinOp>> = LazyLock::new(|| {
    let ops: &'static [BuiltinOp] = BUILTIN_OPS.as_slice();
    ops.iter().map(|op| (op.id, op)).collect()
});

/// Get all builtin operations
pub(crate) fn get_builtin_ops() -> &'static [BuiltinOp] {
    BUILTIN_OPS.as_slice()
}

/// Find a builtin operation by identifier
pub(crate) fn find_op(id: &str) -> Option<&'static BuiltinOp> {
    BUILTIN_BY_ID.get(id).copied()
}

/// Find a special form by its head symbol
pub(crate) fn find_special_form(id: &str) -> Option<&'static BuiltinOp> {
    find_op(id).filter(|op| op.is_special_form())
}
