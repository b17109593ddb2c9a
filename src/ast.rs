//! This module defines the expression representation shared by code and data.
//! [`Atom`] is the closed set of indivisible literals and symbols, and
//! [`Expression`] is the single recursive type the reader produces, the expander
//! rewrites and the evaluator reduces: an atom, a compound (ordered list) or a
//! callable. Ergonomic helpers such as [`val`], [`sym`] and [`nil`] build trees
//! in code and tests, and the `From` impls below let Rust literals, arrays and
//! vectors turn into expressions directly.

use std::rc::Rc;

use crate::Error;
use crate::environment::Environment;

/// Type alias for integer atoms
pub(crate) type IntegerType = i64;

/// Signature of native primitives.
///
/// A primitive receives the environment of the call site and the evaluated
/// arguments, and may produce no value at all.
pub type PrimitiveFn = dyn Fn(&Environment, Vec<Expression>) -> Result<Option<Expression>, Error>;

/// An indivisible literal or identifier. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub enum Atom {
    Integer(IntegerType),
    Boolean(bool),
    Float(f64),
    Str(String),
    Symbol(String),
}

impl Atom {
    /// Human readable name of the atom kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Atom::Integer(_) => "integer",
            Atom::Boolean(_) => "boolean",
            Atom::Float(_) => "float",
            Atom::Str(_) => "string",
            Atom::Symbol(_) => "symbol",
        }
    }
}

/// Parameter specification of a closure
#[derive(Debug, Clone, PartialEq)]
pub enum Params {
    /// `(func args body)`: every call-time argument is bound as one compound
    Variadic(String),
    /// `(func (a b) body)`: positional binding, argument count must match
    Fixed(Vec<String>),
}

/// A user-defined procedure: parameters, body and the environment it was created in.
pub struct Closure {
    pub params: Params,
    pub body: Expression,
    pub env: Environment,
}

/// An opaque procedure value
#[derive(Clone)]
pub enum Callable {
    /// Native function; compared by id, not by function pointer
    Primitive { id: String, func: Rc<PrimitiveFn> },
    /// Closure shared between every copy of the value
    Closure(Rc<Closure>),
}

/// Core expression type in the interpreter
///
/// To build a tree, use the helper functions:
/// - `val(42)` for atoms, `sym("name")` for symbols, `nil()` for the empty compound
/// - `val([1, 2, 3])` for homogeneous compounds
/// - `val(vec![sym("op"), val(42)])` for mixed compounds
#[derive(Clone)]
pub enum Expression {
    Atomic(Atom),
    /// Ordered sequence of children; the empty compound is the canonical empty list
    Compound(Vec<Expression>),
    Callable(Callable),
}

impl Expression {
    /// Name of the symbol if this expression is a symbol atom
    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Expression::Atomic(Atom::Symbol(name)) => Some(name),
            _ => None,
        }
    }

    /// Check if this expression is the empty compound
    pub fn is_nil(&self) -> bool {
        matches!(self, Expression::Compound(children) if children.is_empty())
    }

    /// Human readable name of the expression kind, used in error messages
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Atomic(atom) => atom.kind(),
            Expression::Compound(_) => "compound",
            Expression::Callable(_) => "callable",
        }
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Atomic(atom) => write!(f, "{atom:?}"),
            Expression::Compound(children) => {
                write!(f, "Compound(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{child:?}")?;
                }
                write!(f, ")")
            }
            Expression::Callable(Callable::Primitive { id, .. }) => write!(f, "Primitive({id})"),
            // The captured environment is left out: it may contain this very closure
            Expression::Callable(Callable::Closure(closure)) => write!(
                f,
                "Closure(params={:?}, body={:?})",
                closure.params, closure.body
            ),
        }
    }
}

/// Printed form of an expression.
///
/// Atoms and compounds print in the syntax the reader accepts. Values with no
/// literal syntax print in the `#<...>` notation, which the tokenizer rejects:
/// callables, and floats that are NaN or infinite (`#<float:nan>`,
/// `#<float:+inf>`, `#<float:-inf>`).
impl std::fmt::Display for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expression::Atomic(Atom::Integer(n)) => write!(f, "{n}"),
            Expression::Atomic(Atom::Float(x)) if x.is_nan() => write!(f, "#<float:nan>"),
            Expression::Atomic(Atom::Float(x)) if x.is_infinite() => {
                let sign = if x.is_sign_negative() { '-' } else { '+' };
                write!(f, "#<float:{sign}inf>")
            }
            // Debug formatting keeps the decimal point so floats read back as floats
            Expression::Atomic(Atom::Float(x)) => write!(f, "{x:?}"),
            Expression::Atomic(Atom::Boolean(b)) => write!(f, "{b}"),
            Expression::Atomic(Atom::Symbol(s)) => write!(f, "{s}"),
            Expression::Atomic(Atom::Str(s)) => {
                write!(f, "\"")?;
                for ch in s.chars() {
                    match ch {
                        '"' => write!(f, "\\\"")?,
                        '\\' => write!(f, "\\\\")?,
                        '\n' => write!(f, "\\n")?,
                        '\t' => write!(f, "\\t")?,
                        '\r' => write!(f, "\\r")?,
                        c => write!(f, "{c}")?,
                    }
                }
                write!(f, "\"")
            }
            Expression::Compound(children) => {
                write!(f, "(")?;
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{child}")?;
                }
                write!(f, ")")
            }
            Expression::Callable(Callable::Primitive { id, .. }) => write!(f, "#<primitive:{id}>"),
            Expression::Callable(Callable::Closure(_)) => write!(f, "#<closure>"),
        }
    }
}

impl PartialEq for Expression {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Expression::Atomic(a), Expression::Atomic(b)) => a == b,
            (Expression::Compound(a), Expression::Compound(b)) => a == b,
            (
                Expression::Callable(Callable::Primitive { id: id1, .. }),
                Expression::Callable(Callable::Primitive { id: id2, .. }),
            ) => id1 == id2,
            (
                Expression::Callable(Callable::Closure(c1)),
                Expression::Callable(Callable::Closure(c2)),
            ) => Rc::ptr_eq(c1, c2),
            _ => false,
        }
    }
}

impl From<Atom> for Expression {
    fn from(atom: Atom) -> Self {
        Expression::Atomic(atom)
    }
}

impl From<&str> for Expression {
    fn from(s: &str) -> Self {
        Expression::Atomic(Atom::Str(s.to_owned()))
    }
}

impl From<String> for Expression {
    fn from(s: String) -> Self {
        Expression::Atomic(Atom::Str(s))
    }
}

impl From<bool> for Expression {
    fn from(b: bool) -> Self {
        Expression::Atomic(Atom::Boolean(b))
    }
}

impl From<f64> for Expression {
    fn from(x: f64) -> Self {
        Expression::Atomic(Atom::Float(x))
    }
}

macro_rules! impl_from_integer {
    ($int_type:ty) => {
        impl From<$int_type> for Expression {
            fn from(n: $int_type) -> Self {
                Expression::Atomic(Atom::Integer(n as IntegerType))
            }
        }
    };
}

impl_from_integer!(i8);
impl_from_integer!(i16);
impl_from_integer!(i32);
impl_from_integer!(IntegerType);
impl_from_integer!(u8);
impl_from_integer!(u16);
impl_from_integer!(u32);

impl<T: Into<Expression>> From<Vec<T>> for Expression {
    fn from(v: Vec<T>) -> Self {
        Expression::Compound(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T: Into<Expression>, const N: usize> From<[T; N]> for Expression {
    fn from(arr: [T; N]) -> Self {
        Expression::Compound(arr.into_iter().map(|x| x.into()).collect())
    }
}

/// Strict boolean view used by `if` and `not`: only the boolean atoms convert.
impl TryFrom<&Expression> for bool {
    type Error = Error;

    fn try_from(expr: &Expression) -> Result<bool, Error> {
        match expr {
            Expression::Atomic(Atom::Boolean(b)) => Ok(*b),
            other => Err(Error::TypeError(format!(
                "expected a boolean (no truthiness), got {}",
                other.kind()
            ))),
        }
    }
}

/// Helper for creating symbols, handy in mixed compounds
pub fn sym<S: AsRef<str>>(name: S) -> Expression {
    Expression::Atomic(Atom::Symbol(name.as_ref().to_owned()))
}

/// Helper for creating expressions from anything convertible
pub fn val<T: Into<Expression>>(value: T) -> Expression {
    value.into()
}

/// Helper for creating the empty compound
pub fn nil() -> Expression {
    Expression::Compound(vec![])
}
