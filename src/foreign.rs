//! Foreign function bridge.
//!
//! When a symbol is not bound anywhere in the environment chain, the root
//! environment asks a [`ForeignRegistry`] for `"<namespace>.<name>"`, split on the
//! first `.`. A hit is wrapped as a primitive callable that marshals atom
//! arguments into [`ForeignValue`]s, invokes the foreign function and marshals the
//! results back:
//!
//! - no result yields no value,
//! - exactly one result is returned directly,
//! - several results become a compound.
//!
//! Values of any other kind cannot cross the bridge. Passing a compound, symbol or
//! callable to a foreign function, or receiving [`ForeignValue::Unsupported`] back,
//! panics: the host contract has been broken and there is no sensible value to
//! continue with.
//!
//! How a namespace gets populated (for instance by generating wrappers for an
//! external package) is up to the registry implementation; the interpreter only
//! reads from it.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::Error;
use crate::ast::{Atom, Callable, Expression};
use crate::environment::Environment;

/// A value in the foreign calling convention
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignValue {
    Int(i64),
    Bool(bool),
    Float(f64),
    Str(String),
    /// A host value with no atom counterpart, carrying the name of its kind
    Unsupported(String),
}

/// Signature of a foreign function
pub type ForeignFn = dyn Fn(Vec<ForeignValue>) -> Vec<ForeignValue>;

/// Read interface of the namespace → exported function registry.
pub trait ForeignRegistry {
    fn lookup(&self, namespace: &str, name: &str) -> Option<Rc<ForeignFn>>;
}

/// Exported functions of one namespace
#[derive(Default)]
struct Package {
    exports: HashMap<String, Rc<ForeignFn>>,
}

/// In-memory registry keyed by namespace, then by exported name.
///
/// ```
/// use minilisp::foreign::{ForeignValue, PackageRegistry};
///
/// let mut registry = PackageRegistry::new();
/// registry.register("strings", "len", |args| match args.as_slice() {
///     [ForeignValue::Str(s)] => vec![ForeignValue::Int(s.len() as i64)],
///     _ => vec![],
/// });
/// assert!(registry.contains("strings", "len"));
/// ```
#[derive(Default)]
pub struct PackageRegistry {
    packages: HashMap<String, Rc<RefCell<Package>>>,
}

impl PackageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export `func` as `namespace.name`, creating the namespace on first use.
    pub fn register<F>(&mut self, namespace: &str, name: &str, func: F)
    where
        F: Fn(Vec<ForeignValue>) -> Vec<ForeignValue> + 'static,
    {
        self.packages
            .entry(namespace.to_owned())
            .or_default()
            .borrow_mut()
            .exports
            .insert(name.to_owned(), Rc::new(func));
    }

    /// Make an existing namespace reachable under a second, usually shorter, name.
    /// Both names share one package, so later registrations show up under both.
    /// Returns false if `namespace` does not exist.
    pub fn alias(&mut self, alias: &str, namespace: &str) -> bool {
        match self.packages.get(namespace).cloned() {
            Some(package) => {
                self.packages.insert(alias.to_owned(), package);
                true
            }
            None => false,
        }
    }

    /// Whether `namespace.name` is registered, directly or through an alias
    pub fn contains(&self, namespace: &str, name: &str) -> bool {
        self.lookup(namespace, name).is_some()
    }
}

impl ForeignRegistry for PackageRegistry {
    fn lookup(&self, namespace: &str, name: &str) -> Option<Rc<ForeignFn>> {
        self.packages
            .get(namespace)
            .and_then(|package| package.borrow().exports.get(name).cloned())
    }
}

/// Resolve a namespace-qualified symbol through `registry`.
///
/// Symbols without a `.` never match.
pub(crate) fn resolve(registry: &dyn ForeignRegistry, symbol: &str) -> Option<Expression> {
    let (namespace, name) = symbol.split_once('.')?;
    let func = registry.lookup(namespace, name)?;
    trace!(symbol, "resolved through foreign bridge");

    let id = symbol.to_owned();
    let wrapped = move |_env: &Environment,
                        args: Vec<Expression>|
          -> Result<Option<Expression>, Error> {
        let foreign_args = args.iter().map(to_foreign).collect();
        let mut results: Vec<Expression> = func(foreign_args)
            .into_iter()
            .map(|result| from_foreign(&id, result))
            .collect();

        Ok(match results.len() {
            0 => None,
            1 => results.pop(),
            _ => Some(Expression::Compound(results)),
        })
    };

    Some(Expression::Callable(Callable::Primitive {
        id: symbol.to_owned(),
        func: Rc::new(wrapped),
    }))
}

fn to_foreign(arg: &Expression) -> ForeignValue {
    match arg {
        Expression::Atomic(Atom::Integer(n)) => ForeignValue::Int(*n),
        Expression::Atomic(Atom::Boolean(b)) => ForeignValue::Bool(*b),
        Expression::Atomic(Atom::Float(x)) => ForeignValue::Float(*x),
        Expression::Atomic(Atom::Str(s)) => ForeignValue::Str(s.clone()),
        other => panic!(
            "{other} has an unsupported type for a foreign argument: {}",
            other.kind()
        ),
    }
}

fn from_foreign(symbol: &str, value: ForeignValue) -> Expression {
    match value {
        ForeignValue::Int(n) => Expression::Atomic(Atom::Integer(n)),
        ForeignValue::Bool(b) => Expression::Atomic(Atom::Boolean(b)),
        ForeignValue::Float(x) => Expression::Atomic(Atom::Float(x)),
        ForeignValue::Str(s) => Expression::Atomic(Atom::Str(s)),
        ForeignValue::Unsupported(kind) => {
            panic!("{symbol} returned a value with an unsupported type: {kind}")
        }
    }
}
