use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::Error;
use crate::ast::{Callable, Expression};
use crate::foreign::{self, ForeignRegistry};

/// Environment for symbol bindings.
///
/// A cheap handle onto a shared scope: cloning an `Environment` yields another
/// handle to the same bindings, which is how closures capture the environment they
/// were created in. Each scope links to its parent; the root scope may carry a
/// foreign registry consulted when a symbol is bound nowhere in the chain.
///
/// A closure defined into the scope it captures keeps that scope alive through a
/// reference cycle. Scopes are small and created per call, so the leak is accepted.
#[derive(Clone, Default)]
pub struct Environment(Rc<Scope>);

#[derive(Default)]
struct Scope {
    bindings: RefCell<HashMap<String, Expression>>,
    parent: Option<Environment>,
    bridge: Option<Rc<dyn ForeignRegistry>>,
}

impl Environment {
    /// Create an empty root environment without a foreign bridge
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty root environment whose unresolved lookups fall through to `registry`
    pub fn with_bridge(registry: Rc<dyn ForeignRegistry>) -> Self {
        Environment(Rc::new(Scope {
            bridge: Some(registry),
            ..Scope::default()
        }))
    }

    /// Create an empty child scope of `parent`
    pub fn with_parent(parent: &Environment) -> Self {
        Environment(Rc::new(Scope {
            parent: Some(parent.clone()),
            ..Scope::default()
        }))
    }

    /// Bind `name` in this scope, replacing any earlier binding in the same scope.
    /// Parent scopes are never touched.
    pub fn define(&self, name: impl Into<String>, value: Expression) {
        self.0.bindings.borrow_mut().insert(name.into(), value);
    }

    /// Look `name` up in this scope, then its ancestors, then the root's foreign bridge.
    pub fn get(&self, name: &str) -> Option<Expression> {
        if let Some(value) = self.0.bindings.borrow().get(name) {
            return Some(value.clone());
        }
        match &self.0.parent {
            Some(parent) => parent.get(name),
            None => self
                .0
                .bridge
                .as_ref()
                .and_then(|registry| foreign::resolve(registry.as_ref(), name)),
        }
    }

    /// Like [`Environment::get`], failing with `UnboundSymbol` when nothing resolves
    pub fn lookup(&self, name: &str) -> Result<Expression, Error> {
        self.get(name)
            .ok_or_else(|| Error::UnboundSymbol(name.to_owned()))
    }

    /// Whether `name` is bound in this very scope
    pub fn is_bound_locally(&self, name: &str) -> bool {
        self.0.bindings.borrow().contains_key(name)
    }

    /// Whether both handles refer to the same scope
    pub fn ptr_eq(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Register a custom primitive implemented by a plain function over evaluated arguments.
    ///
    /// # Example
    /// ```
    /// use minilisp::Error;
    /// use minilisp::ast::Expression;
    /// use minilisp::evaluator::create_global_env;
    ///
    /// fn answer(_args: &[Expression]) -> Result<Option<Expression>, Error> {
    ///     Ok(Some(42.into()))
    /// }
    ///
    /// let env = create_global_env();
    /// env.register_builtin_function("answer", answer);
    /// // Now (answer) can be called from evaluated expressions
    /// ```
    pub fn register_builtin_function(
        &self,
        name: &str,
        func: fn(&[Expression]) -> Result<Option<Expression>, Error>,
    ) {
        self.register_primitive(name, move |_env, args| func(&args));
    }

    /// Register a custom primitive that also sees the environment of its call site.
    pub fn register_primitive<F>(&self, name: &str, func: F)
    where
        F: Fn(&Environment, Vec<Expression>) -> Result<Option<Expression>, Error> + 'static,
    {
        self.define(
            name,
            Expression::Callable(Callable::Primitive {
                id: name.to_owned(),
                func: Rc::new(func),
            }),
        );
    }

    /// Get all bindings in this environment and its parents.
    /// Returns a Vec of (name, value) pairs sorted by name; foreign exports are not listed.
    pub fn get_all_bindings(&self) -> Vec<(String, Expression)> {
        let mut bindings = HashMap::new();

        if let Some(parent) = &self.0.parent {
            for (name, value) in parent.get_all_bindings() {
                bindings.insert(name, value);
            }
        }

        for (name, value) in self.0.bindings.borrow().iter() {
            bindings.insert(name.clone(), value.clone());
        }

        let mut result: Vec<_> = bindings.into_iter().collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}

impl PartialEq for Environment {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl std::fmt::Debug for Environment {
    // Only names: values may be closures that capture this very scope
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<String> = self.0.bindings.borrow().keys().cloned().collect();
        names.sort();
        f.debug_struct("Environment")
            .field("bindings", &names)
            .field("parent", &self.0.parent)
            .field("bridge", &self.0.bridge.is_some())
            .finish()
    }
}
