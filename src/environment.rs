use crate::ast::FunctionDecl;
use crate::source::Span;
use crate::types::{Closure, PrimitiveFunc, Procedure, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("Undefined name: '{0}'")]
    UndefinedName(String, Span), // Name, span where lookup happened
}

#[derive(Debug)]
enum Binding {
    Value(Value),
    // A function that captured this very frame. Only the declaration is kept;
    // lookups rebuild the closure around the frame, so the frame never holds
    // a strong reference to itself.
    Function(Rc<FunctionDecl>),
}

/// One lexical scope. Scopes are shared as `Rc<RefCell<Environment>>`: a
/// child keeps its parent alive, and a closure keeps the scope it was
/// declared in alive.
#[derive(Debug)]
pub struct Environment {
    this: Weak<RefCell<Environment>>,
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Binding>,
}

impl Environment {
    fn with_outer(outer: Option<Rc<RefCell<Environment>>>) -> Rc<RefCell<Self>> {
        Rc::new_cyclic(|this| {
            RefCell::new(Environment {
                this: this.clone(),
                outer,
                bindings: HashMap::new(),
            })
        })
    }

    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Self::with_outer(None)
    }

    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new(); // Create empty global env
        env_ptr
            .borrow_mut()
            .add_primitive("print", crate::primitives::prim_print);
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Self::with_outer(Some(outer_env))
    }

    /// Defines a name in the *current* environment frame.
    /// Replaces the value if the name already exists in this frame; outer
    /// frames are never touched.
    pub fn define(&mut self, name: String, value: Value) {
        let binding = match value {
            Value::Procedure(Procedure::Closure(ref closure))
                if std::ptr::eq(Rc::as_ptr(&closure.env), self.this.as_ptr()) =>
            {
                Binding::Function(closure.decl.clone())
            }
            value => Binding::Value(value),
        };
        self.bindings.insert(name, binding);
    }

    /// Looks up a name's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    /// `lookup_span` is the location where the name was referenced, used for error reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Value, EnvError> {
        if let Some(binding) = self.bindings.get(name) {
            Ok(self.resolve(binding))
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name, lookup_span),
                None => Err(EnvError::UndefinedName(name.to_string(), lookup_span)),
            }
        }
    }

    fn resolve(&self, binding: &Binding) -> Value {
        match binding {
            Binding::Value(value) => value.clone(),
            // A frame that is being read is owned by at least one `Rc`
            Binding::Function(decl) => match self.this.upgrade() {
                Some(env) => Value::Procedure(Procedure::Closure(Rc::new(Closure {
                    decl: decl.clone(),
                    env,
                }))),
                None => Value::Null,
            },
        }
    }

    /// Drops every binding in this frame.
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Called when `scope` has finished executing. Nothing outside a scope
    /// can bind into it, so once it ends it is only reachable through
    /// `survivor`, the value leaving it. If that value cannot reach the
    /// scope, its bindings are dropped, which breaks any cycle between the
    /// scope and closures stored in it.
    pub fn release(scope: &Rc<RefCell<Environment>>, survivor: Option<&Value>) {
        if !survivor.is_some_and(|value| reaches(value, scope)) {
            scope.borrow_mut().clear();
        }
    }

    /// Helper to add a primitive procedure to the environment.
    fn add_primitive(&mut self, name: &str, func: PrimitiveFunc) {
        let value = Value::Procedure(Procedure::Primitive(func, name.to_string()));
        self.define(name.to_string(), value);
    }

    fn add_identifiers(&self, mut identifiers: HashSet<String>) -> HashSet<String> {
        for identifier in self.bindings.keys() {
            identifiers.insert(identifier.to_string());
        }
        match self.outer {
            Some(ref outer_env_ptr) => outer_env_ptr.borrow().add_identifiers(identifiers),
            None => identifiers,
        }
    }

    /// Gets every name visible from this environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        self.add_identifiers(HashSet::new())
    }
}

// Whether `target` is reachable from `value` through captured scopes, their
// outer chains and the closures bound in them.
fn reaches(value: &Value, target: &Rc<RefCell<Environment>>) -> bool {
    let mut pending = match value {
        Value::Procedure(Procedure::Closure(closure)) => vec![closure.env.clone()],
        _ => return false,
    };
    let mut seen = HashSet::new();
    while let Some(env) = pending.pop() {
        if Rc::ptr_eq(&env, target) {
            return true;
        }
        if !seen.insert(Rc::as_ptr(&env)) {
            continue;
        }
        let frame = env.borrow();
        if let Some(outer) = &frame.outer {
            pending.push(outer.clone());
        }
        for binding in frame.bindings.values() {
            if let Binding::Value(Value::Procedure(Procedure::Closure(closure))) = binding {
                pending.push(closure.env.clone());
            }
        }
    }
    false
}
