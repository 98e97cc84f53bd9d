use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::evaluator::{EvalResult, Interpreter};
use crate::source::Span;
use std::cell::RefCell;
use std::fmt; // For custom display formatting
use std::rc::Rc;

/// A runtime value produced by evaluation.
#[derive(Debug, Clone)]
pub enum Value {
    Number(f64),
    String(String),
    Boolean(bool),
    Null,
    Procedure(Procedure),
}

pub type PrimitiveFunc = fn(&mut Interpreter, Vec<Value>, Span) -> EvalResult<Value>;

#[derive(Clone)] // Need Clone for Value::Procedure
pub enum Procedure {
    Primitive(PrimitiveFunc, String), // The function pointer and its name (for display/debug)
    Closure(Rc<Closure>),
}

/// A user function together with the environment it was declared in. The
/// environment is held by reference, so the closure observes later
/// declarations made in that scope.
pub struct Closure {
    pub decl: Rc<FunctionDecl>,
    pub env: Rc<RefCell<Environment>>,
}

impl Closure {
    pub fn name(&self) -> &str {
        &self.decl.name
    }

    pub fn params(&self) -> &[String] {
        &self.decl.params
    }
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Boolean(_) => "boolean",
            Value::Null => "null",
            Value::Procedure(_) => "function",
        }
    }

    /// `null`, `false`, `0`, `NaN` and the empty string are falsy; every other
    /// value is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Boolean(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
            Value::Procedure(_) => true,
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n == f64::INFINITY {
        "Infinity".to_string()
    } else if n == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else if n == 0.0 {
        // Also catches -0
        "0".to_string()
    } else {
        n.to_string()
    }
}

// Rendering used by `print`: strings are raw, numbers have no trailing `.0`
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::String(s) => write!(f, "{}", s),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Null => write!(f, "null"),
            Value::Procedure(procedure) => match procedure {
                Procedure::Primitive(_, name) => write!(f, "<builtin {}>", name),
                Procedure::Closure(closure) => write!(f, "<function {}>", closure.name()),
            },
        }
    }
}

// Values of different kinds are never equal. Closures are the same closure
// when they come from the same declaration in the same scope; primitives
// compare by name.
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Null, Value::Null) => true,
            (Value::Procedure(a), Value::Procedure(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            // The captured environment may contain this closure, so it is not printed
            Procedure::Closure(closure) => write!(f, "Closure({})", closure.name()),
        }
    }
}

impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(_, n1), Procedure::Primitive(_, n2)) => n1 == n2,
            (Procedure::Closure(c1), Procedure::Closure(c2)) => {
                Rc::ptr_eq(&c1.decl, &c2.decl) && Rc::ptr_eq(&c1.env, &c2.env)
            }
            _ => false,
        }
    }
}
