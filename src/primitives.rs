use std::cmp::Ordering;

use crate::ast::{BinaryOp, UnaryOp};
use crate::evaluator::{EvalError, EvalResult, Interpreter};
use crate::source::Span;
use crate::types::Value;

// Extracts a number from a Value or returns a TypeMismatch error
macro_rules! expect_number {
    ($value:expr, $span:expr, $operator:expr) => {
        match $value {
            Value::Number(n) => *n,
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: format!("a number for '{}'", $operator),
                    found: other.type_name().to_string(),
                    span: $span,
                });
            }
        }
    };
}

/// The `print` builtin: renders its arguments separated by a space and emits
/// them as one output line.
pub fn prim_print(interpreter: &mut Interpreter, args: Vec<Value>, _span: Span) -> EvalResult<Value> {
    let line = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    interpreter.emit(line);
    Ok(Value::Null)
}

/// Applies a binary operator to two already evaluated operands.
pub fn apply_binary(op: BinaryOp, left: Value, right: Value, span: Span) -> EvalResult<Value> {
    match op {
        BinaryOp::Add => prim_add(left, right, span),
        BinaryOp::Subtract => prim_arithmetic(&left, &right, span, op, |a, b| a - b),
        BinaryOp::Multiply => prim_arithmetic(&left, &right, span, op, |a, b| a * b),
        // IEEE semantics: x / 0 is infinite, x % 0 is NaN
        BinaryOp::Divide => prim_arithmetic(&left, &right, span, op, |a, b| a / b),
        BinaryOp::Modulo => prim_arithmetic(&left, &right, span, op, |a, b| a % b),
        BinaryOp::Equal => Ok(Value::Boolean(left == right)),
        BinaryOp::NotEqual => Ok(Value::Boolean(left != right)),
        BinaryOp::Greater => prim_compare(&left, &right, span, op, Ordering::is_gt),
        BinaryOp::Less => prim_compare(&left, &right, span, op, Ordering::is_lt),
        BinaryOp::GreaterEqual => prim_compare(&left, &right, span, op, Ordering::is_ge),
        BinaryOp::LessEqual => prim_compare(&left, &right, span, op, Ordering::is_le),
    }
}

pub fn apply_unary(op: UnaryOp, operand: Value, span: Span) -> EvalResult<Value> {
    match op {
        UnaryOp::Negate => Ok(Value::Number(-expect_number!(&operand, span, "-"))),
        UnaryOp::Not => Ok(Value::Boolean(!operand.is_truthy())),
    }
}

// Numbers add; if either side is a string both sides are rendered and joined.
fn prim_add(left: Value, right: Value, span: Span) -> EvalResult<Value> {
    match (&left, &right) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
        (Value::String(_), _) | (_, Value::String(_)) => {
            Ok(Value::String(format!("{}{}", left, right)))
        }
        _ => Err(EvalError::TypeMismatch {
            expected: "numbers or strings for '+'".to_string(),
            found: format!("{} and {}", left.type_name(), right.type_name()),
            span,
        }),
    }
}

fn prim_arithmetic<F: Fn(f64, f64) -> f64>(
    left: &Value,
    right: &Value,
    span: Span,
    op: BinaryOp,
    func: F,
) -> EvalResult<Value> {
    let a = expect_number!(left, span, op.symbol());
    let b = expect_number!(right, span, op.symbol());
    Ok(Value::Number(func(a, b)))
}

// Two numbers or two strings; comparisons involving NaN are false.
fn prim_compare(
    left: &Value,
    right: &Value,
    span: Span,
    op: BinaryOp,
    test: fn(Ordering) -> bool,
) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => {
            return Err(EvalError::TypeMismatch {
                expected: format!("two numbers or two strings for '{}'", op.symbol()),
                found: format!("{} and {}", left.type_name(), right.type_name()),
                span,
            });
        }
    };
    Ok(Value::Boolean(ordering.is_some_and(test)))
}
