use crate::ast::{Block, Expr, ExprKind, Literal, LogicalOp, Program, Stmt, StmtKind};
use crate::environment::{EnvError, Environment};
use crate::primitives;
use crate::source::Span;
use crate::types::{Closure, Procedure, Value};
use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("{0}")]
    EnvError(#[from] EnvError), // Errors from environment lookup
    #[error("Type Error: Expected {expected}, but got {found}")]
    TypeMismatch {
        expected: String,
        found: String,
        span: Span,
    },
    #[error("Type Error: Expected a procedure, but got: {0}")]
    NotAProcedure(String, Span), // Rendered value that was called
    #[error("Arity Error: '{name}' expects {expected} arguments, got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("Recursion Error: maximum call depth of {limit} exceeded")]
    CallDepthExceeded { limit: usize, span: Span },
}

impl EvalError {
    /// The error category reported to the user.
    pub fn kind(&self) -> &'static str {
        match self {
            EvalError::EnvError(EnvError::UndefinedName(..)) => "UndefinedNameError",
            EvalError::TypeMismatch { .. } | EvalError::NotAProcedure(..) => "TypeError",
            EvalError::ArityMismatch { .. } => "ArityError",
            EvalError::CallDepthExceeded { .. } => "RecursionError",
        }
    }

    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(EnvError::UndefinedName(_, span))
            | EvalError::TypeMismatch { span, .. }
            | EvalError::NotAProcedure(_, span)
            | EvalError::ArityMismatch { span, .. }
            | EvalError::CallDepthExceeded { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Value> = Result<T, EvalError>;

// Recursion goes through `stacker`: when less than `RED_ZONE` bytes of stack
// remain, evaluation continues on a freshly allocated `STACK_SEGMENT`.
const RED_ZONE: usize = 128 * 1024;
const STACK_SEGMENT: usize = 2 * 1024 * 1024;

/// Outcome of executing a statement. `Return` carries the value of a
/// `return` statement up to the call that consumes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Normal(Value),
    Return(Value),
}

#[derive(Debug, Clone)]
pub struct Options {
    /// Reject calls whose argument count differs from the parameter count.
    /// When off, missing arguments are `null` and extra ones are ignored.
    pub strict_arity: bool,
    pub max_call_depth: usize,
    /// Write printed lines to stdout instead of collecting them.
    pub echo: bool,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            strict_arity: false,
            max_call_depth: 256,
            echo: false,
        }
    }
}

/// A tree-walking interpreter. Each instance owns its global environment, so
/// state carries over between `run` calls on the same instance (as in the
/// REPL) but never between instances.
pub struct Interpreter {
    globals: Rc<RefCell<Environment>>,
    options: Options,
    output: Vec<String>,
    depth: usize,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_options(Options::default())
    }

    pub fn with_options(options: Options) -> Self {
        Interpreter {
            globals: Environment::new_global_populated(),
            options,
            output: Vec::new(),
            depth: 0,
        }
    }

    pub fn globals(&self) -> Rc<RefCell<Environment>> {
        self.globals.clone()
    }

    /// Lines printed so far (empty when echoing to stdout).
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<String> {
        std::mem::take(&mut self.output)
    }

    pub(crate) fn emit(&mut self, line: String) {
        if self.options.echo {
            println!("{}", line);
        } else {
            self.output.push(line);
        }
    }

    /// Runs a program in the global environment and returns the value of its
    /// last statement, or the value of a top-level `return`.
    pub fn run(&mut self, program: &Program) -> EvalResult {
        let globals = self.globals.clone();
        match self.execute_statements(&program.statements, &globals)? {
            Flow::Normal(value) | Flow::Return(value) => Ok(value),
        }
    }

    // Runs statements in `env`, stopping at the first `Return`. The normal
    // result is the last statement's value.
    fn execute_statements(
        &mut self,
        statements: &[Stmt],
        env: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Flow> {
        let mut last = Value::Null;
        for statement in statements {
            match self.execute(statement, env)? {
                Flow::Normal(value) => last = value,
                flow @ Flow::Return(_) => return Ok(flow),
            }
        }
        Ok(Flow::Normal(last))
    }

    /// Evaluates a block in a fresh child scope of `env`.
    pub fn execute_block(&mut self, block: &Block, env: &Rc<RefCell<Environment>>) -> EvalResult<Flow> {
        let scope = Environment::new_enclosed(env.clone());
        let flow = self.execute_statements(&block.statements, &scope);
        Environment::release(&scope, flow_value(&flow));
        flow
    }

    pub fn execute(&mut self, statement: &Stmt, env: &Rc<RefCell<Environment>>) -> EvalResult<Flow> {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || self.execute_stmt(statement, env))
    }

    fn execute_stmt(&mut self, statement: &Stmt, env: &Rc<RefCell<Environment>>) -> EvalResult<Flow> {
        match &statement.kind {
            StmtKind::VariableDeclaration { name, initializer } => {
                let value = match initializer {
                    Some(init) => self.evaluate(init, env)?,
                    None => Value::Null,
                };
                env.borrow_mut().define(name.clone(), value.clone());
                Ok(Flow::Normal(value))
            }
            StmtKind::Print(expr) => {
                let value = self.evaluate(expr, env)?;
                primitives::prim_print(self, vec![value], statement.span)?;
                Ok(Flow::Normal(Value::Null))
            }
            StmtKind::Block(block) => self.execute_block(block, env),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => {
                if self.evaluate(test, env)?.is_truthy() {
                    self.execute_block(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.execute_block(alternate, env)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            StmtKind::While { test, body } => {
                // One scope for the whole loop: declarations made by the body
                // persist across iterations and are visible to the test.
                let loop_scope = Environment::new_enclosed(env.clone());
                let flow = self.execute_loop(test, body, &loop_scope);
                Environment::release(&loop_scope, flow_value(&flow));
                flow
            }
            StmtKind::FunctionDeclaration(decl) => {
                let closure = Value::Procedure(Procedure::Closure(Rc::new(Closure {
                    decl: decl.clone(),
                    env: env.clone(),
                })));
                env.borrow_mut().define(decl.name.clone(), closure.clone());
                Ok(Flow::Normal(closure))
            }
            StmtKind::Return(expr) => Ok(Flow::Return(self.evaluate(expr, env)?)),
            StmtKind::Expression(expr) => Ok(Flow::Normal(self.evaluate(expr, env)?)),
        }
    }

    fn execute_loop(
        &mut self,
        test: &Expr,
        body: &Block,
        loop_scope: &Rc<RefCell<Environment>>,
    ) -> EvalResult<Flow> {
        while self.evaluate(test, loop_scope)?.is_truthy() {
            if let flow @ Flow::Return(_) = self.execute_statements(&body.statements, loop_scope)? {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal(Value::Null))
    }

    pub fn evaluate(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> EvalResult {
        stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || self.evaluate_expr(expr, env))
    }

    fn evaluate_expr(&mut self, expr: &Expr, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match &expr.kind {
            ExprKind::Literal(literal) => Ok(match literal {
                Literal::Number(n) => Value::Number(*n),
                Literal::String(s) => Value::String(s.clone()),
                Literal::Boolean(b) => Value::Boolean(*b),
            }),
            ExprKind::Identifier(name) => Ok(env.borrow().get(name, expr.span)?),
            ExprKind::Binary { op, left, right } => {
                let left = self.evaluate(left, env)?;
                let right = self.evaluate(right, env)?;
                primitives::apply_binary(*op, left, right, expr.span)
            }
            ExprKind::Logical { op, left, right } => {
                let left = self.evaluate(left, env)?;
                let decided = match op {
                    LogicalOp::Or => left.is_truthy(),
                    LogicalOp::And => !left.is_truthy(),
                };
                if decided {
                    Ok(left)
                } else {
                    self.evaluate(right, env)
                }
            }
            ExprKind::Unary { op, operand } => {
                let operand = self.evaluate(operand, env)?;
                primitives::apply_unary(*op, operand, expr.span)
            }
            ExprKind::Call { callee, arguments } => {
                let callee = self.evaluate(callee, env)?;
                let mut evaluated_args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated_args.push(self.evaluate(argument, env)?);
                }
                self.call(callee, evaluated_args, expr.span)
            }
        }
    }

    /// Applies a procedure value to already evaluated arguments.
    pub fn call(&mut self, callee: Value, args: Vec<Value>, span: Span) -> EvalResult {
        let procedure = match callee {
            Value::Procedure(procedure) => procedure,
            other => return Err(EvalError::NotAProcedure(other.to_string(), span)),
        };

        match procedure {
            Procedure::Primitive(func, _) => func(self, args, span),
            Procedure::Closure(closure) => {
                if self.options.strict_arity && args.len() != closure.params().len() {
                    return Err(EvalError::ArityMismatch {
                        name: closure.name().to_string(),
                        expected: closure.params().len(),
                        found: args.len(),
                        span,
                    });
                }
                if self.depth >= self.options.max_call_depth {
                    return Err(EvalError::CallDepthExceeded {
                        limit: self.options.max_call_depth,
                        span,
                    });
                }

                // The activation scope hangs off the captured scope, not the caller's
                let activation = Environment::new_enclosed(closure.env.clone());
                {
                    let mut scope = activation.borrow_mut();
                    let mut args = args.into_iter();
                    for param in closure.params() {
                        scope.define(param.clone(), args.next().unwrap_or(Value::Null));
                    }
                }

                self.depth += 1;
                let flow = self.execute_statements(&closure.decl.body.statements, &activation);
                self.depth -= 1;
                Environment::release(&activation, flow_value(&flow));

                match flow? {
                    Flow::Normal(value) | Flow::Return(value) => Ok(value),
                }
            }
        }
    }
}

// The value leaving a scope, if any
fn flow_value(flow: &EvalResult<Flow>) -> Option<&Value> {
    match flow {
        Ok(Flow::Normal(value) | Flow::Return(value)) => Some(value),
        Err(_) => None,
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        self.globals.borrow_mut().clear();
    }
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_str;

    // Runs `input` in a fresh interpreter and returns the final value and output
    fn run_with(input: &str, options: Options) -> (EvalResult, Vec<String>) {
        let program = match parse_str(input) {
            Ok(program) => program,
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        };
        let mut interpreter = Interpreter::with_options(options);
        let result = interpreter.run(&program);
        (result, interpreter.take_output())
    }

    fn assert_eval(input: &str, expected: Value) {
        match run_with(input, Options::default()) {
            (Ok(value), _) => assert_eq!(value, expected, "Input: '{}'", input),
            (Err(e), _) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    fn assert_output(input: &str, expected: &[&str]) {
        match run_with(input, Options::default()) {
            (Ok(_), output) => assert_eq!(output, expected, "Input: '{}'", input),
            (Err(e), _) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper to assert evaluation errors
    fn assert_eval_error(input: &str, expected_error_variant: &EvalError) {
        match run_with(input, Options::default()) {
            (Ok(result), _) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            (Err(e), _) => {
                assert_eq!(
                    std::mem::discriminant(&e),
                    std::mem::discriminant(expected_error_variant),
                    "Input: '{}', Expected error variant like {:?}, got: {:?}",
                    input,
                    expected_error_variant,
                    e
                );
            }
        }
    }

    fn undefined() -> EvalError {
        EvalError::EnvError(EnvError::UndefinedName("".into(), Span::default())) // Dummy
    }

    fn type_mismatch() -> EvalError {
        EvalError::TypeMismatch {
            expected: "".into(),
            found: "".into(),
            span: Span::default(),
        }
    }

    #[test]
    fn test_eval_literals() {
        assert_eval("123", Value::Number(123.0));
        assert_eval("'hello'", Value::String("hello".to_string()));
        assert_eval("", Value::Null);
        assert_eval("true", Value::Boolean(true));
        assert_eval("declare b = false b", Value::Boolean(false));
    }

    #[test]
    fn test_eval_precedence() {
        assert_eval("declare r = 2 + 3 * 4", Value::Number(14.0));
        assert_eval("declare r = 2 + 3 * 4 r", Value::Number(14.0));
        assert_eval("(2 + 3) * 4", Value::Number(20.0));
        assert_eval("10 - 4 - 3", Value::Number(3.0));
        assert_eval("-2 * 3", Value::Number(-6.0));
    }

    #[test]
    fn test_declaration_without_initializer_is_null() {
        assert_eval("declare x x", Value::Null);
        assert_output("declare x print x", &["null"]);
    }

    #[test]
    fn test_redeclaration_shadows_in_same_scope() {
        assert_eval("declare x = 1 declare x = x + 1 x", Value::Number(2.0));
    }

    #[test]
    fn test_print_rendering() {
        assert_output(
            "print 30 print 2.5 print 'raw' print 1 < 2 print 1 > 2 print 1 / 0",
            &["30", "2.5", "raw", "true", "false", "Infinity"],
        );
    }

    #[test]
    fn test_print_builtin_is_a_value() {
        assert_output("declare log = print log('a', 1, 2 == 2)", &["a 1 true"]);
        assert_output("print print", &["<builtin print>"]);
        assert_eval("declare p = print p == print", Value::Boolean(true));
    }

    #[test]
    fn test_block_scope() {
        assert_output("declare x = 1 { declare x = 2 print x } print x", &["2", "1"]);
        assert_eval_error("{ declare inner = 1 } inner", &undefined());
    }

    #[test]
    fn test_block_value_is_last_statement() {
        assert_eval("{ 1 2 3 }", Value::Number(3.0));
        assert_eval("{ }", Value::Null);
    }

    #[test]
    fn test_if_else() {
        assert_output("if 1 < 2 { print 'yes' } else { print 'no' }", &["yes"]);
        assert_output("if 1 > 2 { print 'yes' } else { print 'no' }", &["no"]);
        assert_eval("if 1 > 2 { 5 }", Value::Null);
        assert_eval("if 1 < 2 { 5 }", Value::Number(5.0));
    }

    #[test]
    fn test_truthiness_in_conditions() {
        assert_output("if 0 { print 'a' } else { print 'b' }", &["b"]);
        assert_output("if '' { print 'a' } else { print 'b' }", &["b"]);
        assert_output("declare n if n { print 'a' } else { print 'b' }", &["b"]);
        assert_output("if 'text' { print 'a' } else { print 'b' }", &["a"]);
        assert_output("if -1 { print 'a' } else { print 'b' }", &["a"]);
        assert_output("function f() {} if f { print 'a' }", &["a"]);
    }

    #[test]
    fn test_if_does_not_evaluate_unused_branch() {
        assert_eval("if 1 { 'good' } else { missing }", Value::String("good".to_string()));
        assert_eval("if 0 { missing } else { 'good' }", Value::String("good".to_string()));
    }

    #[test]
    fn test_while_loop_scoped_redeclaration() {
        assert_output(
            "declare x = 0\nwhile x < 5 { print x declare x = x + 1 }",
            &["0", "1", "2", "3", "4"],
        );
        // The loop's declarations do not leak into the enclosing scope
        assert_eval(
            "declare x = 0 while x < 3 { declare x = x + 1 } x",
            Value::Number(0.0),
        );
    }

    #[test]
    fn test_while_false_never_runs_body() {
        assert_output("while 0 { print 'never' }", &[]);
    }

    #[test]
    fn test_logical_short_circuit() {
        assert_eval("1 or missing", Value::Number(1.0));
        assert_eval("0 and missing", Value::Number(0.0));
        assert_eval("1 || missing", Value::Number(1.0));
        assert_eval("'' && missing", Value::String(String::new()));
        assert_eval_error("0 or missing", &undefined());
        assert_eval_error("1 and missing", &undefined());
    }

    #[test]
    fn test_logical_returns_operand() {
        assert_eval("0 or 'fallback'", Value::String("fallback".to_string()));
        assert_eval("1 and 2", Value::Number(2.0));
    }

    #[test]
    fn test_binary_evaluates_both_operands() {
        assert_eval_error("1 == missing", &undefined());
    }

    #[test]
    fn test_unary() {
        assert_eval("!0", Value::Boolean(true));
        assert_eval("!'x'", Value::Boolean(false));
        assert_eval("--3", Value::Number(3.0));
        assert_eval_error("-'3'", &type_mismatch());
    }

    #[test]
    fn test_equality_semantics() {
        assert_eval("1 == 1", Value::Boolean(true));
        assert_eval("'a' != 'b'", Value::Boolean(true));
        assert_eval("declare n n == n", Value::Boolean(true));
        assert_eval("declare n n == 0", Value::Boolean(false));
        assert_eval("1 == '1'", Value::Boolean(false));
    }

    #[test]
    fn test_closure_identity_equality() {
        assert_eval("function f() {} function g() {} f == f", Value::Boolean(true));
        assert_eval("function f() {} function g() {} f == g", Value::Boolean(false));
        assert_eval("function f() {} declare h = f h == f", Value::Boolean(true));
        let factory = "function make() { function inner() {} return inner } ";
        assert_eval(&format!("{factory}declare a = make() a == a"), Value::Boolean(true));
        assert_eval(&format!("{factory}make() == make()"), Value::Boolean(false));
    }

    #[test]
    fn test_function_call() {
        assert_output("function add(a, b) { return a + b }\nprint add(10, 20)", &["30"]);
    }

    #[test]
    fn test_function_without_return_yields_last_value() {
        assert_eval("function f(a) { a * 2 } f(4)", Value::Number(8.0));
        assert_eval("function f() {} f()", Value::Null);
    }

    #[test]
    fn test_while_and_return_sum() {
        assert_eval(
            "function sum(n) {
                declare total = 0
                declare i = 1
                while 1 {
                    declare total = total + i
                    declare i = i + 1
                    if i > n { return total }
                }
            }
            sum(5)",
            Value::Number(15.0),
        );
    }

    #[test]
    fn test_return_skips_remaining_statements() {
        assert_output(
            "function f() { print 'before' return 1 print 'after' } f()",
            &["before"],
        );
        assert_eval(
            "function f(x) { if x > 0 { { return 'deep' } } return 'shallow' } f(1)",
            Value::String("deep".to_string()),
        );
    }

    #[test]
    fn test_recursion() {
        assert_eval(
            "function fib(n) { if n < 2 { return n } return fib(n - 1) + fib(n - 2) } fib(15)",
            Value::Number(610.0),
        );
    }

    #[test]
    fn test_top_level_return_stops_program() {
        assert_eval("return 7 print 'unreachable'", Value::Number(7.0));
        assert_output("print 1 return 2 print 3", &["1"]);
    }

    #[test]
    fn test_closure_outlives_its_scope() {
        assert_output(
            "function make() { declare secret = 42 function reveal() { return secret } return reveal }
             declare keep = make()
             print keep()",
            &["42"],
        );
    }

    #[test]
    fn test_closure_sees_later_declarations_in_defining_scope() {
        // Capture is by reference: the lookup happens at call time
        assert_output(
            "function show() { print y }
             declare y = 5
             show()
             declare y = 6
             show()",
            &["5", "6"],
        );
    }

    #[test]
    fn test_closure_uses_defining_scope_not_caller() {
        assert_output(
            "declare x = 'global'
             function read() { return x }
             function caller() { declare x = 'local' return read() }
             print caller()",
            &["global"],
        );
    }

    #[test]
    fn test_closure_factory() {
        assert_output(
            "function adder(n) { function add(m) { return n + m } return add }
             declare add2 = adder(2)
             declare add10 = adder(10)
             print add2(1)
             print add10(1)
             print adder(3)(4)",
            &["3", "11", "7"],
        );
    }

    #[test]
    fn test_lenient_arity() {
        assert_output("function f(a, b) { print b } f(1)", &["null"]);
        assert_output("function f(a) { print a } f(1, 2, 3)", &["1"]);
    }

    #[test]
    fn test_strict_arity() {
        let options = Options {
            strict_arity: true,
            ..Options::default()
        };
        let (result, _) = run_with("function f(a, b) { return a } f(1)", options.clone());
        assert_eq!(
            result,
            Err(EvalError::ArityMismatch {
                name: "f".to_string(),
                expected: 2,
                found: 1,
                span: Span::new(30, 34),
            })
        );
        let (result, _) = run_with("function f(a) { return a } f(1)", options);
        assert_eq!(result, Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_call_depth_limit() {
        let options = Options {
            max_call_depth: 32,
            ..Options::default()
        };
        let (result, _) = run_with("function loop(n) { return loop(n + 1) } loop(0)", options);
        assert!(matches!(
            result,
            Err(EvalError::CallDepthExceeded { limit: 32, .. })
        ));
    }

    #[test]
    fn test_depth_is_restored_after_error() {
        let options = Options {
            max_call_depth: 4,
            ..Options::default()
        };
        let mut interpreter = Interpreter::with_options(options);
        let failing = parse_str("function f() { return missing } f()").unwrap();
        for _ in 0..10 {
            assert!(interpreter.run(&failing).is_err());
        }
        let ok = parse_str("function g() { return 1 } g()").unwrap();
        assert_eq!(interpreter.run(&ok), Ok(Value::Number(1.0)));
    }

    #[test]
    fn test_not_a_procedure() {
        let not_proc = EvalError::NotAProcedure("".into(), Span::default()); // Dummy
        assert_eval_error("declare x = 1 x()", &not_proc);
        assert_eval_error("'text'(1)", &not_proc);
    }

    #[test]
    fn test_call_evaluates_callee_before_arguments() {
        assert_eval_error("missing_fn(missing_arg)", &undefined());
        let (result, _) = run_with("missing_fn(missing_arg)", Options::default());
        assert!(matches!(
            result,
            Err(EvalError::EnvError(EnvError::UndefinedName(ref name, _))) if name == "missing_fn"
        ));
    }

    #[test]
    fn test_undefined_name_stops_output() {
        let (result, output) = run_with("print 'first' print missing print 'never'", Options::default());
        assert_eq!(result.map_err(|e| e.kind()), Err("UndefinedNameError"));
        assert_eq!(output, ["first"]);
    }

    #[test]
    fn test_type_errors() {
        assert_eval_error("1 + true_value", &undefined());
        assert_eval_error("declare n 1 + n", &type_mismatch());
        assert_eval_error("'a' * 2", &type_mismatch());
        assert_eval_error("1 < 'b'", &type_mismatch());
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(undefined().kind(), "UndefinedNameError");
        assert_eq!(type_mismatch().kind(), "TypeError");
        assert_eq!(
            EvalError::NotAProcedure("1".into(), Span::default()).kind(),
            "TypeError"
        );
    }

    #[test]
    fn test_state_persists_between_runs() {
        let mut interpreter = Interpreter::new();
        let first = parse_str("declare x = 41 function inc(n) { return n + 1 }").unwrap();
        let second = parse_str("inc(x)").unwrap();
        interpreter.run(&first).unwrap();
        assert_eq!(interpreter.run(&second), Ok(Value::Number(42.0)));
        assert_eq!(
            interpreter.globals().borrow().get("x", Span::default()),
            Ok(Value::Number(41.0))
        );
    }

    #[test]
    fn test_drop_releases_global_frame() {
        let mut interpreter = Interpreter::new();
        let program = parse_str("function loop_back() { return loop_back }").unwrap();
        interpreter.run(&program).unwrap();
        let globals = interpreter.globals();
        drop(interpreter);
        assert!(globals.borrow().get_identifiers().is_empty());
    }

    const COUNTDOWN: &str = "function down(n) { if n > 0 { return down(n - 1) } return 0 }";

    #[test]
    fn test_default_depth_limit_is_reached_before_the_stack_runs_out() {
        let (result, _) = run_with(&format!("{COUNTDOWN} down(300)"), Options::default());
        assert!(matches!(
            result,
            Err(EvalError::CallDepthExceeded { limit: 256, .. })
        ));

        let nested_body = "function down(n) { while 1 { if n > 0 { { { \
            return 0 + (0 + (0 + down(n - 1))) } } } return 0 } } down(255)";
        let (result, _) = run_with(nested_body, Options::default());
        assert_eq!(result, Ok(Value::Number(0.0)));
    }

    #[test]
    fn test_deep_recursion_with_raised_limit() {
        let options = Options {
            max_call_depth: 5000,
            ..Options::default()
        };
        let (result, _) = run_with(&format!("{COUNTDOWN} down(4000)"), options);
        assert_eq!(result, Ok(Value::Number(0.0)));
    }

    #[test]
    fn test_factory_scope_freed_with_its_closure() {
        let mut interpreter = Interpreter::new();
        let program = parse_str(
            "function make(step) { function add(n) { return n + step } return add } make(2)",
        )
        .unwrap();
        let add = interpreter.run(&program).unwrap();
        let scope = match &add {
            Value::Procedure(Procedure::Closure(closure)) => Rc::downgrade(&closure.env),
            other => panic!("Expected a closure, got {:?}", other),
        };
        assert_eq!(
            interpreter.call(add.clone(), vec![Value::Number(1.0)], Span::default()),
            Ok(Value::Number(3.0))
        );
        drop(add);
        assert!(scope.upgrade().is_none());
    }

    #[test]
    fn test_repeated_calls_release_their_scopes() {
        let mut interpreter = Interpreter::new();
        let program = parse_str(
            "function outer() { \
                function g() { function h() { return 1 } return h } \
                declare k = g() \
                return k() \
            }",
        )
        .unwrap();
        interpreter.run(&program).unwrap();
        let call_outer = parse_str("outer()").unwrap();
        for _ in 0..3 {
            assert_eq!(interpreter.run(&call_outer), Ok(Value::Number(1.0)));
        }
        // Only the global frame and the temporary handle remain
        assert_eq!(Rc::strong_count(&interpreter.globals()), 2);
    }
}
