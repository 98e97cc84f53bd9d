use crate::source::Span;
use std::fmt;
use std::rc::Rc;

/// A whole source file: statements evaluated in the global environment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Stmt>,
}

/// A brace-delimited statement list. Evaluating it opens a new scope.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    VariableDeclaration {
        name: String,
        initializer: Option<Expr>,
    },
    Print(Expr),
    Block(Block),
    If {
        test: Expr,
        consequent: Block,
        alternate: Option<Block>,
    },
    While {
        test: Expr,
        body: Block,
    },
    // Shared with every closure created from this declaration
    FunctionDeclaration(Rc<FunctionDecl>),
    Return(Expr),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Identifier(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    String(String),
    Boolean(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Expr { kind, span }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        let span = left.span.merge(&right.span);
        Expr::new(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }

    pub fn logical(op: LogicalOp, left: Expr, right: Expr) -> Self {
        let span = left.span.merge(&right.span);
        Expr::new(
            ExprKind::Logical {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            span,
        )
    }
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Stmt { kind, span }
    }
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Equal => "==",
            BinaryOp::NotEqual => "!=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LessEqual => "<=",
        }
    }
}

impl LogicalOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            LogicalOp::And => "and",
            LogicalOp::Or => "or",
        }
    }
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Negate => "-",
            UnaryOp::Not => "!",
        }
    }
}

// The Display impls below print the tree as S-expressions, e.g.
// `declare r = 2 + 3 * 4` becomes `(declare r (+ 2 (* 3 4)))`.

fn write_joined<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for item in items {
        write!(f, " {}", item)?;
    }
    Ok(())
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Number(n) => write!(f, "{}", n),
            Literal::String(s) => write!(f, "{:?}", s),
            Literal::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ExprKind::Literal(literal) => write!(f, "{}", literal),
            ExprKind::Identifier(name) => write!(f, "{}", name),
            ExprKind::Binary { op, left, right } => {
                write!(f, "({} {} {})", op.symbol(), left, right)
            }
            ExprKind::Logical { op, left, right } => {
                write!(f, "({} {} {})", op.symbol(), left, right)
            }
            ExprKind::Unary { op, operand } => write!(f, "({} {})", op.symbol(), operand),
            ExprKind::Call { callee, arguments } => {
                write!(f, "(call {}", callee)?;
                write_joined(f, arguments)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(block")?;
        write_joined(f, &self.statements)?;
        write!(f, ")")
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            StmtKind::VariableDeclaration { name, initializer } => match initializer {
                Some(init) => write!(f, "(declare {} {})", name, init),
                None => write!(f, "(declare {})", name),
            },
            StmtKind::Print(expr) => write!(f, "(print {})", expr),
            StmtKind::Block(block) => write!(f, "{}", block),
            StmtKind::If {
                test,
                consequent,
                alternate,
            } => match alternate {
                Some(alternate) => write!(f, "(if {} {} {})", test, consequent, alternate),
                None => write!(f, "(if {} {})", test, consequent),
            },
            StmtKind::While { test, body } => write!(f, "(while {} {})", test, body),
            StmtKind::FunctionDeclaration(decl) => write!(
                f,
                "(function {} ({}) {})",
                decl.name,
                decl.params.join(" "),
                decl.body
            ),
            StmtKind::Return(expr) => write!(f, "(return {})", expr),
            StmtKind::Expression(expr) => write!(f, "{}", expr),
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for statement in &self.statements {
            if !first {
                writeln!(f)?;
            }
            write!(f, "{}", statement)?;
            first = false;
        }
        Ok(())
    }
}
