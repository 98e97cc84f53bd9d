use crate::ast::{BinaryOp, Block, Expr, ExprKind, FunctionDecl, Literal, LogicalOp, Program, Stmt, StmtKind, UnaryOp};
use crate::lexer::{Keyword, LexerError, Operator, Token, TokenKind};
use crate::source::Span;
use std::iter::Peekable;
use std::rc::Rc;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Parse Error [at {}]: Unexpected {}, expected {expected}", .found.span, .found.kind)]
    UnexpectedToken { found: Token, expected: String },
    #[error("Parse Error: Unexpected end of input. Expected {0}")]
    UnexpectedEof(String),
    #[error("Parse Error [at {span}]: Nesting deeper than {limit} levels")]
    TooDeeplyNested { limit: usize, span: Span },
    // Only produced by `parse_str`, which lexes first
    #[error("Lexer Error during parse: {0}")]
    LexerError(#[from] LexerError),
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

/// How deeply blocks, parenthesised expressions, call arguments and unary
/// operators may nest.
pub const MAX_NESTING: usize = 256;

const RED_ZONE: usize = 64 * 1024;
const STACK_SEGMENT: usize = 1024 * 1024;

const EQUALITY: &[(Operator, BinaryOp)] = &[
    (Operator::EqualEqual, BinaryOp::Equal),
    (Operator::BangEqual, BinaryOp::NotEqual),
];

const RELATIONAL: &[(Operator, BinaryOp)] = &[
    (Operator::Greater, BinaryOp::Greater),
    (Operator::Less, BinaryOp::Less),
    (Operator::GreaterEqual, BinaryOp::GreaterEqual),
    (Operator::LessEqual, BinaryOp::LessEqual),
];

const ADDITIVE: &[(Operator, BinaryOp)] = &[
    (Operator::Plus, BinaryOp::Add),
    (Operator::Minus, BinaryOp::Subtract),
];

const MULTIPLICATIVE: &[(Operator, BinaryOp)] = &[
    (Operator::Star, BinaryOp::Multiply),
    (Operator::Slash, BinaryOp::Divide),
    (Operator::Percent, BinaryOp::Modulo),
];

// Builds the error for a token that did not fit; running into `Eof` is
// reported as running out of input.
fn unexpected(found: Token, expected: &str) -> ParseError {
    match found.kind {
        TokenKind::Eof => ParseError::UnexpectedEof(expected.to_string()),
        _ => ParseError::UnexpectedToken {
            found,
            expected: expected.to_string(),
        },
    }
}

/// Recursive-descent parser with one token of lookahead.
pub struct Parser {
    // We iterate over owned Tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
            depth: 0,
        }
    }

    // Runs `parse` one nesting level deeper.
    fn nested<T>(&mut self, parse: impl FnOnce(&mut Self) -> ParseResult<T>) -> ParseResult<T> {
        if self.depth >= MAX_NESTING {
            let span = self.tokens.peek().map(|token| token.span).unwrap_or_default();
            return Err(ParseError::TooDeeplyNested {
                limit: MAX_NESTING,
                span,
            });
        }
        self.depth += 1;
        let result = stacker::maybe_grow(RED_ZONE, STACK_SEGMENT, || parse(self));
        self.depth -= 1;
        result
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    // Peeks at the next token's kind without consuming.
    fn peek_kind(&mut self) -> Option<&TokenKind> {
        self.tokens.peek().map(|token| &token.kind)
    }

    fn at_end(&mut self) -> bool {
        matches!(self.peek_kind(), None | Some(TokenKind::Eof))
    }

    fn check(&mut self, kind: &TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn consume_if(&mut self, kind: &TokenKind) -> Option<Token> {
        if self.check(kind) {
            self.next_token()
        } else {
            None
        }
    }

    fn expect(&mut self, kind: TokenKind, expected: &str) -> ParseResult<Token> {
        match self.next_token() {
            Some(token) if token.kind == kind => Ok(token),
            Some(found) => Err(unexpected(found, expected)),
            None => Err(ParseError::UnexpectedEof(expected.to_string())),
        }
    }

    fn expect_identifier(&mut self, expected: &str) -> ParseResult<(String, Span)> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                span,
            }) => Ok((name, span)),
            Some(found) => Err(unexpected(found, expected)),
            None => Err(ParseError::UnexpectedEof(expected.to_string())),
        }
    }

    /// Parses the entire token stream into a program.
    pub fn parse(mut self) -> ParseResult<Program> {
        let mut statements = Vec::new();
        while !self.at_end() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    /// Parses one statement, dispatching on its leading token. A trailing `;`
    /// is consumed when present.
    pub fn parse_statement(&mut self) -> ParseResult<Stmt> {
        let statement = match self.peek_kind().cloned() {
            Some(TokenKind::Keyword(Keyword::Declare)) => self.parse_declaration()?,
            Some(TokenKind::Keyword(Keyword::Print)) => self.parse_print()?,
            Some(TokenKind::Keyword(Keyword::If)) => self.parse_if()?,
            Some(TokenKind::Keyword(Keyword::While)) => self.parse_while()?,
            Some(TokenKind::Keyword(Keyword::Function)) => self.parse_function()?,
            Some(TokenKind::Keyword(Keyword::Return)) => self.parse_return()?,
            Some(TokenKind::LBrace) => {
                let block = self.parse_block()?;
                let span = block.span;
                Stmt::new(StmtKind::Block(block), span)
            }
            _ => {
                let expr = self.parse_expression()?;
                let span = expr.span;
                Stmt::new(StmtKind::Expression(expr), span)
            }
        };
        self.consume_if(&TokenKind::Semicolon);
        Ok(statement)
    }

    fn parse_declaration(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::Declare), "'declare'")?;
        let (name, name_span) = self.expect_identifier("a variable name after 'declare'")?;
        let initializer = match self.consume_if(&TokenKind::Assign) {
            Some(_) => Some(self.parse_expression()?),
            None => None,
        };
        let end = initializer.as_ref().map_or(name_span, |init| init.span);
        Ok(Stmt::new(
            StmtKind::VariableDeclaration { name, initializer },
            keyword.span.merge(&end),
        ))
    }

    fn parse_print(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::Print), "'print'")?;
        let expr = self.parse_expression()?;
        let span = keyword.span.merge(&expr.span);
        Ok(Stmt::new(StmtKind::Print(expr), span))
    }

    fn parse_if(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::If), "'if'")?;
        let test = self.parse_expression()?;
        let consequent = self.parse_block()?;
        let alternate = match self.consume_if(&TokenKind::Keyword(Keyword::Else)) {
            Some(_) => Some(self.parse_block()?),
            None => None,
        };
        let end = alternate.as_ref().map_or(consequent.span, |block| block.span);
        Ok(Stmt::new(
            StmtKind::If {
                test,
                consequent,
                alternate,
            },
            keyword.span.merge(&end),
        ))
    }

    fn parse_while(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::While), "'while'")?;
        let test = self.parse_expression()?;
        let body = self.parse_block()?;
        let span = keyword.span.merge(&body.span);
        Ok(Stmt::new(StmtKind::While { test, body }, span))
    }

    fn parse_function(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::Function), "'function'")?;
        let (name, _) = self.expect_identifier("a function name after 'function'")?;
        self.expect(TokenKind::LParen, "'(' to start the parameter list")?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                let (param, _) = self.expect_identifier("a parameter name")?;
                params.push(param);
                if self.consume_if(&TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen, "')' to close the parameter list")?;
        let body = self.parse_block()?;
        let span = keyword.span.merge(&body.span);
        Ok(Stmt::new(
            StmtKind::FunctionDeclaration(Rc::new(FunctionDecl { name, params, body })),
            span,
        ))
    }

    fn parse_return(&mut self) -> ParseResult<Stmt> {
        let keyword = self.expect(TokenKind::Keyword(Keyword::Return), "'return'")?;
        let argument = self.parse_expression()?;
        let span = keyword.span.merge(&argument.span);
        Ok(Stmt::new(StmtKind::Return(argument), span))
    }

    fn parse_block(&mut self) -> ParseResult<Block> {
        self.nested(Self::parse_block_body)
    }

    fn parse_block_body(&mut self) -> ParseResult<Block> {
        let lbrace = self.expect(TokenKind::LBrace, "'{' to start a block")?;
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.at_end() {
                return Err(ParseError::UnexpectedEof("'}' to close the block".to_string()));
            }
            statements.push(self.parse_statement()?);
        }
        let rbrace = self.expect(TokenKind::RBrace, "'}' to close the block")?;
        Ok(Block {
            statements,
            span: lbrace.span.merge(&rbrace.span),
        })
    }

    pub fn parse_expression(&mut self) -> ParseResult<Expr> {
        self.nested(Self::parse_or)
    }

    // `and`/`or` are keywords, `&&`/`||` operators; both spellings are accepted
    fn match_logical(&mut self, op: LogicalOp) -> bool {
        let (keyword, operator) = match op {
            LogicalOp::And => (Keyword::And, Operator::AmpAmp),
            LogicalOp::Or => (Keyword::Or, Operator::PipePipe),
        };
        let found = match self.peek_kind() {
            Some(TokenKind::Keyword(k)) => *k == keyword,
            Some(TokenKind::Operator(o)) => *o == operator,
            _ => false,
        };
        if found {
            self.next_token();
        }
        found
    }

    fn match_binary(&mut self, ops: &[(Operator, BinaryOp)]) -> Option<BinaryOp> {
        let operator = match self.peek_kind() {
            Some(TokenKind::Operator(op)) => *op,
            _ => return None,
        };
        let (_, binary) = ops.iter().find(|(candidate, _)| *candidate == operator)?;
        self.next_token();
        Some(*binary)
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        while self.match_logical(LogicalOp::Or) {
            let right = self.parse_and()?;
            left = Expr::logical(LogicalOp::Or, left, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.match_logical(LogicalOp::And) {
            let right = self.parse_equality()?;
            left = Expr::logical(LogicalOp::And, left, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_relational()?;
        while let Some(op) = self.match_binary(EQUALITY) {
            let right = self.parse_relational()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.match_binary(RELATIONAL) {
            let right = self.parse_additive()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.match_binary(ADDITIVE) {
            let right = self.parse_multiplicative()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.match_binary(MULTIPLICATIVE) {
            let right = self.parse_unary()?;
            left = Expr::binary(op, left, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = match self.peek_kind() {
            Some(TokenKind::Operator(Operator::Minus)) => UnaryOp::Negate,
            Some(TokenKind::Operator(Operator::Bang)) => UnaryOp::Not,
            _ => return self.parse_call(),
        };
        let start = self.expect_any()?.span;
        let operand = self.nested(Self::parse_unary)?;
        let span = start.merge(&operand.span);
        Ok(Expr::new(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span,
        ))
    }

    fn parse_call(&mut self) -> ParseResult<Expr> {
        let mut callee = self.parse_primary()?;
        while self.consume_if(&TokenKind::LParen).is_some() {
            let mut arguments = Vec::new();
            if !self.check(&TokenKind::RParen) {
                loop {
                    arguments.push(self.parse_expression()?);
                    if self.consume_if(&TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            let rparen = self.expect(TokenKind::RParen, "')' to close the argument list")?;
            let span = callee.span.merge(&rparen.span);
            callee = Expr::new(
                ExprKind::Call {
                    callee: Box::new(callee),
                    arguments,
                },
                span,
            );
        }
        Ok(callee)
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let token = self.expect_any()?;
        let kind = match token.kind {
            TokenKind::Number(n) => ExprKind::Literal(Literal::Number(n)),
            TokenKind::String(s) => ExprKind::Literal(Literal::String(s)),
            TokenKind::Identifier(name) if name == "true" => {
                ExprKind::Literal(Literal::Boolean(true))
            }
            TokenKind::Identifier(name) if name == "false" => {
                ExprKind::Literal(Literal::Boolean(false))
            }
            TokenKind::Identifier(name) => ExprKind::Identifier(name),
            // In expression position `print` names the builtin itself
            TokenKind::Keyword(Keyword::Print) => {
                ExprKind::Identifier(Keyword::Print.as_str().to_string())
            }
            TokenKind::LParen => {
                let inner = self.parse_expression()?;
                let rparen = self.expect(TokenKind::RParen, "')' to close the parenthesis")?;
                return Ok(Expr::new(inner.kind, token.span.merge(&rparen.span)));
            }
            other => {
                return Err(unexpected(
                    Token {
                        kind: other,
                        span: token.span,
                    },
                    "an expression (number, string, identifier or '(')",
                ));
            }
        };
        Ok(Expr::new(kind, token.span))
    }

    fn expect_any(&mut self) -> ParseResult<Token> {
        self.next_token()
            .ok_or_else(|| ParseError::UnexpectedEof("an expression".to_string()))
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Program> {
    let tokens = crate::lexer::tokenize(input)?;
    Parser::new(tokens).parse()
}
