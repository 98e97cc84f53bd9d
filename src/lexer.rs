use logos::Logos;
use std::fmt;
use thiserror::Error;

use crate::source::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Declare,
    Print,
    If,
    Else,
    While,
    Function,
    Return,
    And,
    Or,
}

impl Keyword {
    pub const ALL: [Keyword; 9] = [
        Keyword::Declare,
        Keyword::Print,
        Keyword::If,
        Keyword::Else,
        Keyword::While,
        Keyword::Function,
        Keyword::Return,
        Keyword::And,
        Keyword::Or,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Keyword::Declare => "declare",
            Keyword::Print => "print",
            Keyword::If => "if",
            Keyword::Else => "else",
            Keyword::While => "while",
            Keyword::Function => "function",
            Keyword::Return => "return",
            Keyword::And => "and",
            Keyword::Or => "or",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqualEqual,
    BangEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    AmpAmp,
    PipePipe,
    Bang,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::EqualEqual => "==",
            Operator::BangEqual => "!=",
            Operator::Greater => ">",
            Operator::Less => "<",
            Operator::GreaterEqual => ">=",
            Operator::LessEqual => "<=",
            Operator::AmpAmp => "&&",
            Operator::PipePipe => "||",
            Operator::Bang => "!",
        }
    }
}

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r\f]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip line comments
#[logos(error = LexerErrorKind)]
pub enum TokenKind {
    #[token("declare", |_| Keyword::Declare)]
    #[token("print", |_| Keyword::Print)]
    #[token("if", |_| Keyword::If)]
    #[token("else", |_| Keyword::Else)]
    #[token("while", |_| Keyword::While)]
    #[token("function", |_| Keyword::Function)]
    #[token("return", |_| Keyword::Return)]
    #[token("and", |_| Keyword::And)]
    #[token("or", |_| Keyword::Or)]
    Keyword(Keyword),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),
    #[regex(r"[0-9][0-9.]*", |lex| parse_number(lex.slice()))]
    Number(f64),
    // The closing quote is optional in the pattern so that an unterminated
    // literal reaches the callback and is reported as such.
    #[regex(r#""([^"\\]|\\(.|\n))*"?"#, |lex| unescape::unescape(lex.slice()))]
    #[regex(r#"'([^'\\]|\\(.|\n))*'?"#, |lex| unescape::unescape(lex.slice()))]
    String(String),
    #[token("+", |_| Operator::Plus)]
    #[token("-", |_| Operator::Minus)]
    #[token("*", |_| Operator::Star)]
    #[token("/", |_| Operator::Slash)]
    #[token("%", |_| Operator::Percent)]
    #[token("==", |_| Operator::EqualEqual)]
    #[token("!=", |_| Operator::BangEqual)]
    #[token(">", |_| Operator::Greater)]
    #[token("<", |_| Operator::Less)]
    #[token(">=", |_| Operator::GreaterEqual)]
    #[token("<=", |_| Operator::LessEqual)]
    #[token("&&", |_| Operator::AmpAmp)]
    #[token("||", |_| Operator::PipePipe)]
    #[token("!", |_| Operator::Bang)]
    Operator(Operator),
    #[token("=")]
    Assign,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    // Appended by `tokenize`, never matched
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

// Digits with at most one decimal point; anything after a second dot is
// swallowed by the token but ignored for the value.
fn parse_number(slice: &str) -> Option<f64> {
    let end = slice
        .match_indices('.')
        .nth(1)
        .map_or(slice.len(), |(index, _)| index);
    slice[..end].parse::<f64>().ok()
}

mod unescape {
    use super::{LexerErrorKind, LexerResult};

    /// Strips the quotes from a string literal slice and resolves escapes.
    /// `\n` and `\t` are recognised; any other escaped character is kept as is.
    pub fn unescape(slice: &str) -> LexerResult<String> {
        let mut chars = slice.chars();
        let Some(quote) = chars.next() else {
            return Err(LexerErrorKind::UnterminatedString);
        };
        // un-escaping should only ever reduce the length of the string.
        let mut result = String::with_capacity(slice.len());
        while let Some(c) = chars.next() {
            match c {
                '\\' => match chars.next() {
                    Some('n') => result.push('\n'),
                    Some('t') => result.push('\t'),
                    Some(other) => result.push(other),
                    None => return Err(LexerErrorKind::UnterminatedString),
                },
                c if c == quote => return Ok(result),
                c => result.push(c),
            }
        }
        Err(LexerErrorKind::UnterminatedString)
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Keyword(keyword) => write!(f, "'{}'", keyword.as_str()),
            TokenKind::Identifier(name) => write!(f, "identifier '{}'", name),
            TokenKind::Number(n) => write!(f, "number {}", n),
            TokenKind::String(s) => write!(f, "string {:?}", s),
            TokenKind::Operator(op) => write!(f, "'{}'", op.as_str()),
            TokenKind::Assign => write!(f, "'='"),
            TokenKind::LParen => write!(f, "'('"),
            TokenKind::RParen => write!(f, "')'"),
            TokenKind::LBrace => write!(f, "'{{'"),
            TokenKind::RBrace => write!(f, "'}}'"),
            TokenKind::Comma => write!(f, "','"),
            TokenKind::Semicolon => write!(f, "';'"),
            TokenKind::Eof => write!(f, "end of input"),
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Error)]
pub enum LexerErrorKind {
    #[error("Unterminated string literal")]
    UnterminatedString,
    #[error("Unexpected character: '{0}'")]
    UnexpectedCharacter(char),
    // What logos reports before `tokenize` knows which character it was
    #[default]
    #[error("Invalid token")]
    InvalidToken,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{error}")]
pub struct LexerError {
    pub error: LexerErrorKind,
    pub span: Span,
}

// Result type alias for convenience
type LexerResult<T> = Result<T, LexerErrorKind>;

// Result type alias for convenience
type LexerRangedResult<T> = Result<T, LexerError>;

/// Splits `input` into tokens. The returned stream always ends with a single
/// `Eof` token, even for empty input.
pub fn tokenize(input: &str) -> LexerRangedResult<Vec<Token>> {
    let mut tokens = TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| match result {
            Ok(kind) => Ok(Token {
                kind,
                span: Span::from(range),
            }),
            Err(LexerErrorKind::InvalidToken) => Err(LexerError {
                error: match input[range.clone()].chars().next() {
                    Some(c) => LexerErrorKind::UnexpectedCharacter(c),
                    None => LexerErrorKind::InvalidToken,
                },
                span: Span::from(range),
            }),
            Err(error) => Err(LexerError {
                error,
                span: Span::from(range),
            }),
        })
        .collect::<LexerRangedResult<Vec<Token>>>()?;
    tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::new(input.len(), input.len()),
    });
    Ok(tokens)
}
