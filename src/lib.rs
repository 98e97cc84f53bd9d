pub mod ast;
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod parser;
pub mod pretty_print;
mod primitives;
pub mod source;
pub mod types;

use ariadne::Report;
use thiserror::Error;

pub use environment::Environment;
pub use evaluator::{EvalError, Interpreter, Options};
pub use lexer::{LexerError, Token, TokenKind, tokenize};
pub use parser::{ParseError, Parser, parse_str};
pub use pretty_print::PrettyPrint;
pub use source::Span;
pub use types::Value;

/// Any failure while running a piece of source text.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("{0}")]
    Lex(#[from] LexerError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("{0}")]
    Runtime(#[from] EvalError),
}

impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Lex(_) => "LexError",
            Error::Parse(_) => "ParseError",
            Error::Runtime(e) => e.kind(),
        }
    }
}

impl PrettyPrint for Error {
    fn report<'a>(
        &self,
        name: &'a str,
        input: &str,
        color: bool,
    ) -> Report<'a, (&'a str, std::ops::Range<usize>)> {
        match self {
            Error::Lex(e) => e.report(name, input, color),
            Error::Parse(e) => e.report(name, input, color),
            Error::Runtime(e) => e.report(name, input, color),
        }
    }
}

/// What a successful run produced: the value of the last statement (or of a
/// top-level `return`) and every printed line in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub value: Value,
    pub output: Vec<String>,
}

/// Lexes, parses and runs `input` in a fresh interpreter with default options.
pub fn run_source(input: &str) -> Result<Outcome, Error> {
    run_source_with(input, Options::default())
}

pub fn run_source_with(input: &str, options: Options) -> Result<Outcome, Error> {
    let tokens = tokenize(input)?;
    let program = Parser::new(tokens).parse()?;
    let mut interpreter = Interpreter::with_options(options);
    let value = interpreter.run(&program)?;
    Ok(Outcome {
        value,
        output: interpreter.take_output(),
    })
}

/// Prints a report for `error` to stderr, falling back to the plain message
/// if the report cannot be written.
pub fn report_error<E: PrettyPrint + std::fmt::Display>(error: &E, name: &str, input: &str) {
    if error.pretty_print(name, input).is_err() {
        eprintln!("Error: {}", error);
    }
}
