use std::io;
use std::ops::Range;

use ariadne::{Config, IndexType, Label, Report, ReportKind, Source};

use crate::environment::EnvError;
use crate::evaluator::EvalError;
use crate::lexer::LexerError;
use crate::parser::ParseError;
use crate::source::Span;

type SourceSpan<'a> = (&'a str, Range<usize>);

/// Renders an error as an annotated excerpt of the source it came from.
pub trait PrettyPrint {
    fn report<'a>(&self, name: &'a str, input: &str, color: bool) -> Report<'a, SourceSpan<'a>>;

    /// Prints the report to stderr.
    fn pretty_print(&self, name: &str, input: &str) -> io::Result<()> {
        self.report(name, input, true)
            .eprint((name, Source::from(input)))
    }

    /// Writes the report without colours, e.g. into a buffer.
    fn pretty_write<W: io::Write>(&self, name: &str, input: &str, writer: W) -> io::Result<()> {
        self.report(name, input, false)
            .write((name, Source::from(input)), writer)
    }
}

fn build<'a>(
    name: &'a str,
    span: Range<usize>,
    color: bool,
    message: String,
    label: String,
) -> Report<'a, SourceSpan<'a>> {
    Report::build(ReportKind::Error, (name, span.clone()))
        .with_config(
            Config::default()
                .with_color(color)
                .with_index_type(IndexType::Byte),
        )
        .with_message(message)
        .with_label(Label::new((name, span)).with_message(label))
        .finish()
}

// Running out of input is reported at the very end of the source
fn end_of(input: &str) -> Range<usize> {
    input.len()..input.len()
}

impl PrettyPrint for LexerError {
    fn report<'a>(&self, name: &'a str, _input: &str, color: bool) -> Report<'a, SourceSpan<'a>> {
        build(
            name,
            self.span.to_range(),
            color,
            "Lexer Error".to_string(),
            self.error.to_string(),
        )
    }
}

impl PrettyPrint for ParseError {
    fn report<'a>(&self, name: &'a str, input: &str, color: bool) -> Report<'a, SourceSpan<'a>> {
        match self {
            ParseError::UnexpectedToken { found, expected } => build(
                name,
                found.span.to_range(),
                color,
                format!("Unexpected token: {}", found.kind),
                format!("Expected {}", expected),
            ),
            ParseError::UnexpectedEof(expected) => build(
                name,
                end_of(input),
                color,
                "Unexpected end of input".to_string(),
                format!("Expected {}", expected),
            ),
            ParseError::TooDeeplyNested { limit, span } => build(
                name,
                span.to_range(),
                color,
                format!("Nesting deeper than {} levels", limit),
                "Nesting limit reached here".to_string(),
            ),
            ParseError::LexerError(lex_err) => lex_err.report(name, input, color),
        }
    }
}

impl PrettyPrint for EvalError {
    fn report<'a>(&self, name: &'a str, _input: &str, color: bool) -> Report<'a, SourceSpan<'a>> {
        let span: Span = self.span();
        let label = match self {
            EvalError::EnvError(EnvError::UndefinedName(..)) => {
                "This name is not defined in the current scope".to_string()
            }
            EvalError::TypeMismatch { expected, found, .. } => {
                format!("Expected {}, found {}", expected, found)
            }
            EvalError::NotAProcedure(..) => {
                "This expression cannot be called as a function".to_string()
            }
            EvalError::ArityMismatch { expected, found, .. } => {
                format!("Expected {} arguments, found {}", expected, found)
            }
            EvalError::CallDepthExceeded { .. } => "The call that went too deep".to_string(),
        };
        build(
            name,
            span.to_range(),
            color,
            format!("{}: {}", self.kind(), self),
            label,
        )
    }
}
