use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;

use amilang::lexer::{Keyword, tokenize};
use amilang::{Environment, Interpreter, Options, TokenKind, Value, parse_str, report_error};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

const HISTORY_FILE: &str = "amilang_history.txt";

struct AmiCompleter {
    env: Rc<RefCell<Environment>>,
}

impl AmiCompleter {
    fn new(env: Rc<RefCell<Environment>>) -> Self {
        AmiCompleter { env }
    }
}

impl rustyline::completion::Completer for AmiCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        // Only complete a name the cursor is still touching
        let prefix = match tokenize(&line[..pos]) {
            Ok(tokens) => tokens
                .iter()
                .rev()
                .find(|t| t.kind != TokenKind::Eof)
                .and_then(|t| match &t.kind {
                    TokenKind::Identifier(name) if t.span.end == pos => Some(name.clone()),
                    _ => None,
                }),
            Err(_) => None,
        };
        let Some(prefix) = prefix else {
            return Ok((pos, vec![]));
        };

        let mut names = self.env.borrow().get_identifiers();
        names.extend(Keyword::ALL.iter().map(|k| k.as_str().to_string()));
        let mut candidates: Vec<String> = names
            .into_iter()
            .filter(|id| id.starts_with(&prefix) && id.len() > prefix.len())
            .map(|id| id[prefix.len()..].to_string())
            .collect();
        candidates.sort();
        Ok((pos, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct InputValidator {
    #[rustyline(Validator)]
    validator: AmiValidator,
    #[rustyline(Highlighter)]
    highlighter: AmiHighlighter,
    #[rustyline(Completer)]
    completer: AmiCompleter,
}

struct AmiValidator;

impl Validator for AmiValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        let mut stack = Vec::new();
        let mut quote: Option<char> = None;
        let mut escape = false;
        let mut chars = input.char_indices().peekable();

        while let Some((i, c)) = chars.next() {
            if let Some(open) = quote {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == open {
                    quote = None;
                }
                continue;
            }

            match c {
                '"' | '\'' => quote = Some(c),
                '/' if chars.peek().is_some_and(|&(_, next)| next == '/') => {
                    // Comment runs to the end of the line
                    for (_, skipped) in chars.by_ref() {
                        if skipped == '\n' {
                            break;
                        }
                    }
                }
                '(' | '{' => stack.push((c, i)),
                ')' | '}' => {
                    let expected = if c == ')' { '(' } else { '{' };
                    match stack.pop() {
                        Some((opening, _)) if opening == expected => {}
                        _ => {
                            return Ok(ValidationResult::Invalid(Some(format!(
                                "  - Unmatched '{}' at position {}",
                                c, i
                            ))));
                        }
                    }
                }
                _ => {}
            }
        }

        if quote.is_some() || !stack.is_empty() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct AmiHighlighter;

impl Highlighter for AmiHighlighter {
    fn highlight<'l>(&self, line: &'l str, _pos: usize) -> Cow<'l, str> {
        // Half-typed input may not lex yet; show it as is
        let Ok(tokens) = tokenize(line) else {
            return Cow::Borrowed(line);
        };

        let mut highlighted = String::with_capacity(line.len() * 2);
        let mut last = 0;
        for token in &tokens {
            let range = token.span.to_range();
            highlighted.push_str(&line[last..range.start]);
            let text = &line[range.clone()];
            match &token.kind {
                TokenKind::Keyword(_) => highlighted.push_str(&format!("\x1b[1;35m{}\x1b[0m", text)),
                TokenKind::String(_) => highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", text)),
                TokenKind::Number(_) => highlighted.push_str(&format!("\x1b[33m{}\x1b[0m", text)),
                TokenKind::Identifier(name) if name == "true" || name == "false" => {
                    highlighted.push_str(&format!("\x1b[33m{}\x1b[0m", text))
                }
                _ => highlighted.push_str(text),
            }
            last = range.end;
        }
        // Trailing comments and whitespace
        highlighted.push_str(&line[last..]);
        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn main() -> rustyline::Result<()> {
    println!("AmiLang REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let mut interpreter = Interpreter::with_options(Options {
        echo: true,
        ..Options::default()
    });
    let h = InputValidator {
        highlighter: AmiHighlighter,
        validator: AmiValidator,
        completer: AmiCompleter::new(interpreter.globals()),
    };
    let config = rustyline::config::Config::builder()
        .edit_mode(rustyline::EditMode::Vi)
        .build();
    let mut rl = Editor::with_config(config)?;
    rl.set_helper(Some(h));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if rl.load_history(HISTORY_FILE).is_err() {
        println!("No previous history.");
    }

    loop {
        let readline = rl.readline("ami> ");
        match readline {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                let trimmed_input = line.trim();
                if trimmed_input.is_empty() {
                    continue;
                }
                if trimmed_input.eq_ignore_ascii_case("exit") {
                    break;
                }

                match parse_str(trimmed_input) {
                    Ok(program) => match interpreter.run(&program) {
                        Ok(Value::Null) => {}
                        Ok(value) => println!("=> {}", value),
                        Err(e) => report_error(&e, "REPL", trimmed_input),
                    },
                    Err(e) => report_error(&e, "REPL", trimmed_input),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                println!("\nExiting.");
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    rl.save_history(HISTORY_FILE)
}
