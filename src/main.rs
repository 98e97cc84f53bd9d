use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use amilang::{Interpreter, Options, report_error, tokenize};
use clap::Parser;

#[derive(Parser)]
#[command(name = "amilang")]
#[command(version, about = "Run an AmiLang program", long_about = None)]
struct Cli {
    /// Path to the source file
    file: PathBuf,

    /// Reject calls whose argument count differs from the parameter count
    #[arg(long)]
    strict_arity: bool,

    /// Maximum nesting of user function calls
    #[arg(long, default_value_t = 256)]
    max_call_depth: usize,

    /// Print the token stream and stop
    #[arg(long, conflicts_with = "ast")]
    tokens: bool,

    /// Print the parsed program and stop
    #[arg(long)]
    ast: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let source = match fs::read_to_string(&cli.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read {}: {}", cli.file.display(), e);
            return ExitCode::FAILURE;
        }
    };
    let name = cli.file.display().to_string();

    match run(&cli, &source) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_error(&e, &name, &source);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, source: &str) -> Result<(), amilang::Error> {
    let tokens = tokenize(source)?;
    if cli.tokens {
        for token in &tokens {
            println!("{:>10}  {}", token.span.to_string(), token.kind);
        }
        return Ok(());
    }

    let program = amilang::Parser::new(tokens).parse()?;
    if cli.ast {
        println!("{}", program);
        return Ok(());
    }

    let mut interpreter = Interpreter::with_options(Options {
        strict_arity: cli.strict_arity,
        max_call_depth: cli.max_call_depth,
        echo: true,
    });
    interpreter.run(&program)?;
    Ok(())
}
