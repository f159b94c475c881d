use std::fs;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use skrift::ast;
use skrift::interpreter::{EvalOutcome, Interpreter, InterpreterOptions, Value};
use skrift::{lexer, parser};

enum Mode {
    EvalSource(String),
    PrintAst(String),
    RunFile { path: String, arguments: Vec<String> },
    Repl,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Mode>> {
    let Some(first) = args.next() else {
        return Ok(Some(Mode::Repl));
    };
    match first.as_str() {
        "--version" => {
            println!("skrift {}", env!("CARGO_PKG_VERSION"));
            Ok(None)
        }
        "-e" => {
            let source = args.next().context("Missing source after -e")?;
            Ok(Some(Mode::EvalSource(source)))
        }
        "-p" => {
            let source = args.next().context("Missing source after -p")?;
            Ok(Some(Mode::PrintAst(source)))
        }
        flag if flag.starts_with('-') => bail!("Unknown flag '{flag}'"),
        path => Ok(Some(Mode::RunFile {
            path: path.to_string(),
            arguments: args.collect(),
        })),
    }
}

fn main() -> ExitCode {
    let mode = match parse_args(std::env::args().skip(1)) {
        Ok(Some(mode)) => mode,
        Ok(None) => return ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let result = match mode {
        Mode::EvalSource(source) => eval_source(&source),
        Mode::PrintAst(source) => print_ast(&source),
        Mode::RunFile { path, arguments } => run_file(&path, arguments),
        Mode::Repl => repl(),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(error) => {
            eprintln!("{error}");
            ExitCode::FAILURE
        }
    }
}

fn eval_source(source: &str) -> Result<bool> {
    let mut interpreter = Interpreter::new(InterpreterOptions {
        arguments: Vec::new(),
        repl: true,
    });
    if let EvalOutcome::Value(value) = interpreter.eval(source) {
        println!("{}", value.stringify());
    }
    Ok(!interpreter.had_error())
}

fn print_ast(source: &str) -> Result<bool> {
    let tokens = lexer::tokenize(source)?;
    let mut ids = ast::ExprIdGen::default();
    let stmts = parser::parse_tokens(tokens, &mut ids, true)?;
    print!("{}", ast::print_ast(&stmts));
    Ok(true)
}

fn run_file(path: &str, arguments: Vec<String>) -> Result<bool> {
    let source = fs::read_to_string(path).with_context(|| format!("Reading {path}"))?;
    let mut interpreter = Interpreter::new(InterpreterOptions {
        arguments,
        repl: false,
    });
    interpreter.eval(&source);
    Ok(!interpreter.had_error())
}

fn repl() -> Result<bool> {
    let mut interpreter = Interpreter::new(InterpreterOptions {
        arguments: Vec::new(),
        repl: true,
    });
    let mut editor = DefaultEditor::new().context("Initializing line editor")?;
    println!("skrift {}", env!("CARGO_PKG_VERSION"));

    loop {
        match editor.readline("> ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line.as_str());
                match interpreter.eval(&line) {
                    EvalOutcome::Value(value) => {
                        if !matches!(value, Value::Null) {
                            println!("{}", value.stringify());
                        }
                    }
                    EvalOutcome::None | EvalOutcome::Void => {}
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => return Err(error).context("Reading input"),
        }
    }
    Ok(!interpreter.had_error())
}
