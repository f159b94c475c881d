//! Interpreter session: the host-facing `eval` entry point.
//!
//! Execution pipeline per input:
//! eval -> tokenize -> parse -> resolve -> type-resolve -> type-validate
//! -> exec_block (new statements only).
//!
//! In REPL mode every accepted statement is retained and re-resolved
//! together with the next input, because scope distances depend on
//! statement order. Side effects are never replayed; the globals frame is
//! the memory of previous runs.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{ExprIdGen, ExprKind, Stmt};
use crate::diagnostics::{Diagnostic, DiagnosticKind};
use crate::lexer;
use crate::natives::NativeRegistry;
use crate::parser;
use crate::resolver::Resolver;
use crate::type_resolver::TypeResolver;
use crate::type_validator::TypeValidator;

mod environment;
mod error;
mod evaluator;
mod value;

pub use environment::Environment;
pub use error::{RuntimeError, RuntimeErrorKind};
pub use value::{ScriptFunction, Value};

use evaluator::{Evaluator, ExecResult};

/// Result of one `eval` call: nothing to return, the value of a single
/// expression input, or the void marker after a caught runtime error.
#[derive(Debug)]
pub enum EvalOutcome {
    None,
    Value(Value),
    Void,
}

pub type OutputSink = Box<dyn FnMut(&str)>;
pub type ErrorHandler = Box<dyn FnMut(&Diagnostic)>;

/// Per-phase error handlers, each invoked once per diagnostic.
pub struct ErrorHandlers {
    pub scan: ErrorHandler,
    pub parse: ErrorHandler,
    pub resolve: ErrorHandler,
    pub types: ErrorHandler,
    pub runtime: ErrorHandler,
}

impl Default for ErrorHandlers {
    fn default() -> Self {
        fn to_stderr() -> ErrorHandler {
            Box::new(|diagnostic| eprintln!("{diagnostic}"))
        }
        Self {
            scan: to_stderr(),
            parse: to_stderr(),
            resolve: to_stderr(),
            types: to_stderr(),
            runtime: to_stderr(),
        }
    }
}

#[derive(Debug, Default)]
pub struct InterpreterOptions {
    /// Trailing CLI arguments exposed to the program through `ARGV`.
    pub arguments: Vec<String>,
    /// REPL mode: retain statements across calls and allow a missing final
    /// semicolon.
    pub repl: bool,
}

pub struct Interpreter {
    natives: NativeRegistry,
    history: Vec<Stmt>,
    globals: Rc<RefCell<Environment>>,
    ids: ExprIdGen,
    repl: bool,
    output: OutputSink,
    handlers: ErrorHandlers,
    errors_reported: usize,
}

impl Interpreter {
    pub fn new(options: InterpreterOptions) -> Self {
        Self::with_io(
            options,
            Box::new(|line| println!("{line}")),
            ErrorHandlers::default(),
        )
    }

    pub fn with_io(options: InterpreterOptions, output: OutputSink, handlers: ErrorHandlers) -> Self {
        let natives = NativeRegistry::standard();
        let globals = Environment::root();
        globals.borrow_mut().define(
            "ARGV",
            Value::Arguments(Rc::new(RefCell::new(options.arguments))),
        );
        Self {
            natives,
            history: Vec::new(),
            globals,
            ids: ExprIdGen::default(),
            repl: options.repl,
            output,
            handlers,
            errors_reported: 0,
        }
    }

    /// True once any phase reported at least one diagnostic; drivers map
    /// this to the process exit code.
    pub fn had_error(&self) -> bool {
        self.errors_reported > 0
    }

    /// Runs one input. Analysis passes run over the whole retained program;
    /// only the new statements execute. A batch that fails any analysis
    /// pass is discarded wholesale.
    pub fn eval(&mut self, source: &str) -> EvalOutcome {
        let tokens = match lexer::tokenize(source) {
            Ok(tokens) => tokens,
            Err(error) => {
                let diagnostic =
                    Diagnostic::new(DiagnosticKind::Scan, None, error.to_string());
                self.errors_reported += 1;
                (self.handlers.scan)(&diagnostic);
                return EvalOutcome::None;
            }
        };

        let stmts = match parser::parse_tokens(tokens, &mut self.ids, self.repl) {
            Ok(stmts) => stmts,
            Err(error) => {
                let diagnostic =
                    Diagnostic::new(DiagnosticKind::Parse, None, error.to_string());
                self.errors_reported += 1;
                (self.handlers.parse)(&diagnostic);
                return EvalOutcome::None;
            }
        };
        if stmts.is_empty() {
            return EvalOutcome::None;
        }

        let program = || self.history.iter().chain(stmts.iter());

        let (bindings, resolve_diags) = Resolver::new(&self.natives).resolve(program());
        if !resolve_diags.is_empty() {
            self.errors_reported += resolve_diags.len();
            for diagnostic in &resolve_diags {
                (self.handlers.resolve)(diagnostic);
            }
            return EvalOutcome::None;
        }

        let type_diags = TypeResolver::new(&bindings).run(program());
        if !type_diags.is_empty() {
            self.errors_reported += type_diags.len();
            for diagnostic in &type_diags {
                (self.handlers.types)(diagnostic);
            }
            return EvalOutcome::None;
        }

        let validation_diags = TypeValidator::new(&bindings).run(program());
        if !validation_diags.is_empty() {
            self.errors_reported += validation_diags.len();
            for diagnostic in &validation_diags {
                (self.handlers.types)(diagnostic);
            }
            return EvalOutcome::None;
        }

        // The batch is accepted; from here on runtime failures no longer
        // roll it back.
        let start = self.history.len();
        self.history.extend(stmts);
        let new_stmts = &self.history[start..];

        let single_expression = match new_stmts {
            [Stmt::Expression(expr)] if !matches!(expr.kind, ExprKind::Empty) => Some(expr),
            _ => None,
        };

        let mut evaluator = Evaluator::new(
            &bindings,
            &self.natives,
            Rc::clone(&self.globals),
            &mut *self.output,
        );
        let result = match single_expression {
            Some(expr) => evaluator.eval_expression(expr).map(Some),
            None => evaluator.exec_block(new_stmts).and_then(|exec| match exec {
                ExecResult::Continue => Ok(None),
                ExecResult::Return(_) => Err(RuntimeError::bare(RuntimeErrorKind::Internal(
                    "return signal escaped to top level",
                ))),
            }),
        };

        match result {
            Ok(Some(value)) => EvalOutcome::Value(value),
            Ok(None) => EvalOutcome::None,
            Err(error) => {
                let diagnostic =
                    Diagnostic::new(DiagnosticKind::Runtime, error.line, error.kind.to_string());
                self.errors_reported += 1;
                (self.handlers.runtime)(&diagnostic);
                EvalOutcome::Void
            }
        }
    }
}
