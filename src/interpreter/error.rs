use thiserror::Error;

use crate::token::Token;

/// Typed runtime failures raised by the evaluator. Evaluation aborts on the
/// first one; the driver renders it as `[line <n>] <message>`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    #[error("Undefined identifier '{name}'")]
    UndefinedIdentifier { name: String },
    #[error("Operand must be a number")]
    NonNumericOperand,
    #[error("Operands must be numbers")]
    NonNumericOperands,
    #[error("Operands must both be strings or both be numbers")]
    MixedAddOperands,
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Integer overflow")]
    IntegerOverflow,
    #[error("Object of type {type_name} is not callable")]
    NotCallable { type_name: &'static str },
    #[error("Function '{name}' has {expected} parameter(s) but was called with {found} argument(s)")]
    FunctionArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("Method '{method}' has {expected} parameter(s) but was called with {found} argument(s)")]
    MethodArityMismatch {
        method: String,
        expected: usize,
        found: usize,
    },
    #[error("Unknown method '{method}' for type {type_name}")]
    UnknownMethod {
        method: String,
        type_name: &'static str,
    },
    #[error("No arguments left")]
    NoArgumentsLeft,
    /// A host exception reflected in as a runtime error.
    #[error("{0}")]
    Native(String),
    #[error("Runtime invariant violated: {0}")]
    Internal(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    pub line: Option<usize>,
    pub kind: RuntimeErrorKind,
}

impl RuntimeError {
    pub fn new(token: &Token, kind: RuntimeErrorKind) -> Self {
        Self {
            line: Some(token.line),
            kind,
        }
    }

    pub fn bare(kind: RuntimeErrorKind) -> Self {
        Self { line: None, kind }
    }
}

impl std::fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            Some(line) => write!(f, "[line {line}] {}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

impl std::error::Error for RuntimeError {}
