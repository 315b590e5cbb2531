//! Execution errors

use thiserror::Error;

/// Failure while interpreting an IR module
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecError {
    #[error("assertion failed: expected {expected}, got {actual}")]
    AssertionFailed { expected: i64, actual: i64 },

    #[error("null pointer access at {address:#x}")]
    NullPointer { address: i64 },

    #[error("out of bounds access of {size} bytes at {address:#x}")]
    OutOfBounds { address: i64, size: usize },

    #[error("stack overflow: frame needs {requested} bytes")]
    StackOverflow { requested: usize },

    #[error("program image of {needed} bytes does not fit in {available} bytes of memory")]
    OutOfMemory { needed: usize, available: usize },

    #[error("call depth exceeds {limit}")]
    CallDepthExceeded { limit: usize },

    #[error("step limit of {limit} instructions exceeded")]
    StepLimitExceeded { limit: u64 },

    #[error("undefined function '{0}'")]
    UndefinedFunction(String),

    #[error("undefined symbol '{0}'")]
    UndefinedSymbol(String),

    #[error("unknown label '{0}'")]
    UnknownLabel(String),

    #[error("function '{name}' expects {expected} arguments, got {got}")]
    ArgumentCount { name: String, expected: usize, got: usize },

    #[error("division by zero")]
    DivisionByZero,
}

pub type ExecResult<T> = Result<T, ExecError>;
