//! Runtime error types for the evaluator (spec.md 7, "Runtime errors").
//!
//! Unlike Sema's diagnostics, which accumulate in a [`metro_core::DiagnosticSink`]
//! while checking keeps going, a `RuntimeError` halts evaluation outright: it
//! is returned up the call stack to the driver, which renders it as a
//! diagnostic and picks the process exit code.

use metro_core::token::Location;

#[derive(Debug, Clone, thiserror::Error)]
pub enum RuntimeError {
    #[error("division by zero")]
    DivisionByZero { span: Location },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { span: Location, index: i64, len: usize },

    #[error("key not found in dict")]
    KeyNotFound { span: Location },

    #[error("could not open '{path}': {reason}")]
    FileOpenFailure { span: Location, path: String, reason: String },

    #[error("{message}")]
    Builtin { span: Location, message: String },
}

impl RuntimeError {
    pub fn span(&self) -> Location {
        match self {
            RuntimeError::DivisionByZero { span }
            | RuntimeError::IndexOutOfRange { span, .. }
            | RuntimeError::KeyNotFound { span }
            | RuntimeError::FileOpenFailure { span, .. }
            | RuntimeError::Builtin { span, .. } => *span,
        }
    }
}
