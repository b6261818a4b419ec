//! Core error types for metro-core.
//!
//! Uses `thiserror` for structured, matchable error variants covering
//! source loading and import resolution. Lex/parse/semantic/runtime failures
//! are not modeled here -- those are [`crate::diagnostics::Diagnostic`]s,
//! since many of them accumulate per run instead of short-circuiting.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while loading source files, before lexing even starts.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A source path could not be opened.
    #[error("cannot open source file '{path}': {reason}")]
    FileOpen { path: PathBuf, reason: String },

    /// A source file was not valid UTF-8.
    #[error("source file '{path}' is not valid UTF-8")]
    InvalidUtf8 { path: PathBuf },

    /// `import` reached a file that is an ancestor of the current import
    /// chain.
    #[error("cannot import recursively: '{path}' is already being imported")]
    RecursiveImport { path: PathBuf },
}
