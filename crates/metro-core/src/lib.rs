//! Source, lexer, parser, and AST data model shared by `metro-check` and
//! `metro-cli`.
//!
//! This crate owns everything that is purely syntactic: reading files into a
//! [`source::SourceStore`], turning their text into [`token::Token`]
//! sequences, parsing those into an [`ast::Node`] tree, and the structural
//! [`types::Type`] descriptor that Sema will populate during type checking.
//! It has no notion of scopes, values, or evaluation -- that lives in
//! `metro-check`.

pub mod ast;
pub mod diagnostics;
pub mod error;
pub mod ids;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod token;
pub mod types;
pub mod walker;

pub use ast::{Node, NodeKind};
pub use diagnostics::{CollectingSink, Diagnostic, DiagnosticKind, DiagnosticSink, Severity};
pub use error::CoreError;
pub use ids::{BuiltinId, DeclId};
pub use lexer::lex;
pub use parser::parse_file;
pub use source::{SourceFile, SourceId, SourceStore};
pub use token::{PunctuatorKind, Token, TokenKind};
pub use types::{Type, TypeKind};
