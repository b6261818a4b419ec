//! Semantic analysis and evaluation for Metro programs.
//!
//! `metro-core` owns everything purely syntactic (lex/parse/AST); this crate
//! owns everything that needs the whole program in view: Sema (spec.md 4.3)
//! and the tree-walking evaluator (spec.md 4.4), plus the fixed built-in
//! function table (spec.md 6.3) they both resolve against.

pub mod builtins;
pub mod error;
mod interpreter;
mod sema;

pub use error::RuntimeError;
pub use interpreter::{run_program, Value};
pub use sema::check_program;
