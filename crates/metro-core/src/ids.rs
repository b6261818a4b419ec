//! Stable integer handles used to break cycles between declarations and their
//! use sites (spec.md 9, "Cyclic AST relations").
//!
//! `CallFunc -> Function` and `Type -> Struct/Enum` back-references are
//! non-owning: the AST remains a pure tree of `Box`-owned nodes, and use
//! sites store a `DeclId` that indexes into an arena Sema builds during
//! pre-registration.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies a `Function`, `Struct`, `Enum`, or `Impl` declaration
/// registered in the root scope, independent of where it lives in the AST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeclId(pub u32);

impl fmt::Display for DeclId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a built-in function from the table in spec.md 6.3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuiltinId(pub u32);

impl fmt::Display for BuiltinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
