//! Declaration pre-registration (spec.md 4.3 step 2).
//!
//! `DeclId` is a single index space shared by struct and enum declarations
//! (used from `TypeExpr::decl` and `Subscript::Member::enum_decl`) and,
//! separately, by function declarations (used from `CallFunc::callee`) --
//! which arena a `DeclId` indexes into is determined by the use site, the
//! same convention `metro_core::ids` documents for breaking the AST's cyclic
//! references.

use metro_core::ast::{Node, NodeKind};
use metro_core::ids::DeclId;

pub struct FunctionInfo<'a> {
    pub node: &'a Node,
    pub name: String,
    pub have_self: bool,
    pub impl_target: Option<String>,
}

pub struct StructInfo<'a> {
    pub node: &'a Node,
    pub name: String,
}

pub struct EnumInfo<'a> {
    pub node: &'a Node,
    pub name: String,
}

pub enum UserTypeInfo<'a> {
    Struct(StructInfo<'a>),
    Enum(EnumInfo<'a>),
}

impl<'a> UserTypeInfo<'a> {
    pub fn name(&self) -> &str {
        match self {
            UserTypeInfo::Struct(s) => &s.name,
            UserTypeInfo::Enum(e) => &e.name,
        }
    }
}

#[derive(Default)]
pub struct DeclTable<'a> {
    pub user_types: Vec<UserTypeInfo<'a>>,
    pub functions: Vec<FunctionInfo<'a>>,
}

impl<'a> DeclTable<'a> {
    pub fn find_user_type(&self, name: &str) -> Option<DeclId> {
        self.user_types.iter().position(|t| t.name() == name).map(|i| DeclId(i as u32))
    }

    pub fn user_type(&self, id: DeclId) -> &UserTypeInfo<'a> {
        &self.user_types[id.0 as usize]
    }

    pub fn function(&self, id: DeclId) -> &FunctionInfo<'a> {
        &self.functions[id.0 as usize]
    }

    /// Walks top-level items (and the bodies of `impl` blocks) registering
    /// every `Struct`, `Enum`, and `Function` so forward references resolve
    /// (spec.md 4.3: "Function pre-registration").
    pub fn build(items: &'a [Node]) -> DeclTable<'a> {
        let mut table = DeclTable::default();
        for item in items {
            match &item.kind {
                NodeKind::Struct { name, .. } => {
                    table.user_types.push(UserTypeInfo::Struct(StructInfo { node: item, name: name.clone() }));
                }
                NodeKind::Enum { name, .. } => {
                    table.user_types.push(UserTypeInfo::Enum(EnumInfo { node: item, name: name.clone() }));
                }
                _ => {}
            }
        }
        for item in items {
            match &item.kind {
                NodeKind::Function { name, have_self, .. } => {
                    table.functions.push(FunctionInfo { node: item, name: name.clone(), have_self: *have_self, impl_target: None });
                }
                NodeKind::Impl { target, functions } => {
                    for f in functions {
                        if let NodeKind::Function { name, have_self, .. } = &f.kind {
                            table.functions.push(FunctionInfo {
                                node: f,
                                name: name.clone(),
                                have_self: *have_self,
                                impl_target: Some(target.clone()),
                            });
                        }
                    }
                }
                _ => {}
            }
        }
        table
    }
}
