//! Runtime value representation (spec.md 3.4/9). Aggregate kinds
//! (`Vector`/`Dict`/`UserType`) hold `Rc<RefCell<..>>` so assigning or
//! passing one around shares the underlying storage, the way the original's
//! manually ref-counted handles did -- Rust's `Drop` retires the allocation
//! instead of the teacher's/original's explicit refcount decrement.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use metro_core::ast::NodeKind;
use metro_core::ids::DeclId;

use crate::sema::decls::{DeclTable, UserTypeInfo};

#[derive(Debug, Clone)]
pub enum Value {
    None,
    Int(i64),
    USize(u64),
    Float(f32),
    Bool(bool),
    Char(char),
    String(Rc<str>),
    Range(i64, i64),
    Vector(Rc<RefCell<Vec<Value>>>),
    Dict(Rc<RefCell<Vec<(Value, Value)>>>),
    UserType(DeclId, Rc<RefCell<Vec<Value>>>),
    Enumerator { decl: DeclId, index: u32, payload: Option<Rc<Value>> },
}

impl Value {
    pub fn string(s: impl Into<String>) -> Value {
        Value::String(Rc::from(s.into()))
    }

    pub fn vector(items: Vec<Value>) -> Value {
        Value::Vector(Rc::new(RefCell::new(items)))
    }

    pub fn dict(pairs: Vec<(Value, Value)>) -> Value {
        Value::Dict(Rc::new(RefCell::new(pairs)))
    }

    pub fn user_type(decl: DeclId, fields: Vec<Value>) -> Value {
        Value::UserType(decl, Rc::new(RefCell::new(fields)))
    }

    /// The name `type()`/`id()` report (spec.md 6.3).
    pub fn type_name(&self) -> String {
        match self {
            Value::None => "None".to_string(),
            Value::Int(_) => "Int".to_string(),
            Value::USize(_) => "USize".to_string(),
            Value::Float(_) => "Float".to_string(),
            Value::Bool(_) => "Bool".to_string(),
            Value::Char(_) => "Char".to_string(),
            Value::String(_) => "String".to_string(),
            Value::Range(..) => "Range".to_string(),
            Value::Vector(_) => "Vector".to_string(),
            Value::Dict(_) => "Dict".to_string(),
            Value::UserType(..) => "Struct".to_string(),
            Value::Enumerator { .. } => "Enum".to_string(),
        }
    }

    /// The text `print`/`println`/`to_string` emit (spec.md 6.3).
    pub fn display_string(&self) -> String {
        match self {
            Value::None => "none".to_string(),
            Value::Int(v) => v.to_string(),
            Value::USize(v) => v.to_string(),
            Value::Float(v) => v.to_string(),
            Value::Bool(v) => v.to_string(),
            Value::Char(c) => c.to_string(),
            Value::String(s) => s.to_string(),
            Value::Range(a, b) => format!("{a}..{b}"),
            Value::Vector(items) => {
                let items = items.borrow();
                let joined: Vec<String> = items.iter().map(Value::display_string).collect();
                format!("[{}]", joined.join(", "))
            }
            Value::Dict(pairs) => {
                let pairs = pairs.borrow();
                let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{}: {}", k.display_string(), v.display_string())).collect();
                format!("{{{}}}", joined.join(", "))
            }
            Value::UserType(_, fields) => {
                let fields = fields.borrow();
                let joined: Vec<String> = fields.iter().map(Value::display_string).collect();
                format!("({})", joined.join(", "))
            }
            Value::Enumerator { index, payload, .. } => match payload {
                Some(p) => format!("#{index}({})", p.display_string()),
                None => format!("#{index}"),
            },
        }
    }

    /// `display_string`, but rendering `UserType`/`Enumerator` with their
    /// declared names instead of raw positions: `TypeName { field: value, ... }`
    /// for structs, `EnumName.Variant`/`EnumName.Variant(payload)` for
    /// enumerators (spec.md 6.3 `to_string`/`print`/`println`). Everything
    /// else delegates straight to `display_string`.
    pub fn display_with(&self, table: &DeclTable) -> String {
        match self {
            Value::Vector(items) => {
                let items = items.borrow();
                let joined: Vec<String> = items.iter().map(|v| v.display_with(table)).collect();
                format!("[{}]", joined.join(", "))
            }
            Value::Dict(pairs) => {
                let pairs = pairs.borrow();
                let joined: Vec<String> = pairs.iter().map(|(k, v)| format!("{}: {}", k.display_with(table), v.display_with(table))).collect();
                format!("{{{}}}", joined.join(", "))
            }
            Value::UserType(decl, fields) => {
                let fields = fields.borrow();
                let UserTypeInfo::Struct(info) = table.user_type(*decl) else {
                    unreachable!("a UserType value always names a struct declaration")
                };
                let NodeKind::Struct { members, .. } = &info.node.kind else {
                    unreachable!("DeclId always indexes a Struct node here")
                };
                let joined: Vec<String> =
                    members.iter().zip(fields.iter()).map(|(m, v)| format!("{}: {}", m.name, v.display_with(table))).collect();
                format!("{} {{ {} }}", info.name, joined.join(", "))
            }
            Value::Enumerator { decl, index, payload } => {
                let UserTypeInfo::Enum(info) = table.user_type(*decl) else {
                    unreachable!("an Enumerator value always names an enum declaration")
                };
                let NodeKind::Enum { enumerators, .. } = &info.node.kind else {
                    unreachable!("DeclId always indexes an Enum node here")
                };
                let variant = &enumerators[*index as usize].name;
                match payload {
                    Some(p) => format!("{}.{}({})", info.name, variant, p.display_with(table)),
                    None => format!("{}.{}", info.name, variant),
                }
            }
            other => other.display_string(),
        }
    }

    /// Identity string for the `id()` builtin: a stable address-like tag for
    /// reference-backed values, a value tag for everything else.
    pub fn identity_string(&self) -> String {
        match self {
            Value::Vector(rc) => format!("vector:{:p}", Rc::as_ptr(rc)),
            Value::Dict(rc) => format!("dict:{:p}", Rc::as_ptr(rc)),
            Value::UserType(_, rc) => format!("struct:{:p}", Rc::as_ptr(rc)),
            Value::String(rc) => format!("string:{:p}", Rc::as_ptr(rc)),
            other => format!("{}:{}", other.type_name(), other.display_string()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::USize(a), Value::USize(b)) => a == b,
            (Value::Int(a), Value::USize(b)) | (Value::USize(b), Value::Int(a)) => *a >= 0 && *a as u64 == *b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Range(a1, a2), Value::Range(b1, b2)) => a1 == b1 && a2 == b2,
            (Value::Vector(a), Value::Vector(b)) => *a.borrow() == *b.borrow(),
            (Value::Dict(a), Value::Dict(b)) => *a.borrow() == *b.borrow(),
            (Value::UserType(da, a), Value::UserType(db, b)) => da == db && *a.borrow() == *b.borrow(),
            (Value::Enumerator { decl: da, index: ia, payload: pa }, Value::Enumerator { decl: db, index: ib, payload: pb }) => {
                da == db && ia == ib && pa.as_deref() == pb.as_deref()
            }
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display_string())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn int_and_usize_cross_compare_by_value() {
        assert_eq!(Value::Int(3), Value::USize(3));
        assert_eq!(Value::USize(3), Value::Int(3));
        assert_ne!(Value::Int(-1), Value::USize(0));
    }

    #[test]
    fn vector_equality_is_structural_not_by_identity() {
        let a = Value::vector(vec![Value::Int(1), Value::Int(2)]);
        let b = Value::vector(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(a, b);
    }

    #[test]
    fn vector_clone_shares_storage() {
        let a = Value::vector(vec![Value::Int(1)]);
        let b = a.clone();
        if let Value::Vector(rc) = &a {
            rc.borrow_mut().push(Value::Int(2));
        }
        assert_eq!(b, Value::vector(vec![Value::Int(1), Value::Int(2)]));
    }

    #[test]
    fn display_string_formats_aggregates() {
        let v = Value::vector(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(v.display_string(), "[1, 2]");

        let d = Value::dict(vec![(Value::string("a"), Value::Int(1))]);
        assert_eq!(d.display_string(), "{a: 1}");
    }

    #[test]
    fn display_with_formats_structs_and_enums_by_name() {
        use metro_core::diagnostics::{CollectingSink, DiagnosticSink};
        use metro_core::source::SourceStore;

        let src = "struct Point { x: Int, y: Int } enum Shape { Circle(Int), Origin }";
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", src.to_string());
        let mut sink = CollectingSink::new();
        let tokens = metro_core::lex(&store, id, &mut sink);
        let (items, parse_ok) = metro_core::parse_file(&tokens, id, &mut sink);
        assert!(parse_ok && !sink.has_errors());
        let table = DeclTable::build(&items);

        let p = Value::user_type(DeclId(0), vec![Value::Int(3), Value::Int(4)]);
        assert_eq!(p.display_with(&table), "Point { x: 3, y: 4 }");

        let with_payload = Value::Enumerator { decl: DeclId(1), index: 0, payload: Some(Rc::new(Value::Int(9))) };
        assert_eq!(with_payload.display_with(&table), "Shape.Circle(9)");

        let without_payload = Value::Enumerator { decl: DeclId(1), index: 1, payload: None };
        assert_eq!(without_payload.display_with(&table), "Shape.Origin");
    }

    #[test]
    fn identity_string_distinguishes_distinct_vectors() {
        let a = Value::vector(vec![]);
        let b = Value::vector(vec![]);
        assert_ne!(a.identity_string(), b.identity_string());
        assert_eq!(a.identity_string(), a.clone().identity_string());
    }

    #[test]
    fn type_name_matches_spec_vocabulary() {
        assert_eq!(Value::Int(1).type_name(), "Int");
        assert_eq!(Value::Bool(true).type_name(), "Bool");
        assert_eq!(Value::string("x").type_name(), "String");
    }
}
