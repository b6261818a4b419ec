//! The fixed built-in function table (spec.md 6.3). Shared between Sema
//! (signature resolution, here) and the evaluator (dispatch, in
//! `interpreter::builtins`), keyed by the same [`BuiltinId`] space.

use metro_core::ids::BuiltinId;
use metro_core::types::{Type, TypeKind};

/// Order fixes each built-in's [`BuiltinId`]; keep `name_of`/`resolve` in sync.
pub const NAMES: &[&str] = &["print", "println", "id", "type", "to_string", "length", "push", "substr", "replace", "input", "open", "exit"];

pub fn name_of(id: BuiltinId) -> &'static str {
    NAMES[id.0 as usize]
}

fn id_for(name: &str) -> BuiltinId {
    BuiltinId(NAMES.iter().position(|n| *n == name).expect("known builtin name") as u32)
}

/// Resolves `name(args)` (or `receiver.name(args)` when `have_self`) against
/// the built-in table, returning its id and result type.
pub fn resolve(name: &str, have_self: bool, receiver: Option<&Type>, args: &[Type]) -> Option<(BuiltinId, Type)> {
    let matched = match name {
        "print" | "println" if !have_self => true,
        "id" | "type" | "to_string" if !have_self && args.len() == 1 => true,
        "length" if !have_self && args.len() == 1 && args[0].kind == TypeKind::String => true,
        "push" if have_self && receiver.map(|r| r.kind == TypeKind::Vector).unwrap_or(false) && args.len() == 1 => true,
        "substr" if have_self && receiver.map(|r| r.kind == TypeKind::String).unwrap_or(false) && args.len() == 1 && args[0].is_integer() => true,
        "replace" if have_self
            && receiver.map(|r| r.kind == TypeKind::String).unwrap_or(false)
            && args.len() == 2
            && args[0].kind == TypeKind::String
            && args[1].kind == TypeKind::String =>
        {
            true
        }
        "input" if !have_self && args.is_empty() => true,
        "open" if !have_self && args.len() == 1 && args[0].kind == TypeKind::String => true,
        "exit" if !have_self && args.len() == 1 && args[0].kind == TypeKind::Int => true,
        _ => false,
    };
    if !matched {
        return None;
    }
    let result = match name {
        "print" | "println" => Type::int(),
        "id" | "type" | "to_string" | "substr" | "replace" | "input" | "open" => Type::string(),
        "length" => Type::int(),
        "push" | "exit" => Type::none(),
        _ => unreachable!(),
    };
    Some((id_for(name), result))
}
