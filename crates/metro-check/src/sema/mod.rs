//! Semantic analyzer (spec.md 4.3): name resolution, type inference, call
//! binding, and the recursive-type guard, over the parser's annotated-in-place
//! AST.

pub(crate) mod decls;
mod rules;
mod scope;

use std::cell::Cell;

use metro_core::ast::{ArithOp, CmpOp, Node, NodeKind, Subscript, VarSlot};
use metro_core::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use metro_core::ids::{BuiltinId, DeclId};
use metro_core::token::{Location, Token};
use metro_core::types::{Type, TypeKind};

use decls::{DeclTable, UserTypeInfo};
use scope::ScopeStack;

/// Runs Sema over a whole compilation unit's top-level items. Returns `true`
/// iff no error-severity diagnostic was emitted -- the gate the driver checks
/// before running the evaluator (spec.md 2).
pub fn check_program<'a>(items: &'a [Node], tokens: &'a [Token], sink: &'a mut dyn DiagnosticSink) -> bool {
    let table = DeclTable::build(items);
    let cache_len = table.user_types.len();
    let mut checker = Checker {
        table,
        scopes: ScopeStack::new(),
        tokens,
        sink,
        func_result_stack: Vec::new(),
        return_capture_stack: Vec::new(),
        resolving_user_types: Vec::new(),
        user_type_cache: vec![None; cache_len],
    };
    checker.check_recursive_types();
    checker.scopes.push(false);
    for item in items {
        checker.check_node(item);
    }
    checker.scopes.pop();
    !checker.sink.has_errors()
}

struct Checker<'a> {
    table: DeclTable<'a>,
    scopes: ScopeStack,
    tokens: &'a [Token],
    sink: &'a mut dyn DiagnosticSink,
    /// Declared result type of each function currently being checked, innermost last.
    func_result_stack: Vec<Type>,
    /// Types of every `Return` reached while checking the innermost function (spec.md 4.3.5).
    return_capture_stack: Vec<Vec<Type>>,
    resolving_user_types: Vec<DeclId>,
    user_type_cache: Vec<Option<Type>>,
}

fn is_empty_literal(node: &Node) -> bool {
    match &node.kind {
        NodeKind::Vector(items) => items.is_empty(),
        NodeKind::Dict { pairs, .. } => pairs.is_empty(),
        _ => false,
    }
}

impl<'a> Checker<'a> {
    fn loc(&self, tok: u32) -> Location {
        self.tokens[tok as usize].loc
    }

    fn node_loc(&self, node: &Node) -> Location {
        self.loc(node.span.start_tok)
    }

    fn error(&mut self, kind: DiagnosticKind, loc: Location, message: String) {
        self.sink.emit(Diagnostic::error(kind, loc, message));
    }

    fn check_node(&mut self, node: &Node) -> Type {
        if let Some(t) = node.cached_type() {
            return t;
        }
        let ty = self.infer(node);
        node.set_cached_type(ty.clone());
        ty
    }

    // ---- recursive-type guard (spec.md 4.3 step 1) ----

    fn check_recursive_types(&mut self) {
        for i in 0..self.table.user_types.len() {
            let mut path = Vec::new();
            self.walk_user_type_for_cycle(DeclId(i as u32), &mut path);
        }
    }

    fn walk_user_type_for_cycle(&mut self, id: DeclId, path: &mut Vec<DeclId>) {
        if path.contains(&id) {
            let name = self.table.user_type(id).name().to_string();
            let loc = self.decl_loc(id);
            self.error(DiagnosticKind::RecursiveType, loc, format!("type '{name}' is recursive and has infinite size"));
            return;
        }
        path.push(id);
        for ty_node in self.member_type_nodes(id) {
            if let NodeKind::TypeExpr { name, .. } = &ty_node.kind {
                if name == "Vector" || name == "Dict" {
                    continue;
                }
                if let Some(next) = self.table.find_user_type(name) {
                    self.walk_user_type_for_cycle(next, path);
                }
            }
        }
        path.pop();
    }

    fn member_type_nodes(&self, id: DeclId) -> Vec<&'a Node> {
        let node: &'a Node = match self.table.user_type(id) {
            UserTypeInfo::Struct(s) => s.node,
            UserTypeInfo::Enum(e) => e.node,
        };
        match &node.kind {
            NodeKind::Struct { members, .. } => members.iter().map(|m| &m.ty).collect(),
            NodeKind::Enum { enumerators, .. } => enumerators.iter().filter_map(|en| en.payload.as_ref()).collect(),
            _ => vec![],
        }
    }

    fn decl_loc(&self, id: DeclId) -> Location {
        let node: &'a Node = match self.table.user_type(id) {
            UserTypeInfo::Struct(s) => s.node,
            UserTypeInfo::Enum(e) => e.node,
        };
        self.node_loc(node)
    }

    // ---- type-expr resolution ----

    fn resolve_type_expr(&mut self, node: &Node) -> Type {
        if let Some(t) = node.cached_type() {
            return t;
        }
        let (name, params, is_const, decl_cell) = match &node.kind {
            NodeKind::TypeExpr { name, params, is_const, decl } => (name.as_str(), params, *is_const, decl),
            _ => return Type::none(),
        };
        let mut ty = match name {
            "None" => Type::none(),
            "Int" => Type::int(),
            "USize" => Type::usize_(),
            "Float" => Type::float(),
            "Bool" => Type::bool_(),
            "Char" => Type::char_(),
            "String" => Type::string(),
            "Range" => Type::range(),
            "Args" => Type::args(),
            "Vector" => {
                let elem = params.first().map(|p| self.resolve_type_expr(p)).unwrap_or_else(Type::none);
                Type::vector(elem)
            }
            "Dict" => {
                let key = params.first().map(|p| self.resolve_type_expr(p)).unwrap_or_else(Type::none);
                let val = params.get(1).map(|p| self.resolve_type_expr(p)).unwrap_or_else(Type::none);
                Type::dict(key, val)
            }
            other => {
                if let Some(id) = self.table.find_user_type(other) {
                    decl_cell.set(Some(id));
                    self.resolve_user_type(id)
                } else {
                    self.error(DiagnosticKind::Undefined, self.node_loc(node), format!("unknown type '{other}'"));
                    Type::none()
                }
            }
        };
        ty.is_const = is_const;
        node.set_cached_type(ty.clone());
        ty
    }

    fn resolve_user_type(&mut self, id: DeclId) -> Type {
        if let Some(Some(t)) = self.user_type_cache.get(id.0 as usize) {
            return t.clone();
        }
        if self.resolving_user_types.contains(&id) {
            // Cycle: the recursive-type guard already reported this; return a
            // stub so resolution terminates instead of recursing forever.
            return Type::user_def(id, vec![]);
        }
        self.resolving_user_types.push(id);
        let (node, is_struct): (&'a Node, bool) = match self.table.user_type(id) {
            UserTypeInfo::Struct(s) => (s.node, true),
            UserTypeInfo::Enum(e) => (e.node, false),
        };
        let ty = if is_struct {
            if let NodeKind::Struct { members, .. } = &node.kind {
                let pairs: Vec<(String, &Node)> = members.iter().map(|m| (m.name.clone(), &m.ty)).collect();
                let resolved: Vec<(String, Type)> = pairs.into_iter().map(|(n, t)| (n, self.resolve_type_expr(t))).collect();
                Type::user_def(id, resolved)
            } else {
                Type::user_def(id, vec![])
            }
        } else {
            Type::enumerator(id)
        };
        self.resolving_user_types.pop();
        self.user_type_cache[id.0 as usize] = Some(ty.clone());
        ty
    }

    // ---- function resolution (spec.md 4.3.4) ----

    fn function_param_types(&mut self, idx: usize) -> Vec<Type> {
        let node = self.table.function(DeclId(idx as u32)).node;
        if let NodeKind::Function { params, .. } = &node.kind {
            params.iter().map(|p| self.resolve_type_expr(&p.ty)).collect()
        } else {
            vec![]
        }
    }

    fn function_result_type(&mut self, idx: usize) -> Type {
        let node = self.table.function(DeclId(idx as u32)).node;
        if let NodeKind::Function { result_type, .. } = &node.kind {
            result_type.as_ref().map(|t| self.resolve_type_expr(t)).unwrap_or_else(Type::none)
        } else {
            Type::none()
        }
    }

    fn find_member_function(&mut self, name: &str, recv: &Type, arg_types: &[Type]) -> Option<(DeclId, Type)> {
        let recv_name = self.table.user_type(recv.decl?).name().to_string();
        let candidates: Vec<usize> = self
            .table
            .functions
            .iter()
            .enumerate()
            .filter(|(_, info)| info.name == name && info.have_self && info.impl_target.as_deref() == Some(recv_name.as_str()))
            .map(|(i, _)| i)
            .collect();
        for i in candidates {
            let params = self.function_param_types(i);
            if params.len() == arg_types.len() && params.iter().zip(arg_types).all(|(p, a)| rules::accepts(p, a, false)) {
                return Some((DeclId(i as u32), self.function_result_type(i)));
            }
        }
        None
    }

    fn find_free_function(&mut self, name: &str, arg_types: &[Type]) -> Option<(DeclId, Type)> {
        let candidates: Vec<usize> = self
            .table
            .functions
            .iter()
            .enumerate()
            .filter(|(_, info)| info.name == name && !info.have_self && info.impl_target.is_none())
            .map(|(i, _)| i)
            .collect();
        for i in candidates {
            let params = self.function_param_types(i);
            if params.len() == arg_types.len() && params.iter().zip(arg_types).all(|(p, a)| rules::accepts(p, a, false)) {
                return Some((DeclId(i as u32), self.function_result_type(i)));
            }
        }
        None
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_call(
        &mut self,
        name: &str,
        have_self: bool,
        receiver: Option<&Type>,
        arg_types: &[Type],
        loc: Location,
        is_builtin: &Cell<bool>,
        builtin_func: &Cell<Option<BuiltinId>>,
        callee: &Cell<Option<DeclId>>,
    ) -> Type {
        if let Some(recv) = receiver {
            if let Some((id, result)) = self.find_member_function(name, recv, arg_types) {
                callee.set(Some(id));
                return result;
            }
        } else if let Some((id, result)) = self.find_free_function(name, arg_types) {
            callee.set(Some(id));
            return result;
        }
        if let Some((id, result)) = crate::builtins::resolve(name, have_self, receiver, arg_types) {
            is_builtin.set(true);
            builtin_func.set(Some(id));
            return result;
        }
        self.error(DiagnosticKind::Undefined, loc, format!("no matching function '{name}' for the given arguments"));
        Type::none()
    }

    // ---- enum-literal / index-ref (spec.md 4.3.2) ----

    fn find_enumerator_index(&mut self, enum_id: DeclId, name: &str) -> Option<(usize, Option<Type>)> {
        let node: &'a Node = match self.table.user_type(enum_id) {
            UserTypeInfo::Enum(e) => e.node,
            UserTypeInfo::Struct(_) => return None,
        };
        if let NodeKind::Enum { enumerators, .. } = &node.kind {
            let pos = enumerators.iter().position(|e| e.name == name)?;
            let payload_ty = enumerators[pos].payload.as_ref().map(|p| self.resolve_type_expr(p));
            Some((pos, payload_ty))
        } else {
            None
        }
    }

    fn check_enum_literal(&mut self, enum_id: DeclId, subs: &[Subscript], loc: Location) -> Type {
        if subs.len() != 1 {
            self.error(DiagnosticKind::InvalidSyntax, loc, "enum literal access takes exactly one subscript".to_string());
            return Type::none();
        }
        match &subs[0] {
            Subscript::Member { name, enum_decl, enumerator_index, .. } => match self.find_enumerator_index(enum_id, name) {
                Some((idx, _)) => {
                    enum_decl.set(Some(enum_id));
                    enumerator_index.set(Some(idx as u32));
                    Type::enumerator(enum_id)
                }
                None => {
                    self.error(DiagnosticKind::Undefined, loc, format!("enum has no enumerator '{name}'"));
                    Type::none()
                }
            },
            Subscript::Call { name, args, enum_decl, enumerator_index, .. } => match self.find_enumerator_index(enum_id, name) {
                Some((idx, payload_ty)) => {
                    if args.len() != 1 {
                        self.error(DiagnosticKind::InvalidSyntax, loc, format!("enumerator '{name}' takes exactly one payload argument"));
                    } else if matches!(args[0].kind, NodeKind::Wildcard) {
                        self.check_node(&args[0]);
                    } else {
                        let actual = self.check_node(&args[0]);
                        match &payload_ty {
                            Some(pt) if rules::accepts(pt, &actual, is_empty_literal(&args[0])) => {}
                            Some(_) => self.error(DiagnosticKind::TypeMismatch, loc, format!("enumerator '{name}' payload type mismatch")),
                            None => self.error(DiagnosticKind::TypeMismatch, loc, format!("enumerator '{name}' has no payload")),
                        }
                    }
                    enum_decl.set(Some(enum_id));
                    enumerator_index.set(Some(idx as u32));
                    Type::enumerator(enum_id)
                }
                None => {
                    self.error(DiagnosticKind::Undefined, loc, format!("enum has no enumerator '{name}'"));
                    Type::none()
                }
            },
            Subscript::Index(_) => {
                self.error(DiagnosticKind::InvalidSyntax, loc, "cannot index an enum literal".to_string());
                Type::none()
            }
        }
    }

    fn check_index_ref(&mut self, base: &Node, subs: &[Subscript], node: &Node) -> Type {
        let loc = self.node_loc(node);
        if let NodeKind::Variable { name, .. } = &base.kind {
            if self.scopes.resolve(name).is_none() {
                if let Some(id) = self.table.find_user_type(name) {
                    if matches!(self.table.user_type(id), UserTypeInfo::Enum(_)) {
                        return self.check_enum_literal(id, subs, loc);
                    }
                }
            }
        }
        let mut cur = self.check_node(base);
        for sub in subs {
            cur = self.check_subscript(&cur, sub, loc);
        }
        cur
    }

    fn check_subscript(&mut self, base: &Type, sub: &Subscript, loc: Location) -> Type {
        match sub {
            Subscript::Index(idx_node) => {
                let idx_ty = self.check_node(idx_node);
                match base.kind {
                    TypeKind::Vector => {
                        if !idx_ty.is_integer() {
                            self.error(DiagnosticKind::TypeMismatch, loc, "vector index must be Int or USize".to_string());
                        }
                        base.vector_elem().cloned().unwrap_or_else(Type::none)
                    }
                    TypeKind::String => {
                        if !idx_ty.is_integer() {
                            self.error(DiagnosticKind::TypeMismatch, loc, "string index must be Int or USize".to_string());
                        }
                        Type::char_()
                    }
                    TypeKind::Dict => {
                        let key = base.dict_key().cloned().unwrap_or_else(Type::none);
                        if !rules::accepts(&key, &idx_ty, false) {
                            self.error(DiagnosticKind::TypeMismatch, loc, "dict key type mismatch".to_string());
                        }
                        base.dict_value().cloned().unwrap_or_else(Type::none)
                    }
                    _ => {
                        self.error(DiagnosticKind::TypeMismatch, loc, "value is not indexable".to_string());
                        Type::none()
                    }
                }
            }
            Subscript::Member { name, member_index, .. } => {
                if base.kind != TypeKind::UserDef {
                    self.error(DiagnosticKind::TypeMismatch, loc, "member access on a non-struct value".to_string());
                    return Type::none();
                }
                match base.members.iter().position(|(n, _)| n == name) {
                    Some(i) => {
                        member_index.set(Some(i as u32));
                        base.members[i].1.clone()
                    }
                    None => {
                        self.error(DiagnosticKind::Undefined, loc, format!("no member '{name}'"));
                        Type::none()
                    }
                }
            }
            Subscript::Call { name, args, is_builtin, builtin_func, callee, is_membercall, .. } => {
                is_membercall.set(true);
                let arg_types: Vec<Type> = args.iter().map(|a| self.check_node(a)).collect();
                self.resolve_call(name, true, Some(base), &arg_types, loc, is_builtin, builtin_func, callee)
            }
        }
    }

    // ---- scope bodies (spec.md 4.4.1) ----

    /// Checks a `Scope` node's items inside a *new* frame (used for `if`/
    /// `loop`/`for`/`while` bodies, whose parameter-free scope is its own frame).
    fn check_body_scope(&mut self, node: &Node, is_loop: bool) -> Type {
        self.scopes.push(is_loop);
        let ty = self.check_scope_items_in_current_frame(node);
        self.scopes.pop();
        ty
    }

    /// Checks a `Scope` node's items in the *current* frame (used for function
    /// bodies, whose parameters already live in that frame).
    fn check_scope_items_in_current_frame(&mut self, node: &Node) -> Type {
        if let NodeKind::Scope { items, return_last_expr, .. } = &node.kind {
            let mut last = Type::none();
            for (i, item) in items.iter().enumerate() {
                let t = self.check_node(item);
                if *return_last_expr && i == items.len() - 1 {
                    last = t;
                }
            }
            node.set_cached_type(last.clone());
            last
        } else {
            self.check_node(node)
        }
    }

    // ---- the dispatcher ----

    fn infer(&mut self, node: &Node) -> Type {
        let loc = self.node_loc(node);
        match &node.kind {
            NodeKind::NoneLit => Type::none(),
            NodeKind::True | NodeKind::False => Type::bool_(),
            NodeKind::Wildcard => Type::none(),
            NodeKind::Value(lit) => match lit {
                metro_core::ast::Literal::Int(_) => Type::int(),
                metro_core::ast::Literal::USize(_) => Type::usize_(),
                metro_core::ast::Literal::Float(_) => Type::float(),
                metro_core::ast::Literal::Char(_) => Type::char_(),
                metro_core::ast::Literal::String(_) => Type::string(),
            },

            NodeKind::Variable { name, resolved } | NodeKind::MemberVariable { name, resolved } => {
                match self.scopes.resolve(name) {
                    Some((step, index, ty, _)) => {
                        resolved.set(Some(VarSlot { step, index }));
                        ty
                    }
                    None => {
                        self.error(DiagnosticKind::Undefined, loc, format!("undefined name '{name}'"));
                        Type::none()
                    }
                }
            }
            NodeKind::TypeExpr { .. } => self.resolve_type_expr(node),
            NodeKind::UserTypeName(_) | NodeKind::ImplName(_) => Type::none(),

            NodeKind::Vector(items) => {
                if items.is_empty() {
                    return Type::vector(Type::none());
                }
                let first = self.check_node(&items[0]);
                for it in &items[1..] {
                    let t = self.check_node(it);
                    if t != first {
                        self.error(DiagnosticKind::TypeMismatch, loc, "vector elements must share a type".to_string());
                    }
                }
                Type::vector(first)
            }
            NodeKind::Dict { pairs, key_type, value_type } => {
                let mut kt = key_type.as_ref().map(|t| self.resolve_type_expr(t));
                let mut vt = value_type.as_ref().map(|t| self.resolve_type_expr(t));
                for (k, v) in pairs {
                    let ktype = self.check_node(k);
                    let vtype = self.check_node(v);
                    match &kt {
                        Some(expect) if !rules::accepts(expect, &ktype, false) => {
                            self.error(DiagnosticKind::TypeMismatch, loc, "dict key type mismatch".to_string())
                        }
                        Some(_) => {}
                        None => kt = Some(ktype),
                    }
                    match &vt {
                        Some(expect) if !rules::accepts(expect, &vtype, false) => {
                            self.error(DiagnosticKind::TypeMismatch, loc, "dict value type mismatch".to_string())
                        }
                        Some(_) => {}
                        None => vt = Some(vtype),
                    }
                }
                Type::dict(kt.unwrap_or_else(Type::none), vt.unwrap_or_else(Type::none))
            }
            NodeKind::Range { begin, end } => {
                let b = self.check_node(begin);
                let e = self.check_node(end);
                if b.kind != TypeKind::Int || e.kind != TypeKind::Int {
                    self.error(DiagnosticKind::TypeMismatch, loc, "range bounds must be Int".to_string());
                }
                Type::range()
            }
            NodeKind::StructConstructor { type_name, fields } => {
                let tname = match &type_name.kind {
                    NodeKind::UserTypeName(n) => n.clone(),
                    _ => String::new(),
                };
                match self.table.find_user_type(&tname) {
                    Some(id) if matches!(self.table.user_type(id), UserTypeInfo::Struct(_)) => {
                        let struct_ty = self.resolve_user_type(id);
                        let members = struct_ty.members.clone();
                        let mismatched = fields.len() != members.len() || fields.iter().zip(&members).any(|(f, (n, _))| &f.name != n);
                        if mismatched {
                            self.error(DiagnosticKind::InvalidInitializer, loc, format!("struct initializer for '{tname}' has mismatched fields"));
                        }
                        for (f, (_, mty)) in fields.iter().zip(members.iter()) {
                            let vt = self.check_node(&f.value);
                            if !rules::accepts(mty, &vt, is_empty_literal(&f.value)) {
                                self.error(DiagnosticKind::TypeMismatch, loc, format!("field '{}' type mismatch", f.name));
                            }
                        }
                        struct_ty
                    }
                    _ => {
                        self.error(DiagnosticKind::Undefined, loc, format!("unknown struct '{tname}'"));
                        Type::none()
                    }
                }
            }

            NodeKind::UnaryPlus(e) | NodeKind::UnaryMinus(e) => {
                let t = self.check_node(e);
                if !t.is_numeric() {
                    self.error(DiagnosticKind::TypeMismatch, loc, "unary operator requires a numeric operand".to_string());
                }
                t
            }
            NodeKind::Cast { target, expr } => {
                let tt = self.resolve_type_expr(target);
                let et = self.check_node(expr);
                if !rules::can_cast(&et, &tt) {
                    self.error(DiagnosticKind::TypeMismatch, loc, "invalid cast".to_string());
                }
                tt
            }
            NodeKind::Expr { left, tail } => {
                let mut acc = self.check_node(left);
                for (op, rhs) in tail {
                    let rt = self.check_node(rhs);
                    match rules::check_arith(*op, &acc, &rt) {
                        Some(t) => acc = t,
                        None => {
                            self.error(DiagnosticKind::TypeMismatch, loc, format!("invalid operands for {op:?}"));
                            acc = Type::none();
                        }
                    }
                }
                acc
            }
            NodeKind::Compare { left, tail } => {
                let mut acc = self.check_node(left);
                for (op, rhs) in tail {
                    let rt = self.check_node(rhs);
                    if !rules::check_compare(*op, &acc, &rt) {
                        self.error(DiagnosticKind::TypeMismatch, loc, format!("invalid comparison for {op:?}"));
                    }
                    acc = rt;
                }
                Type::bool_()
            }
            NodeKind::Assign { target, value } => {
                let is_lvalue = matches!(target.kind, NodeKind::Variable { .. } | NodeKind::MemberVariable { .. } | NodeKind::IndexRef { .. });
                if !is_lvalue {
                    self.error(DiagnosticKind::InvalidSyntax, loc, "assignment target is not an l-value".to_string());
                }
                if let NodeKind::Variable { name, .. } = &target.kind {
                    if let Some((_, _, _, is_const)) = self.scopes.resolve(name) {
                        if is_const {
                            self.error(DiagnosticKind::InvalidInitializer, loc, format!("cannot assign to const '{name}'"));
                        }
                    }
                }
                let target_ty = self.check_node(target);
                let value_ty = self.check_node(value);
                if !rules::accepts(&target_ty, &value_ty, is_empty_literal(value)) {
                    self.error(DiagnosticKind::TypeMismatch, loc, "type mismatch in assignment".to_string());
                }
                Type::none()
            }
            NodeKind::IndexRef { base, subs } => self.check_index_ref(base, subs, node),

            NodeKind::CallFunc { name, args, is_builtin, builtin_func, callee, is_membercall } => {
                is_membercall.set(false);
                let arg_types: Vec<Type> = args.iter().map(|a| self.check_node(a)).collect();
                self.resolve_call(name, false, None, &arg_types, loc, is_builtin, builtin_func, callee)
            }

            NodeKind::VariableDeclaration { name, declared_type, init, index, is_shadowing, is_const, .. } => {
                let declared = declared_type.as_ref().map(|t| self.resolve_type_expr(t));
                let init_ty = init.as_ref().map(|i| self.check_node(i));
                let final_ty = match (&declared, &init_ty) {
                    (Some(d), Some(it)) => {
                        let empty = init.as_ref().map(|i| is_empty_literal(i)).unwrap_or(false);
                        if !rules::accepts(d, it, empty) {
                            self.error(DiagnosticKind::TypeMismatch, loc, format!("cannot initialize '{name}' with a mismatched type"));
                        }
                        d.clone()
                    }
                    (Some(d), None) => d.clone(),
                    (None, Some(it)) => it.clone(),
                    (None, None) => {
                        self.error(DiagnosticKind::InvalidInitializer, loc, format!("'{name}' needs a type or an initializer"));
                        Type::none()
                    }
                };
                let (idx, shadow) = self.scopes.declare(name.clone(), final_ty, *is_const);
                index.set(Some(idx));
                is_shadowing.set(shadow);
                Type::none()
            }
            NodeKind::Return(expr) => {
                let ty = expr.as_ref().map(|e| self.check_node(e)).unwrap_or_else(Type::none);
                if let Some(returns) = self.return_capture_stack.last_mut() {
                    returns.push(ty.clone());
                }
                match self.func_result_stack.last().cloned() {
                    Some(expected) => {
                        let empty = expr.as_ref().map(|e| is_empty_literal(e)).unwrap_or(false);
                        if !rules::accepts(&expected, &ty, empty) {
                            self.error(DiagnosticKind::TypeMismatch, loc, "return type mismatch".to_string());
                        }
                    }
                    None => self.error(DiagnosticKind::InvalidSyntax, loc, "return outside function".to_string()),
                }
                Type::none()
            }
            NodeKind::Break | NodeKind::Continue => {
                if !self.scopes.in_loop() {
                    self.error(DiagnosticKind::InvalidSyntax, loc, "break/continue outside a loop".to_string());
                }
                Type::none()
            }
            NodeKind::If { cond, then_branch, else_branch } => {
                let c = self.check_node(cond);
                if c.kind != TypeKind::Bool {
                    self.error(DiagnosticKind::TypeMismatch, loc, "if condition must be Bool".to_string());
                }
                let t = self.check_body_scope(then_branch, false);
                match else_branch {
                    Some(e) => {
                        let et = self.check_body_scope(e, false);
                        if t != et && t.kind != TypeKind::None && et.kind != TypeKind::None {
                            self.error(DiagnosticKind::TypeMismatch, loc, "if branches have different types".to_string());
                        }
                        t
                    }
                    None => Type::none(),
                }
            }
            NodeKind::Switch { subject, cases } => {
                if cases.is_empty() {
                    self.error(DiagnosticKind::EmptySwitch, loc, "switch has no cases".to_string());
                }
                let subj_ty = self.check_node(subject);
                let mut result: Option<Type> = None;
                for case in cases {
                    let cond_ty = self.check_node(&case.cond);
                    if cond_ty.kind != TypeKind::Bool && cond_ty != subj_ty {
                        self.error(DiagnosticKind::TypeMismatch, loc, "case condition does not match the switch subject".to_string());
                    }
                    let body_ty = self.check_body_scope(&case.body, false);
                    match &result {
                        None => result = Some(body_ty),
                        Some(r) if *r == body_ty || body_ty.kind == TypeKind::None || r.kind == TypeKind::None => {}
                        Some(_) => self.error(DiagnosticKind::TypeMismatch, loc, "switch cases have different types".to_string()),
                    }
                }
                result.unwrap_or_else(Type::none)
            }
            NodeKind::Loop { body } => {
                self.check_body_scope(body, true);
                Type::none()
            }
            NodeKind::For { iter_target, iterable, body } => {
                let iterable_ty = self.check_node(iterable);
                let elem_ty = match iterable_ty.kind {
                    TypeKind::Range => Type::int(),
                    TypeKind::Vector => iterable_ty.vector_elem().cloned().unwrap_or_else(Type::none),
                    TypeKind::Dict => iterable_ty.dict_key().cloned().unwrap_or_else(Type::none),
                    TypeKind::String => Type::char_(),
                    _ => {
                        self.error(DiagnosticKind::TypeMismatch, loc, "for requires a Range, Vector, Dict, or String".to_string());
                        Type::none()
                    }
                };
                self.scopes.push(true);
                if let NodeKind::Variable { name, resolved } = &iter_target.kind {
                    if self.scopes.resolve(name).is_none() {
                        let (idx, _) = self.scopes.declare(name.clone(), elem_ty.clone(), false);
                        resolved.set(Some(VarSlot { step: 0, index: idx }));
                    } else {
                        let t = self.check_node(iter_target);
                        if t != elem_ty {
                            self.error(DiagnosticKind::TypeMismatch, loc, "for iterator type mismatch".to_string());
                        }
                    }
                } else {
                    let t = self.check_node(iter_target);
                    if t != elem_ty {
                        self.error(DiagnosticKind::TypeMismatch, loc, "for iterator type mismatch".to_string());
                    }
                }
                self.check_scope_items_in_current_frame(body);
                self.scopes.pop();
                Type::none()
            }
            NodeKind::While { cond, body } => {
                let c = self.check_node(cond);
                if c.kind != TypeKind::Bool {
                    self.error(DiagnosticKind::TypeMismatch, loc, "while condition must be Bool".to_string());
                }
                self.check_body_scope(body, true);
                Type::none()
            }
            NodeKind::DoWhile { body, cond } => {
                self.check_body_scope(body, true);
                let c = self.check_node(cond);
                if c.kind != TypeKind::Bool {
                    self.error(DiagnosticKind::TypeMismatch, loc, "do-while condition must be Bool".to_string());
                }
                Type::none()
            }
            NodeKind::Scope { items, return_last_expr, .. } => {
                self.scopes.push(false);
                let mut last = Type::none();
                for (i, item) in items.iter().enumerate() {
                    let t = self.check_node(item);
                    if *return_last_expr && i == items.len() - 1 {
                        last = t;
                    }
                }
                self.scopes.pop();
                last
            }

            NodeKind::Function { name, params, have_self, result_type, body, impl_target } => {
                let result_ty = result_type.as_ref().map(|t| self.resolve_type_expr(t)).unwrap_or_else(Type::none);
                self.scopes.push(false);
                if *have_self {
                    let self_ty = impl_target
                        .as_ref()
                        .and_then(|t| self.table.find_user_type(t))
                        .map(|id| self.resolve_user_type(id))
                        .unwrap_or_else(Type::none);
                    self.scopes.declare("self".to_string(), self_ty, false);
                }
                for p in params {
                    let pt = self.resolve_type_expr(&p.ty);
                    self.scopes.declare(p.name.clone(), pt, false);
                }
                self.func_result_stack.push(result_ty.clone());
                self.return_capture_stack.push(Vec::new());
                let body_ty = self.check_scope_items_in_current_frame(body);
                let returns = self.return_capture_stack.pop().unwrap_or_default();
                self.func_result_stack.pop();
                self.scopes.pop();

                let return_last_expr = matches!(&body.kind, NodeKind::Scope { return_last_expr: true, .. });
                if return_last_expr {
                    if !rules::accepts(&result_ty, &body_ty, false) {
                        self.error(DiagnosticKind::TypeMismatch, loc, format!("function '{name}' result type mismatch"));
                    }
                } else if result_ty.kind != TypeKind::None && returns.is_empty() {
                    self.error(DiagnosticKind::TypeMismatch, loc, format!("function '{name}' must return a value"));
                }
                for rty in &returns {
                    if !rules::accepts(&result_ty, rty, false) {
                        self.error(DiagnosticKind::TypeMismatch, loc, format!("function '{name}' has a return type mismatch"));
                    }
                }
                Type::none()
            }
            NodeKind::Enum { enumerators, .. } => {
                for e in enumerators {
                    if let Some(p) = &e.payload {
                        self.resolve_type_expr(p);
                    }
                }
                Type::none()
            }
            NodeKind::Struct { name, .. } => {
                if let Some(id) = self.table.find_user_type(name) {
                    self.resolve_user_type(id);
                }
                Type::none()
            }
            NodeKind::Impl { target, functions } => {
                if self.table.find_user_type(target).is_none() {
                    self.error(DiagnosticKind::Undefined, loc, format!("impl target '{target}' is not a declared type"));
                }
                for f in functions {
                    self.check_node(f);
                }
                Type::none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use metro_core::diagnostics::{CollectingSink, DiagnosticKind, DiagnosticSink};
    use metro_core::source::SourceStore;

    use super::check_program;

    /// Lexes and parses `src`, then runs Sema, returning the diagnostic kinds
    /// it emitted. Panics if lex/parse itself fails -- these tests are only
    /// about Sema's own checks.
    fn check_src(src: &str) -> Vec<DiagnosticKind> {
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", src.to_string());
        let mut sink = CollectingSink::new();
        let tokens = metro_core::lex(&store, id, &mut sink);
        let (items, parse_ok) = metro_core::parse_file(&tokens, id, &mut sink);
        assert!(parse_ok && !sink.has_errors(), "unexpected lex/parse diagnostics for {src:?}");
        check_program(&items, &tokens, &mut sink);
        sink.diagnostics.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn well_typed_program_has_no_diagnostics() {
        assert_eq!(check_src("let x: Int = 1 + 2;"), vec![]);
    }

    #[test]
    fn undefined_name_is_reported() {
        assert_eq!(check_src("let x: Int = y;"), vec![DiagnosticKind::Undefined]);
    }

    #[test]
    fn mismatched_initializer_type_is_reported() {
        assert_eq!(check_src("let x: Int = \"s\";"), vec![DiagnosticKind::TypeMismatch]);
    }

    #[test]
    fn directly_recursive_struct_is_reported() {
        assert_eq!(check_src("struct N { n: N }"), vec![DiagnosticKind::RecursiveType]);
    }

    #[test]
    fn mutually_recursive_structs_are_reported() {
        let diags = check_src("struct A { b: B } struct B { a: A }");
        assert!(diags.iter().all(|k| *k == DiagnosticKind::RecursiveType));
        assert!(!diags.is_empty());
    }

    #[test]
    fn struct_holding_a_vector_of_itself_is_not_recursive() {
        // Vector/Dict are reference-backed (spec.md 9), so they break a cycle
        // the way a direct struct member cannot.
        assert_eq!(check_src("struct Node { children: Vector<Node> }"), vec![]);
    }

    #[test]
    fn break_outside_loop_is_reported() {
        assert_eq!(check_src("break;"), vec![DiagnosticKind::InvalidSyntax]);
    }

    #[test]
    fn return_outside_function_is_reported() {
        assert_eq!(check_src("return 1;"), vec![DiagnosticKind::InvalidSyntax]);
    }

    #[test]
    fn const_reassignment_is_reported() {
        assert_eq!(check_src("const x: Int = 1; x = 2;"), vec![DiagnosticKind::InvalidInitializer]);
    }

    #[test]
    fn empty_switch_is_reported() {
        assert_eq!(check_src("switch 1 {}"), vec![DiagnosticKind::EmptySwitch]);
    }

    #[test]
    fn call_to_unknown_function_is_reported() {
        assert_eq!(check_src("frobnicate();"), vec![DiagnosticKind::Undefined]);
    }

    #[test]
    fn function_call_resolves_by_matching_parameter_types() {
        assert_eq!(check_src("fn add(a: Int, b: Int) -> Int { return a + b; } let x: Int = add(1, 2);"), vec![]);
    }

    #[test]
    fn struct_member_function_resolves_through_self() {
        let src = "struct P { x: Int } impl P { fn get_x(self) -> Int { return self.x; } } \
                   let p = new P(x: 1); let y: Int = p.get_x();";
        assert_eq!(check_src(src), vec![]);
    }
}
