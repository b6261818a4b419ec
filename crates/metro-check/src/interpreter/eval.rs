//! The tree-walking evaluator (spec.md 4.4). Runs directly over the
//! Sema-annotated AST: variable references read the `(step, index)` slot
//! Sema resolved, calls dispatch on the `callee`/`builtin_func` Sema already
//! picked, and enum-literal access reuses the same `enum_decl`/
//! `enumerator_index` cells Sema filled for `NewEnumerator` promotion.
//!
//! Top-level execution order is just source order (spec.md 9): there is no
//! implicit `main` invocation, a program calls it itself if it wants one.

use std::rc::Rc;

use metro_core::ast::{ArithOp, CmpOp, Literal, Node, NodeKind, Subscript, VarSlot};
use metro_core::ids::{BuiltinId, DeclId};
use metro_core::token::{Location, Token};

use crate::error::RuntimeError;
use crate::sema::decls::DeclTable;

use super::builtins;
use super::value::Value;

/// Control-flow signal threaded out of statement evaluation. `exit()`
/// doesn't ride this enum -- see `Evaluator::exit_code`.
enum Flow {
    Value(Value),
    Return(Value),
    Break,
    Continue,
}

/// Evaluates `$self.eval($node)?`, returning early with any non-`Value`
/// flow instead of letting it escape as a plain `Value`.
macro_rules! flow {
    ($self:ident, $node:expr) => {
        match $self.eval($node)? {
            Flow::Value(v) => v,
            other => return Ok(other),
        }
    };
}

/// Runs every top-level item in source order. Returns the process exit code
/// (0 unless an `exit()` builtin call set it).
pub fn run_program(items: &[Node], tokens: &[Token]) -> Result<i32, RuntimeError> {
    let table = DeclTable::build(items);
    let mut ev = Evaluator { frames: vec![Vec::new()], tokens, table, exit_code: None };
    for item in items {
        if ev.exit_code.is_some() {
            break;
        }
        ev.eval(item)?;
    }
    Ok(ev.exit_code.unwrap_or(0))
}

struct Evaluator<'a> {
    frames: Vec<Vec<Value>>,
    tokens: &'a [Token],
    table: DeclTable<'a>,
    exit_code: Option<i32>,
}

/// Matches an enum-literal subscript (`Member` or `Call`, spec.md 3.2
/// `NewEnumerator`) filled in by Sema, returning `(decl, enumerator index,
/// is a call form)`.
fn enum_literal_of(sub: &Subscript) -> Option<(DeclId, u32, bool)> {
    match sub {
        Subscript::Member { enum_decl, enumerator_index, .. } => Some((enum_decl.get()?, enumerator_index.get()?, false)),
        Subscript::Call { enum_decl, enumerator_index, .. } => Some((enum_decl.get()?, enumerator_index.get()?, true)),
        Subscript::Index(_) => None,
    }
}

fn index_usize(v: &Value) -> usize {
    match v {
        Value::Int(i) => (*i).max(0) as usize,
        Value::USize(u) => *u as usize,
        _ => 0,
    }
}

impl<'a> Evaluator<'a> {
    fn loc(&self, node: &Node) -> Location {
        self.tokens[node.span.start_tok as usize].loc
    }

    fn get_slot(&self, slot: VarSlot) -> Value {
        let frame = self.frames.len() - 1 - slot.step as usize;
        self.frames[frame][slot.index as usize].clone()
    }

    fn set_slot(&mut self, slot: VarSlot, value: Value) {
        let frame = self.frames.len() - 1 - slot.step as usize;
        self.frames[frame][slot.index as usize] = value;
    }

    /// Writes `value` at `index` in the current (innermost) frame, growing
    /// it as needed -- loop bodies re-run the same `VariableDeclaration`
    /// node every iteration, so this must tolerate the slot already existing.
    fn set_local_current(&mut self, index: u32, value: Value) {
        let frame = self.frames.last_mut().expect("no open frame");
        let idx = index as usize;
        if idx >= frame.len() {
            frame.resize(idx + 1, Value::None);
        }
        frame[idx] = value;
    }

    /// Evaluates an expression node to a plain `Value`, collapsing any
    /// in-between flow: `break`/`continue`/`return` cannot syntactically
    /// appear inside an expression-only position (spec.md 4.2 grammar
    /// restricts them to statement position), only inside a nested `{ .. }`
    /// scope-as-expression -- if one does leak through, its value is treated
    /// as the expression's result to keep evaluation total.
    fn eval_value(&mut self, node: &Node) -> Result<Value, RuntimeError> {
        match self.eval(node)? {
            Flow::Value(v) => Ok(v),
            Flow::Return(v) => Ok(v),
            Flow::Break | Flow::Continue => Ok(Value::None),
        }
    }

    fn eval_scope_items(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        let (items, return_last_expr) = match &node.kind {
            NodeKind::Scope { items, return_last_expr, .. } => (items, *return_last_expr),
            _ => return self.eval(node),
        };
        let mut last = Value::None;
        let n = items.len();
        for (i, item) in items.iter().enumerate() {
            if self.exit_code.is_some() {
                return Ok(Flow::Value(Value::None));
            }
            match self.eval(item)? {
                Flow::Value(v) => {
                    if return_last_expr && i + 1 == n {
                        last = v;
                    }
                }
                other => return Ok(other),
            }
        }
        Ok(Flow::Value(last))
    }

    /// A body scope that owns its own frame (`if`/`while`/`loop`/`switch`
    /// case bodies) -- everything Sema checked with `check_body_scope`.
    fn eval_pushed_scope(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        self.frames.push(Vec::new());
        let r = self.eval_scope_items(node);
        self.frames.pop();
        r
    }

    fn type_of(&self, node: &Node) -> metro_core::types::Type {
        node.cached_type().expect("Sema cached this node's type")
    }

    fn cast_value(&self, v: &Value, to: &metro_core::types::Type) -> Value {
        use metro_core::types::TypeKind;
        match to.kind {
            TypeKind::String => Value::string(v.display_with(&self.table)),
            TypeKind::Int => Value::Int(match v {
                Value::Int(i) => *i,
                Value::USize(u) => *u as i64,
                Value::Float(f) => *f as i64,
                Value::Char(c) => *c as i64,
                _ => 0,
            }),
            TypeKind::USize => Value::USize(match v {
                Value::Int(i) => *i as u64,
                Value::USize(u) => *u,
                Value::Float(f) => *f as u64,
                _ => 0,
            }),
            TypeKind::Float => Value::Float(match v {
                Value::Int(i) => *i as f32,
                Value::USize(u) => *u as f32,
                Value::Float(f) => *f,
                _ => 0.0,
            }),
            TypeKind::Char => Value::Char(match v {
                Value::Int(i) => char::from_u32(*i as u32).unwrap_or('\u{FFFD}'),
                Value::Char(c) => *c,
                _ => '\u{0}',
            }),
            _ => v.clone(),
        }
    }

    fn apply_arith(&self, op: ArithOp, l: Value, r: Value, loc: Location) -> Result<Value, RuntimeError> {
        use ArithOp::*;
        Ok(match op {
            Add => match (&l, &r) {
                (Value::String(a), Value::String(b)) => Value::string(format!("{a}{b}")),
                (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
                (Value::USize(a), Value::USize(b)) => Value::USize(a.wrapping_add(*b)),
                (Value::Float(a), Value::Float(b)) => Value::Float(a + b),
                _ => l,
            },
            Sub => match (&l, &r) {
                (Value::Vector(v), elem) => {
                    let mut items = v.borrow().clone();
                    if let Some(pos) = items.iter().position(|x| x == elem) {
                        items.remove(pos);
                    }
                    Value::vector(items)
                }
                (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
                (Value::USize(a), Value::USize(b)) => Value::USize(a.wrapping_sub(*b)),
                (Value::Float(a), Value::Float(b)) => Value::Float(a - b),
                (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 - b),
                (Value::Float(a), Value::Int(b)) => Value::Float(a - *b as f32),
                _ => l,
            },
            Mul => match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
                (Value::USize(a), Value::USize(b)) => Value::USize(a.wrapping_mul(*b)),
                (Value::Float(a), Value::Float(b)) => Value::Float(a * b),
                (Value::Float(a), Value::Int(b)) => Value::Float(a * *b as f32),
                (Value::Int(a), Value::Float(b)) => Value::Float(*a as f32 * b),
                _ => l,
            },
            Div => match (&l, &r) {
                (Value::Int(a), Value::Int(b)) => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero { span: loc });
                    }
                    Value::Int(a.wrapping_div(*b))
                }
                (Value::USize(a), Value::USize(b)) => {
                    if *b == 0 {
                        return Err(RuntimeError::DivisionByZero { span: loc });
                    }
                    Value::USize(a / b)
                }
                (Value::Float(a), Value::Float(b)) => {
                    if *b == 0.0 {
                        return Err(RuntimeError::DivisionByZero { span: loc });
                    }
                    Value::Float(a / b)
                }
                _ => l,
            },
            Mod => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                if *b == 0 {
                    return Err(RuntimeError::DivisionByZero { span: loc });
                }
                Value::Int(a % b)
            }
            LShift => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                Value::Int(a.wrapping_shl(*b as u32))
            }
            RShift => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                Value::Int(a.wrapping_shr(*b as u32))
            }
            BitAnd => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                Value::Int(a & b)
            }
            BitXor => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                Value::Int(a ^ b)
            }
            BitOr => {
                let (Value::Int(a), Value::Int(b)) = (&l, &r) else { return Ok(l) };
                Value::Int(a | b)
            }
            LogicalAnd => {
                let (Value::Bool(a), Value::Bool(b)) = (&l, &r) else { return Ok(l) };
                Value::Bool(*a && *b)
            }
            LogicalOr => {
                let (Value::Bool(a), Value::Bool(b)) = (&l, &r) else { return Ok(l) };
                Value::Bool(*a || *b)
            }
        })
    }

    fn as_f64(v: &Value) -> f64 {
        match v {
            Value::Int(i) => *i as f64,
            Value::USize(u) => *u as f64,
            Value::Float(f) => *f as f64,
            _ => 0.0,
        }
    }

    fn apply_compare(op: CmpOp, l: &Value, r: &Value) -> bool {
        match op {
            CmpOp::Eq => l == r,
            CmpOp::NotEq => l != r,
            CmpOp::Lt => Self::as_f64(l) < Self::as_f64(r),
            CmpOp::LtEq => Self::as_f64(l) <= Self::as_f64(r),
            CmpOp::Gt => Self::as_f64(l) > Self::as_f64(r),
            CmpOp::GtEq => Self::as_f64(l) >= Self::as_f64(r),
        }
    }

    fn assign_to(&mut self, target: &Node, value: Value) -> Result<(), RuntimeError> {
        match &target.kind {
            NodeKind::Variable { resolved, .. } | NodeKind::MemberVariable { resolved, .. } => {
                let slot = resolved.get().expect("Sema resolved this assignment target");
                self.set_slot(slot, value);
                Ok(())
            }
            NodeKind::IndexRef { base, subs } => {
                let loc = self.loc(target);
                self.assign_index_ref(base, subs, value, loc)
            }
            _ => unreachable!("Sema rejects non-l-value assignment targets"),
        }
    }

    fn assign_index_ref(&mut self, base: &Node, subs: &[Subscript], value: Value, loc: Location) -> Result<(), RuntimeError> {
        let mut cur = self.eval_value(base)?;
        for sub in &subs[..subs.len() - 1] {
            cur = self.read_subscript(cur, sub, loc)?;
        }
        match subs.last().expect("IndexRef always has at least one subscript") {
            Subscript::Index(idx_node) => {
                let idx = self.eval_value(idx_node)?;
                match cur {
                    Value::Vector(v) => {
                        let i = index_usize(&idx);
                        let mut items = v.borrow_mut();
                        let len = items.len();
                        if i >= len {
                            return Err(RuntimeError::IndexOutOfRange { span: loc, index: i as i64, len });
                        }
                        items[i] = value;
                    }
                    Value::Dict(d) => {
                        let mut pairs = d.borrow_mut();
                        if let Some(slot) = pairs.iter_mut().find(|(k, _)| *k == idx) {
                            slot.1 = value;
                        } else {
                            pairs.push((idx, value));
                        }
                    }
                    _ => unreachable!("Sema rejects indexed assignment on a non-Vector/Dict value"),
                }
            }
            Subscript::Member { member_index, .. } => match cur {
                Value::UserType(_, fields) => {
                    let idx = member_index.get().expect("Sema resolved this member's index") as usize;
                    fields.borrow_mut()[idx] = value;
                }
                _ => unreachable!("Sema rejects member assignment on a non-struct value"),
            },
            Subscript::Call { .. } => unreachable!("a call subscript is never an assignment target"),
        }
        Ok(())
    }

    fn read_subscript(&mut self, base: Value, sub: &Subscript, loc: Location) -> Result<Value, RuntimeError> {
        match sub {
            Subscript::Index(idx_node) => {
                let idx = self.eval_value(idx_node)?;
                match &base {
                    Value::Vector(v) => {
                        let i = index_usize(&idx);
                        let items = v.borrow();
                        items.get(i).cloned().ok_or(RuntimeError::IndexOutOfRange { span: loc, index: i as i64, len: items.len() })
                    }
                    Value::String(s) => {
                        let i = index_usize(&idx);
                        let len = s.chars().count();
                        s.chars().nth(i).map(Value::Char).ok_or(RuntimeError::IndexOutOfRange { span: loc, index: i as i64, len })
                    }
                    Value::Dict(d) => {
                        let pairs = d.borrow();
                        pairs.iter().find(|(k, _)| *k == idx).map(|(_, v)| v.clone()).ok_or(RuntimeError::KeyNotFound { span: loc })
                    }
                    _ => unreachable!("Sema rejects indexing a non-indexable value"),
                }
            }
            Subscript::Member { member_index, .. } => match &base {
                Value::UserType(_, fields) => {
                    let idx = member_index.get().expect("Sema resolved this member's index") as usize;
                    Ok(fields.borrow()[idx].clone())
                }
                _ => unreachable!("Sema rejects member access on a non-struct value"),
            },
            Subscript::Call { args, is_builtin, builtin_func, callee, .. } => {
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(self.eval_value(a)?);
                }
                self.dispatch_call(Some(base), is_builtin.get(), builtin_func.get(), callee.get(), arg_vals, loc)
            }
        }
    }

    fn dispatch_call(
        &mut self,
        receiver: Option<Value>,
        is_builtin: bool,
        builtin_func: Option<BuiltinId>,
        callee: Option<DeclId>,
        args: Vec<Value>,
        loc: Location,
    ) -> Result<Value, RuntimeError> {
        if is_builtin {
            let id = builtin_func.expect("Sema set builtin_func for a builtin call");
            if crate::builtins::name_of(id) == "exit" {
                let code = match args.first() {
                    Some(Value::Int(c)) => *c as i32,
                    Some(Value::USize(c)) => *c as i32,
                    _ => 0,
                };
                self.exit_code = Some(code);
                return Ok(Value::None);
            }
            return builtins::call(id, receiver, args, loc, &self.table);
        }
        let id = callee.expect("Sema set callee for a non-builtin call");
        self.call_function(id, receiver, args)
    }

    fn call_function(&mut self, id: DeclId, receiver: Option<Value>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let info = self.table.function(id);
        let (params_len, have_self, body) = match &info.node.kind {
            NodeKind::Function { params, have_self, body, .. } => (params.len(), *have_self, body),
            _ => unreachable!("DeclId always indexes a Function node"),
        };
        let mut frame = Vec::with_capacity(params_len + 1);
        if have_self {
            frame.push(receiver.expect("Sema requires a receiver for a self-function"));
        }
        frame.extend(args);
        self.frames.push(frame);
        let result = match self.eval_scope_items(body) {
            Ok(Flow::Value(v)) => Ok(v),
            Ok(Flow::Return(v)) => Ok(v),
            Ok(Flow::Break | Flow::Continue) => Ok(Value::None),
            Err(e) => Err(e),
        };
        self.frames.pop();
        result
    }

    /// Matches one `switch` case condition: either a `Bool` predicate or a
    /// value-match against `subject` (spec.md 4.3: case condition type must
    /// be `Bool` or equal to the switch subject's type). Enum-literal
    /// patterns compare `decl`/`index` and, unless the payload pattern is
    /// `_`, the payload value too (spec.md 8 scenario S6).
    fn case_matches(&mut self, cond: &Node, subject: &Value) -> Result<bool, RuntimeError> {
        if let NodeKind::IndexRef { base, subs } = &cond.kind {
            if let NodeKind::Variable { resolved, .. } = &base.kind {
                if resolved.get().is_none() {
                    if let (Value::Enumerator { decl: sd, index: si, payload: sp }, [sub]) = (subject, subs.as_slice()) {
                        if let Some((cd, ci, _)) = enum_literal_of(sub) {
                            if cd != *sd || ci != *si {
                                return Ok(false);
                            }
                            if let Subscript::Call { args, .. } = sub {
                                if let Some(arg0) = args.first() {
                                    if matches!(arg0.kind, NodeKind::Wildcard) {
                                        return Ok(true);
                                    }
                                    let pattern_val = self.eval_value(arg0)?;
                                    return Ok(sp.as_deref() == Some(&pattern_val));
                                }
                            }
                            return Ok(sp.is_none());
                        }
                    }
                }
            }
        }
        let cv = self.eval_value(cond)?;
        match cv {
            Value::Bool(b) => Ok(b),
            other => Ok(other == *subject),
        }
    }

    fn eval(&mut self, node: &Node) -> Result<Flow, RuntimeError> {
        let loc = self.loc(node);
        match &node.kind {
            NodeKind::NoneLit => Ok(Flow::Value(Value::None)),
            NodeKind::True => Ok(Flow::Value(Value::Bool(true))),
            NodeKind::False => Ok(Flow::Value(Value::Bool(false))),
            NodeKind::Wildcard => Ok(Flow::Value(Value::None)),
            NodeKind::Value(lit) => Ok(Flow::Value(match lit {
                Literal::Int(v) => Value::Int(*v),
                Literal::USize(v) => Value::USize(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Char(c) => Value::Char(char::from_u32(*c as u32).unwrap_or('\u{FFFD}')),
                Literal::String(s) => Value::string(s.clone()),
            })),
            NodeKind::Variable { resolved, .. } | NodeKind::MemberVariable { resolved, .. } => {
                let slot = resolved.get().expect("Sema resolved this variable reference");
                Ok(Flow::Value(self.get_slot(slot)))
            }
            NodeKind::TypeExpr { .. } | NodeKind::UserTypeName(_) | NodeKind::ImplName(_) => Ok(Flow::Value(Value::None)),

            NodeKind::Vector(items) => {
                let mut out = Vec::with_capacity(items.len());
                for it in items {
                    out.push(flow!(self, it));
                }
                Ok(Flow::Value(Value::vector(out)))
            }
            NodeKind::Dict { pairs, .. } => {
                let mut out = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let kv = flow!(self, k);
                    let vv = flow!(self, v);
                    out.push((kv, vv));
                }
                Ok(Flow::Value(Value::dict(out)))
            }
            NodeKind::Range { begin, end } => {
                let b = flow!(self, begin);
                let e = flow!(self, end);
                let (Value::Int(b), Value::Int(e)) = (b, e) else {
                    unreachable!("Sema requires Int range bounds")
                };
                Ok(Flow::Value(Value::Range(b, e)))
            }
            NodeKind::StructConstructor { fields, .. } => {
                let decl = node.cached_type().and_then(|t| t.decl).expect("Sema resolved the constructed struct's type");
                let mut out = Vec::with_capacity(fields.len());
                for f in fields {
                    out.push(flow!(self, &f.value));
                }
                Ok(Flow::Value(Value::user_type(decl, out)))
            }

            NodeKind::UnaryPlus(e) => Ok(Flow::Value(flow!(self, e))),
            NodeKind::UnaryMinus(e) => {
                let v = flow!(self, e);
                Ok(Flow::Value(match v {
                    Value::Int(i) => Value::Int(-i),
                    Value::Float(f) => Value::Float(-f),
                    Value::USize(u) => Value::Int(-(u as i64)),
                    other => other,
                }))
            }
            NodeKind::Cast { target, expr } => {
                let v = flow!(self, expr);
                let to = self.type_of(target);
                Ok(Flow::Value(self.cast_value(&v, &to)))
            }
            NodeKind::Expr { left, tail } => {
                let mut acc = flow!(self, left);
                for (op, rhs) in tail {
                    let rv = flow!(self, rhs);
                    acc = self.apply_arith(*op, acc, rv, loc)?;
                }
                Ok(Flow::Value(acc))
            }
            NodeKind::Compare { left, tail } => {
                let mut acc = flow!(self, left);
                let mut result = true;
                for (op, rhs) in tail {
                    let rv = flow!(self, rhs);
                    result = result && Self::apply_compare(*op, &acc, &rv);
                    acc = rv;
                }
                Ok(Flow::Value(Value::Bool(result)))
            }
            NodeKind::Assign { target, value } => {
                let v = flow!(self, value);
                self.assign_to(target, v.clone())?;
                Ok(Flow::Value(v))
            }
            NodeKind::IndexRef { base, subs } => {
                if let Some(sub) = subs.first() {
                    if let Some((enum_decl, index, is_call)) = enum_literal_of(sub) {
                        if subs.len() == 1 {
                            let payload = if is_call {
                                if let Subscript::Call { args, .. } = sub {
                                    match args.first() {
                                        Some(a) if matches!(a.kind, NodeKind::Wildcard) => None,
                                        Some(a) => Some(Rc::new(flow!(self, a))),
                                        None => None,
                                    }
                                } else {
                                    None
                                }
                            } else {
                                None
                            };
                            return Ok(Flow::Value(Value::Enumerator { decl: enum_decl, index, payload }));
                        }
                    }
                }
                let mut cur = flow!(self, base);
                for sub in subs.iter() {
                    cur = self.read_subscript(cur, sub, loc)?;
                }
                Ok(Flow::Value(cur))
            }

            NodeKind::CallFunc { args, is_builtin, builtin_func, callee, .. } => {
                let mut arg_vals = Vec::with_capacity(args.len());
                for a in args {
                    arg_vals.push(flow!(self, a));
                }
                let v = self.dispatch_call(None, is_builtin.get(), builtin_func.get(), callee.get(), arg_vals, loc)?;
                Ok(Flow::Value(v))
            }

            NodeKind::VariableDeclaration { init, index, ignore_initializer, .. } => {
                let v = match init {
                    Some(e) if !*ignore_initializer => flow!(self, e),
                    _ => Value::None,
                };
                self.set_local_current(index.get().expect("Sema resolved this declaration's slot"), v);
                Ok(Flow::Value(Value::None))
            }
            NodeKind::Return(expr) => {
                let v = match expr {
                    Some(e) => flow!(self, e),
                    None => Value::None,
                };
                Ok(Flow::Return(v))
            }
            NodeKind::Break => Ok(Flow::Break),
            NodeKind::Continue => Ok(Flow::Continue),
            NodeKind::If { cond, then_branch, else_branch } => {
                let c = flow!(self, cond);
                if matches!(c, Value::Bool(true)) {
                    self.eval_pushed_scope(then_branch)
                } else if let Some(e) = else_branch {
                    self.eval_pushed_scope(e)
                } else {
                    Ok(Flow::Value(Value::None))
                }
            }
            NodeKind::Switch { subject, cases } => {
                let subj = flow!(self, subject);
                for case in cases {
                    if self.case_matches(&case.cond, &subj)? {
                        return self.eval_pushed_scope(&case.body);
                    }
                }
                Ok(Flow::Value(Value::None))
            }
            NodeKind::Loop { body } => {
                loop {
                    if self.exit_code.is_some() {
                        return Ok(Flow::Value(Value::None));
                    }
                    match self.eval_pushed_scope(body)? {
                        Flow::Value(_) | Flow::Continue => {}
                        Flow::Break => break,
                        other @ Flow::Return(_) => return Ok(other),
                    }
                }
                Ok(Flow::Value(Value::None))
            }
            NodeKind::While { cond, body } => {
                loop {
                    if self.exit_code.is_some() {
                        return Ok(Flow::Value(Value::None));
                    }
                    if !matches!(flow!(self, cond), Value::Bool(true)) {
                        break;
                    }
                    match self.eval_pushed_scope(body)? {
                        Flow::Value(_) | Flow::Continue => {}
                        Flow::Break => break,
                        other @ Flow::Return(_) => return Ok(other),
                    }
                }
                Ok(Flow::Value(Value::None))
            }
            NodeKind::DoWhile { body, cond } => {
                loop {
                    if self.exit_code.is_some() {
                        return Ok(Flow::Value(Value::None));
                    }
                    match self.eval_pushed_scope(body)? {
                        Flow::Value(_) | Flow::Continue => {}
                        Flow::Break => break,
                        other @ Flow::Return(_) => return Ok(other),
                    }
                    if !matches!(flow!(self, cond), Value::Bool(true)) {
                        break;
                    }
                }
                Ok(Flow::Value(Value::None))
            }
            NodeKind::For { iter_target, iterable, body } => {
                let it = flow!(self, iterable);
                let elems = self.iterate(it, loc)?;
                let fresh = matches!(&iter_target.kind, NodeKind::Variable { resolved, .. } if resolved.get().map(|s| s.step == 0).unwrap_or(false));
                self.frames.push(Vec::new());
                let mut result = Ok(Flow::Value(Value::None));
                for elem in elems {
                    if self.exit_code.is_some() {
                        break;
                    }
                    if fresh {
                        self.set_local_current(0, elem);
                    } else if let Err(e) = self.assign_to(iter_target, elem) {
                        result = Err(e);
                        break;
                    }
                    match self.eval_scope_items(body) {
                        Ok(Flow::Value(_)) | Ok(Flow::Continue) => {}
                        Ok(Flow::Break) => break,
                        Ok(other @ Flow::Return(_)) => {
                            result = Ok(other);
                            break;
                        }
                        Err(e) => {
                            result = Err(e);
                            break;
                        }
                    }
                }
                self.frames.pop();
                result
            }
            NodeKind::Scope { .. } => self.eval_pushed_scope(node),

            NodeKind::Function { .. } | NodeKind::Struct { .. } | NodeKind::Enum { .. } | NodeKind::Impl { .. } => Ok(Flow::Value(Value::None)),
        }
    }

    /// Materializes an iterable value's elements in iteration order
    /// (spec.md 4.4: Range/Vector/String/Dict, in that priority).
    fn iterate(&self, v: Value, loc: Location) -> Result<Vec<Value>, RuntimeError> {
        Ok(match v {
            Value::Range(a, b) => (a..b).map(Value::Int).collect(),
            Value::Vector(items) => items.borrow().clone(),
            Value::String(s) => s.chars().map(Value::Char).collect(),
            Value::Dict(pairs) => pairs.borrow().iter().map(|(k, v)| Value::vector(vec![k.clone(), v.clone()])).collect(),
            _ => return Err(RuntimeError::Builtin { span: loc, message: "value is not iterable".to_string() }),
        })
    }
}

#[cfg(test)]
mod tests {
    use metro_core::diagnostics::{CollectingSink, DiagnosticSink};
    use metro_core::source::SourceStore;

    use super::run_program;
    use crate::error::RuntimeError;

    /// Lexes, parses, checks, and runs `src`, panicking on any lex/parse/Sema
    /// diagnostic -- these tests only exercise the evaluator.
    fn eval_src(src: &str) -> Result<i32, RuntimeError> {
        let mut store = SourceStore::new();
        let id = store.add_file("t.metro", src.to_string());
        let mut sink = CollectingSink::new();
        let tokens = metro_core::lex(&store, id, &mut sink);
        let (items, parse_ok) = metro_core::parse_file(&tokens, id, &mut sink);
        assert!(parse_ok && !sink.has_errors(), "unexpected lex/parse diagnostics for {src:?}");
        crate::sema::check_program(&items, &tokens, &mut sink);
        assert!(!sink.has_errors(), "unexpected Sema diagnostics for {src:?}");
        run_program(&items, &tokens)
    }

    #[test]
    fn arithmetic_precedence_via_exit_code() {
        assert_eq!(eval_src("exit((1 + 2) * 3 - 4);").unwrap(), 5);
    }

    #[test]
    fn for_over_range_accumulates() {
        assert_eq!(eval_src("let s = 0; for i in 0..5 { s = s + i; } exit(s);").unwrap(), 10);
    }

    #[test]
    fn while_loop_break_and_continue() {
        let src = "let i = 0; let s = 0; while i < 10 { i = i + 1; if i == 5 { continue; } if i > 8 { break; } s = s + i; } exit(s);";
        // 1+2+3+4 (5 skipped via continue) +6+7+8 = 31, then break at i == 9.
        assert_eq!(eval_src(src).unwrap(), 31);
    }

    #[test]
    fn division_by_zero_is_reported() {
        let err = eval_src("let x = 1 / 0; exit(x);").unwrap_err();
        assert!(matches!(err, RuntimeError::DivisionByZero { .. }));
    }

    #[test]
    fn vector_index_out_of_range_is_reported() {
        let err = eval_src("let v = [1, 2]; exit(v[5]);").unwrap_err();
        assert!(matches!(err, RuntimeError::IndexOutOfRange { .. }));
    }

    #[test]
    fn dict_read_of_missing_key_is_reported() {
        let err = eval_src("let d = dict<String, Int>{\"a\": 1}; exit(d[\"missing\"]);").unwrap_err();
        assert!(matches!(err, RuntimeError::KeyNotFound { .. }));
    }

    #[test]
    fn dict_assignment_inserts_missing_keys_without_error() {
        let src = "let d = dict<String, Int>{}; d[\"a\"] = 1; d[\"b\"] = 2; exit(d[\"a\"] + d[\"b\"]);";
        assert_eq!(eval_src(src).unwrap(), 3);
    }

    #[test]
    fn struct_field_access_and_method_call() {
        let src = "struct P { x: Int, y: Int } impl P { fn sum(self) -> Int { self.x + self.y } } \
                   let p = new P(x: 3, y: 4); exit(p.sum());";
        assert_eq!(eval_src(src).unwrap(), 7);
    }

    #[test]
    fn struct_field_mutation_is_shared_through_clones() {
        let src = "struct P { x: Int } let p = new P(x: 1); let q = p; q.x = 9; exit(p.x);";
        assert_eq!(eval_src(src).unwrap(), 9);
    }

    #[test]
    fn enum_switch_matches_payload_variant() {
        let src = "enum E { A, B(Int) } let v = E.B(9); switch v { case E.A: exit(1); case E.B(_): exit(2); }";
        assert_eq!(eval_src(src).unwrap(), 2);
    }

    #[test]
    fn recursive_function_call() {
        let src = "fn fact(n: Int) -> Int { if n <= 1 { return 1; } return n * fact(n - 1); } exit(fact(5));";
        assert_eq!(eval_src(src).unwrap(), 120);
    }

    #[test]
    fn no_exit_call_yields_zero() {
        assert_eq!(eval_src("let x = 1 + 1;").unwrap(), 0);
    }
}
