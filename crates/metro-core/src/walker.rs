//! Generic AST traversal (spec.md 4.5).
//!
//! `walk` visits `root`, and for every node whose visitor call returns
//! [`WalkControl::Continue`] recurses into its children in declaration
//! order; a [`WalkControl::Stop`] answer skips that subtree. The recursive-
//! type guard (spec.md 4.3 step 1) has its own specialized traversal since it
//! needs to track a path of `DeclId`s rather than generic nodes; this is the
//! general-purpose version spec.md 4.5 names as a shared utility for any
//! other pass that just needs every node visited once. The textual
//! pretty-printer that would also use this is out of scope (spec.md 1).

use crate::ast::{Node, NodeKind, Subscript};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

pub fn walk(root: &Node, visit: &mut dyn FnMut(&Node) -> WalkControl) {
    if visit(root) == WalkControl::Stop {
        return;
    }
    for child in children(root) {
        walk(child, visit);
    }
}

/// Returns this node's direct children, in declaration order.
pub fn children(node: &Node) -> Vec<&Node> {
    match &node.kind {
        NodeKind::NoneLit
        | NodeKind::True
        | NodeKind::False
        | NodeKind::Value(_)
        | NodeKind::Variable { .. }
        | NodeKind::MemberVariable { .. }
        | NodeKind::UserTypeName(_)
        | NodeKind::ImplName(_)
        | NodeKind::Break
        | NodeKind::Continue
        | NodeKind::Wildcard => vec![],

        NodeKind::TypeExpr { params, .. } => params.iter().collect(),

        NodeKind::Vector(items) => items.iter().collect(),
        NodeKind::Dict { pairs, key_type, value_type } => {
            let mut out = Vec::new();
            if let Some(k) = key_type {
                out.push(k.as_ref());
            }
            if let Some(v) = value_type {
                out.push(v.as_ref());
            }
            for (k, v) in pairs {
                out.push(k);
                out.push(v);
            }
            out
        }
        NodeKind::Range { begin, end } => vec![begin.as_ref(), end.as_ref()],
        NodeKind::StructConstructor { type_name, fields } => {
            let mut out = vec![type_name.as_ref()];
            out.extend(fields.iter().map(|f| &f.value));
            out
        }

        NodeKind::UnaryPlus(e) | NodeKind::UnaryMinus(e) => vec![e.as_ref()],
        NodeKind::Cast { target, expr } => vec![target.as_ref(), expr.as_ref()],
        NodeKind::Expr { left, tail } => {
            let mut out = vec![left.as_ref()];
            out.extend(tail.iter().map(|(_, n)| n));
            out
        }
        NodeKind::Compare { left, tail } => {
            let mut out = vec![left.as_ref()];
            out.extend(tail.iter().map(|(_, n)| n));
            out
        }
        NodeKind::Assign { target, value } => vec![target.as_ref(), value.as_ref()],
        NodeKind::IndexRef { base, subs } => {
            let mut out = vec![base.as_ref()];
            for s in subs {
                match s {
                    Subscript::Index(n) => out.push(n),
                    Subscript::Member { .. } => {}
                    Subscript::Call { args, .. } => out.extend(args.iter()),
                }
            }
            out
        }

        NodeKind::CallFunc { args, .. } => args.iter().collect(),

        NodeKind::VariableDeclaration { declared_type, init, .. } => {
            let mut out = Vec::new();
            if let Some(t) = declared_type {
                out.push(t.as_ref());
            }
            if let Some(i) = init {
                out.push(i.as_ref());
            }
            out
        }
        NodeKind::Return(e) => e.iter().map(|b| b.as_ref()).collect(),
        NodeKind::If { cond, then_branch, else_branch } => {
            let mut out = vec![cond.as_ref(), then_branch.as_ref()];
            if let Some(e) = else_branch {
                out.push(e.as_ref());
            }
            out
        }
        NodeKind::Switch { subject, cases } => {
            let mut out = vec![subject.as_ref()];
            for c in cases {
                out.push(&c.cond);
                out.push(&c.body);
            }
            out
        }
        NodeKind::Loop { body } => vec![body.as_ref()],
        NodeKind::For { iter_target, iterable, body } => {
            vec![iter_target.as_ref(), iterable.as_ref(), body.as_ref()]
        }
        NodeKind::While { cond, body } | NodeKind::DoWhile { body, cond } => {
            vec![cond.as_ref(), body.as_ref()]
        }
        NodeKind::Scope { items, .. } => items.iter().collect(),

        NodeKind::Function { params, result_type, body, .. } => {
            let mut out: Vec<&Node> = params.iter().map(|p| &p.ty).collect();
            if let Some(r) = result_type {
                out.push(r.as_ref());
            }
            out.push(body.as_ref());
            out
        }
        NodeKind::Enum { enumerators, .. } => {
            enumerators.iter().filter_map(|e| e.payload.as_ref()).collect()
        }
        NodeKind::Struct { members, .. } => members.iter().map(|m| &m.ty).collect(),
        NodeKind::Impl { functions, .. } => functions.iter().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ArithOp, Literal};

    #[test]
    fn stop_skips_subtree() {
        let leaf_a = Node::leaf(NodeKind::Value(Literal::Int(1)), 0);
        let leaf_b = Node::leaf(NodeKind::Value(Literal::Int(2)), 1);
        let expr = Node::new(
            NodeKind::Expr { left: Box::new(leaf_a), tail: vec![(ArithOp::Add, leaf_b)] },
            crate::ast::Span { start_tok: 0, end_tok: 2 },
        );
        let mut visited = 0;
        walk(&expr, &mut |_| {
            visited += 1;
            WalkControl::Stop
        });
        assert_eq!(visited, 1);
    }

    #[test]
    fn continue_visits_every_descendant() {
        let leaf_a = Node::leaf(NodeKind::Value(Literal::Int(1)), 0);
        let leaf_b = Node::leaf(NodeKind::Value(Literal::Int(2)), 1);
        let expr = Node::new(
            NodeKind::Expr { left: Box::new(leaf_a), tail: vec![(ArithOp::Add, leaf_b)] },
            crate::ast::Span { start_tok: 0, end_tok: 2 },
        );
        let mut visited = 0;
        walk(&expr, &mut |_| {
            visited += 1;
            WalkControl::Continue
        });
        assert_eq!(visited, 3);
    }
}
