//! Recursive-descent parser with a precedence climb (spec.md 4.2).

use std::cell::Cell;

use crate::ast::{
    ArithOp, CaseArm, CmpOp, EnumeratorDecl, FieldInit, Literal, MemberDecl, Node, NodeKind, Param, Span, Subscript,
};
use crate::diagnostics::{Diagnostic, DiagnosticKind, DiagnosticSink};
use crate::source::SourceId;
use crate::token::{PunctuatorKind as P, Token, TokenKind};

pub struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    file: SourceId,
    sink: &'a mut dyn DiagnosticSink,
    /// A virtual leftover `>` from splitting a `>>` token while closing
    /// nested generic argument lists (spec.md 4.2, "Multi-level `>`").
    pending_gt: bool,
    had_error: bool,
}

/// Parses one file's token sequence into its top-level items. Returns
/// `(items, ok)`; `ok` is false the moment a parse error halts the file
/// (spec.md 4.2: "A parser error ... emits a diagnostic and stops parsing of
/// the current file").
pub fn parse_file(tokens: &[Token], file: SourceId, sink: &mut dyn DiagnosticSink) -> (Vec<Node>, bool) {
    let mut p = Parser { tokens, pos: 0, file, sink, pending_gt: false, had_error: false };
    let mut items = Vec::new();
    while !p.is_end() && !p.had_error {
        match p.parse_item() {
            Some(n) => items.push(n),
            None => break,
        }
    }
    (items, !p.had_error)
}

impl<'a> Parser<'a> {
    fn cur(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn is_end(&self) -> bool {
        self.cur().kind == TokenKind::End
    }

    fn tok_u32(&self) -> u32 {
        self.pos as u32
    }

    fn prev_tok(&self) -> u32 {
        (self.pos.saturating_sub(1)) as u32
    }

    fn at_punct(&self, k: P) -> bool {
        if self.pending_gt {
            return k == P::Gt;
        }
        self.cur().punct == Some(k)
    }

    fn at_ident(&self, word: &str) -> bool {
        self.cur().kind == TokenKind::Identifier && self.cur().text == word
    }

    fn eat_punct(&mut self, k: P) -> bool {
        if self.pending_gt && k == P::Gt {
            self.pending_gt = false;
            return true;
        }
        if self.cur().punct == Some(k) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.at_ident(word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, k: P, what: &str) -> bool {
        if self.eat_punct(k) {
            true
        } else {
            self.error(format!("expected '{what}'"));
            false
        }
    }

    fn expect_ident(&mut self) -> Option<String> {
        if self.cur().kind == TokenKind::Identifier {
            let text = self.cur().text.clone();
            self.pos += 1;
            Some(text)
        } else {
            self.error("expected identifier".to_string());
            None
        }
    }

    fn error(&mut self, message: String) {
        if self.had_error {
            return;
        }
        self.had_error = true;
        self.sink.emit(Diagnostic::error(DiagnosticKind::InvalidSyntax, self.cur().loc, message));
    }

    /// Closes a generic-argument list opened at `depth`, splitting a `>>`
    /// token into two `>` when `depth >= 2` (spec.md 9: the later, more
    /// complete source variant splits at depth >= 2, not >= 1).
    fn expect_generic_close(&mut self, depth: u32) -> bool {
        if self.eat_punct(P::Gt) {
            return true;
        }
        if depth >= 2 && self.cur().punct == Some(P::Shr) {
            self.pos += 1;
            self.pending_gt = true;
            return true;
        }
        self.error("expected '>'".to_string());
        false
    }

    // ---- top level ----

    fn parse_item(&mut self) -> Option<Node> {
        if self.at_ident("fn") {
            self.parse_function(false, None)
        } else if self.at_ident("struct") {
            self.parse_struct()
        } else if self.at_ident("enum") {
            self.parse_enum()
        } else if self.at_ident("impl") {
            self.parse_impl()
        } else {
            let e = self.parse_expr();
            self.eat_punct(P::Semi);
            Some(e)
        }
    }

    fn parse_function(&mut self, in_impl: bool, impl_target: Option<String>) -> Option<Node> {
        let start = self.tok_u32();
        self.eat_ident("fn");
        let name = self.expect_ident()?;
        self.expect_punct(P::LParen, "(");
        let mut params = Vec::new();
        let mut have_self = false;
        if self.at_ident("self") {
            if !in_impl {
                self.error("'self' outside impl".to_string());
                return None;
            }
            self.pos += 1;
            have_self = true;
            self.eat_punct(P::Comma);
        }
        while !self.at_punct(P::RParen) && !self.is_end() {
            let pname = self.expect_ident()?;
            self.expect_punct(P::Colon, ":");
            let ty = self.parse_type(0);
            if params.iter().any(|p: &Param| p.name == pname) {
                self.error(format!("duplicate argument name '{pname}'"));
                return None;
            }
            params.push(Param { name: pname, ty });
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RParen, ")");
        let result_type = if self.eat_punct(P::Arrow) { Some(Box::new(self.parse_type(0))) } else { None };
        let body = self.parse_scope(true)?;
        let end = self.prev_tok();
        Some(Node::new(
            NodeKind::Function { name, params, have_self, result_type, body: Box::new(body), impl_target },
            Span { start_tok: start, end_tok: end },
        ))
    }

    fn parse_struct(&mut self) -> Option<Node> {
        let start = self.tok_u32();
        self.eat_ident("struct");
        let name = self.expect_ident()?;
        self.expect_punct(P::LBrace, "{");
        let mut members = Vec::new();
        while !self.at_punct(P::RBrace) && !self.is_end() {
            let mname = self.expect_ident()?;
            self.expect_punct(P::Colon, ":");
            let ty = self.parse_type(0);
            members.push(MemberDecl { name: mname, ty });
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RBrace, "}");
        if members.is_empty() {
            self.sink.emit(Diagnostic::error(DiagnosticKind::EmptyStruct, self.tokens[start as usize].loc, format!("struct '{name}' has no members")));
        }
        let end = self.prev_tok();
        Some(Node::new(NodeKind::Struct { name, members }, Span { start_tok: start, end_tok: end }))
    }

    fn parse_enum(&mut self) -> Option<Node> {
        let start = self.tok_u32();
        self.eat_ident("enum");
        let name = self.expect_ident()?;
        self.expect_punct(P::LBrace, "{");
        let mut enumerators = Vec::new();
        while !self.at_punct(P::RBrace) && !self.is_end() {
            let ename = self.expect_ident()?;
            let payload = if self.eat_punct(P::LParen) {
                let t = self.parse_type(0);
                self.expect_punct(P::RParen, ")");
                Some(t)
            } else {
                None
            };
            enumerators.push(EnumeratorDecl { name: ename, payload });
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RBrace, "}");
        if enumerators.is_empty() {
            self.sink.emit(Diagnostic::error(DiagnosticKind::EmptyEnum, self.tokens[start as usize].loc, format!("enum '{name}' has no enumerators")));
        }
        let end = self.prev_tok();
        Some(Node::new(NodeKind::Enum { name, enumerators }, Span { start_tok: start, end_tok: end }))
    }

    fn parse_impl(&mut self) -> Option<Node> {
        let start = self.tok_u32();
        self.eat_ident("impl");
        let target = self.expect_ident()?;
        self.expect_punct(P::LBrace, "{");
        let mut functions = Vec::new();
        while !self.at_punct(P::RBrace) && !self.is_end() {
            if self.at_ident("impl") {
                self.error("nested impl".to_string());
                return None;
            }
            if !self.at_ident("fn") {
                self.error("expected function declaration in impl".to_string());
                return None;
            }
            functions.push(self.parse_function(true, Some(target.clone()))?);
        }
        self.expect_punct(P::RBrace, "}");
        let end = self.prev_tok();
        Some(Node::new(NodeKind::Impl { target, functions }, Span { start_tok: start, end_tok: end }))
    }

    // ---- types ----

    fn parse_type(&mut self, depth: u32) -> Node {
        let start = self.tok_u32();
        let is_const = self.eat_ident("const");
        let name = self.expect_ident().unwrap_or_default();
        let mut params = Vec::new();
        if self.eat_punct(P::Lt) {
            params.push(self.parse_type(depth + 1));
            while self.eat_punct(P::Comma) {
                params.push(self.parse_type(depth + 1));
            }
            self.expect_generic_close(depth + 1);
        }
        let end = self.prev_tok();
        Node::new(NodeKind::TypeExpr { name, params, is_const, decl: Cell::new(None) }, Span { start_tok: start, end_tok: end })
    }

    // ---- scopes / statements ----

    fn parse_scope(&mut self, of_function: bool) -> Option<Node> {
        let start = self.tok_u32();
        self.expect_punct(P::LBrace, "{");
        let (items, return_last_expr) = self.parse_scope_items();
        self.expect_punct(P::RBrace, "}");
        let end = self.prev_tok();
        Some(Node::new(NodeKind::Scope { items, return_last_expr, of_function }, Span { start_tok: start, end_tok: end }))
    }

    /// Parses statements/expressions up to (not including) the closing `}`.
    fn parse_scope_items(&mut self) -> (Vec<Node>, bool) {
        let mut items = Vec::new();
        let mut return_last_expr = false;
        while !self.at_punct(P::RBrace) && !self.is_end() && !self.had_error {
            let (node, is_plain_expr) = self.parse_stmt();
            let had_semi = self.eat_punct(P::Semi);
            if is_plain_expr && !had_semi && self.at_punct(P::RBrace) {
                return_last_expr = true;
                items.push(node);
                break;
            }
            items.push(node);
        }
        (items, return_last_expr)
    }

    /// Returns `(node, is_plain_expr)`. `is_plain_expr` is true only for a
    /// bare expression statement, the only case eligible to become the
    /// scope's trailing expression (spec.md 4.2).
    fn parse_stmt(&mut self) -> (Node, bool) {
        if self.at_ident("let") || self.at_ident("const") {
            (self.parse_var_decl(), false)
        } else if self.at_ident("return") {
            (self.parse_return(), false)
        } else if self.at_ident("break") {
            let t = self.tok_u32();
            self.pos += 1;
            (Node::leaf(NodeKind::Break, t), false)
        } else if self.at_ident("continue") {
            let t = self.tok_u32();
            self.pos += 1;
            (Node::leaf(NodeKind::Continue, t), false)
        } else if self.at_ident("if") {
            (self.parse_if(), false)
        } else if self.at_ident("switch") {
            (self.parse_switch(), false)
        } else if self.at_ident("loop") {
            (self.parse_loop(), false)
        } else if self.at_ident("for") {
            (self.parse_for(), false)
        } else if self.at_ident("while") {
            (self.parse_while(), false)
        } else if self.at_ident("do") {
            (self.parse_do_while(), false)
        } else if self.at_ident("fn") {
            (self.parse_function(false, None).unwrap_or_else(|| self.error_node()), false)
        } else if self.at_ident("struct") {
            (self.parse_struct().unwrap_or_else(|| self.error_node()), false)
        } else if self.at_ident("enum") {
            (self.parse_enum().unwrap_or_else(|| self.error_node()), false)
        } else if self.at_ident("impl") {
            (self.parse_impl().unwrap_or_else(|| self.error_node()), false)
        } else {
            (self.parse_expr(), true)
        }
    }

    fn error_node(&self) -> Node {
        Node::leaf(NodeKind::NoneLit, self.tok_u32())
    }

    fn parse_var_decl(&mut self) -> Node {
        let start = self.tok_u32();
        let is_const = self.at_ident("const");
        self.pos += 1; // 'let' or 'const'
        let name = self.expect_ident().unwrap_or_default();
        let declared_type = if self.eat_punct(P::Colon) { Some(Box::new(self.parse_type(0))) } else { None };
        let init = if self.eat_punct(P::Eq) { Some(Box::new(self.parse_expr())) } else { None };
        let end = self.prev_tok();
        Node::new(
            NodeKind::VariableDeclaration {
                name,
                declared_type,
                ignore_initializer: init.is_none(),
                init,
                index: Cell::new(None),
                is_shadowing: Cell::new(false),
                is_const,
            },
            Span { start_tok: start, end_tok: end },
        )
    }

    fn parse_return(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let value = if self.at_punct(P::Semi) || self.at_punct(P::RBrace) { None } else { Some(Box::new(self.parse_expr())) };
        Node::new(NodeKind::Return(value), Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_if(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let cond = Box::new(self.parse_expr());
        let then_branch = Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node()));
        let else_branch = if self.eat_ident("else") {
            if self.at_ident("if") {
                Some(Box::new(self.parse_if()))
            } else {
                Some(Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node())))
            }
        } else {
            None
        };
        Node::new(NodeKind::If { cond, then_branch, else_branch }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_switch(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let subject = Box::new(self.parse_expr());
        self.expect_punct(P::LBrace, "{");
        let mut cases = Vec::new();
        while self.eat_ident("case") {
            let cond = self.parse_expr();
            self.expect_punct(P::Colon, ":");
            let mut body_items = Vec::new();
            while !self.at_ident("case") && !self.at_punct(P::RBrace) && !self.is_end() {
                let (n, _) = self.parse_stmt();
                self.eat_punct(P::Semi);
                body_items.push(n);
            }
            let body_span = Span { start_tok: cond.span.start_tok, end_tok: self.prev_tok() };
            let body = Node::new(NodeKind::Scope { items: body_items, return_last_expr: false, of_function: false }, body_span);
            cases.push(CaseArm { cond, body });
        }
        self.expect_punct(P::RBrace, "}");
        if cases.is_empty() {
            self.sink.emit(Diagnostic::error(DiagnosticKind::EmptySwitch, self.tokens[start as usize].loc, "switch has no cases".to_string()));
        }
        Node::new(NodeKind::Switch { subject, cases }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_loop(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let body = Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node()));
        Node::new(NodeKind::Loop { body }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_for(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let iter_target = Box::new(self.parse_indexref());
        self.eat_ident("in");
        let iterable = Box::new(self.parse_expr());
        let body = Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node()));
        Node::new(NodeKind::For { iter_target, iterable, body }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_while(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let cond = Box::new(self.parse_expr());
        let body = Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node()));
        Node::new(NodeKind::While { cond, body }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_do_while(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1;
        let body = Box::new(self.parse_scope(false).unwrap_or_else(|| self.error_node()));
        self.eat_ident("while");
        let cond = Box::new(self.parse_expr());
        Node::new(NodeKind::DoWhile { body, cond }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    // ---- expressions, precedence climb ----

    fn parse_expr(&mut self) -> Node {
        self.parse_assign()
    }

    fn parse_assign(&mut self) -> Node {
        let left = self.parse_range();
        if self.eat_punct(P::Eq) {
            let right = self.parse_assign();
            let span = Span { start_tok: left.span.start_tok, end_tok: self.prev_tok() };
            Node::new(NodeKind::Assign { target: Box::new(left), value: Box::new(right) }, span)
        } else {
            left
        }
    }

    fn parse_range(&mut self) -> Node {
        let begin = self.parse_logical();
        if self.eat_punct(P::DotDot) {
            let end = self.parse_logical();
            let span = Span { start_tok: begin.span.start_tok, end_tok: self.prev_tok() };
            Node::new(NodeKind::Range { begin: Box::new(begin), end: Box::new(end) }, span)
        } else {
            begin
        }
    }

    fn parse_logical(&mut self) -> Node {
        let mut left = self.parse_bit_op();
        loop {
            let op = if self.eat_punct(P::AmpAmp) {
                ArithOp::LogicalAnd
            } else if self.eat_punct(P::PipePipe) {
                ArithOp::LogicalOr
            } else {
                break;
            };
            let rhs = self.parse_bit_op();
            left = self.fold_expr(left, op, rhs);
        }
        left
    }

    fn parse_bit_op(&mut self) -> Node {
        let mut left = self.parse_compare();
        loop {
            let op = if self.eat_punct(P::Amp) {
                ArithOp::BitAnd
            } else if self.eat_punct(P::Caret) {
                ArithOp::BitXor
            } else if self.eat_punct(P::Pipe) {
                ArithOp::BitOr
            } else {
                break;
            };
            let rhs = self.parse_compare();
            left = self.fold_expr(left, op, rhs);
        }
        left
    }

    fn parse_compare(&mut self) -> Node {
        let left = self.parse_shift();
        let mut tail = Vec::new();
        loop {
            let op = if self.eat_punct(P::EqEq) {
                CmpOp::Eq
            } else if self.eat_punct(P::NotEq) {
                CmpOp::NotEq
            } else if self.eat_punct(P::Ge) {
                CmpOp::GtEq
            } else if self.eat_punct(P::Le) {
                CmpOp::LtEq
            } else if self.eat_punct(P::Gt) {
                CmpOp::Gt
            } else if self.eat_punct(P::Lt) {
                CmpOp::Lt
            } else {
                break;
            };
            let rhs = self.parse_shift();
            tail.push((op, rhs));
        }
        if tail.is_empty() {
            left
        } else {
            let span = Span { start_tok: left.span.start_tok, end_tok: self.prev_tok() };
            Node::new(NodeKind::Compare { left: Box::new(left), tail }, span)
        }
    }

    fn parse_shift(&mut self) -> Node {
        let mut left = self.parse_add();
        loop {
            let op = if self.eat_punct(P::Shl) {
                ArithOp::LShift
            } else if self.eat_punct(P::Shr) {
                ArithOp::RShift
            } else {
                break;
            };
            let rhs = self.parse_add();
            left = self.fold_expr(left, op, rhs);
        }
        left
    }

    fn parse_add(&mut self) -> Node {
        let mut left = self.parse_mul();
        loop {
            let op = if self.eat_punct(P::Plus) {
                ArithOp::Add
            } else if self.eat_punct(P::Minus) {
                ArithOp::Sub
            } else {
                break;
            };
            let rhs = self.parse_mul();
            left = self.fold_expr(left, op, rhs);
        }
        left
    }

    fn parse_mul(&mut self) -> Node {
        let mut left = self.parse_unary();
        loop {
            let op = if self.eat_punct(P::Star) {
                ArithOp::Mul
            } else if self.eat_punct(P::Slash) {
                ArithOp::Div
            } else if self.eat_punct(P::Percent) {
                ArithOp::Mod
            } else {
                break;
            };
            let rhs = self.parse_unary();
            left = self.fold_expr(left, op, rhs);
        }
        left
    }

    /// Folds `op` into `left`'s tail if `left` is already an `Expr` node
    /// started at this precedence chain, otherwise starts a new one.
    fn fold_expr(&mut self, left: Node, op: ArithOp, rhs: Node) -> Node {
        let span = Span { start_tok: left.span.start_tok, end_tok: self.prev_tok() };
        match left.kind {
            NodeKind::Expr { left: inner_left, mut tail } => {
                tail.push((op, rhs));
                Node::new(NodeKind::Expr { left: inner_left, tail }, span)
            }
            _ => Node::new(NodeKind::Expr { left: Box::new(left), tail: vec![(op, rhs)] }, span),
        }
    }

    fn parse_unary(&mut self) -> Node {
        if self.at_ident("new") {
            return self.parse_new_struct();
        }
        if self.at_punct(P::Minus) {
            let start = self.tok_u32();
            self.pos += 1;
            let e = self.parse_indexref();
            return Node::new(NodeKind::UnaryMinus(Box::new(e)), Span { start_tok: start, end_tok: self.prev_tok() });
        }
        if self.at_punct(P::Plus) {
            let start = self.tok_u32();
            self.pos += 1;
            let e = self.parse_indexref();
            return Node::new(NodeKind::UnaryPlus(Box::new(e)), Span { start_tok: start, end_tok: self.prev_tok() });
        }
        self.parse_indexref()
    }

    fn parse_new_struct(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1; // 'new'
        let tname = self.expect_ident().unwrap_or_default();
        let type_name = Box::new(Node::leaf(NodeKind::UserTypeName(tname), start + 1));
        self.expect_punct(P::LParen, "(");
        let mut fields = Vec::new();
        while !self.at_punct(P::RParen) && !self.is_end() {
            let fname = self.expect_ident().unwrap_or_default();
            self.expect_punct(P::Colon, ":");
            let value = self.parse_expr();
            if fields.iter().any(|f: &FieldInit| f.name == fname) {
                self.error(format!("duplicate field '{fname}' in struct initializer"));
                break;
            }
            fields.push(FieldInit { name: fname, value });
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RParen, ")");
        Node::new(NodeKind::StructConstructor { type_name, fields }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_indexref(&mut self) -> Node {
        let base = self.parse_primary();
        let start = base.span.start_tok;
        let mut subs = Vec::new();
        loop {
            if self.eat_punct(P::LBracket) {
                let idx = self.parse_expr();
                self.expect_punct(P::RBracket, "]");
                subs.push(Subscript::Index(idx));
            } else if self.eat_punct(P::Dot) {
                let name = self.expect_ident().unwrap_or_default();
                if self.eat_punct(P::LParen) {
                    let args = self.parse_call_args();
                    subs.push(Subscript::Call {
                        name,
                        args,
                        is_builtin: Cell::new(false),
                        builtin_func: Cell::new(None),
                        callee: Cell::new(None),
                        is_membercall: Cell::new(true),
                        enum_decl: Cell::new(None),
                        enumerator_index: Cell::new(None),
                    });
                } else {
                    subs.push(Subscript::Member {
                        name,
                        member_index: Cell::new(None),
                        enum_decl: Cell::new(None),
                        enumerator_index: Cell::new(None),
                    });
                }
            } else {
                break;
            }
        }
        if subs.is_empty() {
            base
        } else {
            let span = Span { start_tok: start, end_tok: self.prev_tok() };
            Node::new(NodeKind::IndexRef { base: Box::new(base), subs }, span)
        }
    }

    fn parse_call_args(&mut self) -> Vec<Node> {
        let mut args = Vec::new();
        while !self.at_punct(P::RParen) && !self.is_end() {
            args.push(self.parse_call_arg());
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RParen, ")");
        args
    }

    /// A call argument is normally an expression, but inside a `switch`
    /// case condition an argument position may hold the `_` wildcard
    /// (spec.md 8 scenario S6: `case E.B(_): ...`).
    fn parse_call_arg(&mut self) -> Node {
        if self.cur().kind == TokenKind::Identifier && self.cur().text == "_" {
            let t = self.tok_u32();
            self.pos += 1;
            Node::leaf(NodeKind::Wildcard, t)
        } else {
            self.parse_expr()
        }
    }

    fn parse_primary(&mut self) -> Node {
        if self.at_punct(P::LBracket) {
            return self.parse_vector();
        }
        if self.at_ident("dict") {
            return self.parse_dict_typed();
        }
        if self.at_ident("cast") {
            return self.parse_cast();
        }
        self.parse_factor()
    }

    fn parse_vector(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1; // '['
        let mut items = Vec::new();
        while !self.at_punct(P::RBracket) && !self.is_end() {
            items.push(self.parse_expr());
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RBracket, "]");
        Node::new(NodeKind::Vector(items), Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_dict_typed(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1; // 'dict'
        self.expect_punct(P::Lt, "<");
        let key_type = self.parse_type(1);
        self.expect_punct(P::Comma, ",");
        let value_type = self.parse_type(1);
        self.expect_generic_close(1);
        self.expect_punct(P::LBrace, "{");
        let mut pairs = Vec::new();
        while !self.at_punct(P::RBrace) && !self.is_end() {
            let k = self.parse_expr();
            self.expect_punct(P::Colon, ":");
            let v = self.parse_expr();
            pairs.push((k, v));
            if !self.eat_punct(P::Comma) {
                break;
            }
        }
        self.expect_punct(P::RBrace, "}");
        Node::new(
            NodeKind::Dict { pairs, key_type: Some(Box::new(key_type)), value_type: Some(Box::new(value_type)) },
            Span { start_tok: start, end_tok: self.prev_tok() },
        )
    }

    fn parse_cast(&mut self) -> Node {
        let start = self.tok_u32();
        self.pos += 1; // 'cast'
        self.expect_punct(P::Lt, "<");
        let target = self.parse_type(1);
        self.expect_generic_close(1);
        self.expect_punct(P::LParen, "(");
        let expr = self.parse_expr();
        self.expect_punct(P::RParen, ")");
        Node::new(NodeKind::Cast { target: Box::new(target), expr: Box::new(expr) }, Span { start_tok: start, end_tok: self.prev_tok() })
    }

    fn parse_factor(&mut self) -> Node {
        let start = self.tok_u32();
        if self.eat_punct(P::LParen) {
            let e = self.parse_expr();
            self.expect_punct(P::RParen, ")");
            return e;
        }
        if self.at_punct(P::LBrace) {
            return self.parse_brace_primary();
        }
        if self.eat_ident("none") {
            return Node::leaf(NodeKind::NoneLit, start);
        }
        if self.eat_ident("true") {
            return Node::leaf(NodeKind::True, start);
        }
        if self.eat_ident("false") {
            return Node::leaf(NodeKind::False, start);
        }
        match self.cur().kind {
            TokenKind::Int => {
                let v: i64 = self.cur().text.parse().unwrap_or(0);
                self.pos += 1;
                Node::leaf(NodeKind::Value(Literal::Int(v)), start)
            }
            TokenKind::USize => {
                let digits = self.cur().text.trim_end_matches('u');
                let v: u64 = digits.parse().unwrap_or(0);
                self.pos += 1;
                Node::leaf(NodeKind::Value(Literal::USize(v)), start)
            }
            TokenKind::Float => {
                let v: f32 = self.cur().text.parse().unwrap_or(0.0);
                self.pos += 1;
                Node::leaf(NodeKind::Value(Literal::Float(v)), start)
            }
            TokenKind::String => {
                let s = self.cur().text.clone();
                self.pos += 1;
                Node::leaf(NodeKind::Value(Literal::String(s)), start)
            }
            TokenKind::Identifier => {
                let name = self.cur().text.clone();
                self.pos += 1;
                if self.eat_punct(P::LParen) {
                    let args = self.parse_call_args();
                    Node::new(
                        NodeKind::CallFunc {
                            name,
                            args,
                            is_builtin: Cell::new(false),
                            builtin_func: Cell::new(None),
                            callee: Cell::new(None),
                            is_membercall: Cell::new(false),
                        },
                        Span { start_tok: start, end_tok: self.prev_tok() },
                    )
                } else {
                    Node::leaf(NodeKind::Variable { name, resolved: Cell::new(None) }, start)
                }
            }
            _ => {
                self.error("expected an expression".to_string());
                Node::leaf(NodeKind::NoneLit, start)
            }
        }
    }
}
