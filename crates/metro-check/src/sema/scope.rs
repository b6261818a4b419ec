//! Lexical scope stack used while checking (spec.md 3.4, 4.3.1).

use metro_core::types::Type;

pub struct LocalVar {
    pub name: String,
    pub ty: Type,
    pub is_const: bool,
}

struct Frame {
    locals: Vec<LocalVar>,
    is_loop: bool,
}

/// LIFO stack of lexical frames. `resolve` walks outward from the top,
/// counting frames to produce the `(step, index)` pair Sema writes onto
/// `Variable`/`MemberVariable` nodes.
#[derive(Default)]
pub struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        ScopeStack { frames: Vec::new() }
    }

    pub fn push(&mut self, is_loop: bool) {
        self.frames.push(Frame { locals: Vec::new(), is_loop });
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Declares `name` in the current (top) frame, returning its index and
    /// whether this redeclares an existing name in the *same* frame
    /// (shadowing, spec.md 4.3.2).
    pub fn declare(&mut self, name: String, ty: Type, is_const: bool) -> (u32, bool) {
        let frame = self.frames.last_mut().expect("declare with no open scope");
        let shadows = frame.locals.iter().any(|l| l.name == name);
        let index = frame.locals.len() as u32;
        frame.locals.push(LocalVar { name, ty, is_const });
        (index, shadows)
    }

    /// Returns `(step, index, type, is_const)` for the nearest-enclosing
    /// binding of `name`, searching from the innermost frame outward.
    pub fn resolve(&self, name: &str) -> Option<(u32, u32, Type, bool)> {
        for (step, frame) in self.frames.iter().rev().enumerate() {
            if let Some((index, local)) = frame.locals.iter().enumerate().rev().find(|(_, l)| l.name == name) {
                return Some((step as u32, index as u32, local.ty.clone(), local.is_const));
            }
        }
        None
    }

    /// Whether a `break`/`continue` reached from here has an enclosing loop.
    pub fn in_loop(&self) -> bool {
        self.frames.iter().any(|f| f.is_loop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest::proptest! {
        /// spec.md 8 property 3: pushing N frames (each with an arbitrary
        /// number of declarations) and then popping the same N frames always
        /// restores the stack to its starting depth, regardless of how many
        /// locals were declared along the way.
        #[test]
        fn depth_returns_to_start_after_balanced_push_pop(
            declares_per_frame in proptest::collection::vec(0usize..6, 0..12)
        ) {
            let mut stack = ScopeStack::new();
            let start_depth = stack.depth();
            for (i, &n) in declares_per_frame.iter().enumerate() {
                stack.push(i % 2 == 0);
                for d in 0..n {
                    stack.declare(format!("v{d}"), Type::int(), false);
                }
            }
            for _ in 0..declares_per_frame.len() {
                stack.pop();
            }
            proptest::prop_assert_eq!(stack.depth(), start_depth);
        }
    }
}
