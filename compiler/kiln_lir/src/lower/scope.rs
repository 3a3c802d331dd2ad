//! Lexical scopes during lowering.
//!
//! Locals live in stack slots; a frame maps names to slots and carries the
//! actions that must run whenever control leaves it: releasing implicit
//! allocations and closing `atomic` sections.

use kiln_ir::Name;

use crate::ir::{BlockId, SlotId};

/// Work to do when control leaves a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ExitAction {
    /// Release the allocation stored in the slot.
    Release(SlotId),
    /// Call a runtime function taking no arguments.
    RuntimeCall(&'static str),
}

#[derive(Debug, Default)]
struct Frame {
    bindings: Vec<(Name, SlotId)>,
    exits: Vec<ExitAction>,
}

/// Stack of frames, innermost last.
#[derive(Debug, Default)]
pub(crate) struct ScopeStack {
    frames: Vec<Frame>,
}

impl ScopeStack {
    pub(crate) fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the innermost frame, returning its exit actions in run order.
    pub(crate) fn pop(&mut self) -> Vec<ExitAction> {
        let mut frame = self.frames.pop().unwrap_or_default();
        frame.exits.reverse();
        frame.exits
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.len()
    }

    pub(crate) fn bind(&mut self, name: Name, slot: SlotId) {
        if let Some(frame) = self.frames.last_mut() {
            frame.bindings.push((name, slot));
        }
    }

    pub(crate) fn lookup(&self, name: Name) -> Option<SlotId> {
        self.frames.iter().rev().find_map(|frame| {
            frame
                .bindings
                .iter()
                .rev()
                .find(|(bound, _)| *bound == name)
                .map(|(_, slot)| *slot)
        })
    }

    pub(crate) fn add_exit(&mut self, action: ExitAction) {
        if let Some(frame) = self.frames.last_mut() {
            frame.exits.push(action);
        }
    }

    /// Exit actions of every frame at `depth` or deeper, innermost first,
    /// each frame's actions in reverse registration order.
    pub(crate) fn exits_from(&self, depth: usize) -> Vec<ExitAction> {
        self.frames
            .get(depth..)
            .unwrap_or_default()
            .iter()
            .rev()
            .flat_map(|frame| frame.exits.iter().rev().copied())
            .collect()
    }
}

/// Targets of `break` and `continue` in the innermost loop.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LoopContext {
    pub(crate) latch: BlockId,
    pub(crate) exit: BlockId,
    /// Scope depth outside the loop body; frames above it are left by
    /// `break` and `continue`.
    pub(crate) depth: usize,
}

#[cfg(test)]
mod tests {
    use kiln_ir::StringInterner;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn inner_bindings_shadow_outer() {
        let interner = StringInterner::new();
        let x = interner.intern("x");
        let mut scopes = ScopeStack::default();
        scopes.push();
        scopes.bind(x, SlotId::new(0));
        scopes.push();
        scopes.bind(x, SlotId::new(1));
        assert_eq!(scopes.lookup(x), Some(SlotId::new(1)));
        scopes.pop();
        assert_eq!(scopes.lookup(x), Some(SlotId::new(0)));
        scopes.pop();
        assert_eq!(scopes.lookup(x), None);
    }

    #[test]
    fn exits_run_innermost_first() {
        let mut scopes = ScopeStack::default();
        scopes.push();
        scopes.add_exit(ExitAction::Release(SlotId::new(0)));
        scopes.add_exit(ExitAction::Release(SlotId::new(1)));
        scopes.push();
        scopes.add_exit(ExitAction::RuntimeCall("rt_atomic_end"));

        assert_eq!(
            scopes.exits_from(0),
            vec![
                ExitAction::RuntimeCall("rt_atomic_end"),
                ExitAction::Release(SlotId::new(1)),
                ExitAction::Release(SlotId::new(0)),
            ]
        );
        assert_eq!(
            scopes.exits_from(1),
            vec![ExitAction::RuntimeCall("rt_atomic_end")]
        );
        assert!(scopes.exits_from(2).is_empty());

        assert_eq!(scopes.pop(), vec![ExitAction::RuntimeCall("rt_atomic_end")]);
        assert_eq!(
            scopes.pop(),
            vec![
                ExitAction::Release(SlotId::new(1)),
                ExitAction::Release(SlotId::new(0)),
            ]
        );
    }
}
