//! Tail-call optimization.
//!
//! A self call flagged `tail` whose result is returned unchanged, either by
//! the block's own `ret` or through a chain of empty join blocks, becomes a
//! jump back to the entry block carrying the call's arguments. The entry
//! block's parameters are the function's parameters, so the arguments
//! rebind them for the next iteration.

use tracing::{debug, trace};

use crate::graph;
use crate::ir::{CallConv, Function, Instr, Terminator, VarId};

/// Turn returned self calls into loops. Returns the number rewritten.
pub fn eliminate_tail_calls(func: &mut Function) -> usize {
    let uses = graph::use_counts(func);
    let entry = func.entry;
    let mut rewritten = 0;
    for index in 0..func.blocks.len() {
        let block = &func.blocks[index];
        let Some(Instr::Call {
            dst,
            callee,
            conv: CallConv::Native,
            tail: true,
            ..
        }) = block.body.last()
        else {
            continue;
        };
        let single_use = dst.map_or(true, |dst| uses[dst.index()] == 1);
        if *callee != func.name || !single_use || !returns_directly(func, &block.terminator, *dst) {
            continue;
        }

        let block = &mut func.blocks[index];
        let Some(last) = block.body.len().checked_sub(1) else {
            continue;
        };
        let (Instr::Call { args, .. }, _) = block.remove(last) else {
            continue;
        };
        trace!(block = block.id.raw(), "tail call becomes a jump");
        block.terminator = Terminator::Jump {
            target: entry,
            args,
        };
        rewritten += 1;
    }
    if rewritten > 0 {
        graph::remove_unreachable(func);
        debug!(function = func.name.raw(), rewritten, "tail-call optimization");
    }
    rewritten
}

/// Whether `term` returns `value` untouched, possibly after jumping through
/// blocks with no instructions.
fn returns_directly(func: &Function, term: &Terminator, value: Option<VarId>) -> bool {
    let mut term = term;
    let mut value = value;
    // Bounded by the block count so a cycle of empty blocks terminates.
    for _ in 0..=func.blocks.len() {
        match term {
            Terminator::Return(returned) => return *returned == value,
            Terminator::Jump { target, args } => {
                let block = func.block(*target);
                if !block.body.is_empty() {
                    return false;
                }
                if let Some(v) = value {
                    let Some(param) = args
                        .iter()
                        .position(|arg| *arg == v)
                        .and_then(|pos| block.params.get(pos))
                    else {
                        return false;
                    };
                    value = Some(*param);
                }
                term = &block.terminator;
            }
            Terminator::Branch { .. } | Terminator::Unreachable => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests;
