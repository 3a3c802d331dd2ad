//! Loop-invariant code motion.
//!
//! Moves instructions whose result cannot change between iterations into
//! the loop's preheader:
//!
//! - `Let`s that neither trap nor read a variable defined in the loop
//! - `Load`s of slots the loop never writes
//!
//! Both are free of side effects, so executing them once before the loop
//! is equivalent even when the loop body never runs. Loops are visited
//! inner first, so an instruction can move out of several loops in turn.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::{Function, Instr, LoopInfo, SlotId, VarId};

/// Hoist invariant instructions out of every recorded loop. Returns the
/// number of instructions moved.
pub fn hoist_invariants(func: &mut Function) -> usize {
    let mut hoisted = 0;
    for index in 0..func.loops.len() {
        let info = func.loops[index].clone();
        hoisted += hoist_loop(func, &info);
    }
    if hoisted > 0 {
        debug!(function = func.name.raw(), hoisted, "loop-invariant code motion");
    }
    hoisted
}

fn hoist_loop(func: &mut Function, info: &LoopInfo) -> usize {
    let mut written: FxHashSet<SlotId> = FxHashSet::default();
    let mut defined: FxHashSet<VarId> = FxHashSet::default();
    for &id in &info.blocks {
        let block = func.block(id);
        defined.extend(block.params.iter().copied());
        for instr in &block.body {
            defined.extend(instr.def());
            written.extend(instr.writes_slot());
        }
    }

    let mut hoisted = 0;
    loop {
        let found = info.blocks.iter().find_map(|&id| {
            func.block(id)
                .body
                .iter()
                .position(|instr| is_invariant(instr, &defined, &written))
                .map(|pos| (id, pos))
        });
        let Some((id, pos)) = found else {
            break;
        };
        let (instr, span) = func.block_mut(id).remove(pos);
        if let Some(def) = instr.def() {
            defined.remove(&def);
        }
        func.block_mut(info.preheader).push(instr, span);
        hoisted += 1;
    }
    hoisted
}

fn is_invariant(instr: &Instr, defined: &FxHashSet<VarId>, written: &FxHashSet<SlotId>) -> bool {
    match instr {
        Instr::Let { .. } => instr.is_pure() && instr.uses().iter().all(|v| !defined.contains(v)),
        Instr::Load { slot, .. } => !written.contains(slot),
        _ => false,
    }
}

#[cfg(test)]
mod tests;
