//! Dead-store elimination.
//!
//! Removes two kinds of slot writes:
//!
//! - a `store` that a later `store` in the same block overwrites before
//!   anything reads the slot
//! - any write to a slot that nothing in the function ever loads from
//!
//! Stored values stay defined; only the writes go.

use rustc_hash::FxHashSet;
use tracing::debug;

use crate::ir::{Function, Instr, SlotId};

/// Remove dead stores. Returns the number removed.
pub fn eliminate_dead_stores(func: &mut Function) -> usize {
    let loaded: FxHashSet<SlotId> = func
        .blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(loads_from)
        .collect();

    let mut removed = 0;
    for block in &mut func.blocks {
        let overwritten = overwritten_stores(&block.body);
        let mut position = 0;
        removed += block.retain(|instr| {
            let here = position;
            position += 1;
            let unread = instr
                .writes_slot()
                .is_some_and(|slot| !loaded.contains(&slot));
            !(unread || overwritten.contains(&here))
        });
    }
    if removed > 0 {
        debug!(function = func.name.raw(), removed, "dead-store elimination");
    }
    removed
}

/// Slot an instruction observes. Element stores also count as reads in
/// [`Instr::reads_slot`]; here only real loads do.
fn loads_from(instr: &Instr) -> Option<SlotId> {
    match instr {
        Instr::Load { slot, .. } | Instr::IndexLoad { slot, .. } | Instr::VecLoad { slot, .. } => {
            Some(*slot)
        }
        _ => None,
    }
}

/// Positions of whole-slot stores overwritten later in `body` with no read
/// in between.
fn overwritten_stores(body: &[Instr]) -> FxHashSet<usize> {
    let mut dead = FxHashSet::default();
    // Walking backwards: slots whose next access is a whole-slot store.
    let mut shadowed: FxHashSet<SlotId> = FxHashSet::default();
    for (position, instr) in body.iter().enumerate().rev() {
        if let Instr::Store { slot, .. } = instr {
            if !shadowed.insert(*slot) {
                dead.insert(position);
            }
        } else if let Some(slot) = instr.reads_slot() {
            shadowed.remove(&slot);
        }
    }
    dead
}

#[cfg(test)]
mod tests;
