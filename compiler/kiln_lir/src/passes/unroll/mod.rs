//! Loop unrolling.
//!
//! Applies to counted `for` loops whose induction was recorded at lowering,
//! with a known trip count and the plain shape
//!
//! ```text
//! preheader -> header -(cond)-> body -> latch -> header
//!                     \-> exit
//! ```
//!
//! where `header` only computes the condition. One iteration is the body
//! followed by the latch; with factor `f` and trip count `t`:
//!
//! - `f >= t`: the loop is replaced by `t` copies of the iteration
//! - `t % f == 0`: the body holds `f` iterations per trip around the loop
//! - otherwise `t % f` iterations are peeled into the preheader and the
//!   rest is unrolled in place
//!
//! Copies get fresh variables; slots are shared, so the copies communicate
//! through the induction slot exactly like successive iterations.

use kiln_ir::Span;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use crate::graph;
use crate::ir::{Block, BlockId, Function, Induction, Instr, Terminator, VarId};

/// Unroll every eligible loop. Returns the number of loops changed.
pub fn unroll_loops(func: &mut Function, factor: u32) -> usize {
    if factor < 2 {
        return 0;
    }
    let factor = u64::from(factor);
    let mut unrolled = 0;
    let mut index = 0;
    while index < func.loops.len() {
        match unroll_loop(func, index, factor) {
            Outcome::Replaced => {
                func.loops.remove(index);
                unrolled += 1;
            }
            Outcome::Unrolled => {
                unrolled += 1;
                index += 1;
            }
            Outcome::Skipped => index += 1,
        }
    }
    if unrolled > 0 {
        graph::remove_unreachable(func);
        debug!(function = func.name.raw(), unrolled, "loop unrolling");
    }
    unrolled
}

enum Outcome {
    /// Fully unrolled; the loop no longer exists.
    Replaced,
    Unrolled,
    Skipped,
}

/// A loop in unrollable shape.
struct Candidate {
    preheader: BlockId,
    body: BlockId,
    latch: BlockId,
    exit: BlockId,
    induction: Induction,
    trip: u64,
    /// Condition computation; pure.
    header: Vec<(Instr, Option<Span>)>,
    /// Body then latch instructions.
    iteration: Vec<(Instr, Option<Span>)>,
}

fn instrs_of(block: &Block) -> impl Iterator<Item = (Instr, Option<Span>)> + '_ {
    block.body.iter().cloned().zip(block.spans.iter().copied())
}

fn candidate(func: &Function, index: usize) -> Option<Candidate> {
    let info = &func.loops[index];
    let induction = info.induction?;
    let trip = induction.trip_count()?;
    let (header, latch) = (func.block(info.header), func.block(info.latch));

    let Terminator::Branch {
        then_block: body_id,
        else_block,
        ..
    } = header.terminator
    else {
        return None;
    };
    let body = func.block(body_id);
    let shape_ok = else_block == info.exit
        && info.blocks.len() == 3
        && [info.header, body_id, info.latch]
            .iter()
            .all(|b| info.blocks.contains(b))
        && body_id != info.latch
        && body_id != info.header
        && header.params.is_empty()
        && body.params.is_empty()
        && latch.params.is_empty()
        && body.terminator
            == (Terminator::Jump {
                target: info.latch,
                args: Vec::new(),
            })
        && latch.terminator
            == (Terminator::Jump {
                target: info.header,
                args: Vec::new(),
            })
        && header.body.iter().all(Instr::is_pure);
    if !shape_ok {
        return None;
    }

    // Values computed in the body or latch must not be needed elsewhere;
    // unrolling renames all of them.
    let inside: FxHashSet<VarId> = [body, latch]
        .iter()
        .flat_map(|block| block.body.iter().filter_map(Instr::def))
        .collect();
    let used_elsewhere = func
        .blocks
        .iter()
        .filter(|block| block.id != body_id && block.id != info.latch)
        .any(|block| {
            block
                .body
                .iter()
                .flat_map(Instr::uses)
                .chain(block.terminator.uses())
                .any(|v| inside.contains(&v))
        });
    if used_elsewhere {
        return None;
    }

    Some(Candidate {
        preheader: info.preheader,
        body: body_id,
        latch: info.latch,
        exit: info.exit,
        induction,
        trip,
        header: instrs_of(header).collect(),
        iteration: instrs_of(body).chain(instrs_of(latch)).collect(),
    })
}

fn unroll_loop(func: &mut Function, index: usize, factor: u64) -> Outcome {
    let Some(candidate) = candidate(func, index) else {
        return Outcome::Skipped;
    };
    let trip = candidate.trip;

    if factor >= trip {
        let mut copies = Vec::new();
        for _ in 0..trip {
            copy_iteration(func, &candidate, true, &mut copies);
        }
        let preheader = func.block_mut(candidate.preheader);
        for (instr, span) in copies {
            preheader.push(instr, span);
        }
        preheader.terminator = Terminator::Jump {
            target: candidate.exit,
            args: Vec::new(),
        };
        trace!(trip, "fully unrolled loop");
        return Outcome::Replaced;
    }

    let peeled = trip % factor;
    let mut induction = candidate.induction;
    let (Some(init), Some(step)) = (
        induction.value_at(peeled),
        i64::try_from(factor)
            .ok()
            .and_then(|f| induction.step.checked_mul(f)),
    ) else {
        return Outcome::Skipped;
    };
    induction.init = init;
    induction.step = step;

    if peeled > 0 {
        let mut copies = Vec::new();
        for _ in 0..peeled {
            copy_iteration(func, &candidate, true, &mut copies);
        }
        let preheader = func.block_mut(candidate.preheader);
        for (instr, span) in copies {
            preheader.push(instr, span);
        }
    }

    // The first iteration of each trip reuses the header's condition
    // values; later ones recompute them.
    let mut copies = Vec::new();
    copy_iteration(func, &candidate, false, &mut copies);
    for _ in 1..factor {
        copy_iteration(func, &candidate, true, &mut copies);
    }
    let body = func.block_mut(candidate.body);
    body.body.clear();
    body.spans.clear();
    for (instr, span) in copies {
        body.push(instr, span);
    }
    let latch = func.block_mut(candidate.latch);
    latch.body.clear();
    latch.spans.clear();

    func.loops[index].induction = Some(induction);
    trace!(trip, factor, peeled, "unrolled loop");
    Outcome::Unrolled
}

/// Append one iteration with every definition renamed, optionally
/// recomputing the header first.
fn copy_iteration(
    func: &mut Function,
    candidate: &Candidate,
    with_header: bool,
    out: &mut Vec<(Instr, Option<Span>)>,
) {
    let header: &[(Instr, Option<Span>)] = if with_header { &candidate.header } else { &[] };
    let mut renamed: FxHashMap<VarId, VarId> = FxHashMap::default();
    for (instr, span) in header.iter().chain(&candidate.iteration) {
        let mut copy = instr.clone();
        copy.map_uses(|v| renamed.get(&v).copied().unwrap_or(v));
        copy.map_def(|def| {
            let ty = func.var_type(def).clone();
            let fresh = func.fresh_var(ty);
            renamed.insert(def, fresh);
            fresh
        });
        out.push((copy, *span));
    }
}

#[cfg(test)]
mod tests;
