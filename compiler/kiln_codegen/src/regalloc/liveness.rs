//! Backward dataflow liveness over virtual registers.
//!
//! Per block, `gen` holds registers read before any write and `kill` the
//! registers written. Then, to a fixed point:
//!
//! - `live_out(B) = ∪ live_in(S)` over successors `S`
//! - `live_in(B) = gen(B) ∪ (live_out(B) - kill(B))`
//!
//! Block parameters need no special case: the parallel move ending each
//! predecessor writes them.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::machine::{MachineBlock, Role, VReg};

pub(crate) type LiveSet = FxHashSet<VReg>;

/// Live registers at each block boundary, indexed by layout position.
pub(crate) struct BlockLiveness {
    pub live_in: Vec<LiveSet>,
    pub live_out: Vec<LiveSet>,
}

pub(crate) fn compute_liveness(blocks: &[MachineBlock]) -> BlockLiveness {
    let position: FxHashMap<_, _> = blocks.iter().enumerate().map(|(i, b)| (b.id, i)).collect();
    let successors: Vec<Vec<usize>> = blocks
        .iter()
        .map(|block| {
            block
                .insts
                .last()
                .map(|last| last.successors().iter().map(|s| position[s]).collect())
                .unwrap_or_default()
        })
        .collect();

    let (gen, kill): (Vec<LiveSet>, Vec<LiveSet>) = blocks.iter().map(gen_kill).unzip();

    let mut live_in = vec![LiveSet::default(); blocks.len()];
    let mut live_out = vec![LiveSet::default(); blocks.len()];
    let mut rounds = 0u32;
    loop {
        rounds += 1;
        let mut changed = false;
        for b in (0..blocks.len()).rev() {
            let mut out = LiveSet::default();
            for &s in &successors[b] {
                out.extend(live_in[s].iter().copied());
            }
            let mut inn = gen[b].clone();
            inn.extend(out.iter().copied().filter(|v| !kill[b].contains(v)));
            if inn != live_in[b] || out != live_out[b] {
                changed = true;
                live_in[b] = inn;
                live_out[b] = out;
            }
        }
        if !changed {
            break;
        }
    }
    trace!(rounds, blocks = blocks.len(), "liveness converged");

    BlockLiveness { live_in, live_out }
}

fn gen_kill(block: &MachineBlock) -> (LiveSet, LiveSet) {
    let mut gen = LiveSet::default();
    let mut kill = LiveSet::default();
    for inst in &block.insts {
        for (operand, role) in inst.operands() {
            let Some(v) = operand.as_virtual() else {
                continue;
            };
            match role {
                Role::Use if !kill.contains(&v) => {
                    gen.insert(v);
                }
                Role::Use => {}
                Role::Def => {
                    kill.insert(v);
                }
            }
        }
    }
    (gen, kill)
}
