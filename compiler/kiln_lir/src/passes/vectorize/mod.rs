//! Straight-line vectorization.
//!
//! Within a block, `width` element stores
//!
//! ```text
//! store $d[k + j], (op (index $a[k + j]) (index $b[k + j]))    j = 0..width
//! ```
//!
//! with constant indices and `k` a multiple of `width` become one
//! `vload`/`vload`/`v<op>`/`vstore` sequence placed at the last store.
//! Every matched value must have no other use, and nothing between the
//! first matched instruction and the last store may write `$a`, `$b` or
//! `$d`, or read `$d`.

use kiln_ir::{BinaryOp, Span};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use super::constants;
use crate::graph;
use crate::ir::{Const, Function, Instr, SlotId, Ty, Value, VarId};

/// Vectorize every matching store group. Returns the number of groups.
pub fn vectorize(func: &mut Function, width: u32) -> usize {
    if width < 2 {
        return 0;
    }
    let consts = constants(func);
    let mut orphans = FxHashSet::default();
    let mut groups = 0;
    for index in 0..func.blocks.len() {
        loop {
            let Some(group) = Scan::new(func, index, &consts).find_group(width) else {
                break;
            };
            orphans.extend(group.indices.iter().copied());
            rewrite(func, index, &group, width);
            groups += 1;
        }
    }
    if groups > 0 {
        remove_orphans(func, &orphans);
        debug!(function = func.name.raw(), groups, "vectorization");
    }
    groups
}

/// A matched store group.
struct Group {
    op: BinaryOp,
    elem: Ty,
    lhs: SlotId,
    rhs: SlotId,
    dest: SlotId,
    start: u64,
    /// Positions of every matched instruction, ascending.
    members: Vec<usize>,
    /// Index variables the matched instructions used.
    indices: Vec<VarId>,
    span: Option<Span>,
}

struct Lane {
    op: BinaryOp,
    lhs: SlotId,
    rhs: SlotId,
    value: VarId,
    positions: [usize; 4],
    indices: [VarId; 3],
}

struct Scan<'a> {
    func: &'a Function,
    body: &'a [Instr],
    spans: &'a [Option<Span>],
    consts: &'a FxHashMap<VarId, Const>,
    uses: Vec<u32>,
    defs: FxHashMap<VarId, usize>,
}

impl<'a> Scan<'a> {
    fn new(func: &'a Function, block: usize, consts: &'a FxHashMap<VarId, Const>) -> Self {
        let block = &func.blocks[block];
        let body = block.body.as_slice();
        let defs = body
            .iter()
            .enumerate()
            .filter_map(|(pos, instr)| instr.def().map(|def| (def, pos)))
            .collect();
        Scan {
            func,
            body,
            spans: &block.spans,
            consts,
            uses: graph::use_counts(func),
            defs,
        }
    }

    fn find_group(&self, width: u32) -> Option<Group> {
        (0..self.body.len()).find_map(|pos| self.group_at(pos, width))
    }

    fn group_at(&self, pos: usize, width: u32) -> Option<Group> {
        let Instr::IndexStore { slot: dest, index, .. } = self.body[pos] else {
            return None;
        };
        let start = self.const_index(index)?;
        let lanes_wanted = usize::try_from(width).ok()?;
        if start % u64::from(width) != 0 {
            return None;
        }

        let stores: Vec<usize> = (pos..self.body.len())
            .filter(|&p| matches!(self.body[p], Instr::IndexStore { slot, .. } if slot == dest))
            .take(lanes_wanted)
            .collect();
        if stores.len() != lanes_wanted {
            return None;
        }
        let lanes = (start..)
            .zip(&stores)
            .map(|(at, &store)| self.lane(store, at))
            .collect::<Option<Vec<_>>>()?;

        let first = &lanes[0];
        let (op, lhs, rhs) = (first.op, first.lhs, first.rhs);
        if lanes
            .iter()
            .any(|lane| lane.op != op || lane.lhs != lhs || lane.rhs != rhs)
        {
            return None;
        }

        let elem = self.elem_of(dest, start, width)?;
        let lane_op = matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
            || (op.is_bitwise() && elem.is_int());
        if !lane_op
            || self.elem_of(lhs, start, width)? != elem
            || self.elem_of(rhs, start, width)? != elem
            || lanes.iter().any(|lane| *self.func.var_type(lane.value) != elem)
        {
            return None;
        }

        let mut members: Vec<usize> = lanes.iter().flat_map(|lane| lane.positions).collect();
        members.sort_unstable();
        members.dedup();
        let last = *stores.last()?;
        let member_set: FxHashSet<usize> = members.iter().copied().collect();
        let touched = [lhs, rhs, dest];
        let interferes = (members[0]..=last)
            .filter(|p| !member_set.contains(p))
            .any(|p| {
                let instr = &self.body[p];
                instr.writes_slot().is_some_and(|slot| touched.contains(&slot))
                    || instr.reads_slot() == Some(dest)
            });
        if interferes {
            trace!(start, "store group interferes with other accesses");
            return None;
        }

        Some(Group {
            op,
            elem,
            lhs,
            rhs,
            dest,
            start,
            members,
            indices: lanes.iter().flat_map(|lane| lane.indices).collect(),
            span: self.spans[last],
        })
    }

    /// `store $d[at], (op (index $a[at]) (index $b[at]))`
    fn lane(&self, store: usize, at: u64) -> Option<Lane> {
        let Instr::IndexStore { index, value, .. } = self.body[store] else {
            return None;
        };
        if self.const_index(index)? != at {
            return None;
        }
        let value_pos = self.single_use_def(value)?;
        let Instr::Let {
            value: Value::Binary { op, lhs, rhs },
            ..
        } = self.body[value_pos]
        else {
            return None;
        };
        let (lhs_slot, lhs_pos, lhs_index) = self.load_at(lhs, at)?;
        let (rhs_slot, rhs_pos, rhs_index) = self.load_at(rhs, at)?;
        Some(Lane {
            op,
            lhs: lhs_slot,
            rhs: rhs_slot,
            value,
            positions: [store, value_pos, lhs_pos, rhs_pos],
            indices: [index, lhs_index, rhs_index],
        })
    }

    fn load_at(&self, var: VarId, at: u64) -> Option<(SlotId, usize, VarId)> {
        let pos = self.single_use_def(var)?;
        let Instr::IndexLoad { slot, index, .. } = self.body[pos] else {
            return None;
        };
        (self.const_index(index)? == at).then_some((slot, pos, index))
    }

    fn single_use_def(&self, var: VarId) -> Option<usize> {
        if self.uses.get(var.index()).copied() != Some(1) {
            return None;
        }
        self.defs.get(&var).copied()
    }

    fn const_index(&self, var: VarId) -> Option<u64> {
        let n = self.consts.get(&var)?.as_int()?;
        u64::try_from(n).ok()
    }

    /// Element type of the array in `slot`, if it is numeric and holds the
    /// lanes `start..start + width`.
    fn elem_of(&self, slot: SlotId, start: u64, width: u32) -> Option<Ty> {
        let (elem, len) = self.func.slot_type(slot).as_array()?;
        (elem.is_numeric() && start + u64::from(width) <= len).then(|| elem.clone())
    }
}

fn rewrite(func: &mut Function, index: usize, group: &Group, width: u32) {
    let vector = Ty::Vector(Box::new(group.elem.clone()), width);
    let lhs = func.fresh_var(vector.clone());
    let rhs = func.fresh_var(vector.clone());
    let result = func.fresh_var(vector);

    let block = &mut func.blocks[index];
    let Some(&last) = group.members.last() else {
        return;
    };
    let at = last + 1 - group.members.len();
    for &pos in group.members.iter().rev() {
        block.remove(pos);
    }
    let start = group.start;
    let replacement = [
        Instr::VecLoad {
            dst: lhs,
            slot: group.lhs,
            start,
        },
        Instr::VecLoad {
            dst: rhs,
            slot: group.rhs,
            start,
        },
        Instr::VecBinary {
            dst: result,
            op: group.op,
            lhs,
            rhs,
        },
        Instr::VecStore {
            slot: group.dest,
            start,
            value: result,
        },
    ];
    for (offset, instr) in replacement.into_iter().enumerate() {
        block.insert(at + offset, instr, group.span);
    }
    trace!(start, width, "vectorized store group");
}

/// Drop constant index definitions left without uses.
fn remove_orphans(func: &mut Function, orphans: &FxHashSet<VarId>) {
    let uses = graph::use_counts(func);
    for block in &mut func.blocks {
        block.retain(|instr| match instr {
            Instr::Let {
                dst,
                value: Value::Const(_),
            } => !orphans.contains(dst) || uses[dst.index()] > 0,
            _ => true,
        });
    }
}

#[cfg(test)]
mod tests;
