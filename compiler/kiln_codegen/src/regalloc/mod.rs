//! Linear scan register allocation.
//!
//! Each virtual register gets one live interval: the hull of the
//! positions where it appears, widened to the bounds of every block it is
//! live into or out of. Intervals are visited in order of start; an
//! interval takes the lowest free register, or, when none is free, the
//! interval ending furthest away among it and the active ones is spilled
//! to its own frame slot.
//!
//! Spilled operands are reloaded into the target's scratch registers
//! around each instruction; call arguments and parameters instead refer to
//! the slot directly. Parallel moves are sequentialised last.

mod liveness;

#[cfg(test)]
mod tests;

use std::collections::BTreeSet;

use kiln_lir::BlockId;
use smallvec::SmallVec;
use tracing::debug;

use crate::isel::Selected;
use crate::machine::{Addr, MInst, MachineBlock, MachineFunction, Operand, Reg, Role, VReg, WORD};
use crate::moves::{sequentialize, Move};
use crate::target::TargetMachine;

use liveness::compute_liveness;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Location {
    Unused,
    Reg(Reg),
    /// Frame offset of the spill slot.
    Spill(u32),
}

#[derive(Clone, Copy, Debug)]
struct Interval {
    vreg: VReg,
    start: usize,
    end: usize,
}

pub(crate) fn allocate(selected: Selected, target: &TargetMachine) -> MachineFunction {
    let Selected {
        name,
        params,
        blocks,
        mut frame_size,
        vreg_words,
    } = selected;

    let intervals = build_intervals(&blocks, &params, vreg_words.len());
    let mut locations = linear_scan(intervals, target);

    let mut spills = 0;
    for (index, location) in locations.iter_mut().enumerate() {
        if let Location::Spill(offset) = location {
            *offset = frame_size;
            frame_size += u32::try_from(vreg_words[index] * u64::from(WORD)).unwrap_or(u32::MAX);
            spills += 1;
        }
    }
    let registers_used = locations
        .iter()
        .filter_map(|l| match l {
            Location::Reg(r) => Some(*r),
            _ => None,
        })
        .collect::<BTreeSet<_>>()
        .len();

    let rewriter = Rewriter {
        locations: &locations,
        vreg_words: &vreg_words,
        scratch: target.scratch(),
    };
    let mut blocks: Vec<MachineBlock> = blocks
        .into_iter()
        .map(|block| MachineBlock {
            id: block.id,
            insts: block
                .insts
                .into_iter()
                .flat_map(|inst| rewriter.rewrite(inst))
                .collect(),
        })
        .collect();
    remove_fallthrough_jumps(&mut blocks);

    let params = params
        .into_iter()
        .map(|param| match param.as_virtual().map(|v| locations[v.index()]) {
            Some(Location::Reg(r)) => Operand::Reg(r),
            Some(Location::Spill(offset)) => Operand::Frame(offset),
            _ => param,
        })
        .collect();

    debug!(
        function = name.as_str(),
        spills,
        registers_used,
        frame_size,
        "allocated registers"
    );
    MachineFunction {
        name,
        params,
        blocks,
        frame_size,
        spills,
        registers_used: u32::try_from(registers_used).unwrap_or(u32::MAX),
    }
}

fn build_intervals(blocks: &[MachineBlock], params: &[Operand], vregs: usize) -> Vec<Interval> {
    let liveness = compute_liveness(blocks);
    let mut hull: Vec<Option<(usize, usize)>> = vec![None; vregs];
    let mut widen = |v: VReg, at: usize| {
        let entry = &mut hull[v.index()];
        *entry = Some(match *entry {
            Some((start, end)) => (start.min(at), end.max(at)),
            None => (at, at),
        });
    };

    for v in params.iter().filter_map(|p| p.as_virtual()) {
        widen(v, 0);
    }
    let mut position = 0;
    for (b, block) in blocks.iter().enumerate() {
        let first = position;
        for inst in &block.insts {
            for (operand, _) in inst.operands() {
                if let Some(v) = operand.as_virtual() {
                    widen(v, position);
                }
            }
            position += 1;
        }
        let last = position.saturating_sub(1).max(first);
        for &v in &liveness.live_in[b] {
            widen(v, first);
        }
        for &v in &liveness.live_out[b] {
            widen(v, last);
        }
    }

    let mut intervals: Vec<Interval> = hull
        .into_iter()
        .enumerate()
        .filter_map(|(index, range)| {
            let (start, end) = range?;
            let raw = u32::try_from(index).ok()?;
            Some(Interval {
                vreg: VReg::new(raw),
                start,
                end,
            })
        })
        .collect();
    intervals.sort_by_key(|iv| (iv.start, iv.vreg));
    intervals
}

fn linear_scan(intervals: Vec<Interval>, target: &TargetMachine) -> Vec<Location> {
    let vregs = intervals
        .iter()
        .map(|iv| iv.vreg.index() + 1)
        .max()
        .unwrap_or(0);
    let mut locations = vec![Location::Unused; vregs];
    let mut free: BTreeSet<Reg> = target.allocatable().collect();
    let mut active: Vec<(Interval, Reg)> = Vec::new();

    for current in intervals {
        active.retain(|(iv, reg)| {
            let expired = iv.end < current.start;
            if expired {
                free.insert(*reg);
            }
            !expired
        });

        if let Some(reg) = free.pop_first() {
            locations[current.vreg.index()] = Location::Reg(reg);
            active.push((current, reg));
            continue;
        }

        let furthest = active
            .iter()
            .enumerate()
            .max_by_key(|(_, (iv, _))| (iv.end, iv.vreg))
            .map(|(i, (iv, reg))| (i, *iv, *reg));
        match furthest {
            Some((i, victim, reg)) if victim.end > current.end => {
                locations[victim.vreg.index()] = Location::Spill(0);
                locations[current.vreg.index()] = Location::Reg(reg);
                active[i] = (current, reg);
            }
            _ => locations[current.vreg.index()] = Location::Spill(0),
        }
    }
    locations
}

struct Rewriter<'a> {
    locations: &'a [Location],
    vreg_words: &'a [u64],
    scratch: [Reg; 2],
}

impl Rewriter<'_> {
    fn location(&self, v: VReg) -> Location {
        self.locations.get(v.index()).copied().unwrap_or(Location::Unused)
    }

    fn width(&self, v: VReg) -> u64 {
        self.vreg_words[v.index()]
    }

    fn rewrite(&self, inst: MInst) -> SmallVec<[MInst; 4]> {
        match inst {
            MInst::ParallelMove { moves } => self.rewrite_moves(&moves).into_iter().collect(),
            MInst::Call {
                callee,
                conv,
                args,
                dst,
            } => {
                let args = args.into_iter().map(|arg| self.in_place(arg)).collect();
                self.rewrite_operands(MInst::Call {
                    callee,
                    conv,
                    args,
                    dst,
                })
            }
            inst => self.rewrite_operands(inst),
        }
    }

    /// A register or spill slot operand, for positions that read memory.
    fn in_place(&self, operand: Operand) -> Operand {
        match operand.as_virtual().map(|v| (v, self.location(v))) {
            Some((_, Location::Reg(r))) => Operand::Reg(r),
            Some((_, Location::Spill(offset))) => Operand::Frame(offset),
            Some((v, Location::Unused)) => panic!("v{} has no location", v.raw()),
            None => operand,
        }
    }

    fn rewrite_operands(&self, mut inst: MInst) -> SmallVec<[MInst; 4]> {
        let mut before: SmallVec<[MInst; 4]> = SmallVec::new();
        let mut after: Option<MInst> = None;
        let mut reloaded: SmallVec<[(VReg, Reg); 2]> = SmallVec::new();

        inst.map_operands(|operand, role| {
            let Some(v) = operand.as_virtual() else {
                return;
            };
            let offset = match self.location(v) {
                Location::Reg(r) => {
                    *operand = Operand::Reg(r);
                    return;
                }
                Location::Spill(offset) => offset,
                Location::Unused => panic!("v{} has no location", v.raw()),
            };
            let words = self.width(v);
            match role {
                Role::Use => {
                    let reg = match reloaded.iter().find(|(u, _)| *u == v) {
                        Some(&(_, reg)) => reg,
                        None => {
                            let Some(&reg) = self.scratch.get(reloaded.len()) else {
                                panic!("instruction reloads more than two spilled operands");
                            };
                            reloaded.push((v, reg));
                            before.push(reload(reg, offset, words));
                            reg
                        }
                    };
                    *operand = Operand::Reg(reg);
                }
                Role::Def => {
                    let reg = self.scratch[0];
                    after = Some(spill(offset, reg, words));
                    *operand = Operand::Reg(reg);
                }
            }
        });

        before.push(inst);
        before.extend(after);
        before
    }

    fn rewrite_moves(&self, moves: &[(Operand, Operand)]) -> Vec<MInst> {
        let moves: Vec<Move> = moves
            .iter()
            .map(|&(dst, src)| Move {
                dst: self.in_place(dst),
                src: self.in_place(src),
                words: dst.as_virtual().map_or(1, |v| self.width(v)),
            })
            .collect();
        sequentialize(&moves, self.scratch[0], self.scratch[1])
    }
}

fn reload(reg: Reg, offset: u32, words: u64) -> MInst {
    let (dst, addr) = (Operand::Reg(reg), Addr::Frame(offset));
    if words > 1 {
        MInst::VLoad {
            dst,
            addr,
            width: u32::try_from(words).unwrap_or(u32::MAX),
        }
    } else {
        MInst::Load { dst, addr }
    }
}

fn spill(offset: u32, reg: Reg, words: u64) -> MInst {
    let (addr, src) = (Addr::Frame(offset), Operand::Reg(reg));
    if words > 1 {
        MInst::VStore {
            addr,
            src,
            width: u32::try_from(words).unwrap_or(u32::MAX),
        }
    } else {
        MInst::Store { addr, src }
    }
}

/// Drop jumps to the block laid out next.
fn remove_fallthrough_jumps(blocks: &mut [MachineBlock]) {
    let next: Vec<Option<BlockId>> = blocks
        .iter()
        .skip(1)
        .map(|b| Some(b.id))
        .chain(std::iter::once(None))
        .collect();
    for (block, next) in blocks.iter_mut().zip(next) {
        if matches!(block.insts.last(), Some(MInst::Jump { target }) if Some(*target) == next) {
            block.insts.pop();
        }
    }
}
