//! Constant folding and propagation.
//!
//! Runs a set of local rewrites to a fixpoint:
//!
//! - fold `Let`s whose operands are constants (never division or modulo by
//!   zero, never an operation that overflows its type)
//! - copy propagation
//! - store to load forwarding along single-predecessor chains
//! - propagation of slots stored exactly once, with a constant, in the
//!   entry block
//! - removal of bounds checks on constant in-range indices
//! - branch folding, block parameter substitution and jump chain merging
//! - removal of unreachable blocks and unused pure instructions
//!
//! The result is a fixpoint, so running the pass twice changes nothing the
//! second time.

use std::cmp::Ordering;

use kiln_ir::{BinaryOp, UnaryOp};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::constants;
use crate::graph::{self, predecessors, reverse_postorder};
use crate::ir::{Block, BlockId, Const, Function, Instr, SlotId, Terminator, Ty, Value, VarId};

/// Fold and propagate constants until nothing changes. Returns the number
/// of rewrites.
pub fn fold_constants(func: &mut Function) -> usize {
    let mut total = 0;
    loop {
        let changed = fold_values(func)
            + propagate_copies(func)
            + forward_stores(func)
            + propagate_single_stores(func)
            + remove_bounds_checks(func)
            + fold_branches(func)
            + substitute_block_params(func)
            + merge_jump_chains(func)
            + graph::remove_unreachable(func)
            + remove_dead_values(func);
        if changed == 0 {
            break;
        }
        total += changed;
    }
    if total > 0 {
        debug!(function = func.name.raw(), rewrites = total, "constant folding");
    }
    total
}

// Value folding

fn fold_values(func: &mut Function) -> usize {
    let consts = constants(func);
    let mut folded = 0;
    let var_types = &func.var_types;
    for block in &mut func.blocks {
        for instr in &mut block.body {
            let Instr::Let { dst, value } = instr else {
                continue;
            };
            let ty = &var_types[dst.index()];
            let result = match &*value {
                Value::Const(_) | Value::Var(_) => None,
                Value::Binary { op, lhs, rhs } => match (consts.get(lhs), consts.get(rhs)) {
                    (Some(a), Some(b)) => fold_binary(*op, *a, *b, ty),
                    _ => None,
                },
                Value::Unary { op, operand } => {
                    consts.get(operand).and_then(|c| fold_unary(*op, *c, ty))
                }
                Value::Cast(operand) => consts.get(operand).and_then(|c| fold_cast(*c, ty)),
            };
            if let Some(c) = result {
                *value = Value::Const(c);
                folded += 1;
            }
        }
    }
    folded
}

/// Fold a binary operation on constants, or `None` if the result is not
/// representable in `ty` or the operation would trap.
pub fn fold_binary(op: BinaryOp, lhs: Const, rhs: Const, ty: &Ty) -> Option<Const> {
    match (lhs, rhs) {
        (Const::Int(a), Const::Int(b)) => fold_int(op, a, b, ty),
        (Const::Float(a), Const::Float(b)) => fold_float(op, f64::from_bits(a), f64::from_bits(b), ty),
        (Const::Bool(a), Const::Bool(b)) => match op {
            BinaryOp::And => Some(Const::Bool(a && b)),
            BinaryOp::Or => Some(Const::Bool(a || b)),
            BinaryOp::Eq => Some(Const::Bool(a == b)),
            BinaryOp::NotEq => Some(Const::Bool(a != b)),
            _ => None,
        },
        // Interned: equal names are equal strings.
        (Const::Str(a), Const::Str(b)) => match op {
            BinaryOp::Eq => Some(Const::Bool(a == b)),
            BinaryOp::NotEq => Some(Const::Bool(a != b)),
            _ => None,
        },
        _ => None,
    }
}

fn compare(op: BinaryOp, ordering: Ordering) -> Option<bool> {
    Some(match op {
        BinaryOp::Eq => ordering.is_eq(),
        BinaryOp::NotEq => ordering.is_ne(),
        BinaryOp::Lt => ordering.is_lt(),
        BinaryOp::LtEq => ordering.is_le(),
        BinaryOp::Gt => ordering.is_gt(),
        BinaryOp::GtEq => ordering.is_ge(),
        _ => return None,
    })
}

/// Whether `n` is representable as a signed integer of `bits` bits.
pub(crate) fn fits(n: i64, bits: u32) -> bool {
    if bits >= 64 {
        return true;
    }
    let half = 1i64 << (bits - 1);
    (-half..half).contains(&n)
}

fn fold_int(op: BinaryOp, a: i64, b: i64, ty: &Ty) -> Option<Const> {
    if op.is_comparison() {
        return compare(op, a.cmp(&b)).map(Const::Bool);
    }
    let Ty::Int(bits) = *ty else {
        return None;
    };
    let value = match op {
        BinaryOp::Add => a.checked_add(b)?,
        BinaryOp::Sub => a.checked_sub(b)?,
        BinaryOp::Mul => a.checked_mul(b)?,
        BinaryOp::Div => a.checked_div(b)?,
        BinaryOp::Mod => a.checked_rem(b)?,
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => {
            let shift = u32::try_from(b).ok().filter(|s| *s < bits)?;
            let shifted = a.checked_shl(shift)?;
            if shifted >> shift != a {
                return None;
            }
            shifted
        }
        BinaryOp::Shr => {
            let shift = u32::try_from(b).ok().filter(|s| *s < bits)?;
            a >> shift
        }
        _ => return None,
    };
    fits(value, bits).then_some(Const::Int(value))
}

/// Round to the precision of a float type; `None` unless finite.
fn float_const(x: f64, ty: &Ty) -> Option<Const> {
    #[allow(clippy::cast_possible_truncation)] // rounding to f32 precision
    let x = match ty {
        Ty::Float(32) => f64::from(x as f32),
        Ty::Float(_) => x,
        _ => return None,
    };
    x.is_finite().then(|| Const::float(x))
}

fn fold_float(op: BinaryOp, a: f64, b: f64, ty: &Ty) -> Option<Const> {
    if !a.is_finite() || !b.is_finite() {
        return None;
    }
    if op.is_comparison() {
        return compare(op, a.partial_cmp(&b)?).map(Const::Bool);
    }
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div if b != 0.0 => a / b,
        BinaryOp::Mod if b != 0.0 => a % b,
        _ => return None,
    };
    float_const(value, ty)
}

fn fold_unary(op: UnaryOp, operand: Const, ty: &Ty) -> Option<Const> {
    match (op, operand) {
        (UnaryOp::Neg, Const::Int(n)) => {
            let Ty::Int(bits) = *ty else {
                return None;
            };
            let value = n.checked_neg()?;
            fits(value, bits).then_some(Const::Int(value))
        }
        (UnaryOp::Neg, Const::Float(bits)) => float_const(-f64::from_bits(bits), ty),
        (UnaryOp::Not, Const::Bool(b)) => Some(Const::Bool(!b)),
        (UnaryOp::BitNot, Const::Int(n)) => Some(Const::Int(!n)),
        _ => None,
    }
}

fn fold_cast(operand: Const, ty: &Ty) -> Option<Const> {
    match (operand, ty) {
        (Const::Int(n), Ty::Int(bits)) => fits(n, *bits).then_some(Const::Int(n)),
        (Const::Int(n), Ty::Float(_)) => {
            #[allow(clippy::cast_precision_loss)]
            let x = n as f64;
            float_const(x, ty)
        }
        (Const::Float(bits), Ty::Float(_)) => float_const(f64::from_bits(bits), ty),
        (Const::Float(bits), Ty::Int(width)) => {
            let x = f64::from_bits(bits);
            // Only exact conversions; anything else depends on the target.
            if x.trunc() != x || !(-9.0e18..9.0e18).contains(&x) {
                return None;
            }
            #[allow(clippy::cast_possible_truncation)]
            let n = x as i64;
            fits(n, *width).then_some(Const::Int(n))
        }
        _ => None,
    }
}

// Propagation

fn propagate_copies(func: &mut Function) -> usize {
    let copies: FxHashMap<VarId, VarId> = func
        .blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(|instr| match instr {
            Instr::Let {
                dst,
                value: Value::Var(src),
            } => Some((*dst, *src)),
            _ => None,
        })
        .collect();
    if copies.is_empty() {
        return 0;
    }
    let counts = graph::use_counts(func);
    let rewritten = copies.keys().filter(|dst| counts[dst.index()] > 0).count();
    graph::replace_uses(func, &copies);
    rewritten
}

/// Replace loads of a slot whose current value is known. Knowledge flows
/// into a block only from its single predecessor.
fn forward_stores(func: &mut Function) -> usize {
    let preds = predecessors(func);
    let entry = func.entry;
    let mut exit_state: FxHashMap<BlockId, FxHashMap<SlotId, VarId>> = FxHashMap::default();
    let mut forwarded = 0;

    for id in reverse_postorder(func) {
        let mut known = match preds[id.index()].as_slice() {
            [pred] if id != entry => exit_state.get(pred).cloned().unwrap_or_default(),
            _ => FxHashMap::default(),
        };
        for instr in &mut func.block_mut(id).body {
            match *instr {
                Instr::Store { slot, value } => {
                    known.insert(slot, value);
                }
                Instr::Load { dst, slot } => match known.get(&slot) {
                    Some(&value) => {
                        *instr = Instr::Let {
                            dst,
                            value: Value::Var(value),
                        };
                        forwarded += 1;
                    }
                    None => {
                        known.insert(slot, dst);
                    }
                },
                _ => {
                    if let Some(slot) = instr.writes_slot() {
                        known.remove(&slot);
                    }
                }
            }
        }
        exit_state.insert(id, known);
    }
    forwarded
}

/// A slot stored once in the whole function, in the entry block, with a
/// constant, reads as that constant after the store.
fn propagate_single_stores(func: &mut Function) -> usize {
    let consts = constants(func);
    let mut writes = vec![0u32; func.slots.len()];
    for instr in func.blocks.iter().flat_map(|block| &block.body) {
        if let Some(slot) = instr.writes_slot() {
            writes[slot.index()] += 1;
        }
    }

    let entry = func.entry;
    let mut stored: FxHashMap<SlotId, (usize, Const)> = FxHashMap::default();
    for (pos, instr) in func.block(entry).body.iter().enumerate() {
        if let Instr::Store { slot, value } = instr {
            if let (1, Some(c)) = (writes[slot.index()], consts.get(value)) {
                stored.insert(*slot, (pos, *c));
            }
        }
    }
    if stored.is_empty() {
        return 0;
    }

    let mut replaced = 0;
    for block in &mut func.blocks {
        let in_entry = block.id == entry;
        for (pos, instr) in block.body.iter_mut().enumerate() {
            let Instr::Load { dst, slot } = *instr else {
                continue;
            };
            let Some(&(store_pos, c)) = stored.get(&slot) else {
                continue;
            };
            if in_entry && pos < store_pos {
                continue;
            }
            *instr = Instr::Let {
                dst,
                value: Value::Const(c),
            };
            replaced += 1;
        }
    }
    replaced
}

fn remove_bounds_checks(func: &mut Function) -> usize {
    let consts = constants(func);
    func.blocks
        .iter_mut()
        .map(|block| {
            block.retain(|instr| match instr {
                Instr::BoundsCheck { index, len } => !matches!(
                    consts.get(index),
                    Some(Const::Int(n)) if u64::try_from(*n).is_ok_and(|n| n < *len)
                ),
                _ => true,
            })
        })
        .sum()
}

// Control flow

fn fold_branches(func: &mut Function) -> usize {
    let consts = constants(func);
    let mut folded = 0;
    for block in &mut func.blocks {
        let Terminator::Branch {
            cond,
            then_block,
            else_block,
        } = block.terminator
        else {
            continue;
        };
        let target = match consts.get(&cond) {
            Some(Const::Bool(true)) => then_block,
            Some(Const::Bool(false)) => else_block,
            _ if then_block == else_block => then_block,
            _ => continue,
        };
        block.terminator = Terminator::Jump {
            target,
            args: Vec::new(),
        };
        folded += 1;
    }
    folded
}

/// Drop block parameters that receive the same variable on every edge.
fn substitute_block_params(func: &mut Function) -> usize {
    let mut incoming: Vec<Vec<&[VarId]>> = vec![Vec::new(); func.blocks.len()];
    for block in &func.blocks {
        if let Terminator::Jump { target, args } = &block.terminator {
            incoming[target.index()].push(args);
        }
    }

    let mut replace: FxHashMap<VarId, VarId> = FxHashMap::default();
    let mut dropped: FxHashMap<BlockId, Vec<usize>> = FxHashMap::default();
    for block in &func.blocks {
        let arg_lists = &incoming[block.id.index()];
        if block.id == func.entry || block.params.is_empty() || arg_lists.is_empty() {
            continue;
        }
        let defined_here: FxHashSet<VarId> = block.body.iter().filter_map(Instr::def).collect();
        for (i, &param) in block.params.iter().enumerate() {
            let mut sources = arg_lists.iter().map(|args| args[i]).filter(|a| *a != param);
            let Some(source) = sources.next() else {
                continue;
            };
            if sources.all(|a| a == source)
                && !block.params.contains(&source)
                && !defined_here.contains(&source)
            {
                replace.insert(param, source);
                dropped.entry(block.id).or_default().push(i);
            }
        }
    }
    if replace.is_empty() {
        return 0;
    }

    for block in &mut func.blocks {
        if let Some(indices) = dropped.get(&block.id) {
            block.params = without(&block.params, indices);
        }
        if let Terminator::Jump { target, args } = &mut block.terminator {
            if let Some(indices) = dropped.get(&*target) {
                *args = without(args, indices);
            }
        }
    }
    graph::replace_uses(func, &replace);
    replace.len()
}

fn without(vars: &[VarId], indices: &[usize]) -> Vec<VarId> {
    vars.iter()
        .enumerate()
        .filter(|(i, _)| !indices.contains(i))
        .map(|(_, v)| *v)
        .collect()
}

/// Merge a block into its only predecessor when that predecessor jumps to
/// it unconditionally. Blocks with a loop role stay separate.
fn merge_jump_chains(func: &mut Function) -> usize {
    let roles: FxHashSet<BlockId> = func
        .loops
        .iter()
        .flat_map(|info| [info.preheader, info.header, info.latch, info.exit])
        .collect();
    let mut merged = 0;
    loop {
        let preds = predecessors(func);
        let candidate = func.blocks.iter().find_map(|block| match &block.terminator {
            Terminator::Jump { target, args }
                if args.is_empty()
                    && *target != block.id
                    && *target != func.entry
                    && !roles.contains(target)
                    && preds[target.index()].len() == 1
                    && func.block(*target).params.is_empty() =>
            {
                Some((block.id, *target))
            }
            _ => None,
        });
        let Some((into, from)) = candidate else {
            break;
        };
        let absorbed = std::mem::replace(func.block_mut(from), Block::new(from));
        let block = func.block_mut(into);
        block.body.extend(absorbed.body);
        block.spans.extend(absorbed.spans);
        block.terminator = absorbed.terminator;
        merged += 1;
    }
    merged
}

/// Remove pure instructions whose result is never read.
fn remove_dead_values(func: &mut Function) -> usize {
    let mut removed = 0;
    loop {
        let counts = graph::use_counts(func);
        let dropped: usize = func
            .blocks
            .iter_mut()
            .map(|block| {
                block.retain(|instr| {
                    !(instr.is_pure() && instr.def().is_some_and(|d| counts[d.index()] == 0))
                })
            })
            .sum();
        if dropped == 0 {
            break;
        }
        removed += dropped;
    }
    removed
}

#[cfg(test)]
mod tests;
