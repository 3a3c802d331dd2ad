//! Shared CFG utilities.
//!
//! Passes depend on this module and never on each other.

use rustc_hash::FxHashMap;

use crate::ir::{BlockId, Function, VarId};

/// Distinct predecessors of every block, indexed by block index.
pub fn predecessors(func: &Function) -> Vec<Vec<BlockId>> {
    let mut preds: Vec<Vec<BlockId>> = vec![Vec::new(); func.blocks.len()];
    for block in &func.blocks {
        for succ in block.terminator.successors() {
            let list = &mut preds[succ.index()];
            if !list.contains(&block.id) {
                list.push(block.id);
            }
        }
    }
    preds
}

/// Postorder over blocks reachable from the entry. Iterative, so deep
/// CFGs do not recurse.
pub fn postorder(func: &Function) -> Vec<BlockId> {
    let mut visited = vec![false; func.blocks.len()];
    let mut order = Vec::with_capacity(func.blocks.len());
    let mut stack: Vec<(BlockId, bool)> = vec![(func.entry, false)];

    while let Some((block, expanded)) = stack.pop() {
        if expanded {
            order.push(block);
            continue;
        }
        if visited[block.index()] {
            continue;
        }
        visited[block.index()] = true;
        stack.push((block, true));
        let succs = func.block(block).terminator.successors();
        for succ in succs.into_iter().rev() {
            if !visited[succ.index()] {
                stack.push((succ, false));
            }
        }
    }
    order
}

pub fn reverse_postorder(func: &Function) -> Vec<BlockId> {
    let mut order = postorder(func);
    order.reverse();
    order
}

pub fn reachable(func: &Function) -> Vec<bool> {
    let mut seen = vec![false; func.blocks.len()];
    for block in postorder(func) {
        seen[block.index()] = true;
    }
    seen
}

/// Drop the blocks whose `keep` entry is false and renumber the rest in
/// order. Loops losing a structural block are dropped; surviving loops
/// forget removed body blocks. Returns the number of removed blocks.
///
/// Callers guarantee no kept block jumps to a removed one.
pub fn compact_blocks(func: &mut Function, keep: &[bool]) -> usize {
    let mut remap: FxHashMap<BlockId, BlockId> = FxHashMap::default();
    let mut next = 0u32;
    for (i, &kept) in keep.iter().enumerate() {
        if kept {
            remap.insert(func.blocks[i].id, BlockId::new(next));
            next += 1;
        }
    }
    let removed = func.blocks.len() - remap.len();
    if removed == 0 {
        return 0;
    }

    let blocks = std::mem::take(&mut func.blocks);
    func.blocks = blocks
        .into_iter()
        .zip(keep)
        .filter(|(_, kept)| **kept)
        .map(|(mut block, _)| {
            block.id = remap[&block.id];
            block
                .terminator
                .map_targets(|target| remap.get(&target).copied().unwrap_or(target));
            block
        })
        .collect();
    func.entry = remap.get(&func.entry).copied().unwrap_or(BlockId::new(0));

    let loops = std::mem::take(&mut func.loops);
    func.loops = loops
        .into_iter()
        .filter_map(|mut info| {
            info.preheader = *remap.get(&info.preheader)?;
            info.header = *remap.get(&info.header)?;
            info.latch = *remap.get(&info.latch)?;
            info.exit = *remap.get(&info.exit)?;
            info.blocks = info
                .blocks
                .iter()
                .filter_map(|b| remap.get(b).copied())
                .collect();
            Some(info)
        })
        .collect();
    removed
}

/// Remove blocks unreachable from the entry.
pub fn remove_unreachable(func: &mut Function) -> usize {
    let keep = reachable(func);
    compact_blocks(func, &keep)
}

/// How many times each variable is read, indexed by `VarId::index()`.
pub fn use_counts(func: &Function) -> Vec<u32> {
    let mut counts = vec![0u32; func.var_types.len()];
    for block in &func.blocks {
        for instr in &block.body {
            for var in instr.uses() {
                counts[var.index()] += 1;
            }
        }
        for var in block.terminator.uses() {
            counts[var.index()] += 1;
        }
    }
    counts
}

/// Replace every read of a variable through `map`.
pub fn replace_uses(func: &mut Function, map: &FxHashMap<VarId, VarId>) {
    if map.is_empty() {
        return;
    }
    let resolve = |mut var: VarId| {
        // Chains appear when one replacement feeds another.
        while let Some(&next) = map.get(&var) {
            if next == var {
                break;
            }
            var = next;
        }
        var
    };
    for block in &mut func.blocks {
        for instr in &mut block.body {
            instr.map_uses(resolve);
        }
        block.terminator.map_uses(resolve);
    }
}

/// Immediate dominators, computed with the Cooper-Harvey-Kennedy
/// iterative algorithm over reverse postorder.
pub struct DominatorTree {
    /// `idom[entry] == Some(entry)`; `None` for unreachable blocks.
    idom: Vec<Option<usize>>,
}

impl DominatorTree {
    pub fn build(func: &Function) -> Self {
        let n = func.blocks.len();
        let preds = predecessors(func);
        let rpo = reverse_postorder(func);
        let mut rpo_pos = vec![usize::MAX; n];
        for (pos, block) in rpo.iter().enumerate() {
            rpo_pos[block.index()] = pos;
        }

        let mut idom: Vec<Option<usize>> = vec![None; n];
        idom[func.entry.index()] = Some(func.entry.index());

        let mut changed = true;
        while changed {
            changed = false;
            for block in rpo.iter().skip(1) {
                let mut processed = preds[block.index()]
                    .iter()
                    .map(|p| p.index())
                    .filter(|p| idom[*p].is_some());
                let Some(first) = processed.next() else {
                    continue;
                };
                let new_idom =
                    processed.fold(first, |acc, pred| Self::intersect(pred, acc, &idom, &rpo_pos));
                if idom[block.index()] != Some(new_idom) {
                    idom[block.index()] = Some(new_idom);
                    changed = true;
                }
            }
        }
        DominatorTree { idom }
    }

    fn intersect(mut a: usize, mut b: usize, idom: &[Option<usize>], rpo_pos: &[usize]) -> usize {
        while a != b {
            while rpo_pos[a] > rpo_pos[b] {
                a = idom[a].unwrap_or(b);
            }
            while rpo_pos[b] > rpo_pos[a] {
                b = idom[b].unwrap_or(a);
            }
        }
        a
    }

    pub fn is_reachable(&self, block: BlockId) -> bool {
        self.idom[block.index()].is_some()
    }

    /// Whether `a` dominates `b`. A block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut current = b.index();
        loop {
            if current == a.index() {
                return true;
            }
            match self.idom[current] {
                Some(dom) if dom != current => current = dom,
                _ => return false,
            }
        }
    }
}
