use kiln_ir::BinaryOp;
use pretty_assertions::assert_eq;

use super::vectorize;
use crate::ir::{Function, Instr, Ty};
use crate::test_helpers::lower_source;
use crate::verify_function;

/// `c[k] = a[k] <op> b[k]` for every listed index.
fn lanes(elem: &str, len: u32, op: &str, indices: &[u32], between: &str) -> String {
    let zero = if elem == "!frac" { "0.0" } else { "0" };
    let zeros = vec![zero; len as usize].join(" ");
    let stores: Vec<String> = indices
        .iter()
        .map(|k| format!("[set [index c {k}] [{op} [index a {k}] [index b {k}]]]"))
        .collect();
    let (first, rest) = stores.split_at(1);
    format!(
        "[func f ((a !array<{elem},{len}>) (b !array<{elem},{len}>)) -> !int
           [var c [array {zeros}]]
           {}
           {between}
           {}
           0]",
        first.join(" "),
        rest.join(" "),
    )
}

fn vectorized(source: &str, width: u32) -> (Function, usize) {
    let mut lowered = lower_source(source);
    let func = lowered.function_mut("f");
    let groups = vectorize(func, width);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    (func.clone(), groups)
}

fn count(func: &Function, pred: impl Fn(&Instr) -> bool) -> usize {
    func.blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter(|instr| pred(instr))
        .count()
}

#[test]
fn four_adjacent_stores_become_one_vector_operation() {
    let (func, groups) = vectorized(&lanes("!int", 4, "+", &[0, 1, 2, 3], ""), 4);
    assert_eq!(groups, 1);
    assert_eq!(count(&func, |i| matches!(i, Instr::IndexStore { .. })), 0);
    assert_eq!(count(&func, |i| matches!(i, Instr::IndexLoad { .. })), 0);
    assert_eq!(count(&func, |i| matches!(i, Instr::VecLoad { .. })), 2);

    let ops: Vec<_> = func
        .blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(|instr| match instr {
            Instr::VecBinary { dst, op, .. } => Some((*op, func.var_type(*dst).clone())),
            _ => None,
        })
        .collect();
    assert_eq!(ops, vec![(BinaryOp::Add, Ty::Vector(Box::new(Ty::I64), 4))]);
}

#[test]
fn wider_arrays_split_into_several_groups() {
    let (func, groups) = vectorized(&lanes("!frac", 8, "*", &[0, 1, 2, 3, 4, 5, 6, 7], ""), 4);
    assert_eq!(groups, 2);
    let starts: Vec<u64> = func
        .blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(|instr| match instr {
            Instr::VecStore { start, .. } => Some(*start),
            _ => None,
        })
        .collect();
    assert_eq!(starts, vec![0, 4]);
}

#[test]
fn unprovable_groups_are_skipped() {
    let cases = [
        // Misaligned start.
        lanes("!int", 5, "+", &[1, 2, 3, 4], ""),
        // Gap in the indices.
        lanes("!int", 8, "+", &[0, 1, 2, 4], ""),
        // Division may trap.
        lanes("!int", 4, "/", &[0, 1, 2, 3], ""),
        // Lanes past the end of the array.
        lanes("!int", 2, "+", &[0, 1], ""),
        // The destination is read between the stores.
        lanes("!int", 4, "+", &[0, 1, 2, 3], "[var peek [index c 0]]"),
    ];
    for source in &cases {
        let (_, groups) = vectorized(source, 4);
        assert_eq!(groups, 0, "{source}");
    }
}

#[test]
fn mixed_operations_are_skipped() {
    let source = "[func f ((a !array<!int,4>) (b !array<!int,4>)) -> !int
           [var c [array 0 0 0 0]]
           [set [index c 0] [+ [index a 0] [index b 0]]]
           [set [index c 1] [- [index a 1] [index b 1]]]
           [set [index c 2] [+ [index a 2] [index b 2]]]
           [set [index c 3] [+ [index a 3] [index b 3]]]
           0]";
    let (_, groups) = vectorized(source, 4);
    assert_eq!(groups, 0);
}

#[test]
fn narrower_widths_still_apply() {
    let (func, groups) = vectorized(&lanes("!int", 4, "&", &[0, 1, 2, 3], ""), 2);
    assert_eq!(groups, 2);
    assert_eq!(count(&func, |i| matches!(i, Instr::VecStore { .. })), 2);
    assert_eq!(vectorized(&lanes("!int", 4, "+", &[0, 1, 2, 3], ""), 1).1, 0);
}
