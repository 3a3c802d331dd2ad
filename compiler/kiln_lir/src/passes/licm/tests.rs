use kiln_ir::BinaryOp;
use pretty_assertions::assert_eq;

use super::hoist_invariants;
use crate::ir::{BlockId, Function, Instr, Value};
use crate::test_helpers::lower_source;
use crate::verify_function;

fn binary_in(func: &Function, block: BlockId, op: BinaryOp) -> bool {
    func.block(block).body.iter().any(|instr| {
        matches!(instr, Instr::Let { value: Value::Binary { op: found, .. }, .. } if *found == op)
    })
}

fn loop_has_binary(func: &Function, index: usize, op: BinaryOp) -> bool {
    func.loops[index]
        .blocks
        .iter()
        .any(|block| binary_in(func, *block, op))
}

fn hoisted(source: &str, name: &str) -> (Function, usize) {
    let mut lowered = lower_source(source);
    let func = lowered.function_mut(name);
    let moved = hoist_invariants(func);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    (func.clone(), moved)
}

#[test]
fn invariant_arithmetic_moves_to_the_preheader() {
    let (func, moved) = hoisted(
        "[func f ((n !int) (k !int)) -> !int
           [var acc 0]
           [for [var i 0] [< i n] [set i [+ i 1]] [set acc [+ acc [* k 3]]]]
           acc]",
        "f",
    );
    // load n, load k, const 3, mul
    assert!(moved >= 4);
    let info = &func.loops[0];
    assert!(binary_in(&func, info.preheader, BinaryOp::Mul));
    assert!(!loop_has_binary(&func, 0, BinaryOp::Mul));
    // The accumulation and the step depend on the iteration.
    assert!(loop_has_binary(&func, 0, BinaryOp::Add));
    assert!(loop_has_binary(&func, 0, BinaryOp::Lt));
}

#[test]
fn trapping_operations_stay() {
    let (func, _) = hoisted(
        "[func f ((n !int) (k !int)) -> !int
           [var acc 0]
           [for [var i 0] [< i n] [set i [+ i 1]] [set acc [+ acc [/ k 3]]]]
           acc]",
        "f",
    );
    assert!(loop_has_binary(&func, 0, BinaryOp::Div));
}

#[test]
fn loads_of_written_slots_stay() {
    let mut lowered = lower_source(
        "[func f ((n !int)) -> !int
           [var x 1]
           [while [< x n] [set x [* x 2]]]
           x]",
    );
    let n = lowered.interner.intern("n");
    let func = lowered.function_mut("f");
    hoist_invariants(func);

    let info = &func.loops[0];
    let loaded: Vec<_> = info
        .blocks
        .iter()
        .flat_map(|block| &func.block(*block).body)
        .filter_map(|instr| match instr {
            Instr::Load { slot, .. } => func.slots[slot.index()].name,
            _ => None,
        })
        .collect();
    assert_eq!(loaded.len(), 2);
    assert!(!loaded.contains(&n));
    assert!(func
        .block(info.preheader)
        .body
        .iter()
        .any(|instr| matches!(instr, Instr::Load { slot, .. } if func.slots[slot.index()].name == Some(n))));
}

#[test]
fn nested_invariants_leave_both_loops() {
    let (func, _) = hoisted(
        "[func f ((k !int)) -> !int
           [var acc 0]
           [for [var i 0] [< i 3] [set i [+ i 1]]
             [for [var j 0] [< j 3] [set j [+ j 1]] [set acc [+ acc [* k 5]]]]]
           acc]",
        "f",
    );
    let [inner, outer] = func.loops.as_slice() else {
        panic!("expected two loops");
    };
    assert!(binary_in(&func, outer.preheader, BinaryOp::Mul));
    assert!(!binary_in(&func, inner.preheader, BinaryOp::Mul));
    assert!(!loop_has_binary(&func, 1, BinaryOp::Mul));
}

#[test]
fn nothing_to_hoist_without_loops() {
    let mut lowered = lower_source("[func f ((a !int)) -> !int [* a 2]]");
    assert_eq!(hoist_invariants(lowered.function_mut("f")), 0);
}
