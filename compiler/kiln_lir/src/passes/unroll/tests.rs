use kiln_ir::BinaryOp;
use pretty_assertions::assert_eq;

use super::unroll_loops;
use crate::ir::{BlockId, Const, Function, Instr, Terminator, Value};
use crate::passes::{const_fold::fold_constants, constants};
use crate::test_helpers::lower_source;
use crate::verify_function;

fn sum_below(bound: u32) -> String {
    format!(
        "[func f () -> !int
           [var acc 0]
           [for [var i 0] [< i {bound}] [set i [+ i 1]] [set acc [+ acc i]]]
           acc]"
    )
}

fn unrolled(source: &str, factor: u32) -> (Function, usize) {
    let mut lowered = lower_source(source);
    let func = lowered.function_mut("f");
    let changed = unroll_loops(func, factor);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    (func.clone(), changed)
}

fn adds_in(func: &Function, block: BlockId) -> usize {
    func.block(block)
        .body
        .iter()
        .filter(|instr| {
            matches!(
                instr,
                Instr::Let {
                    value: Value::Binary { op: BinaryOp::Add, .. },
                    ..
                }
            )
        })
        .count()
}

#[test]
fn short_loops_are_replaced() {
    let (mut func, changed) = unrolled(&sum_below(4), 4);
    assert_eq!(changed, 1);
    assert!(func.loops.is_empty());
    assert!(func
        .blocks
        .iter()
        .all(|block| !matches!(block.terminator, Terminator::Branch { .. })));

    // Straight-line code folds all the way down: 0 + 1 + 2 + 3.
    fold_constants(&mut func);
    let result = func.blocks.iter().find_map(|block| match block.terminator {
        Terminator::Return(Some(v)) => constants(&func).get(&v).copied(),
        _ => None,
    });
    assert_eq!(result, Some(Const::Int(6)));
}

#[test]
fn divisible_trip_counts_unroll_in_place() {
    let (func, changed) = unrolled(&sum_below(8), 4);
    assert_eq!(changed, 1);
    let [info] = func.loops.as_slice() else {
        panic!("expected one loop");
    };
    let induction = info.induction.unwrap_or_else(|| panic!("induction lost"));
    assert_eq!((induction.init, induction.step), (0, 4));
    assert_eq!(induction.trip_count(), Some(2));

    // Four copies of the accumulation and the step; the latch is empty.
    let Terminator::Branch { then_block, .. } = func.block(info.header).terminator else {
        panic!("header lost its branch");
    };
    assert_eq!(adds_in(&func, then_block), 8);
    assert!(func.block(info.latch).body.is_empty());
}

#[test]
fn remainders_are_peeled() {
    let (func, _) = unrolled(&sum_below(6), 4);
    let info = &func.loops[0];
    let induction = info.induction.unwrap_or_else(|| panic!("induction lost"));
    assert_eq!((induction.init, induction.step), (2, 4));
    assert_eq!(induction.trip_count(), Some(1));
    assert_eq!(adds_in(&func, info.preheader), 4);
}

#[test]
fn irregular_loops_are_skipped() {
    let unknown_bound = "[func f ((n !int)) -> !int
           [var acc 0]
           [for [var i 0] [< i n] [set i [+ i 1]] [set acc [+ acc i]]]
           acc]";
    let early_exit = "[func f () -> !int
           [var acc 0]
           [for [var i 0] [< i 8] [set i [+ i 1]]
             [if [> acc 10] [break]]
             [set acc [+ acc i]]]
           acc]";
    for source in [unknown_bound, early_exit] {
        let mut lowered = lower_source(source);
        let func = lowered.function_mut("f");
        let before = func.clone();
        assert_eq!(unroll_loops(func, 4), 0, "{source}");
        assert_eq!(*func, before);
    }
}

#[test]
fn factor_one_does_nothing() {
    let (_, changed) = unrolled(&sum_below(4), 1);
    assert_eq!(changed, 0);
}
