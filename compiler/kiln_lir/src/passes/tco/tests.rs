use kiln_ir::StringInterner;
use pretty_assertions::assert_eq;

use super::eliminate_tail_calls;
use crate::ir::{Function, Instr, Terminator};
use crate::test_helpers::{lower_source, read};
use crate::verify_function;

const FAST_EXP: &str = "[func fast_exp ((b !int) (e !int) (acc !int)) -> !int
   [check (== e 0) acc
     [check (== (e % 2) 0)
       [fast_exp (b * b) (e / 2) acc]
       [fast_exp (b * b) (e / 2) (acc * b)]]]]";

fn calls(func: &Function) -> usize {
    func.blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter(|instr| matches!(instr, Instr::Call { .. }))
        .count()
}

fn back_edges(func: &Function) -> usize {
    func.blocks
        .iter()
        .filter(|block| {
            matches!(&block.terminator, Terminator::Jump { target, .. } if *target == func.entry)
        })
        .count()
}

#[test]
fn self_tail_calls_become_back_edges() {
    let mut lowered = lower_source(FAST_EXP);
    let func = lowered.function_mut("fast_exp");
    assert_eq!(eliminate_tail_calls(func), 2);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    assert_eq!(calls(func), 0);
    assert_eq!(back_edges(func), 2);
    let arity = func.params.len();
    assert!(func.blocks.iter().all(|block| match &block.terminator {
        Terminator::Jump { target, args } if *target == func.entry => args.len() == arity,
        _ => true,
    }));
}

#[test]
fn calls_whose_result_is_used_stay() {
    let mut lowered = lower_source(
        "[func count ((n !int)) -> !int [check (== n 0) 0 [+ 1 [count (n - 1)]]]]",
    );
    let func = lowered.function_mut("count");
    assert_eq!(eliminate_tail_calls(func), 0);
    assert_eq!(calls(func), 1);
}

#[test]
fn work_after_the_join_blocks_the_rewrite() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 flags=tail_recursive {
bb0(%0: i64):
  %1: i64 = tail call @f(%0)
  jump bb1(%1)
bb1(%2: i64):
  %3: i64 = const 1
  %4: i64 = add %2, %3
  ret %4
}",
        &interner,
    );
    let before = func.clone();
    assert_eq!(eliminate_tail_calls(&mut func), 0);
    assert_eq!(func, before);
}

#[test]
fn calls_to_other_functions_stay() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 {
bb0(%0: i64):
  %1: i64 = tail call @g(%0)
  ret %1
}",
        &interner,
    );
    assert_eq!(eliminate_tail_calls(&mut func), 0);
}
