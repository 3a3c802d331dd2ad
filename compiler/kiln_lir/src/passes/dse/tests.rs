use kiln_ir::StringInterner;
use pretty_assertions::assert_eq;

use super::eliminate_dead_stores;
use crate::ir::Instr;
use crate::test_helpers::{lower_source, read};
use crate::verify_function;

#[test]
fn overwritten_stores_go() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 {
  slot $0: i64
bb0(%0: i64):
  store $0, %0
  %1: i64 = const 2
  store $0, %1
  %2: i64 = load $0
  store $0, %2
  %3: i64 = load $0
  ret %3
}",
        &interner,
    );
    assert_eq!(eliminate_dead_stores(&mut func), 1);
    let stores: Vec<_> = func.blocks[0]
        .body
        .iter()
        .filter_map(|instr| match instr {
            Instr::Store { value, .. } => Some(value.raw()),
            _ => None,
        })
        .collect();
    assert_eq!(stores, vec![1, 2]);
}

#[test]
fn element_stores_keep_earlier_stores_alive() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 {
  slot $0: [i64; 2]
bb0(%0: [i64; 2], %1: [i64; 2]):
  store $0, %0
  %2: i64 = const 0
  %3: i64 = const 7
  store $0[%2], %3
  store $0, %1
  %4: i64 = index $0[%2]
  ret %4
}",
        &interner,
    );
    assert_eq!(eliminate_dead_stores(&mut func), 0);
}

#[test]
fn stores_to_unread_slots_go() {
    let mut lowered = lower_source(
        "[func f ((unused !int) (n !int)) -> !int
           [var scratch [array 0 0]]
           [set [index scratch 1] n]
           n]",
    );
    let func = lowered.function_mut("f");
    // The `unused` parameter spill, `scratch`'s initialiser and the element
    // store.
    assert_eq!(eliminate_dead_stores(func), 3);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    assert_eq!(eliminate_dead_stores(func), 0);
}

#[test]
fn stores_in_other_blocks_survive() {
    let lowered = lower_source(
        "[func f ((c !bool)) -> !int
           [var x 1]
           [if c [set x 2] [set x 3]]
           x]",
    );
    let mut func = lowered.function("f").clone();
    let before = func.clone();
    assert_eq!(eliminate_dead_stores(&mut func), 0);
    assert_eq!(func, before);
}
