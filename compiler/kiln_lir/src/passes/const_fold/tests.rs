use kiln_ir::StringInterner;
use pretty_assertions::assert_eq;

use super::*;
use crate::test_helpers::{lower_source, read, strip_spans};
use crate::verify_function;

/// Constant returned by the function, if it returns one.
fn returned_const(func: &Function) -> Option<Const> {
    let consts = constants(func);
    func.blocks.iter().find_map(|block| match block.terminator {
        Terminator::Return(Some(v)) => consts.get(&v).copied(),
        _ => None,
    })
}

fn count(func: &Function, pred: impl Fn(&Instr) -> bool) -> usize {
    func.blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter(|instr| pred(instr))
        .count()
}

fn folded(source: &str, name: &str) -> Function {
    let mut lowered = lower_source(source);
    let func = lowered.function_mut(name);
    fold_constants(func);
    if let Err(e) = verify_function(func) {
        panic!("{e}");
    }
    func.clone()
}

#[test]
fn nested_arithmetic_folds() {
    let func = folded("[func f () -> !int [+ 5 (* 3 2)]]", "f");
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(func.instr_count(), 1);
    assert_eq!(returned_const(&func), Some(Const::Int(11)));
}

#[test]
fn constant_check_selects_a_branch() {
    let func = folded("[func f () -> !int [check (== 0 0) 1 -1]]", "f");
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(returned_const(&func), Some(Const::Int(1)));
}

#[test]
fn parameters_flow_through_their_slots() {
    let lowered = lower_source("[func add ((a !int) (b !int)) -> !int [+ a b]]");
    let interner = &lowered.interner;
    let mut func = lowered.function("add").clone();
    fold_constants(&mut func);
    assert_eq!(
        strip_spans(&func.display(interner).to_string()),
        "\
func @add -> i64 {
  slot $0 a: i64
  slot $1 b: i64
  dead %2: i64
  dead %3: i64
bb0(%0: i64, %1: i64):
  store $0, %0
  store $1, %1
  %4: i64 = add %0, %1
  ret %4
}"
    );
}

#[test]
fn division_by_zero_is_left_alone() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 {
bb0:
  %0: i64 = const 1
  %1: i64 = const 0
  %2: i64 = div %0, %1
  %3: i64 = mod %0, %1
  %4: i64 = add %2, %3
  ret %4
}",
        &interner,
    );
    let before = func.clone();
    assert_eq!(fold_constants(&mut func), 0);
    assert_eq!(func, before);
}

#[test]
fn overflow_is_left_alone() {
    let interner = StringInterner::new();
    let source = |rhs: i64| {
        format!(
            "\
func @f -> i8 {{
bb0:
  %0: i8 = const 100
  %1: i8 = const {rhs}
  %2: i8 = add %0, %1
  ret %2
}}"
        )
    };

    let mut func = read(&source(100), &interner);
    assert_eq!(fold_constants(&mut func), 0);

    let mut func = read(&source(27), &interner);
    assert!(fold_constants(&mut func) > 0);
    assert_eq!(returned_const(&func), Some(Const::Int(127)));
}

#[test]
fn narrow_floats_round() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> f32 {
bb0:
  %0: f32 = const 0.1
  %1: f32 = const 0.2
  %2: f32 = add %0, %1
  ret %2
}",
        &interner,
    );
    fold_constants(&mut func);
    #[allow(clippy::cast_possible_truncation)]
    let expected = f64::from((0.1f64 + 0.2f64) as f32);
    assert_eq!(returned_const(&func), Some(Const::float(expected)));
}

#[test]
fn operand_helpers() {
    assert_eq!(
        fold_binary(BinaryOp::Lt, Const::Int(2), Const::Int(3), &Ty::Bool),
        Some(Const::Bool(true))
    );
    assert_eq!(
        fold_binary(BinaryOp::Shl, Const::Int(1), Const::Int(7), &Ty::Int(8)),
        None
    );
    assert_eq!(
        fold_binary(BinaryOp::Shr, Const::Int(-8), Const::Int(1), &Ty::I64),
        Some(Const::Int(-4))
    );
    assert_eq!(
        fold_binary(BinaryOp::Div, Const::Int(i64::MIN), Const::Int(-1), &Ty::I64),
        None
    );
    assert_eq!(
        fold_binary(BinaryOp::Div, Const::float(1.0), Const::float(0.0), &Ty::F64),
        None
    );
    assert_eq!(fold_cast(Const::float(2.5), &Ty::I64), None);
    assert_eq!(fold_cast(Const::float(-3.0), &Ty::Int(8)), Some(Const::Int(-3)));
    assert_eq!(fold_cast(Const::Int(300), &Ty::Int(8)), None);
    assert!(fits(-128, 8) && !fits(128, 8) && fits(i64::MIN, 64));
}

#[test]
fn single_store_slots_become_constants() {
    let func = folded(
        "[func f ((c !bool)) -> !int [const k 7] [if c [+ k 1] k]]",
        "f",
    );
    assert_eq!(count(&func, |i| matches!(i, Instr::Load { .. })), 0);
    let consts: Vec<_> = constants(&func).into_values().collect();
    assert!(consts.contains(&Const::Int(8)));
    assert!(consts.contains(&Const::Int(7)));
}

#[test]
fn in_range_bounds_checks_disappear() {
    let func = folded(
        "[func f () -> !int [var xs [array 1 2 3]] [var i 1] [index xs i]]",
        "f",
    );
    assert_eq!(count(&func, |i| matches!(i, Instr::BoundsCheck { .. })), 0);

    let func = folded(
        "[func f () -> !int [var xs [array 1 2 3]] [var i 5] [index xs i]]",
        "f",
    );
    assert_eq!(
        count(&func, |i| matches!(i, Instr::BoundsCheck { len: 3, .. })),
        1
    );
}

#[test]
fn dead_loops_disappear() {
    let func = folded(
        "[func f () -> !int [var x 1] [while false [set x 2]] x]",
        "f",
    );
    assert!(func.loops.is_empty());
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(returned_const(&func), Some(Const::Int(1)));
}

#[test]
fn loop_blocks_keep_their_roles() {
    let func = folded(
        "[func sum ((n !int)) -> !int
           [var acc 0]
           [for [var i 0] [< i n] [set i [+ i 1]] [set acc [+ acc i]]]
           acc]",
        "sum",
    );
    let [info] = func.loops.as_slice() else {
        panic!("expected one loop");
    };
    assert_eq!(
        func.block(info.preheader).terminator,
        Terminator::Jump {
            target: info.header,
            args: vec![]
        }
    );
    assert!(matches!(
        func.block(info.latch).terminator,
        Terminator::Jump { target, .. } if target == info.header
    ));
}

#[test]
fn folding_is_idempotent() {
    let sources = [
        ("[func f ((n !int)) -> !int [var a 3] [var b [* a 4]] [if [> n b] [- n b] [+ n b]]]", "f"),
        (
            "[func g () -> !int
               [var acc 0]
               [for [var i 0] [< i 4] [set i [+ i 1]] [set acc [+ acc [* i i]]]]
               acc]",
            "g",
        ),
        ("[func h ((x !frac)) -> !frac [* x [+ 1.5 2.5]]]", "h"),
    ];
    for (source, name) in sources {
        let mut func = folded(source, name);
        let once = func.clone();
        assert_eq!(fold_constants(&mut func), 0, "{source}");
        assert_eq!(func, once);
    }
}

#[test]
fn join_parameters_fed_one_value_are_substituted() {
    let interner = StringInterner::new();
    let mut func = read(
        "\
func @f -> i64 {
bb0(%0: bool, %1: i64):
  branch %0, bb1, bb2
bb1:
  jump bb3(%1)
bb2:
  jump bb3(%1)
bb3(%2: i64):
  ret %2
}",
        &interner,
    );
    fold_constants(&mut func);
    assert!(func.blocks.iter().all(|block| block.id == func.entry || block.params.is_empty()));
    assert!(matches!(
        func.blocks.last().map(|b| &b.terminator),
        Some(Terminator::Return(Some(v))) if v.raw() == 1
    ));
}
