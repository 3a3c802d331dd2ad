use kiln_ir::StringInterner;
use pretty_assertions::assert_eq;

use super::*;
use crate::ir::ExternSymbol;
use crate::read_function;

fn read(text: &str, interner: &StringInterner) -> Function {
    read_function(text, interner).unwrap_or_else(|e| panic!("{e}\n{text}"))
}

fn error(text: &str) -> String {
    let interner = StringInterner::new();
    match verify_function(&read(text, &interner)) {
        Ok(()) => panic!("expected a verifier error for\n{text}"),
        Err(e) => e.to_string(),
    }
}

const MAX: &str = "\
func @max -> i64 {
bb0(%0: i64, %1: i64):
  %2: bool = gt %0, %1
  branch %2, bb1, bb2
bb1:
  jump bb3(%0)
bb2:
  jump bb3(%1)
bb3(%3: i64):
  ret %3
}
";

#[test]
fn well_formed_function_passes() {
    let interner = StringInterner::new();
    assert_eq!(verify_function(&read(MAX, &interner)), Ok(()));
}

#[test]
fn jump_arguments_must_match_parameters() {
    let text = MAX.replace("jump bb3(%1)", "jump bb3");
    assert_eq!(error(&text), "bb2: bb3 takes 1 arguments, 0 passed");

    let text = MAX.replace("jump bb3(%1)", "jump bb3(%2)");
    assert_eq!(error(&text), "bb2: %2: bool and %3: i64 differ");
}

#[test]
fn branch_condition_is_bool() {
    let text = MAX.replace("branch %2,", "branch %0,");
    assert_eq!(error(&text), "bb0: %0 has type i64, expected bool");
}

#[test]
fn branch_targets_take_no_parameters() {
    let text = MAX.replace("branch %2, bb1, bb2", "branch %2, bb1, bb3");
    assert!(error(&text).contains("branch target bb3 takes parameters"));
}

#[test]
fn uses_must_be_dominated() {
    let text = MAX.replace("jump bb3(%0)", "%4: i64 = const 1\n  jump bb3(%0)")
        .replace("jump bb3(%1)", "jump bb3(%4)");
    assert_eq!(error(&text), "bb2: use of %4 is not dominated by its definition");

    let text = "\
func @f -> i64 {
bb0:
  %0: i64 = add %1, %1
  %1: i64 = const 1
  ret %0
}
";
    assert_eq!(error(text), "bb0: use of %1 is not dominated by its definition");
}

#[test]
fn return_type_is_checked() {
    let text = MAX.replace("func @max -> i64", "func @max -> bool");
    assert_eq!(error(&text), "bb3: %3 has type i64, expected bool");
}

#[test]
fn operand_types_are_checked() {
    let text = "\
func @f -> none {
  slot $0 a: [f64; 4]
bb0:
  %0: f64 = const 1.0
  %1: i64 = const 2
  %2: f64 = add %0, %1
  ret
}
";
    assert_eq!(error(text), "bb0: %0: f64 and %1: i64 differ");

    let text = "\
func @f -> none {
  slot $0 a: [f64; 4]
bb0:
  %0: <4 x f64> = vload $0[2]
  ret
}
";
    assert_eq!(error(text), "bb0: lanes 2..6 exceed $0 of length 4");

    let text = "\
func @f -> none {
  slot $0 a: [f64; 4]
bb0:
  %0: i64 = const 0
  %1: i64 = index $0[%0]
  ret
}
";
    assert_eq!(error(text), "bb0: %1 has type i64, expected f64");
}

#[test]
fn spans_must_align() {
    let interner = StringInterner::new();
    let mut func = read(MAX, &interner);
    func.blocks[0].spans.clear();
    let err = verify_function(&func).err().map(|e| e.message);
    assert_eq!(err, Some("bb0 has 0 spans for 1 instructions".to_owned()));
}

#[test]
fn program_calls_are_resolved() {
    let interner = StringInterner::new();
    let caller = "\
func @main -> f64 {
bb0:
  %0: i64 = const 1
  %1: i64 = const 2
  %2: i64 = call @max(%0, %1)
  %3: f64 = cast %2
  %4: f64 = call @sqrt(%3) c \"libm\"
  ret %4
}
";
    let mut program = Program {
        functions: vec![read(MAX, &interner), read(caller, &interner)],
        ..Program::default()
    };
    assert_eq!(
        verify_program(&program).err().map(|e| e.message),
        Some("call to an unknown function".to_owned())
    );

    program.externs.push(ExternSymbol {
        name: interner.intern("sqrt"),
        library: Some(interner.intern("libm")),
        params: vec![Ty::F64],
        ret: Ty::F64,
    });
    assert_eq!(verify_program(&program), Ok(()));

    program.functions[1] = read(
        &caller.replace("call @max(%0, %1)", "call @max(%0)"),
        &interner,
    );
    assert_eq!(
        verify_program(&program).err().map(|e| e.message),
        Some("1 arguments for 2 parameters".to_owned())
    );
}
