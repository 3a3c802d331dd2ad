use kiln_ir::{BinaryOp, Span, StringInterner, UnaryOp};
use pretty_assertions::assert_eq;

use super::*;
use crate::ir::{Block, FunctionFlags};

fn round_trip(func: &Function, interner: &StringInterner) {
    let text = func.display(interner).to_string();
    let read = read_function(&text, interner).unwrap_or_else(|e| panic!("{e}\n{text}"));
    assert_eq!(&read, func, "\n{text}");
}

/// A function touching every instruction form.
fn kitchen_sink(interner: &StringInterner) -> Function {
    let mut func = Function::new(interner.intern("sink"), Ty::Tuple(vec![Ty::I64, Ty::Bool]));
    func.flags = FunctionFlags::TAIL_RECURSIVE | FunctionFlags::GENERIC_INSTANCE;
    let n = func.fresh_var(Ty::I64);
    let pair = func.fresh_var(Ty::Tuple(vec![Ty::F64, Ty::Array(Box::new(Ty::Int(8)), 2)]));
    func.params = vec![n, pair];
    func.blocks[0].params = vec![n, pair];

    let x = func.new_slot(Some(interner.intern("x")), Ty::I64);
    let arr = func.new_slot(None, Ty::Array(Box::new(Ty::F64), 4));
    let body = func.new_block();
    let exit = func.new_block();

    let c = func.fresh_var(Ty::Float(32));
    let s = func.fresh_var(Ty::Str);
    let sum = func.fresh_var(Ty::I64);
    let neg = func.fresh_var(Ty::I64);
    let cast = func.fresh_var(Ty::F64);
    let loaded = func.fresh_var(Ty::F64);
    let vec = func.fresh_var(Ty::Vector(Box::new(Ty::F64), 4));
    let vsum = func.fresh_var(Ty::Vector(Box::new(Ty::F64), 4));
    let ptr = func.fresh_var(Ty::Ptr);
    let flag = func.fresh_var(Ty::Bool);
    let tuple = func.fresh_var(Ty::Tuple(vec![Ty::I64, Ty::Bool]));
    let first = func.fresh_var(Ty::F64);
    let g = func.fresh_var(Ty::I64);
    let items = func.fresh_var(Ty::Array(Box::new(Ty::I64), 2));
    let called = func.fresh_var(Ty::F64);
    let joined = func.fresh_var(Ty::I64);
    // Never defined: printed as a dead variable.
    func.fresh_var(Ty::Fn(vec![Ty::I64], Box::new(Ty::None)));

    let entry = &mut func.blocks[0];
    entry.push(
        Instr::Let {
            dst: c,
            value: Value::Const(Const::float(0.1)),
        },
        Some(Span::new(4, 7)),
    );
    entry.push(
        Instr::Let {
            dst: s,
            value: Value::Const(Const::Str(interner.intern("a \"q\" = @1..2\n"))),
        },
        None,
    );
    entry.push(
        Instr::Let {
            dst: sum,
            value: Value::Binary {
                op: BinaryOp::Add,
                lhs: n,
                rhs: n,
            },
        },
        Some(Span::new(10, 20)),
    );
    entry.push(
        Instr::Let {
            dst: neg,
            value: Value::Unary {
                op: UnaryOp::Neg,
                operand: sum,
            },
        },
        None,
    );
    entry.push(Instr::Store { slot: x, value: neg }, None);
    entry.push(Instr::Let { dst: cast, value: Value::Cast(neg) }, None);
    entry.push(Instr::BoundsCheck { index: n, len: 4 }, None);
    entry.push(
        Instr::IndexLoad {
            dst: loaded,
            slot: arr,
            index: n,
        },
        None,
    );
    entry.push(
        Instr::IndexStore {
            slot: arr,
            index: n,
            value: cast,
        },
        None,
    );
    entry.push(Instr::VecLoad { dst: vec, slot: arr, start: 0 }, None);
    entry.push(
        Instr::VecBinary {
            dst: vsum,
            op: BinaryOp::Mul,
            lhs: vec,
            rhs: vec,
        },
        None,
    );
    entry.push(Instr::VecStore { slot: arr, start: 0, value: vsum }, None);
    entry.push(Instr::Alloc { dst: ptr, size: n }, Some(Span::new(30, 40)));
    entry.push(Instr::Free { ptr }, None);
    entry.push(Instr::Release { ptr }, None);
    entry.push(
        Instr::Let {
            dst: flag,
            value: Value::Binary {
                op: BinaryOp::Lt,
                lhs: n,
                rhs: sum,
            },
        },
        None,
    );
    entry.push(Instr::MakeTuple { dst: tuple, elems: vec![n, flag] }, None);
    entry.push(Instr::Extract { dst: first, tuple: pair, index: 0 }, None);
    entry.push(
        Instr::LoadGlobal {
            dst: g,
            global: interner.intern("limit"),
        },
        None,
    );
    entry.push(Instr::MakeArray { dst: items, elems: vec![n, g] }, None);
    entry.push(
        Instr::Call {
            dst: Some(called),
            callee: interner.intern("sqrt"),
            args: vec![first],
            conv: CallConv::C {
                library: interner.intern("libm"),
            },
            tail: false,
        },
        Some(Span::new(50, 60)),
    );
    entry.push(
        Instr::Call {
            dst: None,
            callee: interner.intern("<+>"),
            args: vec![],
            conv: CallConv::Native,
            tail: true,
        },
        None,
    );
    entry.terminator = Terminator::Jump {
        target: exit,
        args: vec![neg],
    };

    func.blocks[body.index()].terminator = Terminator::Jump {
        target: exit,
        args: vec![sum],
    };
    let exit_block: &mut Block = &mut func.blocks[exit.index()];
    exit_block.params.push(joined);
    exit_block.terminator = Terminator::Return(Some(tuple));

    func.loops.push(LoopInfo {
        preheader: BlockId::new(0),
        header: body,
        latch: body,
        exit,
        blocks: vec![body],
        induction: Some(Induction {
            slot: x,
            init: -3,
            bound: 10,
            step: 2,
            cmp: BinaryOp::LtEq,
        }),
    });
    func
}

#[test]
fn every_instruction_round_trips() {
    let interner = StringInterner::new();
    round_trip(&kitchen_sink(&interner), &interner);
}

#[test]
fn dead_variables_keep_their_types() {
    let interner = StringInterner::new();
    let func = kitchen_sink(&interner);
    let text = func.display(&interner).to_string();
    assert!(text.contains("dead %"), "{text}");
    let read = read_function(&text, &interner).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(read.var_types, func.var_types);
}

#[test]
fn non_zero_entry_round_trips() {
    let interner = StringInterner::new();
    let mut func = Function::new(interner.intern("f"), Ty::None);
    let entry = func.new_block();
    func.blocks[0].terminator = Terminator::Return(None);
    func.blocks[entry.index()].terminator = Terminator::Jump {
        target: BlockId::new(0),
        args: vec![],
    };
    func.entry = entry;
    round_trip(&func, &interner);
}

#[test]
fn printed_form_is_readable() {
    let interner = StringInterner::new();
    let text = "\
func @double -> i64 {
  slot $0 n: i64
bb0(%0: i64):
  store $0, %0 @5..6
  %1: i64 = load $0
  %2: i64 = const 2
  %3: i64 = mul %1, %2 @12..19
  ret %3
}
";
    let func = read_function(text, &interner).unwrap_or_else(|e| panic!("{e}"));
    assert_eq!(func.params, vec![VarId::new(0)]);
    assert_eq!(func.var_types.len(), 4);
    assert_eq!(func.blocks[0].spans[3], Some(Span::new(12, 19)));
    assert_eq!(func.display(&interner).to_string(), text);
}

#[test]
fn types_parse() {
    for text in [
        "i64",
        "i8",
        "f32",
        "bool",
        "()",
        "[[i64; 2]; 3]",
        "(i64, (f64, bool), str)",
        "fn(i64, fn() -> none) -> ptr",
        "<4 x f64>",
    ] {
        let ty = parse_ty(text).unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(ty.to_string(), text);
    }
    assert!(parse_ty("int").is_err());
    assert!(parse_ty("[i64; 3").is_err());
}

#[test]
fn lists_split_outside_types() {
    assert_eq!(
        split_list("%0: (i64, bool), %1: fn(i64) -> i64, %2: i8"),
        vec!["%0: (i64, bool)", "%1: fn(i64) -> i64", "%2: i8"]
    );
    assert!(split_list("").is_empty());
}

#[test]
fn errors_carry_line_numbers() {
    let interner = StringInterner::new();
    let err = read_function("func @f -> i64 {\nbb0:\n  %0: i64 = frob %1\n  ret %0\n}\n", &interner)
        .err();
    assert_eq!(
        err,
        Some(ReadError {
            line: 3,
            message: "unknown instruction `frob`".to_owned()
        })
    );

    let err = read_function("func @f -> none {\nbb0:\n}\n", &interner).err();
    assert_eq!(err.map(|e| e.line), Some(3));

    let err = read_function("func @f -> none {\nbb1:\n  ret\n}\n", &interner).err();
    assert_eq!(err.map(|e| e.message), Some("bb1 out of order".to_owned()));
}

#[test]
fn string_escapes() {
    assert_eq!(
        unquote(r#""a\"b\\c\n\u{7f}" rest"#),
        Ok(("a\"b\\c\n\u{7f}".to_owned(), "rest"))
    );
    assert!(unquote("\"open").is_err());
}
