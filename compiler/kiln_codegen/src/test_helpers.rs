//! Shared test utilities: building programs and running machine code.
//!
//! Only compiled in test builds.

use kiln_ir::{BinaryOp, StringInterner, UnaryOp};
use kiln_lir::{lower_module, optimize_program, read_function, PassConfig, Program};
use rustc_hash::FxHashMap;

use crate::machine::{Addr, MInst, MachineFunction, ObjectModule, Operand};
use crate::target::TargetMachine;
use crate::{generate, CodegenError};

/// A program made of functions in their printed form.
pub(crate) fn read_program(functions: &[&str], interner: &StringInterner) -> Program {
    Program {
        functions: functions
            .iter()
            .map(|text| read_function(text, interner).unwrap_or_else(|e| panic!("{e}\n{text}")))
            .collect(),
        ..Program::default()
    }
}

/// Parse, check, lower and optimise `source`.
pub(crate) fn lower_source(source: &str, interner: &StringInterner) -> Program {
    let (output, lex_errors) = kiln_parse::parse_source(source, interner);
    assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
    assert!(output.errors.is_empty(), "parse errors: {:?}", output.errors);
    let checked = kiln_types::check_module(&output.module, interner);
    assert!(!checked.has_errors(), "type problems: {:?}", checked.problems);
    let mut lowered = lower_module(&output.module, &checked, interner);
    assert!(lowered.problems.is_empty(), "{:?}", lowered.problems);
    optimize_program(&mut lowered.program, &PassConfig::default());
    lowered.program
}

pub(crate) fn compile(program: &Program, target: &TargetMachine, interner: &StringInterner) -> ObjectModule {
    generate(program, target, interner, "test").unwrap_or_else(|errors| panic!("{errors:?}"))
}

pub(crate) fn compile_err(
    program: &Program,
    target: &TargetMachine,
    interner: &StringInterner,
) -> Vec<CodegenError> {
    match generate(program, target, interner, "test") {
        Ok(module) => panic!("expected errors, generated:\n{module}"),
        Err(errors) => errors,
    }
}

/// A target with `num_regs` registers, two of them scratch.
pub(crate) fn tight(num_regs: u8) -> TargetMachine {
    TargetMachine {
        name: "tight".to_owned(),
        num_regs,
        ..TargetMachine::scalar_only()
    }
}

/// Interpret an allocated integer function.
///
/// Covers register moves, integer arithmetic, frame loads and stores and
/// control flow; anything else panics.
pub(crate) fn run(func: &MachineFunction, args: &[i64]) -> i64 {
    assert_eq!(func.params.len(), args.len(), "arity of @{}", func.name);
    let mut machine = Machine::default();
    for (param, arg) in func.params.iter().zip(args) {
        match param {
            Operand::Reg(r) => {
                machine.regs.insert(r.0, *arg);
            }
            Operand::Frame(offset) => {
                machine.frame.insert(*offset, *arg);
            }
            other => panic!("parameter in {other}"),
        }
    }

    let layout: FxHashMap<_, _> = func.blocks.iter().enumerate().map(|(i, b)| (b.id, i)).collect();
    let mut block = 0;
    let mut steps = 0;
    loop {
        let mut next = block + 1;
        for inst in &func.blocks[block].insts {
            steps += 1;
            assert!(steps < 100_000, "@{} does not terminate", func.name);
            match inst {
                MInst::Jump { target } => {
                    next = layout[target];
                    break;
                }
                MInst::Branch {
                    cond,
                    then_block,
                    else_block,
                } => {
                    let taken = machine.read(*cond) != 0;
                    next = layout[if taken { then_block } else { else_block }];
                    break;
                }
                MInst::CompareBranch {
                    op,
                    lhs,
                    rhs,
                    then_block,
                    else_block,
                } => {
                    let taken = binary(*op, machine.read(*lhs), machine.read(*rhs)) != 0;
                    next = layout[if taken { then_block } else { else_block }];
                    break;
                }
                MInst::Ret { value } => return value.map_or(0, |v| machine.read(v)),
                MInst::Trap => panic!("trap in @{}", func.name),
                inst => machine.step(inst),
            }
        }
        assert!(next < func.blocks.len(), "fell off the end of @{}", func.name);
        block = next;
    }
}

#[derive(Default)]
struct Machine {
    regs: FxHashMap<u8, i64>,
    frame: FxHashMap<u32, i64>,
}

impl Machine {
    fn read(&self, operand: Operand) -> i64 {
        match operand {
            Operand::Reg(r) => *self
                .regs
                .get(&r.0)
                .unwrap_or_else(|| panic!("read of unset r{}", r.0)),
            Operand::Frame(offset) => self.load(offset),
            Operand::Imm(n) => n,
            other => panic!("cannot read {other}"),
        }
    }

    fn load(&self, offset: u32) -> i64 {
        *self
            .frame
            .get(&offset)
            .unwrap_or_else(|| panic!("read of unset [fp+{offset}]"))
    }

    fn address(&self, addr: &Addr) -> u32 {
        match addr {
            Addr::Frame(offset) => *offset,
            Addr::FrameIndexed { base, index, scale } => {
                let index = u32::try_from(self.read(*index)).unwrap_or_else(|_| panic!("negative index"));
                base + index * scale
            }
            other => panic!("unsupported address {other}"),
        }
    }

    fn write(&mut self, dst: Operand, value: i64) {
        match dst {
            Operand::Reg(r) => {
                self.regs.insert(r.0, value);
            }
            Operand::Frame(offset) => {
                self.frame.insert(offset, value);
            }
            other => panic!("cannot write {other}"),
        }
    }

    fn step(&mut self, inst: &MInst) {
        match inst {
            MInst::Mov { dst, src } => self.write(*dst, self.read(*src)),
            MInst::Binary { op, dst, lhs, rhs } => {
                self.write(*dst, binary(*op, self.read(*lhs), self.read(*rhs)));
            }
            MInst::Unary { op, dst, src } => {
                let value = self.read(*src);
                let result = match op {
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Not => i64::from(value == 0),
                    UnaryOp::BitNot => !value,
                };
                self.write(*dst, result);
            }
            MInst::Load { dst, addr } => {
                let value = self.load(self.address(addr));
                self.write(*dst, value);
            }
            MInst::Store { addr, src } => {
                let offset = self.address(addr);
                let value = self.read(*src);
                self.frame.insert(offset, value);
            }
            MInst::Check { index, len } => {
                let index = self.read(*index);
                assert!(
                    u64::try_from(index).is_ok_and(|i| i < *len),
                    "index {index} out of bounds for length {len}"
                );
            }
            other => panic!("cannot run `{other}`"),
        }
    }
}

fn binary(op: BinaryOp, a: i64, b: i64) -> i64 {
    match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::Div => a / b,
        BinaryOp::Mod => a % b,
        BinaryOp::Eq => i64::from(a == b),
        BinaryOp::NotEq => i64::from(a != b),
        BinaryOp::Lt => i64::from(a < b),
        BinaryOp::LtEq => i64::from(a <= b),
        BinaryOp::Gt => i64::from(a > b),
        BinaryOp::GtEq => i64::from(a >= b),
        BinaryOp::And => i64::from(a != 0 && b != 0),
        BinaryOp::Or => i64::from(a != 0 || b != 0),
        BinaryOp::BitAnd => a & b,
        BinaryOp::BitOr => a | b,
        BinaryOp::BitXor => a ^ b,
        BinaryOp::Shl => a << b,
        BinaryOp::Shr => a >> b,
    }
}
