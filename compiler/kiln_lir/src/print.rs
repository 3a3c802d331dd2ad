//! Text form of the IR.
//!
//! The format is line based and read back by [`crate::read_function`]:
//!
//! ```text
//! func @fast_exp -> i64 flags=tail_recursive {
//!   slot $0 b: i64
//!   loop preheader=bb1 header=bb2 latch=bb4 exit=bb5 blocks=bb2,bb3,bb4
//! bb0(%0: i64, %1: i64):
//!   store $0, %0 @23..24
//!   %2: i64 = const 0
//!   %3: bool = eq %1, %2 @40..48
//!   branch %3, bb1, bb2
//! }
//! ```
//!
//! Every defined variable is printed with its type and `dead %n: ty` lines
//! list variables without a definition, so the text carries the whole
//! `var_types` table.

use std::fmt::{self, Write};

use kiln_ir::StringInterner;
use kiln_types::ConstValue;

use crate::ir::{
    Block, CallConv, Const, Function, Instr, LoopInfo, Program, Terminator, Value, VarId,
};

pub struct FunctionDisplay<'a> {
    func: &'a Function,
    interner: &'a StringInterner,
}

pub struct ProgramDisplay<'a> {
    program: &'a Program,
    interner: &'a StringInterner,
}

impl Function {
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> FunctionDisplay<'a> {
        FunctionDisplay {
            func: self,
            interner,
        }
    }
}

impl Program {
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> ProgramDisplay<'a> {
        ProgramDisplay {
            program: self,
            interner,
        }
    }
}

fn var(v: VarId) -> String {
    format!("%{}", v.raw())
}

fn list(vars: &[VarId]) -> String {
    vars.iter().map(|v| var(*v)).collect::<Vec<_>>().join(", ")
}

pub(crate) fn write_str_literal(out: &mut impl Write, s: &str) -> fmt::Result {
    write!(out, "{s:?}")
}

fn write_const(out: &mut impl Write, c: Const, interner: &StringInterner) -> fmt::Result {
    match c {
        Const::Int(n) => write!(out, "{n}"),
        Const::Float(bits) => write!(out, "{:?}", f64::from_bits(bits)),
        Const::Bool(b) => write!(out, "{b}"),
        Const::Str(s) => write_str_literal(out, interner.lookup(s)),
    }
}

fn write_const_value(out: &mut impl Write, value: &ConstValue, interner: &StringInterner) -> fmt::Result {
    match value {
        ConstValue::Int(n) => write!(out, "{n}"),
        ConstValue::Frac(x) => write!(out, "{x:?}"),
        ConstValue::Bool(b) => write!(out, "{b}"),
        ConstValue::Str(s) => write_str_literal(out, interner.lookup(*s)),
        ConstValue::Array(items) | ConstValue::Tuple(items) => {
            let (open, close) = if matches!(value, ConstValue::Array(_)) {
                ("[", "]")
            } else {
                ("(", ")")
            };
            out.write_str(open)?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_const_value(out, item, interner)?;
            }
            out.write_str(close)
        }
    }
}

impl FunctionDisplay<'_> {
    fn write_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let func = self.func;
        write!(
            f,
            "func @{} -> {}",
            self.interner.lookup(func.name),
            func.return_ty
        )?;
        if func.entry.raw() != 0 {
            write!(f, " entry=bb{}", func.entry.raw())?;
        }
        if !func.flags.is_empty() {
            let names: Vec<_> = crate::ir::FunctionFlags::NAMES
                .iter()
                .filter(|(flag, _)| func.flags.contains(*flag))
                .map(|(_, name)| *name)
                .collect();
            write!(f, " flags={}", names.join(","))?;
        }
        writeln!(f, " {{")?;

        for (i, slot) in func.slots.iter().enumerate() {
            match slot.name {
                Some(name) => writeln!(f, "  slot ${i} {}: {}", self.interner.lookup(name), slot.ty)?,
                None => writeln!(f, "  slot ${i}: {}", slot.ty)?,
            }
        }
        for info in &func.loops {
            write_loop(f, info)?;
        }
        // Variables whose definition a pass removed keep their type entry.
        let mut defined = vec![false; func.var_types.len()];
        for block in &func.blocks {
            for param in &block.params {
                defined[param.index()] = true;
            }
            for def in block.body.iter().filter_map(Instr::def) {
                defined[def.index()] = true;
            }
        }
        for (i, ty) in func.var_types.iter().enumerate() {
            if !defined[i] {
                writeln!(f, "  dead %{i}: {ty}")?;
            }
        }
        Ok(())
    }

    fn write_block(&self, f: &mut fmt::Formatter<'_>, block: &Block) -> fmt::Result {
        write!(f, "bb{}", block.id.raw())?;
        if !block.params.is_empty() {
            let params: Vec<_> = block
                .params
                .iter()
                .map(|p| format!("{}: {}", var(*p), self.func.var_type(*p)))
                .collect();
            write!(f, "({})", params.join(", "))?;
        }
        writeln!(f, ":")?;

        for (instr, span) in block.body.iter().zip(&block.spans) {
            f.write_str("  ")?;
            self.write_instr(f, instr)?;
            if let Some(span) = span {
                write!(f, " @{}..{}", span.start, span.end)?;
            }
            writeln!(f)?;
        }

        f.write_str("  ")?;
        match &block.terminator {
            Terminator::Return(Some(v)) => writeln!(f, "ret {}", var(*v)),
            Terminator::Return(None) => writeln!(f, "ret"),
            Terminator::Jump { target, args } if args.is_empty() => {
                writeln!(f, "jump bb{}", target.raw())
            }
            Terminator::Jump { target, args } => {
                writeln!(f, "jump bb{}({})", target.raw(), list(args))
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => writeln!(
                f,
                "branch {}, bb{}, bb{}",
                var(*cond),
                then_block.raw(),
                else_block.raw()
            ),
            Terminator::Unreachable => writeln!(f, "unreachable"),
        }
    }

    fn write_instr(&self, f: &mut fmt::Formatter<'_>, instr: &Instr) -> fmt::Result {
        if let Some(dst) = instr.def() {
            write!(f, "{}: {} = ", var(dst), self.func.var_type(dst))?;
        }
        match instr {
            Instr::Let { value, .. } => match value {
                Value::Const(c) => {
                    f.write_str("const ")?;
                    write_const(f, *c, self.interner)
                }
                Value::Var(v) => write!(f, "copy {}", var(*v)),
                Value::Binary { op, lhs, rhs } => {
                    write!(f, "{} {}, {}", op.mnemonic(), var(*lhs), var(*rhs))
                }
                Value::Unary { op, operand } => write!(f, "{} {}", op.mnemonic(), var(*operand)),
                Value::Cast(v) => write!(f, "cast {}", var(*v)),
            },
            Instr::Call {
                callee,
                args,
                conv,
                tail,
                ..
            } => {
                if *tail {
                    f.write_str("tail ")?;
                }
                write!(f, "call @{}({})", self.interner.lookup(*callee), list(args))?;
                if let CallConv::C { library } = conv {
                    f.write_str(" c ")?;
                    write_str_literal(f, self.interner.lookup(*library))?;
                }
                Ok(())
            }
            Instr::Load { slot, .. } => write!(f, "load ${}", slot.raw()),
            Instr::Store { slot, value } => write!(f, "store ${}, {}", slot.raw(), var(*value)),
            Instr::LoadGlobal { global, .. } => write!(f, "global @{}", self.interner.lookup(*global)),
            Instr::IndexLoad { slot, index, .. } => {
                write!(f, "index ${}[{}]", slot.raw(), var(*index))
            }
            Instr::IndexStore { slot, index, value } => write!(
                f,
                "store ${}[{}], {}",
                slot.raw(),
                var(*index),
                var(*value)
            ),
            Instr::BoundsCheck { index, len } => write!(f, "bounds_check {}, {len}", var(*index)),
            Instr::MakeArray { elems, .. } => write!(f, "array [{}]", list(elems)),
            Instr::MakeTuple { elems, .. } => write!(f, "tuple ({})", list(elems)),
            Instr::Extract { tuple, index, .. } => write!(f, "extract {}, {index}", var(*tuple)),
            Instr::Alloc { size, .. } => write!(f, "alloc {}", var(*size)),
            Instr::Free { ptr } => write!(f, "free {}", var(*ptr)),
            Instr::Release { ptr } => write!(f, "release {}", var(*ptr)),
            Instr::VecLoad { slot, start, .. } => write!(f, "vload ${}[{start}]", slot.raw()),
            Instr::VecStore { slot, start, value } => {
                write!(f, "vstore ${}[{start}], {}", slot.raw(), var(*value))
            }
            Instr::VecBinary { op, lhs, rhs, .. } => {
                write!(f, "v{} {}, {}", op.mnemonic(), var(*lhs), var(*rhs))
            }
        }
    }
}

fn write_loop(f: &mut fmt::Formatter<'_>, info: &LoopInfo) -> fmt::Result {
    let blocks: Vec<_> = info.blocks.iter().map(|b| format!("bb{}", b.raw())).collect();
    write!(
        f,
        "  loop preheader=bb{} header=bb{} latch=bb{} exit=bb{} blocks={}",
        info.preheader.raw(),
        info.header.raw(),
        info.latch.raw(),
        info.exit.raw(),
        blocks.join(",")
    )?;
    if let Some(ind) = &info.induction {
        write!(
            f,
            " induction=${} init={} cmp={} bound={} step={}",
            ind.slot.raw(),
            ind.init,
            ind.cmp.mnemonic(),
            ind.bound,
            ind.step
        )?;
    }
    writeln!(f)
}

impl fmt::Display for FunctionDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_header(f)?;
        for block in &self.func.blocks {
            self.write_block(f, block)?;
        }
        writeln!(f, "}}")
    }
}

impl fmt::Display for ProgramDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let program = self.program;
        for global in &program.globals {
            write!(f, "global @{}: {} = ", self.interner.lookup(global.name), global.ty)?;
            write_const_value(f, &global.init, self.interner)?;
            writeln!(f)?;
        }
        for ext in &program.externs {
            let params: Vec<_> = ext.params.iter().map(ToString::to_string).collect();
            write!(
                f,
                "extern @{}({}) -> {}",
                self.interner.lookup(ext.name),
                params.join(", "),
                ext.ret
            )?;
            if let Some(library) = ext.library {
                f.write_str(" from ")?;
                write_str_literal(f, self.interner.lookup(library))?;
            }
            writeln!(f)?;
        }
        for (i, func) in program.functions.iter().enumerate() {
            if i > 0 || !program.globals.is_empty() || !program.externs.is_empty() {
                writeln!(f)?;
            }
            write!(f, "{}", func.display(self.interner))?;
        }
        Ok(())
    }
}
