//! Assembly-style rendering.
//!
//! ```text
//! func @max(r0, r1) frame=0
//! bb0:
//!   bgt r0, r1, bb1, bb2
//! bb2:
//!   ret r1
//! bb1:
//!   ret r0
//! ```

use std::fmt::{self, Write};

use super::{
    Addr, Convention, MInst, MachineBlock, MachineFunction, ObjectModule, Operand, Symbol,
    SymbolKind,
};

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Virtual(v) => write!(f, "v{}", v.raw()),
            Operand::Reg(r) => write!(f, "r{}", r.0),
            Operand::Imm(n) => write!(f, "#{n}"),
            Operand::Float(bits) => write!(f, "#{:?}", f64::from_bits(*bits)),
            Operand::Frame(offset) => write!(f, "[fp+{offset}]"),
        }
    }
}

impl fmt::Display for Addr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Addr::Frame(offset) => write!(f, "[fp+{offset}]"),
            Addr::FrameIndexed { base, index, scale } => write!(f, "[fp+{base}+{index}*{scale}]"),
            Addr::Based { base, offset } => write!(f, "[{base}+{offset}]"),
            Addr::Symbol(name) => write!(f, "[@{name}]"),
        }
    }
}

fn list(operands: &[Operand]) -> String {
    let mut out = String::new();
    for (i, op) in operands.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        let _ = write!(out, "{op}");
    }
    out
}

impl fmt::Display for MInst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MInst::Mov { dst, src } => write!(f, "mov {dst}, {src}"),
            MInst::Binary { op, dst, lhs, rhs } => {
                let suffix = if rhs.is_immediate() { "i" } else { "" };
                write!(f, "{}{suffix} {dst}, {lhs}, {rhs}", op.mnemonic())
            }
            MInst::Unary { op, dst, src } => write!(f, "{} {dst}, {src}", op.mnemonic()),
            MInst::Convert { dst, src, to } => write!(f, "cvt {dst}, {src}, {to}"),
            MInst::Load { dst, addr } => write!(f, "ld {dst}, {addr}"),
            MInst::Store { addr, src } => write!(f, "st {addr}, {src}"),
            MInst::Lea { dst, addr } => write!(f, "lea {dst}, {addr}"),
            MInst::Copy { dst, src, words } => write!(f, "copy {dst}, {src}, {words}"),
            MInst::Check { index, len } => write!(f, "chk {index}, {len}"),
            MInst::Call {
                callee,
                conv,
                args,
                dst,
            } => {
                f.write_str("call ")?;
                if let Convention::C { library } = conv {
                    write!(f, "c {library:?} ")?;
                }
                write!(f, "@{callee}({})", list(args))?;
                if let Some(dst) = dst {
                    write!(f, " -> {dst}")?;
                }
                Ok(())
            }
            MInst::Alloc { dst, size } => write!(f, "alloc {dst}, {size}"),
            MInst::Free { ptr } => write!(f, "free {ptr}"),
            MInst::VLoad { dst, addr, width } => write!(f, "vld.{width} {dst}, {addr}"),
            MInst::VStore { addr, src, width } => write!(f, "vst.{width} {addr}, {src}"),
            MInst::VBinary {
                op,
                dst,
                lhs,
                rhs,
                width,
            } => write!(f, "v{}.{width} {dst}, {lhs}, {rhs}", op.mnemonic()),
            MInst::ParallelMove { moves } => {
                f.write_str("pmov")?;
                for (i, (dst, src)) in moves.iter().enumerate() {
                    let sep = if i == 0 { " " } else { ", " };
                    write!(f, "{sep}{dst} <- {src}")?;
                }
                Ok(())
            }
            MInst::Jump { target } => write!(f, "jmp bb{}", target.raw()),
            MInst::Branch {
                cond,
                then_block,
                else_block,
            } => write!(f, "br {cond}, bb{}, bb{}", then_block.raw(), else_block.raw()),
            MInst::CompareBranch {
                op,
                lhs,
                rhs,
                then_block,
                else_block,
            } => write!(
                f,
                "b{} {lhs}, {rhs}, bb{}, bb{}",
                op.mnemonic(),
                then_block.raw(),
                else_block.raw()
            ),
            MInst::Ret { value: Some(value) } => write!(f, "ret {value}"),
            MInst::Ret { value: None } => f.write_str("ret"),
            MInst::Trap => f.write_str("trap"),
        }
    }
}

impl fmt::Display for MachineBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "bb{}:", self.id.raw())?;
        for inst in &self.insts {
            writeln!(f, "  {inst}")?;
        }
        Ok(())
    }
}

impl fmt::Display for MachineFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "func @{}({}) frame={}", self.name, list(&self.params), self.frame_size)?;
        if self.spills > 0 {
            write!(f, " spills={}", self.spills)?;
        }
        writeln!(f)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        Ok(())
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            SymbolKind::Function => write!(f, "func   @{}", self.name),
            SymbolKind::Global { init } => write!(f, "global @{} = {init}", self.name),
            SymbolKind::Data { text } => write!(f, "data   @{} = {text:?}", self.name),
            SymbolKind::Extern { library: Some(lib) } => {
                write!(f, "extern @{} from {lib:?}", self.name)
            }
            SymbolKind::Extern { library: None } => write!(f, "extern @{}", self.name),
        }
    }
}

impl fmt::Display for ObjectModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {}", self.name)?;
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{func}")?;
        }
        writeln!(f)?;
        writeln!(f, "symbols:")?;
        for symbol in &self.symbols {
            writeln!(f, "  {symbol}")?;
        }
        Ok(())
    }
}
