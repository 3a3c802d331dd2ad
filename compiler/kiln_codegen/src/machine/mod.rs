//! Abstract target-machine code.
//!
//! Instructions are three-address over registers, immediates and
//! frame-relative memory. Before allocation, operands name virtual
//! registers ([`VReg`]); afterwards only physical registers ([`Reg`]) and
//! spill slots remain. Memory is addressed in bytes off the frame pointer;
//! every value occupies whole 8-byte words.

mod display;

use kiln_ir::{BinaryOp, UnaryOp};
use kiln_lir::{BlockId, Ty};
use smallvec::SmallVec;

/// Bytes per memory word.
pub const WORD: u32 = 8;

/// Physical register.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reg(pub u8);

/// Virtual register. IR variable `%n` selects to `vn`; instruction
/// selection numbers its own temporaries after the last variable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VReg(u32);

impl VReg {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        VReg(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operand {
    Virtual(VReg),
    Reg(Reg),
    Imm(i64),
    /// Float immediate, as IEEE-754 bits.
    Float(u64),
    /// Spill slot at a frame offset. Only call arguments and function
    /// parameters are passed in memory this way.
    Frame(u32),
}

impl Operand {
    pub fn as_virtual(self) -> Option<VReg> {
        match self {
            Operand::Virtual(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_immediate(self) -> bool {
        matches!(self, Operand::Imm(_) | Operand::Float(_))
    }
}

/// Memory address.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Addr {
    /// `[fp+offset]`
    Frame(u32),
    /// `[fp+base+index*scale]`
    FrameIndexed { base: u32, index: Operand, scale: u32 },
    /// `[reg+offset]`
    Based { base: Operand, offset: u32 },
    /// Address of a global or data symbol.
    Symbol(String),
}

/// Calling convention recorded on a call.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Convention {
    Native,
    C { library: String },
}

/// Whether an operand is read or written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Use,
    Def,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MInst {
    Mov {
        dst: Operand,
        src: Operand,
    },
    /// `rhs` may be an immediate.
    Binary {
        op: BinaryOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
    },
    Unary {
        op: UnaryOp,
        dst: Operand,
        src: Operand,
    },
    Convert {
        dst: Operand,
        src: Operand,
        to: Ty,
    },
    Load {
        dst: Operand,
        addr: Addr,
    },
    Store {
        addr: Addr,
        src: Operand,
    },
    Lea {
        dst: Operand,
        addr: Addr,
    },
    /// Word-wise memory copy.
    Copy {
        dst: Addr,
        src: Addr,
        words: u64,
    },
    /// Trap unless `0 <= index < len`.
    Check {
        index: Operand,
        len: u64,
    },
    /// Registers survive calls on the abstract machine.
    Call {
        callee: String,
        conv: Convention,
        args: Vec<Operand>,
        dst: Option<Operand>,
    },
    Alloc {
        dst: Operand,
        size: Operand,
    },
    Free {
        ptr: Operand,
    },
    VLoad {
        dst: Operand,
        addr: Addr,
        width: u32,
    },
    VStore {
        addr: Addr,
        src: Operand,
        width: u32,
    },
    VBinary {
        op: BinaryOp,
        dst: Operand,
        lhs: Operand,
        rhs: Operand,
        width: u32,
    },
    /// Simultaneous `(dst, src)` copies into block parameters. Register
    /// allocation turns it into a sequence of moves.
    ParallelMove {
        moves: Vec<(Operand, Operand)>,
    },
    Jump {
        target: BlockId,
    },
    Branch {
        cond: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    /// Fused comparison and branch.
    CompareBranch {
        op: BinaryOp,
        lhs: Operand,
        rhs: Operand,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret {
        value: Option<Operand>,
    },
    Trap,
}

impl MInst {
    /// Visit every operand, addresses included, with its role. Uses are
    /// visited before definitions.
    pub fn map_operands(&mut self, mut f: impl FnMut(&mut Operand, Role)) {
        fn addr(a: &mut Addr, f: &mut impl FnMut(&mut Operand, Role)) {
            match a {
                Addr::FrameIndexed { index, .. } => f(index, Role::Use),
                Addr::Based { base, .. } => f(base, Role::Use),
                Addr::Frame(_) | Addr::Symbol(_) => {}
            }
        }

        match self {
            MInst::Mov { dst, src }
            | MInst::Unary { dst, src, .. }
            | MInst::Convert { dst, src, .. }
            | MInst::Alloc { dst, size: src } => {
                f(src, Role::Use);
                f(dst, Role::Def);
            }
            MInst::Binary { dst, lhs, rhs, .. } | MInst::VBinary { dst, lhs, rhs, .. } => {
                f(lhs, Role::Use);
                f(rhs, Role::Use);
                f(dst, Role::Def);
            }
            MInst::Load { dst, addr: a }
            | MInst::Lea { dst, addr: a }
            | MInst::VLoad { dst, addr: a, .. } => {
                addr(a, &mut f);
                f(dst, Role::Def);
            }
            MInst::Store { addr: a, src } | MInst::VStore { addr: a, src, .. } => {
                addr(a, &mut f);
                f(src, Role::Use);
            }
            MInst::Copy { dst, src, .. } => {
                addr(src, &mut f);
                addr(dst, &mut f);
            }
            MInst::Check { index: op, .. }
            | MInst::Free { ptr: op }
            | MInst::Branch { cond: op, .. } => f(op, Role::Use),
            MInst::Call { args, dst, .. } => {
                for arg in args {
                    f(arg, Role::Use);
                }
                if let Some(dst) = dst {
                    f(dst, Role::Def);
                }
            }
            MInst::ParallelMove { moves } => {
                for (_, src) in moves.iter_mut() {
                    f(src, Role::Use);
                }
                for (dst, _) in moves.iter_mut() {
                    f(dst, Role::Def);
                }
            }
            MInst::CompareBranch { lhs, rhs, .. } => {
                f(lhs, Role::Use);
                f(rhs, Role::Use);
            }
            MInst::Ret { value } => {
                if let Some(value) = value {
                    f(value, Role::Use);
                }
            }
            MInst::Jump { .. } | MInst::Trap => {}
        }
    }

    /// Every operand with its role.
    pub fn operands(&self) -> SmallVec<[(Operand, Role); 4]> {
        let mut out = SmallVec::new();
        self.clone().map_operands(|op, role| out.push((*op, role)));
        out
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            MInst::Jump { .. }
                | MInst::Branch { .. }
                | MInst::CompareBranch { .. }
                | MInst::Ret { .. }
                | MInst::Trap
        )
    }

    /// Blocks control may continue in.
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            MInst::Jump { target } => smallvec::smallvec![*target],
            MInst::Branch {
                then_block,
                else_block,
                ..
            }
            | MInst::CompareBranch {
                then_block,
                else_block,
                ..
            } => smallvec::smallvec![*then_block, *else_block],
            _ => SmallVec::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineBlock {
    pub id: BlockId,
    pub insts: Vec<MInst>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MachineFunction {
    pub name: String,
    /// Where each parameter arrives: a register or a frame slot.
    pub params: Vec<Operand>,
    /// In layout order. A block without a terminator falls through to the
    /// next one.
    pub blocks: Vec<MachineBlock>,
    /// Bytes of frame: stack slots, aggregate temporaries and spills.
    pub frame_size: u32,
    pub spills: u32,
    /// Distinct allocatable registers assigned.
    pub registers_used: u32,
}

impl MachineFunction {
    pub fn insts(&self) -> impl Iterator<Item = &MInst> {
        self.blocks.iter().flat_map(|block| &block.insts)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    Function,
    /// Global constant with its rendered initialiser.
    Global { init: String },
    /// String literal data.
    Data { text: String },
    /// Resolved by the linker; `library` is `None` for other Kiln units.
    Extern { library: Option<String> },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
}

/// Machine code of one compilation unit.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ObjectModule {
    pub name: String,
    pub functions: Vec<MachineFunction>,
    pub symbols: Vec<Symbol>,
}

impl ObjectModule {
    pub fn function(&self, name: &str) -> Option<&MachineFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }
}
