//! Typed basic-block IR.
//!
//! - [`Function`]: blocks, per-variable types, stack slots, loop metadata
//! - [`Block`]: parameters, instructions, terminator
//! - [`Instr`]: one typed instruction
//! - [`Terminator`]: how control leaves a block
//!
//! Values are SSA variables ([`VarId`]); each is defined exactly once and
//! its type lives in [`Function::var_types`]. Source-level locals live in
//! stack slots ([`SlotId`]) and are accessed with `Load`/`Store`. Block
//! parameters play the role of phi nodes: a `Jump` passes one argument per
//! parameter of its target.

mod ty;

use bitflags::bitflags;
use kiln_ir::{BinaryOp, Name, Span, UnaryOp};
use kiln_types::ConstValue;
use smallvec::{smallvec, SmallVec};

pub use ty::Ty;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
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
    };
}

id_type!(
    /// SSA variable within one function.
    VarId
);
id_type!(
    /// Basic block within one function; `blocks[id.index()]`.
    BlockId
);
id_type!(
    /// Stack slot within one function.
    SlotId
);

/// Constant operand of a `Let`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Const {
    Int(i64),
    /// `f64` bits, so constants stay `Eq + Hash`.
    Float(u64),
    Bool(bool),
    Str(Name),
}

impl Const {
    pub fn float(value: f64) -> Const {
        Const::Float(value.to_bits())
    }

    pub fn as_int(self) -> Option<i64> {
        match self {
            Const::Int(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            Const::Bool(b) => Some(b),
            _ => None,
        }
    }
}

/// Right-hand side of a `Let`. Never has side effects; `Binary` may trap
/// (see [`BinaryOp::may_trap`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Value {
    Const(Const),
    /// Copy of another variable.
    Var(VarId),
    Binary { op: BinaryOp, lhs: VarId, rhs: VarId },
    Unary { op: UnaryOp, operand: VarId },
    /// Numeric conversion to the destination's type.
    Cast(VarId),
}

/// Calling convention of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallConv {
    Native,
    C { library: Name },
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Instr {
    Let {
        dst: VarId,
        value: Value,
    },
    /// `dst` is `None` when the callee returns `none`.
    Call {
        dst: Option<VarId>,
        callee: Name,
        args: Vec<VarId>,
        conv: CallConv,
        /// Self call in strict tail position.
        tail: bool,
    },
    Load {
        dst: VarId,
        slot: SlotId,
    },
    Store {
        slot: SlotId,
        value: VarId,
    },
    LoadGlobal {
        dst: VarId,
        global: Name,
    },
    /// Element of the array held in `slot`.
    IndexLoad {
        dst: VarId,
        slot: SlotId,
        index: VarId,
    },
    IndexStore {
        slot: SlotId,
        index: VarId,
        value: VarId,
    },
    /// Trap unless `0 <= index < len`.
    BoundsCheck {
        index: VarId,
        len: u64,
    },
    MakeArray {
        dst: VarId,
        elems: Vec<VarId>,
    },
    MakeTuple {
        dst: VarId,
        elems: Vec<VarId>,
    },
    Extract {
        dst: VarId,
        tuple: VarId,
        index: u32,
    },
    Alloc {
        dst: VarId,
        size: VarId,
    },
    Free {
        ptr: VarId,
    },
    /// Compiler-inserted release of an allocation at scope exit.
    Release {
        ptr: VarId,
    },
    /// Lanes `start..start + width` of the array in `slot`.
    VecLoad {
        dst: VarId,
        slot: SlotId,
        start: u64,
    },
    VecStore {
        slot: SlotId,
        start: u64,
        value: VarId,
    },
    VecBinary {
        dst: VarId,
        op: BinaryOp,
        lhs: VarId,
        rhs: VarId,
    },
}

impl Instr {
    /// The variable this instruction defines, if any.
    pub fn def(&self) -> Option<VarId> {
        match self {
            Instr::Let { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::LoadGlobal { dst, .. }
            | Instr::IndexLoad { dst, .. }
            | Instr::MakeArray { dst, .. }
            | Instr::MakeTuple { dst, .. }
            | Instr::Extract { dst, .. }
            | Instr::Alloc { dst, .. }
            | Instr::VecLoad { dst, .. }
            | Instr::VecBinary { dst, .. } => Some(*dst),
            Instr::Call { dst, .. } => *dst,
            Instr::Store { .. }
            | Instr::IndexStore { .. }
            | Instr::BoundsCheck { .. }
            | Instr::Free { .. }
            | Instr::Release { .. }
            | Instr::VecStore { .. } => None,
        }
    }

    /// Variables read by this instruction, in operand order.
    pub fn uses(&self) -> SmallVec<[VarId; 4]> {
        match self {
            Instr::Let { value, .. } => match value {
                Value::Const(_) => SmallVec::new(),
                Value::Var(v) | Value::Unary { operand: v, .. } | Value::Cast(v) => smallvec![*v],
                Value::Binary { lhs, rhs, .. } => smallvec![*lhs, *rhs],
            },
            Instr::Call { args, .. } => args.iter().copied().collect(),
            Instr::MakeArray { elems, .. } | Instr::MakeTuple { elems, .. } => {
                elems.iter().copied().collect()
            }
            Instr::Load { .. }
            | Instr::LoadGlobal { .. }
            | Instr::VecLoad { .. } => SmallVec::new(),
            Instr::Store { value, .. } | Instr::VecStore { value, .. } => smallvec![*value],
            Instr::IndexLoad { index, .. } | Instr::BoundsCheck { index, .. } => smallvec![*index],
            Instr::IndexStore { index, value, .. } => smallvec![*index, *value],
            Instr::Extract { tuple, .. } => smallvec![*tuple],
            Instr::Alloc { size, .. } => smallvec![*size],
            Instr::Free { ptr } | Instr::Release { ptr } => smallvec![*ptr],
            Instr::VecBinary { lhs, rhs, .. } => smallvec![*lhs, *rhs],
        }
    }

    /// Rewrite every read operand through `f`. Definitions are untouched.
    pub fn map_uses(&mut self, mut f: impl FnMut(VarId) -> VarId) {
        let mut map = |v: &mut VarId| *v = f(*v);
        match self {
            Instr::Let { value, .. } => match value {
                Value::Const(_) => {}
                Value::Var(v) | Value::Unary { operand: v, .. } | Value::Cast(v) => map(v),
                Value::Binary { lhs, rhs, .. } => {
                    map(lhs);
                    map(rhs);
                }
            },
            Instr::Call { args: elems, .. }
            | Instr::MakeArray { elems, .. }
            | Instr::MakeTuple { elems, .. } => elems.iter_mut().for_each(map),
            Instr::Load { .. } | Instr::LoadGlobal { .. } | Instr::VecLoad { .. } => {}
            Instr::Store { value, .. } | Instr::VecStore { value, .. } => map(value),
            Instr::IndexLoad { index, .. } | Instr::BoundsCheck { index, .. } => map(index),
            Instr::IndexStore { index, value, .. } => {
                map(index);
                map(value);
            }
            Instr::Extract { tuple, .. } => map(tuple),
            Instr::Alloc { size, .. } => map(size),
            Instr::Free { ptr } | Instr::Release { ptr } => map(ptr),
            Instr::VecBinary { lhs, rhs, .. } => {
                map(lhs);
                map(rhs);
            }
        }
    }

    /// Rename the defined variable.
    pub fn map_def(&mut self, f: impl FnOnce(VarId) -> VarId) {
        match self {
            Instr::Let { dst, .. }
            | Instr::Load { dst, .. }
            | Instr::LoadGlobal { dst, .. }
            | Instr::IndexLoad { dst, .. }
            | Instr::MakeArray { dst, .. }
            | Instr::MakeTuple { dst, .. }
            | Instr::Extract { dst, .. }
            | Instr::Alloc { dst, .. }
            | Instr::VecLoad { dst, .. }
            | Instr::VecBinary { dst, .. } => *dst = f(*dst),
            Instr::Call { dst: Some(dst), .. } => *dst = f(*dst),
            _ => {}
        }
    }

    /// Slot read by this instruction. `IndexStore` counts as a read: it
    /// keeps the other elements.
    pub fn reads_slot(&self) -> Option<SlotId> {
        match self {
            Instr::Load { slot, .. }
            | Instr::IndexLoad { slot, .. }
            | Instr::VecLoad { slot, .. }
            | Instr::IndexStore { slot, .. }
            | Instr::VecStore { slot, .. } => Some(*slot),
            _ => None,
        }
    }

    pub fn writes_slot(&self) -> Option<SlotId> {
        match self {
            Instr::Store { slot, .. } | Instr::IndexStore { slot, .. } | Instr::VecStore { slot, .. } => {
                Some(*slot)
            }
            _ => None,
        }
    }

    /// Free of side effects and unable to trap, so it may be removed when
    /// unused or moved to another point.
    pub fn is_pure(&self) -> bool {
        match self {
            Instr::Let { value, .. } => match value {
                Value::Binary { op, .. } => !op.may_trap(),
                _ => true,
            },
            Instr::VecBinary { op, .. } => !op.may_trap(),
            Instr::Load { .. }
            | Instr::LoadGlobal { .. }
            | Instr::IndexLoad { .. }
            | Instr::VecLoad { .. }
            | Instr::MakeArray { .. }
            | Instr::MakeTuple { .. }
            | Instr::Extract { .. } => true,
            Instr::Call { .. }
            | Instr::Store { .. }
            | Instr::IndexStore { .. }
            | Instr::BoundsCheck { .. }
            | Instr::Alloc { .. }
            | Instr::Free { .. }
            | Instr::Release { .. }
            | Instr::VecStore { .. } => false,
        }
    }
}

/// How control leaves a block.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Terminator {
    Return(Option<VarId>),
    Jump {
        target: BlockId,
        args: Vec<VarId>,
    },
    /// Branch targets take no parameters.
    Branch {
        cond: VarId,
        then_block: BlockId,
        else_block: BlockId,
    },
    Unreachable,
}

impl Terminator {
    pub fn successors(&self) -> SmallVec<[BlockId; 2]> {
        match self {
            Terminator::Return(_) | Terminator::Unreachable => SmallVec::new(),
            Terminator::Jump { target, .. } => smallvec![*target],
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
        }
    }

    pub fn uses(&self) -> SmallVec<[VarId; 4]> {
        match self {
            Terminator::Return(value) => value.iter().copied().collect(),
            Terminator::Jump { args, .. } => args.iter().copied().collect(),
            Terminator::Branch { cond, .. } => smallvec![*cond],
            Terminator::Unreachable => SmallVec::new(),
        }
    }

    pub fn map_uses(&mut self, mut f: impl FnMut(VarId) -> VarId) {
        match self {
            Terminator::Return(Some(value)) => *value = f(*value),
            Terminator::Jump { args, .. } => args.iter_mut().for_each(|a| *a = f(*a)),
            Terminator::Branch { cond, .. } => *cond = f(*cond),
            Terminator::Return(None) | Terminator::Unreachable => {}
        }
    }

    pub fn map_targets(&mut self, mut f: impl FnMut(BlockId) -> BlockId) {
        match self {
            Terminator::Jump { target, .. } => *target = f(*target),
            Terminator::Branch {
                then_block,
                else_block,
                ..
            } => {
                *then_block = f(*then_block);
                *else_block = f(*else_block);
            }
            Terminator::Return(_) | Terminator::Unreachable => {}
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Block {
    pub id: BlockId,
    pub params: Vec<VarId>,
    pub body: Vec<Instr>,
    /// Source span of each instruction in `body`; `None` for synthetic ones.
    pub spans: Vec<Option<Span>>,
    pub terminator: Terminator,
}

impl Block {
    pub fn new(id: BlockId) -> Self {
        Block {
            id,
            params: Vec::new(),
            body: Vec::new(),
            spans: Vec::new(),
            terminator: Terminator::Unreachable,
        }
    }

    pub fn push(&mut self, instr: Instr, span: Option<Span>) {
        self.body.push(instr);
        self.spans.push(span);
    }

    pub fn insert(&mut self, at: usize, instr: Instr, span: Option<Span>) {
        self.body.insert(at, instr);
        self.spans.insert(at, span);
    }

    pub fn remove(&mut self, at: usize) -> (Instr, Option<Span>) {
        (self.body.remove(at), self.spans.remove(at))
    }

    /// Keep the instructions for which `keep` returns true, spans alongside.
    pub fn retain(&mut self, mut keep: impl FnMut(&Instr) -> bool) -> usize {
        let before = self.body.len();
        let mut kept_body = Vec::with_capacity(before);
        let mut kept_spans = Vec::with_capacity(before);
        for (instr, span) in self.body.drain(..).zip(self.spans.drain(..)) {
            if keep(&instr) {
                kept_body.push(instr);
                kept_spans.push(span);
            }
        }
        self.body = kept_body;
        self.spans = kept_spans;
        before - self.body.len()
    }
}

/// A stack slot holding one source-level local (or a compiler temporary).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Slot {
    pub name: Option<Name>,
    pub ty: Ty,
}

/// Induction variable of a counted `for` loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Induction {
    pub slot: SlotId,
    pub init: i64,
    /// Right-hand side of `[cmp i bound]`.
    pub bound: i64,
    /// Signed increment per iteration.
    pub step: i64,
    pub cmp: BinaryOp,
}

impl Induction {
    /// Number of iterations, when it is finite and fits in memory.
    pub fn trip_count(&self) -> Option<u64> {
        let (init, bound, step) = (
            i128::from(self.init),
            i128::from(self.bound),
            i128::from(self.step),
        );
        if step == 0 {
            return None;
        }
        let distance = match self.cmp {
            BinaryOp::Lt if step > 0 => bound - init,
            BinaryOp::LtEq if step > 0 => bound - init + 1,
            BinaryOp::Gt if step < 0 => init - bound,
            BinaryOp::GtEq if step < 0 => init - bound + 1,
            BinaryOp::NotEq => {
                let diff = bound - init;
                if diff % step != 0 || (diff != 0 && (diff > 0) != (step > 0)) {
                    return None;
                }
                return u64::try_from(diff / step).ok();
            }
            _ => return None,
        };
        if distance <= 0 {
            return Some(0);
        }
        let magnitude = step.abs();
        u64::try_from((distance + magnitude - 1) / magnitude).ok()
    }

    /// Value of the induction variable at the start of iteration `k`.
    pub fn value_at(&self, k: u64) -> Option<i64> {
        let k = i64::try_from(k).ok()?;
        self.step.checked_mul(k)?.checked_add(self.init)
    }
}

/// Loop structure recorded by the builder.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoopInfo {
    /// Single block jumping into `header` from outside the loop.
    pub preheader: BlockId,
    pub header: BlockId,
    /// Block holding the back-edge to `header`.
    pub latch: BlockId,
    pub exit: BlockId,
    /// Every block inside the loop, including `header` and `latch`.
    pub blocks: Vec<BlockId>,
    pub induction: Option<Induction>,
}

impl LoopInfo {
    pub fn contains(&self, block: BlockId) -> bool {
        self.blocks.contains(&block)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct FunctionFlags: u8 {
        /// Has a self call in strict tail position.
        const TAIL_RECURSIVE = 1;
        /// Monomorphic instance of a generic function.
        const GENERIC_INSTANCE = 1 << 1;
        /// Collects a unit's top-level free expressions.
        const TOPLEVEL = 1 << 2;
    }
}

impl FunctionFlags {
    pub(crate) const NAMES: [(FunctionFlags, &'static str); 3] = [
        (FunctionFlags::TAIL_RECURSIVE, "tail_recursive"),
        (FunctionFlags::GENERIC_INSTANCE, "generic_instance"),
        (FunctionFlags::TOPLEVEL, "toplevel"),
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Function {
    pub name: Name,
    /// Parameters of the entry block.
    pub params: Vec<VarId>,
    pub return_ty: Ty,
    pub blocks: Vec<Block>,
    pub entry: BlockId,
    /// Type of each variable, indexed by `VarId::index()`.
    pub var_types: Vec<Ty>,
    pub slots: Vec<Slot>,
    pub loops: Vec<LoopInfo>,
    pub flags: FunctionFlags,
}

impl Function {
    pub fn new(name: Name, return_ty: Ty) -> Self {
        Function {
            name,
            params: Vec::new(),
            return_ty,
            blocks: vec![Block::new(BlockId::new(0))],
            entry: BlockId::new(0),
            var_types: Vec::new(),
            slots: Vec::new(),
            loops: Vec::new(),
            flags: FunctionFlags::empty(),
        }
    }

    #[inline]
    pub fn var_type(&self, var: VarId) -> &Ty {
        &self.var_types[var.index()]
    }

    #[inline]
    pub fn slot_type(&self, slot: SlotId) -> &Ty {
        &self.slots[slot.index()].ty
    }

    #[inline]
    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id.index()]
    }

    #[inline]
    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id.index()]
    }

    pub fn fresh_var(&mut self, ty: Ty) -> VarId {
        let id = u32::try_from(self.var_types.len())
            .unwrap_or_else(|_| panic!("variable count exceeds u32::MAX"));
        self.var_types.push(ty);
        VarId::new(id)
    }

    pub fn new_slot(&mut self, name: Option<Name>, ty: Ty) -> SlotId {
        let id = u32::try_from(self.slots.len())
            .unwrap_or_else(|_| panic!("slot count exceeds u32::MAX"));
        self.slots.push(Slot { name, ty });
        SlotId::new(id)
    }

    pub fn new_block(&mut self) -> BlockId {
        let id = BlockId::new(
            u32::try_from(self.blocks.len())
                .unwrap_or_else(|_| panic!("block count exceeds u32::MAX")),
        );
        self.blocks.push(Block::new(id));
        id
    }

    pub fn instr_count(&self) -> usize {
        self.blocks.iter().map(|b| b.body.len()).sum()
    }

    /// Every call instruction, with the block it sits in.
    pub fn calls(&self) -> impl Iterator<Item = (BlockId, &Instr)> {
        self.blocks.iter().flat_map(|block| {
            block
                .body
                .iter()
                .filter(|instr| matches!(instr, Instr::Call { .. }))
                .map(move |instr| (block.id, instr))
        })
    }
}

/// Global constant with a compile-time initialiser.
#[derive(Clone, Debug, PartialEq)]
pub struct Global {
    pub name: Name,
    pub ty: Ty,
    pub init: ConstValue,
}

/// Symbol resolved outside this unit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternSymbol {
    pub name: Name,
    /// `None` for functions of another Kiln unit.
    pub library: Option<Name>,
    pub params: Vec<Ty>,
    pub ret: Ty,
}

/// Lowered compilation unit.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Program {
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub externs: Vec<ExternSymbol>,
}

impl Program {
    pub fn function(&self, name: Name) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn global(&self, name: Name) -> Option<&Global> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn extern_symbol(&self, name: Name) -> Option<&ExternSymbol> {
        self.externs.iter().find(|e| e.name == name)
    }
}
