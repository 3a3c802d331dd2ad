//! Instruction selection.
//!
//! Maps each IR instruction to abstract machine instructions over virtual
//! registers, in reverse postorder of the blocks. Patterns beyond the
//! one-to-one mapping:
//!
//! - **Immediates**: an integer or boolean constant whose every use can
//!   take an immediate (right operand of a binary operation, either side
//!   of a commutative one, element index, stored value) is never
//!   materialised. Constant element indices fold into the frame offset.
//! - **Compare and branch**: a comparison used only by the branch ending
//!   its block becomes one `b<op>` instruction.
//!
//! Aggregates live in memory. A variable of array or tuple type holds the
//! address of its words; every definition copies into a fresh frame area,
//! so aggregates keep value semantics. Block arguments become one
//! parallel move into the target's parameters.

use kiln_ir::{BinaryOp, Name, Span, StringInterner};
use kiln_lir::graph;
use kiln_lir::{CallConv, Const, Function, Instr, Program, Terminator, Ty, Value, VarId};
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::trace;

use crate::error::CodegenError;
use crate::machine::{Addr, Convention, MInst, MachineBlock, Operand, Symbol, SymbolKind, VReg, WORD};
use crate::target::TargetMachine;

/// What selection needs from the surrounding unit.
pub(crate) struct ModuleContext<'a> {
    pub target: &'a TargetMachine,
    pub interner: &'a StringInterner,
    pub program: &'a Program,
}

/// String literals referenced by the unit, one data symbol each.
#[derive(Default)]
pub(crate) struct DataTable {
    labels: FxHashMap<Name, String>,
    pub symbols: Vec<Symbol>,
}

impl DataTable {
    fn label(&mut self, text: Name, interner: &StringInterner) -> String {
        let next = self.labels.len();
        self.labels
            .entry(text)
            .or_insert_with(|| {
                let label = format!("str.{next}");
                self.symbols.push(Symbol {
                    name: label.clone(),
                    kind: SymbolKind::Data {
                        text: interner.lookup(text).to_owned(),
                    },
                });
                label
            })
            .clone()
    }
}

/// A function after selection, before register allocation.
pub(crate) struct Selected {
    pub name: String,
    pub params: Vec<Operand>,
    pub blocks: Vec<MachineBlock>,
    pub frame_size: u32,
    /// Words each virtual register holds, indexed by `VReg::index()`.
    pub vreg_words: Vec<u64>,
}

pub(crate) fn select(
    func: &Function,
    cx: &ModuleContext<'_>,
    data: &mut DataTable,
) -> Result<Selected, CodegenError> {
    let consts = let_constants(func);
    let uses = graph::use_counts(func);
    let immediates = immediates(func, &consts);
    let fused = fused_compares(func, &uses);

    // Slots nothing touches any more take no frame space.
    let mut touched = vec![false; func.slots.len()];
    for instr in func.blocks.iter().flat_map(|block| &block.body) {
        for slot in [instr.reads_slot(), instr.writes_slot()].into_iter().flatten() {
            touched[slot.index()] = true;
        }
    }
    let mut slot_offsets = Vec::with_capacity(func.slots.len());
    let mut frame_size = 0;
    for (slot, touched) in func.slots.iter().zip(touched) {
        slot_offsets.push(frame_size);
        if touched {
            frame_size += bytes(slot.ty.words());
        }
    }

    let mut selector = Selector {
        func,
        cx,
        data,
        consts,
        immediates,
        fused,
        slot_offsets,
        frame_size,
        vreg_words: func.var_types.iter().map(register_words).collect(),
        insts: Vec::new(),
        span: None,
    };

    let mut blocks = Vec::with_capacity(func.blocks.len());
    for id in graph::reverse_postorder(func) {
        let block = func.block(id);
        for (instr, span) in block.body.iter().zip(&block.spans) {
            selector.span = *span;
            selector.select_instr(instr)?;
        }
        selector.span = None;
        selector.select_terminator(&block.terminator);
        blocks.push(MachineBlock {
            id,
            insts: std::mem::take(&mut selector.insts),
        });
    }

    trace!(
        function = func.name.raw(),
        immediates = selector.immediates.len(),
        fused = selector.fused.len(),
        "selected instructions"
    );
    Ok(Selected {
        name: cx.interner.lookup(func.name).to_owned(),
        params: func.params.iter().map(|p| virtual_reg(*p)).collect(),
        blocks,
        frame_size: selector.frame_size,
        vreg_words: selector.vreg_words,
    })
}

struct Selector<'a, 'd> {
    func: &'a Function,
    cx: &'a ModuleContext<'a>,
    data: &'d mut DataTable,
    consts: FxHashMap<VarId, Const>,
    immediates: FxHashSet<VarId>,
    /// Comparisons folded into their block's branch.
    fused: FxHashMap<VarId, (BinaryOp, VarId, VarId)>,
    slot_offsets: Vec<u32>,
    frame_size: u32,
    vreg_words: Vec<u64>,
    insts: Vec<MInst>,
    /// Span of the instruction being selected.
    span: Option<Span>,
}

impl Selector<'_, '_> {
    fn emit(&mut self, inst: MInst) {
        self.insts.push(inst);
    }

    fn reg(var: VarId) -> Operand {
        virtual_reg(var)
    }

    fn operand(&self, var: VarId) -> Operand {
        if !self.immediates.contains(&var) {
            return Self::reg(var);
        }
        match self.consts.get(&var) {
            Some(Const::Int(n)) => Operand::Imm(*n),
            Some(Const::Bool(b)) => Operand::Imm(i64::from(*b)),
            other => panic!("immediate %{} has no integer constant: {other:?}", var.raw()),
        }
    }

    fn temp(&mut self, words: u64) -> Operand {
        let raw = u32::try_from(self.vreg_words.len())
            .unwrap_or_else(|_| panic!("virtual register count exceeds u32::MAX"));
        self.vreg_words.push(words);
        Operand::Virtual(VReg::new(raw))
    }

    fn frame_area(&mut self, words: u64) -> u32 {
        let offset = self.frame_size;
        self.frame_size += bytes(words);
        offset
    }

    fn ty(&self, var: VarId) -> &Ty {
        self.func.var_type(var)
    }

    /// Copy `words` of `ty` from `src` into a fresh frame area and point
    /// `dst` at it.
    fn copy_into_temp(&mut self, dst: Operand, ty: &Ty, src: Addr) {
        let words = ty.words();
        let area = self.frame_area(words);
        self.emit(MInst::Copy {
            dst: Addr::Frame(area),
            src,
            words,
        });
        self.emit(MInst::Lea {
            dst,
            addr: Addr::Frame(area),
        });
    }

    /// Store a value of type `ty` to `addr`: a word store for scalars, a
    /// copy for aggregates.
    fn store_value(&mut self, addr: Addr, ty: &Ty, value: VarId) {
        if is_aggregate(ty) {
            self.emit(MInst::Copy {
                dst: addr,
                src: Addr::Based {
                    base: Self::reg(value),
                    offset: 0,
                },
                words: ty.words(),
            });
        } else {
            let src = self.operand(value);
            self.emit(MInst::Store { addr, src });
        }
    }

    fn load_value(&mut self, dst: VarId, addr: Addr) {
        let ty = self.ty(dst).clone();
        if is_aggregate(&ty) {
            self.copy_into_temp(Self::reg(dst), &ty, addr);
        } else {
            self.emit(MInst::Load {
                dst: Self::reg(dst),
                addr,
            });
        }
    }

    fn element(&self, slot: kiln_lir::SlotId) -> (Ty, u32) {
        let Some((elem, _)) = self.func.slot_type(slot).as_array() else {
            panic!("indexed slot ${} does not hold an array", slot.raw());
        };
        (elem.clone(), bytes(elem.words()))
    }

    fn element_addr(&self, slot: kiln_lir::SlotId, index: VarId) -> Addr {
        let base = self.slot_offsets[slot.index()];
        let (_, scale) = self.element(slot);
        match self.operand(index) {
            Operand::Imm(k) => {
                let k = u32::try_from(k).unwrap_or(u32::MAX);
                Addr::Frame(base.saturating_add(scale.saturating_mul(k)))
            }
            index => Addr::FrameIndexed { base, index, scale },
        }
    }

    fn vector_width(&self, var: VarId, instruction: &str) -> Result<u32, CodegenError> {
        let Ty::Vector(_, width) = self.ty(var) else {
            panic!("%{} is not a vector", var.raw());
        };
        if self.cx.target.supports_vector(*width) {
            return Ok(*width);
        }
        Err(CodegenError::UnsupportedOperation {
            function: self.cx.interner.lookup(self.func.name).to_owned(),
            instruction: instruction.to_owned(),
            width: *width,
            target: self.cx.target.name.clone(),
            span: self.span,
        })
    }

    fn convention(&self, callee: Name, conv: CallConv) -> Result<Convention, CodegenError> {
        let program = self.cx.program;
        if program.function(callee).is_none() && program.extern_symbol(callee).is_none() {
            return Err(CodegenError::UnresolvedSymbol {
                function: self.cx.interner.lookup(self.func.name).to_owned(),
                symbol: self.cx.interner.lookup(callee).to_owned(),
                span: self.span,
            });
        }
        Ok(match conv {
            CallConv::Native => Convention::Native,
            CallConv::C { library } => Convention::C {
                library: self.cx.interner.lookup(library).to_owned(),
            },
        })
    }

    fn select_instr(&mut self, instr: &Instr) -> Result<(), CodegenError> {
        match instr {
            Instr::Let { dst, value } => self.select_let(*dst, value),
            Instr::Call {
                dst,
                callee,
                args,
                conv,
                ..
            } => {
                let conv = self.convention(*callee, *conv)?;
                let args = args.iter().map(|a| self.operand(*a)).collect();
                let callee = self.cx.interner.lookup(*callee).to_owned();
                match dst {
                    Some(dst) if is_aggregate(self.ty(*dst)) => {
                        // Aggregates come back by address; take a copy.
                        let ty = self.ty(*dst).clone();
                        let returned = self.temp(1);
                        self.emit(MInst::Call {
                            callee,
                            conv,
                            args,
                            dst: Some(returned),
                        });
                        self.copy_into_temp(
                            Self::reg(*dst),
                            &ty,
                            Addr::Based {
                                base: returned,
                                offset: 0,
                            },
                        );
                    }
                    dst => self.emit(MInst::Call {
                        callee,
                        conv,
                        args,
                        dst: dst.map(Self::reg),
                    }),
                }
            }
            Instr::Load { dst, slot } => {
                self.load_value(*dst, Addr::Frame(self.slot_offsets[slot.index()]));
            }
            Instr::Store { slot, value } => {
                let ty = self.func.slot_type(*slot).clone();
                self.store_value(Addr::Frame(self.slot_offsets[slot.index()]), &ty, *value);
            }
            Instr::LoadGlobal { dst, global } => {
                let addr = Addr::Symbol(self.cx.interner.lookup(*global).to_owned());
                if is_aggregate(self.ty(*dst)) {
                    // Globals are immutable; point straight at them.
                    self.emit(MInst::Lea {
                        dst: Self::reg(*dst),
                        addr,
                    });
                } else {
                    self.emit(MInst::Load {
                        dst: Self::reg(*dst),
                        addr,
                    });
                }
            }
            Instr::IndexLoad { dst, slot, index } => {
                let addr = self.element_addr(*slot, *index);
                self.load_value(*dst, addr);
            }
            Instr::IndexStore { slot, index, value } => {
                let addr = self.element_addr(*slot, *index);
                let (elem, _) = self.element(*slot);
                self.store_value(addr, &elem, *value);
            }
            Instr::BoundsCheck { index, len } => {
                let index = self.operand(*index);
                self.emit(MInst::Check { index, len: *len });
            }
            Instr::MakeArray { dst, elems } | Instr::MakeTuple { dst, elems } => {
                let ty = self.ty(*dst).clone();
                let fields = field_types(&ty, elems.len());
                let area = self.frame_area(ty.words());
                let mut offset = area;
                for (elem, field) in elems.iter().zip(&fields) {
                    self.store_value(Addr::Frame(offset), field, *elem);
                    offset += bytes(field.words());
                }
                self.emit(MInst::Lea {
                    dst: Self::reg(*dst),
                    addr: Addr::Frame(area),
                });
            }
            Instr::Extract { dst, tuple, index } => {
                let Ty::Tuple(fields) = self.ty(*tuple) else {
                    panic!("extract from non-tuple %{}", tuple.raw());
                };
                let skip = usize::try_from(*index).unwrap_or(usize::MAX);
                let offset = bytes(fields.iter().take(skip).map(Ty::words).sum());
                let addr = Addr::Based {
                    base: Self::reg(*tuple),
                    offset,
                };
                self.load_value(*dst, addr);
            }
            Instr::Alloc { dst, size } => {
                let size = self.operand(*size);
                self.emit(MInst::Alloc {
                    dst: Self::reg(*dst),
                    size,
                });
            }
            Instr::Free { ptr } | Instr::Release { ptr } => {
                self.emit(MInst::Free {
                    ptr: Self::reg(*ptr),
                });
            }
            Instr::VecLoad { dst, slot, start } => {
                let width = self.vector_width(*dst, "vload")?;
                let addr = self.lane_addr(*slot, *start);
                self.emit(MInst::VLoad {
                    dst: Self::reg(*dst),
                    addr,
                    width,
                });
            }
            Instr::VecStore { slot, start, value } => {
                let width = self.vector_width(*value, "vstore")?;
                let addr = self.lane_addr(*slot, *start);
                self.emit(MInst::VStore {
                    addr,
                    src: Self::reg(*value),
                    width,
                });
            }
            Instr::VecBinary { dst, op, lhs, rhs } => {
                let width = self.vector_width(*dst, &format!("v{}", op.mnemonic()))?;
                self.emit(MInst::VBinary {
                    op: *op,
                    dst: Self::reg(*dst),
                    lhs: Self::reg(*lhs),
                    rhs: Self::reg(*rhs),
                    width,
                });
            }
        }
        Ok(())
    }

    fn lane_addr(&self, slot: kiln_lir::SlotId, start: u64) -> Addr {
        let (_, scale) = self.element(slot);
        let start = u32::try_from(start).unwrap_or(u32::MAX);
        Addr::Frame(self.slot_offsets[slot.index()].saturating_add(scale.saturating_mul(start)))
    }

    fn select_let(&mut self, dst: VarId, value: &Value) {
        if self.immediates.contains(&dst) || self.fused.contains_key(&dst) {
            return;
        }
        let out = Self::reg(dst);
        match value {
            Value::Const(Const::Int(n)) => self.emit(MInst::Mov {
                dst: out,
                src: Operand::Imm(*n),
            }),
            Value::Const(Const::Bool(b)) => self.emit(MInst::Mov {
                dst: out,
                src: Operand::Imm(i64::from(*b)),
            }),
            Value::Const(Const::Float(bits)) => self.emit(MInst::Mov {
                dst: out,
                src: Operand::Float(*bits),
            }),
            Value::Const(Const::Str(text)) => {
                let label = self.data.label(*text, self.cx.interner);
                self.emit(MInst::Lea {
                    dst: out,
                    addr: Addr::Symbol(label),
                });
            }
            Value::Var(src) => {
                let src = self.operand(*src);
                self.emit(MInst::Mov { dst: out, src });
            }
            Value::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = self.binary_operands(*lhs, *rhs);
                self.emit(MInst::Binary {
                    op: *op,
                    dst: out,
                    lhs,
                    rhs,
                });
            }
            Value::Unary { op, operand } => {
                let src = self.operand(*operand);
                self.emit(MInst::Unary {
                    op: *op,
                    dst: out,
                    src,
                });
            }
            Value::Cast(src) => {
                let src = self.operand(*src);
                let to = self.ty(dst).clone();
                self.emit(MInst::Convert { dst: out, src, to });
            }
        }
    }

    /// Operands of a binary operation with any immediate on the right.
    fn binary_operands(&self, lhs: VarId, rhs: VarId) -> (Operand, Operand) {
        let (lhs, rhs) = (self.operand(lhs), self.operand(rhs));
        if lhs.is_immediate() {
            (rhs, lhs)
        } else {
            (lhs, rhs)
        }
    }

    fn select_terminator(&mut self, terminator: &Terminator) {
        match terminator {
            Terminator::Return(value) => {
                let value = value.map(|v| self.operand(v));
                self.emit(MInst::Ret { value });
            }
            Terminator::Jump { target, args } => {
                if !args.is_empty() {
                    let params = &self.func.block(*target).params;
                    let moves = params
                        .iter()
                        .zip(args)
                        .map(|(param, arg)| (Self::reg(*param), self.operand(*arg)))
                        .collect();
                    self.emit(MInst::ParallelMove { moves });
                }
                self.emit(MInst::Jump { target: *target });
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                if let Some(&(op, lhs, rhs)) = self.fused.get(cond) {
                    let (lhs, rhs) = (self.operand(lhs), self.operand(rhs));
                    self.emit(MInst::CompareBranch {
                        op,
                        lhs,
                        rhs,
                        then_block: *then_block,
                        else_block: *else_block,
                    });
                } else {
                    self.emit(MInst::Branch {
                        cond: Self::reg(*cond),
                        then_block: *then_block,
                        else_block: *else_block,
                    });
                }
            }
            Terminator::Unreachable => self.emit(MInst::Trap),
        }
    }
}

fn virtual_reg(var: VarId) -> Operand {
    Operand::Virtual(VReg::new(var.raw()))
}

fn is_aggregate(ty: &Ty) -> bool {
    matches!(ty, Ty::Array(..) | Ty::Tuple(_))
}

/// Words a register holding a value of `ty` spills to. Aggregates are
/// held by address.
fn register_words(ty: &Ty) -> u64 {
    match ty {
        Ty::Vector(_, width) => u64::from(*width),
        _ => 1,
    }
}

fn bytes(words: u64) -> u32 {
    u32::try_from(words.saturating_mul(u64::from(WORD))).unwrap_or(u32::MAX)
}

fn field_types(ty: &Ty, count: usize) -> Vec<Ty> {
    match ty {
        Ty::Array(elem, _) => vec![(**elem).clone(); count],
        Ty::Tuple(fields) => fields.clone(),
        other => panic!("aggregate literal of type {other}"),
    }
}

/// Constant defined by each `Let`.
fn let_constants(func: &Function) -> FxHashMap<VarId, Const> {
    func.blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(|instr| match instr {
            Instr::Let {
                dst,
                value: Value::Const(c),
            } => Some((*dst, *c)),
            _ => None,
        })
        .collect()
}

fn is_commutative(op: BinaryOp) -> bool {
    matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Mul
            | BinaryOp::Eq
            | BinaryOp::NotEq
            | BinaryOp::And
            | BinaryOp::Or
            | BinaryOp::BitAnd
            | BinaryOp::BitOr
            | BinaryOp::BitXor
    )
}

/// Integer and boolean constants every use of which accepts an immediate.
fn immediates(func: &Function, consts: &FxHashMap<VarId, Const>) -> FxHashSet<VarId> {
    let candidates: FxHashSet<VarId> = consts
        .iter()
        .filter(|(_, c)| matches!(c, Const::Int(_) | Const::Bool(_)))
        .map(|(v, _)| *v)
        .collect();

    let mut blocked: FxHashSet<VarId> = FxHashSet::default();
    for block in &func.blocks {
        for instr in &block.body {
            let accepted = immediate_positions(instr, &candidates);
            blocked.extend(instr.uses().into_iter().filter(|v| !accepted.contains(v)));
        }
        blocked.extend(block.terminator.uses());
    }
    candidates.difference(&blocked).copied().collect()
}

/// Operands of `instr` that may be immediates.
fn immediate_positions(instr: &Instr, candidates: &FxHashSet<VarId>) -> Vec<VarId> {
    match instr {
        Instr::Let {
            value: Value::Binary { op, lhs, rhs },
            ..
        } => {
            if lhs == rhs {
                Vec::new()
            } else if is_commutative(*op) && !candidates.contains(rhs) {
                vec![*lhs, *rhs]
            } else {
                vec![*rhs]
            }
        }
        Instr::Let {
            value: Value::Var(src),
            ..
        } => vec![*src],
        Instr::Store { value, .. } => vec![*value],
        Instr::IndexLoad { index, .. } | Instr::BoundsCheck { index, .. } => vec![*index],
        Instr::IndexStore { index, value, .. } => vec![*index, *value],
        Instr::MakeArray { elems, .. } | Instr::MakeTuple { elems, .. } => elems.clone(),
        _ => Vec::new(),
    }
}

/// Comparisons whose only use is the branch ending their block.
fn fused_compares(func: &Function, uses: &[u32]) -> FxHashMap<VarId, (BinaryOp, VarId, VarId)> {
    let mut fused = FxHashMap::default();
    for block in &func.blocks {
        let Terminator::Branch { cond, .. } = block.terminator else {
            continue;
        };
        if uses[cond.index()] != 1 {
            continue;
        }
        let compare = block.body.iter().find_map(|instr| match instr {
            Instr::Let {
                dst,
                value: Value::Binary { op, lhs, rhs },
            } if *dst == cond && op.is_comparison() => Some((*op, *lhs, *rhs)),
            _ => None,
        });
        if let Some(compare) = compare {
            fused.insert(cond, compare);
        }
    }
    fused
}
