//! IR verifier.
//!
//! Checks CFG well-formedness, SSA definitions and operand types. Passes
//! run it after every transformation in debug builds.

use kiln_ir::{BinaryOp, UnaryOp};
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::graph::DominatorTree;
use crate::ir::{BlockId, CallConv, Const, Function, Instr, Program, Terminator, Ty, Value, VarId};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{}{message}", .block.map(|b| format!("bb{}: ", b.raw())).unwrap_or_default())]
pub struct VerifyError {
    pub block: Option<BlockId>,
    pub message: String,
}

/// Where a variable is defined: block and position (`None` for a block
/// parameter).
type DefSite = (BlockId, Option<usize>);

struct Verifier<'a> {
    func: &'a Function,
    block: Option<BlockId>,
}

impl Verifier<'_> {
    fn fail<T>(&self, message: impl Into<String>) -> Result<T, VerifyError> {
        Err(VerifyError {
            block: self.block,
            message: message.into(),
        })
    }

    fn ensure(&self, cond: bool, message: impl FnOnce() -> String) -> Result<(), VerifyError> {
        if cond {
            Ok(())
        } else {
            self.fail(message())
        }
    }

    fn ty(&self, var: VarId) -> Result<&Ty, VerifyError> {
        match self.func.var_types.get(var.index()) {
            Some(ty) => Ok(ty),
            None => self.fail(format!("%{} has no type", var.raw())),
        }
    }

    fn slot_ty(&self, slot: crate::ir::SlotId) -> Result<&Ty, VerifyError> {
        match self.func.slots.get(slot.index()) {
            Some(s) => Ok(&s.ty),
            None => self.fail(format!("${} does not exist", slot.raw())),
        }
    }

    fn same(&self, a: VarId, b: VarId) -> Result<(), VerifyError> {
        let (ta, tb) = (self.ty(a)?, self.ty(b)?);
        self.ensure(ta == tb, || {
            format!("%{}: {ta} and %{}: {tb} differ", a.raw(), b.raw())
        })
    }

    fn expect(&self, var: VarId, expected: &Ty) -> Result<(), VerifyError> {
        let ty = self.ty(var)?;
        self.ensure(ty == expected, || {
            format!("%{} has type {ty}, expected {expected}", var.raw())
        })
    }

    fn expect_with(
        &self,
        var: VarId,
        what: &str,
        pred: impl FnOnce(&Ty) -> bool,
    ) -> Result<(), VerifyError> {
        let ty = self.ty(var)?;
        self.ensure(pred(ty), || format!("%{} has type {ty}, expected {what}", var.raw()))
    }

    fn array_elem(&self, slot: crate::ir::SlotId) -> Result<(&Ty, u64), VerifyError> {
        let ty = self.slot_ty(slot)?;
        match ty.as_array() {
            Some(found) => Ok(found),
            None => self.fail(format!("${} holds {ty}, not an array", slot.raw())),
        }
    }

    fn structure(&mut self) -> Result<(), VerifyError> {
        let func = self.func;
        for (i, block) in func.blocks.iter().enumerate() {
            self.ensure(block.id.index() == i, || {
                format!("block at index {i} has id bb{}", block.id.raw())
            })?;
            self.ensure(block.spans.len() == block.body.len(), || {
                format!("bb{} has {} spans for {} instructions", i, block.spans.len(), block.body.len())
            })?;
        }
        self.ensure(func.entry.index() < func.blocks.len(), || {
            format!("entry bb{} does not exist", func.entry.raw())
        })?;
        self.ensure(func.block(func.entry).params == func.params, || {
            "entry block parameters differ from function parameters".to_owned()
        })?;
        for info in &func.loops {
            let roles = [info.preheader, info.header, info.latch, info.exit];
            for block in roles.iter().chain(&info.blocks) {
                self.ensure(block.index() < func.blocks.len(), || {
                    format!("loop refers to missing bb{}", block.raw())
                })?;
            }
        }
        Ok(())
    }

    fn definitions(&mut self) -> Result<FxHashMap<VarId, DefSite>, VerifyError> {
        let mut defs = FxHashMap::default();
        let func = self.func;
        for block in &func.blocks {
            self.block = Some(block.id);
            let sites = block
                .params
                .iter()
                .map(|p| (*p, None))
                .chain(
                    block
                        .body
                        .iter()
                        .enumerate()
                        .filter_map(|(i, instr)| instr.def().map(|d| (d, Some(i)))),
                );
            for (var, pos) in sites {
                self.ty(var)?;
                if defs.insert(var, (block.id, pos)).is_some() {
                    return self.fail(format!("%{} defined more than once", var.raw()));
                }
            }
        }
        self.block = None;
        Ok(defs)
    }

    fn dominance(&mut self, defs: &FxHashMap<VarId, DefSite>) -> Result<(), VerifyError> {
        let func = self.func;
        let dom = DominatorTree::build(func);
        for block in &func.blocks {
            if !dom.is_reachable(block.id) {
                continue;
            }
            self.block = Some(block.id);
            let uses = block
                .body
                .iter()
                .enumerate()
                .flat_map(|(i, instr)| instr.uses().into_iter().map(move |v| (v, i)))
                .chain(
                    block
                        .terminator
                        .uses()
                        .into_iter()
                        .map(|v| (v, block.body.len())),
                );
            for (var, at) in uses {
                let Some(&(def_block, def_pos)) = defs.get(&var) else {
                    return self.fail(format!("%{} is used but never defined", var.raw()));
                };
                let ok = if def_block == block.id {
                    !matches!(def_pos, Some(pos) if pos >= at)
                } else {
                    dom.dominates(def_block, block.id)
                };
                self.ensure(ok, || {
                    format!("use of %{} is not dominated by its definition", var.raw())
                })?;
            }
        }
        self.block = None;
        Ok(())
    }

    fn instr(&self, instr: &Instr) -> Result<(), VerifyError> {
        match instr {
            Instr::Let { dst, value } => self.value(*dst, value),
            Instr::Call { dst, .. } => match dst {
                Some(dst) => self.expect_with(*dst, "a value", |ty| !ty.is_none()),
                None => Ok(()),
            },
            Instr::Load { dst, slot } => self.expect(*dst, self.slot_ty(*slot)?),
            Instr::Store { slot, value } => self.expect(*value, self.slot_ty(*slot)?),
            Instr::LoadGlobal { .. } => Ok(()),
            Instr::IndexLoad { dst, slot, index } => {
                let (elem, _) = self.array_elem(*slot)?;
                self.expect_with(*index, "an integer", Ty::is_int)?;
                self.expect(*dst, elem)
            }
            Instr::IndexStore { slot, index, value } => {
                let (elem, _) = self.array_elem(*slot)?;
                self.expect_with(*index, "an integer", Ty::is_int)?;
                self.expect(*value, elem)
            }
            Instr::BoundsCheck { index, .. } => self.expect_with(*index, "an integer", Ty::is_int),
            Instr::MakeArray { dst, elems } => {
                let ty = self.ty(*dst)?;
                let Some((elem, len)) = ty.as_array() else {
                    return self.fail(format!("array literal typed {ty}"));
                };
                self.ensure(len == elems.len() as u64, || {
                    format!("{} elements for {ty}", elems.len())
                })?;
                elems.iter().try_for_each(|e| self.expect(*e, elem))
            }
            Instr::MakeTuple { dst, elems } => {
                let found: Vec<Ty> = elems
                    .iter()
                    .map(|e| self.ty(*e).cloned())
                    .collect::<Result<_, _>>()?;
                self.expect(*dst, &Ty::Tuple(found))
            }
            Instr::Extract { dst, tuple, index } => {
                let ty = self.ty(*tuple)?;
                let Ty::Tuple(elems) = ty else {
                    return self.fail(format!("extract from {ty}"));
                };
                match elems.get(*index as usize) {
                    Some(elem) => self.expect(*dst, elem),
                    None => self.fail(format!("element {index} of {ty} does not exist")),
                }
            }
            Instr::Alloc { dst, size } => {
                self.expect_with(*size, "an integer", Ty::is_int)?;
                self.expect(*dst, &Ty::Ptr)
            }
            Instr::Free { ptr } | Instr::Release { ptr } => self.expect(*ptr, &Ty::Ptr),
            Instr::VecLoad { dst, slot, start } => self.vector_access(*dst, *slot, *start),
            Instr::VecStore { slot, start, value } => self.vector_access(*value, *slot, *start),
            Instr::VecBinary { dst, op, lhs, rhs } => {
                self.same(*lhs, *rhs)?;
                self.same(*dst, *lhs)?;
                let ty = self.ty(*dst)?;
                let Ty::Vector(elem, _) = ty else {
                    return self.fail(format!("vector operation on {ty}"));
                };
                self.ensure(
                    matches!(op, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul)
                        || (op.is_bitwise() && elem.is_int()),
                    || format!("`{}` is not a lane-wise operation on {ty}", op.mnemonic()),
                )
            }
        }
    }

    fn vector_access(&self, var: VarId, slot: crate::ir::SlotId, start: u64) -> Result<(), VerifyError> {
        let (elem, len) = self.array_elem(slot)?;
        let ty = self.ty(var)?;
        let Ty::Vector(lane, width) = ty else {
            return self.fail(format!("%{} has type {ty}, expected a vector", var.raw()));
        };
        self.ensure(**lane == *elem, || format!("{ty} lanes differ from {elem}"))?;
        self.ensure(start + u64::from(*width) <= len, || {
            format!("lanes {start}..{} exceed ${} of length {len}", start + u64::from(*width), slot.raw())
        })
    }

    fn value(&self, dst: VarId, value: &Value) -> Result<(), VerifyError> {
        match value {
            Value::Const(c) => self.expect_with(dst, "the constant's type", |ty| match c {
                Const::Int(_) => ty.is_int(),
                Const::Float(_) => ty.is_float(),
                Const::Bool(_) => *ty == Ty::Bool,
                Const::Str(_) => *ty == Ty::Str,
            }),
            Value::Var(src) => self.same(dst, *src),
            Value::Cast(src) => {
                self.expect_with(*src, "a number", Ty::is_numeric)?;
                self.expect_with(dst, "a number", Ty::is_numeric)
            }
            Value::Unary { op, operand } => {
                self.same(dst, *operand)?;
                match op {
                    UnaryOp::Neg => self.expect_with(dst, "a number", Ty::is_numeric),
                    UnaryOp::Not => self.expect(dst, &Ty::Bool),
                    UnaryOp::BitNot => self.expect_with(dst, "an integer", Ty::is_int),
                }
            }
            Value::Binary { op, lhs, rhs } => {
                self.same(*lhs, *rhs)?;
                if op.is_comparison() {
                    self.expect_with(*lhs, "a scalar", Ty::is_scalar)?;
                    self.expect(dst, &Ty::Bool)
                } else if op.is_logical() {
                    self.expect(*lhs, &Ty::Bool)?;
                    self.expect(dst, &Ty::Bool)
                } else if op.is_bitwise() {
                    self.expect_with(*lhs, "an integer", Ty::is_int)?;
                    self.same(dst, *lhs)
                } else {
                    self.expect_with(*lhs, "a number", Ty::is_numeric)?;
                    self.same(dst, *lhs)
                }
            }
        }
    }

    fn terminator(&self, terminator: &Terminator) -> Result<(), VerifyError> {
        let func = self.func;
        let target_exists = |target: BlockId| {
            self.ensure(target.index() < func.blocks.len(), || {
                format!("jump to missing bb{}", target.raw())
            })
        };
        match terminator {
            Terminator::Return(Some(value)) => self.expect(*value, &func.return_ty),
            Terminator::Return(None) => self.ensure(func.return_ty.is_none(), || {
                format!("missing return value of type {}", func.return_ty)
            }),
            Terminator::Jump { target, args } => {
                target_exists(*target)?;
                let params = &func.block(*target).params;
                self.ensure(params.len() == args.len(), || {
                    format!(
                        "bb{} takes {} arguments, {} passed",
                        target.raw(),
                        params.len(),
                        args.len()
                    )
                })?;
                args.iter()
                    .zip(params)
                    .try_for_each(|(arg, param)| self.same(*arg, *param))
            }
            Terminator::Branch {
                cond,
                then_block,
                else_block,
            } => {
                self.expect(*cond, &Ty::Bool)?;
                for target in [*then_block, *else_block] {
                    target_exists(target)?;
                    self.ensure(func.block(target).params.is_empty(), || {
                        format!("branch target bb{} takes parameters", target.raw())
                    })?;
                }
                Ok(())
            }
            Terminator::Unreachable => Ok(()),
        }
    }
}

/// Check one function in isolation.
pub fn verify_function(func: &Function) -> Result<(), VerifyError> {
    let mut verifier = Verifier { func, block: None };
    verifier.structure()?;
    let defs = verifier.definitions()?;
    for block in &func.blocks {
        verifier.block = Some(block.id);
        for instr in &block.body {
            verifier.instr(instr)?;
        }
        verifier.terminator(&block.terminator)?;
    }
    verifier.block = None;
    verifier.dominance(&defs)
}

/// Check every function, then calls and global loads against the
/// program's functions, externs and globals.
pub fn verify_program(program: &Program) -> Result<(), VerifyError> {
    for func in &program.functions {
        verify_function(func)?;
        let verifier = Verifier { func, block: None };
        for block in &func.blocks {
            let verifier = Verifier {
                block: Some(block.id),
                ..verifier
            };
            for instr in &block.body {
                match instr {
                    Instr::Call {
                        dst,
                        callee,
                        args,
                        conv,
                        ..
                    } => {
                        let (params, ret): (Vec<&Ty>, &Ty) =
                            if let Some(callee) = program.function(*callee) {
                                (
                                    callee.params.iter().map(|p| callee.var_type(*p)).collect(),
                                    &callee.return_ty,
                                )
                            } else if let Some(ext) = program.extern_symbol(*callee) {
                                verifier.ensure(
                                    matches!(conv, CallConv::C { .. }) == ext.library.is_some(),
                                    || "calling convention differs from the callee's".to_owned(),
                                )?;
                                (ext.params.iter().collect(), &ext.ret)
                            } else {
                                return verifier.fail("call to an unknown function");
                            };
                        verifier.ensure(params.len() == args.len(), || {
                            format!("{} arguments for {} parameters", args.len(), params.len())
                        })?;
                        for (arg, param) in args.iter().zip(params) {
                            verifier.expect(*arg, param)?;
                        }
                        match dst {
                            Some(dst) => verifier.expect(*dst, ret)?,
                            None => verifier.ensure(ret.is_none(), || {
                                format!("result of type {ret} is dropped")
                            })?,
                        }
                    }
                    Instr::LoadGlobal { dst, global } => match program.global(*global) {
                        Some(g) => verifier.expect(*dst, &g.ty)?,
                        None => return verifier.fail("load of an unknown global"),
                    },
                    _ => {}
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
