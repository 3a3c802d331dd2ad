//! Expression lowering: values, bindings, element access and calls.

use kiln_ir::{BinaryOp, Expr, ExprKind, Literal, MutexOp, Name, Span, UnaryOp};
use kiln_stack::ensure_sufficient_stack;

use super::scope::ExitAction;
use super::{
    concrete, extern_library, runtime_signature, FnLowerer, Internal, LowerResult, RUNTIME_LIBRARY,
};
use crate::ir::{CallConv, Const, ExternSymbol, Instr, SlotId, Ty, Value, VarId};

impl FnLowerer<'_, '_> {
    /// Lower an expression. Returns its value, or `None` when it has type
    /// `none` or control does not fall out of it.
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> LowerResult<Option<VarId>> {
        ensure_sufficient_stack(|| self.lower_expr_inner(expr))
    }

    /// Lower an expression whose value is needed. `None` means control
    /// left before the value was produced.
    pub(super) fn lower_operand(&mut self, expr: &Expr) -> LowerResult<Option<VarId>> {
        let value = self.lower_expr(expr)?;
        if value.is_none() && !self.builder.is_terminated() {
            return Err(Internal::new(expr.span, "operand has no value"));
        }
        Ok(value)
    }

    fn lower_expr_inner(&mut self, expr: &Expr) -> LowerResult<Option<VarId>> {
        if self.builder.is_terminated() {
            return Ok(None);
        }
        match &expr.kind {
            ExprKind::Literal(lit) => self.lower_literal(expr, *lit).map(Some),
            ExprKind::Ident(name) => self.lower_ident(expr, *name).map(Some),
            ExprKind::Call { callee, args } => self.lower_call(expr, *callee, args),
            ExprKind::Binary { op, lhs, rhs } => self.lower_binary(expr, *op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.lower_unary(expr, *op, operand),
            ExprKind::VarDecl { name, init, .. } | ExprKind::ConstDecl { name, init, .. } => {
                self.lower_decl(*name, init, expr.span)?;
                Ok(None)
            }
            ExprKind::Set { name, value } => self.lower_set(*name, value, expr.span),
            ExprKind::SetIndex {
                target,
                index,
                value,
            } => self.lower_set_index(expr, target, index, value),
            ExprKind::Scope(body) => self.in_scope(|this| this.lower_body(body)),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.lower_if(expr, cond, then_branch, else_branch.as_deref()),
            ExprKind::While {
                cond,
                body,
                is_async,
            } => self.lower_while(cond, body, *is_async, expr.span),
            ExprKind::For {
                init,
                cond,
                step,
                body,
            } => self.lower_for(init, cond, step, body),
            ExprKind::Loop(body) => self.lower_loop(body),
            ExprKind::Break => self.lower_break(expr.span),
            ExprKind::Continue => self.lower_continue(expr.span),
            ExprKind::Return(value) => self.lower_return(value.as_deref(), expr.span),
            ExprKind::Index { target, index } => self.lower_index(expr, target, index),
            ExprKind::Array(items) => self.lower_aggregate(expr, items, false),
            ExprKind::Tuple(items) => self.lower_aggregate(expr, items, true),
            ExprKind::Len(target) => self.lower_len(expr, target),
            ExprKind::Alloc(size) => {
                let Some(size) = self.lower_operand(size)? else {
                    return Ok(None);
                };
                let dst = self.builder.fresh_var(Ty::Ptr);
                self.builder.emit(Instr::Alloc { dst, size }, Some(expr.span));
                Ok(Some(dst))
            }
            ExprKind::Free(ptr) => {
                let Some(ptr) = self.lower_operand(ptr)? else {
                    return Ok(None);
                };
                self.builder.emit(Instr::Free { ptr }, Some(expr.span));
                Ok(None)
            }
            ExprKind::WithResources { bindings, body } => self.lower_with_resources(bindings, body),
            ExprKind::Atomic(body) => self.lower_atomic(body, expr.span),
            ExprKind::Mutex { op, handle } => self.lower_mutex(*op, handle.as_deref(), expr.span),
        }
    }

    fn lower_literal(&mut self, expr: &Expr, lit: Literal) -> LowerResult<VarId> {
        let ty = self.expr_ty(expr)?;
        let value = match lit {
            Literal::Int(n) => Const::Int(n),
            Literal::Frac(bits) => Const::Float(bits),
            Literal::Bool(b) => Const::Bool(b),
            Literal::Str(s) => Const::Str(s),
        };
        Ok(self
            .builder
            .emit_let(ty, Value::Const(value), Some(expr.span)))
    }

    fn lower_ident(&mut self, expr: &Expr, name: Name) -> LowerResult<VarId> {
        if let Some(slot) = self.scopes.lookup(name) {
            return Ok(self.builder.emit_load(slot, Some(expr.span)));
        }
        if self.module.result.global(name).is_none() {
            return Err(Internal::new(
                expr.span,
                format!("`{}` is neither local nor global", self.lookup(name)),
            ));
        }
        let ty = self.expr_ty(expr)?;
        let dst = self.builder.fresh_var(ty);
        self.builder
            .emit(Instr::LoadGlobal { dst, global: name }, Some(expr.span));
        Ok(dst)
    }

    fn lower_binary(&mut self, expr: &Expr, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> LowerResult<Option<VarId>> {
        // `and`/`or` evaluate both operands.
        let Some(lhs) = self.lower_operand(lhs)? else {
            return Ok(None);
        };
        let Some(rhs) = self.lower_operand(rhs)? else {
            return Ok(None);
        };
        let ty = self.expr_ty(expr)?;
        Ok(Some(self.builder.emit_let(
            ty,
            Value::Binary { op, lhs, rhs },
            Some(expr.span),
        )))
    }

    fn lower_unary(&mut self, expr: &Expr, op: UnaryOp, operand: &Expr) -> LowerResult<Option<VarId>> {
        let Some(operand) = self.lower_operand(operand)? else {
            return Ok(None);
        };
        let ty = self.expr_ty(expr)?;
        Ok(Some(self.builder.emit_let(
            ty,
            Value::Unary { op, operand },
            Some(expr.span),
        )))
    }

    /// Bind `name` to a fresh slot holding `init`. The name is visible only
    /// after its initialiser.
    pub(super) fn lower_decl(&mut self, name: Name, init: &Expr, span: Span) -> LowerResult<Option<SlotId>> {
        let ty = self.expr_ty(init)?;
        let Some(value) = self.lower_operand(init)? else {
            return Ok(None);
        };
        let slot = self.builder.new_slot(Some(name), ty);
        self.builder.emit_store(slot, value, Some(span));
        self.scopes.bind(name, slot);
        Ok(Some(slot))
    }

    fn lower_set(&mut self, name: Name, value: &Expr, span: Span) -> LowerResult<Option<VarId>> {
        let slot = self.scopes.lookup(name).ok_or_else(|| {
            Internal::new(span, format!("assignment to unbound `{}`", self.lookup(name)))
        })?;
        let Some(value) = self.lower_operand(value)? else {
            return Ok(None);
        };
        self.builder.emit_store(slot, value, Some(span));
        Ok(None)
    }

    // Element access

    fn lower_index(&mut self, expr: &Expr, target: &Expr, index: &Expr) -> LowerResult<Option<VarId>> {
        let target_ty = self.expr_ty(target)?;
        match target_ty {
            Ty::Tuple(_) => {
                let Some(tuple) = self.lower_operand(target)? else {
                    return Ok(None);
                };
                let position = tuple_position(index)?;
                let dst = self.builder.fresh_var(self.expr_ty(expr)?);
                self.builder.emit(
                    Instr::Extract {
                        dst,
                        tuple,
                        index: position,
                    },
                    Some(expr.span),
                );
                Ok(Some(dst))
            }
            Ty::Array(_, len) => {
                let Some(slot) = self.array_slot(target)? else {
                    return Ok(None);
                };
                let Some(index_var) = self.lower_operand(index)? else {
                    return Ok(None);
                };
                self.bounds_check(expr, index_var, len);
                let dst = self.builder.fresh_var(self.expr_ty(expr)?);
                self.builder.emit(
                    Instr::IndexLoad {
                        dst,
                        slot,
                        index: index_var,
                    },
                    Some(expr.span),
                );
                Ok(Some(dst))
            }
            other => Err(Internal::new(
                target.span,
                format!("cannot index a value of type {other}"),
            )),
        }
    }

    /// Slot holding the array `target` evaluates to: the local's own slot,
    /// or a temporary.
    fn array_slot(&mut self, target: &Expr) -> LowerResult<Option<SlotId>> {
        if let ExprKind::Ident(name) = target.kind {
            if let Some(slot) = self.scopes.lookup(name) {
                return Ok(Some(slot));
            }
        }
        let Some(value) = self.lower_operand(target)? else {
            return Ok(None);
        };
        Ok(Some(self.builder.spill_to_slot(value, Some(target.span))))
    }

    /// Emit a runtime bounds check if the checker could not prove the
    /// access in range.
    fn bounds_check(&mut self, access: &Expr, index: VarId, len: u64) {
        if self.module.result.needs_bounds_check(access.id) {
            self.builder
                .emit(Instr::BoundsCheck { index, len }, Some(access.span));
        }
    }

    /// `[set [index ... [index root i0] ... in] value]`.
    ///
    /// Nested rows are copied into temporaries, updated, and written back
    /// outwards. Each index is evaluated once, root side first, then the
    /// value.
    fn lower_set_index(
        &mut self,
        expr: &Expr,
        target: &Expr,
        index: &Expr,
        value: &Expr,
    ) -> LowerResult<Option<VarId>> {
        // (row access, indexed expression, row index), outermost first.
        let mut path: Vec<(&Expr, &Expr, &Expr)> = Vec::new();
        let mut root = target;
        while let ExprKind::Index {
            target: inner,
            index: row_index,
        } = &root.kind
        {
            path.push((root, &**inner, &**row_index));
            root = &**inner;
        }
        path.reverse();

        let ExprKind::Ident(name) = root.kind else {
            return Err(Internal::new(root.span, "element assignment needs a named array"));
        };
        let root_slot = self.scopes.lookup(name).ok_or_else(|| {
            Internal::new(root.span, format!("assignment to unbound `{}`", self.lookup(name)))
        })?;

        let mut row_indices = Vec::with_capacity(path.len());
        for &(access, indexed, row_index) in &path {
            let Some(var) = self.lower_operand(row_index)? else {
                return Ok(None);
            };
            let len = self.array_len(indexed)?;
            self.bounds_check(access, var, len);
            row_indices.push(var);
        }
        let Some(index_var) = self.lower_operand(index)? else {
            return Ok(None);
        };
        let len = self.array_len(target)?;
        self.bounds_check(expr, index_var, len);
        let Some(value) = self.lower_operand(value)? else {
            return Ok(None);
        };

        let span = Some(expr.span);
        let mut slots = vec![root_slot];
        for (&(access, _, _), &row_index) in path.iter().zip(&row_indices) {
            let row = self.builder.fresh_var(self.expr_ty(access)?);
            let parent = slots[slots.len() - 1];
            self.builder.emit(
                Instr::IndexLoad {
                    dst: row,
                    slot: parent,
                    index: row_index,
                },
                span,
            );
            slots.push(self.builder.spill_to_slot(row, span));
        }
        let innermost = slots[slots.len() - 1];
        self.builder.emit(
            Instr::IndexStore {
                slot: innermost,
                index: index_var,
                value,
            },
            span,
        );
        for (level, &row_index) in row_indices.iter().enumerate().rev() {
            let row = self.builder.emit_load(slots[level + 1], span);
            self.builder.emit(
                Instr::IndexStore {
                    slot: slots[level],
                    index: row_index,
                    value: row,
                },
                span,
            );
        }
        Ok(None)
    }

    fn array_len(&self, array: &Expr) -> LowerResult<u64> {
        match self.expr_ty(array)? {
            Ty::Array(_, len) => Ok(len),
            other => Err(Internal::new(
                array.span,
                format!("expected an array, found {other}"),
            )),
        }
    }

    fn lower_aggregate(&mut self, expr: &Expr, items: &[Expr], tuple: bool) -> LowerResult<Option<VarId>> {
        let mut elems = Vec::with_capacity(items.len());
        for item in items {
            let Some(var) = self.lower_operand(item)? else {
                return Ok(None);
            };
            elems.push(var);
        }
        let dst = self.builder.fresh_var(self.expr_ty(expr)?);
        let instr = if tuple {
            Instr::MakeTuple { dst, elems }
        } else {
            Instr::MakeArray { dst, elems }
        };
        self.builder.emit(instr, Some(expr.span));
        Ok(Some(dst))
    }

    fn lower_len(&mut self, expr: &Expr, target: &Expr) -> LowerResult<Option<VarId>> {
        let len = self.array_len(target)?;
        // A named array has nothing to evaluate.
        if !matches!(target.kind, ExprKind::Ident(_)) && self.lower_operand(target)?.is_none() {
            return Ok(None);
        }
        let len = i64::try_from(len)
            .map_err(|_| Internal::new(expr.span, "array length exceeds the integer range"))?;
        Ok(Some(self.builder.emit_let(
            self.expr_ty(expr)?,
            Value::Const(Const::Int(len)),
            Some(expr.span),
        )))
    }

    // Calls

    fn lower_call(&mut self, expr: &Expr, callee: Name, args: &[Expr]) -> LowerResult<Option<VarId>> {
        let result = self.module.result;
        let sig = result.signature(callee).ok_or_else(|| {
            Internal::new(expr.span, format!("no signature for `{}`", self.lookup(callee)))
        })?;

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            let Some(var) = self.lower_operand(arg)? else {
                return Ok(None);
            };
            values.push(var);
        }
        let ret = self.expr_ty(expr)?;
        let is_local = result.signatures.iter().any(|s| s.name == callee);

        let (name, conv) = if let Some(library) = extern_library(sig) {
            let params = sig
                .param_types()
                .map(|ty| concrete(ty, expr.span))
                .collect::<LowerResult<Vec<_>>>()?;
            self.module.register_extern(ExternSymbol {
                name: callee,
                library: Some(library),
                params,
                ret: ret.clone(),
            });
            (callee, CallConv::C { library })
        } else if sig.is_generic() {
            if !is_local {
                return Err(Internal::new(
                    expr.span,
                    format!(
                        "generic `{}` is defined in another unit",
                        self.lookup(callee)
                    ),
                ));
            }
            let inst = result.instantiations.get(&expr.id).ok_or_else(|| {
                Internal::new(expr.span, "generic call without an instantiation")
            })?;
            let subst = inst.subst.compose(&self.subst);
            if !subst.is_concrete() {
                return Err(Internal::new(expr.span, "instantiation is not concrete"));
            }
            (self.module.instantiate(callee, subst), CallConv::Native)
        } else {
            if !is_local {
                let params = sig
                    .param_types()
                    .map(|ty| concrete(ty, expr.span))
                    .collect::<LowerResult<Vec<_>>>()?;
                self.module.register_extern(ExternSymbol {
                    name: callee,
                    library: None,
                    params,
                    ret: ret.clone(),
                });
            }
            (callee, CallConv::Native)
        };

        let tail = result.is_tail_call(expr.id) && name == self.name;
        Ok(self
            .builder
            .emit_call(name, values, conv, ret, tail, Some(expr.span)))
    }

    /// Call a runtime entry point, declaring it on first use.
    pub(super) fn runtime_call(&mut self, symbol: &str, args: Vec<VarId>, span: Option<Span>) -> Option<VarId> {
        let (params, ret) = runtime_signature(symbol);
        let interner = self.module.interner;
        let name = interner.intern(symbol);
        let library = interner.intern(RUNTIME_LIBRARY);
        self.module.register_extern(ExternSymbol {
            name,
            library: Some(library),
            params,
            ret: ret.clone(),
        });
        self.builder
            .emit_call(name, args, CallConv::C { library }, ret, false, span)
    }

    fn lower_mutex(&mut self, op: MutexOp, handle: Option<&Expr>, span: Span) -> LowerResult<Option<VarId>> {
        let mut args = Vec::new();
        if let Some(handle) = handle {
            let Some(var) = self.lower_operand(handle)? else {
                return Ok(None);
            };
            args.push(var);
        }
        Ok(self.runtime_call(op.runtime_symbol(), args, Some(span)))
    }

    /// Run exit actions in order. Emitted code carries no span.
    pub(super) fn emit_exit_actions(&mut self, actions: &[ExitAction]) {
        for action in actions {
            match *action {
                ExitAction::Release(slot) => {
                    let ptr = self.builder.emit_load(slot, None);
                    self.builder.emit(Instr::Release { ptr }, None);
                }
                ExitAction::RuntimeCall(symbol) => {
                    self.runtime_call(symbol, Vec::new(), None);
                }
            }
        }
    }
}

/// Position of a tuple element; the checker only accepts literals.
fn tuple_position(index: &Expr) -> LowerResult<u32> {
    match index.kind {
        ExprKind::Literal(Literal::Int(n)) => u32::try_from(n)
            .map_err(|_| Internal::new(index.span, "tuple index out of range")),
        _ => Err(Internal::new(index.span, "tuple index must be a literal")),
    }
}
