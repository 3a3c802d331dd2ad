//! Control flow lowering: bodies, conditionals, loops, jumps and the
//! scoped constructs that owe work on exit.
//!
//! Loops follow one shape so the optimizer can find them again:
//!
//! ```text
//! preheader -> header -(cond)-> body ... -> latch -> header
//!                     \-> exit
//! ```
//!
//! Every loop is recorded in [`Function::loops`](crate::ir::Function),
//! inner loops before outer ones.

use kiln_ir::{BinaryOp, Expr, ExprKind, Literal, Name, ResourceBinding, Span};

use super::scope::{ExitAction, LoopContext};
use super::{FnLowerer, Internal, LowerResult, LowerWarning, LowerWarningKind, StatementRest};
use crate::ir::{BlockId, Induction, LoopInfo, SlotId, Ty, VarId};

impl FnLowerer<'_, '_> {
    /// Lower a sequence of forms; the value is the last form's.
    pub(super) fn lower_body(&mut self, body: &[Expr]) -> LowerResult<Option<VarId>> {
        let mut value = None;
        for (i, expr) in body.iter().enumerate() {
            if self.builder.is_terminated() {
                return Ok(None);
            }
            let is_last = i + 1 == body.len();
            value = self.lower_statement(expr, StatementRest::Slice(&body[i + 1..]), is_last)?;
        }
        Ok(if self.builder.is_terminated() {
            None
        } else {
            value
        })
    }

    /// Lower one form of a body, tracking allocations the rest of the body
    /// never frees.
    pub(super) fn lower_statement(
        &mut self,
        expr: &Expr,
        rest: StatementRest<'_>,
        is_last: bool,
    ) -> LowerResult<Option<VarId>> {
        match &expr.kind {
            ExprKind::VarDecl { name, init, .. } | ExprKind::ConstDecl { name, init, .. }
                if matches!(init.kind, ExprKind::Alloc(_)) =>
            {
                if let Some(slot) = self.lower_decl(*name, init, expr.span)? {
                    if !released_later(*name, rest) {
                        let name = self.lookup(*name).to_string();
                        self.implicit_release(slot, init.span, Some(name));
                    }
                }
                Ok(None)
            }
            ExprKind::Alloc(_) if !is_last => {
                if let Some(ptr) = self.lower_expr(expr)? {
                    let slot = self.builder.spill_to_slot(ptr, None);
                    self.implicit_release(slot, expr.span, None);
                }
                Ok(None)
            }
            _ => self.lower_expr(expr),
        }
    }

    fn implicit_release(&mut self, slot: SlotId, span: Span, name: Option<String>) {
        self.module.warn(LowerWarning {
            span,
            kind: LowerWarningKind::ImplicitRelease { name },
        });
        self.scopes.add_exit(ExitAction::Release(slot));
    }

    /// Run `f` in a fresh frame, then the frame's exit actions if control
    /// falls out of it.
    pub(super) fn in_scope(
        &mut self,
        f: impl FnOnce(&mut Self) -> LowerResult<Option<VarId>>,
    ) -> LowerResult<Option<VarId>> {
        self.scopes.push();
        let result = f(self);
        let exits = self.scopes.pop();
        if result.is_ok() && !self.builder.is_terminated() {
            self.emit_exit_actions(&exits);
        }
        result
    }

    // Conditionals

    pub(super) fn lower_if(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
    ) -> LowerResult<Option<VarId>> {
        let Some(cond) = self.lower_operand(cond)? else {
            return Ok(None);
        };
        let result_ty = match else_branch {
            Some(_) => self.expr_ty(expr)?,
            None => Ty::None,
        };

        let then_block = self.builder.new_block();
        let else_block = self.builder.new_block();
        let join = self.builder.new_block();
        let param = (!result_ty.is_none()).then(|| self.builder.add_block_param(join, result_ty));
        self.builder.terminate_branch(cond, then_block, else_block);

        for (block, branch) in [(then_block, Some(then_branch)), (else_block, else_branch)] {
            self.builder.position_at(block);
            let value = match branch {
                Some(branch) => {
                    self.in_scope(|this| this.lower_statement(branch, StatementRest::Slice(&[]), true))?
                }
                None => None,
            };
            if self.builder.is_terminated() {
                continue;
            }
            let args = match (param, value) {
                (None, _) => Vec::new(),
                (Some(_), Some(value)) => vec![value],
                (Some(_), None) => {
                    return Err(Internal::new(expr.span, "branch of a valued `if` has no value"));
                }
            };
            self.builder.terminate_jump(join, args);
        }

        self.builder.position_at(join);
        if !self.builder.has_predecessor(join) {
            self.builder.terminate_unreachable();
            return Ok(None);
        }
        Ok(param)
    }

    // Loops

    pub(super) fn lower_while(
        &mut self,
        cond: &Expr,
        body: &[Expr],
        is_async: bool,
        span: Span,
    ) -> LowerResult<Option<VarId>> {
        let preheader = self.enter_preheader();
        let header = self.builder.new_block();
        let body_block = self.builder.new_block();
        let latch = self.builder.new_block();
        let exit = self.builder.new_block();
        let first_inner = self.builder.block_count();
        self.builder.terminate_jump(header, Vec::new());

        self.builder.position_at(header);
        let Some(cond) = self.lower_operand(cond)? else {
            return Ok(None);
        };
        self.builder.terminate_branch(cond, body_block, exit);

        self.builder.position_at(body_block);
        self.lower_loop_body(body, latch, exit)?;

        self.builder.position_at(latch);
        if is_async {
            self.runtime_call("rt_yield", Vec::new(), Some(span));
        }
        self.builder.terminate_jump(header, Vec::new());

        let mut blocks = vec![header, body_block, latch];
        blocks.extend(self.blocks_since(first_inner));
        self.finish_loop(preheader, header, latch, exit, blocks, None);
        Ok(None)
    }

    pub(super) fn lower_for(
        &mut self,
        init: &Expr,
        cond: &Expr,
        step: &Expr,
        body: &[Expr],
    ) -> LowerResult<Option<VarId>> {
        self.in_scope(|this| {
            let counter = match &init.kind {
                ExprKind::VarDecl { name, init: start, .. } => this.lower_decl(*name, start, init.span)?,
                _ => {
                    this.lower_expr(init)?;
                    None
                }
            };
            if this.builder.is_terminated() {
                return Ok(None);
            }

            let preheader = this.enter_preheader();
            let header = this.builder.new_block();
            let body_block = this.builder.new_block();
            let latch = this.builder.new_block();
            let exit = this.builder.new_block();
            let first_inner = this.builder.block_count();
            this.builder.terminate_jump(header, Vec::new());

            this.builder.position_at(header);
            let Some(cond_var) = this.lower_operand(cond)? else {
                return Ok(None);
            };
            this.builder.terminate_branch(cond_var, body_block, exit);

            this.builder.position_at(body_block);
            this.lower_loop_body(body, latch, exit)?;

            this.builder.position_at(latch);
            this.lower_expr(step)?;
            let back_edge = this.builder.current_block();
            if !this.builder.is_terminated() {
                this.builder.terminate_jump(header, Vec::new());
            }

            let mut blocks = vec![header, body_block, latch];
            blocks.extend(this.blocks_since(first_inner));
            let induction = counter
                .filter(|slot| this.builder.slot_type(*slot).is_int())
                .and_then(|slot| detect_induction(slot, init, cond, step, body));
            this.finish_loop(preheader, header, back_edge, exit, blocks, induction);
            Ok(None)
        })
    }

    pub(super) fn lower_loop(&mut self, body: &[Expr]) -> LowerResult<Option<VarId>> {
        let preheader = self.enter_preheader();
        let header = self.builder.new_block();
        let latch = self.builder.new_block();
        let exit = self.builder.new_block();
        let first_inner = self.builder.block_count();
        self.builder.terminate_jump(header, Vec::new());

        self.builder.position_at(header);
        self.lower_loop_body(body, latch, exit)?;

        self.builder.position_at(latch);
        self.builder.terminate_jump(header, Vec::new());

        let mut blocks = vec![header, latch];
        blocks.extend(self.blocks_since(first_inner));
        self.finish_loop(preheader, header, latch, exit, blocks, None);
        Ok(None)
    }

    /// Jump from the current block into a fresh preheader and position
    /// there. The caller terminates it with the jump to the header.
    fn enter_preheader(&mut self) -> BlockId {
        let preheader = self.builder.new_block();
        self.builder.terminate_jump(preheader, Vec::new());
        self.builder.position_at(preheader);
        preheader
    }

    /// Lower a loop body in its own frame, with `break` and `continue`
    /// bound to `exit` and `latch`.
    fn lower_loop_body(&mut self, body: &[Expr], latch: BlockId, exit: BlockId) -> LowerResult<()> {
        let prev_loop = self.loop_ctx.replace(LoopContext {
            latch,
            exit,
            depth: self.scopes.depth(),
        });
        let result = self.in_scope(|this| this.lower_body(body));
        self.loop_ctx = prev_loop;
        result?;
        if !self.builder.is_terminated() {
            self.builder.terminate_jump(latch, Vec::new());
        }
        Ok(())
    }

    fn blocks_since(&self, first: usize) -> impl Iterator<Item = BlockId> {
        let end = self.builder.block_count();
        (first..end).map(|i| BlockId::new(u32::try_from(i).unwrap_or(u32::MAX)))
    }

    /// Record the loop and continue lowering at its exit.
    fn finish_loop(
        &mut self,
        preheader: BlockId,
        header: BlockId,
        latch: BlockId,
        exit: BlockId,
        blocks: Vec<BlockId>,
        induction: Option<Induction>,
    ) {
        self.builder.push_loop(LoopInfo {
            preheader,
            header,
            latch,
            exit,
            blocks,
            induction,
        });
        self.builder.position_at(exit);
        if !self.builder.has_predecessor(exit) {
            self.builder.terminate_unreachable();
        }
    }

    // Jumps

    fn loop_context(&self, span: Span, form: &str) -> LowerResult<LoopContext> {
        self.loop_ctx
            .ok_or_else(|| Internal::new(span, format!("`{form}` outside of a loop")))
    }

    pub(super) fn lower_break(&mut self, span: Span) -> LowerResult<Option<VarId>> {
        let ctx = self.loop_context(span, "break")?;
        let exits = self.scopes.exits_from(ctx.depth);
        self.emit_exit_actions(&exits);
        self.builder.terminate_jump(ctx.exit, Vec::new());
        Ok(None)
    }

    pub(super) fn lower_continue(&mut self, span: Span) -> LowerResult<Option<VarId>> {
        let ctx = self.loop_context(span, "continue")?;
        let exits = self.scopes.exits_from(ctx.depth);
        self.emit_exit_actions(&exits);
        self.builder.terminate_jump(ctx.latch, Vec::new());
        Ok(None)
    }

    pub(super) fn lower_return(&mut self, value: Option<&Expr>, span: Span) -> LowerResult<Option<VarId>> {
        let value = match value {
            Some(value) => {
                let var = self.lower_expr(value)?;
                if self.builder.is_terminated() {
                    return Ok(None);
                }
                var
            }
            None => None,
        };
        let exits = self.scopes.exits_from(0);
        self.emit_exit_actions(&exits);
        if self.builder.func().return_ty.is_none() {
            self.builder.terminate_return(None);
        } else {
            let value = value.ok_or_else(|| Internal::new(span, "`return` without a value"))?;
            self.builder.terminate_return(Some(value));
        }
        Ok(None)
    }

    // Scoped runtime constructs

    pub(super) fn lower_with_resources(
        &mut self,
        bindings: &[ResourceBinding],
        body: &[Expr],
    ) -> LowerResult<Option<VarId>> {
        self.in_scope(|this| {
            for binding in bindings {
                let Some(ptr) = this.lower_operand(&binding.init)? else {
                    return Ok(None);
                };
                let slot = this.builder.new_slot(Some(binding.name), Ty::Ptr);
                this.builder.emit_store(slot, ptr, Some(binding.span));
                this.scopes.bind(binding.name, slot);
                this.scopes.add_exit(ExitAction::Release(slot));
            }
            this.lower_body(body)
        })
    }

    /// `[atomic ...]` brackets its body with runtime calls; the closing
    /// call runs on every way out.
    pub(super) fn lower_atomic(&mut self, body: &[Expr], span: Span) -> LowerResult<Option<VarId>> {
        self.runtime_call("rt_atomic_begin", Vec::new(), Some(span));
        self.in_scope(|this| {
            this.scopes.add_exit(ExitAction::RuntimeCall("rt_atomic_end"));
            this.lower_body(body)
        })
    }
}

/// Whether the forms after `[var name [alloc ...]]` free the allocation
/// or hand it on.
fn released_later(name: Name, rest: StatementRest<'_>) -> bool {
    let is_name = |e: &Expr| matches!(e.kind, ExprKind::Ident(n) if n == name);
    rest.last().is_some_and(is_name)
        || rest.any(&mut |e: &Expr| match &e.kind {
            ExprKind::Free(ptr) | ExprKind::Return(Some(ptr)) => is_name(ptr),
            ExprKind::Set { value, .. }
            | ExprKind::VarDecl { init: value, .. }
            | ExprKind::ConstDecl { init: value, .. } => is_name(value),
            _ => false,
        })
}

/// Counted-loop pattern:
/// `[for [var i A] [cmp i B] [set i [+ i S]] body]` with literal `A`,
/// `B` and `S` (`-` for a negative step) and no other write to `i`.
fn detect_induction(slot: SlotId, init: &Expr, cond: &Expr, step: &Expr, body: &[Expr]) -> Option<Induction> {
    let ExprKind::VarDecl { name, init: start, .. } = &init.kind else {
        return None;
    };
    let name = *name;
    let is_counter = |e: &Expr| matches!(e.kind, ExprKind::Ident(n) if n == name);
    let int_literal = |e: &Expr| match e.kind {
        ExprKind::Literal(Literal::Int(n)) => Some(n),
        _ => None,
    };

    let start = int_literal(start)?;
    let ExprKind::Binary { op: cmp, lhs, rhs } = &cond.kind else {
        return None;
    };
    if !matches!(
        cmp,
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq | BinaryOp::NotEq
    ) || !is_counter(lhs)
    {
        return None;
    }
    let bound = int_literal(rhs)?;

    let ExprKind::Set { name: stepped, value } = &step.kind else {
        return None;
    };
    let ExprKind::Binary {
        op,
        lhs: step_lhs,
        rhs: step_rhs,
    } = &value.kind
    else {
        return None;
    };
    if *stepped != name || !is_counter(step_lhs) {
        return None;
    }
    let amount = int_literal(step_rhs)?;
    let step = match op {
        BinaryOp::Add => amount,
        BinaryOp::Sub => amount.checked_neg()?,
        _ => return None,
    };

    let written_in_body = body.iter().any(|e| {
        e.any(&mut |e: &Expr| matches!(&e.kind, ExprKind::Set { name: n, .. } if *n == name))
    });
    if written_in_body {
        return None;
    }
    Some(Induction {
        slot,
        init: start,
        bound,
        step,
        cmp: *cmp,
    })
}
