//! Block-at-a-time function construction.

use kiln_ir::{Name, Span};

use crate::ir::{
    BlockId, CallConv, Function, Instr, LoopInfo, SlotId, Terminator, Ty, Value, VarId,
};

/// Builder for an in-progress function.
///
/// Position at a block, emit instructions, terminate. A block counts as
/// terminated once one of the `terminate_*` methods ran on it; emitting
/// into a terminated block is a lowering bug.
pub(crate) struct FunctionBuilder {
    func: Function,
    current: BlockId,
    terminated: Vec<bool>,
}

impl FunctionBuilder {
    pub(crate) fn new(name: Name, return_ty: Ty) -> Self {
        FunctionBuilder {
            func: Function::new(name, return_ty),
            current: BlockId::new(0),
            terminated: vec![false],
        }
    }

    pub(crate) fn func(&self) -> &Function {
        &self.func
    }

    pub(crate) fn func_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    // Blocks

    pub(crate) fn new_block(&mut self) -> BlockId {
        self.terminated.push(false);
        self.func.new_block()
    }

    pub(crate) fn position_at(&mut self, block: BlockId) {
        debug_assert!(
            block.index() < self.func.blocks.len(),
            "bb{} out of bounds",
            block.raw()
        );
        self.current = block;
    }

    #[inline]
    pub(crate) fn current_block(&self) -> BlockId {
        self.current
    }

    #[inline]
    pub(crate) fn is_terminated(&self) -> bool {
        self.terminated[self.current.index()]
    }

    pub(crate) fn block_count(&self) -> usize {
        self.func.blocks.len()
    }

    // Variables and slots

    pub(crate) fn fresh_var(&mut self, ty: Ty) -> VarId {
        self.func.fresh_var(ty)
    }

    pub(crate) fn add_block_param(&mut self, block: BlockId, ty: Ty) -> VarId {
        let var = self.func.fresh_var(ty);
        self.func.block_mut(block).params.push(var);
        var
    }

    pub(crate) fn new_slot(&mut self, name: Option<Name>, ty: Ty) -> SlotId {
        self.func.new_slot(name, ty)
    }

    pub(crate) fn slot_type(&self, slot: SlotId) -> &Ty {
        self.func.slot_type(slot)
    }

    pub(crate) fn var_type(&self, var: VarId) -> &Ty {
        self.func.var_type(var)
    }

    // Instructions

    pub(crate) fn emit(&mut self, instr: Instr, span: Option<Span>) {
        debug_assert!(
            !self.is_terminated(),
            "emitting into terminated bb{}",
            self.current.raw()
        );
        self.func.block_mut(self.current).push(instr, span);
    }

    pub(crate) fn emit_let(&mut self, ty: Ty, value: Value, span: Option<Span>) -> VarId {
        let dst = self.fresh_var(ty);
        self.emit(Instr::Let { dst, value }, span);
        dst
    }

    pub(crate) fn emit_load(&mut self, slot: SlotId, span: Option<Span>) -> VarId {
        let dst = self.fresh_var(self.slot_type(slot).clone());
        self.emit(Instr::Load { dst, slot }, span);
        dst
    }

    pub(crate) fn emit_store(&mut self, slot: SlotId, value: VarId, span: Option<Span>) {
        self.emit(Instr::Store { slot, value }, span);
    }

    /// Store `value` into a fresh anonymous slot.
    pub(crate) fn spill_to_slot(&mut self, value: VarId, span: Option<Span>) -> SlotId {
        let slot = self.new_slot(None, self.var_type(value).clone());
        self.emit_store(slot, value, span);
        slot
    }

    pub(crate) fn emit_call(
        &mut self,
        callee: Name,
        args: Vec<VarId>,
        conv: CallConv,
        ret: Ty,
        tail: bool,
        span: Option<Span>,
    ) -> Option<VarId> {
        let dst = (!ret.is_none()).then(|| self.fresh_var(ret));
        self.emit(
            Instr::Call {
                dst,
                callee,
                args,
                conv,
                tail,
            },
            span,
        );
        dst
    }

    // Terminators

    fn terminate(&mut self, terminator: Terminator) {
        debug_assert!(
            !self.is_terminated(),
            "bb{} already terminated",
            self.current.raw()
        );
        self.func.block_mut(self.current).terminator = terminator;
        self.terminated[self.current.index()] = true;
    }

    pub(crate) fn terminate_return(&mut self, value: Option<VarId>) {
        self.terminate(Terminator::Return(value));
    }

    pub(crate) fn terminate_jump(&mut self, target: BlockId, args: Vec<VarId>) {
        self.terminate(Terminator::Jump { target, args });
    }

    pub(crate) fn terminate_branch(&mut self, cond: VarId, then_block: BlockId, else_block: BlockId) {
        self.terminate(Terminator::Branch {
            cond,
            then_block,
            else_block,
        });
    }

    pub(crate) fn terminate_unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    /// Whether any terminated block jumps or branches to `block`.
    pub(crate) fn has_predecessor(&self, block: BlockId) -> bool {
        self.func
            .blocks
            .iter()
            .zip(&self.terminated)
            .any(|(b, done)| *done && b.terminator.successors().contains(&block))
    }

    pub(crate) fn push_loop(&mut self, info: LoopInfo) {
        self.func.loops.push(info);
    }

    /// Finish the function. Blocks left open end in `Unreachable`.
    pub(crate) fn finish(self) -> Function {
        let open = self.terminated.iter().filter(|done| !**done).count();
        if open > 0 {
            tracing::trace!(open, "unterminated blocks end in unreachable");
        }
        self.func
    }
}
