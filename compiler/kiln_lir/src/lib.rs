//! Typed intermediate representation and optimizer for Kiln.
//!
//! This crate provides:
//!
//! - **IR** ([`Function`], [`Block`], [`Instr`], [`Terminator`]): typed
//!   basic blocks with block parameters, stack slots for source locals and
//!   loop metadata recorded at construction.
//!
//! - **Lowering** ([`lower_module`]): checked AST to IR, including
//!   monomorphisation of generic functions and implicit release of
//!   allocations that are never freed.
//!
//! - **Verification** ([`verify_function`], [`verify_program`]): the
//!   structural and typing invariants every pass must preserve.
//!
//! - **Passes** ([`passes`]): constant folding, loop-invariant code motion,
//!   unrolling, vectorisation, dead store elimination and tail call
//!   optimisation, driven by a [`PassConfig`].
//!
//! - **Text form**: every function prints (`func.display(&interner)`) to a
//!   text form that [`read_function`] parses back to an equal function.
//!
//! # Crate Dependencies
//!
//! `kiln_lir` depends on `kiln_types` for checked types and signatures and
//! on `kiln_ir` for names, spans and operators. It knows nothing about
//! target machines.

pub mod graph;
pub mod ir;
pub mod lower;
pub mod passes;
mod print;
mod read;
mod verify;

#[cfg(test)]
mod test_helpers;

pub use ir::{
    Block, BlockId, CallConv, Const, ExternSymbol, Function, FunctionFlags, Global, Induction,
    Instr, LoopInfo, Program, Slot, SlotId, Terminator, Ty, Value, VarId,
};
pub use lower::{
    lower_module, LowerOutput, LowerProblem, LowerWarning, LowerWarningKind, RUNTIME_LIBRARY,
    TOPLEVEL_FUNCTION,
};
pub use passes::{optimize_function, optimize_program, PassConfig, PassStats};
pub use print::{FunctionDisplay, ProgramDisplay};
pub use read::{parse_ty, read_function, ReadError};
pub use verify::{verify_function, verify_program, VerifyError};
