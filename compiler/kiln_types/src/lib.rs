//! Type system and semantic analysis for Kiln.
//!
//! - [`Type`]: structural semantic types; array length and tuple arity are
//!   part of a type's identity
//! - [`SymbolTable`]: lexical scope frames with shadowing rules
//! - [`check_module`]: two-pass checker producing a [`TypeCheckResult`]
//!
//! Checking never mutates the AST. Resolved types, generic instantiations,
//! tail calls and dynamic indices are recorded in side tables keyed by
//! [`ExprId`](kiln_ir::ExprId).

mod check;
mod consts;
mod output;
mod problem;
mod symbols;
mod ty;
mod unify;

pub use check::{check_module, check_module_with_imports, collect_signatures};
pub use consts::ConstValue;
pub use output::{FnKind, FunctionSig, GlobalConst, Instantiation, TypeCheckResult};
pub use problem::{ProblemKind, TypeProblem, TypeWarning, WarningKind};
pub use symbols::{Declared, Mutability, Storage, Symbol, SymbolError, SymbolTable};
pub use ty::{Len, SizedBase, Type, TypeDisplay};
pub use unify::{Binding, Substitution, UnifyError};
