//! Kiln IR - front-end data types shared by every compiler stage.
//!
//! This crate contains:
//! - Spans for source locations
//! - Names for interned identifiers
//! - Tokens and `TokenList` for lexer output
//! - AST nodes (`Module`, `Item`, `Expr`)
//! - Parsed type annotations
//! - Builtin operators and the precedence table
//!
//! Literal fractions are stored as `u64` bits so tokens stay `Eq + Hash`.
//! Strings and identifiers use interned `Name`s for O(1) equality.

pub mod ast;
mod name;
mod ops;
mod parsed_type;
mod span;
mod token;

pub use ast::{
    ConstItem, Expr, ExprId, ExprKind, ExternDecl, ExternFunc, FuncDecl, Item, Literal, Module,
    ModuleDecl, MutexOp, OperatorDecl, Param, ResourceBinding,
};
pub use name::{Name, SharedInterner, StringInterner};
pub use ops::{Assoc, BinaryOp, OperatorInfo, OperatorKind, OperatorTable, UnaryOp};
pub use parsed_type::{LenExpr, TypeExpr};
pub use span::Span;
pub use token::{Token, TokenKind, TokenList};
