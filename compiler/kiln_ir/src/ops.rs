//! Builtin operators and the operator precedence table.
//!
//! The table is consulted only by the infix sub-parser; prefix forms
//! (`[+ a b]`) never need precedence. Custom operators declared with
//! `[operator sym prec assoc ...]` are registered into the same table.

use rustc_hash::FxHashMap;

use crate::{Name, StringInterner};

/// Builtin binary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 18] = [
        BinaryOp::Add,
        BinaryOp::Sub,
        BinaryOp::Mul,
        BinaryOp::Div,
        BinaryOp::Mod,
        BinaryOp::Eq,
        BinaryOp::NotEq,
        BinaryOp::Lt,
        BinaryOp::LtEq,
        BinaryOp::Gt,
        BinaryOp::GtEq,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::BitAnd,
        BinaryOp::BitOr,
        BinaryOp::BitXor,
        BinaryOp::Shl,
        BinaryOp::Shr,
    ];

    pub fn from_symbol(sym: &str) -> Option<BinaryOp> {
        Some(match sym {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "%" => BinaryOp::Mod,
            "==" => BinaryOp::Eq,
            "!=" => BinaryOp::NotEq,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::LtEq,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::GtEq,
            "&&" => BinaryOp::And,
            "||" => BinaryOp::Or,
            "&" => BinaryOp::BitAnd,
            "|" => BinaryOp::BitOr,
            "^" => BinaryOp::BitXor,
            "<<" => BinaryOp::Shl,
            ">>" => BinaryOp::Shr,
            _ => return None,
        })
    }

    pub fn as_symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }

    /// Mnemonic used by the IR printer and reader.
    pub fn mnemonic(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Sub => "sub",
            BinaryOp::Mul => "mul",
            BinaryOp::Div => "div",
            BinaryOp::Mod => "mod",
            BinaryOp::Eq => "eq",
            BinaryOp::NotEq => "ne",
            BinaryOp::Lt => "lt",
            BinaryOp::LtEq => "le",
            BinaryOp::Gt => "gt",
            BinaryOp::GtEq => "ge",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::BitAnd => "band",
            BinaryOp::BitOr => "bor",
            BinaryOp::BitXor => "bxor",
            BinaryOp::Shl => "shl",
            BinaryOp::Shr => "shr",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<BinaryOp> {
        BinaryOp::ALL.into_iter().find(|op| op.mnemonic() == s)
    }

    /// Builtin infix precedence; higher binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::BitOr => 3,
            BinaryOp::BitXor => 4,
            BinaryOp::BitAnd => 5,
            BinaryOp::Eq | BinaryOp::NotEq => 6,
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => 7,
            BinaryOp::Shl | BinaryOp::Shr => 8,
            BinaryOp::Add | BinaryOp::Sub => 9,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => 10,
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    /// Operators that may trap at runtime (division by zero).
    pub fn may_trap(self) -> bool {
        matches!(self, BinaryOp::Div | BinaryOp::Mod)
    }
}

/// Builtin unary operators.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// `[- x]`
    Neg,
    /// `[! x]`
    Not,
    /// `[~ x]`
    BitNot,
}

impl UnaryOp {
    pub fn from_symbol(sym: &str) -> Option<UnaryOp> {
        match sym {
            "-" => Some(UnaryOp::Neg),
            "!" => Some(UnaryOp::Not),
            "~" => Some(UnaryOp::BitNot),
            _ => None,
        }
    }

    pub fn as_symbol(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
        }
    }

    pub fn mnemonic(self) -> &'static str {
        match self {
            UnaryOp::Neg => "neg",
            UnaryOp::Not => "not",
            UnaryOp::BitNot => "bnot",
        }
    }

    pub fn from_mnemonic(s: &str) -> Option<UnaryOp> {
        match s {
            "neg" => Some(UnaryOp::Neg),
            "not" => Some(UnaryOp::Not),
            "bnot" => Some(UnaryOp::BitNot),
            _ => None,
        }
    }
}

/// Operator associativity.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Assoc {
    Left,
    Right,
}

/// What an infix operator resolves to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Builtin(BinaryOp),
    /// User-declared operator; applied as a call to the operator's symbol.
    Custom,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct OperatorInfo {
    pub precedence: u8,
    pub assoc: Assoc,
    pub kind: OperatorKind,
}

/// Operator precedence table for one compilation unit.
#[derive(Clone, Debug, Default)]
pub struct OperatorTable {
    entries: FxHashMap<Name, OperatorInfo>,
}

impl OperatorTable {
    /// Create a table pre-populated with the builtin binary operators.
    pub fn with_builtins(interner: &StringInterner) -> Self {
        let mut entries = FxHashMap::default();
        for op in BinaryOp::ALL {
            entries.insert(
                interner.intern(op.as_symbol()),
                OperatorInfo {
                    precedence: op.precedence(),
                    assoc: Assoc::Left,
                    kind: OperatorKind::Builtin(op),
                },
            );
        }
        OperatorTable { entries }
    }

    pub fn lookup(&self, sym: Name) -> Option<OperatorInfo> {
        self.entries.get(&sym).copied()
    }

    /// Register a custom operator. Returns `false` if the symbol is already
    /// a builtin, which cannot be redefined.
    pub fn register(&mut self, sym: Name, precedence: u8, assoc: Assoc) -> bool {
        if let Some(existing) = self.entries.get(&sym) {
            if matches!(existing.kind, OperatorKind::Builtin(_)) {
                return false;
            }
        }
        self.entries.insert(
            sym,
            OperatorInfo {
                precedence,
                assoc,
                kind: OperatorKind::Custom,
            },
        );
        true
    }
}
