//! Type annotations as written in source.
//!
//! The parser turns `!array<!int,4>` into a [`TypeExpr`]; the checker
//! resolves it into a semantic type.

use crate::Name;

/// Array length as written: a literal or a generic length variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LenExpr {
    Fixed(u64),
    Var(Name),
}

/// Parsed type annotation.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeExpr {
    Int,
    Frac,
    Bool,
    Str,
    Ptr,
    None,
    /// `!int<bits>`
    SizedInt(u32),
    /// `!frac<bits>`
    SizedFrac(u32),
    /// `!array<T,N>`
    Array(Box<TypeExpr>, LenExpr),
    /// `!tuple<T,...>`
    Tuple(Vec<TypeExpr>),
    /// `!fn<P,... -> R>`
    Fn(Vec<TypeExpr>, Box<TypeExpr>),
    /// Generic type variable (`!T`).
    Var(Name),
}

impl TypeExpr {
    /// Whether the annotation mentions a type or length variable.
    pub fn is_generic(&self) -> bool {
        match self {
            TypeExpr::Var(_) => true,
            TypeExpr::Array(elem, len) => matches!(len, LenExpr::Var(_)) || elem.is_generic(),
            TypeExpr::Tuple(elems) => elems.iter().any(TypeExpr::is_generic),
            TypeExpr::Fn(params, ret) => params.iter().any(TypeExpr::is_generic) || ret.is_generic(),
            _ => false,
        }
    }
}
