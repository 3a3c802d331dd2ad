//! Semantic types.

use std::fmt;

use kiln_ir::{LenExpr, Name, StringInterner, TypeExpr};

/// Base of a size-constrained scalar.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum SizedBase {
    Int,
    Frac,
}

/// Array length: known, or a generic length variable.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Len {
    Fixed(u64),
    Var(Name),
}

/// A resolved type.
///
/// Equality is structural. `!int<64>` and `!frac<64>` normalise to
/// [`Type::Int`] and [`Type::Frac`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Frac,
    Bool,
    Str,
    Ptr,
    None,
    Sized { bits: u32, base: SizedBase },
    Array(Box<Type>, Len),
    Tuple(Vec<Type>),
    Function(Vec<Type>, Box<Type>),
    /// Generic type variable, rigid inside the declaring function.
    Var(Name),
}

impl Type {
    /// Resolve a parsed annotation.
    pub fn from_annotation(expr: &TypeExpr) -> Type {
        match expr {
            TypeExpr::Int => Type::Int,
            TypeExpr::Frac => Type::Frac,
            TypeExpr::Bool => Type::Bool,
            TypeExpr::Str => Type::Str,
            TypeExpr::Ptr => Type::Ptr,
            TypeExpr::None => Type::None,
            TypeExpr::SizedInt(64) => Type::Int,
            TypeExpr::SizedFrac(64) => Type::Frac,
            TypeExpr::SizedInt(bits) => Type::Sized {
                bits: *bits,
                base: SizedBase::Int,
            },
            TypeExpr::SizedFrac(bits) => Type::Sized {
                bits: *bits,
                base: SizedBase::Frac,
            },
            TypeExpr::Array(elem, len) => {
                let len = match len {
                    LenExpr::Fixed(n) => Len::Fixed(*n),
                    LenExpr::Var(name) => Len::Var(*name),
                };
                Type::Array(Box::new(Type::from_annotation(elem)), len)
            }
            TypeExpr::Tuple(elems) => Type::Tuple(elems.iter().map(Type::from_annotation).collect()),
            TypeExpr::Fn(params, ret) => Type::Function(
                params.iter().map(Type::from_annotation).collect(),
                Box::new(Type::from_annotation(ret)),
            ),
            TypeExpr::Var(name) => Type::Var(*name),
        }
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Int
                | Type::Sized {
                    base: SizedBase::Int,
                    ..
                }
        )
    }

    pub fn is_fraction(&self) -> bool {
        matches!(
            self,
            Type::Frac
                | Type::Sized {
                    base: SizedBase::Frac,
                    ..
                }
        )
    }

    /// Integer or fraction, sized or not. Type variables count as numeric
    /// inside generic bodies; instantiation decides.
    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_fraction() || matches!(self, Type::Var(_))
    }

    /// Scalar types that fit in one machine register.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Type::Int | Type::Frac | Type::Bool | Type::Ptr | Type::Sized { .. }
        )
    }

    /// Whether the type mentions a type or length variable.
    pub fn has_vars(&self) -> bool {
        match self {
            Type::Var(_) => true,
            Type::Array(elem, len) => matches!(len, Len::Var(_)) || elem.has_vars(),
            Type::Tuple(elems) => elems.iter().any(Type::has_vars),
            Type::Function(params, ret) => params.iter().any(Type::has_vars) || ret.has_vars(),
            _ => false,
        }
    }

    /// Collect type and length variables in first-appearance order.
    pub fn collect_vars(&self, out: &mut Vec<Name>) {
        match self {
            Type::Var(name) => {
                if !out.contains(name) {
                    out.push(*name);
                }
            }
            Type::Array(elem, len) => {
                elem.collect_vars(out);
                if let Len::Var(name) = len {
                    if !out.contains(name) {
                        out.push(*name);
                    }
                }
            }
            Type::Tuple(elems) => elems.iter().for_each(|t| t.collect_vars(out)),
            Type::Function(params, ret) => {
                params.iter().for_each(|t| t.collect_vars(out));
                ret.collect_vars(out);
            }
            _ => {}
        }
    }

    /// Whether an integer literal `value` can be given this type.
    pub fn fits_int_literal(&self, value: i64) -> bool {
        match self {
            Type::Int => true,
            Type::Sized {
                bits,
                base: SizedBase::Int,
            } => {
                if *bits >= 64 {
                    return true;
                }
                if *bits == 0 {
                    return false;
                }
                let half = 1i64 << (bits - 1);
                (-half..half).contains(&value)
            }
            _ => false,
        }
    }

    /// Fragment used in monomorphised symbol names (`sum$frac$3`).
    pub fn mangle(&self, interner: &StringInterner) -> String {
        match self {
            Type::Int => "int".into(),
            Type::Frac => "frac".into(),
            Type::Bool => "bool".into(),
            Type::Str => "str".into(),
            Type::Ptr => "ptr".into(),
            Type::None => "none".into(),
            Type::Sized { bits, base } => match base {
                SizedBase::Int => format!("int{bits}"),
                SizedBase::Frac => format!("frac{bits}"),
            },
            Type::Array(elem, len) => {
                let len = match len {
                    Len::Fixed(n) => n.to_string(),
                    Len::Var(name) => interner.lookup(*name).to_string(),
                };
                format!("array_{}_{len}", elem.mangle(interner))
            }
            Type::Tuple(elems) => {
                let parts: Vec<_> = elems.iter().map(|t| t.mangle(interner)).collect();
                format!("tuple_{}", parts.join("_"))
            }
            Type::Function(params, ret) => {
                let parts: Vec<_> = params.iter().map(|t| t.mangle(interner)).collect();
                format!("fn_{}_{}", parts.join("_"), ret.mangle(interner))
            }
            Type::Var(name) => interner.lookup(*name).to_string(),
        }
    }

    /// Render as a source annotation (`!array<!int,3>`).
    pub fn display<'a>(&'a self, interner: &'a StringInterner) -> TypeDisplay<'a> {
        TypeDisplay { ty: self, interner }
    }
}

/// [`Type`] rendering with names resolved.
pub struct TypeDisplay<'a> {
    ty: &'a Type,
    interner: &'a StringInterner,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let interner = self.interner;
        let list = |f: &mut fmt::Formatter<'_>, items: &[Type]| -> fmt::Result {
            for (i, t) in items.iter().enumerate() {
                if i > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{}", t.display(interner))?;
            }
            Ok(())
        };
        match self.ty {
            Type::Int => f.write_str("!int"),
            Type::Frac => f.write_str("!frac"),
            Type::Bool => f.write_str("!bool"),
            Type::Str => f.write_str("!str"),
            Type::Ptr => f.write_str("!ptr"),
            Type::None => f.write_str("!none"),
            Type::Sized { bits, base } => match base {
                SizedBase::Int => write!(f, "!int<{bits}>"),
                SizedBase::Frac => write!(f, "!frac<{bits}>"),
            },
            Type::Array(elem, len) => {
                write!(f, "!array<{},", elem.display(interner))?;
                match len {
                    Len::Fixed(n) => write!(f, "{n}>"),
                    Len::Var(name) => write!(f, "{}>", interner.lookup(*name)),
                }
            }
            Type::Tuple(elems) => {
                f.write_str("!tuple<")?;
                list(f, elems)?;
                f.write_str(">")
            }
            Type::Function(params, ret) => {
                f.write_str("!fn<")?;
                list(f, params)?;
                write!(f, "->{}>", ret.display(interner))
            }
            Type::Var(name) => write!(f, "!{}", interner.lookup(*name)),
        }
    }
}
