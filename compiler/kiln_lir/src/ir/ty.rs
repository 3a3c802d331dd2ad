//! Concrete IR types.

use std::fmt;

use kiln_types::{Len, SizedBase, Type};

/// Type of an IR value or stack slot.
///
/// Unlike the checker's [`Type`], an IR type never contains variables:
/// generic code is monomorphised before it reaches the IR.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Ty {
    /// Signed integer of the given width (`i64` for `!int`).
    Int(u32),
    /// Float of the given width (`f64` for `!frac`).
    Float(u32),
    Bool,
    Str,
    Ptr,
    None,
    Array(Box<Ty>, u64),
    Tuple(Vec<Ty>),
    Fn(Vec<Ty>, Box<Ty>),
    /// `width` lanes of a primitive element type.
    Vector(Box<Ty>, u32),
}

impl Ty {
    pub const I64: Ty = Ty::Int(64);
    pub const F64: Ty = Ty::Float(64);

    /// Convert a checked type. Returns `None` if it still contains a type
    /// or length variable.
    pub fn from_type(ty: &Type) -> Option<Ty> {
        Some(match ty {
            Type::Int => Ty::I64,
            Type::Frac => Ty::F64,
            Type::Bool => Ty::Bool,
            Type::Str => Ty::Str,
            Type::Ptr => Ty::Ptr,
            Type::None => Ty::None,
            Type::Sized {
                bits,
                base: SizedBase::Int,
            } => Ty::Int(*bits),
            Type::Sized {
                bits,
                base: SizedBase::Frac,
            } => Ty::Float(*bits),
            Type::Array(elem, Len::Fixed(n)) => Ty::Array(Box::new(Ty::from_type(elem)?), *n),
            Type::Array(_, Len::Var(_)) | Type::Var(_) => return None,
            Type::Tuple(elems) => Ty::Tuple(elems.iter().map(Ty::from_type).collect::<Option<_>>()?),
            Type::Function(params, ret) => Ty::Fn(
                params.iter().map(Ty::from_type).collect::<Option<_>>()?,
                Box::new(Ty::from_type(ret)?),
            ),
        })
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Ty::Int(_))
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Ty::Float(_))
    }

    pub fn is_numeric(&self) -> bool {
        self.is_int() || self.is_float()
    }

    /// Fits in one machine register.
    pub fn is_scalar(&self) -> bool {
        matches!(
            self,
            Ty::Int(_) | Ty::Float(_) | Ty::Bool | Ty::Ptr | Ty::Str | Ty::Fn(..)
        )
    }

    pub fn is_none(&self) -> bool {
        *self == Ty::None
    }

    /// Element type and length of an array.
    pub fn as_array(&self) -> Option<(&Ty, u64)> {
        match self {
            Ty::Array(elem, len) => Some((elem, *len)),
            _ => None,
        }
    }

    /// Number of 8-byte words a value of this type occupies in memory.
    pub fn words(&self) -> u64 {
        match self {
            Ty::None => 0,
            Ty::Array(elem, len) => elem.words() * len,
            Ty::Tuple(elems) => elems.iter().map(Ty::words).sum(),
            Ty::Vector(_, width) => u64::from(*width),
            _ => 1,
        }
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Int(bits) => write!(f, "i{bits}"),
            Ty::Float(bits) => write!(f, "f{bits}"),
            Ty::Bool => f.write_str("bool"),
            Ty::Str => f.write_str("str"),
            Ty::Ptr => f.write_str("ptr"),
            Ty::None => f.write_str("none"),
            Ty::Array(elem, len) => write!(f, "[{elem}; {len}]"),
            Ty::Tuple(elems) => {
                f.write_str("(")?;
                for (i, elem) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{elem}")?;
                }
                f.write_str(")")
            }
            Ty::Fn(params, ret) => {
                f.write_str("fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{param}")?;
                }
                write!(f, ") -> {ret}")
            }
            Ty::Vector(elem, width) => write!(f, "<{width} x {elem}>"),
        }
    }
}
