//! Compile-time evaluation of global constant initialisers.
//!
//! Accepted: literals, other global constants, builtin operators over
//! constants, and array/tuple literals of constants. Overflow and division
//! by zero are errors rather than wrapped results.

use kiln_ir::{BinaryOp, Expr, ExprKind, Literal, Name, UnaryOp};
use rustc_hash::FxHashMap;

/// Value of a global constant.
#[derive(Clone, Debug, PartialEq)]
pub enum ConstValue {
    Int(i64),
    Frac(f64),
    Bool(bool),
    Str(Name),
    Array(Vec<ConstValue>),
    Tuple(Vec<ConstValue>),
}

pub(crate) fn eval(expr: &Expr, globals: &FxHashMap<Name, ConstValue>) -> Result<ConstValue, String> {
    match &expr.kind {
        ExprKind::Literal(lit) => Ok(match *lit {
            Literal::Int(n) => ConstValue::Int(n),
            Literal::Frac(bits) => ConstValue::Frac(f64::from_bits(bits)),
            Literal::Bool(b) => ConstValue::Bool(b),
            Literal::Str(s) => ConstValue::Str(s),
        }),
        ExprKind::Ident(name) => globals
            .get(name)
            .cloned()
            .ok_or_else(|| "only global constants may be referenced".to_string()),
        ExprKind::Unary { op, operand } => {
            let value = eval(operand, globals)?;
            eval_unary(*op, &value).ok_or_else(|| "constant operation overflows".to_string())
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let lhs = eval(lhs, globals)?;
            let rhs = eval(rhs, globals)?;
            eval_binary(*op, &lhs, &rhs)
                .ok_or_else(|| format!("constant `{}` overflows or divides by zero", op.as_symbol()))
        }
        ExprKind::Array(items) => items
            .iter()
            .map(|e| eval(e, globals))
            .collect::<Result<_, _>>()
            .map(ConstValue::Array),
        ExprKind::Tuple(items) => items
            .iter()
            .map(|e| eval(e, globals))
            .collect::<Result<_, _>>()
            .map(ConstValue::Tuple),
        _ => Err("global constant initialiser must be a compile-time constant".to_string()),
    }
}

fn eval_unary(op: UnaryOp, value: &ConstValue) -> Option<ConstValue> {
    match (op, value) {
        (UnaryOp::Neg, ConstValue::Int(n)) => n.checked_neg().map(ConstValue::Int),
        (UnaryOp::Neg, ConstValue::Frac(x)) => Some(ConstValue::Frac(-x)),
        (UnaryOp::Not, ConstValue::Bool(b)) => Some(ConstValue::Bool(!b)),
        (UnaryOp::BitNot, ConstValue::Int(n)) => Some(ConstValue::Int(!n)),
        _ => None,
    }
}

fn eval_binary(op: BinaryOp, lhs: &ConstValue, rhs: &ConstValue) -> Option<ConstValue> {
    use ConstValue::{Bool, Frac, Int};
    Some(match (lhs, rhs) {
        (Int(a), Int(b)) => {
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Add => Int(a.checked_add(b)?),
                BinaryOp::Sub => Int(a.checked_sub(b)?),
                BinaryOp::Mul => Int(a.checked_mul(b)?),
                BinaryOp::Div => Int(a.checked_div(b)?),
                BinaryOp::Mod => Int(a.checked_rem(b)?),
                BinaryOp::BitAnd => Int(a & b),
                BinaryOp::BitOr => Int(a | b),
                BinaryOp::BitXor => Int(a ^ b),
                BinaryOp::Shl => Int(a.checked_shl(u32::try_from(b).ok()?)?),
                BinaryOp::Shr => Int(a.checked_shr(u32::try_from(b).ok()?)?),
                BinaryOp::Eq => Bool(a == b),
                BinaryOp::NotEq => Bool(a != b),
                BinaryOp::Lt => Bool(a < b),
                BinaryOp::LtEq => Bool(a <= b),
                BinaryOp::Gt => Bool(a > b),
                BinaryOp::GtEq => Bool(a >= b),
                BinaryOp::And | BinaryOp::Or => return None,
            }
        }
        (Frac(a), Frac(b)) => {
            let (a, b) = (*a, *b);
            match op {
                BinaryOp::Add => Frac(a + b),
                BinaryOp::Sub => Frac(a - b),
                BinaryOp::Mul => Frac(a * b),
                BinaryOp::Div if b != 0.0 => Frac(a / b),
                BinaryOp::Eq => Bool(a == b),
                BinaryOp::NotEq => Bool(a != b),
                BinaryOp::Lt => Bool(a < b),
                BinaryOp::LtEq => Bool(a <= b),
                BinaryOp::Gt => Bool(a > b),
                BinaryOp::GtEq => Bool(a >= b),
                _ => return None,
            }
        }
        (Bool(a), Bool(b)) => match op {
            BinaryOp::And => Bool(*a && *b),
            BinaryOp::Or => Bool(*a || *b),
            BinaryOp::Eq => Bool(a == b),
            BinaryOp::NotEq => Bool(a != b),
            _ => return None,
        },
        (ConstValue::Str(a), ConstValue::Str(b)) => match op {
            BinaryOp::Eq => Bool(a == b),
            BinaryOp::NotEq => Bool(a != b),
            _ => return None,
        },
        _ => return None,
    })
}
