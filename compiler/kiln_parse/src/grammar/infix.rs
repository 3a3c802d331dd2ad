//! Precedence climbing for parenthesised infix shorthand.
//!
//! `(a + b * c)` parses as `[+ a [* b c]]`. Builtin operators are all
//! left-associative; custom operators carry the precedence and
//! associativity from their declaration.

use kiln_ir::{Assoc, Expr, ExprKind, Name, OperatorInfo, OperatorKind, TokenKind};

use crate::{ParseError, Parser};

impl Parser<'_> {
    fn peek_infix_op(&self) -> Option<(Name, OperatorInfo)> {
        match self.cursor.current_kind() {
            TokenKind::Op(sym) => self.operators.lookup(sym).map(|info| (sym, info)),
            _ => None,
        }
    }

    /// Climb from `lhs`, consuming operators that bind at least as tightly
    /// as `min_prec`.
    pub(crate) fn parse_infix(&mut self, mut lhs: Expr, min_prec: u8) -> Result<Expr, ParseError> {
        loop {
            let current = self.cursor.current();
            let (sym, info) = match self.peek_infix_op() {
                Some(found) if found.1.precedence >= min_prec => found,
                Some(_) => break,
                None => {
                    if let TokenKind::Op(sym) = current.kind {
                        return Err(ParseError::invalid_form(
                            current.span,
                            format!("unknown infix operator `{}`", self.interner.lookup(sym)),
                        ));
                    }
                    break;
                }
            };
            self.cursor.advance();

            let mut rhs = self.parse_expr()?;
            while let Some((_, next)) = self.peek_infix_op() {
                let tighter = next.precedence > info.precedence;
                let right_chain = next.assoc == Assoc::Right && next.precedence == info.precedence;
                if !(tighter || right_chain) {
                    break;
                }
                let next_min = if tighter {
                    info.precedence + 1
                } else {
                    info.precedence
                };
                rhs = self.parse_infix(rhs, next_min)?;
            }

            let span = lhs.span.merge(rhs.span);
            let kind = match info.kind {
                OperatorKind::Builtin(op) => ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                OperatorKind::Custom => ExprKind::Call {
                    callee: sym,
                    args: vec![lhs, rhs],
                },
            };
            lhs = self.mk(span, kind);
        }
        Ok(lhs)
    }
}
