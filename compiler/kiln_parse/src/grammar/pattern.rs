//! Pattern conditionals.
//!
//! `(value : pred result pred result ... default)` desugars to nested
//! `check` forms. A predicate is either a partial operator form `[op rhs...]`
//! meaning `[op value rhs...]`, or any other expression `e` meaning
//! `[== value e]`. A value that is not an atom is evaluated once into a
//! hidden `const` inside a `scope`.

use kiln_ir::{BinaryOp, Expr, ExprKind, Name, Span, TokenKind};

use crate::{ParseError, ParseErrorKind, Parser};

enum Predicate {
    /// `[op rhs...]` applied to the scrutinee.
    Partial {
        sym: Name,
        rhs: Vec<Expr>,
        span: Span,
    },
    /// Compared to the scrutinee with `==`.
    Equals(Expr),
}

impl Parser<'_> {
    fn parse_predicate(&mut self) -> Result<Predicate, ParseError> {
        let open = self.cursor.current();
        if open.kind.is_open() {
            if let TokenKind::Op(sym) = self.cursor.peek_kind_at(1) {
                self.cursor.advance();
                self.cursor.advance();
                let rhs = self.parse_body()?;
                let end = self.expect_close(open.kind, open.span)?;
                return Ok(Predicate::Partial {
                    sym,
                    rhs,
                    span: open.span.merge(end),
                });
            }
        }
        self.parse_expr().map(Predicate::Equals)
    }

    /// Parse the arms after `value :` and desugar.
    pub(crate) fn parse_pattern_conditional(
        &mut self,
        value: Expr,
        open_span: Span,
    ) -> Result<Expr, ParseError> {
        let mut arms = Vec::new();
        let mut default = None;
        while !self.at_form_end() {
            let pred = self.parse_predicate()?;
            if self.at_form_end() {
                match pred {
                    Predicate::Equals(expr) => default = Some(expr),
                    Predicate::Partial { span, .. } => {
                        return Err(ParseError::new(span, ParseErrorKind::MissingDefault));
                    }
                }
                break;
            }
            let result = self.parse_expr()?;
            arms.push((pred, result));
        }
        let end = self.expect_close(TokenKind::LParen, open_span)?;
        let span = open_span.merge(end);
        let Some(default) = default else {
            return Err(ParseError::new(span, ParseErrorKind::MissingDefault));
        };

        let trivial = matches!(value.kind, ExprKind::Ident(_) | ExprKind::Literal(_));
        let (scrutinee, binding) = if trivial {
            (value, None)
        } else {
            let hidden = self.fresh_hidden_name();
            let value_span = value.span;
            let decl = self.mk(
                value_span,
                ExprKind::ConstDecl {
                    name: hidden,
                    ty: None,
                    init: Box::new(value),
                },
            );
            let reference = self.mk(value_span, ExprKind::Ident(hidden));
            (reference, Some(decl))
        };

        let mut acc = default;
        for (pred, result) in arms.into_iter().rev() {
            let cond = self.build_predicate(pred, &scrutinee)?;
            let arm_span = cond.span.merge(acc.span);
            acc = self.mk(
                arm_span,
                ExprKind::If {
                    cond: Box::new(cond),
                    then_branch: Box::new(result),
                    else_branch: Some(Box::new(acc)),
                    is_check: true,
                },
            );
        }
        acc.span = span;

        match binding {
            Some(decl) => Ok(self.mk(span, ExprKind::Scope(vec![decl, acc]))),
            None => Ok(acc),
        }
    }

    /// Fresh copy of an atom scrutinee with its own `ExprId`.
    fn copy_atom(&mut self, atom: &Expr) -> Expr {
        self.mk(atom.span, atom.kind.clone())
    }

    fn build_predicate(&mut self, pred: Predicate, scrutinee: &Expr) -> Result<Expr, ParseError> {
        let subject = self.copy_atom(scrutinee);
        match pred {
            Predicate::Equals(rhs) => {
                let span = rhs.span;
                Ok(self.mk(
                    span,
                    ExprKind::Binary {
                        op: BinaryOp::Eq,
                        lhs: Box::new(subject),
                        rhs: Box::new(rhs),
                    },
                ))
            }
            Predicate::Partial { sym, rhs, span } => {
                let mut operands = Vec::with_capacity(rhs.len() + 1);
                operands.push(subject);
                operands.extend(rhs);
                self.apply_operator(sym, operands, span)
            }
        }
    }
}
