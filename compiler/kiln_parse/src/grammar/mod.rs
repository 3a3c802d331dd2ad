//! Grammar productions.
//!
//! - `items`: top-level declarations (module, const, func, operator, extern)
//! - `forms`: special forms dispatched on their head atom
//! - `infix`: precedence climbing for `(a op b ...)`
//! - `pattern`: pattern conditionals `(value : pred result ... default)`
//! - `ty`: type annotation atoms

mod forms;
mod infix;
mod items;
mod pattern;
mod ty;

use kiln_ir::{BinaryOp, Expr, ExprKind, Item, Literal, Name, Span, TokenKind, UnaryOp};
use kiln_stack::ensure_sufficient_stack;

use crate::{ParseError, Parser};

impl Parser<'_> {
    /// Parse a top-level form.
    pub(crate) fn parse_item(&mut self) -> Result<Item, ParseError> {
        let open = self.cursor.current_kind();
        if open.is_open() {
            if let Some(head) = self.ident_str(self.cursor.peek_kind_at(1)) {
                match head {
                    "module" => return self.parse_module_decl().map(Item::Module),
                    "const" => return self.parse_global_const().map(Item::Const),
                    "func" => return self.parse_func().map(Item::Func),
                    "operator" => return self.parse_operator_decl().map(Item::Operator),
                    "extern" => return self.parse_extern().map(Item::Extern),
                    _ => {}
                }
            }
        }
        self.parse_expr().map(Item::Expr)
    }

    /// Parse one expression.
    pub(crate) fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        ensure_sufficient_stack(|| self.parse_expr_inner())
    }

    fn parse_expr_inner(&mut self) -> Result<Expr, ParseError> {
        let token = self.cursor.current();
        let kind = match token.kind {
            TokenKind::Int(n) => ExprKind::Literal(Literal::Int(n)),
            TokenKind::Frac(bits) => ExprKind::Literal(Literal::Frac(bits)),
            TokenKind::Bool(b) => ExprKind::Literal(Literal::Bool(b)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::Str(s)),
            TokenKind::Ident(name) => ExprKind::Ident(name),
            TokenKind::LBracket => {
                self.cursor.advance();
                return self.parse_prefix_form(TokenKind::LBracket, token.span);
            }
            TokenKind::LParen => {
                self.cursor.advance();
                return self.parse_paren_form(token.span);
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.cursor.advance();
        Ok(self.mk(token.span, kind))
    }

    /// Parse `[head operand*]` (or a parenthesised prefix form) after the
    /// opening delimiter has been consumed.
    pub(crate) fn parse_prefix_form(
        &mut self,
        open: TokenKind,
        open_span: Span,
    ) -> Result<Expr, ParseError> {
        let head = self.cursor.current();
        match head.kind {
            TokenKind::Ident(name) => {
                let text = self.interner.lookup(name);
                if let Some(result) = self.parse_special_form(text, open, open_span) {
                    return result;
                }
                self.cursor.advance();
                let args = self.parse_body()?;
                let end = self.expect_close(open, open_span)?;
                Ok(self.mk(open_span.merge(end), ExprKind::Call { callee: name, args }))
            }
            TokenKind::Op(sym) => {
                self.cursor.advance();
                let operands = self.parse_body()?;
                let end = self.expect_close(open, open_span)?;
                self.apply_operator(sym, operands, open_span.merge(end))
            }
            TokenKind::Eof => Err(ParseError::new(
                open_span,
                crate::ParseErrorKind::UnclosedDelimiter,
            )),
            TokenKind::Error => Err(self.unexpected("form head")),
            _ if head.kind.is_close() => Err(ParseError::invalid_form(
                open_span.merge(head.span),
                "empty form",
            )),
            _ => Err(ParseError::invalid_form(
                head.span,
                "form head must be an identifier or operator",
            )),
        }
    }

    /// Build the expression for `[op operand*]`.
    ///
    /// Builtin binary operators fold left over two or more operands; `-`,
    /// `!` and `~` with one operand are unary; any other symbol names a
    /// custom operator and becomes a call.
    pub(crate) fn apply_operator(
        &mut self,
        sym: Name,
        mut operands: Vec<Expr>,
        span: Span,
    ) -> Result<Expr, ParseError> {
        let text = self.interner.lookup(sym);
        if operands.len() == 1 {
            if let Some(op) = UnaryOp::from_symbol(text) {
                if let Some(operand) = operands.pop() {
                    let operand = Box::new(operand);
                    return Ok(self.mk(span, ExprKind::Unary { op, operand }));
                }
            }
        }
        if let Some(op) = BinaryOp::from_symbol(text) {
            if operands.len() < 2 {
                return Err(ParseError::invalid_form(
                    span,
                    format!("operator `{text}` needs at least two operands"),
                ));
            }
            return Ok(self.fold_binary(op, operands, span));
        }
        // Custom operators may be declared after their first use; the
        // checker resolves the callee.
        Ok(self.mk(
            span,
            ExprKind::Call {
                callee: sym,
                args: operands,
            },
        ))
    }

    fn fold_binary(&mut self, op: BinaryOp, operands: Vec<Expr>, span: Span) -> Expr {
        let mut iter = operands.into_iter();
        let mut acc = match iter.next() {
            Some(first) => first,
            None => return self.mk(span, ExprKind::Literal(Literal::Int(0))),
        };
        for rhs in iter {
            let node_span = acc.span.merge(rhs.span);
            acc = self.mk(
                node_span,
                ExprKind::Binary {
                    op,
                    lhs: Box::new(acc),
                    rhs: Box::new(rhs),
                },
            );
        }
        acc.span = span;
        acc
    }

    /// Parse `( ... )` after the `(`: prefix form, infix shorthand,
    /// pattern conditional or grouping.
    fn parse_paren_form(&mut self, open_span: Span) -> Result<Expr, ParseError> {
        let first = self.cursor.current_kind();
        if matches!(first, TokenKind::Op(_)) {
            return self.parse_prefix_form(TokenKind::LParen, open_span);
        }
        if let Some(head) = self.ident_str(first) {
            let next = self.cursor.peek_kind_at(1);
            let infix_next = matches!(next, TokenKind::Op(_) | TokenKind::Colon);
            if forms::is_special_head(head) && !infix_next {
                return self.parse_prefix_form(TokenKind::LParen, open_span);
            }
        }

        let lhs = self.parse_expr()?;
        match self.cursor.current_kind() {
            TokenKind::Colon => {
                self.cursor.advance();
                self.parse_pattern_conditional(lhs, open_span)
            }
            TokenKind::Op(_) => {
                let expr = self.parse_infix(lhs, 0)?;
                let end = self.expect_close(TokenKind::LParen, open_span)?;
                let mut expr = expr;
                expr.span = open_span.merge(end);
                Ok(expr)
            }
            TokenKind::RParen => {
                let end = self.cursor.advance().span;
                let mut expr = lhs;
                expr.span = open_span.merge(end);
                Ok(expr)
            }
            _ => match lhs.kind {
                ExprKind::Ident(callee) => {
                    let args = self.parse_body()?;
                    let end = self.expect_close(TokenKind::LParen, open_span)?;
                    Ok(self.mk(open_span.merge(end), ExprKind::Call { callee, args }))
                }
                _ => Err(self.unexpected("operator, `:` or `)`")),
            },
        }
    }
}
