//! Special forms, dispatched on the head identifier.

use kiln_ir::{Expr, ExprKind, MutexOp, ResourceBinding, Span, TokenKind};

use crate::{ParseError, Parser};

const SPECIAL_HEADS: &[&str] = &[
    "module",
    "func",
    "operator",
    "extern",
    "const",
    "var",
    "set",
    "scope",
    "if",
    "check",
    "while",
    "for",
    "loop",
    "async-loop",
    "break",
    "continue",
    "return",
    "index",
    "array",
    "tuple",
    "len",
    "alloc",
    "mem-alloc",
    "free",
    "mem-free",
    "with-resources",
    "atomic",
    "mutex_create",
    "mutex_lock",
    "mutex_unlock",
];

pub(crate) fn is_special_head(head: &str) -> bool {
    SPECIAL_HEADS.contains(&head)
}

impl Parser<'_> {
    /// Parse a special form whose head is `head`, or return `None` when
    /// `head` is an ordinary callee. The cursor is on the head token.
    pub(crate) fn parse_special_form(
        &mut self,
        head: &str,
        open: TokenKind,
        open_span: Span,
    ) -> Option<Result<Expr, ParseError>> {
        if !is_special_head(head) {
            return None;
        }
        let head_span = self.cursor.advance().span;
        Some(self.parse_special_body(head, head_span, open, open_span))
    }

    fn parse_special_body(
        &mut self,
        head: &str,
        head_span: Span,
        open: TokenKind,
        open_span: Span,
    ) -> Result<Expr, ParseError> {
        let kind = match head {
            "module" | "func" | "operator" | "extern" => {
                return Err(ParseError::invalid_form(
                    head_span,
                    format!("`{head}` is only allowed at top level"),
                ));
            }
            "const" | "var" => {
                let (name, ty) = self.parse_binding_head()?;
                let init = Box::new(self.parse_expr()?);
                if head == "const" {
                    ExprKind::ConstDecl { name, ty, init }
                } else {
                    ExprKind::VarDecl { name, ty, init }
                }
            }
            "set" => self.parse_set(head_span)?,
            "scope" => ExprKind::Scope(self.parse_body()?),
            "if" | "check" => {
                let is_check = head == "check";
                let cond = Box::new(self.parse_expr()?);
                let then_branch = Box::new(self.parse_expr()?);
                let else_branch = if is_check || !self.at_form_end() {
                    Some(Box::new(self.parse_expr()?))
                } else {
                    None
                };
                ExprKind::If {
                    cond,
                    then_branch,
                    else_branch,
                    is_check,
                }
            }
            "while" | "async-loop" => {
                let cond = Box::new(self.parse_expr()?);
                let body = self.parse_body()?;
                ExprKind::While {
                    cond,
                    body,
                    is_async: head == "async-loop",
                }
            }
            "for" => {
                let init = self.parse_expr()?;
                if !matches!(init.kind, ExprKind::VarDecl { .. }) {
                    return Err(ParseError::invalid_form(
                        init.span,
                        "`for` initialiser must be a `var` form",
                    ));
                }
                let cond = Box::new(self.parse_expr()?);
                let step = Box::new(self.parse_expr()?);
                let body = self.parse_body()?;
                ExprKind::For {
                    init: Box::new(init),
                    cond,
                    step,
                    body,
                }
            }
            "loop" => ExprKind::Loop(self.parse_body()?),
            "break" => ExprKind::Break,
            "continue" => ExprKind::Continue,
            "return" => {
                if self.at_form_end() {
                    ExprKind::Return(None)
                } else {
                    ExprKind::Return(Some(Box::new(self.parse_expr()?)))
                }
            }
            "index" => {
                let target = Box::new(self.parse_expr()?);
                let index = Box::new(self.parse_expr()?);
                ExprKind::Index { target, index }
            }
            "array" => ExprKind::Array(self.parse_body()?),
            "tuple" => ExprKind::Tuple(self.parse_body()?),
            "len" => ExprKind::Len(Box::new(self.parse_expr()?)),
            "alloc" | "mem-alloc" => ExprKind::Alloc(Box::new(self.parse_expr()?)),
            "free" | "mem-free" => ExprKind::Free(Box::new(self.parse_expr()?)),
            "with-resources" => self.parse_with_resources()?,
            "atomic" => ExprKind::Atomic(self.parse_body()?),
            "mutex_create" => ExprKind::Mutex {
                op: MutexOp::Create,
                handle: None,
            },
            "mutex_lock" | "mutex_unlock" => ExprKind::Mutex {
                op: if head == "mutex_lock" {
                    MutexOp::Lock
                } else {
                    MutexOp::Unlock
                },
                handle: Some(Box::new(self.parse_expr()?)),
            },
            _ => {
                return Err(ParseError::invalid_form(
                    head_span,
                    format!("unknown form `{head}`"),
                ))
            }
        };

        if !self.at_form_end() {
            return Err(ParseError::invalid_form(
                self.cursor.current_span(),
                format!("too many operands for `{head}`"),
            ));
        }
        let end = self.expect_close(open, open_span)?;
        Ok(self.mk(open_span.merge(end), kind))
    }

    /// `[set name value]` or `[set [index arr i] value]`.
    fn parse_set(&mut self, head_span: Span) -> Result<ExprKind, ParseError> {
        let target = self.parse_expr()?;
        let value = Box::new(self.parse_expr()?);
        match target.kind {
            ExprKind::Ident(name) => Ok(ExprKind::Set { name, value }),
            ExprKind::Index { target, index } => Ok(ExprKind::SetIndex {
                target,
                index,
                value,
            }),
            _ => Err(ParseError::invalid_form(
                head_span.merge(target.span),
                "`set` target must be a name or an `index` form",
            )),
        }
    }

    /// `[with-resources ((name init)*) body*]`
    fn parse_with_resources(&mut self) -> Result<ExprKind, ParseError> {
        let list = self.cursor.current();
        if !list.kind.is_open() {
            return Err(self.unexpected("resource binding list"));
        }
        self.cursor.advance();
        let mut bindings = Vec::new();
        while !self.at_form_end() {
            let entry = self.cursor.current();
            if !entry.kind.is_open() {
                return Err(self.unexpected("`(name init)` binding"));
            }
            self.cursor.advance();
            let (name, _) = self.expect_ident("resource name")?;
            let init = self.parse_expr()?;
            let end = self.expect_close(entry.kind, entry.span)?;
            bindings.push(ResourceBinding {
                name,
                init,
                span: entry.span.merge(end),
            });
        }
        self.expect_close(list.kind, list.span)?;
        let body = self.parse_body()?;
        Ok(ExprKind::WithResources { bindings, body })
    }
}
