//! Top-level declarations.

use kiln_ir::{
    Assoc, ConstItem, ExternDecl, ExternFunc, FuncDecl, ModuleDecl, Name, OperatorDecl, Param,
    Span, TokenKind, TypeExpr,
};

use crate::{ParseError, ParseErrorKind, Parser};

impl Parser<'_> {
    /// Consume the opening delimiter and head keyword of a declaration.
    fn open_decl(&mut self) -> (TokenKind, Span) {
        let open = self.cursor.advance();
        self.cursor.advance();
        (open.kind, open.span)
    }

    pub(crate) fn expect_ident(&mut self, what: &'static str) -> Result<(Name, Span), ParseError> {
        let token = self.cursor.current();
        match token.kind {
            TokenKind::Ident(name) => {
                self.cursor.advance();
                Ok((name, token.span))
            }
            _ => Err(self.unexpected(what)),
        }
    }

    /// `[module name form*]`
    pub(crate) fn parse_module_decl(&mut self) -> Result<ModuleDecl, ParseError> {
        let (open, open_span) = self.open_decl();
        let (name, _) = self.expect_ident("module name")?;
        let mut items = Vec::new();
        while !self.at_form_end() {
            if let Some(item) = self.parse_item_recovering() {
                items.push(item);
            }
        }
        let end = self.expect_close(open, open_span)?;
        Ok(ModuleDecl {
            name,
            items,
            span: open_span.merge(end),
        })
    }

    /// `name` or `(name !type)` binding head used by `const` and `var`.
    pub(crate) fn parse_binding_head(&mut self) -> Result<(Name, Option<TypeExpr>), ParseError> {
        match self.cursor.current_kind() {
            TokenKind::Ident(name) => {
                self.cursor.advance();
                Ok((name, None))
            }
            open @ (TokenKind::LParen | TokenKind::LBracket) => {
                let open_span = self.cursor.advance().span;
                let (name, _) = self.expect_ident("binding name")?;
                let ty = self.parse_type_annotation()?;
                self.expect_close(open, open_span)?;
                Ok((name, Some(ty)))
            }
            _ => Err(self.unexpected("binding name")),
        }
    }

    /// `[const (name !type) init]` at top level.
    pub(crate) fn parse_global_const(&mut self) -> Result<ConstItem, ParseError> {
        let (open, open_span) = self.open_decl();
        let (name, ty) = self.parse_binding_head()?;
        let init = self.parse_expr()?;
        let end = self.expect_close(open, open_span)?;
        Ok(ConstItem {
            name,
            ty,
            init,
            span: open_span.merge(end),
        })
    }

    /// `( param* )` where a param is `x` or `(x !type)`.
    pub(crate) fn parse_params(&mut self) -> Result<Vec<Param>, ParseError> {
        let open = self.cursor.current();
        if !open.kind.is_open() {
            return Err(self.unexpected("parameter list"));
        }
        self.cursor.advance();
        let mut params = Vec::new();
        while !self.at_form_end() {
            let token = self.cursor.current();
            match token.kind {
                TokenKind::Ident(name) => {
                    self.cursor.advance();
                    params.push(Param {
                        name,
                        ty: None,
                        span: token.span,
                    });
                }
                inner @ (TokenKind::LParen | TokenKind::LBracket) => {
                    self.cursor.advance();
                    let (name, _) = self.expect_ident("parameter name")?;
                    let ty = self.parse_type_annotation()?;
                    let end = self.expect_close(inner, token.span)?;
                    params.push(Param {
                        name,
                        ty: Some(ty),
                        span: token.span.merge(end),
                    });
                }
                _ => return Err(self.unexpected("parameter")),
            }
        }
        self.expect_close(open.kind, open.span)?;
        Ok(params)
    }

    /// `[func name (params) -> !ret body*]`
    pub(crate) fn parse_func(&mut self) -> Result<FuncDecl, ParseError> {
        let (open, open_span) = self.open_decl();
        let (name, _) = self.expect_ident("function name")?;
        let params = self.parse_params()?;
        let ret = self.parse_return_annotation()?;
        let body = self.parse_body()?;
        let end = self.expect_close(open, open_span)?;
        Ok(FuncDecl {
            name,
            params,
            ret,
            body,
            span: open_span.merge(end),
        })
    }

    /// `[operator sym prec assoc (params) -> !ret body*]`
    ///
    /// The operator is registered in the table as soon as its header is
    /// parsed, so later infix forms (and its own body) can use it.
    pub(crate) fn parse_operator_decl(&mut self) -> Result<OperatorDecl, ParseError> {
        let (open, open_span) = self.open_decl();
        let sym_token = self.cursor.current();
        let TokenKind::Op(symbol) = sym_token.kind else {
            return Err(self.unexpected("operator symbol"));
        };
        self.cursor.advance();

        let prec_token = self.cursor.current();
        let precedence = match prec_token.kind {
            TokenKind::Int(n) => u8::try_from(n)
                .ok()
                .filter(|p| *p > 0)
                .ok_or_else(|| invalid_decl(prec_token.span, "precedence must be in 1..=255"))?,
            _ => return Err(self.unexpected("operator precedence")),
        };
        self.cursor.advance();

        let (assoc_name, assoc_span) = self.expect_ident("associativity")?;
        let assoc = match self.interner.lookup(assoc_name) {
            "left" => Assoc::Left,
            "right" => Assoc::Right,
            other => {
                return Err(invalid_decl(
                    assoc_span,
                    &format!("associativity must be `left` or `right`, found `{other}`"),
                ))
            }
        };

        if !self.operators.register(symbol, precedence, assoc) {
            return Err(invalid_decl(
                sym_token.span,
                &format!(
                    "cannot redefine builtin operator `{}`",
                    self.interner.lookup(symbol)
                ),
            ));
        }

        let params = self.parse_params()?;
        if params.len() != 2 {
            return Err(invalid_decl(
                sym_token.span,
                "operators take exactly two parameters",
            ));
        }
        let ret = self.parse_return_annotation()?;
        let body = self.parse_body()?;
        let end = self.expect_close(open, open_span)?;
        Ok(OperatorDecl {
            symbol,
            precedence,
            assoc,
            params,
            ret,
            body,
            span: open_span.merge(end),
        })
    }

    /// `[extern "lib" [func name (params) -> !ret]*]`
    pub(crate) fn parse_extern(&mut self) -> Result<ExternDecl, ParseError> {
        let (open, open_span) = self.open_decl();
        let library = match self.cursor.current_kind() {
            TokenKind::Str(lib) => {
                self.cursor.advance();
                lib
            }
            _ => return Err(self.unexpected("library name string")),
        };

        let mut funcs = Vec::new();
        while !self.at_form_end() {
            let inner = self.cursor.current();
            let is_func = inner.kind.is_open()
                && self.ident_str(self.cursor.peek_kind_at(1)) == Some("func");
            if !is_func {
                return Err(ParseError::invalid_form(
                    inner.span,
                    "extern blocks may only contain `func` signatures",
                ));
            }
            let (inner_open, inner_span) = self.open_decl();
            let (name, _) = self.expect_ident("function name")?;
            let params = self.parse_params()?;
            let ret = self.parse_return_annotation()?;
            let end = self.expect_close(inner_open, inner_span)?;
            funcs.push(ExternFunc {
                name,
                params,
                ret,
                span: inner_span.merge(end),
            });
        }
        let end = self.expect_close(open, open_span)?;
        Ok(ExternDecl {
            library,
            funcs,
            span: open_span.merge(end),
        })
    }
}

fn invalid_decl(span: Span, message: &str) -> ParseError {
    ParseError::new(span, ParseErrorKind::InvalidOperatorDecl(message.to_string()))
}
