//! Recursive descent parser for Kiln.
//!
//! Produces a [`Module`] from a [`TokenList`]. Forms are dispatched on their
//! head atom; parenthesised infix shorthand goes through a precedence
//! climbing sub-parser that consults the unit's [`OperatorTable`]. Pattern
//! conditionals are desugared into nested `check` forms here.
//!
//! Errors are collected rather than aborting: a failure inside a top-level
//! form skips to that form's matching close delimiter and parsing resumes
//! with the next sibling form.

mod cursor;
mod error;
mod grammar;

use kiln_ir::{
    Expr, ExprId, ExprKind, Item, Module, OperatorTable, Span, StringInterner, TokenKind,
    TokenList,
};
use tracing::debug;

pub use cursor::Cursor;
pub use error::{ParseError, ParseErrorKind};

/// Result of parsing one unit.
#[derive(Debug)]
pub struct ParseOutput {
    pub module: Module,
    pub errors: Vec<ParseError>,
    /// Operator table after all custom operator declarations.
    pub operators: OperatorTable,
}

impl ParseOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Parser state.
pub struct Parser<'a> {
    cursor: Cursor<'a>,
    interner: &'a StringInterner,
    operators: OperatorTable,
    errors: Vec<ParseError>,
    next_id: u32,
    hidden_counter: u32,
}

impl<'a> Parser<'a> {
    pub fn new(tokens: &'a TokenList, interner: &'a StringInterner) -> Self {
        Parser {
            cursor: Cursor::new(tokens),
            interner,
            operators: OperatorTable::with_builtins(interner),
            errors: Vec::new(),
            next_id: 0,
            hidden_counter: 0,
        }
    }

    /// Parse the whole token stream as one module.
    pub fn parse_module(mut self) -> ParseOutput {
        let items = self.parse_items_until_eof();

        let name = items.iter().find_map(|item| match item {
            Item::Module(m) => Some(m.name),
            _ => None,
        });

        debug!(
            items = items.len(),
            errors = self.errors.len(),
            "parsed module"
        );

        ParseOutput {
            module: Module {
                name,
                items,
                expr_count: self.next_id,
            },
            errors: self.errors,
            operators: self.operators,
        }
    }

    fn parse_items_until_eof(&mut self) -> Vec<Item> {
        let mut items = Vec::new();
        while !self.cursor.is_at_end() {
            if let Some(item) = self.parse_item_recovering() {
                items.push(item);
            }
        }
        items
    }

    /// Parse one top-level form; on error record it and skip the form.
    pub(crate) fn parse_item_recovering(&mut self) -> Option<Item> {
        let start = self.cursor.position();
        if self.cursor.current_kind().is_close() {
            let span = self.cursor.advance().span;
            self.errors
                .push(ParseError::new(span, ParseErrorKind::UnmatchedClose));
            return None;
        }
        match self.parse_item() {
            Ok(item) => Some(item),
            Err(err) => {
                debug!(error = %err, "recovering from parse error");
                if !err.is_lexical() {
                    self.errors.push(err);
                }
                self.cursor.set_position(start);
                self.cursor.skip_form();
                None
            }
        }
    }

    // Helpers shared by the grammar modules.

    pub(crate) fn mk(&mut self, span: Span, kind: ExprKind) -> Expr {
        let id = ExprId::new(self.next_id);
        self.next_id += 1;
        Expr::new(id, span, kind)
    }

    /// Name of an identifier token, as a string.
    pub(crate) fn ident_str(&self, kind: TokenKind) -> Option<&'static str> {
        match kind {
            TokenKind::Ident(name) => Some(self.interner.lookup(name)),
            _ => None,
        }
    }

    pub(crate) fn unexpected(&self, expected: &'static str) -> ParseError {
        let token = self.cursor.current();
        match token.kind {
            TokenKind::Error => ParseError::new(token.span, ParseErrorKind::ErrorToken),
            found => ParseError::new(token.span, ParseErrorKind::UnexpectedToken { expected, found }),
        }
    }

    /// Consume the close delimiter matching `open`.
    pub(crate) fn expect_close(&mut self, open: TokenKind, open_span: Span) -> Result<Span, ParseError> {
        let want = if open == TokenKind::LParen {
            TokenKind::RParen
        } else {
            TokenKind::RBracket
        };
        let current = self.cursor.current_kind();
        if current == want {
            return Ok(self.cursor.advance().span);
        }
        if current == TokenKind::Eof {
            return Err(ParseError::new(open_span, ParseErrorKind::UnclosedDelimiter));
        }
        Err(self.unexpected(if want == TokenKind::RParen {
            "`)`"
        } else {
            "`]`"
        }))
    }

    /// Whether the current token closes a form (or input ends).
    pub(crate) fn at_form_end(&self) -> bool {
        let kind = self.cursor.current_kind();
        kind.is_close() || kind == TokenKind::Eof
    }

    /// Parse expressions until the enclosing form's close delimiter.
    pub(crate) fn parse_body(&mut self) -> Result<Vec<Expr>, ParseError> {
        let mut body = Vec::new();
        while !self.at_form_end() {
            body.push(self.parse_expr()?);
        }
        Ok(body)
    }

    pub(crate) fn fresh_hidden_name(&mut self) -> kiln_ir::Name {
        let n = self.hidden_counter;
        self.hidden_counter += 1;
        self.interner.intern(&format!("__pat{n}"))
    }
}

/// Parse a token list.
pub fn parse(tokens: &TokenList, interner: &StringInterner) -> ParseOutput {
    Parser::new(tokens, interner).parse_module()
}

/// Lex and parse source text. Lexer errors are returned separately.
pub fn parse_source(
    source: &str,
    interner: &StringInterner,
) -> (ParseOutput, Vec<kiln_lexer::LexError>) {
    let lexed = kiln_lexer::lex(source, interner);
    let output = parse(&lexed.tokens, interner);
    (output, lexed.errors)
}

#[cfg(test)]
mod tests;
