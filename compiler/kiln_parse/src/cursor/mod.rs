//! Token cursor for navigating the token stream.

use kiln_ir::{Span, Token, TokenKind, TokenList};
use tracing::trace;

/// Cursor over a `TokenList`.
///
/// Invariant: the list ends in `Eof` and the cursor never moves past it,
/// so `current()` is always valid.
pub struct Cursor<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(tokens: &'a TokenList) -> Self {
        Cursor {
            tokens: tokens.as_slice(),
            pos: 0,
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reset to an earlier position (used by recovery).
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos.min(self.last_index());
    }

    fn last_index(&self) -> usize {
        self.tokens.len().saturating_sub(1)
    }

    #[inline]
    pub fn current(&self) -> Token {
        self.tokens
            .get(self.pos)
            .copied()
            .unwrap_or(Token::new(TokenKind::Eof, Span::DUMMY))
    }

    #[inline]
    pub fn current_kind(&self) -> TokenKind {
        self.current().kind
    }

    #[inline]
    pub fn current_span(&self) -> Span {
        self.current().span
    }

    pub fn previous_span(&self) -> Span {
        if self.pos > 0 {
            self.tokens[self.pos - 1].span
        } else {
            Span::DUMMY
        }
    }

    /// Token kind `n` tokens ahead; `Eof` past the end.
    pub fn peek_kind_at(&self, n: usize) -> TokenKind {
        self.tokens
            .get(self.pos + n)
            .map_or(TokenKind::Eof, |t| t.kind)
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.current_kind() == TokenKind::Eof
    }

    #[inline]
    pub fn check(&self, kind: TokenKind) -> bool {
        self.current_kind() == kind
    }

    /// Advance and return the consumed token. Stays on `Eof`.
    pub fn advance(&mut self) -> Token {
        let token = self.current();
        trace!(
            pos = self.pos,
            kind = %token.kind,
            span_start = token.span.start,
            span_end = token.span.end,
            "advance"
        );
        if self.pos < self.last_index() {
            self.pos += 1;
        }
        token
    }

    /// Skip one balanced form starting at the current token.
    ///
    /// An atom is skipped alone; an opening delimiter is skipped together
    /// with everything up to its matching close (delimiter kinds are not
    /// distinguished). Stops at `Eof`.
    pub fn skip_form(&mut self) {
        let mut depth = 0usize;
        loop {
            let kind = self.current_kind();
            if kind == TokenKind::Eof {
                return;
            }
            self.advance();
            if kind.is_open() {
                depth += 1;
            } else if kind.is_close() {
                depth = depth.saturating_sub(1);
            }
            if depth == 0 {
                return;
            }
        }
    }
}
