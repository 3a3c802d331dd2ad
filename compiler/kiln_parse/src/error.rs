//! Parse error types.

use kiln_ir::{Span, TokenKind};
use thiserror::Error;

/// A parse error located at `span`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
#[error("{kind}")]
pub struct ParseError {
    pub span: Span,
    pub kind: ParseErrorKind,
}

impl ParseError {
    #[cold]
    pub fn new(span: Span, kind: ParseErrorKind) -> Self {
        ParseError { span, kind }
    }

    #[cold]
    pub fn invalid_form(span: Span, message: impl Into<String>) -> Self {
        ParseError::new(span, ParseErrorKind::InvalidForm(message.into()))
    }

    /// Whether the error stems from a token the lexer already rejected.
    pub fn is_lexical(&self) -> bool {
        matches!(self.kind, ParseErrorKind::ErrorToken)
    }
}

/// What kind of parse error occurred.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
pub enum ParseErrorKind {
    #[error("expected {expected}, found {found}")]
    UnexpectedToken {
        expected: &'static str,
        found: TokenKind,
    },
    #[error("unclosed delimiter")]
    UnclosedDelimiter,
    #[error("unmatched closing delimiter")]
    UnmatchedClose,
    #[error("{0}")]
    InvalidForm(String),
    #[error("pattern conditional requires a default result")]
    MissingDefault,
    #[error("invalid type annotation: {0}")]
    InvalidType(String),
    #[error("invalid operator declaration: {0}")]
    InvalidOperatorDecl(String),
    /// Stopped at a lexer error token; the lexer has reported it.
    #[error("invalid token")]
    ErrorToken,
}
