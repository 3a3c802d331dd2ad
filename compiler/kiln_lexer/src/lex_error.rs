//! Lexer error types.

use kiln_ir::Span;
use thiserror::Error;

/// A lexer error. Reported on the side channel; the offending lexeme is
/// also emitted as a `TokenKind::Error` token.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
#[error("{kind}")]
pub struct LexError {
    pub span: Span,
    pub kind: LexErrorKind,
}

/// What kind of lexer error occurred.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,
    #[error("unterminated block comment")]
    UnterminatedComment,
    #[error("invalid digit `{digit}` in base-{radix} literal")]
    InvalidDigit { digit: char, radix: u32 },
    #[error("base-{radix} literal has no digits")]
    MissingDigits { radix: u32 },
    #[error("integer literal does not fit in 64 bits")]
    IntOverflow,
    #[error("invalid fraction literal")]
    InvalidFrac,
    #[error("invalid escape sequence `\\{0}`")]
    InvalidEscape(char),
    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),
}

/// Error type threaded through logos callbacks.
///
/// Logos produces `Default::default()` for input no pattern matches; the
/// character is filled in when converting to [`LexErrorKind`].
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) enum RawError {
    #[default]
    Unexpected,
    Kind(LexErrorKind),
}

impl From<LexErrorKind> for RawError {
    fn from(kind: LexErrorKind) -> Self {
        RawError::Kind(kind)
    }
}

impl RawError {
    pub(crate) fn into_kind(self, slice: &str) -> LexErrorKind {
        match self {
            RawError::Unexpected => {
                LexErrorKind::UnexpectedChar(slice.chars().next().unwrap_or('\0'))
            }
            RawError::Kind(kind) => kind,
        }
    }
}
