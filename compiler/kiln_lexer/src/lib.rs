//! Lexer for Kiln using logos with string interning.
//!
//! [`Lexer`] is a lazy, restartable token iterator whose errors go to a
//! side channel; [`lex`] is the batch form producing a [`LexOutput`].
//! Every stream ends in exactly one `Eof` token.

mod escape;
mod lex_error;

use logos::{FilterResult, Logos};

use kiln_ir::{Span, StringInterner, Token, TokenKind, TokenList};

pub use lex_error::{LexError, LexErrorKind};
use lex_error::RawError;

/// Raw token from logos (before interning).
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(error = RawError)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"//[^\n]*")]
enum RawToken {
    #[token("/*", block_comment)]
    BlockComment,

    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("->")]
    Arrow,
    #[token(":")]
    Colon,
    #[token(",")]
    Comma,

    #[token("true")]
    True,
    #[token("false")]
    False,

    // Radix-prefixed integer; digits are validated in the callback so that
    // `0b102` reports the bad digit instead of splitting into two tokens.
    #[regex(r"-?0[xXoObB][0-9A-Za-z_]*", radix_int)]
    RadixInt(i64),

    #[regex(r"-?[0-9][0-9_]*", decimal_int)]
    Int(i64),

    #[regex(r"-?[0-9][0-9_]*\.[0-9][0-9_]*([eE][+-]?[0-9]+)?", frac)]
    Frac(f64),

    #[token("\"", string)]
    Str(String),

    // Type annotation: `!name`, with the `<...>` argument list taken by the
    // callback.
    #[regex(r"![A-Za-z_][A-Za-z0-9_]*", type_args)]
    Type,

    #[regex(r"[+\-*/%<>=!&|^~?@$]+", priority = 1)]
    Op,

    #[regex(r"[A-Za-z_][A-Za-z0-9_\-]*")]
    Ident,
}

fn block_comment(lex: &mut logos::Lexer<RawToken>) -> FilterResult<(), RawError> {
    let rest = lex.remainder();
    if let Some(end) = rest.find("*/") {
        lex.bump(end + 2);
        FilterResult::Skip
    } else {
        lex.bump(rest.len());
        FilterResult::Error(LexErrorKind::UnterminatedComment.into())
    }
}

/// Extend a type token over a balanced `<...>` suffix. The list may not
/// contain whitespace or delimiters; `->` inside it does not close it.
/// An unclosed list is left for the next token.
fn type_args(lex: &mut logos::Lexer<RawToken>) {
    let rest = lex.remainder().as_bytes();
    if rest.first() != Some(&b'<') {
        return;
    }
    let mut depth = 0usize;
    let mut i = 0;
    while let Some(&b) = rest.get(i) {
        match b {
            b'<' => depth += 1,
            b'-' if rest.get(i + 1) == Some(&b'>') => i += 1,
            b'>' => {
                depth -= 1;
                if depth == 0 {
                    lex.bump(i + 1);
                    return;
                }
            }
            b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'[' | b']' | b'(' | b')' => return,
            _ => {}
        }
        i += 1;
    }
}

fn string(lex: &mut logos::Lexer<RawToken>) -> Result<String, RawError> {
    let (consumed, cooked) = escape::scan_string(lex.remainder());
    lex.bump(consumed);
    cooked.map_err(RawError::from)
}

fn split_sign(slice: &str) -> (bool, &str) {
    match slice.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, slice),
    }
}

fn apply_sign(negative: bool, magnitude: u64) -> Result<i64, RawError> {
    if negative {
        if magnitude == 1u64 << 63 {
            return Ok(i64::MIN);
        }
        i64::try_from(magnitude)
            .map(|v| -v)
            .map_err(|_| LexErrorKind::IntOverflow.into())
    } else {
        i64::try_from(magnitude).map_err(|_| LexErrorKind::IntOverflow.into())
    }
}

fn decimal_int(lex: &mut logos::Lexer<RawToken>) -> Result<i64, RawError> {
    let (negative, digits) = split_sign(lex.slice());
    let digits: String = digits.chars().filter(|&c| c != '_').collect();
    let magnitude = digits
        .parse::<u64>()
        .map_err(|_| RawError::from(LexErrorKind::IntOverflow))?;
    apply_sign(negative, magnitude)
}

fn radix_int(lex: &mut logos::Lexer<RawToken>) -> Result<i64, RawError> {
    let (negative, body) = split_sign(lex.slice());
    let radix = match body.as_bytes().get(1) {
        Some(b'x' | b'X') => 16,
        Some(b'o' | b'O') => 8,
        _ => 2,
    };
    let digits: String = body[2..].chars().filter(|&c| c != '_').collect();
    if digits.is_empty() {
        return Err(LexErrorKind::MissingDigits { radix }.into());
    }
    if let Some(digit) = digits.chars().find(|c| !c.is_digit(radix)) {
        return Err(LexErrorKind::InvalidDigit { digit, radix }.into());
    }
    let magnitude = u64::from_str_radix(&digits, radix)
        .map_err(|_| RawError::from(LexErrorKind::IntOverflow))?;
    apply_sign(negative, magnitude)
}

fn frac(lex: &mut logos::Lexer<RawToken>) -> Result<f64, RawError> {
    let text: String = lex.slice().chars().filter(|&c| c != '_').collect();
    text.parse::<f64>()
        .map_err(|_| LexErrorKind::InvalidFrac.into())
}

/// Convert a raw token to a `TokenKind`, interning strings.
fn convert_token(raw: RawToken, slice: &str, interner: &StringInterner) -> TokenKind {
    match raw {
        RawToken::LBracket => TokenKind::LBracket,
        RawToken::RBracket => TokenKind::RBracket,
        RawToken::LParen => TokenKind::LParen,
        RawToken::RParen => TokenKind::RParen,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::Colon => TokenKind::Colon,
        RawToken::Comma => TokenKind::Comma,
        RawToken::True => TokenKind::Bool(true),
        RawToken::False => TokenKind::Bool(false),
        RawToken::Int(n) | RawToken::RadixInt(n) => TokenKind::Int(n),
        RawToken::Frac(f) => TokenKind::Frac(f.to_bits()),
        RawToken::Str(s) => TokenKind::Str(interner.intern(&s)),
        RawToken::Type => TokenKind::Type(interner.intern(&slice[1..])),
        RawToken::Op => TokenKind::Op(interner.intern(slice)),
        RawToken::Ident => TokenKind::Ident(interner.intern(slice)),
        // Filtered by its callback; never emitted.
        RawToken::BlockComment => TokenKind::Error,
    }
}

/// Lazy, restartable token stream over one source text.
pub struct Lexer<'a> {
    source: &'a str,
    interner: &'a StringInterner,
    inner: logos::Lexer<'a, RawToken>,
    errors: Vec<LexError>,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str, interner: &'a StringInterner) -> Self {
        Lexer {
            source,
            interner,
            inner: RawToken::lexer(source),
            errors: Vec::new(),
            finished: false,
        }
    }

    /// Errors seen so far.
    pub fn errors(&self) -> &[LexError] {
        &self.errors
    }

    /// Rewind to the start of the source, discarding recorded errors.
    pub fn restart(&mut self) {
        self.inner = RawToken::lexer(self.source);
        self.errors.clear();
        self.finished = false;
    }

    fn eof_span(&self) -> Span {
        Span::point(u32::try_from(self.source.len()).unwrap_or(u32::MAX))
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if self.finished {
            return None;
        }
        match self.inner.next() {
            Some(Ok(raw)) => {
                let span = Span::from_range(self.inner.span());
                let kind = convert_token(raw, self.inner.slice(), self.interner);
                Some(Token::new(kind, span))
            }
            Some(Err(err)) => {
                let span = Span::from_range(self.inner.span());
                let kind = err.into_kind(self.inner.slice());
                self.errors.push(LexError { span, kind });
                Some(Token::new(TokenKind::Error, span))
            }
            None => {
                self.finished = true;
                Some(Token::new(TokenKind::Eof, self.eof_span()))
            }
        }
    }
}

/// Result of batch lexing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LexOutput {
    pub tokens: TokenList,
    pub errors: Vec<LexError>,
}

impl LexOutput {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Lex source code into a `TokenList` plus errors.
pub fn lex(source: &str, interner: &StringInterner) -> LexOutput {
    let mut lexer = Lexer::new(source, interner);
    let tokens: TokenList = lexer.by_ref().collect();
    let errors = std::mem::take(&mut lexer.errors);
    tracing::trace!(tokens = tokens.len(), errors = errors.len(), "lexed source");
    LexOutput { tokens, errors }
}
