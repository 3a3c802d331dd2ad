//! Tokens produced by the lexer.

use std::fmt;

use crate::{Name, Span};

/// Token kind.
///
/// Literal payloads are already decoded: integers are parsed, fraction
/// literals are stored as `f64` bits so the kind stays `Eq + Hash`, and
/// strings/identifiers are interned.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// Identifier atom (`fast_exp`, `mem-alloc`, `var`).
    Ident(Name),
    /// Integer literal in any radix.
    Int(i64),
    /// Fraction literal, stored as `f64::to_bits`.
    Frac(u64),
    /// String literal with escapes resolved.
    Str(Name),
    /// `true` / `false`.
    Bool(bool),
    /// Type annotation atom `!name`; the payload excludes the `!`.
    Type(Name),
    /// Operator symbol (`+`, `<=`, `<+>`).
    Op(Name),
    /// `->`
    Arrow,
    /// `:`
    Colon,
    /// `,`
    Comma,
    /// A lexeme the lexer rejected; the error is on the side channel.
    Error,
    /// End of input.
    Eof,
}

impl TokenKind {
    /// Human-readable description used in parse errors.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::LBracket => "`[`",
            TokenKind::RBracket => "`]`",
            TokenKind::LParen => "`(`",
            TokenKind::RParen => "`)`",
            TokenKind::Ident(_) => "identifier",
            TokenKind::Int(_) => "integer literal",
            TokenKind::Frac(_) => "fraction literal",
            TokenKind::Str(_) => "string literal",
            TokenKind::Bool(_) => "boolean literal",
            TokenKind::Type(_) => "type annotation",
            TokenKind::Op(_) => "operator",
            TokenKind::Arrow => "`->`",
            TokenKind::Colon => "`:`",
            TokenKind::Comma => "`,`",
            TokenKind::Error => "invalid token",
            TokenKind::Eof => "end of input",
        }
    }

    /// Whether this token opens a bracketed or parenthesised form.
    #[inline]
    pub fn is_open(&self) -> bool {
        matches!(self, TokenKind::LBracket | TokenKind::LParen)
    }

    /// Whether this token closes a bracketed or parenthesised form.
    #[inline]
    pub fn is_close(&self) -> bool {
        matches!(self, TokenKind::RBracket | TokenKind::RParen)
    }
}

/// A token with its source span.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    #[inline]
    pub const fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

/// Lexer output: a token sequence always terminated by `Eof`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TokenList {
    tokens: Vec<Token>,
}

impl TokenList {
    pub fn new() -> Self {
        TokenList { tokens: Vec::new() }
    }

    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<&Token> {
        self.tokens.get(idx)
    }

    pub fn as_slice(&self) -> &[Token] {
        &self.tokens
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    /// Token kinds only, for tests and debug dumps.
    pub fn kinds(&self) -> Vec<TokenKind> {
        self.tokens.iter().map(|t| t.kind).collect()
    }
}

impl std::ops::Index<usize> for TokenList {
    type Output = Token;

    fn index(&self, idx: usize) -> &Token {
        &self.tokens[idx]
    }
}

impl FromIterator<Token> for TokenList {
    fn from_iter<I: IntoIterator<Item = Token>>(iter: I) -> Self {
        TokenList {
            tokens: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}
