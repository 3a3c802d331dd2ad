//! Error codes for all compiler diagnostics.
//!
//! Each code is a stable identifier (e.g. `E1001`) whose first digit names
//! the compiler stage. Warnings use a `W` prefix.

use std::fmt;

/// Error codes for all compiler diagnostics.
///
/// Format: E#### where the first digit indicates the stage:
/// - E0xxx: Lexer errors
/// - E1xxx: Parser errors
/// - E2xxx: Name resolution and type errors
/// - E5xxx: Codegen errors
/// - E9xxx: Internal compiler errors
/// - W0xxx: Warnings
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum ErrorCode {
    // Lexer Errors (E0xxx)
    /// Unterminated string literal
    E0001,
    /// Unterminated block comment
    E0002,
    /// Invalid digit for the literal's radix
    E0003,
    /// Integer literal does not fit in 64 bits
    E0004,
    /// Invalid escape sequence
    E0005,
    /// Unexpected character
    E0006,

    // Parser Errors (E1xxx)
    /// Unexpected token
    E1001,
    /// Unclosed delimiter
    E1002,
    /// Closing delimiter without a matching opener
    E1003,
    /// Malformed special form
    E1004,
    /// Pattern conditional without a default result
    E1005,
    /// Malformed type annotation
    E1006,
    /// Malformed operator declaration
    E1007,

    // Semantic Errors (E2xxx)
    /// Name is not bound in any enclosing scope
    E2001,
    /// Name already declared in the same scope
    E2002,
    /// Assignment to an immutable binding
    E2003,
    /// Type mismatch
    E2004,
    /// Wrong number of arguments
    E2005,
    /// Generic type variables cannot be unified
    E2006,
    /// Static index out of bounds
    E2007,
    /// Type cannot be inferred
    E2008,
    /// Control transfer outside a valid context
    E2009,
    /// Invalid resource handling
    E2010,

    // Codegen Errors (E5xxx)
    /// Operation not supported by the target machine
    E5001,

    // Internal Errors (E9xxx)
    /// Internal compiler error
    E9001,
    /// Too many errors
    E9002,

    // Warnings (W0xxx)
    /// Heap allocation released implicitly at scope exit
    W005,
    /// Unreachable code
    W006,
    /// Unused binding
    W007,
    /// Binding shadows an outer binding
    W008,
}

impl ErrorCode {
    pub const ALL: &'static [ErrorCode] = &[
        ErrorCode::E0001,
        ErrorCode::E0002,
        ErrorCode::E0003,
        ErrorCode::E0004,
        ErrorCode::E0005,
        ErrorCode::E0006,
        ErrorCode::E1001,
        ErrorCode::E1002,
        ErrorCode::E1003,
        ErrorCode::E1004,
        ErrorCode::E1005,
        ErrorCode::E1006,
        ErrorCode::E1007,
        ErrorCode::E2001,
        ErrorCode::E2002,
        ErrorCode::E2003,
        ErrorCode::E2004,
        ErrorCode::E2005,
        ErrorCode::E2006,
        ErrorCode::E2007,
        ErrorCode::E2008,
        ErrorCode::E2009,
        ErrorCode::E2010,
        ErrorCode::E5001,
        ErrorCode::E9001,
        ErrorCode::E9002,
        ErrorCode::W005,
        ErrorCode::W006,
        ErrorCode::W007,
        ErrorCode::W008,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::E0001 => "E0001",
            ErrorCode::E0002 => "E0002",
            ErrorCode::E0003 => "E0003",
            ErrorCode::E0004 => "E0004",
            ErrorCode::E0005 => "E0005",
            ErrorCode::E0006 => "E0006",
            ErrorCode::E1001 => "E1001",
            ErrorCode::E1002 => "E1002",
            ErrorCode::E1003 => "E1003",
            ErrorCode::E1004 => "E1004",
            ErrorCode::E1005 => "E1005",
            ErrorCode::E1006 => "E1006",
            ErrorCode::E1007 => "E1007",
            ErrorCode::E2001 => "E2001",
            ErrorCode::E2002 => "E2002",
            ErrorCode::E2003 => "E2003",
            ErrorCode::E2004 => "E2004",
            ErrorCode::E2005 => "E2005",
            ErrorCode::E2006 => "E2006",
            ErrorCode::E2007 => "E2007",
            ErrorCode::E2008 => "E2008",
            ErrorCode::E2009 => "E2009",
            ErrorCode::E2010 => "E2010",
            ErrorCode::E5001 => "E5001",
            ErrorCode::E9001 => "E9001",
            ErrorCode::E9002 => "E9002",
            ErrorCode::W005 => "W005",
            ErrorCode::W006 => "W006",
            ErrorCode::W007 => "W007",
            ErrorCode::W008 => "W008",
        }
    }

    pub fn is_lexer_error(&self) -> bool {
        self.as_str().starts_with("E0")
    }

    pub fn is_parser_error(&self) -> bool {
        self.as_str().starts_with("E1")
    }

    pub fn is_type_error(&self) -> bool {
        self.as_str().starts_with("E2")
    }

    pub fn is_codegen_error(&self) -> bool {
        self.as_str().starts_with("E5")
    }

    pub fn is_internal_error(&self) -> bool {
        self.as_str().starts_with("E9")
    }

    pub fn is_warning(&self) -> bool {
        self.as_str().starts_with('W')
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorCode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ErrorCode::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or(())
    }
}

#[cfg(test)]
mod tests;
