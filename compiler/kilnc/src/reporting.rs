//! Diagnostic Rendering
//!
//! Converts the structured problems of every stage into user-facing
//! [`Diagnostic`]s. Stages say *what* went wrong; this module decides how
//! it is shown: error code, message, labelled spans and notes.
//!
//! Each problem type implements [`IntoDiagnostic`]. Parse errors that stop
//! at a token the lexer already rejected render to `None` so the same
//! problem is not reported twice.

use kiln_codegen::CodegenError;
use kiln_diagnostic::{Diagnostic, ErrorCode};
use kiln_lexer::{LexError, LexErrorKind};
use kiln_lir::{LowerProblem, LowerWarning, VerifyError};
use kiln_parse::{ParseError, ParseErrorKind};
use kiln_types::{ProblemKind, TypeProblem, TypeWarning, WarningKind};

/// Render a stage problem as a diagnostic.
pub trait IntoDiagnostic {
    fn into_diagnostic(&self) -> Option<Diagnostic>;
}

impl IntoDiagnostic for LexError {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        let (code, label) = match &self.kind {
            LexErrorKind::UnterminatedString => (ErrorCode::E0001, "string starts here"),
            LexErrorKind::UnterminatedComment => (ErrorCode::E0002, "comment starts here"),
            LexErrorKind::InvalidDigit { .. }
            | LexErrorKind::MissingDigits { .. }
            | LexErrorKind::InvalidFrac => (ErrorCode::E0003, "in this literal"),
            LexErrorKind::IntOverflow => (ErrorCode::E0004, "literal out of range"),
            LexErrorKind::InvalidEscape(_) => (ErrorCode::E0005, "unknown escape"),
            LexErrorKind::UnexpectedChar(_) => (ErrorCode::E0006, "not valid here"),
        };
        let diag = Diagnostic::error(code)
            .with_message(self.kind.to_string())
            .with_label(self.span, label);
        Some(match &self.kind {
            LexErrorKind::IntOverflow => diag.with_note("`!int` holds signed 64-bit values"),
            LexErrorKind::InvalidEscape(_) => {
                diag.with_note("valid escapes are \\n, \\r, \\t, \\0, \\\\, \\' and \\\"")
            }
            _ => diag,
        })
    }
}

impl IntoDiagnostic for ParseError {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        let code = match &self.kind {
            ParseErrorKind::UnexpectedToken { .. } => ErrorCode::E1001,
            ParseErrorKind::UnclosedDelimiter => ErrorCode::E1002,
            ParseErrorKind::UnmatchedClose => ErrorCode::E1003,
            ParseErrorKind::InvalidForm(_) => ErrorCode::E1004,
            ParseErrorKind::MissingDefault => ErrorCode::E1005,
            ParseErrorKind::InvalidType(_) => ErrorCode::E1006,
            ParseErrorKind::InvalidOperatorDecl(_) => ErrorCode::E1007,
            ParseErrorKind::ErrorToken => return None,
        };
        let diag = Diagnostic::error(code)
            .with_message(self.kind.to_string())
            .with_label(self.span, "here");
        Some(match &self.kind {
            ParseErrorKind::UnclosedDelimiter => diag.with_note("the form is never closed"),
            ParseErrorKind::MissingDefault => {
                diag.with_note("the last clause of a pattern conditional is its default")
            }
            _ => diag,
        })
    }
}

impl IntoDiagnostic for TypeProblem {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        let diag = Diagnostic::error(self.code()).with_message(self.kind.to_string());
        Some(match &self.kind {
            ProblemKind::Redeclaration { previous, .. } => diag
                .with_label(self.span, "redeclared here")
                .with_secondary_label(*previous, "first declared here")
                .with_note("a nested `scope` may shadow an outer binding"),
            ProblemKind::Mutation { declared, .. } => diag
                .with_label(self.span, "cannot assign")
                .with_secondary_label(*declared, "declared as `const` here")
                .with_note("declare it with `var` to make it mutable"),
            ProblemKind::UnboundName { .. } => diag.with_label(self.span, "not found"),
            ProblemKind::Mismatch { expected, .. } => {
                diag.with_label(self.span, format!("expected `{expected}`"))
            }
            _ => diag.with_label(self.span, "here"),
        })
    }
}

impl IntoDiagnostic for TypeWarning {
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        let diag = Diagnostic::warning(self.code()).with_message(self.message());
        Some(match &self.kind {
            WarningKind::Shadowed { outer, .. } => diag
                .with_label(self.span, "shadowing binding")
                .with_secondary_label(*outer, "outer binding"),
            WarningKind::Unreachable => diag.with_label(self.span, "never executed"),
            WarningKind::Unused { .. } => diag.with_label(self.span, "never read"),
        })
    }
}

impl IntoDiagnostic for LowerWarning {
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        Some(
            Diagnostic::warning(self.code())
                .with_message(self.message())
                .with_label(self.span, "allocated here")
                .with_note("release it with `free` before the scope ends"),
        )
    }
}

impl IntoDiagnostic for LowerProblem {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(self.code())
                .with_message(self.to_string())
                .with_label(self.span(), "while lowering this"),
        )
    }
}

impl IntoDiagnostic for VerifyError {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        Some(
            Diagnostic::error(ErrorCode::E9001)
                .with_message(format!("optimised IR failed verification: {self}")),
        )
    }
}

impl IntoDiagnostic for CodegenError {
    #[cold]
    fn into_diagnostic(&self) -> Option<Diagnostic> {
        let code = match self {
            CodegenError::UnsupportedOperation { .. } => ErrorCode::E5001,
            CodegenError::UnresolvedSymbol { .. } | CodegenError::InvalidTarget { .. } => {
                ErrorCode::E9001
            }
        };
        let diag = Diagnostic::error(code).with_message(self.to_string());
        Some(match self.span() {
            Some(span) => diag.with_label(span, "in this expression"),
            None => diag,
        })
    }
}
