//! Semantic errors and warnings.
//!
//! Types in messages are rendered when the problem is created, so a
//! problem is self-contained and needs no interner to display.

use kiln_diagnostic::ErrorCode;
use kiln_ir::Span;
use thiserror::Error;

/// A fatal semantic error.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind}")]
pub struct TypeProblem {
    pub span: Span,
    pub kind: ProblemKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ProblemKind {
    #[error("cannot find `{name}` in this scope")]
    UnboundName { name: String },

    #[error("`{name}` is already declared in this scope")]
    Redeclaration { name: String, previous: Span },

    #[error("cannot assign to constant `{name}`")]
    Mutation { name: String, declared: Span },

    #[error("type mismatch: expected `{expected}`, found `{found}`")]
    Mismatch { expected: String, found: String },

    #[error("`{callee}` takes {expected} argument(s) but {found} were supplied")]
    Arity {
        callee: String,
        expected: usize,
        found: usize,
    },

    #[error("`{var}` is bound to both `{first}` and `{second}`")]
    Unification {
        var: String,
        first: String,
        second: String,
    },

    #[error("index {index} is out of bounds for `{ty}`")]
    Bounds { index: i64, ty: String },

    #[error("cannot infer {what}")]
    CannotInfer { what: String },

    #[error("{0}")]
    Scope(String),

    #[error("{0}")]
    Resource(String),

    /// Any other ill-typed construct.
    #[error("{0}")]
    Invalid(String),
}

impl TypeProblem {
    pub fn new(span: Span, kind: ProblemKind) -> Self {
        TypeProblem { span, kind }
    }

    pub fn invalid(span: Span, message: impl Into<String>) -> Self {
        Self::new(span, ProblemKind::Invalid(message.into()))
    }

    pub fn mismatch(span: Span, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::new(
            span,
            ProblemKind::Mismatch {
                expected: expected.into(),
                found: found.into(),
            },
        )
    }

    pub fn code(&self) -> ErrorCode {
        match &self.kind {
            ProblemKind::UnboundName { .. } => ErrorCode::E2001,
            ProblemKind::Redeclaration { .. } => ErrorCode::E2002,
            ProblemKind::Mutation { .. } => ErrorCode::E2003,
            ProblemKind::Mismatch { .. } | ProblemKind::Invalid(_) => ErrorCode::E2004,
            ProblemKind::Arity { .. } => ErrorCode::E2005,
            ProblemKind::Unification { .. } => ErrorCode::E2006,
            ProblemKind::Bounds { .. } => ErrorCode::E2007,
            ProblemKind::CannotInfer { .. } => ErrorCode::E2008,
            ProblemKind::Scope(_) => ErrorCode::E2009,
            ProblemKind::Resource(_) => ErrorCode::E2010,
        }
    }
}

/// A non-fatal finding. Warnings never block code generation.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct TypeWarning {
    pub span: Span,
    pub kind: WarningKind,
}

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub enum WarningKind {
    /// Forms after `break`, `continue` or `return` in the same body.
    Unreachable,
    /// A local binding that is never read.
    Unused { name: String },
    /// A binding that hides one from an enclosing scope.
    Shadowed { name: String, outer: Span },
}

impl TypeWarning {
    pub fn code(&self) -> ErrorCode {
        match self.kind {
            WarningKind::Unreachable => ErrorCode::W006,
            WarningKind::Unused { .. } => ErrorCode::W007,
            WarningKind::Shadowed { .. } => ErrorCode::W008,
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            WarningKind::Unreachable => "unreachable code".to_string(),
            WarningKind::Unused { name } => format!("unused binding `{name}`"),
            WarningKind::Shadowed { name, .. } => {
                format!("`{name}` shadows a binding from an enclosing scope")
            }
        }
    }
}
