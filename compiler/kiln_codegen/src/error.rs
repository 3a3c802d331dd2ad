//! Code generation errors.

use kiln_ir::Span;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CodegenError {
    /// An IR instruction with no pattern on the target, such as a vector
    /// operation of a width the target lacks.
    #[error("`{instruction}` on {width} lanes in `{function}` is not supported by target `{target}`")]
    UnsupportedOperation {
        function: String,
        instruction: String,
        width: u32,
        target: String,
        span: Option<Span>,
    },
    #[error("call to unresolved symbol `{symbol}` in `{function}`")]
    UnresolvedSymbol {
        function: String,
        symbol: String,
        span: Option<Span>,
    },
    #[error("target `{target}` needs two scratch registers and at least one allocatable register")]
    InvalidTarget { target: String },
}

impl CodegenError {
    /// Source position of the offending instruction, if known.
    pub fn span(&self) -> Option<Span> {
        match self {
            CodegenError::UnsupportedOperation { span, .. }
            | CodegenError::UnresolvedSymbol { span, .. } => *span,
            CodegenError::InvalidTarget { .. } => None,
        }
    }
}
