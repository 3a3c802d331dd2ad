//! Diagnostic system for structured error reporting.
//!
//! Every stage reports problems as [`Diagnostic`]s carrying:
//! - an error code for searchability
//! - a message saying what went wrong
//! - a primary span saying where
//! - optional context labels and notes
//!
//! Diagnostics are collected per compilation unit in a [`DiagnosticQueue`],
//! which resolves line/column positions and orders them by location.
//! Warnings never block compilation.

mod diagnostic;
mod error_code;
pub mod queue;
pub mod span_utils;

pub use diagnostic::{Diagnostic, Label, Severity};
pub use error_code::ErrorCode;
pub use queue::{DiagnosticConfig, DiagnosticQueue, Reported};
