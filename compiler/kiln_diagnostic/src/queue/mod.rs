//! Per-unit diagnostic queue.
//!
//! Collects diagnostics from every stage of one compilation unit, resolves
//! their line/column positions, enforces the error limit and deduplicates
//! repeated syntax errors on the same line. [`DiagnosticQueue::flush`]
//! returns them ordered by position.

use kiln_ir::Span;

use crate::span_utils::LineOffsetTable;
use crate::{Diagnostic, ErrorCode, Severity};

/// Configuration for diagnostic processing.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DiagnosticConfig {
    /// Maximum number of errors before further errors are dropped (0 = unlimited).
    pub error_limit: usize,
    /// Drop a second syntax error reported on the same line.
    pub deduplicate: bool,
}

impl Default for DiagnosticConfig {
    fn default() -> Self {
        DiagnosticConfig {
            error_limit: 20,
            deduplicate: true,
        }
    }
}

impl DiagnosticConfig {
    /// Create a config with no limits (for testing).
    pub fn unlimited() -> Self {
        DiagnosticConfig {
            error_limit: 0,
            deduplicate: false,
        }
    }
}

/// A diagnostic with its resolved 1-based position.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Reported {
    pub diagnostic: Diagnostic,
    pub line: u32,
    pub column: u32,
}

impl Reported {
    pub fn severity(&self) -> Severity {
        self.diagnostic.severity
    }

    pub fn code(&self) -> ErrorCode {
        self.diagnostic.code
    }

    pub fn span(&self) -> Span {
        self.diagnostic.primary_span().unwrap_or(Span::DUMMY)
    }
}

impl std::fmt::Display for Reported {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}: {}", self.line, self.column, self.diagnostic)
    }
}

/// Queue for collecting and sorting the diagnostics of one unit.
#[derive(Clone, Debug)]
pub struct DiagnosticQueue {
    diagnostics: Vec<Reported>,
    lines: LineOffsetTable,
    error_count: usize,
    dropped_errors: usize,
    last_syntax_line: Option<u32>,
    config: DiagnosticConfig,
}

impl DiagnosticQueue {
    /// Create a queue for `source` with default configuration.
    pub fn new(source: &str) -> Self {
        Self::with_config(source, DiagnosticConfig::default())
    }

    pub fn with_config(source: &str, config: DiagnosticConfig) -> Self {
        DiagnosticQueue {
            diagnostics: Vec::new(),
            lines: LineOffsetTable::build(source),
            error_count: 0,
            dropped_errors: 0,
            last_syntax_line: None,
            config,
        }
    }

    /// Add a diagnostic. Returns `false` if it was filtered out.
    pub fn push(&mut self, diag: Diagnostic) -> bool {
        let (line, column) = diag
            .primary_span()
            .map_or((1, 1), |span| self.lines.offset_to_line_col(span.start));

        if diag.is_error() {
            if self.limit_reached() {
                self.dropped_errors += 1;
                return false;
            }
            if diag.code.is_parser_error() {
                if self.config.deduplicate && self.last_syntax_line == Some(line) {
                    return false;
                }
                self.last_syntax_line = Some(line);
            }
            self.error_count += 1;
        }

        self.diagnostics.push(Reported {
            diagnostic: diag,
            line,
            column,
        });
        true
    }

    pub fn extend(&mut self, diags: impl IntoIterator<Item = Diagnostic>) {
        for diag in diags {
            self.push(diag);
        }
    }

    /// Check if the error limit has been reached.
    pub fn limit_reached(&self) -> bool {
        self.config.error_limit > 0 && self.error_count >= self.config.error_limit
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.diagnostic.is_warning())
            .count()
    }

    /// Get diagnostics without clearing the queue.
    pub fn peek(&self) -> impl Iterator<Item = &Reported> {
        self.diagnostics.iter()
    }

    /// Sort diagnostics by position and return them, clearing the queue.
    ///
    /// When errors were dropped by the limit a trailing E9002 note is added.
    pub fn flush(&mut self) -> Vec<Reported> {
        self.diagnostics
            .sort_by_key(|d| (d.line, d.column, d.diagnostic.severity != Severity::Error));

        let mut result: Vec<Reported> = self.diagnostics.drain(..).collect();
        if self.dropped_errors > 0 {
            let (line, column) = result.last().map_or((1, 1), |r| (r.line, r.column));
            result.push(Reported {
                diagnostic: too_many_errors(self.config.error_limit, self.dropped_errors),
                line,
                column,
            });
        }

        self.error_count = 0;
        self.dropped_errors = 0;
        self.last_syntax_line = None;
        result
    }
}

/// Create a "too many errors" diagnostic.
#[cold]
pub fn too_many_errors(limit: usize, dropped: usize) -> Diagnostic {
    Diagnostic::error(ErrorCode::E9002)
        .with_message(format!("aborting after {limit} errors"))
        .with_note(format!("{dropped} further errors were not reported"))
}

#[cfg(test)]
mod tests;
