//! Compilation options.

use kiln_codegen::TargetMachine;
use kiln_diagnostic::DiagnosticConfig;
use kiln_lir::PassConfig;

/// Options shared by every unit of one compilation.
#[derive(Clone, Debug)]
pub struct CompileOptions {
    /// Which optimizer passes run, and their parameters.
    pub passes: PassConfig,
    pub target: TargetMachine,
    /// Errors reported per unit before the rest are dropped (0 = unlimited).
    pub error_limit: usize,
    /// Process units on the rayon pool instead of one after another.
    pub parallel: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            passes: PassConfig::default(),
            target: TargetMachine::default(),
            error_limit: DiagnosticConfig::default().error_limit,
            parallel: true,
        }
    }
}

impl CompileOptions {
    /// No optimizer passes; IR reaches codegen as the builder left it.
    pub fn unoptimized() -> Self {
        CompileOptions {
            passes: PassConfig::none(),
            ..CompileOptions::default()
        }
    }

    pub(crate) fn diagnostic_config(&self) -> DiagnosticConfig {
        DiagnosticConfig {
            error_limit: self.error_limit,
            ..DiagnosticConfig::default()
        }
    }
}
