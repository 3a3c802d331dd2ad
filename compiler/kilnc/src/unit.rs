//! One compilation unit moving through the pipeline.
//!
//! ```text
//! parse_unit   lex + parse            (phase 1, no cross-unit knowledge)
//! exports      registration only      (feeds the GlobalIndex)
//! finish_unit  check -> lower -> optimise -> verify -> codegen
//! ```
//!
//! Every stage reports into the unit's own [`DiagnosticQueue`]. The first
//! stage to report an error ends the unit; its output goes no further.

use std::fmt;

use kiln_codegen::{generate, ObjectModule};
use kiln_diagnostic::{Diagnostic, DiagnosticQueue, ErrorCode, Reported, Severity};
use kiln_ir::{Module, StringInterner};
use kiln_lir::{lower_module, optimize_program, verify_program, PassStats, Program};
use kiln_types::{check_module_with_imports, collect_signatures, FunctionSig};
use tracing::debug;

use crate::index::GlobalIndex;
use crate::reporting::IntoDiagnostic;
use crate::CompileOptions;

/// Source text of one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceUnit {
    /// Becomes the object module's name.
    pub name: String,
    pub source: String,
}

impl SourceUnit {
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        SourceUnit {
            name: name.into(),
            source: source.into(),
        }
    }
}

/// Pipeline stages, in order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Parse,
    Check,
    Lower,
    Optimize,
    Codegen,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Parse => "parse",
            Stage::Check => "check",
            Stage::Lower => "lower",
            Stage::Optimize => "optimize",
            Stage::Codegen => "codegen",
        })
    }
}

/// Everything one unit produced.
#[derive(Clone, Debug)]
pub struct UnitOutput {
    pub name: String,
    /// Ordered by position; warnings included.
    pub diagnostics: Vec<Reported>,
    /// Stage that reported the unit's first error.
    pub failed: Option<Stage>,
    /// Optimised IR, once lowering succeeded.
    pub program: Option<Program>,
    pub object: Option<ObjectModule>,
    pub stats: PassStats,
}

impl UnitOutput {
    pub fn has_errors(&self) -> bool {
        self.failed.is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Reported> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Reported> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity() == Severity::Warning)
    }

    /// Codes of every diagnostic, in report order.
    pub fn codes(&self) -> Vec<ErrorCode> {
        self.diagnostics.iter().map(Reported::code).collect()
    }
}

/// A unit after phase 1.
pub(crate) struct ParsedUnit<'u> {
    pub(crate) unit: &'u SourceUnit,
    pub(crate) queue: DiagnosticQueue,
    /// `None` when lexing or parsing reported an error.
    pub(crate) module: Option<Module>,
}

impl ParsedUnit<'_> {
    /// Signatures this unit offers the index.
    pub(crate) fn exports(&self, interner: &StringInterner) -> Vec<FunctionSig> {
        self.module
            .as_ref()
            .map(|module| collect_signatures(module, interner))
            .unwrap_or_default()
    }
}

fn report<'a, P: IntoDiagnostic + 'a>(
    queue: &mut DiagnosticQueue,
    problems: impl IntoIterator<Item = &'a P>,
) {
    queue.extend(problems.into_iter().filter_map(P::into_diagnostic));
}

#[tracing::instrument(level = "debug", skip_all, fields(unit = %unit.name))]
pub(crate) fn parse_unit<'u>(
    unit: &'u SourceUnit,
    options: &CompileOptions,
    interner: &StringInterner,
) -> ParsedUnit<'u> {
    let mut queue = DiagnosticQueue::with_config(&unit.source, options.diagnostic_config());
    let (output, lex_errors) = kiln_parse::parse_source(&unit.source, interner);
    report(&mut queue, &lex_errors);
    report(&mut queue, &output.errors);

    let module = if queue.has_errors() {
        None
    } else {
        Some(output.module)
    };
    ParsedUnit {
        unit,
        queue,
        module,
    }
}

/// Run the remaining stages of a unit that parsed.
#[tracing::instrument(level = "debug", skip_all, fields(unit = %parsed.unit.name))]
pub(crate) fn finish_unit(
    parsed: ParsedUnit<'_>,
    id: usize,
    index: &GlobalIndex,
    options: &CompileOptions,
    interner: &StringInterner,
) -> UnitOutput {
    let ParsedUnit {
        unit,
        mut queue,
        module,
    } = parsed;
    let mut output = UnitOutput {
        name: unit.name.clone(),
        diagnostics: Vec::new(),
        failed: None,
        program: None,
        object: None,
        stats: PassStats::default(),
    };

    let failed = match module {
        Some(module) => run_stages(&module, id, index, options, interner, &mut queue, &mut output),
        None => Some(Stage::Parse),
    };

    output.failed = failed;
    output.diagnostics = queue.flush();
    debug!(
        failed = ?output.failed,
        diagnostics = output.diagnostics.len(),
        "unit finished"
    );
    output
}

/// Check, lower, optimise and generate code. Returns the failing stage.
fn run_stages(
    module: &Module,
    id: usize,
    index: &GlobalIndex,
    options: &CompileOptions,
    interner: &StringInterner,
    queue: &mut DiagnosticQueue,
    output: &mut UnitOutput,
) -> Option<Stage> {
    for conflict in index.conflicts_in(id) {
        queue.push(
            Diagnostic::error(ErrorCode::E2002)
                .with_message(format!(
                    "`{}` is already defined by another unit",
                    interner.lookup(conflict.name)
                ))
                .with_label(conflict.span, "second definition")
                .with_note(format!(
                    "the definition in unit #{} is the one exported",
                    conflict.previous_unit
                )),
        );
    }

    let checked = check_module_with_imports(module, interner, index.signatures());
    report(queue, &checked.warnings);
    report(queue, &checked.problems);
    if queue.has_errors() {
        return Some(Stage::Check);
    }

    let lowered = lower_module(module, &checked, interner);
    report(queue, &lowered.warnings);
    report(queue, &lowered.problems);
    if !lowered.problems.is_empty() {
        return Some(Stage::Lower);
    }

    let mut program = lowered.program;
    output.stats = optimize_program(&mut program, &options.passes);
    if let Err(error) = verify_program(&program) {
        report(queue, [&error]);
        return Some(Stage::Optimize);
    }

    let generated = generate(&program, &options.target, interner, &output.name);
    output.program = Some(program);
    match generated {
        Ok(object) => {
            output.object = Some(object);
            None
        }
        Err(errors) => {
            report(queue, &errors);
            Some(Stage::Codegen)
        }
    }
}
