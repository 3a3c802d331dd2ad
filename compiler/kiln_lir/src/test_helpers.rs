//! Shared test utilities for lowering and the passes.
//!
//! Only compiled in test builds.

use kiln_ir::StringInterner;

use crate::ir::{BlockId, Function, Program, SlotId, VarId};
use crate::lower::{lower_module, LowerWarning};
use crate::{read_function, verify_program};

/// Shorthand for `VarId::new(n)`.
#[allow(dead_code)]
pub(crate) fn v(n: u32) -> VarId {
    VarId::new(n)
}

/// Shorthand for `BlockId::new(n)`.
pub(crate) fn b(n: u32) -> BlockId {
    BlockId::new(n)
}

/// Shorthand for `SlotId::new(n)`.
#[allow(dead_code)]
pub(crate) fn s(n: u32) -> SlotId {
    SlotId::new(n)
}

/// A lowered source unit.
pub(crate) struct Lowered {
    pub(crate) interner: StringInterner,
    pub(crate) program: Program,
    pub(crate) warnings: Vec<LowerWarning>,
}

impl Lowered {
    pub(crate) fn function(&self, name: &str) -> &Function {
        let name = self.interner.intern(name);
        self.program
            .function(name)
            .unwrap_or_else(|| panic!("no function `{}`", self.interner.lookup(name)))
    }

    pub(crate) fn function_mut(&mut self, name: &str) -> &mut Function {
        let name = self.interner.intern(name);
        self.program
            .functions
            .iter_mut()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("no function with that name"))
    }

    /// Printed form of a function, without spans.
    pub(crate) fn text(&self, name: &str) -> String {
        strip_spans(&self.function(name).display(&self.interner).to_string())
    }
}

/// Parse, check and lower `source`, asserting every stage succeeds and
/// the program verifies.
pub(crate) fn lower_source(source: &str) -> Lowered {
    let interner = StringInterner::new();
    let (output, lex_errors) = kiln_parse::parse_source(source, &interner);
    assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
    assert!(output.errors.is_empty(), "parse errors: {:?}", output.errors);
    let module = output.module;

    let result = kiln_types::check_module(&module, &interner);
    assert!(!result.has_errors(), "type problems: {:?}", result.problems);

    let lowered = lower_module(&module, &result, &interner);
    assert!(
        lowered.problems.is_empty(),
        "lowering problems: {:?}",
        lowered.problems
    );
    if let Err(e) = verify_program(&lowered.program) {
        panic!("{e}\n{}", lowered.program.display(&interner));
    }
    Lowered {
        interner,
        program: lowered.program,
        warnings: lowered.warnings,
    }
}

/// Printed form without the ` @start..end` span suffixes.
pub(crate) fn strip_spans(text: &str) -> String {
    text.lines()
        .map(|line| match line.rsplit_once(" @") {
            Some((head, span))
                if span.contains("..") && span.chars().all(|c| c.is_ascii_digit() || c == '.') =>
            {
                head
            }
            _ => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read a function from its printed form.
pub(crate) fn read(text: &str, interner: &StringInterner) -> Function {
    read_function(text, interner).unwrap_or_else(|e| panic!("{e}\n{text}"))
}
