//! Kiln Compiler Driver
//!
//! Runs source units through the whole pipeline:
//!
//! ```text
//! Lexer -> Parser -> Checker <-> SymbolTable -> IR Builder -> Optimizer -> Codegen
//! ```
//!
//! Every stage is a pure transformation of the previous stage's output.
//! [`compile_units`] parses all units in parallel, builds a read-only
//! [`GlobalIndex`] of the functions they export, then finishes each unit
//! in parallel against that index. Each unit collects its own diagnostics;
//! a unit whose stage reports an error goes no further, while the other
//! units continue.
//!
//! # Tracing
//!
//! Every stage emits `tracing` events. [`init_tracing`] installs a
//! subscriber filtered by `RUST_LOG`, e.g. `RUST_LOG=kiln_lir=debug`.

mod index;
mod options;
pub mod reporting;
mod unit;

use std::sync::Once;

use kiln_ir::StringInterner;
use rayon::prelude::*;
use tracing::debug;

pub use index::{Conflict, GlobalIndex};
pub use options::CompileOptions;
pub use unit::{SourceUnit, Stage, UnitOutput};

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber.
///
/// Does nothing unless `RUST_LOG` is set. Safe to call more than once;
/// only the first call has an effect.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}

/// Compile a set of units that may call each other's functions.
///
/// Outputs are in the order of `units`.
pub fn compile_units(
    units: &[SourceUnit],
    options: &CompileOptions,
    interner: &StringInterner,
) -> Vec<UnitOutput> {
    let parsed = for_each_unit(units, options.parallel, |unit| {
        unit::parse_unit(unit, options, interner)
    });

    let exports = for_each_unit(&parsed, options.parallel, |p| p.exports(interner));
    let index = GlobalIndex::build(exports.into_iter().enumerate());

    let outputs: Vec<UnitOutput> = if options.parallel {
        parsed
            .into_par_iter()
            .enumerate()
            .map(|(id, p)| unit::finish_unit(p, id, &index, options, interner))
            .collect()
    } else {
        parsed
            .into_iter()
            .enumerate()
            .map(|(id, p)| unit::finish_unit(p, id, &index, options, interner))
            .collect()
    };

    debug!(
        units = outputs.len(),
        failed = outputs.iter().filter(|o| o.has_errors()).count(),
        "compiled units"
    );
    outputs
}

/// Compile a single unit on the current thread.
pub fn compile_source(
    name: &str,
    source: &str,
    options: &CompileOptions,
    interner: &StringInterner,
) -> UnitOutput {
    let unit = SourceUnit::new(name, source);
    let parsed = unit::parse_unit(&unit, options, interner);
    unit::finish_unit(parsed, 0, &GlobalIndex::default(), options, interner)
}

fn for_each_unit<'a, T, R>(
    items: &'a [T],
    parallel: bool,
    f: impl Fn(&'a T) -> R + Sync + Send,
) -> Vec<R>
where
    T: Sync,
    R: Send,
{
    if parallel {
        items.par_iter().map(f).collect()
    } else {
        items.iter().map(f).collect()
    }
}
