//! IR optimization passes.
//!
//! Every pass takes a `&mut Function`, returns how many changes it made and
//! leaves the function valid for [`verify_function`]. Passes share CFG
//! helpers through [`crate::graph`] and never call each other, except that
//! the pipeline reruns constant folding to clean up after unrolling.
//!
//! # Pipeline
//!
//! ```text
//! const_fold -> licm -> unroll (-> const_fold) -> vectorize -> dse -> tco
//! ```
//!
//! The order is fixed; [`PassConfig`] only switches passes on and off.

pub mod const_fold;
pub mod dse;
pub mod licm;
pub mod tco;
pub mod unroll;
pub mod vectorize;

use std::ops::AddAssign;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::ir::{Const, Function, Instr, Program, Value, VarId};
use crate::verify::verify_function;

/// Which passes run, and their parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PassConfig {
    pub const_fold: bool,
    pub licm: bool,
    pub unroll: bool,
    pub vectorize: bool,
    pub dse: bool,
    pub tco: bool,
    /// Copies of the loop body per unrolled iteration.
    pub unroll_factor: u32,
    /// Lanes per vector operation.
    pub vector_width: u32,
}

impl PassConfig {
    /// Every pass disabled.
    pub fn none() -> Self {
        PassConfig {
            const_fold: false,
            licm: false,
            unroll: false,
            vectorize: false,
            dse: false,
            tco: false,
            unroll_factor: 4,
            vector_width: 4,
        }
    }

    /// Every pass enabled.
    pub fn all() -> Self {
        PassConfig {
            const_fold: true,
            licm: true,
            unroll: true,
            vectorize: true,
            dse: true,
            tco: true,
            ..PassConfig::none()
        }
    }
}

impl Default for PassConfig {
    fn default() -> Self {
        PassConfig::all()
    }
}

/// Changes made by each pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PassStats {
    pub folded: usize,
    pub hoisted: usize,
    pub unrolled: usize,
    pub vectorized: usize,
    pub dead_stores: usize,
    pub tail_calls: usize,
}

impl PassStats {
    pub fn total(&self) -> usize {
        self.folded + self.hoisted + self.unrolled + self.vectorized + self.dead_stores + self.tail_calls
    }
}

impl AddAssign for PassStats {
    fn add_assign(&mut self, rhs: PassStats) {
        self.folded += rhs.folded;
        self.hoisted += rhs.hoisted;
        self.unrolled += rhs.unrolled;
        self.vectorized += rhs.vectorized;
        self.dead_stores += rhs.dead_stores;
        self.tail_calls += rhs.tail_calls;
    }
}

/// Run the enabled passes over one function.
pub fn optimize_function(func: &mut Function, config: &PassConfig) -> PassStats {
    let mut stats = PassStats::default();

    if config.const_fold {
        stats.folded += const_fold::fold_constants(func);
        check(func, "const_fold");
    }
    if config.licm {
        stats.hoisted += licm::hoist_invariants(func);
        check(func, "licm");
    }
    if config.unroll {
        let unrolled = unroll::unroll_loops(func, config.unroll_factor);
        stats.unrolled += unrolled;
        check(func, "unroll");
        if unrolled > 0 {
            stats.folded += const_fold::fold_constants(func);
            check(func, "const_fold");
        }
    }
    if config.vectorize {
        stats.vectorized += vectorize::vectorize(func, config.vector_width);
        check(func, "vectorize");
    }
    if config.dse {
        stats.dead_stores += dse::eliminate_dead_stores(func);
        check(func, "dse");
    }
    if config.tco {
        stats.tail_calls += tco::eliminate_tail_calls(func);
        check(func, "tco");
    }

    debug!(
        function = func.name.raw(),
        changes = stats.total(),
        "optimized function"
    );
    stats
}

/// Run the enabled passes over every function of a program.
pub fn optimize_program(program: &mut Program, config: &PassConfig) -> PassStats {
    let mut stats = PassStats::default();
    for func in &mut program.functions {
        stats += optimize_function(func, config);
    }
    stats
}

/// Verify after a pass in debug builds.
fn check(func: &Function, pass: &str) {
    if cfg!(debug_assertions) {
        if let Err(e) = verify_function(func) {
            panic!("invalid IR after {pass}: {e}");
        }
    }
}

/// Constant operand of every `Let` defining one.
pub(crate) fn constants(func: &Function) -> FxHashMap<VarId, Const> {
    func.blocks
        .iter()
        .flat_map(|block| &block.body)
        .filter_map(|instr| match instr {
            Instr::Let {
                dst,
                value: Value::Const(c),
            } => Some((*dst, *c)),
            _ => None,
        })
        .collect()
}
