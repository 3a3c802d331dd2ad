//! AST to IR lowering.
//!
//! Consumes a checked module and its [`TypeCheckResult`] and produces a
//! [`Program`]. Lowering assumes the check succeeded; anything it cannot
//! make sense of is an internal problem that drops the affected function
//! and leaves the others intact.
//!
//! # Architecture
//!
//! - [`FunctionBuilder`](builder::FunctionBuilder): block-at-a-time
//!   construction with explicit positioning and terminators
//! - [`ScopeStack`](scope::ScopeStack): name to slot mapping plus the exit
//!   actions (implicit releases, `atomic` section ends) each frame owes
//! - `expr`: expressions, bindings, indexing, calls
//! - `control_flow`: conditionals, loops, jumps, resource scopes
//!
//! Generic functions are lowered once per distinct instantiation reached
//! from non-generic code, under the mangled instance name.

mod builder;
mod control_flow;
mod expr;
mod scope;

use std::collections::VecDeque;

use kiln_diagnostic::ErrorCode;
use kiln_ir::{Expr, Item, Module, Name, Span, StringInterner};
use kiln_types::{FnKind, FunctionSig, Substitution, Type, TypeCheckResult};
use rustc_hash::FxHashSet;
use thiserror::Error;
use tracing::{debug, trace};

use crate::ir::{ExternSymbol, Function, FunctionFlags, Global, Program, Ty, VarId};

use builder::FunctionBuilder;
use scope::{LoopContext, ScopeStack};

/// Library providing the runtime entry points lowering calls into.
pub const RUNTIME_LIBRARY: &str = "kiln_rt";

/// Name of the function collecting a unit's top-level free expressions.
pub const TOPLEVEL_FUNCTION: &str = "__toplevel";

/// Result of lowering one module.
#[derive(Clone, Debug, Default)]
pub struct LowerOutput {
    pub program: Program,
    pub warnings: Vec<LowerWarning>,
    pub problems: Vec<LowerProblem>,
}

/// A non-fatal finding of the lowering stage.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LowerWarning {
    pub span: Span,
    pub kind: LowerWarningKind,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LowerWarningKind {
    /// Heap allocation never freed in its scope; released at scope exit.
    ImplicitRelease { name: Option<String> },
}

impl LowerWarning {
    pub fn code(&self) -> ErrorCode {
        match self.kind {
            LowerWarningKind::ImplicitRelease { .. } => ErrorCode::W005,
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            LowerWarningKind::ImplicitRelease { name: Some(name) } => {
                format!("`{name}` is never freed; it is released when its scope ends")
            }
            LowerWarningKind::ImplicitRelease { name: None } => {
                "allocation is never freed; it is released when its scope ends".to_string()
            }
        }
    }
}

/// Lowering failure confined to one function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LowerProblem {
    #[error("internal error lowering `{function}`: {message}")]
    Internal {
        function: String,
        message: String,
        span: Span,
    },
}

impl LowerProblem {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::E9001
    }

    pub fn span(&self) -> Span {
        match self {
            LowerProblem::Internal { span, .. } => *span,
        }
    }
}

/// Problem inside a function, before the function name is attached.
#[derive(Debug)]
struct Internal {
    message: String,
    span: Span,
}

impl Internal {
    fn new(span: Span, message: impl Into<String>) -> Self {
        Internal {
            message: message.into(),
            span,
        }
    }
}

type LowerResult<T> = Result<T, Internal>;

/// Lower a checked module.
pub fn lower_module(module: &Module, result: &TypeCheckResult, interner: &StringInterner) -> LowerOutput {
    let items = module.flat_items();
    let mut lowerer = ModuleLowerer::new(result, interner);
    let mut functions = Vec::new();

    for global in &result.globals {
        match Ty::from_type(&global.ty) {
            Some(ty) => lowerer.globals.push(Global {
                name: global.name,
                ty,
                init: global.value.clone(),
            }),
            None => lowerer.problems.push(LowerProblem::Internal {
                function: interner.lookup(global.name).to_string(),
                message: "global constant has no concrete type".to_string(),
                span: global.span,
            }),
        }
    }

    for &item in &items {
        let Some(source) = FnSource::of(item) else {
            continue;
        };
        let Some(sig) = result.signature(source.name) else {
            continue;
        };
        // Redeclarations keep the first body.
        if sig.span != source.span {
            continue;
        }
        if sig.is_generic() {
            lowerer.generics.push(source);
            continue;
        }
        let job = FnJob {
            name: source.name,
            sig,
            body: source.body,
            span: source.span,
            subst: Substitution::new(),
            flags: FunctionFlags::empty(),
        };
        functions.extend(lowerer.lower_function(job));
    }

    let toplevel: Vec<&Expr> = items
        .iter()
        .filter_map(|item| match item {
            Item::Expr(expr) => Some(expr),
            _ => None,
        })
        .collect();
    if !toplevel.is_empty() {
        functions.extend(lowerer.lower_toplevel(&toplevel));
    }

    while let Some(instance) = lowerer.pending.pop_front() {
        let Some(source) = lowerer
            .generics
            .iter()
            .find(|source| source.name == instance.generic)
            .copied()
        else {
            continue;
        };
        let Some(sig) = result.signature(source.name) else {
            continue;
        };
        trace!(
            instance = interner.lookup(instance.name),
            "lowering generic instance"
        );
        let job = FnJob {
            name: instance.name,
            sig,
            body: source.body,
            span: source.span,
            subst: instance.subst,
            flags: FunctionFlags::GENERIC_INSTANCE,
        };
        functions.extend(lowerer.lower_function(job));
    }

    debug!(
        functions = functions.len(),
        externs = lowerer.externs.len(),
        warnings = lowerer.warnings.len(),
        "lowered module"
    );
    LowerOutput {
        program: Program {
            functions,
            globals: lowerer.globals,
            externs: lowerer.externs,
        },
        warnings: lowerer.warnings,
        problems: lowerer.problems,
    }
}

/// Declaration providing a function body.
#[derive(Clone, Copy)]
struct FnSource<'a> {
    name: Name,
    body: &'a [Expr],
    span: Span,
}

impl<'a> FnSource<'a> {
    fn of(item: &'a Item) -> Option<Self> {
        match item {
            Item::Func(f) => Some(FnSource {
                name: f.name,
                body: &f.body,
                span: f.span,
            }),
            Item::Operator(op) => Some(FnSource {
                name: op.symbol,
                body: &op.body,
                span: op.span,
            }),
            _ => None,
        }
    }
}

/// One function to lower: a declaration, or an instance of a generic one.
struct FnJob<'a> {
    name: Name,
    sig: &'a FunctionSig,
    body: &'a [Expr],
    span: Span,
    subst: Substitution,
    flags: FunctionFlags,
}

struct PendingInstance {
    generic: Name,
    subst: Substitution,
    name: Name,
}

/// Module-wide lowering state shared by every function.
struct ModuleLowerer<'a> {
    result: &'a TypeCheckResult,
    interner: &'a StringInterner,
    generics: Vec<FnSource<'a>>,
    globals: Vec<Global>,
    externs: Vec<ExternSymbol>,
    instances: FxHashSet<Name>,
    pending: VecDeque<PendingInstance>,
    warnings: Vec<LowerWarning>,
    problems: Vec<LowerProblem>,
}

impl<'a> ModuleLowerer<'a> {
    fn new(result: &'a TypeCheckResult, interner: &'a StringInterner) -> Self {
        ModuleLowerer {
            result,
            interner,
            generics: Vec::new(),
            globals: Vec::new(),
            externs: Vec::new(),
            instances: FxHashSet::default(),
            pending: VecDeque::new(),
            warnings: Vec::new(),
            problems: Vec::new(),
        }
    }

    fn lower_function(&mut self, job: FnJob<'_>) -> Option<Function> {
        let name = job.name;
        let span = job.span;
        let lowered = FnLowerer::lower(self, job);
        self.accept(name, span, lowered)
    }

    fn lower_toplevel(&mut self, exprs: &[&Expr]) -> Option<Function> {
        let name = self.interner.intern(TOPLEVEL_FUNCTION);
        let span = exprs
            .iter()
            .map(|e| e.span)
            .reduce(Span::merge)
            .unwrap_or(Span::DUMMY);
        let lowered = FnLowerer::lower_toplevel(self, name, exprs);
        self.accept(name, span, lowered)
    }

    fn accept(&mut self, name: Name, span: Span, lowered: LowerResult<Function>) -> Option<Function> {
        match lowered {
            Ok(func) => {
                trace!(
                    function = self.interner.lookup(name),
                    blocks = func.blocks.len(),
                    instrs = func.instr_count(),
                    "lowered function"
                );
                Some(func)
            }
            Err(internal) => {
                let span = if internal.span == Span::DUMMY {
                    span
                } else {
                    internal.span
                };
                self.problems.push(LowerProblem::Internal {
                    function: self.interner.lookup(name).to_string(),
                    message: internal.message,
                    span,
                });
                None
            }
        }
    }

    fn warn(&mut self, warning: LowerWarning) {
        // Generic instances lower the same body more than once.
        if !self.warnings.contains(&warning) {
            self.warnings.push(warning);
        }
    }

    /// Record a symbol resolved outside the unit, once.
    fn register_extern(&mut self, symbol: ExternSymbol) {
        if !self.externs.iter().any(|e| e.name == symbol.name) {
            self.externs.push(symbol);
        }
    }

    /// Name of the instance of `generic` under `subst`, queueing it for
    /// lowering the first time it is seen.
    fn instantiate(&mut self, generic: Name, subst: Substitution) -> Name {
        let mangled = subst.mangle(self.interner.lookup(generic), self.interner);
        let name = self.interner.intern(&mangled);
        if self.instances.insert(name) {
            self.pending.push_back(PendingInstance {
                generic,
                subst,
                name,
            });
        }
        name
    }
}

/// Lowers one function body.
pub(crate) struct FnLowerer<'a, 'm> {
    module: &'m mut ModuleLowerer<'a>,
    builder: FunctionBuilder,
    scopes: ScopeStack,
    loop_ctx: Option<LoopContext>,
    subst: Substitution,
    name: Name,
}

impl<'a, 'm> FnLowerer<'a, 'm> {
    fn lower(module: &'m mut ModuleLowerer<'a>, job: FnJob<'_>) -> LowerResult<Function> {
        let sig = job.sig;
        let ret = sig
            .ret
            .as_ref()
            .ok_or_else(|| Internal::new(job.span, "return type was never inferred"))?;
        let ret = concrete(&job.subst.apply(ret), job.span)?;

        let mut this = FnLowerer {
            module,
            builder: FunctionBuilder::new(job.name, ret),
            scopes: ScopeStack::default(),
            loop_ctx: None,
            subst: job.subst,
            name: job.name,
        };
        let mut flags = job.flags;
        if sig.tail_recursive {
            flags |= FunctionFlags::TAIL_RECURSIVE;
        }
        this.builder.func_mut().flags = flags;

        this.scopes.push();
        let entry = this.builder.current_block();
        let mut params = Vec::with_capacity(sig.params.len());
        for (name, ty) in &sig.params {
            let ty = this.concrete(ty, job.span)?;
            let var = this.builder.add_block_param(entry, ty.clone());
            let slot = this.builder.new_slot(Some(*name), ty);
            this.builder.emit_store(slot, var, None);
            this.scopes.bind(*name, slot);
            params.push(var);
        }
        this.builder.func_mut().params = params;

        let value = this.lower_body(job.body)?;
        this.finish_body(value)
    }

    fn lower_toplevel(module: &'m mut ModuleLowerer<'a>, name: Name, exprs: &[&Expr]) -> LowerResult<Function> {
        let mut this = FnLowerer {
            module,
            builder: FunctionBuilder::new(name, Ty::None),
            scopes: ScopeStack::default(),
            loop_ctx: None,
            subst: Substitution::new(),
            name,
        };
        this.builder.func_mut().flags = FunctionFlags::TOPLEVEL;
        this.scopes.push();
        for (i, expr) in exprs.iter().enumerate() {
            if this.builder.is_terminated() {
                break;
            }
            let rest: Vec<&Expr> = exprs[i + 1..].to_vec();
            this.lower_statement(expr, StatementRest::Refs(&rest), false)?;
        }
        this.finish_body(None)
    }

    /// Close the outermost frame and return from the function.
    fn finish_body(mut self, value: Option<VarId>) -> LowerResult<Function> {
        let exits = self.scopes.pop();
        if !self.builder.is_terminated() {
            self.emit_exit_actions(&exits);
            if self.builder.func().return_ty.is_none() {
                self.builder.terminate_return(None);
            } else if let Some(value) = value {
                self.builder.terminate_return(Some(value));
            } else {
                // Only reachable past a `loop` the checker let stand in for
                // the value.
                self.builder.terminate_unreachable();
            }
        }
        Ok(self.builder.finish())
    }

    // Types

    /// Concrete type of a checked expression in this instance.
    fn expr_ty(&self, expr: &Expr) -> LowerResult<Ty> {
        let ty = self
            .module
            .result
            .expr_type(expr.id)
            .ok_or_else(|| Internal::new(expr.span, "expression was never typed"))?;
        self.concrete(ty, expr.span)
    }

    fn concrete(&self, ty: &Type, span: Span) -> LowerResult<Ty> {
        concrete(&self.subst.apply(ty), span)
    }

    fn lookup(&self, name: Name) -> &'a str {
        self.module.interner.lookup(name)
    }
}

fn concrete(ty: &Type, span: Span) -> LowerResult<Ty> {
    Ty::from_type(ty).ok_or_else(|| Internal::new(span, "type is not concrete after substitution"))
}

/// Signature of a runtime entry point.
fn runtime_signature(symbol: &str) -> (Vec<Ty>, Ty) {
    match symbol {
        "rt_mutex_create" => (Vec::new(), Ty::Ptr),
        "rt_mutex_lock" | "rt_mutex_unlock" => (vec![Ty::Ptr], Ty::None),
        _ => (Vec::new(), Ty::None),
    }
}

/// Whether a signature belongs to an `extern` block, and which library.
fn extern_library(sig: &FunctionSig) -> Option<Name> {
    match sig.kind {
        FnKind::Extern { library } => Some(library),
        FnKind::Func | FnKind::Operator => None,
    }
}

/// Forms following a statement in its body.
#[derive(Clone, Copy)]
enum StatementRest<'e> {
    Slice(&'e [Expr]),
    Refs(&'e [&'e Expr]),
}

impl<'e> StatementRest<'e> {
    fn any(self, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
        match self {
            StatementRest::Slice(exprs) => exprs.iter().any(|e| e.any(pred)),
            StatementRest::Refs(exprs) => exprs.iter().any(|e| e.any(pred)),
        }
    }

    fn last(self) -> Option<&'e Expr> {
        match self {
            StatementRest::Slice(exprs) => exprs.last(),
            StatementRest::Refs(exprs) => exprs.last().copied(),
        }
    }
}
