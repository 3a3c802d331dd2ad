//! Module-level semantic checker.
//!
//! Checking runs in three passes over the flattened items:
//!
//! ```text
//! Pass 1: Registration
//!   - signatures of functions, operators and externs into the global frame
//!   - global constants, checked and evaluated in source order
//!
//! Pass 2: Function bodies, in source order
//!   - omitted return types are inferred here, so a call to a function
//!     whose body comes later needs an annotation
//!
//! Pass 3: Top-level free expressions, in one frame of their own
//! ```
//!
//! Each top-level form fails fast on its first error; sibling forms are
//! still checked so one run reports every independent problem.

mod expr;
mod signatures;

use kiln_ir::{Expr, ExprId, ExprKind, FuncDecl, Item, Literal, Module, Name, OperatorDecl, Param, Span, StringInterner, TypeExpr};
use rustc_hash::FxHashMap;
use tracing::{debug, trace};

use crate::consts::ConstValue;
use crate::symbols::{Declared, Mutability, Storage, Symbol, SymbolError, SymbolTable};
use crate::{
    FunctionSig, Len, ProblemKind, Type, TypeCheckResult, TypeProblem, TypeWarning, WarningKind,
};

type CheckResult<T = Type> = Result<T, TypeProblem>;

/// Check a module on its own.
pub fn check_module(module: &Module, interner: &StringInterner) -> TypeCheckResult {
    let no_imports = FxHashMap::default();
    check_module_with_imports(module, interner, &no_imports)
}

/// Check a module, resolving otherwise unbound callees against signatures
/// exported by other units.
pub fn check_module_with_imports(
    module: &Module,
    interner: &StringInterner,
    imports: &FxHashMap<Name, FunctionSig>,
) -> TypeCheckResult {
    let items = module.flat_items();
    let mut checker = Checker::new(module, interner, imports);
    checker.register_items(&items);
    checker.check_bodies(&items);
    checker.check_toplevel(&items);
    checker.finish()
}

/// Run registration only and return the unit's signatures, for building
/// a cross-unit index before bodies are checked.
pub fn collect_signatures(module: &Module, interner: &StringInterner) -> Vec<FunctionSig> {
    let no_imports = FxHashMap::default();
    let items = module.flat_items();
    let mut checker = Checker::new(module, interner, &no_imports);
    checker.register_signatures(&items);
    checker.sigs
}

/// State for the function whose body is being checked.
struct FnContext {
    name: Name,
    declared_ret: Option<Type>,
    /// Type of the first `return` operand when the return type is omitted.
    inferred: Option<Type>,
    type_vars: Vec<Name>,
}

pub(crate) struct Checker<'a> {
    interner: &'a StringInterner,
    imports: &'a FxHashMap<Name, FunctionSig>,
    symbols: SymbolTable,
    sigs: Vec<FunctionSig>,
    sig_index: FxHashMap<Name, usize>,
    const_values: FxHashMap<Name, ConstValue>,
    result: TypeCheckResult,
    func: Option<FnContext>,
    loop_depth: u32,
}

impl<'a> Checker<'a> {
    fn new(
        module: &Module,
        interner: &'a StringInterner,
        imports: &'a FxHashMap<Name, FunctionSig>,
    ) -> Self {
        let result = TypeCheckResult {
            expr_types: vec![None; module.expr_count as usize],
            ..TypeCheckResult::default()
        };
        Checker {
            interner,
            imports,
            symbols: SymbolTable::new(),
            sigs: Vec::new(),
            sig_index: FxHashMap::default(),
            const_values: FxHashMap::default(),
            result,
            func: None,
            loop_depth: 0,
        }
    }

    fn finish(mut self) -> TypeCheckResult {
        self.result.signatures = self.sigs;
        debug!(
            signatures = self.result.signatures.len(),
            problems = self.result.problems.len(),
            warnings = self.result.warnings.len(),
            "checked module"
        );
        self.result
    }

    /// Record a failed top-level form and restore checker state.
    fn fail_form(&mut self, problem: TypeProblem, depth: u32) {
        trace!(error = %problem, "form failed");
        self.result.problems.push(problem);
        self.symbols.truncate(depth);
        self.func = None;
        self.loop_depth = 0;
    }

    // Pass 2

    fn check_bodies(&mut self, items: &[&Item]) {
        for item in items {
            match item {
                Item::Func(FuncDecl {
                    name,
                    params,
                    body,
                    span,
                    ..
                })
                | Item::Operator(OperatorDecl {
                    symbol: name,
                    params,
                    body,
                    span,
                    ..
                }) => self.check_function(*name, params, body, *span),
                _ => {}
            }
        }
    }

    fn check_function(&mut self, name: Name, params: &[Param], body: &[Expr], span: Span) {
        let Some(&idx) = self.sig_index.get(&name) else {
            return;
        };
        // A redeclared function keeps the first signature; its body is not
        // checked against someone else's.
        if self.sigs[idx].span != span {
            return;
        }
        trace!(function = self.interner.lookup(name), "checking body");
        let sig = self.sigs[idx].clone();
        self.func = Some(FnContext {
            name,
            declared_ret: sig.ret.clone(),
            inferred: None,
            type_vars: sig.type_vars.clone(),
        });
        self.loop_depth = 0;
        let depth = self.symbols.depth();
        self.symbols.enter_scope();

        match self.check_function_body(idx, &sig, params, body) {
            Ok(()) => {
                self.leave_scope();
                self.func = None;
            }
            Err(problem) => self.fail_form(problem, depth),
        }
    }

    fn check_function_body(
        &mut self,
        idx: usize,
        sig: &FunctionSig,
        params: &[Param],
        body: &[Expr],
    ) -> CheckResult<()> {
        for ((name, ty), param) in sig.params.iter().zip(params) {
            self.declare(Symbol::new(
                *name,
                ty.clone(),
                Mutability::Var,
                Storage::Stack,
                param.span,
            ))?;
        }

        let body_ty = self.check_body(body, true)?;
        let ends_in_jump = body
            .last()
            .is_some_and(|last| diverges(last) || matches!(last.kind, ExprKind::Loop(_)));
        let inferred = self.func.as_mut().and_then(|ctx| ctx.inferred.take());

        match &sig.ret {
            Some(ret) => {
                if !ends_in_jump && *ret != Type::None {
                    match body.last() {
                        Some(last) => self.expect_assignable(ret, last, &body_ty)?,
                        None => {
                            return Err(TypeProblem::mismatch(
                                sig.span,
                                self.show(ret),
                                self.show(&Type::None),
                            ))
                        }
                    }
                }
            }
            None => {
                let ret = match inferred {
                    Some(from_return) => {
                        if let (false, Some(last)) = (ends_in_jump, body.last()) {
                            self.expect_assignable(&from_return, last, &body_ty)?;
                        }
                        from_return
                    }
                    None if ends_in_jump => Type::None,
                    None => body_ty,
                };
                trace!(ret = %ret.display(self.interner), "inferred return type");
                let fn_ty = Type::Function(sig.param_types().cloned().collect(), Box::new(ret.clone()));
                self.symbols.set_global_type(sig.name, fn_ty);
                self.sigs[idx].ret = Some(ret);
            }
        }
        Ok(())
    }

    // Pass 3

    fn check_toplevel(&mut self, items: &[&Item]) {
        self.func = None;
        self.symbols.enter_scope();
        let depth = self.symbols.depth();
        for item in items {
            if let Item::Expr(expr) = item {
                self.loop_depth = 0;
                if let Err(problem) = self.check_expr(expr, false) {
                    self.fail_form(problem, depth);
                }
            }
        }
        self.leave_scope();
    }

    // Shared helpers

    fn show(&self, ty: &Type) -> String {
        ty.display(self.interner).to_string()
    }

    fn name_str(&self, name: Name) -> String {
        self.interner.lookup(name).to_string()
    }

    fn record(&mut self, id: ExprId, ty: Type) {
        let idx = id.raw() as usize;
        if idx >= self.result.expr_types.len() {
            self.result.expr_types.resize(idx + 1, None);
        }
        self.result.expr_types[idx] = Some(ty);
    }

    fn type_of(&self, id: ExprId) -> Option<&Type> {
        self.result.expr_types.get(id.raw() as usize)?.as_ref()
    }

    fn warn(&mut self, span: Span, kind: WarningKind) {
        self.result.warnings.push(TypeWarning { span, kind });
    }

    /// Declare in the current frame, turning table errors into problems.
    fn declare(&mut self, symbol: Symbol) -> CheckResult<()> {
        let name = symbol.name;
        let span = symbol.span;
        let local = symbol.storage == Storage::Stack;
        match self.symbols.declare(symbol) {
            Ok(Declared { shadows }) => {
                if let (Some(outer), true) = (shadows, local) {
                    let name = self.name_str(name);
                    self.warn(span, WarningKind::Shadowed { name, outer });
                }
                Ok(())
            }
            Err(err) => Err(self.symbol_problem(err, name, span)),
        }
    }

    fn symbol_problem(&self, err: SymbolError, name: Name, span: Span) -> TypeProblem {
        let name = self.name_str(name);
        let kind = match err {
            SymbolError::Unbound => ProblemKind::UnboundName { name },
            SymbolError::Redeclared { previous } => ProblemKind::Redeclaration { name, previous },
            SymbolError::Mutation { declared } => ProblemKind::Mutation { name, declared },
        };
        TypeProblem::new(span, kind)
    }

    /// Pop a frame, warning about locals that were never read.
    fn leave_scope(&mut self) {
        for symbol in self.symbols.exit_scope() {
            if symbol.storage != Storage::Stack || symbol.used {
                continue;
            }
            let name = self.interner.lookup(symbol.name);
            if name.starts_with('_') {
                continue;
            }
            self.warn(
                symbol.span,
                WarningKind::Unused {
                    name: name.to_string(),
                },
            );
        }
    }

    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> CheckResult<T>) -> CheckResult<T> {
        self.symbols.enter_scope();
        let result = f(self);
        if result.is_ok() {
            self.leave_scope();
        }
        result
    }

    fn in_loop<T>(&mut self, f: impl FnOnce(&mut Self) -> CheckResult<T>) -> CheckResult<T> {
        self.loop_depth += 1;
        let result = f(self);
        self.loop_depth -= 1;
        result
    }

    /// Resolve an annotation; type variables must belong to the enclosing
    /// generic function.
    fn resolve_annotation(&self, annotation: &TypeExpr, span: Span) -> CheckResult {
        let ty = Type::from_annotation(annotation);
        let mut vars = Vec::new();
        ty.collect_vars(&mut vars);
        let in_scope = self.func.as_ref().map_or(&[][..], |ctx| &ctx.type_vars[..]);
        if let Some(var) = vars.iter().find(|v| !in_scope.contains(v)) {
            return Err(TypeProblem::invalid(
                span,
                format!("unknown type variable `{}`", self.interner.lookup(*var)),
            ));
        }
        Ok(ty)
    }

    /// Give an untyped literal (or aggregate of literals) the expected type
    /// when it fits. Returns whether it did.
    fn coerce_literal(&mut self, expected: &Type, expr: &Expr) -> bool {
        let ok = match (&expr.kind, expected) {
            (ExprKind::Literal(Literal::Int(n)), _) => {
                expected.is_integer() && expected.fits_int_literal(*n)
            }
            (ExprKind::Literal(Literal::Frac(_)), _) => expected.is_fraction(),
            (ExprKind::Array(items), Type::Array(elem, Len::Fixed(n))) => {
                items.len() as u64 == *n && items.iter().all(|item| self.assignable(elem, item))
            }
            (ExprKind::Tuple(items), Type::Tuple(elems)) => {
                items.len() == elems.len()
                    && items
                        .iter()
                        .zip(elems)
                        .all(|(item, elem)| self.assignable(elem, item))
            }
            _ => false,
        };
        if ok {
            self.record(expr.id, expected.clone());
        }
        ok
    }

    fn assignable(&mut self, expected: &Type, expr: &Expr) -> bool {
        self.type_of(expr.id) == Some(expected) || self.coerce_literal(expected, expr)
    }

    /// Require `found` (the type of `expr`) to be assignable to `expected`.
    fn expect_assignable(&mut self, expected: &Type, expr: &Expr, found: &Type) -> CheckResult<()> {
        if expected == found || self.coerce_literal(expected, expr) {
            Ok(())
        } else {
            Err(TypeProblem::mismatch(
                expr.span,
                self.show(expected),
                self.show(found),
            ))
        }
    }
}

/// Whether control never falls out of `expr`.
fn diverges(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Break | ExprKind::Continue | ExprKind::Return(_) => true,
        ExprKind::Scope(body) => body.last().is_some_and(diverges),
        ExprKind::If {
            then_branch,
            else_branch: Some(else_branch),
            ..
        } => diverges(then_branch) && diverges(else_branch),
        _ => false,
    }
}

#[cfg(test)]
mod tests;
