//! Pass 1: signatures and global constants.

use kiln_ir::{ConstItem, Item, Name, Param, Span, TypeExpr};

use super::{CheckResult, Checker};
use crate::consts;
use crate::symbols::{Mutability, Storage, Symbol};
use crate::{FnKind, FunctionSig, GlobalConst, ProblemKind, Type, TypeProblem};

impl Checker<'_> {
    pub(super) fn register_items(&mut self, items: &[&Item]) {
        self.register_signatures(items);
        for item in items {
            if let Item::Const(c) = item {
                if let Err(problem) = self.register_const(c) {
                    self.fail_form(problem, 0);
                }
            }
        }
    }

    /// Functions, operators and externs. Done before constants so that a
    /// constant calling a function is reported as non-constant rather than
    /// unbound.
    pub(super) fn register_signatures(&mut self, items: &[&Item]) {
        for item in items {
            let outcome = match item {
                Item::Func(f) => {
                    self.register_fn(f.name, &f.params, f.ret.as_ref(), FnKind::Func, f.span)
                }
                Item::Operator(o) => {
                    self.register_fn(o.symbol, &o.params, o.ret.as_ref(), FnKind::Operator, o.span)
                }
                Item::Extern(e) => e.funcs.iter().try_for_each(|f| {
                    let kind = FnKind::Extern { library: e.library };
                    self.register_fn(f.name, &f.params, f.ret.as_ref(), kind, f.span)
                }),
                Item::Const(_) | Item::Expr(_) | Item::Module(_) => Ok(()),
            };
            if let Err(problem) = outcome {
                self.fail_form(problem, 0);
            }
        }
    }

    fn register_fn(
        &mut self,
        name: Name,
        params: &[Param],
        ret: Option<&TypeExpr>,
        kind: FnKind,
        span: Span,
    ) -> CheckResult<()> {
        let mut type_vars = Vec::new();
        let params: Vec<(Name, Type)> = params
            .iter()
            .map(|p| {
                let ty = p.ty.as_ref().map_or(Type::Int, Type::from_annotation);
                ty.collect_vars(&mut type_vars);
                (p.name, ty)
            })
            .collect();

        let mut ret = ret.map(Type::from_annotation);
        if let Some(ret) = &ret {
            let mut ret_vars = Vec::new();
            ret.collect_vars(&mut ret_vars);
            if let Some(var) = ret_vars.iter().find(|v| !type_vars.contains(v)) {
                return Err(TypeProblem::new(
                    span,
                    ProblemKind::CannotInfer {
                        what: format!(
                            "`{}`: it appears only in the return type",
                            self.interner.lookup(*var)
                        ),
                    },
                ));
            }
        }

        let storage = match kind {
            FnKind::Func => Storage::Function,
            FnKind::Operator => Storage::Operator,
            FnKind::Extern { library } => {
                if !type_vars.is_empty() {
                    return Err(TypeProblem::invalid(span, "extern functions cannot be generic"));
                }
                ret = Some(ret.unwrap_or(Type::None));
                Storage::Extern(library)
            }
        };

        let sig = FunctionSig {
            name,
            params,
            ret,
            type_vars,
            kind,
            tail_recursive: false,
            span,
        };
        let ty = sig.fn_type().unwrap_or_else(|| {
            Type::Function(sig.param_types().cloned().collect(), Box::new(Type::None))
        });
        self.declare(Symbol::new(name, ty, Mutability::Const, storage, span))?;
        self.sig_index.insert(name, self.sigs.len());
        self.sigs.push(sig);
        Ok(())
    }

    fn register_const(&mut self, item: &ConstItem) -> CheckResult<()> {
        let found = self.check_expr(&item.init, false)?;
        let ty = match &item.ty {
            Some(annotation) => {
                let expected = self.resolve_annotation(annotation, item.span)?;
                self.expect_assignable(&expected, &item.init, &found)?;
                expected
            }
            None => found,
        };
        let value = consts::eval(&item.init, &self.const_values)
            .map_err(|message| TypeProblem::invalid(item.init.span, message))?;
        self.declare(Symbol::new(
            item.name,
            ty.clone(),
            Mutability::Const,
            Storage::GlobalConst,
            item.span,
        ))?;
        self.const_values.insert(item.name, value.clone());
        self.result.globals.push(GlobalConst {
            name: item.name,
            ty,
            value,
            span: item.span,
        });
        Ok(())
    }
}
