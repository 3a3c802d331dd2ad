//! Expression checking.
//!
//! `tail` marks strict tail position: the expression's value is returned
//! from the enclosing function with nothing left to do afterwards.

use kiln_ir::{BinaryOp, Expr, ExprId, ExprKind, Literal, MutexOp, Name, ResourceBinding, Span, TypeExpr, UnaryOp};
use kiln_stack::ensure_sufficient_stack;

use super::{diverges, CheckResult, Checker};
use crate::symbols::{Mutability, Storage, Symbol};
use crate::{FunctionSig, Instantiation, Len, ProblemKind, Substitution, Type, TypeProblem, UnifyError, WarningKind};

impl Checker<'_> {
    /// Check `expr`, record its type and return it.
    pub(super) fn check_expr(&mut self, expr: &Expr, tail: bool) -> CheckResult {
        let ty = ensure_sufficient_stack(|| self.check_expr_inner(expr, tail))?;
        self.record(expr.id, ty.clone());
        Ok(ty)
    }

    fn check_expr_inner(&mut self, expr: &Expr, tail: bool) -> CheckResult {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(match lit {
                Literal::Int(_) => Type::Int,
                Literal::Frac(_) => Type::Frac,
                Literal::Bool(_) => Type::Bool,
                Literal::Str(_) => Type::Str,
            }),
            ExprKind::Ident(name) => self.check_ident(*name, expr.span),
            ExprKind::Call { callee, args } => self.check_call(expr, *callee, args, tail),
            ExprKind::Binary { op, lhs, rhs } => self.check_binary(*op, lhs, rhs),
            ExprKind::Unary { op, operand } => self.check_unary(*op, operand),
            ExprKind::VarDecl { name, ty, init } => {
                self.check_decl(expr.span, *name, ty.as_ref(), init, Mutability::Var)
            }
            ExprKind::ConstDecl { name, ty, init } => {
                self.check_decl(expr.span, *name, ty.as_ref(), init, Mutability::Const)
            }
            ExprKind::Set { name, value } => self.check_set(*name, value, expr.span),
            ExprKind::SetIndex {
                target,
                index,
                value,
            } => self.check_set_index(expr, target, index, value),
            ExprKind::Scope(body) => self.scoped(|this| this.check_body(body, tail)),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => self.check_if(cond, then_branch, else_branch.as_deref(), tail),
            ExprKind::While { cond, body, .. } => {
                self.expect_condition(cond)?;
                self.in_loop(|this| this.scoped(|this| this.check_body(body, false)))?;
                Ok(Type::None)
            }
            ExprKind::For {
                init,
                cond,
                step,
                body,
            } => self.scoped(|this| {
                this.check_expr(init, false)?;
                this.expect_condition(cond)?;
                this.in_loop(|this| {
                    this.scoped(|this| this.check_body(body, false))?;
                    this.check_expr(step, false)
                })?;
                Ok(Type::None)
            }),
            ExprKind::Loop(body) => {
                self.in_loop(|this| this.scoped(|this| this.check_body(body, false)))?;
                Ok(Type::None)
            }
            ExprKind::Break | ExprKind::Continue => {
                if self.loop_depth == 0 {
                    let form = if matches!(expr.kind, ExprKind::Break) {
                        "break"
                    } else {
                        "continue"
                    };
                    return Err(TypeProblem::new(
                        expr.span,
                        ProblemKind::Scope(format!("`{form}` outside of a loop")),
                    ));
                }
                Ok(Type::None)
            }
            ExprKind::Return(value) => self.check_return(value.as_deref(), expr.span),
            ExprKind::Index { target, index } => self.check_index(expr.id, target, index),
            ExprKind::Array(items) => self.check_array(items, expr.span),
            ExprKind::Tuple(items) => {
                let mut types = Vec::with_capacity(items.len());
                for item in items {
                    types.push(self.check_expr(item, false)?);
                }
                Ok(Type::Tuple(types))
            }
            ExprKind::Len(target) => match self.check_expr(target, false)? {
                Type::Array(..) => Ok(Type::Int),
                other => Err(TypeProblem::mismatch(target.span, "!array", self.show(&other))),
            },
            ExprKind::Alloc(size) => {
                let ty = self.check_expr(size, false)?;
                if !ty.is_integer() {
                    return Err(TypeProblem::mismatch(size.span, "!int", self.show(&ty)));
                }
                Ok(Type::Ptr)
            }
            ExprKind::Free(ptr) => self.check_free(ptr),
            ExprKind::WithResources { bindings, body } => {
                self.scoped(|this| this.check_with_resources(bindings, body))
            }
            ExprKind::Atomic(body) => self.scoped(|this| this.check_body(body, false)),
            ExprKind::Mutex { op, handle } => match (op, handle) {
                (MutexOp::Create, _) => Ok(Type::Ptr),
                (_, Some(handle)) => {
                    self.expect_type(&Type::Ptr, handle)?;
                    Ok(Type::None)
                }
                (_, None) => Err(TypeProblem::invalid(expr.span, "mutex operation needs a handle")),
            },
        }
    }

    /// Check a sequence of forms; the value is the last form's.
    pub(super) fn check_body(&mut self, body: &[Expr], tail: bool) -> CheckResult {
        let mut ty = Type::None;
        let mut jumped = false;
        for (i, expr) in body.iter().enumerate() {
            if jumped {
                self.warn(expr.span, WarningKind::Unreachable);
                jumped = false;
            }
            let is_last = i + 1 == body.len();
            ty = self.check_expr(expr, tail && is_last)?;
            if diverges(expr) && !is_last {
                jumped = true;
            }
        }
        Ok(ty)
    }

    fn expect_type(&mut self, expected: &Type, expr: &Expr) -> CheckResult<()> {
        let found = self.check_expr(expr, false)?;
        self.expect_assignable(expected, expr, &found)
    }

    fn expect_condition(&mut self, cond: &Expr) -> CheckResult<()> {
        let ty = self.check_expr(cond, false)?;
        if ty == Type::Bool {
            Ok(())
        } else {
            Err(TypeProblem::mismatch(cond.span, "!bool", self.show(&ty)))
        }
    }

    fn check_ident(&mut self, name: Name, span: Span) -> CheckResult {
        let problem = match self.symbols.lookup(name) {
            Ok(symbol) if !symbol.is_callable() => return Ok(symbol.ty.clone()),
            Ok(_) => TypeProblem::invalid(
                span,
                format!(
                    "`{0}` is a function; call it with `[{0} ...]`",
                    self.interner.lookup(name)
                ),
            ),
            Err(err) => self.symbol_problem(err, name, span),
        };
        Err(problem)
    }

    /// Find the signature of `callee`, locally or among the imports.
    fn resolve_callee(&mut self, callee: Name, span: Span) -> CheckResult<FunctionSig> {
        match self.symbols.lookup(callee) {
            Ok(symbol) if symbol.is_callable() => {}
            Ok(_) => {
                return Err(TypeProblem::invalid(
                    span,
                    format!("`{}` is not a function", self.interner.lookup(callee)),
                ))
            }
            Err(err) => {
                let Some(sig) = self.imports.get(&callee) else {
                    return Err(self.symbol_problem(err, callee, span));
                };
                if !self.result.imported.iter().any(|s| s.name == callee) {
                    self.result.imported.push(sig.clone());
                }
                return Ok(sig.clone());
            }
        }
        self.sig_index
            .get(&callee)
            .map(|&idx| self.sigs[idx].clone())
            .ok_or_else(|| {
                TypeProblem::invalid(
                    span,
                    format!("`{}` has no signature", self.interner.lookup(callee)),
                )
            })
    }

    fn check_call(&mut self, expr: &Expr, callee: Name, args: &[Expr], tail: bool) -> CheckResult {
        let sig = self.resolve_callee(callee, expr.span)?;
        if sig.params.len() != args.len() {
            return Err(TypeProblem::new(
                expr.span,
                ProblemKind::Arity {
                    callee: self.name_str(callee),
                    expected: sig.params.len(),
                    found: args.len(),
                },
            ));
        }

        let mut subst = Substitution::new();
        for ((_, param), arg) in sig.params.iter().zip(args) {
            let found = self.check_expr(arg, false)?;
            if param.has_vars() {
                subst
                    .unify(param, &found)
                    .map_err(|err| self.unify_problem(err, param, &found, arg.span))?;
            } else {
                self.expect_assignable(param, arg, &found)?;
            }
        }

        let Some(ret) = &sig.ret else {
            return Err(TypeProblem::new(
                expr.span,
                ProblemKind::CannotInfer {
                    what: format!(
                        "the return type of `{}` here; annotate it with `-> !type`",
                        self.interner.lookup(callee)
                    ),
                },
            ));
        };
        let ret = if sig.is_generic() {
            let ret = subst.apply(ret);
            self.result
                .instantiations
                .insert(expr.id, Instantiation { callee, subst });
            ret
        } else {
            ret.clone()
        };

        let is_self_call = self.func.as_ref().is_some_and(|ctx| ctx.name == callee);
        if is_self_call && tail {
            self.result.tail_calls.insert(expr.id);
            if let Some(&idx) = self.sig_index.get(&callee) {
                self.sigs[idx].tail_recursive = true;
            }
        }
        Ok(ret)
    }

    fn unify_problem(&self, err: UnifyError, param: &Type, found: &Type, span: Span) -> TypeProblem {
        match err {
            UnifyError::Mismatch => TypeProblem::mismatch(span, self.show(param), self.show(found)),
            UnifyError::Conflict { var, first, second } => {
                let render = |binding: &crate::Binding| match binding {
                    crate::Binding::Type(t) => self.show(t),
                    crate::Binding::Len(Len::Fixed(n)) => n.to_string(),
                    crate::Binding::Len(Len::Var(v)) => self.name_str(*v),
                };
                TypeProblem::new(
                    span,
                    ProblemKind::Unification {
                        var: self.name_str(var),
                        first: render(&first),
                        second: render(&second),
                    },
                )
            }
        }
    }

    /// Check both operands and settle on one operand type, letting an
    /// integer literal adopt the other side's sized type.
    fn operand_type(&mut self, lhs: &Expr, rhs: &Expr) -> CheckResult {
        let lt = self.check_expr(lhs, false)?;
        let rt = self.check_expr(rhs, false)?;
        if lt == rt || self.coerce_literal(&lt, rhs) {
            Ok(lt)
        } else if self.coerce_literal(&rt, lhs) {
            Ok(rt)
        } else {
            Err(TypeProblem::mismatch(rhs.span, self.show(&lt), self.show(&rt)))
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> CheckResult {
        let ty = self.operand_type(lhs, rhs)?;
        let integral = ty.is_integer() || matches!(ty, Type::Var(_));
        let (ok, wanted) = match op {
            BinaryOp::Mod => (integral, "an integer type"),
            _ if op.is_bitwise() => (integral, "an integer type"),
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div => {
                (ty.is_numeric(), "a numeric type")
            }
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                (ty.is_numeric(), "a numeric type")
            }
            BinaryOp::Eq | BinaryOp::NotEq => (
                ty.is_primitive() || matches!(ty, Type::Str | Type::Var(_)),
                "a scalar type",
            ),
            _ => (ty == Type::Bool, "!bool"),
        };
        if !ok {
            return Err(TypeProblem::mismatch(lhs.span.merge(rhs.span), wanted, self.show(&ty)));
        }
        if op.is_comparison() {
            Ok(Type::Bool)
        } else {
            Ok(ty)
        }
    }

    fn check_unary(&mut self, op: UnaryOp, operand: &Expr) -> CheckResult {
        let ty = self.check_expr(operand, false)?;
        let (ok, wanted) = match op {
            UnaryOp::Neg => (ty.is_numeric(), "a numeric type"),
            UnaryOp::Not => (ty == Type::Bool, "!bool"),
            UnaryOp::BitNot => (ty.is_integer(), "an integer type"),
        };
        if ok {
            Ok(ty)
        } else {
            Err(TypeProblem::mismatch(operand.span, wanted, self.show(&ty)))
        }
    }

    fn check_decl(
        &mut self,
        span: Span,
        name: Name,
        annotation: Option<&TypeExpr>,
        init: &Expr,
        mutability: Mutability,
    ) -> CheckResult {
        let found = self.check_expr(init, false)?;
        let ty = match annotation {
            Some(annotation) => {
                let expected = self.resolve_annotation(annotation, span)?;
                self.expect_assignable(&expected, init, &found)?;
                expected
            }
            None if found == Type::None => {
                return Err(TypeProblem::new(
                    init.span,
                    ProblemKind::CannotInfer {
                        what: format!(
                            "the type of `{}`: its initialiser has no value",
                            self.interner.lookup(name)
                        ),
                    },
                ))
            }
            None => found,
        };
        self.declare(Symbol::new(name, ty, mutability, Storage::Stack, span))?;
        Ok(Type::None)
    }

    fn check_set(&mut self, name: Name, value: &Expr, span: Span) -> CheckResult {
        let target = match self.symbols.assign_target(name) {
            Ok(symbol) => symbol.ty.clone(),
            Err(err) => return Err(self.symbol_problem(err, name, span)),
        };
        self.expect_type(&target, value)?;
        Ok(Type::None)
    }

    fn check_set_index(&mut self, expr: &Expr, target: &Expr, index: &Expr, value: &Expr) -> CheckResult {
        let mut root = target;
        while let ExprKind::Index { target, .. } = &root.kind {
            root = target;
        }
        let ExprKind::Ident(name) = root.kind else {
            return Err(TypeProblem::invalid(
                target.span,
                "element assignment needs a named array",
            ));
        };
        if let Err(err) = self.symbols.assign_target(name) {
            return Err(self.symbol_problem(err, name, root.span));
        }
        let elem = self.check_index(expr.id, target, index)?;
        let mut node = target;
        loop {
            if matches!(self.type_of(node.id), Some(Type::Tuple(_))) {
                return Err(TypeProblem::invalid(target.span, "tuple elements cannot be assigned"));
            }
            match &node.kind {
                ExprKind::Index { target, .. } => node = target,
                _ => break,
            }
        }
        self.expect_type(&elem, value)?;
        Ok(Type::None)
    }

    /// Element access. Static indices are bounds-checked here; dynamic ones
    /// are recorded under `id` for a runtime check.
    fn check_index(&mut self, id: ExprId, target: &Expr, index: &Expr) -> CheckResult {
        let target_ty = self.check_expr(target, false)?;
        let index_ty = self.check_expr(index, false)?;
        if !index_ty.is_integer() {
            return Err(TypeProblem::mismatch(index.span, "!int", self.show(&index_ty)));
        }
        let static_index = match index.kind {
            ExprKind::Literal(Literal::Int(n)) => Some(n),
            _ => None,
        };
        let out_of_bounds = |this: &Self, i: i64| {
            TypeProblem::new(
                index.span,
                ProblemKind::Bounds {
                    index: i,
                    ty: this.show(&target_ty),
                },
            )
        };
        match &target_ty {
            Type::Array(elem, len) => {
                match (static_index, len) {
                    (Some(i), Len::Fixed(n)) => {
                        if u64::try_from(i).map_or(true, |i| i >= *n) {
                            return Err(out_of_bounds(self, i));
                        }
                    }
                    _ => {
                        self.result.dynamic_indices.insert(id);
                    }
                }
                Ok((**elem).clone())
            }
            Type::Tuple(elems) => match static_index {
                Some(i) => usize::try_from(i)
                    .ok()
                    .and_then(|i| elems.get(i))
                    .cloned()
                    .ok_or_else(|| out_of_bounds(self, i)),
                None => Err(TypeProblem::invalid(
                    index.span,
                    "tuple index must be an integer literal",
                )),
            },
            other => Err(TypeProblem::mismatch(
                target.span,
                "!array or !tuple",
                self.show(other),
            )),
        }
    }

    fn check_if(
        &mut self,
        cond: &Expr,
        then_branch: &Expr,
        else_branch: Option<&Expr>,
        tail: bool,
    ) -> CheckResult {
        self.expect_condition(cond)?;
        let Some(else_branch) = else_branch else {
            self.scoped(|this| this.check_expr(then_branch, false))?;
            return Ok(Type::None);
        };
        let then_ty = self.scoped(|this| this.check_expr(then_branch, tail))?;
        let else_ty = self.scoped(|this| this.check_expr(else_branch, tail))?;
        if diverges(then_branch) {
            return Ok(else_ty);
        }
        if diverges(else_branch) || then_ty == else_ty {
            return Ok(then_ty);
        }
        if self.coerce_literal(&then_ty, else_branch) {
            Ok(then_ty)
        } else if self.coerce_literal(&else_ty, then_branch) {
            Ok(else_ty)
        } else {
            Err(TypeProblem::mismatch(
                else_branch.span,
                self.show(&then_ty),
                self.show(&else_ty),
            ))
        }
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) -> CheckResult {
        let Some(ctx) = &self.func else {
            return Err(TypeProblem::new(
                span,
                ProblemKind::Scope("`return` outside of a function".to_string()),
            ));
        };
        let declared = ctx.declared_ret.clone();
        let found = match value {
            Some(value) => self.check_expr(value, true)?,
            None => Type::None,
        };
        match (declared, value) {
            (Some(ret), Some(value)) => self.expect_assignable(&ret, value, &found)?,
            (Some(ret), None) if ret != Type::None => {
                return Err(TypeProblem::mismatch(span, self.show(&ret), self.show(&Type::None)))
            }
            (Some(_), None) => {}
            (None, _) => {
                let previous = self.func.as_ref().and_then(|ctx| ctx.inferred.clone());
                match previous {
                    Some(prev) => match value {
                        Some(value) => self.expect_assignable(&prev, value, &found)?,
                        None if prev != Type::None => {
                            return Err(TypeProblem::mismatch(span, self.show(&prev), self.show(&found)))
                        }
                        None => {}
                    },
                    None => {
                        if let Some(ctx) = self.func.as_mut() {
                            ctx.inferred = Some(found);
                        }
                    }
                }
            }
        }
        Ok(Type::None)
    }

    fn check_array(&mut self, items: &[Expr], span: Span) -> CheckResult {
        let Some((first, rest)) = items.split_first() else {
            return Err(TypeProblem::new(
                span,
                ProblemKind::CannotInfer {
                    what: "the element type of an empty array".to_string(),
                },
            ));
        };
        let elem = self.check_expr(first, false)?;
        for item in rest {
            self.expect_type(&elem, item)?;
        }
        Ok(Type::Array(Box::new(elem), Len::Fixed(items.len() as u64)))
    }

    fn check_free(&mut self, ptr: &Expr) -> CheckResult {
        if let ExprKind::Ident(name) = ptr.kind {
            if self.symbols.peek(name).is_some_and(|s| s.resource) {
                return Err(TypeProblem::new(
                    ptr.span,
                    ProblemKind::Resource(format!(
                        "`{}` is released by `with-resources` and cannot be freed explicitly",
                        self.interner.lookup(name)
                    )),
                ));
            }
        }
        self.expect_type(&Type::Ptr, ptr)?;
        Ok(Type::None)
    }

    fn check_with_resources(&mut self, bindings: &[ResourceBinding], body: &[Expr]) -> CheckResult {
        for binding in bindings {
            let ty = self.check_expr(&binding.init, false)?;
            if ty != Type::Ptr {
                return Err(TypeProblem::new(
                    binding.init.span,
                    ProblemKind::Resource(format!(
                        "resource `{}` must be an allocation, found `{}`",
                        self.interner.lookup(binding.name),
                        self.show(&ty)
                    )),
                ));
            }
            self.declare(
                Symbol::new(
                    binding.name,
                    Type::Ptr,
                    Mutability::Const,
                    Storage::Stack,
                    binding.span,
                )
                .as_resource(),
            )?;
        }
        // Releases run after the body, so nothing inside is in tail position.
        self.check_body(body, false)
    }
}
