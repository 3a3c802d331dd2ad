//! Checker output.

use kiln_ir::{ExprId, Name, Span};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::{ConstValue, Substitution, Type, TypeProblem, TypeWarning};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum FnKind {
    Func,
    Operator,
    /// Foreign function, called with the C convention.
    Extern { library: Name },
}

/// Resolved signature of a function, custom operator or extern.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionSig {
    pub name: Name,
    pub params: Vec<(Name, Type)>,
    /// `None` while an omitted return type has not been inferred yet.
    pub ret: Option<Type>,
    /// Type and length variables in first-appearance order.
    pub type_vars: Vec<Name>,
    pub kind: FnKind,
    /// Has at least one self call in strict tail position.
    pub tail_recursive: bool,
    pub span: Span,
}

impl FunctionSig {
    pub fn is_generic(&self) -> bool {
        !self.type_vars.is_empty()
    }

    pub fn is_extern(&self) -> bool {
        matches!(self.kind, FnKind::Extern { .. })
    }

    pub fn param_types(&self) -> impl Iterator<Item = &Type> {
        self.params.iter().map(|(_, ty)| ty)
    }

    /// `!fn<..>` type, once the return type is known.
    pub fn fn_type(&self) -> Option<Type> {
        let ret = self.ret.clone()?;
        Some(Type::Function(self.param_types().cloned().collect(), Box::new(ret)))
    }
}

/// A generic call site's bindings.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Instantiation {
    pub callee: Name,
    pub subst: Substitution,
}

/// Checked global constant with its evaluated value.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalConst {
    pub name: Name,
    pub ty: Type,
    pub value: ConstValue,
    pub span: Span,
}

/// Everything the checker learned about one module.
#[derive(Clone, Debug, Default)]
pub struct TypeCheckResult {
    /// Type of each expression, indexed by `ExprId`.
    pub expr_types: Vec<Option<Type>>,
    /// Signatures in declaration order.
    pub signatures: Vec<FunctionSig>,
    /// Generic call sites.
    pub instantiations: FxHashMap<ExprId, Instantiation>,
    /// Self calls in strict tail position.
    pub tail_calls: FxHashSet<ExprId>,
    /// `index` expressions needing a runtime bounds check.
    pub dynamic_indices: FxHashSet<ExprId>,
    pub globals: Vec<GlobalConst>,
    /// Signatures resolved from other units' exports.
    pub imported: Vec<FunctionSig>,
    pub problems: Vec<TypeProblem>,
    pub warnings: Vec<TypeWarning>,
}

impl TypeCheckResult {
    pub fn has_errors(&self) -> bool {
        !self.problems.is_empty()
    }

    pub fn expr_type(&self, id: ExprId) -> Option<&Type> {
        self.expr_types.get(id.raw() as usize)?.as_ref()
    }

    /// Local or imported signature.
    pub fn signature(&self, name: Name) -> Option<&FunctionSig> {
        self.signatures
            .iter()
            .chain(&self.imported)
            .find(|sig| sig.name == name)
    }

    pub fn global(&self, name: Name) -> Option<&GlobalConst> {
        self.globals.iter().find(|g| g.name == name)
    }

    pub fn is_tail_call(&self, id: ExprId) -> bool {
        self.tail_calls.contains(&id)
    }

    pub fn needs_bounds_check(&self, id: ExprId) -> bool {
        self.dynamic_indices.contains(&id)
    }
}
