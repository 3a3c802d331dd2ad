//! Per-call-site unification of generic parameters.
//!
//! Type variables are rigid inside their declaring function; unification
//! only happens at call sites, binding the callee's variables to the
//! argument types. The resulting [`Substitution`] drives return-type
//! computation and monomorphisation.

use kiln_ir::{Name, StringInterner};

use crate::{Len, Type};

/// Value bound to a generic variable.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Binding {
    Type(Type),
    Len(Len),
}

/// Failure to unify a parameter with an argument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UnifyError {
    /// The shapes differ.
    Mismatch,
    /// A variable was bound to two different values.
    Conflict {
        var: Name,
        first: Binding,
        second: Binding,
    },
}

/// Ordered variable bindings for one instantiation.
///
/// Order is first appearance in the parameter list, which makes the
/// mangled instance name deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Substitution {
    bindings: Vec<(Name, Binding)>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn get(&self, var: Name) -> Option<&Binding> {
        self.bindings
            .iter()
            .find(|(name, _)| *name == var)
            .map(|(_, binding)| binding)
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Name, Binding)> {
        self.bindings.iter()
    }

    fn bind(&mut self, var: Name, value: Binding) -> Result<(), UnifyError> {
        match self.get(var) {
            Some(existing) if *existing == value => Ok(()),
            Some(existing) => Err(UnifyError::Conflict {
                var,
                first: existing.clone(),
                second: value,
            }),
            None => {
                self.bindings.push((var, value));
                Ok(())
            }
        }
    }

    /// Unify a (possibly generic) parameter type with an argument type.
    pub fn unify(&mut self, param: &Type, arg: &Type) -> Result<(), UnifyError> {
        match (param, arg) {
            (Type::Var(var), _) => self.bind(*var, Binding::Type(arg.clone())),
            (Type::Array(pe, pl), Type::Array(ae, al)) => {
                self.unify(pe, ae)?;
                match pl {
                    Len::Var(var) => self.bind(*var, Binding::Len(*al)),
                    Len::Fixed(_) if pl == al => Ok(()),
                    Len::Fixed(_) => Err(UnifyError::Mismatch),
                }
            }
            (Type::Tuple(ps), Type::Tuple(args)) if ps.len() == args.len() => {
                ps.iter().zip(args).try_for_each(|(p, a)| self.unify(p, a))
            }
            (Type::Function(pp, pr), Type::Function(ap, ar)) if pp.len() == ap.len() => {
                pp.iter().zip(ap).try_for_each(|(p, a)| self.unify(p, a))?;
                self.unify(pr, ar)
            }
            _ if param == arg => Ok(()),
            _ => Err(UnifyError::Mismatch),
        }
    }

    /// Replace bound variables in `ty`. Unbound variables are kept.
    pub fn apply(&self, ty: &Type) -> Type {
        match ty {
            Type::Var(var) => match self.get(*var) {
                Some(Binding::Type(t)) => t.clone(),
                _ => ty.clone(),
            },
            Type::Array(elem, len) => Type::Array(Box::new(self.apply(elem)), self.apply_len(*len)),
            Type::Tuple(elems) => Type::Tuple(elems.iter().map(|t| self.apply(t)).collect()),
            Type::Function(params, ret) => Type::Function(
                params.iter().map(|t| self.apply(t)).collect(),
                Box::new(self.apply(ret)),
            ),
            other => other.clone(),
        }
    }

    pub fn apply_len(&self, len: Len) -> Len {
        match len {
            Len::Var(var) => match self.get(var) {
                Some(Binding::Len(l)) => *l,
                _ => len,
            },
            fixed @ Len::Fixed(_) => fixed,
        }
    }

    /// Rewrite every bound value through `outer`.
    ///
    /// Used when a generic function calls another generic function: the
    /// inner call's bindings mention the caller's variables until the
    /// caller itself is instantiated.
    #[must_use]
    pub fn compose(&self, outer: &Substitution) -> Substitution {
        let bindings = self
            .bindings
            .iter()
            .map(|(var, binding)| {
                let binding = match binding {
                    Binding::Type(t) => Binding::Type(outer.apply(t)),
                    Binding::Len(l) => Binding::Len(outer.apply_len(*l)),
                };
                (*var, binding)
            })
            .collect();
        Substitution { bindings }
    }

    /// Whether every binding is free of variables.
    pub fn is_concrete(&self) -> bool {
        self.bindings.iter().all(|(_, binding)| match binding {
            Binding::Type(t) => !t.has_vars(),
            Binding::Len(l) => matches!(l, Len::Fixed(_)),
        })
    }

    /// Instance symbol: `base$frag$frag`.
    pub fn mangle(&self, base: &str, interner: &StringInterner) -> String {
        let mut out = base.to_string();
        for (_, binding) in &self.bindings {
            out.push('$');
            match binding {
                Binding::Type(t) => out.push_str(&t.mangle(interner)),
                Binding::Len(Len::Fixed(n)) => out.push_str(&n.to_string()),
                Binding::Len(Len::Var(name)) => out.push_str(interner.lookup(*name)),
            }
        }
        out
    }
}
