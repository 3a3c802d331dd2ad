//! Cross-unit index of exported signatures.
//!
//! Built once after every unit has parsed, then shared read-only by the
//! checkers of all units. A unit's own declarations always win over the
//! index, so a unit never sees itself through it.

use kiln_ir::{Name, Span};
use kiln_types::{FnKind, FunctionSig};
use rustc_hash::FxHashMap;
use tracing::debug;

/// A function defined by more than one unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub name: Name,
    /// Unit holding the rejected definition.
    pub unit: usize,
    pub span: Span,
    /// Unit whose definition is exported.
    pub previous_unit: usize,
    pub previous_span: Span,
}

/// Signatures every unit may call, keyed by function name.
///
/// Only plain non-generic functions are exported: operators are part of
/// their unit's grammar, externs are declared where they are used, and a
/// generic body cannot be instantiated outside its unit.
#[derive(Clone, Debug, Default)]
pub struct GlobalIndex {
    signatures: FxHashMap<Name, FunctionSig>,
    owners: FxHashMap<Name, usize>,
    conflicts: Vec<Conflict>,
}

impl GlobalIndex {
    /// Index the signatures of each unit, in unit order. The first unit to
    /// define a name owns it.
    pub fn build(units: impl IntoIterator<Item = (usize, Vec<FunctionSig>)>) -> Self {
        let mut index = GlobalIndex::default();
        for (unit, sigs) in units {
            for sig in sigs {
                if sig.kind != FnKind::Func || sig.is_generic() {
                    continue;
                }
                index.insert(unit, sig);
            }
        }
        debug!(
            exported = index.signatures.len(),
            conflicts = index.conflicts.len(),
            "built global index"
        );
        index
    }

    fn insert(&mut self, unit: usize, sig: FunctionSig) {
        if let Some(&previous_unit) = self.owners.get(&sig.name) {
            let previous_span = self.signatures[&sig.name].span;
            self.conflicts.push(Conflict {
                name: sig.name,
                unit,
                span: sig.span,
                previous_unit,
                previous_span,
            });
            return;
        }
        self.owners.insert(sig.name, unit);
        self.signatures.insert(sig.name, sig);
    }

    /// The map handed to each unit's checker.
    pub fn signatures(&self) -> &FxHashMap<Name, FunctionSig> {
        &self.signatures
    }

    pub fn get(&self, name: Name) -> Option<&FunctionSig> {
        self.signatures.get(&name)
    }

    /// Index of the unit defining `name`.
    pub fn owner(&self, name: Name) -> Option<usize> {
        self.owners.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.signatures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signatures.is_empty()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    pub(crate) fn conflicts_in(&self, unit: usize) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter().filter(move |c| c.unit == unit)
    }
}
