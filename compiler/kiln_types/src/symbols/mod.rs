//! Lexical scopes.
//!
//! A stack of frames, each an ordered list of bindings. Frame 0 holds
//! globals: functions, custom operators, externs and global constants, all
//! in one namespace with local variables. A name may be shadowed by an inner
//! frame but never redeclared within the same frame.

use kiln_ir::{Name, Span};
use rustc_hash::FxHashMap;

use crate::Type;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Mutability {
    Const,
    Var,
}

/// Where a binding lives.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Storage {
    /// Function parameter or local.
    Stack,
    GlobalConst,
    /// Foreign function from the named library.
    Extern(Name),
    Function,
    Operator,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Symbol {
    pub name: Name,
    pub ty: Type,
    pub mutability: Mutability,
    /// Frame index; 0 is the global frame.
    pub depth: u32,
    pub storage: Storage,
    pub span: Span,
    pub used: bool,
    /// Bound by `with-resources`; released automatically.
    pub resource: bool,
}

impl Symbol {
    pub fn new(name: Name, ty: Type, mutability: Mutability, storage: Storage, span: Span) -> Self {
        Symbol {
            name,
            ty,
            mutability,
            depth: 0,
            storage,
            span,
            used: false,
            resource: false,
        }
    }

    #[must_use]
    pub fn as_resource(mut self) -> Self {
        self.resource = true;
        self
    }

    pub fn is_callable(&self) -> bool {
        matches!(
            self.storage,
            Storage::Function | Storage::Operator | Storage::Extern(_)
        )
    }
}

/// Symbol table failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolError {
    Unbound,
    Redeclared { previous: Span },
    Mutation { declared: Span },
}

/// Outcome of a successful [`SymbolTable::declare`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Declared {
    /// Span of the outer binding this one hides, if any.
    pub shadows: Option<Span>,
}

#[derive(Default, Debug)]
struct Frame {
    symbols: Vec<Symbol>,
    index: FxHashMap<Name, usize>,
}

#[derive(Debug)]
pub struct SymbolTable {
    frames: Vec<Frame>,
}

impl SymbolTable {
    /// Create a table holding only the global frame.
    pub fn new() -> Self {
        SymbolTable {
            frames: vec![Frame::default()],
        }
    }

    /// Current frame index.
    pub fn depth(&self) -> u32 {
        u32::try_from(self.frames.len() - 1).unwrap_or(u32::MAX)
    }

    pub fn enter_scope(&mut self) {
        self.frames.push(Frame::default());
    }

    /// Pop the innermost frame, returning its bindings in reverse
    /// declaration order. The global frame is never popped.
    pub fn exit_scope(&mut self) -> Vec<Symbol> {
        if self.frames.len() <= 1 {
            return Vec::new();
        }
        let mut released = self.frames.pop().map(|f| f.symbols).unwrap_or_default();
        released.reverse();
        released
    }

    /// Drop frames above `depth`, e.g. after a failed top-level form.
    pub fn truncate(&mut self, depth: u32) {
        let keep = (depth as usize + 1).max(1);
        self.frames.truncate(keep);
    }

    /// Bind `symbol` in the current frame.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<Declared, SymbolError> {
        let depth = self.depth();
        let (current, outer) = match self.frames.split_last_mut() {
            Some(split) => split,
            None => return Err(SymbolError::Unbound),
        };
        if let Some(&idx) = current.index.get(&symbol.name) {
            return Err(SymbolError::Redeclared {
                previous: current.symbols[idx].span,
            });
        }
        let shadows = outer
            .iter()
            .rev()
            .find_map(|frame| frame.index.get(&symbol.name).map(|&i| frame.symbols[i].span));
        symbol.depth = depth;
        current.index.insert(symbol.name, current.symbols.len());
        current.symbols.push(symbol);
        Ok(Declared { shadows })
    }

    fn position(&self, name: Name) -> Option<(usize, usize)> {
        self.frames
            .iter()
            .enumerate()
            .rev()
            .find_map(|(f, frame)| frame.index.get(&name).map(|&i| (f, i)))
    }

    /// Resolve `name` innermost-first and mark it used.
    pub fn lookup(&mut self, name: Name) -> Result<&Symbol, SymbolError> {
        let (f, i) = self.position(name).ok_or(SymbolError::Unbound)?;
        let symbol = &mut self.frames[f].symbols[i];
        symbol.used = true;
        Ok(symbol)
    }

    /// Resolve without marking the binding used.
    pub fn peek(&self, name: Name) -> Option<&Symbol> {
        self.position(name).map(|(f, i)| &self.frames[f].symbols[i])
    }

    /// Resolve `name` as the target of `set`.
    pub fn assign_target(&self, name: Name) -> Result<&Symbol, SymbolError> {
        let symbol = self.peek(name).ok_or(SymbolError::Unbound)?;
        match symbol.mutability {
            Mutability::Var => Ok(symbol),
            Mutability::Const => Err(SymbolError::Mutation {
                declared: symbol.span,
            }),
        }
    }

    /// Update the type of an existing global, e.g. once a return type has
    /// been inferred.
    pub fn set_global_type(&mut self, name: Name, ty: Type) {
        let global = &mut self.frames[0];
        if let Some(&i) = global.index.get(&name) {
            global.symbols[i].ty = ty;
        }
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
