use kiln_ir::{Span, StringInterner};
use pretty_assertions::assert_eq;

use super::*;

fn local(interner: &StringInterner, name: &str, ty: Type, mutability: Mutability, at: u32) -> Symbol {
    Symbol::new(
        interner.intern(name),
        ty,
        mutability,
        Storage::Stack,
        Span::new(at, at + 1),
    )
}

#[test]
fn redeclaration_in_same_frame_fails() {
    let interner = StringInterner::new();
    let mut table = SymbolTable::new();
    table.enter_scope();
    assert!(table
        .declare(local(&interner, "x", Type::Int, Mutability::Var, 0))
        .is_ok());
    assert_eq!(
        table.declare(local(&interner, "x", Type::Bool, Mutability::Var, 5)),
        Err(SymbolError::Redeclared {
            previous: Span::new(0, 1)
        })
    );
}

#[test]
fn nested_frame_shadows_and_restores() {
    let interner = StringInterner::new();
    let x = interner.intern("x");
    let mut table = SymbolTable::new();
    table.enter_scope();
    let outer = table.declare(local(&interner, "x", Type::Int, Mutability::Var, 0));
    assert_eq!(outer, Ok(Declared { shadows: None }));

    table.enter_scope();
    let inner = table.declare(local(&interner, "x", Type::Bool, Mutability::Var, 9));
    assert_eq!(
        inner,
        Ok(Declared {
            shadows: Some(Span::new(0, 1))
        })
    );
    assert_eq!(table.lookup(x).map(|s| s.ty.clone()), Ok(Type::Bool));

    let released = table.exit_scope();
    assert_eq!(released.len(), 1);
    assert_eq!(table.lookup(x).map(|s| s.ty.clone()), Ok(Type::Int));
}

#[test]
fn released_in_reverse_declaration_order() {
    let interner = StringInterner::new();
    let mut table = SymbolTable::new();
    table.enter_scope();
    for (i, name) in ["a", "b", "c"].iter().enumerate() {
        let at = u32::try_from(i).unwrap_or_default();
        assert!(table
            .declare(local(&interner, name, Type::Int, Mutability::Const, at))
            .is_ok());
    }
    let names: Vec<_> = table
        .exit_scope()
        .into_iter()
        .map(|s| interner.lookup(s.name))
        .collect();
    assert_eq!(names, vec!["c", "b", "a"]);
}

#[test]
fn unbound_and_const_assignment() {
    let interner = StringInterner::new();
    let mut table = SymbolTable::new();
    table.enter_scope();
    assert!(table
        .declare(local(&interner, "k", Type::Int, Mutability::Const, 3))
        .is_ok());
    assert_eq!(
        table.lookup(interner.intern("missing")).err(),
        Some(SymbolError::Unbound)
    );
    assert_eq!(
        table.assign_target(interner.intern("k")).err(),
        Some(SymbolError::Mutation {
            declared: Span::new(3, 4)
        })
    );
}

#[test]
fn lookup_marks_used() {
    let interner = StringInterner::new();
    let v = interner.intern("v");
    let mut table = SymbolTable::new();
    table.enter_scope();
    assert!(table
        .declare(local(&interner, "v", Type::Int, Mutability::Var, 0))
        .is_ok());
    assert!(table.peek(v).is_some_and(|s| !s.used));
    assert!(table.lookup(v).is_ok());
    assert!(table.peek(v).is_some_and(|s| s.used));
}

#[test]
fn global_frame_survives_exit_and_truncate() {
    let interner = StringInterner::new();
    let f = interner.intern("f");
    let mut table = SymbolTable::new();
    assert!(table
        .declare(Symbol::new(
            f,
            Type::Function(vec![], Box::new(Type::Int)),
            Mutability::Const,
            Storage::Function,
            Span::DUMMY,
        ))
        .is_ok());
    assert!(table.exit_scope().is_empty());
    table.enter_scope();
    table.enter_scope();
    table.truncate(0);
    assert_eq!(table.depth(), 0);
    assert!(table.peek(f).is_some_and(Symbol::is_callable));
}
