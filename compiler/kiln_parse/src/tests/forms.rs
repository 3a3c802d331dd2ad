use kiln_ir::{Assoc, Item, LenExpr, TypeExpr};
use pretty_assertions::assert_eq;

use super::{expr, parse_ok, show};

#[test]
fn prefix_operators() {
    assert_eq!(expr("[+ 5 [* 3 2]]"), "(+ 5 (* 3 2))");
    assert_eq!(expr("[+ 1 2 3]"), "(+ (+ 1 2) 3)");
    assert_eq!(expr("[- x]"), "(- x)");
    assert_eq!(expr("[! done]"), "(! done)");
    assert_eq!(expr("(== 0 0)"), "(== 0 0)");
}

#[test]
fn infix_precedence() {
    assert_eq!(expr("(1 + 2 * 3)"), "(+ 1 (* 2 3))");
    assert_eq!(expr("(a - b - c)"), "(- (- a b) c)");
    assert_eq!(expr("(a < b && c)"), "(&& (< a b) c)");
    assert_eq!(expr("(x * [f y] + 1)"), "(+ (* x (call f y)) 1)");
    assert_eq!(expr("(1 + -2)"), "(+ 1 -2)");
}

#[test]
fn grouping_and_paren_calls() {
    assert_eq!(expr("(x)"), "x");
    assert_eq!(expr("(f 1 2)"), "(call f 1 2)");
    assert_eq!(expr("(if c 1 2)"), "(if c 1 2)");
}

#[test]
fn custom_operator_associativity() {
    let source = "[operator <+> 9 right (a b) -> !int [+ a b]]\n(1 <+> 2 <+> 3)";
    let (module, interner) = parse_ok(source);
    let Item::Operator(decl) = &module.items[0] else {
        panic!("expected operator declaration");
    };
    assert_eq!(decl.precedence, 9);
    assert_eq!(decl.assoc, Assoc::Right);
    let Item::Expr(e) = &module.items[1] else {
        panic!("expected expression");
    };
    assert_eq!(show(e, &interner), "(call <+> 1 (call <+> 2 3))");
}

#[test]
fn custom_operator_binds_tighter_than_mul() {
    let source = "[operator ** 11 right (a b) a]\n(2 * 3 ** 2)";
    let (module, interner) = parse_ok(source);
    let Item::Expr(e) = &module.items[1] else {
        panic!("expected expression");
    };
    assert_eq!(show(e, &interner), "(* 2 (call ** 3 2))");
}

#[test]
fn pattern_conditional_on_atom() {
    assert_eq!(
        expr(r#"(x : 0 "zero" [< 0] "neg" "pos")"#),
        r#"(check (== x 0) "zero" (check (< x 0) "neg" "pos"))"#
    );
}

#[test]
fn pattern_conditional_binds_complex_value() {
    assert_eq!(
        expr("([f y] : 1 10 20)"),
        "(scope (const __pat0 (call f y)) (check (== __pat0 1) 10 20))"
    );
}

#[test]
fn control_forms() {
    assert_eq!(expr("[check (== 0 0) 1 -1]"), "(check (== 0 0) 1 -1)");
    assert_eq!(expr("[if c [return 1]]"), "(if c (return 1))");
    assert_eq!(
        expr("[for [var i 0] [< i 4] [set i [+ i 1]] [g i]]"),
        "(for (var i 0) (< i 4) (set i (+ i 1)) (call g i))"
    );
    assert_eq!(expr("[loop [break]]"), "(loop (break))");
    assert_eq!(expr("[async-loop running [tick]]"), "(async-loop running (call tick ))");
}

#[test]
fn data_and_memory_forms() {
    assert_eq!(
        expr("[set [index a 2] [len a]]"),
        "(set-index a 2 (len a))"
    );
    assert_eq!(expr("[tuple 1 true 2.5]"), "(tuple 1 true 2.5)");
    assert_eq!(
        expr("[with-resources ((buf [mem-alloc 64])) [mem-free p]]"),
        "(with-resources ((buf (alloc 64))) (free p))"
    );
    assert_eq!(
        expr("[atomic [mutex_lock m] [mutex_unlock m]]"),
        "(atomic (rt_mutex_lock m) (rt_mutex_unlock m))"
    );
}

#[test]
fn function_declaration() {
    let (module, interner) =
        parse_ok("[func fast_exp ((b !int) (e !int) acc) -> !int [return b]]");
    let Item::Func(f) = &module.items[0] else {
        panic!("expected function");
    };
    assert_eq!(interner.lookup(f.name), "fast_exp");
    assert_eq!(f.params.len(), 3);
    assert_eq!(f.params[0].ty, Some(TypeExpr::Int));
    assert_eq!(f.params[2].ty, None);
    assert_eq!(f.ret, Some(TypeExpr::Int));
    assert_eq!(f.body.len(), 1);
}

#[test]
fn typed_bindings() {
    let (module, _) = parse_ok("[var (xs !array<!int,4>) [array 1 2 3 4]]");
    let Item::Expr(e) = &module.items[0] else {
        panic!("expected expression");
    };
    let kiln_ir::ExprKind::VarDecl { ty, .. } = &e.kind else {
        panic!("expected var");
    };
    assert_eq!(
        ty,
        &Some(TypeExpr::Array(Box::new(TypeExpr::Int), LenExpr::Fixed(4)))
    );
}

#[test]
fn extern_and_global_const() {
    let source = r#"[module demo
        [extern "libm" [func sqrt ((x !frac)) -> !frac]]
        [const (limit !int) 10]]"#;
    let (module, interner) = parse_ok(source);
    assert_eq!(module.name.map(|n| interner.lookup(n)), Some("demo"));
    let flat = module.flat_items();
    let Item::Extern(ext) = flat[0] else {
        panic!("expected extern");
    };
    assert_eq!(interner.lookup(ext.library), "libm");
    assert_eq!(ext.funcs.len(), 1);
    assert!(matches!(flat[1], Item::Const(_)));
}

#[test]
fn expr_ids_are_unique() {
    let (module, _) = parse_ok("[func f (x) [+ x 1]] [f (2 * 3)] (y : 1 2 3)");
    let mut ids = Vec::new();
    fn collect(e: &kiln_ir::Expr, ids: &mut Vec<u32>) {
        ids.push(e.id.raw());
        if let kiln_ir::ExprKind::Binary { lhs, rhs, .. } = &e.kind {
            collect(lhs, ids);
            collect(rhs, ids);
        }
        if let kiln_ir::ExprKind::Call { args, .. } = &e.kind {
            for a in args {
                collect(a, ids);
            }
        }
        if let kiln_ir::ExprKind::If {
            cond,
            then_branch,
            else_branch,
            ..
        } = &e.kind
        {
            collect(cond, ids);
            collect(then_branch, ids);
            if let Some(e) = else_branch {
                collect(e, ids);
            }
        }
    }
    for item in &module.items {
        match item {
            Item::Func(f) => f.body.iter().for_each(|e| collect(e, &mut ids)),
            Item::Expr(e) => collect(e, &mut ids),
            _ => {}
        }
    }
    let total = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert!(ids.iter().all(|id| *id < module.expr_count));
}
