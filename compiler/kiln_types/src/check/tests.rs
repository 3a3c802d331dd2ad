#![allow(clippy::unwrap_used)]

use kiln_ir::{Item, Module, Name, StringInterner};
use pretty_assertions::assert_eq;
use rustc_hash::FxHashMap;

use super::*;
use crate::{ConstValue, FnKind, ProblemKind, WarningKind};

fn parse(source: &str, interner: &StringInterner) -> Module {
    let (output, lex_errors) = kiln_parse::parse_source(source, interner);
    assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
    assert!(output.errors.is_empty(), "parse errors: {:?}", output.errors);
    output.module
}

struct Checked {
    interner: StringInterner,
    module: Module,
    result: TypeCheckResult,
}

impl Checked {
    fn name(&self, s: &str) -> Name {
        self.interner.intern(s)
    }

    /// Rendered types of the top-level free expressions.
    fn toplevel(&self) -> Vec<String> {
        self.module
            .flat_items()
            .into_iter()
            .filter_map(|item| match item {
                Item::Expr(e) => Some(
                    self.result
                        .expr_type(e.id)
                        .map_or("<none>".to_string(), |t| t.display(&self.interner).to_string()),
                ),
                _ => None,
            })
            .collect()
    }

    fn problem_kinds(&self) -> Vec<&ProblemKind> {
        self.result.problems.iter().map(|p| &p.kind).collect()
    }
}

fn check(source: &str) -> Checked {
    let interner = StringInterner::new();
    let module = parse(source, &interner);
    let result = check_module(&module, &interner);
    Checked {
        interner,
        module,
        result,
    }
}

fn check_ok(source: &str) -> Checked {
    let checked = check(source);
    assert!(
        checked.result.problems.is_empty(),
        "problems: {:?}",
        checked.result.problems
    );
    checked
}

#[test]
fn literal_types() {
    let c = check_ok(r#"42 2.5 true "hi" [tuple 1 false]"#);
    assert_eq!(
        c.toplevel(),
        vec!["!int", "!frac", "!bool", "!str", "!tuple<!int,!bool>"]
    );
}

#[test]
fn nested_arithmetic_is_int() {
    let c = check_ok("[+ 5 (3 * 2)]");
    assert_eq!(c.toplevel(), vec!["!int"]);
}

#[test]
fn every_expression_is_typed() {
    let c = check_ok(
        "[func f ((n !int)) -> !int [var acc 0] [for [var i 0] [< i n] [set i [+ i 1]] [set acc [+ acc i]]] acc]
         [f 10]",
    );
    let mut roots = Vec::new();
    for item in c.module.flat_items() {
        match item {
            Item::Func(func) => roots.extend(&func.body),
            Item::Const(konst) => roots.push(&konst.init),
            Item::Expr(e) => roots.push(e),
            _ => {}
        }
    }
    let mut visited = 0;
    let mut untyped = Vec::new();
    for root in roots {
        root.any(&mut |e| {
            visited += 1;
            if c.result.expr_type(e.id).is_none() {
                untyped.push(e.id);
            }
            false
        });
    }
    assert!(visited > 10);
    assert_eq!(untyped, vec![]);
}

#[test]
fn static_index_bounds() {
    let c = check_ok("[const (a !array<!int,3>) [array 1 2 3]] [index a 0] [index a 2]");
    assert_eq!(c.toplevel(), vec!["!int", "!int"]);
    assert!(c.result.dynamic_indices.is_empty());

    for bad in ["3", "-1"] {
        let c = check(&format!("[const (a !array<!int,3>) [array 1 2 3]] [index a {bad}]"));
        assert!(matches!(
            c.problem_kinds().as_slice(),
            [ProblemKind::Bounds { .. }]
        ));
    }
}

#[test]
fn dynamic_index_is_recorded() {
    let c = check_ok("[func get ((xs !array<!int,4>) (i !int)) -> !int [index xs i]]");
    assert_eq!(c.result.dynamic_indices.len(), 1);
}

#[test]
fn array_length_is_part_of_type() {
    let c = check("[var (a !array<!int,4>) [array 1 2 3]]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Mismatch { .. }]
    ));
}

#[test]
fn set_on_const_is_mutation() {
    for source in [
        "[const k 1] [set k 2]",
        "[const k 1] [set k true]",
        "[func f () [const (x !int) 1] [set x \"s\"] x]",
    ] {
        let c = check(source);
        assert!(
            matches!(c.problem_kinds().as_slice(), [ProblemKind::Mutation { .. }]),
            "{source}: {:?}",
            c.result.problems
        );
    }
}

#[test]
fn break_outside_loop_is_scope_error() {
    let c = check("[break] [func f () [continue]] [func g () [while true [break]]]");
    assert_eq!(c.result.problems.len(), 2);
    assert!(c
        .problem_kinds()
        .iter()
        .all(|k| matches!(k, ProblemKind::Scope(_))));
}

#[test]
fn redeclaration_and_shadowing() {
    let c = check("[var (x !int) 0] [var (x !bool) true]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Redeclaration { .. }]
    ));

    let c = check_ok("[var (x !int) 0] [scope [var (x !bool) true] x] x");
    assert_eq!(c.toplevel(), vec!["!none", "!bool", "!int"]);
    assert!(c
        .result
        .warnings
        .iter()
        .any(|w| matches!(w.kind, WarningKind::Shadowed { .. })));
}

#[test]
fn tail_recursive_self_calls() {
    let c = check_ok(
        "[func fast_exp ((b !int) (e !int) (acc !int)) -> !int
           [check (== e 0) acc
             [check (== (e % 2) 0)
               [fast_exp (b * b) (e / 2) acc]
               [fast_exp (b * b) (e / 2) (acc * b)]]]]",
    );
    assert_eq!(c.result.tail_calls.len(), 2);
    let sig = c.result.signature(c.name("fast_exp")).unwrap();
    assert!(sig.tail_recursive);
}

#[test]
fn non_tail_recursion_is_not_flagged() {
    let c = check_ok("[func count ((n !int)) -> !int [check (== n 0) 0 [+ 1 [count (n - 1)]]]]");
    assert!(c.result.tail_calls.is_empty());
    assert!(!c.result.signature(c.name("count")).unwrap().tail_recursive);
}

#[test]
fn return_type_inference() {
    let c = check_ok("[func sq (x) [* x x]] [sq 3]");
    assert_eq!(c.result.signature(c.name("sq")).unwrap().ret, Some(Type::Int));
    assert_eq!(c.toplevel(), vec!["!int"]);

    let c = check_ok("[func half ((x !frac)) [return [/ x 2.0]]] [half 3.0]");
    assert_eq!(c.toplevel(), vec!["!frac"]);
}

#[test]
fn calling_uninferred_function_needs_annotation() {
    let c = check("[func a () [b]] [func b () 1]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::CannotInfer { .. }]
    ));
}

#[test]
fn generic_instantiation() {
    let c = check_ok(
        "[func first ((xs !array<!T,N>)) -> !T [index xs 0]]
         [first [array 1.5 2.5 3.5]]
         [first [array 1 2]]",
    );
    assert_eq!(c.toplevel(), vec!["!frac", "!int"]);
    let mut mangled: Vec<_> = c
        .result
        .instantiations
        .values()
        .map(|inst| inst.subst.mangle(c.interner.lookup(inst.callee), &c.interner))
        .collect();
    mangled.sort();
    assert_eq!(mangled, vec!["first$frac$3", "first$int$2"]);
}

#[test]
fn generic_unification_conflict() {
    let c = check("[func pick ((a !T) (b !T)) -> !T a] [pick 1 true]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Unification { .. }]
    ));
}

#[test]
fn arity_mismatch() {
    let c = check("[func f ((a !int)) a] [f 1 2]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Arity {
            expected: 1,
            found: 2,
            ..
        }]
    ));
}

#[test]
fn sized_integer_literals() {
    let c = check_ok("[var (small !int<8>) 100] [+ small 1]");
    assert_eq!(c.toplevel(), vec!["!none", "!int<8>"]);

    let c = check("[var (big !int<8>) 300]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Mismatch { .. }]
    ));
}

#[test]
fn no_implicit_int_frac_conversion() {
    let c = check("[var (x !int) 1.5]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Mismatch { .. }]
    ));
}

#[test]
fn conditions_must_be_bool() {
    let c = check("[while 1 [break]]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Mismatch { expected, .. }] if expected == "!bool"
    ));
}

#[test]
fn unreachable_and_unused_warnings() {
    let c = check_ok("[func f () -> !int [var y 1] [return 1] 2]");
    let codes: Vec<_> = c.result.warnings.iter().map(|w| w.code().as_str()).collect();
    assert!(codes.contains(&"W006"), "{codes:?}");
    assert!(codes.contains(&"W007"), "{codes:?}");
}

#[test]
fn resource_rules() {
    let c = check("[with-resources ((p [alloc 8])) [free p]]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Resource(_)]
    ));

    let c = check("[with-resources ((p 8)) 0]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Resource(_)]
    ));

    check_ok("[var p [alloc 16]] [free p]");
}

#[test]
fn tuple_elements_are_immutable() {
    for source in [
        "[var t [tuple 1 2]] [set [index t 0] 5]",
        "[var t [tuple [array 1 2] 3]] [set [index [index t 0] 1] 5]",
    ] {
        let c = check(source);
        assert!(
            matches!(c.problem_kinds().as_slice(), [ProblemKind::Invalid(_)]),
            "{source}: {:?}",
            c.result.problems
        );
    }
    check_ok("[var m [array [array 1 2] [array 3 4]]] [set [index [index m 1] 0] 9]");
}

#[test]
fn global_constants_are_evaluated() {
    let c = check_ok("[const a 2] [const b [* a 21]]");
    let b = c.result.global(c.name("b")).unwrap();
    assert_eq!(b.value, ConstValue::Int(42));

    let c = check("[func f () -> !int 1] [const c [f]]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Invalid(_)]
    ));
}

#[test]
fn extern_and_operator_signatures() {
    let c = check_ok(
        r#"[extern "libm" [func sqrt ((x !frac)) -> !frac]]
           [operator <+> 9 left ((a !int) (b !int)) -> !int [+ a b]]
           [sqrt 2.0]
           (1 <+> 2)"#,
    );
    assert_eq!(c.toplevel(), vec!["!frac", "!int"]);
    let sqrt = c.result.signature(c.name("sqrt")).unwrap();
    assert_eq!(
        sqrt.kind,
        FnKind::Extern {
            library: c.name("libm")
        }
    );
}

#[test]
fn imported_signatures_resolve_calls() {
    let interner = StringInterner::new();
    let lib = parse("[func twice ((x !int)) -> !int [* x 2]]", &interner);
    let exports: FxHashMap<_, _> = collect_signatures(&lib, &interner)
        .into_iter()
        .map(|sig| (sig.name, sig))
        .collect();

    let user = parse("[twice 21]", &interner);
    let result = check_module_with_imports(&user, &interner, &exports);
    assert!(result.problems.is_empty(), "{:?}", result.problems);
    assert_eq!(result.imported.len(), 1);
}

#[test]
fn sibling_forms_are_all_checked() {
    let c = check("[func f () [break]] [func g () [set q 1]] [func h () 1]");
    assert_eq!(c.result.problems.len(), 2);
    assert_eq!(c.result.signature(c.name("h")).unwrap().ret, Some(Type::Int));
}

#[test]
fn return_outside_function() {
    let c = check("[return 1]");
    assert!(matches!(
        c.problem_kinds().as_slice(),
        [ProblemKind::Scope(_)]
    ));
}
