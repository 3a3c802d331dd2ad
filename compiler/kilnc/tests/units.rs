// Test code uses unwrap/expect for clarity - panics provide good test failure messages
#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Several units compiled together.

use kiln_codegen::{Convention, MInst, SymbolKind};
use kiln_diagnostic::ErrorCode;
use kiln_ir::StringInterner;
use kiln_types::collect_signatures;
use kilnc::{compile_units, CompileOptions, GlobalIndex, SourceUnit, Stage, UnitOutput};
use pretty_assertions::assert_eq;

fn compile(units: &[SourceUnit], parallel: bool) -> Vec<UnitOutput> {
    let interner = StringInterner::new();
    let options = CompileOptions {
        parallel,
        ..CompileOptions::default()
    };
    compile_units(units, &options, &interner)
}

fn library_and_app() -> Vec<SourceUnit> {
    vec![
        SourceUnit::new(
            "lib",
            "[func twice ((x !int)) -> !int [* x 2]]
             [func id ((x !T)) -> !T x]",
        ),
        SourceUnit::new("app", "[func main () -> !int [twice 21]]"),
    ]
}

#[test]
fn calls_resolve_across_units() {
    let outputs = compile(&library_and_app(), true);
    assert_eq!(outputs.len(), 2);
    for output in &outputs {
        assert!(!output.has_errors(), "{}: {:?}", output.name, output.diagnostics);
    }

    let app = outputs[1].object.as_ref().expect("no object for app");
    assert_eq!(app.name, "app");
    assert_eq!(
        app.symbol("twice").map(|s| s.kind.clone()),
        Some(SymbolKind::Extern { library: None })
    );
    let main = app.function("main").expect("no @main");
    let call = main.insts().find_map(|inst| match inst {
        MInst::Call { callee, conv, .. } => Some((callee.clone(), conv.clone())),
        _ => None,
    });
    assert_eq!(call, Some(("twice".to_string(), Convention::Native)));

    let lib = outputs[0].object.as_ref().expect("no object for lib");
    assert_eq!(
        lib.symbol("twice").map(|s| s.kind.clone()),
        Some(SymbolKind::Function)
    );
}

#[test]
fn generic_functions_stay_in_their_unit() {
    let units = [
        SourceUnit::new("lib", "[func id ((x !T)) -> !T x]"),
        SourceUnit::new("app", "[func main () -> !int [id 1]]"),
    ];
    let outputs = compile(&units, true);
    assert!(!outputs[0].has_errors());
    let codes: Vec<_> = outputs[1].errors().map(|d| d.code()).collect();
    assert_eq!(codes, [ErrorCode::E2001]);
}

#[test]
fn parallel_and_sequential_runs_agree() {
    let units = library_and_app();
    let render = |outputs: Vec<UnitOutput>| -> Vec<String> {
        outputs
            .iter()
            .map(|o| o.object.as_ref().map(ToString::to_string).unwrap_or_default())
            .collect()
    };
    assert_eq!(render(compile(&units, true)), render(compile(&units, false)));
}

#[test]
fn a_failing_unit_does_not_stop_the_others() {
    let units = [
        SourceUnit::new("broken", "[func f () -> !int 1"),
        SourceUnit::new("fine", "[func g () -> !int 2]"),
        SourceUnit::new("bad_types", "[func h () -> !int true]"),
    ];
    let outputs = compile(&units, true);

    assert_eq!(outputs[0].failed, Some(Stage::Parse));
    assert_eq!(outputs[0].codes(), [ErrorCode::E1002]);
    assert!(outputs[0].program.is_none());

    assert_eq!(outputs[1].failed, None);
    assert!(outputs[1].object.is_some());

    assert_eq!(outputs[2].failed, Some(Stage::Check));
    assert_eq!(outputs[2].codes(), [ErrorCode::E2004]);
}

#[test]
fn a_function_defined_twice_is_owned_by_the_first_unit() {
    let units = [
        SourceUnit::new("a", "[func f () -> !int 1]"),
        SourceUnit::new("b", "[func f () -> !int 2]"),
    ];
    let outputs = compile(&units, true);
    assert!(!outputs[0].has_errors());
    assert_eq!(outputs[1].codes(), [ErrorCode::E2002]);
    assert_eq!(outputs[1].failed, Some(Stage::Check));
}

#[test]
fn index_exports_plain_functions_only() {
    let interner = StringInterner::new();
    let sigs = |source: &str| {
        let (output, lex_errors) = kiln_parse::parse_source(source, &interner);
        assert!(lex_errors.is_empty() && output.errors.is_empty());
        collect_signatures(&output.module, &interner)
    };
    let index = GlobalIndex::build([
        (
            0,
            sigs(
                r#"[func twice ((x !int)) -> !int [* x 2]]
                   [func id ((x !T)) -> !T x]
                   [extern "libm" [func sqrt ((x !frac)) -> !frac]]"#,
            ),
        ),
        (1, sigs("[func twice ((y !int)) -> !int y] [func three () -> !int 3]")),
    ]);

    assert_eq!(index.len(), 2);
    let twice = interner.intern("twice");
    assert_eq!(index.owner(twice), Some(0));
    assert_eq!(index.owner(interner.intern("three")), Some(1));
    assert!(index.get(interner.intern("id")).is_none());
    assert!(index.get(interner.intern("sqrt")).is_none());

    let conflicts = index.conflicts();
    assert_eq!(conflicts.len(), 1);
    assert_eq!((conflicts[0].name, conflicts[0].unit, conflicts[0].previous_unit), (twice, 1, 0));
}
