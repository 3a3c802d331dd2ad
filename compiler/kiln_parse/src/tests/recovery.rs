use kiln_ir::Item;

use super::parse_errs;
use crate::ParseErrorKind;

#[test]
fn error_skips_to_next_top_level_form() {
    let (module, errors) = parse_errs("[func f () [+ 1]] [var x 1]");
    assert_eq!(errors.len(), 1);
    assert!(matches!(errors[0].kind, ParseErrorKind::InvalidForm(_)));
    assert_eq!(module.items.len(), 1);
    assert!(matches!(module.items[0], Item::Expr(_)));
}

#[test]
fn unmatched_close_is_reported_and_skipped() {
    let (module, errors) = parse_errs("[var x 1]] [var y 2]");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ParseErrorKind::UnmatchedClose);
    assert_eq!(module.items.len(), 2);
}

#[test]
fn unclosed_delimiter_points_at_opener() {
    let (module, errors) = parse_errs("[var x [+ 1 2]");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].kind, ParseErrorKind::UnclosedDelimiter);
    assert_eq!(errors[0].span.start, 0);
    assert!(module.items.is_empty());
}

#[test]
fn mismatched_delimiter() {
    let (_, errors) = parse_errs("[var x 1)");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::UnexpectedToken { expected: "`]`", .. }
    ));
}

#[test]
fn pattern_without_default() {
    let (_, errors) = parse_errs("(x : 1 2)");
    assert_eq!(errors[0].kind, ParseErrorKind::MissingDefault);
}

#[test]
fn for_requires_var_initialiser() {
    let (_, errors) = parse_errs("[for x [< x 3] [set x 1]]");
    assert!(matches!(errors[0].kind, ParseErrorKind::InvalidForm(_)));
}

#[test]
fn missing_operand() {
    let (_, errors) = parse_errs("[if]");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::UnexpectedToken {
            expected: "expression",
            ..
        }
    ));
}

#[test]
fn nested_function_rejected() {
    let (_, errors) = parse_errs("[func f () [func g () 1]]");
    assert!(matches!(errors[0].kind, ParseErrorKind::InvalidForm(_)));
}

#[test]
fn builtin_operator_cannot_be_redeclared() {
    let (_, errors) = parse_errs("[operator + 3 left (a b) a]");
    assert!(matches!(
        errors[0].kind,
        ParseErrorKind::InvalidOperatorDecl(_)
    ));
}

#[test]
fn invalid_type_annotation() {
    let (_, errors) = parse_errs("[var (x !widget) 1]");
    assert!(matches!(errors[0].kind, ParseErrorKind::InvalidType(_)));
}

#[test]
fn lexer_errors_are_not_reported_twice() {
    let (module, errors) = parse_errs("[var x 0b12] [var y 2]");
    assert!(errors.is_empty());
    assert_eq!(module.items.len(), 1);
}

#[test]
fn errors_inside_module_recover_locally() {
    let (module, errors) = parse_errs("[module m [var x [+ 1]] [var y 2]]");
    assert_eq!(errors.len(), 1);
    let Item::Module(m) = &module.items[0] else {
        panic!("expected module");
    };
    assert_eq!(m.items.len(), 1);
}

#[test]
fn deep_nesting_does_not_overflow() {
    let depth = 3_000;
    let mut source = String::new();
    for _ in 0..depth {
        source.push_str("[scope ");
    }
    source.push('1');
    for _ in 0..depth {
        source.push(']');
    }
    let (module, errors) = parse_errs(&source);
    assert!(errors.is_empty());
    assert_eq!(module.items.len(), 1);
}
