use super::*;

#[test]
fn builder_collects_labels_and_notes() {
    let diag = Diagnostic::error(ErrorCode::E2004)
        .with_message("type mismatch: expected `!int`, found `!bool`")
        .with_label(Span::new(4, 8), "expected `!int`")
        .with_secondary_label(Span::new(0, 2), "declared here")
        .with_note("no implicit conversions between types");

    assert!(diag.is_error());
    assert_eq!(diag.primary_span(), Some(Span::new(4, 8)));
    assert_eq!(diag.labels.len(), 2);
    assert_eq!(diag.notes.len(), 1);
}

#[test]
fn severity_follows_code() {
    assert!(Diagnostic::from_code(ErrorCode::W005).is_warning());
    assert!(Diagnostic::from_code(ErrorCode::E1001).is_error());
}

#[test]
fn display_includes_code_and_notes() {
    let diag = Diagnostic::warning(ErrorCode::W007)
        .with_message("unused binding `x`")
        .with_note("prefix with `_` to silence");
    assert_eq!(
        diag.to_string(),
        "warning[W007]: unused binding `x`\n  = note: prefix with `_` to silence"
    );
}

#[test]
fn no_primary_label() {
    let diag = Diagnostic::error(ErrorCode::E5001)
        .with_secondary_label(Span::new(1, 2), "context");
    assert_eq!(diag.primary_span(), None);
}
