use pretty_assertions::assert_eq;

use super::*;

const SOURCE: &str = "[var x 1]\n[set y 2]\n[set z 3]\n";

fn error_at(code: ErrorCode, start: u32, msg: &str) -> Diagnostic {
    Diagnostic::error(code)
        .with_message(msg)
        .with_label(Span::new(start, start + 1), "here")
}

#[test]
fn flush_orders_by_position() {
    let mut queue = DiagnosticQueue::with_config(SOURCE, DiagnosticConfig::unlimited());
    queue.push(error_at(ErrorCode::E2001, 25, "third"));
    queue.push(error_at(ErrorCode::E2001, 15, "second"));
    queue.push(error_at(ErrorCode::E2001, 1, "first"));

    let flushed = queue.flush();
    let messages: Vec<&str> = flushed
        .iter()
        .map(|r| r.diagnostic.message.as_str())
        .collect();
    assert_eq!(messages, vec!["first", "second", "third"]);
    assert_eq!((flushed[1].line, flushed[1].column), (2, 6));
}

#[test]
fn warnings_do_not_count_as_errors() {
    let mut queue = DiagnosticQueue::new(SOURCE);
    queue.push(
        Diagnostic::warning(ErrorCode::W007)
            .with_message("unused binding `x`")
            .with_label(Span::new(5, 6), "never read"),
    );
    assert!(!queue.has_errors());
    assert_eq!(queue.warning_count(), 1);
}

#[test]
fn error_limit_drops_excess_and_notes_it() {
    let config = DiagnosticConfig {
        error_limit: 2,
        deduplicate: false,
    };
    let mut queue = DiagnosticQueue::with_config(SOURCE, config);
    assert!(queue.push(error_at(ErrorCode::E2001, 1, "a")));
    assert!(queue.push(error_at(ErrorCode::E2001, 11, "b")));
    assert!(!queue.push(error_at(ErrorCode::E2001, 21, "c")));
    assert!(queue.limit_reached());

    let flushed = queue.flush();
    assert_eq!(flushed.len(), 3);
    assert_eq!(flushed[2].code(), ErrorCode::E9002);
}

#[test]
fn same_line_syntax_errors_deduplicated() {
    let mut queue = DiagnosticQueue::new(SOURCE);
    assert!(queue.push(error_at(ErrorCode::E1001, 1, "unexpected")));
    assert!(!queue.push(error_at(ErrorCode::E1002, 4, "unclosed")));
    assert!(queue.push(error_at(ErrorCode::E1001, 12, "next line")));
    assert_eq!(queue.error_count(), 2);
}
