//! Parser tests.
//!
//! Expressions are compared through a compact s-expression rendering so
//! that desugarings read the way they would be written by hand.

mod forms;
mod recovery;

use kiln_ir::{Expr, ExprKind, Item, Literal, Module, StringInterner};

use crate::{parse_source, ParseError};

pub(crate) fn show(expr: &Expr, interner: &StringInterner) -> String {
    let list = |items: &[Expr]| {
        items
            .iter()
            .map(|e| show(e, interner))
            .collect::<Vec<_>>()
            .join(" ")
    };
    match &expr.kind {
        ExprKind::Literal(Literal::Int(n)) => n.to_string(),
        ExprKind::Literal(Literal::Frac(bits)) => f64::from_bits(*bits).to_string(),
        ExprKind::Literal(Literal::Bool(b)) => b.to_string(),
        ExprKind::Literal(Literal::Str(s)) => format!("{:?}", interner.lookup(*s)),
        ExprKind::Ident(name) => interner.lookup(*name).to_string(),
        ExprKind::Call { callee, args } => {
            format!("(call {} {})", interner.lookup(*callee), list(args))
        }
        ExprKind::Binary { op, lhs, rhs } => format!(
            "({} {} {})",
            op.as_symbol(),
            show(lhs, interner),
            show(rhs, interner)
        ),
        ExprKind::Unary { op, operand } => {
            format!("({} {})", op.as_symbol(), show(operand, interner))
        }
        ExprKind::VarDecl { name, init, .. } => {
            format!("(var {} {})", interner.lookup(*name), show(init, interner))
        }
        ExprKind::ConstDecl { name, init, .. } => {
            format!("(const {} {})", interner.lookup(*name), show(init, interner))
        }
        ExprKind::Set { name, value } => {
            format!("(set {} {})", interner.lookup(*name), show(value, interner))
        }
        ExprKind::SetIndex {
            target,
            index,
            value,
        } => format!(
            "(set-index {} {} {})",
            show(target, interner),
            show(index, interner),
            show(value, interner)
        ),
        ExprKind::Scope(body) => format!("(scope {})", list(body)),
        ExprKind::If {
            cond,
            then_branch,
            else_branch,
            is_check,
        } => {
            let head = if *is_check { "check" } else { "if" };
            match else_branch {
                Some(e) => format!(
                    "({head} {} {} {})",
                    show(cond, interner),
                    show(then_branch, interner),
                    show(e, interner)
                ),
                None => format!(
                    "({head} {} {})",
                    show(cond, interner),
                    show(then_branch, interner)
                ),
            }
        }
        ExprKind::While {
            cond,
            body,
            is_async,
        } => {
            let head = if *is_async { "async-loop" } else { "while" };
            format!("({head} {} {})", show(cond, interner), list(body))
        }
        ExprKind::For {
            init,
            cond,
            step,
            body,
        } => format!(
            "(for {} {} {} {})",
            show(init, interner),
            show(cond, interner),
            show(step, interner),
            list(body)
        ),
        ExprKind::Loop(body) => format!("(loop {})", list(body)),
        ExprKind::Break => "(break)".to_string(),
        ExprKind::Continue => "(continue)".to_string(),
        ExprKind::Return(None) => "(return)".to_string(),
        ExprKind::Return(Some(v)) => format!("(return {})", show(v, interner)),
        ExprKind::Index { target, index } => {
            format!("(index {} {})", show(target, interner), show(index, interner))
        }
        ExprKind::Array(items) => format!("(array {})", list(items)),
        ExprKind::Tuple(items) => format!("(tuple {})", list(items)),
        ExprKind::Len(e) => format!("(len {})", show(e, interner)),
        ExprKind::Alloc(e) => format!("(alloc {})", show(e, interner)),
        ExprKind::Free(e) => format!("(free {})", show(e, interner)),
        ExprKind::WithResources { bindings, body } => {
            let binds = bindings
                .iter()
                .map(|b| format!("({} {})", interner.lookup(b.name), show(&b.init, interner)))
                .collect::<Vec<_>>()
                .join(" ");
            format!("(with-resources ({binds}) {})", list(body))
        }
        ExprKind::Atomic(body) => format!("(atomic {})", list(body)),
        ExprKind::Mutex { op, handle } => match handle {
            Some(h) => format!("({} {})", op.runtime_symbol(), show(h, interner)),
            None => format!("({})", op.runtime_symbol()),
        },
    }
}

pub(crate) fn parse_ok(source: &str) -> (Module, StringInterner) {
    let interner = StringInterner::new();
    let (output, lex_errors) = parse_source(source, &interner);
    assert!(lex_errors.is_empty(), "lex errors: {lex_errors:?}");
    assert!(output.errors.is_empty(), "parse errors: {:?}", output.errors);
    (output.module, interner)
}

pub(crate) fn parse_errs(source: &str) -> (Module, Vec<ParseError>) {
    let interner = StringInterner::new();
    let (output, _) = parse_source(source, &interner);
    (output.module, output.errors)
}

/// Render the single free expression of `source`.
pub(crate) fn expr(source: &str) -> String {
    let (module, interner) = parse_ok(source);
    match module.items.as_slice() {
        [Item::Expr(e)] => show(e, &interner),
        other => panic!("expected one expression, got {other:?}"),
    }
}
