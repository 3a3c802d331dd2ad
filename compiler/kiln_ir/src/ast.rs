//! Abstract syntax tree.
//!
//! Every expression carries an [`ExprId`] unique within its compilation
//! unit and a source span. Children are owned; the tree has no cycles.
//! Resolved types live in the checker's side table keyed by `ExprId`, so
//! the tree itself is never mutated after parsing.

use std::fmt;

use crate::{BinaryOp, Name, Span, TypeExpr, UnaryOp};

/// Expression identifier, unique within one parsed module.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ExprId(u32);

impl ExprId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        ExprId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

/// A parsed compilation unit.
#[derive(Clone, Debug, PartialEq)]
pub struct Module {
    /// Name from the outermost `[module name ...]`, if any.
    pub name: Option<Name>,
    pub items: Vec<Item>,
    /// One past the largest `ExprId` handed out.
    pub expr_count: u32,
}

impl Module {
    /// Iterate over items, flattening nested `module` groups.
    pub fn flat_items(&self) -> Vec<&Item> {
        fn walk<'a>(items: &'a [Item], out: &mut Vec<&'a Item>) {
            for item in items {
                match item {
                    Item::Module(m) => walk(&m.items, out),
                    other => out.push(other),
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.items, &mut out);
        out
    }
}

/// Top-level form.
#[derive(Clone, Debug, PartialEq)]
pub enum Item {
    Module(ModuleDecl),
    Const(ConstItem),
    Func(FuncDecl),
    Extern(ExternDecl),
    Operator(OperatorDecl),
    /// Free expression evaluated in the unit's top-level function.
    Expr(Expr),
}

impl Item {
    pub fn span(&self) -> Span {
        match self {
            Item::Module(m) => m.span,
            Item::Const(c) => c.span,
            Item::Func(f) => f.span,
            Item::Extern(e) => e.span,
            Item::Operator(o) => o.span,
            Item::Expr(e) => e.span,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ModuleDecl {
    pub name: Name,
    pub items: Vec<Item>,
    pub span: Span,
}

/// Global constant.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstItem {
    pub name: Name,
    pub ty: Option<TypeExpr>,
    pub init: Expr,
    pub span: Span,
}

/// Function or operator parameter.
#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub name: Name,
    /// `None` for a bare parameter name.
    pub ty: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FuncDecl {
    pub name: Name,
    pub params: Vec<Param>,
    /// `None` when `-> !ret` is omitted; the checker infers it.
    pub ret: Option<TypeExpr>,
    pub body: Vec<Expr>,
    pub span: Span,
}

/// Foreign function signature inside an `extern` block.
#[derive(Clone, Debug, PartialEq)]
pub struct ExternFunc {
    pub name: Name,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub span: Span,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternDecl {
    pub library: Name,
    pub funcs: Vec<ExternFunc>,
    pub span: Span,
}

/// `[operator sym prec assoc (params) -> !ret body*]`
#[derive(Clone, Debug, PartialEq)]
pub struct OperatorDecl {
    pub symbol: Name,
    pub precedence: u8,
    pub assoc: crate::Assoc,
    pub params: Vec<Param>,
    pub ret: Option<TypeExpr>,
    pub body: Vec<Expr>,
    pub span: Span,
}

/// Literal value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Literal {
    Int(i64),
    /// `f64` bits.
    Frac(u64),
    Bool(bool),
    Str(Name),
}

/// `(name init)` in a `with-resources` binding list.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceBinding {
    pub name: Name,
    pub init: Expr,
    pub span: Span,
}

/// Runtime mutex operations.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MutexOp {
    Create,
    Lock,
    Unlock,
}

impl MutexOp {
    /// Runtime entry point the operation lowers to.
    pub fn runtime_symbol(self) -> &'static str {
        match self {
            MutexOp::Create => "rt_mutex_create",
            MutexOp::Lock => "rt_mutex_lock",
            MutexOp::Unlock => "rt_mutex_unlock",
        }
    }
}

/// Expression node.
#[derive(Clone, PartialEq)]
pub struct Expr {
    pub id: ExprId,
    pub span: Span,
    pub kind: ExprKind,
}

impl Expr {
    pub fn new(id: ExprId, span: Span, kind: ExprKind) -> Self {
        Expr { id, span, kind }
    }

    /// Whether this expression unconditionally leaves the enclosing body.
    pub fn is_jump(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Break | ExprKind::Continue | ExprKind::Return(_)
        )
    }

    /// Call `f` on each direct subexpression, in evaluation order.
    pub fn for_each_child<'a>(&'a self, mut f: impl FnMut(&'a Expr)) {
        match &self.kind {
            ExprKind::Literal(_)
            | ExprKind::Ident(_)
            | ExprKind::Break
            | ExprKind::Continue
            | ExprKind::Return(None)
            | ExprKind::Mutex { handle: None, .. } => {}
            ExprKind::Call { args: items, .. }
            | ExprKind::Scope(items)
            | ExprKind::Loop(items)
            | ExprKind::Array(items)
            | ExprKind::Tuple(items)
            | ExprKind::Atomic(items) => items.iter().for_each(f),
            ExprKind::Binary { lhs, rhs, .. } => {
                f(lhs);
                f(rhs);
            }
            ExprKind::Unary { operand: inner, .. }
            | ExprKind::VarDecl { init: inner, .. }
            | ExprKind::ConstDecl { init: inner, .. }
            | ExprKind::Set { value: inner, .. }
            | ExprKind::Return(Some(inner))
            | ExprKind::Len(inner)
            | ExprKind::Alloc(inner)
            | ExprKind::Free(inner)
            | ExprKind::Mutex {
                handle: Some(inner),
                ..
            } => f(inner),
            ExprKind::SetIndex {
                target,
                index,
                value,
            } => {
                f(target);
                f(index);
                f(value);
            }
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
                ..
            } => {
                f(cond);
                f(then_branch);
                if let Some(else_branch) = else_branch {
                    f(else_branch);
                }
            }
            ExprKind::While { cond, body, .. } => {
                f(cond);
                body.iter().for_each(f);
            }
            ExprKind::For {
                init,
                cond,
                step,
                body,
            } => {
                f(init);
                f(cond);
                body.iter().for_each(&mut f);
                f(step);
            }
            ExprKind::Index { target, index } => {
                f(target);
                f(index);
            }
            ExprKind::WithResources { bindings, body } => {
                for binding in bindings {
                    f(&binding.init);
                }
                body.iter().for_each(f);
            }
        }
    }

    /// Whether `pred` holds for this expression or any expression nested
    /// in it.
    pub fn any(&self, pred: &mut impl FnMut(&Expr) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        let mut found = false;
        self.for_each_child(|child| {
            if !found {
                found = child.any(pred);
            }
        });
        found
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} @ {:?}", self.kind, self.span)
    }
}

/// Expression kinds.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    Literal(Literal),
    Ident(Name),
    /// Call of a function, extern or custom operator.
    Call {
        callee: Name,
        args: Vec<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    VarDecl {
        name: Name,
        ty: Option<TypeExpr>,
        init: Box<Expr>,
    },
    ConstDecl {
        name: Name,
        ty: Option<TypeExpr>,
        init: Box<Expr>,
    },
    Set {
        name: Name,
        value: Box<Expr>,
    },
    /// `[set [index arr i] value]`
    SetIndex {
        target: Box<Expr>,
        index: Box<Expr>,
        value: Box<Expr>,
    },
    Scope(Vec<Expr>),
    /// `if` (optional else) or `check` (`is_check`, both arms required).
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
        is_check: bool,
    },
    /// `while`, or `async-loop` when `is_async`.
    While {
        cond: Box<Expr>,
        body: Vec<Expr>,
        is_async: bool,
    },
    For {
        init: Box<Expr>,
        cond: Box<Expr>,
        step: Box<Expr>,
        body: Vec<Expr>,
    },
    Loop(Vec<Expr>),
    Break,
    Continue,
    Return(Option<Box<Expr>>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    Array(Vec<Expr>),
    Tuple(Vec<Expr>),
    Len(Box<Expr>),
    Alloc(Box<Expr>),
    Free(Box<Expr>),
    WithResources {
        bindings: Vec<ResourceBinding>,
        body: Vec<Expr>,
    },
    Atomic(Vec<Expr>),
    Mutex {
        op: MutexOp,
        handle: Option<Box<Expr>>,
    },
}
