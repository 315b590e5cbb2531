//! Statements and blocks

use super::{Declaration, Expr};
use crate::common::Span;

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    /// `expr;`
    Expr(Expr),
    /// `;`
    Empty,
    Block(Block),
    If {
        condition: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    Loop(Loop),
    Break,
    Continue,
    Return(Option<Expr>),
}

/// Which source form a [`Loop`] was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
}

/// `while`, `do`/`while` and `for`, normalized to one shape.
///
/// A missing condition loops forever. `init` and `update` are only ever
/// present for `for`; `continue` jumps to the update.
#[derive(Debug, Clone)]
pub struct Loop {
    pub kind: LoopKind,
    pub init: Option<ForInit>,
    pub condition: Option<Expr>,
    pub update: Option<Expr>,
    pub body: Box<Stmt>,
}

impl Loop {
    pub fn new(kind: LoopKind, condition: Option<Expr>, body: Stmt) -> Self {
        Self {
            kind,
            init: None,
            condition,
            update: None,
            body: Box::new(body),
        }
    }

    /// Whether the condition is checked before the first iteration
    pub fn tests_first(&self) -> bool {
        self.kind != LoopKind::DoWhile
    }
}

/// `{ ... }`
#[derive(Debug, Clone)]
pub struct Block {
    pub items: Vec<BlockItem>,
    pub span: Span,
}

impl Block {
    pub fn new(items: Vec<BlockItem>, span: Span) -> Self {
        Self { items, span }
    }

    /// The expression statement that ends the block, if any
    pub fn trailing_expr(&self) -> Option<&Expr> {
        match self.items.last() {
            Some(BlockItem::Statement(Stmt { kind: StmtKind::Expr(expr), .. })) => Some(expr),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum BlockItem {
    Statement(Stmt),
    Declaration(Declaration),
}

/// First clause of a `for`
#[derive(Debug, Clone)]
pub enum ForInit {
    Expr(Expr),
    Declaration(Declaration),
}
