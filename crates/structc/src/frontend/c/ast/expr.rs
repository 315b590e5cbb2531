//! Expression AST nodes

use super::{Block, CType};
use crate::common::Span;
use crate::types::{ResolvedMember, TypeId};

/// Expression node
#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
    /// Type of this expression (filled in during semantic analysis)
    pub ty: Option<TypeId>,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self {
            kind,
            span,
            ty: None,
        }
    }

    pub fn with_type(mut self, ty: TypeId) -> Self {
        self.ty = Some(ty);
        self
    }

    /// Value of an integer constant expression built from literals
    pub fn constant_value(&self) -> Option<i64> {
        match &self.kind {
            ExprKind::IntLiteral(value) => Some(*value),
            ExprKind::CharLiteral(value) => Some(char_value(*value)),
            ExprKind::Unary {
                op: UnaryOp::Neg,
                operand,
            } => operand.constant_value().map(i64::wrapping_neg),
            ExprKind::Binary { op, left, right } => {
                let (l, r) = (left.constant_value()?, right.constant_value()?);
                match op {
                    BinaryOp::Add => l.checked_add(r),
                    BinaryOp::Sub => l.checked_sub(r),
                    BinaryOp::Mul => l.checked_mul(r),
                    BinaryOp::Div => l.checked_div(r),
                    BinaryOp::Mod => l.checked_rem(r),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Value of a character constant; plain `char` is signed
pub fn char_value(byte: u8) -> i64 {
    i64::from(byte as i8)
}

/// Expression kinds
#[derive(Debug, Clone)]
pub enum ExprKind {
    /// Integer literal: 42, 0xFF
    IntLiteral(i64),

    /// Character literal: 'a', '\n'
    CharLiteral(u8),

    /// String literal: "hello"
    StringLiteral(String),

    /// Identifier: foo, bar
    Identifier(String),

    /// Binary operation: a + b, x * y
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation: -x, !flag
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },

    /// `x = y`, or `x op= y` when `op` is set
    Assign {
        op: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },

    /// Ternary conditional: cond ? then : else
    Ternary {
        condition: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
    },

    /// Function call: foo(a, b)
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },

    /// Array subscript: arr[i]
    Index {
        array: Box<Expr>,
        index: Box<Expr>,
    },

    /// Member access: obj.field
    Member {
        object: Box<Expr>,
        field: String,
        /// Member type and offset (filled in during semantic analysis)
        resolved: Option<ResolvedMember>,
    },

    /// Pointer member access: ptr->field
    PtrMember {
        pointer: Box<Expr>,
        field: String,
        resolved: Option<ResolvedMember>,
    },

    /// Type cast: (int)x
    Cast {
        ty: CType,
        expr: Box<Expr>,
    },

    /// sizeof expression: sizeof(x) or sizeof(int)
    Sizeof(SizeofArg),

    /// _Alignof expression: _Alignof(int)
    Alignof(SizeofArg),

    /// Address-of: &x
    AddrOf(Box<Expr>),

    /// Dereference: *ptr
    Deref(Box<Expr>),

    /// `++x`, `--x`, `x++`, `x--`
    Step {
        operand: Box<Expr>,
        decrement: bool,
        /// Yields the old value
        postfix: bool,
    },

    /// Comma expression: (a, b, c)
    Comma(Vec<Expr>),

    /// GNU statement expression: ({ stmt; ...; expr; })
    StmtExpr(Block),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,

    // Bitwise
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,

    // Logical
    LogAnd,
    LogOr,

    // Comparison
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::Ne
                | BinaryOp::Lt
                | BinaryOp::Le
                | BinaryOp::Gt
                | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::LogAnd | BinaryOp::LogOr)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,     // -x
    Not,     // !x
    BitNot,  // ~x
}

/// Sizeof argument (expression or type)
#[derive(Debug, Clone)]
pub enum SizeofArg {
    Expr(Box<Expr>),
    Type(CType),
}

/// Variable initializer
#[derive(Debug, Clone)]
pub enum Initializer {
    /// Single expression initializer
    Expr(Expr),
    /// Braced initializer list
    List(Vec<Initializer>, Span),
}

impl Initializer {
    pub fn span(&self) -> Span {
        match self {
            Initializer::Expr(expr) => expr.span,
            Initializer::List(_, span) => *span,
        }
    }
}
