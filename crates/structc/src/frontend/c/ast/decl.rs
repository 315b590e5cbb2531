//! Declaration AST nodes

use super::{Block, CType, Initializer, StructSpec};
use crate::common::Span;
use crate::types::TypeId;

/// Declaration node
#[derive(Debug, Clone)]
pub struct Declaration {
    pub kind: DeclKind,
    pub span: Span,
}

impl Declaration {
    pub fn new(kind: DeclKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Declaration kinds
#[derive(Debug, Clone)]
pub enum DeclKind {
    /// Variable declaration: int x = 5;
    Variable(VarDecl),

    /// Multiple variable declarations: int a, b, c;
    MultipleVariables(Vec<VarDecl>),

    /// Function declaration or definition
    Function(FuncDecl),

    /// Struct declaration without declarators: struct foo { ... };
    Struct(StructSpec),
}

/// Variable declaration
#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: CType,
    pub init: Option<Initializer>,
    pub span: Span,
    /// Registry type (filled in during semantic analysis)
    pub resolved: Option<TypeId>,
}

impl VarDecl {
    pub fn new(name: String, ty: CType, span: Span) -> Self {
        Self {
            name,
            ty,
            init: None,
            span,
            resolved: None,
        }
    }

    pub fn with_init(mut self, init: Initializer) -> Self {
        self.init = Some(init);
        self
    }
}

/// Function declaration or definition
#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub return_type: CType,
    pub params: Vec<ParamDecl>,
    pub variadic: bool,
    pub body: Option<Block>,
    pub span: Span,
    /// Registry return type (filled in during semantic analysis)
    pub resolved_return: Option<TypeId>,
}

impl FuncDecl {
    pub fn new(name: String, return_type: CType, params: Vec<ParamDecl>, span: Span) -> Self {
        Self {
            name,
            return_type,
            params,
            variadic: false,
            body: None,
            span,
            resolved_return: None,
        }
    }

    pub fn with_body(mut self, body: Block) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_variadic(mut self, variadic: bool) -> Self {
        self.variadic = variadic;
        self
    }

    pub fn is_definition(&self) -> bool {
        self.body.is_some()
    }
}

/// Function parameter declaration
#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Option<String>,
    pub ty: CType,
    pub span: Span,
    pub resolved: Option<TypeId>,
}

impl ParamDecl {
    pub fn new(name: Option<String>, ty: CType, span: Span) -> Self {
        Self { name, ty, span, resolved: None }
    }
}

/// Struct member as written: one per declarator
#[derive(Debug, Clone, PartialEq)]
pub struct StructMember {
    pub name: String,
    pub ty: CType,
    pub span: Span,
}

impl StructMember {
    pub fn new(name: String, ty: CType, span: Span) -> Self {
        Self { name, ty, span }
    }
}
