//! Type representations in the AST
//!
//! These are the types as written. The semantic analyzer resolves them into
//! the type registry; nothing here knows about sizes or alignment.

use super::StructMember;
use crate::common::Span;

/// C type as written in the source
#[derive(Debug, Clone, PartialEq)]
pub struct CType {
    pub kind: TypeKind,
    pub qualifiers: TypeQualifiers,
    pub span: Span,
}

impl CType {
    pub fn new(kind: TypeKind, span: Span) -> Self {
        Self {
            kind,
            qualifiers: TypeQualifiers::default(),
            span,
        }
    }

    pub fn with_qualifiers(mut self, qualifiers: TypeQualifiers) -> Self {
        self.qualifiers = qualifiers;
        self
    }

    pub fn void(span: Span) -> Self {
        Self::new(TypeKind::Void, span)
    }

    pub fn char(span: Span) -> Self {
        Self::new(TypeKind::Char { signed: true }, span)
    }

    pub fn int(span: Span) -> Self {
        Self::new(TypeKind::Int { signed: true }, span)
    }

    pub fn pointer_to(inner: CType, span: Span) -> Self {
        Self::new(TypeKind::Pointer(Box::new(inner)), span)
    }

    pub fn array_of(element: CType, size: Option<usize>, span: Span) -> Self {
        Self::new(
            TypeKind::Array {
                element: Box::new(element),
                size,
            },
            span,
        )
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind, TypeKind::Void)
    }

    pub fn is_array(&self) -> bool {
        matches!(self.kind, TypeKind::Array { .. })
    }
}

/// The kind of a C type
#[derive(Debug, Clone, PartialEq)]
pub enum TypeKind {
    Void,
    Char { signed: bool },
    Short { signed: bool },
    Int { signed: bool },
    Long { signed: bool },
    LongLong { signed: bool },
    Pointer(Box<CType>),
    Array {
        element: Box<CType>,
        /// `None` for `[]`, completed from the initializer
        size: Option<usize>,
    },
    Struct(Box<StructSpec>),
}

/// Identity of one parsed struct body or tag reference.
///
/// Declarators that share a specifier (`struct { .. } a, b;`) share the id,
/// so the body is laid out once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StructSpecId(pub u32);

/// `struct tag`, `struct tag { ... }` or `struct { ... }`
#[derive(Debug, Clone, PartialEq)]
pub struct StructSpec {
    pub id: StructSpecId,
    pub name: Option<String>,
    /// `None` when only the tag is referenced
    pub members: Option<Vec<StructMember>>,
    pub span: Span,
}

impl StructSpec {
    pub fn new(
        id: StructSpecId,
        name: Option<String>,
        members: Option<Vec<StructMember>>,
        span: Span,
    ) -> Self {
        Self { id, name, members, span }
    }

    pub fn has_body(&self) -> bool {
        self.members.is_some()
    }
}

/// Type qualifiers (const, volatile)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TypeQualifiers {
    pub is_const: bool,
    pub is_volatile: bool,
}

impl TypeQualifiers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_const(mut self) -> Self {
        self.is_const = true;
        self
    }

    pub fn with_volatile(mut self) -> Self {
        self.is_volatile = true;
        self
    }
}
