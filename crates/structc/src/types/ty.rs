//! Interned type representation
//!
//! Types are referenced by [`TypeId`] into the registry arena. Struct types
//! additionally own a [`StructId`]; struct identity is nominal, so every
//! struct declaration gets its own id even when the member lists agree.

use crate::common::Span;
use std::collections::HashMap;
use string_interner::DefaultSymbol;

/// Handle to an interned type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(pub(super) u32);

impl TypeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a laid-out struct
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StructId(pub(super) u32);

impl StructId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Interned member name
pub type Symbol = DefaultSymbol;

/// A type as stored in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    /// Integer of `bytes` width
    Int { bytes: u8, signed: bool },
    Pointer(TypeId),
    Array { element: TypeId, length: usize },
    Struct(StructId),
}

/// Width and signedness of a single scalar load or store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Access {
    pub size: usize,
    pub signed: bool,
}

impl Access {
    /// Reduce `value` to this width, sign or zero extending the result
    pub fn truncate(self, value: i64) -> i64 {
        if self.size >= 8 {
            return value;
        }
        let shift = 64 - self.size * 8;
        if self.signed {
            (value << shift) >> shift
        } else {
            (((value as u64) << shift) >> shift) as i64
        }
    }
}

/// One scalar move of a flattened aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalarMove {
    /// Byte offset from the start of the aggregate
    pub offset: usize,
    pub access: Access,
}

/// A laid-out struct member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: Symbol,
    pub ty: TypeId,
    /// Byte offset from the start of the enclosing struct
    pub offset: usize,
    pub span: Span,
}

/// A laid-out struct. Immutable once registered.
#[derive(Debug, Clone)]
pub struct StructType {
    pub name: Option<String>,
    pub members: Vec<Member>,
    pub size: usize,
    pub align: usize,
    pub(super) index: HashMap<Symbol, usize>,
    /// Nesting depth: 1 + deepest member type
    pub(super) depth: usize,
}

impl StructType {
    /// Member by interned name
    pub fn member(&self, name: Symbol) -> Option<&Member> {
        self.index.get(&name).map(|&i| &self.members[i])
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}
