//! Struct type resolution and memory layout
//!
//! The [`TypeRegistry`] owns every type of a compilation unit. Struct bodies
//! are laid out by the [`StructBuilder`] and member accesses are resolved
//! against the registry into a `(type, offset)` pair.

mod builder;
mod data_model;
mod error;
mod registry;
mod resolver;
mod ty;

pub use builder::{MemberDecl, StructBuilder};
pub use data_model::{DEFAULT_MAX_TYPE_DEPTH, DataModel, LayoutConfig, align_to};
pub use error::{ErrorCode, LayoutError};
pub use registry::TypeRegistry;
pub use resolver::ResolvedMember;
pub use ty::{Access, Member, ScalarMove, StructId, StructType, Symbol, Type, TypeId};
