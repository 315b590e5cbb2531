//! Intermediate Representation module
//!
//! Three-address code with sized, signed memory accesses. Lowering resolves
//! every struct access to a base address plus a byte offset.

mod inst;
mod builder;
mod lvalue;
mod access;
pub mod pass;

pub use inst::*;
pub use builder::IrBuilder;
pub use lvalue::Lvalue;
