//! Semantic analysis
//!
//! Resolves written types into the type registry, lays out structs, and
//! annotates expressions with their types and member offsets.

mod scope;
mod analyzer;

pub use scope::{FunctionSig, Scope, Symbol, SymbolKind};
pub use analyzer::SemanticAnalyzer;
