//! Frontend trait and implementations
//!
//! A frontend lexes, parses and analyzes source code, then lowers it to the
//! shared IR together with the type registry the IR refers to.

pub mod c;

use crate::common::CompileResult;
use crate::driver::Compilation;
use crate::types::LayoutConfig;

pub use c::CFrontend;

/// Configuration options passed to frontends
#[derive(Debug, Clone, Default)]
pub struct FrontendConfig {
    /// Data model and nesting limit used for every type in the unit
    pub layout: LayoutConfig,
    pub dump_tokens: bool,
    pub dump_ast: bool,
}

/// Per-file compilation context
#[derive(Debug, Clone)]
pub struct CompileContext {
    pub filename: String,
}

impl CompileContext {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
        }
    }
}

/// Trait for language frontends
pub trait Frontend: Send + Sync {
    /// The name of this frontend (e.g., "c")
    fn name(&self) -> &'static str;

    /// File extensions this frontend handles
    fn extensions(&self) -> &'static [&'static str];

    /// Compile source code: lex -> parse -> analyze -> lower
    fn compile(
        &self,
        source: &str,
        ctx: &CompileContext,
        config: &FrontendConfig,
    ) -> CompileResult<Compilation>;

    /// Token listing, one token per line
    fn dump_tokens(&self, source: &str) -> CompileResult<String>;

    /// Debug dump of the parsed syntax tree
    fn dump_ast(&self, source: &str) -> CompileResult<String>;
}
