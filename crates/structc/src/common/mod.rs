//! Common infrastructure: errors, diagnostics and source spans

mod error;
mod span;

pub use error::{CompileError, CompileResult, DiagnosticReporter};
pub use span::Span;
