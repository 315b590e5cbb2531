//! structc - struct type resolution and memory layout for a small C compiler
//!
//! ## Architecture
//!
//! - **Types** (`types/`): type registry, struct builder, member resolver
//! - **Frontend** (`frontend/`): C lexer, parser and semantic analysis
//! - **IR** (`ir/`): three-address IR, lvalue evaluation, load/store emission
//! - **Exec** (`exec/`): interpreter for lowered programs
//! - **Driver** (`driver/`): compilation pipeline
//! - **Common** (`common/`): errors, diagnostics and spans

pub mod common;
pub mod types;
pub mod frontend;
pub mod ir;
pub mod exec;
pub mod driver;

// Re-exports for convenience
pub use common::{CompileError, CompileResult, DiagnosticReporter, Span};
pub use driver::{Compilation, Pipeline};
pub use exec::{ExecConfig, ExecError};
pub use frontend::{CompileContext, Frontend, FrontendConfig};
pub use types::{DataModel, LayoutConfig, LayoutError, TypeRegistry};
