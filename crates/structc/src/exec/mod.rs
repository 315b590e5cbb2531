//! IR interpreter used to run compiled programs and tests

mod error;
mod machine;
mod memory;

pub use error::{ExecError, ExecResult};
pub use machine::Machine;
pub use memory::{Memory, NULL_GUARD};

/// Name of the built-in `assert(expected, actual)` function
pub const BUILTIN_ASSERT: &str = "assert";

/// Interpreter limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecConfig {
    /// Bytes of addressable memory: globals, strings and stack
    pub memory_size: usize,
    pub max_call_depth: usize,
    pub max_steps: u64,
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self {
            memory_size: 1 << 20,
            max_call_depth: 256,
            max_steps: 10_000_000,
        }
    }
}
