//! C language frontend
//!
//! Lexes and parses a C translation unit, runs semantic analysis (type
//! registry, struct layout, member resolution) and lowers it to IR.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod sema;

use crate::common::CompileResult;
use crate::driver::Compilation;
use crate::frontend::{CompileContext, Frontend, FrontendConfig};
use crate::ir::IrBuilder;
use std::fmt::Write;
use tracing::{debug, info};

pub use ast::*;
pub use lexer::{Lexer, Token, TokenKind};
pub use parser::Parser;
pub use sema::SemanticAnalyzer;

/// C language frontend
#[derive(Debug, Clone, Copy, Default)]
pub struct CFrontend;

impl CFrontend {
    pub fn new() -> Self {
        Self
    }
}

impl Frontend for CFrontend {
    fn name(&self) -> &'static str {
        "c"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &[".c", ".h"]
    }

    fn compile(
        &self,
        source: &str,
        ctx: &CompileContext,
        config: &FrontendConfig,
    ) -> CompileResult<Compilation> {
        info!(file = %ctx.filename, model = ?config.layout.data_model, "compiling");

        if config.dump_tokens {
            eprintln!("=== C Tokens ===");
            eprint!("{}", self.dump_tokens(source)?);
            eprintln!("=== End Tokens ===\n");
        }

        debug!("parsing");
        let mut ast = Parser::new(source)?.parse()?;
        debug!(declarations = ast.declarations.len(), "parsed");

        if config.dump_ast {
            eprintln!("=== C AST ===");
            eprintln!("{:#?}", ast);
            eprintln!("=== End AST ===\n");
        }

        debug!("analyzing");
        let mut analyzer = SemanticAnalyzer::new(config.layout);
        analyzer.analyze(&mut ast)?;
        let registry = analyzer.into_registry();
        debug!(types = registry.len(), "analysis complete");

        debug!("lowering to IR");
        let module = IrBuilder::new(&registry).build(&ast)?;
        debug!(functions = module.functions.len(), globals = module.globals.len(), "lowered");

        Ok(Compilation { module, registry })
    }

    fn dump_tokens(&self, source: &str) -> CompileResult<String> {
        let tokens = Lexer::new(source).tokenize_all()?;
        let mut output = String::new();
        for token in &tokens {
            let _ = writeln!(output, "{:?}", token);
        }
        Ok(output)
    }

    fn dump_ast(&self, source: &str) -> CompileResult<String> {
        let ast = Parser::new(source)?.parse()?;
        Ok(format!("{:#?}", ast))
    }
}
