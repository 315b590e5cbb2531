//! Compilation driver and pipeline orchestration

use crate::common::{CompileError, CompileResult};
use crate::exec::{ExecConfig, Machine};
use crate::frontend::{CFrontend, CompileContext, Frontend, FrontendConfig};
use crate::ir::{IrModule, pass};
use crate::types::TypeRegistry;
use std::path::Path;
use tracing::info;

/// Output of a frontend: the lowered module and the types it refers to
#[derive(Debug)]
pub struct Compilation {
    pub module: IrModule,
    pub registry: TypeRegistry,
}

impl Compilation {
    /// Execute `entry` on the IR interpreter and return its result
    pub fn run(&self, entry: &str, config: ExecConfig) -> CompileResult<i64> {
        let mut machine = Machine::new(&self.module, config)?;
        let result = machine.call(entry, &[])?;
        info!(entry, result, "execution finished");
        Ok(result)
    }

    /// Layout table of every struct in the unit, in declaration order
    pub fn layout_dump(&self) -> String {
        let mut out = String::new();
        for (id, _) in self.registry.structs() {
            out.push_str(&self.registry.describe_struct(id));
        }
        out
    }
}

/// Compilation pipeline: picks a frontend by file extension and runs it
pub struct Pipeline {
    frontends: Vec<Box<dyn Frontend>>,
    config: FrontendConfig,
    exec: ExecConfig,
    /// IR optimization level; 0 keeps the lowering as emitted
    optimize_level: u8,
}

impl Pipeline {
    pub fn new(config: FrontendConfig) -> Self {
        Self {
            frontends: vec![Box::new(CFrontend::new())],
            config,
            exec: ExecConfig::default(),
            optimize_level: 0,
        }
    }

    pub fn with_optimize_level(mut self, level: u8) -> Self {
        self.optimize_level = level;
        self
    }

    pub fn with_exec_config(mut self, exec: ExecConfig) -> Self {
        self.exec = exec;
        self
    }

    pub fn register_frontend(&mut self, frontend: Box<dyn Frontend>) {
        self.frontends.push(frontend);
    }

    pub fn config(&self) -> &FrontendConfig {
        &self.config
    }

    /// Frontend handling `filename`; files without a known extension go to C
    pub fn frontend_for(&self, filename: &str) -> CompileResult<&dyn Frontend> {
        let ext = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e));

        let found = match ext {
            Some(ext) => self
                .frontends
                .iter()
                .find(|f| f.extensions().contains(&ext.as_str())),
            None => self.frontends.first(),
        };
        found.map(|f| f.as_ref()).ok_or_else(|| {
            CompileError::codegen(format!("no frontend found for file: {}", filename))
        })
    }

    /// Compile one source file
    pub fn compile_source(&self, source: &str, filename: &str) -> CompileResult<Compilation> {
        let frontend = self.frontend_for(filename)?;
        let ctx = CompileContext::new(filename);
        let mut compilation = frontend.compile(source, &ctx, &self.config)?;
        pass::optimize(&mut compilation.module, self.optimize_level);
        Ok(compilation)
    }

    /// Compile one source file and run its `main`
    pub fn run_source(&self, source: &str, filename: &str) -> CompileResult<i64> {
        self.compile_source(source, filename)?.run("main", self.exec)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(FrontendConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::ExecError;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_run_source() {
        let source = r"
            struct point { char tag; int x; int y; };
            int main(void) {
                struct point p;
                p.tag = 1;
                p.x = 20;
                p.y = 22;
                return p.x + p.y;
            }
        ";
        assert_eq!(Pipeline::default().run_source(source, "t.c").unwrap(), 42);
    }

    #[test]
    fn test_assert_failure_is_runtime_error() {
        let source = "int main(void) { assert(1, 2); return 0; }";
        let err = Pipeline::default().run_source(source, "t.c").unwrap_err();
        assert!(matches!(
            err,
            CompileError::Runtime(ExecError::AssertionFailed { expected: 1, actual: 2 })
        ));
    }

    #[test]
    fn test_optimize_level_shrinks_ir_and_keeps_results() {
        let source = r"
            struct pair { int a; int b; };
            int main(void) {
                struct pair p;
                p.a = 2 * 3;
                p.b = p.a + (4 - 4) * 9;
                if (p.a != 6) return 1;
                return p.a + p.b;
            }
        ";
        let plain = Pipeline::default().compile_source(source, "t.c").unwrap();
        let optimized = Pipeline::default()
            .with_optimize_level(1)
            .compile_source(source, "t.c")
            .unwrap();
        let ops = |c: &Compilation| c.module.functions[0].op_count();
        assert!(ops(&optimized) < ops(&plain));
        assert_eq!(plain.run("main", ExecConfig::default()).unwrap(), 12);
        assert_eq!(optimized.run("main", ExecConfig::default()).unwrap(), 12);
    }

    #[test]
    fn test_unknown_extension() {
        let pipeline = Pipeline::default();
        assert!(pipeline.frontend_for("main.rs").is_err());
        assert_eq!(pipeline.frontend_for("main.c").unwrap().name(), "c");
        assert_eq!(pipeline.frontend_for("snippet").unwrap().name(), "c");
    }

    #[test]
    fn test_layout_dump() {
        let source = "struct s { char c; int i; }; int main(void) { return sizeof(struct s); }";
        let compilation = Pipeline::default().compile_source(source, "t.c").unwrap();
        let dump = compilation.layout_dump();
        assert!(dump.starts_with("struct s: size 8, align 4\n"));
        assert!(dump.contains("c "));
        assert_eq!(compilation.run("main", ExecConfig::default()).unwrap(), 8);
    }
}
