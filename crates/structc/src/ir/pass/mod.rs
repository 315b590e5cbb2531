//! Optimization passes over IR function bodies
//!
//! Passes rewrite one function at a time and report whether they changed
//! anything; the pass list is rerun until a round changes nothing.

mod dce;
mod fold;

pub use dce::DeadCodeElimination;
pub use fold::ConstantFolding;

use super::inst::{IrFunction, IrModule};
use tracing::{debug, trace};

/// A rewrite of one function body
pub trait Pass {
    fn name(&self) -> &'static str;

    /// Rewrite `func` in place, returning whether anything changed
    fn run(&self, func: &mut IrFunction) -> bool;
}

/// Upper bound on rounds per function
const MAX_ROUNDS: usize = 16;

/// Passes run at an optimization level; level 0 runs none
pub fn passes_for_level(level: u8) -> Vec<Box<dyn Pass>> {
    match level {
        0 => Vec::new(),
        _ => vec![Box::new(ConstantFolding), Box::new(DeadCodeElimination)],
    }
}

/// Run `passes` over every function of `module` until they stop making changes
pub fn run_passes(module: &mut IrModule, passes: &[Box<dyn Pass>]) {
    if passes.is_empty() {
        return;
    }
    for func in &mut module.functions {
        let before = func.op_count();
        for round in 0..MAX_ROUNDS {
            let mut changed = false;
            for pass in passes {
                if pass.run(func) {
                    trace!(pass = pass.name(), function = %func.name, round, "changed");
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        debug!(function = %func.name, before, after = func.op_count(), "optimized");
    }
}

/// Optimize every function of `module` at `level`
pub fn optimize(module: &mut IrModule, level: u8) {
    run_passes(module, &passes_for_level(level));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::{ExecConfig, Machine};
    use crate::frontend::c::parser::Parser;
    use crate::frontend::c::sema::SemanticAnalyzer;
    use crate::ir::IrBuilder;
    use pretty_assertions::assert_eq;

    pub(super) fn lower(source: &str) -> IrModule {
        let mut tu = Parser::new(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::default();
        analyzer.analyze(&mut tu).unwrap();
        IrBuilder::new(analyzer.registry()).build(&tu).unwrap()
    }

    fn run_main(module: &IrModule) -> i64 {
        Machine::new(module, ExecConfig::default())
            .unwrap()
            .call("main", &[])
            .unwrap()
    }

    #[test]
    fn test_level_zero_leaves_module_alone() {
        let mut module = lower("int main(void) { return 2 * 3 + 4; }");
        let before = module.functions[0].body.clone();
        optimize(&mut module, 0);
        assert_eq!(module.functions[0].body, before);
    }

    #[test]
    fn test_optimized_program_computes_the_same_result() {
        let source = r"
            struct pt { int x; int y; };
            int sum(struct pt *p) { return p->x + p->y; }
            int main(void) {
                struct pt a[3];
                int i;
                int total = 0;
                for (i = 0; i < 3; i++) { a[i].x = i * 2; a[i].y = 10 - 1; }
                for (i = 0; i < 3; i++) total = total + sum(&a[i]);
                if (1 + 1 == 3) total = -1;
                return total > 0 ? total : 100 / 4;
            }
        ";
        let plain = lower(source);
        let mut optimized = plain.clone();
        optimize(&mut optimized, 1);
        assert_eq!(run_main(&plain), 33);
        assert_eq!(run_main(&optimized), 33);
        assert!(optimized.functions[1].op_count() < plain.functions[1].op_count());
    }
}
