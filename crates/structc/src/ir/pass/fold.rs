//! Constant folding and propagation
//!
//! A temporary written exactly once with a constant is replaced by that
//! constant at every later use. Operations on constants are evaluated with
//! the interpreter's semantics, except that division by a constant zero is
//! left in place to trap at run time. Conditional jumps on a constant become
//! plain jumps or disappear.

use super::Pass;
use crate::ir::{Inst, IrFunction, Temp, Value};
use crate::types::Access;
use std::collections::HashMap;

pub struct ConstantFolding;

impl Pass for ConstantFolding {
    fn name(&self) -> &'static str {
        "constant-folding"
    }

    fn run(&self, func: &mut IrFunction) -> bool {
        let mut definitions: HashMap<Temp, usize> = HashMap::new();
        for dst in func.body.iter().filter_map(Inst::dst) {
            *definitions.entry(dst).or_default() += 1;
        }

        let mut known: HashMap<Temp, i64> = HashMap::new();
        let mut changed = false;
        let mut body = Vec::with_capacity(func.body.len());

        for mut inst in std::mem::take(&mut func.body) {
            for operand in inst.operands_mut() {
                if let Value::Temp(temp) = *operand {
                    if let Some(&n) = known.get(&temp) {
                        *operand = Value::IntConst(n);
                        changed = true;
                    }
                }
            }

            if let Some((dst, n)) = fold(&inst) {
                if definitions.get(&dst) == Some(&1) {
                    known.insert(dst, n);
                }
                let copy = Inst::Copy { dst, src: Value::IntConst(n) };
                if inst != copy {
                    inst = copy;
                    changed = true;
                }
            }

            match inst {
                Inst::CondJump { cond: Value::IntConst(n), target } => {
                    changed = true;
                    if n != 0 {
                        body.push(Inst::Jump(target));
                    }
                }
                Inst::CondJumpFalse { cond: Value::IntConst(n), target } => {
                    changed = true;
                    if n == 0 {
                        body.push(Inst::Jump(target));
                    }
                }
                inst => body.push(inst),
            }
        }

        func.body = body;
        changed
    }
}

/// Destination and value of an instruction whose operands are all constant
fn fold(inst: &Inst) -> Option<(Temp, i64)> {
    match inst {
        Inst::Copy { dst, src: Value::IntConst(n) } => Some((*dst, *n)),
        Inst::Unary { dst, op, src: Value::IntConst(n) } => Some((*dst, op.eval(*n))),
        Inst::Binary {
            dst,
            op,
            left: Value::IntConst(l),
            right: Value::IntConst(r),
        } => op.eval(*l, *r).map(|n| (*dst, n)),
        Inst::Cast {
            dst,
            src: Value::IntConst(n),
            size,
            signed,
        } => Some((*dst, Access { size: *size, signed: *signed }.truncate(*n))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pass::tests::lower;
    use crate::ir::pass::DeadCodeElimination;
    use crate::ir::{BinOp, Label};
    use crate::types::TypeRegistry;
    use pretty_assertions::assert_eq;

    fn function(body: Vec<Inst>) -> IrFunction {
        let int = TypeRegistry::default().c_int();
        let mut func = IrFunction::new("f".to_string(), Vec::new(), int);
        func.body = body;
        func.temp_count = 8;
        func
    }

    fn t(n: u32) -> Value {
        Value::Temp(Temp(n))
    }

    #[test]
    fn test_folds_through_single_definitions() {
        let mut func = function(vec![
            Inst::Copy { dst: Temp(0), src: Value::IntConst(6) },
            Inst::Binary { dst: Temp(1), op: BinOp::Mul, left: t(0), right: Value::IntConst(7) },
            Inst::Cast { dst: Temp(2), src: t(1), size: 1, signed: true },
            Inst::Return(Some(t(2))),
        ]);
        assert!(ConstantFolding.run(&mut func));
        assert_eq!(func.body[3], Inst::Return(Some(Value::IntConst(42))));
        assert!(!ConstantFolding.run(&mut func));
    }

    #[test]
    fn test_multiply_defined_temps_are_not_propagated() {
        let mut func = function(vec![
            Inst::LoadParam { dst: Temp(1), index: 0 },
            Inst::Copy { dst: Temp(0), src: Value::IntConst(1) },
            Inst::CondJump { cond: t(1), target: Label("done".to_string()) },
            Inst::Copy { dst: Temp(0), src: Value::IntConst(2) },
            Inst::Label(Label("done".to_string())),
            Inst::Return(Some(t(0))),
        ]);
        ConstantFolding.run(&mut func);
        assert_eq!(func.body[5], Inst::Return(Some(t(0))));
    }

    #[test]
    fn test_division_by_constant_zero_is_kept() {
        let div = Inst::Binary {
            dst: Temp(0),
            op: BinOp::Div,
            left: Value::IntConst(1),
            right: Value::IntConst(0),
        };
        let mut func = function(vec![div.clone(), Inst::Return(Some(t(0)))]);
        assert!(!ConstantFolding.run(&mut func));
        assert_eq!(func.body[0], div);
    }

    #[test]
    fn test_constant_branches_are_resolved() {
        let target = Label("skip".to_string());
        let mut func = function(vec![
            Inst::CondJumpFalse { cond: Value::IntConst(0), target: target.clone() },
            Inst::CondJump { cond: Value::IntConst(0), target: target.clone() },
            Inst::Label(target.clone()),
            Inst::Return(None),
        ]);
        assert!(ConstantFolding.run(&mut func));
        assert_eq!(
            func.body,
            vec![Inst::Jump(target.clone()), Inst::Label(target), Inst::Return(None)]
        );
    }

    #[test]
    fn test_fewer_ops_after_folding() {
        let mut module = lower("int main(void) { int x = 4; 1 + 2 + 3 + x; return 2 * 3 + 4; }");
        let func = &mut module.functions[0];
        let before = func.op_count();
        ConstantFolding.run(func);
        DeadCodeElimination.run(func);
        assert!(func.op_count() < before);
        assert!(func.body.contains(&Inst::Return(Some(Value::IntConst(10)))));
    }
}
