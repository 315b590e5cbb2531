//! Dead code elimination
//!
//! Removes pure instructions whose result is never read, code between an
//! unconditional transfer and the next label, jumps to the label right
//! after them, and labels nothing jumps to.

use super::Pass;
use crate::ir::{Inst, IrFunction, Label, Temp, Value};
use std::collections::HashSet;

pub struct DeadCodeElimination;

impl Pass for DeadCodeElimination {
    fn name(&self) -> &'static str {
        "dead-code-elimination"
    }

    fn run(&self, func: &mut IrFunction) -> bool {
        let before = func.body.len();
        loop {
            let len = func.body.len();
            remove_unreachable(&mut func.body);
            remove_unused_labels(&mut func.body);
            remove_jumps_to_next(&mut func.body);
            while remove_unused_results(&mut func.body) {}
            if func.body.len() == len {
                break;
            }
        }
        func.body.len() != before
    }
}

fn remove_unreachable(body: &mut Vec<Inst>) {
    let mut reachable = true;
    body.retain(|inst| {
        if matches!(inst, Inst::Label(_)) {
            reachable = true;
        }
        let keep = reachable;
        if inst.ends_block() {
            reachable = false;
        }
        keep
    });
}

fn remove_jumps_to_next(body: &mut Vec<Inst>) {
    let mut dead = vec![false; body.len()];
    for (i, inst) in body.iter().enumerate() {
        let Some(target) = inst.target() else {
            continue;
        };
        let next = body[i + 1..]
            .iter()
            .find(|next| !matches!(next, Inst::Comment(_)));
        if matches!(next, Some(Inst::Label(label)) if label == target) {
            dead[i] = true;
        }
    }
    let mut index = 0;
    body.retain(|_| {
        index += 1;
        !dead[index - 1]
    });
}

fn remove_unused_labels(body: &mut Vec<Inst>) {
    let targets: HashSet<Label> = body.iter().filter_map(Inst::target).cloned().collect();
    body.retain(|inst| match inst {
        Inst::Label(label) => targets.contains(label),
        _ => true,
    });
}

fn remove_unused_results(body: &mut Vec<Inst>) -> bool {
    let read: HashSet<Temp> = body
        .iter()
        .flat_map(Inst::operands)
        .filter_map(|value| match value {
            Value::Temp(temp) => Some(*temp),
            _ => None,
        })
        .collect();
    let before = body.len();
    body.retain(|inst| match inst.dst() {
        Some(dst) if inst.is_pure() => read.contains(&dst),
        _ => true,
    });
    body.len() != before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::pass::tests::lower;
    use crate::ir::BinOp;
    use crate::types::TypeRegistry;
    use pretty_assertions::assert_eq;

    fn t(n: u32) -> Value {
        Value::Temp(Temp(n))
    }

    #[test]
    fn test_unused_chain_is_removed() {
        let mut body = vec![
            Inst::LoadParam { dst: Temp(0), index: 0 },
            Inst::Binary { dst: Temp(1), op: BinOp::Add, left: t(0), right: Value::IntConst(1) },
            Inst::Binary { dst: Temp(2), op: BinOp::Add, left: t(1), right: Value::IntConst(2) },
            Inst::Return(Some(Value::IntConst(0))),
        ];
        while remove_unused_results(&mut body) {}
        assert_eq!(body, vec![Inst::Return(Some(Value::IntConst(0)))]);
    }

    #[test]
    fn test_side_effects_are_kept() {
        let mut body = vec![
            Inst::Load { dst: Temp(0), base: Value::IntConst(0), offset: 0, size: 4, signed: true },
            Inst::Binary { dst: Temp(1), op: BinOp::Div, left: Value::IntConst(1), right: t(2) },
            Inst::Call { dst: Some(Temp(3)), func: "g".to_string(), args: Vec::new() },
            Inst::Store { base: t(4), offset: 0, src: Value::IntConst(1), size: 4 },
        ];
        let expected = body.clone();
        assert!(!remove_unused_results(&mut body));
        assert_eq!(body, expected);
    }

    #[test]
    fn test_unreachable_code_and_trivial_jumps() {
        let end = Label("end".to_string());
        let mut body = vec![
            Inst::Jump(end.clone()),
            Inst::Comment("unreachable".to_string()),
            Inst::Copy { dst: Temp(0), src: Value::IntConst(1) },
            Inst::Label(Label("unused".to_string())),
            Inst::Jump(end.clone()),
            Inst::Label(end.clone()),
            Inst::Return(None),
            Inst::Return(Some(Value::IntConst(0))),
        ];
        remove_unreachable(&mut body);
        remove_unused_labels(&mut body);
        remove_jumps_to_next(&mut body);
        assert_eq!(body, vec![Inst::Jump(end.clone()), Inst::Label(end.clone()), Inst::Return(None)]);

        let mut func = IrFunction::new("f".to_string(), Vec::new(), TypeRegistry::default().void());
        func.body = body;
        assert!(DeadCodeElimination.run(&mut func));
        assert_eq!(func.body, vec![Inst::Return(None)]);
    }

    #[test]
    fn test_fewer_ops_after_elimination() {
        let mut module = lower("int main(void) { int x = 0; x + 1 + 2 + 3; return x; }");
        let func = &mut module.functions[0];
        let before = func.op_count();
        assert!(DeadCodeElimination.run(func));
        assert!(func.op_count() < before);
    }
}
