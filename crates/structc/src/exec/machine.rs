//! IR interpreter
//!
//! Globals and string literals are placed at the bottom of memory, above a
//! small unmapped guard; the stack grows upward after them. All values are
//! 64-bit; narrower C values are kept normalized by the lowering's casts.

use super::error::{ExecError, ExecResult};
use super::memory::{Memory, NULL_GUARD};
use super::{BUILTIN_ASSERT, ExecConfig};
use crate::ir::{Inst, IrModule, Label, Temp, Value};
use crate::types::{Access, align_to};
use std::collections::HashMap;
use tracing::{debug, trace};

pub struct Machine<'m> {
    module: &'m IrModule,
    config: ExecConfig,
    memory: Memory,
    /// Address of every global and string literal
    symbols: HashMap<&'m str, i64>,
    functions: HashMap<&'m str, usize>,
    /// Instruction index of each label, per function
    labels: Vec<HashMap<&'m str, usize>>,
    sp: usize,
    steps: u64,
    depth: usize,
}

impl<'m> Machine<'m> {
    /// Load a module: lay out its globals and string literals
    pub fn new(module: &'m IrModule, config: ExecConfig) -> ExecResult<Self> {
        let out_of_memory = |needed: usize| ExecError::OutOfMemory {
            needed,
            available: config.memory_size,
        };
        let mut placements: Vec<(&'m str, usize, &'m [u8])> = Vec::new();
        let mut cursor = NULL_GUARD;
        for global in &module.globals {
            let address = align_to(cursor, global.align.max(1)).ok_or_else(|| out_of_memory(usize::MAX))?;
            let init = global.init.as_deref().unwrap_or_default();
            placements.push((global.name.as_str(), address, init));
            cursor = address.saturating_add(global.size);
        }
        for (label, text) in &module.strings {
            placements.push((label.0.as_str(), cursor, text.as_bytes()));
            cursor = cursor.saturating_add(text.len() + 1);
        }

        let stack = align_to(cursor, 16)
            .filter(|&stack| stack <= config.memory_size)
            .ok_or_else(|| out_of_memory(cursor))?;

        let mut memory = Memory::new(config.memory_size);
        let mut symbols = HashMap::new();
        for (name, address, data) in placements {
            let address = address as i64;
            if !data.is_empty() {
                memory.write_bytes(address, data)?;
            }
            symbols.insert(name, address);
        }

        let functions = module
            .functions
            .iter()
            .enumerate()
            .map(|(i, func)| (func.name.as_str(), i))
            .collect();
        let labels = module
            .functions
            .iter()
            .map(|func| {
                func.body
                    .iter()
                    .enumerate()
                    .filter_map(|(pc, inst)| match inst {
                        Inst::Label(label) => Some((label.0.as_str(), pc)),
                        _ => None,
                    })
                    .collect()
            })
            .collect();

        debug!(image = cursor, globals = module.globals.len(), "loaded module");
        Ok(Self {
            module,
            config,
            memory,
            symbols,
            functions,
            labels,
            sp: stack,
            steps: 0,
            depth: 0,
        })
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Address assigned to a global variable
    pub fn global_address(&self, name: &str) -> Option<i64> {
        self.symbols.get(name).copied()
    }

    /// Run a function to completion and return its result
    pub fn call(&mut self, name: &str, args: &[i64]) -> ExecResult<i64> {
        if name == BUILTIN_ASSERT {
            return Self::builtin_assert(args);
        }

        let index = *self
            .functions
            .get(name)
            .ok_or_else(|| ExecError::UndefinedFunction(name.to_string()))?;
        let func = &self.module.functions[index];
        if args.len() != func.params.len() {
            return Err(ExecError::ArgumentCount {
                name: name.to_string(),
                expected: func.params.len(),
                got: args.len(),
            });
        }
        if self.depth >= self.config.max_call_depth {
            return Err(ExecError::CallDepthExceeded {
                limit: self.config.max_call_depth,
            });
        }

        trace!(function = name, depth = self.depth, "call");
        self.depth += 1;
        let frame = self.sp;
        let result = self.execute(index, args);
        self.sp = frame;
        self.depth -= 1;
        result
    }

    fn builtin_assert(args: &[i64]) -> ExecResult<i64> {
        match args {
            [expected, actual] if expected == actual => Ok(0),
            [expected, actual] => Err(ExecError::AssertionFailed {
                expected: *expected,
                actual: *actual,
            }),
            _ => Err(ExecError::ArgumentCount {
                name: BUILTIN_ASSERT.to_string(),
                expected: 2,
                got: args.len(),
            }),
        }
    }

    fn execute(&mut self, index: usize, args: &[i64]) -> ExecResult<i64> {
        let module = self.module;
        let func = &module.functions[index];
        let mut temps = vec![0i64; func.temp_count as usize];
        // A slot is allocated once per frame, even inside loops
        let mut slots: HashMap<Temp, i64> = HashMap::new();
        let mut pc = 0;

        while let Some(inst) = func.body.get(pc) {
            pc += 1;
            self.steps += 1;
            if self.steps > self.config.max_steps {
                return Err(ExecError::StepLimitExceeded {
                    limit: self.config.max_steps,
                });
            }

            match inst {
                Inst::Label(_) | Inst::Comment(_) => {}
                Inst::Copy { dst, src } => {
                    temps[dst.index()] = self.value(&temps, src)?;
                }
                Inst::Unary { dst, op, src } => {
                    temps[dst.index()] = op.eval(self.value(&temps, src)?);
                }
                Inst::Binary { dst, op, left, right } => {
                    let l = self.value(&temps, left)?;
                    let r = self.value(&temps, right)?;
                    temps[dst.index()] = op.eval(l, r).ok_or(ExecError::DivisionByZero)?;
                }
                Inst::Cast { dst, src, size, signed } => {
                    let v = self.value(&temps, src)?;
                    temps[dst.index()] = Access { size: *size, signed: *signed }.truncate(v);
                }
                Inst::Load { dst, base, offset, size, signed } => {
                    let address = self.value(&temps, base)?.wrapping_add(*offset);
                    temps[dst.index()] = self.memory.load(address, *size, *signed)?;
                }
                Inst::Store { base, offset, src, size } => {
                    let address = self.value(&temps, base)?.wrapping_add(*offset);
                    let v = self.value(&temps, src)?;
                    self.memory.store(address, *size, v)?;
                }
                Inst::Jump(label) => pc = self.jump_target(index, label)?,
                Inst::CondJump { cond, target } => {
                    if self.value(&temps, cond)? != 0 {
                        pc = self.jump_target(index, target)?;
                    }
                }
                Inst::CondJumpFalse { cond, target } => {
                    if self.value(&temps, cond)? == 0 {
                        pc = self.jump_target(index, target)?;
                    }
                }
                Inst::Call { dst, func: callee, args: call_args } => {
                    let values = call_args
                        .iter()
                        .map(|arg| self.value(&temps, arg))
                        .collect::<ExecResult<Vec<_>>>()?;
                    let result = self.call(callee, &values)?;
                    if let Some(dst) = dst {
                        temps[dst.index()] = result;
                    }
                }
                Inst::Return(value) => {
                    return match value {
                        Some(v) => self.value(&temps, v),
                        None => Ok(0),
                    };
                }
                Inst::Alloca { dst, size, align } => {
                    let address = match slots.get(dst) {
                        Some(&address) => address,
                        None => {
                            let (start, end) = align_to(self.sp, (*align).max(1))
                                .and_then(|start| Some((start, start.checked_add(*size)?)))
                                .filter(|&(_, end)| end <= self.memory.size())
                                .ok_or(ExecError::StackOverflow { requested: *size })?;
                            self.sp = end;
                            slots.insert(*dst, start as i64);
                            start as i64
                        }
                    };
                    temps[dst.index()] = address;
                }
                Inst::AddrOf { dst, name } => {
                    temps[dst.index()] = self
                        .global_address(name)
                        .ok_or_else(|| ExecError::UndefinedSymbol(name.clone()))?;
                }
                Inst::LoadParam { dst, index: param } => {
                    temps[dst.index()] = args.get(*param).copied().ok_or_else(|| ExecError::ArgumentCount {
                        name: func.name.clone(),
                        expected: param + 1,
                        got: args.len(),
                    })?;
                }
            }
        }
        Ok(0)
    }

    fn value(&self, temps: &[i64], value: &Value) -> ExecResult<i64> {
        match value {
            Value::Temp(t) => Ok(temps[t.index()]),
            Value::IntConst(n) => Ok(*n),
            Value::StringConst(label) => self
                .global_address(&label.0)
                .ok_or_else(|| ExecError::UndefinedSymbol(label.0.clone())),
        }
    }

    fn jump_target(&self, function: usize, label: &Label) -> ExecResult<usize> {
        self.labels[function]
            .get(label.0.as_str())
            .copied()
            .ok_or_else(|| ExecError::UnknownLabel(label.0.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, IrFunction, IrGlobal};
    use crate::types::TypeRegistry;
    use pretty_assertions::assert_eq;

    fn function(name: &str, params: usize, body: Vec<Inst>, temps: u32) -> IrFunction {
        let registry = TypeRegistry::default();
        let int = registry.c_int();
        let mut func = IrFunction::new(
            name.to_string(),
            (0..params).map(|i| (format!("p{}", i), int)).collect(),
            int,
        );
        func.body = body;
        func.temp_count = temps;
        func
    }

    fn t(n: u32) -> Value {
        Value::Temp(Temp(n))
    }

    #[test]
    fn test_store_and_load_through_stack_slot() {
        let body = vec![
            Inst::Alloca { dst: Temp(0), size: 8, align: 4 },
            Inst::Store { base: t(0), offset: 4, src: Value::IntConst(-2), size: 4 },
            Inst::Load { dst: Temp(1), base: t(0), offset: 4, size: 4, signed: true },
            Inst::Return(Some(t(1))),
        ];
        let module = IrModule {
            functions: vec![function("main", 0, body, 2)],
            ..IrModule::default()
        };
        let mut machine = Machine::new(&module, ExecConfig::default()).unwrap();
        assert_eq!(machine.call("main", &[]).unwrap(), -2);
    }

    #[test]
    fn test_globals_are_initialized() {
        let registry = TypeRegistry::default();
        let int = registry.c_int();
        let body = vec![
            Inst::AddrOf { dst: Temp(0), name: "g".to_string() },
            Inst::Load { dst: Temp(1), base: t(0), offset: 0, size: 4, signed: true },
            Inst::Return(Some(t(1))),
        ];
        let module = IrModule {
            functions: vec![function("main", 0, body, 2)],
            globals: vec![IrGlobal {
                name: "g".to_string(),
                ty: int,
                size: 4,
                align: 4,
                init: Some(vec![0x2a, 0, 0, 0]),
            }],
            strings: Vec::new(),
        };
        let mut machine = Machine::new(&module, ExecConfig::default()).unwrap();
        assert_eq!(machine.global_address("g"), Some(16));
        assert_eq!(machine.call("main", &[]).unwrap(), 42);
    }

    #[test]
    fn test_builtin_assert() {
        let body = vec![
            Inst::Call {
                dst: None,
                func: BUILTIN_ASSERT.to_string(),
                args: vec![Value::IntConst(3), Value::IntConst(4)],
            },
            Inst::Return(None),
        ];
        let module = IrModule {
            functions: vec![function("main", 0, body, 0)],
            ..IrModule::default()
        };
        let mut machine = Machine::new(&module, ExecConfig::default()).unwrap();
        assert_eq!(
            machine.call("main", &[]),
            Err(ExecError::AssertionFailed { expected: 3, actual: 4 })
        );
    }

    #[test]
    fn test_recursion_limit() {
        let body = vec![
            Inst::Call { dst: None, func: "main".to_string(), args: Vec::new() },
            Inst::Return(None),
        ];
        let module = IrModule {
            functions: vec![function("main", 0, body, 0)],
            ..IrModule::default()
        };
        let config = ExecConfig { max_call_depth: 8, ..ExecConfig::default() };
        let mut machine = Machine::new(&module, config).unwrap();
        assert_eq!(
            machine.call("main", &[]),
            Err(ExecError::CallDepthExceeded { limit: 8 })
        );
    }

    #[test]
    fn test_step_limit() {
        let body = vec![
            Inst::Label(Label("top".to_string())),
            Inst::Jump(Label("top".to_string())),
        ];
        let module = IrModule {
            functions: vec![function("main", 0, body, 0)],
            ..IrModule::default()
        };
        let config = ExecConfig { max_steps: 100, ..ExecConfig::default() };
        let mut machine = Machine::new(&module, config).unwrap();
        assert_eq!(
            machine.call("main", &[]),
            Err(ExecError::StepLimitExceeded { limit: 100 })
        );
    }

    #[test]
    fn test_division_by_zero() {
        let body = vec![
            Inst::LoadParam { dst: Temp(0), index: 0 },
            Inst::Binary {
                dst: Temp(1),
                op: BinOp::Mod,
                left: Value::IntConst(1),
                right: Value::Temp(Temp(0)),
            },
            Inst::Return(Some(Value::Temp(Temp(1)))),
        ];
        let module = IrModule {
            functions: vec![function("rem", 1, body, 2)],
            ..IrModule::default()
        };
        let mut machine = Machine::new(&module, ExecConfig::default()).unwrap();
        assert_eq!(machine.call("rem", &[3]), Ok(1));
        assert_eq!(machine.call("rem", &[0]), Err(ExecError::DivisionByZero));
    }
}
