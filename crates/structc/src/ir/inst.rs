//! IR instruction definitions

use crate::types::TypeId;

/// A temporary value (virtual register)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Temp(pub u32);

impl Temp {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for Temp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// A label in the IR
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub String);

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An IR value (operand)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// A temporary (virtual register)
    Temp(Temp),
    /// An integer constant
    IntConst(i64),
    /// Address of string data
    StringConst(Label),
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Temp(t) => write!(f, "{}", t),
            Value::IntConst(n) => write!(f, "{}", n),
            Value::StringConst(l) => write!(f, "&{}", l),
        }
    }
}

/// Binary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    UDiv,
    Mod,
    UMod,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    UShr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    ULt,
    ULe,
    UGt,
    UGe,
}

impl BinOp {
    /// Apply the operator to 64-bit operands; `None` on division by zero
    pub fn eval(self, l: i64, r: i64) -> Option<i64> {
        let (ul, ur) = (l as u64, r as u64);
        Some(match self {
            BinOp::Add => l.wrapping_add(r),
            BinOp::Sub => l.wrapping_sub(r),
            BinOp::Mul => l.wrapping_mul(r),
            BinOp::Div | BinOp::Mod | BinOp::UDiv | BinOp::UMod if r == 0 => return None,
            BinOp::Div => l.wrapping_div(r),
            BinOp::Mod => l.wrapping_rem(r),
            BinOp::UDiv => (ul / ur) as i64,
            BinOp::UMod => (ul % ur) as i64,
            BinOp::And => l & r,
            BinOp::Or => l | r,
            BinOp::Xor => l ^ r,
            BinOp::Shl => l.wrapping_shl(r as u32),
            BinOp::Shr => l.wrapping_shr(r as u32),
            BinOp::UShr => ul.wrapping_shr(r as u32) as i64,
            BinOp::Eq => i64::from(l == r),
            BinOp::Ne => i64::from(l != r),
            BinOp::Lt => i64::from(l < r),
            BinOp::Le => i64::from(l <= r),
            BinOp::Gt => i64::from(l > r),
            BinOp::Ge => i64::from(l >= r),
            BinOp::ULt => i64::from(ul < ur),
            BinOp::ULe => i64::from(ul <= ur),
            BinOp::UGt => i64::from(ul > ur),
            BinOp::UGe => i64::from(ul >= ur),
        })
    }

    /// Whether evaluation can fail at run time
    pub fn can_trap(self) -> bool {
        matches!(self, BinOp::Div | BinOp::Mod | BinOp::UDiv | BinOp::UMod)
    }
}

impl std::fmt::Display for BinOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::UDiv => "/u",
            BinOp::Mod => "%",
            BinOp::UMod => "%u",
            BinOp::And => "&",
            BinOp::Or => "|",
            BinOp::Xor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::UShr => ">>u",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::ULt => "<u",
            BinOp::ULe => "<=u",
            BinOp::UGt => ">u",
            BinOp::UGe => ">=u",
        };
        f.write_str(s)
    }
}

/// Unary operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Not,
    BitNot,
}

impl UnOp {
    pub fn eval(self, v: i64) -> i64 {
        match self {
            UnOp::Neg => v.wrapping_neg(),
            UnOp::Not => i64::from(v == 0),
            UnOp::BitNot => !v,
        }
    }
}

impl std::fmt::Display for UnOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnOp::Neg => write!(f, "-"),
            UnOp::Not => write!(f, "!"),
            UnOp::BitNot => write!(f, "~"),
        }
    }
}

fn width(size: usize, signed: bool) -> String {
    format!("{}{}", if signed { 'i' } else { 'u' }, size * 8)
}

/// IR instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inst {
    /// Label definition
    Label(Label),

    /// dst = src (copy)
    Copy {
        dst: Temp,
        src: Value,
    },

    /// dst = op src
    Unary {
        dst: Temp,
        op: UnOp,
        src: Value,
    },

    /// dst = left op right
    Binary {
        dst: Temp,
        op: BinOp,
        left: Value,
        right: Value,
    },

    /// dst = src truncated to `size` bytes, then sign or zero extended
    Cast {
        dst: Temp,
        src: Value,
        size: usize,
        signed: bool,
    },

    /// dst = *(base + offset)
    Load {
        dst: Temp,
        base: Value,
        offset: i64,
        size: usize,
        signed: bool,
    },

    /// *(base + offset) = src
    Store {
        base: Value,
        offset: i64,
        src: Value,
        size: usize,
    },

    /// Unconditional jump
    Jump(Label),

    /// Conditional jump: if cond goto label
    CondJump {
        cond: Value,
        target: Label,
    },

    /// Branch if condition is false
    CondJumpFalse {
        cond: Value,
        target: Label,
    },

    /// Function call: dst = func(args...)
    Call {
        dst: Option<Temp>,
        func: String,
        args: Vec<Value>,
    },

    /// Return from function
    Return(Option<Value>),

    /// Allocate stack space for a local variable
    Alloca {
        dst: Temp,
        size: usize,
        align: usize,
    },

    /// Get address of a global variable
    AddrOf {
        dst: Temp,
        name: String,
    },

    /// Incoming argument: a scalar value, or the address of a struct argument
    LoadParam {
        dst: Temp,
        index: usize,
    },

    /// Comment (for debugging)
    Comment(String),
}

impl Inst {
    /// The temporary this instruction writes, if any
    pub fn dst(&self) -> Option<Temp> {
        match self {
            Inst::Copy { dst, .. }
            | Inst::Unary { dst, .. }
            | Inst::Binary { dst, .. }
            | Inst::Cast { dst, .. }
            | Inst::Load { dst, .. }
            | Inst::Alloca { dst, .. }
            | Inst::AddrOf { dst, .. }
            | Inst::LoadParam { dst, .. } => Some(*dst),
            Inst::Call { dst, .. } => *dst,
            _ => None,
        }
    }

    /// Every value this instruction reads
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Inst::Copy { src, .. } | Inst::Unary { src, .. } | Inst::Cast { src, .. } => vec![src],
            Inst::Binary { left, right, .. } => vec![left, right],
            Inst::Load { base, .. } => vec![base],
            Inst::Store { base, src, .. } => vec![base, src],
            Inst::CondJump { cond, .. } | Inst::CondJumpFalse { cond, .. } => vec![cond],
            Inst::Call { args, .. } => args.iter().collect(),
            Inst::Return(value) => value.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Mutable access to every value this instruction reads
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            Inst::Copy { src, .. } | Inst::Unary { src, .. } | Inst::Cast { src, .. } => vec![src],
            Inst::Binary { left, right, .. } => vec![left, right],
            Inst::Load { base, .. } => vec![base],
            Inst::Store { base, src, .. } => vec![base, src],
            Inst::CondJump { cond, .. } | Inst::CondJumpFalse { cond, .. } => vec![cond],
            Inst::Call { args, .. } => args.iter_mut().collect(),
            Inst::Return(value) => value.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Label this instruction may transfer control to
    pub fn target(&self) -> Option<&Label> {
        match self {
            Inst::Jump(target) | Inst::CondJump { target, .. } | Inst::CondJumpFalse { target, .. } => {
                Some(target)
            }
            _ => None,
        }
    }

    /// Whether removing the instruction is invisible when its result is unused
    pub fn is_pure(&self) -> bool {
        match self {
            Inst::Copy { .. }
            | Inst::Unary { .. }
            | Inst::Cast { .. }
            | Inst::Alloca { .. }
            | Inst::AddrOf { .. }
            | Inst::LoadParam { .. } => true,
            Inst::Binary { op, right, .. } => {
                !op.can_trap() || matches!(right, Value::IntConst(n) if *n != 0)
            }
            _ => false,
        }
    }

    /// Whether control never falls through to the next instruction
    pub fn ends_block(&self) -> bool {
        matches!(self, Inst::Jump(_) | Inst::Return(_))
    }
}

impl std::fmt::Display for Inst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Inst::Label(l) => write!(f, "{}:", l),
            Inst::Copy { dst, src } => write!(f, "  {} = {}", dst, src),
            Inst::Unary { dst, op, src } => write!(f, "  {} = {}{}", dst, op, src),
            Inst::Binary { dst, op, left, right } => {
                write!(f, "  {} = {} {} {}", dst, left, op, right)
            }
            Inst::Cast { dst, src, size, signed } => {
                write!(f, "  {} = cast.{} {}", dst, width(*size, *signed), src)
            }
            Inst::Load { dst, base, offset, size, signed } => {
                write!(f, "  {} = load.{} [{} + {}]", dst, width(*size, *signed), base, offset)
            }
            Inst::Store { base, offset, src, size } => {
                write!(f, "  store.{} [{} + {}], {}", size * 8, base, offset, src)
            }
            Inst::Jump(l) => write!(f, "  jump {}", l),
            Inst::CondJump { cond, target } => write!(f, "  if {} goto {}", cond, target),
            Inst::CondJumpFalse { cond, target } => write!(f, "  ifnot {} goto {}", cond, target),
            Inst::Call { dst, func, args } => {
                if let Some(d) = dst {
                    write!(f, "  {} = call {}(", d, func)?;
                } else {
                    write!(f, "  call {}(", func)?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Inst::Return(val) => {
                if let Some(v) = val {
                    write!(f, "  return {}", v)
                } else {
                    write!(f, "  return")
                }
            }
            Inst::Alloca { dst, size, align } => {
                write!(f, "  {} = alloca {}, align {}", dst, size, align)
            }
            Inst::AddrOf { dst, name } => write!(f, "  {} = &{}", dst, name),
            Inst::LoadParam { dst, index } => write!(f, "  {} = param #{}", dst, index),
            Inst::Comment(s) => write!(f, "  ; {}", s),
        }
    }
}

/// A function in IR form
#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<(String, TypeId)>,
    pub return_type: TypeId,
    pub body: Vec<Inst>,
    /// Number of temporaries used by the body
    pub temp_count: u32,
}

impl IrFunction {
    pub fn new(name: String, params: Vec<(String, TypeId)>, return_type: TypeId) -> Self {
        Self {
            name,
            params,
            return_type,
            body: Vec::new(),
            temp_count: 0,
        }
    }

    /// Instructions that do work: everything but labels and comments
    pub fn op_count(&self) -> usize {
        self.body
            .iter()
            .filter(|inst| !matches!(inst, Inst::Label(_) | Inst::Comment(_)))
            .count()
    }
}

impl std::fmt::Display for IrFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let params: Vec<&str> = self.params.iter().map(|(name, _)| name.as_str()).collect();
        writeln!(f, "function {}({}):", self.name, params.join(", "))?;
        for inst in &self.body {
            writeln!(f, "{}", inst)?;
        }
        Ok(())
    }
}

/// Global variable in IR
#[derive(Debug, Clone)]
pub struct IrGlobal {
    pub name: String,
    pub ty: TypeId,
    pub size: usize,
    pub align: usize,
    /// Little-endian image of the initial value; zero-filled when absent
    pub init: Option<Vec<u8>>,
}

/// IR module (translation unit)
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub functions: Vec<IrFunction>,
    pub globals: Vec<IrGlobal>,
    pub strings: Vec<(Label, String)>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|func| func.name == name)
    }
}

impl std::fmt::Display for IrModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for global in &self.globals {
            write!(f, "global {}: size {}, align {}", global.name, global.size, global.align)?;
            if let Some(bytes) = &global.init {
                let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                write!(f, " = [{}]", hex.join(" "))?;
            }
            writeln!(f)?;
        }
        for (label, s) in &self.strings {
            writeln!(f, "{}: \"{}\"", label, s.escape_default())?;
        }
        for func in &self.functions {
            writeln!(f)?;
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
