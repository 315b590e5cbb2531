//! IR builder - lowers the analyzed AST to IR
//!
//! Runs after semantic analysis: every expression carries its registry type
//! and every member access its resolved offset. Locals live in stack slots
//! (`Alloca`); expressions of struct or array type evaluate to the address
//! of their storage.

use super::inst::*;
use super::lvalue::Lvalue;
use crate::common::{CompileError, CompileResult};
use crate::frontend::c::ast::*;
use crate::types::{Type, TypeId, TypeRegistry};
use std::collections::HashMap;
use tracing::debug;

/// Builds IR from AST
pub struct IrBuilder<'r> {
    pub(super) registry: &'r TypeRegistry,
    module: IrModule,
    current_func: Option<IrFunction>,
    temp_counter: u32,
    label_counter: u32,
    string_counter: u32,
    /// Stack slot of each visible local, innermost scope last
    scopes: Vec<HashMap<String, Temp>>,
    break_label: Option<Label>,
    continue_label: Option<Label>,
}

impl<'r> IrBuilder<'r> {
    pub fn new(registry: &'r TypeRegistry) -> Self {
        Self {
            registry,
            module: IrModule::new(),
            current_func: None,
            temp_counter: 0,
            label_counter: 0,
            string_counter: 0,
            scopes: Vec::new(),
            break_label: None,
            continue_label: None,
        }
    }

    /// Build IR module from translation unit
    pub fn build(&mut self, tu: &TranslationUnit) -> CompileResult<IrModule> {
        for decl in &tu.declarations {
            self.build_declaration(decl)?;
        }
        Ok(std::mem::take(&mut self.module))
    }

    pub(super) fn new_temp(&mut self) -> Temp {
        let t = Temp(self.temp_counter);
        self.temp_counter += 1;
        t
    }

    fn new_label(&mut self, prefix: &str) -> Label {
        let l = Label(format!(".L{}_{}", prefix, self.label_counter));
        self.label_counter += 1;
        l
    }

    pub(super) fn emit(&mut self, inst: Inst) {
        if let Some(func) = &mut self.current_func {
            func.body.push(inst);
        }
    }

    pub(super) fn type_of(&self, expr: &Expr) -> CompileResult<TypeId> {
        expr.ty
            .ok_or_else(|| CompileError::codegen(format!("expression at {:?} has no type", expr.span)))
    }

    fn resolved(ty: Option<TypeId>, what: &str) -> CompileResult<TypeId> {
        ty.ok_or_else(|| CompileError::codegen(format!("{} has no resolved type", what)))
    }

    // ==================== Globals ====================

    fn build_declaration(&mut self, decl: &Declaration) -> CompileResult<()> {
        match &decl.kind {
            DeclKind::Function(func) => self.build_function(func),
            DeclKind::Variable(var) => self.build_global_var(var),
            DeclKind::MultipleVariables(vars) => {
                for var in vars {
                    self.build_global_var(var)?;
                }
                Ok(())
            }
            DeclKind::Struct(_) => Ok(()),
        }
    }

    fn build_global_var(&mut self, var: &VarDecl) -> CompileResult<()> {
        let ty = Self::resolved(var.resolved, &var.name)?;
        let size = self.registry.size_of(ty);
        let init = match &var.init {
            Some(init) => {
                let mut bytes = vec![0u8; size];
                self.global_bytes(init, ty, 0, &mut bytes)?;
                Some(bytes)
            }
            None => None,
        };

        self.module.globals.push(IrGlobal {
            name: var.name.clone(),
            ty,
            size,
            align: self.registry.align_of(ty),
            init,
        });
        Ok(())
    }

    /// Lay out a constant initializer into `bytes` at `offset`
    fn global_bytes(&self, init: &Initializer, ty: TypeId, offset: usize, bytes: &mut [u8]) -> CompileResult<()> {
        match (init, self.registry.get(ty)) {
            (Initializer::Expr(Expr { kind: ExprKind::StringLiteral(s), .. }), Type::Array { length, .. }) => {
                for (i, b) in s.bytes().take(length).enumerate() {
                    bytes[offset + i] = b;
                }
                Ok(())
            }
            (Initializer::Expr(expr), _) => {
                let value = expr
                    .constant_value()
                    .ok_or_else(|| CompileError::codegen("non-constant expression in global initializer"))?;
                let access = self
                    .registry
                    .access(ty)
                    .ok_or_else(|| CompileError::codegen("global initializer for a non-scalar object"))?;
                let image = value.to_le_bytes();
                bytes[offset..offset + access.size].copy_from_slice(&image[..access.size]);
                Ok(())
            }
            (Initializer::List(items, _), Type::Array { element, .. }) => {
                let stride = self.registry.size_of(element);
                for (i, item) in items.iter().enumerate() {
                    self.global_bytes(item, element, offset + i * stride, bytes)?;
                }
                Ok(())
            }
            (Initializer::List(items, _), Type::Struct(sid)) => {
                let members = &self.registry.struct_type(sid).members;
                for (item, member) in items.iter().zip(members) {
                    self.global_bytes(item, member.ty, offset + member.offset, bytes)?;
                }
                Ok(())
            }
            (Initializer::List(items, _), _) => match items.first() {
                Some(item) => self.global_bytes(item, ty, offset, bytes),
                None => Ok(()),
            },
        }
    }

    // ==================== Functions ====================

    fn build_function(&mut self, func: &FuncDecl) -> CompileResult<()> {
        let Some(body) = &func.body else {
            return Ok(());
        };

        let return_type = Self::resolved(func.resolved_return, &func.name)?;
        let mut params = Vec::with_capacity(func.params.len());
        for param in &func.params {
            let name = param.name.clone().unwrap_or_default();
            let ty = Self::resolved(param.resolved, &name)?;
            params.push((name, ty));
        }

        self.current_func = Some(IrFunction::new(func.name.clone(), params.clone(), return_type));
        self.scopes = vec![HashMap::new()];
        self.temp_counter = 0;

        // Every parameter gets a stack slot; struct arguments arrive as the
        // caller's address and are copied member by member.
        for (index, (name, ty)) in params.into_iter().enumerate() {
            let incoming = self.new_temp();
            self.emit(Inst::LoadParam { dst: incoming, index });
            let slot = self.alloca(ty);
            let target = Lvalue::new(Value::Temp(slot), ty);
            if self.registry.is_struct(ty) {
                self.emit_copy(&target, &Lvalue::new(Value::Temp(incoming), ty));
            } else {
                self.emit_store(&target, Value::Temp(incoming))?;
            }
            self.bind(name, slot);
        }

        self.build_items(&body.items)?;

        let fallthrough = if self.registry.is_void(return_type) {
            None
        } else {
            Some(Value::IntConst(0))
        };
        self.emit(Inst::Return(fallthrough));

        let mut built = self
            .current_func
            .take()
            .ok_or_else(|| CompileError::codegen("no current function to finalize"))?;
        built.temp_count = self.temp_counter;
        debug!(function = %built.name, insts = built.body.len(), temps = built.temp_count, "lowered function");
        self.module.functions.push(built);
        Ok(())
    }

    fn alloca(&mut self, ty: TypeId) -> Temp {
        let dst = self.new_temp();
        self.emit(Inst::Alloca {
            dst,
            size: self.registry.size_of(ty),
            align: self.registry.align_of(ty),
        });
        dst
    }

    fn bind(&mut self, name: String, slot: Temp) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name, slot);
        }
    }

    /// Address of a named variable: its stack slot, or the global's address
    pub(super) fn variable_address(&mut self, name: &str) -> Value {
        if let Some(&slot) = self.scopes.iter().rev().find_map(|scope| scope.get(name)) {
            return Value::Temp(slot);
        }
        let dst = self.new_temp();
        self.emit(Inst::AddrOf { dst, name: name.to_string() });
        Value::Temp(dst)
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        self.scopes.push(HashMap::new());
        let result = f(self);
        self.scopes.pop();
        result
    }

    // ==================== Statements ====================

    fn build_items(&mut self, items: &[BlockItem]) -> CompileResult<()> {
        for item in items {
            match item {
                BlockItem::Statement(stmt) => self.build_stmt(stmt)?,
                BlockItem::Declaration(decl) => self.build_local_decl(decl)?,
            }
        }
        Ok(())
    }

    fn build_local_decl(&mut self, decl: &Declaration) -> CompileResult<()> {
        match &decl.kind {
            DeclKind::Variable(var) => self.build_local_var(var),
            DeclKind::MultipleVariables(vars) => {
                for var in vars {
                    self.build_local_var(var)?;
                }
                Ok(())
            }
            DeclKind::Function(_) | DeclKind::Struct(_) => Ok(()),
        }
    }

    fn build_local_var(&mut self, var: &VarDecl) -> CompileResult<()> {
        let ty = Self::resolved(var.resolved, &var.name)?;
        let slot = self.alloca(ty);
        self.bind(var.name.clone(), slot);

        if let Some(init) = &var.init {
            let target = Lvalue::new(Value::Temp(slot), ty);
            if matches!(init, Initializer::List(..)) || self.registry.is_array(ty) {
                self.emit_zero(&target);
            }
            self.build_initializer(&target, init)?;
        }
        Ok(())
    }

    fn build_initializer(&mut self, target: &Lvalue, init: &Initializer) -> CompileResult<()> {
        match (init, self.registry.get(target.ty)) {
            (Initializer::Expr(Expr { kind: ExprKind::StringLiteral(s), .. }), Type::Array { length, .. }) => {
                for (i, b) in s.bytes().take(length).enumerate() {
                    let byte = target.at(i as i64, target.ty);
                    self.emit(Inst::Store {
                        base: byte.base,
                        offset: byte.offset,
                        src: Value::IntConst(i64::from(b)),
                        size: 1,
                    });
                }
                Ok(())
            }
            (Initializer::Expr(expr), Type::Struct(_)) => {
                let source = self.build_expr(expr)?;
                self.emit_copy(target, &Lvalue::new(source, target.ty));
                Ok(())
            }
            (Initializer::Expr(expr), _) => {
                let value = self.build_expr(expr)?;
                let value = self.convert(value, target.ty);
                self.emit_store(target, value)
            }
            (Initializer::List(items, _), Type::Array { element, .. }) => {
                let stride = self.registry.size_of(element) as i64;
                for (i, item) in items.iter().enumerate() {
                    self.build_initializer(&target.at(i as i64 * stride, element), item)?;
                }
                Ok(())
            }
            (Initializer::List(items, _), Type::Struct(sid)) => {
                let members: Vec<(i64, TypeId)> = self
                    .registry
                    .struct_type(sid)
                    .members
                    .iter()
                    .map(|m| (m.offset as i64, m.ty))
                    .collect();
                for (item, (offset, ty)) in items.iter().zip(members) {
                    self.build_initializer(&target.at(offset, ty), item)?;
                }
                Ok(())
            }
            (Initializer::List(items, _), _) => match items.first() {
                Some(item) => self.build_initializer(target, item),
                None => Ok(()),
            },
        }
    }

    fn build_stmt(&mut self, stmt: &Stmt) -> CompileResult<()> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.build_expr(expr)?;
            }
            StmtKind::Empty => {}
            StmtKind::Block(block) => {
                self.in_scope(|this| this.build_items(&block.items))?;
            }
            StmtKind::If { condition, then_branch, else_branch } => {
                self.build_if(condition, then_branch, else_branch.as_deref())?;
            }
            StmtKind::Loop(lp) => {
                self.in_scope(|this| this.build_loop(lp))?;
            }
            StmtKind::Return(value) => {
                let val = match value {
                    Some(expr) => {
                        let value = self.build_expr(expr)?;
                        let ret = self.current_func.as_ref().map(|f| f.return_type);
                        Some(match ret {
                            Some(ret) => self.convert(value, ret),
                            None => value,
                        })
                    }
                    None => None,
                };
                self.emit(Inst::Return(val));
            }
            StmtKind::Break => {
                if let Some(label) = &self.break_label {
                    self.emit(Inst::Jump(label.clone()));
                }
            }
            StmtKind::Continue => {
                if let Some(label) = &self.continue_label {
                    self.emit(Inst::Jump(label.clone()));
                }
            }
        }
        Ok(())
    }

    fn build_if(&mut self, condition: &Expr, then_branch: &Stmt, else_branch: Option<&Stmt>) -> CompileResult<()> {
        let cond = self.build_expr(condition)?;
        let else_label = self.new_label("else");
        let end_label = self.new_label("endif");

        self.emit(Inst::CondJumpFalse {
            cond,
            target: else_label.clone(),
        });

        self.build_stmt(then_branch)?;

        if else_branch.is_some() {
            self.emit(Inst::Jump(end_label.clone()));
        }

        self.emit(Inst::Label(else_label));

        if let Some(else_stmt) = else_branch {
            self.build_stmt(else_stmt)?;
            self.emit(Inst::Label(end_label));
        }

        Ok(())
    }

    /// Lower any loop form:
    ///
    /// ```text
    ///     init
    ///     jump body        ; do/while only
    /// top:
    ///     ifnot cond goto end
    /// body:
    ///     ...
    /// next:                ; continue target
    ///     update
    ///     jump top
    /// end:                 ; break target
    /// ```
    fn build_loop(&mut self, lp: &Loop) -> CompileResult<()> {
        match &lp.init {
            Some(ForInit::Expr(expr)) => {
                self.build_expr(expr)?;
            }
            Some(ForInit::Declaration(decl)) => self.build_local_decl(decl)?,
            None => {}
        }

        let top = self.new_label("loop");
        let body = self.new_label("body");
        let next = self.new_label("next");
        let end = self.new_label("endloop");

        if !lp.tests_first() {
            self.emit(Inst::Jump(body.clone()));
        }
        self.emit(Inst::Label(top.clone()));
        if let Some(condition) = &lp.condition {
            let cond = self.build_expr(condition)?;
            self.emit(Inst::CondJumpFalse {
                cond,
                target: end.clone(),
            });
        }
        self.emit(Inst::Label(body));

        let old_break = self.break_label.replace(end.clone());
        let old_continue = self.continue_label.replace(next.clone());
        let result = self.build_stmt(&lp.body);
        self.break_label = old_break;
        self.continue_label = old_continue;
        result?;

        self.emit(Inst::Label(next));
        if let Some(update) = &lp.update {
            self.build_expr(update)?;
        }
        self.emit(Inst::Jump(top));
        self.emit(Inst::Label(end));
        Ok(())
    }

    // ==================== Expressions ====================

    /// Truncate or extend a value to the width of a scalar type
    pub(super) fn convert(&mut self, value: Value, ty: TypeId) -> Value {
        match self.registry.access(ty) {
            Some(access) if access.size < 8 => {
                if let Value::IntConst(n) = value {
                    return Value::IntConst(access.truncate(n));
                }
                let dst = self.new_temp();
                self.emit(Inst::Cast {
                    dst,
                    src: value,
                    size: access.size,
                    signed: access.signed,
                });
                Value::Temp(dst)
            }
            _ => value,
        }
    }

    /// Size of the object a pointer or array operand points into
    fn stride(&self, ty: TypeId) -> Option<i64> {
        match self.registry.get(ty) {
            Type::Pointer(target) | Type::Array { element: target, .. } => {
                Some(self.registry.size_of(target) as i64)
            }
            _ => None,
        }
    }

    fn is_unsigned(&self, ty: TypeId) -> bool {
        match self.registry.get(ty) {
            Type::Int { signed, .. } => !signed,
            Type::Pointer(_) | Type::Array { .. } => true,
            _ => false,
        }
    }

    fn binary(&mut self, op: BinOp, left: Value, right: Value) -> Value {
        let dst = self.new_temp();
        self.emit(Inst::Binary { dst, op, left, right });
        Value::Temp(dst)
    }

    fn scale(&mut self, value: Value, stride: i64) -> Value {
        match value {
            _ if stride == 1 => value,
            Value::IntConst(n) => Value::IntConst(n.wrapping_mul(stride)),
            _ => self.binary(BinOp::Mul, value, Value::IntConst(stride)),
        }
    }

    fn ir_op(op: BinaryOp, unsigned: bool) -> BinOp {
        match (op, unsigned) {
            (BinaryOp::Add, _) => BinOp::Add,
            (BinaryOp::Sub, _) => BinOp::Sub,
            (BinaryOp::Mul, _) => BinOp::Mul,
            (BinaryOp::Div, false) => BinOp::Div,
            (BinaryOp::Div, true) => BinOp::UDiv,
            (BinaryOp::Mod, false) => BinOp::Mod,
            (BinaryOp::Mod, true) => BinOp::UMod,
            (BinaryOp::BitAnd, _) => BinOp::And,
            (BinaryOp::BitOr, _) => BinOp::Or,
            (BinaryOp::BitXor, _) => BinOp::Xor,
            (BinaryOp::Shl, _) => BinOp::Shl,
            (BinaryOp::Shr, false) => BinOp::Shr,
            (BinaryOp::Shr, true) => BinOp::UShr,
            (BinaryOp::Eq, _) => BinOp::Eq,
            (BinaryOp::Ne, _) => BinOp::Ne,
            (BinaryOp::Lt, false) => BinOp::Lt,
            (BinaryOp::Lt, true) => BinOp::ULt,
            (BinaryOp::Le, false) => BinOp::Le,
            (BinaryOp::Le, true) => BinOp::ULe,
            (BinaryOp::Gt, false) => BinOp::Gt,
            (BinaryOp::Gt, true) => BinOp::UGt,
            (BinaryOp::Ge, false) => BinOp::Ge,
            (BinaryOp::Ge, true) => BinOp::UGe,
            (BinaryOp::LogAnd, _) => BinOp::And,
            (BinaryOp::LogOr, _) => BinOp::Or,
        }
    }

    /// `left op right` with C typing: pointer operands scale by the pointee size
    fn build_arith(
        &mut self,
        op: BinaryOp,
        left: Value,
        left_ty: TypeId,
        right: Value,
        right_ty: TypeId,
        result_ty: TypeId,
    ) -> Value {
        let (l_stride, r_stride) = (self.stride(left_ty), self.stride(right_ty));
        match (op, l_stride, r_stride) {
            (BinaryOp::Add | BinaryOp::Sub, Some(stride), None) => {
                let offset = self.scale(right, stride);
                let ir_op = Self::ir_op(op, false);
                self.binary(ir_op, left, offset)
            }
            (BinaryOp::Add, None, Some(stride)) => {
                let offset = self.scale(left, stride);
                self.binary(BinOp::Add, right, offset)
            }
            (BinaryOp::Sub, Some(stride), Some(_)) => {
                let diff = self.binary(BinOp::Sub, left, right);
                if stride > 1 {
                    self.binary(BinOp::Div, diff, Value::IntConst(stride))
                } else {
                    diff
                }
            }
            _ => {
                let unsigned = if op.is_comparison() {
                    (self.is_unsigned(left_ty) && self.registry.size_of(left_ty) >= 4)
                        || (self.is_unsigned(right_ty) && self.registry.size_of(right_ty) >= 4)
                } else {
                    self.is_unsigned(result_ty)
                };
                let value = self.binary(Self::ir_op(op, unsigned), left, right);
                if op.is_comparison() {
                    value
                } else {
                    self.convert(value, result_ty)
                }
            }
        }
    }

    pub(super) fn build_expr(&mut self, expr: &Expr) -> CompileResult<Value> {
        let ty = self.type_of(expr)?;
        match &expr.kind {
            ExprKind::IntLiteral(n) => Ok(Value::IntConst(*n)),

            ExprKind::CharLiteral(c) => Ok(Value::IntConst(char_value(*c))),

            ExprKind::StringLiteral(s) => {
                let label = Label(format!(".Lstr{}", self.string_counter));
                self.string_counter += 1;
                self.module.strings.push((label.clone(), s.clone()));
                Ok(Value::StringConst(label))
            }

            ExprKind::Identifier(_)
            | ExprKind::Index { .. }
            | ExprKind::Member { .. }
            | ExprKind::PtrMember { .. }
            | ExprKind::Deref(_) => {
                let lv = self.build_lvalue(expr)?;
                Ok(self.emit_load(&lv))
            }

            ExprKind::Binary { op, left, right } => {
                if op.is_logical() {
                    return self.build_logical_expr(*op, left, right);
                }
                let l = self.build_expr(left)?;
                let r = self.build_expr(right)?;
                let (left_ty, right_ty) = (self.type_of(left)?, self.type_of(right)?);
                Ok(self.build_arith(*op, l, left_ty, r, right_ty, ty))
            }

            ExprKind::Unary { op, operand } => {
                let src = self.build_expr(operand)?;
                let dst = self.new_temp();
                let ir_op = match op {
                    UnaryOp::Neg => UnOp::Neg,
                    UnaryOp::Not => UnOp::Not,
                    UnaryOp::BitNot => UnOp::BitNot,
                };
                self.emit(Inst::Unary { dst, op: ir_op, src });
                Ok(self.convert(Value::Temp(dst), ty))
            }

            ExprKind::Assign { op, target, value } => self.build_assign(*op, target, value, ty),

            ExprKind::Call { callee, args } => {
                let ExprKind::Identifier(func) = &callee.kind else {
                    return Err(CompileError::codegen("indirect calls are not supported"));
                };
                let mut ir_args = Vec::with_capacity(args.len());
                for arg in args {
                    ir_args.push(self.build_expr(arg)?);
                }

                if self.registry.is_void(ty) {
                    self.emit(Inst::Call { dst: None, func: func.clone(), args: ir_args });
                    return Ok(Value::IntConst(0));
                }
                let dst = self.new_temp();
                self.emit(Inst::Call {
                    dst: Some(dst),
                    func: func.clone(),
                    args: ir_args,
                });
                Ok(Value::Temp(dst))
            }

            ExprKind::AddrOf(operand) => {
                let lv = self.build_lvalue(operand)?;
                Ok(self.lvalue_address(&lv))
            }

            ExprKind::Step { operand, decrement, postfix } => {
                let lv = self.build_lvalue(operand)?;
                let old = self.emit_load(&lv);
                let step = self.stride(ty).unwrap_or(1);
                let op = if *decrement { BinOp::Sub } else { BinOp::Add };
                let new_val = self.binary(op, old.clone(), Value::IntConst(step));
                let new_val = self.convert(new_val, ty);
                self.emit_store(&lv, new_val.clone())?;
                Ok(if *postfix { old } else { new_val })
            }

            ExprKind::Ternary { condition, then_expr, else_expr } => {
                let cond = self.build_expr(condition)?;
                let else_label = self.new_label("ternelse");
                let end_label = self.new_label("ternend");
                let result = self.new_temp();

                self.emit(Inst::CondJumpFalse {
                    cond,
                    target: else_label.clone(),
                });

                let then_val = self.build_expr(then_expr)?;
                let then_val = self.convert(then_val, ty);
                self.emit(Inst::Copy { dst: result, src: then_val });
                self.emit(Inst::Jump(end_label.clone()));

                self.emit(Inst::Label(else_label));
                let else_val = self.build_expr(else_expr)?;
                let else_val = self.convert(else_val, ty);
                self.emit(Inst::Copy { dst: result, src: else_val });

                self.emit(Inst::Label(end_label));
                Ok(Value::Temp(result))
            }

            ExprKind::Cast { expr: inner, .. } => {
                let value = self.build_expr(inner)?;
                if self.registry.is_void(ty) {
                    return Ok(Value::IntConst(0));
                }
                Ok(self.convert(value, ty))
            }

            ExprKind::Sizeof(_) | ExprKind::Alignof(_) => {
                Err(CompileError::codegen("size query was not folded during analysis"))
            }

            ExprKind::Comma(exprs) => {
                let mut last = Value::IntConst(0);
                for e in exprs {
                    last = self.build_expr(e)?;
                }
                Ok(last)
            }

            ExprKind::StmtExpr(block) => self.in_scope(|this| {
                let Some((last, rest)) = block.items.split_last() else {
                    return Ok(Value::IntConst(0));
                };
                this.build_items(rest)?;
                match last {
                    BlockItem::Statement(Stmt { kind: StmtKind::Expr(value), .. }) => this.build_expr(value),
                    other => {
                        this.build_items(std::slice::from_ref(other))?;
                        Ok(Value::IntConst(0))
                    }
                }
            }),
        }
    }

    fn build_assign(&mut self, op: Option<BinaryOp>, target: &Expr, value: &Expr, ty: TypeId) -> CompileResult<Value> {
        if self.registry.is_struct(ty) {
            let source = self.build_expr(value)?;
            let lv = self.build_lvalue(target)?;
            self.emit_copy(&lv, &Lvalue::new(source, ty));
            return Ok(self.lvalue_address(&lv));
        }

        let Some(bin_op) = op else {
            let val = self.build_expr(value)?;
            let val = self.convert(val, ty);
            let lv = self.build_lvalue(target)?;
            self.emit_store(&lv, val.clone())?;
            return Ok(val);
        };

        let lv = self.build_lvalue(target)?;
        let old = self.emit_load(&lv);
        let rhs = self.build_expr(value)?;
        let rhs_ty = self.type_of(value)?;
        let result = self.build_arith(bin_op, old, ty, rhs, rhs_ty, ty);
        self.emit_store(&lv, result.clone())?;
        Ok(result)
    }

    fn build_logical_expr(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> CompileResult<Value> {
        let result = self.new_temp();
        let short_circuit = self.new_label("shortcircuit");
        let end_label = self.new_label("logend");

        let l = self.build_expr(left)?;
        let (jump, short_value) = if op == BinaryOp::LogAnd {
            (
                Inst::CondJumpFalse {
                    cond: l,
                    target: short_circuit.clone(),
                },
                0,
            )
        } else {
            (
                Inst::CondJump {
                    cond: l,
                    target: short_circuit.clone(),
                },
                1,
            )
        };
        self.emit(jump);

        let r = self.build_expr(right)?;
        let cmp = self.binary(BinOp::Ne, r, Value::IntConst(0));
        self.emit(Inst::Copy { dst: result, src: cmp });
        self.emit(Inst::Jump(end_label.clone()));

        self.emit(Inst::Label(short_circuit));
        self.emit(Inst::Copy {
            dst: result,
            src: Value::IntConst(short_value),
        });

        self.emit(Inst::Label(end_label));
        Ok(Value::Temp(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::c::parser::Parser;
    use crate::frontend::c::sema::SemanticAnalyzer;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> IrModule {
        let mut tu = Parser::new(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::default();
        analyzer.analyze(&mut tu).unwrap();
        IrBuilder::new(analyzer.registry()).build(&tu).unwrap()
    }

    fn body(module: &IrModule) -> Vec<String> {
        module.functions[0].body.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_member_store_uses_resolved_offset() {
        let module = lower("void f(void) { struct { char a; int b; char c; } x; x.c = 3; }");
        assert_eq!(
            body(&module),
            vec![
                "  t0 = alloca 12, align 4".to_string(),
                "  store.8 [t0 + 8], 3".to_string(),
                "  return".to_string(),
            ]
        );
    }

    #[test]
    fn test_constant_index_folds_into_offset() {
        let module = lower("int f(void) { struct { int a; int b; } x[3]; return x[1].b; }");
        let lines = body(&module);
        assert_eq!(lines[1], "  t1 = load.i32 [t0 + 12]");
    }

    #[test]
    fn test_variable_index_moves_base() {
        let module = lower("int f(int i) { struct { int a; int b; } x[3]; return x[i].b; }");
        let lines = body(&module);
        // t0 param, t1 slot of i, t2 slot of x, t3 value of i
        assert!(lines.contains(&"  t4 = t3 * 8".to_string()), "{:#?}", lines);
        assert!(lines.contains(&"  t5 = t2 + t4".to_string()), "{:#?}", lines);
        assert!(lines.iter().any(|l| l.ends_with("load.i32 [t5 + 4]")), "{:#?}", lines);
    }

    #[test]
    fn test_struct_assignment_is_per_member() {
        let module = lower(
            "void f(void) {
                 struct s { char a; int b; } x;
                 struct s y;
                 y = x;
             }",
        );
        let lines = body(&module);
        let loads = lines.iter().filter(|l| l.contains("load.")).count();
        let stores = lines.iter().filter(|l| l.contains("store.")).count();
        assert_eq!((loads, stores), (2, 2));
        assert!(lines.iter().any(|l| l.contains("load.i8 [t0 + 0]")));
        assert!(lines.iter().any(|l| l.contains("store.32 [t1 + 4]")));
    }

    #[test]
    fn test_global_initializer_bytes() {
        let module = lower("struct { char a; int b; } g = { 1, 258 }; char s[4] = \"hi\";");
        assert_eq!(module.globals[0].init, Some(vec![1, 0, 0, 0, 2, 1, 0, 0]));
        assert_eq!(module.globals[1].init, Some(vec![b'h', b'i', 0, 0]));
    }

    #[test]
    fn test_pointer_arithmetic_scales() {
        let module = lower("long *f(long *p) { return p + 2; }");
        let lines = body(&module);
        assert!(lines.iter().any(|l| l.ends_with("+ 16")), "{:#?}", lines);
    }
}
