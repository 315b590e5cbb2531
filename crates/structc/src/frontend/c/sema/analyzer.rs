//! Semantic analyzer - type resolution, checking and annotation
//!
//! Every type written in the source is resolved into the [`TypeRegistry`];
//! struct bodies are laid out as they are met. Expressions get their registry
//! type in `Expr::ty`, member accesses get their `(type, offset)`, and
//! `sizeof`/`_Alignof` are folded into literals. A failing declaration or
//! statement is recorded and analysis continues with the next one.

use super::scope::{FunctionSig, Scope, Symbol, SymbolKind};
use crate::common::{CompileError, CompileResult, Span};
use crate::exec::BUILTIN_ASSERT;
use crate::frontend::c::ast::*;
use crate::types::{LayoutConfig, LayoutError, MemberDecl, Type, TypeId, TypeRegistry};
use std::collections::HashMap;
use tracing::{debug, trace};

fn layout(err: LayoutError, span: Span) -> CompileError {
    CompileError::Layout(err.at(span))
}

/// Semantic analyzer for one translation unit
pub struct SemanticAnalyzer {
    registry: TypeRegistry,
    scope: Scope,
    /// Struct bodies and tag references already resolved, by parser identity
    struct_specs: HashMap<StructSpecId, TypeId>,
    errors: Vec<CompileError>,
    return_type: Option<TypeId>,
    loop_depth: usize,
}

impl SemanticAnalyzer {
    pub fn new(config: LayoutConfig) -> Self {
        let registry = TypeRegistry::new(config);
        let mut scope = Scope::new();

        let long = registry.c_long(true);
        let int = registry.c_int();
        scope.replace(Symbol {
            name: BUILTIN_ASSERT.to_string(),
            kind: SymbolKind::Function(FunctionSig {
                params: vec![long, long],
                variadic: false,
                defined: true,
                builtin: true,
            }),
            ty: int,
            span: Span::default(),
        });

        Self {
            registry,
            scope,
            struct_specs: HashMap::new(),
            errors: Vec::new(),
            return_type: None,
            loop_depth: 0,
        }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn into_registry(self) -> TypeRegistry {
        self.registry
    }

    /// Analyze a translation unit, reporting every failing declaration
    pub fn analyze(&mut self, tu: &mut TranslationUnit) -> CompileResult<()> {
        for decl in &mut tu.declarations {
            if let Err(err) = self.analyze_declaration(decl) {
                self.errors.push(err);
            }
        }

        if self.errors.is_empty() {
            Ok(())
        } else {
            debug!(errors = self.errors.len(), "semantic analysis failed");
            Err(CompileError::from_many(std::mem::take(&mut self.errors)))
        }
    }

    fn in_scope<T>(&mut self, f: impl FnOnce(&mut Self) -> CompileResult<T>) -> CompileResult<T> {
        self.scope.push_child();
        let result = f(self);
        self.scope.pop_to_parent();
        result
    }

    // ==================== Types ====================

    fn resolve_type(&mut self, ty: &CType) -> CompileResult<TypeId> {
        self.resolve_type_at(ty, 1)
    }

    fn resolve_type_at(&mut self, ty: &CType, depth: usize) -> CompileResult<TypeId> {
        let limit = self.registry.config().max_type_depth;
        if depth > limit {
            return Err(LayoutError::TypeTooDeep { limit, span: ty.span }.into());
        }

        let id = match &ty.kind {
            TypeKind::Void => self.registry.void(),
            TypeKind::Char { signed } => self.registry.int(1, *signed),
            TypeKind::Short { signed } => self.registry.int(2, *signed),
            TypeKind::Int { signed } => self.registry.int(4, *signed),
            TypeKind::Long { signed } => self.registry.c_long(*signed),
            TypeKind::LongLong { signed } => self.registry.int(8, *signed),
            TypeKind::Pointer(inner) => {
                let inner = self.resolve_type_at(inner, depth + 1)?;
                self.registry.pointer_to(inner).map_err(|e| layout(e, ty.span))?
            }
            TypeKind::Array { element, size } => {
                let elem = self.resolve_type_at(element, depth + 1)?;
                self.check_complete(elem, element.span)?;
                let Some(length) = size else {
                    return Err(CompileError::type_error(
                        "array has incomplete type; a size or initializer is required",
                        ty.span,
                    ));
                };
                self.registry.array_of(elem, *length).map_err(|e| layout(e, ty.span))?
            }
            TypeKind::Struct(spec) => self.resolve_struct(spec, depth)?,
        };
        Ok(id)
    }

    /// Lay out a struct body, or find the struct a tag refers to
    fn resolve_struct(&mut self, spec: &StructSpec, depth: usize) -> CompileResult<TypeId> {
        if let Some(&id) = self.struct_specs.get(&spec.id) {
            return Ok(id);
        }

        let id = match &spec.members {
            Some(members) => {
                let mut decls = Vec::with_capacity(members.len());
                for member in members {
                    let ty = self.resolve_type_at(&member.ty, depth + 1)?;
                    if self.registry.is_void(ty) {
                        return Err(CompileError::type_error(
                            format!("member '{}' has incomplete type 'void'", member.name),
                            member.span,
                        ));
                    }
                    decls.push(MemberDecl::new(member.name.as_str(), ty, member.span));
                }

                let id = self
                    .registry
                    .build_struct(spec.name.clone(), decls)
                    .map_err(|e| layout(e, spec.span))?;
                if let Some(name) = &spec.name {
                    self.scope
                        .define_struct(name, id, spec.span)
                        .map_err(|msg| CompileError::semantic(msg, spec.span))?;
                }
                id
            }
            None => {
                let name = spec.name.as_deref().unwrap_or_default();
                self.scope.lookup_struct(name).ok_or_else(|| {
                    CompileError::semantic(format!("unknown struct '{}'", name), spec.span)
                })?
            }
        };

        self.struct_specs.insert(spec.id, id);
        Ok(id)
    }

    fn check_complete(&self, ty: TypeId, span: Span) -> CompileResult<()> {
        if self.registry.is_void(ty) {
            return Err(CompileError::type_error("array has incomplete element type 'void'", span));
        }
        Ok(())
    }

    /// Array type whose length comes from the initializer: `int a[] = {1, 2}`
    fn resolve_object_type(&mut self, ty: &CType, init: Option<&Initializer>) -> CompileResult<TypeId> {
        let TypeKind::Array { element, size: None } = &ty.kind else {
            return self.resolve_type(ty);
        };

        let length = match init {
            Some(Initializer::List(items, _)) => items.len(),
            Some(Initializer::Expr(Expr { kind: ExprKind::StringLiteral(s), .. })) => s.len() + 1,
            _ => {
                return Err(CompileError::type_error(
                    "array has incomplete type; a size or initializer is required",
                    ty.span,
                ));
            }
        };
        let elem = self.resolve_type_at(element, 2)?;
        self.check_complete(elem, element.span)?;
        self.registry.array_of(elem, length).map_err(|e| layout(e, ty.span))
    }

    /// Parameters of array type are pointers
    fn resolve_param_type(&mut self, ty: &CType) -> CompileResult<TypeId> {
        match &ty.kind {
            TypeKind::Array { element, .. } => {
                let elem = self.resolve_type_at(element, 2)?;
                self.registry.pointer_to(elem).map_err(|e| layout(e, ty.span))
            }
            _ => self.resolve_type(ty),
        }
    }

    fn decay(&mut self, ty: TypeId, span: Span) -> CompileResult<TypeId> {
        match self.registry.get(ty) {
            Type::Array { element, .. } => self.registry.pointer_to(element).map_err(|e| layout(e, span)),
            _ => Ok(ty),
        }
    }

    // ==================== Declarations ====================

    fn analyze_declaration(&mut self, decl: &mut Declaration) -> CompileResult<()> {
        match &mut decl.kind {
            DeclKind::Variable(var) => self.analyze_var_decl(var),
            DeclKind::MultipleVariables(vars) => {
                for var in vars {
                    self.analyze_var_decl(var)?;
                }
                Ok(())
            }
            DeclKind::Function(func) => self.analyze_func_decl(func),
            DeclKind::Struct(spec) => {
                if !spec.has_body() {
                    let name = spec.name.as_deref().unwrap_or_default();
                    return Err(CompileError::semantic(
                        format!("forward declaration of 'struct {}' is not supported", name),
                        spec.span,
                    ));
                }
                self.resolve_struct(spec, 1).map(|_| ())
            }
        }
    }

    fn analyze_var_decl(&mut self, var: &mut VarDecl) -> CompileResult<()> {
        let ty = self.resolve_object_type(&var.ty, var.init.as_ref())?;
        if self.registry.is_void(ty) {
            return Err(CompileError::type_error(
                format!("variable '{}' has incomplete type 'void'", var.name),
                var.span,
            ));
        }
        var.resolved = Some(ty);

        let global = self.scope.is_global();
        self.scope
            .define(Symbol {
                name: var.name.clone(),
                kind: SymbolKind::Variable { global },
                ty,
                span: var.span,
            })
            .map_err(|msg| CompileError::semantic(msg, var.span))?;

        if let Some(init) = &mut var.init {
            self.analyze_initializer(init, ty, global)?;
        }
        Ok(())
    }

    fn analyze_initializer(&mut self, init: &mut Initializer, ty: TypeId, global: bool) -> CompileResult<()> {
        match init {
            Initializer::Expr(expr) => {
                if let (Type::Array { element, length }, ExprKind::StringLiteral(s)) =
                    (self.registry.get(ty), &expr.kind)
                {
                    if self.registry.size_of(element) != 1 || !self.registry.is_integer(element) {
                        return Err(CompileError::type_error(
                            "array initializer must be an initializer list",
                            expr.span,
                        ));
                    }
                    if s.len() > length {
                        return Err(CompileError::type_error(
                            "initializer-string for char array is too long",
                            expr.span,
                        ));
                    }
                    self.analyze_expr(expr)?;
                    return Ok(());
                }

                if self.registry.is_array(ty) {
                    return Err(CompileError::type_error(
                        "array initializer must be an initializer list",
                        expr.span,
                    ));
                }
                let value = self.analyze_value(expr)?;
                self.check_assignable(ty, value, expr)?;
                if global && expr.constant_value().is_none() {
                    return Err(CompileError::semantic(
                        "initializer element is not a compile-time constant",
                        expr.span,
                    ));
                }
                Ok(())
            }
            Initializer::List(items, span) => match self.registry.get(ty) {
                Type::Array { element, length } => {
                    if let Some(extra) = items.get(length) {
                        return Err(CompileError::type_error(
                            "excess elements in array initializer",
                            extra.span(),
                        ));
                    }
                    for item in items {
                        self.analyze_initializer(item, element, global)?;
                    }
                    Ok(())
                }
                Type::Struct(sid) => {
                    let members: Vec<TypeId> =
                        self.registry.struct_type(sid).members.iter().map(|m| m.ty).collect();
                    if let Some(extra) = items.get(members.len()) {
                        return Err(CompileError::type_error(
                            "excess elements in struct initializer",
                            extra.span(),
                        ));
                    }
                    for (item, member) in items.iter_mut().zip(members) {
                        self.analyze_initializer(item, member, global)?;
                    }
                    Ok(())
                }
                _ => match items.as_mut_slice() {
                    [single @ Initializer::Expr(_)] => self.analyze_initializer(single, ty, global),
                    _ => Err(CompileError::type_error(
                        "scalar initializer must contain exactly one element",
                        *span,
                    )),
                },
            },
        }
    }

    fn analyze_func_decl(&mut self, func: &mut FuncDecl) -> CompileResult<()> {
        let ret = self.resolve_type(&func.return_type)?;
        if self.registry.is_struct(ret) {
            return Err(CompileError::semantic(
                "returning a struct by value is not supported",
                func.return_type.span,
            ));
        }
        if self.registry.is_array(ret) {
            return Err(CompileError::type_error(
                "function cannot return array type",
                func.return_type.span,
            ));
        }
        func.resolved_return = Some(ret);

        let mut params = Vec::with_capacity(func.params.len());
        for param in &mut func.params {
            let ty = self.resolve_param_type(&param.ty)?;
            if self.registry.is_void(ty) {
                return Err(CompileError::type_error("parameter has incomplete type 'void'", param.span));
            }
            if func.body.is_some() && param.name.is_none() {
                return Err(CompileError::semantic("parameter name omitted", param.span));
            }
            param.resolved = Some(ty);
            params.push(ty);
        }

        let sig = FunctionSig {
            params,
            variadic: func.variadic,
            defined: func.is_definition(),
            builtin: false,
        };
        self.declare_function(&func.name, ret, sig, func.span)?;

        let Some(body) = &mut func.body else {
            return Ok(());
        };

        debug!(function = %func.name, "analyzing function");
        self.return_type = Some(ret);
        let params = &func.params;
        let result = self.in_scope(|this| {
            for param in params {
                if let (Some(name), Some(ty)) = (&param.name, param.resolved) {
                    this.scope
                        .define(Symbol {
                            name: name.clone(),
                            kind: SymbolKind::Parameter,
                            ty,
                            span: param.span,
                        })
                        .map_err(|msg| CompileError::semantic(msg, param.span))?;
                }
            }
            this.analyze_items(&mut body.items, true)
        });
        self.return_type = None;
        result
    }

    fn declare_function(&mut self, name: &str, ret: TypeId, sig: FunctionSig, span: Span) -> CompileResult<()> {
        let previous = self.scope.lookup_local(name).map(|sym| (sym.kind.clone(), sym.ty));
        let sig = match previous {
            None => sig,
            Some((SymbolKind::Function(prev), _)) if prev.builtin => {
                return Err(CompileError::semantic(
                    format!("redefinition of builtin function '{}'", name),
                    span,
                ));
            }
            Some((SymbolKind::Function(prev), prev_ret)) => {
                if prev_ret != ret || !prev.compatible(&sig) {
                    return Err(CompileError::type_error(format!("conflicting types for '{}'", name), span));
                }
                if prev.defined && sig.defined {
                    return Err(CompileError::semantic(format!("redefinition of '{}'", name), span));
                }
                FunctionSig { defined: prev.defined || sig.defined, ..sig }
            }
            Some(_) => {
                return Err(CompileError::semantic(
                    format!("redefinition of '{}' as a different kind of symbol", name),
                    span,
                ));
            }
        };

        self.scope.replace(Symbol {
            name: name.to_string(),
            kind: SymbolKind::Function(sig),
            ty: ret,
            span,
        });
        Ok(())
    }

    // ==================== Statements ====================

    fn analyze_items(&mut self, items: &mut [BlockItem], recover: bool) -> CompileResult<()> {
        for item in items {
            let result = match item {
                BlockItem::Statement(stmt) => self.analyze_stmt(stmt),
                BlockItem::Declaration(decl) => self.analyze_declaration(decl),
            };
            if let Err(err) = result {
                if !recover {
                    return Err(err);
                }
                self.errors.push(err);
            }
        }
        Ok(())
    }

    fn analyze_stmt(&mut self, stmt: &mut Stmt) -> CompileResult<()> {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => {
                self.analyze_expr(expr)?;
            }
            StmtKind::Empty => {}
            StmtKind::Block(block) => {
                self.in_scope(|this| this.analyze_items(&mut block.items, true))?;
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.analyze_condition(condition)?;
                self.analyze_stmt(then_branch)?;
                if let Some(else_branch) = else_branch {
                    self.analyze_stmt(else_branch)?;
                }
            }
            StmtKind::Loop(lp) => {
                self.in_scope(|this| {
                    match &mut lp.init {
                        Some(ForInit::Expr(expr)) => {
                            this.analyze_expr(expr)?;
                        }
                        Some(ForInit::Declaration(decl)) => this.analyze_declaration(decl)?,
                        None => {}
                    }
                    if let Some(condition) = &mut lp.condition {
                        this.analyze_condition(condition)?;
                    }
                    if let Some(update) = &mut lp.update {
                        this.analyze_expr(update)?;
                    }
                    this.analyze_loop_body(&mut lp.body)
                })?;
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    return Err(CompileError::semantic("'break' statement not in loop", stmt.span));
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    return Err(CompileError::semantic("'continue' statement not in loop", stmt.span));
                }
            }
            StmtKind::Return(value) => {
                let ret = match self.return_type {
                    Some(ret) => ret,
                    None => return Err(CompileError::semantic("return outside of a function", stmt.span)),
                };
                if let Some(expr) = value {
                    let ty = self.analyze_value(expr)?;
                    if self.registry.is_void(ret) {
                        return Err(CompileError::type_error(
                            "void function should not return a value",
                            expr.span,
                        ));
                    }
                    self.check_assignable(ret, ty, expr)?;
                }
            }
        }
        Ok(())
    }

    fn analyze_loop_body(&mut self, body: &mut Stmt) -> CompileResult<()> {
        self.loop_depth += 1;
        let result = self.analyze_stmt(body);
        self.loop_depth -= 1;
        result
    }

    fn analyze_condition(&mut self, condition: &mut Expr) -> CompileResult<()> {
        let ty = self.analyze_value(condition)?;
        if !self.registry.is_scalar(ty) {
            return Err(CompileError::type_error(
                format!(
                    "statement requires expression of scalar type ('{}' invalid)",
                    self.registry.display(ty)
                ),
                condition.span,
            ));
        }
        Ok(())
    }

    // ==================== Expressions ====================

    /// Type of an expression in value context: arrays decay to pointers
    fn analyze_value(&mut self, expr: &mut Expr) -> CompileResult<TypeId> {
        let ty = self.analyze_expr(expr)?;
        self.decay(ty, expr.span)
    }

    fn analyze_expr(&mut self, expr: &mut Expr) -> CompileResult<TypeId> {
        let span = expr.span;
        let mut folded = None;

        let ty = match &mut expr.kind {
            ExprKind::IntLiteral(value) => {
                if i32::try_from(*value).is_ok() {
                    self.registry.c_int()
                } else {
                    self.registry.int(8, true)
                }
            }
            ExprKind::CharLiteral(_) => self.registry.c_int(),
            ExprKind::StringLiteral(s) => {
                let ch = self.registry.int(1, true);
                self.registry.array_of(ch, s.len() + 1).map_err(|e| layout(e, span))?
            }
            ExprKind::Identifier(name) => match self.scope.lookup(name) {
                Some(Symbol { kind: SymbolKind::Function(_), .. }) => {
                    return Err(CompileError::type_error(
                        format!("function '{}' can only be called", name),
                        span,
                    ));
                }
                Some(sym) => sym.ty,
                None => {
                    return Err(CompileError::semantic(
                        format!("use of undeclared identifier '{}'", name),
                        span,
                    ));
                }
            },
            ExprKind::Binary { op, left, right } => {
                let l = self.analyze_value(left)?;
                let r = self.analyze_value(right)?;
                self.binary_type(*op, l, r, span)?
            }
            ExprKind::Unary { op, operand } => {
                let ty = self.analyze_value(operand)?;
                match op {
                    UnaryOp::Not => {
                        self.require_scalar(ty, operand.span)?;
                        self.registry.c_int()
                    }
                    UnaryOp::Neg | UnaryOp::BitNot => {
                        if !self.registry.is_integer(ty) {
                            return Err(CompileError::type_error(
                                format!(
                                    "invalid argument type '{}' to unary expression",
                                    self.registry.display(ty)
                                ),
                                span,
                            ));
                        }
                        self.promote(ty)
                    }
                }
            }
            ExprKind::Assign { op, target, value } => {
                let target_ty = self.analyze_expr(target)?;
                if !Self::is_lvalue(target) {
                    return Err(CompileError::type_error("expression is not assignable", target.span));
                }
                if self.registry.is_array(target_ty) {
                    return Err(CompileError::type_error(
                        format!("array type '{}' is not assignable", self.registry.display(target_ty)),
                        target.span,
                    ));
                }
                let value_ty = self.analyze_value(value)?;
                match *op {
                    None => self.check_assignable(target_ty, value_ty, value)?,
                    Some(bin) if self.registry.is_pointer(target_ty) => {
                        if !matches!(bin, BinaryOp::Add | BinaryOp::Sub) || !self.registry.is_integer(value_ty) {
                            return Err(self.invalid_operands(target_ty, value_ty, span));
                        }
                        self.check_pointer_arith(target_ty, span)?;
                    }
                    Some(bin) => {
                        if !self.registry.is_integer(target_ty) {
                            return Err(self.invalid_operands(target_ty, value_ty, span));
                        }
                        self.binary_type(bin, target_ty, value_ty, span)?;
                    }
                }
                target_ty
            }
            ExprKind::Ternary {
                condition,
                then_expr,
                else_expr,
            } => {
                self.analyze_condition(condition)?;
                let t = self.analyze_value(then_expr)?;
                let e = self.analyze_value(else_expr)?;
                self.conditional_type(t, e, then_expr, else_expr, span)?
            }
            ExprKind::Call { callee, args } => self.analyze_call(callee, args, span)?,
            ExprKind::Index { array, index } => {
                let base = self.analyze_expr(array)?;
                let index_ty = self.analyze_value(index)?;
                if !self.registry.is_integer(index_ty) {
                    return Err(CompileError::type_error("array subscript is not an integer", index.span));
                }
                match self.registry.element(base) {
                    Some(elem) if self.registry.is_void(elem) => {
                        return Err(CompileError::type_error(
                            "subscript of pointer to incomplete type 'void'",
                            span,
                        ));
                    }
                    Some(elem) => elem,
                    None => {
                        let ty = self.registry.display(base);
                        return Err(LayoutError::IndexOnNonArray { ty, span }.into());
                    }
                }
            }
            ExprKind::Member { object, field, resolved } => {
                let object_ty = self.analyze_expr(object)?;
                let member = self
                    .registry
                    .resolve_member(object_ty, field)
                    .map_err(|e| layout(e, span))?;
                *resolved = Some(member);
                member.ty
            }
            ExprKind::PtrMember { pointer, field, resolved } => {
                let pointer_ty = self.analyze_value(pointer)?;
                let Some(target) = self.registry.pointee(pointer_ty) else {
                    let ty = self.registry.display(pointer_ty);
                    if self.registry.is_struct(pointer_ty) {
                        return Err(CompileError::type_error(
                            format!("member reference type '{}' is not a pointer; did you mean to use '.'?", ty),
                            span,
                        ));
                    }
                    return Err(LayoutError::NotAStruct { ty, span }.into());
                };
                let member = self.registry.resolve_member(target, field).map_err(|e| layout(e, span))?;
                *resolved = Some(member);
                member.ty
            }
            ExprKind::Cast { ty, expr: inner } => {
                let target = self.resolve_type(ty)?;
                let source = self.analyze_value(inner)?;
                if !self.registry.is_void(target) {
                    if !self.registry.is_scalar(target) {
                        return Err(CompileError::type_error(
                            format!("cannot cast to non-scalar type '{}'", self.registry.display(target)),
                            span,
                        ));
                    }
                    self.require_scalar(source, inner.span)?;
                }
                target
            }
            ExprKind::Sizeof(arg) => {
                let operand = self.sizeof_operand(arg, "sizeof")?;
                folded = Some(self.registry.size_of(operand));
                self.registry.c_long(false)
            }
            ExprKind::Alignof(arg) => {
                let operand = self.sizeof_operand(arg, "_Alignof")?;
                folded = Some(self.registry.align_of(operand));
                self.registry.c_long(false)
            }
            ExprKind::AddrOf(inner) => {
                let ty = self.analyze_expr(inner)?;
                if !Self::is_lvalue(inner) {
                    return Err(CompileError::type_error("cannot take the address of an rvalue", span));
                }
                self.registry.pointer_to(ty).map_err(|e| layout(e, span))?
            }
            ExprKind::Deref(inner) => {
                let ty = self.analyze_value(inner)?;
                match self.registry.pointee(ty) {
                    Some(target) if self.registry.is_void(target) => {
                        return Err(CompileError::type_error("dereferencing 'void *' pointer", span));
                    }
                    Some(target) => target,
                    None => {
                        return Err(CompileError::type_error(
                            format!(
                                "indirection requires pointer operand ('{}' invalid)",
                                self.registry.display(ty)
                            ),
                            span,
                        ));
                    }
                }
            }
            ExprKind::Step { operand: inner, .. } => {
                let ty = self.analyze_expr(inner)?;
                if !Self::is_lvalue(inner) || !self.registry.is_scalar(ty) {
                    return Err(CompileError::type_error(
                        "expression is not assignable",
                        inner.span,
                    ));
                }
                if self.registry.is_pointer(ty) {
                    self.check_pointer_arith(ty, span)?;
                }
                ty
            }
            ExprKind::Comma(exprs) => {
                let mut last = None;
                for e in exprs.iter_mut() {
                    last = Some(self.analyze_value(e)?);
                }
                match last {
                    Some(ty) => ty,
                    None => self.registry.void(),
                }
            }
            ExprKind::StmtExpr(block) => self.in_scope(|this| {
                this.analyze_items(&mut block.items, false)?;
                match block.trailing_expr().and_then(|e| e.ty) {
                    Some(ty) => this.decay(ty, span),
                    None => Ok(this.registry.void()),
                }
            })?,
        };

        if let Some(value) = folded {
            trace!(value, "folded size query");
            expr.kind = ExprKind::IntLiteral(value as i64);
        }
        expr.ty = Some(ty);
        Ok(ty)
    }

    fn sizeof_operand(&mut self, arg: &mut SizeofArg, op: &str) -> CompileResult<TypeId> {
        let (ty, span) = match arg {
            SizeofArg::Expr(expr) => (self.analyze_expr(expr)?, expr.span),
            SizeofArg::Type(ty) => (self.resolve_type(ty)?, ty.span),
        };
        if self.registry.is_void(ty) {
            return Err(CompileError::type_error(
                format!("invalid application of '{}' to an incomplete type 'void'", op),
                span,
            ));
        }
        Ok(ty)
    }

    fn analyze_call(&mut self, callee: &mut Expr, args: &mut [Expr], span: Span) -> CompileResult<TypeId> {
        let ExprKind::Identifier(name) = &callee.kind else {
            return Err(CompileError::type_error("called object is not a function", callee.span));
        };
        let (ret, sig) = match self.scope.lookup(name) {
            Some(Symbol { kind: SymbolKind::Function(sig), ty, .. }) => (*ty, sig.clone()),
            Some(sym) => {
                return Err(CompileError::type_error(
                    format!("called object type '{}' is not a function", self.registry.display(sym.ty)),
                    callee.span,
                ));
            }
            None => {
                return Err(CompileError::semantic(
                    format!("call to undeclared function '{}'", name),
                    callee.span,
                ));
            }
        };

        let expected = sig.params.len();
        if args.len() < expected || (!sig.variadic && args.len() > expected) {
            let which = if args.len() < expected { "few" } else { "many" };
            return Err(CompileError::type_error(
                format!(
                    "too {} arguments to function call, expected {}, have {}",
                    which,
                    expected,
                    args.len()
                ),
                span,
            ));
        }

        for (i, arg) in args.iter_mut().enumerate() {
            let ty = self.analyze_value(arg)?;
            match sig.params.get(i) {
                Some(&param) => self.check_assignable(param, ty, arg)?,
                None if self.registry.is_struct(ty) => {
                    return Err(CompileError::semantic(
                        "passing a struct through '...' is not supported",
                        arg.span,
                    ));
                }
                None => {}
            }
        }
        Ok(ret)
    }

    fn is_lvalue(expr: &Expr) -> bool {
        match &expr.kind {
            ExprKind::Identifier(_) | ExprKind::Index { .. } | ExprKind::PtrMember { .. } | ExprKind::Deref(_) => {
                true
            }
            ExprKind::Member { object, .. } => Self::is_lvalue(object),
            _ => false,
        }
    }

    // ==================== Typing rules ====================

    /// Integer promotion: anything narrower than int becomes int
    fn promote(&mut self, ty: TypeId) -> TypeId {
        match self.registry.get(ty) {
            Type::Int { bytes, .. } if bytes < 4 => self.registry.c_int(),
            _ => ty,
        }
    }

    /// Common type of two integer operands
    fn arithmetic_type(&mut self, left: TypeId, right: TypeId) -> TypeId {
        let (l, r) = (self.promote(left), self.promote(right));
        match (self.registry.get(l), self.registry.get(r)) {
            (Type::Int { bytes: lb, signed: ls }, Type::Int { bytes: rb, signed: rs }) => {
                if lb > rb {
                    l
                } else if rb > lb {
                    r
                } else {
                    self.registry.int(lb, ls && rs)
                }
            }
            _ => l,
        }
    }

    fn binary_type(&mut self, op: BinaryOp, left: TypeId, right: TypeId, span: Span) -> CompileResult<TypeId> {
        let reg = &self.registry;
        if !reg.is_scalar(left) || !reg.is_scalar(right) {
            return Err(self.invalid_operands(left, right, span));
        }

        if op.is_logical() || op.is_comparison() {
            return Ok(self.registry.c_int());
        }

        let (l_ptr, r_ptr) = (reg.is_pointer(left), reg.is_pointer(right));
        match op {
            BinaryOp::Add if l_ptr && !r_ptr => {
                self.check_pointer_arith(left, span)?;
                Ok(left)
            }
            BinaryOp::Add if r_ptr && !l_ptr => {
                self.check_pointer_arith(right, span)?;
                Ok(right)
            }
            BinaryOp::Sub if l_ptr && !r_ptr => {
                self.check_pointer_arith(left, span)?;
                Ok(left)
            }
            BinaryOp::Sub if l_ptr && r_ptr => {
                self.check_pointer_arith(left, span)?;
                Ok(self.registry.c_long(true))
            }
            _ if l_ptr || r_ptr => Err(self.invalid_operands(left, right, span)),
            BinaryOp::Shl | BinaryOp::Shr => Ok(self.promote(left)),
            _ => Ok(self.arithmetic_type(left, right)),
        }
    }

    fn conditional_type(
        &mut self,
        then_ty: TypeId,
        else_ty: TypeId,
        then_expr: &Expr,
        else_expr: &Expr,
        span: Span,
    ) -> CompileResult<TypeId> {
        let reg = &self.registry;
        if reg.is_integer(then_ty) && reg.is_integer(else_ty) {
            return Ok(self.arithmetic_type(then_ty, else_ty));
        }
        if then_ty == else_ty {
            return Ok(then_ty);
        }
        if reg.is_pointer(then_ty) && else_expr.constant_value() == Some(0) {
            return Ok(then_ty);
        }
        if reg.is_pointer(else_ty) && then_expr.constant_value() == Some(0) {
            return Ok(else_ty);
        }
        if reg.is_pointer(then_ty) && reg.is_pointer(else_ty) {
            return Ok(then_ty);
        }
        Err(CompileError::type_error(
            format!(
                "incompatible operand types ('{}' and '{}')",
                reg.display(then_ty),
                reg.display(else_ty)
            ),
            span,
        ))
    }

    /// Whether a value of type `value` may be stored into `target`
    fn check_assignable(&self, target: TypeId, value: TypeId, expr: &Expr) -> CompileResult<()> {
        let reg = &self.registry;
        let ok = target == value
            || (reg.is_integer(target) && reg.is_integer(value))
            || (reg.is_pointer(target) && reg.is_pointer(value))
            || (reg.is_pointer(target) && reg.is_integer(value) && expr.constant_value() == Some(0));
        if ok {
            return Ok(());
        }

        let message = if reg.is_struct(target) && reg.is_struct(value) {
            format!(
                "assigning to '{}' from incompatible struct type '{}'",
                reg.display(target),
                reg.display(value)
            )
        } else {
            format!(
                "assigning to '{}' from incompatible type '{}'",
                reg.display(target),
                reg.display(value)
            )
        };
        Err(CompileError::type_error(message, expr.span))
    }

    fn check_pointer_arith(&self, pointer: TypeId, span: Span) -> CompileResult<()> {
        match self.registry.pointee(pointer) {
            Some(target) if self.registry.size_of(target) == 0 => Err(CompileError::type_error(
                format!(
                    "arithmetic on a pointer to '{}' with size zero",
                    self.registry.display(target)
                ),
                span,
            )),
            _ => Ok(()),
        }
    }

    fn require_scalar(&self, ty: TypeId, span: Span) -> CompileResult<()> {
        if self.registry.is_scalar(ty) {
            Ok(())
        } else {
            Err(CompileError::type_error(
                format!(
                    "operand of type '{}' where arithmetic or pointer type is required",
                    self.registry.display(ty)
                ),
                span,
            ))
        }
    }

    fn invalid_operands(&self, left: TypeId, right: TypeId, span: Span) -> CompileError {
        CompileError::type_error(
            format!(
                "invalid operands to binary expression ('{}' and '{}')",
                self.registry.display(left),
                self.registry.display(right)
            ),
            span,
        )
    }
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::c::parser::Parser;
    use crate::types::{DataModel, ErrorCode, ResolvedMember};
    use pretty_assertions::assert_eq;

    fn analyze_with(config: LayoutConfig, source: &str) -> (TranslationUnit, SemanticAnalyzer, CompileResult<()>) {
        let mut tu = Parser::new(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::new(config);
        let result = analyzer.analyze(&mut tu);
        (tu, analyzer, result)
    }

    fn analyze(source: &str) -> (TranslationUnit, SemanticAnalyzer, CompileResult<()>) {
        analyze_with(LayoutConfig::default(), source)
    }

    fn error_codes(source: &str) -> Vec<Option<ErrorCode>> {
        let (_, _, result) = analyze(source);
        let err = result.unwrap_err();
        err.flatten().iter().map(|e| e.as_layout().map(LayoutError::code)).collect()
    }

    fn global_value(tu: &TranslationUnit, index: usize) -> i64 {
        match &tu.declarations[index].kind {
            DeclKind::Variable(VarDecl {
                init: Some(Initializer::Expr(Expr { kind: ExprKind::IntLiteral(v), .. })),
                ..
            }) => *v,
            other => panic!("not a folded constant: {:?}", other),
        }
    }

    fn returned_expr(tu: &TranslationUnit) -> &Expr {
        let func = tu.functions().next().unwrap();
        let body = func.body.as_ref().unwrap();
        body.items
            .iter()
            .find_map(|item| match item {
                BlockItem::Statement(Stmt { kind: StmtKind::Return(Some(expr)), .. }) => Some(expr),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_sizeof_padding_policy() {
        let (tu, _, result) = analyze(
            "long a = sizeof(struct {int a;});
             long b = sizeof(struct {int a; int b;});
             long c = sizeof(struct {int a[3];});
             long d = sizeof(struct {char a; char b;});
             long e = sizeof(struct {char a; int b;});
             long f = sizeof(struct {});
             long g = _Alignof(struct {char a; long b;});",
        );
        result.unwrap();
        let values: Vec<i64> = (0..7).map(|i| global_value(&tu, i)).collect();
        assert_eq!(values, vec![4, 8, 12, 2, 8, 0, 8]);
    }

    #[test]
    fn test_sizeof_of_arrays_of_structs() {
        let (tu, _, result) = analyze(
            "struct {int a;} x[4];
             struct {int a[3];} y[2];
             long a = sizeof(x);
             long b = sizeof y;",
        );
        result.unwrap();
        assert_eq!(global_value(&tu, 2), 16);
        assert_eq!(global_value(&tu, 3), 24);
    }

    #[test]
    fn test_member_access_is_annotated() {
        let (tu, analyzer, result) = analyze(
            "struct inner { char c; int d; };
             struct outer { int a; struct inner t; };
             int f(void) { struct outer x; return x.t.d; }",
        );
        result.unwrap();
        let expr = returned_expr(&tu);
        let ExprKind::Member { object, resolved, .. } = &expr.kind else {
            panic!("expected member access");
        };
        assert_eq!(resolved.map(|r| r.offset), Some(4));
        assert_eq!(expr.ty.map(|ty| analyzer.registry().display(ty)), Some("int".to_string()));
        let ExprKind::Member { resolved: outer, .. } = &object.kind else {
            panic!("expected member access");
        };
        assert_eq!(outer.map(|r: ResolvedMember| r.offset), Some(4));
    }

    #[test]
    fn test_arrow_on_pointer_to_struct() {
        let (tu, _, result) = analyze(
            "struct s { char a; long b; };
             long f(struct s *p) { return p->b; }",
        );
        result.unwrap();
        let ExprKind::PtrMember { resolved, .. } = &returned_expr(&tu).kind else {
            panic!("expected pointer member access");
        };
        assert_eq!(resolved.map(|r| r.offset), Some(8));
    }

    #[test]
    fn test_unsized_array_takes_initializer_length() {
        let (tu, analyzer, result) = analyze("int a[] = {1, 2, 3}; char s[] = \"abc\";");
        result.unwrap();
        let sizes: Vec<usize> = tu
            .declarations
            .iter()
            .filter_map(|d| match &d.kind {
                DeclKind::Variable(var) => var.resolved,
                _ => None,
            })
            .map(|ty| analyzer.registry().size_of(ty))
            .collect();
        assert_eq!(sizes, vec![12, 4]);
    }

    #[test]
    fn test_inner_scope_redeclares_tag() {
        let (tu, _, result) = analyze(
            "struct s { int a; };
             long f(void) { struct s { char c; char d; } x; return sizeof(x); }
             long g = sizeof(struct s);",
        );
        result.unwrap();
        assert_eq!(returned_expr(&tu).constant_value(), Some(2));
        assert_eq!(global_value(&tu, 2), 4);
    }

    #[test]
    fn test_layout_error_codes() {
        assert_eq!(
            error_codes("struct s { int a; char a; };"),
            vec![Some(ErrorCode::DuplicateMember)]
        );
        assert_eq!(
            error_codes("struct s { int a; }; int f(void) { struct s x; return x.b; }"),
            vec![Some(ErrorCode::UnknownMember)]
        );
        assert_eq!(
            error_codes("int f(void) { int x; return x.a; }"),
            vec![Some(ErrorCode::NotAStruct)]
        );
        assert_eq!(
            error_codes("int f(int *p) { return p->a; }"),
            vec![Some(ErrorCode::NotAStruct)]
        );
        assert_eq!(
            error_codes("struct s { int a; }; int f(void) { struct s x; return x[0].a; }"),
            vec![Some(ErrorCode::IndexOnNonArray)]
        );
    }

    #[test]
    fn test_type_too_deep() {
        let config = LayoutConfig::default().with_max_type_depth(3);
        let (_, _, result) = analyze_with(config, "int **ok; int ***deep;");
        let err = result.unwrap_err();
        let layout = err.as_layout().unwrap();
        assert_eq!(layout.code(), ErrorCode::TypeTooDeep);

        let (_, _, result) = analyze_with(
            config,
            "struct a { struct { struct { int x; } b; } c; };",
        );
        assert_eq!(result.unwrap_err().as_layout().map(LayoutError::code), Some(ErrorCode::TypeTooDeep));
    }

    #[test]
    fn test_errors_are_collected() {
        let (_, _, result) = analyze(
            "struct s { int a; };
             int f(void) {
                 struct s x;
                 x.nope = 1;
                 undeclared = 2;
                 return x.a;
             }
             int g(void) { break; }",
        );
        let err = result.unwrap_err();
        let messages: Vec<String> = err.flatten().iter().map(|e| e.to_string()).collect();
        assert_eq!(messages.len(), 3, "{:?}", messages);
        assert!(messages[0].contains("no member named 'nope' in 'struct s'"));
        assert!(messages[1].contains("use of undeclared identifier 'undeclared'"));
        assert!(messages[2].contains("'break' statement not in loop"));
    }

    #[test]
    fn test_struct_assignment_requires_same_struct() {
        let (_, _, result) = analyze(
            "struct a { int x; }; struct b { int x; };
             int f(void) { struct a p; struct a q; p = q; return 0; }",
        );
        result.unwrap();

        let (_, _, result) = analyze(
            "struct a { int x; }; struct b { int x; };
             int f(void) { struct a p; struct b q; p = q; return 0; }",
        );
        assert!(result.unwrap_err().to_string().contains("incompatible struct type"));
    }

    #[test]
    fn test_arrow_on_struct_suggests_dot() {
        let (_, _, result) = analyze("struct s { int a; }; int f(void) { struct s x; return x->a; }");
        assert!(result.unwrap_err().to_string().contains("did you mean to use '.'?"));
    }

    #[test]
    fn test_struct_return_is_rejected() {
        let (_, _, result) = analyze("struct s { int a; }; struct s f(void);");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("returning a struct by value is not supported"));
    }

    #[test]
    fn test_pointer_reinterpretation_typechecks() {
        let (_, _, result) = analyze(
            "int f(void) {
                 struct { int a; int b; } x[2];
                 int *p = x;
                 p[3] = 3;
                 return x[1].b;
             }",
        );
        result.unwrap();
    }

    #[test]
    fn test_builtin_assert_arity() {
        let (_, _, result) = analyze("int f(void) { assert(1, 1); return 0; }");
        result.unwrap();
        let (_, _, result) = analyze("int f(void) { return assert(1); }");
        assert!(result.unwrap_err().to_string().contains("too few arguments"));
    }

    #[test]
    fn test_m68k_sizes() {
        let config = LayoutConfig::new(DataModel::M68k);
        let (tu, _, result) = analyze_with(
            config,
            "long a = sizeof(struct { char c; long l; });
             long b = sizeof(int *);",
        );
        result.unwrap();
        assert_eq!(global_value(&tu, 0), 6);
        assert_eq!(global_value(&tu, 1), 4);
    }
}
