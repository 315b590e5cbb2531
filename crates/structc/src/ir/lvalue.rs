//! Lvalue evaluation
//!
//! An access path such as `x[i].a.b` or `p->a` becomes a base address plus a
//! cumulative byte offset. Member offsets and constant subscripts fold into
//! the offset; only a variable subscript or a pointer value changes the base.
//! Nothing is loaded until the final scalar is read.

use super::builder::IrBuilder;
use super::inst::{BinOp, Inst, Value};
use crate::common::{CompileError, CompileResult};
use crate::frontend::c::ast::{Expr, ExprKind};
use crate::types::{ResolvedMember, TypeId};

/// A typed reference into storage owned by some variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lvalue {
    pub base: Value,
    pub offset: i64,
    pub ty: TypeId,
}

impl Lvalue {
    pub fn new(base: Value, ty: TypeId) -> Self {
        Self { base, offset: 0, ty }
    }

    /// The object `offset` bytes further in, of type `ty`
    pub fn at(&self, offset: i64, ty: TypeId) -> Self {
        Self {
            base: self.base.clone(),
            offset: self.offset + offset,
            ty,
        }
    }

    pub fn member(&self, member: ResolvedMember) -> Self {
        self.at(member.offset as i64, member.ty)
    }
}

impl IrBuilder<'_> {
    /// Base address and offset of an access expression
    pub(super) fn build_lvalue(&mut self, expr: &Expr) -> CompileResult<Lvalue> {
        let ty = self.type_of(expr)?;
        match &expr.kind {
            ExprKind::Identifier(name) => Ok(Lvalue::new(self.variable_address(name), ty)),

            ExprKind::Member { object, resolved, .. } => {
                let member = resolved.ok_or_else(|| CompileError::codegen("unresolved member access"))?;
                let object = self.build_place(object)?;
                Ok(object.member(member))
            }

            ExprKind::PtrMember { pointer, resolved, .. } => {
                let member = resolved.ok_or_else(|| CompileError::codegen("unresolved member access"))?;
                let base = self.build_expr(pointer)?;
                Ok(Lvalue::new(base, member.ty).at(member.offset as i64, member.ty))
            }

            ExprKind::Deref(pointer) => {
                let base = self.build_expr(pointer)?;
                Ok(Lvalue::new(base, ty))
            }

            ExprKind::Index { array, index } => {
                let stride = self.registry.size_of(ty) as i64;
                let array_ty = self.type_of(array)?;
                let element = if self.registry.is_array(array_ty) {
                    self.build_place(array)?.at(0, ty)
                } else {
                    Lvalue::new(self.build_expr(array)?, ty)
                };

                if let Some(i) = index.constant_value() {
                    return Ok(element.at(i.wrapping_mul(stride), ty));
                }

                let index = self.build_expr(index)?;
                let scaled = self.new_temp();
                self.emit(Inst::Binary {
                    dst: scaled,
                    op: BinOp::Mul,
                    left: index,
                    right: Value::IntConst(stride),
                });
                let base = self.new_temp();
                self.emit(Inst::Binary {
                    dst: base,
                    op: BinOp::Add,
                    left: element.base,
                    right: Value::Temp(scaled),
                });
                Ok(Lvalue {
                    base: Value::Temp(base),
                    offset: element.offset,
                    ty,
                })
            }

            _ => Err(CompileError::codegen(format!(
                "expression at {:?} is not an lvalue",
                expr.span
            ))),
        }
    }

    /// Storage of a struct or array operand. Lvalue expressions keep their
    /// path; any other aggregate expression evaluates to its address.
    fn build_place(&mut self, expr: &Expr) -> CompileResult<Lvalue> {
        match &expr.kind {
            ExprKind::Identifier(_)
            | ExprKind::Member { .. }
            | ExprKind::PtrMember { .. }
            | ExprKind::Deref(_)
            | ExprKind::Index { .. } => self.build_lvalue(expr),
            _ => {
                let ty = self.type_of(expr)?;
                let base = self.build_expr(expr)?;
                Ok(Lvalue::new(base, ty))
            }
        }
    }

    /// Materialize `base + offset`
    pub(super) fn lvalue_address(&mut self, lv: &Lvalue) -> Value {
        match (&lv.base, lv.offset) {
            (base, 0) => base.clone(),
            (Value::IntConst(n), offset) => Value::IntConst(n.wrapping_add(offset)),
            (base, offset) => {
                let dst = self.new_temp();
                self.emit(Inst::Binary {
                    dst,
                    op: BinOp::Add,
                    left: base.clone(),
                    right: Value::IntConst(offset),
                });
                Value::Temp(dst)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::c::parser::Parser;
    use crate::frontend::c::sema::SemanticAnalyzer;
    use crate::ir::IrModule;
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> IrModule {
        let mut tu = Parser::new(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::default();
        analyzer.analyze(&mut tu).unwrap();
        IrBuilder::new(analyzer.registry()).build(&tu).unwrap()
    }

    fn lines(module: &IrModule) -> Vec<String> {
        module.functions[0].body.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_nested_member_offsets_compose() {
        let module = lower(
            "int f(void) {
                 struct { int pad; struct { char c; struct { int b; } a; } in; } x;
                 return x.in.a.b;
             }",
        );
        assert_eq!(lines(&module)[1], "  t1 = load.i32 [t0 + 8]");
    }

    #[test]
    fn test_arrow_uses_pointer_value_as_base() {
        let module = lower(
            "struct s { long a; int b; };
             int f(struct s *p) { return p->b; }",
        );
        let body = lines(&module);
        // t0 param, t1 slot, t2 value of p
        assert_eq!(body[2], "  store.64 [t1 + 0], t0");
        assert_eq!(body[3], "  t2 = load.u64 [t1 + 0]");
        assert_eq!(body[4], "  t3 = load.i32 [t2 + 8]");
    }

    #[test]
    fn test_address_of_member() {
        let module = lower(
            "long f(void) {
                 struct { int a[3]; int b[5]; } x;
                 int *p = &x.b;
                 return p - &x.a;
             }",
        );
        let body = lines(&module);
        assert!(body.contains(&"  t2 = t0 + 12".to_string()), "{:#?}", body);
    }

    #[test]
    fn test_lvalue_at_accumulates() {
        let mut registry = crate::types::TypeRegistry::default();
        let int = registry.c_int();
        let ch = registry.int(1, true);
        let lv = Lvalue::new(Value::Temp(crate::ir::Temp(0)), int).at(8, int).at(3, ch);
        assert_eq!(lv.offset, 11);
        assert_eq!(lv.ty, ch);
    }
}
