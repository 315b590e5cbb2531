//! Sized loads and stores of typed lvalues
//!
//! Width and signedness come from the lvalue's type. Arrays and structs are
//! never loaded whole: reading one yields its address, and copying one is a
//! sequence of scalar moves over its flattened members with padding skipped.

use super::builder::IrBuilder;
use super::inst::{Inst, Value};
use super::lvalue::Lvalue;
use crate::common::{CompileError, CompileResult};
use crate::types::Type;

impl IrBuilder<'_> {
    /// Read the value of an lvalue
    pub(super) fn emit_load(&mut self, lv: &Lvalue) -> Value {
        if matches!(self.registry.get(lv.ty), Type::Array { .. } | Type::Struct(_)) {
            return self.lvalue_address(lv);
        }
        let Some(access) = self.registry.access(lv.ty) else {
            return Value::IntConst(0);
        };

        let dst = self.new_temp();
        self.emit(Inst::Load {
            dst,
            base: lv.base.clone(),
            offset: lv.offset,
            size: access.size,
            signed: access.signed,
        });
        Value::Temp(dst)
    }

    /// Write a scalar value through an lvalue
    pub(super) fn emit_store(&mut self, lv: &Lvalue, value: Value) -> CompileResult<()> {
        let access = self.registry.access(lv.ty).ok_or_else(|| {
            CompileError::codegen(format!(
                "cannot store a scalar into '{}'",
                self.registry.display(lv.ty)
            ))
        })?;
        self.emit(Inst::Store {
            base: lv.base.clone(),
            offset: lv.offset,
            src: value,
            size: access.size,
        });
        Ok(())
    }

    /// Copy an aggregate member by member
    pub(super) fn emit_copy(&mut self, dst: &Lvalue, src: &Lvalue) {
        for mv in self.registry.scalar_moves(dst.ty) {
            let offset = mv.offset as i64;
            let temp = self.new_temp();
            self.emit(Inst::Load {
                dst: temp,
                base: src.base.clone(),
                offset: src.offset + offset,
                size: mv.access.size,
                signed: mv.access.signed,
            });
            self.emit(Inst::Store {
                base: dst.base.clone(),
                offset: dst.offset + offset,
                src: Value::Temp(temp),
                size: mv.access.size,
            });
        }
    }

    /// Zero every scalar of an object
    pub(super) fn emit_zero(&mut self, lv: &Lvalue) {
        for mv in self.registry.scalar_moves(lv.ty) {
            self.emit(Inst::Store {
                base: lv.base.clone(),
                offset: lv.offset + mv.offset as i64,
                src: Value::IntConst(0),
                size: mv.access.size,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::frontend::c::parser::Parser;
    use crate::frontend::c::sema::SemanticAnalyzer;
    use crate::ir::{Inst, IrBuilder};
    use pretty_assertions::assert_eq;

    fn lower(source: &str) -> Vec<Inst> {
        let mut tu = Parser::new(source).unwrap().parse().unwrap();
        let mut analyzer = SemanticAnalyzer::default();
        analyzer.analyze(&mut tu).unwrap();
        let module = IrBuilder::new(analyzer.registry()).build(&tu).unwrap();
        module.functions[0].body.clone()
    }

    fn widths(body: &[Inst]) -> Vec<(usize, bool)> {
        body.iter()
            .filter_map(|inst| match inst {
                Inst::Load { size, signed, .. } => Some((*size, *signed)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_load_width_and_sign_follow_type() {
        let body = lower(
            "long f(void) {
                 struct { unsigned char a; short b; unsigned int c; long d; } x;
                 return x.a + x.b + x.c + x.d;
             }",
        );
        assert_eq!(widths(&body), vec![(1, false), (2, true), (4, false), (8, true)]);
    }

    #[test]
    fn test_copy_skips_padding_and_recurses() {
        let body = lower(
            "void f(void) {
                 struct t { char c; struct { short s; char k[2]; } in; long l; } a;
                 struct t b;
                 b = a;
             }",
        );
        let offsets: Vec<i64> = body
            .iter()
            .filter_map(|inst| match inst {
                Inst::Store { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![0, 2, 4, 5, 8]);
    }

    #[test]
    fn test_struct_parameter_is_copied_into_slot() {
        let body = lower(
            "struct p { int x; char y; };
             int f(struct p v) { return v.x; }",
        );
        assert_eq!(body[0].to_string(), "  t0 = param #0");
        assert_eq!(body[1].to_string(), "  t1 = alloca 8, align 4");
        assert_eq!(body[2].to_string(), "  t2 = load.i32 [t0 + 0]");
        assert_eq!(body[3].to_string(), "  store.32 [t1 + 0], t2");
        assert_eq!(body[4].to_string(), "  t3 = load.i8 [t0 + 4]");
        assert_eq!(body[5].to_string(), "  store.8 [t1 + 4], t3");
    }

    #[test]
    fn test_list_initializer_zero_fills() {
        let body = lower("void f(void) { struct { int a; char b; int c; } x = { 7 }; }");
        let stores: Vec<String> = body
            .iter()
            .filter(|inst| matches!(inst, Inst::Store { .. }))
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            stores,
            vec![
                "  store.32 [t0 + 0], 0".to_string(),
                "  store.8 [t0 + 4], 0".to_string(),
                "  store.32 [t0 + 8], 0".to_string(),
                "  store.32 [t0 + 0], 7".to_string(),
            ]
        );
    }
}
