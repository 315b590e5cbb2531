//! Member resolution
//!
//! Looks up members by name through the struct's hash index and composes
//! offsets for dotted paths. Nested structs are stored inline, so a path
//! never dereferences between levels.

use super::error::LayoutError;
use super::registry::TypeRegistry;
use super::ty::{Type, TypeId};
use crate::common::Span;

/// Type and byte offset of a resolved member
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMember {
    pub ty: TypeId,
    pub offset: usize,
}

impl TypeRegistry {
    /// Resolve `name` inside the struct type `ty`
    pub fn resolve_member(&self, ty: TypeId, name: &str) -> Result<ResolvedMember, LayoutError> {
        let Type::Struct(sid) = self.get(ty) else {
            return Err(LayoutError::NotAStruct { ty: self.display(ty), span: Span::default() });
        };

        self.lookup_name(name)
            .and_then(|symbol| self.struct_type(sid).member(symbol))
            .map(|member| ResolvedMember { ty: member.ty, offset: member.offset })
            .ok_or_else(|| LayoutError::UnknownMember {
                member: name.to_string(),
                ty: self.display(ty),
                span: Span::default(),
            })
    }

    /// Resolve a dotted path such as `a.b.c`, summing member offsets
    pub fn resolve_path(&self, ty: TypeId, path: &[&str]) -> Result<ResolvedMember, LayoutError> {
        let mut resolved = ResolvedMember { ty, offset: 0 };
        for segment in path {
            let member = self.resolve_member(resolved.ty, segment)?;
            resolved = ResolvedMember {
                ty: member.ty,
                offset: resolved.offset + member.offset,
            };
        }
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemberDecl;
    use pretty_assertions::assert_eq;

    fn decl(name: &str, ty: TypeId) -> MemberDecl {
        MemberDecl::new(name, ty, Span::default())
    }

    #[test]
    fn test_resolve_member() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let st = reg
            .build_struct(None, vec![decl("a", ch), decl("b", int), decl("c", ch)])
            .unwrap();
        assert_eq!(reg.resolve_member(st, "b").unwrap(), ResolvedMember { ty: int, offset: 4 });
        assert_eq!(reg.resolve_member(st, "c").unwrap(), ResolvedMember { ty: ch, offset: 8 });
    }

    #[test]
    fn test_resolve_nested_path() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let inner = reg.build_struct(None, vec![decl("a", int), decl("b", int)]).unwrap();
        let outer = reg.build_struct(None, vec![decl("pad", int), decl("a", inner)]).unwrap();

        let resolved = reg.resolve_path(outer, &["a", "b"]).unwrap();
        assert_eq!(resolved, ResolvedMember { ty: int, offset: 8 });

        let whole = reg.resolve_path(outer, &[]).unwrap();
        assert_eq!(whole, ResolvedMember { ty: outer, offset: 0 });
    }

    #[test]
    fn test_unknown_member() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let st = reg.build_struct(Some("s".to_string()), vec![decl("a", int)]).unwrap();
        let err = reg.resolve_member(st, "z").unwrap_err();
        assert_eq!(
            err,
            LayoutError::UnknownMember {
                member: "z".to_string(),
                ty: "struct s".to_string(),
                span: Span::default(),
            }
        );
    }

    #[test]
    fn test_name_known_elsewhere_is_still_unknown() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let first = reg.build_struct(None, vec![decl("a", int)]).unwrap();
        reg.build_struct(None, vec![decl("b", int)]).unwrap();
        assert!(matches!(
            reg.resolve_member(first, "b"),
            Err(LayoutError::UnknownMember { .. })
        ));
    }

    #[test]
    fn test_not_a_struct() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let err = reg.resolve_member(int, "a").unwrap_err();
        assert_eq!(err, LayoutError::NotAStruct { ty: "int".to_string(), span: Span::default() });

        let inner = reg.build_struct(None, vec![decl("a", int)]).unwrap();
        let err = reg.resolve_path(inner, &["a", "b"]).unwrap_err().at(Span::new(3, 5));
        assert_eq!(err.span(), Span::new(3, 5));
    }
}
