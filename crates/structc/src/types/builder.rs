//! Struct layout
//!
//! Members are placed in declaration order. Each member starts at the next
//! offset aligned to its own alignment; the struct's alignment is the largest
//! member alignment and its size is rounded up to that alignment so arrays
//! of the struct keep every element aligned.

use super::data_model::{MAX_OBJECT_SIZE, align_to};
use super::error::LayoutError;
use super::registry::TypeRegistry;
use super::ty::{Member, StructType, Symbol, TypeId};
use crate::common::Span;
use std::collections::HashMap;
use tracing::{debug, trace};

/// One member as written in a struct body, with its type already resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberDecl {
    pub name: String,
    pub ty: TypeId,
    pub span: Span,
}

impl MemberDecl {
    pub fn new(name: impl Into<String>, ty: TypeId, span: Span) -> Self {
        Self { name: name.into(), ty, span }
    }
}

/// Incremental struct layout over a registry
pub struct StructBuilder<'r> {
    registry: &'r mut TypeRegistry,
    name: Option<String>,
    members: Vec<Member>,
    index: HashMap<Symbol, usize>,
    cursor: usize,
    max_align: usize,
    depth: usize,
}

impl<'r> StructBuilder<'r> {
    pub fn new(registry: &'r mut TypeRegistry, name: Option<String>) -> Self {
        Self {
            registry,
            name,
            members: Vec::new(),
            index: HashMap::new(),
            cursor: 0,
            max_align: 1,
            depth: 1,
        }
    }

    /// Place the next member
    pub fn member(&mut self, decl: MemberDecl) -> Result<&mut Self, LayoutError> {
        let symbol = self.registry.intern_name(&decl.name);
        if let Some(&previous) = self.index.get(&symbol) {
            return Err(LayoutError::DuplicateMember {
                name: decl.name,
                span: decl.span,
                previous: self.members[previous].span,
            });
        }

        let size = self.registry.size_of(decl.ty);
        let align = self.registry.align_of(decl.ty);
        let (offset, cursor) = align_to(self.cursor, align)
            .and_then(|offset| Some((offset, offset.checked_add(size)?)))
            .filter(|&(_, end)| end <= MAX_OBJECT_SIZE)
            .ok_or(LayoutError::TypeTooLarge { span: decl.span })?;
        self.cursor = cursor;
        self.max_align = self.max_align.max(align);
        self.depth = self.depth.max(self.registry.depth_of(decl.ty) + 1);

        trace!(member = %decl.name, offset, size, align, "placed member");

        self.index.insert(symbol, self.members.len());
        self.members.push(Member { name: symbol, ty: decl.ty, offset, span: decl.span });
        Ok(self)
    }

    /// Finish the layout and register the struct under a fresh identity
    pub fn finish(self) -> Result<TypeId, LayoutError> {
        let size = align_to(self.cursor, self.max_align)
            .filter(|&size| size <= MAX_OBJECT_SIZE)
            .ok_or(LayoutError::TypeTooLarge { span: Span::default() })?;
        debug!(
            name = self.name.as_deref().unwrap_or("<anonymous>"),
            members = self.members.len(),
            size,
            align = self.max_align,
            "laid out struct"
        );
        let st = StructType {
            name: self.name,
            members: self.members,
            size,
            align: self.max_align,
            index: self.index,
            depth: self.depth,
        };
        self.registry.add_struct(st)
    }
}

impl TypeRegistry {
    /// Lay out a complete member list
    pub fn build_struct(
        &mut self,
        name: Option<String>,
        members: Vec<MemberDecl>,
    ) -> Result<TypeId, LayoutError> {
        let mut builder = StructBuilder::new(self, name);
        for decl in members {
            builder.member(decl)?;
        }
        builder.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataModel, LayoutConfig, Type};
    use pretty_assertions::assert_eq;

    fn decl(name: &str, ty: TypeId) -> MemberDecl {
        MemberDecl::new(name, ty, Span::default())
    }

    fn offsets(reg: &TypeRegistry, ty: TypeId) -> Vec<usize> {
        reg.as_struct(ty)
            .map(|st| st.members.iter().map(|m| m.offset).collect())
            .unwrap_or_default()
    }

    #[test]
    fn test_two_ints() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let st = reg.build_struct(None, vec![decl("a", int), decl("b", int)]).unwrap();
        assert_eq!(offsets(&reg, st), vec![0, 4]);
        assert_eq!(reg.size_of(st), 8);
        assert_eq!(reg.align_of(st), 4);
    }

    #[test]
    fn test_char_int_char_padding() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let st = reg
            .build_struct(None, vec![decl("a", ch), decl("b", int), decl("c", ch)])
            .unwrap();
        assert_eq!(offsets(&reg, st), vec![0, 4, 8]);
        assert_eq!(reg.size_of(st), 12);
    }

    #[test]
    fn test_sizes() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let int3 = reg.array_of(int, 3).unwrap();

        let one = reg.build_struct(None, vec![decl("a", int)]).unwrap();
        let arr = reg.build_struct(None, vec![decl("a", int3)]).unwrap();
        let chars = reg.build_struct(None, vec![decl("a", ch), decl("b", ch)]).unwrap();
        let mixed = reg.build_struct(None, vec![decl("a", ch), decl("b", int)]).unwrap();
        let four = reg.array_of(one, 4).unwrap();
        let two = reg.array_of(arr, 2).unwrap();

        assert_eq!(reg.size_of(one), 4);
        assert_eq!(reg.size_of(arr), 12);
        assert_eq!(reg.size_of(chars), 2);
        assert_eq!(reg.align_of(chars), 1);
        assert_eq!(reg.size_of(mixed), 8);
        assert_eq!(reg.size_of(four), 16);
        assert_eq!(reg.size_of(two), 24);
    }

    #[test]
    fn test_empty_struct() {
        let mut reg = TypeRegistry::default();
        let st = reg.build_struct(Some("e".to_string()), Vec::new()).unwrap();
        assert_eq!(reg.size_of(st), 0);
        assert_eq!(reg.align_of(st), 1);
        assert!(reg.as_struct(st).is_some_and(StructType::is_empty));
    }

    #[test]
    fn test_nested_struct_uses_inner_layout() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let long = reg.c_long(true);
        let inner = reg.build_struct(None, vec![decl("x", ch), decl("y", long)]).unwrap();
        let outer = reg
            .build_struct(None, vec![decl("tag", ch), decl("in", inner), decl("end", ch)])
            .unwrap();
        assert_eq!(reg.size_of(inner), 16);
        assert_eq!(offsets(&reg, outer), vec![0, 8, 24]);
        assert_eq!(reg.size_of(outer), 32);
        assert_eq!(reg.align_of(outer), 8);
    }

    #[test]
    fn test_m68k_packs_to_words() {
        let mut reg = TypeRegistry::new(LayoutConfig::new(DataModel::M68k));
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let st = reg
            .build_struct(None, vec![decl("a", ch), decl("b", int), decl("c", ch)])
            .unwrap();
        assert_eq!(offsets(&reg, st), vec![0, 2, 6]);
        assert_eq!(reg.size_of(st), 8);
    }

    #[test]
    fn test_duplicate_member() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let err = reg
            .build_struct(
                None,
                vec![
                    MemberDecl::new("a", int, Span::new(10, 11)),
                    MemberDecl::new("a", int, Span::new(20, 21)),
                ],
            )
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::DuplicateMember {
                name: "a".to_string(),
                span: Span::new(20, 21),
                previous: Span::new(10, 11),
            }
        );
    }

    #[test]
    fn test_member_past_object_limit_is_too_large() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let huge_chars = reg.array_of(ch, MAX_OBJECT_SIZE).unwrap();
        let huge_ints = reg.array_of(int, 2_305_843_009_213_693_951).unwrap();

        let err = reg
            .build_struct(None, vec![decl("a", huge_chars), decl("b", huge_chars)])
            .unwrap_err();
        assert_eq!(err, LayoutError::TypeTooLarge { span: Span::default() });

        let err = reg
            .build_struct(
                None,
                vec![decl("a", huge_ints), decl("b", huge_ints), decl("c", int), decl("d", ch)],
            )
            .unwrap_err();
        assert!(matches!(err, LayoutError::TypeTooLarge { .. }));
    }

    #[test]
    fn test_tail_padding_past_object_limit_is_too_large() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let fill = reg.array_of(ch, MAX_OBJECT_SIZE - 4).unwrap();

        // Members end exactly at the limit; rounding to 4 would pass it
        let mut builder = StructBuilder::new(&mut reg, None);
        builder.member(decl("a", int)).unwrap();
        builder.member(decl("b", fill)).unwrap();
        let err = builder.finish().unwrap_err();
        assert!(matches!(err, LayoutError::TypeTooLarge { .. }));
    }

    #[test]
    fn test_same_name_in_nested_levels_is_allowed() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let inner = reg.build_struct(None, vec![decl("a", int)]).unwrap();
        let outer = reg.build_struct(None, vec![decl("a", inner)]).unwrap();
        assert_eq!(reg.size_of(outer), 4);
    }

    #[test]
    fn test_struct_nesting_depth_guard() {
        let mut reg = TypeRegistry::new(LayoutConfig::default().with_max_type_depth(4));
        let mut ty = reg.c_int();
        for _ in 0..3 {
            ty = reg.build_struct(None, vec![decl("a", ty)]).unwrap();
        }
        assert_eq!(reg.depth_of(ty), 4);
        let err = reg.build_struct(None, vec![decl("a", ty)]).unwrap_err();
        assert!(matches!(err, LayoutError::TypeTooDeep { limit: 4, .. }));
    }

    #[test]
    fn test_layout_invariants() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let short = reg.int(2, true);
        let int = reg.c_int();
        let long = reg.c_long(true);
        let ptr = reg.pointer_to(ch).unwrap();
        let arr = reg.array_of(short, 3).unwrap();
        let fields = [ch, long, short, arr, int, ch, ptr, ch];

        let decls = fields
            .iter()
            .enumerate()
            .map(|(i, &ty)| decl(&format!("m{}", i), ty))
            .collect();
        let st = reg.build_struct(None, decls).unwrap();
        let size = reg.size_of(st);
        let align = reg.align_of(st);
        assert_eq!(size % align, 0);

        let layout = reg.as_struct(st).unwrap();
        let mut end = 0;
        for member in &layout.members {
            assert!(member.offset >= end, "members overlap");
            assert_eq!(member.offset % reg.align_of(member.ty), 0);
            end = member.offset + reg.size_of(member.ty);
            assert!(end <= size);
        }
        assert!(matches!(reg.get(st), Type::Struct(_)));
    }
}
