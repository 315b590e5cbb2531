//! Type registry
//!
//! Arena of interned types for one compilation unit. Non-struct types are
//! deduplicated structurally; struct types are nominal. Size, alignment and
//! nesting depth are computed when a type is interned, so queries never
//! recurse.

use super::data_model::{LayoutConfig, MAX_OBJECT_SIZE};
use super::error::LayoutError;
use super::ty::{Access, ScalarMove, StructId, StructType, Symbol, Type, TypeId};
use crate::common::Span;
use std::collections::HashMap;
use string_interner::DefaultStringInterner;

/// Scalars are interned up front in this order, so their ids are fixed
const SCALARS: [Type; 9] = [
    Type::Void,
    Type::Int { bytes: 1, signed: true },
    Type::Int { bytes: 1, signed: false },
    Type::Int { bytes: 2, signed: true },
    Type::Int { bytes: 2, signed: false },
    Type::Int { bytes: 4, signed: true },
    Type::Int { bytes: 4, signed: false },
    Type::Int { bytes: 8, signed: true },
    Type::Int { bytes: 8, signed: false },
];

#[derive(Debug, Clone, Copy)]
struct TypeInfo {
    ty: Type,
    size: usize,
    align: usize,
    depth: usize,
}

/// Canonical store of every type in a compilation unit
#[derive(Debug)]
pub struct TypeRegistry {
    config: LayoutConfig,
    types: Vec<TypeInfo>,
    lookup: HashMap<Type, TypeId>,
    structs: Vec<StructType>,
    names: DefaultStringInterner,
}

impl TypeRegistry {
    pub fn new(config: LayoutConfig) -> Self {
        let model = config.data_model;
        let types: Vec<TypeInfo> = SCALARS
            .into_iter()
            .map(|ty| match ty {
                Type::Int { bytes, .. } => TypeInfo {
                    ty,
                    size: usize::from(bytes),
                    align: model.int_align(bytes),
                    depth: 1,
                },
                _ => TypeInfo { ty, size: 0, align: 1, depth: 1 },
            })
            .collect();
        let lookup = (0..).zip(&types).map(|(i, info)| (info.ty, TypeId(i))).collect();
        Self {
            config,
            types,
            lookup,
            structs: Vec::new(),
            names: DefaultStringInterner::new(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Number of distinct types interned so far
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    // ==================== Interning ====================

    /// Intern a type, returning the existing identity for an equal type
    pub fn intern(&mut self, ty: Type) -> Result<TypeId, LayoutError> {
        if let Some(&id) = self.lookup.get(&ty) {
            return Ok(id);
        }

        let model = self.config.data_model;
        let info = match ty {
            Type::Void => TypeInfo { ty, size: 0, align: 1, depth: 1 },
            Type::Int { bytes, .. } => TypeInfo {
                ty,
                size: bytes as usize,
                align: model.int_align(bytes),
                depth: 1,
            },
            Type::Pointer(pointee) => TypeInfo {
                ty,
                size: model.pointer_size(),
                align: model.pointer_align(),
                depth: self.info(pointee).depth + 1,
            },
            Type::Array { element, length } => {
                let elem = self.info(element);
                let size = elem
                    .size
                    .checked_mul(length)
                    .filter(|&size| size <= MAX_OBJECT_SIZE)
                    .ok_or(LayoutError::TypeTooLarge { span: Span::default() })?;
                TypeInfo { ty, size, align: elem.align, depth: elem.depth + 1 }
            }
            Type::Struct(id) => {
                let st = &self.structs[id.index()];
                TypeInfo { ty, size: st.size, align: st.align, depth: st.depth }
            }
        };

        self.check_depth(info.depth)?;
        self.insert(info)
    }

    fn insert(&mut self, info: TypeInfo) -> Result<TypeId, LayoutError> {
        let id = u32::try_from(self.types.len())
            .map(TypeId)
            .map_err(|_| LayoutError::TypeTooLarge { span: Span::default() })?;
        self.types.push(info);
        self.lookup.insert(info.ty, id);
        Ok(id)
    }

    fn check_depth(&self, depth: usize) -> Result<(), LayoutError> {
        if depth > self.config.max_type_depth {
            return Err(LayoutError::TypeTooDeep {
                limit: self.config.max_type_depth,
                span: Span::default(),
            });
        }
        Ok(())
    }

    pub fn void(&self) -> TypeId {
        TypeId(0)
    }

    /// Integer of `bytes` width (1, 2, 4 or 8)
    pub fn int(&self, bytes: u8, signed: bool) -> TypeId {
        debug_assert!(matches!(bytes, 1 | 2 | 4 | 8));
        TypeId(1 + 2 * bytes.trailing_zeros() + u32::from(!signed))
    }

    /// The C `int` type
    pub fn c_int(&self) -> TypeId {
        self.int(4, true)
    }

    /// The C `long` type (width depends on the data model)
    pub fn c_long(&self, signed: bool) -> TypeId {
        let bytes = self.config.data_model.long_size();
        self.int(bytes, signed)
    }

    pub fn pointer_to(&mut self, pointee: TypeId) -> Result<TypeId, LayoutError> {
        self.intern(Type::Pointer(pointee))
    }

    pub fn array_of(&mut self, element: TypeId, length: usize) -> Result<TypeId, LayoutError> {
        self.intern(Type::Array { element, length })
    }

    /// Register a laid-out struct under a fresh identity
    pub(super) fn add_struct(&mut self, st: StructType) -> Result<TypeId, LayoutError> {
        self.check_depth(st.depth)?;
        let id = u32::try_from(self.structs.len())
            .map(StructId)
            .map_err(|_| LayoutError::TypeTooLarge { span: Span::default() })?;
        let info = TypeInfo {
            ty: Type::Struct(id),
            size: st.size,
            align: st.align,
            depth: st.depth,
        };
        self.structs.push(st);
        self.insert(info)
    }

    // ==================== Member names ====================

    pub fn intern_name(&mut self, name: &str) -> Symbol {
        self.names.get_or_intern(name)
    }

    /// Symbol for `name` if it was ever interned
    pub fn lookup_name(&self, name: &str) -> Option<Symbol> {
        self.names.get(name)
    }

    pub fn name(&self, symbol: Symbol) -> &str {
        self.names.resolve(symbol).unwrap_or("<unnamed>")
    }

    // ==================== Queries ====================

    fn info(&self, id: TypeId) -> &TypeInfo {
        &self.types[id.index()]
    }

    pub fn get(&self, id: TypeId) -> Type {
        self.info(id).ty
    }

    pub fn size_of(&self, id: TypeId) -> usize {
        self.info(id).size
    }

    pub fn align_of(&self, id: TypeId) -> usize {
        self.info(id).align
    }

    /// Nesting depth (scalars are 1)
    pub fn depth_of(&self, id: TypeId) -> usize {
        self.info(id).depth
    }

    pub fn struct_type(&self, id: StructId) -> &StructType {
        &self.structs[id.index()]
    }

    /// The struct behind `id`, if it is a struct type
    pub fn as_struct(&self, id: TypeId) -> Option<&StructType> {
        match self.get(id) {
            Type::Struct(sid) => Some(self.struct_type(sid)),
            _ => None,
        }
    }

    pub fn structs(&self) -> impl Iterator<Item = (StructId, &StructType)> {
        (0..).zip(&self.structs).map(|(i, st)| (StructId(i), st))
    }

    pub fn is_void(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Void)
    }

    pub fn is_integer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Int { .. })
    }

    pub fn is_signed(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Int { signed: true, .. })
    }

    pub fn is_pointer(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Pointer(_))
    }

    pub fn is_array(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Array { .. })
    }

    pub fn is_struct(&self, id: TypeId) -> bool {
        matches!(self.get(id), Type::Struct(_))
    }

    /// Integers and pointers: values that fit a single load/store
    pub fn is_scalar(&self, id: TypeId) -> bool {
        self.is_integer(id) || self.is_pointer(id)
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer(inner) => Some(inner),
            _ => None,
        }
    }

    /// Element type of an array, or pointee of a pointer
    pub fn element(&self, id: TypeId) -> Option<TypeId> {
        match self.get(id) {
            Type::Pointer(inner) => Some(inner),
            Type::Array { element, .. } => Some(element),
            _ => None,
        }
    }

    /// Load/store width for scalar types
    pub fn access(&self, id: TypeId) -> Option<Access> {
        match self.get(id) {
            Type::Int { bytes, signed } => Some(Access { size: bytes as usize, signed }),
            Type::Pointer(_) => Some(Access {
                size: self.config.data_model.pointer_size(),
                signed: false,
            }),
            Type::Void | Type::Array { .. } | Type::Struct(_) => None,
        }
    }

    /// Flatten a type into the scalar moves that copy it, in address order.
    /// Padding is skipped.
    pub fn scalar_moves(&self, id: TypeId) -> Vec<ScalarMove> {
        let mut moves = Vec::new();
        self.collect_moves(id, 0, &mut moves);
        moves
    }

    fn collect_moves(&self, id: TypeId, base: usize, out: &mut Vec<ScalarMove>) {
        match self.get(id) {
            Type::Void => {}
            Type::Int { .. } | Type::Pointer(_) => {
                if let Some(access) = self.access(id) {
                    out.push(ScalarMove { offset: base, access });
                }
            }
            Type::Array { element, length } => {
                let stride = self.size_of(element);
                for i in 0..length {
                    self.collect_moves(element, base + i * stride, out);
                }
            }
            Type::Struct(sid) => {
                for member in &self.struct_type(sid).members {
                    self.collect_moves(member.ty, base + member.offset, out);
                }
            }
        }
    }

    // ==================== Rendering ====================

    /// C-like spelling of a type, for diagnostics
    pub fn display(&self, id: TypeId) -> String {
        match self.get(id) {
            Type::Void => "void".to_string(),
            Type::Int { bytes, signed } => {
                let base = match bytes {
                    1 => "char",
                    2 => "short",
                    4 => "int",
                    _ if self.config.data_model.long_size() == 8 => "long",
                    _ => "long long",
                };
                if signed {
                    base.to_string()
                } else {
                    format!("unsigned {}", base)
                }
            }
            Type::Pointer(inner) => format!("{}*", self.display(inner)),
            Type::Array { element, length } => format!("{}[{}]", self.display(element), length),
            Type::Struct(sid) => match &self.struct_type(sid).name {
                Some(name) => format!("struct {}", name),
                None => "struct <anonymous>".to_string(),
            },
        }
    }

    /// Layout table of one struct
    pub fn describe_struct(&self, id: StructId) -> String {
        let st = self.struct_type(id);
        let title = match &st.name {
            Some(name) => format!("struct {}", name),
            None => format!("struct <anonymous #{}>", id.index()),
        };
        let mut out = format!("{}: size {}, align {}\n", title, st.size, st.align);
        for member in &st.members {
            out.push_str(&format!(
                "  {:>6}  {:<12} {} (size {})\n",
                member.offset,
                self.name(member.name),
                self.display(member.ty),
                self.size_of(member.ty),
            ));
        }
        out
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new(LayoutConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DataModel, MemberDecl};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_scalars_are_deduplicated() {
        let reg = TypeRegistry::default();
        let a = reg.c_int();
        let b = reg.int(4, true);
        let c = reg.int(4, false);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_scalar_ids_match_interning() {
        let mut reg = TypeRegistry::default();
        assert_eq!(reg.len(), 9);
        assert_eq!(reg.intern(Type::Void).unwrap(), reg.void());
        for bytes in [1, 2, 4, 8] {
            for signed in [true, false] {
                let id = reg.intern(Type::Int { bytes, signed }).unwrap();
                assert_eq!(id, reg.int(bytes, signed));
                assert_eq!(reg.size_of(id), usize::from(bytes));
            }
        }
        assert_eq!(reg.len(), 9);
        let ptr = reg.pointer_to(reg.c_int()).unwrap();
        assert_eq!(ptr.index(), 9);
    }

    #[test]
    fn test_pointers_and_arrays_are_structural() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let p1 = reg.pointer_to(int).unwrap();
        let p2 = reg.pointer_to(int).unwrap();
        let a1 = reg.array_of(int, 3).unwrap();
        let a2 = reg.array_of(int, 3).unwrap();
        let a3 = reg.array_of(int, 4).unwrap();
        assert_eq!(p1, p2);
        assert_eq!(a1, a2);
        assert_ne!(a1, a3);
        assert_eq!(reg.size_of(a1), 12);
        assert_eq!(reg.align_of(a1), 4);
        assert_eq!(reg.size_of(p1), 8);
    }

    #[test]
    fn test_identical_anonymous_structs_are_distinct() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let first = reg
            .build_struct(None, vec![MemberDecl::new("a", int, Span::default())])
            .unwrap();
        let second = reg
            .build_struct(None, vec![MemberDecl::new("a", int, Span::default())])
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(reg.size_of(first), reg.size_of(second));
    }

    #[test]
    fn test_m68k_data_model() {
        let mut reg = TypeRegistry::new(LayoutConfig::new(DataModel::M68k));
        let int = reg.c_int();
        let long = reg.c_long(true);
        let ptr = reg.pointer_to(int).unwrap();
        assert_eq!((reg.size_of(int), reg.align_of(int)), (4, 2));
        assert_eq!(reg.size_of(long), 4);
        assert_eq!((reg.size_of(ptr), reg.align_of(ptr)), (4, 2));
    }

    #[test]
    fn test_depth_guard_on_pointers() {
        let mut reg = TypeRegistry::new(LayoutConfig::default().with_max_type_depth(3));
        let int = reg.c_int();
        let p1 = reg.pointer_to(int).unwrap();
        let p2 = reg.pointer_to(p1).unwrap();
        let err = reg.pointer_to(p2).unwrap_err();
        assert_eq!(err, LayoutError::TypeTooDeep { limit: 3, span: Span::default() });
    }

    #[test]
    fn test_array_size_overflow() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let err = reg.array_of(int, usize::MAX / 2).unwrap_err();
        assert!(matches!(err, LayoutError::TypeTooLarge { .. }));
    }

    #[test]
    fn test_scalar_moves_skip_padding() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let arr = reg.array_of(ch, 2).unwrap();
        let st = reg
            .build_struct(
                None,
                vec![
                    MemberDecl::new("a", ch, Span::default()),
                    MemberDecl::new("b", int, Span::default()),
                    MemberDecl::new("c", arr, Span::default()),
                ],
            )
            .unwrap();

        let offsets: Vec<(usize, usize)> = reg
            .scalar_moves(st)
            .iter()
            .map(|m| (m.offset, m.access.size))
            .collect();
        assert_eq!(offsets, vec![(0, 1), (4, 4), (8, 1), (9, 1)]);
    }

    #[test]
    fn test_display() {
        let mut reg = TypeRegistry::default();
        let int = reg.c_int();
        let uch = reg.int(1, false);
        let ptr = reg.pointer_to(uch).unwrap();
        let arr = reg.array_of(int, 3).unwrap();
        let named = reg
            .build_struct(Some("point".to_string()), vec![MemberDecl::new("x", int, Span::default())])
            .unwrap();
        assert_eq!(reg.display(ptr), "unsigned char*");
        assert_eq!(reg.display(arr), "int[3]");
        assert_eq!(reg.display(named), "struct point");
    }

    #[test]
    fn test_describe_struct() {
        let mut reg = TypeRegistry::default();
        let ch = reg.int(1, true);
        let int = reg.c_int();
        let st = reg
            .build_struct(
                Some("s".to_string()),
                vec![
                    MemberDecl::new("a", ch, Span::default()),
                    MemberDecl::new("b", int, Span::default()),
                ],
            )
            .unwrap();
        let sid = match reg.get(st) {
            Type::Struct(sid) => sid,
            other => panic!("expected struct, got {:?}", other),
        };
        let text = reg.describe_struct(sid);
        assert!(text.starts_with("struct s: size 8, align 4\n"));
        assert!(text.contains("4  b            int (size 4)"));
    }
}
