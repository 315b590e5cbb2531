//! Target data models
//!
//! Scalar sizes and alignments are the only target-specific inputs to
//! struct layout. Everything composite is derived from these.

/// Target data model: sizes and alignments of the C scalar types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataModel {
    /// 64-bit hosts: 4-byte int, 8-byte long and pointers, natural alignment
    #[default]
    Lp64,
    /// Motorola 68000: 4-byte int/long/pointer, everything wider than a
    /// byte aligned to a word boundary
    M68k,
}

impl DataModel {
    pub fn name(&self) -> &'static str {
        match self {
            DataModel::Lp64 => "lp64",
            DataModel::M68k => "m68k",
        }
    }

    /// Size of `long` in bytes
    pub fn long_size(&self) -> u8 {
        match self {
            DataModel::Lp64 => 8,
            DataModel::M68k => 4,
        }
    }

    /// Size of a data pointer in bytes
    pub fn pointer_size(&self) -> usize {
        match self {
            DataModel::Lp64 => 8,
            DataModel::M68k => 4,
        }
    }

    pub fn pointer_align(&self) -> usize {
        match self {
            DataModel::Lp64 => 8,
            DataModel::M68k => 2,
        }
    }

    /// Alignment of an integer of `bytes` width
    pub fn int_align(&self, bytes: u8) -> usize {
        match self {
            DataModel::Lp64 => bytes as usize,
            DataModel::M68k if bytes == 1 => 1,
            DataModel::M68k => 2,
        }
    }
}

/// Default bound on type nesting (arrays, pointers and structs)
pub const DEFAULT_MAX_TYPE_DEPTH: usize = 64;

/// Largest object size; every byte offset must fit in an `isize`
pub const MAX_OBJECT_SIZE: usize = isize::MAX as usize;

/// Layout configuration for one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutConfig {
    pub data_model: DataModel,
    /// Deepest type nesting accepted before reporting `TypeTooDeep`
    pub max_type_depth: usize,
}

impl LayoutConfig {
    pub fn new(data_model: DataModel) -> Self {
        Self {
            data_model,
            max_type_depth: DEFAULT_MAX_TYPE_DEPTH,
        }
    }

    pub fn with_max_type_depth(mut self, depth: usize) -> Self {
        // Scalars alone have depth 1
        self.max_type_depth = depth.max(1);
        self
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self::new(DataModel::default())
    }
}

/// Round `offset` up to the next multiple of `align`, or `None` on overflow
pub fn align_to(offset: usize, align: usize) -> Option<usize> {
    debug_assert!(align.is_power_of_two());
    offset.checked_add(align - 1).map(|end| end & !(align - 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_align_to() {
        assert_eq!(align_to(0, 4), Some(0));
        assert_eq!(align_to(1, 4), Some(4));
        assert_eq!(align_to(4, 4), Some(4));
        assert_eq!(align_to(5, 2), Some(6));
        assert_eq!(align_to(7, 1), Some(7));
        assert_eq!(align_to(usize::MAX - 1, 4), None);
    }

    #[test]
    fn test_m68k_aligns_wide_scalars_to_words() {
        let m = DataModel::M68k;
        assert_eq!(m.int_align(1), 1);
        assert_eq!(m.int_align(4), 2);
        assert_eq!(m.int_align(8), 2);
        assert_eq!(m.pointer_align(), 2);
        assert_eq!(DataModel::Lp64.int_align(8), 8);
    }

    #[test]
    fn test_max_depth_is_at_least_one() {
        let config = LayoutConfig::default().with_max_type_depth(0);
        assert_eq!(config.max_type_depth, 1);
    }
}
