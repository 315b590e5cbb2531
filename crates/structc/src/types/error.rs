//! Layout and member-resolution errors

use crate::common::Span;
use thiserror::Error;

/// Stable diagnostic codes for layout errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    DuplicateMember,
    UnknownMember,
    NotAStruct,
    IndexOnNonArray,
    TypeTooDeep,
    TypeTooLarge,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::DuplicateMember => "E0101",
            ErrorCode::UnknownMember => "E0102",
            ErrorCode::NotAStruct => "E0103",
            ErrorCode::IndexOnNonArray => "E0104",
            ErrorCode::TypeTooDeep => "E0105",
            ErrorCode::TypeTooLarge => "E0106",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structural errors found while laying out types or resolving accesses.
///
/// Errors raised inside the registry carry a default span; the semantic
/// analyzer attaches the span of the offending expression with [`LayoutError::at`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("duplicate member '{name}'")]
    DuplicateMember { name: String, span: Span, previous: Span },

    #[error("no member named '{member}' in '{ty}'")]
    UnknownMember { member: String, ty: String, span: Span },

    #[error("member reference base type '{ty}' is not a struct")]
    NotAStruct { ty: String, span: Span },

    #[error("subscripted value of type '{ty}' is not an array or pointer")]
    IndexOnNonArray { ty: String, span: Span },

    #[error("type nesting exceeds the limit of {limit} levels")]
    TypeTooDeep { limit: usize, span: Span },

    #[error("type size overflows the address space")]
    TypeTooLarge { span: Span },
}

impl LayoutError {
    pub fn code(&self) -> ErrorCode {
        match self {
            LayoutError::DuplicateMember { .. } => ErrorCode::DuplicateMember,
            LayoutError::UnknownMember { .. } => ErrorCode::UnknownMember,
            LayoutError::NotAStruct { .. } => ErrorCode::NotAStruct,
            LayoutError::IndexOnNonArray { .. } => ErrorCode::IndexOnNonArray,
            LayoutError::TypeTooDeep { .. } => ErrorCode::TypeTooDeep,
            LayoutError::TypeTooLarge { .. } => ErrorCode::TypeTooLarge,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            LayoutError::DuplicateMember { span, .. }
            | LayoutError::UnknownMember { span, .. }
            | LayoutError::NotAStruct { span, .. }
            | LayoutError::IndexOnNonArray { span, .. }
            | LayoutError::TypeTooDeep { span, .. }
            | LayoutError::TypeTooLarge { span } => *span,
        }
    }

    /// Attach a source location unless one is already recorded
    pub fn at(mut self, location: Span) -> Self {
        let span = match &mut self {
            LayoutError::DuplicateMember { span, .. }
            | LayoutError::UnknownMember { span, .. }
            | LayoutError::NotAStruct { span, .. }
            | LayoutError::IndexOnNonArray { span, .. }
            | LayoutError::TypeTooDeep { span, .. }
            | LayoutError::TypeTooLarge { span } => span,
        };
        if *span == Span::default() {
            *span = location;
        }
        self
    }
}
