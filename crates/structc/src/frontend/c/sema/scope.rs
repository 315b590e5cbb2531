//! Symbol table and scope management

use crate::common::Span;
use crate::types::TypeId;
use std::collections::HashMap;

/// A symbol in the symbol table
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Object type, or return type for functions
    pub ty: TypeId,
    pub span: Span,
}

/// Kind of symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolKind {
    Variable { global: bool },
    Parameter,
    Function(FunctionSig),
}

/// Signature of a declared function
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<TypeId>,
    pub variadic: bool,
    pub defined: bool,
    pub builtin: bool,
}

impl FunctionSig {
    /// Same parameter list, ignoring whether either is defined
    pub fn compatible(&self, other: &FunctionSig) -> bool {
        self.params == other.params && self.variadic == other.variadic
    }
}

/// A lexical scope: ordinary identifiers and struct tags live in separate
/// namespaces
#[derive(Debug)]
pub struct Scope {
    symbols: HashMap<String, Symbol>,
    structs: HashMap<String, (TypeId, Span)>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self {
            symbols: HashMap::new(),
            structs: HashMap::new(),
            parent: None,
        }
    }

    pub fn define(&mut self, symbol: Symbol) -> Result<(), String> {
        if self.symbols.contains_key(&symbol.name) {
            return Err(format!("redefinition of '{}'", symbol.name));
        }
        self.symbols.insert(symbol.name.clone(), symbol);
        Ok(())
    }

    /// Insert or overwrite a symbol in this scope
    pub fn replace(&mut self, symbol: Symbol) {
        self.symbols.insert(symbol.name.clone(), symbol);
    }

    pub fn lookup(&self, name: &str) -> Option<&Symbol> {
        match self.symbols.get(name) {
            Some(sym) => Some(sym),
            None => self.parent.as_ref().and_then(|parent| parent.lookup(name)),
        }
    }

    pub fn lookup_local(&self, name: &str) -> Option<&Symbol> {
        self.symbols.get(name)
    }

    /// Bind a struct tag in this scope; inner scopes may shadow it
    pub fn define_struct(&mut self, name: &str, ty: TypeId, span: Span) -> Result<(), String> {
        if self.structs.contains_key(name) {
            return Err(format!("redefinition of 'struct {}'", name));
        }
        self.structs.insert(name.to_string(), (ty, span));
        Ok(())
    }

    pub fn lookup_struct(&self, name: &str) -> Option<TypeId> {
        match self.structs.get(name) {
            Some(&(ty, _)) => Some(ty),
            None => self.parent.as_ref().and_then(|parent| parent.lookup_struct(name)),
        }
    }

    pub fn is_global(&self) -> bool {
        self.parent.is_none()
    }

    /// Take the parent scope, replacing self with the parent
    pub fn pop_to_parent(&mut self) -> bool {
        if let Some(parent) = self.parent.take() {
            *self = *parent;
            true
        } else {
            false
        }
    }

    /// Push a new child scope
    pub fn push_child(&mut self) {
        let old_scope = std::mem::replace(self, Scope::new());
        self.parent = Some(Box::new(old_scope));
    }
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TypeRegistry;

    fn variable(name: &str, ty: TypeId) -> Symbol {
        Symbol {
            name: name.to_string(),
            kind: SymbolKind::Variable { global: false },
            ty,
            span: Span::default(),
        }
    }

    #[test]
    fn test_shadowing_and_pop() {
        let reg = TypeRegistry::default();
        let int = reg.c_int();
        let ch = reg.int(1, true);

        let mut scope = Scope::new();
        scope.define(variable("x", int)).unwrap();
        scope.push_child();
        assert!(!scope.is_global());
        scope.define(variable("x", ch)).unwrap();
        assert_eq!(scope.lookup("x").map(|s| s.ty), Some(ch));
        assert!(scope.pop_to_parent());
        assert_eq!(scope.lookup("x").map(|s| s.ty), Some(int));
        assert!(!scope.pop_to_parent());
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let reg = TypeRegistry::default();
        let int = reg.c_int();
        let mut scope = Scope::new();
        scope.define(variable("x", int)).unwrap();
        assert_eq!(scope.define(variable("x", int)).unwrap_err(), "redefinition of 'x'");
    }

    #[test]
    fn test_struct_tags_are_scoped() {
        let reg = TypeRegistry::default();
        let int = reg.c_int();
        let ch = reg.int(1, true);

        let mut scope = Scope::new();
        scope.define_struct("s", int, Span::default()).unwrap();
        assert!(scope.define_struct("s", ch, Span::default()).is_err());
        scope.push_child();
        scope.define_struct("s", ch, Span::default()).unwrap();
        assert_eq!(scope.lookup_struct("s"), Some(ch));
        scope.pop_to_parent();
        assert_eq!(scope.lookup_struct("s"), Some(int));
        assert_eq!(scope.lookup_struct("t"), None);
    }
}
