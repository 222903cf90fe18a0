//! Modules: the unit the splitter processes.

use crate::ir::Function;

/// A type definition with attached functions (methods).
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    /// Type name.
    pub name: String,
    /// Methods attached to the type. Their receiver is a `SELF` parameter.
    pub attached_functions: Vec<Function>,
}

/// A compilation unit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Module {
    /// Module name.
    pub name: String,
    /// Top-level functions. Helpers produced by splitting are appended here,
    /// including helpers split out of attached functions.
    pub functions: Vec<Function>,
    /// Type definitions.
    pub type_defs: Vec<TypeDef>,
}

impl Module {
    /// Creates an empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            type_defs: Vec::new(),
        }
    }

    /// Looks up a top-level or attached function by name.
    #[must_use]
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions
            .iter()
            .chain(self.type_defs.iter().flat_map(|td| td.attached_functions.iter()))
            .find(|function| function.name == name)
    }

    /// Iterates over every function, top-level first, then attached.
    pub fn all_functions(&self) -> impl Iterator<Item = &Function> {
        self.functions
            .iter()
            .chain(self.type_defs.iter().flat_map(|td| td.attached_functions.iter()))
    }
}
