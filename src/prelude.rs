//! # irsplit Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the irsplit library. Import this module to get quick access to the essential
//! types for building IR and splitting it.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all irsplit operations
pub use crate::Error;

/// The result type used throughout irsplit
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// One-call splitting of a module
pub use crate::split_module;

/// The splitting pass, its configuration and per-run state
pub use crate::compiler::{LargeFunctionSplitter, ModulePass, SplitConfig, SplitContext, SplitReport};

/// Change tracking and diagnostics
pub use crate::compiler::{EventKind, EventLog};

// ================================================================================================
// Intermediate Representation
// ================================================================================================

/// Modules, functions and blocks
pub use crate::ir::{
    BasicBlock, BlockId, ErrorEntry, Function, FunctionBuilder, FunctionOrigin, Module, TypeDef,
};

/// Instructions and terminators
pub use crate::ir::{
    BinaryOp, EntryKind, Instruction, ListEntry, MappingEntry, NativeHelper, Terminator, UnaryOp,
};

/// Operands and types
pub use crate::ir::{ConstValue, IrType, VarFlags, VarId, VarKind, Variable};

/// Structural verification
pub use crate::ir::{verify_function, verify_module};
