//! The intermediate representation the splitter rewrites.
//!
//! # Architecture
//!
//! ```text
//! Module
//!  ├─ functions: Vec<Function>
//!  └─ type_defs: Vec<TypeDef>
//!                 └─ attached_functions: Vec<Function>
//!
//! Function
//!  ├─ variables: Vec<Variable>      VarId = index into this table
//!  ├─ params / return_var           VarIds
//!  ├─ blocks: Vec<BasicBlock>       layout order, entry first
//!  │    ├─ id: BlockId              join key for jumps and trap ranges
//!  │    ├─ instructions: Vec<Instruction>
//!  │    └─ terminator: Terminator   goto | branch | call | return | panic
//!  └─ error_table: Vec<ErrorEntry>  (trap, end, error, target)
//! ```
//!
//! Operand identifiers are local to a function. Code that moves instructions
//! between functions remaps them; code that moves blocks rewrites block
//! numbers through a rewrite table.

mod block;
mod builder;
mod function;
mod instruction;
mod module;
mod terminator;
mod types;
mod variable;
mod verify;

pub use block::{BasicBlock, BlockId, BlockIdAllocator};
pub use builder::FunctionBuilder;
pub use function::{ErrorEntry, Function, FunctionOrigin, SPLIT_FUNCTION_PREFIX};
pub use instruction::{
    BinaryOp, ConstructionKind, EntryKind, Instruction, ListEntry, MappingEntry, NativeHelper,
    UnaryOp,
};
pub use module::{Module, TypeDef};
pub use terminator::Terminator;
pub use types::{ConstValue, IrType};
pub use variable::{VarFlags, VarId, VarKind, Variable};
pub use verify::{verify_function, verify_module};
