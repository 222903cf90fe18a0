//! Variable declarations and operand identifiers.
//!
//! Every operand in the IR is a [`VarId`]: an index into the owning
//! [`crate::ir::Function`]'s variable table. Identifiers are only meaningful
//! within one function; moving instructions into a helper function requires
//! remapping them into the helper's own table.
//!
//! # Variable kinds
//!
//! | Kind        | Passed to a helper?   | Removed when unused? |
//! |-------------|-----------------------|----------------------|
//! | `LOCAL`     | yes, as an `ARG`      | no                   |
//! | `TEMP`      | yes, if defined outside the region | yes     |
//! | `SYNTHETIC` | yes, if defined outside the region | yes     |
//! | `ARG`       | yes                   | no                   |
//! | `SELF`      | yes, as an `ARG`      | no                   |
//! | `GLOBAL`    | no                    | no                   |
//! | `CONSTANT`  | no                    | no                   |
//! | `RETURN`    | no                    | no                   |

use std::fmt;

use bitflags::bitflags;
use strum::Display;

use crate::ir::{BlockId, IrType};

/// Identifier of a variable within one function's variable table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(usize);

impl VarId {
    /// Creates a variable identifier from a table index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the underlying table index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Storage class of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum VarKind {
    /// A named local of the source function.
    Local,
    /// A compiler temporary.
    Temp,
    /// A compiler-introduced binding that is not a plain temporary.
    Synthetic,
    /// A function parameter.
    Arg,
    /// A module-level variable.
    Global,
    /// A module-level constant.
    Constant,
    /// The receiver of an attached function.
    #[strum(serialize = "SELF")]
    Receiver,
    /// The function's return slot.
    Return,
}

impl VarKind {
    /// TEMP or SYNTHETIC: owned by whichever function defines it and removed
    /// once nothing references it.
    #[must_use]
    pub const fn is_temporary(self) -> bool {
        matches!(self, VarKind::Temp | VarKind::Synthetic)
    }

    /// GLOBAL or CONSTANT: visible from every function, never passed.
    #[must_use]
    pub const fn is_module_level(self) -> bool {
        matches!(self, VarKind::Global | VarKind::Constant)
    }
}

bitflags! {
    /// Flags attached to a variable declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VarFlags: u8 {
        /// A discarded binding (`_`); never needs to cross a call boundary.
        const IGNORED = 0x01;
        /// Referenced from more than one basic block.
        const CROSS_BLOCK = 0x02;
    }
}

/// A variable declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Source or generated name.
    pub name: String,
    /// Declared type.
    pub ty: IrType,
    /// Storage class.
    pub kind: VarKind,
    /// Declaration flags.
    pub flags: VarFlags,
    /// First block of the variable's scope (LOCAL variables only).
    pub start_block: Option<BlockId>,
    /// Last block of the variable's scope (LOCAL variables only).
    pub end_block: Option<BlockId>,
}

impl Variable {
    /// Creates an unscoped declaration with no flags.
    pub fn new(name: impl Into<String>, ty: IrType, kind: VarKind) -> Self {
        Self {
            name: name.into(),
            ty,
            kind,
            flags: VarFlags::empty(),
            start_block: None,
            end_block: None,
        }
    }

    /// Returns true if the variable is a discarded binding.
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.flags.contains(VarFlags::IGNORED)
    }

    /// Returns true if the variable is referenced from more than one block.
    #[must_use]
    pub fn is_cross_block(&self) -> bool {
        self.flags.contains(VarFlags::CROSS_BLOCK)
    }

    /// Returns true if a read of this variable inside an extracted region has
    /// to be satisfied by a helper parameter.
    ///
    /// Module-level variables are visible everywhere, ignored bindings carry
    /// nothing, and the return slot is never read before it is written.
    #[must_use]
    pub fn needs_passing(&self) -> bool {
        !self.is_ignored() && !self.kind.is_module_level() && self.kind != VarKind::Return
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.name, self.ty)
    }
}
