//! Block terminators.
//!
//! Every basic block ends in exactly one [`Terminator`]. All control-flow
//! edges of a function live here, so every pass that re-links blocks goes
//! through [`Terminator::successors_mut`]; adding a variant forces that
//! accessor (and therefore every re-linking pass) to be updated.

use std::fmt;

use crate::ir::{BlockId, VarId};

/// The instruction ending a basic block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Unconditional jump.
    Goto {
        /// Jump target.
        target: BlockId,
    },
    /// Two-way conditional jump.
    Branch {
        /// Boolean condition.
        condition: VarId,
        /// Taken when the condition holds.
        true_target: BlockId,
        /// Taken otherwise.
        false_target: BlockId,
    },
    /// Call to another function of the module (or an external one),
    /// continuing at `then`.
    Call {
        /// Callee name.
        callee: String,
        /// Argument operands.
        args: Vec<VarId>,
        /// Result operand, if the result is kept.
        dest: Option<VarId>,
        /// Continuation block.
        then: BlockId,
    },
    /// Return the function's return slot to the caller.
    Return,
    /// Raise `error`, unwinding to the innermost protecting exception-table
    /// entry or out of the function.
    Panic {
        /// The error value.
        error: VarId,
    },
}

impl Terminator {
    /// Every successor block, in operand order.
    #[must_use]
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Terminator::Goto { target } => vec![*target],
            Terminator::Branch {
                true_target,
                false_target,
                ..
            } => vec![*true_target, *false_target],
            Terminator::Call { then, .. } => vec![*then],
            Terminator::Return | Terminator::Panic { .. } => Vec::new(),
        }
    }

    /// Mutable access to every successor block.
    pub fn successors_mut(&mut self) -> Vec<&mut BlockId> {
        match self {
            Terminator::Goto { target } => vec![target],
            Terminator::Branch {
                true_target,
                false_target,
                ..
            } => vec![true_target, false_target],
            Terminator::Call { then, .. } => vec![then],
            Terminator::Return | Terminator::Panic { .. } => Vec::new(),
        }
    }

    /// Rewrites every successor through `map`.
    pub fn retarget(&mut self, mut map: impl FnMut(BlockId) -> BlockId) {
        for target in self.successors_mut() {
            *target = map(*target);
        }
    }

    /// The operand this terminator writes.
    #[must_use]
    pub fn dest(&self) -> Option<VarId> {
        match self {
            Terminator::Call { dest, .. } => *dest,
            _ => None,
        }
    }

    /// The operands this terminator reads.
    #[must_use]
    pub fn uses(&self) -> Vec<VarId> {
        match self {
            Terminator::Branch { condition, .. } => vec![*condition],
            Terminator::Call { args, .. } => args.clone(),
            Terminator::Panic { error } => vec![*error],
            Terminator::Goto { .. } | Terminator::Return => Vec::new(),
        }
    }

    /// Visits every operand, written and read, mutably.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut VarId)) {
        match self {
            Terminator::Branch { condition, .. } => f(condition),
            Terminator::Call { args, dest, .. } => {
                if let Some(dest) = dest {
                    f(dest);
                }
                for arg in args {
                    f(arg);
                }
            }
            Terminator::Panic { error } => f(error),
            Terminator::Goto { .. } | Terminator::Return => {}
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Goto { target } => write!(f, "goto {target}"),
            Terminator::Branch {
                condition,
                true_target,
                false_target,
            } => write!(f, "branch {condition} ? {true_target} : {false_target}"),
            Terminator::Call {
                callee,
                args,
                dest,
                then,
            } => {
                if let Some(dest) = dest {
                    write!(f, "{dest} = ")?;
                }
                write!(f, "call {callee}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ") -> {then}")
            }
            Terminator::Return => f.write_str("return"),
            Terminator::Panic { error } => write!(f, "panic {error}"),
        }
    }
}
