//! Basic blocks and block identities.

use std::fmt;

use crate::ir::{Function, Instruction, Terminator};

/// Identity number of a basic block, unique within its function.
///
/// Jump targets and exception-table ranges refer to blocks by this number,
/// not by position. Positions and numbers agree after renumbering.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(usize);

impl BlockId {
    /// Creates a block identifier.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Returns the raw number.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Debug for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bb{}", self.0)
    }
}

/// A straight-line instruction sequence ending in one terminator.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    /// Identity number.
    pub id: BlockId,
    /// Non-terminating instructions.
    pub instructions: Vec<Instruction>,
    /// The terminator.
    pub terminator: Terminator,
}

impl BasicBlock {
    /// Creates an empty block that returns.
    #[must_use]
    pub fn new(id: BlockId) -> Self {
        Self {
            id,
            instructions: Vec::new(),
            terminator: Terminator::Return,
        }
    }

    /// Creates a block from its parts.
    #[must_use]
    pub fn with(id: BlockId, instructions: Vec<Instruction>, terminator: Terminator) -> Self {
        Self {
            id,
            instructions,
            terminator,
        }
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.id)?;
        for instr in &self.instructions {
            writeln!(f, "  {instr}")?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}

/// Hands out block numbers not used by any block of a function.
///
/// Create it before blocks are taken out of the function; numbers it returns
/// never collide with the function's original blocks or with each other.
#[derive(Debug, Clone)]
pub struct BlockIdAllocator {
    next: usize,
}

impl BlockIdAllocator {
    /// Starts numbering after the highest block number of `function`.
    #[must_use]
    pub fn for_function(function: &Function) -> Self {
        Self::after(function.blocks.iter().map(|block| block.id))
    }

    /// Starts numbering after the highest of `ids`.
    pub fn after(ids: impl IntoIterator<Item = BlockId>) -> Self {
        let next = ids
            .into_iter()
            .map(|id| id.index() + 1)
            .max()
            .unwrap_or(0);
        Self { next }
    }

    /// Returns a fresh block number.
    pub fn fresh(&mut self) -> BlockId {
        let id = BlockId::new(self.next);
        self.next += 1;
        id
    }
}
