//! Functions and exception tables.

use std::{collections::HashMap, fmt};

use crate::ir::{BasicBlock, BlockId, IrType, Terminator, VarId, VarKind, Variable};

/// Name prefix of every function produced by splitting.
pub const SPLIT_FUNCTION_PREFIX: &str = "$split$";

/// Where a function came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionOrigin {
    /// Lowered from source.
    Source,
    /// Produced by a compiler transformation.
    Generated,
}

/// A protected region: a runtime error raised in blocks `trap..=end` (layout
/// order) is stored into `error` and control continues at `target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorEntry {
    /// First protected block.
    pub trap: BlockId,
    /// Last protected block.
    pub end: BlockId,
    /// Receives the caught error.
    pub error: VarId,
    /// Handler block.
    pub target: BlockId,
}

/// An IR function.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Function name, unique within its module.
    pub name: String,
    /// Source or generated.
    pub origin: FunctionOrigin,
    /// Parameters in call order; each names an `ARG` or `SELF` variable.
    pub params: Vec<VarId>,
    /// Declared return type.
    pub return_type: IrType,
    /// The `RETURN` variable.
    pub return_var: VarId,
    /// Variable table; [`VarId`]s index into it.
    pub variables: Vec<Variable>,
    /// Blocks in layout order. The first block is the entry.
    pub blocks: Vec<BasicBlock>,
    /// Exception table.
    pub error_table: Vec<ErrorEntry>,
    /// Number of arguments callers pass.
    pub args_count: usize,
}

impl Function {
    /// Returns the declaration of `id`.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not in this function's table. Run
    /// [`crate::ir::verify_function`] on untrusted input first.
    #[must_use]
    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.index()]
    }

    /// Mutable access to the declaration of `id`.
    pub fn var_mut(&mut self, id: VarId) -> &mut Variable {
        &mut self.variables[id.index()]
    }

    /// Appends a declaration and returns its identifier.
    pub fn add_var(&mut self, variable: Variable) -> VarId {
        self.variables.push(variable);
        VarId::new(self.variables.len() - 1)
    }

    /// Kind of `id`.
    #[must_use]
    pub fn kind_of(&self, id: VarId) -> VarKind {
        self.var(id).kind
    }

    /// Total number of non-terminating instructions.
    #[must_use]
    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|block| block.instructions.len()).sum()
    }

    /// Returns true if this function was produced by splitting.
    #[must_use]
    pub fn is_split_function(&self) -> bool {
        self.name.starts_with(SPLIT_FUNCTION_PREFIX)
    }

    /// Layout position of every block.
    #[must_use]
    pub fn block_positions(&self) -> HashMap<BlockId, usize> {
        self.blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| (block.id, pos))
            .collect()
    }

    /// Finds a block by number.
    #[must_use]
    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|block| block.id == id)
    }

    /// The block control reaches to leave the function normally: the last
    /// block in layout order that returns.
    #[must_use]
    pub fn return_block(&self) -> Option<BlockId> {
        self.blocks
            .iter()
            .rev()
            .find(|block| matches!(block.terminator, Terminator::Return))
            .map(|block| block.id)
    }

    /// Iterates over every operand referenced anywhere in the function body:
    /// instruction operands, terminator operands and exception-table error
    /// operands.
    pub fn referenced_vars(&self) -> impl Iterator<Item = VarId> + '_ {
        let body = self.blocks.iter().flat_map(|block| {
            block
                .instructions
                .iter()
                .flat_map(|instr| instr.dest().into_iter().chain(instr.uses()))
                .chain(block.terminator.dest())
                .chain(block.terminator.uses())
        });
        body.chain(self.error_table.iter().map(|entry| entry.error))
    }

    /// Rewrites every operand of the function body through `map`, including
    /// the parameter list, the return variable and exception-table entries.
    pub fn remap_vars(&mut self, mut map: impl FnMut(VarId) -> VarId) {
        for block in &mut self.blocks {
            for instr in &mut block.instructions {
                instr.for_each_operand_mut(|var| *var = map(*var));
            }
            block.terminator.for_each_operand_mut(|var| *var = map(*var));
        }
        for entry in &mut self.error_table {
            entry.error = map(entry.error);
        }
        for param in &mut self.params {
            *param = map(*param);
        }
        self.return_var = map(self.return_var);
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            let var = self.var(*param);
            write!(f, "{param} {}: {}", var.name, var.ty)?;
        }
        writeln!(f, ") -> {} {{", self.return_type)?;
        for (i, var) in self.variables.iter().enumerate() {
            writeln!(f, "  {} = {var}", VarId::new(i))?;
        }
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        for entry in &self.error_table {
            writeln!(
                f,
                "  trap {}..{} -> {} into {}",
                entry.trap, entry.end, entry.target, entry.error
            )?;
        }
        writeln!(f, "}}")
    }
}
