//! Fluent construction of IR functions.
//!
//! # Example
//!
//! ```rust
//! use irsplit::ir::{ConstValue, FunctionBuilder, Instruction, IrType, Terminator};
//!
//! let mut b = FunctionBuilder::new("answer", IrType::Int);
//! let ret = b.return_var();
//! let entry = b.block();
//! let exit = b.block();
//! b.switch_to(entry);
//! b.push(Instruction::ConstantLoad { dest: ret, value: ConstValue::Int(42) });
//! b.terminate(Terminator::Goto { target: exit });
//!
//! let function = b.build();
//! assert_eq!(function.blocks.len(), 2);
//! assert_eq!(function.instruction_count(), 1);
//! ```

use crate::ir::{
    BasicBlock, BlockId, ConstValue, ErrorEntry, Function, FunctionOrigin, Instruction, IrType,
    Terminator, VarFlags, VarId, VarKind, Variable,
};

/// Builds a [`Function`] block by block.
///
/// Blocks are numbered in creation order and laid out in creation order.
/// New blocks return until given another terminator.
#[derive(Debug)]
pub struct FunctionBuilder {
    function: Function,
    current: Option<usize>,
    temps: usize,
}

impl FunctionBuilder {
    /// Starts a source function whose return variable is `%0`.
    pub fn new(name: impl Into<String>, return_type: IrType) -> Self {
        let ret = Variable::new("%0", return_type.clone(), VarKind::Return);
        Self {
            function: Function {
                name: name.into(),
                origin: FunctionOrigin::Source,
                params: Vec::new(),
                return_type,
                return_var: VarId::new(0),
                variables: vec![ret],
                blocks: Vec::new(),
                error_table: Vec::new(),
                args_count: 0,
            },
            current: None,
            temps: 0,
        }
    }

    /// Marks the function as produced by a compiler transformation.
    pub fn generated(&mut self) -> &mut Self {
        self.function.origin = FunctionOrigin::Generated;
        self
    }

    /// The return variable.
    #[must_use]
    pub fn return_var(&self) -> VarId {
        self.function.return_var
    }

    /// Declares a variable.
    pub fn var(&mut self, variable: Variable) -> VarId {
        self.function.add_var(variable)
    }

    /// Declares an `ARG` parameter.
    pub fn param(&mut self, name: impl Into<String>, ty: IrType) -> VarId {
        let id = self.var(Variable::new(name, ty, VarKind::Arg));
        self.function.params.push(id);
        self.function.args_count = self.function.params.len();
        id
    }

    /// Declares the `SELF` receiver parameter of an attached function.
    pub fn receiver(&mut self, ty: IrType) -> VarId {
        let id = self.var(Variable::new("self", ty, VarKind::Receiver));
        self.function.params.push(id);
        self.function.args_count = self.function.params.len();
        id
    }

    /// Declares a `LOCAL`.
    pub fn local(&mut self, name: impl Into<String>, ty: IrType) -> VarId {
        self.var(Variable::new(name, ty, VarKind::Local))
    }

    /// Declares a `TEMP` named `%tN`.
    pub fn temp(&mut self, ty: IrType) -> VarId {
        let name = format!("%t{}", self.temps);
        self.temps += 1;
        self.var(Variable::new(name, ty, VarKind::Temp))
    }

    /// Declares an ignored `TEMP` binding.
    pub fn ignored(&mut self, ty: IrType) -> VarId {
        let id = self.temp(ty);
        self.function.var_mut(id).flags |= VarFlags::IGNORED;
        id
    }

    /// Declares a `GLOBAL`.
    pub fn global(&mut self, name: impl Into<String>, ty: IrType) -> VarId {
        self.var(Variable::new(name, ty, VarKind::Global))
    }

    /// Sets the scope markers of a variable.
    pub fn scope(&mut self, var: VarId, start: BlockId, end: BlockId) -> &mut Self {
        let variable = self.function.var_mut(var);
        variable.start_block = Some(start);
        variable.end_block = Some(end);
        self
    }

    /// Appends a new block and makes it current.
    pub fn block(&mut self) -> BlockId {
        let id = BlockId::new(self.function.blocks.len());
        self.function.blocks.push(BasicBlock::new(id));
        self.current = Some(self.function.blocks.len() - 1);
        id
    }

    /// Makes an existing block current.
    ///
    /// # Panics
    ///
    /// Panics if no block with this number was created by this builder.
    pub fn switch_to(&mut self, id: BlockId) -> &mut Self {
        let pos = self
            .function
            .blocks
            .iter()
            .position(|block| block.id == id);
        assert!(pos.is_some(), "unknown block {id}");
        self.current = pos;
        self
    }

    fn current_block(&mut self) -> &mut BasicBlock {
        let pos = match self.current {
            Some(pos) => pos,
            None => {
                self.block();
                self.function.blocks.len() - 1
            }
        };
        &mut self.function.blocks[pos]
    }

    /// Appends an instruction to the current block, creating the entry block
    /// if none exists yet.
    pub fn push(&mut self, instr: Instruction) -> &mut Self {
        self.current_block().instructions.push(instr);
        self
    }

    /// `dest = const value`
    pub fn constant(&mut self, dest: VarId, value: ConstValue) -> &mut Self {
        self.push(Instruction::ConstantLoad { dest, value })
    }

    /// `dest = src`
    pub fn mov(&mut self, dest: VarId, src: VarId) -> &mut Self {
        self.push(Instruction::Move { dest, src })
    }

    /// Sets the terminator of the current block.
    pub fn terminate(&mut self, terminator: Terminator) -> &mut Self {
        self.current_block().terminator = terminator;
        self
    }

    /// Adds an exception-table entry.
    pub fn trap(&mut self, trap: BlockId, end: BlockId, error: VarId, target: BlockId) -> &mut Self {
        self.function.error_table.push(ErrorEntry {
            trap,
            end,
            error,
            target,
        });
        self
    }

    /// Finishes the function.
    #[must_use]
    pub fn build(self) -> Function {
        self.function
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_are_numbered_in_creation_order() {
        let mut b = FunctionBuilder::new("f", IrType::Nil);
        let first = b.block();
        let second = b.block();
        assert_eq!(first, BlockId::new(0));
        assert_eq!(second, BlockId::new(1));

        b.switch_to(first);
        b.terminate(Terminator::Goto { target: second });
        let function = b.build();
        assert_eq!(
            function.blocks[0].terminator,
            Terminator::Goto { target: second }
        );
        assert_eq!(function.blocks[1].terminator, Terminator::Return);
    }

    #[test]
    fn test_params_count_arguments() {
        let mut b = FunctionBuilder::new("m", IrType::Nil);
        let this = b.receiver(IrType::Record("Point".into()));
        let x = b.param("x", IrType::Int);
        let function = b.build();
        assert_eq!(function.params, vec![this, x]);
        assert_eq!(function.args_count, 2);
        assert_eq!(function.kind_of(this), VarKind::Receiver);
    }

    #[test]
    fn test_push_creates_entry_block() {
        let mut b = FunctionBuilder::new("f", IrType::Int);
        let ret = b.return_var();
        b.constant(ret, ConstValue::Int(1));
        let function = b.build();
        assert_eq!(function.blocks.len(), 1);
        assert_eq!(function.instruction_count(), 1);
        assert_eq!(function.return_block(), Some(BlockId::new(0)));
    }

    #[test]
    fn test_temps_get_distinct_names() {
        let mut b = FunctionBuilder::new("f", IrType::Nil);
        let a = b.temp(IrType::Int);
        let c = b.ignored(IrType::Int);
        let function = b.build();
        assert_ne!(function.var(a).name, function.var(c).name);
        assert!(function.var(c).is_ignored());
    }
}
