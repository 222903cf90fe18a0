//! Post-split repair passes.
//!
//! Every pass here is a function of the function body and, where blocks move,
//! an explicit [`RewriteTable`]. Nothing relies on two terminators sharing a
//! block object: a block number that no longer exists is rewritten through
//! the table or reported by the verifier.
//!
//! # Head and tail
//!
//! Splitting can cut one original block into several parent blocks (a head
//! that keeps running the original code, a call, and continuations) or
//! remove it altogether. The table therefore answers two questions for every
//! original block number:
//!
//! ```text
//!   head(b)  where control must go to execute b's code   (jump targets,
//!                                                         trap starts,
//!                                                         handler targets,
//!                                                         scope starts)
//!   tail(b)  the last block that still holds b's code    (trap ends,
//!                                                         scope ends)
//! ```
//!
//! Removed blocks map both to the block that stands in for the removed code.

use std::collections::{HashMap, HashSet};

use crate::ir::{BlockId, ErrorEntry, Function, VarFlags, VarId};

/// Old-number to new-block mapping applied by the repair passes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteTable {
    heads: HashMap<BlockId, BlockId>,
    tails: HashMap<BlockId, BlockId>,
}

impl RewriteTable {
    /// Creates an empty (identity) table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps both head and tail of `old` to `new`.
    pub fn relocate(&mut self, old: BlockId, new: BlockId) {
        self.heads.insert(old, new);
        self.tails.insert(old, new);
    }

    /// Sets where control must go to execute `old`'s code.
    pub fn set_head(&mut self, old: BlockId, new: BlockId) {
        self.heads.insert(old, new);
    }

    /// Sets the last block holding `old`'s code.
    pub fn set_tail(&mut self, old: BlockId, new: BlockId) {
        self.tails.insert(old, new);
    }

    /// Head of `old`; unmapped numbers map to themselves.
    #[must_use]
    pub fn head(&self, old: BlockId) -> BlockId {
        self.heads.get(&old).copied().unwrap_or(old)
    }

    /// Tail of `old`; unmapped numbers map to themselves.
    #[must_use]
    pub fn tail(&self, old: BlockId) -> BlockId {
        self.tails.get(&old).copied().unwrap_or(old)
    }

    /// Returns true if every number maps to itself.
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.heads.iter().all(|(old, new)| old == new)
            && self.tails.iter().all(|(old, new)| old == new)
    }

    /// Rewrites one exception-table entry.
    pub fn apply_to_entry(&self, entry: &mut ErrorEntry) {
        entry.trap = self.head(entry.trap);
        entry.end = self.tail(entry.end);
        entry.target = self.head(entry.target);
    }

    /// Rewrites every block reference of `function`: terminator successors,
    /// exception-table entries and variable scope markers.
    pub fn apply(&self, function: &mut Function) {
        for block in &mut function.blocks {
            block.terminator.retarget(|target| self.head(target));
        }
        for entry in &mut function.error_table {
            self.apply_to_entry(entry);
        }
        for variable in &mut function.variables {
            variable.start_block = variable.start_block.map(|b| self.head(b));
            variable.end_block = variable.end_block.map(|b| self.tail(b));
        }
    }
}

/// Renumbers blocks to contiguous layout order (`bb0`, `bb1`, ...).
///
/// Returns true if any number changed.
pub fn renumber_blocks(function: &mut Function) -> bool {
    let mut table = RewriteTable::new();
    for (pos, block) in function.blocks.iter_mut().enumerate() {
        let new = BlockId::new(pos);
        table.relocate(block.id, new);
        block.id = new;
    }
    let changed = !table.is_identity();
    if changed {
        table.apply(function);
    }
    changed
}

/// Drops TEMP/SYNTHETIC variables nothing references and compacts the table.
///
/// Returns the number of variables removed.
pub fn compact_variables(function: &mut Function) -> usize {
    let mut referenced: HashSet<VarId> = function.referenced_vars().collect();
    referenced.extend(function.params.iter().copied());
    referenced.insert(function.return_var);

    let mut mapping: Vec<Option<VarId>> = Vec::with_capacity(function.variables.len());
    let mut kept = Vec::with_capacity(function.variables.len());
    for (index, variable) in function.variables.drain(..).enumerate() {
        if variable.kind.is_temporary() && !referenced.contains(&VarId::new(index)) {
            mapping.push(None);
        } else {
            mapping.push(Some(VarId::new(kept.len())));
            kept.push(variable);
        }
    }

    let removed = mapping.iter().filter(|m| m.is_none()).count();
    function.variables = kept;
    if removed > 0 {
        function.remap_vars(|var| mapping.get(var.index()).copied().flatten().unwrap_or(var));
    }
    removed
}

/// Recomputes [`VarFlags::CROSS_BLOCK`] for every variable.
pub fn recompute_cross_block(function: &mut Function) {
    let mut seen_in: HashMap<VarId, BlockId> = HashMap::new();
    let mut cross: HashSet<VarId> = HashSet::new();

    for block in &function.blocks {
        let operands = block
            .instructions
            .iter()
            .flat_map(|instr| instr.dest().into_iter().chain(instr.uses()))
            .chain(block.terminator.dest())
            .chain(block.terminator.uses());
        for var in operands {
            match seen_in.get(&var) {
                Some(first) if *first != block.id => {
                    cross.insert(var);
                }
                Some(_) => {}
                None => {
                    seen_in.insert(var, block.id);
                }
            }
        }
    }

    for (index, variable) in function.variables.iter_mut().enumerate() {
        variable
            .flags
            .set(VarFlags::CROSS_BLOCK, cross.contains(&VarId::new(index)));
    }
}

/// What [`repair_function`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Whether any block was renumbered.
    pub renumbered: bool,
    /// How many variables were removed.
    pub variables_removed: usize,
}

/// Runs every repair pass on a function that has just been split.
pub fn repair_function(function: &mut Function) -> RepairSummary {
    let renumbered = renumber_blocks(function);
    let variables_removed = compact_variables(function);
    recompute_cross_block(function);
    RepairSummary {
        renumbered,
        variables_removed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ConstValue, FunctionBuilder, Instruction, IrType, Terminator, VarKind};

    #[test]
    fn test_table_defaults_to_identity() {
        let mut table = RewriteTable::new();
        assert_eq!(table.head(BlockId::new(4)), BlockId::new(4));
        table.set_head(BlockId::new(4), BlockId::new(1));
        table.set_tail(BlockId::new(4), BlockId::new(2));
        assert_eq!(table.head(BlockId::new(4)), BlockId::new(1));
        assert_eq!(table.tail(BlockId::new(4)), BlockId::new(2));
        assert!(!table.is_identity());
    }

    #[test]
    fn test_apply_uses_head_for_starts_and_tail_for_ends() {
        let mut b = FunctionBuilder::new("f", IrType::Nil);
        let x = b.local("x", IrType::Int);
        let err = b.temp(IrType::Error);
        let bb0 = b.block();
        let bb1 = b.block();
        b.switch_to(bb0);
        b.terminate(Terminator::Goto { target: bb1 });
        b.scope(x, bb0, bb0);
        b.trap(bb0, bb0, err, bb1);
        let mut function = b.build();

        let mut table = RewriteTable::new();
        table.set_tail(bb0, BlockId::new(7));
        table.set_head(bb1, BlockId::new(8));
        table.apply(&mut function);

        assert_eq!(
            function.blocks[0].terminator,
            Terminator::Goto {
                target: BlockId::new(8)
            }
        );
        let entry = function.error_table[0];
        assert_eq!(entry.trap, bb0);
        assert_eq!(entry.end, BlockId::new(7));
        assert_eq!(entry.target, BlockId::new(8));
        assert_eq!(function.var(x).start_block, Some(bb0));
        assert_eq!(function.var(x).end_block, Some(BlockId::new(7)));
    }

    #[test]
    fn test_renumber_follows_layout() {
        let mut b = FunctionBuilder::new("f", IrType::Nil);
        let bb0 = b.block();
        let bb1 = b.block();
        b.switch_to(bb0);
        b.terminate(Terminator::Goto { target: bb1 });
        let mut function = b.build();
        function.blocks[0].id = BlockId::new(5);
        function.blocks[1].id = BlockId::new(3);
        function.blocks[0].terminator = Terminator::Goto {
            target: BlockId::new(3),
        };

        assert!(renumber_blocks(&mut function));
        assert_eq!(function.blocks[0].id, BlockId::new(0));
        assert_eq!(function.blocks[1].id, BlockId::new(1));
        assert_eq!(
            function.blocks[0].terminator,
            Terminator::Goto {
                target: BlockId::new(1)
            }
        );
        assert!(!renumber_blocks(&mut function));
    }

    #[test]
    fn test_compact_drops_only_unused_temporaries() {
        let mut b = FunctionBuilder::new("f", IrType::Int);
        let ret = b.return_var();
        let unused_local = b.local("unused", IrType::Int);
        let unused_temp = b.temp(IrType::Int);
        let used_temp = b.temp(IrType::Int);
        b.constant(used_temp, ConstValue::Int(1));
        b.mov(ret, used_temp);
        let mut function = b.build();
        assert_eq!(function.variables.len(), 4);

        assert_eq!(compact_variables(&mut function), 1);
        assert_eq!(function.variables.len(), 3);
        assert_eq!(function.var(unused_local).name, "unused");
        assert_eq!(function.return_var, ret);
        let _ = unused_temp;

        // used_temp moved down one slot
        let moved = VarId::new(2);
        assert_eq!(function.kind_of(moved), VarKind::Temp);
        assert_eq!(
            function.blocks[0].instructions[1],
            Instruction::Move {
                dest: ret,
                src: moved
            }
        );
    }

    #[test]
    fn test_cross_block_flag_is_recomputed() {
        let mut b = FunctionBuilder::new("f", IrType::Int);
        let ret = b.return_var();
        let t = b.temp(IrType::Int);
        let local = b.local("only_here", IrType::Int);
        let bb0 = b.block();
        let bb1 = b.block();
        b.switch_to(bb0);
        b.constant(t, ConstValue::Int(1));
        b.constant(local, ConstValue::Int(2));
        b.terminate(Terminator::Goto { target: bb1 });
        b.switch_to(bb1);
        b.mov(ret, t);
        let mut function = b.build();
        function.var_mut(local).flags |= VarFlags::CROSS_BLOCK;

        recompute_cross_block(&mut function);
        assert!(function.var(t).is_cross_block());
        assert!(!function.var(local).is_cross_block());
    }
}
