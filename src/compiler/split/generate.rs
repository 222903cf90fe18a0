//! Rewriting a parent function around its accepted candidates.
//!
//! The parent's blocks are walked once in layout order. Code outside every
//! candidate is copied into the current parent block; each candidate is
//! replaced by a call that ends the current block and continues in a new one.
//!
//! Every original block number is entered into a [`RewriteTable`]: its head
//! is where its code starts in the rewritten parent, its tail is the block
//! that now holds its terminator. Blocks moved into a helper map to the block
//! holding the call. The table is applied once at the end, after captured
//! exception-table entries have been removed.

use std::collections::VecDeque;

use crate::{
    compiler::{
        split::{
            candidate::Split,
            crossblock::{extract_cross_block, CrossBlockRegion},
            extract::error_union_return,
            inblock::extract_in_block,
            repair::RewriteTable,
        },
        SplitContext,
    },
    ir::{BasicBlock, BlockId, BlockIdAllocator, ConstructionKind, Function, Terminator, VarId},
    Error, Result,
};

/// A helper produced by splitting a function.
#[derive(Debug, Clone)]
pub struct GeneratedHelper {
    /// The new function.
    pub function: Function,
    /// Whether the helper is itself over the function threshold.
    pub split_further: bool,
    /// What the extracted construction builds.
    pub kind: ConstructionKind,
}

fn call(helper: &Function, args: &[VarId], dest: VarId, then: BlockId) -> Terminator {
    Terminator::Call {
        callee: helper.name.clone(),
        args: args.to_vec(),
        dest: Some(dest),
        then,
    }
}

/// Replaces every candidate of `function` with a call to a new helper.
///
/// `splits` must be in ascending layout order and non-overlapping, as
/// produced by [`super::find_candidates`].
///
/// # Errors
///
/// Returns an error if a candidate does not match the function's layout.
pub fn apply_splits(
    function: &mut Function,
    splits: Vec<Split>,
    attached: bool,
    ctx: &mut SplitContext,
) -> Result<Vec<GeneratedHelper>> {
    let mut ids = BlockIdAllocator::for_function(function);
    let return_block = function.return_block();
    let mut captured: Vec<usize> = splits
        .iter()
        .flat_map(|split| split.error_entries.iter().copied())
        .collect();

    let mut table = RewriteTable::new();
    let mut queue: VecDeque<(usize, BasicBlock)> = std::mem::take(&mut function.blocks)
        .into_iter()
        .enumerate()
        .collect();
    let mut layout = Vec::with_capacity(queue.len() + splits.len() * 4);
    let mut splits = splits.into_iter().peekable();
    let mut helpers = Vec::new();

    while let Some((first_pos, block)) = queue.pop_front() {
        let mut pos = first_pos;
        let mut original = block.id;
        let mut current = BasicBlock::new(block.id);
        let mut rest = block.instructions;
        let mut terminator = block.terminator;
        let mut offset = 0;

        while let Some(split) = splits.next_if(|split| split.start.block == pos) {
            let local = split
                .start
                .instr
                .checked_sub(offset)
                .filter(|local| *local <= rest.len())
                .ok_or_else(|| {
                    invariant_error!("{}: split start {:?} out of order", function.name, split.start)
                })?;
            let mut region = rest.split_off(local);
            current.instructions.append(&mut rest);

            if split.is_same_block() {
                let len = split.end.instr + 1 - split.start.instr;
                if len > region.len() {
                    return Err(invariant_error!(
                        "{}: split end {:?} past block end",
                        function.name,
                        split.end
                    ));
                }
                rest = region.split_off(len);
                offset = split.end.instr + 1;

                let (helper, result) = extract_in_block(function, ctx, attached, &split, region)?;
                let next = ids.fresh();
                current.terminator = call(&helper, &split.args, result, next);
                layout.push(std::mem::replace(&mut current, BasicBlock::new(next)));
                helpers.push(GeneratedHelper {
                    function: helper,
                    split_further: split.split_further,
                    kind: split.kind,
                });
                continue;
            }

            let mut middle = Vec::new();
            while queue.front().is_some_and(|(p, _)| *p < split.end.block) {
                if let Some((_, moved)) = queue.pop_front() {
                    middle.push(moved);
                }
            }
            let (end_pos, end_block) = queue
                .pop_front()
                .filter(|(p, _)| *p == split.end.block)
                .ok_or_else(|| {
                    invariant_error!("{}: split end {:?} not found", function.name, split.end)
                })?;
            let BasicBlock {
                id: end_id,
                instructions: mut end_instructions,
                terminator: end_terminator,
            } = end_block;
            let len = split.end.instr + 1;
            if len > end_instructions.len() {
                return Err(invariant_error!(
                    "{}: split end {:?} past block end",
                    function.name,
                    split.end
                ));
            }
            let end_rest = end_instructions.split_off(len);

            let call_block = current.id;
            table.set_tail(original, call_block);
            for moved in &middle {
                table.relocate(moved.id, call_block);
            }
            table.relocate(end_id, call_block);

            let entries = split
                .error_entries
                .iter()
                .map(|index| {
                    function.error_table.get(*index).copied().ok_or_else(|| {
                        invariant_error!("{}: no exception entry {}", function.name, index)
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let moved = CrossBlockRegion {
                entry: region,
                entry_terminator: terminator,
                middle,
                end_id,
                end: end_instructions,
            };
            let (helper, result) =
                extract_cross_block(function, ctx, &mut ids, attached, &split, moved, entries)?;

            if split.assigns_return {
                let target =
                    return_block.ok_or_else(|| Error::MissingReturnBlock(function.name.clone()))?;
                let ty = function.var(result).ty.clone();
                let unpack = error_union_return(function, ctx, &mut ids, Some((result, ty)), target);
                current.terminator = call(&helper, &split.args, unpack.call_result, unpack.test.id);
                layout.push(std::mem::replace(&mut current, unpack.ok));
                layout.push(unpack.test);
                layout.push(unpack.error);
            } else {
                let next = ids.fresh();
                current.terminator = call(&helper, &split.args, result, next);
                layout.push(std::mem::replace(&mut current, BasicBlock::new(next)));
            }
            helpers.push(GeneratedHelper {
                function: helper,
                split_further: split.split_further,
                kind: split.kind,
            });

            rest = end_rest;
            terminator = end_terminator;
            offset = len;
            pos = end_pos;
            original = end_id;
        }

        current.instructions.append(&mut rest);
        current.terminator = terminator;
        table.set_tail(original, current.id);
        layout.push(current);
    }

    if let Some(split) = splits.next() {
        return Err(invariant_error!(
            "{}: split at {:?} does not start in any block",
            function.name,
            split.start
        ));
    }

    function.blocks = layout;
    captured.sort_unstable();
    captured.dedup();
    for index in captured.into_iter().rev() {
        if index < function.error_table.len() {
            function.error_table.remove(index);
        }
    }
    table.apply(function);

    Ok(helpers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::{split::candidate::find_candidates, SplitConfig},
        ir::{verify_function, Instruction, IrType},
        test::factories::{cross_block_list, error_region, straight_line_list, trapped_region},
    };

    fn split_all(function: &mut Function) -> Vec<GeneratedHelper> {
        let config = SplitConfig::eager();
        let splits = find_candidates(function, &config);
        let mut ctx = SplitContext::new(config);
        apply_splits(function, splits, false, &mut ctx).unwrap()
    }

    #[test]
    fn test_same_block_split_ends_block_with_call() {
        let mut function = straight_line_list("f", 4);
        let helpers = split_all(&mut function);

        assert_eq!(helpers.len(), 1);
        assert_eq!(function.blocks.len(), 2);
        match &function.blocks[0].terminator {
            Terminator::Call {
                callee, args, then, ..
            } => {
                assert_eq!(callee, "$split$method$_1");
                assert!(args.is_empty());
                assert_eq!(*then, function.blocks[1].id);
            }
            other => panic!("unexpected {other}"),
        }
        assert_eq!(function.blocks[1].terminator, Terminator::Return);
        verify_function(&function, 250).unwrap();
        verify_function(&helpers[0].function, 250).unwrap();
    }

    #[test]
    fn test_cross_block_split_moves_middle_blocks() {
        let mut function = cross_block_list("f");
        let before = function.blocks.len();
        let helpers = split_all(&mut function);

        assert_eq!(helpers.len(), 1);
        // bb0 (call), continuation, bb4
        assert_eq!(function.blocks.len(), 3);
        assert!(function.blocks.len() < before);
        assert!(matches!(
            function.blocks[0].terminator,
            Terminator::Call { .. }
        ));
        verify_function(&function, 250).unwrap();
        verify_function(&helpers[0].function, 250).unwrap();
    }

    #[test]
    fn test_error_region_gets_type_test() {
        let mut function = error_region("f");
        let helpers = split_all(&mut function);
        assert_eq!(helpers.len(), 1);
        assert!(helpers[0].function.return_type.may_be_error());

        // call, test, error, ok, return
        assert_eq!(function.blocks.len(), 5);
        let test = &function.blocks[1];
        assert!(matches!(test.instructions[0], Instruction::TypeTest { .. }));
        let error = &function.blocks[2];
        assert_eq!(
            error.terminator,
            Terminator::Goto {
                target: function.blocks[4].id
            }
        );
        let ok = &function.blocks[3];
        assert!(matches!(
            ok.instructions[0],
            Instruction::TypeCast { checked: true, .. }
        ));
        assert_eq!(
            function.var(function.return_var).ty,
            IrType::List(Box::new(IrType::Int)).or_error()
        );
        verify_function(&function, 250).unwrap();
    }

    #[test]
    fn test_captured_entries_move_into_helper() {
        let mut function = trapped_region("f");
        assert_eq!(function.error_table.len(), 1);
        let helpers = split_all(&mut function);
        assert_eq!(helpers.len(), 1);
        assert!(function.error_table.is_empty());
        assert_eq!(helpers[0].function.error_table.len(), 1);
        verify_function(&function, 250).unwrap();
        verify_function(&helpers[0].function, 250).unwrap();
    }
}
