//! Extraction of regions spanning several basic blocks.
//!
//! ```text
//!   parent before                     helper
//!   ─────────────                     ──────
//!   bbS: a; b | region...       ┌──►  entry: region... (bbS's terminator)
//!        branch bbM1, bbM2      │     bbM1, bbM2: moved unchanged
//!   bbM1, bbM2 ...              │     bbE:   ... construction
//!   bbE: ... construction | c   │            goto exit
//!        goto bbX               │     exit:  return
//!
//!   parent after
//!   ────────────
//!   bbS:  a; b
//!         call helper(args) -> result, then cont
//!   cont: c
//!         goto bbX
//! ```
//!
//! Blocks in the region that store an error into the return slot jump to the
//! helper's exit instead; the parent then unpacks the `T|error` result (see
//! [`super::extract::error_union_return`]).

use crate::{
    compiler::{
        split::{
            candidate::Split,
            extract::{redirect_result, HelperBuilder},
        },
        SplitContext,
    },
    ir::{
        BasicBlock, BlockId, BlockIdAllocator, ErrorEntry, Function, Instruction, Terminator,
        VarId,
    },
    Result,
};

/// The parent code a cross-block split moves.
pub(super) struct CrossBlockRegion {
    /// The start block's instructions from the region start onward.
    pub entry: Vec<Instruction>,
    /// The start block's terminator.
    pub entry_terminator: Terminator,
    /// Blocks wholly inside the region.
    pub middle: Vec<BasicBlock>,
    /// Number of the end block.
    pub end_id: BlockId,
    /// The end block's instructions through the construction.
    pub end: Vec<Instruction>,
}

/// Moves `region` into a new helper.
///
/// Returns the helper and the operand the parent's call must write (after
/// unpacking, if the region stores into the return slot).
pub(super) fn extract_cross_block(
    parent: &Function,
    ctx: &mut SplitContext,
    ids: &mut BlockIdAllocator,
    attached: bool,
    split: &Split,
    region: CrossBlockRegion,
    error_table: Vec<ErrorEntry>,
) -> Result<(Function, VarId)> {
    let mut end = region.end;
    let result = redirect_result(parent, &mut end)?;

    let entry = ids.fresh();
    let exit = ids.fresh();
    let mut blocks = Vec::with_capacity(region.middle.len() + 3);
    blocks.push(BasicBlock::with(entry, region.entry, region.entry_terminator));
    blocks.extend(region.middle);
    blocks.push(BasicBlock::with(
        region.end_id,
        end,
        Terminator::Goto { target: exit },
    ));

    for block in &mut blocks {
        let stores_return = block
            .instructions
            .last()
            .and_then(Instruction::dest)
            .is_some_and(|dest| dest == parent.return_var);
        if stores_return {
            block.terminator = Terminator::Goto { target: exit };
        }
    }
    blocks.push(BasicBlock::new(exit));

    let mut return_type = parent.var(result).ty.clone();
    if split.assigns_return {
        return_type = return_type.or_error();
    }

    let helper = HelperBuilder::new(parent, attached, return_type)
        .with_params(&split.args)
        .finish(ctx.next_function_name(), blocks, error_table);
    Ok((helper, result))
}
