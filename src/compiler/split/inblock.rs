//! Extraction of regions that lie within one basic block.

use crate::{
    compiler::{
        split::{
            candidate::Split,
            extract::{redirect_result, HelperBuilder},
        },
        SplitContext,
    },
    ir::{BasicBlock, BlockId, Function, Instruction, Terminator, VarId},
    Result,
};

/// Moves `region` into a new helper.
///
/// The helper has an entry block holding the region, ending in a jump to an
/// empty returning block. Returns the helper and the operand the parent's
/// call must write.
pub(super) fn extract_in_block(
    parent: &Function,
    ctx: &mut SplitContext,
    attached: bool,
    split: &Split,
    mut region: Vec<Instruction>,
) -> Result<(Function, VarId)> {
    let result = redirect_result(parent, &mut region)?;
    let entry = BlockId::new(0);
    let exit = BlockId::new(1);
    let blocks = vec![
        BasicBlock::with(entry, region, Terminator::Goto { target: exit }),
        BasicBlock::new(exit),
    ];

    let helper = HelperBuilder::new(parent, attached, parent.var(result).ty.clone())
        .with_params(&split.args)
        .finish(ctx.next_function_name(), blocks, Vec::new());
    Ok((helper, result))
}
