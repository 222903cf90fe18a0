//! Building helper functions out of code moved from a parent.
//!
//! Code moved out of a parent still names the parent's variables. The
//! [`HelperBuilder`] gives the helper its own variable table and rewrites
//! every moved operand into it:
//!
//! - the parent's return variable becomes the helper's return variable,
//! - every needed operand becomes an `ARG` parameter of the same name,
//! - anything else referenced (temporaries owned by the region, module-level
//!   variables) is re-declared in the helper with its kind preserved.

use std::collections::HashMap;

use crate::{
    compiler::SplitContext,
    ir::{
        BasicBlock, BlockId, ErrorEntry, Function, FunctionOrigin, Instruction, IrType,
        Terminator, VarFlags, VarId, VarKind, Variable,
    },
};

/// Return variable name of helpers split out of top-level functions.
const RETURN_VAR_NAME: &str = "%0";

/// Return variable name of helpers split out of attached functions.
const ATTACHED_RETURN_VAR_NAME: &str = "%1";

/// Assembles a helper function from code taken out of `parent`.
pub(super) struct HelperBuilder<'a> {
    parent: &'a Function,
    variables: Vec<Variable>,
    params: Vec<VarId>,
    remap: HashMap<VarId, VarId>,
    return_type: IrType,
}

impl<'a> HelperBuilder<'a> {
    /// Starts a helper returning `return_type`.
    pub fn new(parent: &'a Function, attached: bool, return_type: IrType) -> Self {
        let name = if attached {
            ATTACHED_RETURN_VAR_NAME
        } else {
            RETURN_VAR_NAME
        };
        let mut remap = HashMap::new();
        remap.insert(parent.return_var, VarId::new(0));
        Self {
            parent,
            variables: vec![Variable::new(name, return_type.clone(), VarKind::Return)],
            params: Vec::new(),
            remap,
            return_type,
        }
    }

    /// Declares one `ARG` parameter per operand, in order.
    pub fn with_params(mut self, args: &[VarId]) -> Self {
        for &arg in args {
            let source = self.parent.var(arg);
            let param = Variable::new(source.name.clone(), source.ty.clone(), VarKind::Arg);
            self.variables.push(param);
            let id = VarId::new(self.variables.len() - 1);
            self.params.push(id);
            self.remap.insert(arg, id);
        }
        self
    }

    fn map(&mut self, var: VarId) -> VarId {
        if let Some(mapped) = self.remap.get(&var) {
            return *mapped;
        }
        let mut copy = self.parent.var(var).clone();
        copy.start_block = None;
        copy.end_block = None;
        copy.flags.remove(VarFlags::CROSS_BLOCK);
        self.variables.push(copy);
        let id = VarId::new(self.variables.len() - 1);
        self.remap.insert(var, id);
        id
    }

    /// Rewrites `blocks` and `error_table` into the helper's variable space
    /// and produces the function.
    pub fn finish(
        mut self,
        name: String,
        mut blocks: Vec<BasicBlock>,
        mut error_table: Vec<ErrorEntry>,
    ) -> Function {
        for block in &mut blocks {
            for instr in &mut block.instructions {
                instr.for_each_operand_mut(|var| *var = self.map(*var));
            }
            block
                .terminator
                .for_each_operand_mut(|var| *var = self.map(*var));
        }
        for entry in &mut error_table {
            entry.error = self.map(entry.error);
        }

        let args_count = self.params.len();
        Function {
            name,
            origin: FunctionOrigin::Generated,
            params: self.params,
            return_type: self.return_type,
            return_var: VarId::new(0),
            variables: self.variables,
            blocks,
            error_table,
            args_count,
        }
    }
}

/// Makes the construction at the end of an extracted region write the
/// parent's return variable, which the helper builder turns into the
/// helper's own return variable.
///
/// Returns the operand the construction originally wrote.
pub(super) fn redirect_result(
    parent: &Function,
    region: &mut [Instruction],
) -> crate::Result<VarId> {
    let last = region
        .last_mut()
        .ok_or_else(|| invariant_error!("{}: empty split region", parent.name))?;
    let dest = last
        .dest_mut()
        .ok_or_else(|| invariant_error!("{}: split region ends without a result", parent.name))?;
    let result = *dest;
    *dest = parent.return_var;
    Ok(result)
}

/// The parent-side blocks that unpack a `T|error` helper result.
///
/// ```text
///   call ──► test:  is_err = tmp is error
///                   branch is_err ? error : ok
///            error: err = <error> tmp
///                   %ret = err
///                   goto <parent return block>
///            ok:    result = <T> tmp
///                   ... the parent continues here
/// ```
pub(super) struct ErrorUnionReturn {
    /// Result operand of the call.
    pub call_result: VarId,
    /// The type-test block the call continues at.
    pub test: BasicBlock,
    /// The error-propagating block.
    pub error: BasicBlock,
    /// The block the parent continues in; starts with the cast back.
    pub ok: BasicBlock,
}

/// Builds the result-unpacking blocks for a helper returning `ty|error`
/// (or `error|()` when `result` is `None`), declaring the temporaries in
/// `parent`.
pub(super) fn error_union_return(
    parent: &mut Function,
    ctx: &mut SplitContext,
    ids: &mut crate::ir::BlockIdAllocator,
    result: Option<(VarId, IrType)>,
    return_block: BlockId,
) -> ErrorUnionReturn {
    let union = match &result {
        Some((_, ty)) => ty.clone().or_error(),
        None => IrType::error_or_nil(),
    };

    let call_result = parent.add_var(Variable::new(ctx.next_temp_name(), union, VarKind::Temp));
    let is_error = parent.add_var(Variable::new(
        ctx.next_temp_name(),
        IrType::Boolean,
        VarKind::Temp,
    ));
    let error_value = parent.add_var(Variable::new(
        ctx.next_temp_name(),
        IrType::Error,
        VarKind::Temp,
    ));

    let test_id = ids.fresh();
    let error_id = ids.fresh();
    let ok_id = ids.fresh();

    let test = BasicBlock::with(
        test_id,
        vec![Instruction::TypeTest {
            dest: is_error,
            src: call_result,
            ty: IrType::Error,
        }],
        Terminator::Branch {
            condition: is_error,
            true_target: error_id,
            false_target: ok_id,
        },
    );

    let error = BasicBlock::with(
        error_id,
        vec![
            Instruction::TypeCast {
                dest: error_value,
                src: call_result,
                ty: IrType::Error,
                checked: false,
            },
            Instruction::Move {
                dest: parent.return_var,
                src: error_value,
            },
        ],
        Terminator::Goto {
            target: return_block,
        },
    );

    let mut ok = BasicBlock::new(ok_id);
    if let Some((dest, ty)) = result {
        ok.instructions.push(Instruction::TypeCast {
            dest,
            src: call_result,
            ty,
            checked: true,
        });
    }

    ErrorUnionReturn {
        call_result,
        test,
        error,
        ok,
    }
}
