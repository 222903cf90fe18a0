//! Structural verification of functions and modules.
//!
//! These are the consistency guarantees the code emitter relies on:
//!
//! - block numbers are unique within a function,
//! - every terminator successor names a block of the function,
//! - every exception-table entry's trap, end and target name blocks of the
//!   function,
//! - every operand indexes the function's variable table,
//! - every scope marker names a block of the function,
//! - generated functions stay within the argument bound,
//! - top-level function names are unique within a module.
//!
//! The splitter runs the verifier after rewriting each function; any failure
//! there is a splitter defect and is reported as an [`Error`].

use std::collections::HashSet;

use rayon::prelude::*;

use crate::{
    ir::{BlockId, Function, FunctionOrigin, Module},
    Error, Result,
};

/// Checks the structural invariants of one function.
///
/// `max_args` bounds the argument count of generated functions; source
/// functions are not bounded.
///
/// # Errors
///
/// Returns the first violated invariant.
pub fn verify_function(function: &Function, max_args: usize) -> Result<()> {
    let mut ids = HashSet::with_capacity(function.blocks.len());
    for block in &function.blocks {
        if !ids.insert(block.id) {
            return Err(Error::DuplicateBlock {
                function: function.name.clone(),
                block: block.id,
            });
        }
    }

    let known = |block: BlockId| -> Result<()> {
        if ids.contains(&block) {
            Ok(())
        } else {
            Err(Error::UnknownBlock {
                function: function.name.clone(),
                block,
            })
        }
    };

    for block in &function.blocks {
        for target in block.terminator.successors() {
            known(target)?;
        }
    }

    for entry in &function.error_table {
        known(entry.trap)?;
        known(entry.end)?;
        known(entry.target)?;
    }

    let declared = function.variables.len();
    let params = function.params.iter().copied();
    for var in function
        .referenced_vars()
        .chain(params)
        .chain(std::iter::once(function.return_var))
    {
        if var.index() >= declared {
            return Err(Error::UnknownVariable {
                function: function.name.clone(),
                var,
            });
        }
    }

    for (index, variable) in function.variables.iter().enumerate() {
        for marker in [variable.start_block, variable.end_block].into_iter().flatten() {
            if !ids.contains(&marker) {
                return Err(Error::BadScope {
                    function: function.name.clone(),
                    var: crate::ir::VarId::new(index),
                    block: marker,
                });
            }
        }
    }

    if function.origin == FunctionOrigin::Generated && function.args_count > max_args {
        return Err(Error::TooManyArguments {
            function: function.name.clone(),
            count: function.args_count,
            max: max_args,
        });
    }

    Ok(())
}

/// Verifies every function of a module in parallel.
///
/// Calls resolve by name, so top-level names must be unique. Attached
/// functions of different types may share a name.
///
/// # Errors
///
/// Returns a duplicate top-level name, or a violated invariant of some
/// function.
pub fn verify_module(module: &Module, max_args: usize) -> Result<()> {
    let mut names = HashSet::with_capacity(module.functions.len());
    for function in &module.functions {
        if !names.insert(function.name.as_str()) {
            return Err(Error::DuplicateFunction {
                module: module.name.clone(),
                function: function.name.clone(),
            });
        }
    }

    let functions: Vec<&Function> = module.all_functions().collect();
    functions
        .par_iter()
        .try_for_each(|function| verify_function(function, max_args))
}
