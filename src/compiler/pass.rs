//! Module-level pass interface.

use crate::{compiler::SplitContext, ir::Module, Result};

/// A transformation over a whole module.
///
/// Passes record what they change into `ctx.events` and report whether the
/// module changed at all.
pub trait ModulePass {
    /// Unique name for logging and debugging.
    fn name(&self) -> &'static str;

    /// Human-readable description.
    fn description(&self) -> &'static str;

    /// Runs the pass.
    ///
    /// Returns `true` if the module changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the pass produced or encountered structurally
    /// inconsistent IR; the module must then be discarded.
    fn run_on_module(&self, module: &mut Module, ctx: &mut SplitContext) -> Result<bool>;
}
