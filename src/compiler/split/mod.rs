//! Large-function splitting.
//!
//! Functions at or above [`SplitConfig::function_threshold`] instructions are
//! broken up by moving bulk-literal regions into generated helpers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                   LargeFunctionSplitter::run                      │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  work-list ◄── top-level functions, then attached functions      │
//! │      │                                                           │
//! │      ▼  (oversized only)                                         │
//! │  find_candidates ──► candidates? ──yes──► apply_splits           │
//! │                          │                  ├─ extract_in_block  │
//! │                          no                 └─ extract_cross_block│
//! │                          │                        │              │
//! │                          ▼                        │              │
//! │              list helper? ──► split_periodic      │              │
//! │                                    │              │              │
//! │                                    ▼              ▼              │
//! │                              repair_function (parent + helpers)  │
//! │                                    │                             │
//! │                 helpers appended to the module; structural       │
//! │                 helpers that are still oversized and strictly    │
//! │                 smaller than their parent go back on the list    │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`find_candidates`] - Reverse scan for regions that can move
//! - [`apply_splits`] - Rewrites a parent around its candidates
//! - [`split_periodic`] - Takes one oversized list literal apart
//! - [`repair_function`] - Renumbering, variable compaction, cross-block flags
//! - [`RewriteTable`] - Old block number to new head/tail block
//!
//! Every helper is named `$split$method$_N` from a counter in the
//! [`SplitContext`], so output is deterministic for a given input.

mod candidate;
mod crossblock;
mod extract;
mod generate;
mod inblock;
mod periodic;
mod repair;

use std::collections::VecDeque;

pub use candidate::{find_candidates, Split, SplitPoint};
pub use generate::{apply_splits, GeneratedHelper};
pub use periodic::{split_periodic, PeriodicOutcome};
pub use repair::{
    compact_variables, recompute_cross_block, renumber_blocks, repair_function, RepairSummary,
    RewriteTable,
};

use crate::{
    compiler::{EventKind, ModulePass, SplitContext},
    ir::{verify_module, ConstructionKind, Function, Module},
    Result,
};

const PASS_NAME: &str = "large-function-splitting";

/// What one run of the splitter did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplitReport {
    /// Functions rewritten around extracted regions.
    pub functions_split: usize,
    /// Helpers appended to the module.
    pub helpers_created: usize,
    /// List helpers taken apart by the periodic splitter.
    pub periodic_splits: usize,
    /// Functions still at or above the threshold after the run.
    pub oversized: Vec<String>,
}

impl SplitReport {
    /// Returns true if the run changed the module.
    #[must_use]
    pub fn changed(&self) -> bool {
        self.functions_split > 0 || self.periodic_splits > 0
    }
}

/// Where a queued function lives in the module.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Function(usize),
    Attached { type_def: usize, index: usize },
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    slot: Slot,
    attached: bool,
    /// What the helper was extracted around; `None` for source functions.
    kind: Option<ConstructionKind>,
}

fn slot_mut(module: &mut Module, slot: Slot) -> Result<&mut Function> {
    let function = match slot {
        Slot::Function(index) => module.functions.get_mut(index),
        Slot::Attached { type_def, index } => module
            .type_defs
            .get_mut(type_def)
            .and_then(|td| td.attached_functions.get_mut(index)),
    };
    function.ok_or_else(|| invariant_error!("work-list slot {:?} is out of range", slot))
}

/// Helpers produced from one function.
struct Produced {
    helpers: Vec<Function>,
    /// Parallel to `helpers`: what to queue each one as, if at all.
    requeue: Vec<Option<ConstructionKind>>,
}

/// The module pass that splits oversized functions.
///
/// # Example
///
/// ```rust
/// use irsplit::{
///     compiler::{LargeFunctionSplitter, SplitConfig, SplitContext},
///     ir::{ConstValue, FunctionBuilder, Instruction, IrType, ListEntry, Module},
/// };
///
/// let mut b = FunctionBuilder::new("main", IrType::List(Box::new(IrType::Int)));
/// let ret = b.return_var();
/// let size = b.temp(IrType::Int);
/// b.constant(size, ConstValue::Int(3));
/// let mut values = Vec::new();
/// for i in 0..3 {
///     let e = b.temp(IrType::Int);
///     b.constant(e, ConstValue::Int(i));
///     values.push(ListEntry::expr(e));
/// }
/// let list = b.temp(IrType::List(Box::new(IrType::Int)));
/// b.push(Instruction::NewArray { dest: list, ty: IrType::List(Box::new(IrType::Int)), size, values });
/// b.mov(ret, list);
///
/// let mut module = Module::new("demo");
/// module.functions.push(b.build());
///
/// let config = SplitConfig::default().with_function_threshold(6);
/// let mut ctx = SplitContext::new(config);
/// let report = LargeFunctionSplitter.run(&mut module, &mut ctx)?;
/// assert_eq!(report.helpers_created, 1);
/// assert!(module.function("$split$method$_1").is_some());
/// # Ok::<(), irsplit::Error>(())
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LargeFunctionSplitter;

impl LargeFunctionSplitter {
    /// Splits every oversized function of `module`.
    ///
    /// # Errors
    ///
    /// Returns an error if a rewrite produced inconsistent IR, or if
    /// verification is enabled and the module fails it before or after
    /// splitting. A module rejected up front is left unchanged.
    pub fn run(&self, module: &mut Module, ctx: &mut SplitContext) -> Result<SplitReport> {
        ctx.events.record(EventKind::PassStarted).pass(PASS_NAME);
        if ctx.config.verify_after_split {
            verify_module(module, ctx.config.max_split_args)?;
        }
        ctx.reserve_names(module);
        let mut report = SplitReport::default();

        let mut queue: VecDeque<Queued> = (0..module.functions.len())
            .map(|index| Queued {
                slot: Slot::Function(index),
                attached: false,
                kind: None,
            })
            .collect();
        for (type_def, td) in module.type_defs.iter().enumerate() {
            for index in 0..td.attached_functions.len() {
                queue.push_back(Queued {
                    slot: Slot::Attached { type_def, index },
                    attached: true,
                    kind: None,
                });
            }
        }

        while let Some(item) = queue.pop_front() {
            let function = slot_mut(module, item.slot)?;
            if !ctx.config.is_oversized(function.instruction_count()) {
                continue;
            }
            let Some(produced) = split_function(function, item, ctx, &mut report)? else {
                continue;
            };

            for (helper, requeue) in produced.helpers.into_iter().zip(produced.requeue) {
                report.helpers_created += 1;
                module.functions.push(helper);
                if let Some(kind) = requeue {
                    queue.push_back(Queued {
                        slot: Slot::Function(module.functions.len() - 1),
                        attached: item.attached,
                        kind: Some(kind),
                    });
                }
            }
        }

        for function in module.all_functions() {
            if ctx.config.is_oversized(function.instruction_count()) {
                ctx.events
                    .record(EventKind::StillOversized)
                    .function(function.name.clone())
                    .message(format!("{} instructions", function.instruction_count()))
                    .pass(PASS_NAME);
                report.oversized.push(function.name.clone());
            }
        }

        if ctx.config.verify_after_split {
            verify_module(module, ctx.config.max_split_args)?;
        }

        ctx.events
            .record(EventKind::PassCompleted)
            .message(format!(
                "{} functions split, {} helpers created",
                report.functions_split, report.helpers_created
            ))
            .pass(PASS_NAME);
        Ok(report)
    }
}

impl ModulePass for LargeFunctionSplitter {
    fn name(&self) -> &'static str {
        PASS_NAME
    }

    fn description(&self) -> &'static str {
        "Moves bulk-literal regions of oversized functions into generated helpers"
    }

    fn run_on_module(&self, module: &mut Module, ctx: &mut SplitContext) -> Result<bool> {
        Ok(self.run(module, ctx)?.changed())
    }
}

/// Splits one oversized function.
///
/// Returns `None` if the function was left unchanged.
fn split_function(
    function: &mut Function,
    item: Queued,
    ctx: &mut SplitContext,
    report: &mut SplitReport,
) -> Result<Option<Produced>> {
    let name = function.name.clone();
    let before = function.instruction_count();
    let entries_before = function.error_table.len();

    let splits = find_candidates(function, &ctx.config);
    let mut produced = if !splits.is_empty() {
        let regions = splits.len();
        let first_block = splits.iter().map(|s| s.start.block).min().unwrap_or(0);
        let generated = apply_splits(function, splits, item.attached, ctx)?;
        report.functions_split += 1;
        ctx.events
            .record(EventKind::FunctionSplit)
            .function(name.clone())
            .location(first_block)
            .message(format!("{regions} regions extracted"))
            .pass(PASS_NAME);
        if function.error_table.len() != entries_before {
            ctx.events
                .record(EventKind::ExceptionTableRepaired)
                .function(name.clone())
                .message(format!(
                    "{} entries moved into helpers",
                    entries_before - function.error_table.len()
                ))
                .pass(PASS_NAME);
        }

        let mut produced = Produced {
            helpers: Vec::with_capacity(generated.len()),
            requeue: Vec::with_capacity(generated.len()),
        };
        for GeneratedHelper {
            function: helper,
            split_further,
            kind,
        } in generated
        {
            let smaller = helper.instruction_count() < before;
            produced
                .requeue
                .push((split_further && smaller).then_some(kind));
            produced.helpers.push(helper);
        }
        produced
    } else if item.kind == Some(ConstructionKind::List) {
        match split_periodic(function, item.attached, ctx)? {
            PeriodicOutcome::Split(helpers) => {
                report.periodic_splits += 1;
                ctx.events
                    .record(EventKind::PeriodicSplit)
                    .function(name.clone())
                    .message(format!("{} batches", helpers.len()))
                    .pass(PASS_NAME);
                Produced {
                    requeue: vec![None; helpers.len()],
                    helpers,
                }
            }
            PeriodicOutcome::Declined(reason) => {
                ctx.events
                    .record(EventKind::Warning)
                    .function(name)
                    .message(format!("periodic split declined: {reason}"))
                    .pass(PASS_NAME);
                return Ok(None);
            }
        }
    } else {
        return Ok(None);
    };

    repair(function, ctx);
    for helper in &mut produced.helpers {
        repair(helper, ctx);
        ctx.events
            .record(EventKind::HelperCreated)
            .function(name.clone())
            .message(format!(
                "{} ({} args, {} instructions)",
                helper.name,
                helper.args_count,
                helper.instruction_count()
            ))
            .pass(PASS_NAME);
    }
    Ok(Some(produced))
}

fn repair(function: &mut Function, ctx: &SplitContext) {
    let summary = repair_function(function);
    if summary.renumbered {
        ctx.events
            .record(EventKind::BlocksRenumbered)
            .function(function.name.clone())
            .pass(PASS_NAME);
    }
    if summary.variables_removed > 0 {
        ctx.events
            .record(EventKind::VariablesCompacted)
            .function(function.name.clone())
            .message(format!("{} removed", summary.variables_removed))
            .pass(PASS_NAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compiler::SplitConfig,
        ir::{
            verify_function, BlockId, ErrorEntry, Instruction, IrType, Terminator, TypeDef, VarKind,
            Variable,
        },
        test::{
            factories::{
                attached_method, cross_block_list, error_region, list_with_calls,
                local_mutation, record_literal, straight_line_list, trapped_region,
            },
            interpreter::{Interpreter, Value},
        },
    };

    fn module_of(functions: Vec<Function>) -> Module {
        let mut module = Module::new("m");
        module.functions = functions;
        module
    }

    fn split(module: &mut Module, config: SplitConfig) -> (SplitReport, SplitContext) {
        let mut ctx = SplitContext::new(config);
        let report = LargeFunctionSplitter.run(module, &mut ctx).unwrap();
        (report, ctx)
    }

    /// Runs `name` on both modules and compares result and external calls.
    fn assert_same(before: &Module, after: &Module, name: &str, args: Vec<Value>) {
        let mut expected = Interpreter::new(before);
        let mut actual = Interpreter::new(after);
        assert_eq!(
            actual.call(name, args.clone()),
            expected.call(name, args),
            "{name}"
        );
        assert_eq!(actual.trace(), expected.trace(), "{name}");
    }

    #[test]
    fn test_small_function_is_untouched() {
        let mut module = module_of(vec![straight_line_list("main", 5)]);
        let before = module.clone();
        let (report, ctx) = split(&mut module, SplitConfig::default());
        assert_eq!(module, before);
        assert_eq!(report, SplitReport::default());
        assert!(!ctx.events.has(EventKind::FunctionSplit));
    }

    #[test]
    fn test_list_is_split_then_batched() {
        let mut module = module_of(vec![straight_line_list("main", 12)]);
        let before = module.clone();
        let (report, ctx) = split(&mut module, SplitConfig::eager());

        assert_eq!(report.functions_split, 1);
        assert_eq!(report.periodic_splits, 1);
        assert!(report.helpers_created >= 3);
        assert_eq!(report.helpers_created, module.functions.len() - 1);
        assert_eq!(
            ctx.events.count_kind(EventKind::HelperCreated),
            report.helpers_created
        );
        assert!(ctx.events.has(EventKind::PeriodicSplit));
        let first = ctx.events.filter_kind(EventKind::FunctionSplit).next().unwrap();
        assert_eq!(first.function.as_deref(), Some("main"));
        assert_eq!(first.location, Some(0));

        let main = module.function("main").unwrap();
        assert!(main.blocks.iter().any(|block| matches!(
            &block.terminator,
            Terminator::Call { callee, .. } if callee == "$split$method$_1"
        )));
        assert_same(&before, &module, "main", vec![]);
    }

    #[test]
    fn test_branches_errors_and_traps_keep_behaviour() {
        let functions = vec![
            cross_block_list("branchy"),
            error_region("failing"),
            trapped_region("trapped"),
            list_with_calls("calls", 6),
            record_literal("record", 5),
        ];
        let mut module = module_of(functions);
        let before = module.clone();
        let (report, _) = split(&mut module, SplitConfig::eager());
        assert!(report.functions_split >= 5);

        for flag in [true, false] {
            assert_same(&before, &module, "branchy", vec![Value::Boolean(flag)]);
            let failure = Value::Error("boom".to_string());
            assert_same(
                &before,
                &module,
                "failing",
                vec![Value::Boolean(flag), failure],
            );
        }
        assert_same(&before, &module, "trapped", vec![]);
        assert_same(&before, &module, "calls", vec![]);
        assert_same(&before, &module, "record", vec![]);

        for function in module.all_functions() {
            verify_function(function, 250).unwrap();
        }
    }

    #[test]
    fn test_trap_ending_inside_region_protects_the_call() {
        let mut function = cross_block_list("main");
        let err = function.add_var(Variable::new("err", IrType::Error, VarKind::Temp));
        function.error_table.push(ErrorEntry {
            trap: BlockId::new(0),
            end: BlockId::new(0),
            error: err,
            target: BlockId::new(4),
        });
        let mut module = module_of(vec![function]);
        let before = module.clone();
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        let (report, _) = split(&mut module, config);
        assert_eq!(report.functions_split, 1);

        let main = module.function("main").unwrap();
        let call = main
            .blocks
            .iter()
            .find(|block| matches!(block.terminator, Terminator::Call { .. }))
            .unwrap();
        assert_eq!(main.error_table.len(), 1);
        assert_eq!(main.error_table[0].trap, call.id);
        assert_eq!(main.error_table[0].end, call.id);
        assert_eq!(Some(main.error_table[0].target), main.return_block());
        verify_function(main, 250).unwrap();

        for flag in [true, false] {
            assert_same(&before, &module, "main", vec![Value::Boolean(flag)]);
        }
    }

    #[test]
    fn test_second_run_does_not_reuse_helper_names() {
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        let mut module = module_of(vec![straight_line_list("a", 4)]);
        split(&mut module, config.clone());
        module.functions.push(straight_line_list("b", 6));
        let before = module.clone();
        split(&mut module, config);

        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, ["a", "$split$method$_1", "b", "$split$method$_2"]);
        let b = module.function("b").unwrap();
        assert!(b.blocks.iter().any(|block| matches!(
            &block.terminator,
            Terminator::Call { callee, .. } if callee == "$split$method$_2"
        )));
        assert_same(&before, &module, "a", vec![]);
        assert_same(&before, &module, "b", vec![]);
    }

    fn scoped_local(function: &mut Function, start: usize, end: usize) {
        let mut local = Variable::new("x", IrType::Int, VarKind::Local);
        local.start_block = Some(BlockId::new(start));
        local.end_block = Some(BlockId::new(end));
        function.add_var(local);
    }

    /// Start and end markers of the `x` local.
    fn scope_of(function: &Function) -> (Option<BlockId>, Option<BlockId>) {
        let local = function.variables.iter().find(|var| var.name == "x").unwrap();
        (local.start_block, local.end_block)
    }

    /// The block holding the call and the block the call continues at.
    fn continuation_of_call(function: &Function) -> (BlockId, BlockId) {
        function
            .blocks
            .iter()
            .find_map(|block| match &block.terminator {
                Terminator::Call { then, .. } => Some((block.id, *then)),
                _ => None,
            })
            .unwrap()
    }

    #[test]
    fn test_scope_end_in_region_moves_to_continuation() {
        let mut function = cross_block_list("main");
        scoped_local(&mut function, 0, 3);
        let mut module = module_of(vec![function]);
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        split(&mut module, config);

        let main = module.function("main").unwrap();
        let (call, then) = continuation_of_call(main);
        assert_eq!(scope_of(main), (Some(call), Some(then)));
        assert!(main.block(then).unwrap().instructions.iter().any(|instr| matches!(
            instr,
            Instruction::Move { dest, .. } if *dest == main.return_var
        )));
        verify_function(main, 250).unwrap();
    }

    #[test]
    fn test_same_block_scope_keeps_its_head() {
        let mut function = straight_line_list("main", 4);
        scoped_local(&mut function, 0, 0);
        let mut module = module_of(vec![function]);
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        split(&mut module, config);

        let main = module.function("main").unwrap();
        let (call, then) = continuation_of_call(main);
        assert_eq!(call, main.blocks[0].id);
        assert_eq!(scope_of(main), (Some(call), Some(then)));
        verify_function(main, 250).unwrap();
    }

    #[test]
    fn test_local_mutation_is_not_split() {
        let mut module = module_of(vec![local_mutation("main")]);
        let count = module.functions[0].instruction_count();
        let (report, _) = split(&mut module, SplitConfig::eager());
        assert_eq!(report.functions_split, 0);
        assert_eq!(module.functions.len(), 1);
        assert_eq!(module.functions[0].instruction_count(), count);
        assert_eq!(report.oversized, vec!["main".to_string()]);
    }

    #[test]
    fn test_attached_function_helpers() {
        let mut module = Module::new("m");
        module.type_defs.push(TypeDef {
            name: "Counter".to_string(),
            attached_functions: vec![attached_method("get", 6)],
        });
        let before = module.clone();
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        let (report, _) = split(&mut module, config);

        assert_eq!(report.functions_split, 1);
        assert_eq!(module.functions.len(), 1);
        let helper = &module.functions[0];
        assert_eq!(helper.var(helper.return_var).name, "%1");
        assert_eq!(helper.params.len(), 1);
        assert_eq!(helper.kind_of(helper.params[0]), VarKind::Arg);
        assert_eq!(helper.var(helper.params[0]).name, "self");

        let fields = (0..6)
            .map(|i| (format!("x{i}"), Value::Int(i)))
            .collect();
        assert_same(&before, &module, "get", vec![Value::Record(fields)]);
    }

    #[test]
    fn test_helpers_of_attached_functions_are_batched_too() {
        let mut module = Module::new("m");
        module.type_defs.push(TypeDef {
            name: "Counter".to_string(),
            attached_functions: vec![attached_method("get", 8)],
        });
        let before = module.clone();
        let (report, _) = split(&mut module, SplitConfig::eager());
        assert_eq!(report.periodic_splits, 1);
        for helper in &module.functions {
            assert_eq!(helper.var(helper.return_var).name, "%1");
        }
        let fields = (0..8)
            .map(|i| (format!("x{i}"), Value::Int(i * 3)))
            .collect();
        assert_same(&before, &module, "get", vec![Value::Record(fields)]);
    }

    #[test]
    fn test_error_helper_returns_union() {
        let mut module = module_of(vec![error_region("main")]);
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        split(&mut module, config);
        let helper = module.function("$split$method$_1").unwrap();
        assert_eq!(
            helper.return_type,
            IrType::List(Box::new(IrType::Int)).or_error()
        );
    }

    #[test]
    fn test_declined_periodic_split_warns() {
        let mut module = module_of(vec![straight_line_list("main", 4)]);
        let config = SplitConfig::eager().with_periodic_threshold(1000);
        let (report, ctx) = split(&mut module, config);
        assert_eq!(report.periodic_splits, 0);
        assert_eq!(ctx.events.warnings().count(), 1);
        assert!(report.oversized.contains(&"$split$method$_1".to_string()));
    }

    #[test]
    fn test_module_pass_reports_change() {
        let mut module = module_of(vec![straight_line_list("main", 3)]);
        let mut ctx = SplitContext::new(SplitConfig::eager());
        assert_eq!(LargeFunctionSplitter.name(), "large-function-splitting");
        assert!(LargeFunctionSplitter
            .run_on_module(&mut module, &mut ctx)
            .unwrap());

        let mut untouched = module_of(vec![straight_line_list("main", 3)]);
        let mut ctx = SplitContext::new(SplitConfig::disabled());
        assert!(!LargeFunctionSplitter
            .run_on_module(&mut untouched, &mut ctx)
            .unwrap());
    }
}
