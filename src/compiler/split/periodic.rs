//! Splitting a helper built around one oversized list literal.
//!
//! A helper produced by extracting a list literal is all element
//! computations followed by one construction. When no structural candidate
//! is left inside it, the construction itself is taken apart: the elements
//! are stored one by one into a runtime entry array, and the element
//! computations are cut into batches that become helpers of their own.
//!
//! ```text
//!   before                               after (parent)
//!   ──────                               ──────────────
//!   bb0: %size = const 3                 bb0: %splitArraySize = const 3
//!        %t1 = ...                            %splitArray = native getListInitialValueEntryArray(%splitArraySize)
//!        %t2 = ...                            %size = const 3
//!        ...                                  call $split$method$_2(%splitArray) then bbA
//!        %0 = new [%size]{%t1, x, %t2}   bbA: call $split$method$_3(%splitArray) then bbB
//!        goto bb1                        bbB: setExpressionEntry(%splitArray, x, 1)
//!   bb1: return                               %0 = new [%size]{%splitArray}
//!                                             goto bb1
//!                                        bb1: return
//! ```
//!
//! Inside the batches, each temporary element is stored right after the last
//! instruction that references it:
//!
//! ```text
//!   %t1 = ...
//!   %arrIndex = const 0
//!   %typeCast = <any|error> %t1
//!   setExpressionEntry(%splitArray, %typeCast, %arrIndex)   <- split point
//! ```
//!
//! Elements that are not temporaries are stored by the parent just before the
//! construction. A batch is closed at a split point once it holds more than
//! the periodic threshold and closing cannot change behaviour:
//!
//! - every block an emitted jump or exception handler targets has been
//!   visited,
//! - the current block is not protected by an exception-table entry,
//! - nothing the batch defines is read after the split point.
//!
//! The splitter declines (leaving the function unchanged) when the helper
//! does not have this shape, or when an element store could be skipped on
//! some path.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::{
    compiler::{
        split::{candidate::stores_error, extract::error_union_return, extract::HelperBuilder},
        SplitContext,
    },
    ir::{
        BasicBlock, BlockId, BlockIdAllocator, ConstValue, EntryKind, ErrorEntry, Function,
        Instruction, IrType, ListEntry, NativeHelper, Terminator, VarId, VarKind, Variable,
    },
    Result,
};

const SPLIT_ARRAY: &str = "%splitArray";
const SPLIT_ARRAY_SIZE: &str = "%splitArraySize";
const ARRAY_INDEX: &str = "%arrIndex";
const TYPE_CAST: &str = "%typeCast";

/// What [`split_periodic`] did.
#[derive(Debug, Clone)]
pub enum PeriodicOutcome {
    /// The construction was taken apart into these helpers.
    Split(Vec<Function>),
    /// The function was left unchanged, for the given reason.
    Declined(&'static str),
}

/// Position in a block: `2i + 1` is instruction `i`, `2i + 2` is just after
/// it, `2n + 1` is the terminator of an `n`-instruction block and `2n + 2`
/// is after the terminator.
type Slot = (usize, usize);

fn instr_slot(pos: usize, index: usize) -> Slot {
    (pos, 2 * index + 1)
}

fn after_instr(pos: usize, index: usize) -> Slot {
    (pos, 2 * index + 2)
}

fn terminator_slot(pos: usize, len: usize) -> Slot {
    (pos, 2 * len + 1)
}

fn after_terminator(pos: usize, len: usize) -> Slot {
    (pos, 2 * len + 2)
}

/// The helper's construction.
struct Construction {
    dest: VarId,
    ty: IrType,
    size: VarId,
    values: Vec<ListEntry>,
}

/// The variables every element store uses.
#[derive(Clone, Copy)]
struct EntrySlots {
    handle: VarId,
    index: VarId,
    cast: VarId,
}

impl EntrySlots {
    fn store(&self, out: &mut Vec<Instruction>, value: VarId, kind: EntryKind, index: usize) {
        out.push(Instruction::ConstantLoad {
            dest: self.index,
            value: ConstValue::Int(index as i64),
        });
        out.push(Instruction::TypeCast {
            dest: self.cast,
            src: value,
            ty: IrType::any_or_error(),
            checked: false,
        });
        out.push(Instruction::NativeCall {
            dest: None,
            helper: NativeHelper::setter(kind),
            args: vec![self.handle, self.cast, self.index],
        });
    }
}

fn new_slots(function: &mut Function, handle: VarId) -> EntrySlots {
    let index = function.add_var(Variable::new(ARRAY_INDEX, IrType::Int, VarKind::Temp));
    let cast = function.add_var(Variable::new(
        TYPE_CAST,
        IrType::any_or_error(),
        VarKind::Temp,
    ));
    EntrySlots {
        handle,
        index,
        cast,
    }
}

enum Item {
    Original(Instruction),
    Inserted(Instruction),
    Cut(usize),
}

/// A block of the rewritten body, before it is assigned to a batch.
struct BodyBlock {
    id: BlockId,
    pos: usize,
    items: Vec<Item>,
    /// `None` for the block that held the construction.
    terminator: Option<Terminator>,
}

/// One batch being accumulated.
struct Batch {
    exit: BlockId,
    blocks: Vec<BasicBlock>,
    entered: HashSet<BlockId>,
    args: Vec<VarId>,
    defined: HashSet<VarId>,
    assigns_return: bool,
    count: usize,
}

impl Batch {
    fn new(exit: BlockId) -> Self {
        Self {
            exit,
            blocks: Vec::new(),
            entered: HashSet::new(),
            args: Vec::new(),
            defined: HashSet::new(),
            assigns_return: false,
            count: 0,
        }
    }

    fn observe(
        &mut self,
        uses: Vec<VarId>,
        dest: Option<VarId>,
        available: &HashSet<VarId>,
        ret: VarId,
    ) {
        for var in uses {
            if available.contains(&var) && !self.defined.contains(&var) && !self.args.contains(&var)
            {
                self.args.push(var);
            }
        }
        match dest {
            Some(dest) if dest == ret => self.assigns_return = true,
            Some(dest) => {
                self.defined.insert(dest);
            }
            None => {}
        }
    }

    fn close(&mut self, mut current: BasicBlock, ret: VarId) {
        current.instructions.push(Instruction::ConstantLoad {
            dest: ret,
            value: ConstValue::Nil,
        });
        current.terminator = Terminator::Goto { target: self.exit };
        self.blocks.push(current);
        self.blocks.push(BasicBlock::new(self.exit));
    }
}

fn shape(function: &Function) -> std::result::Result<(usize, Construction), &'static str> {
    let n = function.blocks.len();
    if n < 2 {
        return Err("no exit block");
    }
    let exit = &function.blocks[n - 1];
    if !exit.instructions.is_empty() || exit.terminator != Terminator::Return {
        return Err("last block is not a bare return");
    }
    let final_pos = n - 2;
    let last = &function.blocks[final_pos];
    if last.terminator != (Terminator::Goto { target: exit.id }) {
        return Err("construction block does not jump to the exit");
    }
    let construction = match last.instructions.last() {
        Some(Instruction::NewArray {
            dest,
            ty,
            size,
            values,
        }) => Construction {
            dest: *dest,
            ty: ty.clone(),
            size: *size,
            values: values.clone(),
        },
        _ => return Err("no list construction at the end"),
    };
    let first = function.blocks[0]
        .instructions
        .first()
        .and_then(Instruction::dest);
    if first != Some(construction.size) || (final_pos == 0 && last.instructions.len() < 2) {
        return Err("size is not defined by the first instruction");
    }
    Ok((final_pos, construction))
}

/// Forward edges only, no early returns, and only error stores leave early.
fn check_flow(function: &Function, final_pos: usize) -> std::result::Result<(), &'static str> {
    let positions = function.block_positions();
    let exit = function.blocks[final_pos + 1].id;

    for (pos, block) in function.blocks[..=final_pos].iter().enumerate() {
        if block.terminator == Terminator::Return {
            return Err("returns before the construction");
        }
        if block.terminator.dest() == Some(function.return_var) {
            return Err("call writes the return slot");
        }
        for target in block.terminator.successors() {
            match positions.get(&target) {
                Some(t) if *t > pos => {}
                _ => return Err("loop back-edge"),
            }
            if target == exit && pos != final_pos {
                let stores = block.instructions.last().is_some_and(|instr| {
                    instr.dest() == Some(function.return_var) && stores_error(function, instr)
                });
                if !stores {
                    return Err("leaves early without an error");
                }
            }
        }
    }

    for entry in &function.error_table {
        let (Some(trap), Some(end), Some(target)) = (
            positions.get(&entry.trap),
            positions.get(&entry.end),
            positions.get(&entry.target),
        ) else {
            return Err("exception entry names an unknown block");
        };
        if trap > end || target <= end || *target > final_pos {
            return Err("exception handler precedes its range");
        }
    }
    Ok(())
}

fn covered_positions(function: &Function) -> HashSet<usize> {
    let positions = function.block_positions();
    let mut covered = HashSet::new();
    for entry in &function.error_table {
        if let (Some(trap), Some(end)) = (positions.get(&entry.trap), positions.get(&entry.end)) {
            covered.extend(*trap..=*end);
        }
    }
    covered
}

/// Blocks on every path from the entry to `final_pos`, exception edges
/// included. Edges are all forward, so layout order is a topological order.
fn must_pass(function: &Function, final_pos: usize) -> BTreeSet<usize> {
    let positions = function.block_positions();
    let mut preds: Vec<Vec<usize>> = vec![Vec::new(); final_pos + 1];
    for (pos, block) in function.blocks[..=final_pos].iter().enumerate() {
        for target in block.terminator.successors() {
            if let Some(t) = positions.get(&target).filter(|t| **t <= final_pos) {
                preds[*t].push(pos);
            }
        }
    }
    for entry in &function.error_table {
        if let (Some(trap), Some(end), Some(target)) = (
            positions.get(&entry.trap),
            positions.get(&entry.end),
            positions.get(&entry.target),
        ) {
            if *target <= final_pos {
                for pos in *trap..=*end {
                    preds[*target].push(pos);
                }
            }
        }
    }

    let mut dom: Vec<Option<BTreeSet<usize>>> = vec![None; final_pos + 1];
    dom[0] = Some(BTreeSet::from([0]));
    for pos in 1..=final_pos {
        let mut incoming = preds[pos].iter().filter_map(|p| dom[*p].as_ref());
        let Some(first) = incoming.next() else {
            continue;
        };
        let mut set = first.clone();
        for other in incoming {
            set = set.intersection(other).copied().collect();
        }
        set.insert(pos);
        dom[pos] = Some(set);
    }
    dom[final_pos].take().unwrap_or_default()
}

/// Where a deferred element is stored.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum StorePoint {
    /// After an instruction, or before a terminator that only reads it.
    Inline(Slot),
    /// In a new block after the call terminator that defines it.
    AfterCall(Slot),
}

impl StorePoint {
    fn slot(self) -> Slot {
        match self {
            StorePoint::Inline(slot) | StorePoint::AfterCall(slot) => slot,
        }
    }
}

/// Scans the body once for the facts the batching needs.
struct BodyFacts {
    store_points: HashMap<VarId, StorePoint>,
    last_read: HashMap<VarId, Slot>,
    written: HashSet<VarId>,
}

fn body_facts(
    function: &Function,
    final_pos: usize,
    deferred: &BTreeMap<VarId, Vec<(EntryKind, usize)>>,
) -> BodyFacts {
    let mut facts = BodyFacts {
        store_points: HashMap::new(),
        last_read: HashMap::new(),
        written: HashSet::new(),
    };

    for (pos, block) in function.blocks[..=final_pos].iter().enumerate() {
        let len = block.instructions.len();
        for (index, instr) in block.instructions.iter().enumerate() {
            if pos == 0 && index == 0 {
                continue;
            }
            if pos == final_pos && index + 1 == len {
                continue;
            }
            for var in instr.uses() {
                facts.last_read.insert(var, instr_slot(pos, index));
                if deferred.contains_key(&var) {
                    facts
                        .store_points
                        .insert(var, StorePoint::Inline(after_instr(pos, index)));
                }
            }
            if let Some(dest) = instr.dest() {
                facts.written.insert(dest);
                if deferred.contains_key(&dest) {
                    facts
                        .store_points
                        .insert(dest, StorePoint::Inline(after_instr(pos, index)));
                }
            }
        }

        let before_terminator = (pos, 2 * len);
        for var in block.terminator.uses() {
            facts.last_read.insert(var, terminator_slot(pos, len));
            if deferred.contains_key(&var) {
                facts
                    .store_points
                    .insert(var, StorePoint::Inline(before_terminator));
            }
        }
        if let Some(dest) = block.terminator.dest() {
            facts.written.insert(dest);
            if deferred.contains_key(&dest) {
                facts
                    .store_points
                    .insert(dest, StorePoint::AfterCall(after_terminator(pos, len)));
            }
        }
    }
    facts
}

/// Takes the list construction of `function` apart into batches.
///
/// # Errors
///
/// Returns an error if the rewrite produced inconsistent IR.
pub fn split_periodic(
    function: &mut Function,
    attached: bool,
    ctx: &mut SplitContext,
) -> Result<PeriodicOutcome> {
    let (final_pos, construction) = match shape(function) {
        Ok(found) => found,
        Err(reason) => return Ok(PeriodicOutcome::Declined(reason)),
    };
    if let Err(reason) = check_flow(function, final_pos) {
        return Ok(PeriodicOutcome::Declined(reason));
    }
    if function.params.len() + 2 > ctx.config.max_split_args {
        return Ok(PeriodicOutcome::Declined("too many parameters"));
    }

    let ret = function.return_var;
    let mut deferred: BTreeMap<VarId, Vec<(EntryKind, usize)>> = BTreeMap::new();
    let mut eager: Vec<(EntryKind, usize, VarId)> = Vec::new();
    for (index, entry) in construction.values.iter().enumerate() {
        let var = entry.value;
        if function.kind_of(var).is_temporary() && var != construction.size && var != ret {
            deferred.entry(var).or_default().push((entry.kind, index));
        } else {
            eager.push((entry.kind, index, var));
        }
    }

    let facts = body_facts(function, final_pos, &deferred);
    if facts.written.contains(&construction.size)
        || eager.iter().any(|(_, _, var)| facts.written.contains(var))
    {
        return Ok(PeriodicOutcome::Declined("element written after it is read"));
    }
    let covered = covered_positions(function);
    let required = must_pass(function, final_pos);
    for var in deferred.keys() {
        let Some(point) = facts.store_points.get(var) else {
            return Ok(PeriodicOutcome::Declined("element never computed"));
        };
        let pos = point.slot().0;
        if !required.contains(&pos) || covered.contains(&pos) {
            return Ok(PeriodicOutcome::Declined("element stored on a conditional path"));
        }
    }

    let checkpoint = function.variables.len();
    let mut ids = BlockIdAllocator::for_function(function);
    let handle = function.add_var(Variable::new(SPLIT_ARRAY, IrType::Handle, VarKind::Temp));
    let size_copy = function.add_var(Variable::new(SPLIT_ARRAY_SIZE, IrType::Int, VarKind::Temp));

    let mut points: BTreeMap<StorePoint, Vec<VarId>> = BTreeMap::new();
    for (var, point) in &facts.store_points {
        if deferred.contains_key(var) {
            points.entry(*point).or_default().push(*var);
        }
    }
    let mut stores: HashMap<Slot, (bool, Vec<Instruction>)> = HashMap::new();
    for (point, vars) in &mut points {
        vars.sort_unstable();
        let slots = new_slots(function, handle);
        let mut out = Vec::new();
        for var in vars.iter() {
            for (kind, index) in &deferred[var] {
                slots.store(&mut out, *var, *kind, *index);
            }
        }
        let after_call = matches!(point, StorePoint::AfterCall(_));
        stores.insert(point.slot(), (after_call, out));
    }

    let original = function.blocks.clone();
    let entry_id = original[0].id;
    let exit_block = original[final_pos + 1].clone();
    let mut prologue = None;
    let mut final_terminator = None;
    let mut body = Vec::with_capacity(final_pos + 1 + stores.len());

    for (pos, block) in original.into_iter().enumerate().take(final_pos + 1) {
        let len = block.instructions.len();
        let mut items = Vec::with_capacity(len);
        if let Some((false, out)) = stores.remove(&(pos, 0)) {
            items.extend(out.into_iter().map(Item::Inserted));
            items.push(Item::Cut(0));
        }
        for (index, instr) in block.instructions.into_iter().enumerate() {
            if pos == 0 && index == 0 {
                prologue = Some(instr);
            } else if !(pos == final_pos && index + 1 == len) {
                items.push(Item::Original(instr));
            }
            let slot = after_instr(pos, index);
            if let Some((false, out)) = stores.remove(&slot) {
                items.extend(out.into_iter().map(Item::Inserted));
                items.push(Item::Cut(slot.1));
            }
        }

        if pos == final_pos {
            final_terminator = Some(block.terminator);
            body.push(BodyBlock {
                id: block.id,
                pos,
                items,
                terminator: None,
            });
            continue;
        }

        let slot = after_terminator(pos, len);
        match stores.remove(&slot) {
            Some((true, out)) => {
                let continuation = ids.fresh();
                let mut terminator = block.terminator;
                let then = match &mut terminator {
                    Terminator::Call { then, .. } => std::mem::replace(then, continuation),
                    other => {
                        return Err(invariant_error!(
                            "{}: element defined by non-call terminator {}",
                            function.name,
                            other
                        ))
                    }
                };
                body.push(BodyBlock {
                    id: block.id,
                    pos,
                    items,
                    terminator: Some(terminator),
                });
                let mut inserted: Vec<Item> = out.into_iter().map(Item::Inserted).collect();
                inserted.push(Item::Cut(slot.1));
                body.push(BodyBlock {
                    id: continuation,
                    pos,
                    items: inserted,
                    terminator: Some(Terminator::Goto { target: then }),
                });
            }
            _ => body.push(BodyBlock {
                id: block.id,
                pos,
                items,
                terminator: Some(block.terminator),
            }),
        }
    }

    if !stores.is_empty() {
        return Err(invariant_error!(
            "{}: {} element stores were not placed",
            function.name,
            stores.len()
        ));
    }
    let prologue =
        prologue.ok_or_else(|| invariant_error!("{}: missing size definition", function.name))?;
    let final_terminator = final_terminator
        .ok_or_else(|| invariant_error!("{}: missing construction block", function.name))?;

    let batches = batch(
        function,
        body,
        &mut ids,
        ctx.config.periodic_threshold,
        &facts.last_read,
        &covered,
        [construction.size, handle],
        exit_block.id,
    )?;
    if batches.len() < 2 {
        function.variables.truncate(checkpoint);
        return Ok(PeriodicOutcome::Declined("no split point past the threshold"));
    }

    let mut helpers = Vec::with_capacity(batches.len());
    let mut calls = Vec::with_capacity(batches.len());
    for batch in batches {
        let entries: Vec<ErrorEntry> = function
            .error_table
            .iter()
            .filter(|entry| batch.entered.contains(&entry.trap))
            .copied()
            .collect();
        let return_type = if batch.assigns_return {
            IrType::error_or_nil()
        } else {
            IrType::Nil
        };
        let helper = HelperBuilder::new(function, attached, return_type)
            .with_params(&batch.args)
            .finish(ctx.next_function_name(), batch.blocks, entries);
        calls.push((helper.name.clone(), batch.args, batch.assigns_return));
        helpers.push(helper);
    }

    let mut layout = Vec::with_capacity(calls.len() * 4 + 2);
    let mut current = BasicBlock::new(entry_id);
    current.instructions.push(Instruction::ConstantLoad {
        dest: size_copy,
        value: ConstValue::Int(construction.values.len() as i64),
    });
    current.instructions.push(Instruction::NativeCall {
        dest: Some(handle),
        helper: NativeHelper::AllocEntryArray,
        args: vec![size_copy],
    });
    current.instructions.push(prologue);

    for (callee, args, assigns_return) in calls {
        if assigns_return {
            let unpack = error_union_return(function, ctx, &mut ids, None, exit_block.id);
            current.terminator = Terminator::Call {
                callee,
                args,
                dest: Some(unpack.call_result),
                then: unpack.test.id,
            };
            layout.push(std::mem::replace(&mut current, unpack.ok));
            layout.push(unpack.test);
            layout.push(unpack.error);
        } else {
            let next = ids.fresh();
            current.terminator = Terminator::Call {
                callee,
                args,
                dest: None,
                then: next,
            };
            layout.push(std::mem::replace(&mut current, BasicBlock::new(next)));
        }
    }

    if !eager.is_empty() {
        let slots = new_slots(function, handle);
        for (kind, index, var) in &eager {
            slots.store(&mut current.instructions, *var, *kind, *index);
        }
    }
    current.instructions.push(Instruction::NewLargeArray {
        dest: construction.dest,
        ty: construction.ty,
        size: construction.size,
        handle,
    });
    current.terminator = final_terminator;
    layout.push(current);
    layout.push(exit_block);

    function.blocks = layout;
    function.error_table.clear();
    let kept: HashSet<BlockId> = function.blocks.iter().map(|block| block.id).collect();
    for variable in &mut function.variables {
        if variable.start_block.is_some_and(|b| !kept.contains(&b))
            || variable.end_block.is_some_and(|b| !kept.contains(&b))
        {
            variable.start_block = None;
            variable.end_block = None;
        }
    }

    Ok(PeriodicOutcome::Split(helpers))
}

/// Walks the body forward and cuts it into batches.
#[allow(clippy::too_many_arguments)]
fn batch(
    function: &Function,
    body: Vec<BodyBlock>,
    ids: &mut BlockIdAllocator,
    threshold: usize,
    last_read: &HashMap<VarId, Slot>,
    covered: &HashSet<usize>,
    prologue_defined: [VarId; 2],
    exit: BlockId,
) -> Result<Vec<Batch>> {
    let ret = function.return_var;
    let mut available: HashSet<VarId> = function.params.iter().copied().collect();
    available.extend(prologue_defined);

    let mut trap_targets: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for entry in &function.error_table {
        trap_targets.entry(entry.trap).or_default().push(entry.target);
    }

    let mut batches = Vec::new();
    let mut batch = Batch::new(ids.fresh());
    let mut pending: HashSet<BlockId> = HashSet::new();
    let mut last_block = None;

    for block in body {
        pending.remove(&block.id);
        if let Some(targets) = trap_targets.get(&block.id) {
            pending.extend(targets.iter().copied());
        }
        batch.entered.insert(block.id);
        let mut current = BasicBlock::new(block.id);

        for item in block.items {
            match item {
                Item::Original(instr) => {
                    batch.observe(instr.uses(), instr.dest(), &available, ret);
                    batch.count += 1;
                    current.instructions.push(instr);
                }
                Item::Inserted(instr) => {
                    batch.observe(instr.uses(), instr.dest(), &available, ret);
                    current.instructions.push(instr);
                }
                Item::Cut(slot) => {
                    let here = (block.pos, slot);
                    let live = batch
                        .defined
                        .iter()
                        .any(|var| last_read.get(var).is_some_and(|read| *read > here));
                    if batch.count > threshold
                        && pending.is_empty()
                        && !covered.contains(&block.pos)
                        && !live
                    {
                        let next = ids.fresh();
                        let done = std::mem::replace(&mut current, BasicBlock::new(next));
                        batch.close(done, ret);
                        batches.push(std::mem::replace(&mut batch, Batch::new(ids.fresh())));
                    }
                }
            }
        }

        match block.terminator {
            Some(mut terminator) => {
                let batch_exit = batch.exit;
                terminator.retarget(|target| if target == exit { batch_exit } else { target });
                batch.observe(terminator.uses(), terminator.dest(), &available, ret);
                batch.count += 1;
                pending.extend(
                    terminator
                        .successors()
                        .into_iter()
                        .filter(|target| *target != batch_exit),
                );
                current.terminator = terminator;
                batch.blocks.push(current);
            }
            None => last_block = Some(current),
        }
    }

    let current = last_block
        .ok_or_else(|| invariant_error!("{}: body has no construction block", function.name))?;
    if !pending.is_empty() {
        return Err(invariant_error!(
            "{}: {} jump targets never reached",
            function.name,
            pending.len()
        ));
    }
    // the last cut fell right before the construction
    if batch.blocks.is_empty() && current.instructions.is_empty() && !batches.is_empty() {
        return Ok(batches);
    }
    batch.close(current, ret);
    batches.push(batch);
    Ok(batches)
}
