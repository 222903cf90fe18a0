//! Finding regions of a function that can move into a helper.
//!
//! The finder scans a function tail to head. A bulk construction (a list or
//! record literal) opens a region; the region closes at the instruction that
//! defines the construction's boundary operand (the list size or the record
//! type descriptor), because every instruction between that definition and
//! the construction computes the literal's members.
//!
//! ```text
//!   bb3:  %t0 = const 4                 <- boundary defined: region closes
//!         %t1 = const "a"
//!         %t2 = x + 1                   <- x needed: becomes a helper ARG
//!         goto bb4
//!   bb4:  %t3 = new [%t0]{%t1, %t2, y}  <- construction: region opens
//!         ...
//! ```
//!
//! A closed region is a candidate only if moving it cannot change behaviour:
//!
//! - no `LOCAL` is written inside it,
//! - nothing defined inside it (except the construction's result) is read
//!   after it,
//! - control enters it only at its first instruction and leaves it only after
//!   the construction (blocks that store an error into the return slot and
//!   jump to the return block excepted),
//! - every exception-table entry either lies wholly inside it, or starts
//!   ahead of it, or does not touch it; an entry that starts ahead of it and
//!   ends inside it is cut back to the block holding the call,
//! - its argument count and size are within the configured bounds.
//!
//! Rejections are silent; zero candidates is a normal outcome.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::{
    compiler::SplitConfig,
    ir::{ConstructionKind, Function, Instruction, IrType, Terminator, VarId, VarKind},
};

/// Position of an instruction: block layout position and index within the
/// block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SplitPoint {
    /// Layout position of the block.
    pub block: usize,
    /// Index of the instruction within the block.
    pub instr: usize,
}

impl SplitPoint {
    /// Creates a position.
    #[must_use]
    pub const fn new(block: usize, instr: usize) -> Self {
        Self { block, instr }
    }
}

/// A region accepted for extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    /// The instruction defining the boundary operand.
    pub start: SplitPoint,
    /// The construction.
    pub end: SplitPoint,
    /// Operands the helper takes, in ascending operand order.
    pub args: Vec<VarId>,
    /// Temporaries defined inside the region.
    pub owned: Vec<VarId>,
    /// Indexes of the exception-table entries that move with the region.
    pub error_entries: Vec<usize>,
    /// Whether the helper will itself be over the function threshold.
    pub split_further: bool,
    /// What the construction builds.
    pub kind: ConstructionKind,
    /// Whether the region stores into the function's return slot.
    pub assigns_return: bool,
    /// Instructions in the region, terminators included.
    pub size: usize,
}

impl Split {
    /// Returns true if the region lies within one block.
    #[must_use]
    pub fn is_same_block(&self) -> bool {
        self.start.block == self.end.block
    }
}

/// A region being scanned.
struct OpenSplit {
    end: SplitPoint,
    boundary: VarId,
    kind: ConstructionKind,
    result: Option<VarId>,
    needed: HashSet<VarId>,
    defined: HashSet<VarId>,
    owned: BTreeSet<VarId>,
    reads: HashMap<VarId, usize>,
    count: usize,
}

impl OpenSplit {
    fn new(end: SplitPoint, instr: &Instruction, boundary: VarId, kind: ConstructionKind) -> Self {
        Self {
            end,
            boundary,
            kind,
            result: instr.dest(),
            needed: HashSet::new(),
            defined: HashSet::new(),
            owned: BTreeSet::new(),
            reads: HashMap::new(),
            count: 0,
        }
    }

    fn define(&mut self, function: &Function, var: VarId) {
        let variable = function.var(var);
        if variable.kind == VarKind::Receiver {
            self.needed.insert(var);
            return;
        }
        self.needed.remove(&var);
        self.defined.insert(var);
        if variable.kind.is_temporary() {
            self.owned.insert(var);
        }
    }

    fn read(&mut self, function: &Function, uses: impl IntoIterator<Item = VarId>) {
        for var in uses {
            *self.reads.entry(var).or_default() += 1;
            if function.var(var).needs_passing() {
                self.needed.insert(var);
            }
        }
    }
}

/// Counts every read of every operand in the function.
fn count_reads(function: &Function) -> HashMap<VarId, usize> {
    let mut reads: HashMap<VarId, usize> = HashMap::new();
    for block in &function.blocks {
        let uses = block
            .instructions
            .iter()
            .flat_map(Instruction::uses)
            .chain(block.terminator.uses());
        for var in uses {
            *reads.entry(var).or_default() += 1;
        }
    }
    reads
}

fn is_local(function: &Function, var: VarId) -> bool {
    function.kind_of(var) == VarKind::Local
}

/// A generated helper built around one construction would be extracted
/// whole again; such constructions never open a region.
fn spans_whole_function(function: &Function, pos: usize, boundary: VarId) -> bool {
    function.is_split_function()
        && pos + 2 == function.blocks.len()
        && function
            .blocks
            .first()
            .and_then(|entry| entry.instructions.first())
            .and_then(Instruction::dest)
            == Some(boundary)
}

/// Finds every candidate of `function`, in ascending layout order.
///
/// Candidates never overlap.
#[must_use]
pub fn find_candidates(function: &Function, config: &SplitConfig) -> Vec<Split> {
    let total_reads = count_reads(function);
    let mut found = Vec::new();
    let mut open: Option<OpenSplit> = None;

    for (pos, block) in function.blocks.iter().enumerate().rev() {
        if let Some(mut region) = open.take() {
            let dest = block.terminator.dest();
            if !dest.is_some_and(|dest| is_local(function, dest)) {
                region.count += 1;
                if let Some(dest) = dest {
                    region.define(function, dest);
                }
                region.read(function, block.terminator.uses());
                open = Some(region);
            }
        }

        for (index, instr) in block.instructions.iter().enumerate().rev() {
            let dest = instr.dest();
            if open.is_some() && dest.is_some_and(|dest| is_local(function, dest)) {
                open = None;
            }

            if let Some(mut region) = open.take() {
                region.count += 1;
                if let Some(dest) = dest {
                    region.define(function, dest);
                }
                region.read(function, instr.uses());

                if dest == Some(region.boundary) {
                    let start = SplitPoint::new(pos, index);
                    if let Some(split) = close(function, config, &total_reads, region, start) {
                        found.push(split);
                    }
                } else {
                    open = Some(region);
                }
                continue;
            }

            if let Some((boundary, kind)) = instr.construction() {
                if spans_whole_function(function, pos, boundary) {
                    continue;
                }
                let mut region =
                    OpenSplit::new(SplitPoint::new(pos, index), instr, boundary, kind);
                region.count = 1;
                region.read(function, instr.uses());
                open = Some(region);
            }
        }
    }

    found.reverse();
    found
}

/// Validates a region whose boundary definition was just reached.
fn close(
    function: &Function,
    config: &SplitConfig,
    total_reads: &HashMap<VarId, usize>,
    region: OpenSplit,
    start: SplitPoint,
) -> Option<Split> {
    let end = region.end;
    let args: BTreeSet<VarId> = region.needed.iter().copied().collect();
    if args.len() > config.max_split_args || region.count < config.min_split_instructions {
        return None;
    }

    for var in &region.defined {
        if Some(*var) == region.result || *var == function.return_var {
            continue;
        }
        let inside = region.reads.get(var).copied().unwrap_or(0);
        if total_reads.get(var).copied().unwrap_or(0) > inside {
            return None;
        }
    }

    let assigns_return = check_return_stores(function, start, end)?;
    if assigns_return && start.block == end.block {
        return None;
    }
    if start.block != end.block && !check_control_flow(function, start, end) {
        return None;
    }
    let error_entries = check_error_table(function, start, end)?;

    Some(Split {
        start,
        end,
        args: args.into_iter().collect(),
        owned: region.owned.into_iter().collect(),
        error_entries,
        split_further: config.is_oversized(region.count),
        kind: region.kind,
        assigns_return,
        size: region.count,
    })
}

/// Iterates over the region's instructions with their positions.
fn region_instructions(
    function: &Function,
    start: SplitPoint,
    end: SplitPoint,
) -> impl Iterator<Item = (SplitPoint, &Instruction)> {
    function.blocks[start.block..=end.block]
        .iter()
        .enumerate()
        .flat_map(move |(offset, block)| {
            let pos = start.block + offset;
            block
                .instructions
                .iter()
                .enumerate()
                .map(move |(index, instr)| (SplitPoint::new(pos, index), instr))
        })
        .filter(move |(point, _)| *point >= start && *point <= end)
}

pub(super) fn stores_error(function: &Function, instr: &Instruction) -> bool {
    match instr {
        Instruction::Move { src, .. } => function.var(*src).ty.is_error(),
        Instruction::TypeCast { ty, .. } => *ty == IrType::Error,
        _ => false,
    }
}

/// Checks every store into the return slot inside the region.
///
/// Returns `Some(true)` if there is at least one valid store, `Some(false)`
/// if there is none, and `None` if a store cannot be moved: it must store an
/// error, be the last instruction of its block, and that block must jump to
/// the function's return block.
fn check_return_stores(function: &Function, start: SplitPoint, end: SplitPoint) -> Option<bool> {
    let return_block = function.return_block();
    let positions = function.block_positions();
    let mut assigns = false;

    for (point, instr) in region_instructions(function, start, end) {
        if point == end || instr.dest() != Some(function.return_var) {
            continue;
        }
        let block = &function.blocks[point.block];
        if !stores_error(function, instr) || point.instr + 1 != block.instructions.len() {
            return None;
        }
        let return_block = return_block?;
        match block.terminator {
            Terminator::Goto { target } if target == return_block => {}
            _ => return None,
        }
        let return_pos = positions.get(&return_block).copied()?;
        if (start.block..=end.block).contains(&return_pos) {
            return None;
        }
        assigns = true;
    }

    for block in &function.blocks[start.block..end.block] {
        if block.terminator.dest() == Some(function.return_var) {
            return None;
        }
    }

    Some(assigns)
}

/// Single entry, single exit: terminators of the region target moved blocks
/// or the end block, nothing outside the region jumps into it, and nothing in
/// it returns.
fn check_control_flow(function: &Function, start: SplitPoint, end: SplitPoint) -> bool {
    let positions = function.block_positions();
    let moved = (start.block + 1)..=end.block;

    for pos in start.block..end.block {
        let block = &function.blocks[pos];
        if matches!(block.terminator, Terminator::Return) {
            return false;
        }
        let stores_return = block
            .instructions
            .last()
            .and_then(Instruction::dest)
            .is_some_and(|dest| dest == function.return_var);
        if stores_return {
            continue;
        }
        for target in block.terminator.successors() {
            match positions.get(&target) {
                Some(target) if moved.contains(target) => {}
                _ => return false,
            }
        }
    }

    for (pos, block) in function.blocks.iter().enumerate() {
        if (start.block..end.block).contains(&pos) {
            continue;
        }
        for target in block.terminator.successors() {
            if positions.get(&target).is_some_and(|target| moved.contains(target)) {
                return false;
            }
        }
    }

    true
}

/// Classifies the exception-table entries against the region.
///
/// Returns the indexes of the entries that move with the region, or `None`
/// if some entry starts inside the region and ends past it, or its handler
/// would move. Entries that start ahead of the region and end inside it stay
/// in the parent; the rewrite table ends them at the call block.
fn check_error_table(function: &Function, start: SplitPoint, end: SplitPoint) -> Option<Vec<usize>> {
    let positions = function.block_positions();
    let mut captured = Vec::new();
    let (first, last) = (start.block, end.block);

    for (index, entry) in function.error_table.iter().enumerate() {
        let trap = *positions.get(&entry.trap)?;
        let until = *positions.get(&entry.end)?;
        let target = *positions.get(&entry.target)?;

        if first == last {
            continue;
        }

        let moved = (first + 1)..=last;
        if trap > first && trap < last {
            if !moved.contains(&until) || !moved.contains(&target) {
                return None;
            }
            captured.push(index);
            continue;
        }
        if trap == last || moved.contains(&target) {
            return None;
        }
    }

    Some(captured)
}
