//! Compiler-pass infrastructure for the splitter.
//!
//! This module sits on top of [`crate::ir`]:
//!
//! - [`crate::ir`] - Functions, blocks, instructions, verification
//! - [`compiler`](self) - The splitting pass and what it needs to run
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                        Splitting Pipeline                         │
//! ├──────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  SplitContext                Shared state of one run             │
//! │    ├─ SplitConfig             (thresholds, argument bound)       │
//! │    ├─ name counters           ($split$method$_N, tempVar)        │
//! │    └─ EventLog                                                   │
//! │                                                                  │
//! │  ModulePass trait            Interface the compiler drives       │
//! │    └─ run_on_module()         Whole-module transformation        │
//! │                                                                  │
//! │  LargeFunctionSplitter       Work-list over oversized functions  │
//! │    ├─ candidate finder        (reverse scan, safety checks)      │
//! │    ├─ same/cross-block        (region → helper + call)           │
//! │    ├─ periodic                (literal → entry-array batches)    │
//! │    └─ repair                  (renumber, compact, cross-block)   │
//! │                                                                  │
//! │  EventLog                    Change tracking and diagnostics     │
//! │                                                                  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod context;
mod events;
mod pass;
mod split;

pub use config::SplitConfig;
pub use context::SplitContext;
pub use events::{Event, EventBuilder, EventKind, EventLog};
pub use pass::ModulePass;
pub use split::{
    apply_splits, compact_variables, find_candidates, recompute_cross_block, renumber_blocks,
    repair_function, split_periodic, GeneratedHelper, LargeFunctionSplitter, PeriodicOutcome,
    RepairSummary, RewriteTable, Split, SplitPoint, SplitReport,
};
