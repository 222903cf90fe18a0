// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]

//! # irsplit
//!
//! Splits oversized functions of a compiler IR into generated helper
//! functions, so that every function stays under the size limit of the code
//! emitter while the program's observable behaviour (return values,
//! propagated errors and the order of side effects) stays the same.
//!
//! ## Features
//!
//! - **Region extraction** - List and record literals, together with the
//!   code computing their members, move into helpers; regions may span
//!   branches and carry their exception-table entries with them
//! - **Error propagation** - Regions that can produce an error return
//!   `T|error`; the caller tests the result and propagates it
//! - **Periodic splitting** - A single oversized list literal is assembled
//!   through a runtime entry array, its element computations cut into
//!   batches
//! - **Consistent output** - Block numbers, exception tables, scope markers
//!   and variable tables are repaired and verified after every split
//!
//! ## Quick Start
//!
//! ```rust
//! use irsplit::prelude::*;
//!
//! let mut b = FunctionBuilder::new("main", IrType::Nil);
//! let size = b.temp(IrType::Int);
//! b.constant(size, ConstValue::Int(2));
//! let (x, y) = (b.temp(IrType::Int), b.temp(IrType::Int));
//! b.constant(x, ConstValue::Int(1));
//! b.constant(y, ConstValue::Int(2));
//! let list = b.temp(IrType::List(Box::new(IrType::Int)));
//! b.push(Instruction::NewArray {
//!     dest: list,
//!     ty: IrType::List(Box::new(IrType::Int)),
//!     size,
//!     values: vec![ListEntry::expr(x), ListEntry::expr(y)],
//! });
//!
//! let mut module = Module::new("demo");
//! module.functions.push(b.build());
//!
//! let report = split_module(&mut module, SplitConfig::default().with_function_threshold(4))?;
//! assert_eq!(report.helpers_created, 1);
//! assert_eq!(module.functions[1].name, "$split$method$_1");
//! # Ok::<(), irsplit::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`ir`] - Functions, blocks, instructions, the builder and the verifier
//! - [`compiler`] - The splitting pass, its configuration, context and events
//! - [`prelude`] - Convenient re-exports of commonly used types
//! - [`Error`] and [`Result`] - Error handling
//!
//! ## Error Handling
//!
//! Rejecting a candidate region is routine and silent. Every [`Error`] the
//! crate returns means the IR is structurally inconsistent, either as handed
//! in or as produced by a rewrite; the module must be discarded.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

pub mod compiler;
pub mod ir;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use irsplit::prelude::*;
///
/// let mut module = Module::new("empty");
/// let report = split_module(&mut module, SplitConfig::default())?;
/// assert!(report.oversized.is_empty());
/// # Ok::<(), irsplit::Error>(())
/// ```
pub mod prelude;

/// `irsplit` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `irsplit` Error type
///
/// The main error type for all operations in this crate. Every variant
/// describes structurally inconsistent IR.
pub use error::Error;

pub use compiler::{LargeFunctionSplitter, SplitConfig, SplitContext, SplitReport};

/// Splits every oversized function of `module` with a fresh [`SplitContext`].
///
/// Helpers are appended to `module.functions`. Use [`LargeFunctionSplitter`]
/// directly to share one context (and its name counters and event log)
/// across several modules.
///
/// # Errors
///
/// Returns an error if the module is structurally inconsistent, either as
/// given or after splitting. Both checks run only while
/// [`SplitConfig::verify_after_split`] is set; an inconsistent input is
/// rejected before any function is rewritten.
pub fn split_module(module: &mut ir::Module, config: SplitConfig) -> Result<SplitReport> {
    let mut ctx = SplitContext::new(config);
    LargeFunctionSplitter.run(module, &mut ctx)
}
