use thiserror::Error;

use crate::ir::{BlockId, VarId};

macro_rules! invariant_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::InvariantViolation {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::InvariantViolation {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Inputs to the splitter are machine-generated IR, so there is no "invalid
/// program" category: every variant describes a structural inconsistency,
/// either in the IR handed to the splitter or in IR the splitter produced.
/// Callers are expected to abort compilation of the unit on any error.
///
/// # Error Categories
///
/// ## Structural checks
/// - [`Error::UnknownBlock`] - A jump target or exception-table entry names a missing block
/// - [`Error::DuplicateBlock`] - Two blocks share an identity number
/// - [`Error::DuplicateFunction`] - Two top-level functions share a name
/// - [`Error::UnknownVariable`] - An operand indexes outside the variable table
/// - [`Error::BadScope`] - A variable's scope marker names a missing block
/// - [`Error::TooManyArguments`] - A generated function exceeds the argument bound
/// - [`Error::MissingReturnBlock`] - A function that must return has no returning block
///
/// ## Internal defects
/// - [`Error::InvariantViolation`] - An internal assumption of a rewrite did not hold
///
/// # Examples
///
/// ```rust
/// use irsplit::{Error, ir::Module, split_module, SplitConfig};
///
/// let mut module = Module::new("demo");
/// match split_module(&mut module, SplitConfig::default()) {
///     Ok(report) => println!("{} helpers", report.helpers_created),
///     Err(Error::InvariantViolation { message, file, line }) => {
///         eprintln!("splitter defect: {message} ({file}:{line})");
///     }
///     Err(e) => eprintln!("inconsistent IR: {e}"),
/// }
/// ```
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A terminator successor or exception-table endpoint names a block that
    /// is not in the function.
    #[error("{function}: reference to unknown block {block}")]
    UnknownBlock {
        /// Function containing the reference.
        function: String,
        /// The missing block.
        block: BlockId,
    },

    /// Two blocks of a function share an identity number.
    #[error("{function}: duplicate block {block}")]
    DuplicateBlock {
        /// Function containing the duplicate.
        function: String,
        /// The repeated number.
        block: BlockId,
    },

    /// Two top-level functions of a module share a name.
    #[error("{module}: duplicate function {function}")]
    DuplicateFunction {
        /// Module containing the duplicate.
        module: String,
        /// The repeated name.
        function: String,
    },

    /// An operand indexes past the end of the variable table.
    #[error("{function}: operand {var} is not declared")]
    UnknownVariable {
        /// Function containing the operand.
        function: String,
        /// The undeclared operand.
        var: VarId,
    },

    /// A variable's start or end block marker names a block that is not in
    /// the function.
    #[error("{function}: scope of {var} refers to unknown block {block}")]
    BadScope {
        /// Function declaring the variable.
        function: String,
        /// The variable.
        var: VarId,
        /// The missing block.
        block: BlockId,
    },

    /// A generated function takes more arguments than allowed.
    #[error("{function}: {count} arguments exceed the limit of {max}")]
    TooManyArguments {
        /// The generated function.
        function: String,
        /// Its argument count.
        count: usize,
        /// The configured maximum.
        max: usize,
    },

    /// A rewrite needed to jump to the function's return block, but no block
    /// returns.
    #[error("{0}: no block returns")]
    MissingReturnBlock(String),

    /// An internal assumption of a rewrite did not hold.
    ///
    /// # Fields
    ///
    /// * `message` - What was violated
    /// * `file` - Source file where the violation was detected
    /// * `line` - Source line where the violation was detected
    #[error("Invariant violation - {file}:{line}: {message}")]
    InvariantViolation {
        /// What was violated
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },
}
