//! Shared state of one splitting run.

use crate::{
    compiler::{EventLog, SplitConfig},
    ir::Module,
};

/// Name prefix of generated helper functions.
const SPLIT_METHOD_PREFIX: &str = "$split$method$_";

/// Name prefix of temporaries introduced at call sites.
const SPLIT_TEMP_PREFIX: &str = "$split$tempVar$_";

/// State threaded through every step of a splitting run.
///
/// Owns the name counters, so two contexts never interfere and a fresh
/// context always produces the same names for the same input.
#[derive(Debug, Clone)]
pub struct SplitContext {
    /// Thresholds.
    pub config: SplitConfig,
    /// Everything that happened.
    pub events: EventLog,
    functions: usize,
    temps: usize,
}

impl SplitContext {
    /// Creates a context with fresh counters.
    #[must_use]
    pub fn new(config: SplitConfig) -> Self {
        Self {
            config,
            events: EventLog::new(),
            functions: 0,
            temps: 0,
        }
    }

    /// Returns the next helper name: `$split$method$_1`, `$split$method$_2`, ...
    pub fn next_function_name(&mut self) -> String {
        self.functions += 1;
        format!("{SPLIT_METHOD_PREFIX}{}", self.functions)
    }

    /// Moves the helper counter past every `$split$method$_N` already in
    /// `module`, so a second run never reuses a helper name.
    pub fn reserve_names(&mut self, module: &Module) {
        let highest = module
            .all_functions()
            .filter_map(|function| function.name.strip_prefix(SPLIT_METHOD_PREFIX))
            .filter_map(|suffix| suffix.parse::<usize>().ok())
            .max()
            .unwrap_or(0);
        self.functions = self.functions.max(highest);
    }

    /// Returns the next temporary name: `$split$tempVar$_0`, `$split$tempVar$_1`, ...
    pub fn next_temp_name(&mut self) -> String {
        let name = format!("{SPLIT_TEMP_PREFIX}{}", self.temps);
        self.temps += 1;
        name
    }

    /// Number of helper names handed out so far.
    #[must_use]
    pub fn helpers_named(&self) -> usize {
        self.functions
    }
}

impl Default for SplitContext {
    fn default() -> Self {
        Self::new(SplitConfig::default())
    }
}
