//! Configuration for the large-function splitter.
//!
//! All thresholds count non-terminating instructions unless stated otherwise.

/// Configuration for the large-function splitter.
///
/// # Presets
///
/// | Preset        | function | split | args | periodic |
/// |---------------|----------|-------|------|----------|
/// | `default()`   | 1000     | 2     | 250  | 1000     |
/// | `eager()`     | 2        | 2     | 250  | 3        |
/// | `disabled()`  | ∞        | ∞     | 250  | ∞        |
///
/// `eager()` splits anything that qualifies at all. It is what the tests use
/// to exercise the splitter on small hand-written functions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitConfig {
    /// Functions with at least this many instructions are split (default: 1000).
    pub function_threshold: usize,

    /// Minimum size of an extracted region, terminators included (default: 2).
    pub min_split_instructions: usize,

    /// Maximum argument count of a generated helper (default: 250).
    pub max_split_args: usize,

    /// Instructions accumulated per bulk-literal helper before the next
    /// split point closes it (default: 1000).
    pub periodic_threshold: usize,

    /// Verify every rewritten function before returning (default: true).
    pub verify_after_split: bool,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            function_threshold: 1000,
            min_split_instructions: 2,
            max_split_args: 250,
            periodic_threshold: 1000,
            verify_after_split: true,
        }
    }
}

impl SplitConfig {
    /// Splits anything that qualifies.
    #[must_use]
    pub fn eager() -> Self {
        Self {
            function_threshold: 2,
            min_split_instructions: 2,
            max_split_args: 250,
            periodic_threshold: 3,
            verify_after_split: true,
        }
    }

    /// Never splits.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            function_threshold: usize::MAX,
            min_split_instructions: usize::MAX,
            periodic_threshold: usize::MAX,
            ..Self::default()
        }
    }

    /// Sets the function threshold.
    #[must_use]
    pub fn with_function_threshold(mut self, threshold: usize) -> Self {
        self.function_threshold = threshold;
        self
    }

    /// Sets the minimum region size.
    #[must_use]
    pub fn with_min_split_instructions(mut self, count: usize) -> Self {
        self.min_split_instructions = count;
        self
    }

    /// Sets the helper argument bound.
    #[must_use]
    pub fn with_max_split_args(mut self, max: usize) -> Self {
        self.max_split_args = max;
        self
    }

    /// Sets the bulk-literal batch size.
    #[must_use]
    pub fn with_periodic_threshold(mut self, threshold: usize) -> Self {
        self.periodic_threshold = threshold;
        self
    }

    /// Enables or disables post-split verification.
    #[must_use]
    pub fn with_verification(mut self, enabled: bool) -> Self {
        self.verify_after_split = enabled;
        self
    }

    /// Returns true if a function of `instructions` instructions must be split.
    #[must_use]
    pub fn is_oversized(&self, instructions: usize) -> bool {
        instructions >= self.function_threshold
    }
}
