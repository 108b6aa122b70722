//! Graph tuning knobs.

use serde::{Deserialize, Serialize};

/// Default number of sort operations per refresh before yielding.
pub const DEFAULT_OP_BUDGET: usize = 3000;

/// Configuration for a [`FieldGraph`](crate::graph::FieldGraph).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Sort operations allowed per refresh before the pass yields.
    pub op_budget: usize,
    /// Treat dependency cycles as errors instead of logging and continuing.
    pub strict_cycles: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        GraphConfig {
            op_budget: DEFAULT_OP_BUDGET,
            strict_cycles: false,
        }
    }
}
