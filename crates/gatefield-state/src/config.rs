//! Session configuration.

use gatefield_graph::GraphConfig;
use serde::{Deserialize, Serialize};

/// Default bound on nested `Reference` steps.
pub const DEFAULT_MAX_REFERENCE_DEPTH: usize = 32;

/// Configuration for a [`Session`](crate::session::Session).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub graph: GraphConfig,
    /// How deep `Reference` steps may nest before evaluation gives up on
    /// the branch.
    pub max_reference_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            graph: GraphConfig::default(),
            max_reference_depth: DEFAULT_MAX_REFERENCE_DEPTH,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"graph": {"op_budget": 10}}"#).unwrap();
        assert_eq!(config.graph.op_budget, 10);
        assert!(!config.graph.strict_cycles);
        assert_eq!(config.max_reference_depth, DEFAULT_MAX_REFERENCE_DEPTH);
    }
}
