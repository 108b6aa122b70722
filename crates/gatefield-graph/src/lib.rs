//! Reactive field graph.
//!
//! Fields are small integer-valued cells owned by entities. Each field
//! reads a set of upstream fields and publishes one value; output fields
//! merge several gated sources into one named value. The graph keeps all
//! fields in a topological order maintained incrementally per island of
//! connected fields, and refreshes values in that order.
//!
//! Dependency cycles are tolerated: they are reported through `tracing`
//! and the ordering around them is best-effort.

pub mod arena;
pub mod config;
pub mod error;
pub mod events;
pub mod field;
pub mod graph;
pub mod islands;
pub mod output;
pub mod sort;

// Re-export commonly used types
pub use config::GraphConfig;
pub use error::GraphError;
pub use events::{FieldStats, RefreshReport, ValueChange};
pub use field::{FieldNode, FieldSampler, FieldSlot};
pub use graph::FieldGraph;
pub use output::OutputField;
pub use sort::{CyclePoint, SortStats};
