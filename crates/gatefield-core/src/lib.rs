pub mod error;
pub mod gate;
pub mod id;
pub mod registry;
pub mod step;
pub mod value;

// Re-export commonly used types
pub use error::CoreError;
pub use gate::{merge_bool, merge_enum, Gate, MergePolicy};
pub use id::{FieldHandle, FieldId, OwnerId, ProgramId, StateId, StepId};
pub use registry::{FieldDef, Registry};
pub use step::{Step, StepKind};
pub use value::{ValueKind, EMPTY};
