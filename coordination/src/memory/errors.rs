//! Scene memory error taxonomy.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from writing scene memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum MemoryError {
    /// Slot index past the number of planned scenes.
    #[error("scene slot {index} out of range ({slots} slots)")]
    SlotOutOfRange { index: usize, slots: usize },

    /// Writing scene `index` before an earlier scene has been recorded.
    #[error("scene slot {index} written before slot {missing}")]
    OutOfOrder { index: usize, missing: usize },

    /// Accepted scenes are recorded exactly once.
    #[error("scene slot {0} already written")]
    AlreadyWritten(usize),
}

impl MemoryError {
    /// Suggested action for this error.
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::SlotOutOfRange { .. } => "size memory to the scene plan",
            Self::OutOfOrder { .. } => "record scenes in plan order",
            Self::AlreadyWritten(_) => "record each accepted scene once",
        }
    }
}
