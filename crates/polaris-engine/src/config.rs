use serde::{Deserialize, Serialize};

/// Limits enforced by the engine before any transaction opens.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on `batch_size` for transform log fetches.
    pub max_transform_batch: usize,
    /// Upper bound on the number of operations in one transform or
    /// location batch.
    pub max_batch_operations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_transform_batch: 500,
            max_batch_operations: 100,
        }
    }
}
