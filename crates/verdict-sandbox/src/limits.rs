//! Resource limits for sandboxed evaluation.

use serde::{Deserialize, Serialize};

/// Limits applied to every WASM evaluation. Deserialized from the
/// `[sandbox]` section of the runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SandboxLimits {
    /// Fuel available to one evaluation, including allocation calls.
    pub max_fuel: u64,
    /// Upper bound on linear memory per instance.
    pub max_memory_bytes: u64,
    /// Largest accepted rules or context buffer.
    pub max_input_bytes: u32,
    /// Capacity of the output region handed to `evaluate`.
    pub max_output_bytes: u32,
    /// Idle instances kept for reuse. Zero disables pooling.
    pub pool_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_fuel: 50_000_000,
            max_memory_bytes: 16 * 1024 * 1024,
            max_input_bytes: 1024 * 1024,
            max_output_bytes: 64 * 1024,
            pool_size: 4,
        }
    }
}
