//! Resolver settings, read from the `[resolver]` section of the runtime
//! configuration.

use serde::{Deserialize, Serialize};

/// Default gateway for `ipfs://` rule references.
pub const DEFAULT_IPFS_GATEWAY: &str = "https://ipfs.io";

/// Limits and endpoints for rule resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolverSettings {
    /// HTTP(S) base URL that serves `/ipfs/<cid>` paths.
    pub ipfs_gateway: String,
    /// Whole-request timeout for one fetch.
    pub timeout_seconds: u64,
    /// Largest rule document accepted, in bytes.
    pub max_bytes: u64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            ipfs_gateway: DEFAULT_IPFS_GATEWAY.to_string(),
            timeout_seconds: 10,
            max_bytes: 256 * 1024,
        }
    }
}
