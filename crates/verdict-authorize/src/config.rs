//! Runtime configuration.
//!
//! `RuntimeConfig` is read from a TOML document. Every section is optional
//! and falls back to its defaults, except that issuing proofs needs a
//! `[proof.domain]` table. Trusted issuers and signing keys never appear
//! here: callers pass them with each request.
//!
//! ```toml
//! [proof]
//! ttl_seconds = 60
//!
//! [proof.domain]
//! name = "Verdict"
//! version = "1"
//! chain_id = 31337
//! verifying_contract = "0x5FbDB2315678afecb367f032d93F642f64180aa3"
//!
//! [sandbox]
//! max_fuel = 50000000
//!
//! [resolver]
//! ipfs_gateway = "https://ipfs.io"
//!
//! [session]
//! max_ttl_seconds = 3600
//! ```

use std::path::Path;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use verdict_contracts::{
    error::{EngineError, EngineResult},
    proof::{DomainParams, DEFAULT_PROOF_TTL_SECONDS},
};
use verdict_resolve::ResolverSettings;
use verdict_sandbox::SandboxLimits;

/// The typed-data domain, as written in `[proof.domain]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainSettings {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl From<&DomainSettings> for DomainParams {
    fn from(settings: &DomainSettings) -> Self {
        Self {
            name: settings.name.clone(),
            version: settings.version.clone(),
            chain_id: settings.chain_id,
            verifying_contract: settings.verifying_contract,
        }
    }
}

/// `[proof]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProofSettings {
    pub ttl_seconds: u64,
    pub domain: Option<DomainSettings>,
}

impl Default for ProofSettings {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_PROOF_TTL_SECONDS,
            domain: None,
        }
    }
}

impl ProofSettings {
    /// The configured signing domain.
    pub fn domain_params(&self) -> EngineResult<DomainParams> {
        self.domain
            .as_ref()
            .map(DomainParams::from)
            .ok_or_else(|| EngineError::Config {
                reason: "missing [proof.domain] section".to_string(),
            })
    }
}

/// `[session]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSettings {
    /// Longest lifetime accepted when creating a session policy.
    pub max_ttl_seconds: Option<u64>,
}

/// The complete runtime configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub proof: ProofSettings,
    pub sandbox: SandboxLimits,
    pub resolver: ResolverSettings,
    pub session: SessionSettings,
}

impl RuntimeConfig {
    /// Parse `s` as a TOML runtime configuration.
    ///
    /// Returns `EngineError::Config` if the TOML is malformed or names an
    /// unknown key.
    pub fn from_toml_str(s: &str) -> EngineResult<Self> {
        toml::from_str(s).map_err(|e| EngineError::Config {
            reason: format!("failed to parse runtime TOML: {}", e),
        })
    }

    /// Read and parse the configuration file at `path`.
    pub fn from_file(path: &Path) -> EngineResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Config {
            reason: format!("failed to read config file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }
}
