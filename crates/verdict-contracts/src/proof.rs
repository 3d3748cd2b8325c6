//! Decision payloads and signed decision proofs.
//!
//! A `DecisionProof` binds an ALLOW decision to the exact context and rule
//! set it was computed over. It is created once, never mutated, and invalid
//! after `expiresAt`.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// Payload layout version written into every decision payload.
pub const DECISION_PAYLOAD_VERSION: &str = "1";

/// Default proof lifetime.
pub const DEFAULT_PROOF_TTL_SECONDS: u64 = 60;

/// Typed-data domain the proof signature is bound to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainParams {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

/// The structured statement a decision proof signs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionPayload {
    pub version: String,
    pub pay_id: String,
    pub payer: Address,
    pub receiver: Address,
    pub asset: String,
    /// Amount in base units, as a decimal string.
    pub amount: String,
    pub context_hash: B256,
    pub rule_set_hash: B256,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Fresh random value; uniqueness enforcement is the verifier's job.
    pub nonce: B256,
}

/// A decision payload and its typed-data signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionProof {
    pub payload: DecisionPayload,
    pub signature: Bytes,
}

impl DecisionProof {
    /// Return true once `now` is past the proof's hard expiry.
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.payload.expires_at
    }
}
