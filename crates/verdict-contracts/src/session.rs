//! Session policies: short-lived, receiver-signed rule overlays.
//!
//! A session policy expresses ephemeral consent. It can only narrow the
//! authoritative rule set (it is combined under AND) and is discarded once
//! `expiresAt` passes.

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use crate::rule::RuleSet;

/// The only session policy version this engine reads and writes.
pub const SESSION_POLICY_VERSION: &str = "1";

/// A signed session policy as transmitted between parties.
///
/// Field order is alphabetical so the serialized form of the unsigned fields
/// is already in canonical key order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SessionPolicyPayload {
    pub expires_at: u64,
    pub issued_at: u64,
    pub nonce: B256,
    pub receiver: Address,
    /// The overlay rule set, canonicalized at creation time.
    pub rule: RuleSet,
    pub version: String,
    /// EIP-191 signature by `receiver` over the unsigned fields.
    pub signature: Bytes,
}
