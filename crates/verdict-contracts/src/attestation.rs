//! Attestations over context sub-documents.
//!
//! An attestation states that `issuer` vouched for the non-proof fields of
//! one context sub-document between `issuedAt` and `expiresAt`.

use std::fmt;

use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

/// The context domains that may carry an attestation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttestedDomain {
    Env,
    State,
    Oracle,
    Risk,
}

impl AttestedDomain {
    /// Every attested domain, in verification order.
    pub const ALL: [AttestedDomain; 4] = [Self::Env, Self::State, Self::Oracle, Self::Risk];

    /// The top-level context key holding this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Env => "env",
            Self::State => "state",
            Self::Oracle => "oracle",
            Self::Risk => "risk",
        }
    }
}

impl fmt::Display for AttestedDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `proof` object attached to an attested sub-document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Attestation {
    pub issuer: Address,
    pub issued_at: u64,
    pub expires_at: u64,
    /// 65-byte `r || s || v` signature over the sub-document digest.
    pub signature: Bytes,
    /// Hash of the scoring model; only meaningful on `risk` attestations,
    /// where it is folded into the signed field set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_hash: Option<B256>,
}
