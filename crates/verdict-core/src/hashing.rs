//! Content hashing over canonical byte forms.
//!
//! Every hash in Verdict is SHA-256 over the canonical JSON encoding of a
//! value, rendered as `0x`-prefixed lowercase hex on the wire. Hashing a
//! non-canonical encoding is not offered: callers go through
//! `CanonicalForm`, so two semantically equal inputs always hash equal.

use alloy_primitives::B256;
use sha2::{Digest, Sha256};

use verdict_contracts::{
    context::Context,
    error::{EngineError, EngineResult},
    rule::RuleSet,
};

use crate::{
    canonical::{canonicalize, rule_set_canonical_form, CanonicalForm},
    normalize::normalize_context,
};

/// SHA-256 of a canonical form.
pub fn hash_canonical(form: &CanonicalForm) -> B256 {
    hash_bytes(form.as_bytes())
}

/// SHA-256 of raw bytes. Used for remote rule documents, which are pinned by
/// the hash of the exact bytes fetched.
pub fn hash_bytes(bytes: &[u8]) -> B256 {
    B256::from_slice(&Sha256::digest(bytes))
}

/// Hash of a rule set's canonical form.
pub fn rule_set_hash(rule_set: &RuleSet) -> EngineResult<B256> {
    Ok(hash_canonical(&rule_set_canonical_form(rule_set)?))
}

/// Hash of a context after normalization and canonicalization.
pub fn context_hash(context: &Context) -> EngineResult<B256> {
    Ok(hash_canonical(&canonicalize(&normalize_context(context))?))
}

/// Render a digest as `0x`-prefixed lowercase hex.
pub fn to_hex(digest: &B256) -> String {
    format!("0x{}", hex::encode(digest))
}

/// Parse a 32-byte digest from hex. The `0x` prefix is optional and case is
/// ignored.
pub fn parse_digest(text: &str) -> EngineResult<B256> {
    let trimmed = text.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    let bytes = hex::decode(digits).map_err(|e| EngineError::InvalidRuleDocument {
        reason: format!("'{text}' is not a hex digest: {e}"),
    })?;
    if bytes.len() != B256::len_bytes() {
        return Err(EngineError::InvalidRuleDocument {
            reason: format!("digest must be 32 bytes, got {}", bytes.len()),
        });
    }
    Ok(B256::from_slice(&bytes))
}
