//! Session policies: receiver-signed, short-lived rule overlays.
//!
//! The receiver signs the canonical JSON of every payload field except the
//! signature with a plain EIP-191 message signature. Verification encodes the
//! received fields the same way and never reorders rules, so a payload that
//! was altered after signing fails to verify.
//!
//! On the wire a session policy travels as base64url (no padding) of its
//! JSON document.

use std::sync::Arc;

use alloy_primitives::{Address, Bytes, Signature, B256};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::Serialize;
use tracing::{debug, info};

use verdict_contracts::{
    error::{EngineError, EngineResult},
    rule::RuleSet,
    session::{SessionPolicyPayload, SESSION_POLICY_VERSION},
};
use verdict_core::{
    canonical::{canonicalize, canonicalize_rule_set},
    traits::{Clock, SigningCapability},
};

use crate::nonce::fresh_nonce;

/// The signed portion of a session policy.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UnsignedSessionPolicy<'a> {
    expires_at: u64,
    issued_at: u64,
    nonce: &'a B256,
    receiver: &'a Address,
    rule: &'a RuleSet,
    version: &'a str,
}

impl<'a> From<&'a SessionPolicyPayload> for UnsignedSessionPolicy<'a> {
    fn from(payload: &'a SessionPolicyPayload) -> Self {
        Self {
            expires_at: payload.expires_at,
            issued_at: payload.issued_at,
            nonce: &payload.nonce,
            receiver: &payload.receiver,
            rule: &payload.rule,
            version: &payload.version,
        }
    }
}

/// The bytes a session policy signature covers.
pub fn session_signing_bytes(payload: &SessionPolicyPayload) -> EngineResult<Vec<u8>> {
    Ok(canonicalize(&UnsignedSessionPolicy::from(payload))?.into_bytes())
}

/// Creates and verifies session policies.
pub struct SessionPolicyEngine {
    clock: Arc<dyn Clock>,
    max_ttl_seconds: Option<u64>,
}

impl SessionPolicyEngine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            max_ttl_seconds: None,
        }
    }

    /// Refuse to create policies that live longer than `seconds`.
    pub fn with_max_ttl(mut self, seconds: u64) -> Self {
        self.max_ttl_seconds = Some(seconds);
        self
    }

    /// Create a policy in which `receiver` consents to `rule` until
    /// `expires_at`. `signer` must hold the receiver's key.
    pub fn create(
        &self,
        receiver: Address,
        rule: &RuleSet,
        expires_at: u64,
        signer: &dyn SigningCapability,
    ) -> EngineResult<SessionPolicyPayload> {
        if signer.address() != receiver {
            return Err(EngineError::Signing {
                reason: format!(
                    "signer {} cannot consent on behalf of receiver {receiver}",
                    signer.address()
                ),
            });
        }

        let issued_at = self.clock.now();
        if expires_at <= issued_at {
            return Err(EngineError::MalformedSessionPolicy {
                reason: format!("expiresAt {expires_at} is not after issuedAt {issued_at}"),
            });
        }
        if let Some(max) = self.max_ttl_seconds {
            if expires_at - issued_at > max {
                return Err(EngineError::MalformedSessionPolicy {
                    reason: format!("lifetime {}s exceeds maximum {max}s", expires_at - issued_at),
                });
            }
        }

        let mut payload = SessionPolicyPayload {
            expires_at,
            issued_at,
            nonce: fresh_nonce(),
            receiver,
            rule: canonicalize_rule_set(rule)?,
            version: SESSION_POLICY_VERSION.to_string(),
            signature: Bytes::new(),
        };
        let signature = signer.sign_message(&session_signing_bytes(&payload)?)?;
        payload.signature = Bytes::from(signature.as_bytes().to_vec());

        info!(receiver = %receiver, expires_at, rules = payload.rule.rules.len(), "session policy created");
        Ok(payload)
    }

    /// Verify a policy and return its rule set.
    ///
    /// Checks, in order: version, expiry (`now > expiresAt` rejects), and
    /// that the signature recovers to `receiver`.
    pub fn decode(&self, payload: &SessionPolicyPayload) -> EngineResult<RuleSet> {
        decode_session_policy(payload, self.clock.now())
    }
}

/// Verify `payload` at time `now` and return its rule set.
pub fn decode_session_policy(payload: &SessionPolicyPayload, now: u64) -> EngineResult<RuleSet> {
    if payload.version != SESSION_POLICY_VERSION {
        return Err(EngineError::InvalidSessionPolicyVersion {
            version: payload.version.clone(),
        });
    }
    if now > payload.expires_at {
        return Err(EngineError::SessionPolicyExpired {
            expires_at: payload.expires_at,
            now,
        });
    }

    let message = session_signing_bytes(payload)?;
    let signature = Signature::try_from(payload.signature.as_ref()).map_err(|e| {
        EngineError::InvalidSessionPolicySignature {
            reason: format!("malformed signature: {e}"),
        }
    })?;
    let recovered = signature
        .recover_address_from_msg(&message)
        .map_err(|e| EngineError::InvalidSessionPolicySignature {
            reason: e.to_string(),
        })?;
    if recovered != payload.receiver {
        return Err(EngineError::InvalidSessionPolicySignature {
            reason: format!("signed by {recovered}, not by receiver {}", payload.receiver),
        });
    }

    debug!(receiver = %payload.receiver, "session policy verified");
    Ok(payload.rule.clone())
}

/// Encode a policy for transport.
pub fn encode_session_policy(payload: &SessionPolicyPayload) -> EngineResult<String> {
    let json = serde_json::to_vec(payload).map_err(|e| EngineError::MalformedSessionPolicy {
        reason: e.to_string(),
    })?;
    Ok(URL_SAFE_NO_PAD.encode(json))
}

/// Parse a policy from its transport form. A bare JSON document is accepted
/// as well.
pub fn decode_session_policy_str(encoded: &str) -> EngineResult<SessionPolicyPayload> {
    let trimmed = encoded.trim();
    let json = if trimmed.starts_with('{') {
        trimmed.as_bytes().to_vec()
    } else {
        URL_SAFE_NO_PAD
            .decode(trimmed)
            .map_err(|e| EngineError::MalformedSessionPolicy {
                reason: format!("not base64url: {e}"),
            })?
    };
    serde_json::from_slice(&json).map_err(|e| EngineError::MalformedSessionPolicy {
        reason: e.to_string(),
    })
}
