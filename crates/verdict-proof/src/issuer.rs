//! Decision proof issuance and offline verification.
//!
//! A proof is an EIP-712 signature over a `DecisionPayload` under a caller
//! supplied domain (name, version, chain id, verifying contract), so it
//! cannot be replayed against another deployment or another field layout.

use std::borrow::Cow;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, Signature, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};
use tracing::{debug, info};

use verdict_contracts::{
    context::Context,
    decision::Decision,
    error::{EngineError, EngineResult},
    proof::{
        DecisionPayload, DecisionProof, DomainParams, DECISION_PAYLOAD_VERSION,
        DEFAULT_PROOF_TTL_SECONDS,
    },
    rule::RuleSet,
};
use verdict_core::{
    hashing::{context_hash, rule_set_hash, to_hex},
    traits::{Clock, SigningCapability, TypedDataRequest},
};

use crate::nonce::fresh_nonce;

/// EIP-712 primary type name of the signed payload.
pub const PRIMARY_TYPE: &str = "DecisionPayload";

mod typed {
    alloy_sol_types::sol! {
        struct DecisionPayload {
            string version;
            string payId;
            address payer;
            address receiver;
            string asset;
            uint256 amount;
            bytes32 contextHash;
            bytes32 ruleSetHash;
            uint64 issuedAt;
            uint64 expiresAt;
            bytes32 nonce;
        }
    }
}

/// The parties and amount a proof is about.
#[derive(Debug, Clone, Copy)]
pub struct ProofSubject<'a> {
    pub pay_id: &'a str,
    pub payer: Address,
    pub receiver: Address,
    pub asset: &'a str,
    /// Amount in base units, as a decimal string.
    pub amount: &'a str,
}

/// Issues decision proofs for one signing domain.
pub struct ProofIssuer {
    domain: DomainParams,
    ttl_seconds: u64,
    clock: Arc<dyn Clock>,
}

impl ProofIssuer {
    /// Create an issuer with the default 60-second proof lifetime.
    pub fn new(domain: DomainParams, clock: Arc<dyn Clock>) -> Self {
        Self {
            domain,
            ttl_seconds: DEFAULT_PROOF_TTL_SECONDS,
            clock,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn domain(&self) -> &DomainParams {
        &self.domain
    }

    /// Issue a proof binding `decision` to `context` and `rule_set`.
    ///
    /// # Errors
    ///
    /// - `PROOF_REQUIRES_ALLOW` if `decision` is not ALLOW; no proof exists
    ///   for a rejection
    /// - `INVALID_PROOF_FIELD` for a non-decimal amount or a zero TTL
    /// - `SIGNER_UNSUPPORTED` if the signer cannot sign typed data
    pub fn issue(
        &self,
        decision: &Decision,
        subject: &ProofSubject<'_>,
        context: &Context,
        rule_set: &RuleSet,
        signer: &dyn SigningCapability,
    ) -> EngineResult<DecisionProof> {
        if !decision.is_allow() {
            return Err(EngineError::ProofRequiresAllow {
                code: decision.code.clone(),
            });
        }
        if self.ttl_seconds == 0 {
            return Err(EngineError::InvalidProofField {
                field: "ttlSeconds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        parse_amount(subject.amount)?;

        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add(self.ttl_seconds)
            .ok_or_else(|| EngineError::InvalidProofField {
                field: "expiresAt".to_string(),
                reason: "overflows u64".to_string(),
            })?;

        let payload = DecisionPayload {
            version: DECISION_PAYLOAD_VERSION.to_string(),
            pay_id: subject.pay_id.to_string(),
            payer: subject.payer,
            receiver: subject.receiver,
            asset: subject.asset.to_string(),
            amount: subject.amount.to_string(),
            context_hash: context_hash(context)?,
            rule_set_hash: rule_set_hash(rule_set)?,
            issued_at,
            expires_at,
            nonce: fresh_nonce(),
        };

        let digest = signing_hash(&payload, &self.domain)?;
        let signature = signer.sign_typed_data(&TypedDataRequest {
            domain: &self.domain,
            primary_type: PRIMARY_TYPE,
            payload: &payload,
            signing_hash: digest,
        })?;

        info!(
            pay_id = %payload.pay_id,
            signer = %signer.address(),
            rule_set_hash = %to_hex(&payload.rule_set_hash),
            context_hash = %to_hex(&payload.context_hash),
            expires_at,
            "decision proof issued"
        );

        Ok(DecisionProof {
            payload,
            signature: Bytes::from(signature.as_bytes().to_vec()),
        })
    }
}

/// Verify a proof offline and return the address that signed it.
///
/// Fails with `PROOF_EXPIRED` once `now` is past `expiresAt`, and with
/// `INVALID_PROOF_SIGNATURE` if no signer can be recovered.
pub fn verify_proof(proof: &DecisionProof, domain: &DomainParams, now: u64) -> EngineResult<Address> {
    if proof.is_expired(now) {
        return Err(EngineError::ProofExpired {
            expires_at: proof.payload.expires_at,
            now,
        });
    }

    let hash = signing_hash(&proof.payload, domain)?;
    let signature = Signature::try_from(proof.signature.as_ref()).map_err(|e| {
        EngineError::InvalidProofSignature {
            reason: format!("malformed signature: {e}"),
        }
    })?;
    let signer = signature
        .recover_address_from_prehash(&hash)
        .map_err(|e| EngineError::InvalidProofSignature {
            reason: e.to_string(),
        })?;

    debug!(pay_id = %proof.payload.pay_id, signer = %signer, "decision proof verified");
    Ok(signer)
}

/// The EIP-712 digest of `payload` under `domain`.
pub fn signing_hash(payload: &DecisionPayload, domain: &DomainParams) -> EngineResult<B256> {
    Ok(typed_payload(payload)?.eip712_signing_hash(&eip712_domain(domain)))
}

fn eip712_domain(domain: &DomainParams) -> Eip712Domain {
    Eip712Domain::new(
        Some(Cow::Owned(domain.name.clone())),
        Some(Cow::Owned(domain.version.clone())),
        Some(U256::from(domain.chain_id)),
        Some(domain.verifying_contract),
        None,
    )
}

fn typed_payload(payload: &DecisionPayload) -> EngineResult<typed::DecisionPayload> {
    Ok(typed::DecisionPayload {
        version: payload.version.clone(),
        payId: payload.pay_id.clone(),
        payer: payload.payer,
        receiver: payload.receiver,
        asset: payload.asset.clone(),
        amount: parse_amount(&payload.amount)?,
        contextHash: payload.context_hash,
        ruleSetHash: payload.rule_set_hash,
        issuedAt: payload.issued_at,
        expiresAt: payload.expires_at,
        nonce: payload.nonce,
    })
}

fn parse_amount(amount: &str) -> EngineResult<U256> {
    if amount.is_empty() || !amount.bytes().all(|b| b.is_ascii_digit()) {
        return Err(EngineError::InvalidProofField {
            field: "amount".to_string(),
            reason: format!("'{amount}' is not a non-negative decimal integer"),
        });
    }
    U256::from_str_radix(amount, 10).map_err(|e| EngineError::InvalidProofField {
        field: "amount".to_string(),
        reason: e.to_string(),
    })
}
