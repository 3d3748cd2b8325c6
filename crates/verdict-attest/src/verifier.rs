//! Signature-based attestation verifier.
//!
//! Checks run in a fixed order and stop at the first failure:
//!
//! 1. issuer is in the caller's trusted set (`UNTRUSTED_ATTESTATION_ISSUER`)
//! 2. `expiresAt >= now` (`ATTESTATION_EXPIRED`)
//! 3. no proof field outside the signed set (`UNVERIFIABLE_ATTESTATION_FIELD`)
//! 4. the signature over the signed fields recovers to the issuer
//!    (`INVALID_ATTESTATION_SIGNATURE`)
//!
//! An empty trusted set therefore rejects every document at step 1.

use alloy_primitives::Signature;
use tracing::{debug, warn};

use verdict_contracts::{
    attestation::AttestedDomain,
    context::AttestedDocument,
    error::{EngineError, EngineResult},
    trust::TrustedIssuers,
};
use verdict_core::traits::AttestationVerifier;

use crate::issuer::attestation_digest;

/// Verifies EIP-191 attestation signatures over canonical signed fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureAttestationVerifier;

impl SignatureAttestationVerifier {
    pub fn new() -> Self {
        Self
    }
}

impl AttestationVerifier for SignatureAttestationVerifier {
    fn verify(
        &self,
        document: &AttestedDocument<'_>,
        trusted: &TrustedIssuers,
        now: u64,
    ) -> EngineResult<()> {
        let domain = document.domain;
        let proof = document.proof;

        if !trusted.contains(&proof.issuer) {
            warn!(domain = %domain, issuer = %proof.issuer, "attestation issuer not trusted");
            return Err(EngineError::UntrustedAttestationIssuer {
                domain: domain.to_string(),
                issuer: proof.issuer.to_string(),
            });
        }

        if proof.expires_at < now {
            return Err(EngineError::AttestationExpired {
                domain: domain.to_string(),
                expires_at: proof.expires_at,
                now,
            });
        }

        if proof.model_hash.is_some() && domain != AttestedDomain::Risk {
            return Err(EngineError::UnverifiableAttestationField {
                domain: domain.to_string(),
                field: "modelHash".to_string(),
            });
        }

        let digest = attestation_digest(&document.signed_fields)?;
        let signature = Signature::try_from(proof.signature.as_ref()).map_err(|e| {
            EngineError::InvalidAttestationSignature {
                domain: domain.to_string(),
                reason: format!("malformed signature: {e}"),
            }
        })?;
        let recovered = signature
            .recover_address_from_msg(digest.as_slice())
            .map_err(|e| EngineError::InvalidAttestationSignature {
                domain: domain.to_string(),
                reason: format!("signer recovery failed: {e}"),
            })?;

        if recovered != proof.issuer {
            return Err(EngineError::InvalidAttestationSignature {
                domain: domain.to_string(),
                reason: format!("signed by {recovered}, not by issuer {}", proof.issuer),
            });
        }

        debug!(domain = %domain, issuer = %proof.issuer, "attestation signature valid");
        Ok(())
    }
}
