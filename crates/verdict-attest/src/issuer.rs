//! Attestation issuance.

use alloy_primitives::{hex, Bytes, B256};
use serde_json::{Map, Value};
use tracing::debug;

use verdict_contracts::{
    attestation::{Attestation, AttestedDomain},
    error::{EngineError, EngineResult},
};
use verdict_core::{canonical::canonicalize_value, hashing::hash_canonical, traits::SigningCapability};

/// The digest an attestation signature covers: SHA-256 of the canonical
/// signed-field object.
pub fn attestation_digest(signed_fields: &Map<String, Value>) -> EngineResult<B256> {
    let form = canonicalize_value(Value::Object(signed_fields.clone()))?;
    Ok(hash_canonical(&form))
}

/// Sign `fields` as an attestation for `domain`.
///
/// `fields` must be the document without its `proof`. For the risk domain a
/// `model_hash` is bound into the signed fields as `modelHash`; supplying one
/// for any other domain is an error, since verifiers would reject it.
pub fn issue_attestation(
    domain: AttestedDomain,
    fields: &Map<String, Value>,
    model_hash: Option<B256>,
    signer: &dyn SigningCapability,
    issued_at: u64,
    expires_at: u64,
) -> EngineResult<Attestation> {
    if fields.contains_key("proof") {
        return Err(EngineError::InvalidContext {
            reason: format!("'{domain}' fields to attest must not contain 'proof'"),
        });
    }
    if expires_at < issued_at {
        return Err(EngineError::InvalidContext {
            reason: format!("attestation expires ({expires_at}) before it is issued ({issued_at})"),
        });
    }

    let mut signed = fields.clone();
    match (domain, model_hash) {
        (AttestedDomain::Risk, Some(hash)) => {
            signed.insert("modelHash".to_string(), Value::String(hex::encode_prefixed(hash)));
        }
        (_, Some(_)) => {
            return Err(EngineError::UnverifiableAttestationField {
                domain: domain.to_string(),
                field: "modelHash".to_string(),
            });
        }
        (_, None) => {}
    }

    let digest = attestation_digest(&signed)?;
    let signature = signer.sign_message(digest.as_slice())?;

    debug!(
        domain = %domain,
        issuer = %signer.address(),
        expires_at,
        "attestation issued"
    );

    Ok(Attestation {
        issuer: signer.address(),
        issued_at,
        expires_at,
        signature: Bytes::from(signature.as_bytes().to_vec()),
        model_hash,
    })
}
