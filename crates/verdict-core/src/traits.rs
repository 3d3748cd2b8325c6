//! Trait seams of the decision pipeline.
//!
//! - `RuleInterpreter`     evaluates canonical rules against a canonical context
//! - `AttestationVerifier` checks one attested sub-document
//! - `SigningCapability`   signs messages and typed data for proofs and sessions
//! - `RuleTransport`       fetches remote rule documents
//! - `Clock`               supplies "now" in Unix seconds
//!
//! The engine and issuers hold these as trait objects, so tests substitute
//! mocks and deployments choose the WASM or native interpreter.

use alloy_primitives::{Address, Signature, B256};
use chrono::Utc;

use verdict_contracts::{
    context::AttestedDocument,
    error::{EngineError, EngineResult},
    proof::{DecisionPayload, DomainParams},
    trust::TrustedIssuers,
};

/// Evaluates a rule set against a context.
///
/// Implementations receive canonical JSON bytes and must return the JSON
/// bytes of `{"decision": "ALLOW" | "REJECT", "code": ..., "reason"?: ...}`.
/// Anything else is treated as an engine failure by the caller.
pub trait RuleInterpreter: Send + Sync {
    fn evaluate(&self, rules: &[u8], context: &[u8]) -> EngineResult<Vec<u8>>;
}

/// Checks a single attested document against the caller's trusted issuers.
pub trait AttestationVerifier: Send + Sync {
    /// Return `Ok(())` only if the document is signed by a trusted issuer,
    /// unexpired at `now`, and its signed fields are unmodified.
    fn verify(
        &self,
        document: &AttestedDocument<'_>,
        trusted: &TrustedIssuers,
        now: u64,
    ) -> EngineResult<()>;
}

/// A typed-data signing request for a decision payload.
#[derive(Debug, Clone, Copy)]
pub struct TypedDataRequest<'a> {
    pub domain: &'a DomainParams,
    pub primary_type: &'a str,
    pub payload: &'a DecisionPayload,
    /// The EIP-712 digest of `payload` under `domain`.
    pub signing_hash: B256,
}

/// A key that can sign on behalf of one address.
pub trait SigningCapability: Send + Sync {
    fn address(&self) -> Address;

    /// EIP-191 personal-message signature over `message`.
    fn sign_message(&self, message: &[u8]) -> EngineResult<Signature>;

    /// Typed-data signature. Signers without typed-data support keep the
    /// default, which fails with `SIGNER_UNSUPPORTED`.
    fn sign_typed_data(&self, request: &TypedDataRequest<'_>) -> EngineResult<Signature> {
        let _ = request;
        Err(EngineError::SignerUnsupported {
            capability: "typed-data signing".to_string(),
        })
    }
}

/// Fetches the raw bytes of a remote rule document.
///
/// Implementations never retry and never follow redirects;
/// any non-success response is `RULE_FETCH_FAILED`.
pub trait RuleTransport: Send + Sync {
    fn fetch(&self, uri: &str) -> EngineResult<Vec<u8>>;
}

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(Utc::now().timestamp()).unwrap_or(0)
    }
}

/// A clock frozen at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub u64);

impl Clock for FixedClock {
    fn now(&self) -> u64 {
        self.0
    }
}
