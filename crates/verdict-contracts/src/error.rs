//! Error taxonomy for the Verdict decision pipeline.
//!
//! Every fallible operation returns `EngineResult<T>`. Each variant maps to a
//! stable wire code (`ErrorCode`) so a rejected decision can name the exact
//! stage that failed.

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Stable, machine-readable error codes.
///
/// These strings appear in `Decision::code` for rejected evaluations and are
/// part of the public contract with callers. `as_str` is the only place the
/// wire strings are spelled; `Display`, `FromStr` and serde all go through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    CanonicalizationError,
    UnsupportedUriScheme,
    RuleFetchFailed,
    RuleHashMismatch,
    InvalidRuleDocument,
    MissingRequiredField,
    UntrustedAttestationIssuer,
    AttestationExpired,
    InvalidAttestationSignature,
    UnverifiableAttestationField,
    InvalidContext,
    ContextOrEngineError,
    InvalidEngineOutput,
    SignerUnsupported,
    SigningFailed,
    ProofRequiresAllow,
    InvalidProofField,
    ProofExpired,
    InvalidProofSignature,
    InvalidSessionPolicyVersion,
    SessionPolicyExpired,
    InvalidSessionPolicySignature,
    MalformedSessionPolicy,
    SessionPolicyReceiverMismatch,
    ConfigError,
}

impl ErrorCode {
    /// Every code, in declaration order.
    pub const ALL: [ErrorCode; 25] = [
        Self::CanonicalizationError,
        Self::UnsupportedUriScheme,
        Self::RuleFetchFailed,
        Self::RuleHashMismatch,
        Self::InvalidRuleDocument,
        Self::MissingRequiredField,
        Self::UntrustedAttestationIssuer,
        Self::AttestationExpired,
        Self::InvalidAttestationSignature,
        Self::UnverifiableAttestationField,
        Self::InvalidContext,
        Self::ContextOrEngineError,
        Self::InvalidEngineOutput,
        Self::SignerUnsupported,
        Self::SigningFailed,
        Self::ProofRequiresAllow,
        Self::InvalidProofField,
        Self::ProofExpired,
        Self::InvalidProofSignature,
        Self::InvalidSessionPolicyVersion,
        Self::SessionPolicyExpired,
        Self::InvalidSessionPolicySignature,
        Self::MalformedSessionPolicy,
        Self::SessionPolicyReceiverMismatch,
        Self::ConfigError,
    ];

    /// The wire representation of this code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CanonicalizationError => "CANONICALIZATION_ERROR",
            Self::UnsupportedUriScheme => "UNSUPPORTED_URI_SCHEME",
            Self::RuleFetchFailed => "RULE_FETCH_FAILED",
            Self::RuleHashMismatch => "RULE_HASH_MISMATCH",
            Self::InvalidRuleDocument => "INVALID_RULE_DOCUMENT",
            Self::MissingRequiredField => "MISSING_REQUIRED_FIELD",
            Self::UntrustedAttestationIssuer => "UNTRUSTED_ATTESTATION_ISSUER",
            Self::AttestationExpired => "ATTESTATION_EXPIRED",
            Self::InvalidAttestationSignature => "INVALID_ATTESTATION_SIGNATURE",
            Self::UnverifiableAttestationField => "UNVERIFIABLE_ATTESTATION_FIELD",
            Self::InvalidContext => "INVALID_CONTEXT",
            Self::ContextOrEngineError => "CONTEXT_OR_ENGINE_ERROR",
            Self::InvalidEngineOutput => "INVALID_ENGINE_OUTPUT",
            Self::SignerUnsupported => "SIGNER_UNSUPPORTED",
            Self::SigningFailed => "SIGNING_FAILED",
            Self::ProofRequiresAllow => "PROOF_REQUIRES_ALLOW",
            Self::InvalidProofField => "INVALID_PROOF_FIELD",
            Self::ProofExpired => "PROOF_EXPIRED",
            Self::InvalidProofSignature => "INVALID_PROOF_SIGNATURE",
            Self::InvalidSessionPolicyVersion => "INVALID_SESSION_POLICY_VERSION",
            Self::SessionPolicyExpired => "SESSION_POLICY_EXPIRED",
            Self::InvalidSessionPolicySignature => "INVALID_SESSION_POLICY_SIGNATURE",
            Self::MalformedSessionPolicy => "MALFORMED_SESSION_POLICY",
            Self::SessionPolicyReceiverMismatch => "SESSION_POLICY_RECEIVER_MISMATCH",
            Self::ConfigError => "CONFIG_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown error code '{s}'"))
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ErrorCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// The unified error type for the Verdict pipeline.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A value could not be brought into canonical form.
    #[error("canonicalization failed: {reason}")]
    Canonicalization { reason: String },

    /// A rule reference used a URI scheme the resolver does not serve.
    #[error("unsupported rule URI scheme '{scheme}'")]
    UnsupportedUriScheme { scheme: String },

    /// The rule transport could not deliver the document.
    #[error("failed to fetch rules from '{uri}': {reason}")]
    RuleFetchFailed { uri: String, reason: String },

    /// The fetched (or inline) rule content does not match its pinned digest.
    #[error("rule hash mismatch: expected {expected}, computed {actual}")]
    RuleHashMismatch { expected: String, actual: String },

    /// A rule document is not a well-formed rule set.
    #[error("invalid rule document: {reason}")]
    InvalidRuleDocument { reason: String },

    /// A path declared in `requires` is absent or null in the context.
    #[error("required context field '{path}' is missing")]
    MissingRequiredField { path: String },

    /// The attestation issuer is not in the caller's trusted set.
    #[error("attestation for '{domain}' issued by untrusted issuer {issuer}")]
    UntrustedAttestationIssuer { domain: String, issuer: String },

    /// The attestation's `expiresAt` is in the past.
    #[error("attestation for '{domain}' expired at {expires_at} (now {now})")]
    AttestationExpired { domain: String, expires_at: u64, now: u64 },

    /// The attestation signature does not recover to its declared issuer.
    #[error("invalid attestation signature for '{domain}': {reason}")]
    InvalidAttestationSignature { domain: String, reason: String },

    /// The attested document carries a field its signature cannot cover.
    #[error("attestation for '{domain}' carries unverifiable field '{field}'")]
    UnverifiableAttestationField { domain: String, field: String },

    /// The context document could not be parsed or serialized.
    #[error("invalid context: {reason}")]
    InvalidContext { reason: String },

    /// The sandboxed interpreter crashed, trapped or returned an error code.
    #[error("rule engine failure: {reason}")]
    Sandbox { reason: String },

    /// The interpreter produced output outside the decision contract.
    #[error("invalid engine output: {reason}")]
    InvalidEngineOutput { reason: String },

    /// The signing capability cannot perform the requested kind of signature.
    #[error("signer does not support {capability}")]
    SignerUnsupported { capability: String },

    /// The signing capability failed to produce a signature.
    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// A proof was requested for a decision that is not ALLOW.
    #[error("decision proofs are only issued for ALLOW decisions (got code {code})")]
    ProofRequiresAllow { code: String },

    /// A field needed to build or check a decision payload is malformed.
    #[error("invalid decision payload field '{field}': {reason}")]
    InvalidProofField { field: String, reason: String },

    /// The decision proof is past its hard expiry.
    #[error("decision proof expired at {expires_at} (now {now})")]
    ProofExpired { expires_at: u64, now: u64 },

    /// The decision proof signature is malformed or recovers to the wrong signer.
    #[error("invalid decision proof signature: {reason}")]
    InvalidProofSignature { reason: String },

    /// The session policy declares a version this engine cannot read.
    #[error("unsupported session policy version '{version}'")]
    InvalidSessionPolicyVersion { version: String },

    /// The session policy window has closed.
    #[error("session policy expired at {expires_at} (now {now})")]
    SessionPolicyExpired { expires_at: u64, now: u64 },

    /// The session policy was not signed by its receiver.
    #[error("invalid session policy signature: {reason}")]
    InvalidSessionPolicySignature { reason: String },

    /// The session policy could not be decoded.
    #[error("malformed session policy: {reason}")]
    MalformedSessionPolicy { reason: String },

    /// The session policy consents on behalf of a different receiver.
    #[error("session policy receiver {policy_receiver} does not match transaction receiver {tx_receiver}")]
    SessionPolicyReceiverMismatch { policy_receiver: String, tx_receiver: String },

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl EngineError {
    /// The stable code reported for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Canonicalization { .. } => ErrorCode::CanonicalizationError,
            Self::UnsupportedUriScheme { .. } => ErrorCode::UnsupportedUriScheme,
            Self::RuleFetchFailed { .. } => ErrorCode::RuleFetchFailed,
            Self::RuleHashMismatch { .. } => ErrorCode::RuleHashMismatch,
            Self::InvalidRuleDocument { .. } => ErrorCode::InvalidRuleDocument,
            Self::MissingRequiredField { .. } => ErrorCode::MissingRequiredField,
            Self::UntrustedAttestationIssuer { .. } => ErrorCode::UntrustedAttestationIssuer,
            Self::AttestationExpired { .. } => ErrorCode::AttestationExpired,
            Self::InvalidAttestationSignature { .. } => ErrorCode::InvalidAttestationSignature,
            Self::UnverifiableAttestationField { .. } => ErrorCode::UnverifiableAttestationField,
            Self::InvalidContext { .. } => ErrorCode::InvalidContext,
            Self::Sandbox { .. } => ErrorCode::ContextOrEngineError,
            Self::InvalidEngineOutput { .. } => ErrorCode::InvalidEngineOutput,
            Self::SignerUnsupported { .. } => ErrorCode::SignerUnsupported,
            Self::Signing { .. } => ErrorCode::SigningFailed,
            Self::ProofRequiresAllow { .. } => ErrorCode::ProofRequiresAllow,
            Self::InvalidProofField { .. } => ErrorCode::InvalidProofField,
            Self::ProofExpired { .. } => ErrorCode::ProofExpired,
            Self::InvalidProofSignature { .. } => ErrorCode::InvalidProofSignature,
            Self::InvalidSessionPolicyVersion { .. } => ErrorCode::InvalidSessionPolicyVersion,
            Self::SessionPolicyExpired { .. } => ErrorCode::SessionPolicyExpired,
            Self::InvalidSessionPolicySignature { .. } => ErrorCode::InvalidSessionPolicySignature,
            Self::MalformedSessionPolicy { .. } => ErrorCode::MalformedSessionPolicy,
            Self::SessionPolicyReceiverMismatch { .. } => ErrorCode::SessionPolicyReceiverMismatch,
            Self::Config { .. } => ErrorCode::ConfigError,
        }
    }
}

/// Convenience alias used throughout the Verdict crates.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_serde_uses_as_str() {
        for code in ErrorCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ErrorCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }

    #[test]
    fn test_codes_are_distinct() {
        let strings: HashSet<&str> = ErrorCode::ALL.iter().map(|c| c.as_str()).collect();
        assert_eq!(strings.len(), ErrorCode::ALL.len());
    }

    #[test]
    fn test_unknown_code_rejected() {
        assert!("NOT_A_CODE".parse::<ErrorCode>().is_err());
        assert!(serde_json::from_str::<ErrorCode>("\"config_error\"").is_err());
    }

    #[test]
    fn test_error_reports_its_code() {
        let err = EngineError::Sandbox {
            reason: "trap".to_string(),
        };
        assert_eq!(err.code(), ErrorCode::ContextOrEngineError);
        assert_eq!(err.code().to_string(), "CONTEXT_OR_ENGINE_ERROR");
    }
}
