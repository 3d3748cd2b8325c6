//! # verdict-attest
//!
//! Attestations for context sub-documents.
//!
//! An attestation proves that a trusted issuer vouched for exactly the
//! non-proof fields of an `env`, `state`, `oracle` or `risk` document. The
//! issuer signs the SHA-256 digest of the canonical signed-field object with
//! an EIP-191 personal-message signature.
//!
//! This crate provides:
//!
//! 1. [`verifier::SignatureAttestationVerifier`], the
//!    [`verdict_core::traits::AttestationVerifier`] used by the engine.
//! 2. [`issuer::issue_attestation`], which builds such proofs for issuers and
//!    tests.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use verdict_attest::{issue_attestation, SignatureAttestationVerifier};
//!
//! let proof = issue_attestation(AttestedDomain::Env, &fields, None, &signer, now, now + 300)?;
//! ```

pub mod issuer;
pub mod verifier;

pub use issuer::{attestation_digest, issue_attestation};
pub use verifier::SignatureAttestationVerifier;
