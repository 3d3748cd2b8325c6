//! # verdict-proof
//!
//! Signed artifacts produced after evaluation.
//!
//! - [`issuer::ProofIssuer`] turns an ALLOW decision into a `DecisionProof`:
//!   an EIP-712 signature binding the payer, receiver, amount, context hash
//!   and rule set hash under a deployment-specific domain.
//! - [`issuer::verify_proof`] checks a proof offline.
//! - [`session::SessionPolicyEngine`] creates and verifies session policies,
//!   the receiver's short-lived consent to extra rules.

pub mod issuer;
mod nonce;
pub mod session;

pub use issuer::{verify_proof, ProofIssuer, ProofSubject};
pub use session::{
    decode_session_policy, decode_session_policy_str, encode_session_policy, SessionPolicyEngine,
};
