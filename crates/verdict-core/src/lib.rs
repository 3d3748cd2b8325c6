//! # verdict-core
//!
//! The deterministic decision pipeline for Verdict.
//!
//! This crate provides:
//! - Canonical form and content hashing for rule sets and contexts
//! - Context normalization
//! - The trait seams (`RuleInterpreter`, `AttestationVerifier`,
//!   `SigningCapability`, `Clock`)
//! - The fail-closed `DecisionEngine`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use verdict_core::{DecisionEngine, traits::{RuleInterpreter, AttestationVerifier}};
//! ```

pub mod canonical;
pub mod engine;
pub mod hashing;
pub mod normalize;
pub mod path;
pub mod signer;
pub mod traits;

pub use canonical::{canonicalize, canonicalize_rule_set, CanonicalForm};
pub use engine::{DecisionEngine, Evaluation};
pub use hashing::{context_hash, hash_canonical, rule_set_hash};
pub use signer::LocalKeySigner;
