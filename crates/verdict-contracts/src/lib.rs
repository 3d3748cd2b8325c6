//! # verdict-contracts
//!
//! Shared data model and error taxonomy for the Verdict policy decision
//! engine.
//!
//! All crates in the workspace import from here. No pipeline logic lives in
//! this crate: only data definitions, small constructors, and error types.

pub mod attestation;
pub mod context;
pub mod decision;
pub mod error;
pub mod proof;
pub mod rule;
pub mod session;
pub mod trust;

use serde::{Deserialize, Serialize};

/// Correlation identifier for one evaluation, used only in logs.
///
/// Never part of any hashed or signed material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationId(pub uuid::Uuid);

impl EvaluationId {
    /// Create a new, unique evaluation ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for EvaluationId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EvaluationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
