//! Decisions returned by the evaluation pipeline.
//!
//! The pipeline never returns an error to its caller: every failure is folded
//! into a `REJECT` decision whose `code` names the failing stage.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorCode};

/// The closed set of decision values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Reject,
}

/// `{decision, code, reason?}` as produced by the interpreter or the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub decision: Verdict,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Decision {
    /// An ALLOW decision with the given code.
    pub fn allow(code: impl Into<String>) -> Self {
        Self {
            decision: Verdict::Allow,
            code: code.into(),
            reason: None,
        }
    }

    /// A REJECT decision carrying an engine error code.
    pub fn reject(code: ErrorCode, reason: impl Into<String>) -> Self {
        Self {
            decision: Verdict::Reject,
            code: code.as_str().to_string(),
            reason: Some(reason.into()),
        }
    }

    pub fn is_allow(&self) -> bool {
        self.decision == Verdict::Allow
    }
}

impl From<&EngineError> for Decision {
    fn from(err: &EngineError) -> Self {
        Self::reject(err.code(), err.to_string())
    }
}
