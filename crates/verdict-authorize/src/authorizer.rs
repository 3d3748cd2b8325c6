//! The authorization runtime.
//!
//! `Authorizer::authorize` drives one request through the whole control
//! flow:
//!
//!   Resolve → Sessions → Combine → Evaluate → Issue
//!
//! Resolution, session and proof failures are returned as errors, since they
//! are problems with the request itself. Everything the decision engine
//! checks (required fields, attestations, the interpreter) ends in a
//! `Rejected` outcome instead. A proof is only ever issued for ALLOW.

use std::str::FromStr;
use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use verdict_attest::SignatureAttestationVerifier;
use verdict_contracts::{
    context::Context,
    decision::Decision,
    error::{EngineError, EngineResult},
    proof::DecisionProof,
    session::SessionPolicyPayload,
    trust::TrustMode,
};
use verdict_core::{
    engine::BoundInputs,
    normalize::normalize_address,
    traits::{Clock, RuleInterpreter, SigningCapability},
    DecisionEngine,
};
use verdict_proof::{ProofIssuer, ProofSubject, SessionPolicyEngine};
use verdict_resolve::{combine_session_policies, RuleReference, RuleResolver};

use crate::config::RuntimeConfig;

/// One authorization request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRequest {
    /// The authoritative rules.
    pub rules: RuleReference,
    pub context: Context,
    /// Receiver-signed overlays, ANDed onto the authoritative rules.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub session_policies: Vec<SessionPolicyPayload>,
}

/// Outcome of an authorization.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum Authorization {
    Authorized {
        decision: Decision,
        proof: DecisionProof,
    },
    Rejected {
        decision: Decision,
    },
}

impl Authorization {
    pub fn decision(&self) -> &Decision {
        match self {
            Self::Authorized { decision, .. } | Self::Rejected { decision } => decision,
        }
    }

    pub fn proof(&self) -> Option<&DecisionProof> {
        match self {
            Self::Authorized { proof, .. } => Some(proof),
            Self::Rejected { .. } => None,
        }
    }
}

/// Wires resolver, session engine, decision engine and proof issuer.
pub struct Authorizer {
    resolver: RuleResolver,
    sessions: SessionPolicyEngine,
    engine: DecisionEngine,
    issuer: ProofIssuer,
}

impl Authorizer {
    pub fn new(
        resolver: RuleResolver,
        sessions: SessionPolicyEngine,
        engine: DecisionEngine,
        issuer: ProofIssuer,
    ) -> Self {
        Self {
            resolver,
            sessions,
            engine,
            issuer,
        }
    }

    /// Build an authorizer from configuration, using the HTTP resolver and
    /// the signature attestation verifier.
    pub fn from_config(
        config: &RuntimeConfig,
        interpreter: Box<dyn RuleInterpreter>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let resolver = RuleResolver::http(&config.resolver)?;
        Self::with_resolver(config, resolver, interpreter, clock)
    }

    /// Like `from_config`, with a caller-built resolver.
    pub fn with_resolver(
        config: &RuntimeConfig,
        resolver: RuleResolver,
        interpreter: Box<dyn RuleInterpreter>,
        clock: Arc<dyn Clock>,
    ) -> EngineResult<Self> {
        let mut sessions = SessionPolicyEngine::new(Arc::clone(&clock));
        if let Some(max) = config.session.max_ttl_seconds {
            sessions = sessions.with_max_ttl(max);
        }
        let engine = DecisionEngine::new(
            interpreter,
            Box::new(SignatureAttestationVerifier::new()),
            Arc::clone(&clock),
        );
        let issuer =
            ProofIssuer::new(config.proof.domain_params()?, clock).with_ttl(config.proof.ttl_seconds);
        Ok(Self::new(resolver, sessions, engine, issuer))
    }

    /// Authorize `request` under `trust`, signing any proof with `signer`.
    pub fn authorize(
        &self,
        request: &AuthorizationRequest,
        trust: &TrustMode,
        signer: &dyn SigningCapability,
    ) -> EngineResult<Authorization> {
        // ── Resolve ──────────────────────────────────────────────────────────
        let authority = self.resolver.resolve_reference(&request.rules)?;
        debug!(rules = authority.rules.len(), "authority rules resolved");

        // ── Sessions ─────────────────────────────────────────────────────────
        let tx_receiver = request.context.tx.receiver.as_deref().map(normalize_address);
        let mut overlays = Vec::with_capacity(request.session_policies.len());
        for policy in &request.session_policies {
            let policy_receiver = normalize_address(&policy.receiver.to_string());
            if tx_receiver.as_deref() != Some(policy_receiver.as_str()) {
                return Err(EngineError::SessionPolicyReceiverMismatch {
                    policy_receiver,
                    tx_receiver: tx_receiver.unwrap_or_else(|| "<none>".to_string()),
                });
            }
            overlays.push(self.sessions.decode(policy)?);
        }

        // ── Combine ──────────────────────────────────────────────────────────
        let combined = if overlays.is_empty() {
            authority
        } else {
            combine_session_policies(&authority, &overlays)?
        };

        // ── Evaluate ─────────────────────────────────────────────────────────
        let evaluation = self.engine.evaluate_detailed(&combined, &request.context, trust);
        let bound = match (evaluation.decision.is_allow(), evaluation.bound) {
            (true, Some(bound)) => bound,
            _ => {
                warn!(code = %evaluation.decision.code, "authorization rejected");
                return Ok(Authorization::Rejected {
                    decision: evaluation.decision,
                });
            }
        };

        // ── Issue ────────────────────────────────────────────────────────────
        let proof = self.issue(&evaluation.decision, &bound, signer)?;
        info!(
            pay_id = %proof.payload.pay_id,
            sessions = overlays.len(),
            "authorization granted"
        );
        Ok(Authorization::Authorized {
            decision: evaluation.decision,
            proof,
        })
    }

    fn issue(
        &self,
        decision: &Decision,
        bound: &BoundInputs,
        signer: &dyn SigningCapability,
    ) -> EngineResult<DecisionProof> {
        let tx = &bound.context.tx;
        let pay_id = bound
            .context
            .pay_id
            .as_ref()
            .map(|p| p.id.as_str())
            .ok_or_else(|| missing_field("payId"))?;
        let payer = parse_address("tx.sender", tx.sender.as_deref())?;
        let receiver = parse_address("tx.receiver", tx.receiver.as_deref())?;

        let subject = ProofSubject {
            pay_id,
            payer,
            receiver,
            asset: &tx.asset,
            amount: &tx.amount,
        };
        self.issuer
            .issue(decision, &subject, &bound.context, &bound.rules, signer)
    }
}

fn parse_address(field: &str, text: Option<&str>) -> EngineResult<Address> {
    let text = text.ok_or_else(|| missing_field(field))?;
    Address::from_str(text.trim()).map_err(|e| EngineError::InvalidProofField {
        field: field.to_string(),
        reason: format!("'{text}' is not an address: {e}"),
    })
}

fn missing_field(field: &str) -> EngineError {
    EngineError::InvalidProofField {
        field: field.to_string(),
        reason: "required to issue a proof".to_string(),
    }
}
