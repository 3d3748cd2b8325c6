//! The decision engine: the fail-closed evaluation pipeline.
//!
//! Every evaluation runs the same stages in the same order:
//!
//!   Requires → Attestations → Normalize → Canonicalize → Interpret → Parse
//!
//! No stage can produce ALLOW on its own; only a well-formed interpreter
//! output can. Any error at any stage becomes a REJECT whose `code` names the
//! failure, so callers never have to handle a pipeline error.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use verdict_contracts::{
    context::Context,
    decision::{Decision, Verdict},
    error::{EngineError, EngineResult},
    rule::RuleSet,
    trust::TrustMode,
    EvaluationId,
};

use crate::{
    canonical::{canonicalize, canonicalize_rule_set},
    normalize::normalize_context,
    path::is_present,
    traits::{AttestationVerifier, Clock, RuleInterpreter},
};

/// The exact inputs an interpreter decision was computed over.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundInputs {
    /// The normalized context.
    pub context: Context,
    /// The canonicalized rule set.
    pub rules: RuleSet,
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub decision: Decision,
    /// Present whenever the interpreter ran and its output parsed, whether
    /// it allowed or rejected. `None` when an earlier stage failed.
    pub bound: Option<BoundInputs>,
}

impl Evaluation {
    fn failed(err: &EngineError) -> Self {
        Self {
            decision: Decision::from(err),
            bound: None,
        }
    }
}

/// Interpreter output before validation.
#[derive(Debug, Deserialize)]
struct RawDecision {
    decision: String,
    code: String,
    #[serde(default)]
    reason: Option<String>,
}

/// Runs the evaluation pipeline against pluggable interpreter and
/// attestation-verifier implementations.
pub struct DecisionEngine {
    interpreter: Box<dyn RuleInterpreter>,
    attestations: Box<dyn AttestationVerifier>,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    pub fn new(
        interpreter: Box<dyn RuleInterpreter>,
        attestations: Box<dyn AttestationVerifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            interpreter,
            attestations,
            clock,
        }
    }

    /// Evaluate `rules` against `context`. Never fails: errors are folded
    /// into a REJECT decision.
    pub fn evaluate(&self, rules: &RuleSet, context: &Context, trust: &TrustMode) -> Decision {
        self.evaluate_detailed(rules, context, trust).decision
    }

    /// Like `evaluate`, but also returns the normalized context and
    /// canonical rule set the decision was computed over.
    pub fn evaluate_detailed(
        &self,
        rules: &RuleSet,
        context: &Context,
        trust: &TrustMode,
    ) -> Evaluation {
        let evaluation_id = EvaluationId::new();
        debug!(
            evaluation_id = %evaluation_id,
            rules = rules.rules.len(),
            legacy = trust.is_legacy(),
            "evaluation starting"
        );

        match self.run(&evaluation_id, rules, context, trust) {
            Ok(evaluation) => {
                info!(
                    evaluation_id = %evaluation_id,
                    decision = ?evaluation.decision.decision,
                    code = %evaluation.decision.code,
                    "evaluation complete"
                );
                evaluation
            }
            Err(err) => {
                warn!(
                    evaluation_id = %evaluation_id,
                    code = %err.code(),
                    error = %err,
                    "evaluation rejected"
                );
                Evaluation::failed(&err)
            }
        }
    }

    /// Evaluate raw JSON documents. A context that does not parse rejects
    /// with `INVALID_CONTEXT`, rules that do not parse with
    /// `INVALID_RULE_DOCUMENT`.
    pub fn evaluate_json(&self, rules: &[u8], context: &[u8], trust: &TrustMode) -> Decision {
        let rules: RuleSet = match serde_json::from_slice(rules) {
            Ok(rules) => rules,
            Err(e) => {
                return Decision::from(&EngineError::InvalidRuleDocument {
                    reason: e.to_string(),
                })
            }
        };
        let context: Context = match serde_json::from_slice(context) {
            Ok(context) => context,
            Err(e) => {
                return Decision::from(&EngineError::InvalidContext {
                    reason: e.to_string(),
                })
            }
        };
        self.evaluate(&rules, &context, trust)
    }

    fn run(
        &self,
        evaluation_id: &EvaluationId,
        rules: &RuleSet,
        context: &Context,
        trust: &TrustMode,
    ) -> EngineResult<Evaluation> {
        // ── Stage 1: Required fields ─────────────────────────────────────────
        let context_value = serde_json::to_value(context).map_err(|e| EngineError::InvalidContext {
            reason: e.to_string(),
        })?;
        check_requires(rules, &context_value)?;

        // ── Stage 2: Attestations ────────────────────────────────────────────
        match trust {
            TrustMode::Attested(trusted) => {
                let now = self.clock.now();
                for document in context.attested_documents()? {
                    contain_panic("attestation verifier", || {
                        self.attestations.verify(&document, trusted, now)
                    })?;
                    debug!(
                        evaluation_id = %evaluation_id,
                        domain = %document.domain,
                        issuer = %document.proof.issuer,
                        "attestation verified"
                    );
                }
            }
            TrustMode::LegacyUnverified => {
                warn!(
                    evaluation_id = %evaluation_id,
                    attested_documents = context.has_attested_documents(),
                    "legacy trust mode: attestations are not verified"
                );
            }
        }

        // ── Stage 3: Normalize and canonicalize ──────────────────────────────
        let normalized = normalize_context(context);
        let canonical_rules = canonicalize_rule_set(rules)?;
        let context_form = canonicalize(&normalized)?;
        let rules_form = canonicalize(&canonical_rules)?;

        // ── Stage 4: Interpret ───────────────────────────────────────────────
        let output = contain_panic("interpreter", || {
            self.interpreter
                .evaluate(rules_form.as_bytes(), context_form.as_bytes())
        })?;

        // ── Stage 5: Validate interpreter output ─────────────────────────────
        let decision = parse_decision(&output)?;

        Ok(Evaluation {
            decision,
            bound: Some(BoundInputs {
                context: normalized,
                rules: canonical_rules,
            }),
        })
    }
}

/// Run a plugged-in component, turning a panic into an engine failure so
/// it rejects like any other error.
fn contain_panic<T>(component: &str, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let detail = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Err(EngineError::Sandbox {
            reason: format!("{component} panicked: {detail}"),
        })
    })
}

/// Every path in `rules.requires` must resolve to a non-null value.
fn check_requires(rules: &RuleSet, context: &Value) -> EngineResult<()> {
    match rules.requires.iter().find(|path| !is_present(context, path)) {
        Some(path) => Err(EngineError::MissingRequiredField { path: path.clone() }),
        None => Ok(()),
    }
}

/// Parse and validate interpreter output bytes.
///
/// Output that is not the expected JSON object is an engine failure
/// (`CONTEXT_OR_ENGINE_ERROR`); a well-formed object with a decision outside
/// ALLOW/REJECT is `INVALID_ENGINE_OUTPUT`.
pub fn parse_decision(output: &[u8]) -> EngineResult<Decision> {
    let raw: RawDecision = serde_json::from_slice(output).map_err(|e| EngineError::Sandbox {
        reason: format!("unparsable interpreter output: {e}"),
    })?;

    let decision = match raw.decision.as_str() {
        "ALLOW" => Verdict::Allow,
        "REJECT" => Verdict::Reject,
        other => {
            return Err(EngineError::InvalidEngineOutput {
                reason: format!("decision must be ALLOW or REJECT, got '{other}'"),
            })
        }
    };
    if raw.code.is_empty() {
        return Err(EngineError::InvalidEngineOutput {
            reason: "decision code is empty".to_string(),
        });
    }

    Ok(Decision {
        decision,
        code: raw.code,
        reason: raw.reason,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use alloy_primitives::{Address, Bytes};
    use serde_json::json;

    use verdict_contracts::{
        attestation::{Attestation, AttestedDomain},
        context::{AttestedDocument, Context, EnvDocument, Transaction},
        decision::Verdict,
        error::{EngineError, EngineResult},
        rule::{Operator, Rule, RuleSet},
        trust::{TrustMode, TrustedIssuers},
    };

    use crate::traits::{AttestationVerifier, FixedClock, RuleInterpreter};

    use super::{parse_decision, DecisionEngine};

    // ── Mock helpers ─────────────────────────────────────────────────────────

    /// An interpreter that returns fixed bytes and records what it was given.
    struct MockInterpreter {
        output: EngineResult<Vec<u8>>,
        seen: Arc<Mutex<Vec<(String, String)>>>,
    }

    impl MockInterpreter {
        fn returning(output: &str) -> (Self, Arc<Mutex<Vec<(String, String)>>>) {
            let seen = Arc::new(Mutex::new(vec![]));
            let interpreter = Self {
                output: Ok(output.as_bytes().to_vec()),
                seen: seen.clone(),
            };
            (interpreter, seen)
        }

        fn failing(reason: &str) -> Self {
            Self {
                output: Err(EngineError::Sandbox {
                    reason: reason.to_string(),
                }),
                seen: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    impl RuleInterpreter for MockInterpreter {
        fn evaluate(&self, rules: &[u8], context: &[u8]) -> EngineResult<Vec<u8>> {
            self.seen.lock().unwrap().push((
                String::from_utf8(rules.to_vec()).unwrap(),
                String::from_utf8(context.to_vec()).unwrap(),
            ));
            self.output.clone()
        }
    }

    /// A verifier that fails with a fixed error, or passes, and counts calls.
    struct MockAttestations {
        fail_with: Option<EngineError>,
        calls: Arc<Mutex<Vec<AttestedDomain>>>,
    }

    impl MockAttestations {
        fn passing() -> (Self, Arc<Mutex<Vec<AttestedDomain>>>) {
            let calls = Arc::new(Mutex::new(vec![]));
            (
                Self {
                    fail_with: None,
                    calls: calls.clone(),
                },
                calls,
            )
        }

        fn failing(err: EngineError) -> Self {
            Self {
                fail_with: Some(err),
                calls: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    impl AttestationVerifier for MockAttestations {
        fn verify(
            &self,
            document: &AttestedDocument<'_>,
            _trusted: &TrustedIssuers,
            _now: u64,
        ) -> EngineResult<()> {
            self.calls.lock().unwrap().push(document.domain);
            match &self.fail_with {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    const ALLOW: &str = r#"{"decision":"ALLOW","code":"OK"}"#;

    fn engine(interpreter: MockInterpreter, attestations: MockAttestations) -> DecisionEngine {
        DecisionEngine::new(
            Box::new(interpreter),
            Box::new(attestations),
            Arc::new(FixedClock(1_000)),
        )
    }

    fn rules() -> RuleSet {
        RuleSet::all_of(vec![
            Rule::simple("max", "tx.amount", Operator::Lte, json!("500")),
            Rule::simple("asset", "tx.asset", Operator::Eq, json!("USDC")),
        ])
    }

    fn legacy_context() -> Context {
        Context::for_transaction(Transaction {
            sender: Some("0xSENDER".to_string()),
            receiver: Some("0xRECEIVER".to_string()),
            asset: "usdc".to_string(),
            amount: "100".to_string(),
            chain_id: 31337,
        })
    }

    fn attested_context() -> Context {
        let mut ctx = legacy_context();
        ctx.env = Some(EnvDocument {
            timestamp: 990,
            proof: Attestation {
                issuer: Address::repeat_byte(7),
                issued_at: 900,
                expires_at: 2_000,
                signature: Bytes::from(vec![0u8; 65]),
                model_hash: None,
            },
        });
        ctx
    }

    fn trusted() -> TrustMode {
        TrustMode::attested([Address::repeat_byte(7)])
    }

    // ── Happy path ───────────────────────────────────────────────────────────

    #[test]
    fn interpreter_allow_is_returned_with_bound_inputs() {
        let (interpreter, seen) = MockInterpreter::returning(ALLOW);
        let (attestations, calls) = MockAttestations::passing();
        let evaluation = engine(interpreter, attestations).evaluate_detailed(
            &rules(),
            &attested_context(),
            &trusted(),
        );

        assert_eq!(evaluation.decision.decision, Verdict::Allow);
        assert_eq!(evaluation.decision.code, "OK");
        assert_eq!(calls.lock().unwrap().as_slice(), [AttestedDomain::Env]);

        let bound = evaluation.bound.expect("bound inputs present");
        assert_eq!(bound.context.tx.asset, "USDC");
        assert_eq!(bound.rules.rules[0].id(), "asset");

        // The interpreter sees canonical bytes of the normalized context.
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with(r#"{"logic":"AND","rules":[{"id":"asset""#));
        assert!(seen[0].1.contains(r#""receiver":"0xreceiver""#));
    }

    #[test]
    fn interpreter_reject_is_passed_through() {
        let (interpreter, _) = MockInterpreter::returning(
            r#"{"decision":"REJECT","code":"RULE_NOT_SATISFIED","reason":"rule 'max' not satisfied"}"#,
        );
        let (attestations, _) = MockAttestations::passing();
        let evaluation = engine(interpreter, attestations).evaluate_detailed(
            &rules(),
            &legacy_context(),
            &TrustMode::LegacyUnverified,
        );
        assert_eq!(evaluation.decision.decision, Verdict::Reject);
        assert_eq!(evaluation.decision.code, "RULE_NOT_SATISFIED");
        assert!(evaluation.bound.is_some());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let (interpreter, seen) = MockInterpreter::returning(ALLOW);
        let (attestations, _) = MockAttestations::passing();
        let engine = engine(interpreter, attestations);

        let mut reordered = rules();
        reordered.rules.reverse();
        let a = engine.evaluate(&rules(), &legacy_context(), &TrustMode::LegacyUnverified);
        let b = engine.evaluate(&reordered, &legacy_context(), &TrustMode::LegacyUnverified);
        assert_eq!(a, b);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], seen[1]);
    }

    // ── Fail-closed ──────────────────────────────────────────────────────────

    #[test]
    fn attestation_failure_rejects_before_interpreting() {
        let (interpreter, seen) = MockInterpreter::returning(ALLOW);
        let attestations = MockAttestations::failing(EngineError::UntrustedAttestationIssuer {
            domain: "env".to_string(),
            issuer: "0x07".to_string(),
        });
        let decision = engine(interpreter, attestations).evaluate(
            &rules(),
            &attested_context(),
            &trusted(),
        );
        assert_eq!(decision.decision, Verdict::Reject);
        assert_eq!(decision.code, "UNTRUSTED_ATTESTATION_ISSUER");
        assert!(seen.lock().unwrap().is_empty(), "interpreter must not run");
    }

    #[test]
    fn legacy_mode_skips_attestation_checks() {
        let (interpreter, _) = MockInterpreter::returning(ALLOW);
        let attestations = MockAttestations::failing(EngineError::AttestationExpired {
            domain: "env".to_string(),
            expires_at: 1,
            now: 2,
        });
        let decision = engine(interpreter, attestations).evaluate(
            &rules(),
            &attested_context(),
            &TrustMode::LegacyUnverified,
        );
        assert!(decision.is_allow());
    }

    #[test]
    fn missing_required_field_rejects_in_both_modes() {
        let mut rules = rules();
        rules.requires = vec!["env.timestamp".to_string()];

        for trust in [trusted(), TrustMode::LegacyUnverified] {
            let (interpreter, seen) = MockInterpreter::returning(ALLOW);
            let (attestations, _) = MockAttestations::passing();
            let decision = engine(interpreter, attestations).evaluate(&rules, &legacy_context(), &trust);
            assert_eq!(decision.code, "MISSING_REQUIRED_FIELD");
            assert!(decision.reason.unwrap().contains("env.timestamp"));
            assert!(seen.lock().unwrap().is_empty());
        }
    }

    #[test]
    fn present_required_field_passes() {
        let mut rules = rules();
        rules.requires = vec!["env.timestamp".to_string(), "tx.amount".to_string()];
        let (interpreter, _) = MockInterpreter::returning(ALLOW);
        let (attestations, _) = MockAttestations::passing();
        let decision = engine(interpreter, attestations).evaluate(&rules, &attested_context(), &trusted());
        assert!(decision.is_allow());
    }

    #[test]
    fn interpreter_error_rejects_with_engine_error_code() {
        let (attestations, _) = MockAttestations::passing();
        let evaluation = engine(MockInterpreter::failing("trap"), attestations).evaluate_detailed(
            &rules(),
            &legacy_context(),
            &TrustMode::LegacyUnverified,
        );
        assert_eq!(evaluation.decision.code, "CONTEXT_OR_ENGINE_ERROR");
        assert!(evaluation.bound.is_none());
    }

    /// An interpreter that crashes instead of answering.
    struct PanickingInterpreter;

    impl RuleInterpreter for PanickingInterpreter {
        fn evaluate(&self, _rules: &[u8], _context: &[u8]) -> EngineResult<Vec<u8>> {
            panic!("interpreter crashed")
        }
    }

    /// A verifier that crashes instead of answering.
    struct PanickingAttestations;

    impl AttestationVerifier for PanickingAttestations {
        fn verify(
            &self,
            _document: &AttestedDocument<'_>,
            _trusted: &TrustedIssuers,
            _now: u64,
        ) -> EngineResult<()> {
            panic!("verifier crashed")
        }
    }

    #[test]
    fn interpreter_panic_rejects_with_engine_error_code() {
        let (attestations, _) = MockAttestations::passing();
        let engine = DecisionEngine::new(
            Box::new(PanickingInterpreter),
            Box::new(attestations),
            Arc::new(FixedClock(1_000)),
        );
        let evaluation =
            engine.evaluate_detailed(&rules(), &legacy_context(), &TrustMode::LegacyUnverified);
        assert_eq!(evaluation.decision.decision, Verdict::Reject);
        assert_eq!(evaluation.decision.code, "CONTEXT_OR_ENGINE_ERROR");
        assert!(evaluation.decision.reason.unwrap().contains("interpreter crashed"));
        assert!(evaluation.bound.is_none());

        // The engine stays usable after containing the panic.
        let again = engine.evaluate(&rules(), &legacy_context(), &TrustMode::LegacyUnverified);
        assert_eq!(again.code, "CONTEXT_OR_ENGINE_ERROR");
    }

    #[test]
    fn verifier_panic_rejects_before_interpreting() {
        let (interpreter, seen) = MockInterpreter::returning(ALLOW);
        let engine = DecisionEngine::new(
            Box::new(interpreter),
            Box::new(PanickingAttestations),
            Arc::new(FixedClock(1_000)),
        );
        let decision = engine.evaluate(&rules(), &attested_context(), &trusted());
        assert_eq!(decision.decision, Verdict::Reject);
        assert_eq!(decision.code, "CONTEXT_OR_ENGINE_ERROR");
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn duplicate_rule_ids_reject_with_canonicalization_error() {
        let rules = RuleSet::all_of(vec![
            Rule::simple("dup", "tx.amount", Operator::Gt, json!("1")),
            Rule::simple("dup", "tx.amount", Operator::Lt, json!("9")),
        ]);
        let (interpreter, _) = MockInterpreter::returning(ALLOW);
        let (attestations, _) = MockAttestations::passing();
        let decision =
            engine(interpreter, attestations).evaluate(&rules, &legacy_context(), &TrustMode::LegacyUnverified);
        assert_eq!(decision.code, "CANONICALIZATION_ERROR");
    }

    #[test]
    fn evaluate_json_maps_parse_failures() {
        let (interpreter, _) = MockInterpreter::returning(ALLOW);
        let (attestations, _) = MockAttestations::passing();
        let engine = engine(interpreter, attestations);
        let rules_json = serde_json::to_vec(&rules()).unwrap();
        let context_json = serde_json::to_vec(&legacy_context()).unwrap();

        let bad_context = engine.evaluate_json(&rules_json, b"{not json", &TrustMode::LegacyUnverified);
        assert_eq!(bad_context.code, "INVALID_CONTEXT");

        let bad_rules = engine.evaluate_json(b"[]", &context_json, &TrustMode::LegacyUnverified);
        assert_eq!(bad_rules.code, "INVALID_RULE_DOCUMENT");

        let ok = engine.evaluate_json(&rules_json, &context_json, &TrustMode::LegacyUnverified);
        assert!(ok.is_allow());
    }

    // ── Output validation ────────────────────────────────────────────────────

    #[test]
    fn output_outside_closed_set_is_invalid_engine_output() {
        let err = parse_decision(br#"{"decision":"MAYBE","code":"X"}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEngineOutput { .. }));
        let err = parse_decision(br#"{"decision":"ALLOW","code":""}"#).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEngineOutput { .. }));
    }

    #[test]
    fn unparsable_output_is_engine_error() {
        let outputs: [&[u8]; 3] = [b"garbage", br#"{"code":"OK"}"#, b""];
        for output in outputs {
            let err = parse_decision(output).unwrap_err();
            assert!(matches!(err, EngineError::Sandbox { .. }), "got {:?}", err);
        }
    }

    #[test]
    fn malformed_interpreter_output_rejects() {
        let (interpreter, _) = MockInterpreter::returning(r#"{"decision":"allow","code":"OK"}"#);
        let (attestations, _) = MockAttestations::passing();
        let decision =
            engine(interpreter, attestations).evaluate(&rules(), &legacy_context(), &TrustMode::LegacyUnverified);
        assert_eq!(decision.decision, Verdict::Reject);
        assert_eq!(decision.code, "INVALID_ENGINE_OUTPUT");
    }
}
