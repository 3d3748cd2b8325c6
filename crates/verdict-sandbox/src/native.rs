//! In-process reference interpreter.
//!
//! `NativeInterpreter` implements the same byte-level contract as a WASM
//! interpreter module: canonical rules and canonical context go in as JSON
//! bytes, a decision document comes out. It exists for hosts that cannot
//! load a module and as the behavioural reference in tests.
//!
//! Semantics:
//!
//! - a condition whose field is missing or `null` never holds, whatever the
//!   operator;
//! - ordering operators compare decimal-exactly over JSON numbers and
//!   numeric strings, and never hold for non-numeric operands;
//! - `==` and `!=` compare numerically when both sides are numeric, and by
//!   JSON equality otherwise;
//! - `in` / `not_in` require an array on the rule side;
//! - an empty rule set rejects with `EMPTY_RULE_SET`.

use std::cmp::Ordering;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use serde_json::Value;
use tracing::debug;

use verdict_contracts::{
    decision::{Decision, Verdict},
    error::{EngineError, EngineResult},
    rule::{Logic, Operator, Rule, RuleCondition, RuleSet},
};
use verdict_core::{path::lookup_path, traits::RuleInterpreter};

/// Decision code for a satisfied rule set.
pub const CODE_OK: &str = "OK";
/// Decision code when the rule set does not hold.
pub const CODE_RULE_NOT_SATISFIED: &str = "RULE_NOT_SATISFIED";
/// Decision code for a rule set without rules.
pub const CODE_EMPTY_RULE_SET: &str = "EMPTY_RULE_SET";

/// The reference rule interpreter.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeInterpreter;

impl NativeInterpreter {
    pub fn new() -> Self {
        Self
    }
}

impl RuleInterpreter for NativeInterpreter {
    fn evaluate(&self, rules: &[u8], context: &[u8]) -> EngineResult<Vec<u8>> {
        let rules: RuleSet = serde_json::from_slice(rules).map_err(|e| EngineError::Sandbox {
            reason: format!("interpreter could not read rules: {e}"),
        })?;
        let context: Value = serde_json::from_slice(context).map_err(|e| EngineError::Sandbox {
            reason: format!("interpreter could not read context: {e}"),
        })?;

        let decision = decide(&rules, &context);
        debug!(decision = ?decision.decision, code = %decision.code, "native interpreter finished");

        serde_json::to_vec(&decision).map_err(|e| EngineError::Sandbox {
            reason: format!("interpreter could not encode decision: {e}"),
        })
    }
}

/// Evaluate a rule set against a context document.
pub fn decide(rules: &RuleSet, context: &Value) -> Decision {
    if rules.rules.is_empty() {
        return reject(CODE_EMPTY_RULE_SET, "rule set has no rules".to_string());
    }

    match rules.logic {
        Logic::And => match rules.rules.iter().find(|rule| !rule_holds(rule, context)) {
            Some(failed) => reject(
                CODE_RULE_NOT_SATISFIED,
                format!("rule '{}' not satisfied", failed.id()),
            ),
            None => Decision::allow(CODE_OK),
        },
        Logic::Or => {
            if rules.rules.iter().any(|rule| rule_holds(rule, context)) {
                Decision::allow(CODE_OK)
            } else {
                reject(CODE_RULE_NOT_SATISFIED, "no rule satisfied".to_string())
            }
        }
    }
}

fn reject(code: &str, reason: String) -> Decision {
    Decision {
        decision: Verdict::Reject,
        code: code.to_string(),
        reason: Some(reason),
    }
}

fn rule_holds(rule: &Rule, context: &Value) -> bool {
    match rule {
        Rule::Simple(simple) => condition_holds(&simple.condition, context),
        Rule::Grouped(grouped) => combine(
            grouped.logic,
            grouped.conditions.iter().map(|c| condition_holds(c, context)),
        ),
        Rule::Nested(nested) => combine(
            nested.logic,
            nested.rules.iter().map(|r| rule_holds(r, context)),
        ),
    }
}

fn combine(logic: Logic, mut results: impl Iterator<Item = bool>) -> bool {
    match logic {
        Logic::And => results.all(|held| held),
        Logic::Or => results.any(|held| held),
    }
}

fn condition_holds(condition: &RuleCondition, context: &Value) -> bool {
    let actual = match lookup_path(context, &condition.field) {
        Some(value) if !value.is_null() => value,
        _ => return false,
    };
    let expected = &condition.value;

    match condition.op {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => decimal_cmp(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(
            decimal_cmp(actual, expected),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Operator::Lt => decimal_cmp(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(
            decimal_cmp(actual, expected),
            Some(Ordering::Less | Ordering::Equal)
        ),
        Operator::In => match expected {
            Value::Array(items) => items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
        Operator::NotIn => match expected {
            Value::Array(items) => !items.iter().any(|item| values_equal(actual, item)),
            _ => false,
        },
    }
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (as_decimal(left), as_decimal(right)) {
        (Some(l), Some(r)) => l == r,
        _ => left == right,
    }
}

fn decimal_cmp(left: &Value, right: &Value) -> Option<Ordering> {
    Some(as_decimal(left)?.cmp(&as_decimal(right)?))
}

/// Read a JSON number or numeric string as an exact decimal.
fn as_decimal(value: &Value) -> Option<BigDecimal> {
    match value {
        Value::Number(number) => BigDecimal::from_str(&number.to_string()).ok(),
        Value::String(text) if looks_numeric(text) => BigDecimal::from_str(text).ok(),
        _ => None,
    }
}

/// Plain decimal notation only: optional sign, digits, optional fraction.
/// Keeps hex addresses and exponent forms out of numeric comparison.
fn looks_numeric(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let mut parts = digits.splitn(2, '.');
    let whole = parts.next().unwrap_or_default();
    let fraction = parts.next();
    !whole.is_empty()
        && whole.bytes().all(|b| b.is_ascii_digit())
        && fraction.map_or(true, |f| !f.is_empty() && f.bytes().all(|b| b.is_ascii_digit()))
}
