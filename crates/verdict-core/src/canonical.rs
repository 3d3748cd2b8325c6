//! Deterministic canonical form for rule sets and arbitrary payloads.
//!
//! Canonical form rules:
//!
//! - object keys are sorted byte-wise, recursively;
//! - arrays keep their order;
//! - integers outside the IEEE-754 safe range (|n| > 2^53 - 1) become decimal
//!   strings, so verifiers in any language reproduce the same text;
//! - timestamps (`chrono::DateTime`) serialize as ISO-8601 strings;
//! - values that cannot be represented as JSON are rejected with
//!   `EngineError::Canonicalization`.
//!
//! Rule sets additionally have every sibling rule list sorted by `id`
//! (recursively) and `requires` sorted and de-duplicated. The canonical byte
//! form is the compact UTF-8 JSON text of the canonical value.
//!
//! Canonicalization is idempotent: canonicalizing a canonical value yields
//! byte-identical output.

use serde::Serialize;
use serde_json::{Map, Number, Value};

use verdict_contracts::{
    error::{EngineError, EngineResult},
    rule::{GroupedRule, NestedRule, Rule, RuleCondition, RuleSet, SimpleRule},
};

/// Largest integer every JSON implementation represents exactly.
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Deepest rule nesting accepted before canonicalization gives up.
pub const MAX_RULE_DEPTH: usize = 64;

/// A value in canonical form together with its canonical byte encoding.
///
/// Only this module constructs `CanonicalForm`, so holding one proves the
/// bytes were produced by canonicalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalForm {
    value: Value,
    bytes: Vec<u8>,
}

impl CanonicalForm {
    pub fn as_value(&self) -> &Value {
        &self.value
    }

    /// The canonical UTF-8 JSON text, as bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The canonical JSON text.
    pub fn as_str(&self) -> &str {
        // serde_json only ever emits UTF-8.
        std::str::from_utf8(&self.bytes).unwrap_or_default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Canonicalize any serializable value.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> EngineResult<CanonicalForm> {
    let raw = serde_json::to_value(value).map_err(|e| EngineError::Canonicalization {
        reason: format!("value is not representable as JSON: {e}"),
    })?;
    canonicalize_value(raw)
}

/// Canonicalize an already-parsed JSON value.
pub fn canonicalize_value(value: Value) -> EngineResult<CanonicalForm> {
    let value = canonical_value(value)?;
    let bytes = serde_json::to_vec(&value).map_err(|e| EngineError::Canonicalization {
        reason: format!("failed to encode canonical JSON: {e}"),
    })?;
    Ok(CanonicalForm { value, bytes })
}

/// Canonicalize a rule set: canonical condition values, sibling rules sorted
/// by `id` at every level, `requires` sorted and de-duplicated.
///
/// Fails if two siblings share an `id` or nesting exceeds `MAX_RULE_DEPTH`.
pub fn canonicalize_rule_set(rule_set: &RuleSet) -> EngineResult<RuleSet> {
    let mut requires = rule_set.requires.clone();
    requires.sort();
    requires.dedup();

    Ok(RuleSet {
        version: rule_set.version.clone(),
        logic: rule_set.logic,
        rules: canonical_rules(&rule_set.rules, 0)?,
        requires,
    })
}

/// Canonicalize a rule set and encode it.
pub fn rule_set_canonical_form(rule_set: &RuleSet) -> EngineResult<CanonicalForm> {
    canonicalize(&canonicalize_rule_set(rule_set)?)
}

fn canonical_value(value: Value) -> EngineResult<Value> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(String, Value)> = map.into_iter().collect();
            entries.sort_by(|(a, _), (b, _)| a.as_bytes().cmp(b.as_bytes()));

            let mut out = Map::new();
            for (key, child) in entries {
                out.insert(key, canonical_value(child)?);
            }
            Ok(Value::Object(out))
        }
        Value::Array(items) => items
            .into_iter()
            .map(canonical_value)
            .collect::<EngineResult<Vec<_>>>()
            .map(Value::Array),
        Value::Number(number) => canonical_number(number),
        other => Ok(other),
    }
}

fn canonical_number(number: Number) -> EngineResult<Value> {
    if let Some(n) = number.as_u64() {
        if n > MAX_SAFE_INTEGER {
            return Ok(Value::String(n.to_string()));
        }
        return Ok(Value::Number(number));
    }
    if let Some(n) = number.as_i64() {
        if n.unsigned_abs() > MAX_SAFE_INTEGER {
            return Ok(Value::String(n.to_string()));
        }
        return Ok(Value::Number(number));
    }
    match number.as_f64() {
        Some(f) if f.is_finite() => Ok(Value::Number(number)),
        _ => Err(EngineError::Canonicalization {
            reason: format!("number {number} has no canonical representation"),
        }),
    }
}

fn canonical_rules(rules: &[Rule], depth: usize) -> EngineResult<Vec<Rule>> {
    if depth > MAX_RULE_DEPTH {
        return Err(EngineError::Canonicalization {
            reason: format!("rule nesting exceeds {MAX_RULE_DEPTH} levels"),
        });
    }

    let mut out = rules
        .iter()
        .map(|rule| canonical_rule(rule, depth))
        .collect::<EngineResult<Vec<_>>>()?;
    out.sort_by(|a, b| a.id().as_bytes().cmp(b.id().as_bytes()));

    if let Some(pair) = out.windows(2).find(|pair| pair[0].id() == pair[1].id()) {
        return Err(EngineError::Canonicalization {
            reason: format!("duplicate rule id '{}' among siblings", pair[0].id()),
        });
    }
    Ok(out)
}

fn canonical_rule(rule: &Rule, depth: usize) -> EngineResult<Rule> {
    Ok(match rule {
        Rule::Simple(simple) => Rule::Simple(SimpleRule {
            id: simple.id.clone(),
            condition: canonical_condition(&simple.condition)?,
        }),
        Rule::Grouped(grouped) => Rule::Grouped(GroupedRule {
            id: grouped.id.clone(),
            logic: grouped.logic,
            conditions: grouped
                .conditions
                .iter()
                .map(canonical_condition)
                .collect::<EngineResult<Vec<_>>>()?,
        }),
        Rule::Nested(nested) => Rule::Nested(NestedRule {
            id: nested.id.clone(),
            logic: nested.logic,
            rules: canonical_rules(&nested.rules, depth + 1)?,
        }),
    })
}

fn canonical_condition(condition: &RuleCondition) -> EngineResult<RuleCondition> {
    Ok(RuleCondition {
        field: condition.field.clone(),
        op: condition.op,
        value: canonical_value(condition.value.clone())?,
    })
}
