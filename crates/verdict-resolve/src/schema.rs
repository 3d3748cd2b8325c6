//! Structural validation of fetched rule documents.
//!
//! Remote documents are untrusted input. Before a document is deserialized
//! into a `RuleSet` it is checked against a JSON Schema describing the three
//! rule shapes, so a malformed document is reported with the path of every
//! violation instead of serde's first error.

use jsonschema::Validator;
use serde_json::{json, Value};
use tracing::warn;

use verdict_contracts::error::{EngineError, EngineResult};

/// The JSON Schema of a rule set document.
pub fn rule_set_schema() -> Value {
    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "required": ["rules"],
        "additionalProperties": false,
        "properties": {
            "version": { "type": "string", "minLength": 1 },
            "logic": { "$ref": "#/$defs/logic" },
            "rules": { "type": "array", "items": { "$ref": "#/$defs/rule" } },
            "requires": {
                "type": "array",
                "items": { "type": "string", "minLength": 1 }
            }
        },
        "$defs": {
            "id": { "type": "string", "minLength": 1 },
            "logic": { "enum": ["AND", "OR"] },
            "condition": {
                "type": "object",
                "required": ["field", "op", "value"],
                "additionalProperties": false,
                "properties": {
                    "field": { "type": "string", "minLength": 1 },
                    "op": { "enum": ["==", "!=", ">", ">=", "<", "<=", "in", "not_in"] },
                    "value": true
                }
            },
            "rule": {
                "oneOf": [
                    {
                        "type": "object",
                        "required": ["id", "if"],
                        "additionalProperties": false,
                        "properties": {
                            "id": { "$ref": "#/$defs/id" },
                            "if": { "$ref": "#/$defs/condition" }
                        }
                    },
                    {
                        "type": "object",
                        "required": ["id", "logic", "conditions"],
                        "additionalProperties": false,
                        "properties": {
                            "id": { "$ref": "#/$defs/id" },
                            "logic": { "$ref": "#/$defs/logic" },
                            "conditions": {
                                "type": "array",
                                "items": { "$ref": "#/$defs/condition" }
                            }
                        }
                    },
                    {
                        "type": "object",
                        "required": ["id", "logic", "rules"],
                        "additionalProperties": false,
                        "properties": {
                            "id": { "$ref": "#/$defs/id" },
                            "logic": { "$ref": "#/$defs/logic" },
                            "rules": {
                                "type": "array",
                                "items": { "$ref": "#/$defs/rule" }
                            }
                        }
                    }
                ]
            }
        }
    })
}

/// A compiled rule set schema.
pub struct RuleSchema {
    validator: Validator,
}

impl RuleSchema {
    pub fn new() -> EngineResult<Self> {
        let validator =
            jsonschema::validator_for(&rule_set_schema()).map_err(|e| EngineError::Config {
                reason: format!("rule set schema does not compile: {e}"),
            })?;
        Ok(Self { validator })
    }

    /// Check `document`, reporting every violation in one error.
    pub fn validate(&self, document: &Value) -> EngineResult<()> {
        let violations: Vec<String> = self
            .validator
            .iter_errors(document)
            .map(|error| format!("at '{}': {}", error.instance_path, error))
            .collect();
        if violations.is_empty() {
            return Ok(());
        }

        warn!(violations = violations.len(), "rule document failed schema validation");
        Err(EngineError::InvalidRuleDocument {
            reason: violations.join("; "),
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use verdict_contracts::{error::EngineError, rule::RuleSet};

    use super::RuleSchema;

    fn schema() -> RuleSchema {
        RuleSchema::new().unwrap()
    }

    #[test]
    fn test_accepts_all_rule_shapes() {
        let document = json!({
            "version": "2",
            "logic": "OR",
            "requires": ["tx.amount"],
            "rules": [
                { "id": "a", "if": { "field": "tx.amount", "op": ">=", "value": "1" } },
                { "id": "b", "logic": "AND", "conditions": [
                    { "field": "tx.asset", "op": "in", "value": ["USDC"] }
                ] },
                { "id": "c", "logic": "OR", "rules": [
                    { "id": "c1", "if": { "field": "risk.score", "op": "<", "value": 50 } }
                ] }
            ]
        });
        schema().validate(&document).unwrap();
        // Whatever the schema accepts must also deserialize.
        serde_json::from_value::<RuleSet>(document).unwrap();
    }

    #[test]
    fn test_rejects_mixed_rule_shape() {
        let document = json!({
            "rules": [
                { "id": "a", "if": { "field": "x", "op": "==", "value": 1 }, "rules": [] }
            ]
        });
        let err = schema().validate(&document).unwrap_err();
        assert!(matches!(err, EngineError::InvalidRuleDocument { .. }));
    }

    #[test]
    fn test_reports_every_violation() {
        let document = json!({
            "logic": "XOR",
            "rules": [ { "id": "", "if": { "field": "x", "op": "~", "value": 1 } } ],
            "extra": true
        });
        match schema().validate(&document).unwrap_err() {
            EngineError::InvalidRuleDocument { reason } => {
                assert!(reason.contains("/logic"), "reason: {reason}");
                assert!(reason.contains("extra"), "reason: {reason}");
            }
            other => panic!("expected InvalidRuleDocument, got {:?}", other),
        }
    }

    #[test]
    fn test_rules_are_required() {
        assert!(schema().validate(&json!({ "version": "1" })).is_err());
        assert!(schema().validate(&json!([])).is_err());
    }
}
