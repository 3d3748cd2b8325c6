//! Rule and rule-set types.
//!
//! A `RuleSet` is a pure tree: every `Rule` is owned by its parent and there
//! are no back-references. The three rule shapes are told apart by which key
//! they carry (`if`, `conditions` or `rules`); each shape rejects the keys of
//! the others so a document can never match two shapes at once.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How sibling rules or conditions are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Logic {
    #[default]
    And,
    Or,
}

/// Comparison operator of a single condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

/// `{field, op, value}`: compare the context value at `field` against `value`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleCondition {
    /// Dot-path into the context document, e.g. `"tx.amount"`.
    pub field: String,
    pub op: Operator,
    pub value: Value,
}

/// A rule holding exactly one condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SimpleRule {
    pub id: String,
    #[serde(rename = "if")]
    pub condition: RuleCondition,
}

/// A rule combining a flat list of conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GroupedRule {
    pub id: String,
    pub logic: Logic,
    pub conditions: Vec<RuleCondition>,
}

/// A rule combining child rules, recursively.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NestedRule {
    pub id: String,
    pub logic: Logic,
    pub rules: Vec<Rule>,
}

/// One of the three rule shapes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Rule {
    Simple(SimpleRule),
    Grouped(GroupedRule),
    Nested(NestedRule),
}

impl Rule {
    /// Build a simple rule.
    pub fn simple(id: impl Into<String>, field: impl Into<String>, op: Operator, value: Value) -> Self {
        Self::Simple(SimpleRule {
            id: id.into(),
            condition: RuleCondition { field: field.into(), op, value },
        })
    }

    /// The rule's identifier, unique among its siblings.
    pub fn id(&self) -> &str {
        match self {
            Self::Simple(rule) => &rule.id,
            Self::Grouped(rule) => &rule.id,
            Self::Nested(rule) => &rule.id,
        }
    }

    /// The same rule under a different id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        let id = id.into();
        match &mut self {
            Self::Simple(rule) => rule.id = id,
            Self::Grouped(rule) => rule.id = id,
            Self::Nested(rule) => rule.id = id,
        }
        self
    }
}

/// The default rule-set version when a document omits it.
pub const DEFAULT_RULE_SET_VERSION: &str = "1";

fn default_version() -> String {
    DEFAULT_RULE_SET_VERSION.to_string()
}

/// A complete, evaluable rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub logic: Logic,
    pub rules: Vec<Rule>,
    /// Context paths whose presence (non-null) is required before evaluation.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<String>,
}

impl RuleSet {
    /// Build an AND rule set at the default version.
    pub fn all_of(rules: Vec<Rule>) -> Self {
        Self {
            version: default_version(),
            logic: Logic::And,
            rules,
            requires: Vec::new(),
        }
    }
}
