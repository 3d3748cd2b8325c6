//! AND-combination of authority rules with session rules.
//!
//! Combination only ever adds rules under top-level AND, so a session can
//! tighten the authority's policy but never loosen it. The output is always
//! canonical.

use std::collections::HashSet;

use verdict_contracts::{
    error::EngineResult,
    rule::{Logic, NestedRule, Rule, RuleSet, DEFAULT_RULE_SET_VERSION},
};
use verdict_core::canonical::canonicalize_rule_set;

/// Prefix of the ids `combine_session_policies` gives wrapped session rules,
/// and of session rules renamed to avoid an id already taken.
pub const SESSION_RULE_PREFIX: &str = "session:";

/// Id of the nested rule holding an OR authority's rules.
pub const AUTHORITY_RULE_ID: &str = "authority";

/// Combine `authority` with extra `session_rules`.
///
/// The result has the authority's version (default `"1"`), AND logic, the
/// authority's rules followed by `session_rules`, and the authority's
/// `requires`. A session rule whose id is already taken is renamed under
/// `session:`, so two well-formed inputs always combine. Errors only come
/// from an authority that does not canonicalize on its own.
pub fn combine(authority: &RuleSet, session_rules: Vec<Rule>) -> EngineResult<RuleSet> {
    let version = if authority.version.is_empty() {
        DEFAULT_RULE_SET_VERSION.to_string()
    } else {
        authority.version.clone()
    };
    combine_into(version, authority.rules.clone(), session_rules, authority.requires.clone())
}

/// Combine `authority` with whole session rule sets.
///
/// Each session becomes one nested rule `session:<index>` that keeps the
/// session's own logic, so an OR inside a session stays an OR while the
/// combination as a whole is AND. An OR authority is nested the same way
/// under `authority`, so the combined set is exactly "authority AND every
/// session". Session `requires` paths are merged in.
pub fn combine_session_policies(authority: &RuleSet, sessions: &[RuleSet]) -> EngineResult<RuleSet> {
    let version = if authority.version.is_empty() {
        DEFAULT_RULE_SET_VERSION.to_string()
    } else {
        authority.version.clone()
    };
    let authority_rules = match authority.logic {
        Logic::And => authority.rules.clone(),
        Logic::Or => vec![Rule::Nested(NestedRule {
            id: AUTHORITY_RULE_ID.to_string(),
            logic: Logic::Or,
            rules: authority.rules.clone(),
        })],
    };

    let mut requires = authority.requires.clone();
    let wrapped: Vec<Rule> = sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            requires.extend(session.requires.iter().cloned());
            Rule::Nested(NestedRule {
                id: format!("{SESSION_RULE_PREFIX}{index}"),
                logic: session.logic,
                rules: session.rules.clone(),
            })
        })
        .collect();
    combine_into(version, authority_rules, wrapped, requires)
}

fn combine_into(
    version: String,
    mut rules: Vec<Rule>,
    session_rules: Vec<Rule>,
    requires: Vec<String>,
) -> EngineResult<RuleSet> {
    let mut taken: HashSet<String> = rules.iter().map(|rule| rule.id().to_string()).collect();
    for rule in session_rules {
        let id = free_id(&taken, rule.id());
        taken.insert(id.clone());
        rules.push(if id == rule.id() { rule } else { rule.with_id(id) });
    }

    canonicalize_rule_set(&RuleSet {
        version,
        logic: Logic::And,
        rules,
        requires,
    })
}

/// `id` itself when free, else the first free `session:<id>[:<n>]`.
fn free_id(taken: &HashSet<String>, id: &str) -> String {
    if !taken.contains(id) {
        return id.to_string();
    }
    let base = format!("{SESSION_RULE_PREFIX}{id}");
    let mut candidate = base.clone();
    let mut n = 1;
    while taken.contains(&candidate) {
        candidate = format!("{base}:{n}");
        n += 1;
    }
    candidate
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use verdict_contracts::{
        error::EngineError,
        rule::{Logic, Operator, Rule, RuleSet},
    };
    use verdict_core::canonical::canonicalize_rule_set;

    use super::*;

    fn authority() -> RuleSet {
        let mut rules = RuleSet::all_of(vec![
            Rule::simple("min", "tx.amount", Operator::Gte, json!("100")),
            Rule::simple("asset", "tx.asset", Operator::Eq, json!("USDC")),
        ]);
        rules.version = "7".to_string();
        rules.requires = vec!["tx.amount".to_string()];
        rules
    }

    fn ids(rules: &RuleSet) -> Vec<&str> {
        rules.rules.iter().map(Rule::id).collect()
    }

    #[test]
    fn test_combination_is_and_and_additive() {
        let session = vec![Rule::simple("cap", "tx.amount", Operator::Lte, json!("500"))];
        let combined = combine(&authority(), session).unwrap();

        assert_eq!(combined.logic, Logic::And);
        assert_eq!(combined.version, "7");
        assert_eq!(combined.rules.len(), 3);
        assert_eq!(combined.requires, ["tx.amount"]);
        assert_eq!(canonicalize_rule_set(&combined).unwrap(), combined);
    }

    #[test]
    fn test_or_authority_still_combines_under_and() {
        let mut or_authority = authority();
        or_authority.logic = Logic::Or;
        let combined = combine(&or_authority, Vec::new()).unwrap();
        assert_eq!(combined.logic, Logic::And);
        assert_eq!(combined.rules.len(), 2);
    }

    #[test]
    fn test_empty_version_defaults() {
        let mut unversioned = authority();
        unversioned.version.clear();
        assert_eq!(combine(&unversioned, Vec::new()).unwrap().version, "1");
    }

    #[test]
    fn test_colliding_session_id_is_renamed() {
        let session = vec![
            Rule::simple("min", "tx.amount", Operator::Gte, json!("0")),
            Rule::simple("session:min", "tx.amount", Operator::Lte, json!("900")),
            Rule::simple("min", "tx.asset", Operator::Eq, json!("USDC")),
        ];
        let combined = combine(&authority(), session).unwrap();
        assert_eq!(
            ids(&combined),
            ["asset", "min", "session:min", "session:min:1", "session:session:min"]
        );

        // The authority's own rule keeps its id and its condition.
        match &combined.rules[1] {
            Rule::Simple(rule) => assert_eq!(rule.condition.value, json!("100")),
            other => panic!("expected simple rule, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_authority_still_fails() {
        let mut broken = authority();
        broken.rules.push(Rule::simple("min", "tx.amount", Operator::Lt, json!("9")));
        let err = combine(&broken, Vec::new()).unwrap_err();
        assert!(matches!(err, EngineError::Canonicalization { .. }));
    }

    #[test]
    fn test_session_policies_wrapped_and_requires_merged() {
        let mut session = RuleSet::all_of(vec![
            Rule::simple("min", "tx.amount", Operator::Gte, json!("0")),
            Rule::simple("dai", "tx.asset", Operator::Eq, json!("DAI")),
        ]);
        session.logic = Logic::Or;
        session.requires = vec!["risk.score".to_string(), "tx.amount".to_string()];

        let combined = combine_session_policies(&authority(), &[session.clone(), session]).unwrap();
        assert_eq!(ids(&combined), ["asset", "min", "session:0", "session:1"]);
        assert_eq!(combined.requires, ["risk.score", "tx.amount"]);

        match &combined.rules[2] {
            Rule::Nested(nested) => {
                assert_eq!(nested.logic, Logic::Or);
                assert_eq!(nested.rules[0].id(), "dai");
            }
            other => panic!("expected nested session rule, got {:?}", other),
        }
    }

    #[test]
    fn test_or_authority_is_nested_with_session_policies() {
        let mut or_authority = authority();
        or_authority.logic = Logic::Or;
        let session = RuleSet::all_of(vec![Rule::simple("cap", "tx.amount", Operator::Lte, json!("500"))]);

        let combined = combine_session_policies(&or_authority, &[session]).unwrap();
        assert_eq!(combined.logic, Logic::And);
        assert_eq!(ids(&combined), ["authority", "session:0"]);
        assert_eq!(combined.requires, ["tx.amount"]);

        match &combined.rules[0] {
            Rule::Nested(nested) => {
                assert_eq!(nested.logic, Logic::Or);
                let inner: Vec<&str> = nested.rules.iter().map(Rule::id).collect();
                assert_eq!(inner, ["asset", "min"]);
            }
            other => panic!("expected nested authority rule, got {:?}", other),
        }
    }

    #[test]
    fn test_authority_id_clash_with_session_wrapper() {
        let authority = RuleSet::all_of(vec![Rule::simple(
            "session:0",
            "tx.asset",
            Operator::Eq,
            json!("USDC"),
        )]);
        let session = RuleSet::all_of(vec![Rule::simple("cap", "tx.amount", Operator::Lte, json!("5"))]);
        let combined = combine_session_policies(&authority, &[session]).unwrap();
        assert_eq!(ids(&combined), ["session:0", "session:session:0"]);
    }
}
