//! Rule resolution: turn a rule reference into a verified `RuleSet`.
//!
//! Remote references are fetched, pinned and validated in a fixed order:
//!
//! 1. scheme check (`http`, `https`, `ipfs`; anything else is
//!    `UNSUPPORTED_URI_SCHEME`)
//! 2. fetch through the transport (`RULE_FETCH_FAILED`)
//! 3. SHA-256 of the raw fetched bytes against the pinned hash, when one is
//!    given (`RULE_HASH_MISMATCH`, no fallback)
//! 4. JSON Schema validation and deserialization (`INVALID_RULE_DOCUMENT`)
//!
//! The returned rule set is in canonical form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use verdict_contracts::{
    error::{EngineError, EngineResult},
    rule::RuleSet,
};
use verdict_core::{
    canonical::canonicalize_rule_set,
    hashing::{hash_bytes, parse_digest, rule_set_hash, to_hex},
    traits::RuleTransport,
};

use crate::{schema::RuleSchema, settings::ResolverSettings, transport::HttpTransport};

/// A remote rule document, optionally pinned by the SHA-256 of its bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSource {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Where the authority rules of an authorization come from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RuleReference {
    /// Rules supplied with the request. `expected_hash`, when present, pins
    /// the rule set hash of the canonical form.
    Inline {
        rules: RuleSet,
        #[serde(rename = "expectedHash", default, skip_serializing_if = "Option::is_none")]
        expected_hash: Option<String>,
    },
    Remote(RuleSource),
}

/// Resolves rule references through a pluggable transport.
pub struct RuleResolver {
    transport: Box<dyn RuleTransport>,
    ipfs_gateway: Url,
    schema: RuleSchema,
}

impl RuleResolver {
    pub fn new(transport: Box<dyn RuleTransport>, settings: &ResolverSettings) -> EngineResult<Self> {
        let ipfs_gateway = Url::parse(&settings.ipfs_gateway).map_err(|e| EngineError::Config {
            reason: format!("invalid ipfs_gateway '{}': {e}", settings.ipfs_gateway),
        })?;
        if !matches!(ipfs_gateway.scheme(), "http" | "https") {
            return Err(EngineError::Config {
                reason: format!("ipfs_gateway must be http(s), got '{}'", ipfs_gateway.scheme()),
            });
        }
        Ok(Self {
            transport,
            ipfs_gateway,
            schema: RuleSchema::new()?,
        })
    }

    /// A resolver over the blocking HTTP transport.
    pub fn http(settings: &ResolverSettings) -> EngineResult<Self> {
        Self::new(Box::new(HttpTransport::new(settings)?), settings)
    }

    /// Resolve either kind of reference.
    pub fn resolve_reference(&self, reference: &RuleReference) -> EngineResult<RuleSet> {
        match reference {
            RuleReference::Inline {
                rules,
                expected_hash,
            } => resolve_inline(rules, expected_hash.as_deref()),
            RuleReference::Remote(source) => self.resolve(source),
        }
    }

    /// Fetch, pin-check and parse a remote rule document.
    pub fn resolve(&self, source: &RuleSource) -> EngineResult<RuleSet> {
        let location = self.locate(&source.uri)?;
        let bytes = self.transport.fetch(&location)?;

        if let Some(pinned) = &source.hash {
            let expected = parse_digest(pinned)?;
            let actual = hash_bytes(&bytes);
            if actual != expected {
                return Err(EngineError::RuleHashMismatch {
                    expected: to_hex(&expected),
                    actual: to_hex(&actual),
                });
            }
            debug!(uri = %source.uri, hash = %to_hex(&actual), "rule document matches pinned hash");
        }

        let document: Value = serde_json::from_slice(&bytes).map_err(|e| {
            EngineError::InvalidRuleDocument {
                reason: format!("not JSON: {e}"),
            }
        })?;
        self.schema.validate(&document)?;
        let rules: RuleSet =
            serde_json::from_value(document).map_err(|e| EngineError::InvalidRuleDocument {
                reason: e.to_string(),
            })?;
        let canonical = canonicalize_rule_set(&rules).map_err(|e| EngineError::InvalidRuleDocument {
            reason: e.to_string(),
        })?;

        info!(uri = %source.uri, rules = canonical.rules.len(), "rules resolved");
        Ok(canonical)
    }

    /// Map a rule URI to the HTTP(S) location the transport fetches.
    fn locate(&self, uri: &str) -> EngineResult<String> {
        let parsed = Url::parse(uri).map_err(|e| EngineError::RuleFetchFailed {
            uri: uri.to_string(),
            reason: format!("invalid URI: {e}"),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(parsed.into()),
            "ipfs" => {
                // The CID is case-sensitive, so take it from the raw text
                // rather than the parsed host.
                let content = uri
                    .split_once("://")
                    .map(|(_, rest)| rest.trim_start_matches('/'))
                    .unwrap_or_default();
                if content.is_empty() {
                    return Err(EngineError::RuleFetchFailed {
                        uri: uri.to_string(),
                        reason: "missing content identifier".to_string(),
                    });
                }
                let base = self.ipfs_gateway.as_str().trim_end_matches('/');
                Ok(format!("{base}/ipfs/{content}"))
            }
            other => Err(EngineError::UnsupportedUriScheme {
                scheme: other.to_string(),
            }),
        }
    }
}

/// Canonicalize inline rules and check them against an optional pinned
/// rule set hash.
pub fn resolve_inline(rules: &RuleSet, expected_hash: Option<&str>) -> EngineResult<RuleSet> {
    let canonical = canonicalize_rule_set(rules)?;
    if let Some(pinned) = expected_hash {
        let expected = parse_digest(pinned)?;
        let actual = rule_set_hash(&canonical)?;
        if actual != expected {
            return Err(EngineError::RuleHashMismatch {
                expected: to_hex(&expected),
                actual: to_hex(&actual),
            });
        }
    }
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        sync::{Arc, Mutex},
    };

    use serde_json::json;

    use verdict_contracts::{
        error::EngineError,
        rule::{Operator, Rule, RuleSet},
    };
    use verdict_core::{
        hashing::{hash_bytes, rule_set_hash, to_hex},
        traits::RuleTransport,
    };

    use super::*;

    // ── Mock transport ───────────────────────────────────────────────────────

    /// Serves fixed documents by location and records every fetch.
    struct MockTransport {
        documents: HashMap<String, Vec<u8>>,
        fetched: Arc<Mutex<Vec<String>>>,
    }

    impl RuleTransport for MockTransport {
        fn fetch(&self, uri: &str) -> EngineResult<Vec<u8>> {
            self.fetched.lock().unwrap().push(uri.to_string());
            self.documents
                .get(uri)
                .cloned()
                .ok_or_else(|| EngineError::RuleFetchFailed {
                    uri: uri.to_string(),
                    reason: "server answered 404 Not Found".to_string(),
                })
        }
    }

    const DOC: &[u8] = br#"{"rules":[{"id":"z","if":{"field":"tx.asset","op":"==","value":"USDC"}},{"id":"a","if":{"field":"tx.amount","op":">=","value":"1"}}]}"#;

    fn resolver_with(documents: &[(&str, &[u8])]) -> (RuleResolver, Arc<Mutex<Vec<String>>>) {
        let fetched = Arc::new(Mutex::new(Vec::new()));
        let transport = MockTransport {
            documents: documents
                .iter()
                .map(|(uri, body)| (uri.to_string(), body.to_vec()))
                .collect(),
            fetched: Arc::clone(&fetched),
        };
        let settings = ResolverSettings {
            ipfs_gateway: "https://gateway.test/".to_string(),
            ..ResolverSettings::default()
        };
        (RuleResolver::new(Box::new(transport), &settings).unwrap(), fetched)
    }

    fn source(uri: &str, hash: Option<String>) -> RuleSource {
        RuleSource {
            uri: uri.to_string(),
            hash,
        }
    }

    // ── Remote ───────────────────────────────────────────────────────────────

    #[test]
    fn test_https_document_resolves_canonical() {
        let (resolver, _) = resolver_with(&[("https://rules.test/r.json", DOC)]);
        let rules = resolver.resolve(&source("https://rules.test/r.json", None)).unwrap();
        let ids: Vec<&str> = rules.rules.iter().map(Rule::id).collect();
        assert_eq!(ids, ["a", "z"]);
    }

    #[test]
    fn test_pinned_hash_of_raw_bytes_matches() {
        let (resolver, _) = resolver_with(&[("https://rules.test/r.json", DOC)]);
        let pinned = to_hex(&hash_bytes(DOC)).to_uppercase().replacen("0X", "0x", 1);
        resolver
            .resolve(&source("https://rules.test/r.json", Some(pinned)))
            .unwrap();
    }

    #[test]
    fn test_hash_mismatch_is_fatal() {
        let (resolver, _) = resolver_with(&[("https://rules.test/r.json", DOC)]);
        let other = to_hex(&hash_bytes(b"something else"));
        let err = resolver
            .resolve(&source("https://rules.test/r.json", Some(other.clone())))
            .unwrap_err();
        match err {
            EngineError::RuleHashMismatch { expected, actual } => {
                assert_eq!(expected, other);
                assert_eq!(actual, to_hex(&hash_bytes(DOC)));
            }
            other => panic!("expected RuleHashMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_ipfs_goes_through_gateway_preserving_cid_case() {
        let (resolver, fetched) = resolver_with(&[(
            "https://gateway.test/ipfs/QmYwAPJzv5CZsnA/rules.json",
            DOC,
        )]);
        resolver
            .resolve(&source("ipfs://QmYwAPJzv5CZsnA/rules.json", None))
            .unwrap();
        assert_eq!(
            fetched.lock().unwrap().as_slice(),
            ["https://gateway.test/ipfs/QmYwAPJzv5CZsnA/rules.json"]
        );
    }

    #[test]
    fn test_unsupported_scheme_never_fetches() {
        let (resolver, fetched) = resolver_with(&[]);
        for uri in ["ftp://rules.test/r.json", "file:///etc/rules.json"] {
            let err = resolver.resolve(&source(uri, None)).unwrap_err();
            assert!(matches!(err, EngineError::UnsupportedUriScheme { .. }), "uri {uri}");
        }
        assert!(fetched.lock().unwrap().is_empty());
    }

    #[test]
    fn test_fetch_failure_propagates() {
        let (resolver, _) = resolver_with(&[]);
        let err = resolver.resolve(&source("https://rules.test/gone", None)).unwrap_err();
        assert!(matches!(err, EngineError::RuleFetchFailed { .. }));
    }

    #[test]
    fn test_invalid_documents_rejected() {
        let (resolver, _) = resolver_with(&[
            ("https://rules.test/text", b"not json".as_slice()),
            ("https://rules.test/shape", br#"{"rules":[{"id":"a"}]}"#.as_slice()),
            (
                "https://rules.test/dup",
                br#"{"rules":[{"id":"a","if":{"field":"x","op":"==","value":1}},{"id":"a","if":{"field":"y","op":"==","value":1}}]}"#
                    .as_slice(),
            ),
        ]);
        for uri in ["https://rules.test/text", "https://rules.test/shape", "https://rules.test/dup"] {
            let err = resolver.resolve(&source(uri, None)).unwrap_err();
            assert!(
                matches!(err, EngineError::InvalidRuleDocument { .. }),
                "expected InvalidRuleDocument for {uri}, got {:?}",
                err
            );
        }
    }

    #[test]
    fn test_bad_gateway_is_config_error() {
        let transport = MockTransport {
            documents: HashMap::new(),
            fetched: Arc::new(Mutex::new(Vec::new())),
        };
        let settings = ResolverSettings {
            ipfs_gateway: "ipfs://nested".to_string(),
            ..ResolverSettings::default()
        };
        let err = RuleResolver::new(Box::new(transport), &settings).err();
        assert!(matches!(err, Some(EngineError::Config { .. })));
    }

    // ── Inline ───────────────────────────────────────────────────────────────

    #[test]
    fn test_inline_pinning() {
        let rules = RuleSet::all_of(vec![
            Rule::simple("b", "tx.asset", Operator::Eq, json!("USDC")),
            Rule::simple("a", "tx.amount", Operator::Gte, json!("1")),
        ]);
        let hash = to_hex(&rule_set_hash(&rules).unwrap());
        let reference = RuleReference::Inline {
            rules: rules.clone(),
            expected_hash: Some(hash),
        };
        let (resolver, fetched) = resolver_with(&[]);
        assert_eq!(resolver.resolve_reference(&reference).unwrap().rules[0].id(), "a");
        assert!(fetched.lock().unwrap().is_empty());

        let err = resolve_inline(&rules, Some(&to_hex(&hash_bytes(b"x")))).unwrap_err();
        assert!(matches!(err, EngineError::RuleHashMismatch { .. }));
    }

    #[test]
    fn test_reference_wire_shape() {
        let reference: RuleReference = serde_json::from_value(json!({
            "remote": { "uri": "ipfs://Qm/rules.json", "hash": "0x00" }
        }))
        .unwrap();
        assert_eq!(
            reference,
            RuleReference::Remote(source("ipfs://Qm/rules.json", Some("0x00".to_string())))
        );

        let inline: RuleReference = serde_json::from_value(json!({
            "inline": { "rules": { "rules": [] }, "expectedHash": "0x01" }
        }))
        .unwrap();
        assert!(matches!(inline, RuleReference::Inline { expected_hash: Some(_), .. }));
    }
}
