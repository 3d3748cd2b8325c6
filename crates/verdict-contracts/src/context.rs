//! Evaluation context types.
//!
//! A `Context` is built fresh for every evaluation and never mutated by the
//! engine; normalization produces a new value. The base transaction fields
//! form the legacy (unattested) shape; the optional `env`, `state`, `oracle`
//! and `risk` documents each carry their own `Attestation`.

use alloy_primitives::hex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::{
    attestation::{Attestation, AttestedDomain},
    error::{EngineError, EngineResult},
};

/// The transaction being authorized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver: Option<String>,
    /// Asset symbol, e.g. `"USDC"`.
    pub asset: String,
    /// Amount in base units, as a decimal string.
    pub amount: String,
    pub chain_id: u64,
}

/// Payment identifier and its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayId {
    pub id: String,
    pub owner: String,
}

/// Attested execution environment (e.g. a trusted timestamp).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvDocument {
    pub timestamp: u64,
    pub proof: Attestation,
}

/// Attested spend-state for the payer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SpendStateDocument {
    /// Amount already spent in the current period, as a decimal string.
    pub spent_today: String,
    pub period: String,
    pub proof: Attestation,
}

/// Attested oracle data. Field names are oracle-defined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleDocument {
    #[serde(flatten)]
    pub fields: Map<String, Value>,
    pub proof: Attestation,
}

/// Attested risk score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RiskDocument {
    /// Any JSON number; fractional scores are carried as given.
    pub score: Number,
    pub category: String,
    pub proof: Attestation,
}

/// The full evaluation context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
    pub tx: Transaction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pay_id: Option<PayId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<EnvDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<SpendStateDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskDocument>,
}

/// One attested sub-document, split into its signed fields and its proof.
#[derive(Debug, Clone)]
pub struct AttestedDocument<'a> {
    pub domain: AttestedDomain,
    /// Exactly the fields the attestation signature covers.
    pub signed_fields: Map<String, Value>,
    pub proof: &'a Attestation,
}

impl Context {
    /// Build a legacy context holding only a transaction.
    pub fn for_transaction(tx: Transaction) -> Self {
        Self {
            tx,
            pay_id: None,
            env: None,
            state: None,
            oracle: None,
            risk: None,
        }
    }

    /// Return true if any attested sub-document is present.
    pub fn has_attested_documents(&self) -> bool {
        self.env.is_some() || self.state.is_some() || self.oracle.is_some() || self.risk.is_some()
    }

    /// Every attested sub-document present in this context, in
    /// `AttestedDomain::ALL` order.
    pub fn attested_documents(&self) -> EngineResult<Vec<AttestedDocument<'_>>> {
        let mut docs = Vec::new();
        if let Some(env) = &self.env {
            docs.push(split_document(AttestedDomain::Env, env, &env.proof)?);
        }
        if let Some(state) = &self.state {
            docs.push(split_document(AttestedDomain::State, state, &state.proof)?);
        }
        if let Some(oracle) = &self.oracle {
            docs.push(split_document(AttestedDomain::Oracle, oracle, &oracle.proof)?);
        }
        if let Some(risk) = &self.risk {
            docs.push(split_document(AttestedDomain::Risk, risk, &risk.proof)?);
        }
        Ok(docs)
    }
}

/// Compute the signed field set of an attested document: every non-proof
/// field, plus `modelHash` hoisted from the proof for the risk domain.
pub fn signed_fields_of<T: Serialize>(
    domain: AttestedDomain,
    document: &T,
    proof: &Attestation,
) -> EngineResult<Map<String, Value>> {
    let value = serde_json::to_value(document).map_err(|e| EngineError::InvalidContext {
        reason: format!("cannot serialize '{domain}' document: {e}"),
    })?;
    let Value::Object(mut fields) = value else {
        return Err(EngineError::InvalidContext {
            reason: format!("'{domain}' document is not an object"),
        });
    };
    fields.remove("proof");

    if domain == AttestedDomain::Risk {
        if let Some(model_hash) = proof.model_hash {
            fields.insert("modelHash".to_string(), Value::String(hex::encode_prefixed(model_hash)));
        }
    }
    Ok(fields)
}

fn split_document<'a, T: Serialize>(
    domain: AttestedDomain,
    document: &T,
    proof: &'a Attestation,
) -> EngineResult<AttestedDocument<'a>> {
    Ok(AttestedDocument {
        domain,
        signed_fields: signed_fields_of(domain, document, proof)?,
        proof,
    })
}
