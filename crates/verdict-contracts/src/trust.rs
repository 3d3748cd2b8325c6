//! Caller-supplied trust for attested context documents.
//!
//! Trust is never ambient: every evaluation receives a `TrustMode` from its
//! caller. `Attested` with an empty issuer set rejects every attested
//! document; only the explicitly named `LegacyUnverified` mode skips checks.

use std::collections::HashSet;

use alloy_primitives::Address;

/// The set of issuers whose attestations the caller accepts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedIssuers {
    inner: HashSet<Address>,
}

impl TrustedIssuers {
    /// Build a set from any iterator of addresses.
    pub fn new(issuers: impl IntoIterator<Item = Address>) -> Self {
        Self {
            inner: issuers.into_iter().collect(),
        }
    }

    /// Add an issuer to this set.
    pub fn trust(&mut self, issuer: Address) {
        self.inner.insert(issuer);
    }

    /// Return true if `issuer` is trusted. Addresses compare by bytes, so
    /// hex casing in the source document is irrelevant.
    pub fn contains(&self, issuer: &Address) -> bool {
        self.inner.contains(issuer)
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Return an iterator over all trusted issuers.
    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.inner.iter()
    }
}

/// How the engine treats attested sub-documents for one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustMode {
    /// Every attested document must be signed by one of these issuers,
    /// unexpired and unmodified.
    Attested(TrustedIssuers),
    /// Attestations are not checked at all. Lower trust; callers must opt in
    /// by name.
    LegacyUnverified,
}

impl TrustMode {
    /// Shorthand for `TrustMode::Attested` over the given issuers.
    pub fn attested(issuers: impl IntoIterator<Item = Address>) -> Self {
        Self::Attested(TrustedIssuers::new(issuers))
    }

    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyUnverified)
    }
}
