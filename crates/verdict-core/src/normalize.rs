//! Context normalization.
//!
//! Addresses are lowercased and asset symbols uppercased before
//! canonicalization, so case variance in input never changes a hash or a
//! decision. Only ASCII case is folded; the result does not depend on the
//! host's Unicode tables. Normalization is idempotent.

use verdict_contracts::context::Context;

/// Return a normalized copy of `context`. The input is not modified.
pub fn normalize_context(context: &Context) -> Context {
    let mut out = context.clone();
    out.tx.sender = out.tx.sender.as_deref().map(normalize_address);
    out.tx.receiver = out.tx.receiver.as_deref().map(normalize_address);
    out.tx.asset = normalize_asset(&out.tx.asset);
    if let Some(pay_id) = out.pay_id.as_mut() {
        pay_id.owner = normalize_address(&pay_id.owner);
    }
    out
}

pub fn normalize_address(address: &str) -> String {
    address.to_ascii_lowercase()
}

pub fn normalize_asset(asset: &str) -> String {
    asset.to_ascii_uppercase()
}
