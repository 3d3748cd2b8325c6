//! In-process secp256k1 signer.

use alloy_primitives::{Address, Signature, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use tracing::debug;

use verdict_contracts::error::{EngineError, EngineResult};

use crate::traits::{SigningCapability, TypedDataRequest};

/// A `SigningCapability` backed by a private key held in memory.
#[derive(Debug, Clone)]
pub struct LocalKeySigner {
    inner: PrivateKeySigner,
}

impl LocalKeySigner {
    /// Parse a hex private key (with or without `0x`).
    pub fn from_private_key_hex(key: &str) -> EngineResult<Self> {
        let inner: PrivateKeySigner = key.trim().parse().map_err(|e| EngineError::Config {
            reason: format!("invalid private key: {e}"),
        })?;
        Ok(Self { inner })
    }

    pub fn from_bytes(key: &B256) -> EngineResult<Self> {
        let inner = PrivateKeySigner::from_bytes(key).map_err(|e| EngineError::Config {
            reason: format!("invalid private key: {e}"),
        })?;
        Ok(Self { inner })
    }

    /// Generate a fresh random key.
    pub fn random() -> Self {
        Self {
            inner: PrivateKeySigner::random(),
        }
    }
}

impl SigningCapability for LocalKeySigner {
    fn address(&self) -> Address {
        self.inner.address()
    }

    fn sign_message(&self, message: &[u8]) -> EngineResult<Signature> {
        self.inner
            .sign_message_sync(message)
            .map_err(|e| EngineError::Signing {
                reason: e.to_string(),
            })
    }

    fn sign_typed_data(&self, request: &TypedDataRequest<'_>) -> EngineResult<Signature> {
        debug!(
            signer = %self.inner.address(),
            primary_type = request.primary_type,
            "signing typed data"
        );
        self.inner
            .sign_hash_sync(&request.signing_hash)
            .map_err(|e| EngineError::Signing {
                reason: e.to_string(),
            })
    }
}
