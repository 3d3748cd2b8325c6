//! Random 32-byte nonces.

use alloy_primitives::B256;
use rand::RngCore;

/// Draw a fresh nonce from the thread-local CSPRNG.
pub fn fresh_nonce() -> B256 {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    B256::from(bytes)
}
