//! Hashing utilities for the ledger
//!
//! Provides SHA-256 based hashing used for transaction signing bytes,
//! state-root leaves and merkle tree calculations.

use sha2::{Digest, Sha256};

/// Computes SHA-256 hash of the input data
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// Computes SHA-256 hash and returns it as a hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Hash of a single store entry, used as a leaf of the state root.
///
/// The key length is mixed in so that `("ab", "c")` and `("a", "bc")`
/// produce different leaves.
pub fn entry_hash(key: &[u8], value: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update((key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(value);
    hasher.finalize().to_vec()
}
