//! Cryptographic utilities for the ledger
//!
//! This module provides:
//! - SHA-256 hashing
//! - ECDSA key management (secp256k1) and address derivation
//! - Merkle state-root calculation

pub mod hash;
pub mod keys;
pub mod merkle;

pub use hash::{entry_hash, sha256, sha256_hex};
pub use keys::{
    address_from_public_key_hex, public_key_from_hex, public_key_to_address, sign_message,
    verify_hex, verify_signature, KeyError, KeyPair,
};
pub use merkle::{calculate_merkle_root, state_root};
