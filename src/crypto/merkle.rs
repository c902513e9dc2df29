//! Merkle root over the committed store
//!
//! Every key/value pair becomes a leaf (`entry_hash`), leaves are taken in
//! key order, and pairs are hashed upward. An odd node is paired with itself.

use super::hash::{entry_hash, sha256};

/// Calculate the merkle root from a list of leaf hashes
pub fn calculate_merkle_root(hashes: &[Vec<u8>]) -> Vec<u8> {
    if hashes.is_empty() {
        return sha256(b"");
    }

    let mut current_level: Vec<Vec<u8>> = hashes.to_vec();

    while current_level.len() > 1 {
        current_level = current_level
            .chunks(2)
            .map(|chunk| {
                let right = chunk.get(1).unwrap_or(&chunk[0]);
                let mut data = chunk[0].clone();
                data.extend_from_slice(right);
                sha256(&data)
            })
            .collect();
    }

    current_level.remove(0)
}

/// State root over ordered `(key, value)` entries
pub fn state_root<'a, I>(entries: I) -> Vec<u8>
where
    I: IntoIterator<Item = (&'a Vec<u8>, &'a Vec<u8>)>,
{
    let leaves: Vec<Vec<u8>> = entries
        .into_iter()
        .map(|(key, value)| entry_hash(key, value))
        .collect();
    calculate_merkle_root(&leaves)
}
