//! Typed access to ledger records
//!
//! Every record lives in the ordered key-value store as JSON. `State` wraps
//! whichever store layer is active (a transaction overlay, the block overlay
//! or a check-mode scratch overlay) and gives each subsystem typed getters
//! and setters. The subsystems add their own `impl State<'_>` blocks next to
//! the records they own.

use crate::core::error::{LedgerError, LedgerResult};
use crate::storage::KvStore;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Store key layout
pub mod keys {
    pub const GLOBAL_STATE: &str = "global/state";
    pub const GLOBAL_PARAMS: &str = "global/params";
    pub const VALIDATOR_LIST: &str = "validator-list";
    pub const PROPOSAL_ONGOING: &str = "proposal-list/ongoing";
    pub const PROPOSAL_DECIDED: &str = "proposal-list/decided";
    pub const PROPOSAL_COUNTER: &str = "proposal-list/next-id";
    pub const PENALTY_LIST: &str = "penalty-list";
    pub const DEVELOPER_LIST: &str = "developer-list";
    pub const INFRA_LIST: &str = "infra-list";
    pub const LAST_COMMIT: &str = "meta/last-commit";

    pub const ACCOUNT_PREFIX: &str = "account/";
    pub const POST_PREFIX: &str = "post/";

    pub fn account(address: &str) -> String {
        format!("{}{}", ACCOUNT_PREFIX, address)
    }

    pub fn post(post_key: &str) -> String {
        format!("{}{}", POST_PREFIX, post_key)
    }

    pub fn post_meta(post_key: &str) -> String {
        format!("{}{}/meta", POST_PREFIX, post_key)
    }

    pub fn post_likes(post_key: &str) -> String {
        format!("{}{}/likes", POST_PREFIX, post_key)
    }

    pub fn post_comments(post_key: &str) -> String {
        format!("{}{}/comments", POST_PREFIX, post_key)
    }

    pub fn post_views(post_key: &str) -> String {
        format!("{}{}/views", POST_PREFIX, post_key)
    }

    pub fn post_donations(post_key: &str) -> String {
        format!("{}{}/donations", POST_PREFIX, post_key)
    }

    pub fn validator(name: &str) -> String {
        format!("validator/{}", name)
    }

    pub fn developer(name: &str) -> String {
        format!("developer/{}", name)
    }

    pub fn voter(name: &str) -> String {
        format!("voter/{}", name)
    }

    pub fn delegation(voter: &str, delegator: &str) -> String {
        format!("delegation/{}/{}", voter, delegator)
    }

    pub fn delegation_prefix(voter: &str) -> String {
        format!("delegation/{}/", voter)
    }

    pub fn proposal(id: u64) -> String {
        format!("proposal/{}", id)
    }

    pub fn egress_packet(src: &str, dst: &str, sequence: u64) -> String {
        // zero padded so prefix iteration returns packets in sequence order
        format!("ibc/egress/{}/{}/{:020}", src, dst, sequence)
    }

    pub fn egress_prefix(src: &str, dst: &str) -> String {
        format!("ibc/egress/{}/{}/", src, dst)
    }

    pub fn egress_sequence(src: &str, dst: &str) -> String {
        format!("ibc/egress-seq/{}/{}", src, dst)
    }
}

/// Typed view over the active store layer
pub struct State<'s> {
    store: &'s mut dyn KvStore,
}

impl<'s> State<'s> {
    pub fn new(store: &'s mut dyn KvStore) -> Self {
        Self { store }
    }

    /// Read and decode a record. A record that fails to decode is a
    /// corrupted store and surfaces as a fatal `Codec` error.
    pub fn get_record<T: DeserializeOwned>(&self, key: &str) -> LedgerResult<Option<T>> {
        match self.store.get(key.as_bytes()) {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| LedgerError::Codec {
                    key: key.to_string(),
                    reason: e.to_string(),
                }),
            None => Ok(None),
        }
    }

    pub fn set_record<T: Serialize>(&mut self, key: &str, value: &T) -> LedgerResult<()> {
        let bytes = serde_json::to_vec(value).map_err(|e| LedgerError::Codec {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        self.store.set(key.as_bytes(), bytes);
        Ok(())
    }

    pub fn delete_record(&mut self, key: &str) {
        self.store.delete(key.as_bytes());
    }

    pub fn has_record(&self, key: &str) -> bool {
        self.store.has(key.as_bytes())
    }

    /// A list record; absent means empty
    pub fn get_list<T: DeserializeOwned>(&self, key: &str) -> LedgerResult<Vec<T>> {
        Ok(self.get_record(key)?.unwrap_or_default())
    }

    /// Decode every record under `prefix`, in key order
    pub fn records_with_prefix<T: DeserializeOwned>(
        &self,
        prefix: &str,
    ) -> LedgerResult<Vec<(String, T)>> {
        self.store
            .prefix_iter(prefix.as_bytes())
            .into_iter()
            .map(|(key, bytes)| {
                let key = String::from_utf8_lossy(&key).into_owned();
                serde_json::from_slice(&bytes)
                    .map(|value| (key.clone(), value))
                    .map_err(|e| LedgerError::Codec {
                        key,
                        reason: e.to_string(),
                    })
            })
            .collect()
    }
}
