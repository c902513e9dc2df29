//! Storage module: ordered key-value store, write overlays and snapshots

pub mod kv;
pub mod persistence;

pub use kv::{CacheStore, ChangeSet, KvStore, MemStore};
pub use persistence::{load_from_file, Snapshot, Storage, StorageConfig, StorageError};
