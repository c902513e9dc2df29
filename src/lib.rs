//! Mini-Ledger: the application state machine of a content blockchain
//!
//! This crate provides:
//! - Account ledger with replay-protected, atomic transactions
//! - Posts, likes, views and donations
//! - Hourly inflation paid to validators, content creators, developers and
//!   infrastructure providers
//! - Validator registry, voters, delegation and governance proposals
//! - Cross-chain coin packets
//! - ECDSA signatures (secp256k1) and a merkle state root
//! - JSON snapshots of the committed store
//!
//! # Example
//!
//! ```rust
//! use mini_ledger::core::{BlockContext, GenesisState, LedgerApp};
//! use mini_ledger::crypto::KeyPair;
//!
//! let key = KeyPair::generate();
//! let genesis = GenesisState::single(&key.public_key_hex(), "consensus-key");
//!
//! let mut app = LedgerApp::new();
//! app.init_chain(&genesis, 1_700_000_000).unwrap();
//!
//! let ctx = BlockContext::new(1, 1_700_000_005, &genesis.chain_id);
//! let result = app.execute_block(ctx, &[]).unwrap();
//! println!("height {} root {}", result.commit.height, result.commit.root);
//! ```

pub mod cli;
pub mod core;
pub mod crypto;
pub mod storage;

// Re-export commonly used types
pub use core::{
    BlockContext, Coin, CommitInfo, GenesisState, LedgerApp, LedgerError, LedgerResult, Msg,
    Ratio, Transaction, TransferBuilder,
};
pub use crypto::KeyPair;
pub use storage::{Storage, StorageConfig};
