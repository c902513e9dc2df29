//! Core ledger components
//!
//! This module contains the state machine:
//! - Coins and exact ratios
//! - Accounts with coin-day maturation
//! - Transactions, validation and execution
//! - Posts, likes, views and donations
//! - Validators, voters, delegation and proposals
//! - The inflation scheduler
//! - Genesis and the block lifecycle driver

pub mod account;
pub mod app;
pub mod coin;
pub mod error;
pub mod executor;
pub mod genesis;
pub mod governance;
pub mod ibc;
pub mod inflation;
pub mod params;
pub mod post;
pub mod state;
pub mod transaction;
pub mod validation;
pub mod validator;

pub use account::{Account, AccountFlags, PendingCoinDay};
pub use app::{
    BlockContext, BlockResult, CommitInfo, EndBlockResponse, LedgerApp, TxResponse,
    ValidatorUpdate,
};
pub use coin::{Coin, Ratio, DECIMALS, MAX_LNO};
pub use error::{ErrorKind, LedgerError, LedgerResult};
pub use executor::{execute_tx, TxEffects};
pub use genesis::{
    GenesisAccount, GenesisDeveloper, GenesisGlobalState, GenesisInfra, GenesisState,
    DEFAULT_CHAIN_ID,
};
pub use governance::{
    DecideOutcome, Delegation, ParameterChange, Proposal, ProposalStatus, Vote, Voter,
};
pub use ibc::{CoinsPayload, Packet, COIN_PACKET};
pub use inflation::{Distribution, GlobalAllocation, GlobalState, InflationPools, Pool};
pub use params::{InflationCadence, LedgerParams, HOURS_PER_YEAR};
pub use post::{PostInfo, PostKey, MAX_CONTENT_LENGTH, MAX_LIKE_WEIGHT, MAX_TITLE_LENGTH};
pub use state::State;
pub use transaction::{Msg, Signer, Transaction, TransferBuilder, TxInput, TxOutput};
pub use validator::{Validator, ValidatorList};
