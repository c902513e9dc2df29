//! Ledger error taxonomy
//!
//! Every rejection carries an [`ErrorKind`] plus the structured context that
//! produced it. Only [`ErrorKind::Store`] and [`ErrorKind::Codec`] are fatal;
//! everything else rejects the offending transaction and leaves the ledger
//! untouched.

use crate::core::coin::Coin;
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Stable error kinds reported to the consensus engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    UnknownAccount,
    DuplicateAddress,
    InvalidAmount,
    InvalidSignature,
    InvalidSequence,
    InsufficientFunds,
    ParentNotFound,
    UnknownTarget,
    WeightOverflow,
    AmountOverflow,
    UnauthorizedProposal,
    InvalidTransaction,
    InvalidPost,
    PostExists,
    UnknownValidator,
    UnknownVoter,
    UnknownProposal,
    AlreadyVoted,
    InvalidProposal,
    InsufficientDeposit,
    DepositLocked,
    Store,
    Codec,
}

impl ErrorKind {
    /// Non-zero result code carried in transaction responses
    pub fn code(self) -> u32 {
        match self {
            ErrorKind::UnknownAccount => 1,
            ErrorKind::DuplicateAddress => 2,
            ErrorKind::InvalidAmount => 3,
            ErrorKind::InvalidSignature => 4,
            ErrorKind::InvalidSequence => 5,
            ErrorKind::InsufficientFunds => 6,
            ErrorKind::ParentNotFound => 7,
            ErrorKind::UnknownTarget => 8,
            ErrorKind::WeightOverflow => 9,
            ErrorKind::AmountOverflow => 10,
            ErrorKind::UnauthorizedProposal => 11,
            ErrorKind::InvalidTransaction => 20,
            ErrorKind::InvalidPost => 21,
            ErrorKind::PostExists => 22,
            ErrorKind::UnknownValidator => 23,
            ErrorKind::UnknownVoter => 24,
            ErrorKind::UnknownProposal => 25,
            ErrorKind::AlreadyVoted => 26,
            ErrorKind::InvalidProposal => 27,
            ErrorKind::InsufficientDeposit => 28,
            ErrorKind::DepositLocked => 29,
            ErrorKind::Store => 100,
            ErrorKind::Codec => 101,
        }
    }

    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::Store | ErrorKind::Codec)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Ledger errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Unknown account: {address}")]
    UnknownAccount { address: String },
    #[error("Duplicate address in transaction: {address}")]
    DuplicateAddress { address: String },
    #[error("Invalid amount: {reason}")]
    InvalidAmount { reason: String },
    #[error("Invalid signature for {address}")]
    InvalidSignature { address: String },
    #[error("Invalid sequence for {address}: expected {expected}, got {got}")]
    InvalidSequence {
        address: String,
        expected: u64,
        got: u64,
    },
    #[error("Insufficient funds for {address}: have {have}, need {need}")]
    InsufficientFunds {
        address: String,
        have: Coin,
        need: Coin,
    },
    #[error("Parent post not found: {post_key}")]
    ParentNotFound { post_key: String },
    #[error("Unknown target post: {post_key}")]
    UnknownTarget { post_key: String },
    #[error("Like weight {weight} outside [-10000, 10000]")]
    WeightOverflow { weight: i64 },
    #[error("Amount overflow: {context}")]
    AmountOverflow { context: String },
    #[error("{creator} is not allowed to submit proposals")]
    UnauthorizedProposal { creator: String },
    #[error("Invalid transaction: {reason}")]
    InvalidTransaction { reason: String },
    #[error("Invalid post {post_key}: {reason}")]
    InvalidPost { post_key: String, reason: String },
    #[error("Post already exists: {post_key}")]
    PostExists { post_key: String },
    #[error("Unknown validator: {name}")]
    UnknownValidator { name: String },
    #[error("Unknown voter: {name}")]
    UnknownVoter { name: String },
    #[error("Unknown or decided proposal: {proposal_id}")]
    UnknownProposal { proposal_id: String },
    #[error("{voter} already voted on proposal {proposal_id}")]
    AlreadyVoted { voter: String, proposal_id: String },
    #[error("Invalid proposal: {reason}")]
    InvalidProposal { reason: String },
    #[error("Deposit for {name} below minimum: have {have}, need {need}")]
    InsufficientDeposit { name: String, have: Coin, need: Coin },
    #[error("Deposit for {name} locked until height {available_at}")]
    DepositLocked { name: String, available_at: u64 },
    #[error("Store failure: {reason}")]
    Store { reason: String },
    #[error("Corrupt record at {key}: {reason}")]
    Codec { key: String, reason: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::UnknownAccount { .. } => ErrorKind::UnknownAccount,
            LedgerError::DuplicateAddress { .. } => ErrorKind::DuplicateAddress,
            LedgerError::InvalidAmount { .. } => ErrorKind::InvalidAmount,
            LedgerError::InvalidSignature { .. } => ErrorKind::InvalidSignature,
            LedgerError::InvalidSequence { .. } => ErrorKind::InvalidSequence,
            LedgerError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            LedgerError::ParentNotFound { .. } => ErrorKind::ParentNotFound,
            LedgerError::UnknownTarget { .. } => ErrorKind::UnknownTarget,
            LedgerError::WeightOverflow { .. } => ErrorKind::WeightOverflow,
            LedgerError::AmountOverflow { .. } => ErrorKind::AmountOverflow,
            LedgerError::UnauthorizedProposal { .. } => ErrorKind::UnauthorizedProposal,
            LedgerError::InvalidTransaction { .. } => ErrorKind::InvalidTransaction,
            LedgerError::InvalidPost { .. } => ErrorKind::InvalidPost,
            LedgerError::PostExists { .. } => ErrorKind::PostExists,
            LedgerError::UnknownValidator { .. } => ErrorKind::UnknownValidator,
            LedgerError::UnknownVoter { .. } => ErrorKind::UnknownVoter,
            LedgerError::UnknownProposal { .. } => ErrorKind::UnknownProposal,
            LedgerError::AlreadyVoted { .. } => ErrorKind::AlreadyVoted,
            LedgerError::InvalidProposal { .. } => ErrorKind::InvalidProposal,
            LedgerError::InsufficientDeposit { .. } => ErrorKind::InsufficientDeposit,
            LedgerError::DepositLocked { .. } => ErrorKind::DepositLocked,
            LedgerError::Store { .. } => ErrorKind::Store,
            LedgerError::Codec { .. } => ErrorKind::Codec,
        }
    }

    pub fn code(&self) -> u32 {
        self.kind().code()
    }

    pub fn is_fatal(&self) -> bool {
        self.kind().is_fatal()
    }

    pub(crate) fn invalid_tx(reason: impl Into<String>) -> Self {
        LedgerError::InvalidTransaction {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_amount(reason: impl Into<String>) -> Self {
        LedgerError::InvalidAmount {
            reason: reason.into(),
        }
    }

    pub(crate) fn overflow(context: impl Into<String>) -> Self {
        LedgerError::AmountOverflow {
            context: context.into(),
        }
    }
}

impl From<StorageError> for LedgerError {
    fn from(err: StorageError) -> Self {
        LedgerError::Store {
            reason: err.to_string(),
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_nonzero_and_unique() {
        let kinds = [
            ErrorKind::UnknownAccount,
            ErrorKind::DuplicateAddress,
            ErrorKind::InvalidAmount,
            ErrorKind::InvalidSignature,
            ErrorKind::InvalidSequence,
            ErrorKind::InsufficientFunds,
            ErrorKind::ParentNotFound,
            ErrorKind::UnknownTarget,
            ErrorKind::WeightOverflow,
            ErrorKind::AmountOverflow,
            ErrorKind::UnauthorizedProposal,
            ErrorKind::Store,
        ];
        let mut codes: Vec<u32> = kinds.iter().map(|k| k.code()).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), kinds.len());
    }

    #[test]
    fn test_structured_context() {
        let err = LedgerError::InvalidSequence {
            address: "alice".to_string(),
            expected: 3,
            got: 2,
        };
        assert_eq!(err.kind(), ErrorKind::InvalidSequence);
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "Invalid sequence for alice: expected 3, got 2"
        );
        assert!(LedgerError::Store {
            reason: "disk".into()
        }
        .is_fatal());
    }
}
