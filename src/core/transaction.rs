//! Transactions and their messages
//!
//! A transaction is a chain id plus exactly one message. Messages form a
//! closed enum; the executor dispatches on it with a single exhaustive match.
//!
//! Signing bytes are `sha256` of the JSON encoding of `(chain_id, msg)` with
//! every signature and public key cleared, so all signers of a multi-input
//! transfer sign the same bytes and the chain id prevents cross-chain replay.

use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::governance::ParameterChange;
use crate::core::post::{PostInfo, PostKey};
use crate::crypto::{sha256, sha256_hex, KeyPair};
use serde::{Deserialize, Serialize};

/// Separator between a foreign chain id and an address in an output
pub const CHAIN_SEPARATOR: char = '/';

// =============================================================================
// Inputs, outputs and signers
// =============================================================================

/// Debit from one account
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxInput {
    pub address: String,
    /// Must equal the account's current sequence
    pub sequence: u64,
    pub amount: Coin,
    #[serde(default)]
    pub signature: String,
    /// Supplied on first use to bind a key to the account
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl TxInput {
    pub fn new(address: &str, sequence: u64, amount: Coin) -> Self {
        Self {
            address: address.to_string(),
            sequence,
            amount,
            signature: String::new(),
            public_key: None,
        }
    }
}

/// Credit to a local address or to `"<chain>/<address>"` on a foreign chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TxOutput {
    pub address: String,
    pub amount: Coin,
}

impl TxOutput {
    pub fn new(address: &str, amount: Coin) -> Self {
        Self {
            address: address.to_string(),
            amount,
        }
    }

    /// `(chain, address)` when the output targets another chain
    pub fn foreign_target(&self) -> Option<(&str, &str)> {
        self.address.split_once(CHAIN_SEPARATOR)
    }
}

/// Authorization for single-signer messages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Signer {
    pub address: String,
    pub sequence: u64,
    #[serde(default)]
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

impl Signer {
    pub fn new(address: &str, sequence: u64) -> Self {
        Self {
            address: address.to_string(),
            sequence,
            signature: String::new(),
            public_key: None,
        }
    }

    fn slot(&mut self) -> SignatureSlot<'_> {
        SignatureSlot {
            address: &self.address,
            signature: &mut self.signature,
            public_key: &mut self.public_key,
        }
    }
}

struct SignatureSlot<'a> {
    address: &'a str,
    signature: &'a mut String,
    public_key: &'a mut Option<String>,
}

// =============================================================================
// Messages
// =============================================================================

/// Every action the ledger accepts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum Msg {
    Transfer {
        inputs: Vec<TxInput>,
        outputs: Vec<TxOutput>,
        fee: Coin,
    },
    CreatePost {
        signer: Signer,
        post: PostInfo,
    },
    Like {
        signer: Signer,
        target: PostKey,
        weight: i64,
    },
    View {
        signer: Signer,
        target: PostKey,
    },
    Donate {
        input: TxInput,
        fee: Coin,
        target: PostKey,
    },
    ValidatorDeposit {
        signer: Signer,
        deposit: Coin,
        validator_key: String,
    },
    ValidatorWithdraw {
        signer: Signer,
    },
    ValidatorRevoke {
        signer: Signer,
    },
    VoterDeposit {
        signer: Signer,
        deposit: Coin,
    },
    VoterWithdraw {
        signer: Signer,
        amount: Coin,
    },
    Delegate {
        signer: Signer,
        voter: String,
        amount: Coin,
    },
    RevokeDelegation {
        signer: Signer,
        voter: String,
    },
    SubmitProposal {
        signer: Signer,
        change: ParameterChange,
    },
    Vote {
        signer: Signer,
        proposal_id: u64,
        approve: bool,
    },
}

impl Msg {
    /// Short name used in logs and responses
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Transfer { .. } => "transfer",
            Msg::CreatePost { .. } => "create_post",
            Msg::Like { .. } => "like",
            Msg::View { .. } => "view",
            Msg::Donate { .. } => "donate",
            Msg::ValidatorDeposit { .. } => "validator_deposit",
            Msg::ValidatorWithdraw { .. } => "validator_withdraw",
            Msg::ValidatorRevoke { .. } => "validator_revoke",
            Msg::VoterDeposit { .. } => "voter_deposit",
            Msg::VoterWithdraw { .. } => "voter_withdraw",
            Msg::Delegate { .. } => "delegate",
            Msg::RevokeDelegation { .. } => "revoke_delegation",
            Msg::SubmitProposal { .. } => "submit_proposal",
            Msg::Vote { .. } => "vote",
        }
    }

    fn signature_slots(&mut self) -> Vec<SignatureSlot<'_>> {
        match self {
            Msg::Transfer { inputs, .. } => inputs
                .iter_mut()
                .map(|i| SignatureSlot {
                    address: &i.address,
                    signature: &mut i.signature,
                    public_key: &mut i.public_key,
                })
                .collect(),
            Msg::Donate { input, .. } => vec![SignatureSlot {
                address: &input.address,
                signature: &mut input.signature,
                public_key: &mut input.public_key,
            }],
            Msg::CreatePost { signer, .. }
            | Msg::Like { signer, .. }
            | Msg::View { signer, .. }
            | Msg::ValidatorDeposit { signer, .. }
            | Msg::ValidatorWithdraw { signer }
            | Msg::ValidatorRevoke { signer }
            | Msg::VoterDeposit { signer, .. }
            | Msg::VoterWithdraw { signer, .. }
            | Msg::Delegate { signer, .. }
            | Msg::RevokeDelegation { signer, .. }
            | Msg::SubmitProposal { signer, .. }
            | Msg::Vote { signer, .. } => vec![signer.slot()],
        }
    }
}

// =============================================================================
// Transaction
// =============================================================================

/// A message bound to a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub chain_id: String,
    pub msg: Msg,
}

impl Transaction {
    pub fn new(chain_id: &str, msg: Msg) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            msg,
        }
    }

    /// Canonical bytes every signer signs
    pub fn sign_bytes(&self) -> LedgerResult<Vec<u8>> {
        let mut unsigned = self.msg.clone();
        for slot in unsigned.signature_slots() {
            slot.signature.clear();
            *slot.public_key = None;
        }
        let bytes = serde_json::to_vec(&(&self.chain_id, &unsigned)).map_err(|e| {
            LedgerError::Codec {
                key: "sign-bytes".to_string(),
                reason: e.to_string(),
            }
        })?;
        Ok(sha256(&bytes))
    }

    /// Sign every slot belonging to `address` and attach the public key
    pub fn sign(&mut self, address: &str, key_pair: &KeyPair) -> LedgerResult<()> {
        let bytes = self.sign_bytes()?;
        let signature = key_pair
            .sign_hex(&bytes)
            .map_err(|e| LedgerError::invalid_tx(e.to_string()))?;
        let public_key = key_pair.public_key_hex();

        let mut signed = false;
        for slot in self.msg.signature_slots() {
            if slot.address == address {
                *slot.signature = signature.clone();
                *slot.public_key = Some(public_key.clone());
                signed = true;
            }
        }
        if !signed {
            return Err(LedgerError::invalid_tx(format!(
                "{} is not a signer of this transaction",
                address
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> LedgerResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| LedgerError::invalid_tx(e.to_string()))
    }

    /// Decode wire bytes. Undecodable bytes reject the transaction.
    pub fn decode(bytes: &[u8]) -> LedgerResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| LedgerError::invalid_tx(format!("undecodable transaction: {}", e)))
    }

    pub fn hash(&self) -> LedgerResult<String> {
        Ok(sha256_hex(&self.encode()?))
    }
}

// =============================================================================
// Transfer Builder
// =============================================================================

/// Builder for transfer transactions
pub struct TransferBuilder {
    chain_id: String,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    fee: Coin,
}

impl TransferBuilder {
    pub fn new(chain_id: &str) -> Self {
        Self {
            chain_id: chain_id.to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            fee: Coin::ZERO,
        }
    }

    pub fn input(mut self, address: &str, sequence: u64, amount: Coin) -> Self {
        self.inputs.push(TxInput::new(address, sequence, amount));
        self
    }

    pub fn output(mut self, address: &str, amount: Coin) -> Self {
        self.outputs.push(TxOutput::new(address, amount));
        self
    }

    pub fn fee(mut self, fee: Coin) -> Self {
        self.fee = fee;
        self
    }

    pub fn build(self) -> Transaction {
        Transaction::new(
            &self.chain_id,
            Msg::Transfer {
                inputs: self.inputs,
                outputs: self.outputs,
                fee: self.fee,
            },
        )
    }

    /// Build and sign with one key per input, in input order
    pub fn build_and_sign(self, keys: &[&KeyPair]) -> LedgerResult<Transaction> {
        let addresses: Vec<String> = self.inputs.iter().map(|i| i.address.clone()).collect();
        let mut tx = self.build();
        for (address, key) in addresses.iter().zip(keys) {
            tx.sign(address, key)?;
        }
        Ok(tx)
    }
}
