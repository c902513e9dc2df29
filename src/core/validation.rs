//! Transaction validation
//!
//! Read-only checks run before anything is written. They resolve the
//! accounts a transaction touches, check amounts, and authorize each signer
//! by signature, then sequence, then balance, in that order.

use crate::core::account::Account;
use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::state::State;
use crate::core::transaction::{Signer, TxInput, TxOutput};
use crate::crypto::{address_from_public_key_hex, verify_hex};
use std::collections::{BTreeMap, BTreeSet};

/// Accounts touched by a transaction, keyed by address
pub type AccountMap = BTreeMap<String, Account>;

/// Load every input account. Inputs must exist and be distinct.
pub fn resolve_inputs(state: &State<'_>, inputs: &[TxInput]) -> LedgerResult<AccountMap> {
    let mut accounts = AccountMap::new();
    for input in inputs {
        if accounts.contains_key(&input.address) {
            return Err(LedgerError::DuplicateAddress {
                address: input.address.clone(),
            });
        }
        let account = state.account(&input.address)?;
        accounts.insert(input.address.clone(), account);
    }
    Ok(accounts)
}

/// Add output accounts to `accounts`. Unknown local addresses get a
/// zero-balance placeholder that is only persisted if the transaction
/// succeeds; foreign-chain outputs never create local accounts.
pub fn resolve_outputs(
    state: &State<'_>,
    mut accounts: AccountMap,
    outputs: &[TxOutput],
    time: i64,
) -> LedgerResult<AccountMap> {
    let mut seen = BTreeSet::new();
    for output in outputs {
        if !seen.insert(output.address.as_str()) {
            return Err(LedgerError::DuplicateAddress {
                address: output.address.clone(),
            });
        }
        if output.foreign_target().is_some() || accounts.contains_key(&output.address) {
            continue;
        }
        let account = state
            .get_account(&output.address)?
            .unwrap_or_else(|| Account::new(&output.address, time));
        accounts.insert(output.address.clone(), account);
    }
    Ok(accounts)
}

pub fn check_inputs_well_formed(inputs: &[TxInput]) -> LedgerResult<()> {
    if inputs.is_empty() {
        return Err(LedgerError::invalid_tx("transaction has no inputs"));
    }
    for input in inputs {
        if input.address.is_empty() {
            return Err(LedgerError::invalid_tx("input with empty address"));
        }
        if !input.amount.is_positive() {
            return Err(LedgerError::invalid_amount(format!(
                "input from {} is not positive",
                input.address
            )));
        }
    }
    Ok(())
}

pub fn check_outputs_well_formed(outputs: &[TxOutput]) -> LedgerResult<()> {
    if outputs.is_empty() {
        return Err(LedgerError::invalid_tx("transaction has no outputs"));
    }
    for output in outputs {
        let malformed = match output.foreign_target() {
            Some((chain, address)) => chain.is_empty() || address.is_empty(),
            None => output.address.is_empty(),
        };
        if malformed {
            return Err(LedgerError::invalid_tx(format!(
                "malformed output address {:?}",
                output.address
            )));
        }
        if !output.amount.is_positive() {
            return Err(LedgerError::invalid_amount(format!(
                "output to {} is not positive",
                output.address
            )));
        }
    }
    Ok(())
}

/// Signature, then strict sequence equality, then balance
pub fn check_input_authorized(
    account: &Account,
    sign_bytes: &[u8],
    input: &TxInput,
) -> LedgerResult<()> {
    verify_signer(
        account,
        sign_bytes,
        &input.signature,
        input.public_key.as_deref(),
    )?;
    if input.sequence != account.sequence {
        return Err(LedgerError::InvalidSequence {
            address: account.address.clone(),
            expected: account.sequence,
            got: input.sequence,
        });
    }
    if account.balance < input.amount {
        return Err(LedgerError::InsufficientFunds {
            address: account.address.clone(),
            have: account.balance,
            need: input.amount,
        });
    }
    Ok(())
}

/// Signature, then `sequence == last_post_sequence + 1`
pub fn check_post_authorized(
    account: &Account,
    sign_bytes: &[u8],
    signer: &Signer,
) -> LedgerResult<()> {
    verify_signer(
        account,
        sign_bytes,
        &signer.signature,
        signer.public_key.as_deref(),
    )?;
    let expected = account.last_post_sequence + 1;
    if signer.sequence != expected {
        return Err(LedgerError::InvalidSequence {
            address: account.address.clone(),
            expected,
            got: signer.sequence,
        });
    }
    Ok(())
}

/// Signature, then strict sequence equality, for single-signer messages
pub fn check_signer_authorized(
    account: &Account,
    sign_bytes: &[u8],
    signer: &Signer,
) -> LedgerResult<()> {
    verify_signer(
        account,
        sign_bytes,
        &signer.signature,
        signer.public_key.as_deref(),
    )?;
    if signer.sequence != account.sequence {
        return Err(LedgerError::InvalidSequence {
            address: account.address.clone(),
            expected: account.sequence,
            got: signer.sequence,
        });
    }
    Ok(())
}

pub fn sum_inputs(inputs: &[TxInput]) -> LedgerResult<Coin> {
    Coin::sum(inputs.iter().map(|i| i.amount))
}

pub fn sum_outputs(outputs: &[TxOutput]) -> LedgerResult<Coin> {
    Coin::sum(outputs.iter().map(|o| o.amount))
}

/// Bind a first-use public key once the signer has been authorized
pub fn bind_public_key(account: &mut Account, supplied: Option<&str>) {
    if account.public_key.is_none() {
        account.public_key = supplied.map(str::to_string);
    }
}

/// Verify against the account's bound key, or against a supplied key that
/// derives the account's address when none is bound yet.
fn verify_signer(
    account: &Account,
    sign_bytes: &[u8],
    signature: &str,
    supplied: Option<&str>,
) -> LedgerResult<()> {
    let invalid = || LedgerError::InvalidSignature {
        address: account.address.clone(),
    };

    let key = match (&account.public_key, supplied) {
        (Some(bound), Some(given)) if bound != given => return Err(invalid()),
        (Some(bound), _) => bound.as_str(),
        (None, Some(given)) => {
            let derived = address_from_public_key_hex(given).map_err(|_| invalid())?;
            if derived != account.address {
                return Err(invalid());
            }
            given
        }
        (None, None) => return Err(invalid()),
    };

    if signature.is_empty() || !verify_hex(key, sign_bytes, signature) {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::crypto::KeyPair;
    use crate::storage::MemStore;

    fn signed_input(key: &KeyPair, bytes: &[u8], sequence: u64, amount: u64) -> TxInput {
        TxInput {
            address: key.address(),
            sequence,
            amount: Coin::from(amount),
            signature: key.sign_hex(bytes).unwrap(),
            public_key: Some(key.public_key_hex()),
        }
    }

    fn funded(key: &KeyPair, balance: u64) -> Account {
        let mut account = Account::new(&key.address(), 0);
        account.balance = Coin::from(balance);
        account
    }

    #[test]
    fn test_resolve_inputs() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        state.credit_account("alice", Coin::new(10), 0, 0).unwrap();

        let ok = resolve_inputs(&state, &[TxInput::new("alice", 0, Coin::new(1))]).unwrap();
        assert!(ok.contains_key("alice"));

        let missing = resolve_inputs(&state, &[TxInput::new("bob", 0, Coin::new(1))]);
        assert_eq!(missing.unwrap_err().kind(), ErrorKind::UnknownAccount);

        let dup = resolve_inputs(
            &state,
            &[
                TxInput::new("alice", 0, Coin::new(1)),
                TxInput::new("alice", 0, Coin::new(1)),
            ],
        );
        assert_eq!(dup.unwrap_err().kind(), ErrorKind::DuplicateAddress);
    }

    #[test]
    fn test_resolve_outputs_placeholders() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        state.credit_account("alice", Coin::new(10), 0, 0).unwrap();

        let inputs = resolve_inputs(&state, &[TxInput::new("alice", 0, Coin::new(1))]).unwrap();
        let accounts = resolve_outputs(
            &state,
            inputs,
            &[
                TxOutput::new("newcomer", Coin::new(1)),
                TxOutput::new("remote/bob", Coin::new(1)),
            ],
            5,
        )
        .unwrap();
        assert_eq!(accounts["newcomer"].balance, Coin::ZERO);
        assert!(!accounts.contains_key("remote/bob"));
        assert!(!state.account_exists("newcomer"));

        let dup = resolve_outputs(
            &state,
            AccountMap::new(),
            &[
                TxOutput::new("x", Coin::new(1)),
                TxOutput::new("x", Coin::new(2)),
            ],
            5,
        );
        assert_eq!(dup.unwrap_err().kind(), ErrorKind::DuplicateAddress);
    }

    #[test]
    fn test_well_formed() {
        assert_eq!(
            check_inputs_well_formed(&[TxInput::new("a", 0, Coin::ZERO)])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidAmount
        );
        assert_eq!(
            check_outputs_well_formed(&[TxOutput::new("a", Coin::ZERO)])
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidAmount
        );
        assert!(check_outputs_well_formed(&[TxOutput::new("/a", Coin::new(1))]).is_err());
        assert!(check_inputs_well_formed(&[]).is_err());
        assert_eq!(
            sum_inputs(&[
                TxInput::new("a", 0, Coin::new(2)),
                TxInput::new("b", 0, Coin::new(3))
            ])
            .unwrap(),
            Coin::new(5)
        );
    }

    #[test]
    fn test_input_authorization_order() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();
        let bytes = b"sign me".to_vec();
        let account = funded(&key, 10);

        check_input_authorized(&account, &bytes, &signed_input(&key, &bytes, 0, 10)).unwrap();

        // wrong signer is reported before the bad sequence
        let mut forged = signed_input(&other, &bytes, 5, 10);
        forged.address = key.address();
        assert_eq!(
            check_input_authorized(&account, &bytes, &forged).unwrap_err().kind(),
            ErrorKind::InvalidSignature
        );

        // bad sequence is reported before insufficient funds
        assert_eq!(
            check_input_authorized(&account, &bytes, &signed_input(&key, &bytes, 1, 11))
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidSequence
        );
        assert_eq!(
            check_input_authorized(&account, &bytes, &signed_input(&key, &bytes, 0, 11))
                .unwrap_err()
                .kind(),
            ErrorKind::InsufficientFunds
        );
    }

    #[test]
    fn test_bound_key_is_used() {
        let key = KeyPair::generate();
        let bytes = b"payload".to_vec();
        let mut account = Account::new("named-account", 0);
        account.balance = Coin::new(5);
        account.public_key = Some(key.public_key_hex());

        let mut input = signed_input(&key, &bytes, 0, 5);
        input.address = "named-account".to_string();
        input.public_key = None;
        check_input_authorized(&account, &bytes, &input).unwrap();

        input.signature.clear();
        assert_eq!(
            check_input_authorized(&account, &bytes, &input).unwrap_err().kind(),
            ErrorKind::InvalidSignature
        );
    }

    #[test]
    fn test_post_sequence() {
        let key = KeyPair::generate();
        let bytes = b"post".to_vec();
        let mut account = funded(&key, 0);
        account.last_post_sequence = 4;

        let mut signer = Signer::new(&key.address(), 5);
        signer.signature = key.sign_hex(&bytes).unwrap();
        signer.public_key = Some(key.public_key_hex());
        check_post_authorized(&account, &bytes, &signer).unwrap();

        signer.sequence = 4;
        let err = check_post_authorized(&account, &bytes, &signer).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InvalidSequence {
                address: key.address(),
                expected: 5,
                got: 4
            }
        );
        assert_eq!(
            check_signer_authorized(&account, &bytes, &signer).unwrap_err().kind(),
            ErrorKind::InvalidSequence
        );
    }
}
