//! Validator registry and the on-call set
//!
//! A registered validator holds a bonded deposit. Those with at least the
//! minimum deposit compete for `max_oncall_validators` seats; when the set is
//! full a newcomer takes the seat of the lowest-deposit member only if its
//! own deposit is strictly higher.

use crate::core::account::AccountFlags;
use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::params::LedgerParams;
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub name: String,
    /// Consensus key reported to the consensus engine
    pub public_key: String,
    pub deposit: Coin,
    pub voting_power: Coin,
    pub withdraw_available_at: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidatorList {
    /// Seat holders in the order they joined
    pub oncall: Vec<String>,
    /// Every registered (not revoked) validator
    pub all: Vec<String>,
}

impl State<'_> {
    pub fn get_validator(&self, name: &str) -> LedgerResult<Option<Validator>> {
        self.get_record(&keys::validator(name))
    }

    pub fn validator(&self, name: &str) -> LedgerResult<Validator> {
        self.get_validator(name)?
            .ok_or_else(|| LedgerError::UnknownValidator {
                name: name.to_string(),
            })
    }

    pub fn set_validator(&mut self, validator: &Validator) -> LedgerResult<()> {
        self.set_record(&keys::validator(&validator.name), validator)
    }

    pub fn validator_list(&self) -> LedgerResult<ValidatorList> {
        Ok(self.get_record(keys::VALIDATOR_LIST)?.unwrap_or_default())
    }

    pub fn set_validator_list(&mut self, list: &ValidatorList) -> LedgerResult<()> {
        self.set_record(keys::VALIDATOR_LIST, list)
    }

    /// Names of validators currently holding a seat
    pub fn oncall_validators(&self) -> LedgerResult<Vec<String>> {
        Ok(self.validator_list()?.oncall)
    }

    /// Move `deposit` from `name`'s balance into its validator bond,
    /// registering the validator on first deposit, then try for a seat.
    pub fn deposit_validator(
        &mut self,
        name: &str,
        validator_key: &str,
        deposit: Coin,
        height: u64,
        params: &LedgerParams,
    ) -> LedgerResult<Validator> {
        let mut account = self.account(name)?;
        account.debit(deposit)?;
        account.flags |= AccountFlags::VALIDATOR;
        self.set_account(&account)?;

        let mut list = self.validator_list()?;
        let validator = match self.get_validator(name)? {
            Some(mut existing) => {
                existing.deposit = existing.deposit.checked_add(deposit)?;
                existing.voting_power = existing.deposit;
                if !validator_key.is_empty() {
                    existing.public_key = validator_key.to_string();
                }
                existing
            }
            None => Validator {
                name: name.to_string(),
                public_key: validator_key.to_string(),
                deposit,
                voting_power: deposit,
                withdraw_available_at: height + params.validator_withdraw_lockup_blocks,
            },
        };
        self.set_validator(&validator)?;

        if !list.all.iter().any(|n| n == name) {
            list.all.push(name.to_string());
        }
        self.try_become_oncall(&mut list, &validator, params)?;
        self.set_validator_list(&list)?;
        Ok(validator)
    }

    fn try_become_oncall(
        &mut self,
        list: &mut ValidatorList,
        candidate: &Validator,
        params: &LedgerParams,
    ) -> LedgerResult<()> {
        if candidate.deposit < params.validator_min_deposit
            || list.oncall.iter().any(|n| *n == candidate.name)
        {
            return Ok(());
        }
        if list.oncall.len() < params.max_oncall_validators {
            log::info!("validator {} joined the on-call set", candidate.name);
            list.oncall.push(candidate.name.clone());
            return Ok(());
        }

        let mut lowest: Option<(usize, Coin)> = None;
        for (index, seat) in list.oncall.iter().enumerate() {
            let deposit = self.validator(seat)?.deposit;
            if lowest.map_or(true, |(_, low)| deposit < low) {
                lowest = Some((index, deposit));
            }
        }
        if let Some((index, low)) = lowest {
            if candidate.deposit > low {
                log::info!(
                    "validator {} replaced {} in the on-call set",
                    candidate.name,
                    list.oncall[index]
                );
                list.oncall[index] = candidate.name.clone();
            }
        }
        Ok(())
    }

    /// Leave every validator list; the deposit stays bonded until the lockup ends
    pub fn revoke_validator(
        &mut self,
        name: &str,
        height: u64,
        params: &LedgerParams,
    ) -> LedgerResult<()> {
        let mut validator = self.validator(name)?;
        let mut list = self.validator_list()?;
        list.oncall.retain(|n| n != name);
        list.all.retain(|n| n != name);
        self.set_validator_list(&list)?;

        validator.withdraw_available_at = height + params.validator_withdraw_lockup_blocks;
        self.set_validator(&validator)?;

        let mut account = self.account(name)?;
        account.flags.remove(AccountFlags::VALIDATOR);
        self.set_account(&account)?;
        log::info!("validator {} revoked at height {}", name, height);
        Ok(())
    }

    /// Return the whole bonded deposit to the validator's balance
    pub fn withdraw_validator(
        &mut self,
        name: &str,
        height: u64,
        time: i64,
        freezing_secs: i64,
    ) -> LedgerResult<Coin> {
        let mut validator = self.validator(name)?;
        if height < validator.withdraw_available_at {
            return Err(LedgerError::DepositLocked {
                name: name.to_string(),
                available_at: validator.withdraw_available_at,
            });
        }
        if !validator.deposit.is_positive() {
            return Err(LedgerError::InsufficientDeposit {
                name: name.to_string(),
                have: Coin::ZERO,
                need: Coin::new(1),
            });
        }
        if self.oncall_validators()?.iter().any(|n| n == name) {
            return Err(LedgerError::invalid_tx(format!(
                "validator {} must revoke before withdrawing",
                name
            )));
        }

        let amount = validator.deposit;
        validator.deposit = Coin::ZERO;
        validator.voting_power = Coin::ZERO;
        self.set_validator(&validator)?;
        self.credit_account(name, amount, time, freezing_secs)?;
        log::info!("validator {} withdrew {}", name, amount);
        Ok(amount)
    }

    /// Append validators to the penalty list, skipping ones already there
    pub fn add_penalties(&mut self, names: &[String]) -> LedgerResult<Vec<String>> {
        let mut list: Vec<String> = self.get_list(keys::PENALTY_LIST)?;
        let mut added = Vec::new();
        for name in names {
            if !list.contains(name) {
                list.push(name.clone());
                added.push(name.clone());
            }
        }
        self.set_record(keys::PENALTY_LIST, &list)?;
        Ok(added)
    }

    pub fn penalty_list(&self) -> LedgerResult<Vec<String>> {
        self.get_list(keys::PENALTY_LIST)
    }
}
