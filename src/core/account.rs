//! Account model
//!
//! An account holds a balance, two replay-protection counters (one for
//! general transactions, one for posts), an optional bound public key, role
//! flags and the coin-day queue. Coin-day is stake that matures linearly
//! over the freezing period after each credit.

use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::state::{keys, State};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Roles an account currently holds
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct AccountFlags: u8 {
        const VALIDATOR = 0b0000_0001;
        const VOTER = 0b0000_0010;
    }
}

/// Coins credited at `start_time` that fully mature at `end_time`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingCoinDay {
    pub amount: Coin,
    pub start_time: i64,
    pub end_time: i64,
}

impl PendingCoinDay {
    /// Matured portion at `time`, rounded down
    fn matured_at(&self, time: i64) -> Coin {
        if time >= self.end_time || self.end_time <= self.start_time {
            return self.amount;
        }
        if time <= self.start_time {
            return Coin::ZERO;
        }
        let elapsed = (time - self.start_time) as u128;
        let total = (self.end_time - self.start_time) as u128;
        // amount < 2^127 in practice; fall back to whole-period granularity otherwise
        match self.amount.units().checked_mul(elapsed) {
            Some(n) => Coin::new(n / total),
            None => Coin::new(self.amount.units() / total * elapsed),
        }
    }
}

/// Account record stored under `account/<address>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub address: String,
    pub balance: Coin,
    pub sequence: u64,
    pub last_post_sequence: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default)]
    pub flags: AccountFlags,
    #[serde(default)]
    pub coin_day: Coin,
    #[serde(default)]
    pub pending_coin_days: Vec<PendingCoinDay>,
    pub created_at: i64,
}

impl Account {
    /// A fresh zero-balance account
    pub fn new(address: &str, created_at: i64) -> Self {
        Self {
            address: address.to_string(),
            balance: Coin::ZERO,
            sequence: 0,
            last_post_sequence: 0,
            public_key: None,
            flags: AccountFlags::empty(),
            coin_day: Coin::ZERO,
            pending_coin_days: Vec::new(),
            created_at,
        }
    }

    pub fn is_validator(&self) -> bool {
        self.flags.contains(AccountFlags::VALIDATOR)
    }

    pub fn is_voter(&self) -> bool {
        self.flags.contains(AccountFlags::VOTER)
    }

    /// Add coins and queue them for coin-day maturation
    pub fn credit(&mut self, amount: Coin, time: i64, freezing_secs: i64) -> LedgerResult<()> {
        self.mature_coin_days(time)?;
        self.balance = self.balance.checked_add(amount)?;
        if amount.is_positive() {
            self.pending_coin_days.push(PendingCoinDay {
                amount,
                start_time: time,
                end_time: time.saturating_add(freezing_secs),
            });
        }
        Ok(())
    }

    /// Remove coins, consuming the newest unmatured coin-day first
    pub fn debit(&mut self, amount: Coin) -> LedgerResult<()> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                address: self.address.clone(),
                have: self.balance,
                need: amount,
            })?;

        let mut remaining = amount;
        while remaining.is_positive() {
            let Some(last) = self.pending_coin_days.last_mut() else {
                break;
            };
            match remaining.checked_sub(last.amount) {
                Some(rest) => {
                    remaining = rest;
                    self.pending_coin_days.pop();
                }
                None => {
                    last.amount = last.amount.saturating_sub(remaining);
                    remaining = Coin::ZERO;
                }
            }
        }
        self.coin_day = self.coin_day.saturating_sub(remaining);
        Ok(())
    }

    /// Move fully matured entries into `coin_day`
    pub fn mature_coin_days(&mut self, time: i64) -> LedgerResult<()> {
        let (done, pending): (Vec<_>, Vec<_>) = self
            .pending_coin_days
            .drain(..)
            .partition(|p| p.end_time <= time);
        for entry in done {
            self.coin_day = self.coin_day.checked_add(entry.amount)?;
        }
        self.pending_coin_days = pending;
        Ok(())
    }

    /// Stake at `time`: matured coin-day plus the linear share of pending entries
    pub fn coin_day_at(&self, time: i64) -> LedgerResult<Coin> {
        Coin::sum(
            std::iter::once(self.coin_day)
                .chain(self.pending_coin_days.iter().map(|p| p.matured_at(time))),
        )
    }

    /// Bump the general sequence after a successful signed action
    pub fn bump_sequence(&mut self) {
        self.sequence += 1;
    }
}

impl State<'_> {
    pub fn get_account(&self, address: &str) -> LedgerResult<Option<Account>> {
        self.get_record(&keys::account(address))
    }

    /// Load an account that must exist
    pub fn account(&self, address: &str) -> LedgerResult<Account> {
        self.get_account(address)?
            .ok_or_else(|| LedgerError::UnknownAccount {
                address: address.to_string(),
            })
    }

    pub fn account_exists(&self, address: &str) -> bool {
        self.has_record(&keys::account(address))
    }

    pub fn set_account(&mut self, account: &Account) -> LedgerResult<()> {
        self.set_record(&keys::account(&account.address), account)
    }

    /// Credit `address`, creating the account if this is its first credit
    pub fn credit_account(
        &mut self,
        address: &str,
        amount: Coin,
        time: i64,
        freezing_secs: i64,
    ) -> LedgerResult<Account> {
        let mut account = self
            .get_account(address)?
            .unwrap_or_else(|| Account::new(address, time));
        account.credit(amount, time, freezing_secs)?;
        self.set_account(&account)?;
        Ok(account)
    }

    pub fn accounts(&self) -> LedgerResult<Vec<Account>> {
        Ok(self
            .records_with_prefix::<Account>(keys::ACCOUNT_PREFIX)?
            .into_iter()
            .map(|(_, account)| account)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::storage::MemStore;

    const DAY: i64 = 86_400;

    #[test]
    fn test_credit_and_debit() {
        let mut account = Account::new("alice", 0);
        account.credit(Coin::new(100), 0, 7 * DAY).unwrap();
        account.debit(Coin::new(30)).unwrap();
        assert_eq!(account.balance, Coin::new(70));

        let err = account.debit(Coin::new(71)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
        assert_eq!(account.balance, Coin::new(70));
    }

    #[test]
    fn test_coin_day_matures_linearly() {
        let mut account = Account::new("alice", 0);
        account.credit(Coin::new(1000), 0, 10 * DAY).unwrap();

        assert_eq!(account.coin_day_at(0).unwrap(), Coin::ZERO);
        assert_eq!(account.coin_day_at(5 * DAY).unwrap(), Coin::new(500));
        assert_eq!(account.coin_day_at(20 * DAY).unwrap(), Coin::new(1000));

        account.mature_coin_days(10 * DAY).unwrap();
        assert!(account.pending_coin_days.is_empty());
        assert_eq!(account.coin_day, Coin::new(1000));
    }

    #[test]
    fn test_debit_consumes_newest_pending_first() {
        let mut account = Account::new("alice", 0);
        account.credit(Coin::new(100), 0, DAY).unwrap();
        account.mature_coin_days(DAY).unwrap();
        account.credit(Coin::new(50), DAY, 10 * DAY).unwrap();
        account.credit(Coin::new(20), 2 * DAY, 10 * DAY).unwrap();

        account.debit(Coin::new(30)).unwrap();
        assert_eq!(account.pending_coin_days.len(), 1);
        assert_eq!(account.pending_coin_days[0].amount, Coin::new(40));
        assert_eq!(account.coin_day, Coin::new(100));

        account.debit(Coin::new(60)).unwrap();
        assert!(account.pending_coin_days.is_empty());
        assert_eq!(account.coin_day, Coin::new(80));
    }

    #[test]
    fn test_flags_serde() {
        let mut account = Account::new("val", 0);
        account.flags |= AccountFlags::VALIDATOR | AccountFlags::VOTER;
        let json = serde_json::to_string(&account).unwrap();
        let back: Account = serde_json::from_str(&json).unwrap();
        assert!(back.is_validator());
        assert!(back.is_voter());
    }

    #[test]
    fn test_state_credit_creates_account() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);

        assert_eq!(
            state.account("bob").unwrap_err().kind(),
            ErrorKind::UnknownAccount
        );
        state.credit_account("bob", Coin::new(5), 42, DAY).unwrap();
        let bob = state.account("bob").unwrap();
        assert_eq!(bob.balance, Coin::new(5));
        assert_eq!(bob.created_at, 42);
        assert_eq!(bob.public_key, None);
    }
}
