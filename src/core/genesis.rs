//! Genesis configuration
//!
//! The JSON document a chain starts from: funded accounts (optionally
//! registered as validators), developers, infrastructure providers, the
//! opening global economics and optional parameter overrides.

use crate::core::account::Account;
use crate::core::coin::{Coin, Ratio};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::inflation::{GlobalAllocation, GlobalState};
use crate::core::params::LedgerParams;
use crate::core::state::{keys, State};
use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Default chain id for locally generated genesis files
pub const DEFAULT_CHAIN_ID: &str = "lino-local";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisAccount {
    pub name: String,
    /// Opening balance in LNO, e.g. `"1000.5"`
    pub lino: String,
    #[serde(default)]
    pub public_key: Option<String>,
    #[serde(default)]
    pub is_validator: bool,
    #[serde(default)]
    pub validator_public_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisDeveloper {
    pub name: String,
    pub deposit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisInfra {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisGlobalState {
    pub total_lino: String,
    pub growth_rate: Ratio,
    pub allocations: GlobalAllocation,
    pub freezing_period_hr: u64,
}

impl Default for GenesisGlobalState {
    fn default() -> Self {
        Self {
            total_lino: "10000000000".to_string(),
            growth_rate: Ratio::new(98, 1000).unwrap_or(Ratio::ZERO),
            allocations: GlobalAllocation::default(),
            freezing_period_hr: 7 * 24,
        }
    }
}

/// A developer registered at genesis with a bonded deposit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Developer {
    pub name: String,
    pub deposit: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenesisState {
    pub chain_id: String,
    pub accounts: Vec<GenesisAccount>,
    #[serde(default)]
    pub developers: Vec<GenesisDeveloper>,
    #[serde(default)]
    pub infra: Vec<GenesisInfra>,
    pub global_state: GenesisGlobalState,
    #[serde(default)]
    pub params: Option<LedgerParams>,
}

impl GenesisState {
    /// Single-account genesis: `lino` holds the whole supply, runs the only
    /// validator and is the sole developer and infra provider.
    pub fn single(public_key: &str, validator_public_key: &str) -> Self {
        let global_state = GenesisGlobalState::default();
        Self {
            chain_id: DEFAULT_CHAIN_ID.to_string(),
            accounts: vec![GenesisAccount {
                name: "lino".to_string(),
                lino: global_state.total_lino.clone(),
                public_key: Some(public_key.to_string()),
                is_validator: true,
                validator_public_key: validator_public_key.to_string(),
            }],
            developers: vec![GenesisDeveloper {
                name: "lino".to_string(),
                deposit: "1000000".to_string(),
            }],
            infra: vec![GenesisInfra {
                name: "lino".to_string(),
            }],
            global_state,
            params: None,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, StorageError> {
        let file = fs::File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let file = fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Effective parameters: overrides (or defaults) with the genesis
    /// freezing period
    pub fn effective_params(&self) -> LedgerResult<LedgerParams> {
        let mut params = self.params.clone().unwrap_or_default();
        params.freezing_period_hours = self.global_state.freezing_period_hr;
        params.validate()?;
        Ok(params)
    }
}

impl State<'_> {
    /// Write the genesis state into an empty store
    pub fn apply_genesis(&mut self, genesis: &GenesisState, genesis_time: i64) -> LedgerResult<()> {
        if self.has_record(keys::GLOBAL_STATE) {
            return Err(LedgerError::Store {
                reason: "chain already initialized".to_string(),
            });
        }

        let params = genesis.effective_params()?;
        self.set_params(&params)?;

        let global = &genesis.global_state;
        let state = GlobalState::new(
            Coin::parse_lno(&global.total_lino)?,
            global.growth_rate,
            global.allocations.clone(),
            genesis_time,
        )?;
        self.set_global_state(&state)?;

        for entry in &genesis.accounts {
            self.apply_genesis_account(entry, genesis_time, &params)?;
        }

        let mut developers = self.developers()?;
        for entry in &genesis.developers {
            let deposit = Coin::parse_lno(&entry.deposit)?;
            let mut account = self.account(&entry.name)?;
            account.debit(deposit)?;
            self.set_account(&account)?;
            self.set_record(
                &keys::developer(&entry.name),
                &Developer {
                    name: entry.name.clone(),
                    deposit,
                },
            )?;
            if !developers.contains(&entry.name) {
                developers.push(entry.name.clone());
            }
        }
        self.set_record(keys::DEVELOPER_LIST, &developers)?;

        let mut infra = self.infra_providers()?;
        for entry in &genesis.infra {
            if !infra.contains(&entry.name) {
                infra.push(entry.name.clone());
            }
        }
        self.set_record(keys::INFRA_LIST, &infra)?;

        log::info!(
            "genesis applied for chain {}: {} accounts, supply {} LNO",
            genesis.chain_id,
            genesis.accounts.len(),
            state.total_supply.to_lno_string()
        );
        Ok(())
    }

    fn apply_genesis_account(
        &mut self,
        entry: &GenesisAccount,
        genesis_time: i64,
        params: &LedgerParams,
    ) -> LedgerResult<()> {
        if self.account_exists(&entry.name) {
            return Err(LedgerError::DuplicateAddress {
                address: entry.name.clone(),
            });
        }
        let mut account = Account::new(&entry.name, genesis_time);
        // genesis coins are fully matured
        account.credit(Coin::parse_lno(&entry.lino)?, genesis_time, 0)?;
        account.mature_coin_days(genesis_time)?;
        account.public_key = entry.public_key.clone();
        self.set_account(&account)?;

        if entry.is_validator {
            self.deposit_voter(&entry.name, params.voter_min_deposit, params.voter_min_deposit)?;
            self.deposit_validator(
                &entry.name,
                &entry.validator_public_key,
                params.validator_min_deposit,
                0,
                params,
            )?;
        }
        Ok(())
    }
}
