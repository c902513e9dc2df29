//! Chain parameters
//!
//! Fixed at genesis (optionally overridden by the genesis file) and stored
//! under `global/params`.

use crate::core::coin::{Coin, Ratio, DECIMALS};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};

/// Hours in an inflation year
pub const HOURS_PER_YEAR: u64 = 8760;

/// Minutes per hour tick
pub const MINUTES_PER_HOUR: u64 = 60;

/// Release cadence of each inflation pool, in hours
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InflationCadence {
    pub validator_hours: u64,
    pub content_hours: u64,
    pub developer_hours: u64,
    pub infra_hours: u64,
}

impl Default for InflationCadence {
    fn default() -> Self {
        Self {
            validator_hours: 1,
            content_hours: 1,
            developer_hours: 24,
            infra_hours: 24,
        }
    }
}

impl InflationCadence {
    /// Every cadence must be positive and divide the year evenly
    pub fn validate(&self) -> LedgerResult<()> {
        for hours in [
            self.validator_hours,
            self.content_hours,
            self.developer_hours,
            self.infra_hours,
        ] {
            if hours == 0 || HOURS_PER_YEAR % hours != 0 {
                return Err(LedgerError::invalid_tx(format!(
                    "inflation cadence {}h does not divide {}h",
                    hours, HOURS_PER_YEAR
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerParams {
    /// Deposit needed to hold an on-call seat
    pub validator_min_deposit: Coin,
    /// Deposit needed to register as a voter
    pub voter_min_deposit: Coin,
    pub max_oncall_validators: usize,
    /// Blocks a revoked or newly registered validator waits before withdrawing
    pub validator_withdraw_lockup_blocks: u64,
    /// Proposals are decided at every multiple of this height
    pub decide_interval_blocks: u64,
    /// Fraction of cast vote weight a proposal must strictly exceed
    pub pass_threshold: Ratio,
    pub freezing_period_hours: u64,
    pub cadence: InflationCadence,
}

impl Default for LedgerParams {
    fn default() -> Self {
        Self {
            validator_min_deposit: Coin::new(1_000 * DECIMALS),
            voter_min_deposit: Coin::new(1_000 * DECIMALS),
            max_oncall_validators: 21,
            validator_withdraw_lockup_blocks: 100,
            decide_interval_blocks: 100,
            pass_threshold: Ratio::new(2, 3).unwrap_or(Ratio::ONE),
            freezing_period_hours: 7 * 24,
            cadence: InflationCadence::default(),
        }
    }
}

impl LedgerParams {
    pub fn freezing_period_secs(&self) -> i64 {
        (self.freezing_period_hours as i64).saturating_mul(3600)
    }

    pub fn validate(&self) -> LedgerResult<()> {
        self.cadence.validate()?;
        if self.max_oncall_validators == 0 {
            return Err(LedgerError::invalid_tx("max_oncall_validators must be positive"));
        }
        if self.decide_interval_blocks == 0 {
            return Err(LedgerError::invalid_tx("decide_interval_blocks must be positive"));
        }
        if self.pass_threshold > Ratio::ONE {
            return Err(LedgerError::invalid_tx("pass_threshold above 1"));
        }
        Ok(())
    }
}

impl State<'_> {
    /// Stored parameters, falling back to defaults before genesis
    pub fn params(&self) -> LedgerResult<LedgerParams> {
        Ok(self.get_record(keys::GLOBAL_PARAMS)?.unwrap_or_default())
    }

    pub fn set_params(&mut self, params: &LedgerParams) -> LedgerResult<()> {
        self.set_record(keys::GLOBAL_PARAMS, params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let params = LedgerParams::default();
        params.validate().unwrap();
        assert_eq!(params.pass_threshold, Ratio::new(2, 3).unwrap());
        assert_eq!(params.freezing_period_secs(), 7 * 24 * 3600);
    }

    #[test]
    fn test_cadence_must_divide_year() {
        let cadence = InflationCadence {
            developer_hours: 7,
            ..Default::default()
        };
        assert!(cadence.validate().is_err());
    }

    #[test]
    fn test_partial_params_json() {
        let params: LedgerParams =
            serde_json::from_str(r#"{"max_oncall_validators": 3, "pass_threshold": "1/2"}"#).unwrap();
        assert_eq!(params.max_oncall_validators, 3);
        assert_eq!(params.pass_threshold, Ratio::new(1, 2).unwrap());
        assert_eq!(params.decide_interval_blocks, 100);
    }
}
