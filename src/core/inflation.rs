//! Inflation scheduler and global economic state
//!
//! The scheduler is driven by block time only. At the end of each block the
//! elapsed-minute counter in [`GlobalState`] catches up one minute at a time
//! to the block time; every 60th minute is an hour tick. On an hour tick
//! each pool whose cadence divides the hour releases
//!
//! ```text
//! release = remaining / (periods_per_year - period + 1)
//! ```
//!
//! which drains the pool exactly at the last period of the year. Releases
//! are split evenly over the pool's recipients; the integer-division
//! leftover stays in the pool and is part of the next period's base. At
//! hour 8760 a new year starts and every pool is refilled with
//! `total_supply * growth_rate * allocation`.

use crate::core::coin::{Coin, Ratio};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::params::{InflationCadence, HOURS_PER_YEAR, MINUTES_PER_HOUR};
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};

// =============================================================================
// Allocation and pools
// =============================================================================

/// Share of yearly inflation per pool; the four ratios sum to one
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalAllocation {
    pub validator: Ratio,
    pub content: Ratio,
    pub developer: Ratio,
    pub infra: Ratio,
}

impl GlobalAllocation {
    pub fn validate(&self) -> LedgerResult<()> {
        let sum = self
            .validator
            .checked_add(self.content)?
            .checked_add(self.developer)?
            .checked_add(self.infra)?;
        if sum != Ratio::ONE {
            return Err(LedgerError::InvalidProposal {
                reason: format!("allocation sums to {}, expected 1", sum),
            });
        }
        Ok(())
    }
}

impl Default for GlobalAllocation {
    fn default() -> Self {
        let pct = |n| Ratio::new(n, 100).unwrap_or(Ratio::ZERO);
        Self {
            validator: pct(10),
            content: pct(50),
            developer: pct(20),
            infra: pct(20),
        }
    }
}

/// Pools fed by inflation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pool {
    Validator,
    Content,
    Developer,
    Infra,
}

impl Pool {
    pub const ALL: [Pool; 4] = [Pool::Validator, Pool::Content, Pool::Developer, Pool::Infra];

    fn cadence(self, cadence: &InflationCadence) -> u64 {
        match self {
            Pool::Validator => cadence.validator_hours,
            Pool::Content => cadence.content_hours,
            Pool::Developer => cadence.developer_hours,
            Pool::Infra => cadence.infra_hours,
        }
    }

    fn share(self, allocation: &GlobalAllocation) -> Ratio {
        match self {
            Pool::Validator => allocation.validator,
            Pool::Content => allocation.content,
            Pool::Developer => allocation.developer,
            Pool::Infra => allocation.infra,
        }
    }
}

/// Coins each pool still has to release this year
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InflationPools {
    pub validator: Coin,
    pub content: Coin,
    pub developer: Coin,
    pub infra: Coin,
}

impl InflationPools {
    pub fn get(&self, pool: Pool) -> Coin {
        match pool {
            Pool::Validator => self.validator,
            Pool::Content => self.content,
            Pool::Developer => self.developer,
            Pool::Infra => self.infra,
        }
    }

    fn get_mut(&mut self, pool: Pool) -> &mut Coin {
        match pool {
            Pool::Validator => &mut self.validator,
            Pool::Content => &mut self.content,
            Pool::Developer => &mut self.developer,
            Pool::Infra => &mut self.infra,
        }
    }
}

// =============================================================================
// Global state
// =============================================================================

/// The single persisted economic record under `global/state`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalState {
    pub total_supply: Coin,
    pub growth_rate: Ratio,
    pub allocation: GlobalAllocation,
    pub chain_start_time: i64,
    pub elapsed_minutes: u64,
    /// Elapsed hour at which the current inflation year began
    pub year_start_hour: u64,
    pub year: u64,
    pub pools: InflationPools,
    /// Accrued content-creator rewards awaiting distribution
    pub content_reward_pool: Coin,
    /// Transfer and donation fees
    pub collected_fees: Coin,
}

impl GlobalState {
    pub fn new(
        total_supply: Coin,
        growth_rate: Ratio,
        allocation: GlobalAllocation,
        chain_start_time: i64,
    ) -> LedgerResult<Self> {
        allocation.validate()?;
        let mut state = Self {
            total_supply,
            growth_rate,
            allocation,
            chain_start_time,
            elapsed_minutes: 0,
            year_start_hour: 0,
            year: 1,
            pools: InflationPools::default(),
            content_reward_pool: Coin::ZERO,
            collected_fees: Coin::ZERO,
        };
        state.refill_pools()?;
        Ok(state)
    }

    /// Add one year's inflation on top of whatever the pools still hold
    fn refill_pools(&mut self) -> LedgerResult<()> {
        for pool in Pool::ALL {
            let rate = self.growth_rate.checked_mul(pool.share(&self.allocation))?;
            let fresh = self.total_supply.mul_ratio(rate)?;
            let slot = self.pools.get_mut(pool);
            *slot = slot.checked_add(fresh)?;
        }
        Ok(())
    }

    pub fn add_fee(&mut self, fee: Coin) -> LedgerResult<()> {
        self.collected_fees = self.collected_fees.checked_add(fee)?;
        Ok(())
    }
}

/// One payout produced by an hour tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub hour: u64,
    pub pool: Pool,
    /// `None` for the content pool, which accrues into `content_reward_pool`
    pub recipient: Option<String>,
    pub amount: Coin,
}

/// Hour and block a tick's payouts are credited at
struct Payout {
    hour: u64,
    block_time: i64,
    /// Vesting period of the credited coins
    freezing_secs: i64,
}

impl State<'_> {
    pub fn global_state(&self) -> LedgerResult<GlobalState> {
        self.get_record(keys::GLOBAL_STATE)?
            .ok_or_else(|| LedgerError::Store {
                reason: "global state missing; chain not initialized".to_string(),
            })
    }

    pub fn set_global_state(&mut self, global: &GlobalState) -> LedgerResult<()> {
        self.set_record(keys::GLOBAL_STATE, global)
    }

    pub fn developers(&self) -> LedgerResult<Vec<String>> {
        self.get_list(keys::DEVELOPER_LIST)
    }

    pub fn infra_providers(&self) -> LedgerResult<Vec<String>> {
        self.get_list(keys::INFRA_LIST)
    }

    /// Catch the minute counter up to `block_time`, running every hour tick
    /// passed on the way. Returns the payouts made.
    pub fn advance_inflation(&mut self, block_time: i64) -> LedgerResult<Vec<Distribution>> {
        let mut global = self.global_state()?;
        let params = self.params()?;
        let elapsed_secs = block_time.saturating_sub(global.chain_start_time).max(0) as u64;
        let target_minutes = elapsed_secs / 60;

        let mut distributions = Vec::new();
        while target_minutes > global.elapsed_minutes {
            global.elapsed_minutes += 1;
            if global.elapsed_minutes % MINUTES_PER_HOUR == 0 {
                self.hour_tick(
                    &mut global,
                    &params.cadence,
                    params.freezing_period_secs(),
                    block_time,
                    &mut distributions,
                )?;
            }
        }

        self.set_global_state(&global)?;
        Ok(distributions)
    }

    fn hour_tick(
        &mut self,
        global: &mut GlobalState,
        cadence: &InflationCadence,
        freezing_secs: i64,
        block_time: i64,
        distributions: &mut Vec<Distribution>,
    ) -> LedgerResult<()> {
        let elapsed_hours = global.elapsed_minutes / MINUTES_PER_HOUR;
        let hour = elapsed_hours - global.year_start_hour;
        let payout = Payout {
            hour: elapsed_hours,
            block_time,
            freezing_secs,
        };

        for pool in Pool::ALL {
            let every = pool.cadence(cadence);
            if hour % every != 0 {
                continue;
            }
            let periods = HOURS_PER_YEAR / every;
            let period = hour / every;
            let remaining = global.pools.get(pool);
            let (release, _) = remaining.split((periods - period + 1) as u128);
            if release.is_zero() {
                continue;
            }

            let paid = match pool {
                Pool::Content => {
                    global.content_reward_pool = global.content_reward_pool.checked_add(release)?;
                    distributions.push(Distribution {
                        hour: elapsed_hours,
                        pool,
                        recipient: None,
                        amount: release,
                    });
                    release
                }
                Pool::Validator | Pool::Developer | Pool::Infra => {
                    let recipients = match pool {
                        Pool::Validator => self.oncall_validators()?,
                        Pool::Developer => self.developers()?,
                        _ => self.infra_providers()?,
                    };
                    self.pay_evenly(pool, release, &recipients, &payout, distributions)?
                }
            };

            let slot = global.pools.get_mut(pool);
            *slot = slot
                .checked_sub(paid)
                .ok_or_else(|| LedgerError::overflow("inflation pool underflow"))?;
            global.total_supply = global.total_supply.checked_add(paid)?;
        }

        if hour == HOURS_PER_YEAR {
            global.year_start_hour = elapsed_hours;
            global.year += 1;
            global.refill_pools()?;
            log::info!(
                "inflation year {} started; supply {} pools {:?}",
                global.year,
                global.total_supply.to_lno_string(),
                global.pools
            );
        }
        Ok(())
    }

    fn pay_evenly(
        &mut self,
        pool: Pool,
        release: Coin,
        recipients: &[String],
        payout: &Payout,
        distributions: &mut Vec<Distribution>,
    ) -> LedgerResult<Coin> {
        let (share, _) = release.split(recipients.len() as u128);
        if share.is_zero() {
            return Ok(Coin::ZERO);
        }
        for name in recipients {
            self.credit_account(name, share, payout.block_time, payout.freezing_secs)?;
            distributions.push(Distribution {
                hour: payout.hour,
                pool,
                recipient: Some(name.clone()),
                amount: share,
            });
        }
        log::debug!(
            "hour {}: {:?} pool paid {} to {} recipients",
            payout.hour,
            pool,
            share,
            recipients.len()
        );
        Coin::sum(std::iter::repeat(share).take(recipients.len()))
    }
}
