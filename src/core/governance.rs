//! Voters, delegation and proposals
//!
//! Voting power is a voter's own deposit plus everything delegated to it.
//! Proposals collect votes while ongoing and are resolved by the decide
//! event: a proposal passes when its yes weight strictly exceeds the pass
//! threshold of the weight cast on it. On-call validators that did not vote
//! on a decided proposal are added to the penalty list.

use crate::core::account::AccountFlags;
use crate::core::coin::{Coin, Ratio};
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::inflation::GlobalAllocation;
use crate::core::state::{keys, State};
use serde::{Deserialize, Serialize};

// =============================================================================
// Records
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voter {
    pub username: String,
    pub deposit: Coin,
    pub delegated_power: Coin,
}

impl Voter {
    pub fn power(&self) -> LedgerResult<Coin> {
        self.deposit.checked_add(self.delegated_power)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delegation {
    pub delegator: String,
    pub amount: Coin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vote {
    pub voter: String,
    pub approve: bool,
}

/// What a proposal changes once it passes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterChange {
    /// Replace the whole allocation; takes effect when the next year's pools are filled
    Allocation(GlobalAllocation),
    GrowthRate(Ratio),
}

impl ParameterChange {
    pub fn validate(&self) -> LedgerResult<()> {
        match self {
            ParameterChange::Allocation(allocation) => allocation.validate(),
            ParameterChange::GrowthRate(rate) => {
                if *rate > Ratio::ONE {
                    Err(LedgerError::InvalidProposal {
                        reason: format!("growth rate {} above 1", rate),
                    })
                } else {
                    Ok(())
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Ongoing,
    Passed,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Proposal {
    pub id: u64,
    pub creator: String,
    pub change: ParameterChange,
    /// In cast order
    pub votes: Vec<Vote>,
    pub status: ProposalStatus,
    pub created_at_height: u64,
}

/// Outcome of one decide event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecideOutcome {
    pub passed: Vec<u64>,
    pub rejected: Vec<u64>,
    /// Validators newly added to the penalty list
    pub penalized: Vec<String>,
}

// =============================================================================
// Voters and delegation
// =============================================================================

impl State<'_> {
    pub fn get_voter(&self, name: &str) -> LedgerResult<Option<Voter>> {
        self.get_record(&keys::voter(name))
    }

    pub fn voter(&self, name: &str) -> LedgerResult<Voter> {
        self.get_voter(name)?.ok_or_else(|| LedgerError::UnknownVoter {
            name: name.to_string(),
        })
    }

    pub fn set_voter(&mut self, voter: &Voter) -> LedgerResult<()> {
        self.set_record(&keys::voter(&voter.username), voter)
    }

    /// Move `deposit` from the balance into the voter deposit, registering
    /// the voter when the total reaches the minimum
    pub fn deposit_voter(
        &mut self,
        name: &str,
        deposit: Coin,
        min_deposit: Coin,
    ) -> LedgerResult<Voter> {
        let mut account = self.account(name)?;
        let voter = match self.get_voter(name)? {
            Some(mut voter) => {
                voter.deposit = voter.deposit.checked_add(deposit)?;
                voter
            }
            None => {
                if deposit < min_deposit {
                    return Err(LedgerError::InsufficientDeposit {
                        name: name.to_string(),
                        have: deposit,
                        need: min_deposit,
                    });
                }
                Voter {
                    username: name.to_string(),
                    deposit,
                    delegated_power: Coin::ZERO,
                }
            }
        };
        account.debit(deposit)?;
        account.flags |= AccountFlags::VOTER;
        self.set_account(&account)?;
        self.set_voter(&voter)?;
        Ok(voter)
    }

    /// Withdraw part of a voter deposit. Withdrawing everything deregisters
    /// the voter and returns every delegation to its delegator.
    pub fn withdraw_voter(
        &mut self,
        name: &str,
        amount: Coin,
        min_deposit: Coin,
        time: i64,
        freezing_secs: i64,
    ) -> LedgerResult<()> {
        let mut voter = self.voter(name)?;
        let remaining = voter
            .deposit
            .checked_sub(amount)
            .ok_or_else(|| LedgerError::InsufficientDeposit {
                name: name.to_string(),
                have: voter.deposit,
                need: amount,
            })?;

        if remaining.is_zero() {
            for (key, delegation) in
                self.records_with_prefix::<Delegation>(&keys::delegation_prefix(name))?
            {
                self.credit_account(&delegation.delegator, delegation.amount, time, freezing_secs)?;
                self.delete_record(&key);
            }
            self.delete_record(&keys::voter(name));
            let mut account = self.account(name)?;
            account.flags.remove(AccountFlags::VOTER);
            self.set_account(&account)?;
            log::info!("voter {} deregistered", name);
        } else {
            if remaining < min_deposit {
                return Err(LedgerError::InsufficientDeposit {
                    name: name.to_string(),
                    have: remaining,
                    need: min_deposit,
                });
            }
            voter.deposit = remaining;
            self.set_voter(&voter)?;
        }

        self.credit_account(name, amount, time, freezing_secs)?;
        Ok(())
    }

    pub fn get_delegation(&self, voter: &str, delegator: &str) -> LedgerResult<Option<Delegation>> {
        self.get_record(&keys::delegation(voter, delegator))
    }

    /// Lend `amount` of the delegator's balance to a voter's power
    pub fn delegate(&mut self, delegator: &str, voter_name: &str, amount: Coin) -> LedgerResult<()> {
        let mut voter = self.voter(voter_name)?;
        let mut account = self.account(delegator)?;
        account.debit(amount)?;
        self.set_account(&account)?;

        let delegation = match self.get_delegation(voter_name, delegator)? {
            Some(mut existing) => {
                existing.amount = existing.amount.checked_add(amount)?;
                existing
            }
            None => Delegation {
                delegator: delegator.to_string(),
                amount,
            },
        };
        self.set_record(&keys::delegation(voter_name, delegator), &delegation)?;
        voter.delegated_power = voter.delegated_power.checked_add(amount)?;
        self.set_voter(&voter)
    }

    /// Cancel a delegation and return its coins to the delegator
    pub fn revoke_delegation(
        &mut self,
        delegator: &str,
        voter_name: &str,
        time: i64,
        freezing_secs: i64,
    ) -> LedgerResult<Coin> {
        let mut voter = self.voter(voter_name)?;
        let delegation = self
            .get_delegation(voter_name, delegator)?
            .ok_or_else(|| LedgerError::invalid_tx(format!(
                "{} has no delegation to {}",
                delegator, voter_name
            )))?;

        voter.delegated_power = voter.delegated_power.saturating_sub(delegation.amount);
        self.set_voter(&voter)?;
        self.delete_record(&keys::delegation(voter_name, delegator));
        self.credit_account(delegator, delegation.amount, time, freezing_secs)?;
        Ok(delegation.amount)
    }
}

// =============================================================================
// Proposals
// =============================================================================

impl State<'_> {
    pub fn get_proposal(&self, id: u64) -> LedgerResult<Option<Proposal>> {
        self.get_record(&keys::proposal(id))
    }

    pub fn ongoing_proposals(&self) -> LedgerResult<Vec<u64>> {
        self.get_list(keys::PROPOSAL_ONGOING)
    }

    pub fn decided_proposals(&self) -> LedgerResult<Vec<u64>> {
        self.get_list(keys::PROPOSAL_DECIDED)
    }

    /// Open a proposal; only registered voters may propose
    pub fn submit_proposal(
        &mut self,
        creator: &str,
        change: ParameterChange,
        height: u64,
    ) -> LedgerResult<u64> {
        if self.get_voter(creator)?.is_none() {
            return Err(LedgerError::UnauthorizedProposal {
                creator: creator.to_string(),
            });
        }
        change.validate()?;

        let id: u64 = self.get_record(keys::PROPOSAL_COUNTER)?.unwrap_or(1);
        self.set_record(keys::PROPOSAL_COUNTER, &(id + 1))?;
        let proposal = Proposal {
            id,
            creator: creator.to_string(),
            change,
            votes: Vec::new(),
            status: ProposalStatus::Ongoing,
            created_at_height: height,
        };
        self.set_record(&keys::proposal(id), &proposal)?;

        let mut ongoing = self.ongoing_proposals()?;
        ongoing.push(id);
        self.set_record(keys::PROPOSAL_ONGOING, &ongoing)?;
        log::info!("proposal {} submitted by {}", id, creator);
        Ok(id)
    }

    pub fn cast_vote(&mut self, voter: &str, id: u64, approve: bool) -> LedgerResult<()> {
        self.voter(voter)?;
        let mut proposal = match self.get_proposal(id)? {
            Some(p) if p.status == ProposalStatus::Ongoing => p,
            _ => {
                return Err(LedgerError::UnknownProposal {
                    proposal_id: id.to_string(),
                })
            }
        };
        if proposal.votes.iter().any(|v| v.voter == voter) {
            return Err(LedgerError::AlreadyVoted {
                voter: voter.to_string(),
                proposal_id: id.to_string(),
            });
        }
        proposal.votes.push(Vote {
            voter: voter.to_string(),
            approve,
        });
        self.set_record(&keys::proposal(id), &proposal)
    }

    /// Resolve every ongoing proposal in insertion order
    pub fn decide_proposals(&mut self, threshold: Ratio) -> LedgerResult<DecideOutcome> {
        let ongoing = self.ongoing_proposals()?;
        let mut outcome = DecideOutcome::default();
        if ongoing.is_empty() {
            return Ok(outcome);
        }

        let oncall = self.oncall_validators()?;
        let mut decided = self.decided_proposals()?;
        let mut absent = Vec::new();

        for id in ongoing {
            let Some(mut proposal) = self.get_proposal(id)? else {
                return Err(LedgerError::Store {
                    reason: format!("ongoing proposal {} has no record", id),
                });
            };

            let (yes, no) = self.tally(&proposal)?;
            let total = yes.checked_add(no)?;
            if threshold.is_exceeded_by(yes.units(), total.units()) {
                proposal.status = ProposalStatus::Passed;
                self.apply_change(&proposal.change)?;
                outcome.passed.push(id);
                log::info!("proposal {} passed ({} yes / {} cast)", id, yes, total);
            } else {
                proposal.status = ProposalStatus::Rejected;
                outcome.rejected.push(id);
                log::info!("proposal {} rejected ({} yes / {} cast)", id, yes, total);
            }

            for validator in &oncall {
                if !proposal.votes.iter().any(|v| v.voter == *validator)
                    && !absent.contains(validator)
                {
                    absent.push(validator.clone());
                }
            }

            self.set_record(&keys::proposal(id), &proposal)?;
            decided.push(id);
        }

        self.set_record(keys::PROPOSAL_ONGOING, &Vec::<u64>::new())?;
        self.set_record(keys::PROPOSAL_DECIDED, &decided)?;
        outcome.penalized = self.add_penalties(&absent)?;
        if !outcome.penalized.is_empty() {
            log::warn!("validators penalized for not voting: {:?}", outcome.penalized);
        }
        Ok(outcome)
    }

    /// Weighted `(yes, no)` of votes from still-registered voters
    fn tally(&self, proposal: &Proposal) -> LedgerResult<(Coin, Coin)> {
        let mut yes = Coin::ZERO;
        let mut no = Coin::ZERO;
        for vote in &proposal.votes {
            let Some(voter) = self.get_voter(&vote.voter)? else {
                continue;
            };
            let power = voter.power()?;
            if vote.approve {
                yes = yes.checked_add(power)?;
            } else {
                no = no.checked_add(power)?;
            }
        }
        Ok((yes, no))
    }

    fn apply_change(&mut self, change: &ParameterChange) -> LedgerResult<()> {
        let mut global = self.global_state()?;
        match change {
            ParameterChange::Allocation(allocation) => global.allocation = allocation.clone(),
            ParameterChange::GrowthRate(rate) => global.growth_rate = *rate,
        }
        self.set_global_state(&global)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;
    use crate::core::inflation::GlobalState;
    use crate::core::validator::ValidatorList;
    use crate::storage::MemStore;

    const MIN: u64 = 1_000;

    fn setup(state: &mut State<'_>) {
        let global = GlobalState::new(
            Coin::new(1_000_000),
            Ratio::new(98, 1000).unwrap(),
            GlobalAllocation::default(),
            0,
        )
        .unwrap();
        state.set_global_state(&global).unwrap();
    }

    fn add_voter(state: &mut State<'_>, name: &str, extra: u64) {
        state
            .credit_account(name, Coin::from(MIN + extra), 0, 0)
            .unwrap();
        state
            .deposit_voter(name, Coin::from(MIN + extra), Coin::from(MIN))
            .unwrap();
    }

    fn infra_change(infra: u128, content: u128) -> ParameterChange {
        ParameterChange::Allocation(GlobalAllocation {
            validator: Ratio::new(10, 100).unwrap(),
            content: Ratio::new(content, 100).unwrap(),
            developer: Ratio::new(20, 100).unwrap(),
            infra: Ratio::new(infra, 100).unwrap(),
        })
    }

    fn infra(state: &State<'_>) -> Ratio {
        state.global_state().unwrap().allocation.infra
    }

    #[test]
    fn test_decide_scenario() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "user1", 20);
        add_voter(&mut state, "user2", 30);
        add_voter(&mut state, "user3", 50);
        add_voter(&mut state, "user4", 10);
        let before = infra(&state);

        let id1 = state.submit_proposal("user1", infra_change(50, 20), 1).unwrap();
        let id2 = state.submit_proposal("user2", infra_change(60, 10), 1).unwrap();
        let threshold = Ratio::new(2, 3).unwrap();

        state.cast_vote("user1", id1, true).unwrap();
        state.cast_vote("user2", id1, false).unwrap();
        assert_eq!(state.ongoing_proposals().unwrap(), vec![id1, id2]);

        // id1 is split against, id2 has no votes: both rejected
        let outcome = state.decide_proposals(threshold).unwrap();
        assert_eq!(outcome.rejected, vec![id1, id2]);
        assert!(outcome.passed.is_empty());
        assert_eq!(infra(&state), before);
        assert!(state.ongoing_proposals().unwrap().is_empty());
        assert_eq!(state.decided_proposals().unwrap(), vec![id1, id2]);

        // a decided proposal never takes votes again
        assert_eq!(
            state.cast_vote("user3", id1, true).unwrap_err().kind(),
            ErrorKind::UnknownProposal
        );

        let id3 = state.submit_proposal("user3", infra_change(60, 10), 2).unwrap();
        state.cast_vote("user1", id3, true).unwrap();
        let outcome = state.decide_proposals(threshold).unwrap();
        assert_eq!(outcome.passed, vec![id3]);
        assert_eq!(infra(&state), Ratio::new(60, 100).unwrap());

        // deciding again with nothing ongoing changes nothing
        let outcome = state.decide_proposals(threshold).unwrap();
        assert_eq!(outcome, DecideOutcome::default());
        assert_eq!(state.decided_proposals().unwrap(), vec![id1, id2, id3]);
        assert_eq!(
            state.get_proposal(id3).unwrap().unwrap().status,
            ProposalStatus::Passed
        );
    }

    #[test]
    fn test_non_voting_validators_penalized() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "user1", 20);
        add_voter(&mut state, "user2", 30);
        state
            .set_validator_list(&ValidatorList {
                oncall: vec!["user2".to_string(), "user1".to_string()],
                all: vec!["user2".to_string(), "user1".to_string()],
            })
            .unwrap();

        let id = state.submit_proposal("user1", infra_change(50, 20), 1).unwrap();
        state.cast_vote("user1", id, true).unwrap();
        let outcome = state.decide_proposals(Ratio::new(2, 3).unwrap()).unwrap();

        assert_eq!(outcome.penalized, vec!["user2".to_string()]);
        assert_eq!(state.penalty_list().unwrap(), vec!["user2"]);
    }

    #[test]
    fn test_no_votes_penalizes_every_oncall_validator() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "user1", 0);
        state
            .set_validator_list(&ValidatorList {
                oncall: vec!["v1".to_string(), "v2".to_string()],
                all: vec!["v1".to_string(), "v2".to_string()],
            })
            .unwrap();
        state.submit_proposal("user1", infra_change(50, 20), 1).unwrap();
        state.submit_proposal("user1", infra_change(60, 10), 1).unwrap();

        let outcome = state.decide_proposals(Ratio::new(2, 3).unwrap()).unwrap();
        assert_eq!(outcome.rejected.len(), 2);
        assert_eq!(outcome.penalized, vec!["v1".to_string(), "v2".to_string()]);
    }

    #[test]
    fn test_proposal_rules() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "user1", 0);
        state.credit_account("outsider", Coin::new(5), 0, 0).unwrap();

        assert_eq!(
            state
                .submit_proposal("outsider", infra_change(50, 20), 1)
                .unwrap_err()
                .kind(),
            ErrorKind::UnauthorizedProposal
        );
        assert_eq!(
            state
                .submit_proposal("user1", infra_change(80, 20), 1)
                .unwrap_err()
                .kind(),
            ErrorKind::InvalidProposal
        );

        let id = state.submit_proposal("user1", infra_change(50, 20), 1).unwrap();
        state.cast_vote("user1", id, false).unwrap();
        assert_eq!(
            state.cast_vote("user1", id, true).unwrap_err().kind(),
            ErrorKind::AlreadyVoted
        );
        assert_eq!(
            state.cast_vote("outsider", id, true).unwrap_err().kind(),
            ErrorKind::UnknownVoter
        );
    }

    #[test]
    fn test_delegation_adds_power() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "voter", 0);
        state.credit_account("fan", Coin::new(500), 0, 0).unwrap();

        state.delegate("fan", "voter", Coin::new(200)).unwrap();
        state.delegate("fan", "voter", Coin::new(100)).unwrap();
        assert_eq!(
            state.voter("voter").unwrap().power().unwrap(),
            Coin::from(MIN + 300)
        );
        assert_eq!(state.account("fan").unwrap().balance, Coin::new(200));

        assert_eq!(
            state.revoke_delegation("fan", "voter", 0, 0).unwrap(),
            Coin::new(300)
        );
        assert_eq!(state.voter("voter").unwrap().delegated_power, Coin::ZERO);
        assert_eq!(state.account("fan").unwrap().balance, Coin::new(500));
    }

    #[test]
    fn test_voter_withdraw() {
        let mut store = MemStore::new();
        let mut state = State::new(&mut store);
        setup(&mut state);
        add_voter(&mut state, "voter", 100);
        state.credit_account("fan", Coin::new(50), 0, 0).unwrap();
        state.delegate("fan", "voter", Coin::new(50)).unwrap();

        // cannot drop below the minimum without leaving entirely
        assert_eq!(
            state
                .withdraw_voter("voter", Coin::new(101), Coin::from(MIN), 0, 0)
                .unwrap_err()
                .kind(),
            ErrorKind::InsufficientDeposit
        );
        state
            .withdraw_voter("voter", Coin::new(100), Coin::from(MIN), 0, 0)
            .unwrap();
        assert_eq!(state.voter("voter").unwrap().deposit, Coin::from(MIN));

        state
            .withdraw_voter("voter", Coin::from(MIN), Coin::from(MIN), 0, 0)
            .unwrap();
        assert!(state.get_voter("voter").unwrap().is_none());
        assert!(!state.account("voter").unwrap().is_voter());
        assert_eq!(state.account("voter").unwrap().balance, Coin::from(MIN + 100));
        assert_eq!(state.account("fan").unwrap().balance, Coin::new(50));
    }
}
