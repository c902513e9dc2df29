//! Transaction execution
//!
//! One handler per message kind, selected by a single exhaustive match.
//! Handlers validate first and only then write. The caller runs each
//! transaction against its own overlay and drops the overlay on error, so a
//! rejected transaction leaves the ledger untouched even when a handler
//! fails half way through its writes.

use crate::core::account::Account;
use crate::core::app::BlockContext;
use crate::core::coin::Coin;
use crate::core::error::{LedgerError, LedgerResult};
use crate::core::governance::ParameterChange;
use crate::core::ibc::Packet;
use crate::core::params::LedgerParams;
use crate::core::post::{PostInfo, PostKey};
use crate::core::state::State;
use crate::core::transaction::{Msg, Signer, Transaction, TxInput, TxOutput};
use crate::core::validation::{
    bind_public_key, check_input_authorized, check_inputs_well_formed,
    check_outputs_well_formed, check_post_authorized, check_signer_authorized, resolve_inputs,
    resolve_outputs, sum_inputs, sum_outputs,
};

/// Side effects of an applied transaction worth reporting
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TxEffects {
    pub packets: Vec<Packet>,
    pub proposal_id: Option<u64>,
}

/// Everything a handler needs besides the state
struct Env<'a> {
    block: &'a BlockContext,
    params: LedgerParams,
    sign_bytes: Vec<u8>,
}

impl Env<'_> {
    fn freezing_secs(&self) -> i64 {
        self.params.freezing_period_secs()
    }
}

/// Validate and apply one transaction
pub fn execute_tx(
    state: &mut State<'_>,
    tx: &Transaction,
    block: &BlockContext,
) -> LedgerResult<TxEffects> {
    if tx.chain_id != block.chain_id {
        return Err(LedgerError::invalid_tx(format!(
            "transaction for chain {:?} delivered to {:?}",
            tx.chain_id, block.chain_id
        )));
    }
    let env = Env {
        block,
        params: state.params()?,
        sign_bytes: tx.sign_bytes()?,
    };

    match &tx.msg {
        Msg::Transfer {
            inputs,
            outputs,
            fee,
        } => handle_transfer(state, &env, inputs, outputs, *fee),
        Msg::CreatePost { signer, post } => handle_create_post(state, &env, signer, post),
        Msg::Like {
            signer,
            target,
            weight,
        } => handle_like(state, &env, signer, target, *weight),
        Msg::View { signer, target } => handle_view(state, &env, signer, target),
        Msg::Donate { input, fee, target } => handle_donate(state, &env, input, *fee, target),
        Msg::ValidatorDeposit {
            signer,
            deposit,
            validator_key,
        } => handle_validator_deposit(state, &env, signer, *deposit, validator_key),
        Msg::ValidatorWithdraw { signer } => handle_validator_withdraw(state, &env, signer),
        Msg::ValidatorRevoke { signer } => handle_validator_revoke(state, &env, signer),
        Msg::VoterDeposit { signer, deposit } => handle_voter_deposit(state, &env, signer, *deposit),
        Msg::VoterWithdraw { signer, amount } => {
            handle_voter_withdraw(state, &env, signer, *amount)
        }
        Msg::Delegate {
            signer,
            voter,
            amount,
        } => handle_delegate(state, &env, signer, voter, *amount),
        Msg::RevokeDelegation { signer, voter } => {
            handle_revoke_delegation(state, &env, signer, voter)
        }
        Msg::SubmitProposal { signer, change } => {
            handle_submit_proposal(state, &env, signer, change)
        }
        Msg::Vote {
            signer,
            proposal_id,
            approve,
        } => handle_vote(state, &env, signer, *proposal_id, *approve),
    }
}

// =============================================================================
// Transfers
// =============================================================================

fn handle_transfer(
    state: &mut State<'_>,
    env: &Env<'_>,
    inputs: &[TxInput],
    outputs: &[TxOutput],
    fee: Coin,
) -> LedgerResult<TxEffects> {
    check_inputs_well_formed(inputs)?;
    check_outputs_well_formed(outputs)?;

    let accounts = resolve_inputs(state, inputs)?;
    for input in inputs {
        if let Some(account) = accounts.get(&input.address) {
            check_input_authorized(account, &env.sign_bytes, input)?;
        }
    }

    let total_in = sum_inputs(inputs)?;
    let total_out = sum_outputs(outputs)?.checked_add(fee)?;
    if total_in != total_out {
        return Err(LedgerError::invalid_amount(format!(
            "inputs {} do not equal outputs plus fee {}",
            total_in, total_out
        )));
    }

    let mut accounts = resolve_outputs(state, accounts, outputs, env.block.time)?;

    for input in inputs {
        let account = accounts
            .get_mut(&input.address)
            .ok_or_else(|| LedgerError::UnknownAccount {
                address: input.address.clone(),
            })?;
        bind_public_key(account, input.public_key.as_deref());
        account.debit(input.amount)?;
        account.bump_sequence();
    }

    let mut effects = TxEffects::default();
    for output in outputs {
        match output.foreign_target() {
            Some((chain, address)) => {
                let packet =
                    state.emit_coin_packet(&env.block.chain_id, chain, address, output.amount)?;
                effects.packets.push(packet);
            }
            None => {
                let account = accounts.get_mut(&output.address).ok_or_else(|| {
                    LedgerError::UnknownAccount {
                        address: output.address.clone(),
                    }
                })?;
                account.credit(output.amount, env.block.time, env.freezing_secs())?;
            }
        }
    }

    for account in accounts.values() {
        state.set_account(account)?;
    }
    collect_fee(state, fee)?;
    Ok(effects)
}

fn collect_fee(state: &mut State<'_>, fee: Coin) -> LedgerResult<()> {
    if fee.is_zero() {
        return Ok(());
    }
    let mut global = state.global_state()?;
    global.add_fee(fee)?;
    state.set_global_state(&global)
}

// =============================================================================
// Content
// =============================================================================

fn handle_create_post(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    post: &PostInfo,
) -> LedgerResult<TxEffects> {
    post.validate_basic()?;
    if post.author != signer.address {
        return Err(LedgerError::invalid_tx(format!(
            "{} cannot post as {}",
            signer.address, post.author
        )));
    }

    // posting is the one action that may create the author's account
    let mut account = state
        .get_account(&post.author)?
        .unwrap_or_else(|| Account::new(&post.author, env.block.time));
    check_post_authorized(&account, &env.sign_bytes, signer)?;

    state.create_post(post, env.block.time)?;
    bind_public_key(&mut account, signer.public_key.as_deref());
    account.last_post_sequence = signer.sequence;
    state.set_account(&account)?;
    Ok(TxEffects::default())
}

fn handle_like(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    target: &PostKey,
    weight: i64,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.add_like(target, &signer.address, weight, env.block.time)?;
    Ok(TxEffects::default())
}

fn handle_view(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    target: &PostKey,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.add_view(target, &signer.address, env.block.time)?;
    Ok(TxEffects::default())
}

/// Donor pays `cost`; the author receives `cost - fee`
fn handle_donate(
    state: &mut State<'_>,
    env: &Env<'_>,
    input: &TxInput,
    fee: Coin,
    target: &PostKey,
) -> LedgerResult<TxEffects> {
    check_inputs_well_formed(std::slice::from_ref(input))?;
    let received = input.amount.checked_sub(fee).ok_or_else(|| {
        LedgerError::invalid_amount(format!("fee {} exceeds donation {}", fee, input.amount))
    })?;

    let mut donor = state.account(&input.address)?;
    check_input_authorized(&donor, &env.sign_bytes, input)?;
    state.require_post(target)?;

    bind_public_key(&mut donor, input.public_key.as_deref());
    donor.debit(input.amount)?;
    donor.bump_sequence();
    state.set_account(&donor)?;

    state.credit_account(&target.author, received, env.block.time, env.freezing_secs())?;
    state.add_donation(target, &input.address, received, env.block.time)?;
    collect_fee(state, fee)?;
    Ok(TxEffects::default())
}

// =============================================================================
// Validators and governance
// =============================================================================

/// Authorize a single signer, bind its key and consume its sequence
fn authorize_signer(state: &mut State<'_>, env: &Env<'_>, signer: &Signer) -> LedgerResult<()> {
    let mut account = state.account(&signer.address)?;
    check_signer_authorized(&account, &env.sign_bytes, signer)?;
    bind_public_key(&mut account, signer.public_key.as_deref());
    account.bump_sequence();
    state.set_account(&account)
}

fn require_positive(amount: Coin, what: &str) -> LedgerResult<()> {
    if amount.is_positive() {
        Ok(())
    } else {
        Err(LedgerError::invalid_amount(format!("{} must be positive", what)))
    }
}

fn handle_validator_deposit(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    deposit: Coin,
    validator_key: &str,
) -> LedgerResult<TxEffects> {
    require_positive(deposit, "validator deposit")?;
    authorize_signer(state, env, signer)?;
    state.deposit_validator(
        &signer.address,
        validator_key,
        deposit,
        env.block.height,
        &env.params,
    )?;
    Ok(TxEffects::default())
}

fn handle_validator_withdraw(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.withdraw_validator(
        &signer.address,
        env.block.height,
        env.block.time,
        env.freezing_secs(),
    )?;
    Ok(TxEffects::default())
}

fn handle_validator_revoke(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.revoke_validator(&signer.address, env.block.height, &env.params)?;
    Ok(TxEffects::default())
}

fn handle_voter_deposit(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    deposit: Coin,
) -> LedgerResult<TxEffects> {
    require_positive(deposit, "voter deposit")?;
    authorize_signer(state, env, signer)?;
    state.deposit_voter(&signer.address, deposit, env.params.voter_min_deposit)?;
    Ok(TxEffects::default())
}

fn handle_voter_withdraw(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    amount: Coin,
) -> LedgerResult<TxEffects> {
    require_positive(amount, "voter withdrawal")?;
    authorize_signer(state, env, signer)?;
    state.withdraw_voter(
        &signer.address,
        amount,
        env.params.voter_min_deposit,
        env.block.time,
        env.freezing_secs(),
    )?;
    Ok(TxEffects::default())
}

fn handle_delegate(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    voter: &str,
    amount: Coin,
) -> LedgerResult<TxEffects> {
    require_positive(amount, "delegation")?;
    authorize_signer(state, env, signer)?;
    state.delegate(&signer.address, voter, amount)?;
    Ok(TxEffects::default())
}

fn handle_revoke_delegation(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    voter: &str,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.revoke_delegation(&signer.address, voter, env.block.time, env.freezing_secs())?;
    Ok(TxEffects::default())
}

fn handle_submit_proposal(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    change: &ParameterChange,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    let id = state.submit_proposal(&signer.address, change.clone(), env.block.height)?;
    Ok(TxEffects {
        proposal_id: Some(id),
        ..Default::default()
    })
}

fn handle_vote(
    state: &mut State<'_>,
    env: &Env<'_>,
    signer: &Signer,
    proposal_id: u64,
    approve: bool,
) -> LedgerResult<TxEffects> {
    authorize_signer(state, env, signer)?;
    state.cast_vote(&signer.address, proposal_id, approve)?;
    Ok(TxEffects::default())
}
