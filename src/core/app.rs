//! Block lifecycle driver
//!
//! The consensus engine drives `begin_block`, then any number of
//! `deliver_tx`, then `end_block` and `commit`. Writes accumulate in a block
//! overlay over the committed store; each transaction runs in its own
//! overlay on top of that and is folded in only when it succeeds. Check mode
//! runs the same executor against a scratch overlay that is thrown away at
//! every commit.

use crate::core::coin::Coin;
use crate::core::error::{ErrorKind, LedgerError, LedgerResult};
use crate::core::executor::{execute_tx, TxEffects};
use crate::core::genesis::GenesisState;
use crate::core::governance::DecideOutcome;
use crate::core::ibc::Packet;
use crate::core::inflation::Distribution;
use crate::core::state::{keys, State};
use crate::core::transaction::Transaction;
use crate::crypto::{sha256_hex, state_root};
use crate::storage::{CacheStore, ChangeSet, MemStore, Snapshot, Storage};
use serde::{Deserialize, Serialize};

// =============================================================================
// Lifecycle types
// =============================================================================

/// Header information every state transition is evaluated against
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockContext {
    pub height: u64,
    /// Unix seconds
    pub time: i64,
    pub chain_id: String,
}

impl BlockContext {
    pub fn new(height: u64, time: i64, chain_id: &str) -> Self {
        Self {
            height,
            time,
            chain_id: chain_id.to_string(),
        }
    }
}

/// Result of delivering or checking one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct TxResponse {
    /// 0 on success, otherwise the error kind's code
    pub code: u32,
    pub error: Option<ErrorKind>,
    pub log: String,
    pub hash: String,
    pub packets: Vec<Packet>,
    pub proposal_id: Option<u64>,
}

impl TxResponse {
    fn accepted(hash: String, effects: TxEffects) -> Self {
        Self {
            code: 0,
            error: None,
            log: String::new(),
            hash,
            packets: effects.packets,
            proposal_id: effects.proposal_id,
        }
    }

    fn rejected(hash: String, err: &LedgerError) -> Self {
        Self {
            code: err.code(),
            error: Some(err.kind()),
            log: err.to_string(),
            hash,
            packets: Vec::new(),
            proposal_id: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == 0
    }
}

/// Change in a validator's consensus power
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorUpdate {
    pub name: String,
    pub public_key: String,
    /// Zero removes the validator from consensus
    pub power: Coin,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndBlockResponse {
    pub validator_updates: Vec<ValidatorUpdate>,
    pub passed: Vec<u64>,
    pub rejected: Vec<u64>,
    pub penalized: Vec<String>,
    pub distributions: Vec<Distribution>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub height: u64,
    /// Hex merkle root of the committed store
    pub root: String,
}

/// Persisted under `meta/last-commit`; excluded from the state root
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct LastCommit {
    height: u64,
    root: String,
    time: i64,
    chain_id: String,
}

/// Everything one block produced
#[derive(Debug, Clone, PartialEq)]
pub struct BlockResult {
    pub responses: Vec<TxResponse>,
    pub end: EndBlockResponse,
    pub commit: CommitInfo,
}

// =============================================================================
// Application
// =============================================================================

pub struct LedgerApp {
    committed: MemStore,
    block_changes: ChangeSet,
    check_changes: ChangeSet,
    block: Option<BlockContext>,
    /// On-call validators and their power when the current block began
    oncall_at_begin: Vec<(String, Coin)>,
    last_commit: Option<LastCommit>,
    storage: Option<Storage>,
}

impl Default for LedgerApp {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerApp {
    /// Fresh in-memory ledger
    pub fn new() -> Self {
        Self {
            committed: MemStore::new(),
            block_changes: ChangeSet::new(),
            check_changes: ChangeSet::new(),
            block: None,
            oncall_at_begin: Vec::new(),
            last_commit: None,
            storage: None,
        }
    }

    /// Ledger that snapshots every commit to `storage`, resuming from the
    /// latest snapshot if one exists
    pub fn open(storage: Storage) -> LedgerResult<Self> {
        let mut app = Self::new();
        if storage.exists() {
            let snapshot = storage.load()?;
            app.committed = snapshot.restore()?;

            let root = app.compute_root();
            if root != snapshot.root {
                return Err(LedgerError::Store {
                    reason: format!(
                        "snapshot root {} does not match recomputed root {}",
                        snapshot.root, root
                    ),
                });
            }
            app.last_commit = app.query(|state| state.get_record(keys::LAST_COMMIT))?;
            log::info!(
                "resumed ledger at height {} (root {})",
                snapshot.height,
                snapshot.root
            );
        }
        app.storage = Some(storage);
        Ok(app)
    }

    pub fn chain_id(&self) -> Option<&str> {
        self.last_commit.as_ref().map(|c| c.chain_id.as_str())
    }

    /// Height of the last commit; 0 after genesis
    pub fn height(&self) -> Option<u64> {
        self.last_commit.as_ref().map(|c| c.height)
    }

    /// Time of the last committed block (genesis time after `init_chain`)
    pub fn last_block_time(&self) -> Option<i64> {
        self.last_commit.as_ref().map(|c| c.time)
    }

    pub fn last_commit(&self) -> Option<CommitInfo> {
        self.last_commit.as_ref().map(|c| CommitInfo {
            height: c.height,
            root: c.root.clone(),
        })
    }

    /// Read-only access to committed state plus the open block's writes
    pub fn query<T>(&self, f: impl FnOnce(&State<'_>) -> LedgerResult<T>) -> LedgerResult<T> {
        let mut view = CacheStore::with_changes(&self.committed, self.block_changes.clone());
        let state = State::new(&mut view);
        f(&state)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Write the genesis state and commit it as height 0
    pub fn init_chain(
        &mut self,
        genesis: &GenesisState,
        genesis_time: i64,
    ) -> LedgerResult<CommitInfo> {
        if self.last_commit.is_some() {
            return Err(lifecycle_error("chain already initialized"));
        }
        let mut changes = ChangeSet::new();
        in_overlay(&self.committed, &mut changes, |state| {
            state.apply_genesis(genesis, genesis_time)
        })?;
        self.committed.apply(changes);
        self.seal(0, genesis_time, &genesis.chain_id)
    }

    pub fn begin_block(&mut self, ctx: BlockContext) -> LedgerResult<()> {
        let last = self
            .last_commit
            .as_ref()
            .ok_or_else(|| lifecycle_error("begin_block before init_chain"))?;
        if self.block.is_some() {
            return Err(lifecycle_error("begin_block while a block is open"));
        }
        if ctx.chain_id != last.chain_id {
            return Err(lifecycle_error(format!(
                "block for chain {} on chain {}",
                ctx.chain_id, last.chain_id
            )));
        }
        if ctx.height != last.height + 1 {
            return Err(lifecycle_error(format!(
                "expected height {}, got {}",
                last.height + 1,
                ctx.height
            )));
        }

        self.oncall_at_begin = self.query(oncall_powers)?;
        log::debug!(
            "begin block {} at {}",
            ctx.height,
            format_time(ctx.time)
        );
        self.block = Some(ctx);
        Ok(())
    }

    /// Execute one transaction inside the open block. Rejections come back
    /// as a non-zero response code; only store faults are errors.
    pub fn deliver_tx(&mut self, bytes: &[u8]) -> LedgerResult<TxResponse> {
        let block = self
            .block
            .clone()
            .ok_or_else(|| lifecycle_error("deliver_tx outside a block"))?;
        let response = run_bytes(&self.committed, &mut self.block_changes, bytes, &block)?;
        if let Some(kind) = response.error {
            log::debug!("tx {} rejected ({}): {}", response.hash, kind, response.log);
        }
        Ok(response)
    }

    /// Validate a transaction against committed state plus earlier checks,
    /// without touching either
    pub fn check_tx(&mut self, bytes: &[u8]) -> LedgerResult<TxResponse> {
        let last = self
            .last_commit
            .as_ref()
            .ok_or_else(|| lifecycle_error("check_tx before init_chain"))?;
        let ctx = BlockContext::new(last.height + 1, last.time, &last.chain_id);
        run_bytes(&self.committed, &mut self.check_changes, bytes, &ctx)
    }

    /// Run inflation, then the governance decide event when due, and report
    /// validator set changes since `begin_block`
    pub fn end_block(&mut self) -> LedgerResult<EndBlockResponse> {
        let block = self
            .block
            .clone()
            .ok_or_else(|| lifecycle_error("end_block outside a block"))?;
        let before = std::mem::take(&mut self.oncall_at_begin);

        let response = in_overlay(&self.committed, &mut self.block_changes, |state| {
            let distributions = state.advance_inflation(block.time)?;

            let params = state.params()?;
            let decided = if block.height % params.decide_interval_blocks == 0 {
                state.decide_proposals(params.pass_threshold)?
            } else {
                DecideOutcome::default()
            };

            Ok(EndBlockResponse {
                validator_updates: validator_updates(state, &before)?,
                passed: decided.passed,
                rejected: decided.rejected,
                penalized: decided.penalized,
                distributions,
            })
        })?;

        if !response.distributions.is_empty() {
            log::info!(
                "block {}: {} inflation payouts",
                block.height,
                response.distributions.len()
            );
        }
        Ok(response)
    }

    /// Make the block durable and return the new state root
    pub fn commit(&mut self) -> LedgerResult<CommitInfo> {
        let block = self
            .block
            .take()
            .ok_or_else(|| lifecycle_error("commit outside a block"))?;
        self.committed.apply(std::mem::take(&mut self.block_changes));
        self.check_changes.clear();
        self.seal(block.height, block.time, &block.chain_id)
    }

    /// begin, deliver each transaction, end and commit
    pub fn execute_block(&mut self, ctx: BlockContext, txs: &[Vec<u8>]) -> LedgerResult<BlockResult> {
        self.begin_block(ctx)?;
        let mut responses = Vec::with_capacity(txs.len());
        for tx in txs {
            responses.push(self.deliver_tx(tx)?);
        }
        let end = self.end_block()?;
        let commit = self.commit()?;
        Ok(BlockResult {
            responses,
            end,
            commit,
        })
    }

    fn compute_root(&self) -> String {
        let root = state_root(
            self.committed
                .entries()
                .iter()
                .filter(|(key, _)| key.as_slice() != keys::LAST_COMMIT.as_bytes()),
        );
        hex::encode(root)
    }

    fn seal(&mut self, height: u64, time: i64, chain_id: &str) -> LedgerResult<CommitInfo> {
        let root = self.compute_root();
        let last = LastCommit {
            height,
            root: root.clone(),
            time,
            chain_id: chain_id.to_string(),
        };
        State::new(&mut self.committed).set_record(keys::LAST_COMMIT, &last)?;

        if let Some(storage) = &self.storage {
            storage.save(&Snapshot::capture(height, root.clone(), &self.committed))?;
        }
        log::info!("committed height {} root {}", height, &root[..16.min(root.len())]);
        self.last_commit = Some(last);
        Ok(CommitInfo { height, root })
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn lifecycle_error(reason: impl Into<String>) -> LedgerError {
    LedgerError::Store {
        reason: reason.into(),
    }
}

fn format_time(time: i64) -> String {
    chrono::DateTime::from_timestamp(time, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| time.to_string())
}

/// Run `f` in a child overlay of `changes`, keeping its writes only if it
/// succeeds
fn in_overlay<T>(
    base: &MemStore,
    changes: &mut ChangeSet,
    f: impl FnOnce(&mut State<'_>) -> LedgerResult<T>,
) -> LedgerResult<T> {
    let mut parent = CacheStore::with_changes(base, std::mem::take(changes));
    let result = {
        let mut overlay = CacheStore::new(&parent);
        let result = f(&mut State::new(&mut overlay));
        result.map(|value| (value, overlay.into_changes()))
    };
    let result = result.map(|(value, written)| {
        parent.apply(written);
        value
    });
    *changes = parent.into_changes();
    result
}

/// Decode and execute one transaction in a child overlay of `changes`,
/// folding its writes in only on success
fn run_bytes(
    base: &MemStore,
    changes: &mut ChangeSet,
    bytes: &[u8],
    block: &BlockContext,
) -> LedgerResult<TxResponse> {
    let hash = sha256_hex(bytes);
    let tx = match Transaction::decode(bytes) {
        Ok(tx) => tx,
        Err(err) => return Ok(TxResponse::rejected(hash, &err)),
    };

    let mut parent = CacheStore::with_changes(base, std::mem::take(changes));
    let outcome = {
        let mut overlay = CacheStore::new(&parent);
        let result = execute_tx(&mut State::new(&mut overlay), &tx, block);
        result.map(|effects| (effects, overlay.into_changes()))
    };
    let outcome = outcome.map(|(effects, tx_changes)| {
        parent.apply(tx_changes);
        effects
    });
    *changes = parent.into_changes();

    match outcome {
        Ok(effects) => Ok(TxResponse::accepted(hash, effects)),
        Err(err) if err.is_fatal() => Err(err),
        Err(err) => Ok(TxResponse::rejected(hash, &err)),
    }
}

fn oncall_powers(state: &State<'_>) -> LedgerResult<Vec<(String, Coin)>> {
    state
        .oncall_validators()?
        .into_iter()
        .map(|name| {
            let power = state.validator(&name)?.voting_power;
            Ok((name, power))
        })
        .collect()
}

/// Joins and power changes first, then removals with zero power
fn validator_updates(
    state: &State<'_>,
    before: &[(String, Coin)],
) -> LedgerResult<Vec<ValidatorUpdate>> {
    let now = oncall_powers(state)?;
    let mut updates = Vec::new();

    for (name, power) in &now {
        let unchanged = before.iter().any(|(n, p)| n == name && p == power);
        if !unchanged {
            updates.push(ValidatorUpdate {
                name: name.clone(),
                public_key: state.validator(name)?.public_key,
                power: *power,
            });
        }
    }
    for (name, _) in before {
        if !now.iter().any(|(n, _)| n == name) {
            let public_key = state
                .get_validator(name)?
                .map(|v| v.public_key)
                .unwrap_or_default();
            updates.push(ValidatorUpdate {
                name: name.clone(),
                public_key,
                power: Coin::ZERO,
            });
        }
    }
    Ok(updates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::coin::{Ratio, DECIMALS};
    use crate::core::genesis::{GenesisAccount, GenesisGlobalState};
    use crate::core::governance::ParameterChange;
    use crate::core::params::LedgerParams;
    use crate::core::post::{PostInfo, PostKey};
    use crate::core::transaction::{Msg, Signer, TransferBuilder, TxInput};
    use crate::crypto::KeyPair;
    use crate::storage::StorageConfig;

    const CHAIN: &str = "lino-test";
    const T0: i64 = 1_600_000_000;

    fn lno(n: u128) -> Coin {
        Coin::new(n * DECIMALS)
    }

    fn block(height: u64) -> BlockContext {
        BlockContext::new(height, T0 + height as i64 * 5, CHAIN)
    }

    struct Fixture {
        app: LedgerApp,
        alice: KeyPair,
        bob: KeyPair,
        val: KeyPair,
    }

    fn genesis_account(name: &str, lino: &str, key: &KeyPair, is_validator: bool) -> GenesisAccount {
        GenesisAccount {
            name: name.to_string(),
            lino: lino.to_string(),
            public_key: Some(key.public_key_hex()),
            is_validator,
            validator_public_key: format!("{}-consensus", name),
        }
    }

    fn genesis(alice: &KeyPair, bob: &KeyPair, val: &KeyPair) -> GenesisState {
        GenesisState {
            chain_id: CHAIN.to_string(),
            accounts: vec![
                genesis_account("alice", "100", alice, false),
                genesis_account("bob", "7", bob, false),
                genesis_account("val", "1000", val, true),
            ],
            developers: vec![],
            infra: vec![],
            global_state: GenesisGlobalState {
                total_lino: "1107".to_string(),
                ..Default::default()
            },
            params: Some(LedgerParams {
                validator_min_deposit: lno(10),
                voter_min_deposit: lno(10),
                decide_interval_blocks: 2,
                ..Default::default()
            }),
        }
    }

    fn setup() -> Fixture {
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let val = KeyPair::generate();
        let mut app = LedgerApp::new();
        app.init_chain(&genesis(&alice, &bob, &val), T0).unwrap();
        Fixture {
            app,
            alice,
            bob,
            val,
        }
    }

    fn balance(app: &LedgerApp, name: &str) -> Coin {
        app.query(|state| state.account(name)).unwrap().balance
    }

    fn transfer(from: &str, key: &KeyPair, sequence: u64, to: &str, amount: Coin, fee: Coin) -> Vec<u8> {
        TransferBuilder::new(CHAIN)
            .input(from, sequence, amount.checked_add(fee).unwrap())
            .output(to, amount)
            .fee(fee)
            .build_and_sign(&[key])
            .unwrap()
            .encode()
            .unwrap()
    }

    fn signed(msg: Msg, signer: &str, key: &KeyPair) -> Vec<u8> {
        let mut tx = Transaction::new(CHAIN, msg);
        tx.sign(signer, key).unwrap();
        tx.encode().unwrap()
    }

    fn create_post(author: &str, key: &KeyPair, post_sequence: u64, post: PostInfo) -> Vec<u8> {
        signed(
            Msg::CreatePost {
                signer: Signer::new(author, post_sequence),
                post,
            },
            author,
            key,
        )
    }

    #[test]
    fn test_transfer_conserves_balances() {
        let mut f = setup();
        let total = |app: &LedgerApp| {
            let (accounts, fees) = app
                .query(|state| Ok((state.accounts()?, state.global_state()?.collected_fees)))
                .unwrap();
            Coin::sum(accounts.iter().map(|a| a.balance))
                .unwrap()
                .checked_add(fees)
                .unwrap()
        };
        let before = total(&f.app);

        f.app.begin_block(block(1)).unwrap();
        let tx = transfer("alice", &f.alice, 0, "bob", lno(10), lno(1));
        let response = f.app.deliver_tx(&tx).unwrap();
        assert!(response.is_ok(), "{}", response.log);

        assert_eq!(balance(&f.app, "alice"), lno(89));
        assert_eq!(balance(&f.app, "bob"), lno(17));
        assert_eq!(total(&f.app), before);
        assert_eq!(
            f.app.query(|s| s.account("alice")).unwrap().sequence,
            1
        );
    }

    #[test]
    fn test_replay_rejected() {
        let mut f = setup();
        let tx = transfer("alice", &f.alice, 0, "bob", lno(1), Coin::ZERO);

        f.app.begin_block(block(1)).unwrap();
        assert!(f.app.deliver_tx(&tx).unwrap().is_ok());
        let replay = f.app.deliver_tx(&tx).unwrap();
        assert_eq!(replay.error, Some(ErrorKind::InvalidSequence));
        f.app.end_block().unwrap();
        f.app.commit().unwrap();

        f.app.begin_block(block(2)).unwrap();
        let replay = f.app.deliver_tx(&tx).unwrap();
        assert_eq!(replay.error, Some(ErrorKind::InvalidSequence));
        assert_eq!(balance(&f.app, "bob"), lno(8));
    }

    #[test]
    fn test_rejection_leaves_no_trace() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();
        let before = f.app.block_changes.clone();

        let broke = transfer("alice", &f.alice, 0, "bob", lno(500), Coin::ZERO);
        let response = f.app.deliver_tx(&broke).unwrap();
        assert_eq!(response.error, Some(ErrorKind::InsufficientFunds));
        assert_ne!(response.code, 0);

        let forged = transfer("alice", &f.bob, 0, "bob", lno(1), Coin::ZERO);
        let response = f.app.deliver_tx(&forged).unwrap();
        assert_eq!(response.error, Some(ErrorKind::InvalidSignature));

        let garbage = f.app.deliver_tx(b"not a transaction").unwrap();
        assert_eq!(garbage.error, Some(ErrorKind::InvalidTransaction));

        assert_eq!(f.app.block_changes, before);
    }

    #[test]
    fn test_duplicate_addresses_rejected() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();

        let dup_inputs = TransferBuilder::new(CHAIN)
            .input("alice", 0, lno(1))
            .input("alice", 0, lno(1))
            .output("bob", lno(2))
            .build_and_sign(&[&f.alice])
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(
            f.app.deliver_tx(&dup_inputs).unwrap().error,
            Some(ErrorKind::DuplicateAddress)
        );

        let dup_outputs = TransferBuilder::new(CHAIN)
            .input("alice", 0, lno(2))
            .output("bob", lno(1))
            .output("bob", lno(1))
            .build_and_sign(&[&f.alice])
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(
            f.app.deliver_tx(&dup_outputs).unwrap().error,
            Some(ErrorKind::DuplicateAddress)
        );
    }

    #[test]
    fn test_wrong_chain_rejected() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();
        let tx = TransferBuilder::new("other-chain")
            .input("alice", 0, lno(1))
            .output("bob", lno(1))
            .build_and_sign(&[&f.alice])
            .unwrap()
            .encode()
            .unwrap();
        assert_eq!(
            f.app.deliver_tx(&tx).unwrap().error,
            Some(ErrorKind::InvalidTransaction)
        );
    }

    #[test]
    fn test_check_mode_never_mutates() {
        let mut f = setup();
        let committed = f.app.committed.clone();
        let tx = transfer("alice", &f.alice, 0, "bob", lno(1), Coin::ZERO);

        assert!(f.app.check_tx(&tx).unwrap().is_ok());
        assert_eq!(
            f.app.check_tx(&tx).unwrap().error,
            Some(ErrorKind::InvalidSequence)
        );
        assert_eq!(f.app.committed, committed);
        assert_eq!(balance(&f.app, "alice"), lno(100));

        f.app.execute_block(block(1), &[]).unwrap();
        assert!(f.app.check_tx(&tx).unwrap().is_ok());
    }

    #[test]
    fn test_donation_scenario() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();

        let post = PostInfo::new("bob", "p1", "title", "content");
        assert!(f.app.deliver_tx(&create_post("bob", &f.bob, 1, post)).unwrap().is_ok());

        let donate = signed(
            Msg::Donate {
                input: TxInput::new("alice", 0, lno(5)),
                fee: lno(1),
                target: PostKey::new("bob", "p1"),
            },
            "alice",
            &f.alice,
        );
        let response = f.app.deliver_tx(&donate).unwrap();
        assert!(response.is_ok(), "{}", response.log);

        assert_eq!(balance(&f.app, "alice"), lno(95));
        assert_eq!(balance(&f.app, "bob"), lno(11));
        let donations = f
            .app
            .query(|s| s.post_donations(&PostKey::new("bob", "p1")))
            .unwrap();
        assert_eq!(donations.donations.len(), 1);
        assert_eq!(donations.reward, lno(4));
        assert_eq!(
            f.app.query(|s| s.global_state()).unwrap().collected_fees,
            lno(1)
        );
    }

    #[test]
    fn test_donation_fee_above_cost_rejected() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();
        let post = PostInfo::new("bob", "p1", "title", "content");
        f.app.deliver_tx(&create_post("bob", &f.bob, 1, post)).unwrap();

        let donate = signed(
            Msg::Donate {
                input: TxInput::new("alice", 0, lno(1)),
                fee: lno(2),
                target: PostKey::new("bob", "p1"),
            },
            "alice",
            &f.alice,
        );
        assert_eq!(
            f.app.deliver_tx(&donate).unwrap().error,
            Some(ErrorKind::InvalidAmount)
        );
    }

    #[test]
    fn test_post_and_comment_scenario() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();

        let root = PostInfo::new("bob", "p1", "hello", "first post");
        assert!(f.app.deliver_tx(&create_post("bob", &f.bob, 1, root)).unwrap().is_ok());

        let comment =
            PostInfo::new("alice", "c1", "re", "nice").with_parent(PostKey::new("bob", "p1"));
        let response = f
            .app
            .deliver_tx(&create_post("alice", &f.alice, 1, comment))
            .unwrap();
        assert!(response.is_ok(), "{}", response.log);

        let orphan =
            PostInfo::new("alice", "c2", "re", "lost").with_parent(PostKey::new("bob", "nope"));
        assert_eq!(
            f.app
                .deliver_tx(&create_post("alice", &f.alice, 2, orphan))
                .unwrap()
                .error,
            Some(ErrorKind::ParentNotFound)
        );

        let comments = f
            .app
            .query(|s| s.post_comments(&PostKey::new("bob", "p1")))
            .unwrap();
        assert_eq!(comments, vec![PostKey::new("alice", "c1")]);
        assert_eq!(
            f.app.query(|s| s.account("alice")).unwrap().last_post_sequence,
            1
        );

        let like = |weight: i64, post_id: &str| {
            signed(
                Msg::Like {
                    signer: Signer::new("alice", 0),
                    target: PostKey::new("bob", post_id),
                    weight,
                },
                "alice",
                &f.alice,
            )
        };
        assert_eq!(
            f.app.deliver_tx(&like(20_000, "p1")).unwrap().error,
            Some(ErrorKind::WeightOverflow)
        );
        assert_eq!(
            f.app.deliver_tx(&like(10, "missing")).unwrap().error,
            Some(ErrorKind::UnknownTarget)
        );
        assert!(f.app.deliver_tx(&like(10, "p1")).unwrap().is_ok());
        assert_eq!(
            f.app
                .query(|s| s.post_likes(&PostKey::new("bob", "p1")))
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_post_ids_cannot_alias_sub_records() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();

        let post = PostInfo::new("bob", "x", "t", "c");
        assert!(f.app.deliver_tx(&create_post("bob", &f.bob, 1, post)).unwrap().is_ok());
        for (sequence, post_id) in [(2, "x/meta/likes"), (2, "y/likes"), (2, "z#1")] {
            let post = PostInfo::new("bob", post_id, "t", "c");
            assert_eq!(
                f.app
                    .deliver_tx(&create_post("bob", &f.bob, sequence, post))
                    .unwrap()
                    .error,
                Some(ErrorKind::InvalidPost)
            );
        }

        let alias = PostKey::new("bob", "x/meta");
        let like = signed(
            Msg::Like {
                signer: Signer::new("alice", 0),
                target: alias.clone(),
                weight: 10,
            },
            "alice",
            &f.alice,
        );
        assert_eq!(
            f.app.deliver_tx(&like).unwrap().error,
            Some(ErrorKind::InvalidPost)
        );

        let view = signed(
            Msg::View {
                signer: Signer::new("alice", 0),
                target: alias.clone(),
            },
            "alice",
            &f.alice,
        );
        assert_eq!(
            f.app.deliver_tx(&view).unwrap().error,
            Some(ErrorKind::InvalidPost)
        );

        let donate = signed(
            Msg::Donate {
                input: TxInput::new("alice", 0, lno(5)),
                fee: Coin::ZERO,
                target: alias,
            },
            "alice",
            &f.alice,
        );
        assert_eq!(
            f.app.deliver_tx(&donate).unwrap().error,
            Some(ErrorKind::InvalidPost)
        );

        let comment =
            PostInfo::new("alice", "c1", "re", "hi").with_parent(PostKey::new("bob", "x/comments"));
        assert_eq!(
            f.app
                .deliver_tx(&create_post("alice", &f.alice, 1, comment))
                .unwrap()
                .error,
            Some(ErrorKind::InvalidPost)
        );

        let y = PostInfo::new("bob", "y", "t", "c");
        assert!(f.app.deliver_tx(&create_post("bob", &f.bob, 2, y.clone())).unwrap().is_ok());
        assert_eq!(f.app.query(|s| s.get_post(&y.key())).unwrap(), Some(y));
        assert_eq!(balance(&f.app, "alice"), lno(100));
        assert!(f
            .app
            .query(|s| s.post_likes(&PostKey::new("bob", "x")))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_cross_chain_transfer_emits_packets() {
        let mut f = setup();
        let supply = f.app.query(|s| s.global_state()).unwrap().total_supply;
        f.app.begin_block(block(1)).unwrap();

        let first = transfer("alice", &f.alice, 0, "eth/0xabc", lno(10), lno(1));
        let response = f.app.deliver_tx(&first).unwrap();
        assert!(response.is_ok(), "{}", response.log);
        assert_eq!(response.packets.len(), 1);
        let packet = &response.packets[0];
        assert_eq!(packet.src_chain, CHAIN);
        assert_eq!(packet.dst_chain, "eth");
        assert_eq!(packet.sequence, 0);
        assert_eq!(packet.payload.address, "0xabc");
        assert_eq!(packet.payload.coins, lno(10));

        let second = transfer("alice", &f.alice, 1, "eth/0xabc", lno(1), Coin::ZERO);
        assert_eq!(f.app.deliver_tx(&second).unwrap().packets[0].sequence, 1);

        assert_eq!(balance(&f.app, "alice"), lno(88));
        assert!(!f.app.query(|s| Ok(s.account_exists("eth/0xabc"))).unwrap());
        assert_eq!(
            f.app.query(|s| s.global_state()).unwrap().total_supply,
            supply
        );
    }

    #[test]
    fn test_governance_through_blocks() {
        let mut f = setup();
        f.app.begin_block(block(1)).unwrap();

        let submit = signed(
            Msg::SubmitProposal {
                signer: Signer::new("val", 0),
                change: ParameterChange::GrowthRate(Ratio::new(5, 100).unwrap()),
            },
            "val",
            &f.val,
        );
        let response = f.app.deliver_tx(&submit).unwrap();
        assert!(response.is_ok(), "{}", response.log);
        let id = response.proposal_id.unwrap();

        let vote = signed(
            Msg::Vote {
                signer: Signer::new("val", 1),
                proposal_id: id,
                approve: true,
            },
            "val",
            &f.val,
        );
        assert!(f.app.deliver_tx(&vote).unwrap().is_ok());
        let end = f.app.end_block().unwrap();
        assert!(end.passed.is_empty());
        f.app.commit().unwrap();

        let result = f.app.execute_block(block(2), &[]).unwrap();
        assert_eq!(result.end.passed, vec![id]);
        assert!(result.end.penalized.is_empty());
        assert_eq!(
            f.app.query(|s| s.global_state()).unwrap().growth_rate,
            Ratio::new(5, 100).unwrap()
        );
    }

    #[test]
    fn test_unvoted_proposals_rejected_and_validators_penalized() {
        let keys: Vec<KeyPair> = (0..6).map(|_| KeyPair::generate()).collect();
        let names = ["user1", "user2", "user3", "user4", "val1", "val2"];
        let genesis = GenesisState {
            chain_id: CHAIN.to_string(),
            accounts: names
                .iter()
                .zip(&keys)
                .enumerate()
                .map(|(i, (name, key))| genesis_account(name, "100", key, i >= 4))
                .collect(),
            developers: vec![],
            infra: vec![],
            global_state: GenesisGlobalState {
                total_lino: "600".to_string(),
                ..Default::default()
            },
            params: Some(LedgerParams {
                validator_min_deposit: lno(10),
                voter_min_deposit: lno(5),
                decide_interval_blocks: 2,
                ..Default::default()
            }),
        };
        let mut app = LedgerApp::new();
        app.init_chain(&genesis, T0).unwrap();

        let mut txs: Vec<Vec<u8>> = [20, 30, 50, 10]
            .iter()
            .enumerate()
            .map(|(i, deposit)| {
                let msg = Msg::VoterDeposit {
                    signer: Signer::new(names[i], 0),
                    deposit: lno(*deposit),
                };
                signed(msg, names[i], &keys[i])
            })
            .collect();
        let proposal = |i: usize, sequence: u64, rate: u128| {
            let msg = Msg::SubmitProposal {
                signer: Signer::new(names[i], sequence),
                change: ParameterChange::GrowthRate(Ratio::new(rate, 100).unwrap()),
            };
            signed(msg, names[i], &keys[i])
        };
        txs.push(proposal(0, 1, 5));
        txs.push(proposal(1, 1, 7));

        let first = app.execute_block(block(1), &txs).unwrap();
        for response in &first.responses {
            assert!(response.is_ok(), "{}", response.log);
        }
        let ids: Vec<u64> = first.responses[4..]
            .iter()
            .map(|r| r.proposal_id.unwrap())
            .collect();
        assert!(first.end.rejected.is_empty());
        let rate = app.query(|s| s.global_state()).unwrap().growth_rate;

        let decide = app.execute_block(block(2), &[]).unwrap();
        assert!(decide.end.passed.is_empty());
        assert_eq!(decide.end.rejected, ids);
        assert_eq!(decide.end.penalized, vec!["val1", "val2"]);
        assert_eq!(app.query(|s| s.decided_proposals()).unwrap(), ids);
        assert!(app.query(|s| s.ongoing_proposals()).unwrap().is_empty());
        assert_eq!(app.query(|s| s.global_state()).unwrap().growth_rate, rate);

        app.execute_block(block(3), &[proposal(2, 1, 9)]).unwrap();
        let again = app.execute_block(block(4), &[]).unwrap();
        assert_eq!(again.end.rejected.len(), 1);
        assert!(again.end.penalized.is_empty());
        assert_eq!(
            app.query(|s| s.penalty_list()).unwrap(),
            vec!["val1", "val2"]
        );
    }

    #[test]
    fn test_revoke_reports_validator_removal() {
        let mut f = setup();
        let revoke = signed(
            Msg::ValidatorRevoke {
                signer: Signer::new("val", 0),
            },
            "val",
            &f.val,
        );
        let result = f.app.execute_block(block(1), &[revoke]).unwrap();
        assert!(result.responses[0].is_ok(), "{}", result.responses[0].log);
        assert_eq!(
            result.end.validator_updates,
            vec![ValidatorUpdate {
                name: "val".to_string(),
                public_key: "val-consensus".to_string(),
                power: Coin::ZERO,
            }]
        );
    }

    #[test]
    fn test_inflation_runs_at_end_block() {
        let mut f = setup();
        let before = f.app.query(|s| s.global_state()).unwrap().total_supply;
        let val_before = balance(&f.app, "val");

        let ctx = BlockContext::new(1, T0 + 2 * 3600, CHAIN);
        let result = f.app.execute_block(ctx, &[]).unwrap();
        let paid = Coin::sum(result.end.distributions.iter().map(|d| d.amount)).unwrap();
        let to_val = Coin::sum(
            result
                .end
                .distributions
                .iter()
                .filter(|d| d.recipient.as_deref() == Some("val"))
                .map(|d| d.amount),
        )
        .unwrap();

        assert!(paid.is_positive());
        assert!(to_val.is_positive());
        assert_eq!(
            f.app.query(|s| s.global_state()).unwrap().total_supply,
            before.checked_add(paid).unwrap()
        );
        assert_eq!(balance(&f.app, "val"), val_before.checked_add(to_val).unwrap());
    }

    #[test]
    fn test_lifecycle_order_enforced() {
        let mut f = setup();
        assert!(f.app.end_block().unwrap_err().is_fatal());
        assert!(f.app.begin_block(block(2)).is_err());
        f.app.begin_block(block(1)).unwrap();
        assert!(f.app.begin_block(block(1)).is_err());
        assert!(f.app.init_chain(&genesis(&f.alice, &f.bob, &f.val), T0).is_err());
    }

    #[test]
    fn test_failed_overlay_discards_writes() {
        let base = MemStore::new();
        let mut changes = ChangeSet::new();
        in_overlay(&base, &mut changes, |state| state.set_record("kept", &1u64)).unwrap();
        let kept = changes.clone();

        let err = in_overlay(&base, &mut changes, |state| {
            state.set_record("dropped", &2u64)?;
            Err::<(), _>(lifecycle_error("failed midway"))
        })
        .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(changes, kept);
    }

    #[test]
    fn test_empty_block_keeps_root() {
        let mut f = setup();
        let genesis_root = f.app.last_commit().unwrap().root;
        let info = f.app.execute_block(block(1), &[]).unwrap().commit;
        assert_eq!(info.height, 1);
        assert_eq!(info.root, genesis_root);

        let tx = transfer("alice", &f.alice, 0, "bob", lno(1), Coin::ZERO);
        let info = f.app.execute_block(block(2), &[tx]).unwrap().commit;
        assert_ne!(info.root, genesis_root);
    }

    #[test]
    fn test_commit_persists_and_resumes() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let alice = KeyPair::generate();
        let bob = KeyPair::generate();
        let val = KeyPair::generate();

        let committed = {
            let mut app = LedgerApp::open(Storage::new(config.clone()).unwrap()).unwrap();
            app.init_chain(&genesis(&alice, &bob, &val), T0).unwrap();
            let tx = transfer("alice", &alice, 0, "bob", lno(3), Coin::ZERO);
            app.execute_block(block(1), &[tx]).unwrap().commit
        };

        let app = LedgerApp::open(Storage::new(config).unwrap()).unwrap();
        assert_eq!(app.last_commit(), Some(committed));
        assert_eq!(app.chain_id(), Some(CHAIN));
        assert_eq!(balance(&app, "alice"), lno(97));
        assert_eq!(balance(&app, "bob"), lno(10));
    }
}
