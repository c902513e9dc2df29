//! CLI commands for the ledger
//!
//! Implements all command handlers for the CLI interface.

use crate::core::{
    BlockContext, Coin, GenesisState, LedgerApp, TransferBuilder, DEFAULT_CHAIN_ID,
};
use crate::crypto::KeyPair;
use crate::storage::{Storage, StorageConfig};
use std::path::{Path, PathBuf};

fn short(hash: &str) -> &str {
    &hash[..16.min(hash.len())]
}

/// Result type for CLI operations
pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Application state
pub struct AppState {
    pub app: LedgerApp,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Open the ledger stored under `data_dir`
    pub fn new(data_dir: PathBuf) -> CliResult<Self> {
        let storage_config = StorageConfig {
            data_dir: data_dir.clone(),
            ..Default::default()
        };
        let storage = Storage::new(storage_config)?;
        let app = LedgerApp::open(storage)?;
        Ok(Self { app, data_dir })
    }

    fn require_chain(&self) -> CliResult<()> {
        if self.app.height().is_none() {
            return Err(format!(
                "no ledger at {:?}; run `simulate --genesis <file>` first",
                self.data_dir
            )
            .into());
        }
        Ok(())
    }
}

/// One transfer repeated in every simulated block
pub struct TransferSpec {
    pub from: String,
    pub private_key: String,
    pub to: String,
    /// LNO
    pub amount: String,
    /// LNO
    pub fee: String,
}

/// Write a single-account genesis file with fresh keys
pub fn cmd_genesis(output: &Path, chain_id: Option<&str>) -> CliResult<()> {
    if output.exists() {
        println!("⚠️  {:?} already exists; not overwriting", output);
        return Ok(());
    }

    let account_key = KeyPair::generate();
    let validator_key = KeyPair::generate();
    let mut genesis =
        GenesisState::single(&account_key.public_key_hex(), &validator_key.public_key_hex());
    genesis.chain_id = chain_id.unwrap_or(DEFAULT_CHAIN_ID).to_string();
    genesis.save(output)?;

    println!("✅ Genesis written to {:?}", output);
    println!("   🔗 Chain id: {}", genesis.chain_id);
    println!("   👤 Account: lino");
    println!("   🔑 Private key: {}", account_key.private_key_hex());
    println!("   🛡️  Validator key: {}", validator_key.public_key_hex());
    Ok(())
}

/// Run `blocks` blocks `interval_secs` apart, initializing the chain from
/// `genesis` if the data directory is empty
pub fn cmd_simulate(
    state: &mut AppState,
    genesis: Option<&Path>,
    blocks: u64,
    interval_secs: i64,
    transfer: Option<&TransferSpec>,
) -> CliResult<()> {
    if state.app.height().is_none() {
        let path = genesis.ok_or("ledger not initialized; pass --genesis")?;
        let genesis = GenesisState::from_file(path)?;
        let now = chrono::Utc::now().timestamp();
        let info = state.app.init_chain(&genesis, now)?;
        println!("🆕 Chain {} initialized", genesis.chain_id);
        println!("   🌳 Genesis root: {}", info.root);
    }

    let chain_id = state.app.chain_id().unwrap_or(DEFAULT_CHAIN_ID).to_string();
    let key = match transfer {
        Some(spec) => Some(KeyPair::from_private_key_hex(&spec.private_key)?),
        None => None,
    };

    println!("⏱️  Simulating {} block(s), {}s apart", blocks, interval_secs);
    for _ in 0..blocks {
        let height = state.app.height().unwrap_or(0) + 1;
        let time = state.app.last_block_time().unwrap_or(0) + interval_secs;

        let mut txs = Vec::new();
        if let (Some(spec), Some(key)) = (transfer, &key) {
            let sequence = state.app.query(|s| s.account(&spec.from))?.sequence;
            let amount = Coin::parse_lno(&spec.amount)?;
            let fee = match spec.fee.trim() {
                "0" => Coin::ZERO,
                fee => Coin::parse_lno(fee)?,
            };
            let tx = TransferBuilder::new(&chain_id)
                .input(&spec.from, sequence, amount.checked_add(fee)?)
                .output(&spec.to, amount)
                .fee(fee)
                .build_and_sign(&[key])?;
            log::debug!("transfer {} at sequence {}", tx.hash()?, sequence);
            txs.push(tx.encode()?);
        }

        let result = state
            .app
            .execute_block(BlockContext::new(height, time, &chain_id), &txs)?;

        let accepted = result.responses.iter().filter(|r| r.is_ok()).count();
        println!("\n   Block {} committed", result.commit.height);
        println!("   ├─ Root: {}", short(&result.commit.root));
        println!("   ├─ Transactions: {}/{} accepted", accepted, txs.len());
        for response in result.responses.iter().filter(|r| !r.is_ok()) {
            println!("   │  ✗ {}", response.log);
        }
        println!("   ├─ Inflation payouts: {}", result.end.distributions.len());
        if !result.end.passed.is_empty() || !result.end.rejected.is_empty() {
            println!(
                "   ├─ Proposals passed {:?} rejected {:?}",
                result.end.passed, result.end.rejected
            );
        }
        println!(
            "   └─ Validator updates: {}",
            result.end.validator_updates.len()
        );
    }
    Ok(())
}

/// Show an account
pub fn cmd_account(state: &AppState, name: &str) -> CliResult<()> {
    state.require_chain()?;
    let account = state.app.query(|s| s.get_account(name))?;
    let Some(account) = account else {
        println!("❌ Unknown account: {}", name);
        return Ok(());
    };

    let now = state.app.last_block_time().unwrap_or(0);
    println!("👤 Account {}", account.address);
    println!("   ├─ Balance: {} LNO", account.balance.to_lno_string());
    println!("   ├─ Coin-day: {} LNO", account.coin_day_at(now)?.to_lno_string());
    println!("   ├─ Sequence: {}", account.sequence);
    println!("   ├─ Post sequence: {}", account.last_post_sequence);
    println!("   ├─ Validator: {}", account.is_validator());
    println!("   ├─ Voter: {}", account.is_voter());
    println!(
        "   └─ Public key: {}",
        account.public_key.as_deref().unwrap_or("(unbound)")
    );
    Ok(())
}

/// Show the global economic state and last commit
pub fn cmd_state(state: &AppState) -> CliResult<()> {
    state.require_chain()?;
    let (global, validators, proposals) = state.app.query(|s| {
        Ok((
            s.global_state()?,
            s.oncall_validators()?,
            s.ongoing_proposals()?,
        ))
    })?;

    if let Some(commit) = state.app.last_commit() {
        println!("📊 Ledger at height {}", commit.height);
        println!("   🌳 Root: {}", commit.root);
    }
    println!("   💰 Total supply: {} LNO", global.total_supply.to_lno_string());
    println!("   📈 Growth rate: {}", global.growth_rate);
    println!(
        "   🗓️  Year {} ({} minutes elapsed)",
        global.year, global.elapsed_minutes
    );
    println!("   ├─ Validator pool: {} LNO", global.pools.validator.to_lno_string());
    println!("   ├─ Content pool: {} LNO", global.pools.content.to_lno_string());
    println!("   ├─ Developer pool: {} LNO", global.pools.developer.to_lno_string());
    println!("   ├─ Infra pool: {} LNO", global.pools.infra.to_lno_string());
    println!(
        "   ├─ Content rewards: {} LNO",
        global.content_reward_pool.to_lno_string()
    );
    println!("   ├─ Fees: {} LNO", global.collected_fees.to_lno_string());
    println!("   ├─ On-call validators: {:?}", validators);
    println!("   └─ Ongoing proposals: {:?}", proposals);
    Ok(())
}

/// Show outgoing cross-chain packets to `dst_chain`, or a single one
pub fn cmd_packets(state: &AppState, dst_chain: &str, sequence: Option<u64>) -> CliResult<()> {
    state.require_chain()?;
    let src_chain = state.app.chain_id().unwrap_or(DEFAULT_CHAIN_ID).to_string();
    let packets = match sequence {
        Some(sequence) => state
            .app
            .query(|s| s.get_packet(&src_chain, dst_chain, sequence))?
            .into_iter()
            .collect::<Vec<_>>(),
        None => state.app.query(|s| s.packets(&src_chain, dst_chain))?,
    };

    if packets.is_empty() {
        println!("📭 No packets from {} to {}", src_chain, dst_chain);
        return Ok(());
    }
    println!("📦 Packets {} → {}", src_chain, dst_chain);
    for packet in &packets {
        println!(
            "   ├─ #{} {}: {} LNO to {}",
            packet.sequence,
            packet.packet_type,
            packet.payload.coins.to_lno_string(),
            packet.payload.address
        );
    }
    println!("   └─ Total: {}", packets.len());
    Ok(())
}

/// List snapshot backups, or make backup `restore` the current snapshot
pub fn cmd_backups(data_dir: &Path, restore: Option<usize>) -> CliResult<()> {
    let storage = Storage::new(StorageConfig {
        data_dir: data_dir.to_path_buf(),
        ..Default::default()
    })?;

    if let Some(index) = restore {
        let snapshot = storage.restore_backup(index)?;
        storage.save(&snapshot)?;
        // reopening checks the restored root
        let app = LedgerApp::open(storage)?;
        println!("♻️  Restored backup {}", index);
        println!("   ├─ Height: {}", app.height().unwrap_or(snapshot.height));
        println!("   └─ Root: {}", short(&snapshot.root));
        return Ok(());
    }

    let backups = storage.list_backups();
    if backups.is_empty() {
        println!("📭 No backups in {:?}", data_dir);
        return Ok(());
    }
    println!("💾 Backups in {:?}", data_dir);
    for index in backups {
        let snapshot = storage.restore_backup(index)?;
        println!(
            "   ├─ #{}: height {} root {}",
            index,
            snapshot.height,
            short(&snapshot.root)
        );
    }
    Ok(())
}
