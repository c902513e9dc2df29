//! Mini-Ledger CLI Application
//!
//! A command-line driver that initializes a ledger from a genesis file,
//! simulates blocks against it and inspects the committed state.

use clap::{Parser, Subcommand};
use mini_ledger::cli::{self, AppState, TransferSpec};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ledger")]
#[command(author = "Darshan")]
#[command(version = "0.1.0")]
#[command(about = "Ledger and economic state machine for a content blockchain", long_about = None)]
struct Cli {
    /// Data directory for ledger snapshots
    #[arg(short, long, default_value = ".ledger_data")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default genesis file with fresh keys
    Genesis {
        /// Output file path
        #[arg(short, long, default_value = "genesis.json")]
        output: PathBuf,

        /// Chain id
        #[arg(long)]
        chain_id: Option<String>,
    },

    /// Run blocks against the ledger
    Simulate {
        /// Genesis file, required when the data directory is empty
        #[arg(short, long)]
        genesis: Option<PathBuf>,

        /// Number of blocks
        #[arg(short, long, default_value = "1")]
        blocks: u64,

        /// Seconds between blocks
        #[arg(short, long, default_value = "60")]
        interval: i64,

        /// Sender of a transfer included in every block
        #[arg(long, requires = "key", requires = "to")]
        from: Option<String>,

        /// Sender's private key (hex)
        #[arg(long)]
        key: Option<String>,

        /// Transfer recipient, `<chain>/<address>` for another chain
        #[arg(long)]
        to: Option<String>,

        /// Transfer amount in LNO
        #[arg(long, default_value = "1")]
        amount: String,

        /// Transfer fee in LNO
        #[arg(long, default_value = "0")]
        fee: String,
    },

    /// Show an account
    Account {
        /// Account name or address
        name: String,
    },

    /// Show global state and the last commit
    State,

    /// Show outgoing cross-chain packets
    Packets {
        /// Destination chain id
        chain: String,

        /// Show only this packet
        #[arg(short, long)]
        sequence: Option<u64>,
    },

    /// List snapshot backups or restore one
    Backups {
        /// Backup index to make the current snapshot
        #[arg(long)]
        restore: Option<usize>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Genesis { output, chain_id } => {
            cli::cmd_genesis(&output, chain_id.as_deref())?;
        }

        Commands::Simulate {
            genesis,
            blocks,
            interval,
            from,
            key,
            to,
            amount,
            fee,
        } => {
            let mut state = AppState::new(cli.data_dir)?;
            let transfer = match (from, key, to) {
                (Some(from), Some(private_key), Some(to)) => Some(TransferSpec {
                    from,
                    private_key,
                    to,
                    amount,
                    fee,
                }),
                _ => None,
            };
            cli::cmd_simulate(
                &mut state,
                genesis.as_deref(),
                blocks,
                interval,
                transfer.as_ref(),
            )?;
        }

        Commands::Account { name } => {
            let state = AppState::new(cli.data_dir)?;
            cli::cmd_account(&state, &name)?;
        }

        Commands::State => {
            let state = AppState::new(cli.data_dir)?;
            cli::cmd_state(&state)?;
        }

        Commands::Packets { chain, sequence } => {
            let state = AppState::new(cli.data_dir)?;
            cli::cmd_packets(&state, &chain, sequence)?;
        }

        Commands::Backups { restore } => {
            cli::cmd_backups(&cli.data_dir, restore)?;
        }
    }

    Ok(())
}
