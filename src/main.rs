use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use tracing_subscriber::EnvFilter;

use bookie::config::BookieConfig;
use bookie::store::SnapshotStore;
use bookie::{AccountId, Amount, BetId, Bookie, Clock, ManualClock, Proposal, SystemClock};

#[derive(Parser)]
#[command(name = "bookie", version, about = "Escrow betting ledger")]
struct Cli {
    /// JSON config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Ledger snapshot file (overrides the config)
    #[arg(long, global = true)]
    state: Option<PathBuf>,
    /// Current time in unix seconds instead of the system clock
    #[arg(long, global = true)]
    now: Option<u64>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Credit an account
    Mint { account: String, amount: Amount },
    Balance { account: String },
    /// Propose a bet and escrow the proposer's stake
    Propose {
        #[arg(long = "as")]
        caller: String,
        counterparty: String,
        judge: String,
        proposer_stake: Amount,
        counterparty_stake: Amount,
        description: String,
        /// Seconds until the stakes may be reclaimed
        #[arg(long)]
        timeout: Option<u64>,
    },
    Accept {
        #[arg(long = "as")]
        caller: String,
        id: BetId,
    },
    Decline {
        #[arg(long = "as")]
        caller: String,
        id: BetId,
    },
    /// Resolve an accepted bet: 1 = proposer wins, 2 = counterparty wins, anything else refunds
    Adjudicate {
        #[arg(long = "as")]
        caller: String,
        id: BetId,
        decision: u64,
    },
    /// Refund escrowed stakes once the deadline has passed
    Reclaim {
        #[arg(long = "as")]
        caller: String,
        id: BetId,
    },
    Show { id: BetId },
    LargestId,
    Events,
    Root,
}

impl Command {
    fn mutates(&self) -> bool {
        matches!(
            self,
            Command::Mint { .. }
                | Command::Propose { .. }
                | Command::Accept { .. }
                | Command::Decline { .. }
                | Command::Adjudicate { .. }
                | Command::Reclaim { .. }
        )
    }
}

fn init_tracing(config: &BookieConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = BookieConfig::load(cli.config.as_deref())?;
    init_tracing(&config);

    let store = SnapshotStore::new(cli.state.unwrap_or_else(|| config.state_path.clone()));
    let state = store
        .load_or_default()
        .with_context(|| format!("loading {}", store.path().display()))?;
    let clock: Arc<dyn Clock> = match cli.now {
        Some(now) => Arc::new(ManualClock::new(now)),
        None => Arc::new(SystemClock),
    };
    let bookie = Bookie::from_state(state, clock);
    let mutates = cli.command.mutates();

    let output = match cli.command {
        Command::Mint { account, amount } => {
            let account = AccountId::from(account);
            bookie.mint(&account, amount)?;
            json!({ "account": account, "balance": bookie.balance(&account) })
        }
        Command::Balance { account } => {
            let account = AccountId::from(account);
            json!({ "account": account, "balance": bookie.balance(&account) })
        }
        Command::Propose {
            caller,
            counterparty,
            judge,
            proposer_stake,
            counterparty_stake,
            description,
            timeout,
        } => {
            let id = bookie.propose(
                &caller.into(),
                Proposal {
                    counterparty: counterparty.into(),
                    judge: judge.into(),
                    proposer_stake,
                    counterparty_stake,
                    description,
                    timeout: timeout.unwrap_or(config.default_timeout_secs),
                },
            )?;
            json!({ "id": id, "bet": bookie.bet(id)? })
        }
        Command::Accept { caller, id } => {
            bookie.accept(id, &caller.into())?;
            json!({ "id": id, "bet": bookie.bet(id)? })
        }
        Command::Decline { caller, id } => {
            bookie.decline(id, &caller.into())?;
            json!({ "id": id, "bet": bookie.bet(id)? })
        }
        Command::Adjudicate {
            caller,
            id,
            decision,
        } => {
            bookie.adjudicate(id, &caller.into(), decision)?;
            json!({ "id": id, "bet": bookie.bet(id)? })
        }
        Command::Reclaim { caller, id } => {
            bookie.reclaim_after_timeout(id, &caller.into())?;
            json!({ "id": id, "bet": bookie.bet(id)? })
        }
        Command::Show { id } => {
            let bet = bookie.bet(id)?;
            json!({ "id": id, "state_code": bet.state.code(), "bet": bet })
        }
        Command::LargestId => json!({ "largest_id": bookie.largest_id() }),
        Command::Events => bookie.with_state(|state| json!(state.events())),
        Command::Root => {
            let snapshot = bookie.snapshot();
            json!({
                "height": snapshot.meta.height,
                // Totals can exceed what a JSON value holds as a number.
                "escrowed": snapshot.escrowed.to_string(),
                "minted": snapshot.minted.to_string(),
                "state_root": hex::encode(snapshot.state_root),
            })
        }
    };

    if mutates {
        bookie.with_state(|state| store.save(state))?;
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err:#}");
        std::process::exit(2);
    }
}
