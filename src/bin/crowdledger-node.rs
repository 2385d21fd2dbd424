use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crowdledger::logging;
use crowdledger::node::{Clock, IntervalMiner, Node, SystemClock};
use crowdledger::server::NodeServer;
use crowdledger_core::ledger::Genesis;
use crowdledger_core::units::{format_units, parse_units};
use crowdledger_core::{Address, Amount, Keypair};
use tracing::info;

const DEFAULT_CHAIN_ID: u64 = 31337;
const DEV_ACCOUNT_BALANCE: &str = "10000";

#[derive(Parser, Debug)]
#[command(name = "crowdledger-node", version)]
#[command(about = "Single-process development chain with an explorer endpoint")]
struct Opts {
    #[arg(long, default_value = "127.0.0.1:8545")]
    listen: String,

    /// Chain id [default: 31337, or the genesis file's]
    #[arg(long)]
    chain_id: Option<u64>,

    /// Seconds between empty blocks; 0 mines only on transactions
    #[arg(long, default_value_t = 1)]
    block_time: u64,

    /// Fund an account at genesis, e.g. 0xabc..=100.5 (repeatable)
    #[arg(long, value_name = "ADDR=AMOUNT", value_parser = parse_alloc)]
    alloc: Vec<(Address, Amount)>,

    /// Genesis JSON file; --chain-id and --alloc are applied on top
    #[arg(long, value_name = "FILE")]
    genesis: Option<PathBuf>,

    /// Generate N funded accounts and print their keys
    #[arg(long, default_value_t = 0, value_name = "N")]
    dev_accounts: usize,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_alloc(input: &str) -> Result<(Address, Amount), String> {
    let (address, amount) = input
        .split_once('=')
        .ok_or_else(|| format!("expected ADDR=AMOUNT, got {input:?}"))?;
    let address = address.trim().parse::<Address>().map_err(|e| e.to_string())?;
    let amount = parse_units(amount.trim()).map_err(|e| e.to_string())?;
    Ok((address, amount))
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    logging::init(opts.verbose);

    let clock = Arc::new(SystemClock);
    let mut genesis = match &opts.genesis {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str::<Genesis>(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => Genesis::new(DEFAULT_CHAIN_ID),
    };
    if let Some(chain_id) = opts.chain_id {
        genesis.chain_id = chain_id;
    }
    if genesis.timestamp == 0 {
        genesis.timestamp = clock.now();
    }
    for (address, amount) in &opts.alloc {
        genesis = genesis.fund(*address, *amount);
    }

    let dev_balance = parse_units(DEV_ACCOUNT_BALANCE)?;
    let dev_keys: Vec<Keypair> = (0..opts.dev_accounts).map(|_| Keypair::generate()).collect();
    for key in &dev_keys {
        genesis = genesis.fund(key.address(), dev_balance);
    }

    let node = Node::new(&genesis, clock).into_shared();
    let server = NodeServer::bind(&opts.listen, node.clone())?;

    println!("crowdledger-node chain {} at {}", genesis.chain_id, server.url());
    for (idx, key) in dev_keys.iter().enumerate() {
        println!(
            "account #{idx}: {} ({})\n  private key {}",
            key.address(),
            format_units(dev_balance),
            key.secret_hex()
        );
    }

    let _miner = (opts.block_time > 0)
        .then(|| IntervalMiner::spawn(node, Duration::from_secs(opts.block_time)));
    info!(accounts = genesis.alloc.len(), "genesis applied");
    server.serve();
    Ok(())
}
