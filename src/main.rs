use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use crowdledger::config::{Config, NetworkConfig};
use crowdledger::deploy::{DeployOptions, Deployer, VerificationStatus};
use crowdledger::gateway::{CampaignGateway, NewCampaign};
use crowdledger::verify::ExplorerVerifier;
use crowdledger::{logging, HttpTransport, RpcClient};
use crowdledger_core::contracts::Campaign;
use crowdledger_core::units::{format_units, parse_units};
use crowdledger_core::{Address, Keypair};
use tracing::debug;

const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Parser, Debug)]
#[command(name = "crowdledger", version)]
#[command(about = "Deploy and use campaign crowdfunding contracts on a crowdledger node")]
struct Cli {
    /// Configuration file (default: ./crowdledger.toml if present)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Network name from the configuration
    #[arg(short, long, global = true)]
    network: Option<String>,

    /// Override the network's RPC url
    #[arg(long, global = true, value_name = "URL")]
    rpc_url: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a signing key and print its address
    Keygen {
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,
    },
    /// Deploy CampaignManager and GasLot, write artifacts, verify sources
    Deploy {
        #[arg(long, value_name = "DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
        artifacts_dir: PathBuf,
        /// Override the network's confirmation depth
        #[arg(long)]
        confirmations: Option<u64>,
        /// Block number polling interval in milliseconds
        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
    /// Browse and create campaigns
    #[command(subcommand)]
    Campaigns(CampaignCommand),
    /// Donate to a campaign
    Donate {
        id: u64,
        /// Amount in whole units, e.g. 0.25
        amount: String,
        #[command(flatten)]
        target: ManagerArgs,
    },
    /// List donations made to a campaign
    Donations {
        id: u64,
        #[command(flatten)]
        target: ManagerArgs,
    },
    /// Show an account balance (default: the signer)
    Balance { address: Option<Address> },
}

#[derive(Subcommand, Debug)]
enum CampaignCommand {
    /// List campaigns by creation index
    List {
        #[arg(long, default_value_t = 0)]
        start: u64,
        #[arg(long, default_value_t = 20)]
        end: u64,
        #[command(flatten)]
        target: ManagerArgs,
    },
    /// Show one campaign
    Show {
        id: u64,
        #[command(flatten)]
        target: ManagerArgs,
    },
    /// Start a new campaign owned by the signer
    Create {
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        /// Target in whole units, e.g. 10.5
        #[arg(long)]
        target: String,
        /// Deadline as a unix timestamp
        #[arg(long, conflicts_with = "days", required_unless_present = "days")]
        deadline: Option<u64>,
        /// Deadline as days from the current block time
        #[arg(long)]
        days: Option<u64>,
        #[arg(long)]
        image: String,
        #[command(flatten)]
        manager: ManagerArgs,
    },
}

#[derive(Args, Debug)]
struct ManagerArgs {
    /// Directory holding contract-address.json
    #[arg(long, value_name = "DIR", default_value = DEFAULT_ARTIFACTS_DIR)]
    artifacts_dir: PathBuf,
    /// CampaignManager address, instead of reading the artifacts
    #[arg(long)]
    manager: Option<Address>,
}

struct Session {
    name: String,
    network: NetworkConfig,
    client: RpcClient<HttpTransport>,
}

impl Session {
    fn open(cli: &Cli) -> Result<Self> {
        let config = Config::discover(cli.config.as_deref())?;
        let (name, network) = config.network(cli.network.as_deref())?;
        let mut network = network.clone();
        if let Some(url) = &cli.rpc_url {
            network.url = url.clone();
        }
        debug!(network = %name, url = %network.url, "using network");
        let transport = HttpTransport::new(network.url.clone())?;
        Ok(Self {
            name,
            network,
            client: RpcClient::new(transport),
        })
    }

    fn signer(&self) -> Result<Keypair> {
        Ok(self.network.signer()?)
    }

    fn gateway(self, target: &ManagerArgs, with_signer: bool) -> Result<CampaignGateway<HttpTransport>> {
        let gateway = match target.manager {
            Some(address) => CampaignGateway::new(self.client, address),
            None => CampaignGateway::from_artifacts(self.client, &target.artifacts_dir)
                .with_context(|| {
                    format!(
                        "no deployment found in {}; run `crowdledger deploy` or pass --manager",
                        target.artifacts_dir.display()
                    )
                })?,
        };
        if with_signer {
            let signer = self.network.signer()?;
            Ok(gateway.with_signer(signer))
        } else {
            Ok(gateway)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Keygen { out_dir } => keygen_cmd(out_dir),
        Command::Deploy {
            artifacts_dir,
            confirmations,
            poll_ms,
        } => deploy_cmd(cli, artifacts_dir, *confirmations, *poll_ms),
        Command::Campaigns(CampaignCommand::List { start, end, target }) => {
            let gateway = Session::open(cli)?.gateway(target, false)?;
            let now = gateway.client().head_timestamp()?;
            let campaigns = gateway.list_campaigns(*start, *end)?;
            if campaigns.is_empty() {
                println!("No campaigns in [{start}, {end})");
            }
            for campaign in &campaigns {
                print_campaign(campaign, now);
            }
            Ok(())
        }
        Command::Campaigns(CampaignCommand::Show { id, target }) => {
            let gateway = Session::open(cli)?.gateway(target, false)?;
            let now = gateway.client().head_timestamp()?;
            print_campaign(&gateway.campaign(*id)?, now);
            Ok(())
        }
        Command::Campaigns(CampaignCommand::Create {
            title,
            description,
            target,
            deadline,
            days,
            image,
            manager,
        }) => {
            let gateway = Session::open(cli)?.gateway(manager, true)?;
            let deadline = match (deadline, days) {
                (Some(ts), _) => *ts,
                (None, Some(days)) => deadline_after_days(gateway.client().head_timestamp()?, *days)?,
                (None, None) => bail!("either --deadline or --days is required"),
            };
            let fields = NewCampaign {
                title: title.clone(),
                description: description.clone(),
                target: parse_units(target)?,
                deadline,
                image: image.clone(),
            };
            let created = gateway.create_campaign(&fields)?;
            println!(
                "Campaign #{} created in block {}",
                created.value, created.receipt.block_number
            );
            Ok(())
        }
        Command::Donate { id, amount, target } => {
            let gateway = Session::open(cli)?.gateway(target, true)?;
            let amount = parse_units(amount)?;
            let donated = gateway.donate(*id, amount)?;
            println!(
                "Donated {} to campaign #{id}; collected now {}",
                format_units(amount),
                format_units(donated.value)
            );
            Ok(())
        }
        Command::Donations { id, target } => {
            let gateway = Session::open(cli)?.gateway(target, false)?;
            let donations = gateway.donations(*id)?;
            if donations.is_empty() {
                println!("No donations to campaign #{id} yet");
            }
            for (idx, donation) in donations.iter().enumerate() {
                println!("{:>4}. {}  {}", idx + 1, donation.donor, format_units(donation.amount));
            }
            Ok(())
        }
        Command::Balance { address } => {
            let session = Session::open(cli)?;
            let address = match address {
                Some(address) => *address,
                None => session.signer()?.address(),
            };
            let balance = session.client.balance(&address)?;
            println!("{address}  {}", format_units(balance));
            Ok(())
        }
    }
}

fn keygen_cmd(out_dir: &Path) -> Result<()> {
    fs::create_dir_all(out_dir).with_context(|| format!("creating {}", out_dir.display()))?;
    let key = Keypair::generate();
    fs::write(out_dir.join("sk.hex"), key.secret_hex()).context("writing sk.hex")?;
    fs::write(out_dir.join("pk.hex"), key.public_hex()).context("writing pk.hex")?;
    fs::write(out_dir.join("address.txt"), key.address().to_string()).context("writing address.txt")?;
    println!("address {}", key.address());
    println!("keypair written to {}", out_dir.display());
    Ok(())
}

fn deploy_cmd(cli: &Cli, artifacts_dir: &Path, confirmations: Option<u64>, poll_ms: u64) -> Result<()> {
    let session = Session::open(cli)?;
    let signer = session.signer()?;

    let mut options = DeployOptions::new(session.name.clone(), artifacts_dir);
    options.expected_chain_id = session.network.chain_id;
    options.confirmations = confirmations.unwrap_or(session.network.confirmations);
    options.poll_interval = Duration::from_millis(poll_ms);

    let verifier = session
        .network
        .explorer
        .as_ref()
        .map(ExplorerVerifier::new)
        .transpose()?;

    let mut deployer = Deployer::new(&session.client, &signer, options);
    if let Some(verifier) = &verifier {
        deployer = deployer.with_verifier(verifier);
    }
    let report = deployer.run().context("deployment failed")?;

    println!("network          {}", report.network);
    println!("CampaignManager  {}", report.manager.address);
    println!("GasLot           {}", report.gas_lot.address);
    for path in &report.artifact_paths {
        println!("wrote            {}", path.display());
    }
    for (contract, status) in &report.verification {
        let status = match status {
            VerificationStatus::Verified => "verified".to_string(),
            VerificationStatus::AlreadyVerified => "already verified".to_string(),
            VerificationStatus::Skipped => "skipped (no explorer)".to_string(),
            VerificationStatus::Failed(reason) => format!("failed: {reason}"),
        };
        println!("verify {contract:<10} {status}");
    }
    Ok(())
}

fn deadline_after_days(now: u64, days: u64) -> Result<u64> {
    days.checked_mul(SECONDS_PER_DAY)
        .and_then(|secs| now.checked_add(secs))
        .with_context(|| format!("--days {days} puts the deadline out of range"))
}

fn print_campaign(campaign: &Campaign, now: u64) {
    let progress = if campaign.target == 0 {
        0
    } else {
        campaign.amount_collected.saturating_mul(100) / campaign.target
    };
    let remaining = if campaign.is_open(now) {
        let days = (campaign.deadline - now).div_ceil(SECONDS_PER_DAY);
        format!("{days} day(s) left")
    } else {
        "ended".to_string()
    };
    println!("#{}  {}", campaign.id, campaign.title);
    println!("    {}", campaign.description);
    println!("    owner     {}", campaign.owner);
    println!(
        "    raised    {} of {} ({progress}%)",
        format_units(campaign.amount_collected),
        format_units(campaign.target)
    );
    println!("    deadline  {} ({remaining})", campaign.deadline);
    println!("    image     {}", campaign.image);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn days_extend_the_current_block_time() {
        assert_eq!(deadline_after_days(1_000, 2).unwrap(), 1_000 + 2 * SECONDS_PER_DAY);
    }

    #[test]
    fn oversized_days_are_an_error() {
        assert!(deadline_after_days(1_000, u64::MAX).is_err());
        assert!(deadline_after_days(u64::MAX - 10, 1).is_err());
    }
}
