//! One-shot deployment: `CampaignManager`, then `GasLot` bound to it, wait
//! for confirmations, write artifacts, verify both sources.
//!
//! Any failure up to and including the artifact write is fatal. Verification
//! failures are logged and recorded in the report only.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use crowdledger_core::contracts::{campaign_manager, gas_lot, ContractKind};
use crowdledger_core::tx::{hash_hex, ReceiptStatus, TxAction};
use crowdledger_core::{Address, Keypair};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::artifacts::{AddressBook, ArtifactError, ArtifactSet, ContractArtifact};
use crate::client::{RpcClient, RpcClientError};
use crate::transport::Transport;
use crate::verify::{VerificationRequest, Verifier, VerifyOutcome};

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error(transparent)]
    Rpc(#[from] RpcClientError),
    #[error("node is on chain {actual}, network expects {expected}")]
    ChainMismatch { expected: u64, actual: u64 },
    #[error("{contract} deployment reverted: {reason}")]
    Reverted { contract: String, reason: String },
    #[error("{confirmations} confirmations after block {block} is out of range")]
    ConfirmationsOutOfRange { block: u64, confirmations: u64 },
    #[error("{0} deployment returned no contract address")]
    MissingAddress(String),
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
}

#[derive(Clone, Debug)]
pub struct DeployOptions {
    pub network: String,
    pub expected_chain_id: Option<u64>,
    pub confirmations: u64,
    pub poll_interval: Duration,
    pub artifacts_dir: PathBuf,
}

impl DeployOptions {
    pub fn new(network: impl Into<String>, artifacts_dir: impl Into<PathBuf>) -> Self {
        Self {
            network: network.into(),
            expected_chain_id: None,
            confirmations: crate::config::DEFAULT_CONFIRMATIONS,
            poll_interval: Duration::from_millis(500),
            artifacts_dir: artifacts_dir.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub block_number: u64,
    pub constructor_args: Value,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationStatus {
    Verified,
    AlreadyVerified,
    Skipped,
    Failed(String),
}

#[derive(Clone, Debug)]
pub struct DeploymentReport {
    pub network: String,
    pub manager: DeployedContract,
    pub gas_lot: DeployedContract,
    pub artifact_paths: Vec<PathBuf>,
    pub verification: Vec<(String, VerificationStatus)>,
}

pub struct Deployer<'a, T> {
    client: &'a RpcClient<T>,
    signer: &'a Keypair,
    verifier: Option<&'a dyn Verifier>,
    options: DeployOptions,
}

impl<'a, T: Transport> Deployer<'a, T> {
    pub fn new(client: &'a RpcClient<T>, signer: &'a Keypair, options: DeployOptions) -> Self {
        Self {
            client,
            signer,
            verifier: None,
            options,
        }
    }

    pub fn with_verifier(mut self, verifier: &'a dyn Verifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn run(&self) -> Result<DeploymentReport, DeployError> {
        let chain_id = self.client.chain_id()?;
        if let Some(expected) = self.options.expected_chain_id {
            if expected != chain_id {
                return Err(DeployError::ChainMismatch {
                    expected,
                    actual: chain_id,
                });
            }
        }
        info!(
            network = %self.options.network,
            chain_id,
            deployer = %self.signer.address(),
            "starting deployment"
        );

        let manager = self.deploy(ContractKind::CampaignManager, Value::Null)?;
        let gas_lot = self.deploy(ContractKind::GasLot, json!({ "governor": manager.address }))?;

        self.wait_for_confirmations(gas_lot.block_number.max(manager.block_number))?;

        let set = ArtifactSet {
            addresses: AddressBook {
                contract_address: manager.address,
                gas_lot_contract_address: gas_lot.address,
            },
            manager: ContractArtifact::new(campaign_manager::abi()),
            gas_lot: ContractArtifact::new(gas_lot::abi()),
        };
        let artifact_paths = set.write(&self.options.artifacts_dir)?;
        info!(dir = %self.options.artifacts_dir.display(), "artifacts written");

        let verification = [&manager, &gas_lot]
            .into_iter()
            .map(|deployed| (deployed.name.clone(), self.verify(deployed)))
            .collect();

        Ok(DeploymentReport {
            network: self.options.network.clone(),
            manager,
            gas_lot,
            artifact_paths,
            verification,
        })
    }

    fn deploy(&self, kind: ContractKind, args: Value) -> Result<DeployedContract, DeployError> {
        let name = kind.name().to_string();
        let receipt = self.client.submit(
            self.signer,
            0,
            TxAction::Deploy {
                contract: name.clone(),
                args: args.clone(),
            },
        )?;
        if let ReceiptStatus::Reverted { reason } = receipt.status {
            return Err(DeployError::Reverted {
                contract: name,
                reason,
            });
        }
        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::MissingAddress(name.clone()))?;
        info!(
            tx = %hash_hex(&receipt.tx_hash),
            block = receipt.block_number,
            "{name} contract deployed to {address} on {}",
            self.options.network
        );
        Ok(DeployedContract {
            name,
            address,
            block_number: receipt.block_number,
            constructor_args: args,
        })
    }

    /// Block until the head is `confirmations` blocks past `deployed_at`.
    fn wait_for_confirmations(&self, deployed_at: u64) -> Result<(), DeployError> {
        let confirmations = self.options.confirmations;
        if confirmations == 0 {
            return Ok(());
        }
        let target = deployed_at
            .checked_add(confirmations)
            .ok_or(DeployError::ConfirmationsOutOfRange {
                block: deployed_at,
                confirmations,
            })?;
        info!(confirmations, target, "waiting for confirmations");
        loop {
            let head = self.client.block_number()?;
            if head >= target {
                info!(head, "confirmations reached");
                return Ok(());
            }
            thread::sleep(self.options.poll_interval);
        }
    }

    fn verify(&self, deployed: &DeployedContract) -> VerificationStatus {
        let Some(verifier) = self.verifier else {
            info!(contract = %deployed.name, "no explorer configured, skipping verification");
            return VerificationStatus::Skipped;
        };
        let code_hash = match ContractKind::from_name(&deployed.name) {
            Some(kind) => kind.abi().code_hash_hex(),
            None => return VerificationStatus::Failed(format!("unknown contract {}", deployed.name)),
        };
        info!(contract = %deployed.name, address = %deployed.address, "verifying contract on explorer");
        let request = VerificationRequest {
            apikey: None,
            contract_address: deployed.address,
            contract_name: deployed.name.clone(),
            code_hash,
            constructor_arguments: deployed.constructor_args.clone(),
        };
        match verifier.verify(&request) {
            Ok(VerifyOutcome::Verified) => {
                info!(contract = %deployed.name, "contract verified successfully");
                VerificationStatus::Verified
            }
            Ok(VerifyOutcome::AlreadyVerified) => {
                info!(contract = %deployed.name, "contract already verified");
                VerificationStatus::AlreadyVerified
            }
            Err(e) => {
                warn!(contract = %deployed.name, error = %e, "verification failed");
                VerificationStatus::Failed(e.to_string())
            }
        }
    }
}
