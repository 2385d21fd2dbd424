//! Client data gateway: campaign reads and writes expressed as contract
//! calls, returning plain data.
//!
//! No retries and no caching. Reads go to the node every time; writes are
//! signed with the session key and submitted once.

use std::path::Path;

use crowdledger_core::contracts::campaign_manager::{self, Campaign, Donation};
use crowdledger_core::rpc::codes;
use crowdledger_core::tx::{Receipt, ReceiptStatus, TxAction};
use crowdledger_core::units::format_units;
use crowdledger_core::{Address, Amount, Keypair};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::info;

use crate::artifacts::{self, ArtifactError};
use crate::client::{RpcClient, RpcClientError};
use crate::transport::Transport;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("network error: {0}")]
    Network(String),
    #[error("query rejected: {0}")]
    QueryRejected(String),
    #[error("transaction rejected: {0}")]
    RejectedTransaction(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("insufficient funds: balance {available}, needed {needed}")]
    InsufficientFunds { available: String, needed: String },
    #[error("no signing key in this session")]
    MissingSigner,
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error("unexpected response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Only transport failures are network errors; an RPC error object is
    /// the node answering, e.g. a view reverting on an unknown campaign.
    fn from_read(err: RpcClientError) -> Self {
        match err {
            RpcClientError::Transport(e) => Self::Network(e.to_string()),
            RpcClientError::Rpc { message, .. } => Self::QueryRejected(message),
            RpcClientError::Decode { method, reason } => Self::Decode(format!("{method}: {reason}")),
            RpcClientError::Encode(reason) => Self::QueryRejected(reason),
        }
    }

    fn from_write(err: RpcClientError) -> Self {
        match err {
            RpcClientError::Transport(e) => Self::Network(e.to_string()),
            RpcClientError::Rpc {
                code: codes::INSUFFICIENT_FUNDS,
                message,
                data,
            } => {
                let field = |name: &str| {
                    data.as_ref()
                        .and_then(|d| d.get(name))
                        .and_then(Value::as_str)
                        .and_then(|s| s.parse::<Amount>().ok())
                        .map(format_units)
                };
                match (field("balance"), field("needed")) {
                    (Some(available), Some(needed)) => Self::InsufficientFunds { available, needed },
                    _ => Self::RejectedTransaction(message),
                }
            }
            RpcClientError::Rpc { message, .. } => Self::RejectedTransaction(message),
            RpcClientError::Decode { method, reason } => Self::Decode(format!("{method}: {reason}")),
            RpcClientError::Encode(reason) => Self::RejectedTransaction(reason),
        }
    }
}

/// Fields a user supplies when starting a campaign. The owner is the
/// session's signer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewCampaign {
    pub title: String,
    pub description: String,
    pub target: Amount,
    pub deadline: u64,
    pub image: String,
}

impl NewCampaign {
    /// Check required fields; `now` is the head block timestamp.
    pub fn validate(&self, now: u64) -> Result<(), GatewayError> {
        if self.title.trim().is_empty() {
            return Err(GatewayError::Validation("title is required".into()));
        }
        if self.description.trim().is_empty() {
            return Err(GatewayError::Validation("description is required".into()));
        }
        if self.target == 0 {
            return Err(GatewayError::Validation("target must be greater than zero".into()));
        }
        if self.deadline <= now {
            return Err(GatewayError::Validation(format!(
                "deadline {} is not after the current block time {now}",
                self.deadline
            )));
        }
        if !is_image_uri(&self.image) {
            return Err(GatewayError::Validation(format!(
                "image {:?} must be an http(s):// or ipfs:// URI",
                self.image
            )));
        }
        Ok(())
    }
}

fn is_image_uri(image: &str) -> bool {
    ["https://", "http://", "ipfs://"].iter().any(|scheme| {
        image
            .strip_prefix(scheme)
            .is_some_and(|rest| !rest.is_empty() && !rest.chars().any(char::is_whitespace))
    })
}

/// Result of a state-changing gateway call.
#[derive(Clone, Debug)]
pub struct Submitted<T> {
    pub value: T,
    pub receipt: Receipt,
}

pub struct CampaignGateway<T> {
    client: RpcClient<T>,
    manager: Address,
    signer: Option<Keypair>,
}

impl<T: Transport> CampaignGateway<T> {
    pub fn new(client: RpcClient<T>, manager: Address) -> Self {
        Self {
            client,
            manager,
            signer: None,
        }
    }

    /// Build from the address book a deployment wrote into `dir`.
    pub fn from_artifacts(client: RpcClient<T>, dir: &Path) -> Result<Self, GatewayError> {
        let book = artifacts::read_address_book(dir)?;
        Ok(Self::new(client, book.contract_address))
    }

    pub fn with_signer(mut self, signer: Keypair) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn manager(&self) -> Address {
        self.manager
    }

    pub fn client(&self) -> &RpcClient<T> {
        &self.client
    }

    /// Campaigns with creation index in `[start, end)`, in creation order.
    pub fn list_campaigns(&self, start: u64, end: u64) -> Result<Vec<Campaign>, GatewayError> {
        self.view(campaign_manager::GET_CAMPAIGNS, json!({ "start": start, "end": end }))
    }

    pub fn campaign(&self, id: u64) -> Result<Campaign, GatewayError> {
        self.view(campaign_manager::GET_CAMPAIGN, json!({ "id": id }))
    }

    pub fn campaign_count(&self) -> Result<u64, GatewayError> {
        self.view(campaign_manager::NUMBER_OF_CAMPAIGNS, Value::Null)
    }

    pub fn donations(&self, id: u64) -> Result<Vec<Donation>, GatewayError> {
        self.view(campaign_manager::GET_DONATORS, json!({ "id": id }))
    }

    pub fn balance(&self, account: &Address) -> Result<Amount, GatewayError> {
        self.client.balance(account).map_err(GatewayError::from_read)
    }

    /// Create a campaign owned by the signer; yields the new campaign id.
    pub fn create_campaign(&self, fields: &NewCampaign) -> Result<Submitted<u64>, GatewayError> {
        let signer = self.signer()?;
        let now = self.client.head_timestamp().map_err(GatewayError::from_read)?;
        fields.validate(now)?;

        let args = json!({
            "owner": signer.address(),
            "title": fields.title,
            "description": fields.description,
            "target": fields.target.to_string(),
            "deadline": fields.deadline,
            "image": fields.image,
        });
        let receipt = self.send(signer, 0, campaign_manager::CREATE_CAMPAIGN, args)?;
        let id = decode_output(&receipt)?;
        info!(campaign = id, title = %fields.title, "campaign created");
        Ok(Submitted { value: id, receipt })
    }

    /// Donate `amount` to campaign `id`; yields the campaign's new total.
    pub fn donate(&self, id: u64, amount: Amount) -> Result<Submitted<Amount>, GatewayError> {
        let signer = self.signer()?;
        if amount == 0 {
            return Err(GatewayError::Validation("donation amount must be greater than zero".into()));
        }
        let receipt = self.send(
            signer,
            amount,
            campaign_manager::DONATE_TO_CAMPAIGN,
            json!({ "id": id }),
        )?;
        let total: String = decode_output(&receipt)?;
        let total = total
            .parse()
            .map_err(|e: std::num::ParseIntError| GatewayError::Decode(e.to_string()))?;
        info!(campaign = id, amount = %format_units(amount), "donation sent");
        Ok(Submitted { value: total, receipt })
    }

    fn signer(&self) -> Result<&Keypair, GatewayError> {
        self.signer.as_ref().ok_or(GatewayError::MissingSigner)
    }

    fn view<R: DeserializeOwned>(&self, method: &str, args: Value) -> Result<R, GatewayError> {
        self.client
            .call(&self.manager, method, args)
            .map_err(GatewayError::from_read)
    }

    fn send(&self, signer: &Keypair, value: Amount, method: &str, args: Value) -> Result<Receipt, GatewayError> {
        let action = TxAction::Call {
            to: self.manager,
            method: method.to_string(),
            args,
        };
        let receipt = self
            .client
            .submit(signer, value, action)
            .map_err(GatewayError::from_write)?;
        match &receipt.status {
            ReceiptStatus::Success => Ok(receipt),
            ReceiptStatus::Reverted { reason } => Err(GatewayError::RejectedTransaction(reason.clone())),
        }
    }
}

fn decode_output<R: DeserializeOwned>(receipt: &Receipt) -> Result<R, GatewayError> {
    serde_json::from_value(receipt.output.clone()).map_err(|e| GatewayError::Decode(e.to_string()))
}
